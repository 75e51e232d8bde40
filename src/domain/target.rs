//! Execution targets a render job can be dispatched to.

use std::fmt;

use url::Url;

/// Name reported for the in-process engine in logs and metrics.
pub const LOCAL_TARGET_NAME: &str = "local";

/// A remote renderer exposing the same job contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerTarget {
    pub name: String,
    pub address: Url,
}

impl PeerTarget {
    pub fn new(name: impl Into<String>, address: Url) -> Self {
        Self {
            name: name.into(),
            address,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionTarget {
    Local,
    Remote(PeerTarget),
}

impl ExecutionTarget {
    pub fn name(&self) -> &str {
        match self {
            ExecutionTarget::Local => LOCAL_TARGET_NAME,
            ExecutionTarget::Remote(peer) => peer.name.as_str(),
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(self, ExecutionTarget::Local)
    }
}

impl fmt::Display for ExecutionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionTarget::Local => f.write_str(LOCAL_TARGET_NAME),
            ExecutionTarget::Remote(peer) => write!(f, "{} ({})", peer.name, peer.address),
        }
    }
}
