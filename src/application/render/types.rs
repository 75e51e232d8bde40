use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{job::RenderJob, target::PeerTarget};

/// Failure of a single render attempt against one target.
///
/// These never reach clients directly: the dispatch router logs them and
/// moves on to the next target.
#[derive(Debug, Clone, Error)]
pub enum RenderFailure {
    #[error("render engine failed to start: {message}")]
    EngineStart { message: String },
    #[error("document load did not complete within {after:?}")]
    LoadTimeout { after: Duration },
    #[error("capture did not complete within {after:?}")]
    CaptureTimeout { after: Duration },
    #[error("render engine error: {message}")]
    Engine { message: String },
    #[error("document transform failed: {message}")]
    Transform { message: String },
    #[error("peer `{target}` responded with status {status}")]
    PeerHttp { target: String, status: u16 },
    #[error("peer `{target}` unreachable: {cause}")]
    PeerTransport { target: String, cause: String },
}

impl RenderFailure {
    pub fn engine_start(message: impl Into<String>) -> Self {
        Self::EngineStart {
            message: message.into(),
        }
    }

    pub fn engine(message: impl Into<String>) -> Self {
        Self::Engine {
            message: message.into(),
        }
    }

    pub fn transform(message: impl Into<String>) -> Self {
        Self::Transform {
            message: message.into(),
        }
    }

    /// Short machine-readable label used as a log/metric field.
    pub fn kind(&self) -> &'static str {
        match self {
            RenderFailure::EngineStart { .. } => "engine_start",
            RenderFailure::LoadTimeout { .. } => "load_timeout",
            RenderFailure::CaptureTimeout { .. } => "capture_timeout",
            RenderFailure::Engine { .. } => "engine",
            RenderFailure::Transform { .. } => "transform",
            RenderFailure::PeerHttp { .. } => "peer_http",
            RenderFailure::PeerTransport { .. } => "peer_transport",
        }
    }
}

/// Renders markup with the in-process engine.
#[async_trait]
pub trait LocalRender: Send + Sync {
    async fn render(&self, document: &str) -> Result<Vec<u8>, RenderFailure>;
}

/// Forwards a job to a remote renderer.
#[async_trait]
pub trait PeerRender: Send + Sync {
    async fn render(&self, job: &RenderJob, peer: &PeerTarget) -> Result<Vec<u8>, RenderFailure>;
}

/// Completion signal awaited before a loaded document is captured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadPolicy {
    /// The document's `load` event has fired.
    #[default]
    Load,
    /// No network activity for a short quiet period after load.
    NetworkIdle,
}

impl LoadPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            LoadPolicy::Load => "load",
            LoadPolicy::NetworkIdle => "network-idle",
        }
    }
}

impl std::str::FromStr for LoadPolicy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "load" => Ok(LoadPolicy::Load),
            "network-idle" | "networkidle" | "network_idle" => Ok(LoadPolicy::NetworkIdle),
            other => Err(format!("unknown load policy `{other}`")),
        }
    }
}

/// Fallback paper size used when the document declares no `@page` size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PaperFormat {
    #[default]
    A4,
    A3,
    Letter,
    Legal,
}

impl PaperFormat {
    /// Width and height in inches, portrait orientation.
    pub fn dimensions_in(self) -> (f64, f64) {
        match self {
            PaperFormat::A4 => (8.27, 11.69),
            PaperFormat::A3 => (11.69, 16.54),
            PaperFormat::Letter => (8.5, 11.0),
            PaperFormat::Legal => (8.5, 14.0),
        }
    }
}

impl std::str::FromStr for PaperFormat {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "a4" => Ok(PaperFormat::A4),
            "a3" => Ok(PaperFormat::A3),
            "letter" => Ok(PaperFormat::Letter),
            "legal" => Ok(PaperFormat::Legal),
            other => Err(format!("unknown paper format `{other}`")),
        }
    }
}

/// Options for the fixed-layout capture.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CaptureOptions {
    pub print_background: bool,
    /// Let `@page { size: ... }` in the document override `paper`.
    pub prefer_css_page_size: bool,
    pub paper: PaperFormat,
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self {
            print_background: true,
            prefer_css_page_size: true,
            paper: PaperFormat::A4,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_policy_labels_parse_back() {
        for policy in [LoadPolicy::Load, LoadPolicy::NetworkIdle] {
            assert_eq!(policy.as_str().parse::<LoadPolicy>(), Ok(policy));
        }
        assert!("domcontentloaded".parse::<LoadPolicy>().is_err());
    }
}
