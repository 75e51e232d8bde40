//! Infrastructure adapters and runtime bootstrap.

pub mod chromium;
pub mod error;
pub mod heartbeat;
pub mod http;
pub mod peer;
pub mod telemetry;
