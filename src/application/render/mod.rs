//! Rendering: the local browser-backed engine and the types shared with
//! peer renderers.
//!
//! The engine never retries; a failed attempt is reported as a
//! [`RenderFailure`] and the dispatch router decides what happens next.

mod browser;
mod local;
mod transform;
mod types;

pub use browser::{BrowserBackend, BrowserSession, LaunchOptions, PageContext};
pub use local::{LocalEngineConfig, LocalRenderEngine};
pub use transform::{DEFAULT_IMAGE_MAX_WIDTH, ImageTransform, TransformOutcome};
pub use types::{
    CaptureOptions, LoadPolicy, LocalRender, PaperFormat, PeerRender, RenderFailure,
};
