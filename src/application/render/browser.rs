//! Seams between the local render engine and the browser driving it.
//!
//! A [`BrowserBackend`] launches one long-lived [`BrowserSession`]; the
//! session hands out short-lived [`PageContext`]s, one per job. The
//! production implementation lives in `infra::chromium`.

use std::{path::PathBuf, sync::Arc};

use async_trait::async_trait;

use super::{
    transform::{ImageTransform, TransformOutcome},
    types::{CaptureOptions, LoadPolicy, RenderFailure},
};

/// Launch parameters passed through to the browser process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchOptions {
    /// Explicit browser binary; `None` lets the backend locate one.
    pub executable: Option<PathBuf>,
    pub headless: bool,
    /// Command-line flags handed to the browser untouched.
    pub args: Vec<String>,
}

#[async_trait]
pub trait BrowserBackend: Send + Sync {
    async fn launch(
        &self,
        options: &LaunchOptions,
    ) -> Result<Arc<dyn BrowserSession>, RenderFailure>;
}

#[async_trait]
pub trait BrowserSession: Send + Sync {
    /// Open a fresh, isolated page.
    async fn open_page(&self) -> Result<Box<dyn PageContext>, RenderFailure>;

    /// Terminate the browser process.
    async fn close(&self) -> Result<(), RenderFailure>;
}

#[async_trait]
pub trait PageContext: Send {
    /// Replace the page content with `html` and wait for `policy`.
    async fn load(&mut self, html: &str, policy: LoadPolicy) -> Result<(), RenderFailure>;

    /// Adjust the images of the loaded document in place.
    async fn apply_transform(
        &mut self,
        transform: &ImageTransform,
    ) -> Result<TransformOutcome, RenderFailure>;

    async fn capture(&mut self, options: &CaptureOptions) -> Result<Vec<u8>, RenderFailure>;

    async fn close(self: Box<Self>) -> Result<(), RenderFailure>;
}
