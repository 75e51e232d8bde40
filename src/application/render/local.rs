//! In-process render engine built on a single long-lived browser session.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::{Duration, Instant},
};

use async_trait::async_trait;
use metrics::histogram;
use tokio::sync::{Mutex, OnceCell, Semaphore};
use tracing::{debug, info, warn};

use super::{
    browser::{BrowserBackend, BrowserSession, LaunchOptions, PageContext},
    transform::ImageTransform,
    types::{CaptureOptions, LoadPolicy, LocalRender, RenderFailure},
};

/// Tunables for [`LocalRenderEngine`].
#[derive(Debug, Clone)]
pub struct LocalEngineConfig {
    pub launch: LaunchOptions,
    pub navigation_timeout: Duration,
    pub capture_timeout: Duration,
    pub max_concurrent_pages: usize,
    pub load_policy: LoadPolicy,
    pub capture: CaptureOptions,
    pub transform: ImageTransform,
}

impl Default for LocalEngineConfig {
    fn default() -> Self {
        Self {
            launch: LaunchOptions {
                executable: None,
                headless: true,
                args: Vec::new(),
            },
            navigation_timeout: Duration::from_secs(120),
            capture_timeout: Duration::from_secs(120),
            max_concurrent_pages: 4,
            load_policy: LoadPolicy::Load,
            capture: CaptureOptions::default(),
            transform: ImageTransform::default(),
        }
    }
}

pub struct LocalRenderEngine {
    backend: Arc<dyn BrowserBackend>,
    config: LocalEngineConfig,
    session: OnceCell<Arc<dyn BrowserSession>>,
    /// Held across a launch; shutdown takes it to wait out a launch in flight.
    launch_gate: Mutex<()>,
    slots: Semaphore,
    shut_down: AtomicBool,
}

impl LocalRenderEngine {
    pub fn new(backend: Arc<dyn BrowserBackend>, config: LocalEngineConfig) -> Self {
        let slots = Semaphore::new(config.max_concurrent_pages.max(1));
        Self {
            backend,
            config,
            session: OnceCell::new(),
            launch_gate: Mutex::new(()),
            slots,
            shut_down: AtomicBool::new(false),
        }
    }

    /// Whether a browser session is currently live.
    pub fn is_running(&self) -> bool {
        self.session.initialized() && !self.shut_down.load(Ordering::Acquire)
    }

    /// Launch the shared browser session if it is not running yet.
    ///
    /// Concurrent callers wait on the same launch. A failed launch leaves
    /// the engine unstarted so a later call can try again.
    pub async fn start(&self) -> Result<Arc<dyn BrowserSession>, RenderFailure> {
        if let Some(session) = self.session.get()
            && !self.shut_down.load(Ordering::Acquire)
        {
            return Ok(Arc::clone(session));
        }

        let _gate = self.launch_gate.lock().await;
        if self.shut_down.load(Ordering::Acquire) {
            return Err(RenderFailure::engine_start("engine has been shut down"));
        }

        let session = self
            .session
            .get_or_try_init(|| async {
                let started_at = Instant::now();
                info!(
                    target = "printrelay::engine",
                    op = "engine::start",
                    headless = self.config.launch.headless,
                    args = self.config.launch.args.len(),
                    "Launching browser"
                );
                let session = self.backend.launch(&self.config.launch).await?;
                info!(
                    target = "printrelay::engine",
                    op = "engine::start",
                    result = "ok",
                    elapsed_ms = started_at.elapsed().as_millis() as u64,
                    "Browser ready"
                );
                Ok::<_, RenderFailure>(session)
            })
            .await?;

        Ok(Arc::clone(session))
    }

    /// Close the browser session. Only the first call has any effect.
    ///
    /// A launch still in progress is allowed to finish and is then closed.
    pub async fn shutdown(&self) -> Result<(), RenderFailure> {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.slots.close();

        let _gate = self.launch_gate.lock().await;
        match self.session.get() {
            Some(session) => {
                info!(
                    target = "printrelay::engine",
                    op = "engine::shutdown",
                    "Closing browser"
                );
                session.close().await
            }
            None => Ok(()),
        }
    }

    async fn render_document(&self, document: &str) -> Result<Vec<u8>, RenderFailure> {
        let _slot = self
            .slots
            .acquire()
            .await
            .map_err(|_| RenderFailure::engine("engine is shutting down"))?;

        let session = self.start().await?;
        let page = session.open_page().await?;
        let mut guard = PageGuard::new(page);

        let outcome = self.render_in_page(guard.page_mut(), document).await;
        guard.release().await;
        outcome
    }

    async fn render_in_page(
        &self,
        page: &mut dyn PageContext,
        document: &str,
    ) -> Result<Vec<u8>, RenderFailure> {
        let navigation_timeout = self.config.navigation_timeout;
        tokio::time::timeout(navigation_timeout, page.load(document, self.config.load_policy))
            .await
            .map_err(|_| RenderFailure::LoadTimeout {
                after: navigation_timeout,
            })??;

        let transformed = page.apply_transform(&self.config.transform).await?;
        debug!(
            target = "printrelay::engine",
            op = "engine::transform",
            load_policy = self.config.load_policy.as_str(),
            images = transformed.images,
            capped = transformed.capped,
            "Images adjusted"
        );

        let capture_timeout = self.config.capture_timeout;
        tokio::time::timeout(capture_timeout, page.capture(&self.config.capture))
            .await
            .map_err(|_| RenderFailure::CaptureTimeout {
                after: capture_timeout,
            })?
    }
}

#[async_trait]
impl LocalRender for LocalRenderEngine {
    async fn render(&self, document: &str) -> Result<Vec<u8>, RenderFailure> {
        let started_at = Instant::now();
        let result = self.render_document(document).await;
        let elapsed_ms = started_at.elapsed().as_millis() as u64;

        match &result {
            Ok(bytes) => {
                histogram!("printrelay_render_ms", "target" => "local").record(elapsed_ms as f64);
                info!(
                    target = "printrelay::engine",
                    op = "engine::render",
                    result = "ok",
                    elapsed_ms,
                    pdf_bytes = bytes.len(),
                    "Local render finished"
                );
            }
            Err(err) => warn!(
                target = "printrelay::engine",
                op = "engine::render",
                result = "error",
                elapsed_ms,
                error_code = err.kind(),
                error = %err,
                "Local render failed"
            ),
        }

        result
    }
}

/// Owns a page for the duration of one job and guarantees it is closed.
///
/// `release` closes it inline; if the job future is dropped first, the page
/// is closed on a background task instead.
struct PageGuard {
    page: Option<Box<dyn PageContext>>,
}

impl PageGuard {
    fn new(page: Box<dyn PageContext>) -> Self {
        Self { page: Some(page) }
    }

    fn page_mut(&mut self) -> &mut dyn PageContext {
        match self.page.as_mut() {
            Some(page) => page.as_mut(),
            None => unreachable!("page accessed after release"),
        }
    }

    async fn release(mut self) {
        if let Some(page) = self.page.take() {
            close_page(page).await;
        }
    }
}

impl Drop for PageGuard {
    fn drop(&mut self) {
        if let Some(page) = self.page.take()
            && let Ok(handle) = tokio::runtime::Handle::try_current()
        {
            handle.spawn(close_page(page));
        }
    }
}

async fn close_page(page: Box<dyn PageContext>) {
    if let Err(err) = page.close().await {
        warn!(
            target = "printrelay::engine",
            op = "engine::close_page",
            result = "error",
            error = %err,
            "Failed to close page"
        );
    }
}
