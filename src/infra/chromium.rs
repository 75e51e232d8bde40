//! Headless Chromium driven over the DevTools protocol.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use chromiumoxide::{
    Page,
    browser::{Browser, BrowserConfig},
    cdp::{browser_protocol::page::PrintToPdfParams, js_protocol::runtime::EvaluateParams},
    js::EvaluationResult,
};
use futures::StreamExt;
use tokio::{sync::Mutex, task::JoinHandle};
use tracing::{debug, info};

use crate::application::render::{
    BrowserBackend, BrowserSession, CaptureOptions, ImageTransform, LaunchOptions, LoadPolicy,
    PageContext, RenderFailure, TransformOutcome,
};

/// Resolves once the document has fired `load`.
const WAIT_FOR_LOAD: &str = r#"new Promise((resolve) => {
  if (document.readyState === "complete") { resolve(true); return; }
  window.addEventListener("load", () => resolve(true), { once: true });
})"#;

/// Resolves after no new resource has finished loading for 500ms.
const WAIT_FOR_NETWORK_IDLE: &str = r#"new Promise((resolve) => {
  const quietMs = 500;
  let seen = performance.getEntriesByType("resource").length;
  let changedAt = Date.now();
  const tick = () => {
    const count = performance.getEntriesByType("resource").length;
    if (count !== seen) { seen = count; changedAt = Date.now(); }
    if (Date.now() - changedAt >= quietMs) { resolve(true); } else { setTimeout(tick, 100); }
  };
  tick();
})"#;

/// Launches a local Chromium through chromiumoxide.
#[derive(Debug, Clone)]
pub struct ChromiumBackend {
    command_timeout: Duration,
}

impl ChromiumBackend {
    /// `command_timeout` bounds each DevTools command; it must cover the
    /// slowest expected capture.
    pub fn new(command_timeout: Duration) -> Self {
        Self { command_timeout }
    }
}

#[async_trait]
impl BrowserBackend for ChromiumBackend {
    async fn launch(
        &self,
        options: &LaunchOptions,
    ) -> Result<Arc<dyn BrowserSession>, RenderFailure> {
        let mut builder = BrowserConfig::builder()
            .args(options.args.iter().cloned())
            .request_timeout(self.command_timeout);
        if let Some(executable) = options.executable.as_ref() {
            builder = builder.chrome_executable(executable);
        }
        if !options.headless {
            builder = builder.with_head();
        }
        let config = builder.build().map_err(RenderFailure::engine_start)?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|err| RenderFailure::engine_start(err.to_string()))?;

        let driver = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(err) = event {
                    debug!(
                        target = "printrelay::chromium",
                        op = "chromium::handler",
                        error = %err,
                        "DevTools handler reported an error"
                    );
                }
            }
            debug!(
                target = "printrelay::chromium",
                op = "chromium::handler",
                "DevTools connection closed"
            );
        });

        Ok(Arc::new(ChromiumSession {
            browser: Mutex::new(browser),
            driver,
        }))
    }
}

struct ChromiumSession {
    browser: Mutex<Browser>,
    driver: JoinHandle<()>,
}

#[async_trait]
impl BrowserSession for ChromiumSession {
    async fn open_page(&self) -> Result<Box<dyn PageContext>, RenderFailure> {
        let page = {
            let browser = self.browser.lock().await;
            browser
                .new_page("about:blank")
                .await
                .map_err(|err| RenderFailure::engine(format!("failed to open page: {err}")))?
        };
        Ok(Box::new(ChromiumPage { page }))
    }

    async fn close(&self) -> Result<(), RenderFailure> {
        let mut browser = self.browser.lock().await;
        let closed = browser
            .close()
            .await
            .map_err(|err| RenderFailure::engine(format!("failed to close browser: {err}")));
        // Reap the child even if the close command failed.
        let waited = browser.wait().await;
        self.driver.abort();

        closed?;
        let status = waited
            .map_err(|err| RenderFailure::engine(format!("failed to reap browser: {err}")))?;
        info!(
            target = "printrelay::chromium",
            op = "chromium::close",
            exit_status = ?status,
            "Browser process exited"
        );
        Ok(())
    }
}

struct ChromiumPage {
    page: Page,
}

#[async_trait]
impl PageContext for ChromiumPage {
    async fn load(&mut self, html: &str, policy: LoadPolicy) -> Result<(), RenderFailure> {
        self.page
            .set_content(html)
            .await
            .map_err(|err| RenderFailure::engine(format!("failed to set content: {err}")))?;

        wait_for(&self.page, WAIT_FOR_LOAD).await?;
        if policy == LoadPolicy::NetworkIdle {
            wait_for(&self.page, WAIT_FOR_NETWORK_IDLE).await?;
        }
        Ok(())
    }

    async fn apply_transform(
        &mut self,
        transform: &ImageTransform,
    ) -> Result<TransformOutcome, RenderFailure> {
        let script = transform.script()?;
        evaluate(&self.page, &script)
            .await
            .map_err(|err| RenderFailure::transform(format!("image transform failed: {err}")))?
            .into_value::<TransformOutcome>()
            .map_err(|err| RenderFailure::transform(format!("unexpected transform result: {err}")))
    }

    async fn capture(&mut self, options: &CaptureOptions) -> Result<Vec<u8>, RenderFailure> {
        let (width, height) = options.paper.dimensions_in();
        let params = PrintToPdfParams {
            print_background: Some(options.print_background),
            prefer_css_page_size: Some(options.prefer_css_page_size),
            paper_width: Some(width),
            paper_height: Some(height),
            ..Default::default()
        };

        self.page
            .pdf(params)
            .await
            .map_err(|err| RenderFailure::engine(format!("printToPDF failed: {err}")))
    }

    async fn close(self: Box<Self>) -> Result<(), RenderFailure> {
        self.page
            .close()
            .await
            .map_err(|err| RenderFailure::engine(format!("failed to close page: {err}")))
    }
}

async fn wait_for(page: &Page, script: &str) -> Result<(), RenderFailure> {
    evaluate(page, script)
        .await
        .map_err(|err| RenderFailure::engine(format!("load wait failed: {err}")))?;
    Ok(())
}

async fn evaluate(page: &Page, script: &str) -> Result<EvaluationResult, String> {
    let params = EvaluateParams::builder()
        .expression(script)
        .await_promise(true)
        .return_by_value(true)
        .build()?;

    page.evaluate_expression(params)
        .await
        .map_err(|err| err.to_string())
}
