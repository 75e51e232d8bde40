//! Engine warmup at startup and bounded teardown on termination.

use std::{
    future::Future,
    sync::Arc,
    time::{Duration, Instant},
};

use tokio::{sync::watch, task::JoinHandle};
use tracing::{error, info, warn};

use crate::application::render::LocalRenderEngine;

pub struct Lifecycle {
    engine: Arc<LocalRenderEngine>,
    shutdown_timeout: Duration,
}

/// How a bounded shutdown ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    Closed,
    Failed,
    TimedOut,
}

impl Lifecycle {
    pub fn new(engine: Arc<LocalRenderEngine>, shutdown_timeout: Duration) -> Self {
        Self {
            engine,
            shutdown_timeout,
        }
    }

    /// Start the engine in the background. Failure is logged only; the first
    /// local job will try to launch again.
    pub fn warmup(&self) -> JoinHandle<()> {
        let engine = Arc::clone(&self.engine);
        tokio::spawn(async move {
            let started_at = Instant::now();
            match engine.start().await {
                Ok(_) => info!(
                    target = "printrelay::lifecycle",
                    op = "lifecycle::warmup",
                    result = "ok",
                    elapsed_ms = started_at.elapsed().as_millis() as u64,
                    "Render engine warmed up"
                ),
                Err(err) => warn!(
                    target = "printrelay::lifecycle",
                    op = "lifecycle::warmup",
                    result = "error",
                    elapsed_ms = started_at.elapsed().as_millis() as u64,
                    error = %err,
                    "Render engine warmup failed"
                ),
            }
        })
    }

    pub async fn shutdown(&self) -> ShutdownOutcome {
        let started_at = Instant::now();
        match tokio::time::timeout(self.shutdown_timeout, self.engine.shutdown()).await {
            Ok(Ok(())) => {
                info!(
                    target = "printrelay::lifecycle",
                    op = "lifecycle::shutdown",
                    result = "ok",
                    elapsed_ms = started_at.elapsed().as_millis() as u64,
                    "Render engine closed"
                );
                ShutdownOutcome::Closed
            }
            Ok(Err(err)) => {
                error!(
                    target = "printrelay::lifecycle",
                    op = "lifecycle::shutdown",
                    result = "error",
                    error = %err,
                    "Render engine failed to close"
                );
                ShutdownOutcome::Failed
            }
            Err(_) => {
                error!(
                    target = "printrelay::lifecycle",
                    op = "lifecycle::shutdown",
                    result = "timeout",
                    timeout_ms = self.shutdown_timeout.as_millis() as u64,
                    "Render engine did not close in time"
                );
                ShutdownOutcome::TimedOut
            }
        }
    }
}

/// One termination signal shared by every part of the process that stops on it.
#[derive(Debug, Clone)]
pub struct ShutdownNotice {
    receiver: watch::Receiver<bool>,
}

impl ShutdownNotice {
    /// Await `signal` on a background task and notify every clone once it
    /// resolves.
    pub fn spawn<F>(signal: F) -> (Self, JoinHandle<()>)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let (sender, receiver) = watch::channel(false);
        let handle = tokio::spawn(async move {
            signal.await;
            let _ = sender.send(true);
        });
        (Self { receiver }, handle)
    }

    /// Resolves once the signal has fired. Never resolves if the signal task
    /// ended without firing.
    pub async fn notified(mut self) {
        let fired = self.receiver.wait_for(|fired| *fired).await.is_ok();
        if !fired {
            std::future::pending::<()>().await;
        }
    }
}

/// Resolves on Ctrl+C or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                error!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!(target = "printrelay::lifecycle", signal = "ctrl_c", "Shutdown requested"),
        _ = terminate => info!(target = "printrelay::lifecycle", signal = "sigterm", "Shutdown requested"),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::application::render::{
        BrowserBackend, BrowserSession, LaunchOptions, LocalEngineConfig, PageContext,
        RenderFailure,
    };

    struct StubBackend {
        launches: AtomicUsize,
        hang_on_close: bool,
    }

    struct StubSession {
        hang_on_close: bool,
    }

    #[async_trait]
    impl BrowserBackend for StubBackend {
        async fn launch(
            &self,
            _options: &LaunchOptions,
        ) -> Result<Arc<dyn BrowserSession>, RenderFailure> {
            self.launches.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(StubSession {
                hang_on_close: self.hang_on_close,
            }))
        }
    }

    #[async_trait]
    impl BrowserSession for StubSession {
        async fn open_page(&self) -> Result<Box<dyn PageContext>, RenderFailure> {
            Err(RenderFailure::engine("pages are not needed here"))
        }

        async fn close(&self) -> Result<(), RenderFailure> {
            if self.hang_on_close {
                std::future::pending::<()>().await;
            }
            Ok(())
        }
    }

    fn lifecycle(hang_on_close: bool) -> (Lifecycle, Arc<StubBackend>, Arc<LocalRenderEngine>) {
        let backend = Arc::new(StubBackend {
            launches: AtomicUsize::new(0),
            hang_on_close,
        });
        let engine = Arc::new(LocalRenderEngine::new(
            backend.clone(),
            LocalEngineConfig::default(),
        ));
        let lifecycle = Lifecycle::new(Arc::clone(&engine), Duration::from_secs(10));
        (lifecycle, backend, engine)
    }

    #[tokio::test]
    async fn warmup_starts_the_engine() {
        let (lifecycle, backend, engine) = lifecycle(false);
        lifecycle.warmup().await.expect("warmup task");

        assert!(engine.is_running());
        assert_eq!(backend.launches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn shutdown_closes_a_running_engine() {
        let (lifecycle, _backend, engine) = lifecycle(false);
        engine.start().await.expect("start");

        assert_eq!(lifecycle.shutdown().await, ShutdownOutcome::Closed);
        assert!(!engine.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn one_signal_reaches_every_listener() {
        let (trigger, signal) = tokio::sync::oneshot::channel::<()>();
        let (notice, _task) = ShutdownNotice::spawn(async move {
            let _ = signal.await;
        });

        let first = tokio::spawn(notice.clone().notified());
        let second = tokio::spawn(notice.notified());
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(!first.is_finished());
        assert!(!second.is_finished());

        trigger.send(()).expect("signal task alive");
        tokio::time::timeout(Duration::from_secs(1), first)
            .await
            .expect("first listener notified")
            .expect("join");
        tokio::time::timeout(Duration::from_secs(1), second)
            .await
            .expect("second listener notified")
            .expect("join");
    }

    #[tokio::test(start_paused = true)]
    async fn aborted_signal_task_does_not_notify() {
        let (notice, task) = ShutdownNotice::spawn(std::future::pending());
        task.abort();
        let _ = task.await;

        let waited = tokio::time::timeout(Duration::from_secs(60), notice.notified()).await;
        assert!(waited.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_is_bounded_when_close_hangs() {
        let (lifecycle, _backend, engine) = lifecycle(true);
        engine.start().await.expect("start");

        assert_eq!(lifecycle.shutdown().await, ShutdownOutcome::TimedOut);
    }
}
