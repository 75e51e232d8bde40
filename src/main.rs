use std::{path::PathBuf, process, sync::Arc};

use printrelay::{
    application::{
        dispatch::DispatchRouter,
        error::AppError,
        lifecycle::{Lifecycle, ShutdownNotice, shutdown_signal},
        render::{LocalEngineConfig, LocalRenderEngine},
    },
    config,
    domain::job::RenderJob,
    infra::{
        chromium::ChromiumBackend,
        error::InfraError,
        heartbeat::Heartbeat,
        http::{self, HttpState},
        peer::HttpPeerClient,
        telemetry,
    },
};
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::Render(args) => run_render(settings, args).await,
    }
}

struct Runtime {
    engine: Arc<LocalRenderEngine>,
    router: Arc<DispatchRouter>,
    lifecycle: Lifecycle,
}

fn build_runtime(settings: &config::Settings) -> Result<Runtime, AppError> {
    let engine_config = LocalEngineConfig::from(&settings.engine);
    let backend = Arc::new(ChromiumBackend::new(engine_config.capture_timeout));
    let engine = Arc::new(LocalRenderEngine::new(backend, engine_config));
    let peers = Arc::new(HttpPeerClient::new(settings.peers.request_timeout)?);

    let router = Arc::new(DispatchRouter::new(
        settings.targets(),
        engine.clone(),
        peers,
        settings.dispatch.job_deadline,
    )?);
    info!(
        target = "printrelay::startup",
        targets = ?router.targets().iter().map(|target| target.name()).collect::<Vec<_>>(),
        "Render targets configured"
    );
    let lifecycle = Lifecycle::new(Arc::clone(&engine), settings.engine.shutdown_timeout);

    Ok(Runtime {
        engine,
        router,
        lifecycle,
    })
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let runtime = build_runtime(&settings)?;

    let warmup_handle = runtime
        .router
        .includes_local()
        .then(|| runtime.lifecycle.warmup());

    let heartbeat_handle = match settings.heartbeat.target.as_ref() {
        Some(target) => {
            let heartbeat = Heartbeat::new(target, settings.heartbeat.interval)?;
            info!(
                target = "printrelay::startup",
                url = %heartbeat.health_url(),
                interval_secs = settings.heartbeat.interval.as_secs(),
                "Heartbeat enabled"
            );
            Some(heartbeat.spawn())
        }
        None => None,
    };

    let result = serve_http(&settings, Arc::clone(&runtime.router)).await;

    if let Some(handle) = heartbeat_handle {
        handle.abort();
        let _ = handle.await;
    }
    if let Some(handle) = warmup_handle {
        handle.abort();
        let _ = handle.await;
    }

    runtime.lifecycle.shutdown().await;
    result
}

async fn serve_http(
    settings: &config::Settings,
    router: Arc<DispatchRouter>,
) -> Result<(), AppError> {
    let body_limit = usize::try_from(settings.server.max_body_bytes.get()).unwrap_or(usize::MAX);
    let app = http::build_router(HttpState { router }, body_limit);

    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;
    info!(
        target = "printrelay::startup",
        addr = %settings.server.addr,
        "Listening"
    );

    let graceful_shutdown = settings.server.graceful_shutdown;
    let (notice, signal_task) = ShutdownNotice::spawn(shutdown_signal());
    let drain_notice = notice.clone();
    let server = async move {
        axum::serve(listener, app.into_make_service())
            .with_graceful_shutdown(notice.notified())
            .await
    };

    // Drain in-flight requests, but not forever.
    let result = tokio::select! {
        result = server => result.map_err(|err| AppError::unexpected(format!("server error: {err}"))),
        _ = async move {
            drain_notice.notified().await;
            tokio::time::sleep(graceful_shutdown).await;
        } => {
            warn!(
                target = "printrelay::lifecycle",
                timeout_secs = graceful_shutdown.as_secs(),
                "Graceful shutdown timed out; dropping open connections"
            );
            Ok(())
        }
    };
    signal_task.abort();
    result
}

async fn run_render(settings: config::Settings, args: config::RenderArgs) -> Result<(), AppError> {
    let document = tokio::fs::read_to_string(&args.file)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;
    let job = RenderJob::new(document, args.filename)?;
    let output = args
        .output
        .unwrap_or_else(|| PathBuf::from(job.filename()));

    let runtime = build_runtime(&settings)?;
    let result = runtime.router.dispatch(&job).await;
    if runtime.engine.is_running() {
        runtime.lifecycle.shutdown().await;
    }
    let pdf = result?;

    tokio::fs::write(&output, &pdf)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;
    info!(
        target = "printrelay::render",
        job_id = %job.id(),
        output = %output.display(),
        pdf_bytes = pdf.len(),
        "PDF written"
    );
    Ok(())
}
