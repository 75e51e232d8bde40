use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueHint, builder::BoolishValueParser};

/// Command-line arguments for the printrelay binary.
#[derive(Debug, Parser)]
#[command(name = "printrelay", version, about = "HTML to PDF render relay")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "PRINTRELAY_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the HTTP render service.
    Serve(Box<ServeArgs>),
    /// Render one document through the configured targets and write the PDF.
    Render(RenderArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct EngineOverrides {
    /// Override the browser executable used by the local engine.
    #[arg(long = "engine-executable", value_name = "PATH", value_hint = ValueHint::FilePath)]
    pub executable: Option<PathBuf>,

    /// Run the browser with a visible window.
    #[arg(
        long = "engine-headless",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub headless: Option<bool>,

    /// Override the number of pages rendered concurrently by the local engine.
    #[arg(long = "engine-max-concurrent-pages", value_name = "COUNT")]
    pub max_concurrent_pages: Option<u32>,

    /// Override the load policy (load|network-idle).
    #[arg(long = "engine-load-policy", value_name = "POLICY")]
    pub load_policy: Option<String>,

    /// Include or exclude the local engine from the dispatch targets.
    #[arg(
        long = "dispatch-include-local",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub include_local: Option<bool>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    #[command(flatten)]
    pub engine: EngineOverrides,

    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the listener port.
    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Override the graceful shutdown timeout.
    #[arg(long = "server-graceful-shutdown-seconds", value_name = "SECONDS")]
    pub server_graceful_shutdown_seconds: Option<u64>,

    /// Override the maximum request body size in bytes.
    #[arg(long = "server-max-body-bytes", value_name = "BYTES")]
    pub server_max_body_bytes: Option<u64>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Override the per-job deadline.
    #[arg(long = "dispatch-job-deadline-seconds", value_name = "SECONDS")]
    pub job_deadline_seconds: Option<u64>,

    /// Override the heartbeat target base URL.
    #[arg(long = "heartbeat-target", value_name = "URL")]
    pub heartbeat_target: Option<String>,

    /// Override the heartbeat interval.
    #[arg(long = "heartbeat-interval-seconds", value_name = "SECONDS")]
    pub heartbeat_interval_seconds: Option<u64>,
}

#[derive(Debug, Args, Clone)]
pub struct RenderArgs {
    #[command(flatten)]
    pub engine: EngineOverrides,

    /// Markup file to render.
    #[arg(value_name = "FILE", value_hint = ValueHint::FilePath)]
    pub file: PathBuf,

    /// Where to write the PDF; defaults to the job filename in the working directory.
    #[arg(long, short = 'o', value_name = "PATH", value_hint = ValueHint::FilePath)]
    pub output: Option<PathBuf>,

    /// Filename recorded on the job.
    #[arg(long, value_name = "NAME")]
    pub filename: Option<String>,
}
