//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{
    net::SocketAddr,
    num::{NonZeroU32, NonZeroU64},
    path::PathBuf,
    str::FromStr,
    time::Duration,
};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use url::Url;

use crate::{
    application::render::{
        CaptureOptions, DEFAULT_IMAGE_MAX_WIDTH, ImageTransform, LaunchOptions, LoadPolicy,
        LocalEngineConfig, PaperFormat,
    },
    domain::target::{ExecutionTarget, LOCAL_TARGET_NAME, PeerTarget},
};

mod cli;

pub use cli::{CliArgs, Command, EngineOverrides, RenderArgs, ServeArgs, ServeOverrides};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "printrelay";
const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 30;
const DEFAULT_MAX_BODY_BYTES: u64 = 100 * 1024 * 1024;
const DEFAULT_NAVIGATION_TIMEOUT_SECS: u64 = 120;
const DEFAULT_CAPTURE_TIMEOUT_SECS: u64 = 120;
const DEFAULT_ENGINE_SHUTDOWN_TIMEOUT_SECS: u64 = 10;
const DEFAULT_MAX_CONCURRENT_PAGES: u32 = 4;
const DEFAULT_JOB_DEADLINE_SECS: u64 = 300;
const DEFAULT_HEARTBEAT_INTERVAL_SECS: u64 = 600;

/// Flags the deployed engine has always been launched with.
pub const DEFAULT_ENGINE_ARGS: &[&str] = &[
    "--no-sandbox",
    "--disable-setuid-sandbox",
    "--disable-dev-shm-usage",
    "--disable-gpu",
    "--disable-features=IsolateOrigins,site-per-process",
    "--disable-breakpad",
    "--font-render-hinting=medium",
];

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub engine: EngineSettings,
    pub dispatch: DispatchSettings,
    pub peers: PeerSettings,
    pub heartbeat: HeartbeatSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: SocketAddr,
    pub graceful_shutdown: Duration,
    pub max_body_bytes: NonZeroU64,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub executable: Option<PathBuf>,
    pub headless: bool,
    pub args: Vec<String>,
    pub navigation_timeout: Duration,
    pub capture_timeout: Duration,
    pub shutdown_timeout: Duration,
    pub max_concurrent_pages: NonZeroU32,
    pub load_policy: LoadPolicy,
    pub paper_format: PaperFormat,
    pub image_max_width: String,
}

#[derive(Debug, Clone)]
pub struct DispatchSettings {
    pub include_local: bool,
    pub job_deadline: Duration,
}

#[derive(Debug, Clone)]
pub struct PeerSettings {
    pub targets: Vec<PeerTarget>,
    pub request_timeout: Option<Duration>,
}

#[derive(Debug, Clone)]
pub struct HeartbeatSettings {
    /// Base URL of the service to ping; `None` disables the heartbeat.
    pub target: Option<Url>,
    pub interval: Duration,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

impl Settings {
    /// Ordered dispatch targets: the local engine first when enabled, then peers
    /// in configuration order.
    pub fn targets(&self) -> Vec<ExecutionTarget> {
        let local = self
            .dispatch
            .include_local
            .then_some(ExecutionTarget::Local);
        local
            .into_iter()
            .chain(self.peers.targets.iter().cloned().map(ExecutionTarget::Remote))
            .collect()
    }
}

impl From<&EngineSettings> for LocalEngineConfig {
    fn from(engine: &EngineSettings) -> Self {
        LocalEngineConfig {
            launch: LaunchOptions {
                executable: engine.executable.clone(),
                headless: engine.headless,
                args: engine.args.clone(),
            },
            navigation_timeout: engine.navigation_timeout,
            capture_timeout: engine.capture_timeout,
            max_concurrent_pages: engine.max_concurrent_pages.get() as usize,
            load_policy: engine.load_policy,
            capture: CaptureOptions {
                paper: engine.paper_format,
                ..CaptureOptions::default()
            },
            transform: ImageTransform::new(engine.image_max_width.clone()),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(
        Environment::with_prefix("PRINTRELAY")
            .separator("__")
            .list_separator(",")
            .with_list_parse_key("engine.args")
            .try_parsing(true),
    );

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        Some(Command::Render(args)) => raw.apply_engine_overrides(&args.engine),
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    engine: RawEngineSettings,
    dispatch: RawDispatchSettings,
    peers: RawPeerSettings,
    heartbeat: RawHeartbeatSettings,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.server_port {
            self.server.port = Some(port);
        }
        if let Some(seconds) = overrides.server_graceful_shutdown_seconds {
            self.server.graceful_shutdown_seconds = Some(seconds);
        }
        if let Some(limit) = overrides.server_max_body_bytes {
            self.server.max_body_bytes = Some(limit);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(seconds) = overrides.job_deadline_seconds {
            self.dispatch.job_deadline_seconds = Some(seconds);
        }
        if let Some(target) = overrides.heartbeat_target.as_ref() {
            self.heartbeat.target = Some(target.clone());
        }
        if let Some(seconds) = overrides.heartbeat_interval_seconds {
            self.heartbeat.interval_seconds = Some(seconds);
        }

        self.apply_engine_overrides(&overrides.engine);
    }

    fn apply_engine_overrides(&mut self, overrides: &EngineOverrides) {
        if let Some(path) = overrides.executable.as_ref() {
            self.engine.executable = Some(path.clone());
        }
        if let Some(headless) = overrides.headless {
            self.engine.headless = Some(headless);
        }
        if let Some(pages) = overrides.max_concurrent_pages {
            self.engine.max_concurrent_pages = Some(u64::from(pages));
        }
        if let Some(policy) = overrides.load_policy.as_ref() {
            self.engine.load_policy = Some(policy.clone());
        }
        if let Some(include) = overrides.include_local {
            self.dispatch.include_local = Some(include);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            engine,
            dispatch,
            peers,
            heartbeat,
        } = raw;

        let server = build_server_settings(server)?;
        let logging = build_logging_settings(logging)?;
        let engine = build_engine_settings(engine)?;
        let dispatch = build_dispatch_settings(dispatch)?;
        let peers = build_peer_settings(peers)?;
        let heartbeat = build_heartbeat_settings(heartbeat)?;

        if !dispatch.include_local && peers.targets.is_empty() {
            return Err(LoadError::invalid(
                "peers.targets",
                "no render targets: enable dispatch.include_local or configure at least one peer",
            ));
        }

        Ok(Self {
            server,
            logging,
            engine,
            dispatch,
            peers,
            heartbeat,
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());

    let port = server.port.unwrap_or(DEFAULT_PORT);
    if port == 0 {
        return Err(LoadError::invalid(
            "server.port",
            "port must be greater than zero",
        ));
    }

    let addr =
        parse_socket_addr(&host, port).map_err(|reason| LoadError::invalid("server.addr", reason))?;

    let graceful_secs = server
        .graceful_shutdown_seconds
        .unwrap_or(DEFAULT_GRACEFUL_SHUTDOWN_SECS);
    let graceful_shutdown = non_zero_secs(graceful_secs, "server.graceful_shutdown_seconds")?;

    let max_body_bytes = NonZeroU64::new(server.max_body_bytes.unwrap_or(DEFAULT_MAX_BODY_BYTES))
        .ok_or_else(|| LoadError::invalid("server.max_body_bytes", "must be greater than zero"))?;

    Ok(ServerSettings {
        addr,
        graceful_shutdown,
        max_body_bytes,
    })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_engine_settings(engine: RawEngineSettings) -> Result<EngineSettings, LoadError> {
    let executable = engine
        .executable
        .filter(|path| !path.as_os_str().is_empty());

    let args = match engine.args {
        Some(args) => args
            .into_iter()
            .map(|arg| arg.trim().to_string())
            .filter(|arg| !arg.is_empty())
            .collect(),
        None => DEFAULT_ENGINE_ARGS.iter().map(|arg| arg.to_string()).collect(),
    };

    let navigation_timeout = non_zero_secs(
        engine
            .navigation_timeout_seconds
            .unwrap_or(DEFAULT_NAVIGATION_TIMEOUT_SECS),
        "engine.navigation_timeout_seconds",
    )?;
    let capture_timeout = non_zero_secs(
        engine
            .capture_timeout_seconds
            .unwrap_or(DEFAULT_CAPTURE_TIMEOUT_SECS),
        "engine.capture_timeout_seconds",
    )?;
    let shutdown_timeout = non_zero_secs(
        engine
            .shutdown_timeout_seconds
            .unwrap_or(DEFAULT_ENGINE_SHUTDOWN_TIMEOUT_SECS),
        "engine.shutdown_timeout_seconds",
    )?;

    let max_concurrent_pages = non_zero_u32(
        engine
            .max_concurrent_pages
            .unwrap_or(u64::from(DEFAULT_MAX_CONCURRENT_PAGES)),
        "engine.max_concurrent_pages",
    )?;

    let load_policy = match engine.load_policy {
        Some(value) => LoadPolicy::from_str(&value)
            .map_err(|reason| LoadError::invalid("engine.load_policy", reason))?,
        None => LoadPolicy::default(),
    };

    let paper_format = match engine.paper_format {
        Some(value) => PaperFormat::from_str(&value)
            .map_err(|reason| LoadError::invalid("engine.paper_format", reason))?,
        None => PaperFormat::default(),
    };

    let image_max_width = engine
        .image_max_width
        .map(|value| value.trim().to_string())
        .unwrap_or_else(|| DEFAULT_IMAGE_MAX_WIDTH.to_string());
    if image_max_width.is_empty() || image_max_width.contains([';', '"']) {
        return Err(LoadError::invalid(
            "engine.image_max_width",
            "must be a single CSS length such as `800px`",
        ));
    }

    Ok(EngineSettings {
        executable,
        headless: engine.headless.unwrap_or(true),
        args,
        navigation_timeout,
        capture_timeout,
        shutdown_timeout,
        max_concurrent_pages,
        load_policy,
        paper_format,
        image_max_width,
    })
}

fn build_dispatch_settings(dispatch: RawDispatchSettings) -> Result<DispatchSettings, LoadError> {
    let job_deadline = non_zero_secs(
        dispatch
            .job_deadline_seconds
            .unwrap_or(DEFAULT_JOB_DEADLINE_SECS),
        "dispatch.job_deadline_seconds",
    )?;

    Ok(DispatchSettings {
        include_local: dispatch.include_local.unwrap_or(true),
        job_deadline,
    })
}

fn build_peer_settings(peers: RawPeerSettings) -> Result<PeerSettings, LoadError> {
    let mut targets = Vec::with_capacity(peers.targets.len());
    for (index, raw) in peers.targets.into_iter().enumerate() {
        let address = Url::parse(raw.address.trim()).map_err(|err| {
            LoadError::invalid(
                "peers.targets",
                format!("peer #{index} has an invalid address: {err}"),
            )
        })?;
        if !matches!(address.scheme(), "http" | "https") {
            return Err(LoadError::invalid(
                "peers.targets",
                format!("peer #{index} must use http or https"),
            ));
        }

        let name = raw
            .name
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| address.host_str().unwrap_or("peer").to_string());
        if name == LOCAL_TARGET_NAME {
            return Err(LoadError::invalid(
                "peers.targets",
                format!("peer name `{LOCAL_TARGET_NAME}` is reserved for the local engine"),
            ));
        }
        if targets.iter().any(|existing: &PeerTarget| existing.name == name) {
            return Err(LoadError::invalid(
                "peers.targets",
                format!("duplicate peer name `{name}`"),
            ));
        }

        targets.push(PeerTarget::new(name, address));
    }

    let request_timeout = peers
        .request_timeout_seconds
        .map(|secs| non_zero_secs(secs, "peers.request_timeout_seconds"))
        .transpose()?;

    Ok(PeerSettings {
        targets,
        request_timeout,
    })
}

fn build_heartbeat_settings(
    heartbeat: RawHeartbeatSettings,
) -> Result<HeartbeatSettings, LoadError> {
    let target = heartbeat
        .target
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .map(|value| {
            Url::parse(&value).map_err(|err| {
                LoadError::invalid("heartbeat.target", format!("invalid URL: {err}"))
            })
        })
        .transpose()?;

    let interval = non_zero_secs(
        heartbeat
            .interval_seconds
            .unwrap_or(DEFAULT_HEARTBEAT_INTERVAL_SECS),
        "heartbeat.interval_seconds",
    )?;

    Ok(HeartbeatSettings { target, interval })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
    graceful_shutdown_seconds: Option<u64>,
    max_body_bytes: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawEngineSettings {
    executable: Option<PathBuf>,
    headless: Option<bool>,
    args: Option<Vec<String>>,
    navigation_timeout_seconds: Option<u64>,
    capture_timeout_seconds: Option<u64>,
    shutdown_timeout_seconds: Option<u64>,
    max_concurrent_pages: Option<u64>,
    load_policy: Option<String>,
    paper_format: Option<String>,
    image_max_width: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawDispatchSettings {
    include_local: Option<bool>,
    job_deadline_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawPeerSettings {
    targets: Vec<RawPeerTarget>,
    request_timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawPeerTarget {
    #[serde(default)]
    name: Option<String>,
    address: String,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawHeartbeatSettings {
    target: Option<String>,
    interval_seconds: Option<u64>,
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

fn non_zero_u32(value: u64, key: &'static str) -> Result<NonZeroU32, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    let value_u32: u32 = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for u32"))?;
    NonZeroU32::new(value_u32).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}

fn non_zero_secs(value: u64, key: &'static str) -> Result<Duration, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    Ok(Duration::from_secs(value))
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[cfg(test)]
mod tests;
