//! Configuration loading for home-mcp.
//!
//! The config file path is resolved from three fallback sources (tried in order):
//!
//! 1. `--config <path>` CLI flag
//! 2. `HOME_MCP_CONFIG` environment variable
//! 3. `/app/config.json` (the path used inside the container image)
//!
//! The file is JSON:
//!
//! ```json
//! {
//!   "servers": {
//!     "burger": {
//!       "netdata_url": "http://10.0.0.10:19999",
//!       "role": "docker host",
//!       "description": "Main services box",
//!       "hardware_notes": "Ryzen 5, 32 GB"
//!     }
//!   },
//!   "mikrotik": {
//!     "enabled": true,
//!     "model": "RB5009",
//!     "host": "10.0.0.1",
//!     "port": 8728,
//!     "username": "monitor",
//!     "password": "secret"
//!   },
//!   "dozzle": {
//!     "enabled": true,
//!     "url": "http://10.0.0.10:8080",
//!     "description": "Dozzle master watching every docker host"
//!   },
//!   "limits": { "request_timeout_secs": 5, "max_concurrency": 8 },
//!   "logging": { "level": "info" }
//! }
//! ```
//!
//! Server order in the file is preserved and drives the order of every
//! fleet-wide response. The configuration is loaded once at startup and is
//! never mutated afterwards.

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use indexmap::IndexMap;
use serde::Deserialize;

pub const DEFAULT_CONFIG_PATH: &str = "/app/config.json";
pub const CONFIG_ENV_VAR: &str = "HOME_MCP_CONFIG";

/// Plain RouterOS API port.
pub const ROUTER_API_PORT: u16 = 8728;
/// TLS RouterOS API port (`api-ssl`).
pub const ROUTER_API_SSL_PORT: u16 = 8729;

/// CLI arguments parsed by `clap`.
#[derive(Parser, Debug, Default)]
#[command(
    name = "home-mcp",
    about = "MCP server for Netdata fleet health, MikroTik router state and Dozzle logs"
)]
pub struct Cli {
    /// Path to config file (JSON)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Override the per-request HTTP timeout, in seconds
    #[arg(long)]
    pub timeout_secs: Option<u64>,

    /// Override the fleet fan-out concurrency bound
    #[arg(long)]
    pub max_concurrency: Option<usize>,
}

/// Errors raised while loading or validating the config file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Raw JSON config file structure.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    #[serde(default)]
    pub servers: IndexMap<String, ServerEntry>,
    pub mikrotik: Option<RouterConfig>,
    pub dozzle: Option<DozzleConfig>,
    #[serde(default)]
    pub limits: Limits,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// A single Netdata-monitored server as written in the config file.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerEntry {
    pub netdata_url: String,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub description: String,
    pub hardware_notes: Option<String>,
}

/// A configured server, keyed by its unique name.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub name: String,
    pub netdata_url: String,
    pub role: String,
    pub description: String,
    pub hardware_notes: Option<String>,
}

impl ServerConfig {
    fn from_entry(name: String, entry: ServerEntry) -> Self {
        Self {
            name,
            netdata_url: entry.netdata_url.trim_end_matches('/').to_string(),
            role: entry.role,
            description: entry.description,
            hardware_notes: entry.hardware_notes,
        }
    }

    /// Human-readable context line: `"<description> (<role>)"`.
    pub fn context(&self) -> String {
        let role = if self.role.is_empty() {
            "unknown role"
        } else {
            &self.role
        };
        format!("{} ({})", self.description, role)
    }
}

/// MikroTik router connection settings. Absent or disabled turns off all
/// router tools.
#[derive(Clone, Deserialize)]
pub struct RouterConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub host: String,
    #[serde(default = "default_router_port")]
    pub port: u16,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub description: String,
    /// Force TLS regardless of port. Port 8729 always uses TLS.
    #[serde(default)]
    pub tls: bool,
    /// Verify the router's certificate against the system roots.
    #[serde(default)]
    pub tls_verify: bool,
}

impl RouterConfig {
    pub fn use_tls(&self) -> bool {
        self.tls || self.port == ROUTER_API_SSL_PORT
    }
}

impl std::fmt::Debug for RouterConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouterConfig")
            .field("enabled", &self.enabled)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("model", &self.model)
            .field("description", &self.description)
            .field("tls", &self.tls)
            .field("tls_verify", &self.tls_verify)
            .finish()
    }
}

/// Dozzle log viewer settings. Absent or disabled turns off the log tools.
#[derive(Debug, Clone, Deserialize)]
pub struct DozzleConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Base URL of the Dozzle master instance.
    #[serde(default)]
    pub url: String,
    /// Free text echoed in every Dozzle tool response.
    #[serde(default)]
    pub description: String,
}

/// Timeouts and fan-out bound.
#[derive(Debug, Clone, Deserialize)]
pub struct Limits {
    /// Timeout for a single Netdata HTTP request (default 5s).
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Ceiling for one server's whole slot in a fleet query (default 10s).
    #[serde(default = "default_server_timeout_secs")]
    pub server_timeout_secs: u64,
    /// Maximum servers queried at once. `None` means all of them.
    pub max_concurrency: Option<usize>,
    /// Timeout for connecting to and each command sent to the router (default 10s).
    #[serde(default = "default_router_timeout_secs")]
    pub router_timeout_secs: u64,
    /// Timeout for one Dozzle call, including waiting on its event stream (default 10s).
    #[serde(default = "default_dozzle_timeout_secs")]
    pub dozzle_timeout_secs: u64,
}

impl Limits {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn server_timeout(&self) -> Duration {
        Duration::from_secs(self.server_timeout_secs)
    }

    pub fn router_timeout(&self) -> Duration {
        Duration::from_secs(self.router_timeout_secs)
    }

    pub fn dozzle_timeout(&self) -> Duration {
        Duration::from_secs(self.dozzle_timeout_secs)
    }
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            request_timeout_secs: default_request_timeout_secs(),
            server_timeout_secs: default_server_timeout_secs(),
            max_concurrency: None,
            router_timeout_secs: default_router_timeout_secs(),
            dozzle_timeout_secs: default_dozzle_timeout_secs(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// tracing filter level (default `info`). Overridden by `RUST_LOG` env var.
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_router_port() -> u16 {
    ROUTER_API_PORT
}
fn default_request_timeout_secs() -> u64 {
    5
}
fn default_server_timeout_secs() -> u64 {
    10
}
fn default_router_timeout_secs() -> u64 {
    10
}
fn default_dozzle_timeout_secs() -> u64 {
    10
}
fn default_log_level() -> String {
    "info".to_string()
}

/// Validated configuration ready for use by the server registry.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub servers: Vec<ServerConfig>,
    /// `Some` only when the router section is present and enabled.
    pub router: Option<RouterConfig>,
    /// `Some` only when the Dozzle section is present and enabled.
    pub dozzle: Option<DozzleConfig>,
    pub limits: Limits,
    pub logging: LoggingConfig,
    pub source: PathBuf,
}

/// Resolve the config path from CLI args or env vars, then load it.
pub fn load_config(cli: &Cli) -> Result<ResolvedConfig, ConfigError> {
    let path = if let Some(path) = &cli.config {
        expand_tilde(path)
    } else if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        expand_tilde(&PathBuf::from(path))
    } else {
        PathBuf::from(DEFAULT_CONFIG_PATH)
    };

    let mut resolved = load_from_file(&path)?;
    if let Some(secs) = cli.timeout_secs {
        resolved.limits.request_timeout_secs = secs;
    }
    if let Some(n) = cli.max_concurrency {
        resolved.limits.max_concurrency = Some(n);
    }
    validate_limits(&resolved.limits)?;
    Ok(resolved)
}

/// Expand a leading `~` to `$HOME`.
fn expand_tilde(path: &Path) -> PathBuf {
    let s = path.to_string_lossy();
    if let Some(rest) = s.strip_prefix("~/") {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join(rest);
        }
    }
    path.to_path_buf()
}

pub fn load_from_file(path: &Path) -> Result<ResolvedConfig, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_config(&contents, path)
}

/// Parse and validate config file contents. `path` is only used for messages.
pub fn parse_config(contents: &str, path: &Path) -> Result<ResolvedConfig, ConfigError> {
    let config: GatewayConfig =
        serde_json::from_str(contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

    for (name, entry) in &config.servers {
        if name.trim().is_empty() {
            return Err(ConfigError::Invalid("server with empty name".into()));
        }
        validate_url(&format!("server '{name}' netdata_url"), &entry.netdata_url)?;
    }

    let router = match config.mikrotik {
        Some(router) if router.enabled => {
            if router.host.is_empty() {
                return Err(ConfigError::Invalid("mikrotik.host is empty".into()));
            }
            if router.username.is_empty() {
                return Err(ConfigError::Invalid("mikrotik.username is empty".into()));
            }
            Some(router)
        }
        _ => None,
    };

    let dozzle = match config.dozzle {
        Some(dozzle) if dozzle.enabled => {
            validate_url("dozzle.url", &dozzle.url)?;
            Some(DozzleConfig {
                url: dozzle.url.trim_end_matches('/').to_string(),
                ..dozzle
            })
        }
        _ => None,
    };

    validate_limits(&config.limits)?;

    let servers = config
        .servers
        .into_iter()
        .map(|(name, entry)| ServerConfig::from_entry(name, entry))
        .collect();

    Ok(ResolvedConfig {
        servers,
        router,
        dozzle,
        limits: config.limits,
        logging: config.logging,
        source: path.to_path_buf(),
    })
}

/// `field` names the setting in messages, e.g. `dozzle.url`.
fn validate_url(field: &str, url: &str) -> Result<(), ConfigError> {
    if url.is_empty() {
        return Err(ConfigError::Invalid(format!("{field} is empty")));
    }
    let parsed = reqwest::Url::parse(url)
        .map_err(|e| ConfigError::Invalid(format!("{field} is not a valid URL: {e}")))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ConfigError::Invalid(format!(
            "{field} must be http or https, got '{}'",
            parsed.scheme()
        )));
    }
    Ok(())
}

fn validate_limits(limits: &Limits) -> Result<(), ConfigError> {
    if limits.request_timeout_secs == 0 || limits.server_timeout_secs == 0 {
        return Err(ConfigError::Invalid("timeouts must be at least 1 second".into()));
    }
    if limits.router_timeout_secs == 0 || limits.dozzle_timeout_secs == 0 {
        return Err(ConfigError::Invalid(
            "router and dozzle timeouts must be at least 1 second".into(),
        ));
    }
    if limits.max_concurrency == Some(0) {
        return Err(ConfigError::Invalid("max_concurrency must be positive".into()));
    }
    Ok(())
}
