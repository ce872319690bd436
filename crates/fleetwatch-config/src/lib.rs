//! Configuration for the fleetwatch monitor.
//!
//! A TOML file merged over built-in defaults, with `FLEETWATCH_*`
//! environment overrides on top, validated and translated into
//! `fleetwatch_core::MonitorConfig`.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::format::{Item, StrftimeItems};
use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use fleetwatch_core::{
    AddressRange, MonitorConfig, PollTarget, ServerConfig, StoreConfig, TransportConfig,
};

/// Prefix of environment overrides; nested keys are joined with `__`,
/// e.g. `FLEETWATCH_STORE__MAX_HISTORY=50`.
pub const ENV_PREFIX: &str = "FLEETWATCH_";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("config file not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

fn invalid(field: impl Into<String>, reason: impl Into<String>) -> ConfigError {
    ConfigError::Validation {
        field: field.into(),
        reason: reason.into(),
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerSection,

    /// Address blocks to watch.
    #[serde(default)]
    pub ranges: Vec<RangeSection>,

    #[serde(default)]
    pub store: StoreSection,

    #[serde(default)]
    pub watcher: WatcherSection,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ServerSection {
    /// Websocket listen address.
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Per-client outbound queue capacity.
    #[serde(default = "default_client_queue")]
    pub client_queue: usize,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            client_queue: default_client_queue(),
        }
    }
}

fn default_listen() -> String {
    "0.0.0.0:8080".into()
}
fn default_client_queue() -> usize {
    256
}

/// `<subnet>.<start..=end>`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct RangeSection {
    /// First three octets, e.g. `"10.0.0"`.
    pub subnet: String,
    pub start: u8,
    pub end: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct StoreSection {
    #[serde(default = "default_max_history")]
    pub max_history: usize,

    /// chrono strftime pattern.
    #[serde(default = "default_date_format")]
    pub date_format: String,
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            max_history: default_max_history(),
            date_format: default_date_format(),
        }
    }
}

fn default_max_history() -> usize {
    100
}
fn default_date_format() -> String {
    "%Y-%m-%d %H:%M:%S".into()
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct WatcherSection {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_path")]
    pub path: String,

    #[serde(default = "default_sequence_key")]
    pub sequence_key: String,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for WatcherSection {
    fn default() -> Self {
        Self {
            port: default_port(),
            path: default_path(),
            sequence_key: default_sequence_key(),
            connect_timeout_secs: default_connect_timeout(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

fn default_port() -> u16 {
    80
}
fn default_path() -> String {
    "status".into()
}
fn default_sequence_key() -> String {
    "seq".into()
}
fn default_connect_timeout() -> u64 {
    5
}
fn default_request_timeout() -> u64 {
    60
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("com", "fleetwatch", "fleetwatch").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("fleetwatch");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// The layered provider stack: defaults, then `path`, then environment.
pub fn figment(path: &Path) -> Figment {
    Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
}

/// Load and validate the configuration.
///
/// An explicit `path` must exist; the default location may be absent,
/// in which case defaults and environment apply.
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = match path {
        Some(path) if !path.exists() => {
            return Err(ConfigError::NotFound {
                path: path.to_path_buf(),
            });
        }
        Some(path) => path.to_path_buf(),
        None => config_path(),
    };

    let config: Config = figment(&path).extract()?;
    config.validate()?;
    Ok(config)
}

// ── Config saving ───────────────────────────────────────────────────

impl Config {
    /// Render as pretty TOML.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }
}

/// Serialize config to TOML and write it to `path`.
pub fn save_config(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, cfg.to_toml()?)?;
    Ok(())
}

// ── Validation ──────────────────────────────────────────────────────

impl Config {
    /// Check every field. The first problem found is returned.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.listen_addr()?;
        if self.server.client_queue == 0 {
            return Err(invalid("server.client_queue", "must be at least 1"));
        }

        if self.ranges.is_empty() {
            return Err(invalid("ranges", "at least one address range is required"));
        }
        for (i, range) in self.ranges.iter().enumerate() {
            validate_range(i, range)?;
        }

        if self.store.max_history == 0 {
            return Err(invalid("store.max_history", "must be at least 1"));
        }
        if StrftimeItems::new(&self.store.date_format).any(|item| matches!(item, Item::Error)) {
            return Err(invalid(
                "store.date_format",
                format!("'{}' is not a valid strftime pattern", self.store.date_format),
            ));
        }

        let watcher = &self.watcher;
        if watcher.port == 0 {
            return Err(invalid("watcher.port", "must not be 0"));
        }
        if !is_identifier(&watcher.sequence_key) {
            return Err(invalid(
                "watcher.sequence_key",
                format!("'{}' is not a valid identifier", watcher.sequence_key),
            ));
        }
        if watcher.connect_timeout_secs == 0 || watcher.request_timeout_secs == 0 {
            return Err(invalid("watcher", "timeouts must be greater than 0"));
        }
        if watcher.connect_timeout_secs > watcher.request_timeout_secs {
            return Err(invalid(
                "watcher.connect_timeout_secs",
                "must not exceed request_timeout_secs",
            ));
        }
        Ok(())
    }

    pub fn listen_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.server.listen.parse().map_err(|_| {
            invalid(
                "server.listen",
                format!("'{}' is not a socket address", self.server.listen),
            )
        })
    }

    /// Total number of device addresses across all ranges, duplicates included.
    pub fn device_count(&self) -> usize {
        self.ranges
            .iter()
            .map(|r| usize::from(r.end.saturating_sub(r.start)) + 1)
            .sum()
    }
}

fn validate_range(index: usize, range: &RangeSection) -> Result<(), ConfigError> {
    let field = format!("ranges[{index}]");
    let octets: Vec<&str> = range.subnet.trim_end_matches('.').split('.').collect();
    if octets.len() != 3 || !octets.iter().all(|o| o.parse::<u8>().is_ok()) {
        return Err(invalid(
            format!("{field}.subnet"),
            format!("'{}' is not three dotted octets", range.subnet),
        ));
    }
    if range.start > range.end {
        return Err(invalid(
            field,
            format!("start {} is after end {}", range.start, range.end),
        ));
    }
    Ok(())
}

fn is_identifier(key: &str) -> bool {
    let mut chars = key.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_' || c == '$')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

// ── Translation ─────────────────────────────────────────────────────

impl Config {
    /// Validate and build the runtime configuration.
    pub fn to_monitor_config(&self) -> Result<MonitorConfig, ConfigError> {
        self.validate()?;
        Ok(MonitorConfig {
            ranges: self
                .ranges
                .iter()
                .map(|r| AddressRange::new(r.subnet.clone(), r.start, r.end))
                .collect(),
            store: StoreConfig {
                max_history: self.store.max_history,
                date_format: self.store.date_format.clone(),
            },
            target: PollTarget {
                port: self.watcher.port,
                path: self.watcher.path.clone(),
                sequence_key: self.watcher.sequence_key.clone(),
            },
            transport: TransportConfig {
                connect_timeout: Duration::from_secs(self.watcher.connect_timeout_secs),
                timeout: Duration::from_secs(self.watcher.request_timeout_secs),
            },
            server: ServerConfig {
                listen: self.listen_addr()?,
                client_queue: self.server.client_queue,
            },
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use figment::Jail;
    use pretty_assertions::assert_eq;

    const SAMPLE: &str = r#"
[server]
listen = "127.0.0.1:9000"

[[ranges]]
subnet = "10.0.0"
start = 1
end = 20

[[ranges]]
subnet = "10.0.1"
start = 5
end = 5

[store]
max_history = 25

[watcher]
port = 8081
path = "api/live"
"#;

    fn valid() -> Config {
        Config {
            ranges: vec![RangeSection {
                subnet: "10.0.0".into(),
                start: 1,
                end: 10,
            }],
            ..Config::default()
        }
    }

    // Loading reads the process environment, so every test that loads
    // runs inside a `Jail`; jails are serialized.

    #[test]
    fn loads_file_over_defaults() {
        Jail::expect_with(|jail| {
            jail.create_file("config.toml", SAMPLE)?;

            let config = load_config(Some(Path::new("config.toml"))).map_err(|e| e.to_string())?;

            assert_eq!(config.server.listen, "127.0.0.1:9000");
            assert_eq!(config.server.client_queue, 256);
            assert_eq!(config.ranges.len(), 2);
            assert_eq!(config.store.max_history, 25);
            assert_eq!(config.store.date_format, "%Y-%m-%d %H:%M:%S");
            assert_eq!(config.watcher.sequence_key, "seq");
            assert_eq!(config.device_count(), 21);
            Ok(())
        });
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_config(Some(&dir.path().join("nope.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound { .. }));
    }

    #[test]
    fn environment_overrides_file() {
        Jail::expect_with(|jail| {
            jail.create_file("config.toml", SAMPLE)?;
            jail.set_env("FLEETWATCH_STORE__MAX_HISTORY", "7");
            jail.set_env("FLEETWATCH_WATCHER__SEQUENCE_KEY", "rev");

            let config = load_config(Some(Path::new("config.toml"))).map_err(|e| e.to_string())?;
            assert_eq!(config.store.max_history, 7);
            assert_eq!(config.watcher.sequence_key, "rev");
            assert_eq!(config.watcher.port, 8081);
            Ok(())
        });
    }

    #[test]
    fn invalid_environment_value_fails_validation() {
        Jail::expect_with(|jail| {
            jail.create_file("config.toml", SAMPLE)?;
            jail.set_env("FLEETWATCH_STORE__MAX_HISTORY", "0");

            let err = load_config(Some(Path::new("config.toml"))).unwrap_err();
            assert!(matches!(err, ConfigError::Validation { ref field, .. } if field == "store.max_history"));
            Ok(())
        });
    }

    #[test]
    fn translates_to_monitor_config() {
        Jail::expect_with(|jail| {
            jail.create_file("config.toml", SAMPLE)?;

            let monitor = load_config(Some(Path::new("config.toml")))
                .and_then(|c| c.to_monitor_config())
                .map_err(|e| e.to_string())?;

            assert_eq!(monitor.ranges[1], AddressRange::new("10.0.1", 5, 5));
            assert_eq!(monitor.server.listen, "127.0.0.1:9000".parse().unwrap());
            assert_eq!(monitor.target.path, "api/live");
            assert_eq!(monitor.transport.timeout, Duration::from_secs(60));
            assert!(monitor.validate().is_ok());
            Ok(())
        });
    }

    fn case(field: &'static str, mutate: fn(&mut Config)) -> (&'static str, fn(&mut Config)) {
        (field, mutate)
    }

    #[test]
    fn rejects_invalid_fields() {
        let cases = [
            case("ranges", |c| c.ranges.clear()),
            case("ranges[0].subnet", |c| c.ranges[0].subnet = "10.0".into()),
            case("ranges[0].subnet", |c| c.ranges[0].subnet = "10.0.x".into()),
            case("ranges[0]", |c| c.ranges[0].start = 200),
            case("store.max_history", |c| c.store.max_history = 0),
            case("store.date_format", |c| c.store.date_format = "%Q".into()),
            case("watcher.port", |c| c.watcher.port = 0),
            case("watcher.sequence_key", |c| c.watcher.sequence_key = "1x".into()),
            case("watcher.sequence_key", |c| c.watcher.sequence_key = String::new()),
            case("watcher", |c| c.watcher.request_timeout_secs = 0),
            case("watcher.connect_timeout_secs", |c| {
                c.watcher.connect_timeout_secs = 90;
            }),
            case("server.listen", |c| c.server.listen = "localhost".into()),
            case("server.client_queue", |c| c.server.client_queue = 0),
        ];

        assert!(valid().validate().is_ok());
        for (expected, mutate) in cases {
            let mut config = valid();
            mutate(&mut config);
            match config.validate() {
                Err(ConfigError::Validation { field, .. }) => assert_eq!(field, expected),
                other => panic!("{expected}: expected validation error, got {other:?}"),
            }
        }
    }

    #[test]
    fn saved_config_loads_back() {
        Jail::expect_with(|_| {
            let path = Path::new("nested").join("config.toml");
            let config = valid();

            save_config(&config, &path).map_err(|e| e.to_string())?;

            let loaded = load_config(Some(&path)).map_err(|e| e.to_string())?;
            assert_eq!(loaded, config);
            Ok(())
        });
    }
}
