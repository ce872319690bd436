//! CLI error types with miette diagnostics.
//!
//! Maps `ConfigError` and `CoreError` into user-facing errors with help text.

use std::net::SocketAddr;

use miette::Diagnostic;
use thiserror::Error;

use fleetwatch_config::ConfigError;
use fleetwatch_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const CONFIG: i32 = 3;
    pub const BIND: i32 = 4;
    pub const TRANSPORT: i32 = 5;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Configuration ────────────────────────────────────────────────

    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(
        code(fleetwatch::validation),
        help("Fix the value in the config file or the matching FLEETWATCH_* variable.")
    )]
    Validation { field: String, reason: String },

    #[error("Configuration file not found: {path}")]
    #[diagnostic(
        code(fleetwatch::no_config),
        help(
            "Pass an existing file with --config, or create one at the default location.\n\
             Run: fleetwatch config path"
        )
    )]
    NoConfig { path: String },

    #[error(transparent)]
    #[diagnostic(code(fleetwatch::config))]
    Config(Box<figment::Error>),

    // ── Serving ──────────────────────────────────────────────────────

    #[error("Could not listen on {addr}")]
    #[diagnostic(
        code(fleetwatch::bind),
        help("Is another process using the port? Choose another with --listen.")
    )]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("Device transport setup failed")]
    #[diagnostic(code(fleetwatch::transport))]
    Transport {
        #[source]
        source: CoreError,
    },

    #[error("Internal error: {message}")]
    #[diagnostic(code(fleetwatch::internal))]
    Internal { message: String },

    // ── IO ────────────────────────────────────────────────────────────

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for CliError {
    fn from(err: figment::Error) -> Self {
        Self::Config(Box::new(err))
    }
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Validation { .. } => exit_code::USAGE,
            Self::NoConfig { .. } | Self::Config(_) => exit_code::CONFIG,
            Self::Bind { .. } => exit_code::BIND,
            Self::Transport { .. } => exit_code::TRANSPORT,
            _ => exit_code::GENERAL,
        }
    }
}

// ── ConfigError → CliError mapping ───────────────────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Validation { field, reason } => Self::Validation { field, reason },
            ConfigError::NotFound { path } => Self::NoConfig {
                path: path.display().to_string(),
            },
            ConfigError::Figment(e) => Self::Config(e),
            ConfigError::Serialization(e) => Self::Internal {
                message: e.to_string(),
            },
            ConfigError::Io(e) => Self::Io(e),
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Config { message } => Self::Validation {
                field: "config".into(),
                reason: message,
            },
            CoreError::Bind { addr, source } => Self::Bind { addr, source },
            err @ CoreError::Transport(_) => Self::Transport { source: err },
            CoreError::Io(e) => Self::Io(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_by_category() {
        let validation: CliError = ConfigError::Validation {
            field: "store.max_history".into(),
            reason: "must be at least 1".into(),
        }
        .into();
        assert_eq!(validation.exit_code(), exit_code::USAGE);

        let missing: CliError = ConfigError::NotFound {
            path: "/nope/config.toml".into(),
        }
        .into();
        assert_eq!(missing.exit_code(), exit_code::CONFIG);

        let bind: CliError = CoreError::Bind {
            addr: SocketAddr::from(([127, 0, 0, 1], 80)),
            source: std::io::Error::from(std::io::ErrorKind::AddrInUse),
        }
        .into();
        assert_eq!(bind.exit_code(), exit_code::BIND);

        let io: CliError = CoreError::Io(std::io::ErrorKind::BrokenPipe.into()).into();
        assert_eq!(io.exit_code(), exit_code::GENERAL);
    }
}
