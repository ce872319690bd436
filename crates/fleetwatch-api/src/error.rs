use thiserror::Error;

/// Top-level error type for the `fleetwatch-api` crate.
///
/// Every way a single poll can fail ends up here. The watcher treats
/// all of them the same way (a failed cycle), but the variants are kept
/// apart so logs say what actually went wrong.
#[derive(Debug, Error)]
pub enum Error {
    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, timeout, reset, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The device answered with a non-success HTTP status.
    #[error("device replied with HTTP {status}")]
    Status { status: u16 },

    /// URL construction failed (bad host or path).
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// The shared HTTP client could not be built.
    #[error("failed to build HTTP client: {0}")]
    Client(String),

    // ── Data ────────────────────────────────────────────────────────
    /// The body did not match the `display(<object-literal>)` grammar.
    #[error("malformed telemetry: {0}")]
    Format(#[from] FormatError),
}

impl Error {
    /// Returns `true` if the device answered but the body was unusable.
    pub fn is_format(&self) -> bool {
        matches!(self, Self::Format(_))
    }

    /// Returns `true` for connection-level failures (refused, timed out).
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect(),
            Self::Status { status } => *status >= 500,
            _ => false,
        }
    }
}

/// Grammar violations found while decoding a telemetry envelope.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormatError {
    #[error("missing `display(...)` envelope")]
    MissingEnvelope,

    #[error("unexpected character {found:?} at offset {offset}, expected {expected}")]
    Unexpected {
        found: char,
        offset: usize,
        expected: &'static str,
    },

    #[error("unexpected end of input, expected {expected}")]
    UnexpectedEnd { expected: &'static str },

    #[error("unterminated string starting at offset {offset}")]
    UnterminatedString { offset: usize },

    #[error("invalid escape sequence at offset {offset}")]
    InvalidEscape { offset: usize },

    #[error("value for key {key:?} is not a scalar")]
    NestedValue { key: String },

    #[error("required key {key:?} is missing")]
    MissingSequenceKey { key: String },
}
