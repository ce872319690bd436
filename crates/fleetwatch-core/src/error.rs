// ── Core error types ──
//
// Errors surfaced by fleetwatch-core to the process that embeds it.
// Per-device poll failures never show up here: watchers absorb them
// into their own state machine.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Transport setup ──────────────────────────────────────────────
    #[error("Device transport error: {0}")]
    Transport(#[from] fleetwatch_api::Error),

    // ── Serving ──────────────────────────────────────────────────────
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: std::net::SocketAddr,
        source: std::io::Error,
    },

    #[error("Server I/O error: {0}")]
    Io(#[from] std::io::Error),
}
