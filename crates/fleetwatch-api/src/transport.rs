// Shared transport configuration for building the reqwest::Client used
// by every watcher.
//
// One client is shared across the whole fleet so connections are pooled.
// Retries are never done here: a failed request is reported once and the
// watcher's own state machine decides when to try again.

use std::time::Duration;

use crate::error::Error;

const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// Timeouts applied to every device poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportConfig {
    /// Upper bound on establishing the TCP connection.
    pub connect_timeout: Duration,
    /// Upper bound on the whole request, including the long-poll wait.
    pub timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            timeout: Duration::from_secs(60),
        }
    }
}

impl TransportConfig {
    /// Build a `reqwest::Client` from this config.
    pub fn build_client(&self) -> Result<reqwest::Client, Error> {
        reqwest::Client::builder()
            .connect_timeout(self.connect_timeout)
            .timeout(self.timeout)
            .user_agent(USER_AGENT)
            // devices sit on the local network; never route them via a proxy
            .no_proxy()
            .build()
            .map_err(|e| Error::Client(e.to_string()))
    }
}
