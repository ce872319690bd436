// Single-device poll request.
//
// `GET http://<host>:<port>/<path>?<sequence_key>=<sequence>` and decode
// the `display(...)` body. One call is one attempt; the caller owns
// scheduling, retries, and cancellation.

use tracing::trace;
use url::Url;

use crate::display::{Telemetry, parse_display};
use crate::error::Error;
use crate::transport::TransportConfig;

/// Where and how each device is polled. Shared by the whole fleet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollTarget {
    pub port: u16,
    /// Request path, with or without a leading `/`.
    pub path: String,
    /// Query parameter that carries the long-poll sequence token. The
    /// device must echo it back in its payload.
    pub sequence_key: String,
}

/// Thin HTTP client for device telemetry polls.
///
/// Cheaply cloneable: the inner `reqwest::Client` is reference counted.
#[derive(Debug, Clone)]
pub struct DeviceClient {
    http: reqwest::Client,
    target: PollTarget,
}

impl DeviceClient {
    /// Build a client with its own connection pool from `transport`.
    pub fn new(target: PollTarget, transport: &TransportConfig) -> Result<Self, Error> {
        Ok(Self::with_client(transport.build_client()?, target))
    }

    /// Wrap an existing `reqwest::Client`.
    pub fn with_client(http: reqwest::Client, target: PollTarget) -> Self {
        Self { http, target }
    }

    pub fn target(&self) -> &PollTarget {
        &self.target
    }

    /// Build the poll URL for `host` carrying `sequence`.
    pub fn poll_url(&self, host: &str, sequence: &str) -> Result<Url, Error> {
        let path = self.target.path.trim_start_matches('/');
        let mut url = Url::parse(&format!("http://{host}:{}/{path}", self.target.port))?;
        url.query_pairs_mut()
            .append_pair(&self.target.sequence_key, sequence);
        Ok(url)
    }

    /// Issue one poll and decode the reply.
    ///
    /// Transport failures, non-2xx replies, and malformed bodies all
    /// come back as `Err`; dropping the future cancels the request.
    pub async fn poll(&self, host: &str, sequence: &str) -> Result<Telemetry, Error> {
        let url = self.poll_url(host, sequence)?;
        trace!(url = %url, "polling device");

        let response = self.http.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Status {
                status: status.as_u16(),
            });
        }

        let body = response.text().await?;
        Ok(parse_display(&body, &self.target.sequence_key)?)
    }
}
