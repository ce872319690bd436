// ── Runtime monitor configuration ──
//
// These types describe what to watch and how to serve it. They never
// touch disk: fleetwatch-config (or a test) builds a `MonitorConfig`
// and hands it in.

use std::net::{Ipv4Addr, SocketAddr};

use chrono::format::{Item, StrftimeItems};
use fleetwatch_api::{PollTarget, TransportConfig};

use crate::error::CoreError;

/// One contiguous block of device addresses: `<subnet>.<start..=end>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressRange {
    /// First three octets, e.g. `"10.0.0"`.
    pub subnet: String,
    /// First last-octet value, inclusive.
    pub start: u8,
    /// Last last-octet value, inclusive.
    pub end: u8,
}

impl AddressRange {
    pub fn new(subnet: impl Into<String>, start: u8, end: u8) -> Self {
        Self {
            subnet: subnet.into(),
            start,
            end,
        }
    }

    /// Expand into concrete device identifiers, in ascending order.
    pub fn hosts(&self) -> impl Iterator<Item = String> + '_ {
        let prefix = self.subnet.trim_end_matches('.');
        (self.start..=self.end).map(move |octet| format!("{prefix}.{octet}"))
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        let prefix = self.subnet.trim_end_matches('.');
        if prefix.split('.').count() != 3 || format!("{prefix}.0").parse::<Ipv4Addr>().is_err() {
            return Err(CoreError::Config {
                message: format!("subnet {:?} is not three dotted octets", self.subnet),
            });
        }
        if self.start > self.end {
            return Err(CoreError::Config {
                message: format!(
                    "range {prefix}.{}-{} starts after it ends",
                    self.start, self.end
                ),
            });
        }
        Ok(())
    }
}

/// History retention and timestamp rendering for the device store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Maximum entries kept per property history.
    pub max_history: usize,
    /// chrono strftime pattern for the `timestamp` field and history entries.
    pub date_format: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_history: 100,
            date_format: "%Y-%m-%d %H:%M:%S".into(),
        }
    }
}

impl StoreConfig {
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.max_history == 0 {
            return Err(CoreError::Config {
                message: "max_history must be at least 1".into(),
            });
        }
        if StrftimeItems::new(&self.date_format).any(|item| matches!(item, Item::Error)) {
            return Err(CoreError::Config {
                message: format!("invalid date format {:?}", self.date_format),
            });
        }
        Ok(())
    }
}

/// Websocket listener settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub listen: SocketAddr,
    /// Outbound messages buffered per client before it is dropped as too slow.
    pub client_queue: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([0, 0, 0, 0], 8080)),
            client_queue: 256,
        }
    }
}

/// Everything a [`Monitor`](crate::Monitor) needs to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorConfig {
    pub ranges: Vec<AddressRange>,
    pub store: StoreConfig,
    pub target: PollTarget,
    pub transport: TransportConfig,
    pub server: ServerConfig,
}

impl MonitorConfig {
    /// Check cross-field constraints. Called by `Monitor::new`.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.ranges.is_empty() {
            return Err(CoreError::Config {
                message: "at least one address range is required".into(),
            });
        }
        for range in &self.ranges {
            range.validate()?;
        }
        self.store.validate()?;
        if self.target.sequence_key.is_empty() {
            return Err(CoreError::Config {
                message: "sequence_key must not be empty".into(),
            });
        }
        if self.server.client_queue == 0 {
            return Err(CoreError::Config {
                message: "client_queue must be at least 1".into(),
            });
        }
        Ok(())
    }
}
