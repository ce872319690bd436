//! Device fleet monitoring core, sitting between `fleetwatch-api` and the
//! dashboard clients.
//!
//! - **[`Watcher`]** polls one device forever, drives its link [`Status`]
//!   through a fixed transition table, and reports every outcome to the
//!   store. Killing a watcher marks the device `INACTIVE` and discards any
//!   poll still in flight.
//!
//! - **[`DeviceStore`]** holds the latest state and bounded per-property
//!   history of every device. Each mutation computes a diff and pushes it
//!   to an [`UpdateSink`] as a `DEVICE_DATA_UPDATE`.
//!
//! - **[`Engine`]** expands the configured address ranges and supervises
//!   one watcher per address (`start`, `refresh`, `shutdown`).
//!
//! - **[`Hub`]** / **[`Router`]** / [`hub::serve`] make up the websocket
//!   layer: snapshot on connect, fan-out of updates, and dispatch of
//!   client commands to the engine, the store, or an external
//!   [`ActionDispatcher`] / [`CommandRunner`].
//!
//! - **[`Monitor`]** is the context object that wires all of the above.

pub mod collab;
pub mod config;
pub mod engine;
pub mod error;
pub mod hub;
pub mod message;
pub mod monitor;
pub mod status;
pub mod store;
pub mod watcher;

#[cfg(test)]
pub(crate) mod testing;

// ── Primary re-exports ──────────────────────────────────────────────
pub use collab::{ActionDispatcher, CommandRunner, UnconfiguredActions, UnconfiguredCommands};
pub use config::{AddressRange, MonitorConfig, ServerConfig, StoreConfig};
pub use engine::Engine;
pub use error::CoreError;
pub use hub::{ClientId, Connection, Hub, Responder, Router};
pub use message::{
    AccumulatedRecords, ActionRequest, ActionResponse, ActionResult, ClientMessage,
    CommandRequest, CommandResponse, DeviceUpdate, ServerMessage,
};
pub use monitor::{Monitor, MonitorBuilder};
pub use status::{Outcome, StateMachine, Status, Transition};
pub use store::{Clock, DeviceStore, SystemClock, UpdateSink};
pub use watcher::{Poller, Watcher};

// Re-exported so embedders need only one dependency.
pub use fleetwatch_api::{PollTarget, Telemetry, TransportConfig};
