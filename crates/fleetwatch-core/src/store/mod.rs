// ── Authoritative device state store ──
//
// Holds the latest state and bounded history for every device, computes
// a diff on each mutation, and hands the diff to an `UpdateSink` (the
// broadcast hub in production).
//
// Locking: records live in a `DashMap`, so mutations of one device are
// serialized by its shard lock while different devices proceed in
// parallel. Every mutation also holds the shared side of `fence`;
// snapshots take the exclusive side, so a snapshot never observes a
// half-applied batch and nothing is emitted while a client is being
// synced.

mod record;

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Local};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use fleetwatch_api::Telemetry;
use tracing::trace;

use crate::config::StoreConfig;
use crate::error::CoreError;
use crate::message::{AccumulatedRecords, DeviceState, DeviceUpdate, History, ServerMessage};
use crate::status::Status;

use record::DeviceRecord;
pub use record::{STATUS_KEY, TIMESTAMP_KEY};

/// Receives every update the store produces.
pub trait UpdateSink: Send + Sync {
    /// Deliver to every connected client. Must not block.
    fn send_all(&self, message: &ServerMessage);
}

/// Source of wall-clock time for update timestamps.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Local>;
}

/// Local system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }
}

/// Central store for all device records.
pub struct DeviceStore {
    records: DashMap<String, DeviceRecord>,
    fence: RwLock<()>,
    config: StoreConfig,
    sink: Arc<dyn UpdateSink>,
    clock: Arc<dyn Clock>,
}

impl DeviceStore {
    pub fn new(config: StoreConfig, sink: Arc<dyn UpdateSink>) -> Result<Self, CoreError> {
        Self::with_clock(config, sink, Arc::new(SystemClock))
    }

    pub fn with_clock(
        config: StoreConfig,
        sink: Arc<dyn UpdateSink>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, CoreError> {
        config.validate()?;
        Ok(Self {
            records: DashMap::new(),
            fence: RwLock::new(()),
            config,
            sink,
            clock,
        })
    }

    // ── Mutations ────────────────────────────────────────────────────

    /// Record a status change with no new telemetry.
    ///
    /// A no-op for devices that have never reported telemetry.
    pub fn set_status(&self, id: &str, status: Status) -> Option<DeviceUpdate> {
        self.apply(id, status, None)
    }

    /// Record a successful poll: status becomes `Connected` and the
    /// telemetry replaces the device's properties.
    pub fn set_telemetry(&self, id: &str, telemetry: Telemetry) -> Option<DeviceUpdate> {
        self.apply(id, Status::Connected, Some(telemetry.into_properties()))
    }

    fn apply(
        &self,
        id: &str,
        status: Status,
        payload: Option<BTreeMap<String, String>>,
    ) -> Option<DeviceUpdate> {
        let _fence = self.fence.read().unwrap_or_else(PoisonError::into_inner);

        let mut record = match self.records.entry(id.to_owned()) {
            Entry::Occupied(slot) => slot.into_ref(),
            Entry::Vacant(slot) => {
                if status != Status::Connected || payload.is_none() {
                    trace!(device = %id, %status, "ignoring status for unknown device");
                    return None;
                }
                slot.insert(DeviceRecord::default())
            }
        };

        let timestamp = self.timestamp();
        let (state, history) =
            record.apply(status, payload, &timestamp, self.config.max_history);
        let update = DeviceUpdate {
            id: id.to_owned(),
            state: Some(state),
            history: Some(history),
        };

        // still under the record's lock, so per-device updates go out in order
        self.sink
            .send_all(&ServerMessage::DeviceDataUpdate(update.clone()));
        drop(record);

        Some(update)
    }

    /// Forget the given devices (all when `None`) and tell clients to
    /// purge them. Returns the ids that were actually removed.
    pub fn clear(&self, ids: Option<&[String]>) -> Vec<String> {
        let _fence = self.fence.read().unwrap_or_else(PoisonError::into_inner);

        let targets = ids.map_or_else(|| self.ids(), <[String]>::to_vec);
        let mut removed = Vec::new();
        for id in targets {
            if let Entry::Occupied(slot) = self.records.entry(id) {
                let update = DeviceUpdate::removed(slot.key().clone());
                self.sink.send_all(&ServerMessage::DeviceDataUpdate(update));
                let (id, _) = slot.remove_entry();
                removed.push(id);
            }
        }
        removed
    }

    // ── Snapshots ────────────────────────────────────────────────────

    /// Full state and history of every device, taken atomically.
    pub fn accumulated_records(&self) -> AccumulatedRecords {
        self.sync(|records| records)
    }

    /// Run `f` with a consistent snapshot while no mutation can happen.
    ///
    /// Used to register a new client: anything `f` sets up (such as a
    /// subscription) sees every later update and none of the earlier ones.
    pub fn sync<R>(&self, f: impl FnOnce(AccumulatedRecords) -> R) -> R {
        let _fence = self.fence.write().unwrap_or_else(PoisonError::into_inner);

        let mut snapshot = AccumulatedRecords::default();
        for entry in &self.records {
            snapshot
                .state
                .insert(entry.key().clone(), entry.state.clone());
            snapshot
                .history
                .insert(entry.key().clone(), entry.history.clone());
        }
        f(snapshot)
    }

    // ── Lookups ──────────────────────────────────────────────────────

    pub fn get(&self, id: &str) -> Option<DeviceState> {
        self.records.get(id).map(|r| r.state.clone())
    }

    pub fn history(&self, id: &str) -> Option<History> {
        self.records.get(id).map(|r| r.history.clone())
    }

    /// Current status of a known device.
    pub fn status(&self, id: &str) -> Option<Status> {
        self.records
            .get(id)
            .and_then(|r| r.state.get(STATUS_KEY).and_then(|s| s.parse().ok()))
    }

    pub fn ids(&self) -> Vec<String> {
        self.records.iter().map(|r| r.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn timestamp(&self) -> String {
        self.clock.now().format(&self.config.date_format).to_string()
    }
}
