// ── Per-device record and diff computation ──
//
// Pure data manipulation, no locking: `DeviceStore` decides when and
// under which lock a record is touched.

use std::collections::BTreeMap;

use crate::message::{DeviceState, History, HistoryDiff, StateDiff};
use crate::status::Status;

/// State key holding the device's link status.
pub const STATUS_KEY: &str = "status";
/// State key holding the time of the last update.
pub const TIMESTAMP_KEY: &str = "timestamp";

/// Authoritative state and bounded history of one device.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct DeviceRecord {
    pub state: DeviceState,
    pub history: History,
}

impl DeviceRecord {
    /// Apply one update and return what changed.
    ///
    /// With a payload the next state is the payload plus `status` and
    /// `timestamp`; without one only `status` changes.
    pub fn apply(
        &mut self,
        status: Status,
        payload: Option<BTreeMap<String, String>>,
        timestamp: &str,
        max_history: usize,
    ) -> (StateDiff, HistoryDiff) {
        let next = match payload {
            Some(mut props) => {
                props.insert(STATUS_KEY.into(), status.to_string());
                props.insert(TIMESTAMP_KEY.into(), timestamp.to_owned());
                props
            }
            None => {
                let mut props = self.state.clone();
                props.insert(STATUS_KEY.into(), status.to_string());
                props
            }
        };

        let state_diff = diff_states(&self.state, &next);
        let history_diff = history_diff(&state_diff, timestamp);
        merge_history(&mut self.history, &history_diff, max_history);
        self.state = next;

        (state_diff, history_diff)
    }
}

/// Every key whose value differs between `prev` and `next`; keys missing
/// from `next` map to `None`.
pub(crate) fn diff_states(prev: &DeviceState, next: &DeviceState) -> StateDiff {
    let mut diff = StateDiff::new();
    for (key, old) in prev {
        match next.get(key) {
            Some(new) if new == old => {}
            new => {
                diff.insert(key.clone(), new.cloned());
            }
        }
    }
    for (key, new) in next {
        if !prev.contains_key(key) {
            diff.insert(key.clone(), Some(new.clone()));
        }
    }
    diff
}

/// History entries for a state diff, skipping the synthetic keys.
pub(crate) fn history_diff(diff: &StateDiff, timestamp: &str) -> HistoryDiff {
    diff.iter()
        .filter(|(key, _)| !is_synthetic(key))
        .map(|(key, value)| (key.clone(), (timestamp.to_owned(), value.clone())))
        .collect()
}

/// Prepend each entry to its key's history, then trim to `max` entries.
pub(crate) fn merge_history(history: &mut History, diff: &HistoryDiff, max: usize) {
    for (key, entry) in diff {
        let entries = history.entry(key.clone()).or_default();
        entries.push_front(entry.clone());
        entries.truncate(max);
    }
}

fn is_synthetic(key: &str) -> bool {
    key == STATUS_KEY || key == TIMESTAMP_KEY
}
