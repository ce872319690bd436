// ── Fleet supervisor ──
//
// Owns one `Watcher` per device identifier and applies bulk lifecycle
// operations to them.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::AddressRange;
use crate::store::DeviceStore;
use crate::watcher::{Poller, Watcher};

pub struct Engine {
    ranges: Vec<AddressRange>,
    poller: Arc<dyn Poller>,
    store: Arc<DeviceStore>,
    watchers: Mutex<HashMap<String, Watcher>>,
}

impl Engine {
    pub fn new(ranges: Vec<AddressRange>, poller: Arc<dyn Poller>, store: Arc<DeviceStore>) -> Self {
        Self {
            ranges,
            poller,
            store,
            watchers: Mutex::new(HashMap::new()),
        }
    }

    /// Every identifier the configured ranges expand to, without duplicates.
    pub fn expand_ranges(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut ids = Vec::new();
        for host in self.ranges.iter().flat_map(AddressRange::hosts) {
            if seen.insert(host.clone()) {
                ids.push(host);
            } else {
                warn!(device = %host, "device appears in more than one range, watching it once");
            }
        }
        ids
    }

    /// Start one watcher per configured device. Devices that already have
    /// a watcher are left alone. Returns the number started.
    pub async fn start(&self) -> usize {
        let mut watchers = self.watchers.lock().await;
        let mut started = 0;
        for id in self.expand_ranges() {
            if watchers.contains_key(&id) {
                continue;
            }
            let mut watcher = self.spawn_watcher(&id);
            watcher.start();
            watchers.insert(id, watcher);
            started += 1;
        }
        info!(started, total = watchers.len(), "fleet started");
        started
    }

    /// Replace the watchers for `ids` (all when `None`) with fresh ones.
    ///
    /// Each old watcher is killed, which marks its device `Inactive`,
    /// before its replacement starts polling from scratch. Unknown ids
    /// are skipped. Returns the number refreshed.
    pub async fn refresh(&self, ids: Option<&[String]>) -> usize {
        let mut watchers = self.watchers.lock().await;
        let targets: Vec<String> = match ids {
            Some(ids) => ids.to_vec(),
            None => watchers.keys().cloned().collect(),
        };

        let mut refreshed = 0;
        for id in targets {
            let Some(slot) = watchers.get_mut(&id) else {
                debug!(device = %id, "refresh for unknown device ignored");
                continue;
            };
            slot.kill();
            let mut replacement = self.spawn_watcher(&id);
            replacement.start();
            *slot = replacement;
            refreshed += 1;
        }
        info!(refreshed, "fleet refreshed");
        refreshed
    }

    /// Kill every watcher. Each device ends up `Inactive`.
    pub async fn shutdown(&self) -> usize {
        let mut watchers = self.watchers.lock().await;
        let count = watchers.len();
        for (_, mut watcher) in watchers.drain() {
            watcher.kill();
        }
        info!(stopped = count, "fleet shut down");
        count
    }

    /// Identifiers with a watcher, sorted.
    pub async fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.watchers.lock().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub async fn len(&self) -> usize {
        self.watchers.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.watchers.lock().await.is_empty()
    }

    fn spawn_watcher(&self, id: &str) -> Watcher {
        Watcher::new(id, Arc::clone(&self.poller), Arc::clone(&self.store))
    }
}
