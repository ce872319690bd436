// ── Per-device watcher ──
//
// One background task per device: poll, feed the outcome to the state
// machine, report to the store, wait, repeat. The loop runs until the
// watcher is killed.

use std::sync::{Arc, Mutex, PoisonError};

use fleetwatch_api::{DeviceClient, Telemetry};
use futures_util::future::BoxFuture;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use crate::status::{Outcome, StateMachine, Status};
use crate::store::DeviceStore;

/// Sequence token sent with the first poll of every watcher.
pub const INITIAL_SEQUENCE: &str = "0";

/// One telemetry request against one device.
///
/// Implemented by [`DeviceClient`]; tests substitute scripted pollers.
pub trait Poller: Send + Sync {
    fn poll<'a>(
        &'a self,
        host: &'a str,
        sequence: &'a str,
    ) -> BoxFuture<'a, Result<Telemetry, fleetwatch_api::Error>>;
}

impl Poller for DeviceClient {
    fn poll<'a>(
        &'a self,
        host: &'a str,
        sequence: &'a str,
    ) -> BoxFuture<'a, Result<Telemetry, fleetwatch_api::Error>> {
        Box::pin(DeviceClient::poll(self, host, sequence))
    }
}

/// Polls a single device until killed.
pub struct Watcher {
    id: String,
    poller: Arc<dyn Poller>,
    store: Arc<DeviceStore>,
    cancel: CancellationToken,
    // Held while an outcome is applied and while killing, so a kill
    // never interleaves with a store write from the poll loop.
    fence: Arc<Mutex<()>>,
    status: Arc<Mutex<Status>>,
    task: Option<JoinHandle<()>>,
}

impl Watcher {
    pub fn new(id: impl Into<String>, poller: Arc<dyn Poller>, store: Arc<DeviceStore>) -> Self {
        Self {
            id: id.into(),
            poller,
            store,
            cancel: CancellationToken::new(),
            fence: Arc::new(Mutex::new(())),
            status: Arc::new(Mutex::new(Status::Inactive)),
            task: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Current state-machine status.
    pub fn status(&self) -> Status {
        *self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_running(&self) -> bool {
        self.task.is_some() && !self.cancel.is_cancelled()
    }

    /// Spawn the poll loop, starting from `Inactive` with sequence `"0"`.
    ///
    /// Does nothing if already started or killed. Must be called from
    /// within a tokio runtime.
    pub fn start(&mut self) {
        if self.task.is_some() || self.cancel.is_cancelled() {
            return;
        }
        debug!(device = %self.id, "starting watcher");

        let cycle = PollLoop {
            id: self.id.clone(),
            poller: Arc::clone(&self.poller),
            store: Arc::clone(&self.store),
            cancel: self.cancel.clone(),
            fence: Arc::clone(&self.fence),
            status: Arc::clone(&self.status),
        };
        self.task = Some(tokio::spawn(cycle.run()));
    }

    /// Stop polling and mark the device `Inactive`.
    ///
    /// Any in-flight poll is abandoned without touching the state machine
    /// or the store. Safe to call repeatedly.
    pub fn kill(&mut self) {
        {
            let _fence = self.fence.lock().unwrap_or_else(PoisonError::into_inner);
            if !self.cancel.is_cancelled() {
                info!(device = %self.id, "killing watcher");
                self.cancel.cancel();
            }
            *self.status.lock().unwrap_or_else(PoisonError::into_inner) = Status::Inactive;
            self.store.set_status(&self.id, Status::Inactive);
        }
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for Watcher {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

struct PollLoop {
    id: String,
    poller: Arc<dyn Poller>,
    store: Arc<DeviceStore>,
    cancel: CancellationToken,
    fence: Arc<Mutex<()>>,
    status: Arc<Mutex<Status>>,
}

impl PollLoop {
    async fn run(self) {
        let mut machine = StateMachine::new(Instant::now());
        let mut sequence = INITIAL_SEQUENCE.to_owned();

        loop {
            let result = tokio::select! {
                biased;
                () = self.cancel.cancelled() => return,
                result = self.poller.poll(&self.id, &sequence) => result,
            };

            let Some(delay) = self.apply(&mut machine, &mut sequence, result) else {
                return;
            };

            if !delay.is_zero() {
                tokio::select! {
                    biased;
                    () = self.cancel.cancelled() => return,
                    () = tokio::time::sleep(delay) => {}
                }
            }
        }
    }

    /// Advance the machine and report to the store. `None` once killed.
    fn apply(
        &self,
        machine: &mut StateMachine,
        sequence: &mut String,
        result: Result<Telemetry, fleetwatch_api::Error>,
    ) -> Option<std::time::Duration> {
        let _fence = self.fence.lock().unwrap_or_else(PoisonError::into_inner);
        if self.cancel.is_cancelled() {
            return None;
        }

        let before = machine.status();
        let transition = machine.advance(Outcome::from_result(&result), Instant::now());
        if before != transition.status {
            debug!(
                device = %self.id,
                from = %before,
                to = %transition.status,
                delay_minutes = transition.delay_minutes,
                "status transition"
            );
        }
        *self.status.lock().unwrap_or_else(PoisonError::into_inner) = transition.status;

        match result {
            Ok(telemetry) => {
                trace!(device = %self.id, sequence = telemetry.sequence(), "poll succeeded");
                telemetry.sequence().clone_into(sequence);
                self.store.set_telemetry(&self.id, telemetry);
            }
            Err(e) => {
                debug!(device = %self.id, error = %e, "poll failed");
                self.store.set_status(&self.id, transition.status);
            }
        }

        Some(transition.delay())
    }
}
