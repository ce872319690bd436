// Test doubles shared by the unit tests of this crate.

#![allow(clippy::unwrap_used)]

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Local, TimeDelta, TimeZone};
use fleetwatch_api::{Error, Telemetry};
use futures_util::future::BoxFuture;
use tokio::sync::Notify;

use crate::message::{DeviceUpdate, ServerMessage};
use crate::store::{Clock, UpdateSink};
use crate::watcher::Poller;

pub fn telemetry(pairs: &[(&str, &str)]) -> Telemetry {
    let props: BTreeMap<String, String> = pairs
        .iter()
        .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
        .collect();
    Telemetry::new(props, "seq").unwrap()
}

// ── Sink ─────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingSink {
    sent: Mutex<Vec<ServerMessage>>,
}

impl RecordingSink {
    pub fn updates(&self) -> Vec<DeviceUpdate> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter_map(|m| match m {
                ServerMessage::DeviceDataUpdate(u) => Some(u.clone()),
                _ => None,
            })
            .collect()
    }

    /// Drain and return the updates recorded so far.
    pub fn take(&self) -> Vec<DeviceUpdate> {
        let updates = self.updates();
        self.sent.lock().unwrap().clear();
        updates
    }
}

impl UpdateSink for RecordingSink {
    fn send_all(&self, message: &ServerMessage) {
        self.sent.lock().unwrap().push(message.clone());
    }
}

// ── Clock ────────────────────────────────────────────────────────────

/// Starts at 12:00:00 local time and only moves when told to.
pub struct FixedClock(Mutex<DateTime<Local>>);

impl Default for FixedClock {
    fn default() -> Self {
        Self(Mutex::new(
            Local.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
        ))
    }
}

impl FixedClock {
    pub fn advance_secs(&self, secs: i64) {
        *self.0.lock().unwrap() += TimeDelta::seconds(secs);
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Local> {
        *self.0.lock().unwrap()
    }
}

// ── Poller ───────────────────────────────────────────────────────────

/// One scripted reply.
pub enum Step {
    Reply(Telemetry),
    Fail,
    /// Wait for the gate to be notified, then behave like the inner step.
    Gated(Arc<Notify>, Box<Step>),
}

/// Replays a per-host script of replies; once a host's script runs out
/// its polls never complete.
#[derive(Default)]
pub struct ScriptedPoller {
    scripts: Mutex<HashMap<String, VecDeque<Step>>>,
    calls: Mutex<Vec<(String, String)>>,
}

impl ScriptedPoller {
    pub fn script(&self, host: &str, steps: impl IntoIterator<Item = Step>) {
        self.scripts
            .lock()
            .unwrap()
            .entry(host.to_owned())
            .or_default()
            .extend(steps);
    }

    /// `(host, sequence)` of every poll issued so far.
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, host: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|(h, _)| h == host)
            .map(|(_, seq)| seq)
            .collect()
    }
}

impl Poller for ScriptedPoller {
    fn poll<'a>(
        &'a self,
        host: &'a str,
        sequence: &'a str,
    ) -> BoxFuture<'a, Result<Telemetry, Error>> {
        self.calls
            .lock()
            .unwrap()
            .push((host.to_owned(), sequence.to_owned()));
        let step = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(host)
            .and_then(VecDeque::pop_front);

        Box::pin(async move {
            let Some(mut step) = step else {
                return std::future::pending().await;
            };
            loop {
                match step {
                    Step::Reply(t) => return Ok(t),
                    Step::Fail => return Err(Error::Status { status: 503 }),
                    Step::Gated(gate, inner) => {
                        gate.notified().await;
                        step = *inner;
                    }
                }
            }
        })
    }
}
