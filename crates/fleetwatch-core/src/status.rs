// ── Device link status and the watcher state machine ──
//
// The transition table is a pure function of (status, outcome, time since
// the device last answered). `StateMachine` just carries the current
// status and the last-contact instant between polls.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use tokio::time::Instant;

/// How long a silent device stays `Disconnected` before it is demoted
/// back to `Inactive` and polled on the slow schedule.
pub const DISCONNECTED_GRACE: Duration = Duration::from_secs(10 * 60);

/// Link status of one device, as stored under the `status` state key.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    Inactive,
    Connected,
    Retry,
    Disconnected,
}

/// Result of one poll cycle, as far as the state machine cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failure,
}

impl Outcome {
    pub fn from_result<T, E>(result: &Result<T, E>) -> Self {
        if result.is_ok() {
            Self::Success
        } else {
            Self::Failure
        }
    }
}

/// Where the machine goes next and how long to wait before polling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub status: Status,
    pub delay_minutes: u64,
}

impl Transition {
    const fn new(status: Status, delay_minutes: u64) -> Self {
        Self {
            status,
            delay_minutes,
        }
    }

    pub fn delay(&self) -> Duration {
        Duration::from_secs(self.delay_minutes * 60)
    }
}

impl Status {
    /// The transition table.
    ///
    /// | Current      | success        | failure                                   |
    /// |--------------|----------------|-------------------------------------------|
    /// | Inactive     | Connected, 0   | Inactive, 5                               |
    /// | Connected    | Connected, 0   | Retry, 0                                  |
    /// | Retry        | Connected, 0   | Disconnected, 1                           |
    /// | Disconnected | Connected, 0   | Disconnected, 1 within grace, else Inactive, 5 |
    pub fn transition(self, outcome: Outcome, since_connected: Duration) -> Transition {
        match (self, outcome) {
            (_, Outcome::Success) => Transition::new(Self::Connected, 0),
            (Self::Inactive, Outcome::Failure) => Transition::new(Self::Inactive, 5),
            (Self::Connected, Outcome::Failure) => Transition::new(Self::Retry, 0),
            (Self::Retry, Outcome::Failure) => Transition::new(Self::Disconnected, 1),
            (Self::Disconnected, Outcome::Failure) => {
                if since_connected <= DISCONNECTED_GRACE {
                    Transition::new(Self::Disconnected, 1)
                } else {
                    Transition::new(Self::Inactive, 5)
                }
            }
        }
    }
}

/// Per-watcher machine state.
#[derive(Debug, Clone)]
pub struct StateMachine {
    status: Status,
    last_connected: Instant,
}

impl StateMachine {
    /// A primed machine: `Inactive`, ready for an immediate first poll.
    pub fn new(now: Instant) -> Self {
        Self {
            status: Status::Inactive,
            last_connected: now,
        }
    }

    pub fn status(&self) -> Status {
        self.status
    }

    /// Feed one poll outcome observed at `now`.
    pub fn advance(&mut self, outcome: Outcome, now: Instant) -> Transition {
        let since = now.saturating_duration_since(self.last_connected);
        let next = self.status.transition(outcome, since);
        if next.status == Status::Connected {
            self.last_connected = now;
        }
        self.status = next.status;
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    const MINUTE: Duration = Duration::from_secs(60);

    #[test]
    fn success_always_connects_immediately() {
        for status in [
            Status::Inactive,
            Status::Connected,
            Status::Retry,
            Status::Disconnected,
        ] {
            assert_eq!(
                status.transition(Outcome::Success, Duration::from_secs(3600)),
                Transition::new(Status::Connected, 0)
            );
        }
    }

    #[test]
    fn failure_table() {
        let t = |s: Status, since: Duration| s.transition(Outcome::Failure, since);

        assert_eq!(t(Status::Inactive, MINUTE), Transition::new(Status::Inactive, 5));
        assert_eq!(t(Status::Connected, MINUTE), Transition::new(Status::Retry, 0));
        assert_eq!(t(Status::Retry, MINUTE), Transition::new(Status::Disconnected, 1));
        assert_eq!(
            t(Status::Disconnected, 10 * MINUTE),
            Transition::new(Status::Disconnected, 1)
        );
        assert_eq!(
            t(Status::Disconnected, 10 * MINUTE + Duration::from_secs(1)),
            Transition::new(Status::Inactive, 5)
        );
    }

    #[test]
    fn scenario_success_success_fail_fail() {
        let start = Instant::now();
        let mut machine = StateMachine::new(start);
        assert_eq!(machine.status(), Status::Inactive);

        let visited: Vec<Transition> = [
            Outcome::Success,
            Outcome::Success,
            Outcome::Failure,
            Outcome::Failure,
        ]
        .into_iter()
        .map(|o| machine.advance(o, start))
        .collect();

        assert_eq!(
            visited,
            [
                Transition::new(Status::Connected, 0),
                Transition::new(Status::Connected, 0),
                Transition::new(Status::Retry, 0),
                Transition::new(Status::Disconnected, 1),
            ]
        );
    }

    #[test]
    fn disconnected_grace_measured_from_last_connected() {
        let start = Instant::now();
        let mut machine = StateMachine::new(start);

        // connected at +5m, then lost
        machine.advance(Outcome::Success, start + 5 * MINUTE);
        machine.advance(Outcome::Failure, start + 5 * MINUTE);
        machine.advance(Outcome::Failure, start + 6 * MINUTE);
        assert_eq!(machine.status(), Status::Disconnected);

        // 14 minutes after start, but only 9 after the last success
        let t = machine.advance(Outcome::Failure, start + 14 * MINUTE);
        assert_eq!(t, Transition::new(Status::Disconnected, 1));

        let t = machine.advance(Outcome::Failure, start + 16 * MINUTE);
        assert_eq!(t, Transition::new(Status::Inactive, 5));
        assert_eq!(t.delay(), 5 * MINUTE);
    }

    #[test]
    fn status_string_form() {
        assert_eq!(Status::Disconnected.to_string(), "DISCONNECTED");
        assert_eq!(Status::from_str("RETRY"), Ok(Status::Retry));
        assert_eq!(
            serde_json::to_string(&Status::Connected).ok().as_deref(),
            Some("\"CONNECTED\"")
        );
    }
}
