//! Device activity state derivation.
//!
//! The state of a device is never stored as ground truth. It is recomputed
//! from [`ActivityFacts`] and the current time every time it is needed, so
//! the tracker only has to keep the facts consistent.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;

/// Derived activity state of a remote device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DeviceState {
    /// No live connection and no pending work.
    #[default]
    #[serde(rename = "disconnected")]
    Offline,
    /// A request arrived within the idle window.
    Syncing,
    /// Connected, nothing happening.
    Idle,
    /// Sorting index data for transmission.
    PreparingIndex,
    /// Sending index data.
    SendingIndex,
}

impl DeviceState {
    /// Textual name used in events and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceState::Offline => "disconnected",
            DeviceState::Syncing => "syncing",
            DeviceState::Idle => "idle",
            DeviceState::PreparingIndex => "preparingIndex",
            DeviceState::SendingIndex => "sendingIndex",
        }
    }
}

impl fmt::Display for DeviceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The raw, mutable facts a tracker keeps for one device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ActivityFacts {
    /// Whether a live connection exists.
    pub connected: bool,
    /// In-flight "preparing index" operations.
    pub preparing_index: u32,
    /// In-flight "sending index" operations.
    pub sending_index: u32,
    /// Time of the most recent data request, `None` if never.
    pub last_activity: Option<Instant>,
}

impl ActivityFacts {
    /// Compute the state these facts imply at `now`.
    ///
    /// Evaluated in fixed priority order: sending index, preparing index,
    /// recent request activity, connected, offline. Index transfer outranks
    /// request activity, which outranks plain connectedness.
    pub fn derive(&self, now: Instant, idle_timeout: Duration) -> DeviceState {
        if self.sending_index > 0 {
            DeviceState::SendingIndex
        } else if self.preparing_index > 0 {
            DeviceState::PreparingIndex
        } else if self.active_within(now, idle_timeout) {
            DeviceState::Syncing
        } else if self.connected {
            DeviceState::Idle
        } else {
            DeviceState::Offline
        }
    }

    /// Whether a request was seen less than `window` before `now`.
    pub fn active_within(&self, now: Instant, window: Duration) -> bool {
        match self.last_activity {
            Some(at) => now.saturating_duration_since(at) < window,
            None => false,
        }
    }

    /// Count one more index preparation.
    pub fn begin_preparing_index(&mut self) {
        self.preparing_index += 1;
    }

    /// Move one index preparation to the sending phase.
    ///
    /// # Panics
    ///
    /// Panics if no preparation is in flight. That means the caller issued
    /// unmatched begin/end calls; the facts are left untouched.
    pub fn begin_sending_index(&mut self) {
        let Some(preparing) = self.preparing_index.checked_sub(1) else {
            panic!("unmatched call to begin_sending_index: no index preparation in flight");
        };
        self.preparing_index = preparing;
        self.sending_index += 1;
    }

    /// Finish one index transmission.
    ///
    /// # Panics
    ///
    /// Panics if no transmission is in flight.
    pub fn end_sending_index(&mut self) {
        let Some(sending) = self.sending_index.checked_sub(1) else {
            panic!("unmatched call to end_sending_index: no index transmission in flight");
        };
        self.sending_index = sending;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const IDLE: Duration = Duration::from_secs(30);

    fn connected() -> ActivityFacts {
        ActivityFacts {
            connected: true,
            ..Default::default()
        }
    }

    #[test]
    fn default_facts_are_offline() {
        let facts = ActivityFacts::default();
        assert_eq!(facts.derive(Instant::now(), IDLE), DeviceState::Offline);
    }

    #[test]
    fn connected_without_activity_is_idle() {
        assert_eq!(connected().derive(Instant::now(), IDLE), DeviceState::Idle);
    }

    #[test]
    fn recent_activity_is_syncing_even_when_disconnected() {
        let now = Instant::now();
        let facts = ActivityFacts {
            last_activity: Some(now),
            ..Default::default()
        };
        assert_eq!(facts.derive(now, IDLE), DeviceState::Syncing);
    }

    #[test]
    fn activity_expires_at_the_idle_window() {
        let start = Instant::now();
        let facts = ActivityFacts {
            last_activity: Some(start),
            ..connected()
        };

        let just_before = start + IDLE - Duration::from_millis(1);
        assert_eq!(facts.derive(just_before, IDLE), DeviceState::Syncing);
        assert_eq!(facts.derive(start + IDLE, IDLE), DeviceState::Idle);
    }

    #[test]
    fn sending_outranks_everything() {
        let now = Instant::now();
        let facts = ActivityFacts {
            connected: true,
            preparing_index: 1,
            sending_index: 1,
            last_activity: Some(now),
        };
        assert_eq!(facts.derive(now, IDLE), DeviceState::SendingIndex);
    }

    #[test]
    fn preparing_outranks_activity() {
        let now = Instant::now();
        let facts = ActivityFacts {
            connected: true,
            preparing_index: 2,
            sending_index: 0,
            last_activity: Some(now),
        };
        assert_eq!(facts.derive(now, IDLE), DeviceState::PreparingIndex);
    }

    #[test]
    fn derive_is_deterministic() {
        let now = Instant::now();
        let facts = ActivityFacts {
            connected: true,
            last_activity: Some(now - Duration::from_secs(5)),
            ..Default::default()
        };
        let first = facts.derive(now, IDLE);
        for _ in 0..10 {
            assert_eq!(facts.derive(now, IDLE), first);
        }
    }

    #[test]
    fn activity_in_the_future_counts_as_recent() {
        // A timestamp ahead of `now` can appear when `now` was sampled first.
        let now = Instant::now();
        let facts = ActivityFacts {
            last_activity: Some(now + Duration::from_millis(5)),
            ..Default::default()
        };
        assert_eq!(facts.derive(now, IDLE), DeviceState::Syncing);
    }

    #[test]
    fn index_counters_move_through_phases() {
        let mut facts = connected();
        facts.begin_preparing_index();
        facts.begin_preparing_index();
        facts.begin_sending_index();
        assert_eq!((facts.preparing_index, facts.sending_index), (1, 1));
        facts.end_sending_index();
        assert_eq!((facts.preparing_index, facts.sending_index), (1, 0));
    }

    #[test]
    #[should_panic(expected = "unmatched call to begin_sending_index")]
    fn sending_without_preparing_panics() {
        let mut facts = connected();
        facts.begin_sending_index();
    }

    #[test]
    #[should_panic(expected = "unmatched call to end_sending_index")]
    fn ending_without_sending_panics() {
        let mut facts = connected();
        facts.end_sending_index();
    }

    #[test]
    fn state_names() {
        assert_eq!(DeviceState::Offline.to_string(), "disconnected");
        assert_eq!(
            serde_json::to_string(&DeviceState::Offline).unwrap(),
            "\"disconnected\""
        );
        let parsed: DeviceState = serde_json::from_str("\"disconnected\"").unwrap();
        assert_eq!(parsed, DeviceState::Offline);
        assert_eq!(DeviceState::PreparingIndex.to_string(), "preparingIndex");
        assert_eq!(
            serde_json::to_string(&DeviceState::SendingIndex).unwrap(),
            "\"sendingIndex\""
        );
    }
}
