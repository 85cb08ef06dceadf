//! Per-device activity tracker.
//!
//! A [`DeviceStateTracker`] owns the [`ActivityFacts`] for exactly one
//! device. Every mutation, and every idle-timer firing, goes through the same
//! locked sequence: mutate facts, derive the state, emit a transition if it
//! differs from the last one emitted.

use peerwatch_types::{ConnectionInfo, DeviceId};
use serde::Serialize;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::time::Instant;

use crate::event::{DeviceEvent, EventSink};
use crate::state::{ActivityFacts, DeviceState};
use crate::timer::IdleTimer;

/// Point-in-time view of a tracker, for status reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceSnapshot {
    /// The device.
    pub id: DeviceId,
    /// Derived state at the time of the snapshot.
    pub state: DeviceState,
    /// Whether a live connection exists.
    pub connected: bool,
    /// In-flight index preparations.
    pub preparing_index: u32,
    /// In-flight index transmissions.
    pub sending_index: u32,
    /// Milliseconds since the last request, if any was ever seen.
    pub last_activity_ms_ago: Option<u64>,
}

/// Tracks connection and activity facts for a single device.
pub struct DeviceStateTracker {
    shared: Arc<Shared>,
    timer: IdleTimer,
}

struct Shared {
    id: DeviceId,
    idle_timeout: Duration,
    sink: Arc<dyn EventSink>,
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    facts: ActivityFacts,
    /// Last state emitted; only used to detect edges.
    previous: DeviceState,
}

impl DeviceStateTracker {
    /// Create a tracker for `id`, starting Offline.
    ///
    /// The idle timer task is spawned on `runtime`; it holds only a weak
    /// reference to the tracker state and ends when the tracker is dropped.
    pub fn new(
        id: DeviceId,
        idle_timeout: Duration,
        sink: Arc<dyn EventSink>,
        runtime: &Handle,
    ) -> Self {
        let shared = Arc::new(Shared {
            id,
            idle_timeout,
            sink,
            inner: Mutex::new(Inner::default()),
        });

        let weak: Weak<Shared> = Arc::downgrade(&shared);
        let timer = IdleTimer::spawn(runtime, move || {
            if let Some(shared) = weak.upgrade() {
                tracing::debug!(device = %shared.id.short(), "Idle timer fired");
                shared.apply(|_, _| None);
            }
        });

        Self { shared, timer }
    }

    /// The device this tracker belongs to.
    pub fn device_id(&self) -> DeviceId {
        self.shared.id
    }

    /// Inactivity window after which a device stops counting as syncing.
    pub fn idle_timeout(&self) -> Duration {
        self.shared.idle_timeout
    }

    /// A connection to the device was established.
    pub fn record_connected(&self, info: &ConnectionInfo) {
        tracing::info!(
            device = %self.shared.id.short(),
            name = %info.device_name,
            addr = ?info.addr,
            "Device connected"
        );
        let id = self.shared.id;
        self.shared.apply(|facts, _| {
            facts.connected = true;
            Some(DeviceEvent::Connected {
                id,
                info: info.clone(),
            })
        });
    }

    /// The connection to the device was lost.
    ///
    /// The idle timer keeps running; a later firing is a no-op transition.
    pub fn record_disconnected(&self, cause: impl fmt::Display) {
        let cause = cause.to_string();
        tracing::info!(device = %self.shared.id.short(), %cause, "Device disconnected");
        let id = self.shared.id;
        self.shared.apply(|facts, _| {
            facts.connected = false;
            Some(DeviceEvent::Disconnected { id, cause })
        });
    }

    /// A data request from the device was handled.
    pub fn record_request_activity(&self) {
        tracing::trace!(device = %self.shared.id.short(), "Request activity");
        let idle_timeout = self.shared.idle_timeout;
        self.shared.apply(|facts, now| {
            facts.last_activity = Some(now);
            self.timer.reset_at(now + idle_timeout);
            None
        });
    }

    /// Index preparation for the device started.
    pub fn begin_preparing_index(&self) {
        self.shared.apply(|facts, _| {
            facts.begin_preparing_index();
            None
        });
    }

    /// A prepared index started transmitting.
    ///
    /// # Panics
    ///
    /// Panics if there is no matching [`begin_preparing_index`](Self::begin_preparing_index).
    pub fn begin_sending_index(&self) {
        self.shared.apply(|facts, _| {
            facts.begin_sending_index();
            None
        });
    }

    /// An index transmission finished.
    ///
    /// # Panics
    ///
    /// Panics if there is no matching [`begin_sending_index`](Self::begin_sending_index).
    pub fn end_sending_index(&self) {
        self.shared.apply(|facts, _| {
            facts.end_sending_index();
            None
        });
    }

    /// Current derived state. Does not emit or record anything.
    pub fn current_state(&self) -> DeviceState {
        let inner = self.shared.lock();
        inner.facts.derive(Instant::now(), self.shared.idle_timeout)
    }

    /// Facts and derived state, read under one lock.
    pub fn snapshot(&self) -> DeviceSnapshot {
        let now = Instant::now();
        let facts = self.shared.lock().facts;
        DeviceSnapshot {
            id: self.shared.id,
            state: facts.derive(now, self.shared.idle_timeout),
            connected: facts.connected,
            preparing_index: facts.preparing_index,
            sending_index: facts.sending_index,
            last_activity_ms_ago: facts
                .last_activity
                .map(|at| millis(now.saturating_duration_since(at))),
        }
    }

    /// Recompute the state now and emit a transition if it changed.
    ///
    /// Same effect as an early idle timer firing. A no-op when nothing changed.
    pub fn refresh(&self) {
        self.shared.apply(|_, _| None);
    }
}

fn millis(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}

impl fmt::Debug for DeviceStateTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceStateTracker")
            .field("id", &self.shared.id)
            .field("idle_timeout", &self.shared.idle_timeout)
            .field("state", &self.current_state())
            .finish_non_exhaustive()
    }
}

impl Shared {
    /// Lock the facts. A panic from a contract violation poisons the mutex
    /// only after the facts were validated, so the data is still consistent.
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Mutate facts, emit the mutation's own event (if any), then emit a
    /// transition if the derived state changed.
    fn apply<F>(&self, mutate: F)
    where
        F: FnOnce(&mut ActivityFacts, Instant) -> Option<DeviceEvent>,
    {
        let transition = {
            let mut inner = self.lock();
            let now = Instant::now();

            if let Some(event) = mutate(&mut inner.facts, now) {
                self.sink.log(event);
            }

            let state = inner.facts.derive(now, self.idle_timeout);
            if state == inner.previous {
                None
            } else {
                let from = std::mem::replace(&mut inner.previous, state);
                self.sink.log(DeviceEvent::StateChanged {
                    id: self.id,
                    from,
                    to: state,
                });
                Some((from, state))
            }
        };

        if let Some((from, to)) = transition {
            tracing::debug!(device = %self.id.short(), %from, %to, "Device state changed");
        }
    }
}
