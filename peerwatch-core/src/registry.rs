//! Concurrency-safe map of device trackers.
//!
//! Trackers are created lazily on first reference and removed explicitly
//! when a device leaves the configuration. The map's shard locks are only
//! held long enough to clone an `Arc` out; no tracker lock is ever taken
//! while a shard lock is held.

use dashmap::DashMap;
use peerwatch_types::DeviceId;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;

use crate::config::DevicesConfig;
use crate::event::EventSink;
use crate::state::DeviceState;
use crate::tracker::{DeviceSnapshot, DeviceStateTracker};

/// All device trackers, keyed by device id.
pub struct DeviceStateRegistry {
    trackers: DashMap<DeviceId, Arc<DeviceStateTracker>>,
    idle_timeout: Duration,
    sink: Arc<dyn EventSink>,
    runtime: Handle,
}

impl std::fmt::Debug for DeviceStateRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceStateRegistry")
            .field("idle_timeout", &self.idle_timeout)
            .field("devices", &self.trackers.len())
            .finish_non_exhaustive()
    }
}

impl DeviceStateRegistry {
    /// Create an empty registry. Idle timers run on `runtime`.
    pub fn new(idle_timeout: Duration, sink: Arc<dyn EventSink>, runtime: Handle) -> Self {
        Self {
            trackers: DashMap::new(),
            idle_timeout,
            sink,
            runtime,
        }
    }

    /// Create a registry from configuration on the current tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn from_config(config: &DevicesConfig, sink: Arc<dyn EventSink>) -> Self {
        Self::new(config.idle_timeout(), sink, Handle::current())
    }

    /// Tracker for `id`, created on first access.
    ///
    /// Concurrent first accesses for the same id all receive the same
    /// tracker; only one is ever constructed.
    pub fn get(&self, id: &DeviceId) -> Arc<DeviceStateTracker> {
        self.trackers
            .entry(*id)
            .or_insert_with(|| {
                tracing::debug!(device = %id.short(), "Creating device state tracker");
                Arc::new(DeviceStateTracker::new(
                    *id,
                    self.idle_timeout,
                    self.sink.clone(),
                    &self.runtime,
                ))
            })
            .value()
            .clone()
    }

    /// Tracker for `id` if one exists. Never creates.
    pub fn peek(&self, id: &DeviceId) -> Option<Arc<DeviceStateTracker>> {
        self.trackers.get(id).map(|entry| entry.value().clone())
    }

    /// State of `id`; devices never referenced are Offline.
    pub fn current_state(&self, id: &DeviceId) -> DeviceState {
        self.peek(id)
            .map(|tracker| tracker.current_state())
            .unwrap_or_default()
    }

    /// Forget `id`. Returns whether a tracker was present.
    ///
    /// Handles already held by callers stay valid; the tracker and its idle
    /// timer are released once the last handle drops.
    pub fn remove(&self, id: &DeviceId) -> bool {
        let removed = self.trackers.remove(id).is_some();
        if removed {
            tracing::debug!(device = %id.short(), "Removed device state tracker");
        }
        removed
    }

    /// Number of tracked devices.
    pub fn len(&self) -> usize {
        self.trackers.len()
    }

    /// Whether no devices are tracked.
    pub fn is_empty(&self) -> bool {
        self.trackers.is_empty()
    }

    /// Idle window applied to every tracker in this registry.
    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    /// Snapshot of every tracked device, ordered by device id text.
    pub fn snapshot(&self) -> Vec<DeviceSnapshot> {
        let mut snapshots: Vec<DeviceSnapshot> = self
            .handles()
            .iter()
            .map(|tracker| tracker.snapshot())
            .collect();
        snapshots.sort_by_key(|snap| snap.id.to_string());
        snapshots
    }

    /// Recompute every tracker's state, emitting any pending transitions
    /// (e.g. idle windows that expired before their timer ran).
    pub fn refresh_all(&self) {
        for tracker in self.handles() {
            tracker.refresh();
        }
    }

    // Clone handles out first so no shard lock is held while locking trackers.
    fn handles(&self) -> Vec<Arc<DeviceStateTracker>> {
        self.trackers
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }
}
