//! Device notifications and the sinks that receive them.
//!
//! Trackers push a [`DeviceEvent`] into an [`EventSink`] while holding their
//! own lock, which is what keeps per-device events in order. Sinks must
//! therefore only enqueue: no blocking, no delivery work, no failure
//! reported back to the tracker.

use peerwatch_types::{ConnectionInfo, DeviceId};
use std::collections::BTreeMap;
use std::fmt;
use tokio::runtime::Handle;
use tokio::sync::mpsc;

use crate::state::DeviceState;

/// Kind of a device notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// A connection to the device was established.
    DeviceConnected,
    /// The connection to the device was lost.
    DeviceDisconnected,
    /// The derived activity state changed.
    DeviceStateChanged,
}

impl EventKind {
    /// Name used on the event stream.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::DeviceConnected => "DeviceConnected",
            EventKind::DeviceDisconnected => "DeviceDisconnected",
            EventKind::DeviceStateChanged => "DeviceStateChanged",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A notification emitted by a device tracker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceEvent {
    /// Connection established.
    Connected {
        /// The device.
        id: DeviceId,
        /// Handshake metadata.
        info: ConnectionInfo,
    },
    /// Connection lost.
    Disconnected {
        /// The device.
        id: DeviceId,
        /// Why the connection ended.
        cause: String,
    },
    /// Derived state transition.
    StateChanged {
        /// The device.
        id: DeviceId,
        /// State before the transition.
        from: DeviceState,
        /// State after the transition.
        to: DeviceState,
    },
}

impl DeviceEvent {
    /// Kind of this event.
    pub fn kind(&self) -> EventKind {
        match self {
            DeviceEvent::Connected { .. } => EventKind::DeviceConnected,
            DeviceEvent::Disconnected { .. } => EventKind::DeviceDisconnected,
            DeviceEvent::StateChanged { .. } => EventKind::DeviceStateChanged,
        }
    }

    /// Device this event is about.
    pub fn device_id(&self) -> DeviceId {
        match self {
            DeviceEvent::Connected { id, .. }
            | DeviceEvent::Disconnected { id, .. }
            | DeviceEvent::StateChanged { id, .. } => *id,
        }
    }

    /// Flatten into the key/value record consumed by the event bus.
    pub fn fields(&self) -> BTreeMap<String, String> {
        let mut fields = BTreeMap::new();
        fields.insert("id".to_string(), self.device_id().to_string());

        match self {
            DeviceEvent::Connected { info, .. } => {
                fields.insert("deviceName".to_string(), info.device_name.clone());
                fields.insert("clientName".to_string(), info.client_name.clone());
                fields.insert("clientVersion".to_string(), info.client_version.clone());
                fields.insert("type".to_string(), info.connection_type.clone());
                if let Some(addr) = info.addr {
                    fields.insert("addr".to_string(), addr.to_string());
                }
            }
            DeviceEvent::Disconnected { cause, .. } => {
                fields.insert("error".to_string(), cause.clone());
            }
            DeviceEvent::StateChanged { from, to, .. } => {
                fields.insert("from".to_string(), from.to_string());
                fields.insert("to".to_string(), to.to_string());
            }
        }

        fields
    }
}

/// Receiver of device notifications.
///
/// Implementations are called with a tracker lock held. They must return
/// quickly and must not call back into the tracker.
pub trait EventSink: Send + Sync {
    /// Record one event. Best effort; never fails.
    fn log(&self, event: DeviceEvent);
}

/// Receiving half of a [`ChannelSink`].
pub type EventReceiver = mpsc::UnboundedReceiver<DeviceEvent>;

/// Sink that forwards events into an unbounded tokio channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<DeviceEvent>,
}

impl ChannelSink {
    /// Create a sink and the receiver that drains it.
    pub fn new() -> (Self, EventReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelSink {
    fn log(&self, event: DeviceEvent) {
        if let Err(e) = self.tx.send(event) {
            tracing::trace!("Event receiver gone, dropping {}", e.0.kind());
        }
    }
}

/// Sink that writes every event as a structured `tracing` record.
///
/// `log` only enqueues; a background task on the runtime does the logging,
/// so subscriber I/O never happens under a tracker lock. The task exits
/// once every clone of the sink is dropped and the queue is drained.
#[derive(Debug, Clone)]
pub struct TracingSink {
    queue: ChannelSink,
}

impl TracingSink {
    /// Create the sink and spawn its logging task on `runtime`.
    pub fn spawn(runtime: &Handle) -> Self {
        let (queue, rx) = ChannelSink::new();
        runtime.spawn(log_events(rx));
        Self { queue }
    }
}

impl EventSink for TracingSink {
    fn log(&self, event: DeviceEvent) {
        self.queue.log(event);
    }
}

async fn log_events(mut rx: EventReceiver) {
    while let Some(event) = rx.recv().await {
        trace_event(&event);
    }
}

fn trace_event(event: &DeviceEvent) {
    match event {
        DeviceEvent::Connected { id, info } => tracing::info!(
            target: "peerwatch::events",
            kind = %event.kind(),
            device = %id,
            device_name = %info.device_name,
            client_name = %info.client_name,
            client_version = %info.client_version,
            connection_type = %info.connection_type,
            addr = ?info.addr,
        ),
        DeviceEvent::Disconnected { id, cause } => tracing::info!(
            target: "peerwatch::events",
            kind = %event.kind(),
            device = %id,
            cause = %cause,
        ),
        DeviceEvent::StateChanged { id, from, to } => tracing::info!(
            target: "peerwatch::events",
            kind = %event.kind(),
            device = %id,
            from = %from,
            to = %to,
        ),
    }
}

/// Sink that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn log(&self, _event: DeviceEvent) {}
}
