//! # peerwatch-core
//!
//! Per-device activity state tracking for peer-to-peer sync.
//!
//! Connection handling code reports what happens to each remote device
//! (connect, disconnect, index preparation and transmission, data requests).
//! A [`DeviceStateTracker`] turns those signals into one derived
//! [`DeviceState`] per device and emits a [`DeviceEvent`] on every edge.
//! An idle timer per tracker lets devices age out of `Syncing` without
//! anyone calling in.
//!
//! ## Layout
//!
//! - [`state`] - pure derivation of state from facts, no I/O
//! - [`tracker`] - the locked per-device state machine
//! - [`registry`] - lazy, concurrent map of trackers
//! - [`timer`] - resettable idle timer on the tokio runtime
//! - [`event`] - notifications and sinks
//! - [`folder`] - folder service interface and the sink folder
//! - [`config`] - TOML configuration

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod event;
pub mod folder;
pub mod registry;
pub mod state;
pub mod timer;
pub mod tracker;

pub use config::{Config, ConfigError, DevicesConfig};
pub use event::{
    ChannelSink, DeviceEvent, EventKind, EventReceiver, EventSink, NullSink, TracingSink,
};
pub use folder::{
    FolderConfig, FolderConstructor, FolderError, FolderFactories, FolderService, FolderState,
    FolderStatus, SinkFolder,
};
pub use registry::DeviceStateRegistry;
pub use state::{ActivityFacts, DeviceState};
pub use timer::IdleTimer;
pub use tracker::{DeviceSnapshot, DeviceStateTracker};
