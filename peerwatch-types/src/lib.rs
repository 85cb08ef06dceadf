//! # peerwatch-types
//!
//! Shared types for peerwatch device activity tracking.
//!
//! - [`DeviceId`] - identity of a remote peer
//! - [`ConnectionInfo`] - handshake metadata reported on connect
//! - [`FolderType`] - how a configured folder participates in sync
//! - [`IdError`] - device id parsing errors

#![warn(missing_docs)]
#![warn(clippy::all)]

mod connection;
mod error;
mod folder;
mod ids;

pub use connection::ConnectionInfo;
pub use error::IdError;
pub use folder::FolderType;
pub use ids::{DeviceId, DEVICE_ID_LEN};
