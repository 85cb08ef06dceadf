//! Folder services and the no-op sink folder.
//!
//! The sync engine drives each configured folder through a
//! [`FolderService`]. Which implementation a folder gets depends on its
//! [`FolderType`]; constructors are looked up in [`FolderFactories`].
//! Only the sink folder ships here: it accepts everything and does nothing.

use async_trait::async_trait;
use peerwatch_types::FolderType;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::time::{Duration, SystemTime};
use thiserror::Error;

/// A folder as it appears in configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderConfig {
    /// Folder id shared between devices.
    pub id: String,
    /// Local path.
    pub path: PathBuf,
    /// How the folder participates in sync.
    #[serde(rename = "type", default)]
    pub folder_type: FolderType,
}

/// Folder service errors.
#[derive(Debug, Error)]
pub enum FolderError {
    /// No service constructor is registered for this folder type.
    #[error("no folder service available for type {0}")]
    NoFactory(FolderType),

    /// Scanning failed.
    #[error("scan of folder {id} failed: {reason}")]
    Scan {
        /// Folder id.
        id: String,
        /// What went wrong.
        reason: String,
    },
}

/// Coarse activity state of a folder.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FolderState {
    /// Nothing to do.
    #[default]
    Idle,
    /// Walking the filesystem.
    Scanning,
    /// Pulling changes from devices.
    Syncing,
    /// Stopped on an error.
    Error,
}

impl fmt::Display for FolderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FolderState::Idle => "idle",
            FolderState::Scanning => "scanning",
            FolderState::Syncing => "syncing",
            FolderState::Error => "error",
        };
        f.write_str(s)
    }
}

/// Folder state plus when it last changed and the error, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderStatus {
    /// Current state.
    pub state: FolderState,
    /// When `state` was entered.
    pub changed_at: SystemTime,
    /// Last recorded error message.
    pub error: Option<String>,
}

/// Interface the sync engine uses to drive one folder.
#[async_trait]
pub trait FolderService: Send + Sync + fmt::Display {
    /// Run the service until stopped.
    async fn serve(&self);

    /// Ask a running service to stop.
    fn stop(&self);

    /// Rescan the given subdirectories (all when empty).
    async fn scan(&self, subdirs: &[String]) -> Result<(), FolderError>;

    /// The folder's index changed and pulling may be needed.
    fn index_updated(&self);

    /// Postpone the next scheduled scan by `delay`.
    fn delay_scan(&self, delay: Duration);

    /// Move `path` to the front of the pull queue.
    fn bring_to_front(&self, path: &str);

    /// Queued and in-progress pull jobs.
    fn jobs(&self) -> (Vec<String>, Vec<String>);

    /// Current status.
    fn status(&self) -> FolderStatus;

    /// Record a state change.
    fn set_state(&self, state: FolderState);

    /// Record an error.
    fn set_error(&self, message: String);

    /// Clear a recorded error.
    fn clear_error(&self);
}

/// Folder that receives data and throws it away.
///
/// Every operation is a no-op and the folder always reports Idle.
#[derive(Debug, Clone)]
pub struct SinkFolder {
    config: FolderConfig,
}

impl SinkFolder {
    /// Create a sink folder for `config`.
    pub fn new(config: FolderConfig) -> Self {
        Self { config }
    }

    /// The folder's configuration.
    pub fn config(&self) -> &FolderConfig {
        &self.config
    }
}

impl fmt::Display for SinkFolder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sinkFolder/{}", self.config.id)
    }
}

#[async_trait]
impl FolderService for SinkFolder {
    async fn serve(&self) {
        tracing::debug!("{} starting", self);
        tracing::debug!("{} exiting", self);
    }

    fn stop(&self) {}

    async fn scan(&self, _subdirs: &[String]) -> Result<(), FolderError> {
        Ok(())
    }

    fn index_updated(&self) {}

    fn delay_scan(&self, _delay: Duration) {}

    fn bring_to_front(&self, _path: &str) {}

    fn jobs(&self) -> (Vec<String>, Vec<String>) {
        (Vec::new(), Vec::new())
    }

    fn status(&self) -> FolderStatus {
        FolderStatus {
            state: FolderState::Idle,
            changed_at: SystemTime::now(),
            error: None,
        }
    }

    fn set_state(&self, _state: FolderState) {}

    fn set_error(&self, _message: String) {}

    fn clear_error(&self) {}
}

fn sink_folder(config: FolderConfig) -> Box<dyn FolderService> {
    Box::new(SinkFolder::new(config))
}

/// Constructor for a folder service.
pub type FolderConstructor = fn(FolderConfig) -> Box<dyn FolderService>;

/// Folder type to service constructor table.
#[derive(Clone)]
pub struct FolderFactories {
    constructors: HashMap<FolderType, FolderConstructor>,
}

impl fmt::Debug for FolderFactories {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut types: Vec<_> = self.constructors.keys().map(|t| t.as_str()).collect();
        types.sort_unstable();
        f.debug_struct("FolderFactories")
            .field("types", &types)
            .finish()
    }
}

impl FolderFactories {
    /// An empty table.
    pub fn empty() -> Self {
        Self {
            constructors: HashMap::new(),
        }
    }

    /// A table with every service this crate provides.
    pub fn with_defaults() -> Self {
        let mut factories = Self::empty();
        factories.register(FolderType::Sink, sink_folder);
        factories
    }

    /// Register (or replace) the constructor for `folder_type`.
    pub fn register(&mut self, folder_type: FolderType, constructor: FolderConstructor) {
        self.constructors.insert(folder_type, constructor);
    }

    /// Whether a constructor exists for `folder_type`.
    pub fn supports(&self, folder_type: FolderType) -> bool {
        self.constructors.contains_key(&folder_type)
    }

    /// Build the service for a configured folder.
    pub fn create(&self, config: FolderConfig) -> Result<Box<dyn FolderService>, FolderError> {
        let constructor = self
            .constructors
            .get(&config.folder_type)
            .ok_or(FolderError::NoFactory(config.folder_type))?;
        Ok(constructor(config))
    }
}

impl Default for FolderFactories {
    fn default() -> Self {
        Self::with_defaults()
    }
}
