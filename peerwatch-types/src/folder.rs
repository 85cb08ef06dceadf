//! Folder type as stored in configuration.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

/// How a folder participates in synchronization.
///
/// Decoding is lenient: unrecognized text resolves to
/// [`FolderType::SendReceive`] instead of failing, so configs written by
/// newer or older versions still load.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum FolderType {
    /// Changes flow in both directions.
    #[default]
    SendReceive,
    /// Local changes are announced, remote changes are not applied.
    SendOnly,
    /// Remote data is accepted and discarded; nothing is scanned or pulled.
    Sink,
}

impl FolderType {
    /// Canonical textual encoding.
    pub fn as_str(&self) -> &'static str {
        match self {
            FolderType::SendReceive => "readwrite",
            FolderType::SendOnly => "readonly",
            FolderType::Sink => "sink",
        }
    }

    /// Decode a textual token, falling back to the default for anything
    /// unrecognized.
    pub fn from_token(s: &str) -> Self {
        match s {
            "readwrite" | "sendreceive" => FolderType::SendReceive,
            "readonly" | "sendonly" => FolderType::SendOnly,
            "sink" => FolderType::Sink,
            _ => FolderType::default(),
        }
    }
}

impl fmt::Display for FolderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FolderType {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from_token(s))
    }
}

impl Serialize for FolderType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for FolderType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Self::from_token(&s))
    }
}
