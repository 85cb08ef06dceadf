//! Device identity for peerwatch.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::IdError;

/// Length of a device identifier in bytes.
pub const DEVICE_ID_LEN: usize = 32;

/// A unique identifier for a remote device in the sync network.
///
/// 32 bytes, displayed as URL-safe base64. Only used as a lookup key;
/// nothing in the tracker inspects its contents.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceId([u8; DEVICE_ID_LEN]);

impl DeviceId {
    /// Create a new random DeviceId.
    pub fn random() -> Self {
        let mut bytes = [0u8; DEVICE_ID_LEN];
        getrandom::getrandom(&mut bytes).expect("getrandom failed");
        Self(bytes)
    }

    /// Derive a DeviceId from a peer's certificate or public key bytes.
    ///
    /// The id is the SHA-256 digest of the raw material, so the same
    /// certificate always maps to the same device.
    pub fn from_certificate(cert: &[u8]) -> Self {
        use sha2::{Digest, Sha256};
        let digest = Sha256::digest(cert);
        let mut bytes = [0u8; DEVICE_ID_LEN];
        bytes.copy_from_slice(&digest);
        Self(bytes)
    }

    /// Create a DeviceId from raw bytes.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() == DEVICE_ID_LEN {
            let mut arr = [0u8; DEVICE_ID_LEN];
            arr.copy_from_slice(bytes);
            Some(Self(arr))
        } else {
            None
        }
    }

    /// Get the raw bytes of this DeviceId.
    pub fn as_bytes(&self) -> &[u8; DEVICE_ID_LEN] {
        &self.0
    }

    /// Short form used in log lines.
    pub fn short(&self) -> String {
        self.to_string()[..8].to_string()
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", URL_SAFE_NO_PAD.encode(self.0))
    }
}

impl fmt::Debug for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DeviceId({})", self.short())
    }
}

impl FromStr for DeviceId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = URL_SAFE_NO_PAD
            .decode(s.trim())
            .map_err(|e| IdError::Encoding(e.to_string()))?;
        Self::from_bytes(&bytes).ok_or(IdError::Length {
            expected: DEVICE_ID_LEN,
            actual: bytes.len(),
        })
    }
}

impl Serialize for DeviceId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for DeviceId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_parse_roundtrip() {
        let id = DeviceId::random();
        let parsed: DeviceId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn from_certificate_is_stable() {
        let a = DeviceId::from_certificate(b"laptop-cert");
        let b = DeviceId::from_certificate(b"laptop-cert");
        let c = DeviceId::from_certificate(b"phone-cert");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn from_bytes_rejects_wrong_length() {
        assert!(DeviceId::from_bytes(&[0u8; 16]).is_none());
        assert!(DeviceId::from_bytes(&[0u8; 32]).is_some());
    }

    #[test]
    fn parse_rejects_short_input() {
        let err = "AAAA".parse::<DeviceId>().unwrap_err();
        assert!(matches!(
            err,
            IdError::Length {
                expected: 32,
                actual: 3
            }
        ));
    }

    #[test]
    fn parse_rejects_bad_encoding() {
        let err = "not base64 at all!".parse::<DeviceId>().unwrap_err();
        assert!(matches!(err, IdError::Encoding(_)));
    }

    #[test]
    fn debug_is_truncated() {
        let id = DeviceId::from_bytes(&[0u8; 32]).unwrap();
        assert_eq!(format!("{:?}", id), "DeviceId(AAAAAAAA)");
    }

    #[test]
    fn serializes_as_string() {
        let id = DeviceId::from_certificate(b"x");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", id));
        let back: DeviceId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
