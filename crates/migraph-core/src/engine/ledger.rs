//! Applied-migration ledger rows.

use crate::error::EngineError;
use rkyv::{Archive, Deserialize, Serialize};

/// One applied node, as recorded by a schema engine.
#[derive(Debug, Clone, PartialEq, Eq, Archive, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Application name.
    pub app: String,
    /// Node number within the application.
    pub number: u32,
    /// Node name (without the number prefix).
    pub name: String,
    /// When the node was applied (microseconds since epoch).
    pub applied_at: i64,
}

impl LedgerEntry {
    /// Create an entry stamped with the current time.
    pub fn new(app: impl Into<String>, number: u32, name: impl Into<String>) -> Self {
        Self {
            app: app.into(),
            number,
            name: name.into(),
            applied_at: chrono::Utc::now().timestamp_micros(),
        }
    }

    /// Storage key: `app \0 number(be)`, so rows sort by app then number.
    pub fn key(app: &str, number: u32) -> Vec<u8> {
        let mut key = Vec::with_capacity(app.len() + 5);
        key.extend_from_slice(app.as_bytes());
        key.push(0);
        key.extend_from_slice(&number.to_be_bytes());
        key
    }

    /// Serialize the entry to bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, EngineError> {
        rkyv::to_bytes::<rkyv::rancor::Error>(self)
            .map(|v| v.to_vec())
            .map_err(|e| EngineError::Serialization(e.to_string()))
    }

    /// Deserialize an entry from bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, EngineError> {
        // sled hands back values without alignment guarantees
        let mut aligned = rkyv::util::AlignedVec::<16>::new();
        aligned.extend_from_slice(bytes);
        rkyv::from_bytes::<Self, rkyv::rancor::Error>(&aligned)
            .map_err(|e| EngineError::Deserialization(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_ordering() {
        assert!(LedgerEntry::key("users", 2) < LedgerEntry::key("users", 10));
        assert!(LedgerEntry::key("blog", 9) < LedgerEntry::key("users", 1));
    }

    #[test]
    fn test_entry_serialization() {
        let entry = LedgerEntry::new("users", 3, "auto_20240101_120000");
        let bytes = entry.to_bytes().unwrap();
        let restored = LedgerEntry::from_bytes(&bytes).unwrap();
        assert_eq!(restored, entry);
    }
}
