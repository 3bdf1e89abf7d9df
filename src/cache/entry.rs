//! Cache Entry Types
//!
//! [`CacheEntry`] is the in-process representation used by the fallback
//! map; [`Envelope`] is the serialized form written to any volatile backend,
//! carrying the insertion time and effective TTL next to the payload.

use std::time::{Duration, Instant};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Value held by an in-process map, expiring lazily on read
#[derive(Clone)]
pub struct CacheEntry {
    data: Bytes,
    inserted_at: Instant,
    ttl: Duration,
}

impl CacheEntry {
    /// Create an entry that expires `ttl` after now
    pub fn new(data: Bytes, ttl: Duration) -> Self {
        Self {
            data,
            inserted_at: Instant::now(),
            ttl,
        }
    }

    /// Get data (zero-copy)
    #[inline]
    pub fn data(&self) -> &Bytes {
        &self.data
    }

    #[inline]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    #[inline]
    pub fn age(&self) -> Duration {
        self.inserted_at.elapsed()
    }

    /// Expired once its age exceeds its TTL
    #[inline]
    pub fn is_expired(&self) -> bool {
        self.age() > self.ttl
    }

    /// Time left before expiry
    pub fn remaining(&self) -> Duration {
        self.ttl.saturating_sub(self.age())
    }
}

impl std::fmt::Debug for CacheEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheEntry")
            .field("size", &self.data.len())
            .field("ttl", &self.ttl)
            .field("is_expired", &self.is_expired())
            .finish()
    }
}

/// Payload wrapper stored in the volatile tier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<T> {
    /// When the value entered the cache
    pub cached_at: DateTime<Utc>,
    /// Effective TTL in milliseconds
    pub ttl_ms: u64,
    pub payload: T,
}

impl<T> Envelope<T> {
    pub fn new(payload: T, ttl: Duration) -> Self {
        Self {
            cached_at: Utc::now(),
            ttl_ms: ttl.as_millis().min(u64::MAX as u128) as u64,
            payload,
        }
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }
}

impl<T: Serialize> Envelope<T> {
    /// Serialize into the wire form
    pub fn encode(&self) -> Result<Bytes> {
        Ok(Bytes::from(serde_json::to_vec(self)?))
    }
}

impl<T: DeserializeOwned> Envelope<T> {
    /// Parse the wire form
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| Error::Serialization(e.to_string()))
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_entry_creation() {
        let entry = CacheEntry::new(Bytes::from_static(b"Hello"), Duration::from_secs(60));
        assert_eq!(entry.data().as_ref(), b"Hello");
        assert!(!entry.is_expired());
        assert!(entry.remaining() <= Duration::from_secs(60));
    }

    #[test]
    fn test_cache_entry_expires() {
        let entry = CacheEntry::new(Bytes::from_static(b"x"), Duration::from_millis(5));
        std::thread::sleep(Duration::from_millis(15));
        assert!(entry.is_expired());
        assert_eq!(entry.remaining(), Duration::ZERO);
    }

    #[test]
    fn test_cache_entry_debug() {
        let entry = CacheEntry::new(Bytes::from_static(b"Test"), Duration::from_secs(1));
        let debug = format!("{:?}", entry);
        assert!(debug.contains("CacheEntry"));
        assert!(debug.contains("size"));
    }

    #[test]
    fn test_envelope_carries_metadata() {
        let envelope = Envelope::new(vec![1, 2, 3], Duration::from_secs(90));
        let bytes = envelope.encode().unwrap();

        let text = std::str::from_utf8(&bytes).unwrap();
        assert!(text.contains("cached_at"));
        assert!(text.contains("\"ttl_ms\":90000"));

        let decoded: Envelope<Vec<i32>> = Envelope::decode(&bytes).unwrap();
        assert_eq!(decoded.payload, vec![1, 2, 3]);
        assert_eq!(decoded.ttl(), Duration::from_secs(90));
    }

    #[test]
    fn test_envelope_keeps_floats_exact() {
        use crate::domain::model::Cell;

        let rows = vec![vec![
            Cell::Float(9681.284959992001),
            Cell::Float(7318.3191902379995),
            Cell::Float(2315.3127576379998),
            Cell::Float(1.0715660391465826e-75),
        ]];
        let bytes = Envelope::new(&rows, Duration::from_secs(60)).encode().unwrap();
        let decoded: Envelope<Vec<Vec<Cell>>> = Envelope::decode(&bytes).unwrap();
        assert_eq!(decoded.payload, rows);
    }

    #[test]
    fn test_envelope_rejects_garbage() {
        let err = Envelope::<Vec<i32>>::decode(b"{not json").unwrap_err();
        assert!(matches!(err, Error::Serialization(_)));
    }
}
