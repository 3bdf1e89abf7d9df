//! In-Memory Volatile Backend
//!
//! Process-local implementation of the volatile ports. Behaves like a shared
//! cache service (TTL applied by the backend, prefix deletion, ping) and can
//! be switched unreachable or slowed down, which makes it the backend of
//! choice for tests and single-process deployments.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use crate::cache::FallbackMap;
use crate::domain::ports::{BackendInfo, VolatileBackend, VolatileConnector};
use crate::error::{Error, Result};

#[derive(Debug, Default)]
struct Inner {
    map: FallbackMap,
    unreachable: AtomicBool,
    latency_ms: AtomicU64,
    reads: AtomicU64,
    writes: AtomicU64,
    deletes: AtomicU64,
}

/// In-memory backend; clones share the same storage
#[derive(Debug, Clone, Default)]
pub struct InMemoryBackend {
    inner: Arc<Inner>,
}

impl InMemoryBackend {
    /// Create a new, reachable backend
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate an outage (`false`) or recovery (`true`)
    pub fn set_reachable(&self, reachable: bool) {
        self.inner.unreachable.store(!reachable, Ordering::Relaxed);
    }

    /// Delay every call by `latency`
    pub fn set_latency(&self, latency: Duration) {
        self.inner
            .latency_ms
            .store(latency.as_millis() as u64, Ordering::Relaxed);
    }

    /// Stored entries, including expired ones not yet read
    pub fn len(&self) -> usize {
        self.inner.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.map.is_empty()
    }

    pub fn reads(&self) -> u64 {
        self.inner.reads.load(Ordering::Relaxed)
    }

    pub fn writes(&self) -> u64 {
        self.inner.writes.load(Ordering::Relaxed)
    }

    pub fn deletes(&self) -> u64 {
        self.inner.deletes.load(Ordering::Relaxed)
    }

    async fn check(&self) -> Result<()> {
        let latency = self.inner.latency_ms.load(Ordering::Relaxed);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
        if self.inner.unreachable.load(Ordering::Relaxed) {
            return Err(Error::Unavailable(
                "in-memory backend unreachable".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl VolatileBackend for InMemoryBackend {
    async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        self.check().await?;
        self.inner.reads.fetch_add(1, Ordering::Relaxed);
        Ok(self.inner.map.get(key))
    }

    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<()> {
        self.check().await?;
        self.inner.writes.fetch_add(1, Ordering::Relaxed);
        self.inner.map.insert(key, value, ttl);
        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> Result<usize> {
        self.check().await?;
        self.inner.deletes.fetch_add(1, Ordering::Relaxed);
        Ok(keys.iter().filter(|k| self.inner.map.remove(k)).count())
    }

    async fn delete_by_prefix(&self, prefix: &str) -> Result<usize> {
        self.check().await?;
        self.inner.deletes.fetch_add(1, Ordering::Relaxed);
        Ok(self.inner.map.remove_prefix(prefix))
    }

    async fn count_prefix(&self, prefix: &str) -> Result<usize> {
        self.check().await?;
        Ok(self.inner.map.count_prefix(prefix))
    }

    async fn ping(&self) -> Result<()> {
        self.check().await
    }

    async fn info(&self) -> Result<BackendInfo> {
        self.check().await?;
        Ok(BackendInfo {
            version: Some(format!("in-memory/{}", env!("CARGO_PKG_VERSION"))),
            used_memory: None,
        })
    }
}

#[async_trait]
impl VolatileConnector for InMemoryBackend {
    async fn connect(&self) -> Result<Arc<dyn VolatileBackend>> {
        self.check().await?;
        Ok(Arc::new(self.clone()))
    }

    fn endpoint(&self) -> String {
        "memory://local".to_string()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_backend() {
        let backend = InMemoryBackend::new();
        let ttl = Duration::from_secs(60);

        backend.set("ns:a", Bytes::from("1"), ttl).await.unwrap();
        backend.set("ns:b", Bytes::from("2"), ttl).await.unwrap();

        assert_eq!(backend.get("ns:a").await.unwrap(), Some(Bytes::from("1")));
        assert_eq!(backend.count_prefix("ns:").await.unwrap(), 2);
        assert_eq!(
            backend.delete(&["ns:a".to_string(), "ns:x".to_string()]).await.unwrap(),
            1
        );
        assert_eq!(backend.delete_by_prefix("ns:").await.unwrap(), 1);
        assert!(backend.is_empty());
        assert_eq!(backend.writes(), 2);
    }

    #[tokio::test]
    async fn test_backend_applies_ttl() {
        let backend = InMemoryBackend::new();
        backend
            .set("k", Bytes::from("v"), Duration::from_millis(10))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(25)).await;
        assert_eq!(backend.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_unreachable() {
        let backend = InMemoryBackend::new();
        backend.set_reachable(false);

        let err = backend.ping().await.unwrap_err();
        assert!(err.is_connectivity());
        assert!(backend.connect().await.is_err());

        backend.set_reachable(true);
        assert!(backend.ping().await.is_ok());
    }

    #[tokio::test]
    async fn test_clones_share_storage() {
        let backend = InMemoryBackend::new();
        let connected = backend.connect().await.unwrap();
        connected
            .set("shared", Bytes::from("x"), Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(backend.len(), 1);
    }
}
