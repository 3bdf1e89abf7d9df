//! Volatile Cache Adapter
//!
//! Wraps a [`VolatileBackend`] behind the hit/miss and success-flag contract
//! the coordinator relies on. No call on this type returns an error:
//!
//! - every backend call is bounded by the operation timeout
//! - a connectivity failure (including a timeout) flips the adapter into
//!   degraded mode and the same call is answered by the [`FallbackMap`]
//! - other backend failures are logged and reported as a miss or `false`
//!
//! While degraded, `get`/`set` go to the fallback map only; `connect()` (or a
//! health check) restores the backend. Before the backend is served again,
//! keys deleted during the outage are deleted from it and entries written to
//! the fallback map are replayed into it, so an invalidation made while
//! degraded does not resurface after recovery. A replay call that fails is
//! logged and dropped; the durable tier still holds the data.

use std::collections::HashSet;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::fallback::FallbackMap;
use crate::domain::ports::{BackendInfo, VolatileBackend, VolatileConnector};
use crate::error::{Error, Result};

/// Point-in-time view of the volatile tier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolatileSnapshot {
    /// Backend reachable
    pub connected: bool,
    /// Backend address, masked while connected
    pub endpoint: String,
    /// Entries held by the in-process fallback map
    pub fallback_entries: usize,
    /// Keys under the namespace in the backend
    pub backend_keys: Option<usize>,
    /// Backend server details
    pub backend: Option<BackendInfo>,
    /// Times the adapter switched to degraded mode
    pub degradations: u64,
    /// Error raised while collecting backend details
    pub error: Option<String>,
}

/// Invalidations held back while degraded
const MAX_PENDING_INVALIDATIONS: usize = 10_000;

/// Delete that could not reach the backend
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Invalidation {
    Key(String),
    Prefix(String),
}

/// Volatile tier adapter with transparent in-process fallback
pub struct VolatileCache {
    connector: Arc<dyn VolatileConnector>,
    backend: RwLock<Option<Arc<dyn VolatileBackend>>>,
    connected: AtomicBool,
    ever_connected: AtomicBool,
    fallback: FallbackMap,
    pending: Mutex<HashSet<Invalidation>>,
    timeout: Duration,
    degradations: AtomicU64,
}

impl VolatileCache {
    /// Create an adapter; it starts degraded until [`connect`](Self::connect)
    pub fn new(connector: Arc<dyn VolatileConnector>, timeout: Duration) -> Self {
        Self {
            connector,
            backend: RwLock::new(None),
            connected: AtomicBool::new(false),
            ever_connected: AtomicBool::new(false),
            fallback: FallbackMap::new(),
            pending: Mutex::new(HashSet::new()),
            timeout,
            degradations: AtomicU64::new(0),
        }
    }

    /// Adapter with no shared backend; always served from the fallback map
    pub fn fallback_only(timeout: Duration) -> Self {
        Self::new(Arc::new(NoBackend), timeout)
    }

    /// Connect and probe the backend. Never fails; returns `false` and stays
    /// degraded when the backend cannot be reached.
    pub async fn connect(&self) -> bool {
        let endpoint = self.connector.endpoint();

        let attempt = async {
            let backend = bounded(self.timeout, "volatile connect", self.connector.connect()).await?;
            bounded(self.timeout, "volatile ping", backend.ping()).await?;
            Ok::<_, Error>(backend)
        };

        match attempt.await {
            Ok(backend) => {
                self.reconcile(&backend).await;
                *self.backend.write() = Some(backend);
                self.ever_connected.store(true, Ordering::Release);
                self.connected.store(true, Ordering::Release);
                info!("Connected to volatile cache at {}", endpoint);
                true
            }
            Err(e) => {
                *self.backend.write() = None;
                self.connected.store(false, Ordering::Release);
                warn!(
                    "Failed to connect to volatile cache at {}: {}. Using in-process fallback.",
                    endpoint, e
                );
                false
            }
        }
    }

    /// Drop the backend connection
    pub async fn disconnect(&self) {
        let previous = self.backend.write().take();
        self.connected.store(false, Ordering::Release);
        if previous.is_some() {
            info!("Disconnected from volatile cache");
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    pub fn endpoint(&self) -> String {
        self.connector.endpoint()
    }

    pub fn fallback(&self) -> &FallbackMap {
        &self.fallback
    }

    pub fn degradations(&self) -> u64 {
        self.degradations.load(Ordering::Relaxed)
    }

    /// Fetch a value
    pub async fn get(&self, key: &str) -> Option<Bytes> {
        if self.is_connected() {
            match self.call("get", |b| async move { b.get(key).await }).await {
                Ok(value) => return value,
                Err(e) if e.is_connectivity() => {}
                Err(e) => {
                    warn!("Volatile get failed for {}: {}", key, e);
                    return None;
                }
            }
        }
        self.fallback.get(key)
    }

    /// Store a value; `false` only when the backend rejected the write
    pub async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> bool {
        if self.is_connected() {
            let payload = value.clone();
            match self
                .call("set", |b| async move { b.set(key, payload, ttl).await })
                .await
            {
                Ok(()) => return true,
                Err(e) if e.is_connectivity() => {}
                Err(e) => {
                    warn!("Volatile set failed for {}: {}", key, e);
                    return false;
                }
            }
        }
        self.fallback.insert(key, value, ttl);
        debug!("Stored {} in in-process fallback", key);
        true
    }

    /// Delete one key from both the backend and the fallback map.
    /// Deleting a missing key succeeds.
    pub async fn delete(&self, key: &str) -> bool {
        self.delete_many(&[key.to_string()]).await
    }

    /// Delete several keys from both the backend and the fallback map
    pub async fn delete_many(&self, keys: &[String]) -> bool {
        for key in keys {
            self.fallback.remove(key);
        }
        if keys.is_empty() {
            return true;
        }
        if !self.is_connected() {
            self.defer(keys.iter().cloned().map(Invalidation::Key));
            return true;
        }
        match self.call("delete", |b| async move { b.delete(keys).await }).await {
            Ok(_) => true,
            Err(e) if e.is_connectivity() => {
                self.defer(keys.iter().cloned().map(Invalidation::Key));
                true
            }
            Err(e) => {
                warn!("Volatile delete failed for {} keys: {}", keys.len(), e);
                false
            }
        }
    }

    /// Delete every key starting with `prefix`, returning how many were
    /// removed across both maps
    pub async fn delete_by_prefix(&self, prefix: &str) -> usize {
        let mut removed = self.fallback.remove_prefix(prefix);
        if !self.is_connected() {
            self.defer([Invalidation::Prefix(prefix.to_string())]);
            return removed;
        }
        match self
            .call("delete_by_prefix", |b| async move {
                b.delete_by_prefix(prefix).await
            })
            .await
        {
            Ok(count) => removed += count,
            Err(e) if e.is_connectivity() => {
                self.defer([Invalidation::Prefix(prefix.to_string())]);
            }
            Err(e) => warn!("Volatile prefix delete failed for {}*: {}", prefix, e),
        }
        removed
    }

    /// Invalidations waiting for the backend to return
    pub fn pending_invalidations(&self) -> usize {
        self.pending.lock().len()
    }

    /// Probe the backend; a failure degrades the adapter
    pub async fn ping(&self) -> bool {
        self.try_ping().await.is_ok()
    }

    /// Probe the backend, reporting why it failed
    pub async fn try_ping(&self) -> Result<()> {
        self.call("ping", |b| async move { b.ping().await }).await
    }

    /// Collect counters for reporting
    pub async fn snapshot(&self, namespace_prefix: &str) -> VolatileSnapshot {
        let connected = self.is_connected();
        let mut snapshot = VolatileSnapshot {
            connected,
            endpoint: if connected {
                "***".to_string()
            } else {
                self.endpoint()
            },
            fallback_entries: self.fallback.len(),
            backend_keys: None,
            backend: None,
            degradations: self.degradations(),
            error: None,
        };

        if connected {
            let details = async {
                let keys = self
                    .call("count", |b| async move { b.count_prefix(namespace_prefix).await })
                    .await?;
                let info = self.call("info", |b| async move { b.info().await }).await?;
                Ok::<_, Error>((keys, info))
            };
            match details.await {
                Ok((keys, info)) => {
                    snapshot.backend_keys = Some(keys);
                    snapshot.backend = Some(info);
                }
                Err(e) => snapshot.error = Some(e.to_string()),
            }
        }

        snapshot
    }

    /// Run one bounded backend call, degrading on connectivity failure
    async fn call<T, F, Fut>(&self, operation: &'static str, f: F) -> Result<T>
    where
        F: FnOnce(Arc<dyn VolatileBackend>) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let backend = self
            .backend
            .read()
            .clone()
            .ok_or_else(|| Error::Unavailable("volatile cache not connected".to_string()))?;

        let result = bounded(self.timeout, operation, f(backend)).await;
        if let Err(e) = &result {
            if e.is_connectivity() {
                self.degrade(operation, e);
            }
        }
        result
    }

    /// Remember deletes the backend missed; only a backend that once held
    /// data can serve them stale
    fn defer(&self, invalidations: impl IntoIterator<Item = Invalidation>) {
        if !self.ever_connected.load(Ordering::Acquire) {
            return;
        }
        let mut pending = self.pending.lock();
        for invalidation in invalidations {
            if pending.len() >= MAX_PENDING_INVALIDATIONS {
                warn!(
                    "{} invalidations pending; later deletes may resurface after reconnect",
                    pending.len()
                );
                return;
            }
            pending.insert(invalidation);
        }
    }

    /// Apply outage-time deletes to a fresh backend, then replay the
    /// fallback entries into it
    async fn reconcile(&self, backend: &Arc<dyn VolatileBackend>) {
        let pending: Vec<Invalidation> = self.pending.lock().drain().collect();
        let entries = self.fallback.drain();
        if pending.is_empty() && entries.is_empty() {
            return;
        }

        let mut keys = Vec::new();
        let mut prefixes = Vec::new();
        for invalidation in pending {
            match invalidation {
                Invalidation::Key(key) => keys.push(key),
                Invalidation::Prefix(prefix) => prefixes.push(prefix),
            }
        }

        let mut failures = 0usize;
        if !keys.is_empty() {
            if let Err(e) = bounded(self.timeout, "reconcile delete", backend.delete(&keys)).await {
                warn!("Failed to apply {} deferred deletes: {}", keys.len(), e);
                failures += keys.len();
            }
        }
        for prefix in &prefixes {
            if let Err(e) = bounded(
                self.timeout,
                "reconcile prefix delete",
                backend.delete_by_prefix(prefix),
            )
            .await
            {
                warn!("Failed to apply deferred prefix delete {}*: {}", prefix, e);
                failures += 1;
            }
        }

        let replayed = entries.len();
        for (key, data, ttl) in entries {
            if let Err(e) = bounded(self.timeout, "reconcile set", backend.set(&key, data, ttl)).await {
                warn!("Failed to replay fallback entry {}: {}", key, e);
                failures += 1;
            }
        }

        info!(
            "Reconciled volatile cache: {} deletes, {} prefix deletes, {} entries replayed, {} failures",
            keys.len(),
            prefixes.len(),
            replayed,
            failures
        );
    }

    fn degrade(&self, operation: &str, cause: &Error) {
        *self.backend.write() = None;
        if self.connected.swap(false, Ordering::AcqRel) {
            self.degradations.fetch_add(1, Ordering::Relaxed);
            warn!(
                "Volatile cache {} failed: {}. Switching to in-process fallback.",
                operation, cause
            );
        }
    }
}

async fn bounded<T>(
    timeout: Duration,
    operation: &'static str,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(Error::timeout(operation, timeout)),
    }
}

/// Connector for deployments without a shared cache
struct NoBackend;

#[async_trait]
impl VolatileConnector for NoBackend {
    async fn connect(&self) -> Result<Arc<dyn VolatileBackend>> {
        Err(Error::Unavailable("no volatile backend configured".to_string()))
    }

    fn endpoint(&self) -> String {
        "none".to_string()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::InMemoryBackend;

    const TIMEOUT: Duration = Duration::from_millis(200);

    async fn connected() -> (InMemoryBackend, VolatileCache) {
        let backend = InMemoryBackend::new();
        let cache = VolatileCache::new(Arc::new(backend.clone()), TIMEOUT);
        assert!(cache.connect().await);
        (backend, cache)
    }

    fn bytes(s: &'static str) -> Bytes {
        Bytes::from_static(s.as_bytes())
    }

    #[tokio::test]
    async fn test_connect_failure_is_degraded_not_error() {
        let backend = InMemoryBackend::new();
        backend.set_reachable(false);
        let cache = VolatileCache::new(Arc::new(backend), TIMEOUT);

        assert!(!cache.connect().await);
        assert!(!cache.is_connected());

        assert!(cache.set("ns:a", bytes("1"), Duration::from_secs(60)).await);
        assert_eq!(cache.get("ns:a").await, Some(bytes("1")));
        assert_eq!(cache.fallback().len(), 1);
    }

    #[tokio::test]
    async fn test_connected_round_trip_uses_backend() {
        let (backend, cache) = connected().await;

        assert!(cache.set("ns:a", bytes("1"), Duration::from_secs(60)).await);
        assert_eq!(cache.get("ns:a").await, Some(bytes("1")));
        assert_eq!(backend.len(), 1);
        assert!(cache.fallback().is_empty());
    }

    #[tokio::test]
    async fn test_outage_flips_to_fallback() {
        let (backend, cache) = connected().await;
        backend.set_reachable(false);

        assert!(cache.set("ns:a", bytes("1"), Duration::from_secs(60)).await);
        assert!(!cache.is_connected());
        assert_eq!(cache.degradations(), 1);
        assert_eq!(cache.get("ns:a").await, Some(bytes("1")));
        assert!(!cache.ping().await);
    }

    #[tokio::test]
    async fn test_slow_backend_times_out_into_fallback() {
        let (backend, cache) = connected().await;
        backend.set_latency(Duration::from_secs(5));

        assert_eq!(cache.get("ns:missing").await, None);
        assert!(!cache.is_connected());
    }

    #[tokio::test]
    async fn test_reconnect_after_outage() {
        let (backend, cache) = connected().await;
        backend.set_reachable(false);
        assert!(!cache.ping().await);

        backend.set_reachable(true);
        assert!(cache.connect().await);
        assert!(cache.ping().await);
    }

    #[tokio::test]
    async fn test_delete_by_prefix_both_maps() {
        let (backend, cache) = connected().await;
        let ttl = Duration::from_secs(60);
        cache.set("ns:session:2024:5:R", bytes("r"), ttl).await;
        cache.set("ns:session:2024:6:R", bytes("r"), ttl).await;

        backend.set_reachable(false);
        cache.set("ns:session:2024:5:Q", bytes("q"), ttl).await;
        backend.set_reachable(true);
        assert!(cache.connect().await);

        assert_eq!(cache.delete_by_prefix("ns:session:2024:5:").await, 2);
        assert_eq!(cache.get("ns:session:2024:5:R").await, None);
        assert!(cache.get("ns:session:2024:6:R").await.is_some());
        assert!(cache.fallback().is_empty());
    }

    #[tokio::test]
    async fn test_delete_missing_key_succeeds() {
        let (_backend, cache) = connected().await;
        assert!(cache.delete("ns:never").await);
    }

    #[tokio::test]
    async fn test_snapshot_masks_endpoint_when_connected() {
        let (_backend, cache) = connected().await;
        cache.set("ns:a", bytes("1"), Duration::from_secs(60)).await;

        let snapshot = cache.snapshot("ns:").await;
        assert!(snapshot.connected);
        assert_eq!(snapshot.endpoint, "***");
        assert_eq!(snapshot.backend_keys, Some(1));

        cache.disconnect().await;
        let snapshot = cache.snapshot("ns:").await;
        assert!(!snapshot.connected);
        assert_eq!(snapshot.endpoint, "memory://local");
        assert_eq!(snapshot.backend_keys, None);
    }

    #[tokio::test]
    async fn test_fallback_only() {
        let cache = VolatileCache::fallback_only(TIMEOUT);
        assert!(!cache.connect().await);
        assert!(cache.set("k", bytes("v"), Duration::from_secs(1)).await);
        assert_eq!(cache.get("k").await, Some(bytes("v")));
        assert_eq!(cache.endpoint(), "none");
    }

    #[tokio::test]
    async fn test_outage_delete_applied_on_reconnect() {
        let (backend, cache) = connected().await;
        let ttl = Duration::from_secs(60);
        cache.set("ns:session:2024:5:R", bytes("old"), ttl).await;
        cache.set("ns:session:2024:6:R", bytes("keep"), ttl).await;

        backend.set_reachable(false);
        assert!(cache.delete("ns:session:2024:5:R").await);
        assert!(!cache.is_connected());
        assert_eq!(cache.pending_invalidations(), 1);

        backend.set_reachable(true);
        assert!(cache.connect().await);
        assert_eq!(cache.pending_invalidations(), 0);
        assert_eq!(cache.get("ns:session:2024:5:R").await, None);
        assert_eq!(cache.get("ns:session:2024:6:R").await, Some(bytes("keep")));
    }

    #[tokio::test]
    async fn test_outage_writes_replayed_on_reconnect() {
        let (backend, cache) = connected().await;
        let ttl = Duration::from_secs(60);
        cache.set("ns:a", bytes("old"), ttl).await;

        backend.set_reachable(false);
        cache.set("ns:a", bytes("new"), ttl).await;
        cache.delete_by_prefix("ns:b").await;
        cache.set("ns:b:1", bytes("fresh"), ttl).await;

        backend.set_reachable(true);
        assert!(cache.connect().await);
        assert!(cache.fallback().is_empty());
        assert_eq!(cache.get("ns:a").await, Some(bytes("new")));
        assert_eq!(cache.get("ns:b:1").await, Some(bytes("fresh")));
        assert_eq!(backend.len(), 2);
    }

    #[tokio::test]
    async fn test_never_connected_defers_nothing() {
        let cache = VolatileCache::fallback_only(TIMEOUT);
        cache.delete("k").await;
        cache.delete_by_prefix("ns:").await;
        assert_eq!(cache.pending_invalidations(), 0);
    }
}
