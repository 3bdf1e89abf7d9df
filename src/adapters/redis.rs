//! Redis Adapter
//!
//! Implements the volatile ports over Redis using a multiplexed
//! [`ConnectionManager`], which reconnects on its own after transient
//! failures. Values are stored with millisecond TTLs (`SET .. PX`); prefix
//! deletion scans with `SCAN MATCH` and deletes in batches rather than using
//! the blocking `KEYS` command.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use redis::aio::ConnectionManager;
use tracing::debug;

use crate::domain::ports::{BackendInfo, VolatileBackend, VolatileConnector};
use crate::error::{Error, Result};

/// Keys requested per SCAN round and deleted per DEL call
const SCAN_BATCH: usize = 500;

/// Opens [`RedisBackend`] connections
#[derive(Debug, Clone)]
pub struct RedisConnector {
    url: String,
}

impl RedisConnector {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl VolatileConnector for RedisConnector {
    async fn connect(&self) -> Result<Arc<dyn VolatileBackend>> {
        let client = redis::Client::open(self.url.as_str())?;
        let manager = ConnectionManager::new(client).await?;
        debug!("Opened Redis connection manager for {}", self.url);
        Ok(Arc::new(RedisBackend { manager }))
    }

    fn endpoint(&self) -> String {
        self.url.clone()
    }
}

/// Volatile backend over a Redis server
#[derive(Clone)]
pub struct RedisBackend {
    manager: ConnectionManager,
}

impl RedisBackend {
    fn conn(&self) -> ConnectionManager {
        self.manager.clone()
    }

    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        let pattern = format!("{}*", escape_glob(prefix));
        let mut conn = self.conn();
        let mut cursor: u64 = 0;
        let mut keys = Vec::new();

        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await?;
            keys.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }

        // SCAN may return a key more than once
        keys.sort_unstable();
        keys.dedup();
        Ok(keys)
    }
}

#[async_trait]
impl VolatileBackend for RedisBackend {
    async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        let mut conn = self.conn();
        let value: Option<Vec<u8>> = redis::cmd("GET").arg(key).query_async(&mut conn).await?;
        Ok(value.map(Bytes::from))
    }

    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<()> {
        let ttl_ms = ttl.as_millis().clamp(1, u64::MAX as u128) as u64;
        let mut conn = self.conn();
        let _: () = redis::cmd("SET")
            .arg(key)
            .arg(&value[..])
            .arg("PX")
            .arg(ttl_ms)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> Result<usize> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn();
        let mut removed = 0;
        for chunk in keys.chunks(SCAN_BATCH) {
            let n: usize = redis::cmd("DEL").arg(chunk).query_async(&mut conn).await?;
            removed += n;
        }
        Ok(removed)
    }

    async fn delete_by_prefix(&self, prefix: &str) -> Result<usize> {
        let keys = self.scan_prefix(prefix).await?;
        self.delete(&keys).await
    }

    async fn count_prefix(&self, prefix: &str) -> Result<usize> {
        Ok(self.scan_prefix(prefix).await?.len())
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.conn();
        let pong: String = redis::cmd("PING").query_async(&mut conn).await?;
        if pong == "PONG" {
            Ok(())
        } else {
            Err(Error::Internal(format!("unexpected PING reply: {}", pong)))
        }
    }

    async fn info(&self) -> Result<BackendInfo> {
        let mut conn = self.conn();
        let raw: String = redis::cmd("INFO").query_async(&mut conn).await?;
        Ok(parse_info(&raw))
    }
}

/// Escape Redis glob metacharacters so a prefix matches literally
fn escape_glob(prefix: &str) -> String {
    let mut escaped = String::with_capacity(prefix.len());
    for c in prefix.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Pull the fields we report out of an `INFO` reply
fn parse_info(raw: &str) -> BackendInfo {
    let mut info = BackendInfo::default();
    for line in raw.lines() {
        if let Some((field, value)) = line.trim().split_once(':') {
            match field {
                "redis_version" => info.version = Some(value.to_string()),
                "used_memory_human" => info.used_memory = Some(value.to_string()),
                _ => {}
            }
        }
    }
    info
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_glob() {
        assert_eq!(escape_glob("pitwall:session:2024:5:"), "pitwall:session:2024:5:");
        assert_eq!(escape_glob("a*b?[c]\\"), "a\\*b\\?\\[c\\]\\\\");
    }

    #[test]
    fn test_parse_info() {
        let raw = "# Server\r\nredis_version:7.2.4\r\nredis_mode:standalone\r\n\r\n# Memory\r\nused_memory:1103512\r\nused_memory_human:1.05M\r\n";
        let info = parse_info(raw);
        assert_eq!(info.version.as_deref(), Some("7.2.4"));
        assert_eq!(info.used_memory.as_deref(), Some("1.05M"));
    }

    #[test]
    fn test_parse_info_missing_fields() {
        assert_eq!(parse_info("# Server\r\n"), BackendInfo::default());
    }

    #[tokio::test]
    async fn test_connect_to_closed_port_fails() {
        // Port 1 is never a Redis server
        let connector = RedisConnector::new("redis://127.0.0.1:1");
        assert_eq!(connector.endpoint(), "redis://127.0.0.1:1");
        let result =
            tokio::time::timeout(Duration::from_secs(5), connector.connect()).await;
        assert!(!matches!(result, Ok(Ok(_))));
    }

    #[test]
    fn test_invalid_url() {
        let err: Error = redis::Client::open("not a url").unwrap_err().into();
        assert!(matches!(err, Error::Redis(_)));
    }
}
