//! Infrastructure Adapters
//!
//! Implementations of the domain ports, following the Port/Adapter
//! (Hexagonal) architecture pattern.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        Domain Layer                              │
//! │  ┌────────────────────────────────────────────────────────────┐ │
//! │  │                    Ports (Traits)                           │ │
//! │  │   VolatileConnector │ VolatileBackend │ DurableStore       │ │
//! │  └────────────────────────────────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     Adapters (This Module)                       │
//! │  ┌────────────────────────────────────────────────────────────┐ │
//! │  │   RedisConnector / RedisBackend   (shared volatile tier)   │ │
//! │  │   InMemoryBackend                 (process-local stand-in) │ │
//! │  │   SqliteStore                     (durable tier)           │ │
//! │  └────────────────────────────────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use pitwall::adapters::{RedisConnector, SqliteStore};
//! use pitwall::domain::ports::DurableStore;
//!
//! let store = SqliteStore::open("pitwall.db")?;
//! let seasons = store.list_seasons().await?;
//! ```

mod memory;
mod redis;
pub mod schema;
mod sqlite;

pub use self::memory::InMemoryBackend;
pub use self::redis::{RedisBackend, RedisConnector};
pub use self::sqlite::{SqliteStore, DEFAULT_STORE_TIMEOUT};
