//! Volatile Tier
//!
//! The shared cache adapter and its in-process fallback.
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │              VolatileCache               │
//! │   connected ──▶ VolatileBackend (Redis)  │
//! │   degraded  ──▶ FallbackMap (in-process) │
//! └──────────────────────────────────────────┘
//! ```

pub mod entry;
pub mod fallback;
pub mod volatile;

pub use entry::{CacheEntry, Envelope};
pub use fallback::FallbackMap;
pub use volatile::{VolatileCache, VolatileSnapshot};
