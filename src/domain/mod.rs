//! Domain Layer
//!
//! Record types, key construction and the ports the coordinator talks to.
//!
//! - **Model** (`model.rs`) - seasons, events, session results
//! - **Keys** (`keys.rs`) - namespaced cache keys and record identifiers
//! - **Ports** (`ports.rs`) - trait abstractions for the backing tiers

pub mod keys;
pub mod model;
pub mod ports;

#[cfg(test)]
mod proptest;

pub use keys::KeyBuilder;
pub use model::{
    Cell, Driver, Event, EventStatus, SessionKind, SessionResult, SessionSummary, SessionType,
};
pub use ports::{
    BackendInfo, DurableStats, DurableStore, VolatileBackend, VolatileConnector, YearCount,
};
