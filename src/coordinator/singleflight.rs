//! Single-Flight Deduplication
//!
//! Coalesces concurrent work for the same key into one in-flight future.
//! Callers that arrive while a flight is running wait on the shared cell and
//! receive a clone of the leader's result.
//!
//! A flight is released as soon as any participant observes the result, so a
//! later call always starts fresh work. If the caller driving the flight is
//! cancelled, the next waiter runs its own future instead.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::OnceCell;

/// Keyed single-flight group
#[derive(Debug)]
pub struct SingleFlight<T> {
    inflight: DashMap<String, Arc<OnceCell<T>>>,
    coalesced: AtomicU64,
}

impl<T> Default for SingleFlight<T> {
    fn default() -> Self {
        Self {
            inflight: DashMap::new(),
            coalesced: AtomicU64::new(0),
        }
    }
}

impl<T: Clone> SingleFlight<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `work` unless a flight for `key` is already running, in which case
    /// wait for that flight's result. Returns the value and whether this call
    /// joined an existing flight.
    pub async fn run<F>(&self, key: &str, work: F) -> (T, bool)
    where
        F: Future<Output = T>,
    {
        let (cell, joined) = match self.inflight.entry(key.to_string()) {
            Entry::Occupied(entry) => (Arc::clone(entry.get()), true),
            Entry::Vacant(entry) => {
                let cell = Arc::new(OnceCell::new());
                entry.insert(Arc::clone(&cell));
                (cell, false)
            }
        };
        if joined {
            self.coalesced.fetch_add(1, Ordering::Relaxed);
        }

        let value = cell.get_or_init(|| work).await.clone();
        self.inflight
            .remove_if(key, |_, current| Arc::ptr_eq(current, &cell));
        (value, joined)
    }

    /// Flights currently running
    pub fn in_flight(&self) -> usize {
        self.inflight.len()
    }

    /// Calls that joined an existing flight
    pub fn coalesced(&self) -> u64 {
        self.coalesced.load(Ordering::Relaxed)
    }
}
