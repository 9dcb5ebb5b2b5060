//! Endpoint abstraction.
//!
//! # Responsibilities
//! - Represent a single upstream endpoint
//! - Track outstanding requests and total selections (for Least Connections)
//! - Hold the endpoint's health record

use std::ops::Deref;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use crate::health::state::{HealthRecord, HealthSnapshot};

/// A single upstream endpoint.
#[derive(Debug)]
pub struct Endpoint {
    address: String,
    /// Requests currently holding an `EndpointGuard` for this endpoint.
    outstanding: AtomicUsize,
    /// Number of times this endpoint was selected.
    total_served: AtomicU64,
    health: Mutex<HealthRecord>,
}

impl Endpoint {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            outstanding: AtomicUsize::new(0),
            total_served: AtomicU64::new(0),
            health: Mutex::new(HealthRecord::new()),
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::Relaxed)
    }

    pub fn total_served(&self) -> u64 {
        self.total_served.load(Ordering::Relaxed)
    }

    /// Count one selection of this endpoint.
    pub fn record_served(&self) {
        self.total_served.fetch_add(1, Ordering::Relaxed);
    }

    /// Start tracking an outstanding request; the count drops with the guard.
    pub fn acquire(self: &Arc<Self>) -> EndpointGuard {
        self.outstanding.fetch_add(1, Ordering::Relaxed);
        EndpointGuard {
            endpoint: self.clone(),
        }
    }

    // Health critical sections never panic halfway, so a poisoned lock is still usable.
    pub(crate) fn health(&self) -> MutexGuard<'_, HealthRecord> {
        self.health.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_healthy(&self) -> bool {
        self.health().healthy
    }

    pub fn health_snapshot(&self) -> HealthSnapshot {
        self.health().snapshot()
    }
}

/// A RAII guard that keeps the endpoint's outstanding count raised.
#[derive(Debug)]
pub struct EndpointGuard {
    endpoint: Arc<Endpoint>,
}

impl EndpointGuard {
    pub fn endpoint(&self) -> &Arc<Endpoint> {
        &self.endpoint
    }
}

impl Deref for EndpointGuard {
    type Target = Endpoint;
    fn deref(&self) -> &Self::Target {
        &self.endpoint
    }
}

impl Drop for EndpointGuard {
    fn drop(&mut self) {
        self.endpoint.outstanding.fetch_sub(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guard_tracks_outstanding() {
        let endpoint = Arc::new(Endpoint::new("127.0.0.1:8001"));
        assert_eq!(endpoint.outstanding(), 0);

        let g1 = endpoint.acquire();
        let g2 = endpoint.acquire();
        assert_eq!(endpoint.outstanding(), 2);
        assert_eq!(g1.address(), "127.0.0.1:8001");

        drop(g1);
        assert_eq!(endpoint.outstanding(), 1);
        drop(g2);
        assert_eq!(endpoint.outstanding(), 0);
    }

    #[test]
    fn test_new_endpoint_is_healthy() {
        let endpoint = Endpoint::new("a");
        assert!(endpoint.is_healthy());
        assert_eq!(endpoint.total_served(), 0);
        endpoint.record_served();
        assert_eq!(endpoint.total_served(), 1);
    }
}
