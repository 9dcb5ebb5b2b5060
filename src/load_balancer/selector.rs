//! Endpoint set management and selection.
//!
//! # Responsibilities
//! - Own the endpoint set and each endpoint's health and counters
//! - Select an endpoint from the healthy subset with the configured strategy
//! - Mark endpoints unhealthy/healthy and schedule automatic re-admission
//! - Add, remove and reconcile endpoints at runtime
//!
//! # Design Decisions
//! - The endpoint list is guarded by one RwLock; each health record has its own mutex
//! - Lock order is always list → health record
//! - Re-admission is tagged with the health generation; removal or a manual
//!   mark supersedes it, so a stale action never revives a record

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};
use std::time::{Duration, SystemTime};
use serde::Serialize;
use thiserror::Error;
use crate::config::{LoadBalancerConfig, Strategy};
use crate::health::recovery::RecoveryScheduler;
use crate::health::state::HealthSnapshot;
use crate::load_balancer::{balancer_for, Endpoint, EndpointGuard, LoadBalancer};
use crate::observability::metrics;

/// Selection failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectorError {
    #[error("no healthy endpoint available")]
    NoHealthyEndpoint,
}

/// Per-endpoint view in `SelectorMetrics`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EndpointMetrics {
    pub address: String,
    pub health: HealthSnapshot,
    pub outstanding: usize,
    pub total_served: u64,
}

/// Point-in-time view of the selector.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SelectorMetrics {
    pub strategy: Strategy,
    pub total_endpoints: usize,
    pub healthy_endpoints: usize,
    pub total_requests: u64,
    /// Selections per endpoint address.
    pub distribution: BTreeMap<String, u64>,
    pub endpoints: Vec<EndpointMetrics>,
}

/// Chooses an endpoint per request among the currently healthy ones.
#[derive(Debug)]
pub struct EndpointSelector {
    endpoints: RwLock<Vec<Arc<Endpoint>>>,
    strategy: Strategy,
    balancer: Box<dyn LoadBalancer>,
    recovery_delay: Duration,
    scheduler: Arc<dyn RecoveryScheduler>,
    total_requests: AtomicU64,
}

impl EndpointSelector {
    /// Create a selector over `addresses` (duplicates are ignored), all initially healthy.
    pub fn new<I, S>(addresses: I, config: &LoadBalancerConfig, scheduler: Arc<dyn RecoveryScheduler>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut seen = HashSet::new();
        let endpoints: Vec<_> = addresses
            .into_iter()
            .map(Into::into)
            .filter(|address: &String| seen.insert(address.clone()))
            .map(|address| Arc::new(Endpoint::new(address)))
            .collect();

        for endpoint in &endpoints {
            metrics::record_endpoint_health(endpoint.address(), true);
        }

        Self {
            endpoints: RwLock::new(endpoints),
            strategy: config.strategy,
            balancer: balancer_for(config.strategy),
            recovery_delay: config.recovery_delay(),
            scheduler,
            total_requests: AtomicU64::new(0),
        }
    }

    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<Arc<Endpoint>>> {
        self.endpoints.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<Arc<Endpoint>>> {
        self.endpoints.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn find(&self, address: &str) -> Option<Arc<Endpoint>> {
        self.read().iter().find(|e| e.address() == address).cloned()
    }

    /// Select an endpoint from the healthy subset.
    ///
    /// The returned guard counts as an outstanding request until dropped.
    pub fn next_endpoint(&self) -> Result<EndpointGuard, SelectorError> {
        let endpoint = {
            let endpoints = self.read();
            let healthy: Vec<_> = endpoints.iter().filter(|e| e.is_healthy()).cloned().collect();
            if healthy.is_empty() {
                tracing::debug!(endpoint_count = endpoints.len(), "No healthy endpoints available");
                metrics::record_no_healthy_endpoint();
                return Err(SelectorError::NoHealthyEndpoint);
            }
            self.balancer
                .next_server(&healthy)
                .ok_or(SelectorError::NoHealthyEndpoint)?
        };

        endpoint.record_served();
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        metrics::record_endpoint_selected(endpoint.address());
        Ok(endpoint.acquire())
    }

    /// Take an endpoint out of rotation and schedule its automatic re-admission.
    ///
    /// Returns false if the endpoint is not part of the set.
    pub fn mark_unhealthy(&self, address: &str) -> bool {
        let Some(endpoint) = self.find(address) else {
            return false;
        };

        let mut health = endpoint.health();
        if health.retired {
            return false;
        }
        let generation = health.supersede();
        health.healthy = false;
        health.consecutive_failures += 1;
        health.last_checked = SystemTime::now();
        let failures = health.consecutive_failures;

        let weak = Arc::downgrade(&endpoint);
        health.pending_recovery = Some(
            self.scheduler
                .schedule(self.recovery_delay, Box::new(move || recover(weak, generation))),
        );
        drop(health);

        tracing::warn!(
            endpoint = %address,
            consecutive_failures = failures,
            recovery_in_ms = self.recovery_delay.as_millis() as u64,
            "Endpoint marked unhealthy"
        );
        metrics::record_endpoint_health(address, false);
        true
    }

    /// Put an endpoint back in rotation, cancelling any pending re-admission.
    ///
    /// Returns false if the endpoint is not part of the set.
    pub fn mark_healthy(&self, address: &str) -> bool {
        let Some(endpoint) = self.find(address) else {
            return false;
        };

        let mut health = endpoint.health();
        if health.retired {
            return false;
        }
        health.supersede();
        health.healthy = true;
        health.consecutive_failures = 0;
        health.last_checked = SystemTime::now();
        drop(health);

        tracing::info!(endpoint = %address, "Endpoint marked healthy");
        metrics::record_endpoint_health(address, true);
        true
    }

    /// Add an endpoint in the healthy state. Returns false if it already exists.
    pub fn add_endpoint(&self, address: impl Into<String>) -> bool {
        let address = address.into();
        let mut endpoints = self.write();
        if endpoints.iter().any(|e| e.address() == address) {
            return false;
        }
        endpoints.push(Arc::new(Endpoint::new(address.clone())));
        drop(endpoints);

        tracing::info!(endpoint = %address, "Endpoint added");
        metrics::record_endpoint_health(&address, true);
        true
    }

    /// Remove an endpoint and cancel its pending re-admission.
    ///
    /// Returns false if it was not part of the set.
    pub fn remove_endpoint(&self, address: &str) -> bool {
        let mut endpoints = self.write();
        let Some(index) = endpoints.iter().position(|e| e.address() == address) else {
            return false;
        };
        let endpoint = endpoints.remove(index);
        {
            let mut health = endpoint.health();
            health.supersede();
            health.retired = true;
        }
        drop(endpoints);

        tracing::info!(endpoint = %address, "Endpoint removed");
        true
    }

    /// Reconcile the endpoint set with `addresses`.
    ///
    /// Existing endpoints keep their health and counters. Returns (added, removed).
    pub fn sync_endpoints(&self, addresses: &[String]) -> (usize, usize) {
        let wanted: HashSet<&str> = addresses.iter().map(String::as_str).collect();
        let stale: Vec<String> = self
            .addresses()
            .into_iter()
            .filter(|a| !wanted.contains(a.as_str()))
            .collect();

        let removed = stale.iter().filter(|a| self.remove_endpoint(a)).count();
        let added = addresses.iter().filter(|a| self.add_endpoint(a.as_str())).count();

        if added > 0 || removed > 0 {
            tracing::info!(added, removed, "Endpoint set reconciled");
        }
        (added, removed)
    }

    /// Addresses in selection order.
    pub fn addresses(&self) -> Vec<String> {
        self.read().iter().map(|e| e.address().to_string()).collect()
    }

    pub fn contains(&self, address: &str) -> bool {
        self.find(address).is_some()
    }

    pub fn is_healthy(&self, address: &str) -> Option<bool> {
        self.find(address).map(|e| e.is_healthy())
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    pub fn healthy_count(&self) -> usize {
        self.read().iter().filter(|e| e.is_healthy()).count()
    }

    pub fn metrics(&self) -> SelectorMetrics {
        let endpoints: Vec<EndpointMetrics> = self
            .read()
            .iter()
            .map(|e| EndpointMetrics {
                address: e.address().to_string(),
                health: e.health_snapshot(),
                outstanding: e.outstanding(),
                total_served: e.total_served(),
            })
            .collect();

        SelectorMetrics {
            strategy: self.strategy,
            total_endpoints: endpoints.len(),
            healthy_endpoints: endpoints.iter().filter(|e| e.health.healthy).count(),
            total_requests: self.total_requests.load(Ordering::Relaxed),
            distribution: endpoints
                .iter()
                .map(|e| (e.address.clone(), e.total_served))
                .collect(),
            endpoints,
        }
    }
}

/// Scheduled re-admission. Applies only if nothing superseded the health record since.
fn recover(endpoint: Weak<Endpoint>, generation: u64) {
    let Some(endpoint) = endpoint.upgrade() else {
        return;
    };

    let mut health = endpoint.health();
    if health.retired || health.generation != generation {
        tracing::debug!(endpoint = %endpoint.address(), "Skipping stale endpoint recovery");
        return;
    }
    health.generation += 1;
    health.healthy = true;
    health.consecutive_failures = 0;
    health.last_checked = SystemTime::now();
    health.pending_recovery = None;
    drop(health);

    tracing::info!(endpoint = %endpoint.address(), "Endpoint automatically re-admitted");
    metrics::record_endpoint_health(endpoint.address(), true);
}
