//! Per-upstream circuit breaker registry.

use std::sync::Arc;
use dashmap::DashMap;
use crate::config::CircuitBreakerConfig;
use crate::resilience::circuit_breaker::{BreakerMetrics, CircuitBreaker};

/// Owns one breaker per upstream. Breakers live until removed.
#[derive(Debug)]
pub struct BreakerRegistry {
    config: CircuitBreakerConfig,
    breakers: DashMap<String, Arc<CircuitBreaker>>,
}

impl BreakerRegistry {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            breakers: DashMap::new(),
        }
    }

    /// Create a registry with breakers for the given upstreams already in place.
    pub fn with_upstreams<I, S>(config: CircuitBreakerConfig, upstreams: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let registry = Self::new(config);
        for upstream in upstreams {
            registry.get_or_create(upstream);
        }
        registry
    }

    /// Fetch the breaker for `upstream`, creating a closed one on first use.
    pub fn get_or_create(&self, upstream: impl Into<String>) -> Arc<CircuitBreaker> {
        let upstream = upstream.into();
        if let Some(existing) = self.breakers.get(&upstream) {
            return existing.clone();
        }
        self.breakers
            .entry(upstream.clone())
            .or_insert_with(|| {
                tracing::debug!(upstream = %upstream, "Circuit breaker created");
                Arc::new(CircuitBreaker::from_config(upstream.clone(), &self.config))
            })
            .clone()
    }

    pub fn get(&self, upstream: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.get(upstream).map(|b| b.clone())
    }

    pub fn remove(&self, upstream: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.remove(upstream).map(|(_, breaker)| breaker)
    }

    pub fn len(&self) -> usize {
        self.breakers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.breakers.is_empty()
    }

    /// Snapshot of every breaker, ordered by upstream.
    pub fn metrics(&self) -> Vec<BreakerMetrics> {
        let mut all: Vec<_> = self.breakers.iter().map(|b| b.metrics()).collect();
        all.sort_by(|a, b| a.upstream.cmp(&b.upstream));
        all
    }
}
