//! Request path through endpoint selection and per-upstream circuit breakers.
//!
//! # Data Flow
//! ```text
//! Gateway::call
//!     → EndpointSelector (healthy subset → strategy → EndpointGuard)
//!     → BreakerRegistry (breaker for that endpoint: permit_call)
//!     → caller's upstream future
//!     → record_success / record_failure
//!     → breaker opened? → take the endpoint out of rotation
//! ```

use std::future::Future;
use std::sync::Arc;
use arc_swap::ArcSwap;
use serde::Serialize;
use crate::config::GatewayConfig;
use crate::error::{CallError, GatewayError};
use crate::health::RecoveryScheduler;
use crate::load_balancer::{EndpointSelector, SelectorMetrics};
use crate::resilience::{BreakerMetrics, BreakerRegistry};

/// Point-in-time view of the request path.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GatewaySnapshot {
    pub endpoints: SelectorMetrics,
    pub breakers: Vec<BreakerMetrics>,
}

/// Ties endpoint selection to one circuit breaker per endpoint.
#[derive(Debug)]
pub struct Gateway {
    config: ArcSwap<GatewayConfig>,
    selector: EndpointSelector,
    breakers: BreakerRegistry,
}

impl Gateway {
    pub fn new(config: GatewayConfig, scheduler: Arc<dyn RecoveryScheduler>) -> Self {
        let addresses = config.upstream_addresses();
        let selector = EndpointSelector::new(addresses.iter().cloned(), &config.load_balancer, scheduler);
        let breakers = BreakerRegistry::with_upstreams(config.circuit_breaker.clone(), addresses);

        tracing::info!(
            upstreams = selector.len(),
            strategy = ?config.load_balancer.strategy,
            failure_threshold = config.circuit_breaker.failure_threshold,
            "Gateway initialized"
        );

        Self {
            config: ArcSwap::from_pointee(config),
            selector,
            breakers,
        }
    }

    /// The configuration currently in effect.
    pub fn config(&self) -> Arc<GatewayConfig> {
        self.config.load_full()
    }

    pub fn selector(&self) -> &EndpointSelector {
        &self.selector
    }

    pub fn breakers(&self) -> &BreakerRegistry {
        &self.breakers
    }

    /// Run `call` against an endpoint chosen for this request.
    ///
    /// The endpoint counts as outstanding until `call` resolves. A failure that
    /// leaves the endpoint's breaker open also takes the endpoint out of rotation.
    pub async fn call<F, Fut, T, E>(&self, call: F) -> Result<T, CallError<E>>
    where
        F: FnOnce(String) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let guard = self.selector.next_endpoint().map_err(GatewayError::from)?;
        let address = guard.address().to_string();
        let breaker = self.breakers.get_or_create(address.clone());

        if !breaker.permit_call() {
            tracing::debug!(upstream = %address, "Call rejected by open circuit");
            return Err(GatewayError::CircuitOpen {
                retry_after: breaker.retry_after(),
                upstream: address,
            }
            .into());
        }

        match call(address.clone()).await {
            Ok(value) => {
                breaker.record_success();
                Ok(value)
            }
            Err(err) => {
                breaker.record_failure();
                if breaker.is_open() {
                    self.selector.mark_unhealthy(&address);
                }
                Err(CallError::Upstream(err))
            }
        }
    }

    /// Reconcile the endpoint set with a reloaded configuration.
    ///
    /// Breaker and strategy settings apply to breakers and selectors created
    /// after a restart; only the upstream list is reconciled live.
    pub fn apply_config(&self, config: GatewayConfig) {
        let addresses = config.upstream_addresses();
        let (added, removed) = self.selector.sync_endpoints(&addresses);

        let live = self.selector.addresses();
        for breaker in self.breakers.metrics() {
            if !live.contains(&breaker.upstream) {
                self.breakers.remove(&breaker.upstream);
            }
        }
        for address in &live {
            self.breakers.get_or_create(address.clone());
        }

        let current = self.config.load();
        if current.circuit_breaker != config.circuit_breaker || current.load_balancer != config.load_balancer {
            tracing::warn!("Breaker and load balancer settings changed; they take effect on restart");
        }

        tracing::info!(added, removed, upstreams = live.len(), "Configuration applied");
        self.config.store(Arc::new(config));
    }

    pub fn snapshot(&self) -> GatewaySnapshot {
        GatewaySnapshot {
            endpoints: self.selector.metrics(),
            breakers: self.breakers.metrics(),
        }
    }
}
