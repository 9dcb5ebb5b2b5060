//! Errors surfaced to gateway callers.

use std::time::Duration;
use thiserror::Error;
use crate::load_balancer::SelectorError;
use crate::orchestrator::DispatchError;

/// Why the gateway refused or failed a request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    /// Every endpoint is out of rotation.
    #[error("no healthy endpoint available")]
    NoHealthyEndpoint,

    /// The chosen upstream's breaker rejected the call.
    #[error("circuit open for upstream {upstream}, retry in {}ms", retry_after.as_millis())]
    CircuitOpen { upstream: String, retry_after: Duration },

    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

impl From<SelectorError> for GatewayError {
    fn from(err: SelectorError) -> Self {
        match err {
            SelectorError::NoHealthyEndpoint => GatewayError::NoHealthyEndpoint,
        }
    }
}

impl GatewayError {
    /// Whether retrying later may succeed without any operator action.
    pub fn is_transient(&self) -> bool {
        match self {
            GatewayError::NoHealthyEndpoint | GatewayError::CircuitOpen { .. } => true,
            GatewayError::Dispatch(DispatchError::NoSuitableAgent { .. }) => true,
            GatewayError::Dispatch(_) => false,
        }
    }
}

/// Outcome of `Gateway::call` when it does not succeed.
#[derive(Debug, Error)]
pub enum CallError<E> {
    /// The gateway refused the call before reaching an upstream.
    #[error(transparent)]
    Rejected(#[from] GatewayError),

    /// The upstream was called and failed.
    #[error("upstream call failed: {0}")]
    Upstream(E),
}

impl<E> CallError<E> {
    pub fn rejected(&self) -> Option<&GatewayError> {
        match self {
            CallError::Rejected(err) => Some(err),
            CallError::Upstream(_) => None,
        }
    }
}
