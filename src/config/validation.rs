//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (thresholds > 0, timeouts > 0, weights >= 0)
//! - Detect duplicate upstream names and addresses
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::net::SocketAddr;
use thiserror::Error;
use crate::config::schema::GatewayConfig;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("circuit_breaker.failure_threshold must be at least 1")]
    ZeroFailureThreshold,

    #[error("circuit_breaker.reset_timeout_ms must be greater than 0")]
    ZeroResetTimeout,

    #[error(
        "load_balancer.recovery_delay_ms ({recovery_delay_ms}) must be at least circuit_breaker.reset_timeout_ms ({reset_timeout_ms})"
    )]
    RecoveryBeforeReset { recovery_delay_ms: u64, reset_timeout_ms: u64 },

    #[error("dispatch.max_active_tasks must be at least 1")]
    ZeroAgentCapacity,

    #[error("dispatch.{field} must be a non-negative number (got {value})")]
    InvalidWeight { field: &'static str, value: f64 },

    #[error("upstream '{0}' has an empty address")]
    EmptyAddress(String),

    #[error("duplicate upstream name '{0}'")]
    DuplicateUpstreamName(String),

    #[error("duplicate upstream address '{0}'")]
    DuplicateUpstreamAddress(String),

    #[error("observability.metrics_address '{0}' is not a socket address")]
    InvalidMetricsAddress(String),
}

/// Check a parsed configuration for semantic errors.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.circuit_breaker.failure_threshold == 0 {
        errors.push(ValidationError::ZeroFailureThreshold);
    }
    if config.circuit_breaker.reset_timeout_ms == 0 {
        errors.push(ValidationError::ZeroResetTimeout);
    }
    // An endpoint back in rotation before its breaker admits a trial is only rejected again.
    let recovery_delay_ms = config.load_balancer.recovery_delay_ms;
    let reset_timeout_ms = config.circuit_breaker.reset_timeout_ms;
    if reset_timeout_ms > 0 && recovery_delay_ms < reset_timeout_ms {
        errors.push(ValidationError::RecoveryBeforeReset {
            recovery_delay_ms,
            reset_timeout_ms,
        });
    }

    let dispatch = &config.dispatch;
    if dispatch.max_active_tasks == 0 {
        errors.push(ValidationError::ZeroAgentCapacity);
    }
    for (field, value) in [
        ("type_match_bonus", dispatch.type_match_bonus),
        ("experience_weight", dispatch.experience_weight),
        ("load_penalty", dispatch.load_penalty),
    ] {
        if !value.is_finite() || value < 0.0 {
            errors.push(ValidationError::InvalidWeight { field, value });
        }
    }

    let mut names = HashSet::new();
    let mut addresses = HashSet::new();
    for upstream in &config.upstreams {
        if upstream.address.trim().is_empty() {
            errors.push(ValidationError::EmptyAddress(upstream.name.clone()));
        } else if !addresses.insert(upstream.address.as_str()) {
            errors.push(ValidationError::DuplicateUpstreamAddress(upstream.address.clone()));
        }
        if !names.insert(upstream.name.as_str()) {
            errors.push(ValidationError::DuplicateUpstreamName(upstream.name.clone()));
        }
    }

    let observability = &config.observability;
    if observability.metrics_enabled && observability.metrics_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidMetricsAddress(observability.metrics_address.clone()));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::UpstreamConfig;

    fn upstream(name: &str, address: &str) -> UpstreamConfig {
        UpstreamConfig {
            name: name.into(),
            address: address.into(),
        }
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&GatewayConfig::default()).is_ok());
    }

    #[test]
    fn test_collects_every_error() {
        let mut config = GatewayConfig::default();
        config.circuit_breaker.failure_threshold = 0;
        config.dispatch.max_active_tasks = 0;
        config.dispatch.load_penalty = -1.0;
        config.upstreams = vec![
            upstream("a", "127.0.0.1:1"),
            upstream("a", "127.0.0.1:1"),
            upstream("b", " "),
        ];

        let errors = validate_config(&config).unwrap_err();
        assert!(errors.contains(&ValidationError::ZeroFailureThreshold));
        assert!(errors.contains(&ValidationError::ZeroAgentCapacity));
        assert!(errors.contains(&ValidationError::InvalidWeight {
            field: "load_penalty",
            value: -1.0
        }));
        assert!(errors.contains(&ValidationError::DuplicateUpstreamName("a".into())));
        assert!(errors.contains(&ValidationError::DuplicateUpstreamAddress("127.0.0.1:1".into())));
        assert!(errors.contains(&ValidationError::EmptyAddress("b".into())));
        assert_eq!(errors.len(), 6);
    }

    #[test]
    fn test_recovery_delay_must_cover_reset_timeout() {
        let mut config = GatewayConfig::default();
        config.circuit_breaker.reset_timeout_ms = 30_000;
        config.load_balancer.recovery_delay_ms = 5_000;
        assert_eq!(
            validate_config(&config).unwrap_err(),
            vec![ValidationError::RecoveryBeforeReset {
                recovery_delay_ms: 5_000,
                reset_timeout_ms: 30_000,
            }]
        );

        config.load_balancer.recovery_delay_ms = 30_000;
        assert!(validate_config(&config).is_ok());
        config.load_balancer.recovery_delay_ms = 45_000;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_metrics_address_only_checked_when_enabled() {
        let mut config = GatewayConfig::default();
        config.observability.metrics_address = "not-an-address".into();
        assert_eq!(
            validate_config(&config).unwrap_err(),
            vec![ValidationError::InvalidMetricsAddress("not-an-address".into())]
        );

        config.observability.metrics_enabled = false;
        assert!(validate_config(&config).is_ok());
    }
}
