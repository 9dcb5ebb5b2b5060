//! Circuit breaker for upstream protection.
//!
//! # States
//! - Closed: normal operation, calls pass through
//! - Open: upstream assumed down, calls fail fast
//! - Half-Open: a single trial call is in flight
//!
//! # State Transitions
//! ```text
//! Closed → Open: consecutive failures >= threshold
//! Open → Half-Open: now >= opened_at + reset_timeout, observed by permit_call
//! Half-Open → Closed: trial call succeeds
//! Half-Open → Open: trial call fails (timeout restarts)
//! ```
//!
//! # Design Decisions
//! - Per-upstream circuit breaker (not global)
//! - No background timer; Open → Half-Open is evaluated lazily in `permit_call`
//! - Single trial in Half-Open: only the caller that performs the transition is admitted
//! - A trial that is never reported is abandoned after another reset_timeout and re-granted
//! - The breaker never errors; it only answers questions and records outcomes

use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, SystemTime};
use serde::Serialize;
use tokio::time::Instant;
use crate::config::CircuitBreakerConfig;
use crate::observability::metrics;

/// Breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    /// Numeric encoding for the state gauge.
    pub fn as_gauge(self) -> f64 {
        match self {
            CircuitState::Closed => 0.0,
            CircuitState::Open => 1.0,
            CircuitState::HalfOpen => 2.0,
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        })
    }
}

/// Point-in-time view of a breaker.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BreakerMetrics {
    pub upstream: String,
    pub state: CircuitState,
    pub failure_count: u32,
    pub success_count: u32,
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub circuit_open_count: u64,
    /// `failed_requests / total_requests`, 0 when nothing was recorded.
    pub failure_rate: f64,
    /// Milliseconds until an open breaker admits a trial call.
    pub reset_in_ms: u64,
    pub last_failure: Option<SystemTime>,
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    last_failure: Option<SystemTime>,
    opened_at: Option<Instant>,
    trial_started_at: Option<Instant>,
    total_requests: u64,
    successful_requests: u64,
    failed_requests: u64,
    circuit_open_count: u64,
}

/// Failure detector guarding calls to one upstream.
#[derive(Debug)]
pub struct CircuitBreaker {
    upstream: String,
    failure_threshold: u32,
    reset_timeout: Duration,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    /// Create a closed breaker. A threshold of 0 is treated as 1.
    pub fn new(upstream: impl Into<String>, failure_threshold: u32, reset_timeout: Duration) -> Self {
        Self {
            upstream: upstream.into(),
            failure_threshold: failure_threshold.max(1),
            reset_timeout,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                failure_count: 0,
                success_count: 0,
                last_failure: None,
                opened_at: None,
                trial_started_at: None,
                total_requests: 0,
                successful_requests: 0,
                failed_requests: 0,
                circuit_open_count: 0,
            }),
        }
    }

    pub fn from_config(upstream: impl Into<String>, config: &CircuitBreakerConfig) -> Self {
        Self::new(upstream, config.failure_threshold, config.reset_timeout())
    }

    pub fn upstream(&self) -> &str {
        &self.upstream
    }

    // Every critical section leaves the record consistent, so a poisoned lock is still usable.
    fn lock(&self) -> MutexGuard<'_, BreakerInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Ask whether a call may be attempted now.
    ///
    /// In Open, the first caller at or after the deadline moves the breaker to
    /// Half-Open and is the only one admitted until the trial is resolved.
    pub fn permit_call(&self) -> bool {
        let mut inner = self.lock();
        let now = Instant::now();
        match inner.state {
            CircuitState::Closed => true,
            CircuitState::HalfOpen => {
                let abandoned = inner
                    .trial_started_at
                    .map_or(true, |started| now >= started + self.reset_timeout);
                if abandoned {
                    inner.trial_started_at = Some(now);
                    drop(inner);
                    tracing::warn!(upstream = %self.upstream, "Half-open trial never reported, admitting a new one");
                }
                abandoned
            }
            CircuitState::Open => {
                let eligible = inner
                    .opened_at
                    .map_or(true, |opened_at| now >= opened_at + self.reset_timeout);
                if !eligible {
                    return false;
                }
                inner.state = CircuitState::HalfOpen;
                inner.failure_count = 0;
                inner.success_count = 0;
                inner.trial_started_at = Some(now);
                drop(inner);

                tracing::info!(upstream = %self.upstream, "Circuit breaker half-open, admitting trial call");
                metrics::record_breaker_state(&self.upstream, CircuitState::HalfOpen);
                true
            }
        }
    }

    /// Record a successful call.
    pub fn record_success(&self) {
        let mut inner = self.lock();
        inner.success_count += 1;
        inner.successful_requests += 1;
        inner.total_requests += 1;

        match inner.state {
            CircuitState::HalfOpen => {
                inner.state = CircuitState::Closed;
                inner.failure_count = 0;
                inner.success_count = 0;
                inner.opened_at = None;
                inner.trial_started_at = None;
                drop(inner);

                tracing::info!(upstream = %self.upstream, "Circuit breaker closed, upstream recovered");
                metrics::record_breaker_state(&self.upstream, CircuitState::Closed);
            }
            // Failures must be consecutive to trip.
            CircuitState::Closed => inner.failure_count = 0,
            CircuitState::Open => {}
        }
    }

    /// Record a failed call.
    pub fn record_failure(&self) {
        let mut inner = self.lock();
        inner.failure_count += 1;
        inner.failed_requests += 1;
        inner.total_requests += 1;
        inner.last_failure = Some(SystemTime::now());

        let trip = match inner.state {
            CircuitState::HalfOpen => true,
            CircuitState::Closed => inner.failure_count >= self.failure_threshold,
            CircuitState::Open => false,
        };
        if !trip {
            return;
        }

        let previous = inner.state;
        let failures = inner.failure_count;
        inner.state = CircuitState::Open;
        inner.success_count = 0;
        inner.opened_at = Some(Instant::now());
        inner.trial_started_at = None;
        inner.circuit_open_count += 1;
        drop(inner);

        tracing::warn!(
            upstream = %self.upstream,
            from = %previous,
            failures,
            reset_timeout_ms = self.reset_timeout.as_millis() as u64,
            "Circuit breaker opened"
        );
        metrics::record_breaker_state(&self.upstream, CircuitState::Open);
        metrics::record_breaker_trip(&self.upstream);
    }

    /// Force the breaker closed, clearing the current failure streak.
    pub fn reset(&self) {
        let mut inner = self.lock();
        inner.state = CircuitState::Closed;
        inner.failure_count = 0;
        inner.success_count = 0;
        inner.last_failure = None;
        inner.opened_at = None;
        inner.trial_started_at = None;
        drop(inner);

        tracing::info!(upstream = %self.upstream, "Circuit breaker manually reset");
        metrics::record_breaker_state(&self.upstream, CircuitState::Closed);
    }

    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    pub fn is_open(&self) -> bool {
        self.state() == CircuitState::Open
    }

    /// Time left until an open breaker admits a trial call; zero in any other state.
    pub fn reset_in(&self) -> Duration {
        let inner = self.lock();
        Self::reset_in_locked(&inner, self.reset_timeout)
    }

    /// How long a caller rejected by `permit_call` should wait before retrying.
    ///
    /// Open waits for the reset deadline; Half-Open waits until the outstanding
    /// trial would be abandoned. Zero in Closed.
    pub fn retry_after(&self) -> Duration {
        let inner = self.lock();
        match (inner.state, inner.trial_started_at) {
            (CircuitState::HalfOpen, Some(started)) => {
                (started + self.reset_timeout).saturating_duration_since(Instant::now())
            }
            _ => Self::reset_in_locked(&inner, self.reset_timeout),
        }
    }

    fn reset_in_locked(inner: &BreakerInner, reset_timeout: Duration) -> Duration {
        match (inner.state, inner.opened_at) {
            (CircuitState::Open, Some(opened_at)) => {
                (opened_at + reset_timeout).saturating_duration_since(Instant::now())
            }
            _ => Duration::ZERO,
        }
    }

    pub fn metrics(&self) -> BreakerMetrics {
        let inner = self.lock();
        let failure_rate = if inner.total_requests > 0 {
            inner.failed_requests as f64 / inner.total_requests as f64
        } else {
            0.0
        };

        BreakerMetrics {
            upstream: self.upstream.clone(),
            state: inner.state,
            failure_count: inner.failure_count,
            success_count: inner.success_count,
            total_requests: inner.total_requests,
            successful_requests: inner.successful_requests,
            failed_requests: inner.failed_requests,
            circuit_open_count: inner.circuit_open_count,
            failure_rate,
            reset_in_ms: Self::reset_in_locked(&inner, self.reset_timeout).as_millis() as u64,
            last_failure: inner.last_failure,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn breaker(threshold: u32) -> CircuitBreaker {
        CircuitBreaker::new("ai-engine", threshold, Duration::from_secs(30))
    }

    #[test]
    fn test_trips_after_threshold_failures() {
        for threshold in 1..=6 {
            let cb = breaker(threshold);
            for _ in 0..threshold - 1 {
                cb.record_failure();
                assert_eq!(cb.state(), CircuitState::Closed);
            }
            cb.record_failure();
            assert_eq!(cb.state(), CircuitState::Open, "threshold {}", threshold);
            assert!(!cb.permit_call());
        }
    }

    #[test]
    fn test_success_breaks_failure_streak() {
        let cb = breaker(3);
        cb.record_failure();
        cb.record_failure();
        cb.record_success();
        cb.record_failure();
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Closed);
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_denies_until_deadline() {
        let cb = breaker(1);
        cb.record_failure();

        tokio::time::advance(Duration::from_secs(29)).await;
        assert!(!cb.permit_call());
        assert!(!cb.permit_call());
        assert_eq!(cb.reset_in(), Duration::from_secs(1));

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(cb.permit_call());
        assert_eq!(cb.state(), CircuitState::HalfOpen);

        // The trial is outstanding; nobody else gets in.
        assert!(!cb.permit_call());
        assert!(!cb.permit_call());
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_success_closes() {
        let cb = breaker(2);
        cb.record_failure();
        cb.record_failure();
        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(cb.permit_call());

        cb.record_success();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.metrics().failure_count, 0);
        assert!(cb.permit_call());
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_failure_reopens_with_fresh_deadline() {
        let cb = breaker(2);
        cb.record_failure();
        cb.record_failure();
        tokio::time::advance(Duration::from_secs(45)).await;
        assert!(cb.permit_call());

        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);
        assert_eq!(cb.reset_in(), Duration::from_secs(30));

        tokio::time::advance(Duration::from_secs(29)).await;
        assert!(!cb.permit_call());
        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(cb.permit_call());
    }

    #[test]
    fn test_concurrent_callers_get_single_trial() {
        let cb = Arc::new(CircuitBreaker::new("ai-engine", 1, Duration::from_millis(500)));
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);
        std::thread::sleep(Duration::from_millis(600));

        let barrier = Arc::new(std::sync::Barrier::new(16));
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let cb = cb.clone();
                let barrier = barrier.clone();
                std::thread::spawn(move || {
                    barrier.wait();
                    cb.permit_call()
                })
            })
            .collect();
        let granted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|granted| *granted)
            .count();

        assert_eq!(granted, 1);
        assert_eq!(cb.state(), CircuitState::HalfOpen);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_after_covers_outstanding_trial() {
        let cb = breaker(1);
        assert_eq!(cb.retry_after(), Duration::ZERO);

        cb.record_failure();
        tokio::time::advance(Duration::from_secs(10)).await;
        assert_eq!(cb.retry_after(), Duration::from_secs(20));

        tokio::time::advance(Duration::from_secs(20)).await;
        assert!(cb.permit_call());
        tokio::time::advance(Duration::from_secs(5)).await;
        assert!(!cb.permit_call());
        assert_eq!(cb.reset_in(), Duration::ZERO);
        assert_eq!(cb.retry_after(), Duration::from_secs(25));
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_trial_is_regranted() {
        let cb = breaker(1);
        cb.record_failure();
        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(cb.permit_call());

        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(!cb.permit_call());

        tokio::time::advance(Duration::from_secs(20)).await;
        assert!(cb.permit_call());
        assert!(!cb.permit_call());
        assert_eq!(cb.state(), CircuitState::HalfOpen);
    }

    #[test]
    fn test_metrics() {
        let cb = breaker(2);
        assert_eq!(cb.metrics().failure_rate, 0.0);

        cb.record_success();
        cb.record_failure();
        cb.record_failure();
        cb.record_failure();

        let m = cb.metrics();
        assert_eq!(m.upstream, "ai-engine");
        assert_eq!(m.state, CircuitState::Open);
        assert_eq!(m.total_requests, 4);
        assert_eq!(m.successful_requests, 1);
        assert_eq!(m.failed_requests, 3);
        assert_eq!(m.circuit_open_count, 1);
        assert_eq!(m.failure_rate, 0.75);
        assert!(m.last_failure.is_some());
    }

    #[test]
    fn test_manual_reset() {
        let cb = breaker(1);
        cb.record_failure();
        assert!(cb.is_open());

        cb.reset();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.reset_in(), Duration::ZERO);
        assert!(cb.permit_call());
    }
}
