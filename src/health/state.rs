//! Endpoint health record.
//!
//! # States
//! - Healthy: endpoint receives traffic
//! - Unhealthy: endpoint excluded from selection until re-admitted
//!
//! # State Transitions
//! ```text
//! Healthy → Unhealthy: mark_unhealthy (failure count +1, recovery scheduled)
//! Unhealthy → Healthy: mark_healthy, or the scheduled recovery firing
//! ```
//!
//! Every transition bumps `generation`; a scheduled recovery only applies if
//! the generation it captured is still current.

use std::time::SystemTime;
use serde::Serialize;
use crate::health::recovery::ScheduledHandle;

/// Mutable health state of one endpoint.
#[derive(Debug)]
pub struct HealthRecord {
    pub healthy: bool,
    pub consecutive_failures: u32,
    pub last_checked: SystemTime,
    pub generation: u64,
    /// Set once the endpoint leaves the selector; a retired record is never revived.
    pub(crate) retired: bool,
    pub(crate) pending_recovery: Option<ScheduledHandle>,
}

impl HealthRecord {
    pub fn new() -> Self {
        Self {
            healthy: true,
            consecutive_failures: 0,
            last_checked: SystemTime::now(),
            generation: 0,
            retired: false,
            pending_recovery: None,
        }
    }

    /// Advance the generation, invalidating (and cancelling) any pending recovery.
    pub(crate) fn supersede(&mut self) -> u64 {
        self.generation += 1;
        if let Some(pending) = self.pending_recovery.take() {
            pending.cancel();
        }
        self.generation
    }

    pub fn snapshot(&self) -> HealthSnapshot {
        HealthSnapshot {
            healthy: self.healthy,
            consecutive_failures: self.consecutive_failures,
            last_checked: self.last_checked,
            recovery_pending: self.pending_recovery.is_some(),
        }
    }
}

impl Default for HealthRecord {
    fn default() -> Self {
        Self::new()
    }
}

/// Serializable copy of a health record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthSnapshot {
    pub healthy: bool,
    pub consecutive_failures: u32,
    pub last_checked: SystemTime,
    pub recovery_pending: bool,
}
