//! Health tracking subsystem.
//!
//! # Data Flow
//! ```text
//! Failure observed by Gateway::call
//!     → EndpointSelector::mark_unhealthy
//!     → state.rs (healthy = false, generation += 1)
//!     → recovery.rs (re-admission scheduled after a fixed delay)
//!
//! Recovery fires
//!     → generation still current? → healthy again
//!     → superseded (removed / manually marked)? → no-op
//! ```
//!
//! # Design Decisions
//! - Health state is per-endpoint, not per-pool
//! - Scheduling is injected, so the selector works with or without a runtime

pub mod recovery;
pub mod state;

pub use recovery::{ManualScheduler, RecoveryScheduler, ScheduledHandle, TokioScheduler};
pub use state::{HealthRecord, HealthSnapshot};
