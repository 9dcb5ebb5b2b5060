//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Breakers, selector and dispatch engine produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (counters, gauges)
//!
//! Consumers:
//!     → Log aggregation (stdout)
//!     → Metrics endpoint (Prometheus scrape)
//!     → Snapshot structs (`Gateway::snapshot`) for external reporting
//! ```

pub mod logging;
pub mod metrics;
