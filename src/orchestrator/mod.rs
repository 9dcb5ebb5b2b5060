//! Task dispatch subsystem.
//!
//! # Data Flow
//! ```text
//! TaskDescriptor
//!     → engine.rs (score agents, reserve a slot on the best one)
//!     → executor.rs (TaskExecutor runs the task)
//!     → engine.rs (record Completed/Failed, release the slot)
//! ```
//!
//! # Design Decisions
//! - The engine owns agents and tasks; tasks refer to agents by id only
//! - Execution is delegated, so the engine stays independent of any transport

pub mod agent;
pub mod engine;
pub mod executor;
pub mod task;

pub use agent::{Agent, AgentDescriptor, AgentStatus};
pub use engine::{AgentMetrics, DispatchEngine, DispatchError, DispatchMetrics};
pub use executor::{ExecutionError, TaskExecutor};
pub use task::{Requirements, Task, TaskDescriptor, TaskStatus};
