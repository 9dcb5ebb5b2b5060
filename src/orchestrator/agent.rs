//! Worker ("agent") records.

use std::collections::BTreeSet;
use std::fmt;
use std::time::SystemTime;
use serde::{Deserialize, Serialize};

/// What an agent registration API hands to the engine.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct AgentDescriptor {
    pub id: String,
    /// Task types this agent declares it can run.
    #[serde(default)]
    pub task_types: BTreeSet<String>,
}

impl AgentDescriptor {
    pub fn new<I, S>(id: impl Into<String>, task_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            id: id.into(),
            task_types: task_types.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Idle,
    Busy,
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AgentStatus::Idle => "idle",
            AgentStatus::Busy => "busy",
        })
    }
}

/// A registered agent as tracked by the engine.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Agent {
    pub id: String,
    pub task_types: BTreeSet<String>,
    pub status: AgentStatus,
    pub active_task_count: usize,
    pub completed_task_count: u64,
    pub failed_task_count: u64,
    pub registered_at: SystemTime,
    pub last_activity: SystemTime,
    /// Registration order; earlier agents win score ties.
    #[serde(skip)]
    pub(crate) seq: u64,
}

impl Agent {
    pub(crate) fn register(descriptor: AgentDescriptor, seq: u64) -> Self {
        let now = SystemTime::now();
        Self {
            id: descriptor.id,
            task_types: descriptor.task_types,
            status: AgentStatus::Idle,
            active_task_count: 0,
            completed_task_count: 0,
            failed_task_count: 0,
            registered_at: now,
            last_activity: now,
            seq,
        }
    }

    pub fn supports(&self, task_type: &str) -> bool {
        self.task_types.contains(task_type)
    }
}
