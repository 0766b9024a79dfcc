//! Shared primitives: run and bot identifiers plus the bot status enum.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier for one workflow run. Runs, not bots, are the unit callers
/// address: a bot instance is created per run and torn down with it.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct WorkflowRunId(pub String);

impl WorkflowRunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for WorkflowRunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for WorkflowRunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for WorkflowRunId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Identifier for one bot instance.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct BotId(pub String);

impl BotId {
    /// Build a bot id in the `{platform}_bot_{run}_{suffix}` form so log
    /// lines stay greppable per platform and per run.
    pub fn generate(platform: &str, run_id: &WorkflowRunId) -> Self {
        let suffix = &Uuid::new_v4().simple().to_string()[..8];
        Self(format!("{}_bot_{}_{}", platform, run_id.0, suffix))
    }
}

impl fmt::Display for BotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle status of one bot session.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BotStatus {
    Idle,
    Running,
    Paused,
    Stopped,
    Error,
}

impl BotStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BotStatus::Idle => "idle",
            BotStatus::Running => "running",
            BotStatus::Paused => "paused",
            BotStatus::Stopped => "stopped",
            BotStatus::Error => "error",
        }
    }

    /// A worker task may only be alive in these states.
    pub fn is_active(&self) -> bool {
        matches!(self, BotStatus::Running | BotStatus::Paused)
    }
}

impl fmt::Display for BotStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
