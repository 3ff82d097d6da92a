//! Backpressure check configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// When a check runs in the loop lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackpressureTrigger {
    /// After every agent session
    EachIteration,
    /// Additionally whenever a task is judged complete
    EachTask,
    /// Only when the commit step asks for it
    PreCommit,
}

impl BackpressureTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackpressureTrigger::EachIteration => "each_iteration",
            BackpressureTrigger::EachTask => "each_task",
            BackpressureTrigger::PreCommit => "pre_commit",
        }
    }
}

impl std::str::FromStr for BackpressureTrigger {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "each_iteration" => Ok(BackpressureTrigger::EachIteration),
            "each_task" => Ok(BackpressureTrigger::EachTask),
            "pre_commit" => Ok(BackpressureTrigger::PreCommit),
            other => Err(format!("unknown trigger: {}", other)),
        }
    }
}

/// An automated command gating progress (type check, tests, lint)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackpressureCheck {
    pub name: String,
    /// Shell command, run through `sh -c`
    pub command: String,
    pub trigger: BackpressureTrigger,
}

impl BackpressureCheck {
    pub fn new(name: impl Into<String>, command: impl Into<String>, trigger: BackpressureTrigger) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            trigger,
        }
    }
}

/// Backpressure configuration for a loop
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackpressureConfig {
    pub checks: Vec<BackpressureCheck>,
    /// Optional BACKPRESSURE.md with agent-facing context
    pub file_path: Option<PathBuf>,
}

impl BackpressureConfig {
    pub fn new(checks: Vec<BackpressureCheck>) -> Self {
        Self { checks, file_path: None }
    }

    /// Checks for one trigger, in configuration order
    pub fn for_trigger(&self, trigger: BackpressureTrigger) -> Vec<&BackpressureCheck> {
        self.checks.iter().filter(|c| c.trigger == trigger).collect()
    }
}
