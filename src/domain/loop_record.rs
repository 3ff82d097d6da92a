//! Loop record and related types
//!
//! The Loop is the aggregate root in Wiggum: one configured run targeting a
//! project, executing repeated agent iterations until a stop condition.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::backpressure::BackpressureConfig;
use super::task::Plan;
use crate::id::{generate_loop_id, now};

/// The core Loop struct representing a single loop instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Loop {
    //=== Identity ===
    /// Unique identifier (timestamp + random suffix: "1738300800123-a1b2")
    pub id: String,

    /// Human-readable loop name
    pub name: String,

    /// Absolute path to the project the agent works in
    pub target_dir: PathBuf,

    //=== Inputs ===
    /// The requirements document
    pub spec: SpecDoc,

    /// The implementation plan (task list)
    pub plan: Plan,

    /// The prompt template fed to every iteration
    pub prompt: PromptTemplate,

    //=== Behavior Configuration ===
    pub config: LoopConfig,

    pub backpressure: BackpressureConfig,

    //=== Runtime State ===
    pub status: LoopStatus,

    //=== Timestamps ===
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The requirements document referenced by the plan.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SpecDoc {
    pub path: Option<PathBuf>,
    pub content: String,
}

/// Raw prompt template with `{{placeholder}}` variables.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PromptTemplate {
    pub path: Option<PathBuf>,
    pub template: String,
}

/// Whether the loop enforces iteration and budget caps
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoopMode {
    /// Unbounded: runs until the plan completes, an error, or the user stops it
    #[default]
    Yolo,
    /// Stops at `max_iterations` and/or once `budget_usd` is exceeded
    Bounded,
}

/// Controls how the loop executes
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct LoopConfig {
    pub mode: LoopMode,
    /// Only honoured in bounded mode
    pub max_iterations: Option<u32>,
    /// Only honoured in bounded mode
    pub budget_usd: Option<f64>,
    /// Model override passed to the agent
    pub model: Option<String>,
}

impl LoopConfig {
    /// Unbounded loop with an optional model override
    pub fn yolo(model: Option<String>) -> Self {
        Self {
            mode: LoopMode::Yolo,
            max_iterations: None,
            budget_usd: None,
            model,
        }
    }

    /// Bounded loop capped by iterations and/or budget
    pub fn bounded(max_iterations: Option<u32>, budget_usd: Option<f64>) -> Self {
        Self {
            mode: LoopMode::Bounded,
            max_iterations,
            budget_usd,
            model: None,
        }
    }

    pub fn is_bounded(&self) -> bool {
        self.mode == LoopMode::Bounded
    }

    /// Iteration cap in effect, if any
    pub fn iteration_cap(&self) -> Option<u32> {
        if self.is_bounded() { self.max_iterations } else { None }
    }

    /// Budget cap in effect, if any
    pub fn budget_cap(&self) -> Option<f64> {
        if self.is_bounded() { self.budget_usd } else { None }
    }
}

/// Lifecycle status of a loop
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoopStatus {
    /// Configured, never started
    #[default]
    Idle,
    /// Iterating
    Running,
    /// Stopped before the plan finished (user stop or a bounded cap); resumable
    Paused,
    /// Every plan task done
    Completed,
    /// Stopped by an unrecoverable error
    Failed,
}

impl LoopStatus {
    /// Returns true if the loop is in a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, LoopStatus::Completed | LoopStatus::Failed)
    }

    /// Returns true if the loop can be started again
    pub fn is_startable(&self) -> bool {
        matches!(self, LoopStatus::Idle | LoopStatus::Paused)
    }
}

impl Loop {
    /// Create an idle loop targeting `target_dir`
    pub fn new(name: impl Into<String>, target_dir: impl Into<PathBuf>) -> Self {
        let now = now();
        Self {
            id: generate_loop_id(),
            name: name.into(),
            target_dir: target_dir.into(),
            spec: SpecDoc::default(),
            plan: Plan::default(),
            prompt: PromptTemplate::default(),
            config: LoopConfig::default(),
            backpressure: BackpressureConfig::default(),
            status: LoopStatus::Idle,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_spec(mut self, content: impl Into<String>) -> Self {
        self.spec.content = content.into();
        self
    }

    pub fn with_plan(mut self, plan: Plan) -> Self {
        self.plan = plan;
        self
    }

    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.prompt.template = template.into();
        self
    }

    pub fn with_config(mut self, config: LoopConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_backpressure(mut self, backpressure: BackpressureConfig) -> Self {
        self.backpressure = backpressure;
        self
    }

    /// Move to a new status and touch the timestamp
    pub fn set_status(&mut self, status: LoopStatus) {
        if self.status != status {
            log::debug!("loop {} status {:?} -> {:?}", self.id, self.status, status);
        }
        self.status = status;
        self.touch();
    }

    /// Update the timestamp
    pub fn touch(&mut self) {
        self.updated_at = now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loop_status_is_terminal() {
        assert!(!LoopStatus::Idle.is_terminal());
        assert!(!LoopStatus::Running.is_terminal());
        assert!(!LoopStatus::Paused.is_terminal());
        assert!(LoopStatus::Completed.is_terminal());
        assert!(LoopStatus::Failed.is_terminal());
    }

    #[test]
    fn test_loop_status_is_startable() {
        assert!(LoopStatus::Idle.is_startable());
        assert!(LoopStatus::Paused.is_startable());
        assert!(!LoopStatus::Running.is_startable());
        assert!(!LoopStatus::Completed.is_startable());
    }

    #[test]
    fn test_new_loop_is_idle() {
        let lp = Loop::new("demo", "/tmp/project");
        assert_eq!(lp.status, LoopStatus::Idle);
        assert_eq!(lp.name, "demo");
        assert_eq!(lp.target_dir, PathBuf::from("/tmp/project"));
        assert_eq!(lp.created_at, lp.updated_at);
    }

    #[test]
    fn test_caps_ignored_in_yolo_mode() {
        let config = LoopConfig {
            mode: LoopMode::Yolo,
            max_iterations: Some(3),
            budget_usd: Some(1.0),
            model: None,
        };
        assert_eq!(config.iteration_cap(), None);
        assert_eq!(config.budget_cap(), None);
    }

    #[test]
    fn test_caps_in_bounded_mode() {
        let config = LoopConfig::bounded(Some(3), Some(5.0));
        assert!(config.is_bounded());
        assert_eq!(config.iteration_cap(), Some(3));
        assert_eq!(config.budget_cap(), Some(5.0));
    }

    #[test]
    fn test_set_status_touches_timestamp() {
        let mut lp = Loop::new("demo", "/tmp");
        let before = lp.updated_at;
        std::thread::sleep(std::time::Duration::from_millis(2));
        lp.set_status(LoopStatus::Running);
        assert_eq!(lp.status, LoopStatus::Running);
        assert!(lp.updated_at > before);
    }

    #[test]
    fn test_loop_mode_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&LoopMode::Yolo).unwrap(), "\"yolo\"");
        assert_eq!(serde_json::to_string(&LoopMode::Bounded).unwrap(), "\"bounded\"");
    }
}
