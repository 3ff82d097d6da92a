//! Loop runner events delivered to observers.
//!
//! These are never persisted by the core; the session log stores protocol
//! messages, not runner events.

use serde::{Deserialize, Serialize};

use super::backpressure::BackpressureTrigger;
use super::session::Session;
use super::task::Task;
use crate::session_log::SessionLogEntry;

/// Why a loop stopped. Closed set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopEndReason {
    Completed,
    BudgetExceeded,
    MaxIterations,
    UserStopped,
    Error,
}

impl LoopEndReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoopEndReason::Completed => "completed",
            LoopEndReason::BudgetExceeded => "budget_exceeded",
            LoopEndReason::MaxIterations => "max_iterations",
            LoopEndReason::UserStopped => "user_stopped",
            LoopEndReason::Error => "error",
        }
    }
}

impl std::fmt::Display for LoopEndReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Notification emitted by the loop runner, in generation order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LoopRunnerEvent {
    IterationStart {
        iteration: u32,
        session: Session,
    },
    IterationEnd {
        iteration: u32,
        session: Session,
    },
    TaskDetected {
        iteration: u32,
        task: Task,
    },
    BackpressureStart {
        check_name: String,
        trigger: BackpressureTrigger,
    },
    BackpressurePass {
        check_name: String,
    },
    BackpressureFail {
        check_name: String,
        output: String,
        exit_code: i32,
    },
    SessionLog {
        session_id: String,
        entry: SessionLogEntry,
    },
    LoopEnd {
        reason: LoopEndReason,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

impl LoopRunnerEvent {
    /// The `type` discriminant as it appears on the wire
    pub fn kind(&self) -> &'static str {
        match self {
            LoopRunnerEvent::IterationStart { .. } => "iteration_start",
            LoopRunnerEvent::IterationEnd { .. } => "iteration_end",
            LoopRunnerEvent::TaskDetected { .. } => "task_detected",
            LoopRunnerEvent::BackpressureStart { .. } => "backpressure_start",
            LoopRunnerEvent::BackpressurePass { .. } => "backpressure_pass",
            LoopRunnerEvent::BackpressureFail { .. } => "backpressure_fail",
            LoopRunnerEvent::SessionLog { .. } => "session_log",
            LoopRunnerEvent::LoopEnd { .. } => "loop_end",
        }
    }

    pub fn is_loop_end(&self) -> bool {
        matches!(self, LoopRunnerEvent::LoopEnd { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reason_strings() {
        assert_eq!(LoopEndReason::Completed.as_str(), "completed");
        assert_eq!(LoopEndReason::BudgetExceeded.to_string(), "budget_exceeded");
        assert_eq!(
            serde_json::to_string(&LoopEndReason::MaxIterations).unwrap(),
            "\"max_iterations\""
        );
    }

    #[test]
    fn test_loop_end_serialization() {
        let event = LoopRunnerEvent::LoopEnd {
            reason: LoopEndReason::Error,
            error: Some("spawn failed".to_string()),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "loop_end");
        assert_eq!(json["reason"], "error");
        assert_eq!(json["error"], "spawn failed");
    }

    #[test]
    fn test_loop_end_without_error_omits_field() {
        let event = LoopRunnerEvent::LoopEnd {
            reason: LoopEndReason::Completed,
            error: None,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert!(json.get("error").is_none());
    }

    #[test]
    fn test_kind_matches_wire_tag() {
        let event = LoopRunnerEvent::BackpressureFail {
            check_name: "TypeScript".to_string(),
            output: "error TS2322".to_string(),
            exit_code: 2,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], event.kind());
        assert!(!event.is_loop_end());
    }
}
