//! Session records: one per loop iteration.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::id::{generate_session_id, now};

/// Status of a single agent session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Running,
    Completed,
    Failed,
    Interrupted,
}

impl SessionStatus {
    pub fn is_final(&self) -> bool {
        !matches!(self, SessionStatus::Running)
    }
}

/// A single iteration of the loop: one headless agent run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Internal session id, also the session log directory name
    pub id: String,
    /// Session id reported by the agent in its init message
    pub agent_session_id: Option<String>,
    pub loop_id: String,
    /// 1-indexed, strictly increasing within a loop
    pub iteration: u32,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub status: SessionStatus,
    /// Task the agent worked on, if one could be detected
    pub task_worked_on: Option<String>,
    pub cost_usd: f64,
    pub tokens_used: u64,
    pub num_turns: u32,
    pub duration_ms: Option<u64>,
    pub log_path: PathBuf,
}

impl Session {
    /// Start a running session for `iteration`
    pub fn start(loop_id: &str, iteration: u32, log_path: impl FnOnce(&str) -> PathBuf) -> Self {
        let id = generate_session_id(iteration);
        let log_path = log_path(&id);
        Self {
            id,
            agent_session_id: None,
            loop_id: loop_id.to_string(),
            iteration,
            started_at: now(),
            ended_at: None,
            status: SessionStatus::Running,
            task_worked_on: None,
            cost_usd: 0.0,
            tokens_used: 0,
            num_turns: 0,
            duration_ms: None,
            log_path,
        }
    }

    /// Finalize the session. Only the first call has any effect.
    pub fn finish(&mut self, status: SessionStatus) -> bool {
        if self.status.is_final() {
            return false;
        }
        let ended = now();
        self.status = status;
        self.ended_at = Some(ended);
        if self.duration_ms.is_none() {
            let elapsed = (ended - self.started_at).num_milliseconds().max(0) as u64;
            self.duration_ms = Some(elapsed);
        }
        true
    }
}

/// Lightweight session info for list views
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub id: String,
    pub iteration: u32,
    pub status: SessionStatus,
    pub task_title: Option<String>,
    pub cost_usd: f64,
    pub num_turns: u32,
    pub duration_ms: Option<u64>,
}

impl SessionSummary {
    pub fn from_session(session: &Session, task_title: Option<String>) -> Self {
        Self {
            id: session.id.clone(),
            iteration: session.iteration,
            status: session.status,
            task_title,
            cost_usd: session.cost_usd,
            num_turns: session.num_turns,
            duration_ms: session.duration_ms,
        }
    }
}
