//! Task plan types.
//!
//! The plan is the diff between the spec and the current code, broken into
//! atomic tasks. Dependencies form an acyclic graph stored as an adjacency
//! list keyed by task id. Dependency order is recorded, never enforced: the
//! agent may pick tasks out of order.

use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::PathBuf;

use crate::error::{Result, WiggumError};

/// Progress state of a task
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Skipped,
}

impl TaskStatus {
    /// Completed and skipped tasks need no further work
    pub fn is_done(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Skipped)
    }

    fn rank(&self) -> u8 {
        match self {
            TaskStatus::Pending => 0,
            TaskStatus::InProgress => 1,
            TaskStatus::Completed | TaskStatus::Skipped => 2,
        }
    }
}

/// A single atomic unit of work in the plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub status: TaskStatus,
    /// Ordering hint, lower first
    #[serde(default)]
    pub priority: u32,
    /// Ids of tasks that should be completed first
    #[serde(default)]
    pub dependencies: Vec<String>,
}

impl Task {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: String::new(),
            status: TaskStatus::Pending,
            priority: 0,
            dependencies: Vec::new(),
        }
    }

    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_dependencies<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies = deps.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// The implementation plan
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    pub path: Option<PathBuf>,
    pub tasks: Vec<Task>,
}

impl Plan {
    pub fn new(tasks: Vec<Task>) -> Self {
        Self { path: None, tasks }
    }

    pub fn get(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// True when the plan has tasks and every one is completed or skipped.
    pub fn is_complete(&self) -> bool {
        !self.tasks.is_empty() && self.tasks.iter().all(|t| t.status.is_done())
    }

    pub fn count(&self, status: TaskStatus) -> usize {
        self.tasks.iter().filter(|t| t.status == status).count()
    }

    /// Whether every dependency of `id` is completed.
    pub fn dependencies_met(&self, id: &str) -> bool {
        let Some(task) = self.get(id) else {
            return false;
        };
        task.dependencies
            .iter()
            .all(|dep| self.get(dep).is_some_and(|d| d.status == TaskStatus::Completed))
    }

    /// Mark a task in progress. Returns true if the status changed.
    pub fn mark_in_progress(&mut self, id: &str) -> bool {
        self.advance(id, TaskStatus::InProgress)
    }

    /// Mark a task completed. Returns true if the status changed.
    pub fn mark_completed(&mut self, id: &str) -> bool {
        if self.contains(id) && !self.dependencies_met(id) {
            warn!("task {} completed before its dependencies", id);
        }
        self.advance(id, TaskStatus::Completed)
    }

    // Statuses only move forward: a done task never returns to pending/in_progress.
    fn advance(&mut self, id: &str, status: TaskStatus) -> bool {
        match self.tasks.iter_mut().find(|t| t.id == id) {
            Some(task) if status.rank() > task.status.rank() => {
                task.status = status;
                true
            }
            _ => false,
        }
    }

    /// Dependency adjacency list: task id -> ids it depends on.
    pub fn adjacency(&self) -> BTreeMap<&str, Vec<&str>> {
        self.tasks
            .iter()
            .map(|t| (t.id.as_str(), t.dependencies.iter().map(String::as_str).collect()))
            .collect()
    }

    /// Check unique ids, known dependencies and an acyclic dependency graph.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for task in &self.tasks {
            if !seen.insert(task.id.as_str()) {
                return Err(WiggumError::InvalidPlan(format!("duplicate task id: {}", task.id)));
            }
        }
        for task in &self.tasks {
            for dep in &task.dependencies {
                if !seen.contains(dep.as_str()) {
                    return Err(WiggumError::InvalidPlan(format!(
                        "task {} depends on unknown task {}",
                        task.id, dep
                    )));
                }
            }
        }

        let graph = self.adjacency();
        let mut state: HashMap<&str, Visit> = HashMap::new();
        for id in graph.keys() {
            let mut path = Vec::new();
            if let Some(cycle) = find_cycle(id, &graph, &mut state, &mut path) {
                return Err(WiggumError::InvalidPlan(format!(
                    "dependency cycle: {}",
                    cycle.join(" -> ")
                )));
            }
        }
        Ok(())
    }

    /// Markdown checklist used as the `{{plan}}` prompt variable.
    pub fn render_checklist(&self) -> String {
        let mut out = String::new();
        for task in &self.tasks {
            let mark = match task.status {
                TaskStatus::Pending => " ",
                TaskStatus::InProgress => "~",
                TaskStatus::Completed => "x",
                TaskStatus::Skipped => "-",
            };
            out.push_str(&format!(
                "- [{}] {} (priority {}, deps: {}) {}\n",
                mark,
                task.id,
                task.priority,
                if task.dependencies.is_empty() {
                    "none".to_string()
                } else {
                    task.dependencies.join(", ")
                },
                task.title
            ));
            for line in task.description.lines().filter(|l| !l.trim().is_empty()) {
                out.push_str(&format!("  {}\n", line.trim()));
            }
        }
        out
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Visit {
    InStack,
    Done,
}

fn find_cycle<'a>(
    id: &'a str,
    graph: &BTreeMap<&'a str, Vec<&'a str>>,
    state: &mut HashMap<&'a str, Visit>,
    path: &mut Vec<&'a str>,
) -> Option<Vec<String>> {
    match state.get(id) {
        Some(Visit::Done) => return None,
        Some(Visit::InStack) => {
            let start = path.iter().position(|p| *p == id).unwrap_or(0);
            let mut cycle: Vec<String> = path[start..].iter().map(|s| s.to_string()).collect();
            cycle.push(id.to_string());
            return Some(cycle);
        }
        None => {}
    }

    state.insert(id, Visit::InStack);
    path.push(id);
    if let Some(deps) = graph.get(id) {
        for dep in deps {
            if let Some(cycle) = find_cycle(dep, graph, state, path) {
                return Some(cycle);
            }
        }
    }
    path.pop();
    state.insert(id, Visit::Done);
    None
}
