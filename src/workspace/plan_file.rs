//! PLAN.md parsing.
//!
//! The plan file carries YAML frontmatter naming the spec, followed by a
//! checklist of annotated tasks:
//!
//! ```markdown
//! ---
//! spec: ../SPEC.md
//! ---
//!
//! - [ ] <!-- id:task-001 priority:1 deps: -->
//!   **Implement user authentication**
//!   Description of what needs to happen...
//! ```
//!
//! `[x]` is completed, `[~]` in progress, `[-]` skipped.

use regex::Regex;
use serde::Deserialize;
use std::sync::LazyLock;

use crate::domain::{Task, TaskStatus};
use crate::error::{Result, WiggumError};

static TASK_LINE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*[-*]\s*\[([ xX~-])\]\s*<!--(.*?)-->\s*(.*)$").expect("valid task line regex")
});

#[derive(Debug, Default, Deserialize)]
struct Frontmatter {
    spec: Option<String>,
}

/// Contents of a PLAN.md file
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlanFile {
    /// Spec path as written, relative to the plan file
    pub spec: Option<String>,
    pub tasks: Vec<Task>,
}

/// Parse PLAN.md content.
pub fn parse_plan(content: &str) -> Result<PlanFile> {
    let (frontmatter, body) = split_frontmatter(content)?;
    let mut tasks: Vec<Task> = Vec::new();
    let mut title_pending = false;

    for (index, line) in body.lines().enumerate() {
        if let Some(caps) = TASK_LINE_RE.captures(line) {
            let mut task = parse_annotation(&caps[2], index + 1)?;
            task.status = status_for(&caps[1]);
            let inline = caps[3].trim();
            title_pending = inline.is_empty();
            if !title_pending {
                task.title = strip_bold(inline).to_string();
            }
            tasks.push(task);
            continue;
        }

        let Some(task) = tasks.last_mut() else {
            continue;
        };
        let trimmed = line.trim();
        // Task detail is indented; anything flush left ends it
        if trimmed.is_empty() || !line.starts_with(char::is_whitespace) {
            title_pending = false;
            continue;
        }
        if title_pending {
            task.title = strip_bold(trimmed).to_string();
            title_pending = false;
        } else {
            if !task.description.is_empty() {
                task.description.push('\n');
            }
            task.description.push_str(trimmed);
        }
    }

    for task in &mut tasks {
        if task.title.is_empty() {
            task.title = task.id.clone();
        }
    }

    Ok(PlanFile {
        spec: frontmatter.spec.filter(|s| !s.trim().is_empty()),
        tasks,
    })
}

fn split_frontmatter(content: &str) -> Result<(Frontmatter, &str)> {
    let Some(rest) = content
        .strip_prefix("---\n")
        .or_else(|| content.strip_prefix("---\r\n"))
    else {
        return Ok((Frontmatter::default(), content));
    };

    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim_end() == "---" {
            let yaml = &rest[..offset];
            let body = &rest[offset + line.len()..];
            let frontmatter = if yaml.trim().is_empty() {
                Frontmatter::default()
            } else {
                serde_yaml::from_str(yaml)
                    .map_err(|e| WiggumError::InvalidPlan(format!("bad frontmatter: {}", e)))?
            };
            return Ok((frontmatter, body));
        }
        offset += line.len();
    }
    Err(WiggumError::InvalidPlan("unterminated frontmatter".to_string()))
}

fn parse_annotation(annotation: &str, line: usize) -> Result<Task> {
    let mut task = Task::new("", "");
    for token in annotation.split_whitespace() {
        let Some((key, value)) = token.split_once(':') else {
            continue;
        };
        match key {
            "id" => task.id = value.to_string(),
            "priority" => {
                task.priority = value.parse().map_err(|_| {
                    WiggumError::InvalidPlan(format!("line {}: bad priority '{}'", line, value))
                })?;
            }
            "deps" => {
                task.dependencies = value
                    .split(',')
                    .map(str::trim)
                    .filter(|d| !d.is_empty())
                    .map(str::to_string)
                    .collect();
            }
            _ => {}
        }
    }
    if task.id.is_empty() {
        return Err(WiggumError::InvalidPlan(format!("line {}: task has no id", line)));
    }
    Ok(task)
}

fn status_for(mark: &str) -> TaskStatus {
    match mark {
        "x" | "X" => TaskStatus::Completed,
        "~" => TaskStatus::InProgress,
        "-" => TaskStatus::Skipped,
        _ => TaskStatus::Pending,
    }
}

fn strip_bold(text: &str) -> &str {
    text.strip_prefix("**")
        .and_then(|t| t.strip_suffix("**"))
        .unwrap_or(text)
        .trim()
}
