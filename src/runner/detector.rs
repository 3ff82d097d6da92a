//! Task inference: which task an agent session worked on and finished.

use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

use crate::agent::StreamMessage;
use crate::domain::Plan;

static COMPLETE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"TASK_COMPLETE:\s*([\w.-]+)|<task-complete>\s*([\w.-]+)\s*</task-complete>")
        .expect("valid completion regex")
});

static CHECKED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"-\s*\[[xX]\][^\n]*\bid:([\w.-]+)").expect("valid checkbox regex"));

static TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[\w.-]+").expect("valid token regex"));

/// What a session did to the plan
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskDetection {
    pub worked_on: Option<String>,
    /// Plan task ids judged complete, in first-seen order
    pub completed: Vec<String>,
}

impl TaskDetection {
    /// Record a completion, keeping first-seen order
    pub fn complete(&mut self, id: &str) {
        if !self.completed.iter().any(|c| c == id) {
            self.completed.push(id.to_string());
        }
    }
}

/// Strategy for inferring task progress after a session
pub trait TaskDetector: Send + Sync {
    fn detect(&self, plan: &Plan, messages: &[StreamMessage]) -> TaskDetection;
}

/// Infers progress from the session transcript alone.
///
/// Completion: an explicit `TASK_COMPLETE: <id>` or `<task-complete>id</task-complete>`
/// in assistant or result text, or a tool call writing a checked box on a line
/// carrying `id:<id>`. Worked-on: first plan id referenced by a tool call or
/// tool result. Ids not in the plan are ignored.
#[derive(Debug, Clone, Copy, Default)]
pub struct TranscriptTaskDetector;

impl TaskDetector for TranscriptTaskDetector {
    fn detect(&self, plan: &Plan, messages: &[StreamMessage]) -> TaskDetection {
        let mut detection = TaskDetection::default();

        for message in messages {
            let signal_text = match message {
                StreamMessage::Assistant(_) => message.assistant_text(),
                StreamMessage::Result(r) => r.result.clone(),
                _ => None,
            };
            if let Some(text) = signal_text {
                for caps in COMPLETE_RE.captures_iter(&text) {
                    let id = caps.get(1).or_else(|| caps.get(2)).map(|m| m.as_str());
                    if let Some(id) = id.filter(|id| plan.contains(id)) {
                        detection.complete(id);
                    }
                }
            }

            let mut referenced = Vec::new();
            for (_, input) in message.tool_uses() {
                let mut strings = Vec::new();
                collect_strings(input, &mut strings);
                for text in strings {
                    for caps in CHECKED_RE.captures_iter(text) {
                        if plan.contains(&caps[1]) {
                            detection.complete(&caps[1]);
                        }
                    }
                    referenced.push(text.to_string());
                }
            }
            referenced.extend(message.tool_results());

            if detection.worked_on.is_none() {
                detection.worked_on = referenced.iter().find_map(|text| first_task_id(plan, text));
            }
        }

        if detection.worked_on.is_none() {
            detection.worked_on = detection.completed.first().cloned();
        }
        detection
    }
}

fn first_task_id(plan: &Plan, text: &str) -> Option<String> {
    TOKEN_RE
        .find_iter(text)
        .map(|m| m.as_str())
        .find(|token| plan.contains(token))
        .map(str::to_string)
}

fn collect_strings<'a>(value: &'a Value, out: &mut Vec<&'a str>) {
    match value {
        Value::String(s) => out.push(s),
        Value::Array(items) => items.iter().for_each(|v| collect_strings(v, out)),
        Value::Object(map) => map.values().for_each(|v| collect_strings(v, out)),
        _ => {}
    }
}
