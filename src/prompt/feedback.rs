//! Feedback carried from one iteration into the next prompt.

/// Accumulates failing check output and agent-reported errors
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Feedback {
    sections: Vec<String>,
    agent_errors: Vec<String>,
}

impl Feedback {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a failing check; output is truncated to `max_chars`
    pub fn check_failed(&mut self, name: &str, exit_code: i32, output: &str, max_chars: usize) {
        self.sections.push(format!(
            "### {} failed (exit code {})\n\n```\n{}\n```",
            name,
            exit_code,
            truncate(output.trim_end(), max_chars)
        ));
    }

    /// Errors from an agent `result` error message
    pub fn agent_errors(&mut self, errors: impl IntoIterator<Item = impl Into<String>>) {
        self.agent_errors.extend(errors.into_iter().map(Into::into));
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty() && self.agent_errors.is_empty()
    }

    /// Text for the `backpressure` placeholder, None when there is nothing to say
    pub fn render(&self) -> Option<String> {
        if self.is_empty() {
            return None;
        }
        let mut parts = self.sections.clone();
        if !self.agent_errors.is_empty() {
            let list: Vec<String> = self.agent_errors.iter().map(|e| format!("- {}", e)).collect();
            parts.push(format!("### Agent errors\n\n{}", list.join("\n")));
        }
        Some(parts.join("\n\n"))
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    let total = text.chars().count();
    if total <= max_chars {
        return text.to_string();
    }
    let kept: String = text.chars().take(max_chars).collect();
    format!("{}\n... ({} more characters truncated)", kept, total - max_chars)
}
