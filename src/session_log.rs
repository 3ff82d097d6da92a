//! Per-session JSONL transcript.
//!
//! Layout: `<root>/<session-id>/transcript.jsonl`, one timestamped entry per
//! line. Appends are whole lines, so a reader never sees half an entry unless
//! the process died mid-write; such trailing fragments are skipped on read.

use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use crate::agent::protocol::{ContentBlock, StreamMessage, SystemSubtype};
use crate::error::{Result, WiggumError};
use crate::id::now;

const TRANSCRIPT_FILE: &str = "transcript.jsonl";

/// What a log line records
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SessionLogEvent {
    /// A decoded protocol message
    Message { message: StreamMessage },
    /// A line that could not be decoded, or a process failure
    Error {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        raw_line: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionLogEntry {
    pub timestamp: DateTime<Utc>,
    pub event: SessionLogEvent,
}

impl SessionLogEntry {
    pub fn message(message: StreamMessage) -> Self {
        Self {
            timestamp: now(),
            event: SessionLogEvent::Message { message },
        }
    }

    pub fn error(message: impl Into<String>, raw_line: Option<String>) -> Self {
        Self {
            timestamp: now(),
            event: SessionLogEvent::Error {
                message: message.into(),
                raw_line,
            },
        }
    }

    pub fn as_message(&self) -> Option<&StreamMessage> {
        match &self.event {
            SessionLogEvent::Message { message } => Some(message),
            SessionLogEvent::Error { .. } => None,
        }
    }

    /// Display classification
    pub fn kind(&self) -> &'static str {
        let message = match &self.event {
            SessionLogEvent::Error { .. } => return "error",
            SessionLogEvent::Message { message } => message,
        };
        match message {
            StreamMessage::System(m) => match m.subtype {
                SystemSubtype::Init => "system_init",
                SystemSubtype::CompactBoundary => "compact_boundary",
            },
            StreamMessage::Assistant(m) => {
                let uses_tool = m
                    .message
                    .content
                    .iter()
                    .any(|b| matches!(b, ContentBlock::ToolUse { .. }));
                if uses_tool { "assistant_tool_use" } else { "assistant_text" }
            }
            StreamMessage::User(_) => "tool_result",
            StreamMessage::Result(_) => "result",
        }
    }

    /// One-line human summary for tailing
    pub fn summary(&self) -> String {
        match &self.event {
            SessionLogEvent::Error { message, .. } => message.clone(),
            SessionLogEvent::Message { message } => match message {
                StreamMessage::System(m) => format!(
                    "{:?} session={} model={}",
                    m.subtype,
                    m.session_id,
                    m.model.as_deref().unwrap_or("-")
                ),
                StreamMessage::Assistant(_) => {
                    let tools: Vec<&str> = message.tool_uses().iter().map(|(name, _)| *name).collect();
                    match (message.assistant_text(), tools.is_empty()) {
                        (Some(text), true) => first_line(&text),
                        (Some(text), false) => format!("{} [{}]", first_line(&text), tools.join(", ")),
                        (None, _) => format!("[{}]", tools.join(", ")),
                    }
                }
                StreamMessage::User(_) => message
                    .tool_results()
                    .first()
                    .map(|r| first_line(r))
                    .unwrap_or_default(),
                StreamMessage::Result(r) => format!(
                    "{} turns={} cost=${:.4}",
                    r.subtype.as_str(),
                    r.num_turns,
                    r.total_cost_usd
                ),
            },
        }
    }
}

fn first_line(text: &str) -> String {
    text.lines().next().unwrap_or("").to_string()
}

/// Append-only transcript store rooted at a sessions directory
#[derive(Debug, Clone)]
pub struct SessionLog {
    root: PathBuf,
}

impl SessionLog {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn log_path(&self, session_id: &str) -> PathBuf {
        self.root.join(session_id).join(TRANSCRIPT_FILE)
    }

    /// Append one entry as a single line
    pub fn append(&self, session_id: &str, entry: &SessionLogEntry) -> Result<()> {
        let path = self.log_path(session_id);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| log_error(parent, e))?;
        }

        let mut line = serde_json::to_string(entry)?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| log_error(&path, e))?;
        file.write_all(line.as_bytes()).map_err(|e| log_error(&path, e))?;
        file.flush().map_err(|e| log_error(&path, e))?;
        file.sync_data().map_err(|e| log_error(&path, e))?;
        Ok(())
    }

    /// Every readable entry of a session, oldest first
    pub fn read(&self, session_id: &str) -> Result<Vec<SessionLogEntry>> {
        let path = self.log_path(session_id);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let file = File::open(&path).map_err(|e| log_error(&path, e))?;
        let mut entries = Vec::new();
        for (number, line) in BufReader::new(file).lines().enumerate() {
            let line = line.map_err(|e| log_error(&path, e))?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(&line) {
                Ok(entry) => entries.push(entry),
                Err(e) => warn!("skipping unreadable line {} in {}: {}", number + 1, path.display(), e),
            }
        }
        debug!("read {} entries from {}", entries.len(), path.display());
        Ok(entries)
    }

    /// The last `n` entries of a session
    pub fn tail(&self, session_id: &str, n: usize) -> Result<Vec<SessionLogEntry>> {
        let mut entries = self.read(session_id)?;
        let skip = entries.len().saturating_sub(n);
        Ok(entries.split_off(skip))
    }

    /// Session ids with a log directory, sorted
    pub fn sessions(&self) -> Result<Vec<String>> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }
        let mut ids = Vec::new();
        for entry in fs::read_dir(&self.root).map_err(|e| log_error(&self.root, e))? {
            let entry = entry.map_err(|e| log_error(&self.root, e))?;
            if entry.path().is_dir() {
                ids.push(entry.file_name().to_string_lossy().to_string());
            }
        }
        ids.sort();
        Ok(ids)
    }
}

fn log_error(path: &Path, e: std::io::Error) -> WiggumError {
    WiggumError::SessionLog(format!("{}: {}", path.display(), e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::protocol::parse_line;
    use tempfile::TempDir;

    fn assistant(text: &str) -> StreamMessage {
        parse_line(&format!(
            r#"{{"type":"assistant","session_id":"s","message":{{"content":[{{"type":"text","text":"{}"}}],"stop_reason":null,"usage":{{"input_tokens":1,"output_tokens":1}}}}}}"#,
            text
        ))
        .unwrap()
    }

    #[test]
    fn test_append_and_read_in_order() {
        let temp = TempDir::new().unwrap();
        let log = SessionLog::new(temp.path());

        log.append("session-001", &SessionLogEntry::message(assistant("one"))).unwrap();
        log.append("session-001", &SessionLogEntry::error("bad line", Some("{oops".to_string())))
            .unwrap();
        log.append("session-001", &SessionLogEntry::message(assistant("two"))).unwrap();

        let entries = log.read("session-001").unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].summary(), "one");
        assert_eq!(entries[1].kind(), "error");
        assert_eq!(entries[2].summary(), "two");
        assert!(log.log_path("session-001").ends_with("session-001/transcript.jsonl"));
    }

    #[test]
    fn test_tail_returns_last_entries() {
        let temp = TempDir::new().unwrap();
        let log = SessionLog::new(temp.path());
        for i in 0..5 {
            log.append("s", &SessionLogEntry::message(assistant(&format!("msg {}", i))))
                .unwrap();
        }
        let tail = log.tail("s", 2).unwrap();
        assert_eq!(tail.len(), 2);
        assert_eq!(tail[0].summary(), "msg 3");
        assert_eq!(tail[1].summary(), "msg 4");
        assert_eq!(log.tail("s", 50).unwrap().len(), 5);
    }

    #[test]
    fn test_partial_trailing_line_skipped() {
        let temp = TempDir::new().unwrap();
        let log = SessionLog::new(temp.path());
        log.append("s", &SessionLogEntry::message(assistant("whole"))).unwrap();

        let mut file = OpenOptions::new().append(true).open(log.log_path("s")).unwrap();
        file.write_all(b"{\"timestamp\":\"2026-").unwrap();

        let entries = log.read("s").unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].summary(), "whole");
    }

    #[test]
    fn test_missing_session_reads_empty() {
        let temp = TempDir::new().unwrap();
        let log = SessionLog::new(temp.path().join("sessions"));
        assert!(log.read("nope").unwrap().is_empty());
        assert!(log.sessions().unwrap().is_empty());
    }

    #[test]
    fn test_sessions_sorted() {
        let temp = TempDir::new().unwrap();
        let log = SessionLog::new(temp.path());
        log.append("session-002-b", &SessionLogEntry::error("x", None)).unwrap();
        log.append("session-001-a", &SessionLogEntry::error("y", None)).unwrap();
        assert_eq!(log.sessions().unwrap(), vec!["session-001-a", "session-002-b"]);
    }

    #[test]
    fn test_append_fails_when_root_is_a_file() {
        let temp = TempDir::new().unwrap();
        let blocker = temp.path().join("sessions");
        fs::write(&blocker, "not a dir").unwrap();
        let log = SessionLog::new(&blocker);
        let err = log.append("s", &SessionLogEntry::error("x", None)).unwrap_err();
        assert!(matches!(err, WiggumError::SessionLog(_)));
    }

    #[test]
    fn test_kind_classification() {
        let tool_use = parse_line(
            r#"{"type":"assistant","session_id":"s","message":{"content":[{"type":"tool_use","id":"t","name":"Bash","input":{}}],"stop_reason":"tool_use","usage":{}}}"#,
        )
        .unwrap();
        let entry = SessionLogEntry::message(tool_use);
        assert_eq!(entry.kind(), "assistant_tool_use");
        assert_eq!(entry.summary(), "[Bash]");
        assert_eq!(SessionLogEntry::message(assistant("hi")).kind(), "assistant_text");
    }
}
