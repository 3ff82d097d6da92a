//! Headless agent process: spawn, stream stdout, cancel.

use async_trait::async_trait;
use log::{debug, info, warn};
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdout, Command};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::protocol::{StreamMessage, parse_line};
use crate::error::{Result, WiggumError};

/// Bytes of stderr kept for diagnostics
const STDERR_TAIL_BYTES: usize = 4096;

/// Options for one agent session
#[derive(Debug, Clone, Default)]
pub struct AgentOptions {
    pub prompt: String,
    pub cwd: PathBuf,
    pub model: Option<String>,
    pub max_turns: Option<u32>,
    /// Agent session id to continue
    pub resume_session_id: Option<String>,
    pub skip_permissions: bool,
}

impl AgentOptions {
    pub fn new(prompt: impl Into<String>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            prompt: prompt.into(),
            cwd: cwd.into(),
            ..Default::default()
        }
    }

    pub fn model(mut self, model: Option<String>) -> Self {
        self.model = model;
        self
    }

    pub fn max_turns(mut self, max_turns: Option<u32>) -> Self {
        self.max_turns = max_turns;
        self
    }

    pub fn resume(mut self, session_id: Option<String>) -> Self {
        self.resume_session_id = session_id;
        self
    }

    pub fn skip_permissions(mut self, skip: bool) -> Self {
        self.skip_permissions = skip;
        self
    }
}

/// How the process ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessExit {
    /// Exited on its own; `code` is None when killed by a signal
    Exited { code: Option<i32>, stderr: String },
    /// Terminated because the cancellation token fired
    Cancelled,
}

/// One item from a running agent
#[derive(Debug, Clone, PartialEq)]
pub enum AgentOutput {
    Message(StreamMessage),
    /// Line that failed to decode; the stream continues
    Malformed { line: String, error: String },
    /// Always the last item
    Exited(ProcessExit),
}

/// Pull-based view of a running agent session
#[async_trait]
pub trait AgentStream: Send {
    /// Next output in stdout order; `None` after `Exited` has been returned
    async fn next_output(&mut self) -> Option<AgentOutput>;
}

/// Starts agent sessions
#[async_trait]
pub trait AgentLauncher: Send + Sync {
    async fn launch(&self, options: AgentOptions, cancel: CancellationToken) -> Result<Box<dyn AgentStream>>;
}

/// Program and fixed leading arguments for the agent CLI
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentCommand {
    pub program: String,
    pub base_args: Vec<String>,
}

impl AgentCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            base_args: Vec::new(),
        }
    }

    pub fn args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.base_args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Full argument list for one session
    pub fn build_args(&self, options: &AgentOptions) -> Vec<String> {
        let mut args = self.base_args.clone();
        args.extend(
            ["-p", "--output-format", "stream-json", "--verbose"]
                .iter()
                .map(|s| s.to_string()),
        );
        if let Some(model) = &options.model {
            args.push("--model".to_string());
            args.push(model.clone());
        }
        if let Some(max_turns) = options.max_turns {
            args.push("--max-turns".to_string());
            args.push(max_turns.to_string());
        }
        if let Some(session_id) = &options.resume_session_id {
            args.push("--resume".to_string());
            args.push(session_id.clone());
        }
        if options.skip_permissions {
            args.push("--dangerously-skip-permissions".to_string());
        }
        args
    }
}

impl Default for AgentCommand {
    fn default() -> Self {
        Self::new("claude")
    }
}

/// Launches the agent CLI as a child process
#[derive(Debug, Clone, Default)]
pub struct ProcessLauncher {
    command: AgentCommand,
}

impl ProcessLauncher {
    pub fn new(command: AgentCommand) -> Self {
        Self { command }
    }

    pub fn command(&self) -> &AgentCommand {
        &self.command
    }
}

#[async_trait]
impl AgentLauncher for ProcessLauncher {
    async fn launch(&self, options: AgentOptions, cancel: CancellationToken) -> Result<Box<dyn AgentStream>> {
        let args = self.command.build_args(&options);
        debug!("spawning {} {:?} in {}", self.command.program, args, options.cwd.display());

        let mut command = Command::new(&self.command.program);
        command
            .args(&args)
            .current_dir(&options.cwd)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // Own process group: a terminal Ctrl-C reaches only wiggum, which stops the agent through the token
        #[cfg(unix)]
        command.process_group(0);
        let mut child = command
            .spawn()
            .map_err(|e| WiggumError::Spawn(format!("{}: {}", self.command.program, e)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| WiggumError::Spawn("stdout not captured".to_string()))?;

        if let Some(mut stdin) = child.stdin.take() {
            let prompt = options.prompt;
            tokio::spawn(async move {
                if let Err(e) = stdin.write_all(prompt.as_bytes()).await {
                    debug!("agent stdin write failed: {}", e);
                }
                // dropping stdin closes it
            });
        }

        let stderr_task = child.stderr.take().map(|mut stderr| {
            tokio::spawn(async move {
                let mut buf = Vec::new();
                let _ = stderr.read_to_end(&mut buf).await;
                tail(&String::from_utf8_lossy(&buf), STDERR_TAIL_BYTES)
            })
        });

        info!("agent process started (pid {:?})", child.id());

        Ok(Box::new(ProcessStream {
            child,
            stdout: BufReader::new(stdout),
            line: Vec::new(),
            stderr_task,
            cancel,
            done: false,
        }))
    }
}

struct ProcessStream {
    child: Child,
    stdout: BufReader<ChildStdout>,
    line: Vec<u8>,
    stderr_task: Option<JoinHandle<String>>,
    cancel: CancellationToken,
    done: bool,
}

impl ProcessStream {
    async fn terminate(&mut self) -> AgentOutput {
        if let Err(e) = self.child.kill().await {
            warn!("failed to kill agent process: {}", e);
        }
        self.done = true;
        AgentOutput::Exited(ProcessExit::Cancelled)
    }

    async fn collect_exit(&mut self, read_error: Option<String>) -> AgentOutput {
        let status = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            status = self.child.wait() => Some(status),
        };
        let Some(status) = status else {
            return self.terminate().await;
        };

        let mut stderr = match self.stderr_task.take() {
            Some(task) => task.await.unwrap_or_default(),
            None => String::new(),
        };
        if let Some(err) = read_error {
            if !stderr.is_empty() {
                stderr.push('\n');
            }
            stderr.push_str(&format!("stdout read error: {}", err));
        }

        self.done = true;
        let code = match status {
            Ok(status) => status.code(),
            Err(e) => {
                warn!("failed to wait for agent process: {}", e);
                None
            }
        };
        debug!("agent process exited with code {:?}", code);
        AgentOutput::Exited(ProcessExit::Exited { code, stderr })
    }
}

#[async_trait]
impl AgentStream for ProcessStream {
    async fn next_output(&mut self) -> Option<AgentOutput> {
        if self.done {
            return None;
        }
        loop {
            let read = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => None,
                read = self.stdout.read_until(b'\n', &mut self.line) => Some(read),
            };
            let output = match read {
                None => self.terminate().await,
                Some(Ok(0)) => self.collect_exit(None).await,
                Some(Ok(_)) => {
                    let bytes = std::mem::take(&mut self.line);
                    match decode_line(bytes) {
                        Some(output) => output,
                        None => continue,
                    }
                }
                Some(Err(e)) => self.collect_exit(Some(e.to_string())).await,
            };
            return Some(output);
        }
    }
}

/// Decode one stdout line; `None` for blank lines
fn decode_line(mut bytes: Vec<u8>) -> Option<AgentOutput> {
    while matches!(bytes.last(), Some(b'\n' | b'\r')) {
        bytes.pop();
    }
    let line = match String::from_utf8(bytes) {
        Ok(line) => line,
        Err(e) => {
            let error = format!("invalid UTF-8: {}", e.utf8_error());
            return Some(AgentOutput::Malformed {
                line: String::from_utf8_lossy(e.as_bytes()).into_owned(),
                error,
            });
        }
    };
    if line.trim().is_empty() {
        return None;
    }
    Some(match parse_line(&line) {
        Ok(message) => AgentOutput::Message(message),
        Err(e) => AgentOutput::Malformed {
            line,
            error: e.to_string(),
        },
    })
}

fn tail(text: &str, max_bytes: usize) -> String {
    if text.len() <= max_bytes {
        return text.to_string();
    }
    let mut start = text.len() - max_bytes;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    text[start..].to_string()
}
