//! Backpressure Runner - execute check commands through `sh -c`

use async_trait::async_trait;
use log::{debug, info};
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use super::traits::{CheckResult, CheckRunner, NO_EXIT_CODE};
use crate::domain::BackpressureCheck;

/// Execution settings shared by all checks
#[derive(Debug, Clone)]
pub struct CheckOptions {
    /// Environment variables to set
    pub env: Vec<(String, String)>,
    /// Timeout in milliseconds (default: 600000)
    pub timeout_ms: u64,
}

impl Default for CheckOptions {
    fn default() -> Self {
        Self {
            env: Vec::new(),
            timeout_ms: 600_000,
        }
    }
}

impl CheckOptions {
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn timeout_ms(mut self, ms: u64) -> Self {
        self.timeout_ms = ms;
        self
    }
}

/// Runs checks as shell commands in the target directory
#[derive(Debug, Clone, Default)]
pub struct BackpressureRunner {
    options: CheckOptions,
}

impl BackpressureRunner {
    pub fn new(options: CheckOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &CheckOptions {
        &self.options
    }
}

#[async_trait]
impl CheckRunner for BackpressureRunner {
    async fn run(&self, check: &BackpressureCheck, cwd: &Path, cancel: &CancellationToken) -> CheckResult {
        debug!("running check '{}': {}", check.name, check.command);

        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(&check.command);
        cmd.current_dir(cwd);
        for (key, value) in &self.options.env {
            cmd.env(key, value);
        }
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => return CheckResult::fail(NO_EXIT_CODE, format!("failed to run '{}': {}", check.command, e)),
        };

        // dropping the wait future kills the child
        let timeout = tokio::time::Duration::from_millis(self.options.timeout_ms);
        let output = tokio::select! {
            result = child.wait_with_output() => result,
            _ = tokio::time::sleep(timeout) => {
                info!("check '{}' timed out after {}ms", check.name, self.options.timeout_ms);
                return CheckResult::fail(
                    NO_EXIT_CODE,
                    format!("check timed out after {}ms", self.options.timeout_ms),
                );
            }
            _ = cancel.cancelled() => {
                debug!("check '{}' cancelled", check.name);
                return CheckResult::fail(NO_EXIT_CODE, "check cancelled");
            }
        };

        let output = match output {
            Ok(output) => output,
            Err(e) => return CheckResult::fail(NO_EXIT_CODE, format!("failed to wait for '{}': {}", check.command, e)),
        };

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.is_empty() {
            if !combined.is_empty() && !combined.ends_with('\n') {
                combined.push('\n');
            }
            combined.push_str(&stderr);
        }

        let exit_code = output.status.code().unwrap_or(NO_EXIT_CODE);
        info!("check '{}' exited with {}", check.name, exit_code);
        if output.status.success() {
            CheckResult::pass(combined)
        } else {
            CheckResult::fail(exit_code, combined)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::BackpressureTrigger;
    use tempfile::TempDir;

    fn check(command: &str) -> BackpressureCheck {
        BackpressureCheck::new("test", command, BackpressureTrigger::EachIteration)
    }

    async fn run(runner: &BackpressureRunner, command: &str) -> CheckResult {
        let temp = TempDir::new().unwrap();
        runner.run(&check(command), temp.path(), &CancellationToken::new()).await
    }

    #[test]
    fn test_options_builder() {
        let options = CheckOptions::default().env("CI", "1").timeout_ms(5000);
        assert_eq!(options.env, vec![("CI".to_string(), "1".to_string())]);
        assert_eq!(options.timeout_ms, 5000);
        assert_eq!(CheckOptions::default().timeout_ms, 600_000);
    }

    #[tokio::test]
    async fn test_zero_exit_passes() {
        let result = run(&BackpressureRunner::default(), "echo fine").await;
        assert!(result.passed);
        assert_eq!(result.exit_code, 0);
        assert_eq!(result.output, "fine\n");
    }

    #[tokio::test]
    async fn test_nonzero_exit_fails_with_combined_output() {
        let result = run(&BackpressureRunner::default(), "echo out; echo err >&2; exit 2").await;
        assert!(!result.passed);
        assert_eq!(result.exit_code, 2);
        assert!(result.output.contains("out"));
        assert!(result.output.contains("err"));
    }

    #[tokio::test]
    async fn test_runs_in_cwd() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("tsconfig.json"), "{}").unwrap();
        let result = BackpressureRunner::default()
            .run(&check("test -f tsconfig.json"), temp.path(), &CancellationToken::new())
            .await;
        assert!(result.passed);
    }

    #[tokio::test]
    async fn test_env_passed_through() {
        let runner = BackpressureRunner::new(CheckOptions::default().env("MY_VAR", "hello"));
        let result = run(&runner, "test \"$MY_VAR\" = \"hello\"").await;
        assert!(result.passed);
    }

    #[tokio::test]
    async fn test_unknown_command_fails() {
        let result = run(&BackpressureRunner::default(), "nonexistent_command_xyz123").await;
        assert!(!result.passed);
        assert_eq!(result.exit_code, 127);
    }

    #[tokio::test]
    async fn test_timeout() {
        let runner = BackpressureRunner::new(CheckOptions::default().timeout_ms(100));
        let result = run(&runner, "sleep 10").await;
        assert!(!result.passed);
        assert_eq!(result.exit_code, NO_EXIT_CODE);
        assert!(result.output.contains("timed out"));
    }

    #[tokio::test]
    async fn test_cancelled() {
        let temp = TempDir::new().unwrap();
        let cancel = CancellationToken::new();
        let trip = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
            trip.cancel();
        });
        let result = BackpressureRunner::default()
            .run(&check("sleep 10"), temp.path(), &cancel)
            .await;
        assert!(!result.passed);
        assert_eq!(result.output, "check cancelled");
    }
}
