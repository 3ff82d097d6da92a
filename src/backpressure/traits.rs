//! Backpressure Runner interface

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio_util::sync::CancellationToken;

use crate::domain::BackpressureCheck;

/// Exit code reported when a check never produced one (spawn error, timeout, cancel, signal)
pub const NO_EXIT_CODE: i32 = -1;

/// Outcome of one check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckResult {
    /// True iff the command exited with code zero
    pub passed: bool,
    /// Combined stdout and stderr
    pub output: String,
    pub exit_code: i32,
}

impl CheckResult {
    pub fn pass(output: impl Into<String>) -> Self {
        Self {
            passed: true,
            output: output.into(),
            exit_code: 0,
        }
    }

    pub fn fail(exit_code: i32, output: impl Into<String>) -> Self {
        Self {
            passed: false,
            output: output.into(),
            exit_code,
        }
    }
}

/// Runs a gating command to completion
#[async_trait]
pub trait CheckRunner: Send + Sync {
    /// Never errors: any failure to run is a failed check
    async fn run(&self, check: &BackpressureCheck, cwd: &Path, cancel: &CancellationToken) -> CheckResult;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pass_has_zero_exit() {
        let result = CheckResult::pass("ok");
        assert!(result.passed);
        assert_eq!(result.exit_code, 0);
    }

    #[test]
    fn test_fail_keeps_output() {
        let result = CheckResult::fail(2, "error TS2322");
        assert!(!result.passed);
        assert_eq!(result.exit_code, 2);
        assert_eq!(result.output, "error TS2322");
    }
}
