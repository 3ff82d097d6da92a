//! Wiggum - autonomous coding loops for headless coding agents
//!
//! Wiggum implements the "Ralph Wiggum" pattern: an agent CLI is run over and
//! over with a fresh context, each iteration fed the spec, the task plan and
//! feedback from the previous iteration's backpressure checks, until the plan
//! is done or a stop condition hits.

pub mod agent;
pub mod backpressure;
pub mod domain;
pub mod error;
pub mod id;
pub mod prompt;
pub mod runner;
pub mod session_log;
pub mod workspace;

pub use error::{Result, WiggumError};
