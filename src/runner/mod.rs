//! Loop runner module - implements the Ralph Wiggum iteration pattern.
//!
//! This module provides the core loop execution logic, including:
//! - LoopRunner, the iteration state machine
//! - EventSink for delivering runner events to observers
//! - TaskDetector strategies for inferring plan progress from a session

mod detector;
mod events;
mod loop_runner;

pub use detector::{TaskDetection, TaskDetector, TranscriptTaskDetector};
pub use events::EventSink;
pub use loop_runner::{LoopRunner, LoopRunnerConfig, LoopSummary};
