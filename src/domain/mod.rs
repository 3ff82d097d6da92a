//! Domain types for Wiggum
//!
//! This module contains all core domain types:
//! - Loop: the aggregate root with target, spec, plan, prompt and configuration
//! - Task / Plan: the task list and its dependency graph
//! - Session: one record per iteration
//! - BackpressureCheck: gating commands and their triggers
//! - LoopRunnerEvent: the outbound notification union

pub mod backpressure;
pub mod event;
pub mod loop_record;
pub mod session;
pub mod task;

pub use backpressure::{BackpressureCheck, BackpressureConfig, BackpressureTrigger};
pub use event::{LoopEndReason, LoopRunnerEvent};
pub use loop_record::{Loop, LoopConfig, LoopMode, LoopStatus, PromptTemplate, SpecDoc};
pub use session::{Session, SessionStatus, SessionSummary};
pub use task::{Plan, Task, TaskStatus};
