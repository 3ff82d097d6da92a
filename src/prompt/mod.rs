//! Prompt System - iteration prompt building
//!
//! The builder interpolates the loop's template with spec, plan, budget
//! figures and the feedback collected from the previous iteration.

mod builder;
mod feedback;

pub use builder::{PromptBuilder, PromptVariables};
pub use feedback::Feedback;
