//! Backpressure - gating commands run at trigger points in the loop

mod command;
mod traits;

pub use command::{BackpressureRunner, CheckOptions};
pub use traits::{CheckResult, CheckRunner, NO_EXIT_CODE};
