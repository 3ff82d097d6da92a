//! Terminal rendering of runner events and session log entries.

use colored::*;

use wiggum::domain::{LoopEndReason, LoopRunnerEvent, SessionStatus};
use wiggum::session_log::SessionLogEntry;

/// Process exit code for a finished run
pub fn exit_code(reason: LoopEndReason) -> i32 {
    match reason {
        LoopEndReason::Completed | LoopEndReason::MaxIterations | LoopEndReason::BudgetExceeded => 0,
        LoopEndReason::UserStopped => 130,
        LoopEndReason::Error => 1,
    }
}

/// One line per event. Check output is only shown when `verbose`.
pub fn format_event(event: &LoopRunnerEvent, verbose: bool) -> String {
    match event {
        LoopRunnerEvent::IterationStart { iteration, session } => {
            format!("{} iteration {} ({})", "▶".cyan(), iteration.to_string().bold(), session.id.dimmed())
        }
        LoopRunnerEvent::IterationEnd { iteration, session } => {
            let status = match session.status {
                SessionStatus::Completed => "completed".green(),
                SessionStatus::Failed => "failed".red(),
                SessionStatus::Interrupted => "interrupted".yellow(),
                SessionStatus::Running => "running".normal(),
            };
            format!(
                "{} iteration {} {} ${:.4} {} turns",
                "■".cyan(),
                iteration,
                status,
                session.cost_usd,
                session.num_turns
            )
        }
        LoopRunnerEvent::TaskDetected { task, .. } => {
            format!("{} {} {}", "✓".green(), task.id.green(), task.title)
        }
        LoopRunnerEvent::BackpressureStart { check_name, trigger } => {
            format!("  {} {} ({})", "…".dimmed(), check_name, trigger.as_str())
        }
        LoopRunnerEvent::BackpressurePass { check_name } => format!("  {} {}", "✓".green(), check_name),
        LoopRunnerEvent::BackpressureFail {
            check_name,
            output,
            exit_code,
        } => {
            let mut line = format!("  {} {} (exit code {})", "✗".red(), check_name.red(), exit_code);
            if verbose && !output.trim().is_empty() {
                for out in output.trim_end().lines() {
                    line.push_str(&format!("\n      {}", out.dimmed()));
                }
            }
            line
        }
        LoopRunnerEvent::SessionLog { entry, .. } => format!("    {}", format_entry(entry)),
        LoopRunnerEvent::LoopEnd { reason, error } => {
            let reason_text = match reason {
                LoopEndReason::Completed => reason.as_str().green().bold(),
                LoopEndReason::Error => reason.as_str().red().bold(),
                _ => reason.as_str().yellow().bold(),
            };
            match error {
                Some(error) => format!("{} {}: {}", "Loop ended:".bold(), reason_text, error),
                None => format!("{} {}", "Loop ended:".bold(), reason_text),
            }
        }
    }
}

pub fn format_entry(entry: &SessionLogEntry) -> String {
    let kind = match entry.kind() {
        "error" => entry.kind().red(),
        "result" => entry.kind().green(),
        "assistant_text" | "assistant_tool_use" => entry.kind().cyan(),
        other => other.dimmed(),
    };
    format!("{} {:<18} {}", entry.timestamp.format("%H:%M:%S"), kind, entry.summary())
}
