//! CLI command definitions using clap.
//!
//! Defines the main CLI structure and subcommands:
//! - run: drive the loop in a project's .wiggum workspace
//! - tail: print the end of a session log
//! - check: run backpressure checks for one trigger
//! - status: summarize the workspace

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use wiggum::domain::BackpressureTrigger;

/// Wiggum - autonomous coding loops for headless coding agents
#[derive(Parser, Debug)]
#[command(name = "wiggum")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Optional config file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Check if verbose mode is enabled
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }
}

/// Project directory holding `.wiggum/`
#[derive(Args, Debug, Clone)]
pub struct DirArg {
    #[arg(short = 'C', long = "dir", default_value = ".")]
    pub dir: PathBuf,
}

/// Main subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the loop until it completes or hits a stop condition
    Run {
        /// Project directory holding .wiggum/
        #[arg(default_value = ".")]
        dir: PathBuf,

        /// Stop after this many iterations (switches to bounded mode)
        #[arg(short = 'n', long)]
        max_iterations: Option<u32>,

        /// Stop once cumulative cost exceeds this many USD (switches to bounded mode)
        #[arg(short, long)]
        budget: Option<f64>,

        /// Model override passed to the agent
        #[arg(short, long)]
        model: Option<String>,

        /// Pass --dangerously-skip-permissions to the agent
        #[arg(long)]
        skip_permissions: bool,
    },

    /// Print the last entries of a session log
    Tail {
        /// Session id (directory name under .wiggum/sessions)
        session_id: String,

        /// Number of entries to show
        #[arg(short = 'n', long, default_value_t = 20)]
        lines: usize,

        #[command(flatten)]
        dir: DirArg,
    },

    /// Run backpressure checks for one trigger
    Check {
        /// each_iteration, each_task or pre_commit
        #[arg(short, long, default_value = "pre_commit")]
        trigger: BackpressureTrigger,

        #[command(flatten)]
        dir: DirArg,
    },

    /// Show loop settings, task progress and sessions
    Status {
        #[command(flatten)]
        dir: DirArg,
    },
}
