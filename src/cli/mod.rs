//! CLI module for wiggum - command-line interface and subcommands.
//!
//! Provides the clap definitions and terminal rendering used by `main.rs`.

pub mod commands;
pub mod output;

pub use commands::Cli;
