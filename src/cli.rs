// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

/// Command-line arguments for `pipetree`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "pipetree",
    version,
    about = "Batch-run stage pipelines over a directory tree of tasks.",
    long_about = None
)]
pub struct CliArgs {
    /// Root directory of the task tree.
    pub path: String,

    /// Run the pending tasks. Without this flag only the plan is printed.
    #[arg(long)]
    pub run: bool,

    /// Restrict the batch to the given task directory (repeatable).
    #[arg(long, value_name = "PATH")]
    pub task: Vec<String>,

    /// Restrict the batch to the given task and all tasks below it
    /// (repeatable, glob patterns allowed).
    #[arg(long = "task-dir", value_name = "PATTERN")]
    pub task_dir: Vec<String>,

    /// Treat every stage of the selected tasks as pending, regardless of
    /// previously recorded results.
    #[arg(long)]
    pub force: bool,

    /// Run without persisting completion: the next invocation will consider
    /// the tasks pending again.
    #[arg(long)]
    pub oneshot: bool,

    /// Maximum number of input items processed concurrently.
    #[arg(long, value_name = "N", default_value_t = 4)]
    pub workers: usize,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `PIPETREE_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
