//! CLI argument parsing
//!
//! Defines command-line interface using clap.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

/// Merge test results from parallel worker processes into one report
#[derive(Parser, Debug)]
#[command(name = "parallel-report")]
#[command(author = "hephaex@gmail.com")]
#[command(version)]
#[command(about = "Merge test results from parallel workers into one shared report tree")]
#[command(long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Configuration file (YAML or JSON)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Directory holding the shared run documents
    #[arg(long, global = true)]
    pub shared_dir: Option<PathBuf>,

    /// Key separating the documents of concurrent runs
    #[arg(long, global = true)]
    pub run_key: Option<String>,
}

impl Args {
    /// Verbosity override from the flags, if any
    pub fn verbosity(&self) -> Option<u8> {
        if self.quiet {
            Some(0)
        } else if self.verbose > 0 {
            Some(self.verbose.saturating_add(1))
        } else {
            None
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the run, or join the run another worker started
    Launch(LaunchArgs),

    /// Apply newline-delimited JSON lifecycle events
    Event(EventArgs),

    /// Record that this worker finished its suite
    Finish(FinishArgs),

    /// Summarize the current tree without closing the run
    Summary(SummaryArgs),

    /// Export a detailed report of the current tree
    Report(ReportArgs),

    /// Manage configuration
    Config(ConfigArgs),
}

/// Arguments for launch command
#[derive(Parser, Debug)]
pub struct LaunchArgs {
    /// Run start time in milliseconds since the epoch (default: now)
    #[arg(long)]
    pub start_time: Option<i64>,
}

/// Arguments for event command
#[derive(Parser, Debug)]
pub struct EventArgs {
    /// Read events from a file instead of stdin
    #[arg(short, long)]
    pub file: Option<PathBuf>,
}

/// Arguments for finish command
#[derive(Parser, Debug)]
pub struct FinishArgs {
    /// Worker number (default: from TEST_ENV_NUMBER)
    #[arg(short, long)]
    pub worker: Option<u32>,

    /// Number of workers expected to finish
    #[arg(long)]
    pub workers: Option<u32>,

    /// Output format for the final summary (table, json, json-pretty, csv, summary)
    #[arg(short, long, default_value = "table")]
    pub format: String,

    /// List every scenario in the final summary
    #[arg(short, long)]
    pub detailed: bool,
}

/// Arguments for summary command
#[derive(Parser, Debug)]
pub struct SummaryArgs {
    /// Output format (table, json, json-pretty, csv, summary)
    #[arg(short, long, default_value = "table")]
    pub format: String,

    /// List every scenario
    #[arg(short, long)]
    pub detailed: bool,
}

/// Arguments for report command
#[derive(Parser, Debug)]
pub struct ReportArgs {
    /// Output file
    #[arg(short, long)]
    pub output: PathBuf,

    /// Report format (text, markdown, csv, json); default from the file extension
    #[arg(short, long)]
    pub format: Option<String>,
}

/// Arguments for config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Write an example configuration file
    Init {
        /// Output path
        #[arg(short, long, default_value = "parallel-report.yaml")]
        output: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Show the effective configuration
    Show {
        /// Output format (yaml, json)
        #[arg(short, long, default_value = "yaml")]
        format: String,
    },

    /// Validate a configuration file
    Validate {
        /// File to validate (default: the discovered file)
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Show environment variables
    Env {
        /// List supported variables instead of current values
        #[arg(long)]
        help_vars: bool,
    },
}
