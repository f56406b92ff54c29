//! parallel-report - shared report tree for parallel test workers
//!
//! Each worker process of a parallel test run feeds its lifecycle events into
//! one report tree shared through locked files. The last worker to finish
//! prints the combined summary and closes the run.
//!
//! ## Usage
//!
//! ```bash
//! # Elect or join the run (prints the run id)
//! parallel-report launch
//!
//! # Apply newline-delimited JSON events from the test framework
//! my-adapter | parallel-report event
//!
//! # Signal suite completion; the last worker prints the summary
//! parallel-report finish --workers 4
//!
//! # Inspect the tree of a running run
//! parallel-report summary --format json --detailed
//! ```

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Parser;
use std::fs::File;
use std::io::{self, BufRead, BufReader, IsTerminal};
use std::path::Path;
use tracing::{debug, info};

use parallel_report::cli::{self, Args, Command};
use parallel_report::config::{env, ConfigFile, EnvConfig, ReportConfig, WorkerInfo};
use parallel_report::models::LifecycleEvent;
use parallel_report::output::{OutputFormat, ResultFormatter};
use parallel_report::results::{ExportFormat, ReportFormat, ReportGenerator, RunRecord};
use parallel_report::session::{Progress, ReportSession, Teardown};
use parallel_report::utils::logger::{init_logger, LogLevel};

fn main() -> Result<()> {
    let args = Args::parse();

    if let Command::Config(config_args) = &args.command {
        init_logger(LogLevel::from_verbosity(args.verbosity().unwrap_or(1)));
        return manage_config(&args, config_args);
    }

    let config = load_config(&args)?;
    init_logger(config.log_level());

    let worker = WorkerInfo::load();
    match args.command {
        Command::Launch(launch_args) => launch(config, worker, launch_args),
        Command::Event(event_args) => apply_events(config, worker, event_args),
        Command::Finish(finish_args) => finish(config, worker, finish_args),
        Command::Summary(summary_args) => summary(config, worker, summary_args),
        Command::Report(report_args) => report(config, worker, report_args),
        Command::Config(_) => Ok(()),
    }
}

/// File, then environment, then command-line flags
fn load_config(args: &Args) -> Result<ReportConfig> {
    let mut config = ConfigFile::resolve(args.config.as_deref())?;

    if let Some(dir) = &args.shared_dir {
        config.shared_dir = Some(dir.clone());
    }
    if let Some(run_key) = &args.run_key {
        config.run_key = run_key.clone();
    }
    if let Some(verbose) = args.verbosity() {
        config.verbose = verbose;
    }

    Ok(config)
}

fn launch(config: ReportConfig, worker: WorkerInfo, args: cli::LaunchArgs) -> Result<()> {
    let start_time = match args.start_time {
        Some(ms) => DateTime::<Utc>::from_timestamp_millis(ms)
            .with_context(|| format!("Invalid start time: {ms}"))?,
        None => Utc::now(),
    };

    let mut session = ReportSession::from_config(config, worker)?;
    let election = session.launch_started(start_time)?;

    if election.elected {
        info!("Worker {} started run {}", worker.number, election.run_id);
    } else {
        info!("Worker {} joined run {}", worker.number, election.run_id);
    }
    println!("{}", election.run_id);
    Ok(())
}

fn apply_events(config: ReportConfig, worker: WorkerInfo, args: cli::EventArgs) -> Result<()> {
    let reader: Box<dyn BufRead> = match &args.file {
        Some(path) => Box::new(BufReader::new(
            File::open(path).with_context(|| format!("Failed to open {}", path.display()))?,
        )),
        None => Box::new(BufReader::new(io::stdin())),
    };

    let mut session = ReportSession::from_config(config, worker)?;
    let mut applied = 0usize;

    for (index, line) in reader.lines().enumerate() {
        let line = line.context("Failed to read events")?;
        if line.trim().is_empty() {
            continue;
        }

        let event: LifecycleEvent = serde_json::from_str(&line)
            .with_context(|| format!("Invalid event on line {}", index + 1))?;

        match session.apply(&event)? {
            Progress::Merged(outcome) => {
                if outcome.orphan {
                    debug!("Line {}: scenario attached under the root", index + 1);
                }
            }
            Progress::Waiting { finished, expected } => {
                info!("{}/{} workers finished", finished, expected);
            }
            Progress::TornDown(teardown) => {
                print_teardown(&teardown, OutputFormat::Table, false);
            }
        }
        applied += 1;
    }

    debug!("Applied {} events", applied);
    Ok(())
}

fn finish(mut config: ReportConfig, worker: WorkerInfo, args: cli::FinishArgs) -> Result<()> {
    if let Some(workers) = args.workers {
        config.workers = Some(workers);
    }
    let format = parse_output_format(&args.format)?;
    let number = args.worker.unwrap_or(worker.number);

    let mut session = ReportSession::from_config(config, worker)?;
    match session.suite_finished(number)? {
        Some(teardown) => print_teardown(&teardown, format, args.detailed),
        None => info!(
            "Worker {} done, {} workers expected",
            number,
            session.expected_workers()
        ),
    }
    Ok(())
}

fn summary(config: ReportConfig, worker: WorkerInfo, args: cli::SummaryArgs) -> Result<()> {
    let format = parse_output_format(&args.format)?;
    let session = ReportSession::from_config(config, worker)?;
    let record = session.summary()?;

    println!("{}", formatter(format, args.detailed).format_record(&record));
    Ok(())
}

fn report(config: ReportConfig, worker: WorkerInfo, args: cli::ReportArgs) -> Result<()> {
    let format = match &args.format {
        Some(name) => ReportFormat::from_str(name)
            .ok_or_else(|| anyhow::anyhow!("Unknown report format: {name}"))?,
        None => report_format_for(&args.output),
    };

    let session = ReportSession::from_config(config, worker)?;
    let record: RunRecord = session.summary()?;
    ReportGenerator::new(&record).write(&args.output, format)?;

    println!("✓ Report written to {}", args.output.display());
    Ok(())
}

fn report_format_for(path: &Path) -> ReportFormat {
    match ExportFormat::from_extension(path) {
        Some(ExportFormat::Json) => ReportFormat::Json,
        Some(ExportFormat::Csv) => ReportFormat::Csv,
        None => path
            .extension()
            .and_then(|e| e.to_str())
            .and_then(ReportFormat::from_str)
            .unwrap_or(ReportFormat::Text),
    }
}

fn parse_output_format(name: &str) -> Result<OutputFormat> {
    OutputFormat::from_str(name).ok_or_else(|| anyhow::anyhow!("Unknown output format: {name}"))
}

fn formatter(format: OutputFormat, detailed: bool) -> ResultFormatter {
    let formatter = ResultFormatter::new(format).detailed(detailed);
    if io::stdout().is_terminal() {
        formatter
    } else {
        formatter.no_color()
    }
}

fn print_teardown(teardown: &Teardown, format: OutputFormat, detailed: bool) {
    debug!("Removed {} shared documents", teardown.removed);
    println!("{}", formatter(format, detailed).format_record(&teardown.record));
}

fn manage_config(args: &Args, config_args: &cli::ConfigArgs) -> Result<()> {
    match &config_args.action {
        cli::ConfigAction::Init { output, force } => {
            if output.exists() && !force {
                anyhow::bail!(
                    "Configuration file already exists: {}. Use --force to overwrite.",
                    output.display()
                );
            }

            ConfigFile::example().save(output)?;
            println!("✓ Configuration file created: {}", output.display());
            println!("\nEdit the file to customize your settings.");
        }

        cli::ConfigAction::Show { format } => {
            let config = load_config(args)?;
            let output = if format == "json" {
                serde_json::to_string_pretty(&config)?
            } else {
                serde_yaml::to_string(&config)?
            };
            println!("{output}");
        }

        cli::ConfigAction::Validate { file } => {
            let path = file
                .clone()
                .or_else(|| args.config.clone())
                .or_else(ConfigFile::find)
                .ok_or_else(|| anyhow::anyhow!("No configuration file found"))?;

            match ConfigFile::load(&path).and_then(|config| config.validate()) {
                Ok(()) => {
                    println!("✓ Configuration file is valid: {}", path.display());
                }
                Err(e) => {
                    println!("✗ Configuration file is invalid: {}", path.display());
                    println!("  Error: {e:#}");
                    return Err(e);
                }
            }
        }

        cli::ConfigAction::Env { help_vars } => {
            if *help_vars {
                env::print_env_help();
            } else {
                EnvConfig::load().print_summary();
            }
        }
    }

    Ok(())
}
