//! Krupy - project templating with lifecycle updates
//!
//! CLI entry point for copy, recopy and update.

use std::fs;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use colored::Colorize;
use eyre::{Context, Result};
use tracing::{error, info};

use krupy::cli::{Cli, Command, LogLevel};
use krupy::config::Settings;
use krupy::error::{EXIT_FAILURE, KrupyError};
use krupy::tty::TerminalPrompter;
use krupy::worker::{Worker, WorkerOptions};
use questionnaire::{NonInteractive, Prompter};

fn setup_logging(level: LogLevel) -> Result<()> {
    // Create log directory
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("krupy")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    // Write to the log file, stderr is reserved for status lines
    let level: tracing::Level = level.into();
    let log_file = fs::File::create(log_dir.join("krupy.log")).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (level: {})", level);
    Ok(())
}

fn prompter() -> Box<dyn Prompter> {
    if std::io::stdin().is_terminal() {
        match TerminalPrompter::new() {
            Ok(prompter) => return Box::new(prompter),
            Err(e) => error!("Failed to initialize terminal prompter: {}", e),
        }
    }
    Box::new(NonInteractive)
}

fn worker(options: WorkerOptions, settings: Settings) -> Worker {
    Worker::new(options).with_settings(settings).with_prompter(prompter())
}

fn run(cli: Cli) -> Result<()> {
    let settings = Settings::load(cli.settings.as_ref()).context("Failed to load settings")?;

    match cli.command {
        Command::Copy {
            template_src,
            destination,
            shared,
            answering,
            no_cleanup,
        } => {
            let mut options = shared.worker_options(destination)?;
            answering.apply(&mut options);
            options.src_path = Some(template_src);
            options.cleanup_on_error = !no_cleanup;
            worker(options, settings).run_copy()?;
        }
        Command::Recopy {
            destination,
            shared,
            answering,
            skip_answered,
        } => {
            let mut options = shared.worker_options(destination)?;
            answering.apply(&mut options);
            options.skip_answered = skip_answered;
            worker(options, settings).run_recopy()?;
        }
        Command::Update {
            destination,
            shared,
            conflict,
            context_lines,
            defaults,
            skip_answered,
        } => {
            let mut options = shared.worker_options(destination)?;
            options.conflict = conflict;
            options.context_lines = context_lines;
            options.defaults = defaults;
            options.skip_answered = skip_answered;
            worker(options, settings).run_update()?;
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = setup_logging(cli.log_level) {
        eprintln!("{} {:#}", "warning:".yellow().bold(), e);
    }

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(report) => {
            error!("{:?}", report);
            let krupy_error = report.downcast_ref::<KrupyError>();
            if let Some(KrupyError::Interrupted(_)) = krupy_error {
                eprintln!("{}", "Execution stopped by user".red());
            } else {
                let message: Vec<String> = report.chain().map(ToString::to_string).collect();
                eprintln!("{} {}", "error:".red().bold(), message.join(": ").red());
            }
            ExitCode::from(krupy_error.map_or(EXIT_FAILURE, KrupyError::exit_code))
        }
    }
}
