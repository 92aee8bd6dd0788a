//! CLI command definitions and subcommands

use std::fs;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use eyre::{Context, Result, eyre};
use questionnaire::AnswerMap;
use serde_json::Value;

use crate::merge::ConflictPolicy;
use crate::worker::WorkerOptions;

/// Krupy - generate projects from templates and keep them up to date
#[derive(Parser, Debug)]
#[command(
    name = "krupy",
    about = "Generate projects from templates and keep them updated as templates evolve",
    version,
    after_help = "Logs are written to: ~/.local/share/krupy/logs/krupy.log"
)]
pub struct Cli {
    /// Path to the user settings file
    #[arg(long, global = true, help = "Path to the user settings file")]
    pub settings: Option<PathBuf>,

    /// Log file verbosity
    #[arg(long, global = true, value_enum, default_value_t = LogLevel::Info)]
    pub log_level: LogLevel,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Generate a new project from a template
    Copy {
        /// Template location: local path, git URL, gh:owner/repo or gl:owner/repo
        template_src: String,

        /// Directory to generate into
        destination: PathBuf,

        #[command(flatten)]
        shared: SharedArgs,

        #[command(flatten)]
        answering: AnsweringArgs,

        /// Keep the destination when generation fails
        #[arg(short = 'C', long)]
        no_cleanup: bool,
    },

    /// Regenerate a project from its template, discarding its history
    Recopy {
        /// Project directory
        #[arg(default_value = ".")]
        destination: PathBuf,

        #[command(flatten)]
        shared: SharedArgs,

        #[command(flatten)]
        answering: AnsweringArgs,

        /// Do not ask questions that already have an answer
        #[arg(short = 'A', long)]
        skip_answered: bool,
    },

    /// Apply template changes to a project, keeping local edits
    Update {
        /// Project directory
        #[arg(default_value = ".")]
        destination: PathBuf,

        #[command(flatten)]
        shared: SharedArgs,

        /// How to report conflicts
        #[arg(short = 'o', long, value_enum, default_value_t = ConflictPolicy::Inline)]
        conflict: ConflictPolicy,

        /// Unchanged lines that join nearby changes into one conflict
        #[arg(short = 'c', long, default_value_t = 3)]
        context_lines: usize,

        /// Use default answers without asking
        #[arg(short = 'l', long, visible_short_alias = 'f')]
        defaults: bool,

        /// Do not ask questions that already have an answer
        #[arg(short = 'A', long)]
        skip_answered: bool,
    },
}

/// Options shared by every subcommand
#[derive(Args, Debug, Clone, Default)]
pub struct SharedArgs {
    /// Answers file path relative to the destination
    #[arg(short = 'a', long)]
    pub answers_file: Option<PathBuf>,

    /// Extra exclude pattern (repeatable)
    #[arg(short = 'x', long = "exclude", value_name = "PATTERN")]
    pub exclude: Vec<String>,

    /// Git reference of the template to use
    #[arg(short = 'r', long)]
    pub vcs_ref: Option<String>,

    /// Run without writing anything
    #[arg(short = 'n', long)]
    pub pretend: bool,

    /// Never overwrite existing files matching this pattern (repeatable)
    #[arg(short = 's', long = "skip", value_name = "PATTERN")]
    pub skip_if_exists: Vec<String>,

    /// Suppress status output
    #[arg(short = 'q', long)]
    pub quiet: bool,

    /// Consider prerelease tags when picking the template version
    #[arg(short = 'g', long)]
    pub prereleases: bool,

    /// Allow tasks, migrations and extensions
    #[arg(long, alias = "UNSAFE")]
    pub trust: bool,

    /// Skip template tasks and migrations
    #[arg(long)]
    pub skip_tasks: bool,

    /// Fail on warnings
    #[arg(long)]
    pub strict: bool,

    /// Answer a question (repeatable)
    #[arg(short = 'd', long = "data", value_name = "KEY=VALUE", value_parser = parse_key_value)]
    pub data: Vec<(String, String)>,

    /// YAML file with answers; --data wins on conflicts
    #[arg(long, value_name = "PATH")]
    pub data_file: Option<PathBuf>,
}

/// Overwrite and defaults switches of copy and recopy
#[derive(Args, Debug, Clone, Default)]
pub struct AnsweringArgs {
    /// Use default answers without asking
    #[arg(short = 'l', long)]
    pub defaults: bool,

    /// Overwrite existing files without asking
    #[arg(short = 'w', long)]
    pub overwrite: bool,

    /// Same as --defaults --overwrite
    #[arg(short = 'f', long)]
    pub force: bool,
}

/// Log level for the log file
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => tracing::Level::TRACE,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}

fn parse_key_value(raw: &str) -> std::result::Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => Ok((key.trim().to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got \"{}\"", raw)),
    }
}

fn load_data_file(path: &PathBuf) -> Result<AnswerMap> {
    let content = fs::read_to_string(path).context(format!("Failed to read data file {}", path.display()))?;
    let value: Value =
        serde_yaml::from_str(&content).context(format!("Failed to parse data file {}", path.display()))?;
    match value {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(AnswerMap::new()),
        _ => Err(eyre!("Data file {} must contain a mapping", path.display())),
    }
}

impl SharedArgs {
    /// Merged answers from `--data-file` and `--data`
    pub fn data(&self) -> Result<AnswerMap> {
        let mut data = match &self.data_file {
            Some(path) => load_data_file(path)?,
            None => AnswerMap::new(),
        };
        for (key, value) in &self.data {
            data.insert(key.clone(), Value::String(value.clone()));
        }
        Ok(data)
    }

    /// Worker options for `destination` before subcommand switches apply
    pub fn worker_options(&self, destination: PathBuf) -> Result<WorkerOptions> {
        Ok(WorkerOptions {
            dst_path: destination,
            answers_file: self.answers_file.clone(),
            vcs_ref: self.vcs_ref.clone(),
            data: self.data()?,
            exclude: self.exclude.clone(),
            skip_if_exists: self.skip_if_exists.clone(),
            use_prereleases: self.prereleases,
            pretend: self.pretend,
            quiet: self.quiet,
            trust: self.trust,
            skip_tasks: self.skip_tasks,
            strict: self.strict,
            ..Default::default()
        })
    }
}

impl AnsweringArgs {
    pub fn apply(&self, options: &mut WorkerOptions) {
        options.defaults = self.defaults || self.force;
        options.overwrite = self.overwrite || self.force;
    }
}
