//! Krupy - project generation from templates, with lifecycle updates
//!
//! A template is a directory (usually a git repository) holding a `krupy.yml`
//! questionnaire and files to render. Krupy asks the questions, renders the
//! files into a destination and records the answers there, so that later
//! template versions can be merged into the generated project without losing
//! local edits.
//!
//! # Core Concepts
//!
//! - **Copy**: render a template version into a new or existing directory
//! - **Recopy**: render again from scratch, reusing recorded answers
//! - **Update**: three-way merge of old rendering, new rendering and local files
//!
//! # Modules
//!
//! - [`template`] - Template descriptor loading
//! - [`version`] - Version parsing and gating
//! - [`vcs`] - Git collaborator and template source parsing
//! - [`renderer`] - Directory rendering and path filters
//! - [`merge`] - Line-based three-way merge
//! - [`plan`] - Per-file reconciliation plan for updates
//! - [`tasks`] - Task and migration execution
//! - [`subproject`] - Answers file of a generated project
//! - [`worker`] - Copy, recopy and update orchestration
//! - [`config`] - User settings
//! - [`cli`] - Command-line interface

pub mod cli;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod merge;
pub mod plan;
pub mod renderer;
pub mod report;
pub mod subproject;
pub mod tasks;
pub mod template;
pub mod tty;
pub mod vcs;
pub mod version;
pub mod worker;

// Re-export commonly used types
pub use config::Settings;
pub use diagnostics::{Diagnostic, Diagnostics, WarningKind};
pub use error::{AnswersInterrupt, EXIT_FAILURE, EXIT_UNSAFE, KrupyError, Result};
pub use merge::{ConflictPolicy, MergeOutcome, merge3};
pub use plan::{FileAction, MergeOptions, ReconciliationPlan};
pub use renderer::{PathFilter, RenderedTree, Renderer};
pub use subproject::Subproject;
pub use template::{Operation, Template};
pub use vcs::{GitCli, TemplateSource, Vcs};
pub use worker::{Stage, Worker, WorkerOptions};
