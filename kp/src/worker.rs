//! Reconciliation worker
//!
//! Drives one copy, recopy or update of a destination directory:
//!
//! ```text
//! Init -> TemplateResolved -> Answered -> Rendered -> (Diffed ->) Written -> TasksRun -> Persisted -> Done
//! ```
//!
//! Any stage can end in `Failed`. Pretend mode runs every stage but skips all
//! filesystem writes and task execution.

use std::fs;
use std::path::{Path, PathBuf};

use questionnaire::{
    AnswerMap, AnswersMap, COMMIT_KEY, Engine, Layer, NonInteractive, PromptError, Prompter, Questionnaire,
    RunError, RunnerOptions, SRC_PATH_KEY,
};
use semver::Version;
use serde_json::{Value, json};
use tempfile::TempDir;
use tracing::{debug, info};

use crate::config::Settings;
use crate::diagnostics::{Diagnostic, Diagnostics, WarningKind};
use crate::error::{AnswersInterrupt, KrupyError, Result};
use crate::merge::ConflictPolicy;
use crate::plan::{FileAction, MergeOptions, ReconciliationPlan};
use crate::renderer::{PathFilter, RenderedTree, Renderer};
use crate::report::{Reporter, Verb};
use crate::subproject::{Subproject, ensure_relative};
use crate::tasks::{TaskEnv, TaskRunner, detect_os};
use crate::template::{DEFAULT_ANSWERS_FILE, Migration, Operation, Template};
use crate::vcs::{GitCli, TemplateSource, Vcs};
use crate::version::{check_min_version, check_recorded_version, krupy_version, latest_version_tag, parse_version};

/// Worker lifecycle stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Init,
    TemplateResolved,
    Answered,
    Rendered,
    Diffed,
    Written,
    TasksRun,
    Persisted,
    Done,
    Failed,
}

/// Everything one invocation can configure
#[derive(Debug, Clone)]
pub struct WorkerOptions {
    /// Template location; recopy and update fall back to the answers file
    pub src_path: Option<String>,
    pub dst_path: PathBuf,
    /// Answers file path relative to the destination, overriding the template
    pub answers_file: Option<PathBuf>,
    /// Git reference to render; defaults to the latest version tag
    pub vcs_ref: Option<String>,
    /// Answers injected at invocation
    pub data: AnswerMap,
    pub exclude: Vec<String>,
    pub skip_if_exists: Vec<String>,
    pub use_prereleases: bool,
    /// Remove a destination this run created when it fails
    pub cleanup_on_error: bool,
    pub defaults: bool,
    pub overwrite: bool,
    pub pretend: bool,
    pub quiet: bool,
    /// Allow tasks, migrations and extensions
    pub trust: bool,
    pub skip_answered: bool,
    pub skip_tasks: bool,
    pub conflict: ConflictPolicy,
    pub context_lines: usize,
    /// Treat warnings as errors
    pub strict: bool,
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self {
            src_path: None,
            dst_path: PathBuf::from("."),
            answers_file: None,
            vcs_ref: None,
            data: AnswerMap::new(),
            exclude: Vec::new(),
            skip_if_exists: Vec::new(),
            use_prereleases: false,
            cleanup_on_error: true,
            defaults: false,
            overwrite: false,
            pretend: false,
            quiet: false,
            trust: false,
            skip_answered: false,
            skip_tasks: false,
            conflict: ConflictPolicy::Inline,
            context_lines: 3,
            strict: false,
        }
    }
}

/// Answers, paths and context for one rendered template version
struct Rendered {
    answers: AnswersMap,
    answers_relpath: PathBuf,
    context: Value,
    tree: RenderedTree,
}

pub struct Worker {
    options: WorkerOptions,
    vcs: Box<dyn Vcs>,
    prompter: Box<dyn Prompter>,
    settings: Settings,
    version: Version,
    os: Option<String>,
    engine: Engine,
    diagnostics: Diagnostics,
    reporter: Reporter,
    stage: Stage,
}

impl std::fmt::Debug for Worker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("options", &self.options)
            .field("version", &self.version)
            .field("os", &self.os)
            .field("stage", &self.stage)
            .finish_non_exhaustive()
    }
}

fn into_krupy_error(err: RunError, template: Template) -> KrupyError {
    match err {
        RunError::Question(e) => KrupyError::Question(e),
        RunError::Interrupted(interrupt) => KrupyError::Interrupted(Box::new(AnswersInterrupt {
            answers: interrupt.answers,
            last_question: interrupt.question,
            template,
        })),
        RunError::Prompt(PromptError::Unavailable) => KrupyError::UserMessage(
            "Cannot ask questions without a terminal; pass --defaults or --data".to_string(),
        ),
        RunError::Prompt(e) => KrupyError::UserMessage(format!("Cannot ask questions: {}", e)),
    }
}

fn write_file(path: &Path, content: &[u8], executable: bool) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| KrupyError::io(parent, e))?;
    }
    fs::write(path, content).map_err(|e| KrupyError::io(path, e))?;
    #[cfg(unix)]
    if executable {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = fs::metadata(path).map_err(|e| KrupyError::io(path, e))?.permissions();
        perms.set_mode(perms.mode() | 0o111);
        fs::set_permissions(path, perms).map_err(|e| KrupyError::io(path, e))?;
    }
    #[cfg(not(unix))]
    let _ = executable;
    Ok(())
}

impl Worker {
    pub fn new(options: WorkerOptions) -> Self {
        let reporter = Reporter::new(options.quiet);
        let diagnostics = Diagnostics::new(options.strict);
        Self {
            options,
            vcs: Box::new(GitCli),
            prompter: Box::new(NonInteractive),
            settings: Settings::default(),
            version: krupy_version(),
            os: detect_os().map(str::to_string),
            engine: Engine::new(),
            diagnostics,
            reporter,
            stage: Stage::Init,
        }
    }

    pub fn with_vcs(mut self, vcs: Box<dyn Vcs>) -> Self {
        self.vcs = vcs;
        self
    }

    pub fn with_prompter(mut self, prompter: Box<dyn Prompter>) -> Self {
        self.prompter = prompter;
        self
    }

    pub fn with_settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    /// Override the version the worker reports for itself
    pub fn with_version(mut self, version: Version) -> Self {
        self.version = version;
        self
    }

    /// Override the detected operating system
    pub fn with_os(mut self, os: Option<&str>) -> Self {
        self.os = os.map(str::to_string);
        self
    }

    pub fn options(&self) -> &WorkerOptions {
        &self.options
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        self.diagnostics.items()
    }

    fn enter(&mut self, stage: Stage) {
        debug!(from = ?self.stage, to = ?stage, "Worker::enter: stage transition");
        self.stage = stage;
    }

    fn warn(&mut self, diagnostic: Diagnostic) -> Result<()> {
        self.reporter.warning(&diagnostic.message);
        self.diagnostics.emit(diagnostic)
    }

    // =========================================================================
    // Public operations
    // =========================================================================

    /// Generate a new project from a template
    pub fn run_copy(&mut self) -> Result<()> {
        info!(src = ?self.options.src_path, dst = %self.options.dst_path.display(), "Worker::run_copy: called");
        let dst = self.options.dst_path.clone();
        let dst_existed = dst.exists();
        let result = match self.options.src_path.clone() {
            Some(src) => self.generate(&src, &dst, AnswerMap::new(), Operation::Copy),
            None => Err(KrupyError::UserMessage("No template source given".to_string())),
        };
        if let Err(e) = &result {
            self.enter(Stage::Failed);
            if !dst_existed && self.options.cleanup_on_error && !self.options.pretend && dst.exists() {
                debug!(dst = %dst.display(), error = %e, "Worker::run_copy: cleaning up destination");
                if let Err(cleanup) = fs::remove_dir_all(&dst) {
                    debug!(error = %cleanup, "Worker::run_copy: cleanup failed");
                }
            }
        }
        result
    }

    /// Regenerate a project from its template, ignoring destination history
    pub fn run_recopy(&mut self) -> Result<()> {
        info!(dst = %self.options.dst_path.display(), "Worker::run_recopy: called");
        let result = self.recopy();
        if result.is_err() {
            self.enter(Stage::Failed);
        }
        result
    }

    /// Apply template evolution onto a project, keeping local edits
    pub fn run_update(&mut self) -> Result<()> {
        info!(dst = %self.options.dst_path.display(), "Worker::run_update: called");
        let result = self.update();
        if result.is_err() {
            self.enter(Stage::Failed);
        }
        result
    }

    // =========================================================================
    // Template resolution
    // =========================================================================

    fn clone_checkout(&mut self, url: &str, vcs_ref: Option<&str>) -> Result<(TempDir, String, String)> {
        let checkout = tempfile::Builder::new()
            .prefix("krupy.")
            .tempdir()
            .map_err(|e| KrupyError::io(std::env::temp_dir(), e))?;
        self.vcs.clone_repo(url, checkout.path())?;
        if self.vcs.is_shallow(checkout.path())? {
            self.warn(Diagnostic::new(
                WarningKind::ShallowClone,
                format!("{} is a shallow clone; updates may not find the previous version", url),
            ))?;
        }
        let rev = match vcs_ref {
            Some(rev) => rev.to_string(),
            None => {
                let tags = self.vcs.tags(checkout.path())?;
                latest_version_tag(&tags, self.options.use_prereleases).unwrap_or_else(|| "HEAD".to_string())
            }
        };
        debug!(%url, %rev, "Worker::clone_checkout: checking out");
        self.vcs.checkout(checkout.path(), &rev)?;
        let commit = self.vcs.describe(checkout.path())?;
        let hash = self.vcs.head_commit(checkout.path())?;
        Ok((checkout, commit, hash))
    }

    fn resolve_template(&mut self, src: &str, vcs_ref: Option<&str>) -> Result<Template> {
        debug!(%src, ?vcs_ref, "Worker::resolve_template: called");
        let (root, checkout, commit, hash) = match TemplateSource::parse(src) {
            TemplateSource::Local(path) if path.join(".git").exists() && self.vcs.is_repo(&path) => {
                if self.vcs.is_dirty(&path)? {
                    self.warn(Diagnostic::new(
                        WarningKind::DirtyLocal,
                        format!("Uncommitted changes in {} are not used", path.display()),
                    ))?;
                }
                let (checkout, commit, hash) = self.clone_checkout(&path.to_string_lossy(), vcs_ref)?;
                (checkout.path().to_path_buf(), Some(checkout), Some(commit), Some(hash))
            }
            TemplateSource::Local(path) => {
                if !path.is_dir() {
                    return Err(KrupyError::UserMessage(format!("Template not found: {}", src)));
                }
                if vcs_ref.is_some() {
                    debug!(%src, "Worker::resolve_template: not a git repository, ignoring vcs ref");
                }
                (path, None, None, None)
            }
            TemplateSource::Git(url) => {
                let (checkout, commit, hash) = self.clone_checkout(&url, vcs_ref)?;
                (checkout.path().to_path_buf(), Some(checkout), Some(commit), Some(hash))
            }
        };

        let mut template = Template::load(&root)?;
        template.src_path = Some(src.to_string());
        template.commit = commit;
        template.commit_hash = hash;
        template.checkout = checkout;
        info!(src = %src, commit = ?template.commit, "Template resolved");
        Ok(template)
    }

    fn check_template(&mut self, template: &Template, operation: Operation) -> Result<()> {
        if let Some(min) = &template.min_krupy_version {
            if let Some(diagnostic) = check_min_version(min, &self.version)? {
                self.warn(diagnostic)?;
            }
        }
        let features = template.unsafe_features(operation, self.options.skip_tasks);
        let trusted = self.options.trust
            || template
                .src_path
                .as_deref()
                .is_some_and(|src| self.settings.is_trusted(src));
        if !features.is_empty() && !trusted {
            return Err(KrupyError::UnsafeTemplate { features });
        }
        if let Some(extension) = template.extensions.first() {
            return Err(KrupyError::ExtensionNotFound(extension.clone()));
        }
        Ok(())
    }

    // =========================================================================
    // Answers and rendering
    // =========================================================================

    fn ask(
        &mut self,
        template: &Template,
        answers: &mut AnswersMap,
        defaults: bool,
        skip_answered: bool,
    ) -> std::result::Result<(), RunError> {
        let options = RunnerOptions {
            defaults,
            skip_answered,
            display: template.questions_display,
        };
        Questionnaire::new(&template.questions, &self.engine, options).run(answers, &mut *self.prompter)
    }

    fn answers_relpath(&self, template: &Template, answers: &AnswersMap) -> Result<PathBuf> {
        let relpath = match &self.options.answers_file {
            Some(path) => path.clone(),
            None => {
                let rendered = self
                    .engine
                    .render(&template.answers_file, &Value::Object(answers.combined()))
                    .map_err(|message| KrupyError::Render {
                        what: "answers file path".to_string(),
                        message,
                    })?;
                let rendered = rendered.trim();
                PathBuf::from(if rendered.is_empty() {
                    DEFAULT_ANSWERS_FILE
                } else {
                    rendered
                })
            }
        };
        ensure_relative(&relpath)?;
        Ok(relpath)
    }

    /// Answers written to the answers file
    fn answers_to_remember(&self, answers: &AnswersMap, template: &Template) -> AnswerMap {
        answers
            .persist_view()
            .into_iter()
            .filter(|(key, _)| {
                if key.starts_with('_') {
                    return key == SRC_PATH_KEY || (key == COMMIT_KEY && template.commit.is_some());
                }
                !matches!(answers.resolve_with_layer(key), Some((Layer::UserDefaults, _)))
            })
            .collect()
    }

    fn render_context(&self, answers: &AnswersMap, template: &Template, answers_relpath: &Path, dst: &Path) -> Value {
        let mut context = answers.combined();
        context.insert(
            "_krupy_answers".to_string(),
            Value::Object(self.answers_to_remember(answers, template)),
        );
        context.insert(
            "_krupy_conf".to_string(),
            json!({
                "answers_file": answers_relpath.to_string_lossy(),
                "src_path": template.src_path,
                "dst_path": dst.to_string_lossy(),
                "vcs_ref": template.commit,
                "os": self.os,
                "version": self.version.to_string(),
            }),
        );
        let folder_name = dst
            .canonicalize()
            .ok()
            .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
            .or_else(|| dst.file_name().map(|n| n.to_string_lossy().into_owned()))
            .unwrap_or_default();
        context.insert("_folder_name".to_string(), Value::String(folder_name));
        Value::Object(context)
    }

    fn exclude_filter(&self, template: &Template) -> Result<PathFilter> {
        let patterns: Vec<&String> = template.exclude.iter().chain(&self.options.exclude).collect();
        PathFilter::with_defaults(&patterns)
    }

    fn skip_filter(&self, template: &Template) -> Result<PathFilter> {
        let patterns: Vec<&String> = template
            .skip_if_exists
            .iter()
            .chain(&self.options.skip_if_exists)
            .collect();
        PathFilter::new(&patterns)
    }

    fn render(&self, template: &Template, answers: AnswersMap, dst: &Path) -> Result<Rendered> {
        let answers_relpath = self.answers_relpath(template, &answers)?;
        let context = self.render_context(&answers, template, &answers_relpath, dst);
        let exclude = self.exclude_filter(template)?;
        let mut tree =
            Renderer::new(&self.engine, &context, &template.templates_suffix, &exclude).render_dir(&template.render_root())?;
        tree.remove(&answers_relpath);
        Ok(Rendered {
            answers,
            answers_relpath,
            context,
            tree,
        })
    }

    fn build_answers(&self, template: &Template, last: AnswerMap) -> AnswersMap {
        AnswersMap::new()
            .with_init(self.options.data.clone())
            .with_metadata(template.metadata())
            .with_last(last)
            .with_user_defaults(self.settings.defaults.clone())
    }

    // =========================================================================
    // Writing
    // =========================================================================

    fn should_overwrite(&mut self, path: &Path) -> Result<bool> {
        if self.options.overwrite {
            return Ok(true);
        }
        if self.options.defaults {
            return Ok(false);
        }
        match self.prompter.confirm(&format!("Overwrite {}?", path.display()), true) {
            Ok(answer) => Ok(answer),
            Err(PromptError::Unavailable) => Ok(false),
            Err(e) => Err(KrupyError::UserMessage(format!("Cannot confirm overwrite: {}", e))),
        }
    }

    fn write_tree(&mut self, tree: &RenderedTree, dst: &Path, skip: &PathFilter) -> Result<()> {
        let pretend = self.options.pretend;
        if !pretend {
            fs::create_dir_all(dst).map_err(|e| KrupyError::io(dst, e))?;
            for dir in &tree.dirs {
                let path = dst.join(dir);
                fs::create_dir_all(&path).map_err(|e| KrupyError::io(&path, e))?;
            }
        }
        for (rel, file) in &tree.files {
            let path = dst.join(rel);
            let existing = match fs::read(&path) {
                Ok(content) => Some(content),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
                Err(e) => return Err(KrupyError::io(&path, e)),
            };
            let verb = match existing {
                None => Verb::Create,
                Some(content) if content == file.content => Verb::Identical,
                Some(_) if skip.is_match(rel) => Verb::Skip,
                Some(_) if self.should_overwrite(rel)? => Verb::Overwrite,
                Some(_) => Verb::Skip,
            };
            self.reporter.file(verb, rel);
            if !pretend && matches!(verb, Verb::Create | Verb::Overwrite) {
                write_file(&path, &file.content, file.executable)?;
            }
        }
        Ok(())
    }

    fn apply_plan(&mut self, plan: &ReconciliationPlan, dst: &Path) -> Result<()> {
        let pretend = self.options.pretend;
        if !pretend {
            for dir in &plan.dirs {
                let path = dst.join(dir);
                fs::create_dir_all(&path).map_err(|e| KrupyError::io(&path, e))?;
            }
        }
        for entry in plan.changes() {
            let path = dst.join(&entry.path);
            match &entry.action {
                FileAction::Unchanged => {}
                FileAction::Added(content) => {
                    self.reporter.file(Verb::Create, &entry.path);
                    if !pretend {
                        write_file(&path, content, entry.executable)?;
                    }
                }
                FileAction::Updated(content) => {
                    self.reporter.file(Verb::Update, &entry.path);
                    if !pretend {
                        write_file(&path, content, entry.executable)?;
                    }
                }
                FileAction::Deleted => {
                    self.reporter.file(Verb::Delete, &entry.path);
                    if !pretend {
                        fs::remove_file(&path).map_err(|e| KrupyError::io(&path, e))?;
                    }
                }
                FileAction::Conflicting { content, rej, .. } => {
                    self.reporter.file(Verb::Conflict, &entry.path);
                    if !pretend {
                        write_file(&path, content, entry.executable)?;
                        if let Some(rej) = rej {
                            let mut rej_path = path.clone().into_os_string();
                            rej_path.push(".rej");
                            write_file(Path::new(&rej_path), rej.as_bytes(), false)?;
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn run_tasks(&self, template: &Template, context: &Value, dst: &Path) -> Result<()> {
        if self.options.pretend || self.options.skip_tasks || template.tasks.is_empty() {
            return Ok(());
        }
        TaskRunner::new(&self.engine, context, dst, self.reporter).run(&template.tasks, &TaskEnv::tasks())
    }

    fn persist(&self, template: &Template, rendered: &Rendered, dst: &Path) -> Result<()> {
        if self.options.pretend {
            return Ok(());
        }
        let subproject = Subproject::new(dst, &rendered.answers_relpath)?;
        subproject.write_answers(&self.answers_to_remember(&rendered.answers, template))
    }

    // =========================================================================
    // Operations
    // =========================================================================

    fn generate(&mut self, src: &str, dst: &Path, last: AnswerMap, operation: Operation) -> Result<()> {
        self.enter(Stage::Init);
        let vcs_ref = self.options.vcs_ref.clone();
        let template = self.resolve_template(src, vcs_ref.as_deref())?;
        self.enter(Stage::TemplateResolved);
        self.check_template(&template, operation)?;

        let mut answers = self.build_answers(&template, last);
        let (defaults, skip_answered) = (self.options.defaults, self.options.skip_answered);
        if let Err(e) = self.ask(&template, &mut answers, defaults, skip_answered) {
            return Err(into_krupy_error(e, template));
        }
        self.enter(Stage::Answered);

        let rendered = self.render(&template, answers, dst)?;
        self.enter(Stage::Rendered);

        let skip = self.skip_filter(&template)?;
        self.write_tree(&rendered.tree, dst, &skip)?;
        self.enter(Stage::Written);

        self.run_tasks(&template, &rendered.context, dst)?;
        self.enter(Stage::TasksRun);

        self.persist(&template, &rendered, dst)?;
        self.enter(Stage::Persisted);
        self.enter(Stage::Done);
        info!(files = rendered.tree.files.len(), "Worker::generate: done");
        Ok(())
    }

    fn subproject(&self) -> Result<Subproject> {
        let relpath = self
            .options
            .answers_file
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_ANSWERS_FILE));
        Subproject::new(&self.options.dst_path, relpath)
    }

    fn recopy(&mut self) -> Result<()> {
        let subproject = self.subproject()?;
        let last = subproject.last_answers()?;
        let recorded = subproject.commit()?;
        if let Some(diagnostic) = check_recorded_version(recorded.as_deref(), &self.version) {
            self.warn(diagnostic)?;
        }
        let src = match self.options.src_path.clone() {
            Some(src) => src,
            None => subproject.template_src()?.ok_or_else(|| {
                KrupyError::UserMessage(
                    "Cannot recopy because the template source is not recorded in the answers file".to_string(),
                )
            })?,
        };
        let dst = self.options.dst_path.clone();
        self.generate(&src, &dst, last, Operation::Recopy)
    }

    fn migrations_between<'t>(&self, template: &'t Template, from: &str, to: &str) -> Vec<&'t Migration> {
        let (Some(from), Some(to)) = (parse_version(from), parse_version(to)) else {
            debug!(%from, %to, "Worker::migrations_between: unparseable versions, no migrations");
            return Vec::new();
        };
        let mut selected: Vec<(Version, &Migration)> = template
            .migrations
            .iter()
            .filter_map(|m| parse_version(&m.version).map(|v| (v, m)))
            .filter(|(v, _)| from < *v && *v <= to)
            .collect();
        selected.sort_by(|(a, _), (b, _)| a.cmp(b));
        selected.into_iter().map(|(_, m)| m).collect()
    }

    fn run_migrations(&self, migrations: &[&Migration], stage: &str, from: &str, to: &str, rendered: &Rendered) -> Result<()> {
        if self.options.pretend {
            return Ok(());
        }
        let env = TaskEnv::migration(stage, from, to);
        let runner = TaskRunner::new(&self.engine, &rendered.context, &self.options.dst_path, self.reporter);
        for migration in migrations {
            let tasks = if stage == "before" { &migration.before } else { &migration.after };
            info!(version = %migration.version, %stage, "Running migration");
            runner.run(tasks, &env)?;
        }
        Ok(())
    }

    fn update(&mut self) -> Result<()> {
        self.enter(Stage::Init);
        let dst = self.options.dst_path.clone();
        if !dst.is_dir() {
            return Err(KrupyError::UserMessage(format!(
                "Cannot update {} because it is not a directory",
                dst.display()
            )));
        }
        let subproject = self.subproject()?;
        let last = subproject.last_answers()?;
        let src = match self.options.src_path.clone() {
            Some(src) => src,
            None => subproject.template_src()?.ok_or_else(|| {
                KrupyError::UserMessage(
                    "Cannot update because the template source is not recorded in the answers file".to_string(),
                )
            })?,
        };
        let old_commit = subproject.commit()?.ok_or_else(|| {
            KrupyError::UserMessage(
                "Cannot update because the previous template version is unknown; was it copied from a git repository?"
                    .to_string(),
            )
        })?;
        if let Some(diagnostic) = check_recorded_version(Some(&old_commit), &self.version) {
            self.warn(diagnostic)?;
        }

        let old_template = self.resolve_template(&src, Some(&old_commit))?;
        let vcs_ref = self.options.vcs_ref.clone();
        let new_template = self.resolve_template(&src, vcs_ref.as_deref())?;
        self.enter(Stage::TemplateResolved);
        self.check_template(&new_template, Operation::Update)?;

        // Replay the previous answers against the old template
        let mut old_answers = AnswersMap::new()
            .with_init(last.clone())
            .with_metadata(old_template.metadata());
        if let Err(e) = self.ask(&old_template, &mut old_answers, true, false) {
            return Err(into_krupy_error(e, old_template));
        }

        let mut new_answers = self.build_answers(&new_template, last);
        let (defaults, skip_answered) = (self.options.defaults, self.options.skip_answered);
        if let Err(e) = self.ask(&new_template, &mut new_answers, defaults, skip_answered) {
            return Err(into_krupy_error(e, new_template));
        }
        self.enter(Stage::Answered);

        let old_rendered = self.render(&old_template, old_answers, &dst)?;
        let mut new_rendered = self.render(&new_template, new_answers, &dst)?;
        new_rendered.tree.remove(&old_rendered.answers_relpath);
        self.enter(Stage::Rendered);

        let merge = MergeOptions {
            context_lines: self.options.context_lines,
            policy: self.options.conflict,
        };
        let skip = self.skip_filter(&new_template)?;
        let mut old_tree = old_rendered.tree.clone();
        old_tree.remove(&new_rendered.answers_relpath);
        let plan = ReconciliationPlan::build(&old_tree, &new_rendered.tree, &dst, &skip, merge)?;
        self.enter(Stage::Diffed);

        let new_commit = new_template.commit.clone().unwrap_or_default();
        let migrations = self.migrations_between(&new_template, &old_commit, &new_commit);
        self.run_migrations(&migrations, "before", &old_commit, &new_commit, &new_rendered)?;

        self.apply_plan(&plan, &dst)?;
        self.enter(Stage::Written);

        self.run_migrations(&migrations, "after", &old_commit, &new_commit, &new_rendered)?;
        self.run_tasks(&new_template, &new_rendered.context, &dst)?;
        self.enter(Stage::TasksRun);

        self.persist(&new_template, &new_rendered, &dst)?;
        self.enter(Stage::Persisted);

        let conflicts = plan.conflicts().count();
        if conflicts > 0 {
            self.reporter
                .info(&format!("{} file(s) have conflicts; review them before committing", conflicts));
        }
        self.enter(Stage::Done);
        info!(changes = plan.changes().count(), conflicts, "Worker::update: done");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::WarningKind;
    use tempfile::TempDir;

    fn template_dir(files: &[(&str, &str)]) -> TempDir {
        let temp = TempDir::new().expect("Failed to create temp dir");
        for (path, content) in files {
            let path = temp.path().join(path);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, content).unwrap();
        }
        temp
    }

    fn options(src: &Path, dst: &Path) -> WorkerOptions {
        WorkerOptions {
            src_path: Some(src.to_string_lossy().into_owned()),
            dst_path: dst.to_path_buf(),
            defaults: true,
            quiet: true,
            ..Default::default()
        }
    }

    #[test]
    fn test_copy_renders_and_persists() {
        let src = template_dir(&[
            ("krupy.yml", "module_name:\n  type: str\n  default: demo\n"),
            ("{{ module_name }}.py.hbs", "NAME = \"{{ module_name }}\"\n"),
        ]);
        let dst = TempDir::new().expect("Failed to create temp dir");
        let mut worker = Worker::new(options(src.path(), dst.path()));
        worker.run_copy().unwrap();

        assert_eq!(worker.stage(), Stage::Done);
        assert_eq!(
            fs::read_to_string(dst.path().join("demo.py")).unwrap(),
            "NAME = \"demo\"\n"
        );
        let answers = fs::read_to_string(dst.path().join(DEFAULT_ANSWERS_FILE)).unwrap();
        assert!(answers.contains("module_name: demo"));
        assert!(answers.contains("_src_path"));
        assert!(!answers.contains("_commit"));
    }

    #[test]
    fn test_strict_mode_elevates_warnings() {
        let src = template_dir(&[("krupy.yml", "_min_krupy_version: '10.5.1'\n")]);
        let dst = TempDir::new().expect("Failed to create temp dir");
        let mut worker = Worker::new(WorkerOptions {
            strict: true,
            ..options(src.path(), dst.path())
        })
        .with_version(parse_version("11.0.0a0").unwrap());
        let err = worker.run_copy().unwrap_err();
        assert!(matches!(err, KrupyError::Warning(d) if d.kind == WarningKind::OldTemplate));
        assert_eq!(worker.stage(), Stage::Failed);
    }

    #[test]
    fn test_cleanup_only_fresh_destination() {
        let src = template_dir(&[("krupy.yml", "_tasks: [\"exit 1\"]\n"), ("a.txt", "a")]);
        let parent = TempDir::new().expect("Failed to create temp dir");
        let fresh = parent.path().join("fresh");
        let mut worker = Worker::new(WorkerOptions {
            trust: true,
            ..options(src.path(), &fresh)
        });
        assert!(matches!(worker.run_copy(), Err(KrupyError::TaskFailed { .. })));
        assert!(!fresh.exists());

        let existing = TempDir::new().expect("Failed to create temp dir");
        let mut worker = Worker::new(WorkerOptions {
            trust: true,
            ..options(src.path(), existing.path())
        });
        assert!(worker.run_copy().is_err());
        assert!(existing.path().exists());
    }

    #[test]
    fn test_unsafe_template_refused_before_writing() {
        let src = template_dir(&[("krupy.yml", "_tasks: [touch x]\n"), ("a.txt", "a")]);
        let parent = TempDir::new().expect("Failed to create temp dir");
        let dst = parent.path().join("out");
        let mut worker = Worker::new(options(src.path(), &dst));
        let err = worker.run_copy().unwrap_err();
        assert_eq!(err.exit_code(), crate::error::EXIT_UNSAFE);
        assert!(!dst.exists());
    }

    #[test]
    fn test_trusted_by_settings() {
        let src = template_dir(&[("krupy.yml", "_tasks: [touch from-task]\n")]);
        let dst = TempDir::new().expect("Failed to create temp dir");
        let settings = Settings {
            trust: vec![src.path().to_string_lossy().into_owned()],
            ..Default::default()
        };
        let mut worker = Worker::new(options(src.path(), dst.path())).with_settings(settings);
        worker.run_copy().unwrap();
        assert!(dst.path().join("from-task").exists());
    }

    #[test]
    fn test_extensions_not_found() {
        let src = template_dir(&[("krupy.yml", "_extensions: [jinja2_time.TimeExtension]\n")]);
        let dst = TempDir::new().expect("Failed to create temp dir");
        let mut worker = Worker::new(WorkerOptions {
            trust: true,
            ..options(src.path(), dst.path())
        });
        assert!(matches!(worker.run_copy(), Err(KrupyError::ExtensionNotFound(_))));
    }

    #[test]
    fn test_existing_files_without_overwrite_are_skipped() {
        let src = template_dir(&[("a.txt", "template\n"), ("b.txt", "b\n")]);
        let dst = TempDir::new().expect("Failed to create temp dir");
        fs::write(dst.path().join("a.txt"), "local\n").unwrap();
        let mut worker = Worker::new(options(src.path(), dst.path()));
        worker.run_copy().unwrap();
        assert_eq!(fs::read_to_string(dst.path().join("a.txt")).unwrap(), "local\n");
        assert_eq!(fs::read_to_string(dst.path().join("b.txt")).unwrap(), "b\n");

        let mut worker = Worker::new(WorkerOptions {
            overwrite: true,
            ..options(src.path(), dst.path())
        });
        worker.run_copy().unwrap();
        assert_eq!(fs::read_to_string(dst.path().join("a.txt")).unwrap(), "template\n");
    }

    #[test]
    fn test_settings_defaults_feed_questions_but_are_not_persisted() {
        let src = template_dir(&[("krupy.yml", "author:\n  type: str\n")]);
        let dst = TempDir::new().expect("Failed to create temp dir");
        let mut defaults = AnswerMap::new();
        defaults.insert("author".into(), json!("Jane"));
        defaults.insert("unrelated".into(), json!("x"));
        let mut worker = Worker::new(options(src.path(), dst.path())).with_settings(Settings {
            defaults,
            ..Default::default()
        });
        worker.run_copy().unwrap();
        let answers = fs::read_to_string(dst.path().join(DEFAULT_ANSWERS_FILE)).unwrap();
        assert!(answers.contains("author: Jane"));
        assert!(!answers.contains("unrelated"));
    }

    #[test]
    fn test_migrations_between() {
        let template = Template::parse(
            "_migrations:\n  - {version: v3.0.0, before: [a]}\n  - {version: v2.0.0, before: [b]}\n  - {version: v1.0.0, before: [c]}\n",
        )
        .unwrap();
        let worker = Worker::new(WorkerOptions::default());
        let selected: Vec<&str> = worker
            .migrations_between(&template, "v1.0.0", "v3.0.0")
            .iter()
            .map(|m| m.version.as_str())
            .collect();
        assert_eq!(selected, vec!["v2.0.0", "v3.0.0"]);
        assert!(worker.migrations_between(&template, "abc", "v3.0.0").is_empty());
    }
}
