//! Post-render task execution
//!
//! Tasks run one after another in the destination root (or their declared
//! working directory below it). Each command is rendered first, so task lists
//! can branch on answers or on `_krupy_conf.os`.

use std::path::Path;
use std::process::Command;

use questionnaire::{Engine, parse_bool_literal};
use serde_json::Value;
use tracing::{debug, info};

use crate::error::{KrupyError, Result};
use crate::report::Reporter;
use crate::template::{Task, TaskCommand};

/// Name of the running operating system, as exposed to templates
pub fn detect_os() -> Option<&'static str> {
    if cfg!(target_os = "linux") {
        Some("linux")
    } else if cfg!(target_os = "macos") {
        Some("macos")
    } else if cfg!(target_os = "windows") {
        Some("windows")
    } else {
        None
    }
}

/// Environment shared by one batch of tasks
#[derive(Debug, Clone, Default)]
pub struct TaskEnv {
    pub vars: Vec<(String, String)>,
}

impl TaskEnv {
    /// Environment for regular post-render tasks
    pub fn tasks() -> Self {
        Self {
            vars: vec![("STAGE".to_string(), "task".to_string())],
        }
    }

    /// Environment for migrations run before or after an update
    pub fn migration(stage: &str, from: &str, to: &str) -> Self {
        Self {
            vars: vec![
                ("STAGE".to_string(), stage.to_string()),
                ("VERSION_FROM".to_string(), from.to_string()),
                ("VERSION_TO".to_string(), to.to_string()),
            ],
        }
    }
}

/// A rendered command ready to spawn
#[derive(Debug, Clone, PartialEq, Eq)]
enum Prepared {
    Shell(String),
    Args(Vec<String>),
}

impl Prepared {
    fn display(&self) -> String {
        match self {
            Prepared::Shell(s) => s.clone(),
            Prepared::Args(args) => args.join(" "),
        }
    }

    fn command(&self) -> Command {
        match self {
            Prepared::Shell(line) => {
                let mut cmd = if cfg!(windows) {
                    let mut c = Command::new("cmd");
                    c.arg("/C");
                    c
                } else {
                    let mut c = Command::new("sh");
                    c.arg("-c");
                    c
                };
                cmd.arg(line);
                cmd
            }
            Prepared::Args(args) => {
                let mut cmd = Command::new(&args[0]);
                cmd.args(&args[1..]);
                cmd
            }
        }
    }
}

pub struct TaskRunner<'a> {
    engine: &'a Engine,
    context: &'a Value,
    dst_root: &'a Path,
    reporter: Reporter,
}

impl<'a> TaskRunner<'a> {
    pub fn new(engine: &'a Engine, context: &'a Value, dst_root: &'a Path, reporter: Reporter) -> Self {
        Self {
            engine,
            context,
            dst_root,
            reporter,
        }
    }

    fn render(&self, text: &str) -> Result<String> {
        self.engine.render(text, self.context).map_err(|message| KrupyError::Render {
            what: format!("task \"{}\"", text),
            message,
        })
    }

    fn should_run(&self, task: &Task) -> Result<bool> {
        match &task.when {
            None => Ok(true),
            Some(Value::Bool(b)) => Ok(*b),
            Some(Value::String(s)) => {
                let rendered = self.render(s)?;
                parse_bool_literal(&rendered).ok_or_else(|| KrupyError::Render {
                    what: format!("task condition \"{}\"", s),
                    message: format!("\"{}\" is not a boolean", rendered.trim()),
                })
            }
            Some(other) => Err(KrupyError::Render {
                what: "task condition".to_string(),
                message: format!("{} is not a boolean", other),
            }),
        }
    }

    /// Render a task; `None` when it renders to nothing
    fn prepare(&self, task: &Task) -> Result<Option<Prepared>> {
        match &task.command {
            TaskCommand::Shell(line) => {
                let rendered = self.render(line)?;
                let rendered = rendered.trim();
                Ok((!rendered.is_empty()).then(|| Prepared::Shell(rendered.to_string())))
            }
            TaskCommand::Args(args) => {
                let rendered = args.iter().map(|a| self.render(a)).collect::<Result<Vec<_>>>()?;
                let runnable = rendered.first().is_some_and(|program| !program.trim().is_empty());
                Ok(if runnable { Some(Prepared::Args(rendered)) } else { None })
            }
        }
    }

    /// Run every task in order, stopping at the first failure
    pub fn run(&self, tasks: &[Task], env: &TaskEnv) -> Result<()> {
        info!(count = tasks.len(), dst = %self.dst_root.display(), "TaskRunner::run: called");
        for (index, task) in tasks.iter().enumerate() {
            if !self.should_run(task)? {
                debug!(index, "TaskRunner::run: condition false, skipped");
                continue;
            }
            let Some(prepared) = self.prepare(task)? else {
                debug!(index, "TaskRunner::run: empty command, skipped");
                continue;
            };
            let display = prepared.display();
            self.reporter.task(index + 1, tasks.len(), &display);

            let cwd = match &task.working_directory {
                Some(dir) => self.dst_root.join(self.render(dir)?.trim()),
                None => self.dst_root.to_path_buf(),
            };
            let mut cmd = prepared.command();
            cmd.current_dir(&cwd);
            for (key, value) in &env.vars {
                cmd.env(key, value);
            }
            let command_line = &display;
            debug!(command = %command_line, cwd = %cwd.display(), "TaskRunner::run: spawning");
            let status = cmd.status().map_err(|e| KrupyError::TaskFailed {
                command: display.clone(),
                status: e.to_string(),
            })?;
            if !status.success() {
                return Err(KrupyError::TaskFailed {
                    command: display,
                    status: status.to_string(),
                });
            }
        }
        Ok(())
    }
}
