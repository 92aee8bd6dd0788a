//! User-facing status lines
//!
//! One line per file or task on stderr, colored by outcome. Silent when the
//! run is quiet.

use std::fmt;
use std::path::Path;

use colored::Colorize;

/// What happened to a destination path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    Create,
    Overwrite,
    Identical,
    Skip,
    Update,
    Conflict,
    Delete,
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Verb::Create => "create",
            Verb::Overwrite => "overwrite",
            Verb::Identical => "identical",
            Verb::Skip => "skip",
            Verb::Update => "update",
            Verb::Conflict => "conflict",
            Verb::Delete => "delete",
        };
        write!(f, "{:>10}", label)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Reporter {
    quiet: bool,
}

impl Reporter {
    pub fn new(quiet: bool) -> Self {
        Self { quiet }
    }

    pub fn is_quiet(&self) -> bool {
        self.quiet
    }

    pub fn file(&self, verb: Verb, path: &Path) {
        if self.quiet {
            return;
        }
        let label = verb.to_string();
        let label = match verb {
            Verb::Create => label.green(),
            Verb::Overwrite | Verb::Update => label.yellow(),
            Verb::Identical => label.cyan(),
            Verb::Skip => label.bright_black(),
            Verb::Conflict | Verb::Delete => label.red(),
        };
        eprintln!("{} {}", label.bold(), path.display());
    }

    pub fn task(&self, index: usize, total: usize, command: &str) {
        if self.quiet {
            return;
        }
        eprintln!(" {} Running task {} of {}: {}", ">".bright_green(), index, total, command);
    }

    pub fn warning(&self, message: &str) {
        if self.quiet {
            return;
        }
        eprintln!("{} {}", "warning:".yellow().bold(), message);
    }

    pub fn info(&self, message: &str) {
        if self.quiet {
            return;
        }
        eprintln!("{}", message);
    }
}
