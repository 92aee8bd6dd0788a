//! Non-fatal diagnostics
//!
//! Every warning the worker can raise goes through one channel. Callers read
//! them back after a run or ask the worker to treat them as errors.

use std::fmt;

use tracing::warn;

use crate::error::{KrupyError, Result};

/// Kind of non-fatal problem
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningKind {
    /// Template was written for an older major version of krupy
    OldTemplate,
    /// A version string could not be parsed
    UnknownVersion,
    /// Local template has uncommitted changes that will not be used
    DirtyLocal,
    /// Template repository is a shallow clone
    ShallowClone,
}

impl WarningKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::OldTemplate => "old-template",
            Self::UnknownVersion => "unknown-version",
            Self::DirtyLocal => "dirty-local",
            Self::ShallowClone => "shallow-clone",
        }
    }
}

/// One warning plus its message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub kind: WarningKind,
    pub message: String,
}

impl Diagnostic {
    pub fn new(kind: WarningKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind.name(), self.message)
    }
}

/// Collects diagnostics for one run
#[derive(Debug, Default)]
pub struct Diagnostics {
    strict: bool,
    items: Vec<Diagnostic>,
}

impl Diagnostics {
    /// `strict` turns every warning into an error
    pub fn new(strict: bool) -> Self {
        Self {
            strict,
            items: Vec::new(),
        }
    }

    /// Record a warning, failing instead when strict
    pub fn emit(&mut self, diagnostic: Diagnostic) -> Result<()> {
        warn!(kind = diagnostic.kind.name(), message = %diagnostic.message, "diagnostic");
        if self.strict {
            return Err(KrupyError::Warning(diagnostic));
        }
        self.items.push(diagnostic);
        Ok(())
    }

    pub fn items(&self) -> &[Diagnostic] {
        &self.items
    }

    pub fn has(&self, kind: WarningKind) -> bool {
        self.items.iter().any(|d| d.kind == kind)
    }
}
