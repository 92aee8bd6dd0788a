//! Reconciliation plan for updates
//!
//! Compares the old template rendering, the new one and the destination
//! file by file. Destination edits the template never touched are left alone.

use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{KrupyError, Result};
use crate::merge::{ConflictPolicy, format_rej, merge3};
use crate::renderer::{PathFilter, RenderedTree};

/// What to do with one destination file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileAction {
    Unchanged,
    /// New template file, absent from the destination
    Added(Vec<u8>),
    /// Template dropped a file the destination never modified
    Deleted,
    /// Template change merged without conflicts
    Updated(Vec<u8>),
    /// Merged with conflicts reported per the conflict policy
    Conflicting {
        content: Vec<u8>,
        conflicts: usize,
        /// `.rej` content under the rej policy
        rej: Option<String>,
    },
}

impl FileAction {
    pub fn label(&self) -> &'static str {
        match self {
            FileAction::Unchanged => "unchanged",
            FileAction::Added(_) => "added",
            FileAction::Deleted => "deleted",
            FileAction::Updated(_) => "updated",
            FileAction::Conflicting { .. } => "conflict",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanEntry {
    pub path: PathBuf,
    pub action: FileAction,
    pub executable: bool,
}

/// Merge settings for building a plan
#[derive(Debug, Clone, Copy)]
pub struct MergeOptions {
    pub context_lines: usize,
    pub policy: ConflictPolicy,
}

/// Per-file actions for one update
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconciliationPlan {
    pub entries: Vec<PlanEntry>,
    /// Directories the new template declares
    pub dirs: BTreeSet<PathBuf>,
}

impl fmt::Display for ReconciliationPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for entry in self.changes() {
            writeln!(f, "{:>9} {}", entry.action.label(), entry.path.display())?;
        }
        Ok(())
    }
}

fn read_optional(path: &Path) -> Result<Option<Vec<u8>>> {
    match fs::read(path) {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) if path.is_dir() => {
            debug!(path = %path.display(), error = %e, "read_optional: path is a directory");
            Ok(None)
        }
        Err(e) => Err(KrupyError::io(path, e)),
    }
}

fn reconcile(
    path: &Path,
    old: Option<&[u8]>,
    new: Option<&[u8]>,
    dst: Option<&[u8]>,
    options: MergeOptions,
) -> FileAction {
    if old == new {
        return FileAction::Unchanged;
    }
    let Some(dst) = dst else {
        // A file the user deleted stays deleted
        return match (old, new) {
            (None, Some(new)) => FileAction::Added(new.to_vec()),
            _ => FileAction::Unchanged,
        };
    };
    if new == Some(dst) {
        return FileAction::Unchanged;
    }
    if old == Some(dst) {
        return match new {
            Some(new) => FileAction::Updated(new.to_vec()),
            None => FileAction::Deleted,
        };
    }
    merge_contents(path, old.unwrap_or_default(), new.unwrap_or_default(), dst, options)
}

fn merge_contents(path: &Path, old: &[u8], new: &[u8], dst: &[u8], options: MergeOptions) -> FileAction {
    let texts = (
        std::str::from_utf8(old),
        std::str::from_utf8(dst),
        std::str::from_utf8(new),
    );
    let (Ok(base), Ok(ours), Ok(theirs)) = texts else {
        debug!(path = %path.display(), "merge_contents: binary file, keeping destination");
        return FileAction::Conflicting {
            content: dst.to_vec(),
            conflicts: 1,
            rej: None,
        };
    };

    let outcome = merge3(base, ours, theirs, options.context_lines, options.policy);
    if outcome.is_clean() {
        if outcome.content.as_bytes() == dst {
            return FileAction::Unchanged;
        }
        return FileAction::Updated(outcome.content.into_bytes());
    }
    let rej = (!outcome.rejects.is_empty()).then(|| {
        let display = path.to_string_lossy().replace('\\', "/");
        format_rej(&display, &outcome.rejects)
    });
    FileAction::Conflicting {
        content: outcome.content.into_bytes(),
        conflicts: outcome.conflicts,
        rej,
    }
}

impl ReconciliationPlan {
    /// Compare both renderings against the destination
    ///
    /// Files matching `skip_if_exists` that already exist are never touched.
    pub fn build(
        old: &RenderedTree,
        new: &RenderedTree,
        dst_root: &Path,
        skip_if_exists: &PathFilter,
        options: MergeOptions,
    ) -> Result<Self> {
        debug!(dst = %dst_root.display(), "ReconciliationPlan::build: called");
        let paths: BTreeSet<&PathBuf> = old.files.keys().chain(new.files.keys()).collect();
        let mut entries = Vec::with_capacity(paths.len());
        for path in paths {
            let dst = read_optional(&dst_root.join(path))?;
            let action = if dst.is_some() && skip_if_exists.is_match(path) {
                FileAction::Unchanged
            } else {
                reconcile(path, old.get(path), new.get(path), dst.as_deref(), options)
            };
            let executable = new.files.get(path).is_some_and(|f| f.executable);
            entries.push(PlanEntry {
                path: path.clone(),
                action,
                executable,
            });
        }
        let plan = Self {
            entries,
            dirs: new.dirs.clone(),
        };
        info!(
            changes = plan.changes().count(),
            conflicts = plan.conflicts().count(),
            "ReconciliationPlan::build: done"
        );
        Ok(plan)
    }

    /// Entries that change the destination
    pub fn changes(&self) -> impl Iterator<Item = &PlanEntry> {
        self.entries.iter().filter(|e| e.action != FileAction::Unchanged)
    }

    pub fn conflicts(&self) -> impl Iterator<Item = &PlanEntry> {
        self.entries
            .iter()
            .filter(|e| matches!(e.action, FileAction::Conflicting { .. }))
    }

    pub fn action(&self, path: &Path) -> Option<&FileAction> {
        self.entries.iter().find(|e| e.path == path).map(|e| &e.action)
    }
}
