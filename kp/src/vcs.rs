//! Version control collaborator
//!
//! Templates hosted in git are always cloned into a scratch directory, so the
//! worker only needs a handful of read operations plus clone and checkout.
//! [`GitCli`] shells out to the `git` binary.

use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::debug;

use crate::error::{KrupyError, Result};

/// Git operations the worker relies on
pub trait Vcs {
    /// Whether `path` is inside a git work tree
    fn is_repo(&self, path: &Path) -> bool;

    /// Clone `url` into `dest`, which must not exist or be empty
    fn clone_repo(&self, url: &str, dest: &Path) -> Result<()>;

    /// Check out a commit, tag or branch
    fn checkout(&self, repo: &Path, rev: &str) -> Result<()>;

    /// All tag names
    fn tags(&self, repo: &Path) -> Result<Vec<String>>;

    /// Human-readable name of HEAD, tag-relative when possible
    fn describe(&self, repo: &Path) -> Result<String>;

    /// Full hash of HEAD
    fn head_commit(&self, repo: &Path) -> Result<String>;

    /// Whether the work tree has uncommitted changes
    fn is_dirty(&self, repo: &Path) -> Result<bool>;

    /// Whether the repository is a shallow clone
    fn is_shallow(&self, repo: &Path) -> Result<bool>;
}

/// [`Vcs`] backed by the `git` command line
#[derive(Debug, Default, Clone, Copy)]
pub struct GitCli;

impl GitCli {
    fn git(&self, dir: Option<&Path>, args: &[&str]) -> Result<String> {
        debug!(?dir, ?args, "GitCli::git: called");
        let mut cmd = Command::new("git");
        cmd.args(args).env("GIT_TERMINAL_PROMPT", "0");
        if let Some(dir) = dir {
            cmd.current_dir(dir);
        }
        let output = cmd
            .output()
            .map_err(|e| KrupyError::Vcs(format!("failed to run git {}: {}", args.join(" "), e)))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(KrupyError::Vcs(format!("git {}: {}", args.join(" "), stderr.trim())));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

impl Vcs for GitCli {
    fn is_repo(&self, path: &Path) -> bool {
        path.is_dir()
            && self
                .git(Some(path), &["rev-parse", "--is-inside-work-tree"])
                .is_ok_and(|out| out == "true")
    }

    fn clone_repo(&self, url: &str, dest: &Path) -> Result<()> {
        let dest = dest.to_string_lossy();
        self.git(None, &["clone", "--no-checkout", "--quiet", url, &dest])?;
        Ok(())
    }

    fn checkout(&self, repo: &Path, rev: &str) -> Result<()> {
        self.git(Some(repo), &["checkout", "--force", "--quiet", rev])?;
        Ok(())
    }

    fn tags(&self, repo: &Path) -> Result<Vec<String>> {
        let out = self.git(Some(repo), &["tag", "--list"])?;
        Ok(out.lines().map(str::to_string).filter(|t| !t.is_empty()).collect())
    }

    fn describe(&self, repo: &Path) -> Result<String> {
        self.git(Some(repo), &["describe", "--tags", "--always"])
    }

    fn head_commit(&self, repo: &Path) -> Result<String> {
        self.git(Some(repo), &["rev-parse", "HEAD"])
    }

    fn is_dirty(&self, repo: &Path) -> Result<bool> {
        Ok(!self.git(Some(repo), &["status", "--porcelain"])?.is_empty())
    }

    fn is_shallow(&self, repo: &Path) -> Result<bool> {
        Ok(self.git(Some(repo), &["rev-parse", "--is-shallow-repository"])? == "true")
    }
}

/// Where a template comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateSource {
    /// Directory on disk, possibly a git work tree
    Local(PathBuf),
    /// Remote git URL
    Git(String),
}

impl TemplateSource {
    /// Interpret a user-supplied template location
    ///
    /// `gh:owner/repo` and `gl:owner/repo` expand to GitHub and GitLab
    /// URLs. Anything that looks like a URL is git; the rest is a path.
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if let Some(rest) = raw.strip_prefix("gh:") {
            return Self::Git(format!("https://github.com/{}.git", rest.trim_end_matches(".git")));
        }
        if let Some(rest) = raw.strip_prefix("gl:") {
            return Self::Git(format!("https://gitlab.com/{}.git", rest.trim_end_matches(".git")));
        }
        if let Some(rest) = raw.strip_prefix("git+") {
            return Self::Git(rest.to_string());
        }
        const URL_PREFIXES: [&str; 5] = ["https://", "http://", "ssh://", "git://", "git@"];
        if URL_PREFIXES.iter().any(|p| raw.starts_with(p)) {
            return Self::Git(raw.to_string());
        }
        if let Some(path) = raw.strip_prefix("file://") {
            return Self::Local(PathBuf::from(path));
        }
        Self::Local(PathBuf::from(raw))
    }
}
