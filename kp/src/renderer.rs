//! Template tree rendering
//!
//! Walks a template directory and produces the generated project in memory.
//! Path components and suffixed file contents are rendered; the result is
//! written (or diffed) by the worker.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Component, Path, PathBuf};

use glob::{MatchOptions, Pattern};
use questionnaire::Engine;
use serde_json::Value;
use tracing::debug;
use walkdir::WalkDir;

use crate::error::{KrupyError, Result};

/// Paths never copied from a template
pub const DEFAULT_EXCLUDE: [&str; 6] = ["krupy.yml", "krupy.yaml", "~*", ".git", ".DS_Store", ".svn"];

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

#[derive(Debug, Clone)]
struct Rule {
    pattern: Pattern,
    negated: bool,
    /// Pattern contains a slash and is matched against the whole path
    anchored: bool,
}

/// Gitignore-flavoured path matcher
///
/// Patterns without a slash match any path component. Patterns with a slash
/// match the path from the root, or any ancestor of it. A leading `!`
/// re-includes what earlier patterns matched; the last matching rule wins.
#[derive(Debug, Clone, Default)]
pub struct PathFilter {
    rules: Vec<Rule>,
}

impl PathFilter {
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self> {
        let mut rules = Vec::with_capacity(patterns.len());
        for raw in patterns {
            let raw = raw.as_ref().trim();
            if raw.is_empty() || raw.starts_with('#') {
                continue;
            }
            let (negated, body) = match raw.strip_prefix('!') {
                Some(rest) => (true, rest),
                None => (false, raw),
            };
            let body = body.trim_end_matches('/');
            let anchored = body.contains('/');
            let body = body.trim_start_matches('/');
            let pattern = Pattern::new(body)
                .map_err(|e| KrupyError::UserMessage(format!("Invalid pattern \"{}\": {}", raw, e)))?;
            rules.push(Rule {
                pattern,
                negated,
                anchored,
            });
        }
        Ok(Self { rules })
    }

    /// Filter with the default excludes followed by `extra`
    pub fn with_defaults<S: AsRef<str>>(extra: &[S]) -> Result<Self> {
        let mut patterns: Vec<&str> = DEFAULT_EXCLUDE.to_vec();
        patterns.extend(extra.iter().map(|s| s.as_ref()));
        Self::new(&patterns)
    }

    fn rule_matches(rule: &Rule, path: &Path) -> bool {
        let components: Vec<String> = path
            .components()
            .filter_map(|c| match c {
                Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect();
        if rule.anchored {
            (1..=components.len()).any(|n| rule.pattern.matches_with(&components[..n].join("/"), MATCH_OPTIONS))
        } else {
            components.iter().any(|c| rule.pattern.matches_with(c, MATCH_OPTIONS))
        }
    }

    /// Whether a relative path is matched
    pub fn is_match(&self, path: &Path) -> bool {
        let mut matched = false;
        for rule in &self.rules {
            if Self::rule_matches(rule, path) {
                matched = !rule.negated;
            }
        }
        matched
    }
}

/// One rendered file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedFile {
    pub content: Vec<u8>,
    pub executable: bool,
}

/// Generated project held in memory, keyed by destination-relative path
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderedTree {
    pub files: BTreeMap<PathBuf, RenderedFile>,
    pub dirs: BTreeSet<PathBuf>,
}

impl RenderedTree {
    pub fn get(&self, path: &Path) -> Option<&[u8]> {
        self.files.get(path).map(|f| f.content.as_slice())
    }

    pub fn remove(&mut self, path: &Path) -> Option<RenderedFile> {
        self.files.remove(path)
    }
}

/// Renders a template directory against a context
pub struct Renderer<'a> {
    engine: &'a Engine,
    context: &'a Value,
    suffix: &'a str,
    exclude: &'a PathFilter,
}

#[cfg(unix)]
fn is_executable(meta: &fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
fn is_executable(_meta: &fs::Metadata) -> bool {
    false
}

impl<'a> Renderer<'a> {
    pub fn new(engine: &'a Engine, context: &'a Value, suffix: &'a str, exclude: &'a PathFilter) -> Self {
        Self {
            engine,
            context,
            suffix,
            exclude,
        }
    }

    fn render_str(&self, what: &Path, text: &str) -> Result<String> {
        self.engine.render(text, self.context).map_err(|message| KrupyError::Render {
            what: what.display().to_string(),
            message,
        })
    }

    /// Render one relative path; `None` when a component renders empty
    fn render_path(&self, rel: &Path, strip_suffix: bool) -> Result<Option<PathBuf>> {
        let mut rendered = PathBuf::new();
        let count = rel.components().count();
        for (i, component) in rel.components().enumerate() {
            let Component::Normal(name) = component else {
                return Err(KrupyError::PathNotRelative(rel.to_path_buf()));
            };
            let mut name = name.to_string_lossy().into_owned();
            if strip_suffix && i + 1 == count && !self.suffix.is_empty() {
                if let Some(stripped) = name.strip_suffix(self.suffix) {
                    name = stripped.to_string();
                }
            }
            let name = self.render_str(rel, &name)?;
            if name.trim().is_empty() {
                return Ok(None);
            }
            rendered.push(name);
        }
        if rendered
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(KrupyError::PathNotRelative(rendered));
        }
        Ok(Some(rendered))
    }

    fn is_template_file(&self, name: &Path) -> bool {
        self.suffix.is_empty() || name.to_string_lossy().ends_with(self.suffix)
    }

    /// Render every file under `root`
    pub fn render_dir(&self, root: &Path) -> Result<RenderedTree> {
        debug!(root = %root.display(), suffix = self.suffix, "Renderer::render_dir: called");
        let mut tree = RenderedTree::default();
        let mut pruned: Vec<PathBuf> = Vec::new();

        let walker = WalkDir::new(root).min_depth(1).sort_by_file_name();
        for entry in walker {
            let entry = entry.map_err(|e| {
                let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| root.to_path_buf());
                KrupyError::io(path, e.into())
            })?;
            let rel = entry
                .path()
                .strip_prefix(root)
                .map_err(|_| KrupyError::PathNotRelative(entry.path().to_path_buf()))?
                .to_path_buf();
            if pruned.iter().any(|p| rel.starts_with(p)) {
                continue;
            }
            if self.exclude.is_match(&rel) {
                debug!(path = %rel.display(), "Renderer::render_dir: excluded");
                pruned.push(rel);
                continue;
            }

            let is_dir = entry.file_type().is_dir();
            let templated = !is_dir && self.is_template_file(&rel);
            let Some(dest) = self.render_path(&rel, templated)? else {
                debug!(path = %rel.display(), "Renderer::render_dir: empty name, skipped");
                pruned.push(rel);
                continue;
            };
            if self.exclude.is_match(&dest) {
                pruned.push(rel);
                continue;
            }

            if is_dir {
                tree.dirs.insert(dest);
                continue;
            }

            let meta = fs::metadata(entry.path()).map_err(|e| KrupyError::io(entry.path(), e))?;
            let raw = fs::read(entry.path()).map_err(|e| KrupyError::io(entry.path(), e))?;
            let content = if templated {
                let text = String::from_utf8(raw).map_err(|_| KrupyError::Render {
                    what: rel.display().to_string(),
                    message: "template file is not valid UTF-8".to_string(),
                })?;
                self.render_str(&rel, &text)?.into_bytes()
            } else {
                raw
            };
            if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
                tree.dirs.insert(parent.to_path_buf());
            }
            tree.files.insert(
                dest,
                RenderedFile {
                    content,
                    executable: is_executable(&meta),
                },
            );
        }
        debug!(files = tree.files.len(), dirs = tree.dirs.len(), "Renderer::render_dir: done");
        Ok(tree)
    }
}
