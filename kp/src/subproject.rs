//! Answers file of a generated project

use std::collections::BTreeMap;
use std::fs;
use std::path::{Component, Path, PathBuf};

use questionnaire::{AnswerMap, COMMIT_KEY, SRC_PATH_KEY};
use serde_json::Value;
use tracing::debug;

use crate::error::{KrupyError, Result};
use crate::template::DEFAULT_ANSWERS_FILE;

/// Header written at the top of every answers file
pub const ANSWERS_HEADER: &str = "# Changes here will be overwritten by krupy; NEVER EDIT MANUALLY\n";

/// Reject absolute paths and paths escaping the destination
pub fn ensure_relative(path: &Path) -> Result<()> {
    let escapes = path
        .components()
        .any(|c| matches!(c, Component::ParentDir | Component::RootDir | Component::Prefix(_)));
    if escapes || path.as_os_str().is_empty() {
        return Err(KrupyError::PathNotRelative(path.to_path_buf()));
    }
    Ok(())
}

/// Load `<dst>/<answers_file>`, or an empty map when it does not exist
pub fn load_answersfile_data(dst_root: &Path, answers_file: Option<&Path>) -> Result<AnswerMap> {
    let path = dst_root.join(answers_file.unwrap_or(Path::new(DEFAULT_ANSWERS_FILE)));
    debug!(path = %path.display(), "load_answersfile_data: called");
    let content = match fs::read_to_string(&path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(AnswerMap::new()),
        Err(e) => return Err(KrupyError::io(&path, e)),
    };
    match serde_yaml::from_str::<Value>(&content)? {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(AnswerMap::new()),
        other => Err(KrupyError::InvalidConfigFile {
            path,
            message: format!("answers file must be a mapping, got {}", other),
        }),
    }
}

/// Render answers as YAML with the header, keys sorted
pub fn format_answers(answers: &AnswerMap) -> Result<String> {
    let sorted: BTreeMap<&String, &Value> = answers.iter().collect();
    let body = if sorted.is_empty() {
        String::new()
    } else {
        serde_yaml::to_string(&sorted)?
    };
    Ok(format!("{}{}", ANSWERS_HEADER, body))
}

/// A destination directory and its answers file
#[derive(Debug, Clone)]
pub struct Subproject {
    pub dst_root: PathBuf,
    pub answers_relpath: PathBuf,
}

impl Subproject {
    pub fn new(dst_root: impl Into<PathBuf>, answers_relpath: impl Into<PathBuf>) -> Result<Self> {
        let answers_relpath = answers_relpath.into();
        ensure_relative(&answers_relpath)?;
        Ok(Self {
            dst_root: dst_root.into(),
            answers_relpath,
        })
    }

    pub fn answers_path(&self) -> PathBuf {
        self.dst_root.join(&self.answers_relpath)
    }

    /// Everything stored in the answers file
    pub fn raw_answers(&self) -> Result<AnswerMap> {
        load_answersfile_data(&self.dst_root, Some(&self.answers_relpath))
    }

    /// Answers to reuse as the previous run's layer
    ///
    /// Private keys are dropped except the template identity.
    pub fn last_answers(&self) -> Result<AnswerMap> {
        Ok(self
            .raw_answers()?
            .into_iter()
            .filter(|(k, _)| !k.starts_with('_') || k == SRC_PATH_KEY || k == COMMIT_KEY)
            .collect())
    }

    /// Template location recorded by the previous run
    pub fn template_src(&self) -> Result<Option<String>> {
        Ok(self.raw_answers()?.get(SRC_PATH_KEY).and_then(Value::as_str).map(str::to_string))
    }

    /// Template version recorded by the previous run
    pub fn commit(&self) -> Result<Option<String>> {
        Ok(self.raw_answers()?.get(COMMIT_KEY).and_then(|v| match v {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }))
    }

    /// Write the answers file
    pub fn write_answers(&self, answers: &AnswerMap) -> Result<()> {
        let path = self.answers_path();
        debug!(path = %path.display(), keys = answers.len(), "Subproject::write_answers: called");
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| KrupyError::io(parent, e))?;
        }
        fs::write(&path, format_answers(answers)?).map_err(|e| KrupyError::io(&path, e))
    }
}
