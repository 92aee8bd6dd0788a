//! Template descriptor
//!
//! Parses `krupy.yml` (or `krupy.yaml`) at a template root. Keys starting with
//! an underscore configure the template, every other key is a question, kept
//! in declaration order.

use std::fs;
use std::path::{Path, PathBuf};

use questionnaire::{AnswerMap, COMMIT_KEY, DisplaySettings, Question, SRC_PATH_KEY};
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tempfile::TempDir;
use tracing::{debug, info, warn};

use crate::error::{KrupyError, Result};

/// Accepted configuration file names
pub const CONFIG_FILE_NAMES: [&str; 2] = ["krupy.yml", "krupy.yaml"];

/// Default suffix marking files whose content is rendered
pub const DEFAULT_TEMPLATES_SUFFIX: &str = ".hbs";

/// Default answers file path, relative to the destination
pub const DEFAULT_ANSWERS_FILE: &str = ".krupy-answers.yml";

const RESERVED_KEYS: [&str; 11] = [
    "_min_krupy_version",
    "_templates_suffix",
    "_exclude",
    "_skip_if_exists",
    "_answers_file",
    "_tasks",
    "_migrations",
    "_extensions",
    "_subdirectory",
    "_secret_questions",
    "_questions_display",
];

/// Command line of a task
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum TaskCommand {
    /// Run through the platform shell
    Shell(String),
    /// Run directly, each element rendered separately
    Args(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
enum RawTask {
    Command(TaskCommand),
    Detailed {
        command: TaskCommand,
        #[serde(default)]
        working_directory: Option<String>,
        #[serde(default)]
        when: Option<Value>,
    },
}

/// A command run after rendering
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "RawTask")]
pub struct Task {
    pub command: TaskCommand,
    /// Relative to the destination root, templated
    pub working_directory: Option<String>,
    /// Skip the task unless this renders truthy
    pub when: Option<Value>,
}

impl From<RawTask> for Task {
    fn from(raw: RawTask) -> Self {
        match raw {
            RawTask::Command(command) => Self {
                command,
                working_directory: None,
                when: None,
            },
            RawTask::Detailed {
                command,
                working_directory,
                when,
            } => Self {
                command,
                working_directory,
                when,
            },
        }
    }
}

/// Tasks attached to one template version, run during updates
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Migration {
    #[serde(deserialize_with = "scalar_string")]
    pub version: String,
    #[serde(default)]
    pub before: Vec<Task>,
    #[serde(default)]
    pub after: Vec<Task>,
}

/// Which worker operation is checking for unsafe features
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Copy,
    Recopy,
    Update,
}

fn scalar_string<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<String, D::Error> {
    match serde_yaml::Value::deserialize(deserializer)? {
        serde_yaml::Value::String(s) => Ok(s),
        serde_yaml::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!("expected a version string, got {:?}", other))),
    }
}

fn optional_scalar_string<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Option<String>, D::Error> {
    scalar_string(deserializer).map(Some)
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ReservedKeys {
    #[serde(rename = "_min_krupy_version", deserialize_with = "optional_scalar_string")]
    min_krupy_version: Option<String>,
    #[serde(rename = "_templates_suffix")]
    templates_suffix: Option<String>,
    #[serde(rename = "_exclude")]
    exclude: Vec<String>,
    #[serde(rename = "_skip_if_exists")]
    skip_if_exists: Vec<String>,
    #[serde(rename = "_answers_file")]
    answers_file: Option<String>,
    #[serde(rename = "_tasks")]
    tasks: Vec<Task>,
    #[serde(rename = "_migrations")]
    migrations: Vec<Migration>,
    #[serde(rename = "_extensions")]
    extensions: Vec<String>,
    #[serde(rename = "_subdirectory")]
    subdirectory: Option<String>,
    #[serde(rename = "_secret_questions")]
    secret_questions: Vec<String>,
    #[serde(rename = "_questions_display")]
    questions_display: DisplaySettings,
}

/// A template's configuration at one version
#[derive(Debug, Default)]
pub struct Template {
    /// Checkout root (where the configuration file lives)
    pub root: PathBuf,
    pub config_path: Option<PathBuf>,
    pub questions: Vec<Question>,
    pub min_krupy_version: Option<String>,
    pub templates_suffix: String,
    pub exclude: Vec<String>,
    pub skip_if_exists: Vec<String>,
    /// Templated path of the answers file
    pub answers_file: String,
    pub tasks: Vec<Task>,
    pub migrations: Vec<Migration>,
    pub extensions: Vec<String>,
    pub subdirectory: Option<String>,
    pub questions_display: DisplaySettings,
    /// Location the template was requested from
    pub src_path: Option<String>,
    /// `git describe` name of the checked out version
    pub commit: Option<String>,
    pub commit_hash: Option<String>,
    /// Scratch clone backing `root`, removed on drop
    pub checkout: Option<TempDir>,
}

fn find_config_file(root: &Path) -> Result<Option<PathBuf>> {
    let found: Vec<&str> = CONFIG_FILE_NAMES
        .iter()
        .copied()
        .filter(|name| root.join(name).is_file())
        .collect();
    match found.as_slice() {
        [] => Ok(None),
        [name] => Ok(Some(root.join(name))),
        _ => Err(KrupyError::MultipleConfigFiles {
            dir: root.to_path_buf(),
            names: found.iter().map(|s| s.to_string()).collect(),
        }),
    }
}

impl Template {
    /// Load the descriptor at `root`
    ///
    /// A missing configuration file yields the default descriptor.
    pub fn load(root: &Path) -> Result<Self> {
        debug!(root = %root.display(), "Template::load: called");
        let Some(config_path) = find_config_file(root)? else {
            info!(root = %root.display(), "No configuration file found, using defaults");
            return Ok(Self {
                root: root.to_path_buf(),
                templates_suffix: DEFAULT_TEMPLATES_SUFFIX.to_string(),
                answers_file: DEFAULT_ANSWERS_FILE.to_string(),
                ..Default::default()
            });
        };

        let content = fs::read_to_string(&config_path).map_err(|e| KrupyError::io(&config_path, e))?;
        let mut template = Self::parse(&content).map_err(|e| match e {
            KrupyError::Yaml(e) => KrupyError::InvalidConfigFile {
                path: config_path.clone(),
                message: e.to_string(),
            },
            KrupyError::InvalidConfigFile { message, .. } => KrupyError::InvalidConfigFile {
                path: config_path.clone(),
                message,
            },
            other => other,
        })?;
        template.root = root.to_path_buf();
        template.config_path = Some(config_path);
        info!(
            questions = template.questions.len(),
            tasks = template.tasks.len(),
            "Template::load: loaded"
        );
        Ok(template)
    }

    /// Parse configuration file content
    pub fn parse(content: &str) -> Result<Self> {
        let document: serde_yaml::Value = serde_yaml::from_str(content)?;
        let mapping = match document {
            serde_yaml::Value::Mapping(m) => m,
            serde_yaml::Value::Null => serde_yaml::Mapping::new(),
            _ => {
                return Err(KrupyError::InvalidConfigFile {
                    path: PathBuf::from(CONFIG_FILE_NAMES[0]),
                    message: "top level must be a mapping".to_string(),
                });
            }
        };

        let mut reserved = serde_yaml::Mapping::new();
        let mut question_specs = Vec::new();
        for (key, value) in mapping {
            let Some(name) = key.as_str().map(str::to_string) else {
                return Err(KrupyError::InvalidConfigFile {
                    path: PathBuf::from(CONFIG_FILE_NAMES[0]),
                    message: format!("keys must be strings, got {:?}", key),
                });
            };
            if name.starts_with('_') {
                if !RESERVED_KEYS.contains(&name.as_str()) {
                    warn!(key = %name, "Ignoring unknown reserved key");
                }
                reserved.insert(key, value);
            } else {
                question_specs.push((name, value));
            }
        }

        let settings: ReservedKeys = serde_yaml::from_value(serde_yaml::Value::Mapping(reserved))?;

        let mut questions = Vec::with_capacity(question_specs.len());
        for (name, spec) in question_specs {
            let spec: Value = serde_yaml::from_value(spec)?;
            let secret = settings.secret_questions.contains(&name);
            questions.push(Question::from_config(&name, &spec, secret)?);
        }
        for name in &settings.secret_questions {
            if !questions.iter().any(|q| &q.var_name == name) {
                warn!(question = %name, "Secret question is not declared");
            }
        }

        if let Some(sub) = &settings.subdirectory {
            let path = Path::new(sub);
            if path.is_absolute() || path.components().any(|c| matches!(c, std::path::Component::ParentDir)) {
                return Err(KrupyError::PathNotRelative(path.to_path_buf()));
            }
        }

        Ok(Self {
            questions,
            min_krupy_version: settings.min_krupy_version,
            templates_suffix: settings
                .templates_suffix
                .unwrap_or_else(|| DEFAULT_TEMPLATES_SUFFIX.to_string()),
            exclude: settings.exclude,
            skip_if_exists: settings.skip_if_exists,
            answers_file: settings
                .answers_file
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_ANSWERS_FILE.to_string()),
            tasks: settings.tasks,
            migrations: settings.migrations,
            extensions: settings.extensions,
            subdirectory: settings.subdirectory.filter(|s| !s.trim().is_empty()),
            questions_display: settings.questions_display,
            ..Default::default()
        })
    }

    /// Directory whose contents are rendered
    pub fn render_root(&self) -> PathBuf {
        match &self.subdirectory {
            Some(sub) => self.root.join(sub),
            None => self.root.clone(),
        }
    }

    /// Features that can run arbitrary code
    pub fn unsafe_features(&self, operation: Operation, skip_tasks: bool) -> Vec<String> {
        let mut features = Vec::new();
        if !self.extensions.is_empty() {
            features.push("extensions".to_string());
        }
        if !skip_tasks && !self.tasks.is_empty() {
            features.push("tasks".to_string());
        }
        if operation == Operation::Update && !self.migrations.is_empty() {
            features.push("migrations".to_string());
        }
        features
    }

    /// Template identity recorded in the answers file
    pub fn metadata(&self) -> AnswerMap {
        let mut metadata = AnswerMap::new();
        if let Some(commit) = &self.commit {
            metadata.insert(COMMIT_KEY.to_string(), Value::String(commit.clone()));
        }
        if let Some(src) = &self.src_path {
            metadata.insert(SRC_PATH_KEY.to_string(), Value::String(src.clone()));
        }
        metadata
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_questions_in_order() {
        let template = Template::parse(
            r#"
zeta:
  type: str
alpha: 3
_templates_suffix: .tmpl
middle:
  type: bool
  default: false
"#,
        )
        .unwrap();
        let names: Vec<&str> = template.questions.iter().map(|q| q.var_name.as_str()).collect();
        assert_eq!(names, vec!["zeta", "alpha", "middle"]);
        assert_eq!(template.templates_suffix, ".tmpl");
        assert_eq!(template.answers_file, DEFAULT_ANSWERS_FILE);
    }

    #[test]
    fn test_parse_tasks_and_migrations() {
        let template = Template::parse(
            r#"
_tasks:
  - mkdir hello
  - ["touch", "{{ name }}"]
  - command: echo hi
    working_directory: sub
    when: "{{ flag }}"
_migrations:
  - version: v2.0.0
    before: [echo before]
    after: [echo after]
_min_krupy_version: 1.2
"#,
        )
        .unwrap();
        assert_eq!(template.tasks.len(), 3);
        assert_eq!(template.tasks[0].command, TaskCommand::Shell("mkdir hello".into()));
        assert_eq!(
            template.tasks[1].command,
            TaskCommand::Args(vec!["touch".into(), "{{ name }}".into()])
        );
        assert_eq!(template.tasks[2].working_directory.as_deref(), Some("sub"));
        assert_eq!(template.migrations[0].version, "v2.0.0");
        assert_eq!(template.migrations[0].after.len(), 1);
        assert_eq!(template.min_krupy_version.as_deref(), Some("1.2"));
    }

    #[test]
    fn test_secret_questions() {
        let template = Template::parse("_secret_questions: [token]\ntoken:\n  type: str\n  default: x\n").unwrap();
        assert!(template.questions[0].secret);

        let err = Template::parse("_secret_questions: [token]\ntoken:\n  type: str\n").unwrap_err();
        assert!(matches!(err, KrupyError::Question(_)));
    }

    #[test]
    fn test_unsafe_features() {
        let template = Template::parse(
            "_tasks: [echo hi]\n_migrations: [{version: '2', before: [echo]}]\n_extensions: [ext.Foo]\n",
        )
        .unwrap();
        assert_eq!(
            template.unsafe_features(Operation::Copy, false),
            vec!["extensions".to_string(), "tasks".to_string()]
        );
        assert_eq!(template.unsafe_features(Operation::Update, true).len(), 2);
        assert!(Template::default().unsafe_features(Operation::Update, false).is_empty());
    }

    #[test]
    fn test_load_missing_and_multiple_config() {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let template = Template::load(temp.path()).unwrap();
        assert!(template.questions.is_empty());
        assert_eq!(template.templates_suffix, DEFAULT_TEMPLATES_SUFFIX);

        fs::write(temp.path().join("krupy.yml"), "a: 1\n").unwrap();
        assert_eq!(Template::load(temp.path()).unwrap().questions.len(), 1);

        fs::write(temp.path().join("krupy.yaml"), "b: 1\n").unwrap();
        assert!(matches!(
            Template::load(temp.path()),
            Err(KrupyError::MultipleConfigFiles { .. })
        ));
    }

    #[test]
    fn test_invalid_config_reports_path() {
        let temp = TempDir::new().expect("Failed to create temp dir");
        fs::write(temp.path().join("krupy.yaml"), "_exclude: 3\n").unwrap();
        match Template::load(temp.path()) {
            Err(KrupyError::InvalidConfigFile { path, .. }) => assert!(path.ends_with("krupy.yaml")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_subdirectory_must_be_relative() {
        assert!(matches!(
            Template::parse("_subdirectory: ../outside\n"),
            Err(KrupyError::PathNotRelative(_))
        ));
        let template = Template::parse("_subdirectory: template\n").unwrap();
        assert!(template.render_root().ends_with("template"));
    }

    #[test]
    fn test_metadata() {
        let template = Template {
            commit: Some("v1.0.0".into()),
            src_path: Some("gh:acme/tpl".into()),
            ..Default::default()
        };
        let metadata = template.metadata();
        assert_eq!(metadata.get("_commit"), Some(&Value::String("v1.0.0".into())));
        assert_eq!(metadata.get("_src_path"), Some(&Value::String("gh:acme/tpl".into())));
    }
}
