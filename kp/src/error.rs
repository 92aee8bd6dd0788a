//! Error types for krupy

use std::path::PathBuf;

use questionnaire::{AnswersMap, Question, QuestionError};
use thiserror::Error;

use crate::diagnostics::Diagnostic;
use crate::template::Template;

/// Process exit status for generic failures
pub const EXIT_FAILURE: u8 = 1;

/// Process exit status when unsafe template features were refused
pub const EXIT_UNSAFE: u8 = 4;

/// Partial progress captured when the user interrupts the questionnaire
#[derive(Debug)]
pub struct AnswersInterrupt {
    pub answers: AnswersMap,
    pub last_question: Question,
    pub template: Template,
}

/// Errors that can occur while generating or updating a project
#[derive(Debug, Error)]
pub enum KrupyError {
    #[error("{0}")]
    UserMessage(String),

    #[error("This template requires krupy {required}, but this is version {running}")]
    UnsupportedVersion { required: String, running: String },

    #[error("Found more than one configuration file in {}: {}", dir.display(), names.join(", "))]
    MultipleConfigFiles { dir: PathBuf, names: Vec<String> },

    #[error("Invalid configuration file {}: {message}", path.display())]
    InvalidConfigFile { path: PathBuf, message: String },

    #[error(transparent)]
    Question(#[from] QuestionError),

    #[error(
        "Template uses potentially unsafe features: {}. If you trust this template, pass --trust",
        features.join(", ")
    )]
    UnsafeTemplate { features: Vec<String> },

    #[error("Extension not found: {0}")]
    ExtensionNotFound(String),

    #[error("Interrupted while asking \"{}\"", .0.last_question.var_name)]
    Interrupted(Box<AnswersInterrupt>),

    #[error("Task \"{command}\" failed with {status}")]
    TaskFailed { command: String, status: String },

    #[error("Git command failed: {0}")]
    Vcs(String),

    #[error("Path must be relative to the destination: {}", .0.display())]
    PathNotRelative(PathBuf),

    #[error("Failed to render {what}: {message}")]
    Render { what: String, message: String },

    #[error("{0}")]
    Warning(Diagnostic),

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl KrupyError {
    /// Wrap an I/O error with the path it happened on
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Exit status the binary reports for this error
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::UnsafeTemplate { .. } => EXIT_UNSAFE,
            _ => EXIT_FAILURE,
        }
    }
}

/// Result alias used across krupy
pub type Result<T> = std::result::Result<T, KrupyError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::WarningKind;

    #[test]
    fn test_exit_codes() {
        let unsafe_err = KrupyError::UnsafeTemplate {
            features: vec!["tasks".into()],
        };
        assert_eq!(unsafe_err.exit_code(), EXIT_UNSAFE);
        assert_eq!(KrupyError::UserMessage("nope".into()).exit_code(), EXIT_FAILURE);
        assert_ne!(EXIT_UNSAFE, EXIT_FAILURE);
    }

    #[test]
    fn test_messages() {
        let err = KrupyError::UnsupportedVersion {
            required: "10.5.1".into(),
            running: "0.0.0-a0".into(),
        };
        assert!(err.to_string().contains("10.5.1"));

        let err = KrupyError::Warning(Diagnostic::new(WarningKind::DirtyLocal, "uncommitted changes"));
        assert!(err.to_string().contains("uncommitted changes"));

        let err = KrupyError::TaskFailed {
            command: "false".into(),
            status: "exit status: 1".into(),
        };
        assert_eq!(err.to_string(), "Task \"false\" failed with exit status: 1");
    }
}
