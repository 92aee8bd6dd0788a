//! Question error types

use thiserror::Error;

/// Errors raised while resolving, validating or asking questions
#[derive(Debug, Error)]
pub enum QuestionError {
    /// Value cannot be cast to the question type, or the type itself is unsupported
    #[error("{message}")]
    InvalidType { message: String },

    /// Declarative question definition is malformed
    #[error("Invalid question \"{var_name}\": {reason}")]
    InvalidQuestion { var_name: String, reason: String },

    /// A templated field failed to render
    #[error("Failed to render {field} of question \"{var_name}\": {message}")]
    Render {
        var_name: String,
        field: &'static str,
        message: String,
    },

    /// User input rejected by type, choice set or validator; the question can be asked again
    #[error("{0}")]
    Invalid(String),

    /// A pre-supplied answer failed validation, so there is no one to ask again
    #[error("Invalid answer for question \"{var_name}\": {message}")]
    InvalidAnswer { var_name: String, message: String },

    /// No answer could be obtained for a question that needs one
    #[error("Question \"{var_name}\" requires an answer: {reason}")]
    Required { var_name: String, reason: String },
}

/// Errors returned by a prompt collaborator
#[derive(Debug, Error)]
pub enum PromptError {
    /// The user cancelled the prompt (Ctrl-C, end of input)
    #[error("Interrupted by user")]
    Interrupted,

    /// There is no interactive input to ask
    #[error("No interactive prompt available")]
    Unavailable,

    #[error("Prompt failed: {0}")]
    Io(#[from] std::io::Error),
}

impl QuestionError {
    /// Build an `InvalidType` error from any message
    pub fn invalid_type(message: impl Into<String>) -> Self {
        Self::InvalidType {
            message: message.into(),
        }
    }

    /// Whether the runner may re-prompt after this error
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Invalid(_))
    }
}
