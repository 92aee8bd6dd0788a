//! Prompt descriptors and the interactive prompt collaborator
//!
//! A [`PromptDescriptor`] is plain data: everything a terminal widget needs to
//! show one question. Validation stays with the questionnaire runner, which
//! re-asks through [`Prompter::reject`] when an answer does not pass.

use std::fmt;

use serde::Deserialize;
use serde_json::Value;

use crate::error::PromptError;
use crate::types::QuestionType;

/// Mark shown in front of questions
pub const DEFAULT_MARK: &str = "?";

/// Mark shown in front of secret questions
pub const SECRET_MARK: &str = "🕵️";

/// Which optional decorations a descriptor carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DisplaySettings {
    /// Append the answer type, e.g. `(int)`
    #[serde(rename = "type")]
    pub show_type: bool,
    /// Append the default value, e.g. `[8080]`
    #[serde(rename = "default")]
    pub show_default: bool,
    /// Show the question mark glyph
    #[serde(rename = "mark")]
    pub show_mark: bool,
    /// Show the question position, e.g. `2/5`
    #[serde(rename = "count")]
    pub show_count: bool,
}

impl Default for DisplaySettings {
    fn default() -> Self {
        Self {
            show_type: false,
            show_default: false,
            show_mark: true,
            show_count: false,
        }
    }
}

/// Widget the prompt collaborator should use
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptKind {
    /// Free text
    Input,
    /// Masked free text
    Password,
    /// Yes/no
    Confirm,
    /// Pick one choice
    Select,
    /// Pick any number of choices
    Checkbox,
}

/// One rendered choice
#[derive(Debug, Clone, PartialEq)]
pub struct Choice {
    /// Display name, always text
    pub name: String,
    /// Typed value committed when picked
    pub value: Value,
    /// Reason the choice cannot be picked, if any
    pub disabled: Option<String>,
}

impl Choice {
    pub fn is_enabled(&self) -> bool {
        self.disabled.is_none()
    }
}

/// Default value in the shape the prompt collaborator expects
#[derive(Debug, Clone, PartialEq)]
pub enum PromptDefault {
    Bool(bool),
    Text(String),
    /// Index into [`PromptDescriptor::choices`]
    Choice(usize),
    /// Indices into [`PromptDescriptor::choices`]
    Choices(Vec<usize>),
}

/// Question text with optional annotations
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub text: String,
    pub type_hint: Option<String>,
    pub default_hint: Option<String>,
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.text)?;
        if let Some(t) = &self.type_hint {
            write!(f, " ({})", t)?;
        }
        if let Some(d) = &self.default_hint {
            write!(f, " [{}]", d)?;
        }
        Ok(())
    }
}

/// Everything needed to render one question
#[derive(Debug, Clone, PartialEq)]
pub struct PromptDescriptor {
    pub name: String,
    pub kind: PromptKind,
    pub message: Message,
    pub mark: Option<String>,
    /// Position such as `2/5`
    pub count: Option<String>,
    pub default: Option<PromptDefault>,
    pub choices: Vec<Choice>,
    pub multiline: bool,
    pub placeholder: Option<String>,
    pub question_type: QuestionType,
    /// Syntax hint for highlighting structured input
    pub syntax: Option<&'static str>,
}

/// Renders a question and returns the raw answer
///
/// Implementations block on user input. Returning
/// [`PromptError::Interrupted`] aborts the questionnaire.
pub trait Prompter {
    /// Ask one question
    ///
    /// Input and password prompts return a string, confirm prompts a bool,
    /// select prompts the picked choice value and checkbox prompts an array
    /// of choice values.
    fn ask(&mut self, descriptor: &PromptDescriptor) -> Result<Value, PromptError>;

    /// Tell the user the last answer was rejected; the question is asked again
    fn reject(&mut self, descriptor: &PromptDescriptor, message: &str) {
        let _ = (descriptor, message);
    }

    /// Ask a yes/no question outside the questionnaire
    fn confirm(&mut self, message: &str, default: bool) -> Result<bool, PromptError>;
}

/// Prompter for runs without a terminal
#[derive(Debug, Default, Clone, Copy)]
pub struct NonInteractive;

impl Prompter for NonInteractive {
    fn ask(&mut self, _descriptor: &PromptDescriptor) -> Result<Value, PromptError> {
        Err(PromptError::Unavailable)
    }

    fn confirm(&mut self, _message: &str, _default: bool) -> Result<bool, PromptError> {
        Err(PromptError::Unavailable)
    }
}
