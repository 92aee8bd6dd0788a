//! Questionnaire - typed, templated questions over a layered answer store
//!
//! # Modules
//!
//! - [`answers`] - Answer store with prioritized layers and hidden keys
//! - [`render`] - Handlebars engine and lazily rendered values
//! - [`types`] - Closed set of answer types with cast and redisplay
//! - [`question`] - Declarative question model
//! - [`prompt`] - Prompt descriptors and the prompt collaborator trait
//! - [`runner`] - Sequential questionnaire runner

pub mod answers;
pub mod error;
pub mod prompt;
pub mod question;
pub mod render;
pub mod runner;
pub mod types;

pub use answers::{AnswerMap, AnswersMap, BUILTIN_KEYS, COMMIT_KEY, Layer, SRC_PATH_KEY};
pub use error::{PromptError, QuestionError};
pub use prompt::{
    Choice, DisplaySettings, Message, NonInteractive, PromptDefault, PromptDescriptor, PromptKind, Prompter,
};
pub use question::{ChoiceSpec, Question, Scope};
pub use render::{Engine, Templated};
pub use runner::{Interrupt, Questionnaire, RunError, RunnerOptions};
pub use types::{QuestionType, parse_bool_literal};
