//! Questionnaire runner
//!
//! Walks the question list in declaration order against one answer store.
//! Later questions can read earlier answers, so each question is rendered
//! only after everything before it has been committed.

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info};

use crate::answers::AnswersMap;
use crate::error::{PromptError, QuestionError};
use crate::prompt::{DisplaySettings, Prompter};
use crate::question::{Question, Scope};
use crate::render::Engine;

/// How a questionnaire run treats pre-existing answers
#[derive(Debug, Clone, Copy, Default)]
pub struct RunnerOptions {
    /// Never prompt; take every question's default
    pub defaults: bool,
    /// Do not ask again what the previous answers file already answered
    pub skip_answered: bool,
    pub display: DisplaySettings,
}

/// State captured when the user interrupts the questionnaire
#[derive(Debug, Clone)]
pub struct Interrupt {
    /// Answers committed before the interruption
    pub answers: AnswersMap,
    /// Question being asked when the user interrupted
    pub question: Question,
}

/// Why a questionnaire run stopped early
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Question(#[from] QuestionError),

    #[error("Interrupted while asking \"{}\"", .0.question.var_name)]
    Interrupted(Box<Interrupt>),

    #[error(transparent)]
    Prompt(PromptError),
}

/// Ordered set of questions bound to one rendering engine
pub struct Questionnaire<'a> {
    questions: &'a [Question],
    engine: &'a Engine,
    options: RunnerOptions,
}

impl<'a> Questionnaire<'a> {
    pub fn new(questions: &'a [Question], engine: &'a Engine, options: RunnerOptions) -> Self {
        Self {
            questions,
            engine,
            options,
        }
    }

    /// Fill `answers` by asking, or not asking, every question in order
    pub fn run(&self, answers: &mut AnswersMap, prompter: &mut dyn Prompter) -> Result<(), RunError> {
        info!(questions = self.questions.len(), defaults = self.options.defaults, "Questionnaire::run: started");
        let total = self.questions.len();
        for (index, question) in self.questions.iter().enumerate() {
            let var_name = question.var_name.as_str();
            if question.secret {
                answers.hide(var_name);
            }

            let value = self.answer_one(question, answers, prompter, (index + 1, total))?;
            match value {
                Some(value) => answers.commit(var_name, value),
                None => {
                    debug!(%var_name, "Questionnaire::run: skipped by when condition");
                    answers.hide(var_name);
                }
            }
        }
        info!("Questionnaire::run: completed");
        Ok(())
    }

    /// Resolve one question; `None` means it was skipped
    fn answer_one(
        &self,
        question: &Question,
        answers: &AnswersMap,
        prompter: &mut dyn Prompter,
        position: (usize, usize),
    ) -> Result<Option<Value>, RunError> {
        let scope = Scope::new(self.engine, answers);
        let var_name = question.var_name.as_str();

        if !question.should_ask(&scope)? {
            return Ok(None);
        }

        if let Some(injected) = answers.init.get(var_name) {
            debug!(%var_name, "Questionnaire::answer_one: using injected answer");
            return match question.validate(&scope, injected) {
                Ok(value) => Ok(Some(value)),
                Err(QuestionError::Invalid(message)) => Err(QuestionError::InvalidAnswer {
                    var_name: var_name.to_string(),
                    message,
                }
                .into()),
                Err(e) => Err(e.into()),
            };
        }

        if self.options.skip_answered {
            if let Some(previous) = answers.last.get(var_name) {
                debug!(%var_name, "Questionnaire::answer_one: already answered");
                return Ok(Some(question.cast_answer(&scope, previous)?));
            }
        }

        if self.options.defaults {
            return match question.effective_default(&scope)? {
                Some(value) => Ok(Some(value)),
                None if question.effective_type(&scope)?.is_structured() => Ok(Some(Value::Null)),
                None => Err(QuestionError::Required {
                    var_name: var_name.to_string(),
                    reason: "no default value and prompting is disabled".to_string(),
                }
                .into()),
            };
        }

        let descriptor = question.prompt_descriptor(&scope, &self.options.display, Some(position))?;
        loop {
            let raw = match prompter.ask(&descriptor) {
                Ok(raw) => raw,
                Err(PromptError::Interrupted) => {
                    info!(%var_name, "Questionnaire::answer_one: interrupted");
                    return Err(RunError::Interrupted(Box::new(Interrupt {
                        answers: answers.clone(),
                        question: question.clone(),
                    })));
                }
                Err(e) => return Err(RunError::Prompt(e)),
            };
            match question.validate(&scope, &raw) {
                Ok(value) => return Ok(Some(value)),
                Err(e) if e.is_recoverable() => {
                    debug!(%var_name, error = %e, "Questionnaire::answer_one: answer rejected");
                    prompter.reject(&descriptor, &e.to_string());
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}
