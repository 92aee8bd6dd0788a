//! Question model
//!
//! A [`Question`] is built once from its declarative definition and never
//! changes. Its templated fields are rendered on demand against the answers
//! gathered so far, passed in through a [`Scope`].

use serde_json::{Map, Value};
use tracing::debug;

use crate::answers::{AnswersMap, BUILTIN_KEYS};
use crate::error::QuestionError;
use crate::prompt::{
    Choice, DEFAULT_MARK, DisplaySettings, Message, PromptDefault, PromptDescriptor, PromptKind, SECRET_MARK,
};
use crate::render::{Engine, Templated};
use crate::types::{QuestionType, parse_bool_literal};

/// Rendering engine plus the answer store questions render against
#[derive(Debug, Clone, Copy)]
pub struct Scope<'a> {
    pub engine: &'a Engine,
    pub answers: &'a AnswersMap,
}

impl<'a> Scope<'a> {
    pub fn new(engine: &'a Engine, answers: &'a AnswersMap) -> Self {
        Self { engine, answers }
    }

    /// Combined answers, optionally with one extra binding on top
    fn context(&self, extra: Option<(&str, &Value)>) -> Value {
        let mut combined = self.answers.combined();
        if let Some((key, value)) = extra {
            combined.insert(key.to_string(), value.clone());
        }
        Value::Object(combined)
    }
}

/// Declared choice before rendering
#[derive(Debug, Clone, PartialEq)]
pub struct ChoiceSpec {
    pub name: Templated,
    pub value: Templated,
    /// Renders a non-empty reason when the choice must not be picked
    pub disabled: Option<Templated>,
}

/// One question asked to the user
#[derive(Debug, Clone, PartialEq)]
pub struct Question {
    pub var_name: String,
    pub type_name: Templated,
    /// `None` when no default was declared
    pub default: Option<Templated>,
    pub choices: Vec<ChoiceSpec>,
    pub help: Option<Templated>,
    /// `None` means multiline only for json and yaml questions
    pub multiline: Option<Templated>,
    pub placeholder: Option<Templated>,
    pub secret: bool,
    pub validator: Option<Templated>,
    pub when: Templated,
    pub multiselect: bool,
    pub qmark: Option<Templated>,
}

fn invalid(var_name: &str, reason: impl Into<String>) -> QuestionError {
    QuestionError::InvalidQuestion {
        var_name: var_name.to_string(),
        reason: reason.into(),
    }
}

fn templated_field(spec: &Map<String, Value>, key: &str) -> Option<Templated> {
    spec.get(key).filter(|v| !v.is_null()).cloned().map(Templated::new)
}

fn flag_field(var_name: &str, spec: &Map<String, Value>, key: &str) -> Result<bool, QuestionError> {
    match spec.get(key) {
        None | Some(Value::Null) => Ok(false),
        Some(Value::Bool(b)) => Ok(*b),
        Some(other) => Err(invalid(var_name, format!("\"{}\" must be a boolean, got {}", key, other))),
    }
}

fn parse_choice_value(var_name: &str, name: Value, value: &Value) -> Result<ChoiceSpec, QuestionError> {
    let Value::Object(extended) = value else {
        return Ok(ChoiceSpec {
            name: Templated::new(name),
            value: Templated::new(value.clone()),
            disabled: None,
        });
    };
    let inner = extended
        .get("value")
        .ok_or_else(|| invalid(var_name, "property 'value' is required in extended choices"))?;
    let disabled = match extended.get("validator") {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(Templated::new(Value::String(s.clone()))),
        Some(_) => return Err(invalid(var_name, "property 'validator' of a choice must be a string")),
    };
    Ok(ChoiceSpec {
        name: Templated::new(name),
        value: Templated::new(inner.clone()),
        disabled,
    })
}

fn parse_choices(var_name: &str, raw: Option<&Value>) -> Result<Vec<ChoiceSpec>, QuestionError> {
    match raw {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| match item {
                Value::Array(pair) if pair.len() == 2 => parse_choice_value(var_name, pair[0].clone(), &pair[1]),
                scalar => Ok(ChoiceSpec {
                    name: Templated::new(scalar.clone()),
                    value: Templated::new(scalar.clone()),
                    disabled: None,
                }),
            })
            .collect(),
        Some(Value::Object(entries)) => entries
            .iter()
            .map(|(name, value)| parse_choice_value(var_name, Value::String(name.clone()), value))
            .collect(),
        Some(other) => Err(invalid(var_name, format!("choices must be a list or a mapping, got {}", other))),
    }
}

impl Question {
    /// Build a question from its definition in the template configuration
    ///
    /// A definition that is not a mapping is shorthand for `{default: <value>}`.
    /// `secret` forces the question secret on top of its own `secret` key.
    pub fn from_config(var_name: &str, spec: &Value, secret: bool) -> Result<Self, QuestionError> {
        debug!(%var_name, "Question::from_config: called");
        if BUILTIN_KEYS.contains(&var_name) {
            return Err(invalid(var_name, "name is reserved for a built-in value"));
        }

        let spec = match spec {
            Value::Object(map) => map.clone(),
            other => {
                let mut map = Map::new();
                map.insert("default".to_string(), other.clone());
                map
            }
        };

        let default = spec.get("default").cloned().map(Templated::new);
        let type_name = match spec.get("type") {
            Some(Value::String(s)) if !s.trim().is_empty() => Templated::from(s.as_str()),
            None | Some(Value::Null) | Some(Value::String(_)) => {
                let inferred = QuestionType::infer(default.as_ref().map(Templated::raw));
                debug!(%var_name, %inferred, "Question::from_config: inferred type");
                Templated::from(inferred.name())
            }
            Some(other) => return Err(invalid(var_name, format!("type must be a string, got {}", other))),
        };

        let secret = secret || flag_field(var_name, &spec, "secret")?;
        if secret && default.is_none() {
            return Err(invalid(var_name, "secret question requires a default value"));
        }

        let choices = parse_choices(var_name, spec.get("choices"))?;
        let multiselect = flag_field(var_name, &spec, "multiselect")?;
        if multiselect && choices.is_empty() {
            return Err(invalid(var_name, "multiselect requires choices"));
        }

        let validator = match spec.get("validator") {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(Templated::from(s.as_str())),
            Some(other) => return Err(invalid(var_name, format!("validator must be a string, got {}", other))),
        };

        Ok(Self {
            var_name: var_name.to_string(),
            type_name,
            default,
            choices,
            help: templated_field(&spec, "help"),
            multiline: templated_field(&spec, "multiline"),
            placeholder: templated_field(&spec, "placeholder"),
            secret,
            validator,
            when: templated_field(&spec, "when").unwrap_or_else(|| Templated::new(Value::Bool(true))),
            multiselect,
            qmark: templated_field(&spec, "qmark"),
        })
    }

    fn render(
        &self,
        scope: &Scope<'_>,
        field: &'static str,
        value: &Templated,
        extra: Option<(&str, &Value)>,
    ) -> Result<Value, QuestionError> {
        value
            .resolve(scope.engine, &scope.context(extra))
            .map_err(|message| QuestionError::Render {
                var_name: self.var_name.clone(),
                field,
                message,
            })
    }

    fn render_text(&self, scope: &Scope<'_>, field: &'static str, value: &Templated) -> Result<String, QuestionError> {
        Ok(match self.render(scope, field, value, None)? {
            Value::String(s) => s,
            Value::Null => String::new(),
            other => other.to_string(),
        })
    }

    /// Render a field that must read as a boolean
    fn render_flag(&self, scope: &Scope<'_>, field: &'static str, value: &Templated) -> Result<bool, QuestionError> {
        match self.render(scope, field, value, None)? {
            Value::Bool(b) => Ok(b),
            Value::String(s) => parse_bool_literal(&s).ok_or_else(|| {
                QuestionError::invalid_type(format!(
                    "Invalid {} value \"{}\" in question \"{}\"",
                    field, s, self.var_name
                ))
            }),
            other => Err(QuestionError::invalid_type(format!(
                "Invalid {} value {} in question \"{}\"",
                field, other, self.var_name
            ))),
        }
    }

    /// Render the type name and check it is supported
    pub fn effective_type(&self, scope: &Scope<'_>) -> Result<QuestionType, QuestionError> {
        let name = self.render_text(scope, "type", &self.type_name)?;
        name.parse().map_err(|_| {
            QuestionError::invalid_type(format!(
                "Unsupported type \"{}\" in question \"{}\"",
                name, self.var_name
            ))
        })
    }

    /// Whether json/yaml-style multiline input is wanted
    pub fn multiline(&self, scope: &Scope<'_>) -> Result<bool, QuestionError> {
        match &self.multiline {
            Some(value) => self.render_flag(scope, "multiline", value),
            None => Ok(self.effective_type(scope)?.is_structured()),
        }
    }

    /// Cast a raw value to the question type, element-wise for multiselect
    pub fn cast_answer(&self, scope: &Scope<'_>, value: &Value) -> Result<Value, QuestionError> {
        let question_type = self.effective_type(scope)?;
        if self.multiselect {
            return match value {
                Value::Array(items) => items
                    .iter()
                    .map(|item| question_type.cast(item))
                    .collect::<Result<Vec<_>, _>>()
                    .map(Value::Array),
                Value::Null => Ok(Value::Array(Vec::new())),
                single => Ok(Value::Array(vec![question_type.cast(single)?])),
            };
        }
        question_type.cast(value)
    }

    /// Default answer, cast to the question type
    ///
    /// Looks at the injected answer, then the previously persisted one, then
    /// the carried-forward default, and finally renders the declared default.
    /// `None` means there is no default at all.
    pub fn effective_default(&self, scope: &Scope<'_>) -> Result<Option<Value>, QuestionError> {
        let answers = scope.answers;
        let raw = answers
            .init
            .get(&self.var_name)
            .or_else(|| answers.last.get(&self.var_name))
            .or_else(|| answers.user_defaults.get(&self.var_name))
            .cloned();
        let raw = match raw {
            Some(value) => value,
            None => match &self.default {
                Some(declared) => self.render(scope, "default", declared, None)?,
                None => return Ok(None),
            },
        };
        self.cast_answer(scope, &raw).map(Some)
    }

    /// Render the declared choices into display name, typed value and disabled reason
    pub fn formatted_choices(&self, scope: &Scope<'_>) -> Result<Vec<Choice>, QuestionError> {
        let question_type = self.effective_type(scope)?;
        self.choices
            .iter()
            .map(|spec| {
                let name = self.render_text(scope, "choices", &spec.name)?;
                let value = self.render(scope, "choices", &spec.value, None)?;
                let value = question_type.cast(&value)?;
                let disabled = match &spec.disabled {
                    Some(reason) => {
                        let reason = self.render_text(scope, "choices", reason)?;
                        let reason = reason.trim();
                        (!reason.is_empty()).then(|| reason.to_string())
                    }
                    None => None,
                };
                Ok(Choice { name, value, disabled })
            })
            .collect()
    }

    /// Render the `when` condition
    pub fn should_ask(&self, scope: &Scope<'_>) -> Result<bool, QuestionError> {
        self.render_flag(scope, "when", &self.when)
    }

    fn check_choice(&self, choices: &[Choice], value: &Value) -> Result<(), QuestionError> {
        let mut disabled_reason = None;
        for choice in choices.iter().filter(|c| &c.value == value) {
            match &choice.disabled {
                None => return Ok(()),
                Some(reason) => {
                    disabled_reason.get_or_insert(reason.clone());
                }
            }
        }
        Err(QuestionError::Invalid(match disabled_reason {
            Some(reason) => format!("Invalid choice: {}", reason),
            None => "Invalid choice".to_string(),
        }))
    }

    /// Check a candidate answer and return it cast to the question type
    ///
    /// Rejections come back as [`QuestionError::Invalid`], which the runner
    /// treats as a reason to ask again. Other errors are configuration faults.
    pub fn validate(&self, scope: &Scope<'_>, candidate: &Value) -> Result<Value, QuestionError> {
        debug!(var_name = %self.var_name, "Question::validate: called");
        let value = match self.cast_answer(scope, candidate) {
            Ok(value) => value,
            Err(QuestionError::InvalidType { message }) => return Err(QuestionError::Invalid(message)),
            Err(e) => return Err(e),
        };

        if !self.choices.is_empty() {
            let choices = self.formatted_choices(scope)?;
            match &value {
                Value::Array(items) if self.multiselect => {
                    for item in items {
                        self.check_choice(&choices, item)?;
                    }
                }
                single => self.check_choice(&choices, single)?,
            }
        }

        if let Some(validator) = &self.validator {
            let message = match self.render(scope, "validator", validator, Some((&self.var_name, &value))) {
                Ok(rendered) => match rendered {
                    Value::String(s) => s,
                    Value::Null => String::new(),
                    other => other.to_string(),
                },
                Err(e) => return Err(QuestionError::Invalid(e.to_string())),
            };
            let message = message.trim();
            if !message.is_empty() {
                debug!(var_name = %self.var_name, %message, "Question::validate: validator rejected answer");
                return Err(QuestionError::Invalid(message.to_string()));
            }
        }

        Ok(value)
    }

    fn mark(&self, scope: &Scope<'_>) -> Result<String, QuestionError> {
        if let Some(qmark) = &self.qmark {
            return self.render_text(scope, "qmark", qmark);
        }
        Ok(if self.secret { SECRET_MARK } else { DEFAULT_MARK }.to_string())
    }

    /// Build the descriptor handed to the prompt collaborator
    ///
    /// `position` is the 1-based index of the question and the total count.
    pub fn prompt_descriptor(
        &self,
        scope: &Scope<'_>,
        display: &DisplaySettings,
        position: Option<(usize, usize)>,
    ) -> Result<PromptDescriptor, QuestionError> {
        debug!(var_name = %self.var_name, "Question::prompt_descriptor: called");
        let question_type = self.effective_type(scope)?;
        let multiline = self.multiline(scope)?;
        let default = self.effective_default(scope)?;
        let choices = self.formatted_choices(scope)?;

        let kind = if !choices.is_empty() {
            if self.multiselect {
                PromptKind::Checkbox
            } else {
                PromptKind::Select
            }
        } else if question_type == QuestionType::Bool {
            PromptKind::Confirm
        } else if self.secret {
            PromptKind::Password
        } else {
            PromptKind::Input
        };

        let prompt_default = match &default {
            None if kind == PromptKind::Confirm => Some(PromptDefault::Bool(false)),
            None => None,
            Some(value) if !choices.is_empty() => match value {
                Value::Array(selected) if self.multiselect => Some(PromptDefault::Choices(
                    choices
                        .iter()
                        .enumerate()
                        .filter(|(_, c)| selected.contains(&c.value))
                        .map(|(i, _)| i)
                        .collect(),
                )),
                single => choices.iter().position(|c| &c.value == single).map(PromptDefault::Choice),
            },
            Some(Value::Bool(b)) if question_type == QuestionType::Bool => Some(PromptDefault::Bool(*b)),
            Some(Value::Null) => Some(PromptDefault::Text(String::new())),
            Some(value) => Some(PromptDefault::Text(question_type.redisplay(value, multiline))),
        };

        let text = match &self.help {
            Some(help) => self.render_text(scope, "help", help)?,
            None => self.var_name.clone(),
        };
        let default_hint = match &default {
            Some(value) if display.show_default && !value.is_null() => {
                Some(question_type.redisplay(value, false))
            }
            _ => None,
        };
        let message = Message {
            text,
            type_hint: display.show_type.then(|| question_type.name().to_string()),
            default_hint,
        };

        let mark = if display.show_mark { Some(self.mark(scope)?) } else { None };
        let placeholder = match &self.placeholder {
            Some(p) => Some(self.render_text(scope, "placeholder", p)?).filter(|s| !s.is_empty()),
            None => None,
        };
        let syntax = match (kind, question_type) {
            (PromptKind::Input, QuestionType::Json) => Some("json"),
            (PromptKind::Input, QuestionType::Yaml) => Some("yaml"),
            _ => None,
        };

        Ok(PromptDescriptor {
            name: self.var_name.clone(),
            kind,
            message,
            mark,
            count: if display.show_count {
                position.map(|(i, n)| format!("{}/{}", i, n))
            } else {
                None
            },
            default: prompt_default,
            choices,
            multiline,
            placeholder,
            question_type,
            syntax,
        })
    }
}
