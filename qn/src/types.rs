//! Question types
//!
//! A closed set of answer types. Each variant owns one cast function (raw
//! answer to typed value) and one redisplay function (typed value back to the
//! text a prompt shows), both dispatched from [`QuestionType::cast`] and
//! [`QuestionType::redisplay`].

use std::fmt;
use std::str::FromStr;

use serde_json::{Number, Value};

use crate::error::QuestionError;

/// Supported answer types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QuestionType {
    Bool,
    Int,
    Float,
    Str,
    Json,
    Yaml,
}

impl QuestionType {
    pub const ALL: [QuestionType; 6] = [
        QuestionType::Bool,
        QuestionType::Int,
        QuestionType::Float,
        QuestionType::Str,
        QuestionType::Json,
        QuestionType::Yaml,
    ];

    /// Name used in configuration files
    pub fn name(&self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Int => "int",
            Self::Float => "float",
            Self::Str => "str",
            Self::Json => "json",
            Self::Yaml => "yaml",
        }
    }

    /// Type implied by the runtime type of a declared default
    ///
    /// Anything that is not a scalar, including a missing default, is `yaml`.
    pub fn infer(default: Option<&Value>) -> Self {
        match default {
            Some(Value::Bool(_)) => Self::Bool,
            Some(Value::Number(n)) if n.is_i64() || n.is_u64() => Self::Int,
            Some(Value::Number(_)) => Self::Float,
            Some(Value::String(_)) => Self::Str,
            _ => Self::Yaml,
        }
    }

    /// Whether this type accepts already-structured values verbatim
    pub fn is_structured(&self) -> bool {
        matches!(self, Self::Json | Self::Yaml)
    }

    /// Cast a raw answer into this type
    pub fn cast(&self, value: &Value) -> Result<Value, QuestionError> {
        if value.is_null() && !self.is_structured() {
            return Err(QuestionError::invalid_type(format!(
                "Invalid answer null for a question of type \"{}\"",
                self.name()
            )));
        }
        match self {
            Self::Bool => cast_bool(value),
            Self::Int => cast_int(value),
            Self::Float => cast_float(value),
            Self::Str => cast_str(value),
            Self::Json => cast_json(value),
            Self::Yaml => cast_yaml(value),
        }
    }

    /// Text a prompt shows for a typed value
    pub fn redisplay(&self, value: &Value, multiline: bool) -> String {
        match self {
            Self::Bool => display_bool(value),
            Self::Int | Self::Float | Self::Str => display_scalar(value),
            Self::Json => display_json(value, multiline),
            Self::Yaml => display_yaml(value, multiline),
        }
    }
}

impl fmt::Display for QuestionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for QuestionType {
    type Err = QuestionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.name() == s.trim())
            .ok_or_else(|| QuestionError::invalid_type(format!("Unsupported type \"{}\"", s)))
    }
}

/// Parse common configuration spellings of a boolean
///
/// Accepts true/false, yes/no, on/off, y/n, t/f, 1/0 in any case. Empty,
/// `~`, `null` and `none` read as false. Anything else is `None`.
pub fn parse_bool_literal(s: &str) -> Option<bool> {
    match s.trim().to_lowercase().as_str() {
        "true" | "yes" | "on" | "y" | "t" | "1" => Some(true),
        "false" | "no" | "off" | "n" | "f" | "0" | "" | "~" | "null" | "none" => Some(false),
        _ => None,
    }
}

fn type_error(value: &Value, target: &str) -> QuestionError {
    QuestionError::invalid_type(format!("Invalid answer {} for a question of type \"{}\"", value, target))
}

fn cast_bool(value: &Value) -> Result<Value, QuestionError> {
    match value {
        Value::Bool(b) => Ok(Value::Bool(*b)),
        Value::Number(n) => Ok(Value::Bool(n.as_f64().is_some_and(|f| f != 0.0))),
        Value::String(s) => parse_bool_literal(s)
            .map(Value::Bool)
            .ok_or_else(|| type_error(value, "bool")),
        _ => Err(type_error(value, "bool")),
    }
}

fn cast_int(value: &Value) -> Result<Value, QuestionError> {
    match value {
        Value::Bool(b) => Ok(Value::from(*b as i64)),
        Value::Number(n) if n.is_i64() || n.is_u64() => Ok(Value::Number(n.clone())),
        Value::Number(n) => n
            .as_f64()
            .map(|f| Value::from(f.trunc() as i64))
            .ok_or_else(|| type_error(value, "int")),
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map(Value::from)
            .map_err(|_| type_error(value, "int")),
        _ => Err(type_error(value, "int")),
    }
}

fn cast_float(value: &Value) -> Result<Value, QuestionError> {
    let parsed = match value {
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed
        .and_then(Number::from_f64)
        .map(Value::Number)
        .ok_or_else(|| type_error(value, "float"))
}

fn cast_str(value: &Value) -> Result<Value, QuestionError> {
    match value {
        Value::String(s) => Ok(Value::String(s.clone())),
        Value::Bool(b) => Ok(Value::String(b.to_string())),
        Value::Number(n) => Ok(Value::String(n.to_string())),
        _ => Err(type_error(value, "str")),
    }
}

fn cast_json(value: &Value) -> Result<Value, QuestionError> {
    match value {
        Value::String(s) => serde_json::from_str(s).map_err(|e| QuestionError::invalid_type(e.to_string())),
        other => Ok(other.clone()),
    }
}

fn cast_yaml(value: &Value) -> Result<Value, QuestionError> {
    match value {
        Value::String(s) => serde_yaml::from_str(s).map_err(|e| QuestionError::invalid_type(e.to_string())),
        other => Ok(other.clone()),
    }
}

fn display_bool(value: &Value) -> String {
    match value {
        Value::Bool(b) => b.to_string(),
        other => display_scalar(other),
    }
}

fn display_scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn display_json(value: &Value, multiline: bool) -> String {
    let dumped = if multiline {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    };
    dumped.unwrap_or_default()
}

// Flow style when single-line; YAML is a superset of JSON
fn display_yaml(value: &Value, multiline: bool) -> String {
    if !multiline {
        return serde_json::to_string(value).unwrap_or_default();
    }
    serde_yaml::to_string(value).unwrap_or_default().trim_end().to_string()
}
