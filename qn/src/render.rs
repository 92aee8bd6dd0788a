//! Template rendering
//!
//! Every templated configuration field (defaults, conditions, help texts,
//! choices, validators, task lines, file names and contents) goes through one
//! [`Engine`]. Fields are kept as [`Templated`] raw values and only resolved on
//! demand, because later answers can depend on earlier ones.

use handlebars::{Handlebars, handlebars_helper};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

handlebars_helper!(to_json: |v: Json| serde_json::to_string_pretty(v).unwrap_or_default());
handlebars_helper!(to_yaml: |v: Json| serde_yaml::to_string(v).unwrap_or_default().trim_end().to_string());

/// Shared Handlebars environment
pub struct Engine {
    hbs: Handlebars<'static>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine").finish_non_exhaustive()
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    /// Create an engine that renders plain text (no HTML escaping)
    pub fn new() -> Self {
        let mut hbs = Handlebars::new();
        hbs.register_escape_fn(handlebars::no_escape);
        hbs.register_helper("to_json", Box::new(to_json));
        hbs.register_helper("to_yaml", Box::new(to_yaml));
        Self { hbs }
    }

    /// Render a template string against a data context
    pub fn render<T: Serialize>(&self, template: &str, data: &T) -> Result<String, String> {
        if !template.contains("{{") {
            return Ok(template.to_string());
        }
        debug!(template_len = template.len(), "Engine::render: rendering template");
        self.hbs.render_template(template, data).map_err(|e| e.to_string())
    }
}

/// A raw configuration value that may hold a template expression
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Templated(Value);

impl Templated {
    pub fn new(raw: Value) -> Self {
        Self(raw)
    }

    /// The unrendered value
    pub fn raw(&self) -> &Value {
        &self.0
    }

    /// Whether the raw value is empty or null
    pub fn is_empty(&self) -> bool {
        match &self.0 {
            Value::Null => true,
            Value::String(s) => s.is_empty(),
            _ => false,
        }
    }

    /// Render strings through the engine; other values are returned as is
    pub fn resolve(&self, engine: &Engine, data: &Value) -> Result<Value, String> {
        match &self.0 {
            Value::String(s) => engine.render(s, data).map(Value::String),
            other => Ok(other.clone()),
        }
    }

    /// Render and flatten the result into text
    pub fn resolve_string(&self, engine: &Engine, data: &Value) -> Result<String, String> {
        Ok(match self.resolve(engine, data)? {
            Value::String(s) => s,
            Value::Null => String::new(),
            other => other.to_string(),
        })
    }
}

impl From<&str> for Templated {
    fn from(s: &str) -> Self {
        Self(Value::String(s.to_string()))
    }
}

impl From<Value> for Templated {
    fn from(v: Value) -> Self {
        Self(v)
    }
}
