//! Layered answer store
//!
//! Answers come from several provenances. Lookups walk the layers from the
//! highest priority to the lowest and return the first hit:
//!
//! 1. `user` - entered interactively
//! 2. `init` - injected at invocation (`--data`)
//! 3. `metadata` - template identity (`_commit`, `_src_path`), read-only
//! 4. `last` - loaded from a previous run's answers file
//! 5. `user_defaults` - carried-forward defaults
//! 6. built-in computed values (`now`, `make_secret`)

use std::collections::BTreeSet;

use rand::Rng;
use serde_json::{Map, Value};
use tracing::debug;

/// Answer values keyed by variable name
pub type AnswerMap = Map<String, Value>;

/// Names of the built-in computed values
pub const BUILTIN_KEYS: &[&str] = &["now", "make_secret"];

/// Metadata key holding the last applied template commit
pub const COMMIT_KEY: &str = "_commit";

/// Metadata key holding the template source location
pub const SRC_PATH_KEY: &str = "_src_path";

/// One named source of answers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layer {
    User,
    Init,
    Metadata,
    Last,
    UserDefaults,
    Builtin,
}

impl Layer {
    /// All layers, highest priority first
    pub const PRIORITY: [Layer; 6] = [
        Layer::User,
        Layer::Init,
        Layer::Metadata,
        Layer::Last,
        Layer::UserDefaults,
        Layer::Builtin,
    ];
}

/// Compute a built-in value by name
fn builtin(key: &str) -> Option<Value> {
    match key {
        "now" => Some(Value::String(chrono::Utc::now().format("%Y-%m-%d %H:%M:%S").to_string())),
        "make_secret" => {
            let mut bytes = [0u8; 48];
            rand::rng().fill(&mut bytes[..]);
            Some(Value::String(bytes.iter().map(|b| format!("{:02x}", b)).collect()))
        }
        _ => None,
    }
}

/// Answers gathered from every source for one run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnswersMap {
    pub user: AnswerMap,
    pub init: AnswerMap,
    pub metadata: AnswerMap,
    pub last: AnswerMap,
    pub user_defaults: AnswerMap,
    hidden: BTreeSet<String>,
}

impl AnswersMap {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the invocation-injected layer
    pub fn with_init(mut self, init: AnswerMap) -> Self {
        self.init = init;
        self
    }

    /// Set the template metadata layer
    pub fn with_metadata(mut self, metadata: AnswerMap) -> Self {
        self.metadata = metadata;
        self
    }

    /// Set the previously persisted layer
    pub fn with_last(mut self, last: AnswerMap) -> Self {
        self.last = last;
        self
    }

    /// Set the carried-forward defaults layer
    pub fn with_user_defaults(mut self, user_defaults: AnswerMap) -> Self {
        self.user_defaults = user_defaults;
        self
    }

    fn layer(&self, layer: Layer) -> Option<&AnswerMap> {
        match layer {
            Layer::User => Some(&self.user),
            Layer::Init => Some(&self.init),
            Layer::Metadata => Some(&self.metadata),
            Layer::Last => Some(&self.last),
            Layer::UserDefaults => Some(&self.user_defaults),
            Layer::Builtin => None,
        }
    }

    /// Resolve a key and report which layer answered it
    pub fn resolve_with_layer(&self, key: &str) -> Option<(Layer, Value)> {
        for layer in Layer::PRIORITY {
            let hit = match self.layer(layer) {
                Some(map) => map.get(key).cloned(),
                None => builtin(key),
            };
            if let Some(value) = hit {
                return Some((layer, value));
            }
        }
        None
    }

    /// Resolve a key through the layers, highest priority first
    pub fn resolve(&self, key: &str) -> Option<Value> {
        self.resolve_with_layer(key).map(|(_, value)| value)
    }

    /// Record an interactively entered answer
    pub fn commit(&mut self, key: impl Into<String>, value: Value) {
        let key = key.into();
        debug!(%key, "AnswersMap::commit: called");
        self.user.insert(key, value);
    }

    /// Exclude a key from persistence; it still resolves
    pub fn hide(&mut self, key: impl Into<String>) {
        self.hidden.insert(key.into());
    }

    /// Whether a key was hidden during this run
    pub fn is_hidden(&self, key: &str) -> bool {
        self.hidden.contains(key)
    }

    /// Every key merged by priority, built-in computed values included
    pub fn combined(&self) -> AnswerMap {
        let mut merged = AnswerMap::new();
        for key in BUILTIN_KEYS {
            if let Some(value) = builtin(key) {
                merged.insert((*key).to_string(), value);
            }
        }
        for layer in Layer::PRIORITY.iter().rev() {
            if let Some(map) = self.layer(*layer) {
                merged.extend(map.iter().map(|(k, v)| (k.clone(), v.clone())));
            }
        }
        merged
    }

    /// Merged answers to write into the answers file
    ///
    /// Hidden keys and the built-in computed layer are left out.
    pub fn persist_view(&self) -> AnswerMap {
        let mut merged = AnswerMap::new();
        for layer in Layer::PRIORITY.iter().rev() {
            if let Some(map) = self.layer(*layer) {
                merged.extend(
                    map.iter()
                        .filter(|(k, _)| !self.is_hidden(k))
                        .map(|(k, v)| (k.clone(), v.clone())),
                );
            }
        }
        merged
    }

    /// Commit the project was last updated from, as recorded in the answers file
    pub fn old_commit(&self) -> Option<&str> {
        self.last.get(COMMIT_KEY).and_then(Value::as_str)
    }
}
