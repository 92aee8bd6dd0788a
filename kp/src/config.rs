//! User settings loading

use std::fs;
use std::path::{Path, PathBuf};

use eyre::{Context, Result};
use questionnaire::AnswerMap;
use serde::Deserialize;

/// Environment variable overriding the settings file location
pub const SETTINGS_PATH_ENV: &str = "KRUPY_SETTINGS_PATH";

/// Per-user krupy settings
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Defaults offered for questions of any template
    pub defaults: AnswerMap,

    /// Trusted template locations; entries ending in `/` are prefixes
    pub trust: Vec<String>,
}

fn expand_home(location: &str) -> String {
    match (location.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest).to_string_lossy().into_owned(),
        _ => location.to_string(),
    }
}

impl Settings {
    /// Load settings with fallback chain
    ///
    /// An explicit path must exist. Otherwise `$KRUPY_SETTINGS_PATH`, then
    /// `<config dir>/krupy/settings.yml`; a missing file means defaults.
    pub fn load(settings_path: Option<&PathBuf>) -> Result<Self> {
        if let Some(path) = settings_path {
            return Self::load_from_file(path).context(format!("Failed to load settings from {}", path.display()));
        }

        if let Ok(env_path) = std::env::var(SETTINGS_PATH_ENV) {
            let path = PathBuf::from(env_path);
            return Self::load_from_file(&path).context(format!("Failed to load settings from {}", path.display()));
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_settings = config_dir.join("krupy").join("settings.yml");
            if user_settings.exists() {
                match Self::load_from_file(&user_settings) {
                    Ok(settings) => return Ok(settings),
                    Err(e) => {
                        tracing::warn!("Failed to load settings from {}: {}", user_settings.display(), e);
                    }
                }
            }
        }

        tracing::info!("No settings file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read settings file")?;
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let settings: Self = serde_yaml::from_str(&content).context("Failed to parse settings file")?;
        tracing::info!("Loaded settings from: {}", path.as_ref().display());
        Ok(settings)
    }

    /// Whether a template location is trusted to run unsafe features
    pub fn is_trusted(&self, src: &str) -> bool {
        let src = expand_home(src);
        self.trust.iter().any(|entry| {
            let entry = expand_home(entry);
            if entry.ends_with('/') {
                src.starts_with(&entry)
            } else {
                src == entry
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_deserialize_settings() {
        let yaml = r#"
defaults:
  author: Jane
  license: MIT
trust:
  - https://github.com/acme/
  - gh:acme/exact
"#;
        let settings: Settings = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(settings.defaults.get("author"), Some(&json!("Jane")));
        assert_eq!(settings.trust.len(), 2);
    }

    #[test]
    fn test_trust_matching() {
        let settings = Settings {
            trust: vec!["https://github.com/acme/".into(), "gh:acme/exact".into()],
            ..Default::default()
        };
        assert!(settings.is_trusted("https://github.com/acme/service.git"));
        assert!(settings.is_trusted("gh:acme/exact"));
        assert!(!settings.is_trusted("gh:acme/exact-not"));
        assert!(!settings.is_trusted("https://github.com/other/service.git"));
    }

    #[test]
    fn test_load_explicit_path() {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let path = temp.path().join("settings.yml");
        fs::write(&path, "defaults:\n  name: demo\n").unwrap();
        let settings = Settings::load(Some(&path)).unwrap();
        assert_eq!(settings.defaults.get("name"), Some(&json!("demo")));

        let missing = temp.path().join("missing.yml");
        assert!(Settings::load(Some(&missing)).is_err());
    }

    #[test]
    fn test_empty_settings_file() {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let path = temp.path().join("settings.yml");
        fs::write(&path, "").unwrap();
        assert_eq!(Settings::load(Some(&path)).unwrap(), Settings::default());
    }
}
