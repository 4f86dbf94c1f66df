//! Configuration system (layered: code > env > config file).

use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::OrcaError;
use crate::memory::RecallConfig;

/// Global default config (lazy-initialized from file + env).
static DEFAULT_CONFIG: OnceLock<OrcaConfig> = OnceLock::new();

/// Title used when title inference fails.
pub const DEFAULT_THREAD_TITLE: &str = "New Thread";

/// Layered configuration for Orca.
///
/// Resolution order:
/// 1. Values set in code (`with_*`)
/// 2. `ORCA_*` environment variables (a `.env` file is loaded first)
/// 3. `~/.orca/config.toml`
/// 4. Built-in defaults
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrcaConfig {
    /// Step budget when a turn does not set one.
    pub step_budget: usize,
    /// Wall-clock limit for a whole turn, in milliseconds.
    pub turn_timeout_ms: Option<u64>,
    pub default_title: String,
    /// Generated titles are truncated to this many characters.
    pub title_max_chars: usize,
    /// Most recent messages a recall returns by default.
    pub recall_last_messages: usize,
}

impl Default for OrcaConfig {
    fn default() -> Self {
        Self {
            step_budget: 5,
            turn_timeout_ms: None,
            default_title: DEFAULT_THREAD_TITLE.to_string(),
            title_max_chars: 80,
            recall_last_messages: 40,
        }
    }
}

impl OrcaConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a TOML document; absent keys keep their defaults.
    pub fn from_toml_str(raw: &str) -> Result<Self, OrcaError> {
        let config: Self = toml::from_str(raw)?;
        config.validate()
    }

    /// Load a TOML config file.
    pub fn load(path: &Path) -> Result<Self, OrcaError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    /// `~/.orca/config.toml`, if a home directory can be resolved.
    pub fn default_path() -> Option<PathBuf> {
        directories::UserDirs::new().map(|dirs| dirs.home_dir().join(".orca").join("config.toml"))
    }

    /// Load the default config file (if present), then apply `ORCA_*` env vars.
    ///
    /// Invalid files or values are logged and skipped.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv(); // load .env if present, ignore error
        let base = match Self::default_path().filter(|p| p.exists()) {
            Some(path) => Self::load(&path).unwrap_or_else(|e| {
                warn!(path = %path.display(), error = %e, "ignoring invalid config file");
                Self::default()
            }),
            None => Self::default(),
        };
        base.clone()
            .apply_env(|key| std::env::var(key).ok())
            .unwrap_or_else(|e| {
                warn!(error = %e, "ignoring invalid ORCA_* environment");
                base
            })
    }

    /// Get (or create) the global default config.
    pub fn global() -> &'static OrcaConfig {
        DEFAULT_CONFIG.get_or_init(Self::from_env)
    }

    /// Overlay values found through `lookup` (normally the process environment).
    pub fn apply_env(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, OrcaError> {
        if let Some(v) = lookup("ORCA_STEP_BUDGET") {
            self.step_budget = parse_env("ORCA_STEP_BUDGET", &v)?;
        }
        if let Some(v) = lookup("ORCA_TURN_TIMEOUT_MS") {
            self.turn_timeout_ms = Some(parse_env("ORCA_TURN_TIMEOUT_MS", &v)?);
        }
        if let Some(v) = lookup("ORCA_DEFAULT_TITLE") {
            self.default_title = v;
        }
        if let Some(v) = lookup("ORCA_TITLE_MAX_CHARS") {
            self.title_max_chars = parse_env("ORCA_TITLE_MAX_CHARS", &v)?;
        }
        if let Some(v) = lookup("ORCA_RECALL_LAST_MESSAGES") {
            self.recall_last_messages = parse_env("ORCA_RECALL_LAST_MESSAGES", &v)?;
        }
        self.validate()
    }

    pub fn with_step_budget(mut self, step_budget: usize) -> Self {
        self.step_budget = step_budget;
        self
    }

    pub fn with_turn_timeout(mut self, timeout: Duration) -> Self {
        self.turn_timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    pub fn with_default_title(mut self, title: impl Into<String>) -> Self {
        self.default_title = title.into();
        self
    }

    pub fn turn_timeout(&self) -> Option<Duration> {
        self.turn_timeout_ms.map(Duration::from_millis)
    }

    /// Recall configuration implied by this config.
    pub fn recall_config(&self) -> RecallConfig {
        RecallConfig::builder()
            .last_messages(self.recall_last_messages)
            .build()
    }

    fn validate(self) -> Result<Self, OrcaError> {
        if self.step_budget == 0 {
            return Err(OrcaError::Configuration(
                "step_budget must be at least 1".into(),
            ));
        }
        if self.title_max_chars == 0 {
            return Err(OrcaError::Configuration(
                "title_max_chars must be at least 1".into(),
            ));
        }
        Ok(self)
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, OrcaError>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| OrcaError::Configuration(format!("{key}={value}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_match_documented_values() {
        let config = OrcaConfig::default();
        assert_eq!(config.step_budget, 5);
        assert_eq!(config.default_title, "New Thread");
        assert_eq!(config.title_max_chars, 80);
        assert_eq!(config.turn_timeout(), None);
    }

    #[test]
    fn env_overrides_file_values() {
        let file = OrcaConfig::from_toml_str("step_budget = 3\ndefault_title = \"Untitled\"").unwrap();
        let config = file
            .apply_env(env(&[("ORCA_STEP_BUDGET", "8"), ("ORCA_TURN_TIMEOUT_MS", "1500")]))
            .unwrap();

        assert_eq!(config.step_budget, 8);
        assert_eq!(config.default_title, "Untitled");
        assert_eq!(config.turn_timeout(), Some(Duration::from_millis(1500)));
    }

    #[test]
    fn invalid_env_value_is_a_configuration_error() {
        let err = OrcaConfig::default()
            .apply_env(env(&[("ORCA_STEP_BUDGET", "many")]))
            .unwrap_err();
        assert!(matches!(err, OrcaError::Configuration(_)));
    }

    #[test]
    fn zero_step_budget_is_rejected() {
        assert!(OrcaConfig::from_toml_str("step_budget = 0").is_err());
    }

    #[test]
    fn loads_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "recall_last_messages = 12\ntitle_max_chars = 40\n").unwrap();

        let config = OrcaConfig::load(&path).unwrap();
        assert_eq!(config.recall_config().last_messages, 12);
        assert_eq!(config.title_max_chars, 40);
        assert_eq!(config.step_budget, 5);
    }
}
