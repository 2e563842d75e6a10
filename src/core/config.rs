//! Configuration management with layered hierarchy

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::core::status::StatusLabels;

/// Name of the per-directory configuration file
pub const LOCAL_CONFIG_FILE: &str = ".qcheck.yaml";

/// qcheck configuration with layered hierarchy
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Show only pass/fail instead of the full classification
    pub pass_fail_only: Option<bool>,

    /// Require a comment on every skipped measurement
    pub require_comment_on_skip: Option<bool>,

    /// Default output format
    pub default_format: Option<String>,

    /// Display text overrides for statuses
    pub status_display: Option<StatusLabels>,
}

impl Config {
    /// Load configuration from all sources, merging in priority order
    pub fn load() -> Self {
        // 1. Built-in defaults (already in Default impl)
        // 2. Global user config (~/.config/qcheck/config.yaml)
        // 3. Local config (./.qcheck.yaml)
        let local = std::env::current_dir()
            .ok()
            .map(|dir| dir.join(LOCAL_CONFIG_FILE));
        let mut config = Self::load_layers(Self::global_config_path().as_deref(), local.as_deref());

        // 4. Environment variables
        config.apply_env(|key| std::env::var(key).ok());

        config
    }

    /// Merge the given config files, later files taking precedence
    ///
    /// Missing files are skipped; unreadable or invalid ones are logged and
    /// skipped.
    pub fn load_layers(global: Option<&Path>, local: Option<&Path>) -> Self {
        let mut config = Config::default();
        for path in [global, local].into_iter().flatten() {
            if let Some(layer) = Self::read_file(path) {
                config.merge(layer);
            }
        }
        config
    }

    fn read_file(path: &Path) -> Option<Config> {
        if !path.exists() {
            return None;
        }
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "cannot read config file");
                return None;
            }
        };
        match serde_yml::from_str::<Config>(&contents) {
            Ok(config) => Some(config),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "ignoring invalid config file");
                None
            }
        }
    }

    /// Apply environment overrides using `lookup` to read variables
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(flag) = lookup("QCHECK_PASS_FAIL_ONLY").as_deref().and_then(parse_flag) {
            self.pass_fail_only = Some(flag);
        }
        if let Some(flag) = lookup("QCHECK_COMMENT_ON_SKIP").as_deref().and_then(parse_flag) {
            self.require_comment_on_skip = Some(flag);
        }
        if let Some(format) = lookup("QCHECK_FORMAT") {
            self.default_format = Some(format);
        }
    }

    /// Get the path to the global config file
    fn global_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "qcheck")
            .map(|dirs| dirs.config_dir().join("config.yaml"))
    }

    /// Merge another config into this one (other takes precedence)
    fn merge(&mut self, other: Config) {
        if other.pass_fail_only.is_some() {
            self.pass_fail_only = other.pass_fail_only;
        }
        if other.require_comment_on_skip.is_some() {
            self.require_comment_on_skip = other.require_comment_on_skip;
        }
        if other.default_format.is_some() {
            self.default_format = other.default_format;
        }
        if other.status_display.is_some() {
            self.status_display = other.status_display;
        }
    }

    /// Status labels, with any configured overrides
    pub fn labels(&self) -> StatusLabels {
        self.status_display.clone().unwrap_or_default()
    }
}

/// Parse a boolean-ish environment value
pub fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
