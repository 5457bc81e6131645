//! CLI settings stored at `~/.resim/config.yaml`.
//!
//! Precedence (lowest to highest): built-in defaults, the settings file,
//! `RESIM_*` environment variables, command-line flags. This module handles
//! the first three; the CLI applies flags on top.
//!
//! Like the rest of the crate, filesystem entry points come in pairs:
//! `fn_at(home: &Path, …)` for tests and `fn(…)` deriving home from
//! `dirs::home_dir()`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{io_err, ConfigError};

pub const DEFAULT_API_URL: &str = "https://api.resim.ai/v1";
pub const DEFAULT_WORKERS: usize = 16;

pub const ENV_API_URL: &str = "RESIM_API_URL";
pub const ENV_TOKEN: &str = "RESIM_TOKEN";
pub const ENV_PROJECT: &str = "RESIM_PROJECT";

/// Connection and tuning settings for the `resim` binary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_project: Option<String>,
    #[serde(default = "default_workers")]
    pub workers: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            token: None,
            default_project: None,
            workers: DEFAULT_WORKERS,
        }
    }
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

fn default_workers() -> usize {
    DEFAULT_WORKERS
}

/// `<home>/.resim/config.yaml`. Pure, no I/O.
pub fn settings_path_at(home: &Path) -> PathBuf {
    home.join(".resim").join("config.yaml")
}

/// Load settings from `<home>/.resim/config.yaml`, falling back to defaults
/// when the file is absent, then apply environment overrides.
pub fn load_at(home: &Path) -> Result<Settings, ConfigError> {
    let path = settings_path_at(home);
    let mut settings = if path.exists() {
        let contents = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
        serde_yaml::from_str(&contents).map_err(|e| ConfigError::Schema { path, source: e })?
    } else {
        Settings::default()
    };
    apply_env(&mut settings, |key| std::env::var(key).ok());
    Ok(settings)
}

/// `load_at` convenience wrapper.
pub fn load() -> Result<Settings, ConfigError> {
    load_at(&home()?)
}

/// Apply `RESIM_*` overrides. `lookup` is injectable so tests never touch
/// the process environment.
pub fn apply_env(settings: &mut Settings, lookup: impl Fn(&str) -> Option<String>) {
    let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
    if let Some(url) = non_empty(ENV_API_URL) {
        settings.api_url = url;
    }
    if let Some(token) = non_empty(ENV_TOKEN) {
        settings.token = Some(token);
    }
    if let Some(project) = non_empty(ENV_PROJECT) {
        settings.default_project = Some(project);
    }
}

fn home() -> Result<PathBuf, ConfigError> {
    dirs::home_dir().ok_or(ConfigError::HomeNotFound)
}
