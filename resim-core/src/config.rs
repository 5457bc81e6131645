//! Experience sync configuration: load, normalize, validate, save.
//!
//! Loading is two-stage so the error says what kind of problem the file has:
//!
//! 1. text → `serde_yaml::Value` (fails with [`ConfigError::Parse`])
//! 2. value → [`SyncConfig`] (fails with [`ConfigError::Schema`])
//!
//! After that every experience is normalized and the document is validated
//! as a whole (duplicate names, empty locations, and so on).

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::error::{io_err, ConfigError};
use crate::types::{Experience, SyncConfig};

// ---------------------------------------------------------------------------
// 1. Load
// ---------------------------------------------------------------------------

/// Read and parse the configuration at `path`.
pub fn load_at(path: &Path) -> Result<SyncConfig, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|e| io_err(path, e))?;
    parse_str(&contents, path)
}

/// Parse a configuration document. `origin` is only used for error messages.
pub fn parse_str(contents: &str, origin: &Path) -> Result<SyncConfig, ConfigError> {
    let value: serde_yaml::Value = serde_yaml::from_str(contents).map_err(|e| {
        ConfigError::Parse {
            path: origin.to_path_buf(),
            source: e,
        }
    })?;
    let mut config: SyncConfig =
        serde_yaml::from_value(value).map_err(|e| ConfigError::Schema {
            path: origin.to_path_buf(),
            source: e,
        })?;
    normalize(&mut config);
    validate(&config)?;
    Ok(config)
}

// ---------------------------------------------------------------------------
// 2. Normalize
// ---------------------------------------------------------------------------

/// Trim names and references so that matching is whitespace-insensitive.
pub fn normalize(config: &mut SyncConfig) {
    for experience in &mut config.experiences {
        normalize_experience(experience);
    }
    for suite in &mut config.managed_test_suites {
        suite.name = suite.name.trim().to_string();
        for name in &mut suite.experiences {
            *name = name.trim().to_string();
        }
    }
}

fn normalize_experience(experience: &mut Experience) {
    experience.name = experience.name.trim().to_string();
    // The backend reports a blank profile as absent.
    experience.profile = experience
        .profile
        .take()
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty());
}

// ---------------------------------------------------------------------------
// 3. Validate
// ---------------------------------------------------------------------------

/// Structural checks that need no knowledge of the backend.
pub fn validate(config: &SyncConfig) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();
    for experience in &config.experiences {
        if experience.name.is_empty() {
            return Err(ConfigError::Invalid {
                name: experience.name.clone(),
                reason: "name must not be empty".to_string(),
            });
        }
        if !seen.insert(experience.name.as_str()) {
            return Err(ConfigError::DuplicateName {
                name: experience.name.clone(),
            });
        }
        if !experience.archived && experience.locations.is_empty() {
            return Err(ConfigError::Invalid {
                name: experience.name.clone(),
                reason: "an active experience needs at least one location".to_string(),
            });
        }
        if experience.container_timeout_seconds == Some(0) {
            return Err(ConfigError::Invalid {
                name: experience.name.clone(),
                reason: "container_timeout_seconds must be positive".to_string(),
            });
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// 4. Save (atomic)
// ---------------------------------------------------------------------------

/// Atomically write `config` to `path`.
///
/// Write flow: serialize → `<file>.tmp` sibling → `rename`. The `.tmp` file
/// lives in the same directory so the rename never crosses filesystems.
pub fn save_at(path: &Path, config: &SyncConfig) -> Result<(), ConfigError> {
    let yaml = serde_yaml::to_string(config)?;
    let tmp = tmp_path(path);
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
    }
    std::fs::write(&tmp, yaml).map_err(|e| io_err(&tmp, e))?;
    if let Err(e) = std::fs::rename(&tmp, path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(io_err(path, e));
    }
    Ok(())
}

fn tmp_path(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "experiences.yaml".to_string());
    path.with_file_name(format!("{file_name}.tmp"))
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
