//! Error types for resim-core.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise while loading or writing configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Underlying I/O failure, annotated with the path involved.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The document is not well-formed YAML.
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// Well-formed YAML whose shape does not match: unknown key, wrong type,
    /// missing required field.
    #[error("invalid configuration in {path}: {source}")]
    Schema {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// Two experiences in the same file share a name.
    #[error("duplicate experience name '{name}' in configuration")]
    DuplicateName { name: String },

    /// A single entry violates a structural rule.
    #[error("invalid experience '{name}': {reason}")]
    Invalid { name: String, reason: String },

    /// YAML serialization error (clone / save path).
    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// `dirs::home_dir()` returned `None`, so `~/.resim/` cannot be located.
    #[error("cannot determine home directory; set $HOME or equivalent")]
    HomeNotFound,
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> ConfigError {
    ConfigError::Io {
        path: path.into(),
        source,
    }
}
