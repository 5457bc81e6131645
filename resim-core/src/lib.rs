//! ReSim core library: experience types, sync configuration, CLI settings.
//!
//! - [`types`]: id newtypes, [`Experience`], [`SyncConfig`]
//! - [`config`]: load / normalize / validate / save experience configs
//! - [`settings`]: `~/.resim/config.yaml` plus `RESIM_*` overrides
//! - [`error`]: [`ConfigError`]

pub mod config;
pub mod error;
pub mod settings;
pub mod types;

pub use error::ConfigError;
pub use settings::Settings;
pub use types::{
    CustomField, CustomFieldType, EnvironmentVariable, Experience, ExperienceId, ProjectId,
    SyncConfig, SystemId, TagId, TestSuiteConfig, TestSuiteId,
};
