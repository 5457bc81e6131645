//! Error types for resim-sync.

use std::fmt;

use thiserror::Error;

use resim_api::ApiError;
use resim_core::{ConfigError, ExperienceId};

/// Process exit codes of the sync command.
pub const EXIT_OK: u8 = 0;
pub const EXIT_REJECTED: u8 = 1;
pub const EXIT_APPLY_FAILED: u8 = 2;
pub const EXIT_CANCELLED: u8 = 3;

/// Reasons the planner refuses a configuration. Each carries the offending
/// name or id.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanError {
    #[error("experience name '{0}' is claimed by more than one configured experience")]
    NameCollision(String),

    #[error(
        "experience name '{0}' is currently owned by a different experience id; \
         rename the current owner in a separate sync first"
    )]
    AmbiguousRename(String),

    #[error("experience id {0} does not exist, is already claimed, or is unreachable")]
    UnknownOrDuplicateId(ExperienceId),

    #[error("managed experience tag '{0}' does not exist")]
    UnknownManagedTag(String),

    #[error("experience tag '{0}' does not exist")]
    UnknownTag(String),

    #[error("system '{0}' does not exist")]
    UnknownSystem(String),

    #[error("test suite '{0}' does not exist")]
    UnknownTestSuite(String),

    #[error("test suite '{suite}' references missing or archived experience '{experience}'")]
    TestSuiteReferencesMissingExperience { suite: String, experience: String },
}

/// A single mutation that did not succeed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyError {
    pub operation: &'static str,
    /// Name of the experience, tag, system or suite the call was about.
    pub entity: String,
    pub http_status: Option<u16>,
    pub body: String,
}

impl ApplyError {
    pub(crate) fn from_api(operation: &'static str, entity: impl Into<String>, err: &ApiError) -> Self {
        Self {
            operation,
            entity: entity.into(),
            http_status: err.status(),
            body: err.body(),
        }
    }

    /// A call that could not be issued because an earlier phase left a
    /// dependency unresolved.
    pub(crate) fn unresolved(
        operation: &'static str,
        entity: impl Into<String>,
        missing: &[String],
    ) -> Self {
        Self {
            operation,
            entity: entity.into(),
            http_status: None,
            body: format!("no experience id for {}", missing.join(", ")),
        }
    }
}

impl fmt::Display for ApplyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} for '{}' failed", self.operation, self.entity)?;
        if let Some(status) = self.http_status {
            write!(f, " (HTTP {status})")?;
        }
        write!(f, ": {}", self.body)
    }
}

impl std::error::Error for ApplyError {}

/// All errors that can arise from a sync run.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The experience config could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A list call failed while building the state snapshot.
    #[error("failed to fetch current state ({operation}): {source}")]
    Fetch {
        operation: &'static str,
        #[source]
        source: ApiError,
    },

    /// The planner refused the configuration.
    #[error("configuration rejected: {0}")]
    Plan(#[from] PlanError),

    /// One or more mutations failed; the backend is partially updated.
    #[error("{failed} operation(s) failed, first: {first}")]
    Apply { first: ApplyError, failed: usize },

    #[error("sync cancelled after {completed} completed operation(s)")]
    Cancelled { completed: usize },

    /// A blocking helper task panicked or was aborted.
    #[error("background task failed: {0}")]
    Join(String),
}

impl SyncError {
    pub fn exit_code(&self) -> u8 {
        match self {
            SyncError::Config(_)
            | SyncError::Fetch { .. }
            | SyncError::Plan(_)
            | SyncError::Join(_) => EXIT_REJECTED,
            SyncError::Apply { .. } => EXIT_APPLY_FAILED,
            SyncError::Cancelled { .. } => EXIT_CANCELLED,
        }
    }
}
