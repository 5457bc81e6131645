//! Error types for resim-api.

use thiserror::Error;

/// All errors that can arise from a REST call.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The backend answered with a status other than the expected success
    /// code for the operation.
    #[error("{operation} returned HTTP {status}: {body}")]
    Status {
        operation: &'static str,
        status: u16,
        body: String,
    },

    /// The request never produced a response (connect failure, timeout).
    #[error("{operation} request failed: {source}")]
    Transport {
        operation: &'static str,
        #[source]
        source: reqwest::Error,
    },

    /// A success response whose body could not be decoded.
    #[error("{operation} returned an unreadable body: {reason}")]
    Decode {
        operation: &'static str,
        reason: String,
    },

    /// No project matches the given name.
    #[error("project '{0}' not found")]
    ProjectNotFound(String),

    #[error("invalid API configuration: {0}")]
    InvalidConfig(String),
}

impl ApiError {
    /// HTTP status of the failed response, if there was one.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            ApiError::Transport { source, .. } => source.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Response body (or failure description) for diagnostics.
    pub fn body(&self) -> String {
        match self {
            ApiError::Status { body, .. } => body.clone(),
            other => other.to_string(),
        }
    }
}
