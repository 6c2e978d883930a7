use std::{io, path::PathBuf};

use thiserror::Error;

use crate::source::API_KEY_ENV;

/// Why the eBird API key could not be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AuthFailure {
    #[error("is missing; set {} to your eBird API key", API_KEY_ENV)]
    Missing,

    #[error("was rejected by eBird (HTTP {0})")]
    Rejected(u16),
}

/// Failure while fetching notable observations.
///
/// None of the variants carry the API key or the raw response body.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("eBird API key {0}")]
    Auth(AuthFailure),

    #[error("network error while contacting eBird: {0}")]
    Network(String),

    #[error("malformed eBird response: {0}")]
    MalformedResponse(String),
}

impl FetchError {
    /// Only network failures are worth another attempt.
    pub fn is_transient(&self) -> bool {
        matches!(self, FetchError::Network(_))
    }

    pub(crate) fn from_reqwest(err: reqwest::Error) -> Self {
        let reason = if err.is_timeout() {
            "request timed out".to_string()
        } else if err.is_connect() {
            "connection failed".to_string()
        } else {
            err.without_url().to_string()
        };

        FetchError::Network(reason)
    }
}

/// Failure while writing the rendered map to the output directory.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("failed to create output directory {}: {source}", .path.display())]
    CreateDir { path: PathBuf, source: io::Error },

    #[error("failed to write {}: {source}", .path.display())]
    Write { path: PathBuf, source: io::Error },

    #[error("failed to list archive directory {}: {source}", .path.display())]
    ListArchive { path: PathBuf, source: io::Error },
}

/// Invalid query or output settings.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{field} must be between {min} and {max}, got {value}")]
    OutOfRange {
        field: &'static str,
        value: String,
        min: String,
        max: String,
    },

    #[error("{name} has an invalid value '{value}'")]
    InvalidEnv { name: &'static str, value: String },
}

impl ConfigError {
    pub(crate) fn out_of_range<T: ToString>(field: &'static str, value: T, min: T, max: T) -> Self {
        ConfigError::OutOfRange {
            field,
            value: value.to_string(),
            min: min.to_string(),
            max: max.to_string(),
        }
    }
}

/// Any failure of a single scheduled run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Publish(#[from] PublishError),
}
