//! Error taxonomy for the plugin.
//!
//! - [`ConfigurationError`] is fatal and aborts the whole batch.
//! - [`FetchFailure`] is contained at the file level.
//! - [`MalformedEntryError`] is contained at the entry level.

use thiserror::Error;

/// Missing or invalid configuration, either global or per file.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    #[error("Expected property accessToken: the CMS access token is missing or empty")]
    MissingAccessToken,

    #[error("Expected property space_id in the contentful block of `{file}`")]
    MissingSpaceId { file: String },

    #[error("Invalid contentful block in `{file}`: {reason}")]
    InvalidDirective { file: String, reason: String },
}

/// A CMS call (or client construction) failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Failed to fetch CMS entries: {message}")]
pub struct FetchFailure {
    pub message: String,
}

impl FetchFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<reqwest::Error> for FetchFailure {
    fn from(e: reqwest::Error) -> Self {
        FetchFailure::new(e.to_string())
    }
}

/// An entry lacks a field the mapper requires.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Malformed entry `{entry_id}`: {reason}")]
pub struct MalformedEntryError {
    pub entry_id: String,
    pub reason: String,
}

impl MalformedEntryError {
    pub fn new(entry_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            entry_id: entry_id.into(),
            reason: reason.into(),
        }
    }
}

/// Failure of a whole batch. Only configuration problems get this far.
#[derive(Debug, Error)]
pub enum BatchError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
}
