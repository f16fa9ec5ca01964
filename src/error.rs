//! Error taxonomy shared by the HTTP client and source adapters.

use thiserror::Error;

/// Failure classes surfaced by a source call.
///
/// Only [`SourceError::Auth`] on the catalog source can mark a whole record as
/// unresolved; every other variant degrades the affected fields to unknown.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    /// The upstream has no entry for the artist. Normal outcome.
    #[error("not found")]
    NotFound,
    /// Network or rate issue that survived the retry budget.
    #[error("transient failure: {0}")]
    Transient(String),
    /// Credentials were rejected after one refresh-and-retry.
    #[error("authentication failed: {0}")]
    Auth(String),
    /// Upstream payload did not have the expected shape.
    #[error("malformed payload: {0}")]
    Parse(String),
    /// The resolution was abandoned by the caller.
    #[error("cancelled")]
    Cancelled,
}

impl SourceError {
    /// Short label used in bus events and log lines.
    pub fn kind_label(&self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::Transient(_) => "transient",
            Self::Auth(_) => "auth",
            Self::Parse(_) => "parse",
            Self::Cancelled => "cancelled",
        }
    }
}

impl From<serde_json::Error> for SourceError {
    fn from(error: serde_json::Error) -> Self {
        Self::Parse(format!("invalid JSON response: {error}"))
    }
}
