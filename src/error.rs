//! Typed errors for collaborator calls and pipeline stages.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Failure of a single call to an external collaborator (OCR or LLM).
///
/// [`is_transient`](CollaboratorError::is_transient) decides whether the
/// retry decorator tries again.
#[derive(Debug, Error)]
pub enum CollaboratorError {
    #[error("call timed out after {0:?}")]
    Timeout(Duration),

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("service unavailable: {0}")]
    Unavailable(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("service returned {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("unsupported document: {0}")]
    Unsupported(String),

    #[error("{0} is disabled")]
    Disabled(&'static str),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CollaboratorError {
    /// Map an HTTP status and body to a retryable or terminal error.
    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            429 => CollaboratorError::RateLimited(body),
            500..=599 => CollaboratorError::Unavailable(format!("{}: {}", status, body)),
            _ => CollaboratorError::Rejected { status, body },
        }
    }

    pub fn is_transient(&self) -> bool {
        match self {
            CollaboratorError::Timeout(_)
            | CollaboratorError::RateLimited(_)
            | CollaboratorError::Unavailable(_) => true,
            CollaboratorError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            _ => false,
        }
    }
}

/// Fatal error raised by a pipeline stage.
#[derive(Debug, Error)]
pub enum StageError {
    #[error("folder does not exist: {0}")]
    FolderNotFound(PathBuf),

    #[error("no documents found in {0}")]
    NoDocuments(PathBuf),

    #[error("missing prerequisite: {0}")]
    MissingPrerequisite(&'static str),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
