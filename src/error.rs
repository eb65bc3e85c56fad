// =============================================================================
// error.rs — EVERYTHING THAT CAN GO WRONG (NOT MUCH, ON PURPOSE)
// =============================================================================
//
// Extraction and identification do not have error types: a field that will
// not parse is simply absent, and a sender that does not look like a broker
// is "not a broker". The only real failures live at the edges: the store,
// the preference file, and the directory refusing a duplicate domain.
// =============================================================================

use std::time::Duration;
use thiserror::Error;

/// Failures reported by the persistence collaborator.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Store could not be reached or refused the call. Safe to retry.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The write was rejected as a whole. Nothing was persisted.
    #[error("store rejected write for '{key}': {reason}")]
    Rejected { key: String, reason: String },
}

impl StoreError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

/// Failures from a relationship refresh (read history, recompute, replace).
#[derive(Debug, Error)]
pub enum AggregateError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("broker stats refresh timed out after {0:?}")]
    TimedOut(Duration),

    #[error("broker stats refresh cancelled")]
    Cancelled,

    #[error("no load history for broker '{0}'")]
    EmptyHistory(String),
}

impl AggregateError {
    /// Whether the orchestrator may try the same refresh again. The core
    /// itself never retries.
    pub fn is_retryable(&self) -> bool {
        match self {
            AggregateError::Store(err) => err.is_retryable(),
            AggregateError::TimedOut(_) => true,
            AggregateError::Cancelled | AggregateError::EmptyHistory(_) => false,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DirectoryError {
    #[error("broker domain '{0}' is already in the directory")]
    DuplicateDomain(String),

    #[error("broker entry has an empty {0}")]
    EmptyField(&'static str),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read preferences file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse preferences file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}
