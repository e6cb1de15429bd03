//! Error types for the assessment engine.
//!
//! Session errors are reported to the caller and never abort a running clock;
//! persistence errors leave the finalized result in memory so a save can be
//! retried.

use thiserror::Error;

use crate::result::ResultId;
use crate::session::SessionState;

/// Errors raised by session operations.
#[derive(Debug, Error, PartialEq)]
pub enum SessionError {
    /// No question in the corpus matched the filter.
    #[error("no questions available for {filter}")]
    EmptyPool { filter: String },

    /// Navigation or answer index outside `0..len`.
    #[error("question index {index} out of bounds (session has {len} questions)")]
    InvalidNavigation { index: usize, len: usize },

    /// Selected option outside `0..4`.
    #[error("option {option} is not one of the four choices")]
    InvalidOption { option: usize },

    /// The operation is not allowed in the current state.
    #[error("cannot {action} while session is {from}")]
    InvalidTransition {
        from: SessionState,
        action: &'static str,
    },

    /// A result was requested before the session completed.
    #[error("session has not completed yet")]
    NotCompleted,
}

/// Errors from the result store.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("result {0} not found")]
    NotFound(ResultId),

    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("failed to encode result: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The store refused the write for a reason of its own.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Save was requested before the session produced a result.
    #[error("no finalized result to save")]
    NothingToSave,
}

impl PersistenceError {
    /// Returns `true` if retrying the same call can succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            PersistenceError::NotFound(_)
                | PersistenceError::Serialization(_)
                | PersistenceError::NothingToSave
        )
    }
}

/// Raised when a raw question cannot be normalized into a [`crate::question::Question`].
#[derive(Debug, Error, PartialEq)]
pub enum QuestionFormatError {
    #[error("question is not a JSON object")]
    NotAnObject,

    #[error("question has no text")]
    MissingText,

    #[error("expected 4 options, found {0}")]
    WrongOptionCount(usize),

    #[error("cannot resolve correct answer {0:?}")]
    UnresolvedAnswer(String),
}

/// Errors loading a question bank.
#[derive(Debug, Error)]
pub enum BankError {
    #[error("failed to read bank: {0}")]
    Io(#[from] std::io::Error),

    #[error("bank is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}
