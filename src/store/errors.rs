//! Error types for the hook state store.

use thiserror::Error;

/// Errors returned by the hook state store and its backends.
///
/// Conditional-write mismatches are not errors; they are reported through
/// [`WriteOutcome::Conflict`](super::WriteOutcome::Conflict).
///
/// `StoreError` is `Clone` so a single failed lookup can be handed to every
/// caller waiting on the same cache miss.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A record for the subject already exists.
    ///
    /// Callers treat this as a lost creation race and retry as an update.
    #[error("Hook state for subject '{subject}' already exists")]
    DuplicateSubject {
        /// The subject that already exists.
        subject: String,
    },

    /// No record exists for the subject.
    #[error("Hook state for subject '{subject}' not found")]
    NotFound {
        /// The subject that was not found.
        subject: String,
    },

    /// The backing store failed.
    #[error("Hook state backend error: {message}")]
    Backend {
        /// Description of the backend failure.
        message: String,
    },
}
