//! Error types for the reconciliation loop.

use thiserror::Error;

use crate::store::StoreError;

/// A reconciliation tick that was cut short.
///
/// Ticks that fail are logged by the loop, which keeps running.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ReconcileError {
    /// Listing subjects or writing a mirror failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A provider query task panicked or was aborted.
    #[error("Reconciliation query task failed: {message}")]
    Join {
        /// Join error message.
        message: String,
    },
}

impl From<tokio::task::JoinError> for ReconcileError {
    fn from(error: tokio::task::JoinError) -> Self {
        Self::Join {
            message: error.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_errors_display_transparently() {
        let error = ReconcileError::from(StoreError::Backend {
            message: "connection reset".to_string(),
        });
        assert_eq!(
            error.to_string(),
            StoreError::Backend {
                message: "connection reset".to_string()
            }
            .to_string()
        );
    }
}
