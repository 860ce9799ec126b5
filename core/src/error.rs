//! Error taxonomy shared by the store, the cache, the pipeline and the read API.
//!
//! | Variant        | Meaning                                   | Severity | Pipeline   |
//! |----------------|-------------------------------------------|----------|------------|
//! | `NotFound`     | expected row or cache entry is absent     | warn     | permanent  |
//! | `Storage`      | any other relational store failure        | error    | temporary  |
//! | `InvalidInput` | malformed request or message content      | warn     | permanent  |
//! | `Messaging`    | subscribe, poll, commit or close failure  | error    | permanent  |

use crate::message_log::MessageLogError;
use crate::validation::ValidationError;
use thiserror::Error;

/// Result alias used across the order service crates.
pub type Result<T> = std::result::Result<T, OrderError>;

/// Errors produced by order operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OrderError {
    /// The requested order (or its cache entry) does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The relational store failed.
    #[error("database error: {0}")]
    Storage(String),

    /// Request parameters or message content are malformed or out of range.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The message log failed.
    #[error("messaging error: {0}")]
    Messaging(String),
}

impl OrderError {
    /// `true` for [`OrderError::NotFound`].
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Whether retrying the same write may succeed.
    ///
    /// Only storage failures are temporary; everything else is dropped after
    /// the first attempt.
    #[must_use]
    pub const fn is_temporary(&self) -> bool {
        matches!(self, Self::Storage(_))
    }
}

impl From<MessageLogError> for OrderError {
    fn from(err: MessageLogError) -> Self {
        Self::Messaging(err.to_string())
    }
}

impl From<ValidationError> for OrderError {
    fn from(err: ValidationError) -> Self {
        Self::InvalidInput(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_storage_errors_are_temporary() {
        assert!(OrderError::Storage("connection reset".into()).is_temporary());
        assert!(!OrderError::NotFound("order x".into()).is_temporary());
        assert!(!OrderError::InvalidInput("limit".into()).is_temporary());
        assert!(!OrderError::Messaging("commit".into()).is_temporary());
    }

    #[test]
    fn messaging_conversion_keeps_reason() {
        let err: OrderError = MessageLogError::Commit("broker down".into()).into();
        assert!(matches!(err, OrderError::Messaging(ref m) if m.contains("broker down")));
    }

    #[test]
    fn display_names_the_category() {
        let err = OrderError::NotFound("order abc".into());
        assert_eq!(err.to_string(), "not found: order abc");
    }
}
