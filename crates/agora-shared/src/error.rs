use thiserror::Error;

use crate::types::MessageId;

/// Failures surfaced by the message feed and the operations behind it.
///
/// Reconciliation itself never fails; these come from the edges (scope
/// validation, the message store, permission checks).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FeedError {
    /// The scope identifier is malformed. A caller bug, never retried.
    #[error("Invalid scope: {0}")]
    InvalidScope(String),

    /// The store or network was unavailable. The user may retry.
    #[error("Fetch failed: {0}")]
    TransientFetchFailure(String),

    /// The acting member may not edit or delete the target message.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// A mutation targeted a message that is already deleted.
    /// Callers treat this as idempotent success.
    #[error("Message {0} is already deleted")]
    StaleWrite(MessageId),
}

impl FeedError {
    /// Whether a user-triggered retry can succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TransientFetchFailure(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_fetch_failures_are_retryable() {
        assert!(FeedError::TransientFetchFailure("offline".into()).is_retryable());
        assert!(!FeedError::InvalidScope("".into()).is_retryable());
        assert!(!FeedError::Forbidden("not author".into()).is_retryable());
        assert!(!FeedError::StaleWrite(MessageId::from("m1")).is_retryable());
    }
}
