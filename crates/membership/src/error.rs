//! Membership error types

use thiserror::Error;

/// Result alias used across the membership engine
pub type MembershipResult<T> = Result<T, MembershipError>;

/// Errors raised by the membership engine and its ports
#[derive(Debug, Error)]
pub enum MembershipError {
    /// Rejected before any state mutation (non-positive counts, bad filters)
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Role grant/revoke or direct message failed
    #[error("Delivery failed: {0}")]
    Delivery(String),

    /// Remote backup push or pull failed
    #[error("Backup unavailable: {0}")]
    BackupUnavailable(String),

    #[error("Store error: {0}")]
    Store(String),
}

impl MembershipError {
    /// Whether this error is local to one member and must not abort a batch
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            MembershipError::Delivery(_) | MembershipError::BackupUnavailable(_)
        )
    }
}

impl From<sqlx::Error> for MembershipError {
    fn from(e: sqlx::Error) -> Self {
        MembershipError::Store(e.to_string())
    }
}

impl From<sqlx::migrate::MigrateError> for MembershipError {
    fn from(e: sqlx::migrate::MigrateError) -> Self {
        MembershipError::Store(format!("migration failed: {}", e))
    }
}

impl From<time::error::ComponentRange> for MembershipError {
    fn from(e: time::error::ComponentRange) -> Self {
        MembershipError::InvalidArgument(format!("date out of range: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(MembershipError::Delivery("dm closed".into()).is_transient());
        assert!(MembershipError::BackupUnavailable("503".into()).is_transient());
        assert!(!MembershipError::InvalidArgument("months".into()).is_transient());
        assert!(!MembershipError::Store("down".into()).is_transient());
    }

    #[test]
    fn test_error_display() {
        let err = MembershipError::InvalidArgument("months must be positive".into());
        assert_eq!(err.to_string(), "Invalid argument: months must be positive");
    }
}
