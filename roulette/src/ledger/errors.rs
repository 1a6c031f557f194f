//! Ledger error types.

use thiserror::Error;
use uuid::Uuid;

/// Ledger errors
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// No balance row for the internal user id
    #[error("Balance not found for user {0}")]
    BalanceNotFound(i64),

    /// No user with this external id
    #[error("User {0} not found")]
    UserNotFound(Uuid),

    /// An account already exists for this external id
    #[error("Account already exists for user {0}")]
    AccountExists(Uuid),

    /// Amounts must be positive; direction comes from the operation type
    #[error("Invalid amount: {0}")]
    InvalidAmount(i64),

    /// Opening balances cannot be negative
    #[error("Invalid opening balance: {0}")]
    InvalidOpeningBalance(i64),
}

impl LedgerError {
    /// Get a client-safe error message that doesn't leak internal details
    pub fn client_message(&self) -> String {
        match self {
            LedgerError::Database(_) => "Internal server error".to_string(),
            LedgerError::BalanceNotFound(_) => "Balance not found".to_string(),
            LedgerError::UserNotFound(_) => "User not found".to_string(),
            _ => self.to_string(),
        }
    }
}

/// Result type for ledger operations
pub type LedgerResult<T> = Result<T, LedgerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_message_hides_ids() {
        let id = Uuid::new_v4();
        let msg = LedgerError::UserNotFound(id).client_message();
        assert_eq!(msg, "User not found");
        assert!(!msg.contains(&id.to_string()));

        assert_eq!(
            LedgerError::BalanceNotFound(42).client_message(),
            "Balance not found"
        );
    }

    #[test]
    fn test_database_error_is_sanitized() {
        let err = LedgerError::Database(sqlx::Error::RowNotFound);
        assert_eq!(err.client_message(), "Internal server error");
    }

    #[test]
    fn test_amount_errors_are_exposed() {
        assert_eq!(
            LedgerError::InvalidAmount(-5).client_message(),
            "Invalid amount: -5"
        );
    }
}
