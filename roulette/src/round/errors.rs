//! Round error taxonomy.

use crate::hub::HubError;
use crate::ledger::LedgerError;
use thiserror::Error;
use uuid::Uuid;

/// Round state machine errors
#[derive(Debug, Error)]
pub enum GameError {
    /// Malformed request
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Round {0} not found")]
    RoundNotFound(Uuid),

    #[error("Round {0} no longer accepts bets")]
    RoundClosed(Uuid),

    #[error("Round {0} has already been rolled")]
    AlreadyRolled(Uuid),

    #[error("No draw recorded for round {0}")]
    DrawNotFound(Uuid),

    #[error("User {0} not found")]
    UserNotFound(Uuid),

    #[error("Bet limit exceeded: {existing} placed, {requested} requested, limit {limit}")]
    BetLimitExceeded {
        existing: usize,
        requested: usize,
        limit: usize,
    },

    #[error("Insufficient funds: available {available}, required {required}")]
    InsufficientFunds { available: i64, required: i64 },

    #[error("Payout overflow for bet {0}")]
    PayoutOverflow(i64),

    /// Storage or transaction failure; the enclosing transaction was rolled back
    #[error("Database error: {0}")]
    Persistence(#[from] sqlx::Error),

    #[error("Ledger error: {0}")]
    Ledger(LedgerError),

    #[error("Notification error: {0}")]
    Notification(#[from] HubError),
}

/// Coarse classification used to pick a response status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    InsufficientFunds,
    Persistence,
    Notification,
}

impl From<LedgerError> for GameError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::Database(e) => GameError::Persistence(e),
            LedgerError::UserNotFound(id) => GameError::UserNotFound(id),
            other => GameError::Ledger(other),
        }
    }
}

impl GameError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            GameError::Validation(_)
            | GameError::RoundClosed(_)
            | GameError::AlreadyRolled(_)
            | GameError::BetLimitExceeded { .. } => ErrorKind::Validation,
            GameError::RoundNotFound(_) | GameError::DrawNotFound(_) | GameError::UserNotFound(_) => {
                ErrorKind::NotFound
            }
            GameError::InsufficientFunds { .. } => ErrorKind::InsufficientFunds,
            GameError::PayoutOverflow(_) | GameError::Persistence(_) | GameError::Ledger(_) => {
                ErrorKind::Persistence
            }
            GameError::Notification(_) => ErrorKind::Notification,
        }
    }

    /// Get a client-safe error message that doesn't leak internal details
    pub fn client_message(&self) -> String {
        match self {
            GameError::Persistence(_) | GameError::PayoutOverflow(_) => {
                "Internal server error".to_string()
            }
            GameError::Ledger(e) => e.client_message(),
            GameError::Notification(e) => e.client_message(),
            GameError::RoundNotFound(_) => "Round not found".to_string(),
            GameError::DrawNotFound(_) => "Draw not found".to_string(),
            GameError::UserNotFound(_) => "User not found".to_string(),
            GameError::RoundClosed(_) => "Round no longer accepts bets".to_string(),
            GameError::AlreadyRolled(_) => "Round has already been rolled".to_string(),
            _ => self.to_string(),
        }
    }
}

/// Result type for round operations
pub type GameResult<T> = Result<T, GameError>;
