//! Ledger data models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Direction of a ledger movement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationType {
    /// Credit (winnings, deposits)
    Income,
    /// Debit (stakes)
    Outcome,
}

impl OperationType {
    pub fn as_str(self) -> &'static str {
        match self {
            OperationType::Income => "income",
            OperationType::Outcome => "outcome",
        }
    }

    /// Signed delta for a positive amount
    pub fn signed(self, amount: i64) -> i64 {
        match self {
            OperationType::Income => amount,
            OperationType::Outcome => -amount,
        }
    }

    /// Event name used on the balance channel
    pub fn event_name(self) -> &'static str {
        match self {
            OperationType::Income => "income-event",
            OperationType::Outcome => "outcome-event",
        }
    }

    pub(crate) fn from_db(value: &str) -> Self {
        match value {
            "income" => OperationType::Income,
            _ => OperationType::Outcome,
        }
    }
}

impl std::fmt::Display for OperationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A user together with the current balance projection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub user_id: i64,
    pub external_id: Uuid,
    pub balance: i64,
    pub updated_at: DateTime<Utc>,
}

/// One append-only ledger row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceTransaction {
    pub id: i64,
    pub user_id: i64,
    pub delta: i64,
    pub operation_type: OperationType,
    pub module: String,
    pub created_at: DateTime<Utc>,
}

/// Payload published on the balance channel after a ledger call commits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceNotice {
    pub user_uuid: Uuid,
    pub amount: i64,
    pub operation_type: OperationType,
    pub module: String,
    pub balance: i64,
}

impl BalanceNotice {
    pub fn event_name(&self) -> &'static str {
        self.operation_type.event_name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signed_delta() {
        assert_eq!(OperationType::Income.signed(250), 250);
        assert_eq!(OperationType::Outcome.signed(250), -250);
    }

    #[test]
    fn test_notice_serializes_lowercase_type() {
        let notice = BalanceNotice {
            user_uuid: Uuid::nil(),
            amount: 250,
            operation_type: OperationType::Outcome,
            module: "roulette".to_string(),
            balance: 750,
        };
        let json = serde_json::to_value(&notice).unwrap();
        assert_eq!(json["operation_type"], "outcome");
        assert_eq!(json["balance"], 750);
        assert_eq!(notice.event_name(), "outcome-event");
    }

    #[test]
    fn test_from_db_round_trip() {
        for op in [OperationType::Income, OperationType::Outcome] {
            assert_eq!(OperationType::from_db(op.as_str()), op);
        }
    }
}
