//! Balance ledger: atomic credit/debit with an append-only transaction log.
//!
//! Every movement updates the `user_balances` projection and appends one
//! `balance_transactions` row in the same storage transaction, so
//! `balance == opening_balance + SUM(delta)` holds for every user.
//!
//! [`LedgerManager::income`] and [`LedgerManager::outcome`] run inside the
//! caller's transaction; the round machine composes them with bet and
//! settlement writes. Neither is idempotent: callers invoke them at most once
//! per business event.
//!
//! ## Example
//!
//! ```no_run
//! use roulette::db::Database;
//! use roulette::ledger::{LedgerManager, OperationType};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Database::new(&Default::default()).await?;
//!     let ledger = LedgerManager::new(Arc::new(db.pool().clone()));
//!
//!     let account = ledger.open_account(uuid::Uuid::new_v4(), 1000).await?;
//!     let notice = ledger
//!         .record(OperationType::Outcome, account.user_id, 250, "roulette")
//!         .await?;
//!     assert_eq!(notice.balance, 750);
//!
//!     Ok(())
//! }
//! ```

pub mod errors;
pub mod manager;
pub mod models;

pub use errors::{LedgerError, LedgerResult};
pub use manager::LedgerManager;
pub use models::{Account, BalanceNotice, BalanceTransaction, OperationType};
