//! Balance ledger backed by `user_balances` and `balance_transactions`.
#![allow(clippy::needless_raw_string_hashes)]

use super::{
    errors::{LedgerError, LedgerResult},
    models::{Account, BalanceNotice, BalanceTransaction, OperationType},
};
use sqlx::{PgPool, Postgres, Row, Transaction};
use std::sync::Arc;
use uuid::Uuid;

/// Ledger manager
#[derive(Clone)]
pub struct LedgerManager {
    pool: Arc<PgPool>,
}

impl LedgerManager {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Register a user with an opening balance.
    ///
    /// The opening balance is the baseline for reconciliation and is not
    /// written to the ledger.
    ///
    /// # Errors
    ///
    /// * `LedgerError::AccountExists` - The external id is already registered
    /// * `LedgerError::InvalidOpeningBalance` - Negative opening balance
    pub async fn open_account(
        &self,
        external_id: Uuid,
        opening_balance: i64,
    ) -> LedgerResult<Account> {
        if opening_balance < 0 {
            return Err(LedgerError::InvalidOpeningBalance(opening_balance));
        }

        let mut tx = self.pool.begin().await?;

        let user_id: i64 = sqlx::query(
            "INSERT INTO users (external_id) VALUES ($1)
             ON CONFLICT (external_id) DO NOTHING
             RETURNING id",
        )
        .bind(external_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(LedgerError::AccountExists(external_id))?
        .get("id");

        let row = sqlx::query(
            "INSERT INTO user_balances (user_id, balance) VALUES ($1, $2)
             RETURNING balance, updated_at",
        )
        .bind(user_id)
        .bind(opening_balance)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        log::info!("Opened account {external_id} (user {user_id}) with balance {opening_balance}");

        Ok(Account {
            user_id,
            external_id,
            balance: row.get("balance"),
            updated_at: row.get::<chrono::NaiveDateTime, _>("updated_at").and_utc(),
        })
    }

    /// Look up an account by external id
    pub async fn find_account(&self, external_id: Uuid) -> LedgerResult<Account> {
        let row = sqlx::query(
            r#"
            SELECT u.id, u.external_id, b.balance, b.updated_at
            FROM users u
            JOIN user_balances b ON b.user_id = u.id
            WHERE u.external_id = $1
            "#,
        )
        .bind(external_id)
        .fetch_optional(self.pool.as_ref())
        .await?
        .ok_or(LedgerError::UserNotFound(external_id))?;

        Ok(account_from_row(&row))
    }

    /// Look up an account inside `tx` and lock its balance row until commit.
    ///
    /// Callers use this to check sufficiency before [`LedgerManager::outcome`].
    pub async fn lock_account(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        external_id: Uuid,
    ) -> LedgerResult<Account> {
        let row = sqlx::query(
            r#"
            SELECT u.id, u.external_id, b.balance, b.updated_at
            FROM users u
            JOIN user_balances b ON b.user_id = u.id
            WHERE u.external_id = $1
            FOR UPDATE OF b
            "#,
        )
        .bind(external_id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or(LedgerError::UserNotFound(external_id))?;

        Ok(account_from_row(&row))
    }

    /// Credit `amount` inside the caller's transaction
    ///
    /// # Errors
    ///
    /// * `LedgerError::InvalidAmount` - `amount` is not positive
    /// * `LedgerError::BalanceNotFound` - No balance row for `user_id`
    pub async fn income(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        user_id: i64,
        amount: i64,
        module: &str,
    ) -> LedgerResult<BalanceNotice> {
        self.apply(tx, OperationType::Income, user_id, amount, module)
            .await
    }

    /// Debit `amount` inside the caller's transaction.
    ///
    /// Sufficiency is NOT checked here; callers lock the account with
    /// [`LedgerManager::lock_account`] and compare first.
    pub async fn outcome(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        user_id: i64,
        amount: i64,
        module: &str,
    ) -> LedgerResult<BalanceNotice> {
        self.apply(tx, OperationType::Outcome, user_id, amount, module)
            .await
    }

    /// Run a single ledger operation in its own transaction
    pub async fn record(
        &self,
        operation: OperationType,
        user_id: i64,
        amount: i64,
        module: &str,
    ) -> LedgerResult<BalanceNotice> {
        let mut tx = self.pool.begin().await?;
        let notice = self.apply(&mut tx, operation, user_id, amount, module).await?;
        tx.commit().await?;
        Ok(notice)
    }

    async fn apply(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        operation: OperationType,
        user_id: i64,
        amount: i64,
        module: &str,
    ) -> LedgerResult<BalanceNotice> {
        if amount <= 0 {
            return Err(LedgerError::InvalidAmount(amount));
        }
        let delta = operation.signed(amount);

        // Single atomic increment; the row lock is held until the caller commits
        let balance: i64 = sqlx::query(
            "UPDATE user_balances
             SET balance = balance + $1, updated_at = NOW()
             WHERE user_id = $2
             RETURNING balance",
        )
        .bind(delta)
        .bind(user_id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or(LedgerError::BalanceNotFound(user_id))?
        .get("balance");

        sqlx::query(
            r#"
            INSERT INTO balance_transactions (user_id, delta, type, module)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(user_id)
        .bind(delta)
        .bind(operation.as_str())
        .bind(module)
        .execute(&mut **tx)
        .await?;

        let user_uuid: Uuid = sqlx::query("SELECT external_id FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_one(&mut **tx)
            .await?
            .get("external_id");

        log::debug!("Ledger {operation} user={user_id} delta={delta} balance={balance} module={module}");

        Ok(BalanceNotice {
            user_uuid,
            amount,
            operation_type: operation,
            module: module.to_string(),
            balance,
        })
    }

    /// Current balance projection
    pub async fn balance(&self, user_id: i64) -> LedgerResult<i64> {
        let row = sqlx::query("SELECT balance FROM user_balances WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(self.pool.as_ref())
            .await?
            .ok_or(LedgerError::BalanceNotFound(user_id))?;

        Ok(row.get("balance"))
    }

    /// Most recent ledger rows for a user, newest first
    pub async fn transactions(
        &self,
        user_id: i64,
        limit: i64,
    ) -> LedgerResult<Vec<BalanceTransaction>> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, delta, type, module, created_at
            FROM balance_transactions
            WHERE user_id = $1
            ORDER BY id DESC
            LIMIT $2
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| BalanceTransaction {
                id: row.get("id"),
                user_id: row.get("user_id"),
                delta: row.get("delta"),
                operation_type: OperationType::from_db(row.get::<&str, _>("type")),
                module: row.get("module"),
                created_at: row.get::<chrono::NaiveDateTime, _>("created_at").and_utc(),
            })
            .collect())
    }

    /// Sum of all signed deltas for a user, for reconciliation against the
    /// opening balance
    pub async fn delta_sum(&self, user_id: i64) -> LedgerResult<i64> {
        let row = sqlx::query(
            "SELECT COALESCE(SUM(delta), 0)::BIGINT AS total
             FROM balance_transactions
             WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_one(self.pool.as_ref())
        .await?;

        Ok(row.get("total"))
    }
}

fn account_from_row(row: &sqlx::postgres::PgRow) -> Account {
    Account {
        user_id: row.get("id"),
        external_id: row.get("external_id"),
        balance: row.get("balance"),
        updated_at: row.get::<chrono::NaiveDateTime, _>("updated_at").and_utc(),
    }
}
