//! Integration tests for the balance ledger.
//!
//! Requires PostgreSQL at `DATABASE_URL`.

use roulette::db::{DEFAULT_DATABASE_URL, Database, DatabaseConfig};
use roulette::ledger::{LedgerError, LedgerManager, OperationType};
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

async fn setup_test_db() -> Arc<PgPool> {
    let config = DatabaseConfig {
        database_url: std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string()),
        max_connections: 5,
        min_connections: 1,
        ..DatabaseConfig::development()
    };

    let db = Database::new(&config)
        .await
        .expect("Failed to create test database");
    db.run_migrations().await.expect("Failed to apply schema");

    Arc::new(db.pool().clone())
}

async fn ledger_row_count(pool: &PgPool, user_id: i64) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM balance_transactions WHERE user_id = $1")
        .bind(user_id)
        .fetch_one(pool)
        .await
        .unwrap()
}

#[tokio::test]
async fn test_stake_debit_appends_one_row() {
    let pool = setup_test_db().await;
    let ledger = LedgerManager::new(pool.clone());
    let account = ledger.open_account(Uuid::new_v4(), 1000).await.unwrap();

    let notice = ledger
        .record(OperationType::Outcome, account.user_id, 250, "roulette")
        .await
        .unwrap();

    assert_eq!(notice.balance, 750);
    assert_eq!(notice.amount, 250);
    assert_eq!(notice.user_uuid, account.external_id);
    assert_eq!(notice.event_name(), "outcome-event");
    assert_eq!(ledger.balance(account.user_id).await.unwrap(), 750);

    let rows = ledger.transactions(account.user_id, 10).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].delta, -250);
    assert_eq!(rows[0].operation_type, OperationType::Outcome);
    assert_eq!(rows[0].module, "roulette");
}

#[tokio::test]
async fn test_balance_reconciles_with_deltas() {
    let pool = setup_test_db().await;
    let ledger = LedgerManager::new(pool.clone());
    let opening = 5_000;
    let account = ledger.open_account(Uuid::new_v4(), opening).await.unwrap();

    let movements = [
        (OperationType::Outcome, 300),
        (OperationType::Income, 600),
        (OperationType::Outcome, 1_250),
        (OperationType::Income, 14),
        (OperationType::Outcome, 7),
    ];
    for (operation, amount) in movements {
        ledger
            .record(operation, account.user_id, amount, "roulette")
            .await
            .unwrap();
    }

    let balance = ledger.balance(account.user_id).await.unwrap();
    let deltas = ledger.delta_sum(account.user_id).await.unwrap();
    assert_eq!(balance, opening + deltas);
    assert_eq!(balance, 5_000 - 300 + 600 - 1_250 + 14 - 7);
    assert_eq!(
        ledger_row_count(&pool, account.user_id).await,
        movements.len() as i64
    );
}

#[tokio::test]
async fn test_rejected_calls_leave_no_trace() {
    let pool = setup_test_db().await;
    let ledger = LedgerManager::new(pool.clone());
    let account = ledger.open_account(Uuid::new_v4(), 100).await.unwrap();

    for amount in [0, -50] {
        let err = ledger
            .record(OperationType::Income, account.user_id, amount, "roulette")
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidAmount(a) if a == amount));
    }

    assert_eq!(ledger.balance(account.user_id).await.unwrap(), 100);
    assert_eq!(ledger_row_count(&pool, account.user_id).await, 0);
}

#[tokio::test]
async fn test_outcome_does_not_check_sufficiency() {
    let pool = setup_test_db().await;
    let ledger = LedgerManager::new(pool.clone());
    let account = ledger.open_account(Uuid::new_v4(), 10).await.unwrap();

    let notice = ledger
        .record(OperationType::Outcome, account.user_id, 25, "roulette")
        .await
        .unwrap();
    assert_eq!(notice.balance, -15);
}

#[tokio::test]
async fn test_rolled_back_transaction_discards_movement() {
    let pool = setup_test_db().await;
    let ledger = LedgerManager::new(pool.clone());
    let account = ledger.open_account(Uuid::new_v4(), 1000).await.unwrap();

    {
        let mut tx = pool.begin().await.unwrap();
        ledger
            .income(&mut tx, account.user_id, 500, "roulette")
            .await
            .unwrap();
        tx.rollback().await.unwrap();
    }

    assert_eq!(ledger.balance(account.user_id).await.unwrap(), 1000);
    assert_eq!(ledger.delta_sum(account.user_id).await.unwrap(), 0);
}

#[tokio::test]
async fn test_account_lookup_and_errors() {
    let pool = setup_test_db().await;
    let ledger = LedgerManager::new(pool.clone());
    let external_id = Uuid::new_v4();

    let opened = ledger.open_account(external_id, 42).await.unwrap();
    let found = ledger.find_account(external_id).await.unwrap();
    assert_eq!(found.user_id, opened.user_id);
    assert_eq!(found.balance, 42);

    assert!(matches!(
        ledger.open_account(external_id, 1).await,
        Err(LedgerError::AccountExists(id)) if id == external_id
    ));
    assert!(matches!(
        ledger.open_account(Uuid::new_v4(), -1).await,
        Err(LedgerError::InvalidOpeningBalance(-1))
    ));
    assert!(matches!(
        ledger.find_account(Uuid::new_v4()).await,
        Err(LedgerError::UserNotFound(_))
    ));
    assert!(matches!(
        ledger
            .record(OperationType::Income, i64::MAX, 1, "roulette")
            .await,
        Err(LedgerError::BalanceNotFound(_))
    ));
}

#[tokio::test]
async fn test_concurrent_debits_are_all_recorded() {
    let pool = setup_test_db().await;
    let ledger = LedgerManager::new(pool.clone());
    let account = ledger.open_account(Uuid::new_v4(), 10_000).await.unwrap();

    let mut handles = Vec::new();
    for _ in 0..10 {
        let ledger = ledger.clone();
        let user_id = account.user_id;
        handles.push(tokio::spawn(async move {
            ledger
                .record(OperationType::Outcome, user_id, 100, "roulette")
                .await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(ledger.balance(account.user_id).await.unwrap(), 9_000);
    assert_eq!(ledger_row_count(&pool, account.user_id).await, 10);
}
