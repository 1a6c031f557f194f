//! Integration tests for the round state machine.
//!
//! Requires PostgreSQL at `DATABASE_URL`. Tests that roll are serialized:
//! settlement targets the globally previous round.

use roulette::db::{DEFAULT_DATABASE_URL, Database, DatabaseConfig};
use roulette::dispatch::{Dispatcher, DispatcherConfig};
use roulette::fairness::{self, DrawGenerator};
use roulette::hub::{
    BALANCE_CHANNEL, Frame, HubActor, HubConfig, HubHandle, Payload, ROULETTE_CHANNEL,
};
use roulette::ledger::{Account, LedgerManager, OperationType};
use roulette::round::{GameError, RoundConfig, RoundManager, RoundPhase, Stake, repository};
use roulette::wheel::{Color, WheelTable};
use serial_test::serial;
use sqlx::PgPool;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use uuid::Uuid;

struct Harness {
    pool: Arc<PgPool>,
    hub: HubHandle,
    manager: Arc<RoundManager>,
}

async fn setup_test_db() -> Arc<PgPool> {
    let config = DatabaseConfig {
        database_url: std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string()),
        max_connections: 10,
        min_connections: 1,
        ..DatabaseConfig::development()
    };

    let db = Database::new(&config)
        .await
        .expect("Failed to create test database");
    db.run_migrations().await.expect("Failed to apply schema");

    Arc::new(db.pool().clone())
}

async fn build_manager(pool: Arc<PgPool>, hub: HubHandle) -> RoundManager {
    let (dispatcher, _workers) = Dispatcher::start(DispatcherConfig::default()).unwrap();
    let nonce = repository::next_nonce(&pool).await.unwrap();

    RoundManager::new(
        pool.clone(),
        LedgerManager::new(pool),
        DrawGenerator::starting_at(nonce),
        WheelTable::default(),
        dispatcher,
        hub,
        RoundConfig {
            settle_delay: Duration::from_millis(10),
            ..RoundConfig::default()
        },
    )
}

async fn setup() -> Harness {
    let pool = setup_test_db().await;
    let (actor, hub) = HubActor::new(HubConfig::default());
    tokio::spawn(actor.run());
    let manager = Arc::new(build_manager(pool.clone(), hub.clone()).await);

    Harness { pool, hub, manager }
}

async fn open_account(harness: &Harness, balance: i64) -> Account {
    harness
        .manager
        .ledger()
        .open_account(Uuid::new_v4(), balance)
        .await
        .unwrap()
}

fn stake(color: Color, amount: i64) -> Stake {
    Stake { color, amount }
}

/// Next frame with the given event name; an empty name matches any frame
async fn next_frame(frames: &mut mpsc::Receiver<Payload>, event: &str) -> Frame {
    loop {
        let payload = tokio::time::timeout(Duration::from_secs(5), frames.recv())
            .await
            .expect("timed out waiting for frame")
            .expect("hub closed");
        let frame: Frame = serde_json::from_str(&payload).unwrap();
        if event.is_empty() || frame.event == event {
            return frame;
        }
    }
}

#[tokio::test]
#[serial]
async fn test_sequences_strictly_increase() {
    let harness = setup().await;

    let mut last = 0;
    for _ in 0..5 {
        let round = harness.manager.start_round().await.unwrap();
        assert!(round.sequence > last);
        assert_eq!(round.phase(), RoundPhase::Open);
        last = round.sequence;
    }
}

#[tokio::test]
#[serial]
async fn test_concurrent_starts_get_distinct_sequences() {
    let harness = setup().await;
    let other = Arc::new(build_manager(harness.pool.clone(), harness.hub.clone()).await);

    let mut handles = Vec::new();
    for i in 0..8 {
        let manager = if i % 2 == 0 {
            harness.manager.clone()
        } else {
            other.clone()
        };
        handles.push(tokio::spawn(async move { manager.start_round().await }));
    }

    let mut sequences = HashSet::new();
    for handle in handles {
        let round = handle.await.unwrap().unwrap();
        assert!(sequences.insert(round.sequence), "duplicate sequence");
    }
    assert_eq!(sequences.len(), 8);
}

#[tokio::test]
#[serial]
async fn test_place_bet_debits_balance() {
    let harness = setup().await;
    let account = open_account(&harness, 1000).await;
    let round = harness.manager.start_round().await.unwrap();

    let placed = harness
        .manager
        .place_bet(
            round.external_id,
            account.external_id,
            &[stake(Color::Red, 100), stake(Color::Green, 50)],
        )
        .await
        .unwrap();

    assert_eq!(placed.round, round.external_id);
    assert_eq!(placed.bets.len(), 2);
    assert_eq!(placed.balance, 850);

    let ledger = harness.manager.ledger();
    assert_eq!(ledger.balance(account.user_id).await.unwrap(), 850);
    let rows = ledger.transactions(account.user_id, 10).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].delta, -150);
    assert_eq!(rows[0].operation_type, OperationType::Outcome);
}

#[tokio::test]
#[serial]
async fn test_bet_limit_per_round() {
    let harness = setup().await;
    let account = open_account(&harness, 1000).await;
    let round = harness.manager.start_round().await.unwrap();

    harness
        .manager
        .place_bet(
            round.external_id,
            account.external_id,
            &[stake(Color::Red, 10), stake(Color::Black, 10)],
        )
        .await
        .unwrap();

    let err = harness
        .manager
        .place_bet(round.external_id, account.external_id, &[stake(Color::Green, 10)])
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        GameError::BetLimitExceeded {
            existing: 2,
            requested: 1,
            limit: 2
        }
    ));

    let fresh = open_account(&harness, 1000).await;
    let err = harness
        .manager
        .place_bet(
            round.external_id,
            fresh.external_id,
            &[
                stake(Color::Red, 1),
                stake(Color::Black, 1),
                stake(Color::Green, 1),
            ],
        )
        .await
        .unwrap_err();
    assert!(matches!(err, GameError::BetLimitExceeded { .. }));

    let ledger = harness.manager.ledger();
    assert_eq!(ledger.balance(account.user_id).await.unwrap(), 980);
    assert_eq!(ledger.balance(fresh.user_id).await.unwrap(), 1000);
}

#[tokio::test]
#[serial]
async fn test_insufficient_funds_leaves_balance_untouched() {
    let harness = setup().await;
    let account = open_account(&harness, 100).await;
    let round = harness.manager.start_round().await.unwrap();

    let err = harness
        .manager
        .place_bet(
            round.external_id,
            account.external_id,
            &[stake(Color::Red, 60), stake(Color::Black, 60)],
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        GameError::InsufficientFunds {
            available: 100,
            required: 120
        }
    ));

    let ledger = harness.manager.ledger();
    assert_eq!(ledger.balance(account.user_id).await.unwrap(), 100);
    assert!(ledger.transactions(account.user_id, 10).await.unwrap().is_empty());
}

#[tokio::test]
#[serial]
async fn test_place_bet_rejects_unknown_ids_and_bad_stakes() {
    let harness = setup().await;
    let account = open_account(&harness, 100).await;
    let round = harness.manager.start_round().await.unwrap();

    let err = harness
        .manager
        .place_bet(Uuid::new_v4(), account.external_id, &[stake(Color::Red, 1)])
        .await
        .unwrap_err();
    assert!(matches!(err, GameError::RoundNotFound(_)));

    let missing_user = Uuid::new_v4();
    let err = harness
        .manager
        .place_bet(round.external_id, missing_user, &[stake(Color::Red, 1)])
        .await
        .unwrap_err();
    assert!(matches!(err, GameError::UserNotFound(id) if id == missing_user));

    for stakes in [vec![], vec![stake(Color::Red, 0)], vec![stake(Color::Black, -5)]] {
        let err = harness
            .manager
            .place_bet(round.external_id, account.external_id, &stakes)
            .await
            .unwrap_err();
        assert!(matches!(err, GameError::Validation(_)));
    }
}

#[tokio::test]
#[serial]
async fn test_roll_settles_previous_round() {
    let harness = setup().await;
    let round = harness.manager.start_round().await.unwrap();

    let mut players = Vec::new();
    for color in [Color::Red, Color::Black, Color::Green] {
        let account = open_account(&harness, 1000).await;
        harness
            .manager
            .place_bet(round.external_id, account.external_id, &[stake(color, 100)])
            .await
            .unwrap();
        players.push((color, account));
    }

    let summary = harness.manager.play_round().await.unwrap();
    assert_eq!(summary.round.sequence, round.sequence + 1);

    let settlement = summary.settlement.as_ref().expect("previous round settled");
    assert_eq!(settlement.round.external_id, round.external_id);
    assert_eq!(settlement.round.phase(), RoundPhase::Closed);

    let winner = summary.outcome.color;
    let multiplier = harness.manager.wheel().multiplier(winner).unwrap();
    assert_eq!(settlement.payouts.len(), 1);
    assert_eq!(settlement.total_paid(), 100 * multiplier);
    assert_eq!(summary.notices.len(), 1);

    let ledger = harness.manager.ledger();
    for (color, account) in &players {
        let balance = ledger.balance(account.user_id).await.unwrap();
        if *color == winner {
            assert_eq!(balance, 900 + 100 * multiplier);
            assert_eq!(
                balance,
                1000 + ledger.delta_sum(account.user_id).await.unwrap()
            );
        } else {
            assert_eq!(balance, 900);
        }
    }

    let closed = harness.manager.round(round.external_id).await.unwrap();
    assert_eq!(closed.phase(), RoundPhase::Closed);

    let late = open_account(&harness, 100).await;
    let err = harness
        .manager
        .place_bet(round.external_id, late.external_id, &[stake(Color::Red, 10)])
        .await
        .unwrap_err();
    assert!(matches!(err, GameError::RoundClosed(id) if id == round.external_id));
    assert_eq!(ledger.balance(late.user_id).await.unwrap(), 100);
}

#[tokio::test]
#[serial]
async fn test_roll_persists_verifiable_draw() {
    let harness = setup().await;
    let round = harness.manager.start_round().await.unwrap();

    let err = harness.manager.get_draw(round.external_id).await.unwrap_err();
    assert!(matches!(err, GameError::DrawNotFound(_)));

    let summary = harness.manager.roll(round.external_id).await.unwrap();
    let record = harness.manager.get_draw(round.external_id).await.unwrap();

    assert_eq!(record.round, round.external_id);
    assert_eq!(record.sequence, round.sequence);
    assert_eq!(record.game_tag, "roulette");
    assert_eq!(record.color, summary.outcome.color);
    assert_eq!(record.number, summary.outcome.number);
    assert_eq!(record.draw, summary.draw);
    assert!(fairness::verify(&record.draw));
    assert_eq!(
        harness.manager.wheel().resolve(record.draw.stopping_value).color,
        record.color
    );

    let err = harness.manager.roll(round.external_id).await.unwrap_err();
    assert!(matches!(err, GameError::AlreadyRolled(_)));

    let err = harness.manager.get_draw(Uuid::new_v4()).await.unwrap_err();
    assert!(matches!(err, GameError::RoundNotFound(_)));
}

#[tokio::test]
#[serial]
async fn test_nonce_resumes_from_storage() {
    let harness = setup().await;

    let first = harness.manager.play_round().await.unwrap();
    let second = harness.manager.play_round().await.unwrap();
    assert_eq!(second.draw.nonce, first.draw.nonce + 1);

    let resumed = repository::next_nonce(&harness.pool).await.unwrap();
    assert_eq!(resumed, second.draw.nonce + 1);
    assert_eq!(harness.manager.next_nonce(), resumed);
}

#[tokio::test]
#[serial]
async fn test_subscribers_receive_round_events() {
    let harness = setup().await;
    let (subscriber, mut frames) = harness.hub.register(64);
    harness
        .hub
        .subscribe(&subscriber, ROULETTE_CHANNEL)
        .await
        .unwrap();
    harness
        .hub
        .subscribe(&subscriber, BALANCE_CHANNEL)
        .await
        .unwrap();

    let account = open_account(&harness, 500).await;
    let round = harness.manager.start_round().await.unwrap();

    let start = next_frame(&mut frames, "start").await;
    assert_eq!(start.channel, ROULETTE_CHANNEL);
    assert_eq!(start.data["uuid"], round.external_id.to_string());
    assert_eq!(start.data["round"], round.sequence);

    harness
        .manager
        .place_bet(round.external_id, account.external_id, &[stake(Color::Red, 50)])
        .await
        .unwrap();
    let debit = next_frame(&mut frames, "outcome-event").await;
    assert_eq!(debit.channel, BALANCE_CHANNEL);
    assert_eq!(debit.data["amount"], 50);
    assert_eq!(debit.data["balance"], 450);

    let summary = harness.manager.play_round().await.unwrap();

    // Winner and close notices share the settle delay; arrival order is free
    let mut winner = None;
    let mut closed = None;
    while winner.is_none() || closed.is_none() {
        let frame = next_frame(&mut frames, "").await;
        match frame.event.as_str() {
            "winner" => winner = Some(frame),
            "closed" => closed = Some(frame),
            _ => {}
        }
    }

    let winner = winner.unwrap();
    assert_eq!(winner.data["color"], summary.outcome.color.as_str());
    assert_eq!(winner.data["number"], summary.outcome.number);

    let closed = closed.unwrap();
    assert_eq!(closed.data["uuid"], round.external_id.to_string());
    assert_eq!(closed.data["round"], round.sequence);
}

#[tokio::test]
#[serial]
async fn test_concurrent_bets_respect_limit() {
    let harness = setup().await;
    let account = open_account(&harness, 10_000).await;
    let round = harness.manager.start_round().await.unwrap();

    let mut handles = Vec::new();
    for _ in 0..6 {
        let manager = harness.manager.clone();
        let (round_id, user_id) = (round.external_id, account.external_id);
        handles.push(tokio::spawn(async move {
            manager
                .place_bet(round_id, user_id, &[stake(Color::Red, 10)])
                .await
        }));
    }

    let mut accepted = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => accepted += 1,
            Err(err) => assert!(matches!(err, GameError::BetLimitExceeded { .. })),
        }
    }
    assert_eq!(accepted, 2);

    let mut conn = harness.pool.acquire().await.unwrap();
    let rows = repository::count_bets(&mut conn, round.id, account.user_id)
        .await
        .unwrap();
    assert_eq!(rows, 2);

    let ledger = harness.manager.ledger();
    assert_eq!(ledger.balance(account.user_id).await.unwrap(), 9_980);
    assert_eq!(ledger.transactions(account.user_id, 10).await.unwrap().len(), 2);
}

#[tokio::test]
#[serial]
async fn test_failed_payout_rolls_back_whole_settlement() {
    let harness = setup().await;
    let round = harness.manager.start_round().await.unwrap();

    // Ordinary bettors are credited before the oversized ones
    let mut players = Vec::new();
    for color in [Color::Red, Color::Black, Color::Green] {
        let account = open_account(&harness, 1000).await;
        harness
            .manager
            .place_bet(round.external_id, account.external_id, &[stake(color, 100)])
            .await
            .unwrap();
        players.push((color, account));
    }

    let mut whales = Vec::new();
    for color in [Color::Red, Color::Black, Color::Green] {
        let account = open_account(&harness, 1000).await;
        harness
            .manager
            .place_bet(round.external_id, account.external_id, &[stake(color, 100)])
            .await
            .unwrap();
        whales.push(account);
    }

    // Any credit to these balances leaves the BIGINT range
    for whale in &whales {
        sqlx::query("UPDATE user_balances SET balance = $1 WHERE user_id = $2")
            .bind(i64::MAX - 10)
            .bind(whale.user_id)
            .execute(harness.pool.as_ref())
            .await
            .unwrap();
    }

    let err = harness.manager.play_round().await.unwrap_err();
    assert!(matches!(err, GameError::Persistence(_)), "unexpected error: {err:?}");

    let ledger = harness.manager.ledger();
    for (_, account) in &players {
        assert_eq!(ledger.balance(account.user_id).await.unwrap(), 900);
        assert_eq!(ledger.transactions(account.user_id, 10).await.unwrap().len(), 1);
    }
    let reopened = harness.manager.round(round.external_id).await.unwrap();
    assert_eq!(reopened.phase(), RoundPhase::Open);

    // With sane balances the same round settles on the next roll
    for whale in &whales {
        sqlx::query("UPDATE user_balances SET balance = 900 WHERE user_id = $1")
            .bind(whale.user_id)
            .execute(harness.pool.as_ref())
            .await
            .unwrap();
    }

    let summary = harness.manager.play_round().await.unwrap();
    let settlement = summary.settlement.as_ref().expect("previous round settled");
    assert_eq!(settlement.round.external_id, round.external_id);
    assert_eq!(settlement.payouts.len(), 2);

    let winner = summary.outcome.color;
    let multiplier = harness.manager.wheel().multiplier(winner).unwrap();
    for (color, account) in &players {
        let expected = if *color == winner { 900 + 100 * multiplier } else { 900 };
        assert_eq!(ledger.balance(account.user_id).await.unwrap(), expected);
    }
}
