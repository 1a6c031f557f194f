//! Round state machine: start, place bets, roll and settle.

use super::{
    errors::{GameError, GameResult},
    jobs::SendEventJob,
    models::{
        Bet, DrawRecord, GAME_TAG, Outcome, Payout, PlacedBets, RollSummary, Round, RoundClosed,
        RoundConfig, RoundPhase, RoundStarted, Settlement, Stake, WinnerAnnounced,
    },
    repository,
};
use crate::{
    dispatch::Dispatcher,
    fairness::{self, DrawGenerator},
    hub::{BALANCE_CHANNEL, HubHandle, ROULETTE_CHANNEL},
    ledger::{BalanceNotice, LedgerManager},
    wheel::{self, Slot, WheelTable},
};
use serde::Serialize;
use sqlx::{PgPool, Postgres, Transaction};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Orchestrates rounds over the draw generator, wheel, ledger, dispatcher
/// and hub.
///
/// Every operation runs in one storage transaction. Notifications that must
/// not roll anything back are scheduled through the dispatcher only after
/// commit.
pub struct RoundManager {
    pool: Arc<PgPool>,
    ledger: LedgerManager,
    generator: DrawGenerator,
    wheel: WheelTable,
    dispatcher: Dispatcher,
    hub: HubHandle,
    config: RoundConfig,

    /// Fast-path hint for the next sequence number. Never authoritative:
    /// the persisted maximum is read under the round lock every time.
    next_sequence: RwLock<Option<i64>>,
}

impl RoundManager {
    pub fn new(
        pool: Arc<PgPool>,
        ledger: LedgerManager,
        generator: DrawGenerator,
        wheel: WheelTable,
        dispatcher: Dispatcher,
        hub: HubHandle,
        config: RoundConfig,
    ) -> Self {
        Self {
            pool,
            ledger,
            generator,
            wheel,
            dispatcher,
            hub,
            config,
            next_sequence: RwLock::new(None),
        }
    }

    pub fn wheel(&self) -> &WheelTable {
        &self.wheel
    }

    pub fn ledger(&self) -> &LedgerManager {
        &self.ledger
    }

    /// Nonce the next draw will use
    pub fn next_nonce(&self) -> u64 {
        self.generator.next_nonce()
    }

    /// Open a new round and announce it.
    ///
    /// The `start` event is published before commit; if the hub is down the
    /// round is not persisted.
    pub async fn start_round(&self) -> GameResult<Round> {
        let mut tx = self.pool.begin().await?;
        let round = self.open_round(&mut tx).await?;
        self.announce(&round).await?;
        tx.commit().await?;

        self.remember(round.sequence).await;
        log::info!("Round {} ({}) started", round.sequence, round.external_id);

        Ok(round)
    }

    /// Place up to the per-round limit of stakes for a user.
    ///
    /// The debit and the bet rows commit together or not at all.
    ///
    /// # Errors
    ///
    /// * `GameError::Validation` - Empty stake list, non-positive amounts
    /// * `GameError::RoundNotFound` / `GameError::UserNotFound`
    /// * `GameError::RoundClosed` - The round has already been settled
    /// * `GameError::InsufficientFunds` - Total stake exceeds the balance
    /// * `GameError::BetLimitExceeded` - Too many bets on this round
    pub async fn place_bet(
        &self,
        round_id: Uuid,
        user_id: Uuid,
        stakes: &[Stake],
    ) -> GameResult<PlacedBets> {
        let total = self.validate_stakes(stakes)?;

        let mut tx = self.pool.begin().await?;

        let round = repository::find_round_for_bets(&mut *tx, round_id)
            .await?
            .ok_or(GameError::RoundNotFound(round_id))?;
        if round.phase() != RoundPhase::Open {
            return Err(GameError::RoundClosed(round_id));
        }

        // Locks the balance row, serializing bets from the same user
        let account = self.ledger.lock_account(&mut tx, user_id).await?;
        if account.balance < 0 || account.balance < total {
            return Err(GameError::InsufficientFunds {
                available: account.balance,
                required: total,
            });
        }

        let existing = repository::count_bets(&mut *tx, round.id, account.user_id).await? as usize;
        if existing + stakes.len() > self.config.max_bets_per_round {
            return Err(GameError::BetLimitExceeded {
                existing,
                requested: stakes.len(),
                limit: self.config.max_bets_per_round,
            });
        }

        let notice = self
            .ledger
            .outcome(&mut tx, account.user_id, total, GAME_TAG)
            .await?;

        let mut bets: Vec<Bet> = Vec::with_capacity(stakes.len());
        for stake in stakes {
            let bet = repository::insert_bet(
                &mut *tx,
                round.id,
                account.user_id,
                stake.color,
                stake.amount,
            )
            .await?;
            bets.push(bet);
        }

        tx.commit().await?;

        log::info!(
            "User {} placed {} bet(s) totalling {} on round {}",
            user_id,
            bets.len(),
            total,
            round.sequence
        );

        let balance = notice.balance;
        self.notify_balance(&notice);

        Ok(PlacedBets {
            round: round.external_id,
            bets,
            balance,
        })
    }

    /// Roll an existing round and settle the round before it
    pub async fn roll(&self, round_id: Uuid) -> GameResult<RollSummary> {
        let mut tx = self.pool.begin().await?;
        let round = repository::find_round(&mut *tx, round_id)
            .await?
            .ok_or(GameError::RoundNotFound(round_id))?;

        let summary = self.roll_round(&mut tx, round).await?;
        tx.commit().await?;

        self.schedule_notices(&summary);
        Ok(summary)
    }

    /// Start a round and roll it in a single transaction
    pub async fn play_round(&self) -> GameResult<RollSummary> {
        let mut tx = self.pool.begin().await?;
        let round = self.open_round(&mut tx).await?;
        let summary = self.roll_round(&mut tx, round).await?;
        self.announce(&summary.round).await?;
        tx.commit().await?;

        self.remember(summary.round.sequence).await;
        self.schedule_notices(&summary);
        Ok(summary)
    }

    /// Look up a round by external id
    pub async fn round(&self, round_id: Uuid) -> GameResult<Round> {
        let mut conn = self.pool.acquire().await?;
        repository::find_round(&mut conn, round_id)
            .await?
            .ok_or(GameError::RoundNotFound(round_id))
    }

    /// Persisted provably fair record of a rolled round
    pub async fn get_draw(&self, round_id: Uuid) -> GameResult<DrawRecord> {
        if let Some(record) = repository::find_draw_record(&self.pool, round_id).await? {
            return Ok(record);
        }

        // Tell an unknown round apart from one that has not been rolled yet
        self.round(round_id).await?;
        Err(GameError::DrawNotFound(round_id))
    }

    fn validate_stakes(&self, stakes: &[Stake]) -> GameResult<i64> {
        if stakes.is_empty() {
            return Err(GameError::Validation(
                "at least one stake is required".to_string(),
            ));
        }
        if stakes.len() > self.config.max_bets_per_round {
            return Err(GameError::BetLimitExceeded {
                existing: 0,
                requested: stakes.len(),
                limit: self.config.max_bets_per_round,
            });
        }

        stakes.iter().try_fold(0i64, |total, stake| {
            if stake.amount <= 0 {
                return Err(GameError::Validation(format!(
                    "stake amount must be positive, got {}",
                    stake.amount
                )));
            }
            if self.wheel.multiplier(stake.color).is_none() {
                return Err(GameError::Validation(format!(
                    "{} is not on the wheel",
                    stake.color
                )));
            }
            total
                .checked_add(stake.amount)
                .ok_or_else(|| GameError::Validation("total stake is too large".to_string()))
        })
    }

    /// Insert the next round under the round lock
    async fn open_round(&self, tx: &mut Transaction<'_, Postgres>) -> GameResult<Round> {
        repository::lock_rounds(&mut **tx).await?;

        let persisted = repository::last_sequence(&mut **tx).await? + 1;
        let hint = *self.next_sequence.read().await;
        let sequence = hint.map_or(persisted, |hint| hint.max(persisted));

        Ok(repository::insert_round(&mut **tx, sequence).await?)
    }

    async fn remember(&self, sequence: i64) {
        let mut hint = self.next_sequence.write().await;
        *hint = Some(hint.map_or(sequence + 1, |h| h.max(sequence + 1)));
    }

    async fn announce(&self, round: &Round) -> GameResult<()> {
        self.hub
            .broadcast(ROULETTE_CHANNEL, "start", &RoundStarted::from(round))
            .await?;
        Ok(())
    }

    /// Draw, resolve, persist the audit trail, then settle the previous round.
    /// Any error leaves the caller's transaction to roll back as a whole.
    async fn roll_round(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        round: Round,
    ) -> GameResult<RollSummary> {
        repository::lock_rounds(&mut **tx).await?;
        if repository::draw_exists(&mut **tx, round.id).await? {
            return Err(GameError::AlreadyRolled(round.external_id));
        }

        let client_seed = fairness::new_client_seed();
        let draw = self
            .generator
            .draw(&client_seed, self.wheel.max_win_probability());
        let slot = *self.wheel.resolve(draw.stopping_value);
        let number = wheel::winning_number(slot.color, &draw.result_hash);

        let outcome: Outcome =
            repository::insert_outcome(&mut **tx, round.id, slot.color, number).await?;
        repository::insert_draw(&mut **tx, round.id, GAME_TAG, &draw).await?;

        log::info!(
            "Round {} rolled: stop={} color={} number={} nonce={}",
            round.sequence,
            draw.stopping_value,
            slot.color,
            number,
            draw.nonce
        );

        let (settlement, notices) = match repository::previous_round(&mut **tx, round.sequence)
            .await?
        {
            Some(previous) if previous.phase() == RoundPhase::Open => {
                let (settlement, notices) = self.settle(tx, previous, slot).await?;
                (Some(settlement), notices)
            }
            _ => (None, Vec::new()),
        };

        Ok(RollSummary {
            round,
            draw,
            outcome,
            settlement,
            notices,
        })
    }

    /// Close `previous` and pay every bet on the winning color
    async fn settle(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        previous: Round,
        slot: Slot,
    ) -> GameResult<(Settlement, Vec<BalanceNotice>)> {
        // Takes the row lock; in-flight bets on this round finish first
        let closed = repository::mark_played(&mut **tx, previous.id).await?;
        let winners = repository::winning_bets(&mut **tx, previous.id, slot.color).await?;

        let mut payouts = Vec::with_capacity(winners.len());
        let mut notices = Vec::with_capacity(winners.len());
        for bet in winners {
            let amount = bet
                .amount
                .checked_mul(slot.multiplier)
                .ok_or(GameError::PayoutOverflow(bet.id))?;
            let notice = self.ledger.income(tx, bet.user_id, amount, GAME_TAG).await?;

            payouts.push(Payout {
                bet_id: bet.id,
                user_id: bet.user_id,
                amount,
            });
            notices.push(notice);
        }

        log::info!(
            "Round {} settled: {} winning bet(s) on {}",
            closed.sequence,
            payouts.len(),
            slot.color
        );

        Ok((
            Settlement {
                round: closed,
                payouts,
            },
            notices,
        ))
    }

    fn schedule_notices(&self, summary: &RollSummary) {
        for notice in &summary.notices {
            self.notify_balance(notice);
        }

        let delay = self.config.settle_delay;
        self.schedule(
            ROULETTE_CHANNEL,
            "winner",
            &WinnerAnnounced {
                color: summary.outcome.color,
                number: summary.outcome.number,
            },
            delay,
        );

        if let Some(settlement) = &summary.settlement {
            self.schedule(
                ROULETTE_CHANNEL,
                "closed",
                &RoundClosed {
                    uuid: settlement.round.external_id,
                    round: settlement.round.sequence,
                },
                delay,
            );
        }
    }

    fn notify_balance(&self, notice: &BalanceNotice) {
        self.schedule(BALANCE_CHANNEL, notice.event_name(), notice, Duration::ZERO);
    }

    fn schedule<T: Serialize>(&self, channel: &str, event: &str, data: &T, delay: Duration) {
        match SendEventJob::new(self.hub.clone(), channel, event, data) {
            Ok(job) => self.dispatcher.dispatch(job, delay),
            Err(e) => log::error!("Failed to build {channel}/{event} notice: {e}"),
        }
    }
}
