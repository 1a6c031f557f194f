//! Round data models and event payloads.

use crate::fairness::Draw;
use crate::ledger::BalanceNotice;
use crate::wheel::Color;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// Tag recorded on every draw and ledger row produced by this game
pub const GAME_TAG: &str = "roulette";

/// Round lifecycle.
///
/// Round N accepts bets until round N+1 rolls. That roll moves N through
/// `Rolling` (inside the roll transaction, while N's winning bets are paid)
/// to `Closed`. Only `Open` and `Closed` are ever persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoundPhase {
    Open,
    Rolling,
    Closed,
}

/// Round settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundConfig {
    /// Delay before winner and close notices go out
    pub settle_delay: Duration,
    /// Bet rows a user may hold on one round
    pub max_bets_per_round: usize,
}

impl Default for RoundConfig {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_secs(15),
            max_bets_per_round: 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Round {
    pub id: i64,
    pub external_id: Uuid,
    pub sequence: i64,
    pub played_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Round {
    /// Persisted phase
    pub fn phase(&self) -> RoundPhase {
        if self.played_at.is_some() {
            RoundPhase::Closed
        } else {
            RoundPhase::Open
        }
    }
}

/// One requested stake
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stake {
    pub color: Color,
    /// Minor units
    pub amount: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bet {
    pub id: i64,
    pub round_id: i64,
    pub user_id: i64,
    pub color: Color,
    pub amount: i64,
    pub created_at: DateTime<Utc>,
}

/// Winning color and pocket of a round
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outcome {
    pub round_id: i64,
    pub color: Color,
    pub number: u8,
    pub created_at: DateTime<Utc>,
}

/// Result of a successful bet placement
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlacedBets {
    pub round: Uuid,
    pub bets: Vec<Bet>,
    /// Balance after the debit
    pub balance: i64,
}

/// Credit paid for one winning bet
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Payout {
    pub bet_id: i64,
    pub user_id: i64,
    pub amount: i64,
}

/// The round closed by a roll, with everything paid for it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Settlement {
    pub round: Round,
    pub payouts: Vec<Payout>,
}

impl Settlement {
    pub fn total_paid(&self) -> i64 {
        self.payouts.iter().map(|p| p.amount).sum()
    }
}

/// Everything a roll produced
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RollSummary {
    pub round: Round,
    pub draw: Draw,
    pub outcome: Outcome,
    /// `None` when there was no open previous round
    pub settlement: Option<Settlement>,
    #[serde(skip)]
    pub notices: Vec<BalanceNotice>,
}

/// Persisted provably fair record of a round
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DrawRecord {
    pub round: Uuid,
    pub sequence: i64,
    pub game_tag: String,
    pub color: Color,
    pub number: u8,
    pub draw: Draw,
    pub created_at: DateTime<Utc>,
}

/// `roulette` / `start`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundStarted {
    pub uuid: Uuid,
    pub round: i64,
    pub created_at: DateTime<Utc>,
}

impl From<&Round> for RoundStarted {
    fn from(round: &Round) -> Self {
        Self {
            uuid: round.external_id,
            round: round.sequence,
            created_at: round.created_at,
        }
    }
}

/// `roulette` / `winner`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WinnerAnnounced {
    pub color: Color,
    pub number: u8,
}

/// `roulette` / `closed`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundClosed {
    pub uuid: Uuid,
    pub round: i64,
}
