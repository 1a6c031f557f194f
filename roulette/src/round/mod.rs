//! Round state machine.
//!
//! A round is opened by [`RoundManager::start_round`], accepts bets through
//! [`RoundManager::place_bet`] and is closed when the *next* round rolls:
//! rolling round N draws N's outcome and pays the bets placed on round N-1
//! at that outcome's multiplier. Settlement is all-or-nothing inside the
//! roll transaction.
//!
//! After commit the machine schedules notices through the dispatcher:
//! balance movements right away, the winner and close notices after the
//! configured settle delay.

pub mod errors;
pub mod jobs;
pub mod machine;
pub mod models;
pub mod repository;

pub use errors::{ErrorKind, GameError, GameResult};
pub use jobs::SendEventJob;
pub use machine::RoundManager;
pub use models::{
    Bet, DrawRecord, GAME_TAG, Outcome, Payout, PlacedBets, RollSummary, Round, RoundClosed,
    RoundConfig, RoundPhase, RoundStarted, Settlement, Stake, WinnerAnnounced,
};
