//! # Roulette
//!
//! A provably fair roulette round engine with an auditable balance ledger.
//!
//! ## Architecture
//!
//! - [`fairness`]: HMAC-SHA512 draw generator with a monotonic nonce
//! - [`wheel`]: ordered probability table and outcome resolution
//! - [`ledger`]: atomic credit/debit with an append-only transaction log
//! - [`round`]: round state machine (start, bet, roll, settle)
//! - [`dispatch`]: delayed job queue with a fixed worker pool
//! - [`hub`]: single-owner publish/subscribe actor for live clients
//! - [`db`]: PostgreSQL pool and schema
//!
//! Bets placed on round N are settled when round N+1 rolls, at round N+1's
//! outcome. Settlement and bet placement each commit in one transaction;
//! notifications are scheduled only after commit and never roll anything
//! back.
//!
//! ## Example
//!
//! ```
//! use roulette::fairness::DrawGenerator;
//! use roulette::wheel::{Color, WheelTable};
//!
//! let wheel = WheelTable::default();
//! let draw = DrawGenerator::new().draw("client-seed", wheel.max_win_probability());
//! let slot = wheel.resolve(draw.stopping_value);
//!
//! assert!(matches!(slot.color, Color::Red | Color::Black | Color::Green));
//! ```

pub mod db;
pub mod dispatch;
pub mod fairness;
pub mod hub;
pub mod ledger;
pub mod round;
pub mod wheel;

pub use db::{Database, DatabaseConfig};
pub use dispatch::{Dispatcher, DispatcherConfig};
pub use fairness::{Draw, DrawGenerator, StoppingValue};
pub use hub::{HubActor, HubConfig, HubHandle};
pub use ledger::LedgerManager;
pub use round::{GameError, GameResult, RoundConfig, RoundManager};
pub use wheel::{Color, WheelConfig, WheelTable};
