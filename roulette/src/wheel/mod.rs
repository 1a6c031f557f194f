//! Wheel probability table and outcome resolution.

pub mod config;
pub mod resolver;

pub use config::{Color, SlotConfig, WheelConfig, WheelError};
pub use resolver::{Slot, WheelTable, winning_number};
