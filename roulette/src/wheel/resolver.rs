//! Cumulative-probability outcome resolution.

use super::config::{Color, WheelConfig, WheelError};
use crate::fairness::StoppingValue;
use serde::Serialize;
use std::collections::HashSet;

/// Pockets per colored section of the wheel
const NUMBERS_PER_COLOR: u8 = 7;

/// Validated slot with its weight in hundredths
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Slot {
    pub color: Color,
    pub weight: u32,
    pub multiplier: i64,
}

/// Validated, ordered probability table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WheelTable {
    slots: Vec<Slot>,
    max_win_probability: u32,
}

impl WheelTable {
    /// Validate a wheel configuration and convert probabilities to hundredths
    ///
    /// # Errors
    ///
    /// * `WheelError::Empty` - No slots configured
    /// * `WheelError::DuplicateColor` - A color appears twice
    /// * `WheelError::SumMismatch` - Probabilities do not add up to the domain maximum
    pub fn new(config: &WheelConfig) -> Result<Self, WheelError> {
        if config.max_win_probability == 0 || config.max_win_probability > 100 {
            return Err(WheelError::InvalidDomain(config.max_win_probability));
        }
        if config.slots.is_empty() {
            return Err(WheelError::Empty);
        }

        let mut seen = HashSet::new();
        let mut slots = Vec::with_capacity(config.slots.len());
        let mut total: u64 = 0;

        for slot in &config.slots {
            if !seen.insert(slot.color) {
                return Err(WheelError::DuplicateColor(slot.color));
            }
            if !slot.probability.is_finite() || slot.probability <= 0.0 {
                return Err(WheelError::InvalidProbability {
                    color: slot.color,
                    probability: slot.probability,
                });
            }
            if slot.multiplier <= 0 {
                return Err(WheelError::InvalidMultiplier {
                    color: slot.color,
                    multiplier: slot.multiplier,
                });
            }

            let weight = (slot.probability * 100.0).round() as u32;
            total += u64::from(weight);
            slots.push(Slot {
                color: slot.color,
                weight,
                multiplier: slot.multiplier,
            });
        }

        if total != u64::from(config.max_win_probability) * 100 {
            return Err(WheelError::SumMismatch {
                sum: total as f64 / 100.0,
                max: config.max_win_probability,
            });
        }

        Ok(Self {
            slots,
            max_win_probability: config.max_win_probability,
        })
    }

    /// Resolve the winning slot for a stopping value.
    ///
    /// Walks the slots in declaration order and returns the first whose
    /// cumulative weight is `>= stop`. A stop beyond the cumulative total
    /// falls to the last slot.
    pub fn resolve(&self, stop: StoppingValue) -> &Slot {
        let target = stop.hundredths();
        let mut cumulative = 0u32;

        for slot in &self.slots {
            cumulative += slot.weight;
            if cumulative >= target {
                return slot;
            }
        }

        // `new` rejects empty tables
        &self.slots[self.slots.len() - 1]
    }

    /// Payout multiplier for a color, if it is on the wheel
    pub fn multiplier(&self, color: Color) -> Option<i64> {
        self.slots
            .iter()
            .find(|slot| slot.color == color)
            .map(|slot| slot.multiplier)
    }

    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    pub fn max_win_probability(&self) -> u32 {
        self.max_win_probability
    }
}

impl Default for WheelTable {
    fn default() -> Self {
        Self::new(&WheelConfig::default()).expect("default wheel config is valid")
    }
}

/// Pocket number shown for a winning color.
///
/// Red covers 1..=7, black 8..=14 and green is 0. The pocket is read from hex
/// digits 5..7 of the draw digest, so it is reproducible from the draw record.
pub fn winning_number(color: Color, result_hash: &str) -> u8 {
    let byte = result_hash
        .get(5..7)
        .and_then(|digits| u8::from_str_radix(digits, 16).ok())
        .unwrap_or(0);

    match color {
        Color::Red => 1 + byte % NUMBERS_PER_COLOR,
        Color::Black => 1 + NUMBERS_PER_COLOR + byte % NUMBERS_PER_COLOR,
        Color::Green => 0,
    }
}
