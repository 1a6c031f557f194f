//! Wheel configuration models.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Wheel colors (bet categories)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Color {
    Red,
    Black,
    Green,
}

impl Color {
    pub fn as_str(self) -> &'static str {
        match self {
            Color::Red => "red",
            Color::Black => "black",
            Color::Green => "green",
        }
    }
}

impl std::fmt::Display for Color {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Color {
    type Err = WheelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "red" => Ok(Color::Red),
            "black" => Ok(Color::Black),
            "green" => Ok(Color::Green),
            other => Err(WheelError::UnknownColor(other.to_string())),
        }
    }
}

/// One entry of the probability table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotConfig {
    pub color: Color,

    /// Probability in percent of the domain (e.g. 46.6)
    pub probability: f64,

    /// Payout multiplier applied to the stake
    pub multiplier: i64,
}

/// Wheel configuration.
///
/// `slots` is ordered; resolution walks it in declaration order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WheelConfig {
    pub slots: Vec<SlotConfig>,

    /// Upper bound of the stopping value domain (default: 100)
    pub max_win_probability: u32,
}

impl WheelConfig {
    /// Load a wheel table from a JSON file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, WheelError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| WheelError::Io(format!("{}: {}", path.display(), e)))?;
        serde_json::from_str(&raw).map_err(|e| WheelError::Parse(e.to_string()))
    }
}

impl Default for WheelConfig {
    fn default() -> Self {
        Self {
            slots: vec![
                SlotConfig {
                    color: Color::Red,
                    probability: 46.6,
                    multiplier: 2,
                },
                SlotConfig {
                    color: Color::Black,
                    probability: 46.6,
                    multiplier: 2,
                },
                SlotConfig {
                    color: Color::Green,
                    probability: 6.8,
                    multiplier: 14,
                },
            ],
            max_win_probability: 100,
        }
    }
}

/// Wheel configuration errors
#[derive(Debug, Error, PartialEq)]
pub enum WheelError {
    #[error("wheel table has no slots")]
    Empty,

    #[error("color {0} appears more than once")]
    DuplicateColor(Color),

    #[error("probability for {color} must be positive, got {probability}")]
    InvalidProbability { color: Color, probability: f64 },

    #[error("multiplier for {color} must be positive, got {multiplier}")]
    InvalidMultiplier { color: Color, multiplier: i64 },

    #[error("probabilities sum to {sum} but the domain maximum is {max}")]
    SumMismatch { sum: f64, max: u32 },

    #[error("domain maximum must be between 1 and 100, got {0}")]
    InvalidDomain(u32),

    #[error("unknown color: {0}")]
    UnknownColor(String),

    #[error("failed to read wheel config: {0}")]
    Io(String),

    #[error("failed to parse wheel config: {0}")]
    Parse(String),
}
