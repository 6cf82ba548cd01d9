//! Table configuration models.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::game::constants::{
    DEFAULT_DECK_COUNT, DEFAULT_DISCONNECT_GRACE_SECS, DEFAULT_MAX_BET, DEFAULT_MAX_SEATS,
    DEFAULT_MAX_SPLITS, DEFAULT_MIN_BET, DEFAULT_MISSED_ROUND_LIMIT,
    DEFAULT_RESHUFFLE_THRESHOLD_PCT, DEFAULT_STARTING_CHIPS, MAX_DECK_COUNT, MAX_SEATS,
};

/// Table speed variants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TableSpeed {
    Normal,
    Turbo,
    Hyper,
}

impl std::fmt::Display for TableSpeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TableSpeed::Normal => write!(f, "normal"),
            TableSpeed::Turbo => write!(f, "turbo"),
            TableSpeed::Hyper => write!(f, "hyper"),
        }
    }
}

impl std::str::FromStr for TableSpeed {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "normal" => Ok(Self::Normal),
            "turbo" => Ok(Self::Turbo),
            "hyper" => Ok(Self::Hyper),
            other => Err(format!("unknown table speed '{other}'")),
        }
    }
}

/// Table configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TableConfig {
    /// Table name
    pub name: String,

    /// Number of seats (default: 6)
    pub max_seats: usize,

    /// Smallest accepted bet
    pub min_bet: i64,

    /// Largest accepted bet
    pub max_bet: i64,

    /// Decks in the shoe (default: 6)
    pub deck_count: usize,

    /// Percentage of the shoe left when it gets rebuilt between rounds
    pub reshuffle_threshold_pct: u8,

    /// Table speed; scales the betting window and turn timeout
    pub speed: TableSpeed,

    /// How long a disconnected or leaving seat may hold its turn
    pub disconnect_grace_secs: u64,

    /// Splits allowed per seat per round (3 allows four hands)
    pub max_splits: u8,

    /// A seat is evicted once it misses more consecutive betting windows
    /// than this
    pub missed_round_limit: u32,

    pub allow_double_after_split: bool,

    /// Close the betting window as soon as every connected seat has bet
    pub close_betting_when_all_bet: bool,

    /// Balance given to players the chip store has never seen
    pub starting_chips: i64,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            name: "Default Table".to_string(),
            max_seats: DEFAULT_MAX_SEATS,
            min_bet: DEFAULT_MIN_BET,
            max_bet: DEFAULT_MAX_BET,
            deck_count: DEFAULT_DECK_COUNT,
            reshuffle_threshold_pct: DEFAULT_RESHUFFLE_THRESHOLD_PCT,
            speed: TableSpeed::Normal,
            disconnect_grace_secs: DEFAULT_DISCONNECT_GRACE_SECS,
            max_splits: DEFAULT_MAX_SPLITS,
            missed_round_limit: DEFAULT_MISSED_ROUND_LIMIT,
            allow_double_after_split: true,
            close_betting_when_all_bet: true,
            starting_chips: DEFAULT_STARTING_CHIPS,
        }
    }
}

impl TableConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("Table name must not be empty".to_string());
        }

        if self.max_seats == 0 || self.max_seats > MAX_SEATS {
            return Err(format!("Max seats must be between 1 and {MAX_SEATS}"));
        }

        if self.min_bet <= 0 {
            return Err("Min bet must be positive".to_string());
        }

        if self.max_bet < self.min_bet {
            return Err("Max bet must be at least the min bet".to_string());
        }

        if self.deck_count == 0 || self.deck_count > MAX_DECK_COUNT {
            return Err(format!("Deck count must be between 1 and {MAX_DECK_COUNT}"));
        }

        if self.reshuffle_threshold_pct > 75 {
            return Err("Reshuffle threshold must be at most 75%".to_string());
        }

        if self.starting_chips < 0 {
            return Err("Starting chips must not be negative".to_string());
        }

        Ok(())
    }

    /// Get betting window based on table speed
    pub fn betting_secs(&self) -> u64 {
        match self.speed {
            TableSpeed::Normal => 15,
            TableSpeed::Turbo => 10,
            TableSpeed::Hyper => 5,
        }
    }

    /// Get turn timeout based on table speed
    pub fn turn_timeout_secs(&self) -> u64 {
        match self.speed {
            TableSpeed::Normal => 30,
            TableSpeed::Turbo => 15,
            TableSpeed::Hyper => 8,
        }
    }

    pub fn betting_window(&self) -> Duration {
        Duration::from_secs(self.betting_secs())
    }

    pub fn turn_timeout(&self) -> Duration {
        Duration::from_secs(self.turn_timeout_secs())
    }

    pub fn disconnect_grace(&self) -> Duration {
        Duration::from_secs(self.disconnect_grace_secs)
    }
}
