//! # Blackjack Table
//!
//! A multiplayer blackjack table engine built around a type-safe finite
//! state machine (FSM).
//!
//! The library seats players, runs timed betting windows, deals from a
//! multi-deck shoe, enforces turn order and action legality, plays the
//! dealer by fixed rules and settles every hand. Each table runs in its own
//! tokio task; transports talk to tables through [`table::TableManager`].
//!
//! ## Architecture
//!
//! A round moves through 7 phases, each a distinct type wrapped by
//! `enum_dispatch`:
//!
//! - **Waiting**: No round in progress
//! - **Betting**: Countdown during which each seat may place one bet
//! - **Dealing**: Two cards to every seat with a bet, two to the dealer
//! - **PlayerTurns**: Hit, stand, double, split or surrender, hand by hand
//! - **DealerTurn**: Hole card revealed, dealer draws to 17
//! - **Settlement**: Every hand paid, pushed or collected
//! - **Finished**: Results on display until the next round
//!
//! Dealing, DealerTurn and Settlement never wait for input; the table runs
//! through them inside the command or timer event that reached them.
//!
//! ## Core Modules
//!
//! - [`game`]: Cards, hand evaluation, the round state machine and snapshots
//! - [`table`]: Table actors, the table registry and table configuration
//! - [`wallet`]: Chip balances and the settlement ledger
//! - [`db`]: PostgreSQL connection pooling
//!
//! ## Example
//!
//! ```
//! use blackjack_table::{TableState, TableStateManagement, game::Phase};
//! use blackjack_table::table::TableConfig;
//!
//! // Create a new table waiting for players
//! let table = TableState::new(1, TableConfig::default()).unwrap();
//! assert_eq!(table.phase(), Phase::Waiting);
//! ```

/// PostgreSQL connection pooling.
pub mod db;

/// Core game logic, round state machine and client projections.
pub mod game;
pub use game::{
    ActionKind, Chips, Phase, PlayerId, Rejection, SeatManagement, TableError, TableResult,
    TableSnapshot, TableState, TableStateManagement,
    constants::{self, DEFAULT_MAX_SEATS, MAX_SEATS},
};

/// Table actors and the table registry.
pub mod table;

/// Chip persistence.
pub mod wallet;
