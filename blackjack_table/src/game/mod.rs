//! Blackjack table engine - core FSM and round logic.
//!
//! This module provides the foundational table implementation including:
//! - Cards, the multi-deck shoe and hand evaluation
//! - Seats and the dealer's fixed drawing policy
//! - A type-safe finite state machine with 7 round phases
//! - Settlement, round reports and per-player snapshots

pub mod card;
pub mod constants;
pub mod dealer;
pub mod errors;
pub mod hand;
pub mod seat;
pub mod settlement;
pub mod state_machine;
pub mod states;
pub mod view;

pub use card::{Card, Rank, Shoe, ShoeError, Suit};
pub use dealer::{Dealer, should_hit};
pub use errors::{IllegalActionReason, Rejection, TableError, TableResult};
pub use hand::{Hand, HandValue, evaluate};
pub use seat::{LeaveOutcome, Seat};
pub use settlement::{ChipDelta, DealerResult, HandSettlement, Outcome, RoundReport, settle_hand};
pub use state_machine::{
    Game, SeatManagement, TableData, TableEvent, TableState, TableStateManagement,
};
pub use states::{ActionKind, Phase, TurnPointer};
pub use view::{DealerView, HandView, SeatView, TableSnapshot};

/// Chip amounts. Signed so that net results can be negative.
pub type Chips = i64;

/// Opaque identity issued by the identity provider.
pub type PlayerId = i64;

/// 1-based seat position at a table.
pub type SeatPosition = usize;

/// Monotonic per-table round counter.
pub type RoundId = u64;
