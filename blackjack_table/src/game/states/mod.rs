//! Round phase definitions for the table FSM.
//!
//! Each state represents a specific phase of a blackjack round. Dealing,
//! DealerTurn and Settlement are transient: the machine runs through them
//! within the command or timer event that entered them.

use serde::{Deserialize, Serialize};
use std::{fmt, time::Instant};

use crate::game::{PlayerId, SeatPosition};

#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Waiting,
    Betting,
    Dealing,
    PlayerTurns,
    DealerTurn,
    Settlement,
    Finished,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let repr = match self {
            Self::Waiting => "waiting",
            Self::Betting => "betting",
            Self::Dealing => "dealing",
            Self::PlayerTurns => "player turns",
            Self::DealerTurn => "dealer turn",
            Self::Settlement => "settlement",
            Self::Finished => "finished",
        };
        write!(f, "{repr}")
    }
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Hit,
    Stand,
    Double,
    Split,
    Surrender,
}

impl ActionKind {
    pub const ALL: [Self; 5] = [
        Self::Hit,
        Self::Stand,
        Self::Double,
        Self::Split,
        Self::Surrender,
    ];
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let repr = match self {
            Self::Hit => "hit",
            Self::Stand => "stand",
            Self::Double => "double",
            Self::Split => "split",
            Self::Surrender => "surrender",
        };
        write!(f, "{repr}")
    }
}

/// Whose turn it is, as exposed to clients and rejections.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct TurnPointer {
    pub seat_position: SeatPosition,
    pub player_id: PlayerId,
    pub hand_index: usize,
}

/// Position of the hand currently being played.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Cursor {
    pub seat_position: SeatPosition,
    pub hand_index: usize,
}

impl Cursor {
    /// A cursor before every seat.
    pub const START: Self = Self {
        seat_position: 0,
        hand_index: 0,
    };

    #[must_use]
    pub const fn next_hand(self) -> Self {
        Self {
            seat_position: self.seat_position,
            hand_index: self.hand_index + 1,
        }
    }
}

/// Waiting for players and an explicit round start
#[derive(Debug, Default)]
pub struct Waiting;

/// Collecting bets until the deadline or until every connected seat has bet
#[derive(Debug)]
pub struct Betting {
    pub(crate) deadline: Instant,
    pub(crate) closed: bool,
}

/// Dealing two cards to every active seat and the dealer
#[derive(Debug)]
pub struct Dealing;

/// Players act on their hands one at a time
#[derive(Debug)]
pub struct PlayerTurns {
    /// `None` once every hand is finished.
    pub(crate) cursor: Option<Cursor>,
    pub(crate) turn_deadline: Instant,
}

/// Dealer reveals the hole card and draws
#[derive(Debug)]
pub struct DealerTurn;

/// Paying out every active hand
#[derive(Debug)]
pub struct Settlement;

/// Round is over; the report is on display until the next round
#[derive(Debug)]
pub struct Finished;
