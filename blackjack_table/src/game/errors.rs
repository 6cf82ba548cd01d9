use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{
    Chips, PlayerId,
    states::{Phase, TurnPointer},
};
use crate::wallet::TableId;

/// Why an action was refused for the hand under the cursor
#[derive(Clone, Copy, Debug, Deserialize, Eq, Error, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IllegalActionReason {
    #[error("a bet was already placed this round")]
    BetAlreadyPlaced,
    #[error("hand is already finished")]
    HandFinished,
    #[error("only a two-card hand can do that")]
    NotTwoCards,
    #[error("only a pair can be split")]
    NotAPair,
    #[error("split limit of {0} reached")]
    SplitLimitReached(u8),
    #[error("can't double after splitting at this table")]
    DoubleAfterSplit,
    #[error("surrender is only allowed as the first action on an unsplit hand")]
    SurrenderNotFirstAction,
}

/// Errors returned by table commands.
///
/// Every variant except the last two is a plain rejection: the table state
/// is left untouched. `InvariantViolation` halts the table and every later
/// command receives `TableHalted`.
#[derive(Clone, Debug, Deserialize, Eq, Error, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TableError {
    #[error("can't do that during {phase}")]
    InvalidPhase { phase: Phase },
    #[error("not your turn")]
    NotYourTurn { turn: Option<TurnPointer> },
    #[error("illegal action: {reason}")]
    IllegalAction { reason: IllegalActionReason },
    #[error("bet of ${amount} outside table limits ${min}..=${max}")]
    BetOutOfRange { min: Chips, max: Chips, amount: Chips },
    #[error("need ${required}, have ${available}")]
    InsufficientChips { required: Chips, available: Chips },
    #[error("table is full ({max_seats} seats)")]
    TableFull { max_seats: usize },
    #[error("already seated")]
    AlreadySeated,
    #[error("table {table_id} does not exist")]
    UnknownTable { table_id: TableId },
    #[error("player {player_id} is not seated")]
    UnknownPlayer { player_id: PlayerId },
    #[error("chip store unavailable: {message}")]
    ChipStoreUnavailable { message: String },
    #[error("invalid table state: {message}")]
    InvariantViolation { message: String },
    #[error("table halted")]
    TableHalted,
}

impl TableError {
    #[must_use]
    pub fn illegal(reason: IllegalActionReason) -> Self {
        Self::IllegalAction { reason }
    }

    #[must_use]
    pub fn invariant(message: impl Into<String>) -> Self {
        Self::InvariantViolation {
            message: message.into(),
        }
    }

    /// Whether this error stops the table.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::InvariantViolation { .. } | Self::TableHalted)
    }
}

pub type TableResult<T> = Result<T, TableError>;

/// A refused command with enough table context for the client to act on.
#[derive(Clone, Debug, Deserialize, Eq, Error, PartialEq, Serialize)]
#[error("{error}")]
pub struct Rejection {
    pub error: TableError,
    /// Phase the table was in when the command was refused.
    pub phase: Option<Phase>,
    pub turn: Option<TurnPointer>,
}

impl Rejection {
    /// A rejection raised before reaching a table.
    #[must_use]
    pub fn detached(error: TableError) -> Self {
        Self {
            error,
            phase: None,
            turn: None,
        }
    }
}

impl From<TableError> for Rejection {
    fn from(error: TableError) -> Self {
        Self::detached(error)
    }
}
