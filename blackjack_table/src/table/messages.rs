//! Table actor message types.

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};

use super::config::TableSpeed;
use crate::{
    game::{ActionKind, Chips, LeaveOutcome, Phase, PlayerId, Rejection, RoundId, TableSnapshot},
    wallet::TableId,
};

/// Identifies one notification channel registered with a table.
pub type SubscriptionId = u64;

/// Reply channel for commands that can be refused.
pub type Reply<T> = oneshot::Sender<Result<T, Rejection>>;

/// Messages that can be sent to a TableActor
#[derive(Debug)]
pub enum TableMessage {
    /// Seat a player with the balance read from the chip store
    Join {
        player_id: PlayerId,
        display_name: String,
        chips: Chips,
        response: Reply<TableSnapshot>,
    },

    /// Free a seat, immediately or at round end
    Leave {
        player_id: PlayerId,
        response: Reply<LeaveOutcome>,
    },

    PlaceBet {
        player_id: PlayerId,
        amount: Chips,
        response: Reply<TableSnapshot>,
    },

    /// Hit, stand, double, split or surrender on one hand
    Action {
        player_id: PlayerId,
        kind: ActionKind,
        hand_index: usize,
        response: Reply<TableSnapshot>,
    },

    /// Open betting from Waiting or Finished
    StartRound { response: Reply<TableSnapshot> },

    /// Open the next round from Finished
    NewRound { response: Reply<TableSnapshot> },

    /// Get the table as seen by `viewer`
    GetSnapshot {
        viewer: Option<PlayerId>,
        response: oneshot::Sender<TableSnapshot>,
    },

    SetConnected {
        player_id: PlayerId,
        connected: bool,
        response: Reply<TableSnapshot>,
    },

    /// Subscribe to state change notifications
    Subscribe {
        subscription_id: SubscriptionId,
        sender: mpsc::Sender<StateChangeNotification>,
    },

    /// Unsubscribe from state change notifications
    Unsubscribe { subscription_id: SubscriptionId },

    /// Reply once every ledger entry handed over so far is stored
    Flush { response: oneshot::Sender<()> },

    /// Stop the actor
    Close { response: oneshot::Sender<()> },
}

/// Notification sent when table state changes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateChangeNotification {
    /// A command or timer event was applied
    StateChanged { seq: u64, phase: Phase },
    /// A player sat down, left or was evicted
    PlayerListChanged { seq: u64 },
    /// The actor stopped; no further notifications follow
    TableClosed,
}

/// Table metadata for discovery
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableMetadata {
    pub id: TableId,
    pub name: String,
    pub seated: usize,
    pub max_seats: usize,
    pub min_bet: Chips,
    pub max_bet: Chips,
    pub phase: Phase,
    pub round_id: RoundId,
    pub speed: TableSpeed,
    /// The table stopped after an internal error
    pub halted: bool,
}
