//! Client-facing projections of a table.
//!
//! Every transport renders the same [`TableSnapshot`]. The dealer's hole card
//! is redacted until the dealer's turn.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Instant;

use super::{
    Chips, PlayerId, RoundId, SeatPosition,
    card::Card,
    dealer::Dealer,
    hand::{Hand, evaluate},
    seat::Seat,
    settlement::{Outcome, RoundReport},
    state_machine::TableData,
    states::{ActionKind, Cursor, Phase, TurnPointer},
};
use crate::wallet::TableId;

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct HandView {
    pub cards: Vec<Card>,
    pub bet: Chips,
    pub total: u8,
    pub is_soft: bool,
    pub is_blackjack: bool,
    pub is_bust: bool,
    pub is_split: bool,
    pub is_doubled: bool,
    pub is_surrendered: bool,
    pub is_finished: bool,
    /// Set once the round has been settled.
    pub outcome: Option<Outcome>,
    pub returned: Option<Chips>,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct SeatView {
    pub position: SeatPosition,
    pub player_id: PlayerId,
    pub display_name: String,
    pub chips: Chips,
    pub hands: Vec<HandView>,
    pub connected: bool,
    pub leaving: bool,
    pub missed_rounds: u32,
    /// The seat belongs to the player this snapshot was built for.
    pub is_you: bool,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct DealerView {
    /// `None` stands for the face-down hole card.
    pub cards: Vec<Option<Card>>,
    pub hole_card_revealed: bool,
    /// Total of the face-up cards.
    pub visible_total: Option<u8>,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct TableSnapshot {
    pub table_id: TableId,
    pub table_name: String,
    pub phase: Phase,
    pub round_id: RoundId,
    /// Increases by one for every applied command or timer event.
    pub seq: u64,
    pub betting_deadline: Option<DateTime<Utc>>,
    pub betting_time_left_ms: Option<u64>,
    pub turn_deadline: Option<DateTime<Utc>>,
    pub turn_time_left_ms: Option<u64>,
    pub dealer: DealerView,
    pub seats: Vec<SeatView>,
    pub turn: Option<TurnPointer>,
    /// Only filled in for the player whose turn it is.
    pub legal_actions: Vec<ActionKind>,
    pub min_bet: Chips,
    pub max_bet: Chips,
    pub max_seats: usize,
    pub shoe_remaining: usize,
    pub last_round: Option<RoundReport>,
}

fn wall_clock(deadline: Instant, now: Instant) -> (DateTime<Utc>, u64) {
    let left = deadline.saturating_duration_since(now);
    let at = Utc::now() + chrono::Duration::from_std(left).unwrap_or_default();
    (at, u64::try_from(left.as_millis()).unwrap_or(u64::MAX))
}

fn hand_view(hand: &Hand, seat: &Seat, hand_index: usize, report: Option<&RoundReport>) -> HandView {
    let value = hand.value();
    let settled = report.and_then(|report| report.hand(seat.position, hand_index));
    HandView {
        cards: hand.cards.clone(),
        bet: settled.map_or(hand.bet, |settled| settled.bet),
        total: value.total,
        is_soft: value.is_soft,
        is_blackjack: hand.is_natural(),
        is_bust: value.is_bust,
        is_split: hand.is_split,
        is_doubled: hand.is_doubled,
        is_surrendered: hand.is_surrendered,
        is_finished: hand.is_finished,
        outcome: settled.map(|settled| settled.outcome),
        returned: settled.map(|settled| settled.returned),
    }
}

fn dealer_view(dealer: &Dealer) -> DealerView {
    let visible: Vec<Card> = dealer.visible_cards().into_iter().flatten().collect();
    DealerView {
        cards: dealer.visible_cards(),
        hole_card_revealed: dealer.hole_card_revealed,
        visible_total: (!visible.is_empty()).then(|| evaluate(&visible).total),
    }
}

impl TableSnapshot {
    /// Project `data` for `viewer` (`None` for spectators and lobby views).
    #[must_use]
    pub fn project(
        data: &TableData,
        phase: Phase,
        betting_deadline: Option<Instant>,
        turn: Option<(Cursor, Instant)>,
        viewer: Option<PlayerId>,
        now: Instant,
    ) -> Self {
        let config = data.config();
        let report = data.last_round();
        let betting = betting_deadline.map(|deadline| wall_clock(deadline, now));
        let turn_clock = turn.map(|(_, deadline)| wall_clock(deadline, now));
        let cursor = turn.map(|(cursor, _)| cursor);
        let pointer = cursor.and_then(|cursor| data.turn_pointer(cursor));

        let legal_actions = match (cursor, pointer) {
            (Some(cursor), Some(pointer)) if viewer == Some(pointer.player_id) => {
                data.legal_actions(cursor)
            }
            _ => Vec::new(),
        };

        let seats = data
            .seats()
            .iter()
            .map(|seat| SeatView {
                position: seat.position,
                player_id: seat.player_id,
                display_name: seat.display_name.clone(),
                chips: seat.chips,
                hands: seat
                    .hands
                    .iter()
                    .enumerate()
                    .map(|(idx, hand)| hand_view(hand, seat, idx, report))
                    .collect(),
                connected: seat.connected,
                leaving: seat.leaving,
                missed_rounds: seat.missed_rounds,
                is_you: viewer == Some(seat.player_id),
            })
            .collect();

        Self {
            table_id: data.table_id(),
            table_name: config.name.clone(),
            phase,
            round_id: data.round_id(),
            seq: data.seq(),
            betting_deadline: betting.map(|(at, _)| at),
            betting_time_left_ms: betting.map(|(_, left)| left),
            turn_deadline: turn_clock.map(|(at, _)| at),
            turn_time_left_ms: turn_clock.map(|(_, left)| left),
            dealer: dealer_view(data.dealer()),
            seats,
            turn: pointer,
            legal_actions,
            min_bet: config.min_bet,
            max_bet: config.max_bet,
            max_seats: config.max_seats,
            shoe_remaining: data.shoe_remaining(),
            last_round: report.cloned(),
        }
    }

    #[must_use]
    pub fn seat_of(&self, player_id: PlayerId) -> Option<&SeatView> {
        self.seats.iter().find(|seat| seat.player_id == player_id)
    }
}
