use serde::{Deserialize, Serialize};
use std::fmt;

use super::{Chips, PlayerId, RoundId, SeatPosition, hand::Hand};

#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Blackjack,
    Win,
    Push,
    Lose,
    Surrender,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let repr = match self {
            Self::Blackjack => "blackjack",
            Self::Win => "win",
            Self::Push => "push",
            Self::Lose => "lose",
            Self::Surrender => "surrender",
        };
        write!(f, "{repr}")
    }
}

/// The dealer's final hand, reduced to what settlement needs.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct DealerResult {
    pub total: u8,
    pub blackjack: bool,
    pub bust: bool,
}

impl DealerResult {
    #[must_use]
    pub fn from_hand(hand: &Hand) -> Self {
        let value = hand.value();
        Self {
            total: value.total,
            blackjack: value.is_blackjack,
            bust: value.is_bust,
        }
    }
}

/// Settle one hand against the dealer.
///
/// Returns the outcome and the chips handed back to the seat, stake
/// included. The bet has already been debited.
#[must_use]
pub fn settle_hand(hand: &Hand, dealer: &DealerResult) -> (Outcome, Chips) {
    let bet = hand.bet;
    let value = hand.value();
    if hand.is_surrendered {
        return (Outcome::Surrender, bet / 2);
    }
    if value.is_bust {
        return (Outcome::Lose, 0);
    }
    match (hand.is_natural(), dealer.blackjack) {
        (true, false) => return (Outcome::Blackjack, bet + bet * 3 / 2),
        (true, true) => return (Outcome::Push, bet),
        _ => {}
    }
    if dealer.bust || value.total > dealer.total {
        (Outcome::Win, 2 * bet)
    } else if value.total == dealer.total {
        (Outcome::Push, bet)
    } else {
        (Outcome::Lose, 0)
    }
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct HandSettlement {
    pub player_id: PlayerId,
    pub seat_position: SeatPosition,
    pub hand_index: usize,
    pub outcome: Outcome,
    pub bet: Chips,
    pub returned: Chips,
    /// `returned - bet`
    pub net: Chips,
}

/// Per-seat chip change for one round, to be persisted.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ChipDelta {
    pub player_id: PlayerId,
    pub delta: Chips,
    pub balance_after: Chips,
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct RoundReport {
    pub round_id: RoundId,
    pub dealer_total: u8,
    pub dealer_blackjack: bool,
    pub dealer_bust: bool,
    pub hands: Vec<HandSettlement>,
    pub deltas: Vec<ChipDelta>,
}

impl RoundReport {
    #[must_use]
    pub fn hand(&self, seat_position: SeatPosition, hand_index: usize) -> Option<&HandSettlement> {
        self.hands
            .iter()
            .find(|hand| hand.seat_position == seat_position && hand.hand_index == hand_index)
    }

    /// Sum of all hand results from the players' side.
    #[must_use]
    pub fn house_net(&self) -> Chips {
        -self.hands.iter().map(|hand| hand.net).sum::<Chips>()
    }
}
