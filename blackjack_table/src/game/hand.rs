use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use super::{
    Chips,
    card::Card,
    constants::{BLACKJACK, SOFT_ACE_ADJUSTMENT},
};

/// Evaluated value of a set of cards.
///
/// Totals above 255 saturate; they only occur for arbitrary card
/// sequences that a real round can't produce.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct HandValue {
    pub total: u8,
    /// At least one Ace is still counted as 11.
    pub is_soft: bool,
    /// Exactly two cards totalling 21.
    pub is_blackjack: bool,
    pub is_bust: bool,
}

impl Ord for HandValue {
    fn cmp(&self, other: &Self) -> Ordering {
        self.total
            .cmp(&other.total)
            .then(self.is_blackjack.cmp(&other.is_blackjack))
            .then(self.is_soft.cmp(&other.is_soft))
            .then(self.is_bust.cmp(&other.is_bust))
    }
}

impl PartialOrd for HandValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Evaluate a set of cards.
///
/// Every Ace starts at 11 and is demoted to 1, one at a time, while the
/// total is over 21.
#[must_use]
pub fn evaluate(cards: &[Card]) -> HandValue {
    let mut sum: u32 = 0;
    let mut high_aces: u32 = 0;
    for card in cards {
        sum += u32::from(card.base_value());
        if card.is_ace() {
            high_aces += 1;
        }
    }

    let blackjack = u32::from(BLACKJACK);
    while sum > blackjack && high_aces > 0 {
        sum -= SOFT_ACE_ADJUSTMENT;
        high_aces -= 1;
    }

    HandValue {
        total: u8::try_from(sum).unwrap_or(u8::MAX),
        is_soft: high_aces > 0,
        is_blackjack: cards.len() == 2 && sum == blackjack,
        is_bust: sum > blackjack,
    }
}

/// One hand played by a seat. A seat holds several after splitting.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct Hand {
    pub cards: Vec<Card>,
    pub bet: Chips,
    /// Created by splitting a pair. Such a hand can't be a natural.
    pub is_split: bool,
    pub is_doubled: bool,
    pub is_surrendered: bool,
    /// No further actions are accepted for this hand.
    pub is_finished: bool,
    pub actions_taken: u8,
}

impl Hand {
    #[must_use]
    pub fn with_bet(bet: Chips) -> Self {
        Self {
            bet,
            ..Default::default()
        }
    }

    #[must_use]
    pub fn value(&self) -> HandValue {
        evaluate(&self.cards)
    }

    /// Two-card 21 dealt from the shoe, not produced by a split.
    #[must_use]
    pub fn is_natural(&self) -> bool {
        !self.is_split && self.value().is_blackjack
    }

    #[must_use]
    pub fn is_pair(&self) -> bool {
        matches!(self.cards.as_slice(), [first, second] if first.base_value() == second.base_value())
    }
}
