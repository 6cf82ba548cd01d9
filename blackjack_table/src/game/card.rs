use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use super::constants::{CARDS_PER_DECK, DEFAULT_RESHUFFLE_THRESHOLD_PCT};

#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Suit {
    Club,
    Spade,
    Diamond,
    Heart,
}

impl Suit {
    pub const ALL: [Self; 4] = [Self::Club, Self::Spade, Self::Diamond, Self::Heart];
}

impl fmt::Display for Suit {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let repr = match self {
            Self::Club => "♣",
            Self::Spade => "♠",
            Self::Diamond => "♦",
            Self::Heart => "♥",
        };
        write!(f, "{repr}")
    }
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub enum Rank {
    #[serde(rename = "A")]
    Ace,
    #[serde(rename = "2")]
    Two,
    #[serde(rename = "3")]
    Three,
    #[serde(rename = "4")]
    Four,
    #[serde(rename = "5")]
    Five,
    #[serde(rename = "6")]
    Six,
    #[serde(rename = "7")]
    Seven,
    #[serde(rename = "8")]
    Eight,
    #[serde(rename = "9")]
    Nine,
    #[serde(rename = "10")]
    Ten,
    #[serde(rename = "J")]
    Jack,
    #[serde(rename = "Q")]
    Queen,
    #[serde(rename = "K")]
    King,
}

impl Rank {
    pub const ALL: [Self; 13] = [
        Self::Ace,
        Self::Two,
        Self::Three,
        Self::Four,
        Self::Five,
        Self::Six,
        Self::Seven,
        Self::Eight,
        Self::Nine,
        Self::Ten,
        Self::Jack,
        Self::Queen,
        Self::King,
    ];

    /// Blackjack value with an Ace counted high. The hand evaluator
    /// demotes Aces to 1 as needed.
    #[must_use]
    pub const fn base_value(self) -> u8 {
        match self {
            Self::Ace => 11,
            Self::Two => 2,
            Self::Three => 3,
            Self::Four => 4,
            Self::Five => 5,
            Self::Six => 6,
            Self::Seven => 7,
            Self::Eight => 8,
            Self::Nine => 9,
            Self::Ten | Self::Jack | Self::Queen | Self::King => 10,
        }
    }

    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::Ace => "A",
            Self::Two => "2",
            Self::Three => "3",
            Self::Four => "4",
            Self::Five => "5",
            Self::Six => "6",
            Self::Seven => "7",
            Self::Eight => "8",
            Self::Nine => "9",
            Self::Ten => "10",
            Self::Jack => "J",
            Self::Queen => "Q",
            Self::King => "K",
        }
    }
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct Card {
    pub rank: Rank,
    pub suit: Suit,
}

impl Card {
    #[must_use]
    pub const fn new(rank: Rank, suit: Suit) -> Self {
        Self { rank, suit }
    }

    #[must_use]
    pub const fn base_value(self) -> u8 {
        self.rank.base_value()
    }

    #[must_use]
    pub const fn is_ace(self) -> bool {
        matches!(self.rank, Rank::Ace)
    }
}

impl fmt::Display for Card {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}{}", self.rank.symbol(), self.suit)
    }
}

#[derive(Debug, Eq, Error, PartialEq)]
pub enum ShoeError {
    #[error("a shoe needs at least one deck")]
    NoDecks,
}

fn fresh_cards(deck_count: usize) -> Vec<Card> {
    let mut cards = Vec::with_capacity(deck_count * CARDS_PER_DECK);
    for _ in 0..deck_count {
        for suit in Suit::ALL {
            for rank in Rank::ALL {
                cards.push(Card::new(rank, suit));
            }
        }
    }
    cards
}

/// A multi-deck shoe owned by exactly one table.
///
/// Cards are drawn from the back of the internal vector so a draw is O(1).
/// Drawing never fails: an empty shoe is rebuilt and reshuffled first.
#[derive(Clone, Debug)]
pub struct Shoe {
    deck_count: usize,
    cards: Vec<Card>,
    /// Remaining-card count below which the next round starts with a
    /// fresh shoe.
    reshuffle_at: usize,
}

impl Default for Shoe {
    /// An empty single-deck shoe. The first draw fills it.
    fn default() -> Self {
        Self {
            deck_count: 1,
            cards: Vec::new(),
            reshuffle_at: 0,
        }
    }
}

impl Shoe {
    pub fn new(deck_count: usize) -> Result<Self, ShoeError> {
        Self::with_threshold(deck_count, DEFAULT_RESHUFFLE_THRESHOLD_PCT)
    }

    pub fn with_threshold(deck_count: usize, threshold_pct: u8) -> Result<Self, ShoeError> {
        if deck_count < 1 {
            return Err(ShoeError::NoDecks);
        }
        let capacity = deck_count * CARDS_PER_DECK;
        let mut shoe = Self {
            deck_count,
            cards: Vec::with_capacity(capacity),
            reshuffle_at: capacity * usize::from(threshold_pct.min(100)) / 100,
        };
        shoe.reshuffle();
        Ok(shoe)
    }

    /// A shoe that deals `cards` in the given order. It never asks for a
    /// reshuffle between rounds; once exhausted it falls back to a random
    /// shoe of `deck_count` decks.
    pub fn stacked(
        deck_count: usize,
        cards: impl IntoIterator<Item = Card>,
    ) -> Result<Self, ShoeError> {
        if deck_count < 1 {
            return Err(ShoeError::NoDecks);
        }
        let mut cards: Vec<Card> = cards.into_iter().collect();
        cards.reverse();
        Ok(Self {
            deck_count,
            cards,
            reshuffle_at: 0,
        })
    }

    pub fn draw(&mut self) -> Card {
        loop {
            if let Some(card) = self.cards.pop() {
                return card;
            }
            log::debug!("shoe exhausted mid-round, reshuffling {} decks", self.deck_count);
            self.reshuffle();
        }
    }

    pub fn reshuffle(&mut self) {
        self.cards = fresh_cards(self.deck_count);
        self.cards.shuffle(&mut rand::rng());
    }

    #[must_use]
    pub fn needs_reshuffle(&self) -> bool {
        self.cards.is_empty() || self.cards.len() < self.reshuffle_at
    }

    #[must_use]
    pub fn remaining(&self) -> usize {
        self.cards.len()
    }

    #[must_use]
    pub fn deck_count(&self) -> usize {
        self.deck_count
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.deck_count * CARDS_PER_DECK
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_base_values() {
        assert_eq!(Card::new(Rank::Ace, Suit::Spade).base_value(), 11);
        assert_eq!(Card::new(Rank::Two, Suit::Heart).base_value(), 2);
        assert_eq!(Card::new(Rank::Nine, Suit::Club).base_value(), 9);
        for rank in [Rank::Ten, Rank::Jack, Rank::Queen, Rank::King] {
            assert_eq!(Card::new(rank, Suit::Diamond).base_value(), 10);
        }
    }

    #[test]
    fn test_card_display() {
        assert_eq!(Card::new(Rank::Ace, Suit::Spade).to_string(), "A♠");
        assert_eq!(Card::new(Rank::Ten, Suit::Heart).to_string(), "10♥");
        assert_eq!(Card::new(Rank::Queen, Suit::Club).to_string(), "Q♣");
    }

    #[test]
    fn test_suit_display() {
        assert_eq!(format!("{}", Suit::Club), "♣");
        assert_eq!(format!("{}", Suit::Spade), "♠");
        assert_eq!(format!("{}", Suit::Diamond), "♦");
        assert_eq!(format!("{}", Suit::Heart), "♥");
    }

    #[test]
    fn test_new_shoe_has_every_card_deck_count_times() {
        let shoe = Shoe::new(6).unwrap();
        assert_eq!(shoe.remaining(), 312);
        assert_eq!(shoe.capacity(), 312);

        let mut counts: HashMap<Card, usize> = HashMap::new();
        for card in &shoe.cards {
            *counts.entry(*card).or_default() += 1;
        }
        assert_eq!(counts.len(), 52);
        assert!(counts.values().all(|&count| count == 6));
    }

    #[test]
    fn test_zero_decks_rejected() {
        assert_eq!(Shoe::new(0).unwrap_err(), ShoeError::NoDecks);
        assert_eq!(Shoe::stacked(0, Vec::new()).unwrap_err(), ShoeError::NoDecks);
    }

    #[test]
    fn test_draw_shrinks_shoe() {
        let mut shoe = Shoe::new(1).unwrap();
        for expected in (0..52).rev() {
            shoe.draw();
            assert_eq!(shoe.remaining(), expected);
        }
    }

    #[test]
    fn test_draw_from_empty_shoe_reshuffles() {
        let mut shoe = Shoe::new(1).unwrap();
        for _ in 0..52 {
            shoe.draw();
        }
        assert_eq!(shoe.remaining(), 0);
        shoe.draw();
        assert_eq!(shoe.remaining(), 51);
    }

    #[test]
    fn test_reshuffle_threshold() {
        let mut shoe = Shoe::with_threshold(1, 50).unwrap();
        assert!(!shoe.needs_reshuffle());
        for _ in 0..26 {
            shoe.draw();
        }
        assert!(!shoe.needs_reshuffle());
        shoe.draw();
        assert!(shoe.needs_reshuffle());
        shoe.reshuffle();
        assert_eq!(shoe.remaining(), 52);
    }

    #[test]
    fn test_stacked_shoe_deals_in_order() {
        let cards = [
            Card::new(Rank::Ace, Suit::Spade),
            Card::new(Rank::King, Suit::Heart),
            Card::new(Rank::Two, Suit::Club),
        ];
        let mut shoe = Shoe::stacked(1, cards).unwrap();
        assert!(!shoe.needs_reshuffle());
        assert_eq!(shoe.draw(), cards[0]);
        assert_eq!(shoe.draw(), cards[1]);
        assert_eq!(shoe.draw(), cards[2]);
        assert_eq!(shoe.remaining(), 0);

        // Exhausted stacked shoes fall back to a random shoe.
        shoe.draw();
        assert_eq!(shoe.remaining(), 51);
    }

    #[test]
    fn test_default_shoe_fills_on_first_draw() {
        let mut shoe = Shoe::default();
        assert_eq!(shoe.remaining(), 0);
        shoe.draw();
        assert_eq!(shoe.remaining(), 51);
    }
}
