use serde::{Deserialize, Serialize};

use super::{
    card::{Card, Shoe},
    constants::DEALER_STAND_TOTAL,
    hand::{Hand, evaluate},
};

/// Fixed house drawing rule: hit below 17 and on soft 17.
#[must_use]
pub fn should_hit(cards: &[Card]) -> bool {
    let value = evaluate(cards);
    !value.is_bust
        && (value.total < DEALER_STAND_TOTAL || (value.total == DEALER_STAND_TOTAL && value.is_soft))
}

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct Dealer {
    /// The dealer's bet is always 0.
    pub hand: Hand,
    pub hole_card_revealed: bool,
}

impl Dealer {
    pub fn reset(&mut self) {
        self.hand = Hand::default();
        self.hole_card_revealed = false;
    }

    #[must_use]
    pub fn up_card(&self) -> Option<Card> {
        self.hand.cards.first().copied()
    }

    /// Cards as seen by players. The hole card is `None` until revealed.
    #[must_use]
    pub fn visible_cards(&self) -> Vec<Option<Card>> {
        self.hand
            .cards
            .iter()
            .enumerate()
            .map(|(idx, card)| (idx != 1 || self.hole_card_revealed).then_some(*card))
            .collect()
    }

    /// Reveal the hole card and draw until the house rule says stop.
    /// Returns the number of cards drawn.
    pub fn play(&mut self, shoe: &mut Shoe) -> usize {
        self.hole_card_revealed = true;
        let mut drawn = 0;
        while should_hit(&self.hand.cards) {
            self.hand.cards.push(shoe.draw());
            drawn += 1;
        }
        drawn
    }
}
