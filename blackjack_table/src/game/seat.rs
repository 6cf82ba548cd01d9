use serde::{Deserialize, Serialize};

use super::{
    Chips, PlayerId, SeatPosition,
    constants::MAX_DISPLAY_NAME_LENGTH,
    errors::{TableError, TableResult},
    hand::Hand,
};

/// Trim a display name, replace inner whitespace with underscores and
/// clamp its length. Empty names fall back to `player-{id}`.
#[must_use]
pub fn sanitize_display_name(player_id: PlayerId, display_name: &str) -> String {
    let name: String = display_name
        .trim()
        .chars()
        .map(|c| if c.is_whitespace() { '_' } else { c })
        .take(MAX_DISPLAY_NAME_LENGTH)
        .collect();
    if name.is_empty() {
        format!("player-{player_id}")
    } else {
        name
    }
}

/// What happened to a seat after a leave request.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LeaveOutcome {
    /// The seat was freed immediately.
    Removed { chips: Chips },
    /// The seat has a live bet; its hands are auto-stood and the seat is
    /// freed when the round settles.
    RemovedAtRoundEnd,
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Seat {
    pub player_id: PlayerId,
    pub display_name: String,
    pub chips: Chips,
    pub position: SeatPosition,
    /// Empty until a bet is placed. Kept after settlement for display.
    pub hands: Vec<Hand>,
    pub splits_this_round: u8,
    pub connected: bool,
    pub leaving: bool,
    /// Consecutive betting windows that closed without a bet from this seat.
    pub missed_rounds: u32,
}

impl Seat {
    #[must_use]
    pub fn new(
        player_id: PlayerId,
        display_name: &str,
        chips: Chips,
        position: SeatPosition,
    ) -> Self {
        Self {
            player_id,
            display_name: sanitize_display_name(player_id, display_name),
            chips,
            position,
            hands: Vec::new(),
            splits_this_round: 0,
            connected: true,
            leaving: false,
            missed_rounds: 0,
        }
    }

    /// Seat took part in the current round.
    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.hands.is_empty()
    }

    /// Seat has chips on the table that haven't been settled yet.
    #[must_use]
    pub fn has_live_bet(&self) -> bool {
        self.hands.iter().any(|hand| hand.bet > 0)
    }

    #[must_use]
    pub fn total_bet(&self) -> Chips {
        self.hands.iter().map(|hand| hand.bet).sum()
    }

    /// Seat should be auto-stood quickly when its turn comes up.
    #[must_use]
    pub fn is_away(&self) -> bool {
        !self.connected || self.leaving
    }

    pub fn debit(&mut self, amount: Chips) -> TableResult<()> {
        if amount > self.chips {
            return Err(TableError::InsufficientChips {
                required: amount,
                available: self.chips,
            });
        }
        self.chips -= amount;
        Ok(())
    }

    pub fn credit(&mut self, amount: Chips) -> TableResult<()> {
        self.chips = self
            .chips
            .checked_add(amount)
            .ok_or_else(|| TableError::invariant(format!("chip overflow for player {}", self.player_id)))?;
        Ok(())
    }

    pub fn reset_for_round(&mut self) {
        self.hands.clear();
        self.splits_this_round = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_display_name() {
        assert_eq!(sanitize_display_name(1, "  alice  "), "alice");
        assert_eq!(sanitize_display_name(1, "big bob"), "big_bob");
        assert_eq!(sanitize_display_name(7, "   "), "player-7");
        assert_eq!(
            sanitize_display_name(1, &"x".repeat(100)).len(),
            MAX_DISPLAY_NAME_LENGTH
        );
    }

    #[test]
    fn test_debit_and_credit() {
        let mut seat = Seat::new(1, "alice", 100, 1);
        seat.debit(40).unwrap();
        assert_eq!(seat.chips, 60);
        assert_eq!(
            seat.debit(61),
            Err(TableError::InsufficientChips {
                required: 61,
                available: 60
            })
        );
        assert_eq!(seat.chips, 60);
        seat.credit(100).unwrap();
        assert_eq!(seat.chips, 160);
    }

    #[test]
    fn test_credit_overflow_is_invariant_violation() {
        let mut seat = Seat::new(1, "alice", Chips::MAX, 1);
        assert!(seat.credit(1).unwrap_err().is_fatal());
    }

    #[test]
    fn test_live_bet_tracking() {
        let mut seat = Seat::new(1, "alice", 100, 1);
        assert!(!seat.is_active());
        assert!(!seat.has_live_bet());

        seat.hands.push(Hand::with_bet(10));
        assert!(seat.is_active());
        assert!(seat.has_live_bet());
        assert_eq!(seat.total_bet(), 10);

        seat.hands[0].bet = 0;
        assert!(seat.is_active());
        assert!(!seat.has_live_bet());

        seat.reset_for_round();
        assert!(!seat.is_active());
    }
}
