pub const CARDS_PER_DECK: usize = 52;

/// Best possible hand total.
pub const BLACKJACK: u8 = 21;

/// The dealer stands on hard 17 and hits soft 17.
pub const DEALER_STAND_TOTAL: u8 = 17;

/// Difference between an Ace counted as 11 and as 1.
pub const SOFT_ACE_ADJUSTMENT: u32 = 10;

pub const DEFAULT_MAX_SEATS: usize = 6;
pub const MAX_SEATS: usize = 7;
pub const DEFAULT_MIN_BET: i64 = 10;
pub const DEFAULT_MAX_BET: i64 = 500;
pub const DEFAULT_DECK_COUNT: usize = 6;
pub const MAX_DECK_COUNT: usize = 8;
pub const DEFAULT_RESHUFFLE_THRESHOLD_PCT: u8 = 20;
pub const DEFAULT_STARTING_CHIPS: i64 = 1000;
pub const DEFAULT_MAX_SPLITS: u8 = 3;
pub const DEFAULT_MISSED_ROUND_LIMIT: u32 = 2;
pub const DEFAULT_DISCONNECT_GRACE_SECS: u64 = 5;

pub const MAX_DISPLAY_NAME_LENGTH: usize = 24;
