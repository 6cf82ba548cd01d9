//! Chip store error types.

use thiserror::Error;

use crate::game::{Chips, PlayerId};

/// Chip store errors
#[derive(Debug, Error)]
pub enum WalletError {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Entry would leave the account below zero
    #[error("Negative balance for player {player_id}: {balance} + {delta}")]
    NegativeBalance {
        player_id: PlayerId,
        balance: Chips,
        delta: Chips,
    },

    /// Balance no longer fits in a chip amount
    #[error("Balance overflow for player {0}")]
    BalanceOverflow(PlayerId),

    /// Duplicate entry (idempotency key already used)
    #[error("Duplicate entry: {0}")]
    DuplicateEntry(String),

    /// Stored value can't be mapped back to a model
    #[error("Corrupt ledger row: {0}")]
    CorruptRow(String),
}

impl WalletError {
    /// Get a client-safe error message that doesn't leak sensitive information
    ///
    /// Database errors are sanitized to prevent information disclosure about
    /// the internal system structure, and player IDs are redacted.
    pub fn client_message(&self) -> String {
        match self {
            // Sanitize database errors - don't expose SQL details
            WalletError::Database(_) | WalletError::CorruptRow(_) => {
                "Internal server error".to_string()
            }
            WalletError::NegativeBalance { .. } => "Insufficient balance".to_string(),
            WalletError::BalanceOverflow(_) => "Balance limit reached".to_string(),
            // All other errors are safe to expose
            _ => self.to_string(),
        }
    }
}

/// Result type for chip store operations
pub type WalletResult<T> = Result<T, WalletError>;
