//! Chip store seam and its in-memory implementation.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;

use super::{
    errors::{WalletError, WalletResult},
    models::ChipEntry,
};
use crate::game::{Chips, PlayerId};

/// Durable chip balances.
///
/// Tables read a balance when a player sits down and record one entry per
/// player per settled round. Recording is idempotent on
/// [`ChipEntry::idempotency_key`]: a repeated key returns
/// [`WalletError::DuplicateEntry`] and changes nothing.
#[async_trait]
pub trait ChipStore: Send + Sync {
    /// Current balance. Players the store has never seen get the starting
    /// balance.
    async fn balance(&self, player_id: PlayerId) -> WalletResult<Chips>;

    /// Apply `entry.delta` and append the entry to the ledger.
    ///
    /// # Returns
    ///
    /// * `WalletResult<Chips>` - Balance after the entry
    ///
    /// # Errors
    ///
    /// * `WalletError::DuplicateEntry` - Idempotency key already used
    /// * `WalletError::NegativeBalance` - Entry would overdraw the account
    async fn record(&self, entry: ChipEntry) -> WalletResult<Chips>;
}

#[derive(Debug, Default)]
struct Ledger {
    balances: HashMap<PlayerId, Chips>,
    keys: HashSet<String>,
    entries: Vec<ChipEntry>,
}

/// Process-local chip store, used when no database is configured.
#[derive(Debug)]
pub struct MemoryChipStore {
    starting_chips: Chips,
    ledger: RwLock<Ledger>,
}

impl MemoryChipStore {
    pub fn new(starting_chips: Chips) -> Self {
        Self {
            starting_chips,
            ledger: RwLock::new(Ledger::default()),
        }
    }

    /// Overwrite a balance without writing a ledger entry.
    pub async fn set_balance(&self, player_id: PlayerId, balance: Chips) {
        self.ledger.write().await.balances.insert(player_id, balance);
    }

    /// Ledger entries for one player, oldest first.
    pub async fn entries(&self, player_id: PlayerId) -> Vec<ChipEntry> {
        self.ledger
            .read()
            .await
            .entries
            .iter()
            .filter(|entry| entry.player_id == player_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl ChipStore for MemoryChipStore {
    async fn balance(&self, player_id: PlayerId) -> WalletResult<Chips> {
        Ok(self
            .ledger
            .read()
            .await
            .balances
            .get(&player_id)
            .copied()
            .unwrap_or(self.starting_chips))
    }

    async fn record(&self, entry: ChipEntry) -> WalletResult<Chips> {
        let mut ledger = self.ledger.write().await;
        if ledger.keys.contains(&entry.idempotency_key) {
            return Err(WalletError::DuplicateEntry(entry.idempotency_key));
        }

        let balance = ledger
            .balances
            .get(&entry.player_id)
            .copied()
            .unwrap_or(self.starting_chips);
        let new_balance = balance
            .checked_add(entry.delta)
            .ok_or(WalletError::BalanceOverflow(entry.player_id))?;
        if new_balance < 0 {
            return Err(WalletError::NegativeBalance {
                player_id: entry.player_id,
                balance,
                delta: entry.delta,
            });
        }

        ledger.balances.insert(entry.player_id, new_balance);
        ledger.keys.insert(entry.idempotency_key.clone());
        ledger.entries.push(entry);
        Ok(new_balance)
    }
}
