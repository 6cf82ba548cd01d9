//! PostgreSQL-backed chip store.
#![allow(clippy::needless_raw_string_hashes)]

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Row, Transaction};
use std::sync::Arc;

use super::{
    errors::{WalletError, WalletResult},
    manager::ChipStore,
    models::{ChipAccount, ChipEntry},
};
use crate::game::{Chips, PlayerId};

/// SQLSTATE for a failed CHECK constraint.
const CHECK_VIOLATION: &str = "23514";

const CREATE_ACCOUNTS: &str = r#"
    CREATE TABLE IF NOT EXISTS chip_accounts (
        player_id BIGINT PRIMARY KEY,
        balance BIGINT NOT NULL CHECK (balance >= 0),
        updated_at TIMESTAMP NOT NULL DEFAULT NOW()
    )
"#;

const CREATE_ENTRIES: &str = r#"
    CREATE TABLE IF NOT EXISTS chip_entries (
        id BIGSERIAL PRIMARY KEY,
        player_id BIGINT NOT NULL REFERENCES chip_accounts (player_id),
        table_id BIGINT NOT NULL,
        round_id BIGINT,
        delta BIGINT NOT NULL,
        balance_after BIGINT NOT NULL,
        kind TEXT NOT NULL,
        idempotency_key TEXT NOT NULL UNIQUE,
        created_at TIMESTAMP NOT NULL DEFAULT NOW()
    )
"#;

/// Chip store persisted in `chip_accounts` / `chip_entries`.
#[derive(Clone)]
pub struct PgChipStore {
    pool: Arc<PgPool>,
    starting_chips: Chips,
}

impl PgChipStore {
    /// Create a new store
    ///
    /// # Arguments
    ///
    /// * `pool` - Database connection pool
    /// * `starting_chips` - Balance for players without an account row
    pub fn new(pool: Arc<PgPool>, starting_chips: Chips) -> Self {
        Self {
            pool,
            starting_chips,
        }
    }

    /// Create the ledger tables if they don't exist yet.
    pub async fn ensure_schema(&self) -> WalletResult<()> {
        sqlx::query(CREATE_ACCOUNTS)
            .execute(self.pool.as_ref())
            .await?;
        sqlx::query(CREATE_ENTRIES)
            .execute(self.pool.as_ref())
            .await?;
        Ok(())
    }

    /// Stored account row, if the player has one.
    pub async fn account(&self, player_id: PlayerId) -> WalletResult<Option<ChipAccount>> {
        let row = sqlx::query(
            r#"
            SELECT player_id, balance, updated_at
            FROM chip_accounts
            WHERE player_id = $1
            "#,
        )
        .bind(player_id)
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(row.map(|row| ChipAccount {
            player_id: row.get("player_id"),
            balance: row.get("balance"),
            updated_at: row.get::<chrono::NaiveDateTime, _>("updated_at").and_utc(),
        }))
    }

    async fn insert_entry(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        entry: &ChipEntry,
        balance_after: Chips,
    ) -> WalletResult<()> {
        let round_id = entry
            .round_id
            .map(i64::try_from)
            .transpose()
            .map_err(|_| WalletError::CorruptRow(format!("round id {:?}", entry.round_id)))?;

        sqlx::query(
            "INSERT INTO chip_entries
             (player_id, table_id, round_id, delta, balance_after, kind, idempotency_key)
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(entry.player_id)
        .bind(entry.table_id)
        .bind(round_id)
        .bind(entry.delta)
        .bind(balance_after)
        .bind(entry.kind.to_string())
        .bind(&entry.idempotency_key)
        .execute(&mut **tx)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl ChipStore for PgChipStore {
    async fn balance(&self, player_id: PlayerId) -> WalletResult<Chips> {
        Ok(self
            .account(player_id)
            .await?
            .map_or(self.starting_chips, |account| account.balance))
    }

    async fn record(&self, entry: ChipEntry) -> WalletResult<Chips> {
        let mut tx = self.pool.begin().await?;

        let existing = sqlx::query("SELECT id FROM chip_entries WHERE idempotency_key = $1")
            .bind(&entry.idempotency_key)
            .fetch_optional(&mut *tx)
            .await?;

        if existing.is_some() {
            return Err(WalletError::DuplicateEntry(entry.idempotency_key));
        }

        // Missing accounts are opened at the starting balance; the balance
        // check and the update happen in one statement.
        let updated = sqlx::query(
            "INSERT INTO chip_accounts (player_id, balance, updated_at)
             VALUES ($1, $2 + $3, NOW())
             ON CONFLICT (player_id)
             DO UPDATE SET
                balance = chip_accounts.balance + $3,
                updated_at = NOW()
             WHERE chip_accounts.balance + $3 >= 0
             RETURNING balance",
        )
        .bind(entry.player_id)
        .bind(self.starting_chips)
        .bind(entry.delta)
        .fetch_optional(&mut *tx)
        .await;

        let new_balance: Chips = match updated {
            Ok(Some(row)) => row.get("balance"),
            Ok(None) => {
                let row = sqlx::query("SELECT balance FROM chip_accounts WHERE player_id = $1")
                    .bind(entry.player_id)
                    .fetch_one(&mut *tx)
                    .await?;
                return Err(WalletError::NegativeBalance {
                    player_id: entry.player_id,
                    balance: row.get("balance"),
                    delta: entry.delta,
                });
            }
            // A brand-new account below zero trips the CHECK constraint.
            Err(sqlx::Error::Database(db)) if db.code().as_deref() == Some(CHECK_VIOLATION) => {
                return Err(WalletError::NegativeBalance {
                    player_id: entry.player_id,
                    balance: self.starting_chips,
                    delta: entry.delta,
                });
            }
            Err(err) => return Err(err.into()),
        };

        self.insert_entry(&mut tx, &entry, new_balance).await?;

        tx.commit().await?;

        Ok(new_balance)
    }
}
