//! Chip persistence.
//!
//! This module implements:
//! - The [`ChipStore`] seam tables use to read balances and record results
//! - An append-only ledger keyed by idempotency key, so a replayed
//!   settlement is applied at most once
//! - An in-memory store for tests and database-less deployments
//! - A PostgreSQL store
//!
//! ## Example
//!
//! ```no_run
//! use blackjack_table::db::{Database, DatabaseConfig};
//! use blackjack_table::wallet::{ChipStore, PgChipStore};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Database::new(&DatabaseConfig::development()).await?;
//!     let store = PgChipStore::new(Arc::new(db.pool().clone()), 1000);
//!     store.ensure_schema().await?;
//!
//!     println!("Balance: {}", store.balance(1).await?);
//!     Ok(())
//! }
//! ```

pub mod errors;
pub mod manager;
pub mod models;
pub mod postgres;

pub use errors::{WalletError, WalletResult};
pub use manager::{ChipStore, MemoryChipStore};
pub use models::{ChipAccount, ChipEntry, EntryKind, LedgerScope, TableId};
pub use postgres::PgChipStore;
