//! Table module providing multi-table support with an async actor model.
//!
//! This module implements:
//! - TableActor: async actor owning a single blackjack table
//! - TableManager: registry of table actors (create, list, close, route)
//! - Message-based communication with tokio channels
//! - Table configuration
//!
//! ## Architecture
//!
//! Each table runs in a separate Tokio task with an mpsc message inbox.
//! Commands for one table are applied one at a time; betting and turn
//! deadlines are a timer branch of the same loop, so a timer firing is just
//! another serialized event.
//!
//! ## Example
//!
//! ```no_run
//! use blackjack_table::table::{TableConfig, TableManager};
//! use blackjack_table::wallet::MemoryChipStore;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let manager = TableManager::new(Arc::new(MemoryChipStore::new(1000)));
//!     let table_id = manager.create_table(TableConfig::default()).await?;
//!
//!     manager.join(table_id, 1, "alice").await?;
//!     manager.start_round(table_id).await?;
//!     let snapshot = manager.place_bet(table_id, 1, 25).await?;
//!     println!("Phase: {}", snapshot.phase);
//!     Ok(())
//! }
//! ```

pub mod actor;
pub mod config;
pub mod manager;
pub mod messages;

pub use actor::{TableActor, TableHandle};
pub use config::{TableConfig, TableSpeed};
pub use manager::TableManager;
pub use messages::{StateChangeNotification, SubscriptionId, TableMessage, TableMetadata};
