//! Table manager for spawning and managing multiple table actors.

use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};
use tokio::sync::{Mutex, RwLock, mpsc};

use super::{
    actor::{TableActor, TableHandle},
    config::TableConfig,
    messages::{Reply, StateChangeNotification, SubscriptionId, TableMessage, TableMetadata},
};
use crate::{
    game::{
        ActionKind, Chips, LeaveOutcome, PlayerId, Rejection, Shoe, TableError, TableResult,
        TableSnapshot, TableState,
    },
    wallet::{ChipStore, TableId},
};

/// Buffered notifications per subscription before new ones are dropped.
const NOTIFICATION_CAPACITY: usize = 32;

/// Table manager for managing multiple table instances
pub struct TableManager {
    /// Balance source for joins, sink for settlements
    chip_store: Arc<dyn ChipStore>,

    /// Active table handles
    tables: Arc<RwLock<HashMap<TableId, TableHandle>>>,

    /// Table each player last joined. Held for the whole of a join so one
    /// player can't race into two seats.
    seated: Mutex<HashMap<PlayerId, TableId>>,

    /// Next table ID
    next_table_id: Arc<RwLock<TableId>>,

    next_subscription_id: AtomicU64,

    /// Refuse to create tables past this count
    max_tables: Option<usize>,
}

impl TableManager {
    /// Create a new table manager
    ///
    /// # Arguments
    ///
    /// * `chip_store` - Chip store shared by every table
    ///
    /// # Returns
    ///
    /// * `TableManager` - New table manager instance
    pub fn new(chip_store: Arc<dyn ChipStore>) -> Self {
        Self {
            chip_store,
            tables: Arc::new(RwLock::new(HashMap::new())),
            seated: Mutex::new(HashMap::new()),
            next_table_id: Arc::new(RwLock::new(1)),
            next_subscription_id: AtomicU64::new(1),
            max_tables: None,
        }
    }

    #[must_use]
    pub fn with_max_tables(mut self, max_tables: usize) -> Self {
        self.max_tables = Some(max_tables);
        self
    }

    /// Create and spawn a new table
    ///
    /// # Arguments
    ///
    /// * `config` - Table configuration
    ///
    /// # Returns
    ///
    /// * `Result<TableId, String>` - Table ID or error
    pub async fn create_table(&self, config: TableConfig) -> Result<TableId, String> {
        config.validate()?;
        self.spawn(|table_id| {
            TableState::new(table_id, config).map_err(|e| format!("Failed to build shoe: {e}"))
        })
        .await
    }

    /// Create a table that deals from a prepared shoe.
    pub async fn create_table_with_shoe(
        &self,
        config: TableConfig,
        shoe: Shoe,
    ) -> Result<TableId, String> {
        config.validate()?;
        self.spawn(|table_id| Ok(TableState::with_shoe(table_id, config, shoe)))
            .await
    }

    async fn spawn(
        &self,
        build: impl FnOnce(TableId) -> Result<TableState, String>,
    ) -> Result<TableId, String> {
        // Hold the table map for the whole creation so the cap can't be
        // raced past.
        let mut tables = self.tables.write().await;
        if let Some(max_tables) = self.max_tables
            && tables.len() >= max_tables
        {
            return Err(format!("Table limit of {max_tables} reached"));
        }

        let mut next_id = self.next_table_id.write().await;
        let table_id = *next_id;
        *next_id += 1;
        drop(next_id);

        let state = build(table_id)?;
        let (actor, handle) = TableActor::new(state, Arc::clone(&self.chip_store));
        tables.insert(table_id, handle);
        drop(tables);

        tokio::spawn(async move {
            actor.run().await;
        });

        log::info!("Created and spawned table {}", table_id);

        Ok(table_id)
    }

    /// Get a table handle
    pub async fn get_table(&self, table_id: TableId) -> Option<TableHandle> {
        let tables = self.tables.read().await;
        tables.get(&table_id).cloned()
    }

    async fn handle(&self, table_id: TableId) -> TableResult<TableHandle> {
        self.get_table(table_id)
            .await
            .ok_or(TableError::UnknownTable { table_id })
    }

    /// Send a command to a table and wait for its reply.
    async fn call<T>(
        &self,
        table_id: TableId,
        message: impl FnOnce(Reply<T>) -> TableMessage,
    ) -> Result<T, Rejection> {
        let handle = self.handle(table_id).await?;
        handle.request(message).await?
    }

    /// List all active tables, ordered by ID
    ///
    /// Reads the metadata each actor publishes, so listing never waits on
    /// a busy table.
    pub async fn list_tables(&self) -> Vec<TableMetadata> {
        let tables = self.tables.read().await;
        let mut metadata_list: Vec<TableMetadata> = tables
            .values()
            .filter(|handle| !handle.is_closed())
            .map(TableHandle::metadata)
            .collect();
        metadata_list.sort_by_key(|metadata| metadata.id);
        metadata_list
    }

    /// Close a table
    ///
    /// Seated players are cashed out and subscribers get
    /// [`StateChangeNotification::TableClosed`].
    pub async fn close_table(&self, table_id: TableId) -> TableResult<()> {
        let handle = self.handle(table_id).await?;

        // An actor that already stopped has nothing left to flush.
        if let Err(e) = handle
            .request(|response| TableMessage::Close { response })
            .await
        {
            log::debug!("Table {} was already stopped: {}", table_id, e);
        }

        let mut tables = self.tables.write().await;
        tables.remove(&table_id);
        drop(tables);

        log::info!("Closed table {}", table_id);

        Ok(())
    }

    /// Get active table count
    pub async fn active_table_count(&self) -> usize {
        let tables = self.tables.read().await;
        tables.len()
    }

    /// Seat a player at the lowest free position.
    ///
    /// A player holds at most one seat across all tables. The player's chips
    /// are read from the chip store before the table is asked, so the actor
    /// never waits on I/O, and only after the ledger writes of the table
    /// they last sat at are stored.
    pub async fn join(
        &self,
        table_id: TableId,
        player_id: PlayerId,
        display_name: &str,
    ) -> Result<TableSnapshot, Rejection> {
        let handle = self.handle(table_id).await?;
        let mut seated = self.seated.lock().await;

        if let Some(previous) = seated.get(&player_id).copied()
            && let Some(previous_handle) = self.get_table(previous).await
        {
            if previous != table_id && is_seated(&previous_handle, player_id).await {
                return Err(Rejection {
                    error: TableError::AlreadySeated,
                    phase: Some(handle.metadata().phase),
                    turn: None,
                });
            }
            if let Err(e) = previous_handle
                .request(|response| TableMessage::Flush { response })
                .await
            {
                log::debug!("Table {} stopped before flushing: {}", previous, e);
            }
        }

        let chips = self.chip_store.balance(player_id).await.map_err(|e| {
            log::error!("Balance lookup for player {} failed: {}", player_id, e);
            TableError::ChipStoreUnavailable {
                message: e.client_message(),
            }
        })?;

        let display_name = display_name.to_string();
        let snapshot = handle
            .request(|response| TableMessage::Join {
                player_id,
                display_name,
                chips,
                response,
            })
            .await??;
        seated.insert(player_id, table_id);
        Ok(snapshot)
    }

    pub async fn leave(
        &self,
        table_id: TableId,
        player_id: PlayerId,
    ) -> Result<LeaveOutcome, Rejection> {
        self.call(table_id, |response| TableMessage::Leave {
            player_id,
            response,
        })
        .await
    }

    pub async fn place_bet(
        &self,
        table_id: TableId,
        player_id: PlayerId,
        amount: Chips,
    ) -> Result<TableSnapshot, Rejection> {
        self.call(table_id, |response| TableMessage::PlaceBet {
            player_id,
            amount,
            response,
        })
        .await
    }

    pub async fn action(
        &self,
        table_id: TableId,
        player_id: PlayerId,
        kind: ActionKind,
        hand_index: usize,
    ) -> Result<TableSnapshot, Rejection> {
        self.call(table_id, |response| TableMessage::Action {
            player_id,
            kind,
            hand_index,
            response,
        })
        .await
    }

    pub async fn start_round(&self, table_id: TableId) -> Result<TableSnapshot, Rejection> {
        self.call(table_id, |response| TableMessage::StartRound { response })
            .await
    }

    pub async fn new_round(&self, table_id: TableId) -> Result<TableSnapshot, Rejection> {
        self.call(table_id, |response| TableMessage::NewRound { response })
            .await
    }

    /// Get the table as seen by `viewer`; `None` for spectators.
    pub async fn snapshot(
        &self,
        table_id: TableId,
        viewer: Option<PlayerId>,
    ) -> TableResult<TableSnapshot> {
        let handle = self.handle(table_id).await?;
        handle
            .request(|response| TableMessage::GetSnapshot { viewer, response })
            .await
    }

    pub async fn set_connected(
        &self,
        table_id: TableId,
        player_id: PlayerId,
        connected: bool,
    ) -> Result<TableSnapshot, Rejection> {
        self.call(table_id, |response| TableMessage::SetConnected {
            player_id,
            connected,
            response,
        })
        .await
    }

    /// Register for state change notifications.
    pub async fn subscribe(
        &self,
        table_id: TableId,
    ) -> TableResult<(SubscriptionId, mpsc::Receiver<StateChangeNotification>)> {
        let handle = self.handle(table_id).await?;
        let subscription_id = self.next_subscription_id.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = mpsc::channel(NOTIFICATION_CAPACITY);
        handle
            .send(TableMessage::Subscribe {
                subscription_id,
                sender,
            })
            .await?;
        Ok((subscription_id, receiver))
    }

    pub async fn unsubscribe(
        &self,
        table_id: TableId,
        subscription_id: SubscriptionId,
    ) -> TableResult<()> {
        let handle = self.handle(table_id).await?;
        handle
            .send(TableMessage::Unsubscribe { subscription_id })
            .await
    }
}

async fn is_seated(handle: &TableHandle, player_id: PlayerId) -> bool {
    handle
        .request(|response| TableMessage::GetSnapshot {
            viewer: None,
            response,
        })
        .await
        .is_ok_and(|snapshot| snapshot.seat_of(player_id).is_some())
}
