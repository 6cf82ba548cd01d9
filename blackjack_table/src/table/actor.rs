//! Table actor implementation with async message handling.

use log::{debug, error, info, warn};
use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::{
    sync::{mpsc, oneshot, watch},
    task::JoinHandle,
};

use super::messages::{
    StateChangeNotification, SubscriptionId, TableMessage, TableMetadata,
};
use crate::{
    game::{
        PlayerId, Rejection, SeatManagement, TableError, TableEvent, TableResult, TableSnapshot,
        TableState, TableStateManagement,
    },
    wallet::{ChipEntry, ChipStore, LedgerScope, TableId, WalletError},
};

const INBOX_CAPACITY: usize = 100;

/// Attempts per ledger entry before giving up on a database error.
const PERSIST_ATTEMPTS: u32 = 3;
const PERSIST_BACKOFF: Duration = Duration::from_millis(200);

/// Engine time. Goes through tokio's clock so paused-time tests drive the
/// table timers.
fn clock() -> Instant {
    tokio::time::Instant::now().into_std()
}

fn describe(state: &TableState, halted: bool) -> TableMetadata {
    let data = state.data();
    let config = data.config();
    TableMetadata {
        id: data.table_id(),
        name: config.name.clone(),
        seated: data.seats().len(),
        max_seats: config.max_seats,
        min_bet: config.min_bet,
        max_bet: config.max_bet,
        phase: state.phase(),
        round_id: data.round_id(),
        speed: config.speed,
        halted,
    }
}

/// Table actor handle for sending messages
#[derive(Clone)]
pub struct TableHandle {
    sender: mpsc::Sender<TableMessage>,
    table_id: TableId,
    metadata: watch::Receiver<TableMetadata>,
}

impl TableHandle {
    /// Get table ID
    pub fn table_id(&self) -> TableId {
        self.table_id
    }

    /// Latest metadata published by the actor, without a round trip.
    pub fn metadata(&self) -> TableMetadata {
        self.metadata.borrow().clone()
    }

    /// The actor has stopped.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    /// Send a message to the table
    pub async fn send(&self, message: TableMessage) -> TableResult<()> {
        self.sender
            .send(message)
            .await
            .map_err(|_| TableError::UnknownTable {
                table_id: self.table_id,
            })
    }

    /// Send a message built around a fresh reply channel and wait for the
    /// reply.
    pub async fn request<T>(
        &self,
        message: impl FnOnce(oneshot::Sender<T>) -> TableMessage,
    ) -> TableResult<T> {
        let (tx, rx) = oneshot::channel();
        self.send(message(tx)).await?;
        rx.await.map_err(|_| TableError::UnknownTable {
            table_id: self.table_id,
        })
    }
}

/// Table actor running a single blackjack table
pub struct TableActor {
    /// Table ID
    id: TableId,

    /// Round state machine
    state: TableState,

    /// Message inbox
    inbox: mpsc::Receiver<TableMessage>,

    /// Where settlement results are recorded
    chip_store: Arc<dyn ChipStore>,

    /// Prefix for this run's ledger keys
    ledger: LedgerScope,

    /// Subscribers for state change notifications
    subscribers: HashMap<SubscriptionId, mpsc::Sender<StateChangeNotification>>,

    metadata: watch::Sender<TableMetadata>,

    /// Reason the table stopped accepting commands
    halted: Option<String>,

    /// Latest ledger write; each write waits for the one before it
    persistence: Option<JoinHandle<()>>,

    /// Reply owed to the `Close` request, sent once cash-outs are stored
    close_reply: Option<oneshot::Sender<()>>,

    /// Is table closed
    is_closed: bool,
}

impl TableActor {
    /// Create a new table actor
    ///
    /// # Arguments
    ///
    /// * `state` - Initial table state (usually an empty Waiting table)
    /// * `chip_store` - Store receiving settlement and cash-out entries
    ///
    /// # Returns
    ///
    /// * `(TableActor, TableHandle)` - Actor and handle for sending messages
    pub fn new(state: TableState, chip_store: Arc<dyn ChipStore>) -> (Self, TableHandle) {
        let id = state.data().table_id();
        let (sender, inbox) = mpsc::channel(INBOX_CAPACITY);
        let (metadata, metadata_rx) = watch::channel(describe(&state, false));

        let actor = Self {
            id,
            state,
            inbox,
            chip_store,
            ledger: LedgerScope::new(id),
            subscribers: HashMap::new(),
            metadata,
            halted: None,
            persistence: None,
            close_reply: None,
            is_closed: false,
        };

        let handle = TableHandle {
            sender,
            table_id: id,
            metadata: metadata_rx,
        };

        (actor, handle)
    }

    /// Run the table actor event loop until it is closed or every handle
    /// is dropped.
    pub async fn run(mut self) {
        info!(
            "Table {} '{}' starting",
            self.id,
            self.state.data().config().name
        );

        loop {
            let deadline = if self.halted.is_some() {
                None
            } else {
                self.state.next_deadline()
            };
            let timer = async move {
                match deadline {
                    Some(at) => tokio::time::sleep_until(tokio::time::Instant::from_std(at)).await,
                    None => std::future::pending().await,
                }
            };

            tokio::select! {
                message = self.inbox.recv() => {
                    let Some(message) = message else {
                        break;
                    };
                    self.handle_message(message);

                    if self.is_closed {
                        break;
                    }
                }

                () = timer => self.on_timer(),
            }
        }

        if let Some(persistence) = self.persistence.take()
            && let Err(e) = persistence.await
        {
            error!("Table {} ledger writer failed: {}", self.id, e);
        }
        if let Some(reply) = self.close_reply.take() {
            let _ = reply.send(());
        }

        self.notify(StateChangeNotification::TableClosed);
        info!(
            "Table {} '{}' closed",
            self.id,
            self.state.data().config().name
        );
    }

    /// Handle a table message
    fn handle_message(&mut self, message: TableMessage) {
        match message {
            TableMessage::Join {
                player_id,
                display_name,
                chips,
                response,
            } => {
                let result = self.command(Some(player_id), |state, now| {
                    state.join(player_id, &display_name, chips, now)?;
                    state.advance(now);
                    Ok(())
                });
                let _ = response.send(result);
            }

            TableMessage::Leave {
                player_id,
                response,
            } => {
                let result = self.apply(|state, now| {
                    let outcome = state.leave(player_id, now)?;
                    state.advance(now);
                    Ok(outcome)
                });
                let _ = response.send(result);
            }

            TableMessage::PlaceBet {
                player_id,
                amount,
                response,
            } => {
                let result = self.command(Some(player_id), |state, now| {
                    state.place_bet(player_id, amount, now)
                });
                let _ = response.send(result);
            }

            TableMessage::Action {
                player_id,
                kind,
                hand_index,
                response,
            } => {
                let result = self.command(Some(player_id), |state, now| {
                    state.take_action(player_id, kind, hand_index, now)
                });
                let _ = response.send(result);
            }

            TableMessage::StartRound { response } => {
                let result = self.command(None, |state, now| state.start_round(now));
                let _ = response.send(result);
            }

            TableMessage::NewRound { response } => {
                let result = self.command(None, |state, now| state.new_round(now));
                let _ = response.send(result);
            }

            TableMessage::GetSnapshot { viewer, response } => {
                let _ = response.send(self.state.snapshot(viewer, clock()));
            }

            TableMessage::SetConnected {
                player_id,
                connected,
                response,
            } => {
                let result = self.command(Some(player_id), |state, now| {
                    state.set_connected(player_id, connected, now)?;
                    state.advance(now);
                    Ok(())
                });
                let _ = response.send(result);
            }

            TableMessage::Subscribe {
                subscription_id,
                sender,
            } => {
                self.subscribers.insert(subscription_id, sender);
                debug!(
                    "Subscription {} added to table {}",
                    subscription_id, self.id
                );
            }

            TableMessage::Unsubscribe { subscription_id } => {
                self.subscribers.remove(&subscription_id);
                debug!(
                    "Subscription {} removed from table {}",
                    subscription_id, self.id
                );
            }

            TableMessage::Flush { response } => {
                let previous = self.persistence.take();
                self.persistence = Some(tokio::spawn(async move {
                    if let Some(previous) = previous {
                        let _ = previous.await;
                    }
                    let _ = response.send(());
                }));
            }

            TableMessage::Close { response } => {
                self.cash_out_all();
                self.is_closed = true;
                self.close_reply = Some(response);
            }
        }
    }

    /// Apply a command and reply with the table as `viewer` sees it.
    fn command(
        &mut self,
        viewer: Option<PlayerId>,
        f: impl FnOnce(&mut TableState, Instant) -> TableResult<()>,
    ) -> Result<TableSnapshot, Rejection> {
        self.apply(f)?;
        Ok(self.state.snapshot(viewer, clock()))
    }

    /// Run `f` against the state. A rejected command leaves the table, the
    /// sequence number and the subscribers untouched.
    fn apply<T>(
        &mut self,
        f: impl FnOnce(&mut TableState, Instant) -> TableResult<T>,
    ) -> Result<T, Rejection> {
        if self.halted.is_some() {
            return Err(self.reject(TableError::TableHalted));
        }

        let now = clock();
        match f(&mut self.state, now) {
            Ok(value) => {
                self.commit()?;
                Ok(value)
            }
            Err(error) => {
                if error.is_fatal() {
                    self.halt(&error);
                }
                Err(self.reject(error))
            }
        }
    }

    fn on_timer(&mut self) {
        if self.halted.is_some() {
            return;
        }

        match self.state.on_timer(clock()) {
            Ok(true) => {
                let _ = self.commit();
            }
            Ok(false) => {}
            Err(error) => self.halt(&error),
        }
    }

    /// Bookkeeping after every applied command or timer event.
    fn commit(&mut self) -> Result<(), Rejection> {
        let seq = self.state.bump_seq();
        let events = self.state.drain_events();

        if let Err(error) = self.state.check_invariants() {
            self.halt(&error);
            if !events.is_empty() {
                error!(
                    "Table {} dropped {} events after invariant violation",
                    self.id,
                    events.len()
                );
            }
            self.publish_metadata();
            self.notify(StateChangeNotification::StateChanged {
                seq,
                phase: self.state.phase(),
            });
            return Err(self.reject(error));
        }

        let seats_changed = events.iter().any(|event| {
            matches!(
                event,
                TableEvent::Seated { .. } | TableEvent::Left { .. } | TableEvent::Evicted { .. }
            )
        });
        self.dispatch(events);

        self.publish_metadata();
        self.notify(StateChangeNotification::StateChanged {
            seq,
            phase: self.state.phase(),
        });
        if seats_changed {
            self.notify(StateChangeNotification::PlayerListChanged { seq });
        }
        Ok(())
    }

    /// Turn table events into ledger entries. Settlements are recorded
    /// before the cash-outs of the same commit.
    fn dispatch(&mut self, events: impl IntoIterator<Item = TableEvent>) {
        let round_id = self.state.data().round_id();
        let seq = self.state.data().seq();
        let mut settlements = Vec::new();
        let mut cash_outs = Vec::new();

        for event in events {
            debug!("Table {}: {}", self.id, event);
            match event {
                TableEvent::RoundSettled(report) => {
                    settlements.extend(report.deltas.iter().map(|delta| {
                        ChipEntry::settlement(&self.ledger, report.round_id, delta)
                    }));
                }
                TableEvent::Left { player_id, chips }
                | TableEvent::Evicted {
                    player_id, chips, ..
                } => {
                    cash_outs.push(ChipEntry::cash_out(
                        &self.ledger,
                        round_id,
                        seq,
                        player_id,
                        chips,
                    ));
                }
                TableEvent::Seated { .. }
                | TableEvent::RoundStarted { .. }
                | TableEvent::BettingClosed { .. }
                | TableEvent::AutoStood { .. } => {}
            }
        }

        settlements.extend(cash_outs);
        self.persist(settlements);
    }

    /// Record the balances of everyone still seated. Unsettled bets go
    /// back to their owners.
    fn cash_out_all(&mut self) {
        if self.halted.is_some() {
            warn!(
                "Table {} closing while halted, skipping cash-outs",
                self.id
            );
            return;
        }

        let data = self.state.data();
        let entries: Vec<ChipEntry> = data
            .seats()
            .iter()
            .map(|seat| {
                ChipEntry::cash_out(
                    &self.ledger,
                    data.round_id(),
                    data.seq(),
                    seat.player_id,
                    seat.chips + seat.total_bet(),
                )
            })
            .collect();
        self.persist(entries);
    }

    /// Record entries in order on a background task, after every entry
    /// handed over earlier.
    fn persist(&mut self, entries: Vec<ChipEntry>) {
        if entries.is_empty() {
            return;
        }

        let store = Arc::clone(&self.chip_store);
        let table_id = self.id;
        let previous = self.persistence.take();
        self.persistence = Some(tokio::spawn(async move {
            if let Some(previous) = previous {
                let _ = previous.await;
            }
            for entry in entries {
                record_with_retry(store.as_ref(), table_id, entry).await;
            }
        }));
    }

    fn halt(&mut self, error: &TableError) {
        error!("Table {} halted: {}", self.id, error);
        self.halted = Some(error.to_string());
        self.publish_metadata();
    }

    fn reject(&self, error: TableError) -> Rejection {
        Rejection {
            error,
            phase: Some(self.state.phase()),
            turn: self.state.turn(),
        }
    }

    fn publish_metadata(&self) {
        self.metadata
            .send_replace(describe(&self.state, self.halted.is_some()));
    }

    /// Broadcast state change notification to all subscribers
    fn notify(&mut self, notification: StateChangeNotification) {
        let table_id = self.id;
        self.subscribers.retain(|subscription_id, sender| {
            match sender.try_send(notification.clone()) {
                Ok(()) => true,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(
                        "Subscription {} on table {} is full, dropping notification",
                        subscription_id, table_id
                    );
                    true
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    debug!(
                        "Subscription {} on table {} disconnected, removing",
                        subscription_id, table_id
                    );
                    false
                }
            }
        });
    }
}

async fn record_with_retry(store: &dyn ChipStore, table_id: TableId, entry: ChipEntry) {
    for attempt in 1..=PERSIST_ATTEMPTS {
        match store.record(entry.clone()).await {
            Ok(balance) => {
                debug!(
                    "Table {} recorded {} ({:+}), balance {}",
                    table_id, entry.idempotency_key, entry.delta, balance
                );
                return;
            }
            // After a failed attempt the write may have landed anyway.
            Err(WalletError::DuplicateEntry(key)) if attempt > 1 => {
                debug!("Table {} entry {} already recorded", table_id, key);
                return;
            }
            Err(WalletError::DuplicateEntry(key)) => {
                warn!(
                    "Table {} entry {} collides with an existing ledger entry, not applied",
                    table_id, key
                );
                return;
            }
            Err(WalletError::Database(err)) if attempt < PERSIST_ATTEMPTS => {
                warn!(
                    "Table {} failed to record {} (attempt {}): {}",
                    table_id, entry.idempotency_key, attempt, err
                );
                tokio::time::sleep(PERSIST_BACKOFF * attempt).await;
            }
            Err(err) => {
                error!(
                    "Table {} failed to record {}: {}",
                    table_id, entry.idempotency_key, err
                );
                return;
            }
        }
    }
}
