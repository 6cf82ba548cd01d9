//! WebSocket handler for real-time table updates.
//!
//! A connection is bound to one table and one player. The client sends
//! commands as JSON; the server answers each command and pushes a fresh
//! snapshot whenever the table changes.
//!
//! # Connection Flow
//!
//! 1. Client connects via `GET /ws/:table_id` with identity headers
//! 2. Server subscribes to the table and sends the current snapshot
//! 3. A seated player is marked connected again, which restores their
//!    normal turn timer
//! 4. On disconnect the player keeps their seat; the table gives them a
//!    short grace period when their turn comes
//!
//! # Client Messages
//!
//! ```json
//! {"type": "join"}
//! {"type": "bet", "amount": 25}
//! {"type": "action", "action": "hit"}
//! {"type": "action", "action": "stand", "hand_index": 1}
//! {"type": "start_round"}
//! {"type": "new_round"}
//! {"type": "leave"}
//! ```
//!
//! # Server Messages
//!
//! - `snapshot`: The table as this player sees it
//! - `left`: Outcome of a leave request
//! - `error`: A refused command, with table context when the table refused it
//! - `table_closed`: The table shut down; the socket closes after this

use axum::{
    Json,
    extract::{
        Extension, Path, State,
        ws::{Message, WebSocket, WebSocketUpgrade, rejection::WebSocketUpgradeRejection},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use blackjack_table::{
    ActionKind, Chips, PlayerId, Rejection, TableSnapshot,
    game::LeaveOutcome,
    table::{StateChangeNotification, TableManager},
    wallet::TableId,
};
use futures_util::{SinkExt, StreamExt, stream::SplitSink};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::{Mutex, mpsc};

use super::{AppState, middleware::Identity, rate_limiter::ConnectionLimiter, tables::ErrorResponse};
use crate::{logging, metrics};

/// Buffered replies per connection
const RESPONSE_CAPACITY: usize = 32;

/// Open sockets per seat.
///
/// A player may hold several sockets to one table; the seat counts as
/// disconnected only once the last of them closes.
#[derive(Default)]
pub struct ConnectionRegistry {
    open: Mutex<HashMap<(TableId, PlayerId), usize>>,
}

impl ConnectionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Count a new socket and mark the seat connected if the player is
    /// seated. Returns the table as the player sees it.
    pub async fn connect(
        &self,
        manager: &TableManager,
        table_id: TableId,
        player_id: PlayerId,
    ) -> Result<TableSnapshot, Rejection> {
        let mut open = self.open.lock().await;
        *open.entry((table_id, player_id)).or_default() += 1;

        let snapshot = manager.snapshot(table_id, Some(player_id)).await?;
        if snapshot.seat_of(player_id).is_none() {
            return Ok(snapshot);
        }
        Ok(manager
            .set_connected(table_id, player_id, true)
            .await
            .unwrap_or(snapshot))
    }

    /// Forget a socket. Returns whether the seat was marked disconnected.
    pub async fn disconnect(
        &self,
        manager: &TableManager,
        table_id: TableId,
        player_id: PlayerId,
    ) -> bool {
        let mut open = self.open.lock().await;
        let key = (table_id, player_id);
        let remaining = match open.get_mut(&key) {
            Some(count) if *count > 1 => {
                *count -= 1;
                *count
            }
            _ => {
                open.remove(&key);
                0
            }
        };
        if remaining > 0 {
            debug!(
                "Player {} still has {} socket(s) on table {}",
                player_id, remaining, table_id
            );
            return false;
        }

        match manager.set_connected(table_id, player_id, false).await {
            Ok(_) => true,
            Err(rejection) => {
                debug!(
                    "Player {} not marked disconnected at table {}: {}",
                    player_id, table_id, rejection
                );
                false
            }
        }
    }

    /// Sockets currently open for one seat.
    pub async fn open_count(&self, table_id: TableId, player_id: PlayerId) -> usize {
        let open = self.open.lock().await;
        open.get(&(table_id, player_id)).copied().unwrap_or(0)
    }
}

/// Commands accepted over the socket
#[derive(Debug, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Join,
    Leave,
    Bet {
        amount: Chips,
    },
    Action {
        action: ActionKind,
        #[serde(default)]
        hand_index: usize,
    },
    StartRound,
    NewRound,
}

impl ClientMessage {
    fn command(&self) -> &'static str {
        match self {
            Self::Join => "join",
            Self::Leave => "leave",
            Self::Bet { .. } => "bet",
            Self::Action { .. } => "action",
            Self::StartRound => "start_round",
            Self::NewRound => "new_round",
        }
    }
}

/// Messages pushed to the client
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Snapshot {
        snapshot: Box<TableSnapshot>,
    },
    Left {
        outcome: LeaveOutcome,
    },
    Error {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        rejection: Option<Rejection>,
    },
    TableClosed,
}

impl ServerMessage {
    fn snapshot(snapshot: TableSnapshot) -> Self {
        Self::Snapshot {
            snapshot: Box::new(snapshot),
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
            rejection: None,
        }
    }
}

/// Upgrade HTTP connection to WebSocket for real-time table communication.
///
/// Sits behind the identity middleware.
///
/// # Response
///
/// - `101 Switching Protocols`: Connection upgraded
/// - `404 Not Found`: Table doesn't exist
/// - `4xx`: Not a WebSocket upgrade request
pub async fn websocket_handler(
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
    Path(table_id): Path<TableId>,
    Extension(identity): Extension<Identity>,
    State(state): State<AppState>,
) -> Response {
    if state.table_manager.get_table(table_id).await.is_none() {
        return (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: format!("table {table_id} does not exist"),
                rejection: None,
            }),
        )
            .into_response();
    }

    match ws {
        Ok(ws) => ws.on_upgrade(move |socket| handle_socket(socket, table_id, identity, state)),
        Err(rejection) => rejection.into_response(),
    }
}

async fn send_json(
    sender: &mut SplitSink<WebSocket, Message>,
    message: &ServerMessage,
) -> Result<(), axum::Error> {
    let json = match serde_json::to_string(message) {
        Ok(json) => json,
        Err(e) => {
            warn!("Failed to serialize server message: {}", e);
            return Ok(());
        }
    };
    sender.send(Message::Text(json.into())).await?;
    metrics::websocket_messages_sent();
    Ok(())
}

/// Handle an established WebSocket connection.
async fn handle_socket(socket: WebSocket, table_id: TableId, identity: Identity, state: AppState) {
    let player_id = identity.player_id;
    let (mut sender, mut receiver) = socket.split();

    let (subscription_id, mut notification_rx) =
        match state.table_manager.subscribe(table_id).await {
            Ok(subscription) => subscription,
            Err(e) => {
                warn!("Subscribe to table {} failed: {}", table_id, e);
                let _ = send_json(&mut sender, &ServerMessage::error(e.to_string())).await;
                return;
            }
        };

    metrics::websocket_connected();
    info!("WebSocket connected: table={}, player={}", table_id, player_id);

    let (response_tx, mut response_rx) = mpsc::channel::<ServerMessage>(RESPONSE_CAPACITY);

    // A returning player gets their turn timer back.
    match state
        .connections
        .connect(&state.table_manager, table_id, player_id)
        .await
    {
        Ok(snapshot) => {
            let _ = response_tx.send(ServerMessage::snapshot(snapshot)).await;
        }
        Err(e) => debug!("Initial snapshot for table {} failed: {}", table_id, e),
    }

    let send_manager = state.table_manager.clone();
    let send_task = tokio::spawn(async move {
        loop {
            let message = tokio::select! {
                notification = notification_rx.recv() => {
                    let mut closed = !matches!(
                        notification,
                        Some(StateChangeNotification::StateChanged { .. })
                            | Some(StateChangeNotification::PlayerListChanged { .. })
                    );
                    // One snapshot covers every change already queued.
                    while !closed && let Ok(next) = notification_rx.try_recv() {
                        closed = next == StateChangeNotification::TableClosed;
                    }
                    if closed {
                        ServerMessage::TableClosed
                    } else {
                        match send_manager.snapshot(table_id, Some(player_id)).await {
                            Ok(snapshot) => ServerMessage::snapshot(snapshot),
                            Err(e) => {
                                debug!("Snapshot for table {} failed: {}", table_id, e);
                                continue;
                            }
                        }
                    }
                }
                Some(message) = response_rx.recv() => message,
            };

            let closing = matches!(message, ServerMessage::TableClosed);
            if send_json(&mut sender, &message).await.is_err() {
                break;
            }
            if closing {
                let _ = sender.send(Message::Close(None)).await;
                break;
            }
        }
    });

    let mut limiter = ConnectionLimiter::default();
    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                metrics::websocket_messages_received();

                if let Err(limit) = limiter.check() {
                    warn!(
                        "{} rate limit exceeded for player {} (table {}). Blocking message.",
                        limit.limiter(),
                        player_id,
                        table_id
                    );
                    metrics::rate_limit_hits_total(limit.limiter());
                    if response_tx
                        .send(ServerMessage::error(limit.client_message()))
                        .await
                        .is_err()
                    {
                        break;
                    }
                    continue;
                }

                let reply = match serde_json::from_str::<ClientMessage>(&text) {
                    Ok(client_msg) => {
                        handle_client_message(client_msg, table_id, &identity, &state).await
                    }
                    Err(e) => {
                        debug!("Failed to parse client message: {}", e);
                        ServerMessage::error("Invalid message format")
                    }
                };

                if response_tx.send(reply).await.is_err() {
                    break;
                }
            }
            Ok(Message::Close(_)) => break,
            Err(e) => {
                debug!("WebSocket error: {}", e);
                break;
            }
            _ => {}
        }
    }

    send_task.abort();

    if let Err(e) = state
        .table_manager
        .unsubscribe(table_id, subscription_id)
        .await
    {
        debug!("Unsubscribe from table {} failed: {}", table_id, e);
    }

    // The seat is kept; only the turn timer shortens.
    state
        .connections
        .disconnect(&state.table_manager, table_id, player_id)
        .await;

    metrics::websocket_disconnected();
    info!(
        "WebSocket disconnected: table={}, player={}",
        table_id, player_id
    );
}

/// Run a client command against the table and build the reply.
async fn handle_client_message(
    msg: ClientMessage,
    table_id: TableId,
    identity: &Identity,
    state: &AppState,
) -> ServerMessage {
    let manager = &state.table_manager;
    let player_id = identity.player_id;
    let command = msg.command();

    let result = match msg {
        ClientMessage::Join => manager
            .join(table_id, player_id, &identity.display_name)
            .await
            .map(ServerMessage::snapshot),
        ClientMessage::Leave => manager
            .leave(table_id, player_id)
            .await
            .map(|outcome| ServerMessage::Left { outcome }),
        ClientMessage::Bet { amount } => manager
            .place_bet(table_id, player_id, amount)
            .await
            .map(ServerMessage::snapshot),
        ClientMessage::Action { action, hand_index } => manager
            .action(table_id, player_id, action, hand_index)
            .await
            .map(ServerMessage::snapshot),
        ClientMessage::StartRound => manager
            .start_round(table_id)
            .await
            .map(ServerMessage::snapshot),
        ClientMessage::NewRound => manager
            .new_round(table_id)
            .await
            .map(ServerMessage::snapshot),
    };

    metrics::table_commands_total(command, result.is_ok());
    result.unwrap_or_else(|rejection| {
        logging::log_rejection(table_id, Some(player_id), command, &rejection.to_string());
        ServerMessage::Error {
            message: rejection.to_string(),
            rejection: Some(rejection),
        }
    })
}
