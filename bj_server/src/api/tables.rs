//! Table management API handlers.
//!
//! REST endpoints for blackjack table operations:
//! - Listing, creating and closing tables
//! - Viewing a table snapshot (anonymous callers see it as spectators)
//! - Joining and leaving
//! - Betting, playing hands and moving the table between rounds
//!
//! Commands answer with the caller's fresh [`TableSnapshot`], or with the
//! refusal and enough table context to act on it.
//!
//! # Examples
//!
//! List all tables:
//! ```bash
//! curl http://localhost:6969/api/v1/tables
//! ```
//!
//! Place a bet:
//! ```bash
//! curl -X POST http://localhost:6969/api/v1/tables/1/bet \
//!   -H "x-player-id: 42" -H "x-display-name: alice" \
//!   -H "Content-Type: application/json" \
//!   -d '{"amount": 25}'
//! ```

use axum::{
    Json,
    extract::{Extension, Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use blackjack_table::{
    ActionKind, Chips, Rejection, TableError, TableSnapshot,
    game::LeaveOutcome,
    table::{TableConfig, TableMetadata},
    wallet::TableId,
};
use serde::{Deserialize, Serialize};

use super::{AppState, middleware::Identity, request_id::RequestId};
use crate::{logging, metrics};

#[derive(Debug, Deserialize)]
pub struct BetRequest {
    pub amount: Chips,
}

#[derive(Debug, Deserialize)]
pub struct ActionRequest {
    pub action: ActionKind,
    /// Hand to act on; defaults to the first hand
    #[serde(default)]
    pub hand_index: usize,
}

#[derive(Debug, Serialize)]
pub struct CreateTableResponse {
    pub table_id: TableId,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    /// Table context for refused commands
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejection: Option<Rejection>,
}

impl ErrorResponse {
    fn message(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            rejection: None,
        }
    }
}

/// A refused table command.
#[derive(Debug)]
pub struct ApiError(pub Rejection);

impl ApiError {
    /// HTTP status for a refusal
    pub fn status(&self) -> StatusCode {
        match self.0.error {
            TableError::InvalidPhase { .. }
            | TableError::NotYourTurn { .. }
            | TableError::AlreadySeated
            | TableError::TableFull { .. } => StatusCode::CONFLICT,
            TableError::IllegalAction { .. }
            | TableError::BetOutOfRange { .. }
            | TableError::InsufficientChips { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            TableError::UnknownTable { .. } | TableError::UnknownPlayer { .. } => {
                StatusCode::NOT_FOUND
            }
            TableError::ChipStoreUnavailable { .. }
            | TableError::InvariantViolation { .. }
            | TableError::TableHalted => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl From<Rejection> for ApiError {
    fn from(rejection: Rejection) -> Self {
        Self(rejection)
    }
}

impl From<TableError> for ApiError {
    fn from(error: TableError) -> Self {
        Self(Rejection::from(error))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = ErrorResponse {
            error: self.0.to_string(),
            rejection: Some(self.0),
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

/// Count the command and log a refusal before handing the result back.
fn track<T>(
    command: &str,
    table_id: TableId,
    player_id: Option<i64>,
    result: Result<T, Rejection>,
) -> ApiResult<T> {
    metrics::table_commands_total(command, result.is_ok());
    match result {
        Ok(value) => Ok(Json(value)),
        Err(rejection) => {
            logging::log_rejection(table_id, player_id, command, &rejection.to_string());
            Err(ApiError(rejection))
        }
    }
}

/// List all open tables.
///
/// Public. Returns `200 OK` with table metadata ordered by ID:
/// ```json
/// [
///   {
///     "id": 1,
///     "name": "Table 1",
///     "seated": 2,
///     "max_seats": 6,
///     "min_bet": 10,
///     "max_bet": 500,
///     "phase": "betting",
///     "round_id": 14,
///     "speed": "normal",
///     "halted": false
///   }
/// ]
/// ```
pub async fn list_tables(State(state): State<AppState>) -> Json<Vec<TableMetadata>> {
    let tables = state.table_manager.list_tables().await;
    metrics::active_tables(tables.len());
    Json(tables)
}

/// Open a new table.
///
/// The body is a table configuration; every field is optional and falls
/// back to its default.
///
/// # Errors
///
/// - `422 Unprocessable Entity`: The configuration is invalid
/// - `409 Conflict`: The server's table limit is reached
pub async fn create_table(
    State(state): State<AppState>,
    request_id: RequestId,
    Json(config): Json<TableConfig>,
) -> Result<(StatusCode, Json<CreateTableResponse>), (StatusCode, Json<ErrorResponse>)> {
    if let Err(reason) = config.validate() {
        return Err((
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(ErrorResponse::message(reason)),
        ));
    }

    match state.table_manager.create_table(config).await {
        Ok(table_id) => {
            tracing::info!(request_id = request_id.as_str(), table_id, "Table created");
            metrics::active_tables(state.table_manager.active_table_count().await);
            Ok((StatusCode::CREATED, Json(CreateTableResponse { table_id })))
        }
        Err(e) => Err((StatusCode::CONFLICT, Json(ErrorResponse::message(e)))),
    }
}

/// Close a table, cashing out everyone seated.
///
/// Returns `204 No Content`, or `404 Not Found` for an unknown table.
pub async fn close_table(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    request_id: RequestId,
    Path(table_id): Path<TableId>,
) -> Result<StatusCode, ApiError> {
    state.table_manager.close_table(table_id).await?;
    tracing::info!(
        request_id = request_id.as_str(),
        table_id,
        player_id = identity.player_id,
        "Table closed"
    );
    metrics::active_tables(state.table_manager.active_table_count().await);
    Ok(StatusCode::NO_CONTENT)
}

/// Get a table snapshot.
///
/// Public. A caller sending `x-player-id` sees the table from their seat;
/// everyone else sees it as a spectator.
///
/// # Errors
///
/// - `400 Bad Request`: Malformed `x-player-id`
/// - `404 Not Found`: Table doesn't exist
pub async fn get_table(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(table_id): Path<TableId>,
) -> Result<Json<TableSnapshot>, Response> {
    let viewer = super::middleware::identity_from_headers(&headers)
        .map_err(IntoResponse::into_response)?
        .map(|identity| identity.player_id);

    state
        .table_manager
        .snapshot(table_id, viewer)
        .await
        .map(Json)
        .map_err(|e| ApiError::from(e).into_response())
}

/// Take the lowest free seat.
///
/// The player's chip balance is read from the chip store.
///
/// # Errors
///
/// - `409 Conflict`: Table full or already seated
/// - `404 Not Found`: Table doesn't exist
/// - `503 Service Unavailable`: Chip store unreachable
pub async fn join_table(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(table_id): Path<TableId>,
) -> ApiResult<TableSnapshot> {
    let result = state
        .table_manager
        .join(table_id, identity.player_id, &identity.display_name)
        .await;
    track("join", table_id, Some(identity.player_id), result)
}

/// Leave the table.
///
/// Between rounds the seat is freed at once and the response carries the
/// chips cashed out. With a bet in play the seat is released when the
/// round settles:
/// ```json
/// {"status": "removed", "chips": 1050}
/// {"status": "removed_at_round_end"}
/// ```
pub async fn leave_table(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(table_id): Path<TableId>,
) -> ApiResult<LeaveOutcome> {
    let result = state.table_manager.leave(table_id, identity.player_id).await;
    track("leave", table_id, Some(identity.player_id), result)
}

/// Place this round's bet.
///
/// # Errors
///
/// - `409 Conflict`: No betting window open
/// - `422 Unprocessable Entity`: Bet out of range, not enough chips, or a
///   bet already placed
pub async fn place_bet(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(table_id): Path<TableId>,
    Json(request): Json<BetRequest>,
) -> ApiResult<TableSnapshot> {
    let result = state
        .table_manager
        .place_bet(table_id, identity.player_id, request.amount)
        .await;
    track("bet", table_id, Some(identity.player_id), result)
}

/// Play a hand.
///
/// ```json
/// {"action": "split", "hand_index": 0}
/// ```
///
/// # Errors
///
/// - `409 Conflict`: Not your turn, or no hands in play
/// - `422 Unprocessable Entity`: The action isn't legal for that hand
pub async fn take_action(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(table_id): Path<TableId>,
    Json(request): Json<ActionRequest>,
) -> ApiResult<TableSnapshot> {
    let result = state
        .table_manager
        .action(
            table_id,
            identity.player_id,
            request.action,
            request.hand_index,
        )
        .await;
    track("action", table_id, Some(identity.player_id), result)
}

/// Open the betting window for a new round.
pub async fn start_round(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(table_id): Path<TableId>,
) -> ApiResult<TableSnapshot> {
    let result = state.table_manager.start_round(table_id).await;
    track("start_round", table_id, Some(identity.player_id), result)
}

/// Clear a finished round and open betting again.
pub async fn new_round(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(table_id): Path<TableId>,
) -> ApiResult<TableSnapshot> {
    let result = state.table_manager.new_round(table_id).await;
    track("new_round", table_id, Some(identity.player_id), result)
}
