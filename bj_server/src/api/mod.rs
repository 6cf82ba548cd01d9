//! HTTP/WebSocket API for the blackjack server.
//!
//! REST endpoints drive tables command by command; the WebSocket endpoint
//! pushes snapshots as tables change.
//!
//! # Architecture
//!
//! - **Axum**: Async web framework for HTTP/WebSocket
//! - **Tower**: Middleware for CORS, request IDs and identity
//! - **Actor Model**: Each table is owned by a dedicated actor task
//!
//! # Modules
//!
//! - [`tables`]: Table management and player commands
//! - [`websocket`]: Real-time bidirectional communication for live play
//! - [`middleware`]: Player identity for protected endpoints
//! - [`request_id`]: Request correlation, access logs and HTTP metrics
//! - [`rate_limiter`]: Per-connection WebSocket limits
//!
//! # Endpoints Overview
//!
//! ## Public
//! - `GET /health` - Server health status
//! - `GET /api/v1/tables` - List all tables
//! - `POST /api/v1/tables` - Open a table
//! - `GET /api/v1/tables/:id` - Table snapshot (from the caller's seat if identified)
//!
//! ## Identity Required
//! - `POST /api/v1/tables/:id/close` - Close a table
//! - `POST /api/v1/tables/:id/join` - Take a seat
//! - `POST /api/v1/tables/:id/leave` - Leave the table
//! - `POST /api/v1/tables/:id/bet` - Place a bet
//! - `POST /api/v1/tables/:id/action` - Hit, stand, double, split or surrender
//! - `POST /api/v1/tables/:id/start` - Open betting
//! - `POST /api/v1/tables/:id/new-round` - Clear results and open betting
//! - `GET /ws/:table_id` - WebSocket
//!
//! # Example Usage
//!
//! ```rust,no_run
//! use bj_server::api::{AppState, create_router};
//! use blackjack_table::{table::TableManager, wallet::MemoryChipStore};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let state = AppState::new(
//!     Arc::new(TableManager::new(Arc::new(MemoryChipStore::new(1000)))),
//!     None,
//! );
//!
//! let app = create_router(state);
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:6969").await?;
//! axum::serve(listener, app).await?;
//! # Ok(())
//! # }
//! ```
//!
//! # CORS
//!
//! CORS is configured permissively for development. In production, configure
//! appropriate origins, methods, and headers.

pub mod middleware;
pub mod rate_limiter;
pub mod request_id;
pub mod tables;
pub mod websocket;

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post},
};
use blackjack_table::{db::Database, table::TableManager};
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

/// Application state shared across all HTTP handlers and WebSocket connections.
///
/// # Fields
///
/// - `table_manager`: Registry of table actors
/// - `database`: Connection pool, when chips are stored in PostgreSQL
/// - `connections`: Open WebSocket count per seat
#[derive(Clone)]
pub struct AppState {
    pub table_manager: Arc<TableManager>,
    pub database: Option<Database>,
    pub connections: Arc<websocket::ConnectionRegistry>,
}

impl AppState {
    pub fn new(table_manager: Arc<TableManager>, database: Option<Database>) -> Self {
        Self {
            table_manager,
            database,
            connections: Arc::new(websocket::ConnectionRegistry::new()),
        }
    }
}

/// Create the complete API router with all endpoints and middleware.
///
/// # Example
///
/// ```rust,no_run
/// # use bj_server::api::{create_router, AppState};
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// # let state: AppState = unimplemented!();
/// let app = create_router(state);
/// let listener = tokio::net::TcpListener::bind("0.0.0.0:6969").await?;
/// axum::serve(listener, app).await?;
/// # Ok(())
/// # }
/// ```
pub fn create_router(state: AppState) -> Router {
    let ws_routes = Router::new()
        .route("/ws/{table_id}", get(websocket::websocket_handler))
        .route_layer(axum::middleware::from_fn(middleware::identity_middleware));

    Router::new()
        .route("/health", get(health_check))
        .merge(ws_routes)
        .nest("/api/v1", create_v1_router())
        .layer(axum::middleware::from_fn(request_id::request_id_middleware))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Create API v1 router with all versioned endpoints.
fn create_v1_router() -> Router<AppState> {
    let public_routes = Router::new()
        .route("/tables", get(tables::list_tables).post(tables::create_table))
        .route("/tables/{table_id}", get(tables::get_table));

    let protected_routes = Router::new()
        .route("/tables/{table_id}/close", post(tables::close_table))
        .route("/tables/{table_id}/join", post(tables::join_table))
        .route("/tables/{table_id}/leave", post(tables::leave_table))
        .route("/tables/{table_id}/bet", post(tables::place_bet))
        .route("/tables/{table_id}/action", post(tables::take_action))
        .route("/tables/{table_id}/start", post(tables::start_round))
        .route("/tables/{table_id}/new-round", post(tables::new_round))
        .route_layer(axum::middleware::from_fn(middleware::identity_middleware));

    Router::new().merge(public_routes).merge(protected_routes)
}

/// Health check endpoint for monitoring and load balancers.
///
/// Returns `200 OK` when the database (if configured) answers, otherwise
/// `503 Service Unavailable`.
///
/// ```bash
/// curl http://localhost:6969/health
/// # {"status":"healthy","version":"0.1.0","database":"memory","tables":{"active_count":1}}
/// ```
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let (db_healthy, database) = match &state.database {
        Some(database) => match database.health_check().await {
            Ok(()) => (true, "postgres"),
            Err(e) => {
                tracing::warn!("Database health check failed: {}", e);
                (false, "postgres")
            }
        },
        None => (true, "memory"),
    };

    let table_count = state.table_manager.active_table_count().await;

    let status_code = if db_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let response = json!({
        "status": if db_healthy { "healthy" } else { "unhealthy" },
        "version": env!("CARGO_PKG_VERSION"),
        "database": database,
        "database_healthy": db_healthy,
        "tables": {
            "active_count": table_count
        },
    });

    (status_code, Json(response))
}
