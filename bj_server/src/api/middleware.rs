//! Player identity middleware for protected endpoints.
//!
//! Authentication is handled upstream; this server trusts the identity a
//! gateway forwards in two headers:
//!
//! ```text
//! x-player-id: 42
//! x-display-name: alice
//! ```
//!
//! The middleware parses them and injects an [`Identity`] into request
//! extensions for downstream handlers.
//!
//! # Usage
//!
//! ```rust,no_run
//! use axum::{Router, extract::Extension, routing::get, middleware};
//! use bj_server::api::middleware::{Identity, identity_middleware};
//!
//! async fn whoami(Extension(identity): Extension<Identity>) -> String {
//!     format!("Seated as {}", identity.display_name)
//! }
//!
//! let protected_routes: Router = Router::new()
//!     .route("/whoami", get(whoami))
//!     .layer(middleware::from_fn(identity_middleware));
//! # let _ = protected_routes;
//! ```

use axum::{
    extract::Request,
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};
use blackjack_table::PlayerId;

pub const PLAYER_ID_HEADER: &str = "x-player-id";
pub const DISPLAY_NAME_HEADER: &str = "x-display-name";

/// The player making a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub player_id: PlayerId,
    pub display_name: String,
}

/// Read the caller's identity from request headers.
///
/// # Returns
///
/// * `Ok(None)` - No `x-player-id` header (anonymous caller)
/// * `Ok(Some(identity))` - A valid identity; the display name falls back to
///   `player<id>` when absent or blank
/// * `Err(400)` - The player ID is not a positive integer
pub fn identity_from_headers(headers: &HeaderMap) -> Result<Option<Identity>, StatusCode> {
    let Some(raw_id) = headers.get(PLAYER_ID_HEADER) else {
        return Ok(None);
    };

    let player_id = raw_id
        .to_str()
        .ok()
        .and_then(|value| value.trim().parse::<PlayerId>().ok())
        .filter(|id| *id > 0)
        .ok_or(StatusCode::BAD_REQUEST)?;

    let display_name = headers
        .get(DISPLAY_NAME_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("player{player_id}"));

    Ok(Some(Identity {
        player_id,
        display_name,
    }))
}

/// Require an identity on the request.
///
/// - **Valid headers**: Injects [`Identity`] into request extensions and calls the next handler
/// - **Missing `x-player-id`**: Returns `401 Unauthorized`
/// - **Malformed `x-player-id`**: Returns `400 Bad Request`
pub async fn identity_middleware(mut request: Request, next: Next) -> Result<Response, StatusCode> {
    let identity = identity_from_headers(request.headers())?.ok_or(StatusCode::UNAUTHORIZED)?;
    request.extensions_mut().insert(identity);
    Ok(next.run(request).await)
}
