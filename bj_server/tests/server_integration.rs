//! Integration tests for the HTTP API.
//!
//! Each test builds the router over an in-memory chip store and drives it
//! with `oneshot` requests.

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use bj_server::api::{AppState, create_router};
use blackjack_table::{
    game::{Card, Rank, Shoe, Suit},
    table::{TableConfig, TableManager},
    wallet::{ChipStore, MemoryChipStore},
};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use std::sync::Arc;
use tower::ServiceExt; // For `oneshot` method

/// Helper to create test server with an in-memory chip store
fn create_test_server() -> (Router, Arc<TableManager>, Arc<MemoryChipStore>) {
    let store = Arc::new(MemoryChipStore::new(1000));
    let table_manager = Arc::new(TableManager::new(
        Arc::clone(&store) as Arc<dyn ChipStore>
    ));
    let app = create_router(AppState::new(Arc::clone(&table_manager), None));
    (app, table_manager, store)
}

/// Player 19 against dealer 17.
fn winning_shoe() -> Shoe {
    let ranks = [Rank::Ten, Rank::Ten, Rank::Nine, Rank::Seven];
    Shoe::stacked(6, ranks.into_iter().map(|rank| Card::new(rank, Suit::Club))).unwrap()
}

async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    player_id: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(player_id) = player_id {
        builder = builder
            .header("x-player-id", player_id)
            .header("x-display-name", format!("player-{player_id}"));
    }
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

// ============================================================================
// Health Check Tests
// ============================================================================

#[tokio::test]
async fn test_health_check_endpoint() {
    let (app, table_manager, _) = create_test_server();
    table_manager
        .create_table(TableConfig::default())
        .await
        .unwrap();

    let (status, body) = send(&app, "GET", "/health", None, None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["database"], "memory");
    assert_eq!(body["tables"]["active_count"], 1);
}

#[tokio::test]
async fn test_request_id_is_echoed() {
    let (app, _, _) = create_test_server();

    let request = Request::builder()
        .uri("/health")
        .header("x-request-id", "trace-abc-123")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(
        response.headers().get("x-request-id").unwrap(),
        "trace-abc-123"
    );

    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert!(response.headers().contains_key("x-request-id"));
}

// ============================================================================
// Table Management Tests
// ============================================================================

#[tokio::test]
async fn test_create_and_list_tables() {
    let (app, _, _) = create_test_server();

    let (status, body) = send(
        &app,
        "POST",
        "/api/v1/tables",
        None,
        Some(json!({"name": "High Rollers", "min_bet": 100, "max_bet": 5000})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let table_id = body["table_id"].as_i64().unwrap();

    let (status, body) = send(&app, "GET", "/api/v1/tables", None, None).await;
    assert_eq!(status, StatusCode::OK);
    let tables = body.as_array().unwrap();
    assert_eq!(tables.len(), 1);
    assert_eq!(tables[0]["id"], table_id);
    assert_eq!(tables[0]["name"], "High Rollers");
    assert_eq!(tables[0]["min_bet"], 100);
    assert_eq!(tables[0]["phase"], "waiting");
    assert_eq!(tables[0]["seated"], 0);
}

#[tokio::test]
async fn test_create_table_with_invalid_config() {
    let (app, _, _) = create_test_server();

    let (status, body) = send(
        &app,
        "POST",
        "/api/v1/tables",
        None,
        Some(json!({"min_bet": 500, "max_bet": 100})),
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_create_table_past_limit() {
    let store = Arc::new(MemoryChipStore::new(1000));
    let table_manager = Arc::new(TableManager::new(store).with_max_tables(1));
    let app = create_router(AppState::new(table_manager, None));

    let (status, _) = send(&app, "POST", "/api/v1/tables", None, Some(json!({}))).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _) = send(&app, "POST", "/api/v1/tables", None, Some(json!({}))).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_close_table_cashes_out() {
    let (app, table_manager, store) = create_test_server();
    let table_id = table_manager
        .create_table(TableConfig::default())
        .await
        .unwrap();

    send(&app, "POST", &format!("/api/v1/tables/{table_id}/join"), Some("1"), None).await;
    let (status, _) = send(
        &app,
        "POST",
        &format!("/api/v1/tables/{table_id}/close"),
        Some("1"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    // Close waits for the cash-out to be stored.
    assert_eq!(store.entries(1).await.len(), 1);

    let (status, _) = send(&app, "GET", &format!("/api/v1/tables/{table_id}"), None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// ============================================================================
// Round Flow Tests
// ============================================================================

#[tokio::test]
async fn test_join_bet_and_stand() {
    let (app, table_manager, store) = create_test_server();
    let table_id = table_manager
        .create_table_with_shoe(TableConfig::default(), winning_shoe())
        .await
        .unwrap();
    let base = format!("/api/v1/tables/{table_id}");

    let (status, body) = send(&app, "POST", &format!("{base}/join"), Some("1"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["seats"][0]["player_id"], 1);
    assert_eq!(body["seats"][0]["is_you"], true);
    assert_eq!(body["seats"][0]["chips"], 1000);

    let (status, body) = send(&app, "POST", &format!("{base}/start"), Some("1"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["phase"], "betting");

    // The only seat has bet, so the cards go out at once.
    let (status, body) = send(
        &app,
        "POST",
        &format!("{base}/bet"),
        Some("1"),
        Some(json!({"amount": 25})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["phase"], "player_turns");
    assert_eq!(body["turn"]["player_id"], 1);
    assert_eq!(body["dealer"]["hole_card_revealed"], false);

    let (status, body) = send(
        &app,
        "POST",
        &format!("{base}/action"),
        Some("1"),
        Some(json!({"action": "stand"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["phase"], "finished");
    assert_eq!(body["seats"][0]["chips"], 1025);
    assert_eq!(body["dealer"]["hole_card_revealed"], true);

    let (status, body) = send(&app, "POST", &format!("{base}/leave"), Some("1"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "removed", "chips": 1025}));

    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert_eq!(store.balance(1).await.unwrap(), 1025);
}

#[tokio::test]
async fn test_snapshot_for_viewer_and_spectator() {
    let (app, table_manager, _) = create_test_server();
    let table_id = table_manager
        .create_table(TableConfig::default())
        .await
        .unwrap();
    let uri = format!("/api/v1/tables/{table_id}");

    send(&app, "POST", &format!("{uri}/join"), Some("7"), None).await;

    let (status, body) = send(&app, "GET", &uri, Some("7"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["seats"][0]["is_you"], true);
    assert_eq!(body["seats"][0]["display_name"], "player-7");

    let (status, body) = send(&app, "GET", &uri, None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["seats"][0]["is_you"], false);
}

// ============================================================================
// Error Mapping Tests
// ============================================================================

#[tokio::test]
async fn test_missing_identity_is_unauthorized() {
    let (app, table_manager, _) = create_test_server();
    let table_id = table_manager
        .create_table(TableConfig::default())
        .await
        .unwrap();

    let (status, _) = send(
        &app,
        "POST",
        &format!("/api/v1/tables/{table_id}/join"),
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_malformed_identity_is_bad_request() {
    let (app, table_manager, _) = create_test_server();
    let table_id = table_manager
        .create_table(TableConfig::default())
        .await
        .unwrap();

    let (status, _) = send(
        &app,
        "POST",
        &format!("/api/v1/tables/{table_id}/join"),
        Some("not-a-number"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app,
        "GET",
        &format!("/api/v1/tables/{table_id}"),
        Some("-4"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unknown_table_is_not_found() {
    let (app, _, _) = create_test_server();

    let (status, body) = send(&app, "POST", "/api/v1/tables/99/join", Some("1"), None).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["rejection"]["error"]["kind"], "unknown_table");
    assert_eq!(body["rejection"]["error"]["table_id"], 99);
    assert!(body["rejection"]["phase"].is_null());
}

#[tokio::test]
async fn test_bet_in_wrong_phase_is_conflict() {
    let (app, table_manager, _) = create_test_server();
    let table_id = table_manager
        .create_table(TableConfig::default())
        .await
        .unwrap();
    let base = format!("/api/v1/tables/{table_id}");
    send(&app, "POST", &format!("{base}/join"), Some("1"), None).await;

    let (status, body) = send(
        &app,
        "POST",
        &format!("{base}/bet"),
        Some("1"),
        Some(json!({"amount": 25})),
    )
    .await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["rejection"]["error"]["kind"], "invalid_phase");
    assert_eq!(body["rejection"]["phase"], "waiting");

    let (status, body) = send(&app, "POST", &format!("{base}/join"), Some("1"), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["rejection"]["error"]["kind"], "already_seated");
}

#[tokio::test]
async fn test_bet_out_of_range_is_unprocessable() {
    let (app, table_manager, _) = create_test_server();
    let table_id = table_manager
        .create_table(TableConfig::default())
        .await
        .unwrap();
    let base = format!("/api/v1/tables/{table_id}");
    send(&app, "POST", &format!("{base}/join"), Some("1"), None).await;
    send(&app, "POST", &format!("{base}/start"), Some("1"), None).await;

    let (status, body) = send(
        &app,
        "POST",
        &format!("{base}/bet"),
        Some("1"),
        Some(json!({"amount": 5})),
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["rejection"]["error"]["kind"], "bet_out_of_range");
    assert_eq!(body["rejection"]["phase"], "betting");

    // The refused bet left the window open.
    let (_, body) = send(&app, "GET", &base, Some("1"), None).await;
    assert_eq!(body["phase"], "betting");
    assert_eq!(body["seats"][0]["chips"], 1000);
}

#[tokio::test]
async fn test_action_from_unseated_player() {
    let (app, table_manager, _) = create_test_server();
    let table_id = table_manager
        .create_table_with_shoe(TableConfig::default(), winning_shoe())
        .await
        .unwrap();
    let base = format!("/api/v1/tables/{table_id}");
    send(&app, "POST", &format!("{base}/join"), Some("1"), None).await;
    send(&app, "POST", &format!("{base}/start"), Some("1"), None).await;
    send(
        &app,
        "POST",
        &format!("{base}/bet"),
        Some("1"),
        Some(json!({"amount": 25})),
    )
    .await;

    let (status, body) = send(
        &app,
        "POST",
        &format!("{base}/action"),
        Some("2"),
        Some(json!({"action": "hit"})),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["rejection"]["error"]["kind"], "unknown_player");
    assert_eq!(body["rejection"]["phase"], "player_turns");
    assert_eq!(body["rejection"]["turn"]["player_id"], 1);
}
