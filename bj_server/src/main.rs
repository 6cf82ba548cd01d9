//! Multi-table blackjack server using async actor model.
//!
//! Each table runs as a TableActor managed by TableManager. Chips live in
//! PostgreSQL when a database is configured and in memory otherwise.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Error};
use bj_server::{
    api::{self, AppState},
    config::ServerConfig,
    logging, metrics,
};
use blackjack_table::{
    db::Database,
    table::TableManager,
    wallet::{ChipStore, MemoryChipStore, PgChipStore},
};
use log::{error, info};
use pico_args::Arguments;

const HELP: &str = "\
Run a multi-table blackjack server

USAGE:
  bj_server [OPTIONS]

OPTIONS:
  --bind       IP:PORT     Server socket bind address  [default: env SERVER_BIND or 127.0.0.1:6969]
  --db-url     URL         Database connection string  [default: env DATABASE_URL, else in-memory chips]
  --tables     N           Number of tables to create  [default: env INITIAL_TABLES or 1]

FLAGS:
  -h, --help               Print help information

ENVIRONMENT:
  SERVER_BIND              Server bind address (e.g., 0.0.0.0:8080)
  DATABASE_URL             PostgreSQL connection string
  METRICS_BIND             Prometheus exporter address (e.g., 0.0.0.0:9090)
  INITIAL_TABLES           Tables opened at startup
  MAX_TABLES               Upper bound on open tables
  TABLE_MAX_SEATS          Default seats per table
  TABLE_DECK_COUNT         Decks per shoe
  TABLE_MIN_BET            Default minimum bet
  TABLE_MAX_BET            Default maximum bet
  TABLE_SPEED              normal, turbo or hyper
  STARTING_CHIPS           Balance for first-time players
  RUST_LOG                 Log filter (default: info)
  A .env file in the working directory is loaded first if present.
";

struct Args {
    bind: Option<SocketAddr>,
    database_url: Option<String>,
    num_tables: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    // Load .env file if it exists
    let _ = dotenvy::dotenv();

    let mut pargs = Arguments::from_env();

    // Help has a higher priority and should be handled separately.
    if pargs.contains(["-h", "--help"]) {
        print!("{HELP}");
        return Ok(());
    }

    let args = Args {
        bind: pargs.opt_value_from_str("--bind")?,
        database_url: pargs.opt_value_from_str("--db-url")?,
        num_tables: pargs.opt_value_from_str("--tables")?,
    };

    logging::init();

    let config = ServerConfig::from_env(args.bind, args.database_url, args.num_tables)?;
    config.validate()?;

    if let Some(metrics_bind) = config.metrics_bind {
        metrics::init_metrics(metrics_bind).map_err(anyhow::Error::msg)?;
        info!("Prometheus metrics exported on {}", metrics_bind);
    }

    let starting_chips = config.table_defaults.starting_chips;
    let (chip_store, database): (Arc<dyn ChipStore>, Option<Database>) = match &config.database {
        Some(db_config) => {
            info!("Connecting to database");
            let db = Database::new(db_config)
                .await
                .context("Failed to connect to database")?;
            let store = PgChipStore::new(Arc::new(db.pool().clone()), starting_chips);
            store
                .ensure_schema()
                .await
                .context("Failed to prepare chip ledger tables")?;
            info!("Database connected successfully");
            (Arc::new(store), Some(db))
        }
        None => {
            info!("No DATABASE_URL set; chips are kept in memory");
            (Arc::new(MemoryChipStore::new(starting_chips)), None)
        }
    };

    let mut table_manager = TableManager::new(chip_store);
    if let Some(max_tables) = config.max_tables {
        table_manager = table_manager.with_max_tables(max_tables);
    }
    let table_manager = Arc::new(table_manager);

    info!("Creating {} initial table(s)...", config.num_tables);
    for i in 0..config.num_tables {
        let table_config = config.table_defaults.table_config(format!("Table {}", i + 1));
        match table_manager.create_table(table_config).await {
            Ok(table_id) => info!("Created table {} with ID {}", i + 1, table_id),
            Err(e) => error!("Failed to create table {}: {}", i + 1, e),
        }
    }

    let tables = table_manager.list_tables().await;
    metrics::active_tables(tables.len());
    info!("Server ready with {} active table(s)", tables.len());
    for table in tables {
        info!(
            "  - {} (ID: {}) - {}/{} seats, bets: {}-{}, {} speed",
            table.name,
            table.id,
            table.seated,
            table.max_seats,
            table.min_bet,
            table.max_bet,
            table.speed
        );
    }

    let app = api::create_router(AppState::new(
        Arc::clone(&table_manager),
        database.clone(),
    ));

    info!("Starting HTTP/WebSocket server on {}", config.bind);
    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind))?;

    info!(
        "Server is running at http://{}. Press Ctrl+C to stop.",
        config.bind
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Shutting down server...");

    // Cash everyone out before the chip store goes away.
    for table in table_manager.list_tables().await {
        if let Err(e) = table_manager.close_table(table.id).await {
            error!("Failed to close table {}: {}", table.id, e);
        }
    }

    if let Some(db) = database {
        db.close().await;
    }

    Ok(())
}

/// Graceful shutdown signal
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
}
