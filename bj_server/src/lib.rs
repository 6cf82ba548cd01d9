//! HTTP and WebSocket front end for blackjack tables.
//!
//! The binary in `main.rs` wires these modules together; integration tests
//! build the router directly with an in-memory chip store.

pub mod api;
pub mod config;
pub mod logging;
pub mod metrics;
