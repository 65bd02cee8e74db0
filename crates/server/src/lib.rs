//! Depot server library.
//!
//! The access & resource-invariant core of Depot: sessions, single-use
//! password resets, per-client rate limiting, and the warehouse capacity
//! invariant, plus the thin axum surface that calls into them.
//!
//! The binary in `main.rs` only wires configuration, telemetry and the
//! store; everything else lives here so it can be tested and reused.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;
pub mod store;
