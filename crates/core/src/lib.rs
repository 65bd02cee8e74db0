//! Depot Core - Shared domain types.
//!
//! This crate provides the types used across all Depot components:
//! - `server` - Access core (sessions, password resets, rate limiting,
//!   warehouse capacity) and its HTTP surface
//! - `cli` - Command-line tools for migrations and user management
//!
//! # Architecture
//!
//! The core crate contains only types - no I/O, no database access,
//! no HTTP clients. Database encoding is available behind the `postgres`
//! feature.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for IDs, emails, roles, and quantities

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
