//! Plura Core - Shared domain types.
//!
//! Types used by every Plura component:
//! - `dashboard` - Agency/sub-account backend (HTTP API + persistence)
//! - `cli` - Migrations and bootstrap commands
//!
//! # Architecture
//!
//! The core crate holds only types - no I/O, no database access, no HTTP
//! clients. The optional `postgres` feature adds `sqlx` encoding so the
//! types can be bound and decoded directly.
//!
//! # Modules
//!
//! - [`types`] - Tenant-scoped IDs, emails, roles and statuses

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
