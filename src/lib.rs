//! mailroom library entrypoint.
//!
//! Modules:
//! - `app`: startup, configuration, shared state
//! - `http`: Axum router and handlers
//! - `outbound`: compose and dispatch outgoing mail
//! - `webhook`: provider event classification and ingestion
//! - `reconcile`: paginated provider history scan and drift repair
//! - `threading`: conversation identity and RFC 2822 threading headers
//! - `provider`: typed provider wire contract and HTTP client
//! - `events`: append-only audit trail
//! - `attachments`: streaming attachment handoff seam
//! - `db`: migrations and SQLite helpers
//! - `models`: typed records used across layers

pub mod app;
pub mod attachments;
pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod http;
pub mod models;
pub mod outbound;
pub mod provider;
pub mod reconcile;
pub mod threading;
pub mod util;
pub mod webhook;
