//! Audit event stored in SQLite and exposed via API.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

/// Which pipeline wrote the event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum EventSource {
  Webhook,
  Reconciliation,
}

#[derive(Debug, Serialize, FromRow)]
pub struct EventRow {
  pub id: i64,
  pub ts: DateTime<Utc>,
  pub entity_id: String,
  pub action: String,
  pub source: EventSource,
  pub details: Option<String>,
}
