//! Append-only audit trail for the delivery pipeline.
//!
//! Events are written by webhook ingestion and reconciliation, read only for
//! audit and debugging. Prior entries are never updated or deleted.

use chrono::Utc;
use sqlx::{SqliteExecutor, SqlitePool};

use crate::models::event::{EventRow, EventSource};

pub async fn record(
  executor: impl SqliteExecutor<'_>,
  entity_id: &str,
  action: &str,
  source: EventSource,
  details: Option<serde_json::Value>,
) -> Result<(), sqlx::Error> {
  sqlx::query("INSERT INTO events (ts, entity_id, action, source, details) VALUES (?, ?, ?, ?, ?)")
    .bind(Utc::now())
    .bind(entity_id)
    .bind(action)
    .bind(source)
    .bind(details.map(|d| d.to_string()))
    .execute(executor)
    .await?;
  Ok(())
}

pub async fn recent(pool: &SqlitePool, limit: i64) -> Result<Vec<EventRow>, sqlx::Error> {
  let mut rows: Vec<EventRow> = sqlx::query_as(
    "SELECT id, ts, entity_id, action, source, details FROM events ORDER BY id DESC LIMIT ?",
  )
  .bind(limit)
  .fetch_all(pool)
  .await?;
  rows.reverse();
  Ok(rows)
}
