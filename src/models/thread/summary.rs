//! Derived thread aggregate.
//!
//! A thread is not a stored row; it is the grouping of all emails sharing a
//! `thread_id`. This summary is computed on read.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, SqlitePool};
use uuid::Uuid;

#[derive(Debug, Serialize, FromRow)]
pub struct ThreadSummary {
  pub thread_id: Uuid,
  /// Subject of the oldest message in the thread.
  pub subject: Option<String>,
  pub message_count: i64,
  pub inbound_count: i64,
  pub last_activity: Option<DateTime<Utc>>,
}

impl ThreadSummary {
  pub async fn load(
    pool: &SqlitePool,
    thread_id: Uuid,
  ) -> Result<Option<ThreadSummary>, sqlx::Error> {
    let row: Option<ThreadSummary> = sqlx::query_as(
      "SELECT thread_id, \
       (SELECT subject FROM emails e2 WHERE e2.thread_id = emails.thread_id \
        ORDER BY created_at ASC LIMIT 1) AS subject, \
       COUNT(*) AS message_count, \
       SUM(CASE WHEN direction = 'inbound' THEN 1 ELSE 0 END) AS inbound_count, \
       MAX(created_at) AS last_activity \
       FROM emails WHERE thread_id = ? GROUP BY thread_id",
    )
    .bind(thread_id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
  }
}
