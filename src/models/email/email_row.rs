//! Database row for an email.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqliteExecutor};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum Direction {
  Inbound,
  Outbound,
}

/// Delivery status. Opened/clicked are tracked as side observations in their
/// own timestamp columns and never replace this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum EmailStatus {
  Sent,
  Delivered,
  Bounced,
  SpamComplaint,
}

impl EmailStatus {
  pub fn as_str(self) -> &'static str {
    match self {
      EmailStatus::Sent => "sent",
      EmailStatus::Delivered => "delivered",
      EmailStatus::Bounced => "bounced",
      EmailStatus::SpamComplaint => "spam_complaint",
    }
  }
}

pub const EMAIL_COLUMNS: &str = "id, thread_id, direction, status, from_addr, to_addrs, \
   cc_addrs, bcc_addrs, subject, text_body, html_body, message_id, provider_message_id, \
   in_reply_to, references_chain, quote_id, order_id, customer_id, vendor_id, metadata, \
   sent_at, delivered_at, bounced_at, opened_at, clicked_at, open_count, click_count, created_at";

#[derive(Debug, Clone, FromRow)]
pub struct EmailRow {
  pub id: Uuid,
  pub thread_id: Uuid,
  pub direction: Direction,
  pub status: EmailStatus,
  pub from_addr: String,
  /// JSON-encoded address lists.
  pub to_addrs: String,
  pub cc_addrs: Option<String>,
  pub bcc_addrs: Option<String>,
  pub subject: Option<String>,
  pub text_body: Option<String>,
  pub html_body: Option<String>,
  pub message_id: String,
  pub provider_message_id: Option<String>,
  pub in_reply_to: Option<String>,
  pub references_chain: Option<String>,
  pub quote_id: Option<String>,
  pub order_id: Option<String>,
  pub customer_id: Option<String>,
  pub vendor_id: Option<String>,
  pub metadata: Option<String>,
  pub sent_at: Option<DateTime<Utc>>,
  pub delivered_at: Option<DateTime<Utc>>,
  pub bounced_at: Option<DateTime<Utc>>,
  pub opened_at: Option<DateTime<Utc>>,
  pub clicked_at: Option<DateTime<Utc>>,
  pub open_count: i64,
  pub click_count: i64,
  pub created_at: DateTime<Utc>,
}

impl EmailRow {
  pub fn to_list(&self) -> Vec<String> {
    serde_json::from_str(&self.to_addrs).unwrap_or_default()
  }

  pub async fn find_by_id(
    executor: impl SqliteExecutor<'_>,
    id: Uuid,
  ) -> Result<Option<EmailRow>, sqlx::Error> {
    sqlx::query_as::<_, EmailRow>(&format!(
      "SELECT {EMAIL_COLUMNS} FROM emails WHERE id = ?"
    ))
    .bind(id)
    .fetch_optional(executor)
    .await
  }

  pub async fn find_by_message_id(
    executor: impl SqliteExecutor<'_>,
    message_id: &str,
  ) -> Result<Option<EmailRow>, sqlx::Error> {
    sqlx::query_as::<_, EmailRow>(&format!(
      "SELECT {EMAIL_COLUMNS} FROM emails WHERE message_id = ?"
    ))
    .bind(message_id)
    .fetch_optional(executor)
    .await
  }

  pub async fn find_by_provider_message_id(
    executor: impl SqliteExecutor<'_>,
    provider_message_id: &str,
  ) -> Result<Option<EmailRow>, sqlx::Error> {
    sqlx::query_as::<_, EmailRow>(&format!(
      "SELECT {EMAIL_COLUMNS} FROM emails WHERE provider_message_id = ?"
    ))
    .bind(provider_message_id)
    .fetch_optional(executor)
    .await
  }
}
