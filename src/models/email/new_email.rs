//! Insert struct shared by the outbound send and inbound webhook paths.

use chrono::{DateTime, Utc};
use sqlx::SqliteExecutor;
use uuid::Uuid;

use super::email_row::{Direction, EmailStatus};

#[derive(Debug, Clone)]
pub struct NewEmail {
  pub id: Uuid,
  pub thread_id: Uuid,
  pub direction: Direction,
  pub status: EmailStatus,
  pub from_addr: String,
  pub to_addrs: Vec<String>,
  pub cc_addrs: Vec<String>,
  pub bcc_addrs: Vec<String>,
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
  pub metadata: Option<serde_json::Value>,
  pub sent_at: Option<DateTime<Utc>>,
}

fn addrs_json(addrs: &[String]) -> Option<String> {
  if addrs.is_empty() {
    None
  } else {
    serde_json::to_string(addrs).ok()
  }
}

impl NewEmail {
  pub async fn insert(&self, executor: impl SqliteExecutor<'_>) -> Result<(), sqlx::Error> {
    let to_json = serde_json::to_string(&self.to_addrs).unwrap_or_else(|_| "[]".to_string());
    let metadata = self.metadata.as_ref().map(|m| m.to_string());

    sqlx::query(
      "INSERT INTO emails (id, thread_id, direction, status, from_addr, to_addrs, cc_addrs, \
       bcc_addrs, subject, text_body, html_body, message_id, provider_message_id, in_reply_to, \
       references_chain, quote_id, order_id, customer_id, vendor_id, metadata, sent_at, created_at) \
       VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(self.id)
    .bind(self.thread_id)
    .bind(self.direction)
    .bind(self.status)
    .bind(&self.from_addr)
    .bind(to_json)
    .bind(addrs_json(&self.cc_addrs))
    .bind(addrs_json(&self.bcc_addrs))
    .bind(&self.subject)
    .bind(&self.text_body)
    .bind(&self.html_body)
    .bind(&self.message_id)
    .bind(&self.provider_message_id)
    .bind(&self.in_reply_to)
    .bind(&self.references_chain)
    .bind(&self.quote_id)
    .bind(&self.order_id)
    .bind(&self.customer_id)
    .bind(&self.vendor_id)
    .bind(metadata)
    .bind(self.sent_at)
    .bind(Utc::now())
    .execute(executor)
    .await?;
    Ok(())
  }
}
