//! API representation of an email.

use super::email_row::{Direction, EmailRow, EmailStatus};
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Serialize)]
pub struct ApiEmail {
  pub id: Uuid,
  pub thread_id: Uuid,
  pub direction: Direction,
  pub status: EmailStatus,
  pub from: String,
  pub to: Vec<String>,
  pub cc: Vec<String>,
  pub bcc: Vec<String>,
  pub subject: Option<String>,
  pub text_body: Option<String>,
  pub html_body: Option<String>,
  pub message_id: String,
  pub provider_message_id: Option<String>,
  pub in_reply_to: Option<String>,
  pub references: Option<String>,
  pub quote_id: Option<String>,
  pub order_id: Option<String>,
  pub customer_id: Option<String>,
  pub vendor_id: Option<String>,
  pub sent_at: Option<DateTime<Utc>>,
  pub delivered_at: Option<DateTime<Utc>>,
  pub bounced_at: Option<DateTime<Utc>>,
  pub opened_at: Option<DateTime<Utc>>,
  pub clicked_at: Option<DateTime<Utc>>,
  pub open_count: i64,
  pub click_count: i64,
  pub created_at: DateTime<Utc>,
}

fn parse_addrs(raw: Option<&str>) -> Vec<String> {
  raw
    .and_then(|s| serde_json::from_str(s).ok())
    .unwrap_or_default()
}

impl From<EmailRow> for ApiEmail {
  fn from(r: EmailRow) -> Self {
    ApiEmail {
      to: parse_addrs(Some(&r.to_addrs)),
      cc: parse_addrs(r.cc_addrs.as_deref()),
      bcc: parse_addrs(r.bcc_addrs.as_deref()),
      id: r.id,
      thread_id: r.thread_id,
      direction: r.direction,
      status: r.status,
      from: r.from_addr,
      subject: r.subject,
      text_body: r.text_body,
      html_body: r.html_body,
      message_id: r.message_id,
      provider_message_id: r.provider_message_id,
      in_reply_to: r.in_reply_to,
      references: r.references_chain,
      quote_id: r.quote_id,
      order_id: r.order_id,
      customer_id: r.customer_id,
      vendor_id: r.vendor_id,
      sent_at: r.sent_at,
      delivered_at: r.delivered_at,
      bounced_at: r.bounced_at,
      opened_at: r.opened_at,
      clicked_at: r.clicked_at,
      open_count: r.open_count,
      click_count: r.click_count,
      created_at: r.created_at,
    }
  }
}
