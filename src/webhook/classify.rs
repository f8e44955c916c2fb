//! Deterministic webhook payload classifier.
//!
//! Status events carry an explicit `RecordType`. Inbound deliveries do not:
//! the provider posts them with no type discriminator at all, so an object
//! with no `RecordType` is classified Inbound exactly when it carries both a
//! sender and a subject field. Anything else is Unknown, which is still an
//! acknowledged outcome.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::BTreeMap;

use crate::error::WebhookError;
use crate::provider::Header;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct InboundAttachment {
  #[serde(default)]
  pub name: Option<String>,
  #[serde(default)]
  pub content_type: String,
  #[serde(default)]
  pub content_length: u64,
  /// Base64 body as delivered by the provider.
  #[serde(default)]
  pub content: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct InboundPayload {
  pub from: String,
  pub subject: String,
  #[serde(rename = "MessageID", default)]
  pub message_id: Option<String>,
  #[serde(default)]
  pub to: Option<String>,
  #[serde(default)]
  pub cc: Option<String>,
  #[serde(default)]
  pub text_body: Option<String>,
  #[serde(default)]
  pub html_body: Option<String>,
  #[serde(default)]
  pub headers: Vec<Header>,
  #[serde(default)]
  pub attachments: Vec<InboundAttachment>,
  #[serde(default)]
  pub metadata: BTreeMap<String, String>,
}

impl InboundPayload {
  pub fn header(&self, name: &str) -> Option<&str> {
    self
      .headers
      .iter()
      .find(|h| h.name.eq_ignore_ascii_case(name))
      .map(|h| h.value.as_str())
  }

  pub fn in_reply_to(&self) -> Option<&str> {
    self.header("In-Reply-To").map(str::trim).filter(|v| !v.is_empty())
  }

  pub fn split_addrs(raw: Option<&str>) -> Vec<String> {
    raw
      .map(|s| {
        s.split(',')
          .map(|p| p.trim().to_string())
          .filter(|p| !p.is_empty())
          .collect()
      })
      .unwrap_or_default()
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DeliveryPayload {
  #[serde(rename = "MessageID")]
  pub message_id: String,
  #[serde(default)]
  pub recipient: Option<String>,
  #[serde(default)]
  pub delivered_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct BouncePayload {
  #[serde(rename = "ID", default)]
  pub id: Option<i64>,
  #[serde(rename = "MessageID")]
  pub message_id: String,
  #[serde(rename = "Type", default)]
  pub bounce_type: Option<String>,
  #[serde(default)]
  pub description: Option<String>,
  #[serde(default)]
  pub email: Option<String>,
  #[serde(default)]
  pub bounced_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EngagementPayload {
  #[serde(rename = "MessageID")]
  pub message_id: String,
  #[serde(default)]
  pub recipient: Option<String>,
  #[serde(default)]
  pub received_at: Option<DateTime<Utc>>,
  #[serde(default)]
  pub original_link: Option<String>,
}

/// Tagged union over every payload shape the endpoint understands.
#[derive(Debug, Clone)]
pub enum WebhookEvent {
  Inbound(Box<InboundPayload>),
  Delivery(DeliveryPayload),
  Bounce(BouncePayload),
  SpamComplaint(BouncePayload),
  Open(EngagementPayload),
  Click(EngagementPayload),
  Unknown,
}

impl WebhookEvent {
  pub fn kind(&self) -> &'static str {
    match self {
      WebhookEvent::Inbound(_) => "inbound",
      WebhookEvent::Delivery(_) => "delivery",
      WebhookEvent::Bounce(_) => "bounce",
      WebhookEvent::SpamComplaint(_) => "spam_complaint",
      WebhookEvent::Open(_) => "open",
      WebhookEvent::Click(_) => "click",
      WebhookEvent::Unknown => "unknown",
    }
  }
}

fn parse<T: serde::de::DeserializeOwned>(
  value: &serde_json::Value,
  kind: &str,
) -> Result<T, WebhookError> {
  serde_json::from_value(value.clone())
    .map_err(|e| WebhookError::Malformed(format!("{kind} payload: {e}")))
}

/// Classify a structurally valid JSON object into a webhook event.
pub fn classify(value: &serde_json::Value) -> Result<WebhookEvent, WebhookError> {
  match value.get("RecordType").and_then(|v| v.as_str()) {
    Some("Delivery") => Ok(WebhookEvent::Delivery(parse(value, "delivery")?)),
    Some("Bounce") => Ok(WebhookEvent::Bounce(parse(value, "bounce")?)),
    Some("SpamComplaint") => Ok(WebhookEvent::SpamComplaint(parse(value, "spam complaint")?)),
    Some("Open") => Ok(WebhookEvent::Open(parse(value, "open")?)),
    Some("Click") => Ok(WebhookEvent::Click(parse(value, "click")?)),
    Some(_) => Ok(WebhookEvent::Unknown),
    None => {
      let has_sender = value.get("From").and_then(|v| v.as_str()).is_some();
      let has_subject = value.get("Subject").and_then(|v| v.as_str()).is_some();
      if has_sender && has_subject {
        Ok(WebhookEvent::Inbound(Box::new(parse(value, "inbound")?)))
      } else {
        Ok(WebhookEvent::Unknown)
      }
    }
  }
}
