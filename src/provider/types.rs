//! Serde types for the provider wire contract.
//!
//! Raw payloads are parsed into these at the boundary; the rest of the crate
//! never reaches into untyped JSON from the provider.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Arbitrary header pair carried on a send; used for Message-ID,
/// In-Reply-To and References.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Header {
  pub name: String,
  pub value: String,
}

/// Body of the provider's send API.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct OutboundRequest {
  pub from: String,
  /// Comma-joined recipient list, as the provider expects.
  pub to: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub cc: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub bcc: Option<String>,
  pub subject: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub text_body: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub html_body: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub reply_to: Option<String>,
  pub headers: Vec<Header>,
  /// Metadata-first routing: business ids travel here, never in the body.
  pub metadata: BTreeMap<String, String>,
  pub message_stream: String,
  pub track_opens: bool,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub track_links: Option<String>,
}

/// Response body of the send API. `error_code` 0 means accepted.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SendOutcome {
  #[serde(rename = "MessageID", default)]
  pub message_id: String,
  #[serde(default)]
  pub error_code: i64,
  #[serde(default)]
  pub message: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ProviderRecipient {
  pub email: String,
  #[serde(default)]
  pub name: Option<String>,
}

/// One message as reported by the provider's paginated history API.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ProviderMessage {
  #[serde(rename = "MessageID")]
  pub message_id: String,
  #[serde(default)]
  pub from: Option<String>,
  #[serde(default)]
  pub to: Vec<ProviderRecipient>,
  #[serde(default)]
  pub subject: Option<String>,
  #[serde(default)]
  pub status: Option<String>,
  #[serde(default)]
  pub received_at: Option<DateTime<Utc>>,
  #[serde(default)]
  pub metadata: BTreeMap<String, String>,
}

/// One page of the history API plus the provider-reported window total.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MessagePage {
  pub total_count: i64,
  #[serde(default, alias = "InboundMessages", alias = "OutboundMessages")]
  pub messages: Vec<ProviderMessage>,
}
