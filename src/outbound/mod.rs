//! Outbound send path: compose, thread, dispatch, persist.

use chrono::Utc;
use serde::Serialize;
use sqlx::SqlitePool;
use std::collections::BTreeMap;
use tracing::warn;
use uuid::Uuid;

use crate::config::MailConfig;
use crate::error::{SendError, SendResult};
use crate::models::email::{Direction, EmailRow, EmailStatus, NewEmail};
use crate::provider::{Header, OutboundRequest, ProviderClient};
use crate::threading::{self, ThreadResolution};

/// Business associations attached to a send. These travel in the provider
/// metadata map and are the only sanctioned way webhook handlers locate
/// business context; subject or body text is never searched.
#[derive(Debug, Clone, Default)]
pub struct SendContext {
  pub quote_id: Option<String>,
  pub order_id: Option<String>,
  pub customer_id: Option<String>,
  pub vendor_id: Option<String>,
  /// Message-ID of a parent message, when the caller is continuing a chain.
  pub parent_message_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SendInput {
  pub from: String,
  pub to: Vec<String>,
  pub cc: Vec<String>,
  pub bcc: Vec<String>,
  pub subject: String,
  pub text_body: Option<String>,
  pub html_body: Option<String>,
  pub context: SendContext,
}

#[derive(Debug, Clone, Serialize)]
pub struct SendReceipt {
  pub email_id: Uuid,
  pub message_id: String,
  pub thread_id: Uuid,
}

fn routing_metadata(context: &SendContext, thread_id: Uuid) -> BTreeMap<String, String> {
  let mut map = BTreeMap::new();
  for (key, value) in [
    ("quote_id", &context.quote_id),
    ("order_id", &context.order_id),
    ("customer_id", &context.customer_id),
    ("vendor_id", &context.vendor_id),
  ] {
    if let Some(v) = value {
      map.insert(key.to_string(), v.clone());
    }
  }
  map.insert("thread_id".to_string(), thread_id.to_string());
  map
}

fn join_addrs(addrs: &[String]) -> Option<String> {
  if addrs.is_empty() {
    None
  } else {
    Some(addrs.join(","))
  }
}

/// Compose and dispatch a new outbound message.
pub async fn send(
  pool: &SqlitePool,
  provider: &ProviderClient,
  config: &MailConfig,
  input: SendInput,
) -> SendResult<SendReceipt> {
  if input.to.is_empty() {
    return Err(SendError::Validation("'to' must not be empty".into()));
  }
  if input.subject.trim().is_empty() {
    return Err(SendError::Validation("'subject' must not be empty".into()));
  }
  if input.text_body.is_none() && input.html_body.is_none() {
    return Err(SendError::Validation("a text or html body is required".into()));
  }

  let message_id = threading::generate_message_id(&config.message_id_domain);
  let resolution =
    threading::resolve_thread(pool, input.context.parent_message_id.as_deref()).await?;
  let thread_id = resolution.thread_id();
  if let ThreadResolution::Orphaned(_) = resolution {
    warn!(
      parent = input.context.parent_message_id.as_deref().unwrap_or(""),
      "parent message unknown locally, starting orphaned thread"
    );
  }

  let mut headers = vec![Header {
    name: "Message-ID".to_string(),
    value: message_id.clone(),
  }];
  let mut references = None;
  if let Some(parent_mid) = input.context.parent_message_id.as_deref() {
    let chain = match EmailRow::find_by_message_id(pool, parent_mid).await? {
      Some(parent) => threading::extend_references(parent.references_chain.as_deref(), parent_mid),
      None => parent_mid.to_string(),
    };
    headers.push(Header {
      name: "In-Reply-To".to_string(),
      value: parent_mid.to_string(),
    });
    headers.push(Header {
      name: "References".to_string(),
      value: chain.clone(),
    });
    references = Some(chain);
  }

  let mut bcc = input.bcc.clone();
  if let Some(mirror) = &config.mirror_bcc {
    if !bcc.iter().any(|a| a.eq_ignore_ascii_case(mirror)) {
      bcc.push(mirror.clone());
    }
  }

  let request = OutboundRequest {
    from: input.from.clone(),
    to: input.to.join(","),
    cc: join_addrs(&input.cc),
    bcc: join_addrs(&bcc),
    subject: input.subject.clone(),
    text_body: input.text_body.clone(),
    html_body: input.html_body.clone(),
    reply_to: config.reply_to_for(&input.from),
    headers,
    metadata: routing_metadata(&input.context, thread_id),
    message_stream: config.message_stream.clone(),
    track_opens: true,
    track_links: Some("HtmlAndText".to_string()),
  };

  // Single attempt. A rejected send persists nothing.
  let outcome = provider.send(&request).await?;

  let email_id = Uuid::new_v4();
  let row = NewEmail {
    id: email_id,
    thread_id,
    direction: Direction::Outbound,
    status: EmailStatus::Sent,
    from_addr: input.from,
    to_addrs: input.to,
    cc_addrs: input.cc,
    bcc_addrs: bcc,
    subject: Some(input.subject),
    text_body: input.text_body,
    html_body: input.html_body,
    message_id: message_id.clone(),
    provider_message_id: Some(outcome.message_id),
    in_reply_to: input.context.parent_message_id.clone(),
    references_chain: references,
    quote_id: input.context.quote_id,
    order_id: input.context.order_id,
    customer_id: input.context.customer_id,
    vendor_id: input.context.vendor_id,
    metadata: Some(serde_json::json!({ "message_stream": request.message_stream })),
    sent_at: Some(Utc::now()),
  };
  row.insert(pool).await?;

  Ok(SendReceipt {
    email_id,
    message_id,
    thread_id,
  })
}

/// Reply within an existing thread. Plain text only; open/click tracking is
/// off so replies read as personal mail.
pub async fn reply(
  pool: &SqlitePool,
  provider: &ProviderClient,
  config: &MailConfig,
  parent_email_id: Uuid,
  from: String,
  body: String,
  to_override: Option<String>,
) -> SendResult<SendReceipt> {
  let parent = EmailRow::find_by_id(pool, parent_email_id)
    .await?
    .ok_or_else(|| SendError::NotFound(parent_email_id.to_string()))?;

  let recipient = match to_override {
    Some(to) => to,
    None => match parent.direction {
      Direction::Inbound => parent.from_addr.clone(),
      Direction::Outbound => parent
        .to_list()
        .into_iter()
        .next()
        .ok_or_else(|| SendError::Validation("parent email has no recipients".into()))?,
    },
  };

  let message_id = threading::generate_message_id(&config.message_id_domain);
  let subject = threading::reply_subject(parent.subject.as_deref());
  let references =
    threading::extend_references(parent.references_chain.as_deref(), &parent.message_id);
  // The chain is already anchored by the parent; no resolver call needed.
  let thread_id = parent.thread_id;

  let context = SendContext {
    quote_id: parent.quote_id.clone(),
    order_id: parent.order_id.clone(),
    customer_id: parent.customer_id.clone(),
    vendor_id: parent.vendor_id.clone(),
    parent_message_id: Some(parent.message_id.clone()),
  };

  let request = OutboundRequest {
    from: from.clone(),
    to: recipient.clone(),
    cc: None,
    bcc: config.mirror_bcc.clone(),
    subject: subject.clone(),
    text_body: Some(body.clone()),
    html_body: None,
    reply_to: config.reply_to_for(&from),
    headers: vec![
      Header {
        name: "Message-ID".to_string(),
        value: message_id.clone(),
      },
      Header {
        name: "In-Reply-To".to_string(),
        value: parent.message_id.clone(),
      },
      Header {
        name: "References".to_string(),
        value: references.clone(),
      },
    ],
    metadata: routing_metadata(&context, thread_id),
    message_stream: config.message_stream.clone(),
    track_opens: false,
    track_links: None,
  };

  let outcome = provider.send(&request).await?;

  let email_id = Uuid::new_v4();
  let row = NewEmail {
    id: email_id,
    thread_id,
    direction: Direction::Outbound,
    status: EmailStatus::Sent,
    from_addr: from,
    to_addrs: vec![recipient],
    cc_addrs: Vec::new(),
    bcc_addrs: config.mirror_bcc.clone().into_iter().collect(),
    subject: Some(subject),
    text_body: Some(body),
    html_body: None,
    message_id: message_id.clone(),
    provider_message_id: Some(outcome.message_id),
    in_reply_to: Some(parent.message_id.clone()),
    references_chain: Some(references),
    quote_id: context.quote_id,
    order_id: context.order_id,
    customer_id: context.customer_id,
    vendor_id: context.vendor_id,
    metadata: Some(serde_json::json!({ "message_stream": config.message_stream })),
    sent_at: Some(Utc::now()),
  };
  row.insert(pool).await?;

  Ok(SendReceipt {
    email_id,
    message_id,
    thread_id,
  })
}
