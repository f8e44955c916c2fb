//! Applies classified webhook events to the local mirror.
//!
//! Every apply is guarded by a delivery-key claim in `webhook_deliveries`.
//! The claim and the apply share one transaction: a failed apply rolls the
//! claim back with it, so the provider's redelivery of the same event is not
//! mistaken for a duplicate. The provider delivers at least once, so
//! duplicates (including concurrent ones) must collapse to a single apply.
//! Row updates are field-scoped so racing events on the same message never
//! overwrite each other's fields.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::Utc;
use sha2::{Digest, Sha256};
use sqlx::SqliteConnection;
use tracing::{info, warn};

use crate::app::AppState;
use crate::attachments::AttachmentDescriptor;
use crate::error::WebhookError;
use crate::events;
use crate::models::email::{Direction, EmailRow, EmailStatus, NewEmail};
use crate::models::event::EventSource;
use crate::provider::{Header, OutboundRequest};
use crate::threading::{self, ThreadResolution};

use super::classify::{BouncePayload, DeliveryPayload, EngagementPayload, InboundPayload, WebhookEvent};

fn payload_hash(raw: &[u8]) -> String {
  format!("{:x}", Sha256::digest(raw))
}

/// Idempotency key for one logical provider event. Prefers provider-supplied
/// identifiers; falls back to a hash of the raw body.
pub fn delivery_key(event: &WebhookEvent, raw: &[u8]) -> String {
  match event {
    WebhookEvent::Inbound(p) => match &p.message_id {
      Some(mid) => format!("inbound:{mid}"),
      None => format!("inbound:{}", payload_hash(raw)),
    },
    WebhookEvent::Delivery(d) => format!("delivery:{}", d.message_id),
    WebhookEvent::Bounce(b) => match b.id {
      Some(id) => format!("bounce:{id}"),
      None => format!("bounce:{}", b.message_id),
    },
    WebhookEvent::SpamComplaint(b) => match b.id {
      Some(id) => format!("spam:{id}"),
      None => format!("spam:{}", b.message_id),
    },
    WebhookEvent::Open(o) => match &o.received_at {
      Some(at) => format!("open:{}:{}", o.message_id, at.to_rfc3339()),
      None => format!("open:{}", payload_hash(raw)),
    },
    WebhookEvent::Click(c) => match (&c.received_at, &c.original_link) {
      (Some(at), link) => format!(
        "click:{}:{}:{}",
        c.message_id,
        at.to_rfc3339(),
        link.as_deref().unwrap_or("")
      ),
      (None, _) => format!("click:{}", payload_hash(raw)),
    },
    WebhookEvent::Unknown => format!("unknown:{}", payload_hash(raw)),
  }
}

/// Claim a delivery key. Returns false when another delivery of the same
/// logical event already claimed it; SQLite serializes the conflicting
/// inserts, so exactly one caller wins.
async fn claim(conn: &mut SqliteConnection, key: &str) -> Result<bool, sqlx::Error> {
  let result =
    sqlx::query("INSERT OR IGNORE INTO webhook_deliveries (delivery_key, received_at) VALUES (?, ?)")
      .bind(key)
      .bind(Utc::now())
      .execute(conn)
      .await?;
  Ok(result.rows_affected() > 0)
}

pub async fn ingest(
  state: &AppState,
  event: WebhookEvent,
  raw: &[u8],
) -> Result<(), WebhookError> {
  if let WebhookEvent::Unknown = event {
    info!("acknowledging unclassifiable webhook payload");
    return Ok(());
  }

  let key = delivery_key(&event, raw);
  let mut tx = state.db.begin().await?;
  if !claim(&mut tx, &key).await? {
    info!(key, "duplicate webhook delivery, skipping");
    return Ok(());
  }

  match apply(state, &mut tx, &event).await {
    Ok(()) => tx.commit().await?,
    Err(err) => {
      // Drop the claim along with any partial writes so the provider's
      // redelivery gets a clean attempt.
      if let Err(rollback_err) = tx.rollback().await {
        warn!("rollback after failed webhook apply also failed: {rollback_err}");
      }
      return Err(err);
    }
  }

  // Side effects that must not hold the write transaction.
  if let WebhookEvent::Inbound(payload) = &event {
    if let Some(forward_to) = &state.config.forward_inbound_to {
      forward_inbound(state, payload, forward_to).await;
    }
  }
  Ok(())
}

async fn apply(
  state: &AppState,
  tx: &mut SqliteConnection,
  event: &WebhookEvent,
) -> Result<(), WebhookError> {
  match event {
    WebhookEvent::Inbound(payload) => handle_inbound(state, tx, payload).await,
    WebhookEvent::Delivery(payload) => handle_delivery(tx, payload).await,
    WebhookEvent::Bounce(payload) => handle_bounce(tx, payload, EmailStatus::Bounced).await,
    WebhookEvent::SpamComplaint(payload) => {
      handle_bounce(tx, payload, EmailStatus::SpamComplaint).await
    }
    WebhookEvent::Open(payload) => handle_engagement(tx, payload, Engagement::Open).await,
    WebhookEvent::Click(payload) => handle_engagement(tx, payload, Engagement::Click).await,
    WebhookEvent::Unknown => Ok(()),
  }
}

async fn handle_inbound(
  state: &AppState,
  tx: &mut SqliteConnection,
  payload: &InboundPayload,
) -> Result<(), WebhookError> {
  // Routing ids come from the metadata map only; the body is never searched.
  let meta = &payload.metadata;
  let routing = |key: &str| meta.get(key).cloned();

  let resolution = threading::resolve_thread(&mut *tx, payload.in_reply_to()).await?;
  let thread_id = resolution.thread_id();

  let email_id = uuid::Uuid::new_v4();
  let message_id = payload
    .header("Message-ID")
    .map(str::to_string)
    .unwrap_or_else(|| threading::generate_message_id(&state.config.message_id_domain));

  let row = NewEmail {
    id: email_id,
    thread_id,
    direction: Direction::Inbound,
    status: EmailStatus::Delivered,
    from_addr: payload.from.clone(),
    to_addrs: InboundPayload::split_addrs(payload.to.as_deref()),
    cc_addrs: InboundPayload::split_addrs(payload.cc.as_deref()),
    bcc_addrs: Vec::new(),
    subject: Some(payload.subject.clone()),
    text_body: payload.text_body.clone(),
    html_body: payload.html_body.clone(),
    message_id,
    provider_message_id: payload.message_id.clone(),
    in_reply_to: payload.in_reply_to().map(str::to_string),
    references_chain: payload.header("References").map(str::to_string),
    quote_id: routing("quote_id"),
    order_id: routing("order_id"),
    customer_id: routing("customer_id"),
    vendor_id: routing("vendor_id"),
    metadata: serde_json::to_value(meta).ok(),
    sent_at: None,
  };
  row.insert(&mut *tx).await?;

  if let ThreadResolution::Orphaned(_) = resolution {
    events::record(
      &mut *tx,
      &email_id.to_string(),
      "thread.orphaned",
      EventSource::Webhook,
      Some(serde_json::json!({
        "in_reply_to": payload.in_reply_to(),
        "thread_id": thread_id,
      })),
    )
    .await?;
  }

  for attachment in &payload.attachments {
    let content = BASE64
      .decode(attachment.content.as_bytes())
      .map_err(|e| WebhookError::Malformed(format!("attachment content: {e}")))?;
    let descriptor = AttachmentDescriptor {
      filename: attachment.name.clone(),
      content_type: attachment.content_type.clone(),
      content_length: attachment.content_length.max(content.len() as u64),
    };
    let mut reader = std::io::Cursor::new(content);
    state
      .attachments
      .store(email_id, &descriptor, &mut reader)
      .await
      .map_err(|e| WebhookError::Attachment(e.to_string()))?;
  }

  events::record(
    &mut *tx,
    &email_id.to_string(),
    "inbound.received",
    EventSource::Webhook,
    Some(serde_json::json!({
      "provider_message_id": payload.message_id,
      "thread_id": thread_id,
    })),
  )
  .await?;
  Ok(())
}

/// Best-effort internal mirror of an inbound message, sent after the apply
/// has committed. Failure is logged, not surfaced: a 5xx here would redeliver
/// an already-applied event.
async fn forward_inbound(state: &AppState, payload: &InboundPayload, forward_to: &str) {
  let from = InboundPayload::split_addrs(payload.to.as_deref())
    .into_iter()
    .next()
    .unwrap_or_else(|| forward_to.to_string());
  let request = OutboundRequest {
    from,
    to: forward_to.to_string(),
    cc: None,
    bcc: None,
    subject: format!("Fwd: {}", payload.subject),
    text_body: Some(
      payload
        .text_body
        .clone()
        .unwrap_or_else(|| format!("(no text body; inbound from {})", payload.from)),
    ),
    html_body: None,
    reply_to: Some(payload.from.clone()),
    headers: Vec::<Header>::new(),
    metadata: Default::default(),
    message_stream: state.config.message_stream.clone(),
    track_opens: false,
    track_links: None,
  };
  if let Err(e) = state.provider.send(&request).await {
    warn!("inbound forward to {forward_to} failed: {e}");
  }
}

async fn handle_delivery(
  tx: &mut SqliteConnection,
  payload: &DeliveryPayload,
) -> Result<(), WebhookError> {
  let Some(row) = EmailRow::find_by_provider_message_id(&mut *tx, &payload.message_id).await?
  else {
    info!(
      provider_message_id = %payload.message_id,
      "delivery event for unknown message, ignoring"
    );
    return Ok(());
  };

  let delivered_at = payload.delivered_at.unwrap_or_else(Utc::now);
  // Forward-only: a terminal bounce/spam status is never downgraded.
  sqlx::query(
    "UPDATE emails SET delivered_at = COALESCE(delivered_at, ?), \
     status = CASE WHEN status = 'sent' THEN 'delivered' ELSE status END \
     WHERE provider_message_id = ?",
  )
  .bind(delivered_at)
  .bind(&payload.message_id)
  .execute(&mut *tx)
  .await?;

  events::record(
    &mut *tx,
    &row.id.to_string(),
    "status.delivered",
    EventSource::Webhook,
    Some(serde_json::json!({
      "provider_message_id": payload.message_id,
      "recipient": payload.recipient,
    })),
  )
  .await?;
  Ok(())
}

async fn handle_bounce(
  tx: &mut SqliteConnection,
  payload: &BouncePayload,
  status: EmailStatus,
) -> Result<(), WebhookError> {
  let Some(row) = EmailRow::find_by_provider_message_id(&mut *tx, &payload.message_id).await?
  else {
    info!(
      provider_message_id = %payload.message_id,
      "bounce event for unknown message, ignoring"
    );
    return Ok(());
  };

  let bounced_at = payload.bounced_at.unwrap_or_else(Utc::now);
  sqlx::query(
    "UPDATE emails SET bounced_at = COALESCE(bounced_at, ?), status = ? \
     WHERE provider_message_id = ?",
  )
  .bind(bounced_at)
  .bind(status)
  .bind(&payload.message_id)
  .execute(&mut *tx)
  .await?;

  events::record(
    &mut *tx,
    &row.id.to_string(),
    match status {
      EmailStatus::SpamComplaint => "status.spam_complaint",
      _ => "status.bounced",
    },
    EventSource::Webhook,
    Some(serde_json::json!({
      "provider_message_id": payload.message_id,
      "bounce_id": payload.id,
      "bounce_type": payload.bounce_type,
      "description": payload.description,
      "email": payload.email,
    })),
  )
  .await?;
  Ok(())
}

#[derive(Debug, Clone, Copy)]
enum Engagement {
  Open,
  Click,
}

async fn handle_engagement(
  tx: &mut SqliteConnection,
  payload: &EngagementPayload,
  kind: Engagement,
) -> Result<(), WebhookError> {
  let Some(row) = EmailRow::find_by_provider_message_id(&mut *tx, &payload.message_id).await?
  else {
    info!(
      provider_message_id = %payload.message_id,
      "engagement event for unknown message, ignoring"
    );
    return Ok(());
  };

  let at = payload.received_at.unwrap_or_else(Utc::now);
  // The counter increment is safe against duplicate deliveries because the
  // delivery key is claimed in the same transaction.
  let (sql, action) = match kind {
    Engagement::Open => (
      "UPDATE emails SET opened_at = COALESCE(opened_at, ?), open_count = open_count + 1 \
       WHERE provider_message_id = ?",
      "engagement.open",
    ),
    Engagement::Click => (
      "UPDATE emails SET clicked_at = COALESCE(clicked_at, ?), click_count = click_count + 1 \
       WHERE provider_message_id = ?",
      "engagement.click",
    ),
  };
  sqlx::query(sql)
    .bind(at)
    .bind(&payload.message_id)
    .execute(&mut *tx)
    .await?;

  events::record(
    &mut *tx,
    &row.id.to_string(),
    action,
    EventSource::Webhook,
    Some(serde_json::json!({
      "provider_message_id": payload.message_id,
      "recipient": payload.recipient,
      "original_link": payload.original_link,
    })),
  )
  .await?;
  Ok(())
}
