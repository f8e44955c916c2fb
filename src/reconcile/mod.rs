//! Periodic reconciliation of the local mirror against the provider.
//!
//! The provider's paginated history is walked one page at a time and every
//! record is classified against the local store. The provider is the source
//! of truth: records missing locally are upserted, status drift is repaired
//! forward-only, and rows the provider no longer reports are surfaced as an
//! anomaly rather than deleted. Runs as a background task, never on a
//! request path, with a wall-clock budget over the whole scan.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::MailConfig;
use crate::events;
use crate::models::email::{Direction, EmailRow, EmailStatus, NewEmail};
use crate::models::event::EventSource;
use crate::provider::{ProviderClient, ProviderError, ProviderMessage};
use crate::threading;

pub const DEFAULT_PAGE_SIZE: u32 = 500;

#[derive(Debug, Error)]
pub enum ReconcileError {
  #[error("provider error: {0}")]
  Provider(#[from] ProviderError),
  #[error("database error: {0}")]
  Database(#[from] sqlx::Error),
  #[error("scan exceeded its wall-clock budget")]
  TimedOut,
}

/// Lazy, restartable walk of the provider's message history for one
/// direction and window. Each `next_page` call fetches exactly one page.
///
/// An empty batch is the authoritative stop condition; the provider-reported
/// total is only a secondary check, since it can change between fetches.
pub struct MessageHistory<'a> {
  client: &'a ProviderClient,
  kind: Direction,
  from_date: DateTime<Utc>,
  to_date: DateTime<Utc>,
  page_size: u32,
  offset: u32,
  total_count: Option<i64>,
  done: bool,
}

impl<'a> MessageHistory<'a> {
  pub fn new(
    client: &'a ProviderClient,
    kind: Direction,
    from_date: DateTime<Utc>,
    to_date: DateTime<Utc>,
    page_size: u32,
  ) -> Self {
    MessageHistory {
      client,
      kind,
      from_date,
      to_date,
      page_size: page_size.max(1),
      offset: 0,
      total_count: None,
      done: false,
    }
  }

  /// Most recent provider-reported total for the window.
  pub fn total_count(&self) -> Option<i64> {
    self.total_count
  }

  pub async fn next_page(&mut self) -> Result<Option<Vec<ProviderMessage>>, ProviderError> {
    if self.done {
      return Ok(None);
    }
    let page = self
      .client
      .message_page(
        self.kind,
        self.page_size,
        self.offset,
        self.from_date,
        self.to_date,
      )
      .await?;
    self.total_count = Some(page.total_count);

    if page.messages.is_empty() {
      self.done = true;
      return Ok(None);
    }
    self.offset += page.messages.len() as u32;
    if i64::from(self.offset) >= page.total_count {
      self.done = true;
    }
    Ok(Some(page.messages))
  }
}

/// Outcome of diffing one window. Counts drive logging; ids are kept for
/// the audit trail and tests.
#[derive(Debug, Default)]
pub struct DriftReport {
  pub fetched: usize,
  pub missing_locally: Vec<String>,
  pub status_mismatch: Vec<String>,
  pub extra_locally: Vec<String>,
}

impl DriftReport {
  pub fn is_clean(&self) -> bool {
    self.missing_locally.is_empty()
      && self.status_mismatch.is_empty()
      && self.extra_locally.is_empty()
  }
}

fn provider_status(message: &ProviderMessage) -> Option<EmailStatus> {
  match message.status.as_deref()?.to_ascii_lowercase().as_str() {
    "sent" | "queued" => Some(EmailStatus::Sent),
    "delivered" => Some(EmailStatus::Delivered),
    "bounced" => Some(EmailStatus::Bounced),
    "spamcomplaint" | "spam_complaint" => Some(EmailStatus::SpamComplaint),
    _ => None,
  }
}

// Merge policy: provider wins, forward-only. A terminal local status is
// never rolled back to sent.
fn status_rank(status: EmailStatus) -> u8 {
  match status {
    EmailStatus::Sent => 0,
    EmailStatus::Delivered => 1,
    EmailStatus::Bounced => 2,
    EmailStatus::SpamComplaint => 2,
  }
}

async fn upsert_missing(
  pool: &SqlitePool,
  kind: Direction,
  domain: &str,
  message: &ProviderMessage,
) -> Result<Uuid, sqlx::Error> {
  // Sends stamp thread_id into the provider metadata map, so a repaired row
  // rejoins its thread when that survives the round trip.
  let thread_id = message
    .metadata
    .get("thread_id")
    .and_then(|v| Uuid::parse_str(v).ok())
    .unwrap_or_else(Uuid::new_v4);

  let email_id = Uuid::new_v4();
  let row = NewEmail {
    id: email_id,
    thread_id,
    direction: kind,
    status: provider_status(message).unwrap_or(EmailStatus::Sent),
    from_addr: message.from.clone().unwrap_or_default(),
    to_addrs: message.to.iter().map(|r| r.email.clone()).collect(),
    cc_addrs: Vec::new(),
    bcc_addrs: Vec::new(),
    subject: message.subject.clone(),
    text_body: None,
    html_body: None,
    message_id: threading::generate_message_id(domain),
    provider_message_id: Some(message.message_id.clone()),
    in_reply_to: None,
    references_chain: None,
    quote_id: message.metadata.get("quote_id").cloned(),
    order_id: message.metadata.get("order_id").cloned(),
    customer_id: message.metadata.get("customer_id").cloned(),
    vendor_id: message.metadata.get("vendor_id").cloned(),
    metadata: serde_json::to_value(&message.metadata).ok(),
    sent_at: message.received_at,
  };
  row.insert(pool).await?;
  Ok(email_id)
}

/// Walk one direction's window and repair drift. Safe to re-run: repairs are
/// keyed by `provider_message_id`, so an interrupted scan picks up cleanly.
pub async fn scan_window(
  pool: &SqlitePool,
  client: &ProviderClient,
  domain: &str,
  kind: Direction,
  from_date: DateTime<Utc>,
  to_date: DateTime<Utc>,
  page_size: u32,
) -> Result<DriftReport, ReconcileError> {
  let mut report = DriftReport::default();
  let mut seen: Vec<String> = Vec::new();
  let mut history = MessageHistory::new(client, kind, from_date, to_date, page_size);

  while let Some(page) = history.next_page().await? {
    for message in &page {
      report.fetched += 1;
      seen.push(message.message_id.clone());

      let local = EmailRow::find_by_provider_message_id(pool, &message.message_id).await?;
      match local {
        None => {
          let email_id = upsert_missing(pool, kind, domain, message).await?;
          report.missing_locally.push(message.message_id.clone());
          events::record(
            pool,
            &email_id.to_string(),
            "drift.missing_locally",
            EventSource::Reconciliation,
            Some(serde_json::json!({
              "provider_message_id": message.message_id,
              "subject": message.subject,
            })),
          )
          .await?;
        }
        Some(row) => {
          let Some(remote_status) = provider_status(message) else {
            continue;
          };
          if remote_status == row.status {
            continue;
          }
          report.status_mismatch.push(message.message_id.clone());
          if status_rank(remote_status) > status_rank(row.status) {
            sqlx::query("UPDATE emails SET status = ? WHERE provider_message_id = ?")
              .bind(remote_status)
              .bind(&message.message_id)
              .execute(pool)
              .await?;
          }
          events::record(
            pool,
            &row.id.to_string(),
            "drift.status_mismatch",
            EventSource::Reconciliation,
            Some(serde_json::json!({
              "provider_message_id": message.message_id,
              "local_status": row.status.as_str(),
              "provider_status": remote_status.as_str(),
            })),
          )
          .await?;
        }
      }
    }
  }

  // Rows we hold that the provider no longer reports for the same window.
  // Should not happen; surfaced, never deleted.
  let local_rows: Vec<EmailRow> = sqlx::query_as(&format!(
    "SELECT {} FROM emails WHERE direction = ? AND provider_message_id IS NOT NULL \
     AND created_at >= ? AND created_at <= ?",
    crate::models::email::email_row::EMAIL_COLUMNS
  ))
  .bind(kind)
  .bind(from_date)
  .bind(to_date)
  .fetch_all(pool)
  .await?;

  for row in local_rows {
    let pmid = row.provider_message_id.clone().unwrap_or_default();
    if seen.iter().any(|s| s == &pmid) {
      continue;
    }
    warn!(provider_message_id = %pmid, "local email absent from provider history");
    report.extra_locally.push(pmid.clone());
    events::record(
      pool,
      &row.id.to_string(),
      "drift.extra_locally",
      EventSource::Reconciliation,
      Some(serde_json::json!({ "provider_message_id": pmid })),
    )
    .await?;
  }

  Ok(report)
}

/// Scan both directions for the configured window under one wall-clock
/// timeout covering every page fetch.
pub async fn run_scan(
  pool: &SqlitePool,
  client: &ProviderClient,
  config: &MailConfig,
) -> Result<(DriftReport, DriftReport), ReconcileError> {
  let to_date = Utc::now();
  let from_date = to_date
    - chrono::Duration::from_std(config.reconcile_window).unwrap_or(chrono::Duration::days(1));

  let scan = async {
    let outbound = scan_window(
      pool,
      client,
      &config.message_id_domain,
      Direction::Outbound,
      from_date,
      to_date,
      DEFAULT_PAGE_SIZE,
    )
    .await?;
    let inbound = scan_window(
      pool,
      client,
      &config.message_id_domain,
      Direction::Inbound,
      from_date,
      to_date,
      DEFAULT_PAGE_SIZE,
    )
    .await?;
    Ok::<_, ReconcileError>((outbound, inbound))
  };

  let (outbound, inbound) = tokio::time::timeout(config.reconcile_timeout, scan)
    .await
    .map_err(|_| ReconcileError::TimedOut)??;

  info!(
    outbound_fetched = outbound.fetched,
    outbound_missing = outbound.missing_locally.len(),
    outbound_mismatch = outbound.status_mismatch.len(),
    outbound_extra = outbound.extra_locally.len(),
    inbound_fetched = inbound.fetched,
    inbound_missing = inbound.missing_locally.len(),
    "reconciliation scan finished"
  );
  Ok((outbound, inbound))
}
