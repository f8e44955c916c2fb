mod common;

use chrono::{Duration, Utc};
use common::{StubProvider, memory_pool, start_stub_provider};
use serde_json::json;
use std::collections::HashSet;
use std::sync::atomic::Ordering;
use uuid::Uuid;

use mailroom::config::MailConfig;
use mailroom::models::email::{Direction, EmailRow, EmailStatus, NewEmail};
use mailroom::provider::ProviderClient;
use mailroom::reconcile::{self, MessageHistory, ReconcileError};

fn provider_message(id: &str, status: &str) -> serde_json::Value {
  json!({
    "MessageID": id,
    "From": "sales@acme.test",
    "To": [{ "Email": "a@x.com" }],
    "Subject": "Quote 100",
    "Status": status,
    "Metadata": {}
  })
}

fn local_row(provider_message_id: &str, status: EmailStatus) -> NewEmail {
  NewEmail {
    id: Uuid::new_v4(),
    thread_id: Uuid::new_v4(),
    direction: Direction::Outbound,
    status,
    from_addr: "sales@acme.test".to_string(),
    to_addrs: vec!["a@x.com".to_string()],
    cc_addrs: Vec::new(),
    bcc_addrs: Vec::new(),
    subject: Some("Quote 100".to_string()),
    text_body: Some("body".to_string()),
    html_body: None,
    message_id: format!("<{}@acme.test>", Uuid::new_v4()),
    provider_message_id: Some(provider_message_id.to_string()),
    in_reply_to: None,
    references_chain: None,
    quote_id: None,
    order_id: None,
    customer_id: None,
    vendor_id: None,
    metadata: None,
    sent_at: Some(Utc::now()),
  }
}

#[tokio::test]
async fn pagination_walks_exact_total_without_duplicates() {
  let stub = StubProvider::default();
  {
    let mut history = stub.outbound_history.lock().unwrap();
    for i in 0..1200 {
      history.push(provider_message(&format!("pm-{i}"), "Sent"));
    }
  }
  let base = start_stub_provider(stub.clone()).await;
  let client = ProviderClient::with_base_url("test-token", &base);

  let now = Utc::now();
  let mut history = MessageHistory::new(
    &client,
    Direction::Outbound,
    now - Duration::days(1),
    now,
    500,
  );

  let mut seen = HashSet::new();
  let mut fetched = 0usize;
  let mut page_sizes = Vec::new();
  while let Some(page) = history.next_page().await.unwrap() {
    page_sizes.push(page.len());
    for message in page {
      fetched += 1;
      assert!(seen.insert(message.message_id), "duplicate provider id");
    }
  }

  assert_eq!(fetched, 1200);
  assert_eq!(page_sizes, vec![500, 500, 200]);
  assert_eq!(history.total_count(), Some(1200));
  // Exactly 3 fetches: the total-count check avoids a trailing empty page.
  assert_eq!(stub.page_fetches.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn empty_batch_is_the_authoritative_stop() {
  // Provider claims a larger total than it can serve; the scanner must not
  // loop on the stale count.
  let stub = StubProvider::default();
  {
    let mut history = stub.outbound_history.lock().unwrap();
    for i in 0..3 {
      history.push(provider_message(&format!("pm-{i}"), "Sent"));
    }
  }
  let base = start_stub_provider(stub.clone()).await;
  let client = ProviderClient::with_base_url("test-token", &base);

  let now = Utc::now();
  let mut history = MessageHistory::new(
    &client,
    Direction::Outbound,
    now - Duration::days(1),
    now,
    2,
  );

  let mut fetched = 0usize;
  while let Some(page) = history.next_page().await.unwrap() {
    fetched += page.len();
  }
  assert_eq!(fetched, 3);
}

#[tokio::test]
async fn missing_provider_records_are_upserted_with_their_thread() {
  let stub = StubProvider::default();
  let thread_id = Uuid::new_v4();
  stub.outbound_history.lock().unwrap().push(json!({
    "MessageID": "pm-ghost",
    "From": "sales@acme.test",
    "To": [{ "Email": "a@x.com" }],
    "Subject": "Quote 200",
    "Status": "Delivered",
    "Metadata": { "thread_id": thread_id.to_string(), "quote_id": "200" }
  }));
  let base = start_stub_provider(stub.clone()).await;
  let client = ProviderClient::with_base_url("test-token", &base);
  let pool = memory_pool().await;

  let now = Utc::now();
  let report = reconcile::scan_window(
    &pool,
    &client,
    "acme.test",
    Direction::Outbound,
    now - Duration::hours(1),
    now + Duration::hours(1),
    500,
  )
  .await
  .unwrap();

  assert_eq!(report.missing_locally, vec!["pm-ghost".to_string()]);
  let row = EmailRow::find_by_provider_message_id(&pool, "pm-ghost")
    .await
    .unwrap()
    .expect("repaired row");
  assert_eq!(row.thread_id, thread_id);
  assert_eq!(row.status, EmailStatus::Delivered);
  assert_eq!(row.quote_id.as_deref(), Some("200"));

  // Re-running the scan is idempotent: nothing further to repair.
  let report = reconcile::scan_window(
    &pool,
    &client,
    "acme.test",
    Direction::Outbound,
    now - Duration::hours(1),
    now + Duration::hours(1),
    500,
  )
  .await
  .unwrap();
  assert!(report.missing_locally.is_empty());
}

#[tokio::test]
async fn status_drift_repairs_forward_only() {
  let stub = StubProvider::default();
  {
    let mut history = stub.outbound_history.lock().unwrap();
    history.push(provider_message("pm-a", "Delivered"));
    history.push(provider_message("pm-b", "Delivered"));
  }
  let base = start_stub_provider(stub.clone()).await;
  let client = ProviderClient::with_base_url("test-token", &base);
  let pool = memory_pool().await;

  // pm-a lags behind the provider; pm-b is already terminal locally.
  local_row("pm-a", EmailStatus::Sent).insert(&pool).await.unwrap();
  local_row("pm-b", EmailStatus::Bounced).insert(&pool).await.unwrap();

  let now = Utc::now();
  let report = reconcile::scan_window(
    &pool,
    &client,
    "acme.test",
    Direction::Outbound,
    now - Duration::hours(1),
    now + Duration::hours(1),
    500,
  )
  .await
  .unwrap();

  assert_eq!(report.status_mismatch.len(), 2);
  let a = EmailRow::find_by_provider_message_id(&pool, "pm-a")
    .await
    .unwrap()
    .unwrap();
  assert_eq!(a.status, EmailStatus::Delivered);
  // Terminal local status never rolls back.
  let b = EmailRow::find_by_provider_message_id(&pool, "pm-b")
    .await
    .unwrap()
    .unwrap();
  assert_eq!(b.status, EmailStatus::Bounced);
}

#[tokio::test]
async fn local_rows_absent_from_provider_are_flagged_not_deleted() {
  let stub = StubProvider::default();
  let base = start_stub_provider(stub.clone()).await;
  let client = ProviderClient::with_base_url("test-token", &base);
  let pool = memory_pool().await;

  local_row("pm-only-local", EmailStatus::Sent)
    .insert(&pool)
    .await
    .unwrap();

  let now = Utc::now();
  let report = reconcile::scan_window(
    &pool,
    &client,
    "acme.test",
    Direction::Outbound,
    now - Duration::hours(1),
    now + Duration::hours(1),
    500,
  )
  .await
  .unwrap();

  assert_eq!(report.extra_locally, vec!["pm-only-local".to_string()]);
  assert!(
    EmailRow::find_by_provider_message_id(&pool, "pm-only-local")
      .await
      .unwrap()
      .is_some(),
    "anomalous rows are surfaced, never deleted"
  );
}

#[tokio::test]
async fn whole_scan_is_bounded_by_one_wall_clock_timeout() {
  let stub = StubProvider::default();
  {
    let mut history = stub.outbound_history.lock().unwrap();
    for i in 0..10 {
      history.push(provider_message(&format!("pm-{i}"), "Sent"));
    }
  }
  stub.page_delay_ms.store(200, Ordering::SeqCst);
  let base = start_stub_provider(stub.clone()).await;
  let client = ProviderClient::with_base_url("test-token", &base);
  let pool = memory_pool().await;

  let mut config = MailConfig::default();
  config.reconcile_timeout = std::time::Duration::from_millis(50);

  let err = reconcile::run_scan(&pool, &client, &config).await.unwrap_err();
  assert!(matches!(err, ReconcileError::TimedOut));
}
