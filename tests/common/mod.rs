//! Shared test harness: in-memory app server plus a stub provider server.
#![allow(dead_code)]

use axum::{
  Json, Router,
  extract::{Path, Query, State},
  http::StatusCode,
  routing::{get, post},
};
use serde_json::{Value, json};
use sqlx::sqlite::SqlitePoolOptions;
use std::collections::HashMap;
use std::sync::{
  Arc, Mutex,
  atomic::{AtomicU32, AtomicU64, Ordering},
};

use mailroom::app::AppState;
use mailroom::attachments::NullSink;
use mailroom::config::MailConfig;
use mailroom::provider::ProviderClient;
use mailroom::{db, http};

/// In-process stand-in for the email provider. Records every send and serves
/// a configurable paginated message history.
#[derive(Clone, Default)]
pub struct StubProvider {
  pub sends: Arc<Mutex<Vec<Value>>>,
  pub outbound_history: Arc<Mutex<Vec<Value>>>,
  pub inbound_history: Arc<Mutex<Vec<Value>>>,
  pub page_fetches: Arc<AtomicU32>,
  /// Artificial per-page delay in milliseconds, for timeout tests.
  pub page_delay_ms: Arc<AtomicU64>,
  send_counter: Arc<AtomicU64>,
}

async fn stub_send(State(stub): State<StubProvider>, Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
  stub.sends.lock().unwrap().push(body.clone());
  let from = body.get("From").and_then(|v| v.as_str()).unwrap_or("");
  if from.starts_with("unverified") {
    return (
      StatusCode::UNPROCESSABLE_ENTITY,
      Json(json!({
        "ErrorCode": 400,
        "Message": "sender signature not found",
        "MessageID": ""
      })),
    );
  }
  let n = stub.send_counter.fetch_add(1, Ordering::SeqCst) + 1;
  (
    StatusCode::OK,
    Json(json!({
      "ErrorCode": 0,
      "Message": "OK",
      "MessageID": format!("pm-{n}")
    })),
  )
}

async fn stub_history(
  State(stub): State<StubProvider>,
  Path(kind): Path<String>,
  Query(params): Query<HashMap<String, String>>,
) -> Json<Value> {
  let delay = stub.page_delay_ms.load(Ordering::SeqCst);
  if delay > 0 {
    tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
  }
  stub.page_fetches.fetch_add(1, Ordering::SeqCst);

  let count: usize = params
    .get("count")
    .and_then(|v| v.parse().ok())
    .unwrap_or(500);
  let offset: usize = params
    .get("offset")
    .and_then(|v| v.parse().ok())
    .unwrap_or(0);

  let source = if kind == "inbound" {
    stub.inbound_history.lock().unwrap().clone()
  } else {
    stub.outbound_history.lock().unwrap().clone()
  };
  let page: Vec<Value> = source.iter().skip(offset).take(count).cloned().collect();
  Json(json!({
    "TotalCount": source.len(),
    "Messages": page
  }))
}

pub async fn start_stub_provider(stub: StubProvider) -> String {
  let app = Router::new()
    .route("/email", post(stub_send))
    .route("/messages/:kind", get(stub_history))
    .with_state(stub);
  let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
  let addr = listener.local_addr().unwrap();
  tokio::spawn(async move {
    axum::serve(listener, app).await.unwrap();
  });
  format!("http://{}", addr)
}

pub async fn memory_pool() -> sqlx::SqlitePool {
  // One connection so every query sees the same in-memory database.
  let pool = SqlitePoolOptions::new()
    .max_connections(1)
    .connect("sqlite://:memory:")
    .await
    .expect("connect memory sqlite");
  db::run_migrations(&pool).await.expect("migrate");
  pool
}

pub async fn start_app(provider_base: &str, config: MailConfig) -> (String, AppState) {
  let pool = memory_pool().await;
  let state = AppState {
    db: pool,
    config: Arc::new(config),
    provider: Arc::new(ProviderClient::with_base_url("test-token", provider_base)),
    attachments: Arc::new(NullSink),
  };
  let app = http::build_router(state.clone());
  let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
  let addr = listener.local_addr().unwrap();
  tokio::spawn(async move {
    axum::serve(listener, app).await.unwrap();
  });
  (format!("http://{}", addr), state)
}

/// App plus stub provider wired together with default config.
pub async fn start_full(stub: StubProvider) -> (String, AppState) {
  let provider_base = start_stub_provider(stub).await;
  start_app(&provider_base, MailConfig::default()).await
}
