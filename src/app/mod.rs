//! Application setup and runtime.

use crate::attachments::{AttachmentSink, NullSink, SpoolSink};
use crate::config::MailConfig;
use crate::provider::ProviderClient;
use crate::{db, http, reconcile};
use sqlx::{SqlitePool, sqlite::SqlitePoolOptions};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info};

/// Shared application state. The provider client and config are built once
/// here and passed through; nothing re-reads the environment or constructs
/// a client per call.
#[derive(Clone)]
pub struct AppState {
  pub db: SqlitePool,
  pub config: Arc<MailConfig>,
  pub provider: Arc<ProviderClient>,
  pub attachments: Arc<dyn AttachmentSink>,
}

/// Start the HTTP server and the background reconciliation loop.
pub async fn run() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
  crate::util::init_tracing();

  let config = Arc::new(MailConfig::from_env());

  let db_url =
    std::env::var("MAILROOM_DATABASE").unwrap_or_else(|_| "sqlite://mailroom.db".to_string());
  let db_url = db::ensure_sqlite_path(&db_url);
  let pool = SqlitePoolOptions::new()
    .max_connections(5)
    .connect(&db_url)
    .await?;
  db::run_migrations(&pool).await?;

  let token = std::env::var("MAILROOM_PROVIDER_TOKEN").unwrap_or_default();
  let provider = Arc::new(match std::env::var("MAILROOM_PROVIDER_BASE_URL") {
    Ok(base) => ProviderClient::with_base_url(token, base),
    Err(_) => ProviderClient::new(token),
  });

  let attachments: Arc<dyn AttachmentSink> = match std::env::var("MAILROOM_ATTACHMENT_SPOOL") {
    Ok(dir) => Arc::new(SpoolSink::new(dir)),
    Err(_) => Arc::new(NullSink),
  };

  let state = AppState {
    db: pool.clone(),
    config: config.clone(),
    provider: provider.clone(),
    attachments,
  };

  let app = http::build_router(state.clone());

  let addr: SocketAddr = std::env::var("MAILROOM_ADDR")
    .unwrap_or_else(|_| "127.0.0.1:8030".to_string())
    .parse()?;

  info!("send endpoint:      POST http://{}/send", addr);
  info!("webhook endpoint:   POST http://{}/webhooks/provider", addr);

  // Reconciliation runs outside the request path.
  if !config.reconcile_interval.is_zero() {
    let scan_pool = pool.clone();
    let scan_provider = provider.clone();
    let scan_config = config.clone();
    tokio::spawn(async move {
      let mut ticker = tokio::time::interval(scan_config.reconcile_interval);
      ticker.tick().await;
      loop {
        ticker.tick().await;
        if let Err(e) = reconcile::run_scan(&scan_pool, &scan_provider, &scan_config).await {
          error!("reconciliation scan failed: {e}");
        }
      }
    });
  }

  let listener = tokio::net::TcpListener::bind(addr).await?;
  axum::serve(listener, app).await?;
  Ok(())
}
