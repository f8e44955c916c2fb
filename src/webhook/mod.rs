//! Provider webhook ingestion.
//!
//! `classify` turns a raw payload into a tagged event; `ingest` applies it.
//! The HTTP handler in this module owns the 2xx/4xx/5xx contract: classified
//! events (including Unknown) ack with 2xx, structurally malformed bodies get
//! 4xx so the provider stops retrying, internal failures get 5xx so the
//! provider's at-least-once redelivery tries again.

pub mod classify;
pub mod ingest;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use tracing::{error, info};

use crate::app::AppState;
use crate::error::WebhookError;

pub async fn receive(
  State(state): State<AppState>,
  body: axum::body::Bytes,
) -> impl IntoResponse {
  let value: serde_json::Value = match serde_json::from_slice(&body) {
    Ok(serde_json::Value::Object(map)) => serde_json::Value::Object(map),
    Ok(_) => return (StatusCode::BAD_REQUEST, "payload must be a JSON object").into_response(),
    Err(e) => {
      info!("rejecting malformed webhook body: {e}");
      return (StatusCode::BAD_REQUEST, "invalid JSON").into_response();
    }
  };

  let event = match classify::classify(&value) {
    Ok(event) => event,
    Err(WebhookError::Malformed(msg)) => {
      info!("rejecting malformed webhook payload: {msg}");
      return (StatusCode::BAD_REQUEST, "malformed payload").into_response();
    }
    Err(e) => {
      error!("webhook classification failure: {e}");
      return (StatusCode::INTERNAL_SERVER_ERROR, "internal error").into_response();
    }
  };

  match ingest::ingest(&state, event, &body).await {
    Ok(()) => StatusCode::OK.into_response(),
    Err(WebhookError::Malformed(msg)) => {
      info!("rejecting malformed webhook payload: {msg}");
      (StatusCode::BAD_REQUEST, "malformed payload").into_response()
    }
    Err(e) => {
      error!("webhook ingestion failure: {e}");
      (StatusCode::INTERNAL_SERVER_ERROR, "internal error").into_response()
    }
  }
}
