//! Handlers for sending and replying via REST.

use axum::{
  Json,
  extract::{Path as AxumPath, State},
  http::StatusCode,
  response::IntoResponse,
};
use serde::Deserialize;
use tracing::error;
use uuid::Uuid;

use crate::app::AppState;
use crate::error::SendError;
use crate::outbound::{self, SendContext, SendInput};

#[derive(Debug, Deserialize)]
pub struct SendBody {
  pub from: String,
  pub to: Vec<String>,
  #[serde(default)]
  pub cc: Vec<String>,
  #[serde(default)]
  pub bcc: Vec<String>,
  pub subject: String,
  pub text_body: Option<String>,
  pub html_body: Option<String>,
  pub quote_id: Option<String>,
  pub order_id: Option<String>,
  pub customer_id: Option<String>,
  pub vendor_id: Option<String>,
  pub parent_message_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ReplyBody {
  pub from: String,
  pub body: String,
  pub to: Option<String>,
}

fn send_error_response(err: SendError) -> axum::response::Response {
  match &err {
    SendError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()).into_response(),
    SendError::NotFound(_) => (StatusCode::NOT_FOUND, err.to_string()).into_response(),
    SendError::SenderNotVerified { .. } => {
      // Operator-actionable: needs a provider-side configuration change.
      error!("send rejected: {err}");
      (StatusCode::UNPROCESSABLE_ENTITY, err.to_string()).into_response()
    }
    SendError::Provider(msg) => {
      error!("provider send failure: {msg}");
      (StatusCode::BAD_GATEWAY, "provider error").into_response()
    }
    SendError::Database(e) => {
      error!("send db error: {e}");
      (StatusCode::INTERNAL_SERVER_ERROR, "db error").into_response()
    }
  }
}

pub async fn send_email(
  State(state): State<AppState>,
  Json(body): Json<SendBody>,
) -> impl IntoResponse {
  let input = SendInput {
    from: body.from,
    to: body.to,
    cc: body.cc,
    bcc: body.bcc,
    subject: body.subject,
    text_body: body.text_body,
    html_body: body.html_body,
    context: SendContext {
      quote_id: body.quote_id,
      order_id: body.order_id,
      customer_id: body.customer_id,
      vendor_id: body.vendor_id,
      parent_message_id: body.parent_message_id,
    },
  };
  match outbound::send(&state.db, &state.provider, &state.config, input).await {
    Ok(receipt) => Json(receipt).into_response(),
    Err(err) => send_error_response(err),
  }
}

pub async fn reply_email(
  State(state): State<AppState>,
  AxumPath(id): AxumPath<Uuid>,
  Json(body): Json<ReplyBody>,
) -> impl IntoResponse {
  match outbound::reply(
    &state.db,
    &state.provider,
    &state.config,
    id,
    body.from,
    body.body,
    body.to,
  )
  .await
  {
    Ok(receipt) => Json(receipt).into_response(),
    Err(err) => send_error_response(err),
  }
}
