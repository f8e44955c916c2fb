//! Audit event read API.

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use tracing::error;

use crate::app::AppState;
use crate::events;

pub async fn list_events(State(state): State<AppState>) -> impl IntoResponse {
  match events::recent(&state.db, 200).await {
    Ok(rows) => Json(rows).into_response(),
    Err(e) => {
      error!("list_events error: {e}");
      (StatusCode::INTERNAL_SERVER_ERROR, "db error").into_response()
    }
  }
}
