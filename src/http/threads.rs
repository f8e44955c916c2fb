//! Thread view: derived summary plus member messages.

use axum::{
  Json,
  extract::{Path as AxumPath, State},
  http::StatusCode,
  response::IntoResponse,
};
use serde::Serialize;
use tracing::error;
use uuid::Uuid;

use crate::app::AppState;
use crate::models::email::email_row::EMAIL_COLUMNS;
use crate::models::email::{ApiEmail, EmailRow};
use crate::models::thread::ThreadSummary;

#[derive(Debug, Serialize)]
pub struct ThreadView {
  pub summary: ThreadSummary,
  pub messages: Vec<ApiEmail>,
}

pub async fn get_thread(
  State(state): State<AppState>,
  AxumPath(thread_id): AxumPath<Uuid>,
) -> impl IntoResponse {
  let summary = match ThreadSummary::load(&state.db, thread_id).await {
    Ok(Some(summary)) => summary,
    Ok(None) => return (StatusCode::NOT_FOUND, "thread not found").into_response(),
    Err(e) => {
      error!("get_thread summary error: {e}");
      return (StatusCode::INTERNAL_SERVER_ERROR, "db error").into_response();
    }
  };

  let rows: Result<Vec<EmailRow>, _> = sqlx::query_as(&format!(
    "SELECT {EMAIL_COLUMNS} FROM emails WHERE thread_id = ? ORDER BY created_at ASC"
  ))
  .bind(thread_id)
  .fetch_all(&state.db)
  .await;

  match rows {
    Ok(rows) => Json(ThreadView {
      summary,
      messages: rows.into_iter().map(ApiEmail::from).collect(),
    })
    .into_response(),
    Err(e) => {
      error!("get_thread messages error: {e}");
      (StatusCode::INTERNAL_SERVER_ERROR, "db error").into_response()
    }
  }
}
