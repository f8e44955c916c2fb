//! Email read APIs over the local mirror.

use axum::{
  Json,
  extract::{Path as AxumPath, Query, State},
  http::StatusCode,
  response::IntoResponse,
};
use serde::Deserialize;
use tracing::error;
use uuid::Uuid;

use crate::app::AppState;
use crate::models::email::email_row::EMAIL_COLUMNS;
use crate::models::email::{ApiEmail, EmailRow};

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
  pub page: Option<u32>,
  pub limit: Option<u32>,
}

pub async fn list_emails(
  State(state): State<AppState>,
  Query(params): Query<ListParams>,
) -> impl IntoResponse {
  let page = params.page.unwrap_or(1).max(1);
  let limit = params.limit.unwrap_or(50).clamp(1, 200);
  let offset = (page - 1) * limit;

  let rows: Result<Vec<EmailRow>, _> = sqlx::query_as(&format!(
    "SELECT {EMAIL_COLUMNS} FROM emails ORDER BY created_at DESC LIMIT ? OFFSET ?"
  ))
  .bind(limit as i64)
  .bind(offset as i64)
  .fetch_all(&state.db)
  .await;

  match rows {
    Ok(rows) => {
      let out: Vec<ApiEmail> = rows.into_iter().map(ApiEmail::from).collect();
      Json(out).into_response()
    }
    Err(e) => {
      error!("list_emails error: {e}");
      (StatusCode::INTERNAL_SERVER_ERROR, "db error").into_response()
    }
  }
}

pub async fn get_email(
  State(state): State<AppState>,
  AxumPath(id): AxumPath<Uuid>,
) -> impl IntoResponse {
  match EmailRow::find_by_id(&state.db, id).await {
    Ok(Some(row)) => Json(ApiEmail::from(row)).into_response(),
    Ok(None) => (StatusCode::NOT_FOUND, "email not found").into_response(),
    Err(e) => {
      error!("get_email error: {e}");
      (StatusCode::INTERNAL_SERVER_ERROR, "db error").into_response()
    }
  }
}
