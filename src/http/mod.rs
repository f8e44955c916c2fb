//! HTTP router and handlers.

use crate::app::AppState;
use axum::{
  Router,
  routing::{get, post},
};

pub mod emails;
pub mod events;
pub mod send;
pub mod threads;

/// Assemble the HTTP router with all routes.
pub fn build_router(state: AppState) -> Router {
  Router::new()
    .route("/send", post(send::send_email))
    .route("/emails", get(emails::list_emails))
    .route("/emails/:id", get(emails::get_email))
    .route("/emails/:id/reply", post(send::reply_email))
    .route("/threads/:thread_id", get(threads::get_thread))
    .route("/events", get(events::list_events))
    .route("/webhooks/provider", post(crate::webhook::receive))
    .with_state(state)
}
