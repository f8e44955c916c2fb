//! Error taxonomy for the send and ingestion pipelines.

use thiserror::Error;

use crate::provider::ProviderError;

pub type SendResult<T> = Result<T, SendError>;

/// Failures surfaced by the outbound send path.
#[derive(Debug, Error)]
pub enum SendError {
  /// Required field missing; rejected pre-flight, no provider call is made.
  #[error("invalid send request: {0}")]
  Validation(String),
  /// The provider refused the From address because its sender identity is
  /// not verified. Requires a manual fix in the provider dashboard.
  #[error(
    "sender '{address}' is not a verified sender identity; \
     confirm the signature with the email provider before retrying"
  )]
  SenderNotVerified { address: String },
  /// Any other provider-side failure. Single attempt, no automatic retry.
  #[error("provider error: {0}")]
  Provider(String),
  #[error("email not found: {0}")]
  NotFound(String),
  #[error("database error: {0}")]
  Database(#[from] sqlx::Error),
}

impl From<ProviderError> for SendError {
  fn from(err: ProviderError) -> Self {
    match err {
      ProviderError::SenderNotVerified { address } => SendError::SenderNotVerified { address },
      other => SendError::Provider(other.to_string()),
    }
  }
}

/// Failures surfaced by webhook ingestion. `Malformed` maps to 4xx (the
/// provider must not retry), the rest map to 5xx (the provider will retry).
#[derive(Debug, Error)]
pub enum WebhookError {
  #[error("malformed webhook payload: {0}")]
  Malformed(String),
  #[error("database error: {0}")]
  Database(#[from] sqlx::Error),
  #[error("attachment handoff failed: {0}")]
  Attachment(String),
}
