//! HTTP client for the email provider.

use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use thiserror::Error;

use crate::models::email::Direction;

use super::types::{MessagePage, OutboundRequest, SendOutcome};

const DEFAULT_BASE_URL: &str = "https://api.postmarkapp.com";
const TOKEN_HEADER: &str = "X-Postmark-Server-Token";

// Provider API error codes for an unverified sender signature.
const ERR_SIGNATURE_NOT_FOUND: i64 = 400;
const ERR_SIGNATURE_NOT_CONFIRMED: i64 = 401;

#[derive(Debug, Error)]
pub enum ProviderError {
  #[error("sender '{address}' is not a verified sender identity")]
  SenderNotVerified { address: String },
  #[error("provider api error {code}: {message}")]
  Api { code: i64, message: String },
  #[error("provider http error: {0}")]
  Http(#[from] reqwest::Error),
}

/// Single client instance, constructed once at startup and shared via
/// `AppState`. Never re-instantiated per call.
#[derive(Debug, Clone)]
pub struct ProviderClient {
  http: Client,
  base_url: String,
  token: String,
}

impl ProviderClient {
  pub fn new(token: impl Into<String>) -> Self {
    Self::with_base_url(token, DEFAULT_BASE_URL)
  }

  /// Base URL override, used by tests to point at a stub server.
  pub fn with_base_url(token: impl Into<String>, base_url: impl Into<String>) -> Self {
    ProviderClient {
      http: Client::new(),
      base_url: base_url.into().trim_end_matches('/').to_string(),
      token: token.into(),
    }
  }

  /// Submit one outbound message. Single attempt; transient failures are
  /// surfaced to the caller without retry.
  pub async fn send(&self, request: &OutboundRequest) -> Result<SendOutcome, ProviderError> {
    let response = self
      .http
      .post(format!("{}/email", self.base_url))
      .header(TOKEN_HEADER, &self.token)
      .json(request)
      .send()
      .await?;

    let status = response.status();
    let outcome: SendOutcome = response.json().await?;
    map_send_outcome(status, outcome, &request.from)
  }

  /// Fetch one page of the provider's message history for a direction and
  /// time window. Dates are inclusive day bounds, per the provider API.
  pub async fn message_page(
    &self,
    kind: Direction,
    count: u32,
    offset: u32,
    from_date: DateTime<Utc>,
    to_date: DateTime<Utc>,
  ) -> Result<MessagePage, ProviderError> {
    let segment = match kind {
      Direction::Inbound => "inbound",
      Direction::Outbound => "outbound",
    };
    let response = self
      .http
      .get(format!("{}/messages/{}", self.base_url, segment))
      .header(TOKEN_HEADER, &self.token)
      .query(&[
        ("count", count.to_string()),
        ("offset", offset.to_string()),
        ("fromdate", from_date.format("%Y-%m-%d").to_string()),
        ("todate", to_date.format("%Y-%m-%d").to_string()),
      ])
      .send()
      .await?;

    let status = response.status();
    if !status.is_success() {
      let body = response.text().await.unwrap_or_default();
      return Err(ProviderError::Api {
        code: status.as_u16() as i64,
        message: body,
      });
    }
    Ok(response.json().await?)
  }
}

fn map_send_outcome(
  status: StatusCode,
  outcome: SendOutcome,
  from: &str,
) -> Result<SendOutcome, ProviderError> {
  match outcome.error_code {
    0 if status.is_success() => Ok(outcome),
    ERR_SIGNATURE_NOT_FOUND | ERR_SIGNATURE_NOT_CONFIRMED => {
      Err(ProviderError::SenderNotVerified {
        address: from.to_string(),
      })
    }
    code => Err(ProviderError::Api {
      code: if code != 0 { code } else { status.as_u16() as i64 },
      message: outcome.message,
    }),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn outcome(error_code: i64, message: &str) -> SendOutcome {
    SendOutcome {
      message_id: String::new(),
      error_code,
      message: message.to_string(),
    }
  }

  #[test]
  fn accepted_send_passes_through() {
    let out = map_send_outcome(StatusCode::OK, outcome(0, "OK"), "me@acme.test");
    assert!(out.is_ok());
  }

  #[test]
  fn unverified_signature_maps_to_typed_error() {
    for code in [ERR_SIGNATURE_NOT_FOUND, ERR_SIGNATURE_NOT_CONFIRMED] {
      let err = map_send_outcome(
        StatusCode::UNPROCESSABLE_ENTITY,
        outcome(code, "signature not confirmed"),
        "me@acme.test",
      )
      .unwrap_err();
      match err {
        ProviderError::SenderNotVerified { address } => assert_eq!(address, "me@acme.test"),
        other => panic!("expected SenderNotVerified, got {other:?}"),
      }
    }
  }

  #[test]
  fn other_api_errors_carry_code_and_message() {
    let err = map_send_outcome(
      StatusCode::UNPROCESSABLE_ENTITY,
      outcome(300, "invalid To address"),
      "me@acme.test",
    )
    .unwrap_err();
    match err {
      ProviderError::Api { code, message } => {
        assert_eq!(code, 300);
        assert!(message.contains("invalid To"));
      }
      other => panic!("expected Api error, got {other:?}"),
    }
  }
}
