//! Process configuration, resolved once at startup.

use std::collections::HashMap;
use std::time::Duration;

/// Everything the send and ingestion paths need to know about their
/// environment. Built once in `app::run` and passed explicitly; handlers
/// never re-read the environment per call.
#[derive(Debug, Clone)]
pub struct MailConfig {
  /// Domain used in locally generated Message-IDs.
  pub message_id_domain: String,
  /// Provider message stream for outbound sends.
  pub message_stream: String,
  /// Process-wide Reply-To fallback.
  pub default_reply_to: Option<String>,
  /// Per-sender Reply-To overrides, keyed by From address (lowercased).
  pub reply_to_overrides: HashMap<String, String>,
  /// When set, every outbound send is BCC'd here for external visibility.
  pub mirror_bcc: Option<String>,
  /// When set, inbound webhook messages are forwarded to this address.
  pub forward_inbound_to: Option<String>,
  /// How far back a reconciliation scan looks.
  pub reconcile_window: Duration,
  /// Wall-clock budget for one whole scan, all pages included.
  pub reconcile_timeout: Duration,
  /// Interval between background scans. Zero disables the loop.
  pub reconcile_interval: Duration,
}

impl MailConfig {
  pub fn from_env() -> Self {
    let reply_to_overrides = std::env::var("MAILROOM_REPLY_TO_OVERRIDES")
      .ok()
      .map(|raw| parse_overrides(&raw))
      .unwrap_or_default();

    MailConfig {
      message_id_domain: std::env::var("MAILROOM_DOMAIN")
        .unwrap_or_else(|_| "mail.localhost".to_string()),
      message_stream: std::env::var("MAILROOM_MESSAGE_STREAM")
        .unwrap_or_else(|_| "outbound".to_string()),
      default_reply_to: std::env::var("MAILROOM_DEFAULT_REPLY_TO").ok(),
      reply_to_overrides,
      mirror_bcc: std::env::var("MAILROOM_MIRROR_BCC").ok(),
      forward_inbound_to: std::env::var("MAILROOM_FORWARD_INBOUND_TO").ok(),
      reconcile_window: duration_env("MAILROOM_RECONCILE_WINDOW_SECS", 86_400),
      reconcile_timeout: duration_env("MAILROOM_RECONCILE_TIMEOUT_SECS", 300),
      reconcile_interval: duration_env("MAILROOM_RECONCILE_INTERVAL_SECS", 0),
    }
  }

  /// Reply-To precedence: per-sender override, else process default, else none.
  pub fn reply_to_for(&self, from: &str) -> Option<String> {
    self
      .reply_to_overrides
      .get(&from.to_ascii_lowercase())
      .cloned()
      .or_else(|| self.default_reply_to.clone())
  }
}

impl Default for MailConfig {
  fn default() -> Self {
    MailConfig {
      message_id_domain: "mail.localhost".to_string(),
      message_stream: "outbound".to_string(),
      default_reply_to: None,
      reply_to_overrides: HashMap::new(),
      mirror_bcc: None,
      forward_inbound_to: None,
      reconcile_window: Duration::from_secs(86_400),
      reconcile_timeout: Duration::from_secs(300),
      reconcile_interval: Duration::ZERO,
    }
  }
}

/// Parse `sender=reply,sender2=reply2` pairs.
fn parse_overrides(raw: &str) -> HashMap<String, String> {
  raw
    .split(',')
    .filter_map(|pair| {
      let (k, v) = pair.split_once('=')?;
      let k = k.trim().to_ascii_lowercase();
      let v = v.trim().to_string();
      if k.is_empty() || v.is_empty() {
        None
      } else {
        Some((k, v))
      }
    })
    .collect()
}

fn duration_env(key: &str, default_secs: u64) -> Duration {
  let secs = std::env::var(key)
    .ok()
    .and_then(|v| v.parse().ok())
    .unwrap_or(default_secs);
  Duration::from_secs(secs)
}
