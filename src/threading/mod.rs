//! Conversation identity: thread resolution and RFC 2822 threading headers.

use chrono::Utc;
use sqlx::SqliteExecutor;
use uuid::Uuid;

use crate::models::email::EmailRow;

/// Outcome of a thread lookup. `Orphaned` means a parent Message-ID was
/// given but no local email carries it; the new thread starts detached and
/// the caller decides whether to audit that.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadResolution {
  /// No parent reference: a brand-new thread root.
  Root(Uuid),
  /// Parent found locally; the chain continues.
  Inherited(Uuid),
  /// Parent referenced but unknown locally.
  Orphaned(Uuid),
}

impl ThreadResolution {
  pub fn thread_id(self) -> Uuid {
    match self {
      ThreadResolution::Root(id)
      | ThreadResolution::Inherited(id)
      | ThreadResolution::Orphaned(id) => id,
    }
  }
}

/// Derive the thread for a new message. Pure lookup plus derive: no writes,
/// safe to call concurrently.
pub async fn resolve_thread(
  executor: impl SqliteExecutor<'_>,
  parent_message_id: Option<&str>,
) -> Result<ThreadResolution, sqlx::Error> {
  let Some(parent_mid) = parent_message_id else {
    return Ok(ThreadResolution::Root(Uuid::new_v4()));
  };
  match EmailRow::find_by_message_id(executor, parent_mid).await? {
    Some(parent) => Ok(ThreadResolution::Inherited(parent.thread_id)),
    None => Ok(ThreadResolution::Orphaned(Uuid::new_v4())),
  }
}

/// Locally generated RFC 2822 Message-ID: `<millis-uuid@domain>`.
pub fn generate_message_id(domain: &str) -> String {
  format!(
    "<{}-{}@{}>",
    Utc::now().timestamp_millis(),
    Uuid::new_v4(),
    domain
  )
}

/// Append the parent's Message-ID to its References chain. The chain only
/// ever grows along a reply lineage.
pub fn extend_references(parent_references: Option<&str>, parent_message_id: &str) -> String {
  match parent_references {
    Some(refs) if !refs.trim().is_empty() => format!("{} {}", refs.trim(), parent_message_id),
    _ => parent_message_id.to_string(),
  }
}

/// Prefix a subject with "Re:" unless one is already there.
pub fn reply_subject(subject: Option<&str>) -> String {
  let base = subject.unwrap_or("").trim();
  if base.to_ascii_lowercase().starts_with("re:") {
    base.to_string()
  } else if base.is_empty() {
    "Re:".to_string()
  } else {
    format!("Re: {base}")
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn message_id_has_angle_brackets_and_domain() {
    let mid = generate_message_id("acme.test");
    assert!(mid.starts_with('<'));
    assert!(mid.ends_with("@acme.test>"));
  }

  #[test]
  fn message_ids_are_unique() {
    assert_ne!(generate_message_id("acme.test"), generate_message_id("acme.test"));
  }

  #[test]
  fn references_start_with_parent_message_id() {
    assert_eq!(extend_references(None, "<m1@x>"), "<m1@x>");
    assert_eq!(extend_references(Some(""), "<m1@x>"), "<m1@x>");
  }

  #[test]
  fn references_append_to_existing_chain() {
    assert_eq!(
      extend_references(Some("<m1@x> <m2@x>"), "<m3@x>"),
      "<m1@x> <m2@x> <m3@x>"
    );
  }

  #[test]
  fn reply_prefix_is_idempotent() {
    assert_eq!(reply_subject(Some("Quote 100")), "Re: Quote 100");
    assert_eq!(reply_subject(Some("Re: Quote 100")), "Re: Quote 100");
    assert_eq!(reply_subject(Some("RE: Quote 100")), "RE: Quote 100");
    assert_eq!(reply_subject(None), "Re:");
  }
}
