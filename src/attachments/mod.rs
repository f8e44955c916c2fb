//! Attachment handoff seam.
//!
//! Inbound attachments are handed to an external collaborator through
//! `AttachmentSink`. The contract is memory-bounded: implementations consume
//! the reader in chunks and must not buffer whole attachments.

use async_trait::async_trait;
use std::path::PathBuf;
use tokio::io::{AsyncRead, AsyncWriteExt};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct AttachmentDescriptor {
  pub filename: Option<String>,
  pub content_type: String,
  pub content_length: u64,
}

#[async_trait]
pub trait AttachmentSink: Send + Sync {
  async fn store(
    &self,
    email_id: Uuid,
    descriptor: &AttachmentDescriptor,
    content: &mut (dyn AsyncRead + Send + Unpin),
  ) -> std::io::Result<()>;
}

/// Spools attachments to a directory, one subfolder per email.
#[derive(Debug, Clone)]
pub struct SpoolSink {
  root: PathBuf,
}

impl SpoolSink {
  pub fn new(root: impl Into<PathBuf>) -> Self {
    SpoolSink { root: root.into() }
  }
}

#[async_trait]
impl AttachmentSink for SpoolSink {
  async fn store(
    &self,
    email_id: Uuid,
    descriptor: &AttachmentDescriptor,
    content: &mut (dyn AsyncRead + Send + Unpin),
  ) -> std::io::Result<()> {
    let dir = self.root.join(email_id.to_string());
    tokio::fs::create_dir_all(&dir).await?;
    let name = descriptor
      .filename
      .clone()
      .unwrap_or_else(|| format!("attachment-{}", Uuid::new_v4()));
    let mut file = tokio::fs::File::create(dir.join(name)).await?;
    tokio::io::copy(content, &mut file).await?;
    file.flush().await?;
    Ok(())
  }
}

/// Discards attachments; used in tests and when no spool dir is configured.
#[derive(Debug, Clone, Default)]
pub struct NullSink;

#[async_trait]
impl AttachmentSink for NullSink {
  async fn store(
    &self,
    _email_id: Uuid,
    _descriptor: &AttachmentDescriptor,
    content: &mut (dyn AsyncRead + Send + Unpin),
  ) -> std::io::Result<()> {
    tokio::io::copy(content, &mut tokio::io::sink()).await?;
    Ok(())
  }
}
