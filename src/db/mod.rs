//! Database helpers: migrations and path handling.

use sqlx::SqlitePool;
use std::path::Path;

/// Run SQLite migrations to create tables if absent.
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"CREATE TABLE IF NOT EXISTS emails (
            id TEXT PRIMARY KEY,
            thread_id TEXT NOT NULL,
            direction TEXT NOT NULL,
            status TEXT NOT NULL,
            from_addr TEXT NOT NULL,
            to_addrs TEXT NOT NULL,
            cc_addrs TEXT NULL,
            bcc_addrs TEXT NULL,
            subject TEXT NULL,
            text_body TEXT NULL,
            html_body TEXT NULL,
            message_id TEXT NOT NULL UNIQUE,
            provider_message_id TEXT NULL,
            in_reply_to TEXT NULL,
            references_chain TEXT NULL,
            quote_id TEXT NULL,
            order_id TEXT NULL,
            customer_id TEXT NULL,
            vendor_id TEXT NULL,
            metadata TEXT NULL,
            sent_at TEXT NULL,
            delivered_at TEXT NULL,
            bounced_at TEXT NULL,
            opened_at TEXT NULL,
            clicked_at TEXT NULL,
            open_count INTEGER NOT NULL DEFAULT 0,
            click_count INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL
        )"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_emails_provider_message_id \
         ON emails (provider_message_id) WHERE provider_message_id IS NOT NULL",
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_emails_thread_id ON emails (thread_id)")
        .execute(pool)
        .await?;

    sqlx::query(
        r#"CREATE TABLE IF NOT EXISTS events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            ts TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            action TEXT NOT NULL,
            source TEXT NOT NULL,
            details TEXT NULL
        )"#,
    )
    .execute(pool)
    .await?;

    // At-least-once webhook dedupe. The UNIQUE primary key is what collapses
    // concurrent redeliveries of the same logical event.
    sqlx::query(
        r#"CREATE TABLE IF NOT EXISTS webhook_deliveries (
            delivery_key TEXT PRIMARY KEY,
            received_at TEXT NOT NULL
        )"#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

/// Ensure SQLite file and parent folder exist for a given sqlx URL.
pub fn ensure_sqlite_path(db_url: &str) -> String {
    if !db_url.starts_with("sqlite:") {
        return db_url.to_string();
    }
    let path_part = db_url.trim_start_matches("sqlite://");
    if path_part == ":memory:" {
        return db_url.to_string();
    }
    let (path_only, _) = match path_part.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (path_part, None),
    };
    if !path_only.is_empty() {
        let p = Path::new(path_only);
        if let Some(parent) = p.parent() {
            if !parent.as_os_str().is_empty() {
                let _ = std::fs::create_dir_all(parent);
            }
        }
        let _ = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(p);
    }
    db_url.to_string()
}
