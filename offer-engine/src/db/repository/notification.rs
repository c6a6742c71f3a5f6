//! Notification Outbox Repository

use super::RepoResult;
use serde::Serialize;
use shared::notification::Notification;
use sqlx::{Executor, Sqlite};

/// Stored notification as the delivery transport reads it
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct StoredNotification {
    pub id: i64,
    pub recipient_id: i64,
    pub kind: String,
    pub title: String,
    pub body: String,
    pub metadata: String,
    pub dedup_key: Option<String>,
    pub is_read: bool,
    pub created_at: i64,
}

/// Insert a notification. Returns false when a row with the same dedup key
/// already exists.
pub async fn insert<'e, E>(ex: E, id: i64, n: &Notification, now: i64) -> RepoResult<bool>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query(
        "INSERT INTO notification (id, recipient_id, kind, title, body, metadata, dedup_key, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8) \
         ON CONFLICT(dedup_key) DO NOTHING",
    )
    .bind(id)
    .bind(n.recipient_id)
    .bind(n.kind.type_name())
    .bind(n.kind.title())
    .bind(n.kind.body())
    .bind(n.kind.metadata().to_string())
    .bind(n.dedup_key.as_deref())
    .bind(now)
    .execute(ex)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn find_for_recipient<'e, E>(ex: E, recipient_id: i64) -> RepoResult<Vec<StoredNotification>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let rows = sqlx::query_as::<_, StoredNotification>(
        "SELECT id, recipient_id, kind, title, body, metadata, dedup_key, is_read, created_at \
         FROM notification WHERE recipient_id = ? ORDER BY created_at, id",
    )
    .bind(recipient_id)
    .fetch_all(ex)
    .await?;
    Ok(rows)
}
