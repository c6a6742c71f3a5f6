//! Activity Log Repository

use super::{RepoError, RepoResult};
use shared::models::{ActivityAction, ActivityEntry, SubjectType};
use sqlx::{Executor, Sqlite};

#[derive(Debug, sqlx::FromRow)]
struct ActivityRow {
    id: i64,
    subject_type: String,
    subject_id: i64,
    action: String,
    actor_id: Option<i64>,
    metadata: String,
    created_at: i64,
}

impl TryFrom<ActivityRow> for ActivityEntry {
    type Error = RepoError;

    fn try_from(row: ActivityRow) -> RepoResult<Self> {
        Ok(ActivityEntry {
            id: row.id,
            subject_type: row.subject_type.parse::<SubjectType>()?,
            subject_id: row.subject_id,
            action: row.action.parse::<ActivityAction>()?,
            actor_id: row.actor_id,
            metadata: serde_json::from_str(&row.metadata)
                .map_err(|e| RepoError::Corrupt(format!("activity_log.metadata: {e}")))?,
            created_at: row.created_at,
        })
    }
}

pub async fn insert<'e, E>(
    ex: E,
    id: i64,
    action: ActivityAction,
    subject_id: i64,
    actor_id: Option<i64>,
    metadata: &serde_json::Value,
    now: i64,
) -> RepoResult<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        "INSERT INTO activity_log (id, subject_type, subject_id, action, actor_id, metadata, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
    )
    .bind(id)
    .bind(action.subject_type().as_str())
    .bind(subject_id)
    .bind(action.as_str())
    .bind(actor_id)
    .bind(metadata.to_string())
    .bind(now)
    .execute(ex)
    .await?;
    Ok(())
}

/// Entries for one offer or reservation, oldest first
pub async fn find_for_subject<'e, E>(
    ex: E,
    subject_type: SubjectType,
    subject_id: i64,
) -> RepoResult<Vec<ActivityEntry>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let rows = sqlx::query_as::<_, ActivityRow>(
        "SELECT id, subject_type, subject_id, action, actor_id, metadata, created_at \
         FROM activity_log WHERE subject_type = ? AND subject_id = ? ORDER BY created_at, id",
    )
    .bind(subject_type.as_str())
    .bind(subject_id)
    .fetch_all(ex)
    .await?;
    rows.into_iter().map(ActivityEntry::try_from).collect()
}
