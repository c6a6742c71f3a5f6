//! Activity log writer

use crate::core::clock::SharedClock;
use crate::db::repository::activity;
use shared::models::ActivityAction;
use sqlx::SqlitePool;

/// Writes activity rows and mirrors each one to the `audit` log target
#[derive(Debug, Clone)]
pub struct ActivityRecorder {
    pool: SqlitePool,
    clock: SharedClock,
}

impl ActivityRecorder {
    pub fn new(pool: SqlitePool, clock: SharedClock) -> Self {
        Self { pool, clock }
    }

    pub async fn record(
        &self,
        action: ActivityAction,
        subject_id: i64,
        actor_id: Option<i64>,
        metadata: serde_json::Value,
    ) {
        let now = self.clock.now_millis();
        let id = shared::util::snowflake_id();

        tracing::info!(
            target: "audit",
            action = action.as_str(),
            subject = action.subject_type().as_str(),
            subject_id,
            actor_id = ?actor_id,
            metadata = %metadata,
            "ACTIVITY"
        );

        if let Err(e) =
            activity::insert(&self.pool, id, action, subject_id, actor_id, &metadata, now).await
        {
            tracing::warn!(
                action = action.as_str(),
                subject_id,
                error = %e,
                "Failed to write activity log entry"
            );
        }
    }
}
