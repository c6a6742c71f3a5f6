//! Job Execution Log Repository

use super::RepoResult;
use serde::Serialize;
use sqlx::{Executor, Sqlite};

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct JobRun {
    pub id: i64,
    pub job_type: String,
    pub processed: i64,
    pub skipped: i64,
    pub errors: i64,
    pub details: Option<String>,
    pub executed_at: i64,
}

#[derive(Debug, Clone)]
pub struct NewJobRun<'a> {
    pub id: i64,
    pub job_type: &'a str,
    pub processed: u32,
    pub skipped: u32,
    pub errors: u32,
    pub details: Option<&'a serde_json::Value>,
}

pub async fn insert<'e, E>(ex: E, run: NewJobRun<'_>, now: i64) -> RepoResult<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        "INSERT INTO job_execution_log (id, job_type, processed, skipped, errors, details, executed_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
    )
    .bind(run.id)
    .bind(run.job_type)
    .bind(i64::from(run.processed))
    .bind(i64::from(run.skipped))
    .bind(i64::from(run.errors))
    .bind(run.details.map(|d| d.to_string()))
    .bind(now)
    .execute(ex)
    .await?;
    Ok(())
}

/// Time of the most recent error-free run of a job
pub async fn last_clean_run_at<'e, E>(ex: E, job_type: &str) -> RepoResult<Option<i64>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let at = sqlx::query_scalar::<_, Option<i64>>(
        "SELECT MAX(executed_at) FROM job_execution_log WHERE job_type = ? AND errors = 0",
    )
    .bind(job_type)
    .fetch_one(ex)
    .await?;
    Ok(at)
}

pub async fn find_recent<'e, E>(ex: E, job_type: &str, limit: i64) -> RepoResult<Vec<JobRun>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let rows = sqlx::query_as::<_, JobRun>(
        "SELECT id, job_type, processed, skipped, errors, details, executed_at \
         FROM job_execution_log WHERE job_type = ? ORDER BY executed_at DESC, id DESC LIMIT ?",
    )
    .bind(job_type)
    .bind(limit)
    .fetch_all(ex)
    .await?;
    Ok(rows)
}
