//! Notification delivery seam

use crate::core::clock::SharedClock;
use crate::db::repository::{RepoError, notification};
use async_trait::async_trait;
use shared::notification::Notification;
use sqlx::SqlitePool;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Store error: {0}")]
    Store(#[from] RepoError),
    #[error("Transport error: {0}")]
    Transport(String),
}

/// Accepts a notification for asynchronous, best-effort delivery.
///
/// `Ok(false)` means the notification was deliberately dropped as a duplicate.
#[async_trait]
pub trait Notifier: Send + Sync + std::fmt::Debug {
    async fn deliver(&self, notification: &Notification) -> Result<bool, NotifyError>;
}

/// Writes notifications to the `notification` outbox table, collapsing
/// duplicates by dedup key. Push/email transports read from there.
#[derive(Debug, Clone)]
pub struct StoreNotifier {
    pool: SqlitePool,
    clock: SharedClock,
}

impl StoreNotifier {
    pub fn new(pool: SqlitePool, clock: SharedClock) -> Self {
        Self { pool, clock }
    }
}

#[async_trait]
impl Notifier for StoreNotifier {
    async fn deliver(&self, n: &Notification) -> Result<bool, NotifyError> {
        let inserted = notification::insert(
            &self.pool,
            shared::util::snowflake_id(),
            n,
            self.clock.now_millis(),
        )
        .await?;
        Ok(inserted)
    }
}
