//! Activity/Notification fan-out
//!
//! Every successful transition writes one activity-log row and emits zero to
//! two notifications. Neither side effect can fail the transition that caused
//! it: errors are logged and dropped.

pub mod activity;
pub mod dispatcher;
pub mod notifier;

pub use activity::ActivityRecorder;
pub use dispatcher::{NotificationDispatcher, NotificationWorker};
pub use notifier::{Notifier, NotifyError, StoreNotifier};

use shared::models::ActivityAction;
use shared::notification::Notification;

/// Handle bundling both side-effect channels
#[derive(Debug, Clone)]
pub struct FanOut {
    pub activity: ActivityRecorder,
    pub notifications: NotificationDispatcher,
}

impl FanOut {
    pub fn new(activity: ActivityRecorder, notifications: NotificationDispatcher) -> Self {
        Self {
            activity,
            notifications,
        }
    }

    pub async fn record(
        &self,
        action: ActivityAction,
        subject_id: i64,
        actor_id: Option<i64>,
        metadata: serde_json::Value,
    ) {
        self.activity
            .record(action, subject_id, actor_id, metadata)
            .await;
    }

    /// Queue notifications; returns how many were accepted by the channel
    pub fn notify_all(&self, notifications: impl IntoIterator<Item = Notification>) -> usize {
        notifications
            .into_iter()
            .map(|n| self.notifications.dispatch(n))
            .filter(|queued| *queued)
            .count()
    }
}
