//! 通知分发
//!
//! 业务代码通过 `try_send` 把通知放进有界 mpsc 通道，从不等待；
//! 后台 Worker 从通道取出后交给 [`Notifier`] 投递。

use super::notifier::Notifier;
use shared::notification::Notification;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;

/// Sending half. Cloning is cheap.
#[derive(Debug, Clone)]
pub struct NotificationDispatcher {
    tx: mpsc::Sender<Notification>,
}

impl NotificationDispatcher {
    pub fn new(buffer: usize) -> (Self, mpsc::Receiver<Notification>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (Self { tx }, rx)
    }

    /// Queue without waiting. A full or closed channel drops the notification.
    pub fn dispatch(&self, notification: Notification) -> bool {
        match self.tx.try_send(notification) {
            Ok(()) => true,
            Err(TrySendError::Full(n)) => {
                tracing::warn!(
                    recipient_id = n.recipient_id,
                    kind = n.kind.type_name(),
                    "Notification channel full, dropping notification"
                );
                false
            }
            Err(TrySendError::Closed(n)) => {
                tracing::warn!(
                    recipient_id = n.recipient_id,
                    kind = n.kind.type_name(),
                    "Notification channel closed, dropping notification"
                );
                false
            }
        }
    }
}

/// 通知投递 Worker
pub struct NotificationWorker {
    notifier: Arc<dyn Notifier>,
    shutdown: CancellationToken,
}

impl NotificationWorker {
    pub fn new(notifier: Arc<dyn Notifier>, shutdown: CancellationToken) -> Self {
        Self { notifier, shutdown }
    }

    /// 运行 worker，直到通道关闭或收到 shutdown 信号
    pub async fn run(self, mut rx: mpsc::Receiver<Notification>) {
        tracing::info!("Notification worker started");

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    // Deliver what is already queued, then stop
                    rx.close();
                    while let Some(n) = rx.recv().await {
                        self.deliver(&n).await;
                    }
                    break;
                }
                next = rx.recv() => match next {
                    Some(n) => self.deliver(&n).await,
                    None => break,
                },
            }
        }

        tracing::info!("Notification worker stopped");
    }

    async fn deliver(&self, n: &Notification) {
        match self.notifier.deliver(n).await {
            Ok(true) => {
                tracing::debug!(recipient_id = n.recipient_id, kind = n.kind.type_name(), "Notification delivered");
            }
            Ok(false) => {
                tracing::debug!(
                    recipient_id = n.recipient_id,
                    kind = n.kind.type_name(),
                    dedup_key = ?n.dedup_key,
                    "Duplicate notification suppressed"
                );
            }
            Err(e) => {
                tracing::warn!(
                    recipient_id = n.recipient_id,
                    kind = n.kind.type_name(),
                    error = %e,
                    "Notification delivery failed"
                );
            }
        }
    }
}
