//! 后台任务管理
//!
//! - [`TaskKind::Worker`] - 通道消费者 (通知投递)
//! - [`TaskKind::Periodic`] - 定时任务 (过期扫描)
//!
//! Every task is wrapped so a panic is logged instead of silently killing the
//! task, and all tasks observe one [`CancellationToken`] for shutdown.

use futures::FutureExt;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    Worker,
    Periodic,
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskKind::Worker => write!(f, "Worker"),
            TaskKind::Periodic => write!(f, "Periodic"),
        }
    }
}

struct RegisteredTask {
    name: &'static str,
    kind: TaskKind,
    handle: JoinHandle<()>,
}

/// 后台任务管理器
pub struct BackgroundTasks {
    tasks: Vec<RegisteredTask>,
    shutdown: CancellationToken,
}

/// Best-effort text of a panic payload
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic".to_string()
    }
}

impl BackgroundTasks {
    pub fn new() -> Self {
        Self::with_token(CancellationToken::new())
    }

    /// Share an existing token, e.g. one already handed to a worker
    pub fn with_token(shutdown: CancellationToken) -> Self {
        Self {
            tasks: Vec::new(),
            shutdown,
        }
    }

    /// 获取取消令牌（用于任务内部监听 shutdown 信号）
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// 注册并启动一个后台任务
    pub fn spawn<F>(&mut self, name: &'static str, kind: TaskKind, future: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let shutdown = self.shutdown.clone();
        let wrapped = async move {
            match AssertUnwindSafe(future).catch_unwind().await {
                Ok(()) if shutdown.is_cancelled() => {
                    tracing::debug!(task = %name, kind = %kind, "Background task stopped");
                }
                Ok(()) => {
                    tracing::warn!(task = %name, kind = %kind, "Background task completed unexpectedly");
                }
                Err(payload) => {
                    tracing::error!(
                        target: "alert",
                        task = %name,
                        kind = %kind,
                        panic = %panic_message(payload.as_ref()),
                        "Background task panicked"
                    );
                }
            }
        };

        let handle = tokio::spawn(wrapped);
        tracing::debug!(task = %name, kind = %kind, "Registered background task");
        self.tasks.push(RegisteredTask { name, kind, handle });
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn log_summary(&self) {
        let workers = self
            .tasks
            .iter()
            .filter(|t| t.kind == TaskKind::Worker)
            .count();
        tracing::info!(
            total = self.tasks.len(),
            workers,
            periodic = self.tasks.len() - workers,
            "Background tasks registered"
        );
    }

    /// 返回已意外结束的任务数量
    pub fn check_health(&self) -> usize {
        let finished: Vec<&RegisteredTask> =
            self.tasks.iter().filter(|t| t.handle.is_finished()).collect();
        for task in &finished {
            tracing::error!(task = %task.name, kind = %task.kind, "Background task is no longer running");
        }
        finished.len()
    }

    /// Graceful shutdown: cancel, then wait up to `grace` for every task
    pub async fn shutdown(self, grace: Duration) {
        tracing::info!("Shutting down {} background tasks...", self.tasks.len());
        self.shutdown.cancel();

        for task in self.tasks {
            let name = task.name;
            let abort = task.handle.abort_handle();
            match tokio::time::timeout(grace, task.handle).await {
                Ok(Ok(())) => tracing::debug!(task = %name, "Task completed"),
                Ok(Err(e)) => tracing::error!(task = %name, error = ?e, "Task join failed"),
                Err(_) => {
                    tracing::warn!(task = %name, "Task did not stop in time, aborting");
                    abort.abort();
                }
            }
        }

        tracing::info!("All background tasks stopped");
    }
}

impl Default for BackgroundTasks {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_shutdown_stops_cancellable_task() {
        let mut tasks = BackgroundTasks::new();
        let token = tasks.shutdown_token();
        tasks.spawn("waiter", TaskKind::Worker, async move {
            token.cancelled().await;
        });
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks.check_health(), 0);
        tasks.shutdown(Duration::from_secs(1)).await;
    }

    #[tokio::test]
    async fn test_panicking_task_is_contained() {
        let mut tasks = BackgroundTasks::new();
        tasks.spawn("boom", TaskKind::Periodic, async {
            panic!("sweep exploded");
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(tasks.check_health(), 1);
        tasks.shutdown(Duration::from_secs(1)).await;
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn std::any::Any + Send> = Box::new("static");
        assert_eq!(panic_message(payload.as_ref()), "static");
        let payload: Box<dyn std::any::Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(payload.as_ref()), "owned");
        let payload: Box<dyn std::any::Any + Send> = Box::new(7u8);
        assert_eq!(panic_message(payload.as_ref()), "Unknown panic");
    }
}
