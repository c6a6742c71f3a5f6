use crate::core::clock::{SharedClock, SystemClock};
use crate::core::config::Config;
use crate::core::error::ServiceError;
use crate::core::tasks::{BackgroundTasks, TaskKind};
use crate::db::DbService;
use crate::db::repository::listing;
use crate::fanout::{ActivityRecorder, FanOut, NotificationDispatcher, NotificationWorker, StoreNotifier};
use crate::offers::OfferStateMachine;
use crate::reservations::ReservationManager;
use crate::scheduler::ExpiryScheduler;
use shared::error::{AppError, AppResult, ErrorCode};
use shared::models::Listing;
use shared::notification::Notification;
use std::sync::Arc;
use tokio::sync::mpsc;

/// 引擎状态 - 持有所有服务的共享引用
///
/// 所有服务内部只持有连接池和 Arc，clone 成本很低。
///
/// | 字段 | 说明 |
/// |------|------|
/// | config | 配置项 (不可变) |
/// | db | SQLite 连接池 |
/// | clock | 时间源，测试中替换为 `ManualClock` |
/// | fanout | 活动日志 + 通知分发 |
/// | offers | 报价状态机 |
/// | reservations | 预留管理 |
/// | scheduler | 到期调度器 |
#[derive(Debug, Clone)]
pub struct EngineState {
    pub config: Config,
    pub db: DbService,
    pub clock: SharedClock,
    pub fanout: FanOut,
    pub offers: OfferStateMachine,
    pub reservations: ReservationManager,
    pub scheduler: ExpiryScheduler,
}

impl EngineState {
    /// Wire every service onto one pool and one clock.
    ///
    /// Returns the receiving end of the notification channel; hand it to
    /// [`start_background_tasks`](Self::start_background_tasks) or drain it directly.
    pub fn build(
        config: Config,
        db: DbService,
        clock: SharedClock,
    ) -> (Self, mpsc::Receiver<Notification>) {
        let (dispatcher, notifications) = NotificationDispatcher::new(config.notification_buffer);
        let pool = db.pool.clone();
        let policy = config.policy.clone();

        let fanout = FanOut::new(ActivityRecorder::new(pool.clone(), clock.clone()), dispatcher);
        let reservations =
            ReservationManager::new(pool.clone(), clock.clone(), policy.clone(), fanout.clone());
        let offers = OfferStateMachine::new(
            pool.clone(),
            clock.clone(),
            policy.clone(),
            fanout.clone(),
            reservations.clone(),
        );
        let scheduler = ExpiryScheduler::new(
            pool,
            clock.clone(),
            policy,
            fanout.clone(),
            offers.clone(),
            reservations.clone(),
            config.sweep_interval(),
        );

        let state = Self {
            config,
            db,
            clock,
            fanout,
            offers,
            reservations,
            scheduler,
        };
        (state, notifications)
    }

    /// 初始化引擎状态
    ///
    /// 按顺序初始化：
    /// 1. 工作目录结构
    /// 2. 数据库 (work_dir/database/offers.db，或 DATABASE_PATH)
    /// 3. 各服务
    pub async fn initialize(config: &Config) -> AppResult<(Self, mpsc::Receiver<Notification>)> {
        config.ensure_work_dir_structure().map_err(|e| {
            AppError::with_message(
                ErrorCode::ConfigError,
                format!("Failed to create work directory structure: {e}"),
            )
        })?;

        let db_path = config.database_file();
        let db = DbService::new(&db_path.to_string_lossy()).await?;
        Ok(Self::build(config.clone(), db, Arc::new(SystemClock)))
    }

    /// Engine over a private in-memory database
    pub async fn in_memory(
        config: Config,
        clock: SharedClock,
    ) -> AppResult<(Self, mpsc::Receiver<Notification>)> {
        let db = DbService::in_memory().await?;
        Ok(Self::build(config, db, clock))
    }

    /// 启动后台任务
    ///
    /// - 通知投递 Worker (StoreNotifier)
    /// - 到期调度器
    pub fn start_background_tasks(
        &self,
        tasks: &mut BackgroundTasks,
        notifications: mpsc::Receiver<Notification>,
    ) {
        let notifier = Arc::new(StoreNotifier::new(self.db.pool.clone(), self.clock.clone()));
        let worker = NotificationWorker::new(notifier, tasks.shutdown_token());
        tasks.spawn("notification_worker", TaskKind::Worker, worker.run(notifications));

        let scheduler = self.scheduler.clone();
        let shutdown = tasks.shutdown_token();
        tasks.spawn("expiry_scheduler", TaskKind::Periodic, scheduler.run(shutdown));

        tasks.log_summary();
    }

    /// Listing as the engine currently sees it
    pub async fn listing(&self, listing_id: i64) -> AppResult<Option<Listing>> {
        Ok(listing::find_by_id(&self.db.pool, listing_id)
            .await
            .map_err(ServiceError::from)?)
    }
}
