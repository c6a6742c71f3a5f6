//! Offer Engine - 报价协商与商品预留引擎
//!
//! # 架构概述
//!
//! - **报价状态机** (`offers`): 创建、接受、拒绝、还价、撤回、过期
//! - **预留管理** (`reservations`): 接受报价后锁定商品，完成/取消/延期/过期
//! - **到期调度** (`scheduler`): 四个独立 sweep，周期运行
//! - **活动与通知** (`fanout`): 活动日志 + 异步通知投递
//! - **数据库** (`db`): SQLite (sqlx)，所有状态迁移都是带条件的 UPDATE
//!
//! # 模块结构
//!
//! ```text
//! offer-engine/src/
//! ├── core/          # 配置、状态、时钟、错误、后台任务
//! ├── db/            # 连接池、迁移、仓储
//! ├── offers/        # 报价状态机
//! ├── reservations/  # 预留管理
//! ├── scheduler/     # 到期调度器
//! ├── fanout/        # 活动日志与通知
//! └── utils/         # 日志
//! ```

pub mod core;
pub mod db;
pub mod fanout;
pub mod offers;
pub mod reservations;
pub mod scheduler;
pub mod utils;

// Re-export 公共类型
pub use core::{BackgroundTasks, Clock, Config, EngineState, ManualClock, NegotiationPolicy, SystemClock};
pub use offers::OfferStateMachine;
pub use reservations::ReservationManager;
pub use scheduler::{ExpiryScheduler, SweepKind, SweepReport};

// Re-export unified error types from shared
pub use shared::error::{AppError, AppResult, ErrorCategory, ErrorCode};

// Re-export logger functions
pub use utils::logger::{cleanup_old_logs, init_logger, init_logger_with_file};

/// 准备运行环境：工作目录 + 日志
///
/// `.env` 需在读取 [`Config`] 之前由调用方加载。
pub fn setup_environment(config: &Config) -> anyhow::Result<()> {
    config.ensure_work_dir_structure()?;
    let log_dir = config.log_dir();
    init_logger_with_file(&config.log_level, config.log_json, Some(&log_dir))?;
    Ok(())
}

pub fn print_banner() {
    println!(
        r#"
  ___   __  __
 / _ \ / _|/ _| ___ _ __
| | | | |_| |_ / _ \ '__|
| |_| |  _|  _|  __/ |
 \___/|_| |_|  \___|_|   engine
    "#
    );
}
