//! 核心模块 - 配置、状态、时钟、错误和后台任务
//!
//! # 模块结构
//!
//! - [`Config`] - 引擎配置
//! - [`EngineState`] - 引擎状态
//! - [`Clock`] - 时间源
//! - [`ServiceError`] - 服务层错误
//! - [`BackgroundTasks`] - 后台任务管理

pub mod clock;
pub mod config;
pub mod error;
pub mod state;
pub mod tasks;

pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use config::{Config, NegotiationPolicy};
pub use error::{ServiceError, ServiceResult};
pub use state::EngineState;
pub use tasks::{BackgroundTasks, TaskKind};
