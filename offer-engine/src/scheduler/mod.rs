//! Expiry Scheduler
//!
//! 周期性驱动四个相互独立的 sweep：
//! 1. 过期 pending 报价
//! 2. 过期 active 预留
//! 3. 24 小时内到期报价提醒（只读，按 dedup key 去重）
//! 4. 归档终态记录（最多每个归档周期一次）
//!
//! 每个 sweep 单独捕获 panic，一个失败不会影响其他 sweep。

mod expiry;
mod report;

pub use expiry::{ExpiryScheduler, reminder_dedup_key};
pub use report::{SweepKind, SweepReport, SweepResult};
