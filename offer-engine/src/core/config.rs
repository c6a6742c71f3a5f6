use shared::util::{DAY_MILLIS, HOUR_MILLIS, MINUTE_MILLIS};
use std::path::PathBuf;
use std::time::Duration;

/// 引擎配置
///
/// # 环境变量
///
/// | 环境变量 | 默认值 | 说明 |
/// |----------|--------|------|
/// | WORK_DIR | ./work_dir | 工作目录 (数据库、日志) |
/// | DATABASE_PATH | {WORK_DIR}/database/offers.db | SQLite 文件 |
/// | ENVIRONMENT | development | 运行环境 |
/// | LOG_LEVEL | info | 日志级别 |
/// | LOG_JSON | production 时为 true | JSON 日志 |
/// | SWEEP_INTERVAL_SECS | 900 | 过期扫描间隔 |
/// | NOTIFICATION_BUFFER | 1024 | 通知通道容量 |
///
/// 协商策略见 [`NegotiationPolicy`]。
#[derive(Debug, Clone)]
pub struct Config {
    /// 工作目录，存储数据库、日志等文件
    pub work_dir: String,
    /// 数据库路径 (未设置时位于 work_dir/database 下)
    pub database_path: Option<String>,
    /// 运行环境: development | staging | production
    pub environment: String,
    pub log_level: String,
    pub log_json: bool,
    /// 过期扫描间隔 (秒)
    pub sweep_interval_secs: u64,
    /// 通知通道容量
    pub notification_buffer: usize,
    pub policy: NegotiationPolicy,
}

/// Time windows and limits of the negotiation workflow
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NegotiationPolicy {
    /// Lifetime of a buyer's opening offer
    pub offer_ttl_hours: i64,
    /// Lifetime of a counter-offer
    pub counter_ttl_hours: i64,
    /// Default reservation window after accept
    pub reservation_hours: i64,
    /// Default extension granted by `extend_reservation`
    pub extension_hours: i64,
    /// A listing whose reservation ended this recently cannot be re-reserved
    pub cooldown_minutes: i64,
    /// Pending offers expiring within this window get a reminder
    pub reminder_window_hours: i64,
    /// Terminal rows older than this are archived
    pub archive_retention_days: i64,
    /// Archive sweep runs at most this often
    pub archive_interval_days: i64,
    /// Upper bound of rows one sweep processes
    pub sweep_batch_limit: i64,
    /// Opening offers one buyer may make on one listing
    pub offer_attempt_limit: i64,
}

impl Default for NegotiationPolicy {
    fn default() -> Self {
        Self {
            offer_ttl_hours: 72,
            counter_ttl_hours: 72,
            reservation_hours: 48,
            extension_hours: 24,
            cooldown_minutes: 60,
            reminder_window_hours: 24,
            archive_retention_days: 180,
            archive_interval_days: 7,
            sweep_batch_limit: 500,
            offer_attempt_limit: 3,
        }
    }
}

impl NegotiationPolicy {
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            offer_ttl_hours: env_or("OFFER_TTL_HOURS", d.offer_ttl_hours),
            counter_ttl_hours: env_or("COUNTER_TTL_HOURS", d.counter_ttl_hours),
            reservation_hours: env_or("RESERVATION_HOURS", d.reservation_hours),
            extension_hours: env_or("RESERVATION_EXTENSION_HOURS", d.extension_hours),
            cooldown_minutes: env_or("RESERVATION_COOLDOWN_MINUTES", d.cooldown_minutes),
            reminder_window_hours: env_or("REMINDER_WINDOW_HOURS", d.reminder_window_hours),
            archive_retention_days: env_or("ARCHIVE_RETENTION_DAYS", d.archive_retention_days),
            archive_interval_days: env_or("ARCHIVE_INTERVAL_DAYS", d.archive_interval_days),
            sweep_batch_limit: env_or("SWEEP_BATCH_LIMIT", d.sweep_batch_limit),
            offer_attempt_limit: env_or("OFFER_ATTEMPT_LIMIT", d.offer_attempt_limit),
        }
    }

    pub fn offer_ttl_millis(&self) -> i64 {
        self.offer_ttl_hours * HOUR_MILLIS
    }

    pub fn counter_ttl_millis(&self) -> i64 {
        self.counter_ttl_hours * HOUR_MILLIS
    }

    pub fn cooldown_millis(&self) -> i64 {
        self.cooldown_minutes * MINUTE_MILLIS
    }

    pub fn reminder_window_millis(&self) -> i64 {
        self.reminder_window_hours * HOUR_MILLIS
    }

    pub fn archive_retention_millis(&self) -> i64 {
        self.archive_retention_days * DAY_MILLIS
    }

    pub fn archive_interval_millis(&self) -> i64 {
        self.archive_interval_days * DAY_MILLIS
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Config {
    /// 从环境变量加载配置
    ///
    /// 如果环境变量未设置，使用默认值
    pub fn from_env() -> Self {
        let environment =
            std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".into());
        let is_production = environment == "production";
        Self {
            work_dir: std::env::var("WORK_DIR").unwrap_or_else(|_| "./work_dir".into()),
            database_path: std::env::var("DATABASE_PATH").ok(),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".into()),
            log_json: env_or("LOG_JSON", is_production),
            environment,
            sweep_interval_secs: env_or("SWEEP_INTERVAL_SECS", 900),
            notification_buffer: env_or("NOTIFICATION_BUFFER", 1024),
            policy: NegotiationPolicy::from_env(),
        }
    }

    /// 使用自定义工作目录覆盖配置
    ///
    /// 常用于测试场景
    pub fn with_work_dir(work_dir: impl Into<String>) -> Self {
        let mut config = Self::from_env();
        config.work_dir = work_dir.into();
        config.database_path = None;
        config
    }

    pub fn database_dir(&self) -> PathBuf {
        PathBuf::from(&self.work_dir).join("database")
    }

    pub fn log_dir(&self) -> PathBuf {
        PathBuf::from(&self.work_dir).join("logs")
    }

    pub fn database_file(&self) -> PathBuf {
        match &self.database_path {
            Some(path) => PathBuf::from(path),
            None => self.database_dir().join("offers.db"),
        }
    }

    /// 创建工作目录结构
    pub fn ensure_work_dir_structure(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(self.database_dir())?;
        std::fs::create_dir_all(self.log_dir())?;
        if let Some(parent) = self.database_file().parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(())
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }

    /// 是否生产环境
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_defaults() {
        let p = NegotiationPolicy::default();
        assert_eq!(p.offer_ttl_millis(), 72 * HOUR_MILLIS);
        assert_eq!(p.reservation_hours, 48);
        assert_eq!(p.cooldown_millis(), HOUR_MILLIS);
        assert_eq!(p.archive_retention_millis(), 180 * DAY_MILLIS);
        assert_eq!(p.offer_attempt_limit, 3);
    }

    #[test]
    fn test_database_file_under_work_dir() {
        let config = Config::with_work_dir("/tmp/engine");
        assert_eq!(
            config.database_file(),
            PathBuf::from("/tmp/engine/database/offers.db")
        );
        assert_eq!(config.log_dir(), PathBuf::from("/tmp/engine/logs"));
    }
}
