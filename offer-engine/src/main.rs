use offer_engine::{BackgroundTasks, Config, EngineState, print_banner, setup_environment};
use std::time::Duration;

/// 关闭时等待后台任务的最长时间
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);
const HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. 加载 .env 和配置
    dotenv::dotenv().ok();
    let config = Config::from_env();

    // 2. 设置环境 (工作目录, 日志)
    setup_environment(&config)?;

    print_banner();
    tracing::info!(
        environment = %config.environment,
        work_dir = %config.work_dir,
        sweep_interval_secs = config.sweep_interval_secs,
        "Offer engine starting..."
    );

    // 3. 初始化引擎状态
    let (state, notifications) = EngineState::initialize(&config).await?;

    // 4. 启动后台任务
    let mut tasks = BackgroundTasks::new();
    state.start_background_tasks(&mut tasks, notifications);

    // 5. 等待 Ctrl-C
    let mut health = tokio::time::interval(HEALTH_CHECK_INTERVAL);
    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                if let Err(e) = signal {
                    tracing::error!(error = %e, "Failed to listen for shutdown signal");
                }
                break;
            }
            _ = health.tick() => {
                tasks.check_health();
            }
        }
    }

    tracing::info!("Shutdown signal received");
    tasks.shutdown(SHUTDOWN_GRACE).await;
    state.db.pool.close().await;
    tracing::info!("Offer engine stopped");
    Ok(())
}
