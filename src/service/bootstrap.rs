//! 应用启动器 - 负责启动、用例回放与优雅停机

use anyhow::Result;
use tracing::{error, info, warn};

use crate::application::{RecordedLabelClassifier, replay_fixtures_dir};
use crate::config::RelayAppConfig;
use crate::domain::repository::ResultStore;
use crate::service::wire::{self, ApplicationContext};

pub struct ApplicationBootstrap;

impl ApplicationBootstrap {
    /// 运行应用的主入口点
    pub async fn run(config: RelayAppConfig) -> Result<()> {
        let context = wire::initialize(config).await?;

        if let Some(dir) = context.config.relay.fixtures_dir.clone() {
            match replay_fixtures_dir(&dir, &RecordedLabelClassifier, &*context.broker).await {
                Ok(summary) => info!(
                    acknowledged = summary.acknowledged,
                    timed_out = summary.timed_out,
                    rejected = summary.rejected,
                    skipped = summary.skipped,
                    "Fixture replay finished"
                ),
                Err(err) => error!(error = %err, "Fixture replay failed"),
            }
        }

        info!(topic = %context.broker.topic(), "Prediction relay running, press Ctrl+C to stop");

        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "failed to listen for shutdown signal");
        } else {
            info!("shutdown signal received");
        }

        Self::graceful_shutdown(context).await;
        info!("prediction relay stopped");
        Ok(())
    }

    /// 先停止监听循环，再关闭数据库连接
    async fn graceful_shutdown(context: ApplicationContext) {
        context.broker.shutdown().await;

        if let Err(err) = context.store.close().await {
            warn!(error = %err, "failed to close result store");
        }

        info!(metrics = %context.metrics.render(), "final relay metrics");
    }
}
