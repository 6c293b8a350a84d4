//! 依赖装配
//!
//! 启动时按依赖顺序构建存储与 Broker 客户端，再把中继监听器注入客户端；不使用全局单例。

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use crate::config::RelayAppConfig;
use crate::domain::repository::{InboundChannel, OutboundChannel, ResultStore};
use crate::error::RelayResult;
use crate::infrastructure::messaging::{KafkaInboundChannel, KafkaOutboundChannel};
use crate::infrastructure::persistence::PostgresResultStore;
use crate::interface::messaging::{BrokerClient, PredictionRelay};
use crate::metrics::RelayMetrics;

pub type KafkaBrokerClient = BrokerClient<KafkaOutboundChannel, KafkaInboundChannel>;

/// 应用上下文 - 包含所有已初始化的组件
pub struct ApplicationContext {
    pub config: Arc<RelayAppConfig>,
    pub metrics: Arc<RelayMetrics>,
    pub store: Arc<PostgresResultStore>,
    pub broker: Arc<KafkaBrokerClient>,
}

/// 把中继监听器注册到 Broker 客户端：每条入站预测都写入存储
pub fn attach_relay<P, C, S>(
    broker: &BrokerClient<P, C>,
    store: Arc<S>,
    metrics: Arc<RelayMetrics>,
) -> RelayResult<()>
where
    P: OutboundChannel,
    C: InboundChannel,
    S: ResultStore,
{
    broker.register_listener(PredictionRelay::new(store, metrics))
}

/// 构建应用上下文
///
/// 任何连接失败都直接返回错误，进程不应继续。
pub async fn initialize(config: RelayAppConfig) -> Result<ApplicationContext> {
    let config = Arc::new(config);

    // 1. 指标
    let metrics = Arc::new(RelayMetrics::new());

    // 2. 存储
    let store = Arc::new(
        PostgresResultStore::connect(&config.postgres.connect_options(), config.postgres.address())
            .await
            .context("Failed to connect to PostgreSQL")?,
    );
    if config.relay.reset_schema {
        store
            .drop_schema()
            .await
            .context("Failed to drop results table")?;
    }
    store
        .ensure_schema()
        .await
        .context("Failed to create results table")?;

    // 3. Kafka 生产者与消费者（两条独立连接）
    let outbound = KafkaOutboundChannel::connect(&config.kafka)
        .await
        .context("Failed to create Kafka producer")?;
    let inbound = KafkaInboundChannel::connect(&config.kafka)
        .await
        .context("Failed to create Kafka consumer")?;

    let broker = Arc::new(BrokerClient::from_channels(
        outbound,
        inbound,
        config.kafka.warm_up_poll(),
        Arc::clone(&metrics),
    ));

    // 4. 中继
    attach_relay(&*broker, Arc::clone(&store), Arc::clone(&metrics))
        .context("Failed to register relay listener")?;

    info!(topic = %broker.topic(), "Prediction relay wired");

    Ok(ApplicationContext {
        config,
        metrics,
        store,
        broker,
    })
}
