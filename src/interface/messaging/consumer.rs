use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::domain::model::InboundMessage;
use crate::domain::repository::{InboundChannel, MessageListener};
use crate::error::RelayError;
use crate::metrics::RelayMetrics;

/// 接收失败后的退避时间
const RECEIVE_BACKOFF: Duration = Duration::from_millis(500);

/// 预测结果消费者（Broker 客户端的消费者一侧）
///
/// 每注册一个监听器就启动一个后台任务；同一任务内回调严格串行，顺序与 Broker 投递顺序一致。
pub struct PredictionConsumer<C> {
    channel: Arc<C>,
    warm_up_poll: Duration,
    metrics: Arc<RelayMetrics>,
}

impl<C: InboundChannel> PredictionConsumer<C> {
    pub fn new(channel: C, warm_up_poll: Duration, metrics: Arc<RelayMetrics>) -> Self {
        Self {
            channel: Arc::new(channel),
            warm_up_poll,
            metrics,
        }
    }

    pub fn topic(&self) -> &str {
        self.channel.topic()
    }

    /// 启动后台消费循环，`shutdown` 变为 `true` 或发送端被丢弃时退出
    pub fn spawn<L: MessageListener>(
        &self,
        listener: L,
        shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let consume_loop = ConsumeLoop {
            channel: Arc::clone(&self.channel),
            listener,
            warm_up_poll: self.warm_up_poll,
            metrics: Arc::clone(&self.metrics),
            shutdown,
        };
        tokio::spawn(consume_loop.run())
    }
}

struct ConsumeLoop<C, L> {
    channel: Arc<C>,
    listener: L,
    warm_up_poll: Duration,
    metrics: Arc<RelayMetrics>,
    shutdown: watch::Receiver<bool>,
}

impl<C: InboundChannel, L: MessageListener> ConsumeLoop<C, L> {
    async fn run(mut self) {
        let topic = self.channel.topic().to_string();

        if *self.shutdown.borrow() {
            info!(topic = %topic, "Shutdown requested before consumer started");
            return;
        }

        info!(topic = %topic, "Started background consumer loop");

        // 首次有界拉取用于触发分区分配；拉到的消息照常交给监听器
        let warm_up = tokio::select! {
            biased;
            _ = self.shutdown.changed() => {
                info!(topic = %topic, "Consumer loop stopped during warm-up");
                return;
            }
            polled = self.channel.warm_up(self.warm_up_poll) => polled,
        };
        match warm_up {
            Ok(Some(message)) => self.dispatch(&message).await,
            Ok(None) => debug!(topic = %topic, "Warm-up poll returned no message"),
            Err(err) => warn!(topic = %topic, error = %err, "Warm-up poll failed"),
        }

        loop {
            if *self.shutdown.borrow() {
                break;
            }

            tokio::select! {
                biased;
                changed = self.shutdown.changed() => {
                    if changed.is_err() || *self.shutdown.borrow() {
                        break;
                    }
                }
                received = self.channel.recv() => match received {
                    Ok(message) => self.dispatch(&message).await,
                    Err(err) => {
                        error!(topic = %topic, error = %err, "Error receiving message from Kafka");
                        tokio::select! {
                            _ = self.shutdown.changed() => {}
                            _ = tokio::time::sleep(RECEIVE_BACKOFF) => {}
                        }
                    }
                },
            }
        }

        info!(topic = %topic, "Consumer loop stopped");
    }

    /// 单条消息处理边界：任何错误都只记录一次，不终止循环
    async fn dispatch(&self, message: &InboundMessage) {
        self.metrics.messages_received_total.inc();
        debug!(
            topic = %message.topic,
            partition = message.partition,
            offset = message.offset,
            "Received message"
        );

        let Err(err) = self.listener.on_message(message).await else {
            return;
        };

        match &err {
            RelayError::MalformedMessage { .. } => {
                self.metrics.messages_malformed_total.inc();
                error!(
                    topic = %message.topic,
                    partition = message.partition,
                    offset = message.offset,
                    error = %err,
                    "Dropping malformed message"
                );
            }
            RelayError::Persistence { .. } => {
                self.metrics.persistence_failures_total.inc();
                error!(
                    topic = %message.topic,
                    partition = message.partition,
                    offset = message.offset,
                    error = %err,
                    "Failed to persist message"
                );
            }
            _ => error!(
                topic = %message.topic,
                partition = message.partition,
                offset = message.offset,
                error = %err,
                "Listener failed"
            ),
        }
    }
}
