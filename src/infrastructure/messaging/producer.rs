use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::domain::model::{PredictionRecord, SendOutcome};
use crate::domain::repository::OutboundChannel;
use crate::error::RelayError;
use crate::metrics::RelayMetrics;

/// 预测结果发布器（Broker 客户端的生产者一侧）
pub struct PredictionProducer<P> {
    channel: P,
    metrics: Arc<RelayMetrics>,
}

impl<P: OutboundChannel> PredictionProducer<P> {
    pub fn new(channel: P, metrics: Arc<RelayMetrics>) -> Self {
        Self { channel, metrics }
    }

    /// 编码、提交并阻塞刷新
    ///
    /// 提交超时只记录告警，随后仍执行刷新；调用方从不收到错误，只收到 `SendOutcome`。
    pub async fn send(&self, topic: &str, record: &PredictionRecord) -> SendOutcome {
        let started = Instant::now();
        let outcome = self.publish(topic, record).await;
        self.metrics
            .record_send(&outcome, started.elapsed().as_secs_f64());
        outcome
    }

    async fn publish(&self, topic: &str, record: &PredictionRecord) -> SendOutcome {
        info!(
            topic = %topic,
            round = %record.round,
            air_date_group = %record.air_date_group,
            value = record.value,
            "Publishing prediction"
        );

        let payload = match serde_json::to_vec(record) {
            Ok(payload) => payload,
            Err(err) => {
                warn!(topic = %topic, error = %err, "Failed to encode prediction");
                return SendOutcome::Rejected(err.to_string());
            }
        };

        let submitted = self.channel.submit(topic, payload).await;
        match &submitted {
            Err(err @ RelayError::PublishTimeout { .. }) => {
                warn!(topic = %topic, error = %err, "Timeout while sending to kafka");
            }
            Err(err) => warn!(topic = %topic, error = %err, "Kafka rejected prediction"),
            Ok(_) => {}
        }

        // 无论提交是否成功都刷新，确保此前缓冲的消息全部送达 Broker
        let flushed = self.channel.flush().await;
        if let Err(err) = &flushed {
            warn!(topic = %topic, error = %err, "Failed to flush kafka producer");
        }

        let report = match submitted {
            Ok(report) => report,
            Err(RelayError::PublishTimeout { .. }) => return SendOutcome::TimedOut,
            Err(err) => return SendOutcome::Rejected(err.to_string()),
        };
        if flushed.is_err() {
            return SendOutcome::TimedOut;
        }

        match report.await {
            Ok(()) => {
                debug!(topic = %topic, "Prediction acknowledged by broker");
                SendOutcome::Acknowledged
            }
            Err(err @ RelayError::PublishTimeout { .. }) => {
                warn!(topic = %topic, error = %err, "Prediction delivery timed out");
                SendOutcome::TimedOut
            }
            Err(err) => {
                warn!(topic = %topic, error = %err, "Prediction delivery failed");
                SendOutcome::Rejected(err.to_string())
            }
        }
    }
}
