//! 消息到存储的中继监听器

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::domain::model::{InboundMessage, PredictionRecord};
use crate::domain::repository::{MessageListener, ResultStore};
use crate::error::{RelayError, RelayResult};
use crate::metrics::RelayMetrics;

/// 把每条入站预测消息写成 `results` 表中的一行
///
/// 解析失败返回 `MalformedMessage`，写入失败返回 `Persistence`；两者都由消费循环记录后继续。
pub struct PredictionRelay<S> {
    store: Arc<S>,
    metrics: Arc<RelayMetrics>,
}

impl<S: ResultStore> PredictionRelay<S> {
    pub fn new(store: Arc<S>, metrics: Arc<RelayMetrics>) -> Self {
        Self { store, metrics }
    }

    fn decode(message: &InboundMessage) -> RelayResult<PredictionRecord> {
        let payload = message
            .payload
            .as_deref()
            .ok_or_else(|| RelayError::malformed(message, "message has no payload"))?;

        serde_json::from_slice(payload).map_err(|err| RelayError::malformed(message, err.to_string()))
    }
}

#[async_trait]
impl<S: ResultStore> MessageListener for PredictionRelay<S> {
    async fn on_message(&self, message: &InboundMessage) -> RelayResult<()> {
        let record = Self::decode(message)?;

        info!(
            round = %record.round,
            air_date_group = %record.air_date_group,
            question = %record.question,
            value = record.value,
            "Kafka DB listener received prediction"
        );

        let id = self
            .store
            .insert(
                &record.round,
                &record.air_date_group,
                &record.question,
                record.value,
            )
            .await?;

        self.metrics.messages_persisted_total.inc();
        info!(id, offset = message.offset, "Prediction persisted");
        Ok(())
    }
}
