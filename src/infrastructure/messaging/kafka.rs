//! Kafka 通道实现
//!
//! 生产者与消费者是两条独立连接：生产者只被前台 `send` 使用，消费者只被后台监听循环使用。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;
use rdkafka::ClientConfig;
use rdkafka::Message;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::error::{KafkaError, RDKafkaErrorCode};
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use tracing::info;

use crate::config::KafkaClusterConfig;
use crate::domain::model::InboundMessage;
use crate::domain::repository::{DeliveryReport, InboundChannel, OutboundChannel};
use crate::error::{RelayError, RelayResult};

/// flush 作用于生产者缓冲区中的全部主题
const ALL_TOPICS: &str = "*";

fn is_timeout(err: &KafkaError) -> bool {
    matches!(
        err.rdkafka_error_code(),
        Some(
            RDKafkaErrorCode::MessageTimedOut
                | RDKafkaErrorCode::QueueFull
                | RDKafkaErrorCode::OperationTimedOut
                | RDKafkaErrorCode::RequestTimedOut
        )
    )
}

fn publish_error(topic: &str, err: &KafkaError) -> RelayError {
    if is_timeout(err) {
        RelayError::PublishTimeout {
            topic: topic.to_string(),
            message: err.to_string(),
        }
    } else {
        RelayError::PublishRejected {
            topic: topic.to_string(),
            message: err.to_string(),
        }
    }
}

/// 基于 `FutureProducer` 的出站通道
pub struct KafkaOutboundChannel {
    producer: FutureProducer,
    flush_timeout: Duration,
}

impl KafkaOutboundChannel {
    /// 创建生产者并探测主题元数据；Broker 不可达时返回连接错误
    pub async fn connect(config: &KafkaClusterConfig) -> RelayResult<Self> {
        let bootstrap = config.bootstrap();
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &bootstrap)
            .set("message.timeout.ms", config.message_timeout_ms.to_string())
            .create()
            .map_err(|err| RelayError::connection(bootstrap.clone(), err.to_string()))?;

        let probe = producer.clone();
        let topic = config.topic.clone();
        let timeout = config.metadata_timeout();
        tokio::task::spawn_blocking(move || {
            probe.client().fetch_metadata(Some(&topic), timeout).map(|_| ())
        })
        .await
        .map_err(|err| RelayError::connection(bootstrap.clone(), err.to_string()))?
        .map_err(|err| RelayError::connection(bootstrap.clone(), err.to_string()))?;

        info!(bootstrap = %bootstrap, topic = %config.topic, "Kafka producer connected");

        Ok(Self {
            producer,
            flush_timeout: config.flush_timeout(),
        })
    }
}

#[async_trait]
impl OutboundChannel for KafkaOutboundChannel {
    async fn submit(&self, topic: &str, payload: Vec<u8>) -> RelayResult<DeliveryReport> {
        let record = FutureRecord::<(), Vec<u8>>::to(topic).payload(&payload);

        let delivery = self
            .producer
            .send_result(record)
            .map_err(|(err, _)| publish_error(topic, &err))?;

        let topic = topic.to_string();
        Ok(async move {
            match delivery.await {
                Ok(Ok(_)) => Ok(()),
                Ok(Err((err, _))) => Err(publish_error(&topic, &err)),
                Err(_) => Err(RelayError::PublishRejected {
                    topic,
                    message: "delivery report canceled".to_string(),
                }),
            }
        }
        .boxed())
    }

    async fn flush(&self) -> RelayResult<()> {
        // librdkafka 的 flush 是同步阻塞调用，放到阻塞线程池执行
        let producer = self.producer.clone();
        let timeout = self.flush_timeout;
        tokio::task::spawn_blocking(move || producer.flush(timeout))
            .await
            .map_err(|err| RelayError::PublishRejected {
                topic: ALL_TOPICS.to_string(),
                message: err.to_string(),
            })?
            .map_err(|err| publish_error(ALL_TOPICS, &err))
    }
}

/// 基于 `StreamConsumer` 的入站通道
pub struct KafkaInboundChannel {
    consumer: Arc<StreamConsumer>,
    topic: String,
}

impl KafkaInboundChannel {
    /// 创建消费者、订阅主题并探测元数据；Broker 不可达时返回连接错误
    pub async fn connect(config: &KafkaClusterConfig) -> RelayResult<Self> {
        let bootstrap = config.bootstrap();
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &bootstrap)
            .set("group.id", &config.consumer_group)
            .set("auto.offset.reset", &config.auto_offset_reset)
            .set("enable.auto.commit", "true")
            .create()
            .map_err(|err| RelayError::connection(bootstrap.clone(), err.to_string()))?;

        consumer
            .subscribe(&[config.topic.as_str()])
            .map_err(|err| RelayError::connection(bootstrap.clone(), err.to_string()))?;

        let consumer = Arc::new(consumer);
        let probe = Arc::clone(&consumer);
        let topic = config.topic.clone();
        let timeout = config.metadata_timeout();
        tokio::task::spawn_blocking(move || probe.fetch_metadata(Some(&topic), timeout).map(|_| ()))
            .await
            .map_err(|err| RelayError::connection(bootstrap.clone(), err.to_string()))?
            .map_err(|err| RelayError::connection(bootstrap.clone(), err.to_string()))?;

        info!(
            bootstrap = %bootstrap,
            group = %config.consumer_group,
            topic = %config.topic,
            "Kafka consumer subscribed"
        );

        Ok(Self {
            consumer,
            topic: config.topic.clone(),
        })
    }
}

#[async_trait]
impl InboundChannel for KafkaInboundChannel {
    fn topic(&self) -> &str {
        &self.topic
    }

    async fn recv(&self) -> RelayResult<InboundMessage> {
        let message = self.consumer.recv().await.map_err(|err| RelayError::Receive {
            topic: self.topic.clone(),
            message: err.to_string(),
        })?;

        Ok(InboundMessage {
            topic: message.topic().to_string(),
            partition: message.partition(),
            offset: message.offset(),
            payload: message.payload().map(<[u8]>::to_vec),
        })
    }
}
