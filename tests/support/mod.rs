//! 测试用的进程内 Broker：出站缓冲在 flush 时投递到入站队列

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;
use prediction_relay::domain::repository::{DeliveryReport, InboundChannel, OutboundChannel, ResultStore};
use prediction_relay::infrastructure::persistence::InMemoryResultStore;
use prediction_relay::{InboundMessage, RelayError, RelayResult, ResultRow};
use tokio::sync::{Mutex, mpsc};

pub const TOPIC: &str = "predictions";
pub const WARM_UP: Duration = Duration::from_millis(50);

/// 主题的写入端，同时供测试注入原始消息
#[derive(Clone)]
pub struct TopicHandle {
    tx: mpsc::UnboundedSender<InboundMessage>,
    next_offset: Arc<AtomicI64>,
}

impl TopicHandle {
    pub fn inject_raw(&self, payload: &[u8]) {
        self.deliver(Some(payload.to_vec()));
    }

    fn deliver(&self, payload: Option<Vec<u8>>) {
        let offset = self.next_offset.fetch_add(1, Ordering::SeqCst);
        let _ = self.tx.send(InboundMessage {
            topic: TOPIC.to_string(),
            partition: 0,
            offset,
            payload,
        });
    }
}

pub struct LoopbackOutbound {
    topic: TopicHandle,
    buffered: StdMutex<Vec<Vec<u8>>>,
    ack_delay: Duration,
    time_out_submits: bool,
}

impl LoopbackOutbound {
    /// 之后的提交都按超时处理
    pub fn timing_out(mut self) -> Self {
        self.time_out_submits = true;
        self
    }
}

#[async_trait]
impl OutboundChannel for LoopbackOutbound {
    async fn submit(&self, topic: &str, payload: Vec<u8>) -> RelayResult<DeliveryReport> {
        if self.time_out_submits {
            return Err(RelayError::PublishTimeout {
                topic: topic.to_string(),
                message: "simulated queue timeout".to_string(),
            });
        }
        self.buffered.lock().unwrap().push(payload);
        Ok(async { Ok(()) }.boxed())
    }

    async fn flush(&self) -> RelayResult<()> {
        tokio::time::sleep(self.ack_delay).await;
        let pending: Vec<Vec<u8>> = std::mem::take(&mut *self.buffered.lock().unwrap());
        for payload in pending {
            self.topic.deliver(Some(payload));
        }
        Ok(())
    }
}

pub struct LoopbackInbound {
    rx: Mutex<mpsc::UnboundedReceiver<InboundMessage>>,
}

#[async_trait]
impl InboundChannel for LoopbackInbound {
    fn topic(&self) -> &str {
        TOPIC
    }

    async fn recv(&self) -> RelayResult<InboundMessage> {
        self.rx
            .lock()
            .await
            .recv()
            .await
            .ok_or_else(|| RelayError::Receive {
                topic: TOPIC.to_string(),
                message: "topic closed".to_string(),
            })
    }
}

pub fn loopback(ack_delay: Duration) -> (LoopbackOutbound, LoopbackInbound, TopicHandle) {
    let (tx, rx) = mpsc::unbounded_channel();
    let handle = TopicHandle {
        tx,
        next_offset: Arc::new(AtomicI64::new(0)),
    };
    (
        LoopbackOutbound {
            topic: handle.clone(),
            buffered: StdMutex::new(Vec::new()),
            ack_delay,
            time_out_submits: false,
        },
        LoopbackInbound { rx: Mutex::new(rx) },
        handle,
    )
}

pub async fn ready_store() -> Arc<InMemoryResultStore> {
    let store = Arc::new(InMemoryResultStore::new());
    store.ensure_schema().await.unwrap();
    store
}

/// 轮询直到存储中至少有 `count` 行
pub async fn wait_for_rows(store: &InMemoryResultStore, count: usize) -> Vec<ResultRow> {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let rows = store.fetch_all().await.unwrap();
        if rows.len() >= count {
            return rows;
        }
        if tokio::time::Instant::now() >= deadline {
            panic!("expected {count} rows, found {}", rows.len());
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
