use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::domain::model::{PredictionRecord, SendOutcome};
use crate::domain::repository::{InboundChannel, MessageListener, OutboundChannel};
use crate::error::{RelayError, RelayResult};
use crate::infrastructure::messaging::producer::PredictionProducer;
use crate::interface::messaging::consumer::PredictionConsumer;
use crate::metrics::RelayMetrics;

/// Broker 客户端状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum BrokerState {
    Connected = 0,
    Listening = 1,
    Closing = 2,
    Closed = 3,
}

impl BrokerState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Connected,
            1 => Self::Listening,
            2 => Self::Closing,
            _ => Self::Closed,
        }
    }

    fn accepts_work(self) -> bool {
        matches!(self, Self::Connected | Self::Listening)
    }
}

/// 单主题 Broker 客户端
///
/// 由生产者与消费者两个子对象组成，各自持有独立连接。构造完成即处于 `Connected`，
/// 第一次注册监听器后进入 `Listening`，`shutdown` 经 `Closing` 到达 `Closed`。
pub struct BrokerClient<P, C> {
    topic: String,
    producer: PredictionProducer<P>,
    consumer: PredictionConsumer<C>,
    state: AtomicU8,
    shutdown_tx: watch::Sender<bool>,
    /// 到达 `Closed` 后置为 `true`
    closed_tx: watch::Sender<bool>,
    listeners: Mutex<Vec<JoinHandle<()>>>,
}

impl<P: OutboundChannel, C: InboundChannel> BrokerClient<P, C> {
    pub fn new(
        producer: PredictionProducer<P>,
        consumer: PredictionConsumer<C>,
    ) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        let (closed_tx, _) = watch::channel(false);
        Self {
            topic: consumer.topic().to_string(),
            producer,
            consumer,
            state: AtomicU8::new(BrokerState::Connected as u8),
            shutdown_tx,
            closed_tx,
            listeners: Mutex::new(Vec::new()),
        }
    }

    /// 由两条已建立的通道构造
    pub fn from_channels(
        outbound: P,
        inbound: C,
        warm_up_poll: std::time::Duration,
        metrics: Arc<RelayMetrics>,
    ) -> Self {
        Self::new(
            PredictionProducer::new(outbound, Arc::clone(&metrics)),
            PredictionConsumer::new(inbound, warm_up_poll, metrics),
        )
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn state(&self) -> BrokerState {
        BrokerState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// 发布一条预测结果，返回前阻塞刷新生产者缓冲区
    pub async fn send(&self, record: &PredictionRecord) -> SendOutcome {
        if !self.state().accepts_work() {
            warn!(topic = %self.topic, "send called on closed broker client");
            return SendOutcome::Rejected(RelayError::ClientClosed.to_string());
        }
        self.producer.send(&self.topic, record).await
    }

    /// 注册监听器并启动一个独立的后台消费任务
    ///
    /// 重复注册会启动第二个读取同一消息流的循环，这里只记录告警。
    pub fn register_listener<L: MessageListener>(&self, listener: L) -> RelayResult<()> {
        let previous = self
            .state
            .compare_exchange(
                BrokerState::Connected as u8,
                BrokerState::Listening as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .unwrap_or_else(|current| current);

        match BrokerState::from_u8(previous) {
            BrokerState::Connected => {}
            BrokerState::Listening => warn!(
                topic = %self.topic,
                "Registering an additional listener; it will read the same stream independently"
            ),
            BrokerState::Closing | BrokerState::Closed => return Err(RelayError::ClientClosed),
        }

        let handle = self.consumer.spawn(listener, self.shutdown_tx.subscribe());
        self.lock_listeners().push(handle);
        info!(topic = %self.topic, "Started a background consumer task");
        Ok(())
    }

    /// 正在运行的监听任务数
    pub fn listener_count(&self) -> usize {
        self.lock_listeners()
            .iter()
            .filter(|handle| !handle.is_finished())
            .count()
    }

    /// 通知所有监听循环退出并等待其结束
    ///
    /// 只有第一次调用负责停止循环；并发或之后的调用等到状态变为 `Closed` 才返回。
    pub async fn shutdown(&self) {
        let mut current = self.state.load(Ordering::SeqCst);
        loop {
            match BrokerState::from_u8(current) {
                BrokerState::Closed => return,
                BrokerState::Closing => {
                    let mut closed = self.closed_tx.subscribe();
                    let _ = closed.wait_for(|closed| *closed).await;
                    return;
                }
                BrokerState::Connected | BrokerState::Listening => {}
            }
            match self.state.compare_exchange(
                current,
                BrokerState::Closing as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }

        info!(topic = %self.topic, "Shutting down broker client");
        self.shutdown_tx.send_replace(true);

        let handles: Vec<JoinHandle<()>> = std::mem::take(&mut *self.lock_listeners());
        for handle in handles {
            if let Err(err) = handle.await {
                error!(topic = %self.topic, error = %err, "Consumer task terminated abnormally");
            }
        }

        self.state.store(BrokerState::Closed as u8, Ordering::SeqCst);
        self.closed_tx.send_replace(true);
        info!(topic = %self.topic, "Broker client closed");
    }

    fn lock_listeners(&self) -> std::sync::MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.listeners
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
