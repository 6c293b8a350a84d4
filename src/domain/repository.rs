//! 端口定义（Port）
//!
//! Broker 与存储各自独立失败，两者只通过 `MessageListener` 在装配层组合。

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;

use crate::domain::model::{InboundMessage, ResultRow};
use crate::error::RelayResult;

/// 单条消息的投递回执，在 `flush` 之后等待
pub type DeliveryReport = Pin<Box<dyn Future<Output = RelayResult<()>> + Send>>;

/// 出站通道（生产者连接）
#[async_trait]
pub trait OutboundChannel: Send + Sync + 'static {
    /// 把消息放入生产者缓冲区，不等待 Broker 确认
    async fn submit(&self, topic: &str, payload: Vec<u8>) -> RelayResult<DeliveryReport>;

    /// 阻塞直到此前缓冲的所有消息都被 Broker 确认
    async fn flush(&self) -> RelayResult<()>;
}

/// 入站通道（消费者连接）
#[async_trait]
pub trait InboundChannel: Send + Sync + 'static {
    fn topic(&self) -> &str;

    /// 阻塞直到下一条消息可用
    async fn recv(&self) -> RelayResult<InboundMessage>;

    /// 有界的首次拉取，用于触发分区分配
    async fn warm_up(&self, timeout: Duration) -> RelayResult<Option<InboundMessage>> {
        match tokio::time::timeout(timeout, self.recv()).await {
            Ok(received) => received.map(Some),
            Err(_) => Ok(None),
        }
    }
}

/// 每条入站消息调用一次的回调
#[async_trait]
pub trait MessageListener: Send + Sync + 'static {
    async fn on_message(&self, message: &InboundMessage) -> RelayResult<()>;
}

/// `results` 表的追加写入存储
///
/// 实现必须串行化并发写入；`close` 之后的任何操作都返回持久化错误。
#[async_trait]
pub trait ResultStore: Send + Sync + 'static {
    /// 幂等建表
    async fn ensure_schema(&self) -> RelayResult<()>;

    /// 单条参数化插入并立即提交，返回存储分配的 id
    async fn insert(
        &self,
        round: &str,
        air_date_group: &str,
        question: &str,
        value: i32,
    ) -> RelayResult<i64>;

    async fn drop_schema(&self) -> RelayResult<()>;

    /// 按 id 顺序读取全部行
    async fn fetch_all(&self) -> RelayResult<Vec<ResultRow>>;

    async fn close(&self) -> RelayResult<()>;
}
