//! 中继错误类型
//!
//! - 启动期连接失败（Broker / 数据库）属于致命错误
//! - 发布超时、畸形消息、持久化失败属于可恢复错误，由调用边界记录日志后继续

use thiserror::Error;

use crate::domain::model::InboundMessage;

#[derive(Error, Debug)]
pub enum RelayError {
    /// 启动时无法连接 Broker 或数据库
    #[error("connection to {target} failed: {message}")]
    Connection { target: String, message: String },

    /// 生产者未能在超时时间内确认消息
    #[error("publish to topic {topic} timed out: {message}")]
    PublishTimeout { topic: String, message: String },

    /// Broker 拒绝了消息
    #[error("publish to topic {topic} rejected: {message}")]
    PublishRejected { topic: String, message: String },

    /// 运行期从 Broker 接收消息失败
    #[error("broker receive error on topic {topic}: {message}")]
    Receive { topic: String, message: String },

    /// 收到的消息无法解析为预测记录
    #[error("malformed message at {topic}[{partition}]@{offset}: {reason}")]
    MalformedMessage {
        topic: String,
        partition: i32,
        offset: i64,
        reason: String,
    },

    /// 写入存储失败
    #[error("persistence error: {message}")]
    Persistence { message: String },

    #[error("configuration error: {message}")]
    Configuration { message: String },

    /// 客户端已进入 Closing / Closed 状态
    #[error("broker client is closed")]
    ClientClosed,
}

pub type RelayResult<T> = std::result::Result<T, RelayError>;

impl RelayError {
    pub fn connection<T: Into<String>, M: Into<String>>(target: T, message: M) -> Self {
        Self::Connection {
            target: target.into(),
            message: message.into(),
        }
    }

    pub fn persistence<M: Into<String>>(message: M) -> Self {
        Self::Persistence {
            message: message.into(),
        }
    }

    pub fn config<M: Into<String>>(message: M) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// 以收到的消息坐标构造畸形消息错误
    pub fn malformed<R: Into<String>>(message: &InboundMessage, reason: R) -> Self {
        Self::MalformedMessage {
            topic: message.topic.clone(),
            partition: message.partition,
            offset: message.offset,
            reason: reason.into(),
        }
    }

    pub fn store_closed() -> Self {
        Self::persistence("result store is closed")
    }
}

impl From<sqlx::Error> for RelayError {
    fn from(err: sqlx::Error) -> Self {
        Self::persistence(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_error_carries_message_coordinates() {
        let message = InboundMessage {
            topic: "predictions".to_string(),
            partition: 2,
            offset: 17,
            payload: None,
        };
        let err = RelayError::malformed(&message, "missing field `value`");

        assert_eq!(
            err.to_string(),
            "malformed message at predictions[2]@17: missing field `value`"
        );
    }

    #[test]
    fn connection_error_names_the_target() {
        let err = RelayError::connection("kafka:9092", "broker transport failure");
        assert_eq!(
            err.to_string(),
            "connection to kafka:9092 failed: broker transport failure"
        );
        assert!(matches!(RelayError::store_closed(), RelayError::Persistence { .. }));
    }
}
