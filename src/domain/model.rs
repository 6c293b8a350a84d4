//! 领域模型

use serde::{Deserialize, Serialize};

/// 预测结果，主题上的传输单元
///
/// 线上格式为 UTF-8 JSON，四个字段必须存在且非空；未知字段忽略。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PredictionRecord {
    pub round: String,
    pub air_date_group: String,
    pub question: String,
    pub value: i32,
}

impl PredictionRecord {
    pub fn new(
        round: impl Into<String>,
        air_date_group: impl Into<String>,
        question: impl Into<String>,
        value: i32,
    ) -> Self {
        Self {
            round: round.into(),
            air_date_group: air_date_group.into(),
            question: question.into(),
            value,
        }
    }
}

/// `results` 表中的一行，`id` 由存储分配
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultRow {
    pub id: i64,
    pub round: String,
    pub air_date_group: String,
    pub question: String,
    pub value: i32,
}

impl ResultRow {
    /// 是否与给定记录的四个业务字段一致
    pub fn matches(&self, record: &PredictionRecord) -> bool {
        self.round == record.round
            && self.air_date_group == record.air_date_group
            && self.question == record.question
            && self.value == record.value
    }
}

/// 从主题收到的一条原始消息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub payload: Option<Vec<u8>>,
}

/// `send` 的结果
///
/// 超时不会以错误形式抛给调用方，但调用方可以区分三种情况再决定是否重试。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// Broker 已确认缓冲该消息
    Acknowledged,
    /// 提交或刷新超时，消息可能丢失
    TimedOut,
    /// 消息被拒绝（序列化失败、Broker 拒绝或客户端已关闭）
    Rejected(String),
}

impl SendOutcome {
    pub fn is_acknowledged(&self) -> bool {
        matches!(self, Self::Acknowledged)
    }

    /// 指标标签
    pub fn label(&self) -> &'static str {
        match self {
            Self::Acknowledged => "acknowledged",
            Self::TimedOut => "timed_out",
            Self::Rejected(_) => "rejected",
        }
    }
}
