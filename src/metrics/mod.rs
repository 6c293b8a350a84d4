//! # Prometheus 指标收集模块
//!
//! 每个 `RelayMetrics` 持有独立的注册表，测试中的多个实例互不冲突。

use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

use crate::domain::model::SendOutcome;

/// 中继指标
pub struct RelayMetrics {
    registry: Registry,
    /// 发布总数（按结果）
    pub messages_published_total: IntCounterVec,
    /// `send` 耗时（秒，含刷新）
    pub send_duration_seconds: Histogram,
    /// 监听循环收到的消息数
    pub messages_received_total: IntCounter,
    /// 成功写入存储的消息数
    pub messages_persisted_total: IntCounter,
    /// 无法解析而丢弃的消息数
    pub messages_malformed_total: IntCounter,
    /// 写入存储失败的消息数
    pub persistence_failures_total: IntCounter,
}

impl RelayMetrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let messages_published_total = IntCounterVec::new(
            Opts::new(
                "relay_messages_published_total",
                "Total number of prediction messages published",
            ),
            &["outcome"],
        )
        .expect("Failed to create relay_messages_published_total metric");

        let send_duration_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "relay_send_duration_seconds",
                "Publish and flush duration in seconds",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
        )
        .expect("Failed to create relay_send_duration_seconds metric");

        let messages_received_total = IntCounter::new(
            "relay_messages_received_total",
            "Total number of messages received by the listener loop",
        )
        .expect("Failed to create relay_messages_received_total metric");

        let messages_persisted_total = IntCounter::new(
            "relay_messages_persisted_total",
            "Total number of prediction rows persisted",
        )
        .expect("Failed to create relay_messages_persisted_total metric");

        let messages_malformed_total = IntCounter::new(
            "relay_messages_malformed_total",
            "Total number of malformed messages dropped",
        )
        .expect("Failed to create relay_messages_malformed_total metric");

        let persistence_failures_total = IntCounter::new(
            "relay_persistence_failures_total",
            "Total number of failed inserts",
        )
        .expect("Failed to create relay_persistence_failures_total metric");

        registry
            .register(Box::new(messages_published_total.clone()))
            .expect("Failed to register relay_messages_published_total");
        registry
            .register(Box::new(send_duration_seconds.clone()))
            .expect("Failed to register relay_send_duration_seconds");
        registry
            .register(Box::new(messages_received_total.clone()))
            .expect("Failed to register relay_messages_received_total");
        registry
            .register(Box::new(messages_persisted_total.clone()))
            .expect("Failed to register relay_messages_persisted_total");
        registry
            .register(Box::new(messages_malformed_total.clone()))
            .expect("Failed to register relay_messages_malformed_total");
        registry
            .register(Box::new(persistence_failures_total.clone()))
            .expect("Failed to register relay_persistence_failures_total");

        Self {
            registry,
            messages_published_total,
            send_duration_seconds,
            messages_received_total,
            messages_persisted_total,
            messages_malformed_total,
            persistence_failures_total,
        }
    }

    pub fn record_send(&self, outcome: &SendOutcome, elapsed_seconds: f64) {
        self.messages_published_total
            .with_label_values(&[outcome.label()])
            .inc();
        self.send_duration_seconds.observe(elapsed_seconds);
    }

    pub fn published(&self, outcome: &SendOutcome) -> u64 {
        self.messages_published_total
            .with_label_values(&[outcome.label()])
            .get()
    }

    /// 以 Prometheus 文本格式导出
    pub fn render(&self) -> String {
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        if let Err(err) = encoder.encode(&self.registry.gather(), &mut buffer) {
            tracing::warn!(error = %err, "failed to encode metrics");
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

impl Default for RelayMetrics {
    fn default() -> Self {
        Self::new()
    }
}
