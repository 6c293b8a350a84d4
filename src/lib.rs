//! Prediction Relay
//!
//! 把预测结果发布到 Kafka 主题，并由后台监听循环把主题上的每条预测写入 PostgreSQL `results` 表。

pub mod application;
pub mod config;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod interface;
pub mod logging;
pub mod metrics;
pub mod service;

pub use config::{RelayAppConfig, load_config};
pub use domain::{InboundMessage, PredictionRecord, ResultRow, SendOutcome};
pub use error::{RelayError, RelayResult};
pub use interface::messaging::{BrokerClient, BrokerState, PredictionRelay};
pub use metrics::RelayMetrics;
