//! 中继配置模块
//!
//! 配置来源按优先级：
//! - 环境变量（与部署环境保持一致：`TOPIC_NAME`、`POSTGRES_DB` 等）
//! - 配置文件（TOML）
//! - 内置默认值

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use sqlx::postgres::PgConnectOptions;
use tracing::warn;

use crate::error::{RelayError, RelayResult};

/// Kafka 集群配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct KafkaClusterConfig {
    /// Broker 地址列表（host:port）
    pub bootstrap_servers: Vec<String>,
    /// 生产者与消费者共享的主题
    pub topic: String,
    pub consumer_group: String,
    pub auto_offset_reset: String,
    /// 生产者消息超时（毫秒）
    pub message_timeout_ms: u64,
    /// 阻塞刷新的上限（毫秒）
    pub flush_timeout_ms: u64,
    /// 启动探测 Broker 元数据的超时（毫秒）
    pub metadata_timeout_ms: u64,
    /// 监听循环首次有界拉取的超时（毫秒）
    pub warm_up_poll_ms: u64,
}

impl Default for KafkaClusterConfig {
    fn default() -> Self {
        Self {
            bootstrap_servers: vec!["kafka:9092".to_string()],
            topic: String::new(),
            consumer_group: "prediction-relay".to_string(),
            auto_offset_reset: "latest".to_string(),
            message_timeout_ms: 5000,
            flush_timeout_ms: 10_000,
            metadata_timeout_ms: 10_000,
            warm_up_poll_ms: 6000,
        }
    }
}

impl KafkaClusterConfig {
    pub fn bootstrap(&self) -> String {
        self.bootstrap_servers.join(",")
    }

    pub fn flush_timeout(&self) -> Duration {
        Duration::from_millis(self.flush_timeout_ms)
    }

    pub fn metadata_timeout(&self) -> Duration {
        Duration::from_millis(self.metadata_timeout_ms)
    }

    pub fn warm_up_poll(&self) -> Duration {
        Duration::from_millis(self.warm_up_poll_ms)
    }
}

/// PostgreSQL 实例配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PostgresInstanceConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: String,
}

impl Default for PostgresInstanceConfig {
    fn default() -> Self {
        Self {
            host: "postgres".to_string(),
            port: 5432,
            database: String::new(),
            user: "postgres".to_string(),
            password: String::new(),
        }
    }
}

impl PostgresInstanceConfig {
    pub fn connect_options(&self) -> PgConnectOptions {
        PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .database(&self.database)
            .username(&self.user)
            .password(&self.password)
    }

    /// 日志中使用的地址（不含密码）
    pub fn address(&self) -> String {
        format!("{}:{}/{}", self.host, self.port, self.database)
    }
}

/// 中继服务配置
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RelayServiceConfig {
    /// 预测用例目录，设置后启动时回放其中的用例
    pub fixtures_dir: Option<PathBuf>,
    /// 启动时先删除 `results` 表
    pub reset_schema: bool,
}

/// 日志配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub with_target: bool,
    pub with_thread_ids: bool,
    pub with_file: bool,
    pub with_line_number: bool,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            with_target: true,
            with_thread_ids: false,
            with_file: false,
            with_line_number: false,
            json: false,
        }
    }
}

/// 应用配置
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RelayAppConfig {
    pub kafka: KafkaClusterConfig,
    pub postgres: PostgresInstanceConfig,
    pub relay: RelayServiceConfig,
    pub logging: LoggingConfig,
}

impl RelayAppConfig {
    /// 用环境变量覆盖配置
    pub fn apply_env_overrides(&mut self) -> RelayResult<()> {
        self.apply_overrides(|key| env::var(key).ok())
    }

    /// 用任意键值来源覆盖配置；无法解析的值返回配置错误
    pub fn apply_overrides<F>(&mut self, lookup: F) -> RelayResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(topic) = lookup("TOPIC_NAME") {
            self.kafka.topic = topic;
        }
        if let Some(servers) = lookup("KAFKA_BOOTSTRAP_SERVERS") {
            self.kafka.bootstrap_servers = servers
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(group) = lookup("KAFKA_CONSUMER_GROUP") {
            self.kafka.consumer_group = group;
        }
        if let Some(host) = lookup("POSTGRES_HOST") {
            self.postgres.host = host;
        }
        if let Some(port) = lookup("POSTGRES_PORT") {
            self.postgres.port = port.trim().parse::<u16>().map_err(|err| {
                RelayError::config(format!("invalid POSTGRES_PORT {port:?}: {err}"))
            })?;
        }
        if let Some(database) = lookup("POSTGRES_DB") {
            self.postgres.database = database;
        }
        if let Some(user) = lookup("POSTGRES_USER") {
            self.postgres.user = user;
        }
        if let Some(password) = lookup("POSTGRES_PASSWORD") {
            self.postgres.password = password;
        }
        if let Some(dir) = lookup("RELAY_FIXTURES_DIR") {
            self.relay.fixtures_dir = Some(PathBuf::from(dir));
        }
        Ok(())
    }

    pub fn validate(&self) -> RelayResult<()> {
        if self.kafka.topic.trim().is_empty() {
            return Err(RelayError::config("kafka topic name is empty (set TOPIC_NAME)"));
        }
        if self.kafka.bootstrap_servers.is_empty() {
            return Err(RelayError::config("at least one kafka bootstrap server is required"));
        }
        if self.postgres.database.trim().is_empty() {
            return Err(RelayError::config("postgres database name is empty (set POSTGRES_DB)"));
        }
        Ok(())
    }
}

/// 加载配置：文件 → 环境变量覆盖 → 校验
pub fn load_config(path: Option<&str>) -> Result<RelayAppConfig> {
    let candidates: Vec<PathBuf> = match path {
        Some(p) => vec![PathBuf::from(p)],
        None => vec![PathBuf::from("config.toml")],
    };

    let mut cfg = load_with_fallback(&candidates, path.is_some())?;
    cfg.apply_env_overrides()
        .context("invalid relay configuration override")?;
    cfg.validate().context("invalid relay configuration")?;
    Ok(cfg)
}

fn load_with_fallback(candidates: &[PathBuf], explicit: bool) -> Result<RelayAppConfig> {
    for path in candidates {
        if !path.exists() {
            if explicit {
                return Err(anyhow!(
                    "configuration path {} does not exist",
                    path.display()
                ));
            }
            continue;
        }
        return load_config_from_file(path);
    }

    warn!("no configuration file found, falling back to defaults");
    Ok(RelayAppConfig::default())
}

fn load_config_from_file(path: &Path) -> Result<RelayAppConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("unable to read config file: {}", path.display()))?;
    let cfg: RelayAppConfig = toml::from_str(&content)
        .with_context(|| format!("invalid config format: {}", path.display()))?;
    Ok(cfg)
}
