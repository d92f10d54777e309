//! Kafka 消费者配置
//!
//! [`KafkaConsumerConfig`] 定义构建消费者所需的参数，[`KafkaSettings`] 是从环境变量读取的默认实现。

use std::str::FromStr;

use crate::error::ConfigError;

pub const DEFAULT_BROKERS: &str = "localhost:9092";
pub const DEFAULT_TOPIC: &str = "func-topic";
pub const DEFAULT_CONSUMER_GROUP: &str = "func-consumer";

/// Kafka 消费者配置 Trait
pub trait KafkaConsumerConfig: Send + Sync {
    /// Kafka Bootstrap Servers 地址（逗号分隔）
    fn kafka_bootstrap(&self) -> String;

    /// Consumer Group ID
    fn consumer_group(&self) -> &str;

    /// 订阅的 Topic
    fn kafka_topics(&self) -> &[String];

    /// 最小 fetch 字节数，默认 1
    fn fetch_min_bytes(&self) -> usize {
        1
    }

    /// 最大 fetch 等待时间（毫秒），默认 500
    fn fetch_max_wait_ms(&self) -> u64 {
        500
    }

    /// 会话超时（毫秒），默认 30000
    fn session_timeout_ms(&self) -> u64 {
        30000
    }

    /// 是否自动提交 offset，默认 true（读取即提交）
    fn enable_auto_commit(&self) -> bool {
        true
    }

    /// Offset 重置策略，默认 "earliest"
    fn auto_offset_reset(&self) -> &str {
        "earliest"
    }

    /// 最大消息大小（字节），默认 10MB
    fn fetch_message_max_bytes(&self) -> usize {
        10 * 1024 * 1024
    }

    /// 最大分区 fetch 大小（字节），默认 10MB
    fn max_partition_fetch_bytes(&self) -> usize {
        10 * 1024 * 1024
    }
}

/// 单条消息处理失败后的行为
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MessageErrorPolicy {
    /// 记录错误并继续消费
    #[default]
    Continue,
    /// 停止消费，错误作为传输层错误停止服务
    Stop,
}

impl FromStr for MessageErrorPolicy {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "continue" => Ok(MessageErrorPolicy::Continue),
            "stop" => Ok(MessageErrorPolicy::Stop),
            _ => Err(ConfigError::InvalidValue {
                key: "KAFKA_ON_ERROR".to_string(),
                value: value.to_string(),
            }),
        }
    }
}

/// Kafka 传输层配置
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KafkaSettings {
    pub brokers: Vec<String>,
    pub topics: Vec<String>,
    pub consumer_group: String,
    pub on_error: MessageErrorPolicy,
    /// 健康检查监听地址，未设置时不提供探针端点
    pub health_address: Option<String>,
}

impl Default for KafkaSettings {
    fn default() -> Self {
        Self {
            brokers: vec![DEFAULT_BROKERS.to_string()],
            topics: vec![DEFAULT_TOPIC.to_string()],
            consumer_group: DEFAULT_CONSUMER_GROUP.to_string(),
            on_error: MessageErrorPolicy::Continue,
            health_address: None,
        }
    }
}

impl KafkaSettings {
    /// 读取 `KAFKA_BROKERS`、`KAFKA_TOPICS`、`KAFKA_CONSUMER_GROUP`、`KAFKA_ON_ERROR`、`KAFKA_HEALTH_ADDRESS`
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<L>(lookup: L) -> Result<Self, ConfigError>
    where
        L: Fn(&str) -> Option<String>,
    {
        let mut settings = Self::default();
        if let Some(brokers) = lookup("KAFKA_BROKERS").map(|v| split_list(&v)).filter(|v| !v.is_empty()) {
            settings.brokers = brokers;
        }
        if let Some(topics) = lookup("KAFKA_TOPICS").map(|v| split_list(&v)).filter(|v| !v.is_empty()) {
            settings.topics = topics;
        }
        if let Some(group) = lookup("KAFKA_CONSUMER_GROUP").filter(|v| !v.trim().is_empty()) {
            settings.consumer_group = group.trim().to_string();
        }
        if let Some(policy) = lookup("KAFKA_ON_ERROR").filter(|v| !v.trim().is_empty()) {
            settings.on_error = policy.parse()?;
        }
        settings.health_address = lookup("KAFKA_HEALTH_ADDRESS").filter(|v| !v.trim().is_empty());
        Ok(settings)
    }

    pub fn with_topics<I, S>(mut self, topics: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.topics = topics.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_on_error(mut self, policy: MessageErrorPolicy) -> Self {
        self.on_error = policy;
        self
    }

    pub fn with_health_address(mut self, address: impl Into<String>) -> Self {
        self.health_address = Some(address.into());
        self
    }
}

impl KafkaConsumerConfig for KafkaSettings {
    fn kafka_bootstrap(&self) -> String {
        self.brokers.join(",")
    }

    fn consumer_group(&self) -> &str {
        &self.consumer_group
    }

    fn kafka_topics(&self) -> &[String] {
        &self.topics
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
