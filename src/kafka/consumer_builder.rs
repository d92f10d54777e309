//! Kafka 消费者构建器

use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use tracing::info;

use crate::error::TransportError;
use crate::kafka::consumer_config::KafkaConsumerConfig;

/// 构建 Kafka 消费者
pub fn build_kafka_consumer(
    config: &dyn KafkaConsumerConfig,
) -> Result<StreamConsumer, rdkafka::error::KafkaError> {
    ClientConfig::new()
        .set("bootstrap.servers", config.kafka_bootstrap())
        .set("group.id", config.consumer_group())
        .set("enable.partition.eof", "false")
        .set("session.timeout.ms", config.session_timeout_ms().to_string())
        .set("enable.auto.commit", config.enable_auto_commit().to_string())
        .set("auto.offset.reset", config.auto_offset_reset())
        .set("fetch.message.max.bytes", config.fetch_message_max_bytes().to_string())
        .set("max.partition.fetch.bytes", config.max_partition_fetch_bytes().to_string())
        .set("fetch.min.bytes", config.fetch_min_bytes().to_string())
        .set("fetch.wait.max.ms", config.fetch_max_wait_ms().to_string())
        .create()
}

/// 构建消费者并订阅配置中的所有 topic
pub fn build_subscribed_consumer(
    config: &dyn KafkaConsumerConfig,
) -> Result<StreamConsumer, TransportError> {
    let consumer = build_kafka_consumer(config).map_err(|e| TransportError::Kafka(e.to_string()))?;
    let topics: Vec<&str> = config.kafka_topics().iter().map(String::as_str).collect();
    consumer
        .subscribe(&topics)
        .map_err(|e| TransportError::Kafka(e.to_string()))?;
    info!(
        brokers = %config.kafka_bootstrap(),
        topics = ?topics,
        group = %config.consumer_group(),
        "Subscribed to Kafka topics"
    );
    Ok(consumer)
}
