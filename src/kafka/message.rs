//! Kafka 消息模型
//!
//! 消费循环收到消息后立即复制为 [`KafkaMessage`]，不跨 await 持有 librdkafka 的借用消息。

use bytes::Bytes;
use chrono::{DateTime, Utc};

use crate::cloudevents::event::{self, Event};

/// 没有 CloudEvents 属性的消息转换成事件时使用的类型
pub const KAFKA_MESSAGE_EVENT_TYPE: &str = "kafka.message";

const JSON_CONTENT_TYPE: &str = "application/json";

/// 一条 Kafka 消息
#[derive(Debug, Clone, PartialEq, Default)]
pub struct KafkaMessage {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Option<Bytes>,
    pub value: Bytes,
    pub headers: Vec<(String, Bytes)>,
    pub timestamp: Option<DateTime<Utc>>,
}

impl KafkaMessage {
    pub fn new(topic: impl Into<String>, partition: i32, offset: i64, value: impl Into<Bytes>) -> Self {
        Self {
            topic: topic.into(),
            partition,
            offset,
            value: value.into(),
            ..Self::default()
        }
    }

    pub fn with_key(mut self, key: impl Into<Bytes>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<Bytes>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// 第一个同名头的值（UTF-8）
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key == name)
            .and_then(|(_, value)| std::str::from_utf8(value).ok())
    }

    /// 转换为 CloudEvent
    ///
    /// 1. 消息值是结构化模式的事件 JSON：直接解码
    /// 2. 带 `ce-type` 头：二进制模式，其余属性取自 `ce-*` 头，数据为消息值
    /// 3. 否则合成事件：`type = kafka.message`，`source = kafka://<topic>`，
    ///    `id = <topic>-<partition>-<offset>`
    pub fn to_event(&self) -> Event {
        if let Ok(event) = Event::from_json_slice(&self.value) {
            return event;
        }

        let mut event = Event::new(
            format!("{}-{}-{}", self.topic, self.partition, self.offset),
            format!("kafka://{}", self.topic),
            KAFKA_MESSAGE_EVENT_TYPE,
        );

        if let Some(ty) = self.header("ce-type") {
            event.ty = ty.to_string();
            if let Some(source) = self.header("ce-source") {
                event.source = source.to_string();
            }
            if let Some(id) = self.header("ce-id") {
                event.id = id.to_string();
            }
            if let Some(specversion) = self.header("ce-specversion") {
                event.specversion = specversion.to_string();
            }
            if let Some(subject) = self.header("ce-subject") {
                event.subject = Some(subject.to_string());
            }
        }

        let content_type = self.header("content-type").unwrap_or(JSON_CONTENT_TYPE);
        event.datacontenttype = Some(content_type.to_string());
        event.data = event::decode_body(Some(content_type), self.value.clone());
        event.time = self.timestamp;
        event
    }
}

#[cfg(feature = "kafka")]
impl From<&rdkafka::message::BorrowedMessage<'_>> for KafkaMessage {
    fn from(message: &rdkafka::message::BorrowedMessage<'_>) -> Self {
        use rdkafka::message::{Headers, Message};

        let headers = message
            .headers()
            .map(|headers| {
                headers
                    .iter()
                    .map(|header| {
                        (
                            header.key.to_string(),
                            header.value.map(Bytes::copy_from_slice).unwrap_or_default(),
                        )
                    })
                    .collect()
            })
            .unwrap_or_default();

        Self {
            topic: message.topic().to_string(),
            partition: message.partition(),
            offset: message.offset(),
            key: message.key().map(Bytes::copy_from_slice),
            value: message.payload().map(Bytes::copy_from_slice).unwrap_or_default(),
            headers,
            timestamp: message
                .timestamp()
                .to_millis()
                .and_then(DateTime::from_timestamp_millis),
        }
    }
}
