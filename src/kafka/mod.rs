//! Kafka 消费者绑定
//!
//! 处理形态检测顺序：
//! 1. [`DefaultHandler<KafkaMessage, ()>`](crate::signature::DefaultHandler)
//! 2. [`HandleCtxMessage`]：`(ctx, message) -> Result<()>`
//! 3. [`HandleMessage`]：`message -> Result<()>`
//! 4. CloudEvents 形态（见 [`crate::cloudevents`]）：消息先转换为事件，回复事件被丢弃
//!
//! 消费者传输层需要启用 `kafka` feature。

mod consume;
pub mod consumer_config;
#[cfg(feature = "kafka")]
pub mod consumer_builder;
pub mod message;
#[cfg(feature = "kafka")]
mod transport;

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::cloudevents::{self, CloudEventFunction, Event};
use crate::error::{BoxError, SignatureError};
use crate::signature::{self, DefaultHandler, Invocation, Resolution, Shape, invocation};

pub use consumer_config::{KafkaConsumerConfig, KafkaSettings, MessageErrorPolicy};
#[cfg(feature = "kafka")]
pub use consumer_builder::build_kafka_consumer;
pub use message::KafkaMessage;
#[cfg(feature = "kafka")]
pub use transport::KafkaTransport;

/// Kafka 规范调用闭包
pub type MessageInvocation = Invocation<KafkaMessage, ()>;

/// `(ctx, message) -> Result<()>`
#[async_trait]
pub trait HandleCtxMessage: Send + Sync {
    async fn handle(&self, ctx: CancellationToken, message: KafkaMessage) -> Result<(), BoxError>;
}

/// `message -> Result<()>`
#[async_trait]
pub trait HandleMessage: Send + Sync {
    async fn handle(&self, message: KafkaMessage) -> Result<(), BoxError>;
}

/// 消费 Kafka 消息的函数
///
/// 只处理原始消息的函数仍需提供一个空的 `impl CloudEventFunction`。
pub trait KafkaFunction: CloudEventFunction {
    fn as_ctx_message_handler(self: Arc<Self>) -> Option<Arc<dyn HandleCtxMessage>> {
        None
    }

    fn as_message_handler(self: Arc<Self>) -> Option<Arc<dyn HandleMessage>> {
        None
    }

    /// 直接提供原始消息的规范闭包（[`DefaultHandler`]）
    fn as_message_invocation(self: Arc<Self>) -> Option<MessageInvocation> {
        None
    }
}

impl CloudEventFunction for DefaultHandler<KafkaMessage, ()> {}

impl KafkaFunction for DefaultHandler<KafkaMessage, ()> {
    fn as_message_invocation(self: Arc<Self>) -> Option<MessageInvocation> {
        Some(self.handler.clone())
    }
}

impl KafkaFunction for DefaultHandler<Event, Option<Event>> {}

/// 原始消息处理形态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KafkaShape {
    CtxMessage,
    Message,
}

impl Shape for KafkaShape {
    type Request = KafkaMessage;
    type Response = ();

    const PRIORITY: &'static [Self] = &[KafkaShape::CtxMessage, KafkaShape::Message];
    const BINDING: &'static str = "kafka";

    fn name(&self) -> &'static str {
        match self {
            KafkaShape::CtxMessage => "HandleCtxMessage",
            KafkaShape::Message => "HandleMessage",
        }
    }
}

/// 解析函数实例的 Kafka 处理签名：先原始消息形态，再 CloudEvents 形态
pub fn resolve<F: KafkaFunction>(function: &Arc<F>) -> Result<Resolution<KafkaMessage, ()>, SignatureError> {
    if let Ok(resolution) =
        signature::resolve_with::<KafkaShape, _, _>(function, function.clone().as_message_invocation(), probe)
    {
        return Ok(resolution);
    }

    let events = cloudevents::resolve(function).map_err(|_| SignatureError::Unsupported {
        binding: KafkaShape::BINDING,
        function: std::any::type_name::<F>(),
    })?;
    let handler = events.invocation;
    Ok(Resolution {
        shape: events.shape,
        invocation: invocation(move |ctx, message: KafkaMessage| {
            let handler = handler.clone();
            async move { handler(ctx, message.to_event()).await.map(|_reply| ()) }
        }),
    })
}

fn probe<F: KafkaFunction>(shape: KafkaShape, function: &Arc<F>) -> Option<MessageInvocation> {
    match shape {
        KafkaShape::CtxMessage => function.clone().as_ctx_message_handler().map(|handler| {
            invocation(move |ctx, message| {
                let handler = handler.clone();
                async move { handler.handle(ctx, message).await }
            })
        }),
        KafkaShape::Message => function.clone().as_message_handler().map(|handler| {
            invocation(move |_ctx, message| {
                let handler = handler.clone();
                async move { handler.handle(message).await }
            })
        }),
    }
}

/// 使用环境变量配置，以 Kafka 消费者形式运行函数直到收到停止信号
#[cfg(feature = "kafka")]
pub async fn start<F: KafkaFunction>(function: F) -> crate::error::Result<()> {
    let config = crate::runtime::RuntimeConfig::from_env()?;
    let settings = KafkaSettings::from_env()?;
    crate::runtime::Service::new(function, KafkaTransport::new(settings))?
        .with_config(config)
        .start(CancellationToken::new())
        .await
}
