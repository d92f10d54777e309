//! Kafka 消费者传输层
//!
//! 顺序消费：一条消息处理完成后才读取下一条。offset 在读取时自动提交，
//! 处理失败的消息按 [`MessageErrorPolicy`](crate::kafka::MessageErrorPolicy) 处理，不会重试。

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use rdkafka::consumer::{Consumer, StreamConsumer};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::instrument::WithSubscriber;
use tracing::{info, warn};

use crate::error::{SignatureError, TransportError};
use crate::health;
use crate::http::{bind_listener, serve_router};
use crate::kafka::consumer_builder::build_subscribed_consumer;
use crate::kafka::consume::consume;
use crate::kafka::consumer_config::KafkaSettings;
use crate::kafka::message::KafkaMessage;
use crate::kafka::KafkaFunction;
use crate::signature::Resolution;
use crate::transport::{Binding, Dispatch, Transport};

/// Kafka 消费者传输层
pub struct KafkaTransport {
    settings: KafkaSettings,
    consumer: Option<StreamConsumer>,
    health: Option<TcpListener>,
}

impl KafkaTransport {
    pub fn new(settings: KafkaSettings) -> Self {
        Self {
            settings,
            consumer: None,
            health: None,
        }
    }

    pub fn settings(&self) -> &KafkaSettings {
        &self.settings
    }
}

#[async_trait]
impl Transport for KafkaTransport {
    type Request = KafkaMessage;
    type Response = ();

    fn name(&self) -> &'static str {
        "kafka"
    }

    async fn bind(&mut self) -> Result<(), TransportError> {
        self.consumer = Some(build_subscribed_consumer(&self.settings)?);
        if let Some(address) = &self.settings.health_address {
            self.health = Some(bind_listener(address).await?);
        }
        Ok(())
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        self.health.as_ref().and_then(|l| l.local_addr().ok())
    }

    async fn serve(
        self,
        dispatch: Dispatch<KafkaMessage, ()>,
        shutdown: CancellationToken,
    ) -> Result<(), TransportError> {
        let consumer = self.consumer.ok_or(TransportError::NotBound)?;

        let health_token = shutdown.child_token();
        let health_task = self.health.map(|listener| {
            let router = health::router(dispatch.probes().clone());
            tokio::spawn(
                serve_router(listener, router, health_token.clone(), "kafka-health")
                    .with_current_subscriber(),
            )
        });

        let messages = consumer
            .stream()
            .map(|received| received.map(|message| KafkaMessage::from(&message)));
        let result = consume(messages, &dispatch, &shutdown, self.settings.on_error).await;

        health_token.cancel();
        if let Some(task) = health_task {
            match task.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(error = %e, "Kafka health listener failed"),
                Err(e) => warn!(error = %e, "Kafka health listener task failed"),
            }
        }
        consumer.unsubscribe();
        info!("Kafka consumer closed");
        result
    }
}

impl<F: KafkaFunction> Binding<F> for KafkaTransport {
    fn resolve(function: &Arc<F>) -> Result<Resolution<KafkaMessage, ()>, SignatureError> {
        crate::kafka::resolve(function)
    }
}
