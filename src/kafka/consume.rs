//! Kafka 消费循环
//!
//! 与具体消费者解耦：消息来源是一个 `Stream<Item = Result<KafkaMessage, E>>`，
//! 生产环境由 `StreamConsumer` 适配而来。

use std::fmt::Display;
use std::pin::pin;
use std::time::Duration;

use futures::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::error::TransportError;
use crate::kafka::consumer_config::MessageErrorPolicy;
use crate::kafka::message::KafkaMessage;
use crate::transport::{Dispatch, DispatchError};

/// 读取消息失败后的重试间隔
#[cfg_attr(not(feature = "kafka"), allow(dead_code))]
pub(crate) const RECEIVE_RETRY_DELAY: Duration = Duration::from_secs(1);

/// 顺序消费消息直到 `shutdown` 被取消、调度器封闭或消息流结束
///
/// 在途消息总是先处理完成，再检查 `shutdown`。
#[cfg_attr(not(feature = "kafka"), allow(dead_code))]
pub(crate) async fn consume<S, E>(
    messages: S,
    dispatch: &Dispatch<KafkaMessage, ()>,
    shutdown: &CancellationToken,
    policy: MessageErrorPolicy,
) -> Result<(), TransportError>
where
    S: Stream<Item = Result<KafkaMessage, E>>,
    E: Display,
{
    let mut messages = pin!(messages);

    loop {
        let received = tokio::select! {
            biased;
            _ = shutdown.cancelled() => return Ok(()),
            received = messages.next() => received,
        };

        let message = match received {
            Some(Ok(message)) => message,
            Some(Err(e)) => {
                error!(error = %e, retry_in = ?RECEIVE_RETRY_DELAY, "error reading kafka message");
                tokio::select! {
                    biased;
                    _ = shutdown.cancelled() => return Ok(()),
                    _ = tokio::time::sleep(RECEIVE_RETRY_DELAY) => {}
                }
                continue;
            }
            None => {
                info!("kafka message stream ended");
                return Ok(());
            }
        };

        debug!(
            topic = %message.topic,
            partition = message.partition,
            offset = message.offset,
            "received kafka message"
        );

        let (topic, partition, offset) = (message.topic.clone(), message.partition, message.offset);
        let ctx = CancellationToken::new();
        let _guard = ctx.clone().drop_guard();
        match dispatch.call(ctx, message).await {
            Ok(()) => {}
            Err(DispatchError::Closed) => return Ok(()),
            Err(e) => match policy {
                MessageErrorPolicy::Continue => {
                    error!(error = %e, %topic, partition, offset, "error handling kafka message");
                }
                MessageErrorPolicy::Stop => {
                    error!(error = %e, %topic, partition, offset, "error handling kafka message, stopping consumer");
                    return Err(TransportError::Dispatch(Box::new(e)));
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use futures::stream;
    use tokio::sync::{Notify, mpsc};

    use super::*;
    use crate::error::BoxError;
    use crate::health::Probes;
    use crate::signature::invocation;

    fn message(offset: i64) -> Result<KafkaMessage, String> {
        Ok(KafkaMessage::new("orders", 0, offset, "payload"))
    }

    /// 记录处理过的 offset，offset 0 处理失败
    fn failing_first(handled: Arc<Mutex<Vec<i64>>>) -> Dispatch<KafkaMessage, ()> {
        Dispatch::new(
            invocation(move |_ctx, message: KafkaMessage| {
                let handled = handled.clone();
                async move {
                    handled.lock().unwrap().push(message.offset);
                    if message.offset == 0 {
                        return Err(BoxError::from("bad message"));
                    }
                    Ok::<(), BoxError>(())
                }
            }),
            Probes::always_healthy(),
        )
    }

    #[tokio::test]
    async fn continue_policy_keeps_consuming_after_error() {
        let handled = Arc::new(Mutex::new(Vec::new()));
        let dispatch = failing_first(handled.clone());
        let messages = stream::iter(vec![message(0), message(1), message(2)]);

        let result = consume(
            messages,
            &dispatch,
            &CancellationToken::new(),
            MessageErrorPolicy::Continue,
        )
        .await;

        assert!(result.is_ok());
        assert_eq!(*handled.lock().unwrap(), vec![0, 1, 2]);
        assert_eq!(dispatch.metrics().get_metrics().dispatched_failed, 1);
    }

    #[tokio::test]
    async fn stop_policy_ends_consumer_with_dispatch_error() {
        let handled = Arc::new(Mutex::new(Vec::new()));
        let dispatch = failing_first(handled.clone());
        let messages = stream::iter(vec![message(0), message(1)]);

        let err = consume(
            messages,
            &dispatch,
            &CancellationToken::new(),
            MessageErrorPolicy::Stop,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, TransportError::Dispatch(_)));
        assert_eq!(*handled.lock().unwrap(), vec![0]);
    }

    #[tokio::test]
    async fn sealed_dispatch_ends_consumer() {
        let handled = Arc::new(Mutex::new(Vec::new()));
        let dispatch = failing_first(handled.clone());
        dispatch.sealer().cancel();
        let messages = stream::iter(vec![message(1)]).chain(stream::pending());

        let result = consume(
            messages,
            &dispatch,
            &CancellationToken::new(),
            MessageErrorPolicy::Stop,
        )
        .await;

        assert!(result.is_ok());
        assert!(handled.lock().unwrap().is_empty());
        assert_eq!(dispatch.metrics().get_metrics().rejected, 1);
    }

    #[tokio::test]
    async fn shutdown_waits_for_in_flight_message() {
        let (started_tx, mut started_rx) = mpsc::unbounded_channel();
        let release = Arc::new(Notify::new());
        let finished = Arc::new(Mutex::new(Vec::new()));

        let dispatch = {
            let release = release.clone();
            let finished = finished.clone();
            Dispatch::new(
                invocation(move |_ctx, message: KafkaMessage| {
                    let started_tx = started_tx.clone();
                    let release = release.clone();
                    let finished = finished.clone();
                    async move {
                        let _ = started_tx.send(message.offset);
                        release.notified().await;
                        finished.lock().unwrap().push(message.offset);
                        Ok::<(), BoxError>(())
                    }
                }),
                Probes::always_healthy(),
            )
        };

        let shutdown = CancellationToken::new();
        let messages = stream::iter(vec![message(7), message(8)]).chain(stream::pending());
        let task = {
            let dispatch = dispatch.clone();
            let shutdown = shutdown.clone();
            tokio::spawn(async move {
                consume(messages, &dispatch, &shutdown, MessageErrorPolicy::Continue).await
            })
        };

        assert_eq!(started_rx.recv().await, Some(7));
        shutdown.cancel();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!task.is_finished(), "consumer returned before the message finished");

        release.notify_one();
        let result = tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap();

        assert!(result.is_ok());
        assert_eq!(*finished.lock().unwrap(), vec![7]);
    }

    #[tokio::test]
    async fn shutdown_interrupts_receive_retry() {
        let dispatch = failing_first(Arc::new(Mutex::new(Vec::new())));
        let messages = stream::iter(vec![Err::<KafkaMessage, _>("broker down".to_string())])
            .chain(stream::pending());
        let shutdown = CancellationToken::new();

        let task = {
            let shutdown = shutdown.clone();
            tokio::spawn(async move {
                consume(messages, &dispatch, &shutdown, MessageErrorPolicy::Continue).await
            })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!task.is_finished());
        shutdown.cancel();

        let result = tokio::time::timeout(RECEIVE_RETRY_DELAY / 2, task)
            .await
            .expect("retry delay ignored shutdown")
            .unwrap();
        assert!(result.is_ok());
    }
}
