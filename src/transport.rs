//! 传输层契约
//!
//! 运行时对每种可插拔传输（HTTP、CloudEvents、Kafka）的要求：
//! - `bind`：获取网络 / 队列资源
//! - `serve`：阻塞直到 `shutdown` 触发且在途工作完成，每个入站工作单元调用一次 `dispatch`
//! - 关闭：由运行时统一实现（[`ServingTransport::close`]），取消 `shutdown` 后在截止时间内等待 `serve` 返回

use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::FutureExt;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::instrument::WithSubscriber;
use tracing::{debug, error, info, warn};

use crate::error::{BoxError, SignatureError, TransportError, panic_message};
use crate::health::Probes;
use crate::metrics::{MetricsCollector, Outcome};
use crate::runtime::signal::StopSignal;
use crate::signature::{Invocation, Resolution};

/// 可插拔传输
#[async_trait]
pub trait Transport: Send + Sized + 'static {
    /// 入站工作单元
    type Request: Send + 'static;
    /// 处理结果
    type Response: Send + 'static;

    /// 传输名称（日志字段）
    fn name(&self) -> &'static str;

    /// 获取监听端口 / 消费者等资源
    async fn bind(&mut self) -> Result<(), TransportError>;

    /// 绑定后的本地地址（如果传输监听了端口）
    fn local_addr(&self) -> Option<SocketAddr> {
        None
    }

    /// 服务直到 `shutdown` 被取消并且在途工作完成
    async fn serve(
        self,
        dispatch: Dispatch<Self::Request, Self::Response>,
        shutdown: CancellationToken,
    ) -> Result<(), TransportError>;
}

/// 传输绑定：知道如何把函数实例解析为本传输的规范调用闭包
pub trait Binding<F: ?Sized>: Transport {
    fn resolve(function: &Arc<F>) -> Result<Resolution<Self::Request, Self::Response>, SignatureError>;
}

/// 单次调度失败原因
#[derive(Error, Debug)]
pub enum DispatchError {
    /// 传输层已关闭，不再接受新的调度
    #[error("function is shutting down")]
    Closed,

    #[error(transparent)]
    Failed(BoxError),

    #[error("user function error: {0}")]
    Panicked(String),
}

/// 调度器：规范调用闭包 + 探针 + 指标
///
/// 传输层对每个入站工作单元调用一次 [`Dispatch::call`]。处理函数中的 panic
/// 在这里被捕获，不会导致进程崩溃。
pub struct Dispatch<Req, Resp> {
    invocation: Invocation<Req, Resp>,
    probes: Probes,
    metrics: MetricsCollector,
    sealed: CancellationToken,
}

impl<Req, Resp> Clone for Dispatch<Req, Resp> {
    fn clone(&self) -> Self {
        Self {
            invocation: self.invocation.clone(),
            probes: self.probes.clone(),
            metrics: self.metrics.clone(),
            sealed: self.sealed.clone(),
        }
    }
}

impl<Req, Resp> Dispatch<Req, Resp>
where
    Req: Send + 'static,
    Resp: Send + 'static,
{
    pub fn new(invocation: Invocation<Req, Resp>, probes: Probes) -> Self {
        Self {
            invocation,
            probes,
            metrics: MetricsCollector::new(),
            sealed: CancellationToken::new(),
        }
    }

    pub(crate) fn with_metrics(mut self, metrics: MetricsCollector) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn probes(&self) -> &Probes {
        &self.probes
    }

    /// 调度指标
    pub fn metrics(&self) -> &MetricsCollector {
        &self.metrics
    }

    /// 调度器是否已封闭（传输关闭完成之后）
    pub fn is_sealed(&self) -> bool {
        self.sealed.is_cancelled()
    }

    pub(crate) fn sealer(&self) -> CancellationToken {
        self.sealed.clone()
    }

    /// 调用函数处理一个工作单元
    pub async fn call(&self, ctx: CancellationToken, request: Req) -> Result<Resp, DispatchError> {
        if self.is_sealed() {
            self.metrics.record_rejected();
            return Err(DispatchError::Closed);
        }

        let started = Instant::now();
        let result = AssertUnwindSafe((self.invocation)(ctx, request))
            .catch_unwind()
            .await;

        match result {
            Ok(Ok(response)) => {
                self.metrics.record(Outcome::Success, started.elapsed());
                Ok(response)
            }
            Ok(Err(e)) => {
                self.metrics.record(Outcome::Failed, started.elapsed());
                Err(DispatchError::Failed(e))
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!(panic = %message, "user function panicked");
                self.metrics.record(Outcome::Panicked, started.elapsed());
                Err(DispatchError::Panicked(message))
            }
        }
    }
}

/// 正在服务的传输
///
/// 持有服务任务与关闭令牌，提供有界的优雅关闭。
pub(crate) struct ServingTransport {
    name: &'static str,
    shutdown: CancellationToken,
    sealed: CancellationToken,
    task: JoinHandle<()>,
}

impl ServingTransport {
    /// 在独立任务中运行 `serve`，致命错误写入 StopSignal
    pub(crate) fn spawn<T: Transport>(
        transport: T,
        dispatch: Dispatch<T::Request, T::Response>,
        stop: StopSignal,
    ) -> Self {
        let name = transport.name();
        let shutdown = CancellationToken::new();
        let sealed = dispatch.sealer();
        let token = shutdown.clone();

        let task = tokio::spawn(
            async move {
                match transport.serve(dispatch, token.clone()).await {
                    Ok(()) if token.is_cancelled() => {
                        debug!(transport = name, "transport closed");
                    }
                    Ok(()) => {
                        info!(transport = name, "transport exited, stopping function");
                        stop.send(None);
                    }
                    Err(e) => {
                        error!(transport = name, error = %e, "transport exited with unexpected error");
                        stop.send(Some(e.into()));
                    }
                }
            }
            .with_current_subscriber(),
        );

        Self {
            name,
            shutdown,
            sealed,
            task,
        }
    }

    /// 优雅关闭：拒绝新的工作，在 `timeout` 内等待在途工作完成
    ///
    /// 超时后放弃等待并中止服务任务。无论结果如何，返回前调度器都会被封闭。
    pub(crate) async fn close(self, timeout: Duration) -> Result<(), TransportError> {
        debug!(transport = self.name, timeout = ?timeout, "closing transport");
        self.shutdown.cancel();

        let mut task = self.task;
        let result = match tokio::time::timeout(timeout, &mut task).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) if e.is_panic() => Err(TransportError::Panicked(panic_message(
                e.into_panic().as_ref(),
            ))),
            Ok(Err(e)) => Err(TransportError::Panicked(e.to_string())),
            Err(_) => {
                warn!(transport = self.name, timeout = ?timeout, "transport close timeout, aborting");
                task.abort();
                Err(TransportError::CloseTimeout(timeout))
            }
        };

        self.sealed.cancel();
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signature::invocation;

    /// 收到关闭信号后立即返回
    struct Idle;

    #[async_trait]
    impl Transport for Idle {
        type Request = u32;
        type Response = u32;

        fn name(&self) -> &'static str {
            "idle"
        }

        async fn bind(&mut self) -> Result<(), TransportError> {
            Ok(())
        }

        async fn serve(
            self,
            _dispatch: Dispatch<u32, u32>,
            shutdown: CancellationToken,
        ) -> Result<(), TransportError> {
            shutdown.cancelled().await;
            Ok(())
        }
    }

    /// 忽略关闭信号
    struct Stuck;

    #[async_trait]
    impl Transport for Stuck {
        type Request = u32;
        type Response = u32;

        fn name(&self) -> &'static str {
            "stuck"
        }

        async fn bind(&mut self) -> Result<(), TransportError> {
            Ok(())
        }

        async fn serve(self, _dispatch: Dispatch<u32, u32>, _shutdown: CancellationToken) -> Result<(), TransportError> {
            std::future::pending().await
        }
    }

    fn doubling() -> Dispatch<u32, u32> {
        Dispatch::new(invocation(|_ctx, n: u32| async move { Ok(n * 2) }), Probes::always_healthy())
    }

    #[tokio::test]
    async fn dispatch_is_rejected_after_close() {
        let dispatch = doubling();
        let (stop, _rx) = StopSignal::new();
        let serving = ServingTransport::spawn(Idle, dispatch.clone(), stop);

        assert_eq!(dispatch.call(CancellationToken::new(), 2).await.unwrap(), 4);

        serving.close(Duration::from_secs(1)).await.unwrap();
        assert!(dispatch.is_sealed());
        assert!(matches!(
            dispatch.call(CancellationToken::new(), 2).await,
            Err(DispatchError::Closed)
        ));
        assert_eq!(dispatch.metrics.get_metrics().rejected, 1);
    }

    #[tokio::test]
    async fn close_is_bounded() {
        let dispatch = doubling();
        let (stop, _rx) = StopSignal::new();
        let serving = ServingTransport::spawn(Stuck, dispatch.clone(), stop);

        let err = serving.close(Duration::from_millis(50)).await.unwrap_err();
        assert!(matches!(err, TransportError::CloseTimeout(_)));
        assert!(dispatch.is_sealed());
    }

    #[tokio::test]
    async fn stop_signal_first_writer_wins() {
        let (stop, rx) = StopSignal::new();
        assert!(stop.send(Some(TransportError::NotBound.into())));
        assert!(!stop.send(None));

        let received = rx.await.unwrap();
        assert!(matches!(
            received,
            Some(crate::error::RuntimeError::Transport(TransportError::NotBound))
        ));
    }

    #[tokio::test]
    async fn unexpected_serve_exit_requests_stop() {
        struct Quits;

        #[async_trait]
        impl Transport for Quits {
            type Request = u32;
            type Response = u32;

            fn name(&self) -> &'static str {
                "quits"
            }

            async fn bind(&mut self) -> Result<(), TransportError> {
                Ok(())
            }

            async fn serve(self, _dispatch: Dispatch<u32, u32>, _shutdown: CancellationToken) -> Result<(), TransportError> {
                Err(TransportError::Kafka("broker gone".to_string()))
            }
        }

        let (stop, rx) = StopSignal::new();
        let _serving = ServingTransport::spawn(Quits, doubling(), stop);

        let received = rx.await.unwrap();
        assert!(matches!(
            received,
            Some(crate::error::RuntimeError::Transport(TransportError::Kafka(_)))
        ));
    }
}
