//! 函数服务生命周期编排
//!
//! 状态机：`Created → Starting → Serving → Stopping → Stopped`
//!
//! 1. 构建配置（失败立即返回，不提供任何服务）
//! 2. 绑定传输层（失败立即返回，不调用任何钩子）
//! 3. 安装信号监听，后台运行 Start 钩子，启动传输层服务
//! 4. 等待上下文取消或停止信号
//! 5. 先优雅关闭传输层（排空在途工作），再调用 Stop 钩子
//! 6. 按「触发原因 → Stop 钩子 → 传输层关闭」取第一个错误返回，其余记录日志

use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::instrument::WithSubscriber;
use tracing::{debug, error, info, warn};

use crate::config::ConfigBuilder;
use crate::error::{HookError, Result, RuntimeError};
use crate::function::{Capabilities, Function, Roles};
use crate::health::{HealthStatus, Probes};
use crate::metrics::{Metrics, MetricsCollector};
use crate::runtime::config::RuntimeConfig;
use crate::runtime::hook;
use crate::runtime::signal::{self, StopSignal};
use crate::signature::Resolution;
use crate::transport::{Binding, Dispatch, ServingTransport, Transport};

/// 服务状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    Created,
    Starting,
    Serving,
    Stopping,
    Stopped,
}

/// 服务状态快照
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceStatus {
    pub state: ServiceState,
    /// 传输层绑定的本地地址（绑定后可用）
    pub local_addr: Option<SocketAddr>,
}

/// 函数服务
///
/// 独占一个函数实例和一个传输层。构造时检测角色并解析处理签名，
/// [`Service::start`] 消费自身，因此只能运行一次。
///
/// ```rust,ignore
/// let service = Service::new(MyFunction::default(), HttpTransport::new("127.0.0.1:8080"))?;
/// let status = service.status();
/// service.start(CancellationToken::new()).await?;
/// ```
pub struct Service<T: Transport> {
    function: &'static str,
    roles: Roles,
    resolution: Resolution<T::Request, T::Response>,
    transport: T,
    config: RuntimeConfig,
    environment: Option<Vec<(String, String)>>,
    logger: Option<tracing::Dispatch>,
    metrics: MetricsCollector,
    status: watch::Sender<ServiceStatus>,
}

impl<T: Transport> Service<T> {
    /// 创建服务：检测函数实现的角色并解析处理签名
    ///
    /// 函数实例不符合任何受支持的签名时返回 [`RuntimeError::Signature`]。
    pub fn new<F>(function: F, transport: T) -> Result<Self>
    where
        F: Function,
        T: Binding<F>,
    {
        let function = Arc::new(function);
        let roles = Roles::of(&function);
        let resolution = T::resolve(&function)?;
        let name = std::any::type_name::<F>();

        debug!(function = name, shape = resolution.shape, "Resolved function handler");
        roles.capabilities().log();

        let (status, _) = watch::channel(ServiceStatus {
            state: ServiceState::Created,
            local_addr: None,
        });

        Ok(Self {
            function: name,
            roles,
            resolution,
            transport,
            config: RuntimeConfig::default(),
            environment: None,
            logger: None,
            metrics: MetricsCollector::new(),
            status,
        })
    }

    /// 设置运行时配置
    pub fn with_config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    /// 注入日志分发器，服务的所有任务都在该分发器下运行
    pub fn with_logger(mut self, logger: tracing::Dispatch) -> Self {
        self.logger = Some(logger);
        self
    }

    /// 替换传递给 Start 钩子的环境变量来源（默认读取进程环境）
    pub fn with_environment<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.environment = Some(
            vars.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        );
        self
    }

    /// 函数实现的角色
    pub fn capabilities(&self) -> Capabilities {
        self.roles.capabilities()
    }

    /// 绑定的处理签名名称
    pub fn handler_shape(&self) -> &'static str {
        self.resolution.shape
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// 订阅服务状态
    pub fn status(&self) -> watch::Receiver<ServiceStatus> {
        self.status.subscribe()
    }

    /// 调度指标收集器（与运行中的服务共享）
    pub fn metrics(&self) -> MetricsCollector {
        self.metrics.clone()
    }

    /// 就绪检查：每次调用都询问函数实例
    pub async fn ready(&self) -> HealthStatus {
        self.probes().ready().await
    }

    /// 存活检查：每次调用都询问函数实例
    pub async fn alive(&self) -> HealthStatus {
        self.probes().alive().await
    }

    fn probes(&self) -> Probes {
        Probes::from_roles(&self.roles, self.config.probe_timeout)
    }

    fn config_builder(&self) -> ConfigBuilder {
        let builder = ConfigBuilder::new().static_file(self.config.static_config_path.clone());
        match &self.environment {
            Some(vars) => builder.environment(vars.iter().cloned()),
            None => builder,
        }
    }

    /// 运行服务直到 `ctx` 被取消、收到 SIGINT / SIGTERM、Start 钩子失败或传输层异常退出
    ///
    /// 正常停止返回 `Ok(())`。
    pub async fn start(self, ctx: CancellationToken) -> Result<()> {
        match self.logger.clone() {
            Some(logger) => self.run(ctx).with_subscriber(logger).await,
            None => self.run(ctx).await,
        }
    }

    async fn run(self, ctx: CancellationToken) -> Result<()> {
        let function = self.function;
        let probes = self.probes();
        let builder = self.config_builder();
        let Service {
            roles,
            resolution,
            mut transport,
            config,
            metrics,
            status,
            ..
        } = self;
        let transport_name = transport.name();

        publish(&status, ServiceState::Starting);
        info!(function, transport = transport_name, "Starting function");

        let settings = match builder.build() {
            Ok(settings) => settings,
            Err(e) => {
                error!(error = %e, "Failed to build function config");
                publish(&status, ServiceState::Stopped);
                return Err(e.into());
            }
        };

        if let Err(e) = transport.bind().await {
            error!(transport = transport_name, error = %e, "Failed to bind transport");
            publish(&status, ServiceState::Stopped);
            return Err(e.into());
        }
        let local_addr = transport.local_addr();
        status.send_modify(|s| s.local_addr = local_addr);

        let (stop, mut stop_rx) = StopSignal::new();

        let listener_token = CancellationToken::new();
        let listener = if config.handle_signals {
            match signal::listen(stop.clone(), listener_token.clone()) {
                Ok(handle) => Some(handle),
                Err(e) => {
                    warn!(error = %e, "Failed to install signal handlers, continuing without them");
                    None
                }
            }
        } else {
            debug!("Signal handling disabled");
            None
        };

        let hook_token = ctx.child_token();
        if let Some(starter) = roles.starter.clone() {
            let stop = stop.clone();
            let token = hook_token.clone();
            tokio::spawn(
                async move {
                    let outcome = hook::guarded("start", starter.start(token, settings)).await;
                    match outcome {
                        Ok(Ok(())) => debug!("Function start hook completed"),
                        Ok(Err(e)) => {
                            error!(error = %e, "Function start hook failed");
                            stop.send(Some(HookError::Start(e).into()));
                        }
                        Err(e) => {
                            error!(error = %e, "Function start hook panicked");
                            stop.send(Some(e.into()));
                        }
                    }
                }
                .with_current_subscriber(),
            );
        }

        let dispatch = Dispatch::new(resolution.invocation, probes).with_metrics(metrics.clone());
        let serving = ServingTransport::spawn(transport, dispatch, stop.clone());

        publish(&status, ServiceState::Serving);
        match local_addr {
            Some(address) => info!(%address, transport = transport_name, "Function serving"),
            None => info!(transport = transport_name, "Function serving"),
        }

        let cause = tokio::select! {
            _ = ctx.cancelled() => {
                info!("Context cancelled, stopping function");
                None
            }
            received = &mut stop_rx => received.unwrap_or(None),
        };

        publish(&status, ServiceState::Stopping);
        info!(transport = transport_name, "Stopping function");

        let transport_err = match serving.close(config.shutdown_timeout).await {
            Ok(()) => None,
            Err(e) => Some(RuntimeError::from(e)),
        };

        let stop_err: Option<RuntimeError> = match roles.stopper {
            Some(stopper) => {
                let outcome = hook::bounded("stop", config.stop_timeout, None, |token| async move {
                    stopper.stop(token).await
                })
                .await;
                match outcome {
                    Ok(Ok(())) => None,
                    Ok(Err(e)) => Some(HookError::Stop(e).into()),
                    Err(HookError::Timeout { timeout, .. }) => Some(HookError::StopTimeout(timeout).into()),
                    Err(e) => Some(e.into()),
                }
            }
            None => None,
        };

        hook_token.cancel();
        listener_token.cancel();
        if let Some(listener) = listener {
            listener.abort();
        }

        let snapshot: Metrics = metrics.get_metrics();
        info!(
            dispatched = snapshot.dispatched_total,
            failed = snapshot.dispatched_failed,
            panicked = snapshot.dispatched_panicked,
            rejected = snapshot.rejected,
            "Function stopped"
        );
        publish(&status, ServiceState::Stopped);

        collapse_errors([cause, stop_err, transport_err])
    }
}

fn publish(status: &watch::Sender<ServiceStatus>, state: ServiceState) {
    status.send_modify(|s| s.state = state);
}

/// 取第一个错误返回，其余错误只记录日志
pub(crate) fn collapse_errors<I>(errors: I) -> Result<()>
where
    I: IntoIterator<Item = Option<RuntimeError>>,
{
    let mut first = None;
    for e in errors.into_iter().flatten() {
        if first.is_none() {
            first = Some(e);
        } else {
            error!(error = %e, kind = e.kind(), "Additional error during shutdown");
        }
    }
    match first {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// 将 `start` 的结果映射为进程退出码
pub fn exit_code(result: &Result<()>) -> ExitCode {
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(_) => ExitCode::FAILURE,
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::error::TransportError;

    #[test]
    fn collapse_returns_first_error() {
        let result = collapse_errors([
            None,
            Some(HookError::Stop("stop failed".into()).into()),
            Some(TransportError::CloseTimeout(Duration::from_secs(1)).into()),
        ]);

        match result {
            Err(RuntimeError::Hook(HookError::Stop(e))) => assert_eq!(e.to_string(), "stop failed"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn collapse_without_errors_is_ok() {
        assert!(collapse_errors([None, None, None]).is_ok());
    }
}
