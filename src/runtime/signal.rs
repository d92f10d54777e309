//! 停止信号
//!
//! 启动钩子、传输层任务和 OS 信号监听器都可能要求服务停止。它们只通过 [`StopSignal`]
//! 通信：第一个写入者获胜，之后的写入立即返回 `false`，不会阻塞，其错误只记录日志。

use std::sync::{Arc, Mutex};

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::instrument::WithSubscriber;
use tracing::{debug, error, info};

use crate::error::RuntimeError;

/// 单次写入的停止信号：`None` 表示正常停止，`Some(err)` 表示因错误停止
#[derive(Clone)]
pub(crate) struct StopSignal {
    sender: Arc<Mutex<Option<oneshot::Sender<Option<RuntimeError>>>>>,
}

impl StopSignal {
    pub(crate) fn new() -> (Self, oneshot::Receiver<Option<RuntimeError>>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                sender: Arc::new(Mutex::new(Some(tx))),
            },
            rx,
        )
    }

    /// 发送停止原因，返回本次写入是否获胜
    pub(crate) fn send(&self, cause: Option<RuntimeError>) -> bool {
        let sender = match self.sender.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };

        match sender {
            Some(tx) => {
                if let Err(Some(e)) = tx.send(cause) {
                    debug!(error = %e, "stop signal receiver dropped");
                }
                true
            }
            None => {
                if let Some(e) = cause {
                    error!(error = %e, kind = e.kind(), "error after stop was already requested");
                }
                false
            }
        }
    }
}

/// 监听 SIGINT / SIGTERM，收到后发送正常停止
///
/// 信号处理器在返回前同步注册完成。Linux 上 SIGURG 会被运行时和调试器大量发送，显式忽略。
/// `shutdown` 取消后任务退出。
pub(crate) fn listen(stop: StopSignal, shutdown: CancellationToken) -> std::io::Result<JoinHandle<()>> {
    let mut signals = Signals::install()?;
    Ok(tokio::spawn(
        async move {
            tokio::select! {
                _ = shutdown.cancelled() => {}
                name = signals.recv() => {
                    info!(signal = name, "Shutdown signal received");
                    stop.send(None);
                }
            }
        }
        .with_current_subscriber(),
    ))
}

#[cfg(unix)]
struct Signals {
    interrupt: tokio::signal::unix::Signal,
    terminate: tokio::signal::unix::Signal,
    urgent: Option<tokio::signal::unix::Signal>,
}

#[cfg(unix)]
impl Signals {
    fn install() -> std::io::Result<Self> {
        use tokio::signal::unix::{SignalKind, signal};

        Ok(Self {
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
            urgent: urgent_signal()?,
        })
    }

    async fn recv(&mut self) -> &'static str {
        loop {
            tokio::select! {
                _ = self.interrupt.recv() => return "SIGINT",
                _ = self.terminate.recv() => return "SIGTERM",
                _ = recv_optional(&mut self.urgent) => {
                    debug!("ignoring SIGURG");
                }
            }
        }
    }
}

#[cfg(target_os = "linux")]
fn urgent_signal() -> std::io::Result<Option<tokio::signal::unix::Signal>> {
    use tokio::signal::unix::{SignalKind, signal};

    // SIGURG = 23
    signal(SignalKind::from_raw(23)).map(Some)
}

#[cfg(all(unix, not(target_os = "linux")))]
fn urgent_signal() -> std::io::Result<Option<tokio::signal::unix::Signal>> {
    Ok(None)
}

#[cfg(unix)]
async fn recv_optional(signal: &mut Option<tokio::signal::unix::Signal>) {
    match signal {
        Some(signal) => {
            signal.recv().await;
        }
        None => std::future::pending().await,
    }
}

#[cfg(not(unix))]
struct Signals;

#[cfg(not(unix))]
impl Signals {
    fn install() -> std::io::Result<Self> {
        Ok(Self)
    }

    async fn recv(&mut self) -> &'static str {
        match tokio::signal::ctrl_c().await {
            Ok(()) => "Ctrl+C",
            Err(e) => {
                error!(error = %e, "failed to listen for Ctrl+C");
                std::future::pending().await
            }
        }
    }
}
