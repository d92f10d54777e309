//! 集成测试共用工具

#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use flare_func_runtime::{Config, Result, RuntimeConfig, Service, ServiceState, Transport};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// 关闭信号处理、监听随机端口、使用不存在的静态配置文件
pub fn test_config() -> RuntimeConfig {
    RuntimeConfig::new()
        .with_listen_address("127.0.0.1:0")
        .with_static_config_path(PathBuf::from("/nonexistent/flare-func-runtime/cfg"))
        .with_shutdown_timeout(Duration::from_secs(5))
        .with_stop_timeout(Duration::from_secs(5))
        .with_signal_handling(false)
}

/// 运行中的服务
pub struct Running {
    pub task: JoinHandle<Result<()>>,
    pub address: SocketAddr,
    pub ctx: CancellationToken,
}

impl Running {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.address, path)
    }

    /// 取消上下文并等待 `start` 返回
    pub async fn stop(self) -> Result<()> {
        self.ctx.cancel();
        tokio::time::timeout(Duration::from_secs(10), self.task)
            .await
            .expect("service did not stop in time")
            .expect("service task panicked")
    }
}

/// 在后台启动服务并等待进入 Serving 状态
pub async fn spawn<T: Transport>(service: Service<T>) -> Running {
    let mut status = service.status();
    let ctx = CancellationToken::new();
    let task = tokio::spawn(service.start(ctx.clone()));

    let serving = tokio::time::timeout(
        Duration::from_secs(5),
        status.wait_for(|s| s.state == ServiceState::Serving),
    )
    .await
    .expect("service did not reach Serving")
    .expect("status channel closed")
    .clone();

    Running {
        task,
        address: serving.local_addr.expect("transport has no local address"),
        ctx,
    }
}

/// 记录钩子调用顺序
#[derive(Clone, Default)]
pub struct Journal {
    entries: Arc<Mutex<Vec<String>>>,
    config: Arc<Mutex<Option<Config>>>,
}

impl Journal {
    pub fn record(&self, entry: impl Into<String>) {
        self.entries.lock().unwrap().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().unwrap().clone()
    }

    pub fn count(&self, entry: &str) -> usize {
        self.entries().iter().filter(|e| e.as_str() == entry).count()
    }

    pub fn set_config(&self, config: Config) {
        *self.config.lock().unwrap() = Some(config);
    }

    pub fn config(&self) -> Option<Config> {
        self.config.lock().unwrap().clone()
    }

    /// 等待某条记录出现
    pub async fn wait_for(&self, entry: &str) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while self.count(entry) == 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap_or_else(|_| panic!("'{entry}' was never recorded"));
    }
}
