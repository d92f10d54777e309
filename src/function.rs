//! 函数实例与可选角色
//!
//! 一个函数实例可以选择性地实现四种生命周期角色：
//! - [`Starter`]：启动钩子，接收合并后的配置
//! - [`Stopper`]：停止钩子，在传输层关闭之后调用
//! - [`ReadinessReporter`]：就绪探针
//! - [`LivenessReporter`]：存活探针
//!
//! 角色通过 [`Function`] 上的访问器声明：默认返回 `None`，实现了对应 trait 的类型
//! 覆盖为 `Some(self)`。运行时在构造时调用一次访问器得到 [`Capabilities`]，之后不再重新检测。
//!
//! ```rust,ignore
//! struct MyFunction;
//!
//! #[async_trait]
//! impl Starter for MyFunction {
//!     async fn start(&self, _ctx: CancellationToken, _config: Config) -> Result<(), BoxError> {
//!         Ok(())
//!     }
//! }
//!
//! impl Function for MyFunction {
//!     fn as_starter(self: Arc<Self>) -> Option<Arc<dyn Starter>> {
//!         Some(self)
//!     }
//! }
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::Config;
use crate::error::BoxError;

/// 启动钩子
#[async_trait]
pub trait Starter: Send + Sync {
    async fn start(&self, ctx: CancellationToken, config: Config) -> Result<(), BoxError>;
}

/// 停止钩子
#[async_trait]
pub trait Stopper: Send + Sync {
    async fn stop(&self, ctx: CancellationToken) -> Result<(), BoxError>;
}

/// 就绪探针
#[async_trait]
pub trait ReadinessReporter: Send + Sync {
    async fn ready(&self, ctx: CancellationToken) -> Result<bool, BoxError>;
}

/// 存活探针
#[async_trait]
pub trait LivenessReporter: Send + Sync {
    async fn alive(&self, ctx: CancellationToken) -> Result<bool, BoxError>;
}

/// 函数实例
///
/// 每个进程只承载一个函数实例，由 `Service` 独占。处理请求的方法由各传输绑定的
/// 扩展 trait（`HttpFunction`、`CloudEventFunction`、`KafkaFunction`）声明。
pub trait Function: Send + Sync + 'static {
    fn as_starter(self: Arc<Self>) -> Option<Arc<dyn Starter>> {
        None
    }

    fn as_stopper(self: Arc<Self>) -> Option<Arc<dyn Stopper>> {
        None
    }

    fn as_readiness_reporter(self: Arc<Self>) -> Option<Arc<dyn ReadinessReporter>> {
        None
    }

    fn as_liveness_reporter(self: Arc<Self>) -> Option<Arc<dyn LivenessReporter>> {
        None
    }
}

/// 函数实例实现的角色集合
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub implements_start: bool,
    pub implements_stop: bool,
    pub implements_ready: bool,
    pub implements_alive: bool,
}

/// 检测函数实例实现了哪些角色
pub fn detect<F: Function>(function: &Arc<F>) -> Capabilities {
    Roles::of(function).capabilities()
}

/// 构造时解析出的角色实现
#[derive(Clone, Default)]
pub(crate) struct Roles {
    pub(crate) starter: Option<Arc<dyn Starter>>,
    pub(crate) stopper: Option<Arc<dyn Stopper>>,
    pub(crate) readiness: Option<Arc<dyn ReadinessReporter>>,
    pub(crate) liveness: Option<Arc<dyn LivenessReporter>>,
}

impl Roles {
    pub(crate) fn of<F: Function>(function: &Arc<F>) -> Self {
        Self {
            starter: function.clone().as_starter(),
            stopper: function.clone().as_stopper(),
            readiness: function.clone().as_readiness_reporter(),
            liveness: function.clone().as_liveness_reporter(),
        }
    }

    pub(crate) fn capabilities(&self) -> Capabilities {
        Capabilities {
            implements_start: self.starter.is_some(),
            implements_stop: self.stopper.is_some(),
            implements_ready: self.readiness.is_some(),
            implements_alive: self.liveness.is_some(),
        }
    }
}

impl Capabilities {
    /// 输出函数实现了哪些角色，帮助用户确认实现是否被识别
    pub fn log(&self) {
        if self.implements_start {
            info!("Function implements Start");
        } else {
            debug!("Function does not implement Start");
        }
        if self.implements_stop {
            info!("Function implements Stop");
        }
        if self.implements_ready {
            info!("Function implements Ready");
        }
        if self.implements_alive {
            info!("Function implements Alive");
        }
    }
}
