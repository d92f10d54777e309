//! Flare Function Runtime 错误处理模块
//!
//! 错误按来源分类：
//! - [`ConfigError`]：静态配置文件或运行时配置不合法（启动前失败）
//! - [`SignatureError`]：函数实例不符合任何受支持的处理签名（构造时失败）
//! - [`HookError`]：Start / Stop / Ready / Alive 钩子失败、超时或 panic
//! - [`TransportError`]：传输层绑定、服务或关闭失败
//!
//! 运行期错误通过 StopSignal 传递，最终由 [`RuntimeError`] 汇总返回给 `start` 的调用方。

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// 用户钩子与处理函数返回的错误类型
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// 运行时结果类型别名
pub type Result<T, E = RuntimeError> = std::result::Result<T, E>;

/// 运行时统一错误类型
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Signature(#[from] SignatureError),

    #[error(transparent)]
    Hook(#[from] HookError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl RuntimeError {
    /// 错误类别名称，用于日志字段
    pub fn kind(&self) -> &'static str {
        match self {
            RuntimeError::Config(_) => "config",
            RuntimeError::Signature(_) => "signature",
            RuntimeError::Hook(_) => "hook",
            RuntimeError::Transport(_) => "transport",
        }
    }
}

/// 配置错误
#[derive(Error, Debug)]
pub enum ConfigError {
    /// 静态配置文件存在但无法读取
    #[error("failed to read static config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// 静态配置文件中某一行不是 `key=value` 形式
    #[error("config line {line} invalid: {content}")]
    MalformedLine { line: usize, content: String },

    /// 监听地址无法解析
    #[error("invalid listen address '{0}'")]
    InvalidListenAddress(String),

    /// 配置项的值不合法
    #[error("invalid value '{value}' for {key}")]
    InvalidValue { key: String, value: String },
}

/// 处理签名解析错误
#[derive(Error, Debug)]
pub enum SignatureError {
    /// 函数实例没有实现任何受支持的处理签名
    #[error("{function} does not implement a supported {binding} handler signature")]
    Unsupported {
        binding: &'static str,
        function: &'static str,
    },
}

/// 生命周期钩子错误
#[derive(Error, Debug)]
pub enum HookError {
    #[error("function start failed: {0}")]
    Start(#[source] BoxError),

    #[error("function stop failed: {0}")]
    Stop(#[source] BoxError),

    #[error("function stop did not complete within {0:?}")]
    StopTimeout(Duration),

    #[error("error checking readiness: {0}")]
    Ready(#[source] BoxError),

    #[error("error checking liveness: {0}")]
    Alive(#[source] BoxError),

    #[error("{hook} hook did not complete within {timeout:?}")]
    Timeout {
        hook: &'static str,
        timeout: Duration,
    },

    #[error("{hook} hook panicked: {message}")]
    Panicked { hook: &'static str, message: String },
}

/// 传输层错误
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: io::Error,
    },

    #[error("transport used before bind")]
    NotBound,

    #[error("{transport} exited with unexpected error: {source}")]
    Serve {
        transport: &'static str,
        #[source]
        source: BoxError,
    },

    #[error("transport did not close within {0:?}")]
    CloseTimeout(Duration),

    #[error("transport task panicked: {0}")]
    Panicked(String),

    #[error("message handling failed: {0}")]
    Dispatch(#[source] BoxError),

    #[error("kafka error: {0}")]
    Kafka(String),
}

/// 从 panic 负载中提取可读信息
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
