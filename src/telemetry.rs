//! 日志初始化
//!
//! 库代码只使用 `tracing` 宏，不安装全局订阅者。进程入口调用 [`init_logging`] 安装全局订阅者，
//! 或者用 [`build_dispatch`] 构建分发器注入 `Service::with_logger`。

use std::str::FromStr;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

use crate::error::ConfigError;

const DEFAULT_FILTER: &str = "info";

/// 日志输出格式
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "text" | "pretty" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            _ => Err(ConfigError::InvalidValue {
                key: "LOG_FORMAT".to_string(),
                value: value.to_string(),
            }),
        }
    }
}

fn filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

fn layer(format: LogFormat) -> Box<dyn Layer<Registry> + Send + Sync> {
    match format {
        LogFormat::Text => tracing_subscriber::fmt::layer().with_filter(filter()).boxed(),
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_filter(filter())
            .boxed(),
    }
}

/// 安装全局订阅者（`RUST_LOG` 控制级别，默认 info）
///
/// 已经安装过订阅者时返回错误而不是 panic。
pub fn init_logging(format: LogFormat) -> Result<(), tracing_subscriber::util::TryInitError> {
    tracing_subscriber::registry().with(layer(format)).try_init()
}

/// 构建同样配置的分发器，但不安装为全局默认
pub fn build_dispatch(format: LogFormat) -> tracing::Dispatch {
    tracing::Dispatch::new(tracing_subscriber::registry().with(layer(format)))
}
