//! Flare Function Runtime
//!
//! 把一个用户函数实例作为长期运行的网络服务承载在 HTTP、CloudEvents over HTTP 或 Kafka 上，
//! 负责角色检测、处理签名解析、配置构建、生命周期编排以及优雅停机。

pub mod config;
pub mod error;
pub mod function;
pub mod health;
pub mod metrics;
pub mod signature;
pub mod telemetry;
pub mod transport;

// 函数运行时
pub mod runtime;

// 传输绑定
pub mod cloudevents;
pub mod http;
pub mod kafka;

// Re-exports
pub use config::{Config, ConfigBuilder};
pub use error::{
    BoxError, ConfigError, HookError, Result, RuntimeError, SignatureError, TransportError,
};
pub use function::{
    Capabilities, Function, LivenessReporter, ReadinessReporter, Starter, Stopper, detect,
};
pub use health::{HealthStatus, Probes};
pub use metrics::{Metrics, MetricsCollector};
pub use signature::{DefaultHandler, Invocation, Resolution};
pub use transport::{Binding, Dispatch, DispatchError, Transport};

// 运行时 re-exports
pub use runtime::{RuntimeConfig, Service, ServiceState, ServiceStatus, exit_code};

// 传输绑定 re-exports
pub use cloudevents::{CloudEventFunction, CloudEventsTransport, Event};
pub use http::{HttpFunction, HttpTransport};
pub use kafka::{KafkaFunction, KafkaMessage, KafkaSettings, MessageErrorPolicy};
#[cfg(feature = "kafka")]
pub use kafka::KafkaTransport;

pub use async_trait::async_trait;
pub use tokio_util::sync::CancellationToken;
