//! 函数运行时
//!
//! 把单个函数实例作为长期运行的服务承载在某个传输层上，负责：
//!
//! 1. **配置构建**：静态配置文件 + 进程环境变量，交给 Start 钩子
//! 2. **生命周期编排**：绑定、启动钩子、服务、信号等待、优雅关闭
//! 3. **错误汇总**：独立失败的子系统（传输层、钩子、信号）收敛为一个确定的结果
//!
//! # 使用示例
//!
//! ```rust,ignore
//! use flare_func_runtime::http::HttpTransport;
//! use flare_func_runtime::runtime::{RuntimeConfig, Service, exit_code};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> std::process::ExitCode {
//!     let config = RuntimeConfig::from_env().expect("runtime config");
//!     let transport = HttpTransport::new(&config.listen_address);
//!     let result = match Service::new(MyFunction::default(), transport) {
//!         Ok(service) => service.with_config(config).start(CancellationToken::new()).await,
//!         Err(e) => Err(e),
//!     };
//!     exit_code(&result)
//! }
//! ```

pub mod config;
pub(crate) mod hook;
pub mod service;
pub(crate) mod signal;

pub use config::{DEFAULT_LISTEN_ADDRESS, RuntimeConfig};
pub use service::{Service, ServiceState, ServiceStatus, exit_code};
