//! 运行时配置模块

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;
use tracing::warn;

use crate::config::DEFAULT_STATIC_CONFIG_PATH;
use crate::error::ConfigError;
use crate::health::DEFAULT_PROBE_TIMEOUT;

/// 默认监听地址
pub const DEFAULT_LISTEN_ADDRESS: &str = "127.0.0.1:8080";

const DEFAULT_LEGACY_HOST: &str = "127.0.0.1";
const DEFAULT_LEGACY_PORT: &str = "8080";

/// 运行时配置
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// 传输层优雅关闭超时时间（默认 30 秒）
    pub shutdown_timeout: Duration,
    /// Stop 钩子超时时间（默认 30 秒）
    pub stop_timeout: Duration,
    /// 就绪 / 存活探针超时时间（默认 10 秒）
    pub probe_timeout: Duration,
    /// HTTP 监听地址（默认 127.0.0.1:8080）
    pub listen_address: String,
    /// 静态配置文件路径（默认 ./cfg）
    pub static_config_path: PathBuf,
    /// 是否监听 SIGINT / SIGTERM（默认 true）
    pub handle_signals: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            shutdown_timeout: Duration::from_secs(30),
            stop_timeout: Duration::from_secs(30),
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            listen_address: DEFAULT_LISTEN_ADDRESS.to_string(),
            static_config_path: PathBuf::from(DEFAULT_STATIC_CONFIG_PATH),
            handle_signals: true,
        }
    }
}

/// 配置文件格式（所有字段可选，缺省使用默认值）
#[derive(Debug, Default, Deserialize)]
struct RuntimeConfigFile {
    shutdown_timeout_secs: Option<u64>,
    stop_timeout_secs: Option<u64>,
    probe_timeout_secs: Option<u64>,
    listen_address: Option<String>,
    static_config_path: Option<PathBuf>,
    handle_signals: Option<bool>,
}

impl RuntimeConfig {
    /// 创建默认配置
    pub fn new() -> Self {
        Self::default()
    }

    /// 设置传输层关闭超时时间
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// 设置 Stop 钩子超时时间
    pub fn with_stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = timeout;
        self
    }

    /// 设置探针超时时间
    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    /// 设置监听地址
    pub fn with_listen_address(mut self, address: impl Into<String>) -> Self {
        self.listen_address = address.into();
        self
    }

    /// 设置静态配置文件路径
    pub fn with_static_config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.static_config_path = path.into();
        self
    }

    /// 启用/禁用信号处理
    pub fn with_signal_handling(mut self, enable: bool) -> Self {
        self.handle_signals = enable;
        self
    }

    /// 从进程环境变量读取配置
    ///
    /// - `LISTEN_ADDRESS`（旧的 `ADDRESS` / `PORT` 仍然支持，但会输出弃用警告）
    /// - `SHUTDOWN_TIMEOUT_SECS` / `STOP_TIMEOUT_SECS` / `PROBE_TIMEOUT_SECS`
    /// - `FUNC_CONFIG_PATH`
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup<L>(lookup: L) -> Result<Self, ConfigError>
    where
        L: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        config.listen_address = listen_address(&lookup)?;
        if let Some(secs) = seconds(&lookup, "SHUTDOWN_TIMEOUT_SECS")? {
            config.shutdown_timeout = secs;
        }
        if let Some(secs) = seconds(&lookup, "STOP_TIMEOUT_SECS")? {
            config.stop_timeout = secs;
        }
        if let Some(secs) = seconds(&lookup, "PROBE_TIMEOUT_SECS")? {
            config.probe_timeout = secs;
        }
        if let Some(path) = lookup("FUNC_CONFIG_PATH").filter(|p| !p.is_empty()) {
            config.static_config_path = PathBuf::from(path);
        }

        Ok(config)
    }

    /// 从 TOML 文件加载配置，未出现的字段使用默认值
    pub fn load_from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read runtime config {}", path.display()))?;
        let file: RuntimeConfigFile = toml::from_str(&content)
            .with_context(|| format!("failed to parse runtime config {}", path.display()))?;

        let mut config = Self::default();
        if let Some(secs) = file.shutdown_timeout_secs {
            config.shutdown_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = file.stop_timeout_secs {
            config.stop_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = file.probe_timeout_secs {
            config.probe_timeout = Duration::from_secs(secs);
        }
        if let Some(address) = file.listen_address {
            validate_address(&address)?;
            config.listen_address = address;
        }
        if let Some(path) = file.static_config_path {
            config.static_config_path = path;
        }
        if let Some(enable) = file.handle_signals {
            config.handle_signals = enable;
        }
        Ok(config)
    }
}

fn listen_address<L>(lookup: &L) -> Result<String, ConfigError>
where
    L: Fn(&str) -> Option<String>,
{
    if let Some(address) = lookup("LISTEN_ADDRESS").filter(|a| !a.is_empty()) {
        validate_address(&address)?;
        return Ok(address);
    }

    let host = lookup("ADDRESS").filter(|h| !h.is_empty());
    let port = lookup("PORT").filter(|p| !p.is_empty());
    if host.is_none() && port.is_none() {
        return Ok(DEFAULT_LISTEN_ADDRESS.to_string());
    }

    if host.is_some() {
        warn!("Environment variable ADDRESS is deprecated and support will be removed in future versions, use LISTEN_ADDRESS instead");
    }
    if port.is_some() {
        warn!("Environment variable PORT is deprecated and support will be removed in future versions, use LISTEN_ADDRESS instead");
    }

    let address = format!(
        "{}:{}",
        host.as_deref().unwrap_or(DEFAULT_LEGACY_HOST),
        port.as_deref().unwrap_or(DEFAULT_LEGACY_PORT)
    );
    validate_address(&address)?;
    Ok(address)
}

/// 地址必须是 `host:port` 形式，端口为合法的 u16
fn validate_address(address: &str) -> Result<(), ConfigError> {
    match address.rsplit_once(':') {
        Some((host, port)) if !host.is_empty() && port.parse::<u16>().is_ok() => Ok(()),
        _ => Err(ConfigError::InvalidListenAddress(address.to_string())),
    }
}

fn seconds<L>(lookup: &L, key: &str) -> Result<Option<Duration>, ConfigError>
where
    L: Fn(&str) -> Option<String>,
{
    match lookup(key).filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse::<u64>()
            .map(|secs| Some(Duration::from_secs(secs)))
            .map_err(|_| ConfigError::InvalidValue {
                key: key.to_string(),
                value,
            }),
    }
}
