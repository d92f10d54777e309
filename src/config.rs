//! 函数配置构建
//!
//! 函数实例在 Start 钩子中收到的配置由两部分合并而成：
//! 1. 静态配置文件（默认 `./cfg`，每行一个 `key=value`，优先级最低）
//! 2. 进程环境变量（优先级最高，同名键覆盖静态值）
//!
//! 每次 `start` 构建一次，按值交给 Start 钩子，运行时不再保留。

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::ConfigError;

/// 传递给 Start 钩子的配置
pub type Config = HashMap<String, String>;

/// 默认静态配置文件路径
pub const DEFAULT_STATIC_CONFIG_PATH: &str = "cfg";

/// 配置构建器
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    static_path: PathBuf,
    environment: Option<Vec<(String, String)>>,
}

impl ConfigBuilder {
    /// 使用默认静态配置路径创建构建器
    pub fn new() -> Self {
        Self {
            static_path: PathBuf::from(DEFAULT_STATIC_CONFIG_PATH),
            environment: None,
        }
    }

    /// 设置静态配置文件路径
    pub fn static_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.static_path = path.into();
        self
    }

    /// 替换环境变量来源（默认读取进程环境）
    pub fn environment<I, K, V>(mut self, vars: I) -> Self
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

    pub fn static_path(&self) -> &Path {
        &self.static_path
    }

    /// 构建最终配置：静态值在前，环境变量覆盖
    pub fn build(&self) -> Result<Config, ConfigError> {
        let mut config = read_static(&self.static_path)?;

        match &self.environment {
            Some(vars) => {
                for (key, value) in vars {
                    config.insert(key.clone(), value.clone());
                }
            }
            None => {
                for (key, value) in std::env::vars_os() {
                    match (key.into_string(), value.into_string()) {
                        (Ok(key), Ok(value)) => {
                            config.insert(key, value);
                        }
                        (Ok(key), Err(_)) => {
                            debug!(key = %key, "skipping environment variable with non UTF-8 value");
                        }
                        (Err(key), _) => {
                            debug!(key = %key.to_string_lossy(), "skipping non UTF-8 environment variable");
                        }
                    }
                }
            }
        }

        Ok(config)
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// 读取静态配置文件
///
/// 文件不存在时返回空配置。空行被忽略；键和值两端空白被去除，值两端的双引号被去除；
/// 任何不含 `=` 的非空行都会使整个构建失败。
pub fn read_static(path: &Path) -> Result<Config, ConfigError> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "no static config");
            return Ok(Config::new());
        }
        Err(source) => {
            return Err(ConfigError::Read {
                path: path.to_path_buf(),
                source,
            });
        }
    };

    parse_static(&content)
}

/// 解析 `key=value` 行格式的静态配置内容
pub fn parse_static(content: &str) -> Result<Config, ConfigError> {
    let mut config = Config::new();

    for (index, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            return Err(ConfigError::MalformedLine {
                line: index + 1,
                content: line.to_string(),
            });
        };
        config.insert(
            key.trim().to_string(),
            value.trim().trim_matches('"').to_string(),
        );
    }

    Ok(config)
}
