//! 日志初始化
//!
//! 容器本身只通过 `tracing` 宏输出：里程碑用 info，创建事件用 debug，逐步细节用 trace，
//! 可恢复的问题用 warn。这里提供一个可选的订阅器配置，可以嵌入在 [`BeanFactoryConfig`]
//! 的 `[beans.logging]` 表中，也可以从环境变量读取。
//!
//! [`BeanFactoryConfig`]: crate::config::BeanFactoryConfig

use std::str::FromStr;

use serde::Deserialize;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};

use crate::error::{ContainerError, ContainerResult};

/// 只打开容器自身逐步日志的过滤指令
pub const CONTAINER_TRACE_DIRECTIVE: &str = "chimera_beans=trace";

/// 日志级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    #[serde(alias = "warning")]
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl FromStr for LogLevel {
    type Err = ContainerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            _ => Err(ContainerError::Config(format!("invalid log level: {}", s))),
        }
    }
}

/// 输出格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// 紧凑格式（默认）
    Compact,
    /// 带时间、级别、目标
    Full,
    Json,
    /// 多行美化格式，适合开发
    Pretty,
}

impl FromStr for LogFormat {
    type Err = ContainerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "compact" => Ok(LogFormat::Compact),
            "full" => Ok(LogFormat::Full),
            "json" => Ok(LogFormat::Json),
            "pretty" => Ok(LogFormat::Pretty),
            _ => Err(ContainerError::Config(format!("invalid log format: {}", s))),
        }
    }
}

/// 日志配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: LogLevel,
    pub format: LogFormat,
    /// 显示目标（模块路径）
    pub show_target: bool,
    /// 并发创建问题排查时很有用
    pub show_thread_ids: bool,
    pub show_thread_names: bool,
    /// EnvFilter 指令，优先于 `level`
    pub filter: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            format: LogFormat::Compact,
            show_target: false,
            show_thread_ids: false,
            show_thread_names: false,
            filter: None,
        }
    }
}

impl LoggingConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    pub fn format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn show_target(mut self, show: bool) -> Self {
        self.show_target = show;
        self
    }

    pub fn show_thread_ids(mut self, show: bool) -> Self {
        self.show_thread_ids = show;
        self
    }

    pub fn filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    /// 读取 `RUST_LOG`、`LOG_LEVEL`、`LOG_FORMAT`，无法识别的值保持默认
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(filter) = lookup("RUST_LOG") {
            config.filter = Some(filter);
        }
        if let Some(level) = lookup("LOG_LEVEL").and_then(|v| v.parse().ok()) {
            config.level = level;
        }
        if let Some(format) = lookup("LOG_FORMAT").and_then(|v| v.parse().ok()) {
            config.format = format;
        }
        config
    }

    /// 实际使用的过滤指令
    pub fn directives(&self) -> String {
        match &self.filter {
            Some(filter) if EnvFilter::try_new(filter).is_ok() => filter.clone(),
            Some(filter) => {
                tracing::warn!("Ignoring invalid log filter '{}', using level '{}'", filter, self.level.as_str());
                self.level.as_str().to_string()
            }
            None => self.level.as_str().to_string(),
        }
    }

    fn layer(&self) -> Box<dyn Layer<Registry> + Send + Sync> {
        let base = fmt::layer()
            .with_target(self.show_target)
            .with_thread_ids(self.show_thread_ids)
            .with_thread_names(self.show_thread_names);
        match self.format {
            LogFormat::Compact => base.compact().boxed(),
            LogFormat::Full => base.boxed(),
            LogFormat::Json => base.json().boxed(),
            LogFormat::Pretty => base.pretty().boxed(),
        }
    }

    /// 安装全局订阅器；已经安装过时返回配置错误
    pub fn init(self) -> ContainerResult<()> {
        let filter = EnvFilter::new(self.directives());
        tracing_subscriber::registry()
            .with(self.layer())
            .with(filter)
            .try_init()
            .map_err(|e| ContainerError::Config(format!("failed to initialize logging: {}", e)))
    }
}
