//! 配置
//!
//! [`BeanFactoryConfig`] 控制容器行为（可从 TOML 加载），
//! [`Environment`] 按优先级聚合多个 [`PropertySource`]，用于解析 `${key:default}` 占位符。

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use parking_lot::RwLock;
use serde::Deserialize;

use crate::error::{ContainerError, ContainerResult};
use crate::logging::LoggingConfig;

/// Bean 工厂配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BeanFactoryConfig {
    /// 是否允许同名 Bean 定义覆盖（默认：true）
    pub allow_bean_definition_overriding: bool,

    /// 是否允许通过早期引用解决单例之间的循环引用（默认：true）
    pub allow_circular_references: bool,

    /// 早期引用被注入后最终实例又被包装时，是否仍然允许（默认：false）
    pub allow_raw_injection_despite_wrapping: bool,

    /// 未显式声明时尝试调用的初始化方法名
    pub default_init_method: Option<String>,

    /// 未显式声明时尝试调用的销毁方法名
    pub default_destroy_method: Option<String>,

    /// 构造函数解析的默认模式（默认：宽松）
    pub lenient_constructor_resolution: bool,

    pub logging: LoggingConfig,
}

impl Default for BeanFactoryConfig {
    fn default() -> Self {
        Self {
            allow_bean_definition_overriding: true,
            allow_circular_references: true,
            allow_raw_injection_despite_wrapping: false,
            default_init_method: None,
            default_destroy_method: None,
            lenient_constructor_resolution: true,
            logging: LoggingConfig::default(),
        }
    }
}

impl BeanFactoryConfig {
    /// 从 TOML 字符串解析；容器配置可以放在顶层或 `[beans]` 表中
    pub fn from_toml_str(content: &str) -> ContainerResult<Self> {
        let value: toml::Value = toml::from_str(content)
            .map_err(|e| ContainerError::Config(format!("failed to parse TOML: {}", e)))?;
        let section = match value.get("beans") {
            Some(beans) => beans.clone(),
            None => value,
        };
        section
            .try_into()
            .map_err(|e: toml::de::Error| ContainerError::Config(format!("invalid bean factory configuration: {}", e)))
    }

    /// 从 TOML 文件加载
    pub fn from_file(path: impl AsRef<Path>) -> ContainerResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            ContainerError::Config(format!("failed to read config file {:?}: {}", path, e))
        })?;
        let config = Self::from_toml_str(&content)?;
        tracing::info!("Loaded bean factory configuration from {:?}", path);
        Ok(config)
    }
}

/// 配置值类型
#[derive(Debug, Clone)]
pub enum ConfigValue {
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Array(Vec<ConfigValue>),
    Object(HashMap<String, ConfigValue>),
}

impl ConfigValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ConfigValue::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ConfigValue::Int(i) => Some(*i),
            ConfigValue::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ConfigValue::Bool(b) => Some(*b),
            ConfigValue::String(s) => match s.to_lowercase().as_str() {
                "true" | "yes" | "1" => Some(true),
                "false" | "no" | "0" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    /// 占位符替换使用的文本形式
    pub fn to_text(&self) -> String {
        match self {
            ConfigValue::String(s) => s.clone(),
            ConfigValue::Int(i) => i.to_string(),
            ConfigValue::Float(f) => f.to_string(),
            ConfigValue::Bool(b) => b.to_string(),
            ConfigValue::Array(items) => items
                .iter()
                .map(ConfigValue::to_text)
                .collect::<Vec<_>>()
                .join(","),
            ConfigValue::Object(_) => String::new(),
        }
    }
}

/// 配置源 trait
pub trait PropertySource: Send + Sync {
    fn name(&self) -> &str;

    fn get(&self, key: &str) -> Option<ConfigValue>;

    /// 配置源优先级（数字越大优先级越高）
    fn priority(&self) -> i32 {
        0
    }
}

/// Environment - 配置管理器
pub struct Environment {
    /// 配置源列表（按优先级排序）
    sources: RwLock<Vec<Box<dyn PropertySource>>>,
}

impl std::fmt::Debug for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Environment")
            .field("sources", &self.sources.read().iter().map(|s| s.name().to_string()).collect::<Vec<_>>())
            .finish()
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

impl Environment {
    pub fn new() -> Self {
        Self {
            sources: RwLock::new(Vec::new()),
        }
    }

    /// 添加配置源
    pub fn add_property_source(&self, source: Box<dyn PropertySource>) {
        let mut sources = self.sources.write();
        sources.push(source);
        // 按优先级降序排序
        sources.sort_by(|a, b| b.priority().cmp(&a.priority()));
    }

    /// 获取配置值
    pub fn get(&self, key: &str) -> Option<ConfigValue> {
        let sources = self.sources.read();
        for source in sources.iter() {
            if let Some(value) = source.get(key) {
                tracing::trace!("Config '{}' found in source '{}'", key, source.name());
                return Some(value);
            }
        }
        None
    }

    pub fn get_string(&self, key: &str) -> Option<String> {
        self.get(key).map(|v| v.to_text())
    }

    /// 解析文本中的所有 `${key}` / `${key:default}` 占位符（支持嵌套）
    pub fn resolve_placeholders(&self, text: &str) -> ContainerResult<String> {
        let mut visiting = Vec::new();
        self.resolve_nested(text, &mut visiting)
    }

    fn resolve_nested(&self, text: &str, visiting: &mut Vec<String>) -> ContainerResult<String> {
        let mut result = String::with_capacity(text.len());
        let mut rest = text;
        while let Some(start) = rest.find("${") {
            result.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            let end = Self::find_placeholder_end(after).ok_or_else(|| {
                ContainerError::Config(format!("unterminated placeholder in '{}'", text))
            })?;
            let expression = self.resolve_nested(&after[..end], visiting)?;
            let (key, default) = match expression.split_once(':') {
                Some((key, default)) => (key.to_string(), Some(default.to_string())),
                None => (expression.clone(), None),
            };

            if visiting.contains(&key) {
                return Err(ContainerError::Config(format!(
                    "circular placeholder reference '{}' in property definitions",
                    key
                )));
            }

            let value = match self.get_string(&key) {
                Some(raw) => {
                    visiting.push(key.clone());
                    let resolved = self.resolve_nested(&raw, visiting);
                    visiting.pop();
                    resolved?
                }
                None => match default {
                    Some(default) => default,
                    None => {
                        return Err(ContainerError::Config(format!(
                            "could not resolve placeholder '{}' in value \"{}\"",
                            key, text
                        )))
                    }
                },
            };
            result.push_str(&value);
            rest = &after[end + 1..];
        }
        result.push_str(rest);
        Ok(result)
    }

    fn find_placeholder_end(text: &str) -> Option<usize> {
        let mut depth = 0usize;
        let bytes = text.as_bytes();
        let mut i = 0;
        while i < bytes.len() {
            if bytes[i] == b'$' && bytes.get(i + 1) == Some(&b'{') {
                depth += 1;
                i += 2;
                continue;
            }
            if bytes[i] == b'}' {
                if depth == 0 {
                    return Some(i);
                }
                depth -= 1;
            }
            i += 1;
        }
        None
    }
}

/// 环境变量配置源
pub struct EnvironmentPropertySource {
    prefix: String,
    priority: i32,
}

impl EnvironmentPropertySource {
    /// `prefix` 为环境变量前缀，例如 "APP_"
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            priority: 100,
        }
    }

    /// 例如: database.url -> APP_DATABASE_URL
    fn key_to_env(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key.replace(['.', '-'], "_").to_uppercase())
    }
}

impl PropertySource for EnvironmentPropertySource {
    fn name(&self) -> &str {
        "environment"
    }

    fn get(&self, key: &str) -> Option<ConfigValue> {
        std::env::var(self.key_to_env(key)).ok().map(ConfigValue::String)
    }

    fn priority(&self) -> i32 {
        self.priority
    }
}

/// TOML 配置源
pub struct TomlPropertySource {
    name: String,
    properties: HashMap<String, ConfigValue>,
    priority: i32,
}

impl TomlPropertySource {
    /// 从文件加载 TOML 配置
    pub fn from_file(path: impl AsRef<Path>) -> ContainerResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            ContainerError::Config(format!("failed to read config file {:?}: {}", path, e))
        })?;
        Self::from_toml(&content, path.to_string_lossy().to_string())
    }

    /// 从字符串解析 TOML 配置
    pub fn from_toml(content: &str, name: impl Into<String>) -> ContainerResult<Self> {
        let value: toml::Value = toml::from_str(content)
            .map_err(|e| ContainerError::Config(format!("failed to parse TOML: {}", e)))?;

        let mut properties = HashMap::new();
        Self::flatten_toml(&value, String::new(), &mut properties);

        Ok(Self {
            name: name.into(),
            properties,
            priority: 0,
        })
    }

    /// 展平 TOML 结构，例如 `{ database: { url: "x" } }` -> `database.url`
    fn flatten_toml(value: &toml::Value, prefix: String, result: &mut HashMap<String, ConfigValue>) {
        match value {
            toml::Value::Table(table) => {
                for (key, val) in table {
                    let new_prefix = if prefix.is_empty() {
                        key.clone()
                    } else {
                        format!("{}.{}", prefix, key)
                    };
                    Self::flatten_toml(val, new_prefix, result);
                }
            }
            other => {
                result.insert(prefix, Self::toml_value_to_config(other));
            }
        }
    }

    fn toml_value_to_config(value: &toml::Value) -> ConfigValue {
        match value {
            toml::Value::String(s) => ConfigValue::String(s.clone()),
            toml::Value::Integer(i) => ConfigValue::Int(*i),
            toml::Value::Float(f) => ConfigValue::Float(*f),
            toml::Value::Boolean(b) => ConfigValue::Bool(*b),
            toml::Value::Array(arr) => {
                ConfigValue::Array(arr.iter().map(Self::toml_value_to_config).collect())
            }
            toml::Value::Table(table) => ConfigValue::Object(
                table
                    .iter()
                    .map(|(k, v)| (k.clone(), Self::toml_value_to_config(v)))
                    .collect(),
            ),
            toml::Value::Datetime(dt) => ConfigValue::String(dt.to_string()),
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

impl PropertySource for TomlPropertySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn get(&self, key: &str) -> Option<ConfigValue> {
        self.properties.get(key).cloned()
    }

    fn priority(&self) -> i32 {
        self.priority
    }
}

/// 内存配置源（用于测试或运行时配置）
pub struct MapPropertySource {
    name: String,
    properties: HashMap<String, ConfigValue>,
    priority: i32,
}

impl MapPropertySource {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            properties: HashMap::new(),
            priority: 50,
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: ConfigValue) -> Self {
        self.properties.insert(key.into(), value);
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

impl PropertySource for MapPropertySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn get(&self, key: &str) -> Option<ConfigValue> {
        self.properties.get(key).cloned()
    }

    fn priority(&self) -> i32 {
        self.priority
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn environment() -> Environment {
        let env = Environment::new();
        env.add_property_source(Box::new(
            MapPropertySource::new("defaults")
                .with_property("app.name", ConfigValue::String("demo".into()))
                .with_property("app.port", ConfigValue::Int(8080))
                .with_property("app.url", ConfigValue::String("http://${app.name}:${app.port}".into())),
        ));
        env
    }

    #[test]
    fn test_placeholder_resolution() {
        let env = environment();
        assert_eq!(env.resolve_placeholders("${app.name}").unwrap(), "demo");
        assert_eq!(env.resolve_placeholders("${app.url}/api").unwrap(), "http://demo:8080/api");
        assert_eq!(env.resolve_placeholders("${missing:fallback}").unwrap(), "fallback");
        assert_eq!(env.resolve_placeholders("${missing:${app.name}}").unwrap(), "demo");
        assert!(env.resolve_placeholders("${missing}").is_err());
        assert!(env.resolve_placeholders("${app.name").is_err());
    }

    #[test]
    fn test_priority_order() {
        let env = environment();
        env.add_property_source(Box::new(
            MapPropertySource::new("overrides")
                .with_property("app.name", ConfigValue::String("override".into()))
                .with_priority(200),
        ));
        assert_eq!(env.get_string("app.name").as_deref(), Some("override"));
    }

    #[test]
    fn test_environment_source_maps_keys_and_wins_over_defaults() {
        std::env::set_var("CHIMERA_TEST_APP_NAME", "from-env");
        let env = environment();
        env.add_property_source(Box::new(EnvironmentPropertySource::new("CHIMERA_TEST_")));

        assert_eq!(env.get_string("app.name").as_deref(), Some("from-env"));
        assert_eq!(env.get_string("app.port").as_deref(), Some("8080"));
        std::env::remove_var("CHIMERA_TEST_APP_NAME");
    }

    #[test]
    fn test_toml_source_flattens_tables() {
        let source = TomlPropertySource::from_toml("[database]\nurl = \"db://local\"\npool = 4", "inline").unwrap();
        assert_eq!(source.get("database.url").unwrap().as_str(), Some("db://local"));
        assert_eq!(source.get("database.pool").unwrap().as_i64(), Some(4));
    }

    #[test]
    fn test_bean_factory_config_from_toml() {
        let config = BeanFactoryConfig::from_toml_str(
            "[beans]\nallow_circular_references = false\ndefault_init_method = \"init\"\n[beans.logging]\nlevel = \"debug\"",
        )
        .unwrap();
        assert!(!config.allow_circular_references);
        assert!(config.allow_bean_definition_overriding);
        assert_eq!(config.default_init_method.as_deref(), Some("init"));
        assert_eq!(config.logging.level, crate::logging::LogLevel::Debug);
    }
}
