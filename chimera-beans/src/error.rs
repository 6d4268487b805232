//! 统一的错误类型
//!
//! 容器内部使用 [`ContainerError`] 描述每一种失败，用户提供的构造函数、
//! setter、init/destroy 方法返回 `anyhow::Result`，由容器包装成带 Bean 名称的错误。

use std::fmt;

/// Bean 创建过程中的生命周期阶段
///
/// 用于标记 [`ContainerError::LifecyclePhase`] 发生在哪个阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecyclePhase {
    Requested,
    ClassResolved,
    PreInstantiationHook,
    Instantiated,
    EarlyExposed,
    Populated,
    Initialized,
    PostInitialized,
    Registered,
}

impl fmt::Display for LifecyclePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecyclePhase::Requested => "requested",
            LifecyclePhase::ClassResolved => "class-resolved",
            LifecyclePhase::PreInstantiationHook => "pre-instantiation",
            LifecyclePhase::Instantiated => "instantiated",
            LifecyclePhase::EarlyExposed => "early-exposed",
            LifecyclePhase::Populated => "populated",
            LifecyclePhase::Initialized => "initialized",
            LifecyclePhase::PostInitialized => "post-initialized",
            LifecyclePhase::Registered => "registered",
        };
        f.write_str(name)
    }
}

/// 容器错误
#[derive(Debug, thiserror::Error)]
pub enum ContainerError {
    /// 找不到指定名称的 Bean 定义
    #[error("No bean named '{name}' available")]
    NoSuchDefinition { name: String },

    /// 找不到指定类型的 Bean
    #[error("No qualifying bean of type '{type_name}' available")]
    NoSuchBeanOfType { type_name: String },

    /// 没有可用的构造函数或工厂方法
    #[error("Error creating bean '{bean}'{}: {detail}", origin(.resource))]
    NoMatchingExecutable {
        bean: String,
        resource: Option<String>,
        detail: String,
        #[source]
        cause: Option<Box<ContainerError>>,
    },

    /// 存在多个同等匹配的构造函数或工厂方法（严格模式）
    #[error(
        "Error creating bean '{bean}'{}: ambiguous {kind} matches found (hint: specify index/type/name arguments for simple parameters to avoid type ambiguities): {candidates:?}",
        origin(.resource)
    )]
    AmbiguousExecutable {
        bean: String,
        resource: Option<String>,
        kind: &'static str,
        candidates: Vec<String>,
    },

    /// 工厂方法无效（例如返回 void）
    #[error("Invalid factory method '{method}' on bean '{bean}'{}: {reason}", origin(.resource))]
    InvalidFactoryMethod {
        bean: String,
        resource: Option<String>,
        method: String,
        reason: String,
    },

    /// 实例化失败（构造函数、工厂方法或 supplier 返回错误）
    #[error("Failed to instantiate bean '{bean}' of type [{type_name}]: {message}")]
    Instantiation {
        bean: String,
        type_name: String,
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    /// 依赖无法满足
    #[error(
        "Error creating bean '{bean}'{}: unsatisfied dependency expressed through {injection_point}: {reason}",
        origin(.resource)
    )]
    UnsatisfiedDependency {
        bean: String,
        resource: Option<String>,
        injection_point: String,
        reason: String,
        #[source]
        cause: Option<Box<ContainerError>>,
    },

    /// 按类型查找到多个候选且无法区分
    #[error(
        "No qualifying bean of type '{type_name}' for {injection_point}: expected single matching bean but found {}: {}",
        .candidates.len(),
        .candidates.join(",")
    )]
    AmbiguousDependency {
        injection_point: String,
        type_name: String,
        candidates: Vec<String>,
    },

    /// 类型转换失败
    #[error("Failed to convert value of type '{value_type}' to required type '{required_type}'{}: {reason}", target(.property))]
    TypeConversion {
        value_type: String,
        required_type: String,
        property: Option<String>,
        reason: String,
    },

    /// 无法解决的循环依赖
    #[error("Error creating bean '{bean}': requested bean is currently in creation: is there an unresolvable circular reference? ({message})")]
    CircularDependency { bean: String, message: String },

    /// 原始 Bean 已被注入到其他 Bean 中，但最终版本被包装
    #[error(
        "Bean with name '{bean}' has been injected into other beans [{}] in its raw version as part of a circular reference, but has eventually been wrapped; those beans do not use the final version of the bean",
        .dependents.join(",")
    )]
    RawReferenceEscaped { bean: String, dependents: Vec<String> },

    /// 生命周期某一阶段的钩子或回调失败
    #[error("Error creating bean '{bean}'{} during {phase} phase: {source}", origin(.resource))]
    LifecyclePhase {
        bean: String,
        resource: Option<String>,
        phase: LifecyclePhase,
        #[source]
        source: anyhow::Error,
    },

    /// Bean 定义注册或合并失败
    #[error("Invalid bean definition with name '{name}': {reason}")]
    BeanDefinitionStore { name: String, reason: String },

    /// 抽象 Bean 定义不能被实例化
    #[error("Bean definition '{name}' is abstract")]
    BeanIsAbstract { name: String },

    /// Bean 的实际类型与请求类型不匹配
    #[error("Bean named '{name}' is expected to be of type '{required}' but was actually of type '{actual}'")]
    BeanNotOfRequiredType {
        name: String,
        required: String,
        actual: String,
    },

    /// 以 `&` 前缀请求了一个不是 FactoryBean 的 Bean
    #[error("Bean named '{name}' is expected to be a FactoryBean but was of type '{actual}'")]
    BeanIsNotAFactory { name: String, actual: String },

    /// 属性不可写
    #[error("Invalid property '{property}' of bean '{bean}': bean type [{type_name}] has no writable property with that name")]
    NotWritableProperty {
        bean: String,
        property: String,
        type_name: String,
    },

    /// 容器正在销毁单例，不允许再创建
    #[error("Singleton bean creation not allowed while singletons of this factory are in destruction: '{name}'")]
    CreationNotAllowed { name: String },

    /// 没有为自定义作用域注册处理器
    #[error("No scope registered for scope name '{scope}' (bean '{bean}')")]
    NoSuchScope { bean: String, scope: String },

    /// 配置加载失败
    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

fn origin(resource: &Option<String>) -> String {
    match resource {
        Some(resource) => format!(" defined in {}", resource),
        None => String::new(),
    }
}

fn target(property: &Option<String>) -> String {
    match property {
        Some(property) => format!(" for property '{}'", property),
        None => String::new(),
    }
}

impl ContainerError {
    /// 发生错误的 Bean 名称（如果可用）
    pub fn bean_name(&self) -> Option<&str> {
        match self {
            ContainerError::NoSuchDefinition { name }
            | ContainerError::BeanDefinitionStore { name, .. }
            | ContainerError::BeanIsAbstract { name }
            | ContainerError::BeanNotOfRequiredType { name, .. }
            | ContainerError::BeanIsNotAFactory { name, .. }
            | ContainerError::CreationNotAllowed { name } => Some(name),
            ContainerError::NoMatchingExecutable { bean, .. }
            | ContainerError::AmbiguousExecutable { bean, .. }
            | ContainerError::InvalidFactoryMethod { bean, .. }
            | ContainerError::Instantiation { bean, .. }
            | ContainerError::UnsatisfiedDependency { bean, .. }
            | ContainerError::CircularDependency { bean, .. }
            | ContainerError::RawReferenceEscaped { bean, .. }
            | ContainerError::LifecyclePhase { bean, .. }
            | ContainerError::NotWritableProperty { bean, .. }
            | ContainerError::NoSuchScope { bean, .. } => Some(bean),
            _ => None,
        }
    }

    /// 是否为循环依赖错误（包括被包装的情况）
    pub fn is_circular_dependency(&self) -> bool {
        self.find_cause(|e| matches!(e, ContainerError::CircularDependency { .. }))
            .is_some()
    }

    /// 沿着错误链查找第一个满足条件的 [`ContainerError`]
    pub fn find_cause<F>(&self, predicate: F) -> Option<&ContainerError>
    where
        F: Fn(&ContainerError) -> bool,
    {
        let mut current: Option<&(dyn std::error::Error + 'static)> = Some(self);
        while let Some(err) = current {
            if let Some(container_error) = err.downcast_ref::<ContainerError>() {
                if predicate(container_error) {
                    return Some(container_error);
                }
            }
            current = match err.downcast_ref::<ContainerError>() {
                Some(ContainerError::LifecyclePhase { source, .. }) => Some(source.as_ref()),
                Some(ContainerError::Other(source)) => Some(source.as_ref()),
                Some(ContainerError::Instantiation { source: Some(source), .. }) => Some(source.as_ref()),
                Some(ContainerError::NoMatchingExecutable { cause: Some(cause), .. })
                | Some(ContainerError::UnsatisfiedDependency { cause: Some(cause), .. }) => {
                    Some(cause.as_ref())
                }
                _ => err.source(),
            };
        }
        None
    }

    pub(crate) fn lifecycle(
        bean: &str,
        resource: Option<&str>,
        phase: LifecyclePhase,
        source: impl Into<anyhow::Error>,
    ) -> Self {
        ContainerError::LifecyclePhase {
            bean: bean.to_string(),
            resource: resource.map(str::to_string),
            phase,
            source: source.into(),
        }
    }
}

/// 容器操作的结果类型
pub type ContainerResult<T> = std::result::Result<T, ContainerError>;

/// 应用层统一结果类型，与框架其他部分保持一致使用 anyhow
pub type Result<T> = anyhow::Result<T>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_cause_through_lifecycle_wrapper() {
        let inner = ContainerError::CircularDependency {
            bean: "a".to_string(),
            message: "a -> b -> a".to_string(),
        };
        let outer = ContainerError::lifecycle("b", None, LifecyclePhase::Populated, inner);

        assert!(outer.is_circular_dependency());
        assert_eq!(outer.bean_name(), Some("b"));
    }

    #[test]
    fn test_display_includes_resource() {
        let err = ContainerError::AmbiguousExecutable {
            bean: "widget".to_string(),
            resource: Some("app.toml".to_string()),
            kind: "constructor",
            candidates: vec!["Widget(i64)".to_string(), "Widget(f64)".to_string()],
        };
        let text = err.to_string();
        assert!(text.contains("'widget' defined in app.toml"));
        assert!(text.contains("ambiguous constructor"));
    }
}
