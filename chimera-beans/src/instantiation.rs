//! 实例化策略
//!
//! 负责原始对象的创建：调用已解析的构造函数 / 工厂方法，或者 supplier。
//! 声明了方法注入覆盖的定义需要 [`OverridingInstantiationStrategy`]：Rust 不能在运行时生成子类，
//! 因此可被覆盖的类型在自身上持有一个 [`MethodOverrideSlot`]，实例创建后由策略安装分派器，
//! 被覆盖的方法通过槽位把调用转给容器，其余方法照常执行。

use std::any::Any;
use std::fmt;
use std::sync::{Arc, OnceLock, Weak};

use anyhow::anyhow;

use crate::bean::{BeanDefinition, MethodOverride};
use crate::bean_factory::{BeanFactory, DefaultListableBeanFactory};
use crate::error::{ContainerError, ContainerResult};
use crate::lifecycle::MethodReplacer;
use crate::metadata::{Executable, ExecutableKind};
use crate::value::{BeanInstance, TypeKey, Value};

/// 方法分派器 - 决定被覆盖的方法如何执行
pub trait MethodInterceptor: Send + Sync {
    fn is_overridden(&self, method: &str) -> bool;

    /// 查找方法：返回 None 表示该方法没有查找覆盖
    fn lookup(&self, method: &str, required: TypeKey) -> Option<ContainerResult<BeanInstance>>;

    /// 替换方法：返回 None 表示该方法没有替换覆盖
    fn replace(
        &self,
        target: &(dyn Any + Send + Sync),
        method: &str,
        args: Vec<Value>,
    ) -> Option<anyhow::Result<Value>>;
}

/// 方法注入槽位，由可覆盖方法的类型作为字段持有
///
/// ```ignore
/// struct CommandManager {
///     overrides: MethodOverrideSlot,
/// }
///
/// impl CommandManager {
///     fn create_command(&self) -> Arc<Command> {
///         match self.overrides.lookup::<Command>("create_command") {
///             Some(Ok(command)) => command,
///             _ => Arc::new(Command::default()),
///         }
///     }
/// }
/// ```
#[derive(Default)]
pub struct MethodOverrideSlot {
    interceptor: OnceLock<Arc<dyn MethodInterceptor>>,
}

impl MethodOverrideSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_overridden(&self, method: &str) -> bool {
        self.interceptor
            .get()
            .is_some_and(|interceptor| interceptor.is_overridden(method))
    }

    /// 执行查找覆盖；方法未被覆盖时返回 None，调用方执行原本的实现
    pub fn lookup<R>(&self, method: &str) -> Option<anyhow::Result<Arc<R>>>
    where
        R: ?Sized + Send + Sync + 'static,
    {
        let interceptor = self.interceptor.get()?;
        let result = interceptor.lookup(method, TypeKey::of::<R>())?;
        Some(
            result
                .map_err(anyhow::Error::from)
                .and_then(|instance| instance.try_downcast::<R>()),
        )
    }

    /// 执行替换覆盖；方法未被覆盖时返回 None
    pub fn replace(
        &self,
        target: &(dyn Any + Send + Sync),
        method: &str,
        args: Vec<Value>,
    ) -> Option<anyhow::Result<Value>> {
        self.interceptor.get()?.replace(target, method, args)
    }

    pub(crate) fn install(&self, interceptor: Arc<dyn MethodInterceptor>) -> bool {
        self.interceptor.set(interceptor).is_ok()
    }
}

impl fmt::Debug for MethodOverrideSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodOverrideSlot")
            .field("installed", &self.interceptor.get().is_some())
            .finish()
    }
}

/// 实例化策略
pub trait InstantiationStrategy: Send + Sync {
    /// 用已解析的参数调用构造函数或工厂方法；实例工厂方法需要 `factory_target`
    fn instantiate(
        &self,
        definition: &BeanDefinition,
        bean_name: &str,
        executable: &Executable,
        factory_target: Option<&BeanInstance>,
        args: Vec<Value>,
        owner: &DefaultListableBeanFactory,
    ) -> ContainerResult<BeanInstance>;
}

fn invoke_executable(
    definition: &BeanDefinition,
    bean_name: &str,
    executable: &Executable,
    factory_target: Option<&BeanInstance>,
    args: Vec<Value>,
) -> ContainerResult<BeanInstance> {
    if !executable.is_public() && !definition.non_public_access_allowed {
        return Err(ContainerError::Instantiation {
            bean: bean_name.to_string(),
            type_name: executable.declaring_type().name().to_string(),
            message: format!("non-public access to {} is not allowed", executable.signature()),
            source: None,
        });
    }

    tracing::trace!("Invoking {} for bean '{}'", executable.signature(), bean_name);
    match executable.invoke(factory_target, args) {
        Ok(Some(instance)) => Ok(instance),
        Ok(None) => Err(ContainerError::InvalidFactoryMethod {
            bean: bean_name.to_string(),
            resource: definition.resource_description.clone(),
            method: executable.signature(),
            reason: "factory method returned no value".to_string(),
        }),
        Err(e) => {
            let message = match executable.kind() {
                ExecutableKind::Constructor => format!("constructor {} threw exception", executable.signature()),
                _ => format!("factory method {} threw exception", executable.signature()),
            };
            Err(ContainerError::Instantiation {
                bean: bean_name.to_string(),
                type_name: executable.declaring_type().name().to_string(),
                message,
                source: Some(e),
            })
        }
    }
}

/// 只支持直接调用的策略，拒绝方法注入
#[derive(Debug, Default)]
pub struct SimpleInstantiationStrategy;

impl InstantiationStrategy for SimpleInstantiationStrategy {
    fn instantiate(
        &self,
        definition: &BeanDefinition,
        bean_name: &str,
        executable: &Executable,
        factory_target: Option<&BeanInstance>,
        args: Vec<Value>,
        _owner: &DefaultListableBeanFactory,
    ) -> ContainerResult<BeanInstance> {
        if !definition.method_overrides.is_empty() {
            return Err(ContainerError::Instantiation {
                bean: bean_name.to_string(),
                type_name: executable.declaring_type().name().to_string(),
                message: "method injection not supported by SimpleInstantiationStrategy".to_string(),
                source: None,
            });
        }
        invoke_executable(definition, bean_name, executable, factory_target, args)
    }
}

/// 默认策略：直接调用，并为声明了方法覆盖的定义安装分派器
#[derive(Debug, Default)]
pub struct OverridingInstantiationStrategy;

impl InstantiationStrategy for OverridingInstantiationStrategy {
    fn instantiate(
        &self,
        definition: &BeanDefinition,
        bean_name: &str,
        executable: &Executable,
        factory_target: Option<&BeanInstance>,
        args: Vec<Value>,
        owner: &DefaultListableBeanFactory,
    ) -> ContainerResult<BeanInstance> {
        let instance = invoke_executable(definition, bean_name, executable, factory_target, args)?;
        if definition.method_overrides.is_empty() {
            return Ok(instance);
        }

        let installed = owner
            .catalog()
            .get(instance.type_key())
            .map(|meta| {
                meta.install_interceptor(
                    &instance,
                    Arc::new(ContainerMethodInterceptor {
                        bean_name: bean_name.to_string(),
                        overrides: definition.method_overrides.clone(),
                        factory: owner.self_ref(),
                    }),
                )
            })
            .unwrap_or(false);
        if !installed {
            return Err(ContainerError::Instantiation {
                bean: bean_name.to_string(),
                type_name: instance.type_name().to_string(),
                message: "type does not expose a method override slot (or the slot is already in use)"
                    .to_string(),
                source: None,
            });
        }
        tracing::trace!(
            "Installed {} method override(s) on bean '{}'",
            definition.method_overrides.len(),
            bean_name
        );
        Ok(instance)
    }
}

/// 把被覆盖方法的调用转到所属工厂
struct ContainerMethodInterceptor {
    bean_name: String,
    overrides: Vec<MethodOverride>,
    factory: Weak<DefaultListableBeanFactory>,
}

impl ContainerMethodInterceptor {
    fn factory(&self) -> ContainerResult<Arc<DefaultListableBeanFactory>> {
        self.factory.upgrade().ok_or_else(|| {
            ContainerError::Other(anyhow!(
                "bean factory owning '{}' has been dropped",
                self.bean_name
            ))
        })
    }

    fn do_lookup(&self, bean_name: Option<&str>, required: TypeKey) -> ContainerResult<BeanInstance> {
        let factory = self.factory()?;
        match bean_name {
            Some(name) => {
                let bean = factory.get_bean(name)?;
                factory
                    .catalog()
                    .cast(&bean, required)
                    .ok_or_else(|| ContainerError::BeanNotOfRequiredType {
                        name: name.to_string(),
                        required: required.name().to_string(),
                        actual: bean.type_name().to_string(),
                    })
            }
            None => factory.get_bean_by_type_key(required),
        }
    }

    fn do_replace(
        &self,
        replacer_bean: &str,
        target: &(dyn Any + Send + Sync),
        method: &str,
        args: Vec<Value>,
    ) -> anyhow::Result<Value> {
        let factory = self.factory()?;
        let replacer = factory.get_bean(replacer_bean)?;
        let replacer = factory
            .catalog()
            .view::<dyn MethodReplacer>(&replacer)
            .ok_or_else(|| ContainerError::BeanNotOfRequiredType {
                name: replacer_bean.to_string(),
                required: TypeKey::of::<dyn MethodReplacer>().name().to_string(),
                actual: replacer.type_name().to_string(),
            })?;
        replacer.reimplement(target, method, args)
    }
}

impl MethodInterceptor for ContainerMethodInterceptor {
    fn is_overridden(&self, method: &str) -> bool {
        self.overrides.iter().any(|o| o.method_name() == method)
    }

    fn lookup(&self, method: &str, required: TypeKey) -> Option<ContainerResult<BeanInstance>> {
        self.overrides.iter().find_map(|o| match o {
            MethodOverride::Lookup { method: m, bean_name } if m == method => {
                Some(self.do_lookup(bean_name.as_deref(), required))
            }
            _ => None,
        })
    }

    fn replace(
        &self,
        target: &(dyn Any + Send + Sync),
        method: &str,
        args: Vec<Value>,
    ) -> Option<anyhow::Result<Value>> {
        let replacer_bean = self.overrides.iter().find_map(|o| match o {
            MethodOverride::Replace { method: m, replacer_bean } if m == method => Some(replacer_bean),
            _ => None,
        })?;
        Some(self.do_replace(replacer_bean, target, method, args))
    }
}
