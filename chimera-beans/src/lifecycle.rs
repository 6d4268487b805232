//! 生命周期接口
//!
//! Bean 通过在 [`BeanType`](crate::metadata::BeanType) 中声明接口视图来实现这些回调，例如
//! `.implements::<dyn InitializingBean>(|b| b)`，容器在对应阶段通过类型目录取出视图并调用。

use std::sync::{Arc, Weak};

use crate::bean_factory::DefaultListableBeanFactory;
use crate::bean_post_processor::Precedence;
use crate::error::ContainerResult;
use crate::value::{BeanInstance, TypeKey, Value};

/// 属性填充完成后的初始化回调，先于自定义 init 方法执行
pub trait InitializingBean: Send + Sync {
    fn after_properties_set(&self) -> anyhow::Result<()>;
}

/// 容器销毁单例时的回调，先于自定义 destroy 方法执行
pub trait DisposableBean: Send + Sync {
    fn destroy(&self) -> anyhow::Result<()>;
}

/// 在属性填充之后、初始化回调之前得知自己的 Bean 名称
pub trait BeanNameAware: Send + Sync {
    fn set_bean_name(&self, name: &str);
}

/// 得到所属的 Bean 工厂
///
/// 持有 `Weak` 引用，避免 Bean 与工厂之间的引用环
pub trait BeanFactoryAware: Send + Sync {
    fn set_bean_factory(&self, factory: Weak<DefaultListableBeanFactory>);
}

/// 所有非延迟单例预实例化完成后调用
pub trait SmartInitializingSingleton: Send + Sync {
    fn after_singletons_instantiated(&self) -> anyhow::Result<()>;
}

/// 工厂 Bean - 以自己的名称暴露产品对象，以 `&name` 暴露自身
pub trait FactoryBean: Send + Sync {
    fn get_object(&self) -> anyhow::Result<BeanInstance>;

    /// 产品类型；创建前未知时返回 None
    fn object_type(&self) -> Option<TypeKey>;

    /// 产品是否在容器中共享
    fn is_singleton(&self) -> bool {
        true
    }
}

/// 替换方法的实现者
///
/// `target` 是被覆盖方法所在的实例
pub trait MethodReplacer: Send + Sync {
    fn reimplement(
        &self,
        target: &(dyn std::any::Any + Send + Sync),
        method: &str,
        args: Vec<Value>,
    ) -> anyhow::Result<Value>;
}

/// 定义级后置处理器 - 在任何 Bean 创建之前修改 Bean 定义
///
/// ```ignore
/// struct TimeoutOverride;
///
/// impl BeanFactoryPostProcessor for TimeoutOverride {
///     fn post_process_bean_factory(&self, factory: &DefaultListableBeanFactory) -> ContainerResult<()> {
///         factory.modify_bean_definition("client", |d| d.property_values.add("timeout", 30))
///     }
/// }
/// ```
pub trait BeanFactoryPostProcessor: Send + Sync {
    fn post_process_bean_factory(&self, factory: &DefaultListableBeanFactory) -> ContainerResult<()>;

    fn precedence(&self) -> Precedence {
        Precedence::Unordered
    }
}

/// 以注册顺序为基础按优先级排序（稳定排序）
pub(crate) fn sort_by_precedence<T: ?Sized>(
    items: &mut [Arc<T>],
    precedence: impl Fn(&T) -> Precedence,
) {
    items.sort_by_key(|item| precedence(item).sort_key());
}
