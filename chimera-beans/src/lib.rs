// chimera-beans: 类似 Spring 的 Bean 工厂
//
// 把声明式的 Bean 定义变成完成装配和初始化的对象图：
// - 构造函数 / 工厂方法解析与自动装配
// - 属性填充、按名称 / 按类型自动装配
// - 单例的循环引用（早期引用）
// - BeanPostProcessor 扩展点与生命周期回调
// - 单例、原型和自定义作用域

pub mod bean;
pub mod bean_factory;
pub mod bean_post_processor;
pub mod component;
pub mod config;
pub mod constants;
pub mod context;
pub mod conversion;
pub mod definition_registry;
pub mod dependency;
pub mod disposable;
pub mod error;
pub mod factory_bean;
pub mod instantiation;
pub mod lifecycle;
pub mod logging;
pub mod metadata;
pub mod scope;
pub mod singleton_registry;
pub mod utils;
pub mod value;

mod constructor_resolver;
mod creation;
mod populate;

// 重新导出常用类型
pub use bean::{
    AutowireMode, BeanClass, BeanDefinition, BeanValue, ConstructorArgumentValues, DependencyCheck,
    MethodOverride, PropertyValues, ValueHolder,
};
pub use bean_factory::{
    BeanFactory, BeanFactoryExt, ConfigurableBeanFactory, ConfigurableListableBeanFactory,
    DefaultListableBeanFactory, ListableBeanFactory,
};
pub use bean_post_processor::{BeanPostProcessor, Capability, Precedence};
pub use component::{scan_components, Component, ComponentRegistration};
pub use config::{
    BeanFactoryConfig, ConfigValue, Environment, EnvironmentPropertySource, MapPropertySource,
    PropertySource, TomlPropertySource,
};
pub use constants::*;
pub use context::{ApplicationContext, ApplicationContextBuilder};
pub use dependency::{DependencyDescriptor, InjectionPoint};
pub use error::{ContainerError, ContainerResult, LifecyclePhase, Result};
pub use lifecycle::{
    BeanFactoryAware, BeanFactoryPostProcessor, BeanNameAware, DisposableBean, FactoryBean,
    InitializingBean, MethodReplacer, SmartInitializingSingleton,
};
pub use logging::{LogFormat, LogLevel, LoggingConfig};
pub use metadata::{BeanType, TypeCatalog, TypeMetadata};
pub use scope::{Scope, ScopeHandler, SimpleThreadScope};
pub use value::{BeanInstance, Injectable, TypeKey, Value, ValueType};

// 导出 inventory，供 component! 宏使用
pub use inventory;

/// Prelude 模块，包含常用的 traits 和类型
pub mod prelude {
    pub use crate::bean::{AutowireMode, BeanDefinition, BeanValue, PropertyValues, ValueHolder};
    pub use crate::bean_factory::{
        BeanFactory, BeanFactoryExt, ConfigurableBeanFactory, ConfigurableListableBeanFactory,
        DefaultListableBeanFactory, ListableBeanFactory,
    };
    pub use crate::bean_post_processor::{BeanPostProcessor, Capability, Precedence};
    pub use crate::component::Component;
    pub use crate::config::{BeanFactoryConfig, ConfigValue, MapPropertySource, PropertySource};
    pub use crate::context::ApplicationContext;
    pub use crate::error::{ContainerError, ContainerResult};
    pub use crate::lifecycle::{
        BeanFactoryPostProcessor, BeanNameAware, DisposableBean, FactoryBean, InitializingBean,
        SmartInitializingSingleton,
    };
    pub use crate::metadata::{BeanType, TypeMetadata};
    pub use crate::scope::Scope;
    pub use crate::value::{BeanInstance, TypeKey, Value};
    pub use anyhow::{anyhow, Context};
}
