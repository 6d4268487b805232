//! 应用上下文
//!
//! 在 [`DefaultListableBeanFactory`] 之上编排启动流程：
//! 组件扫描、定义级后置处理器、BeanPostProcessor 自动注册、冻结配置、预实例化单例。

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::anyhow;
use parking_lot::{Mutex, RwLock};

use crate::bean_factory::{
    BeanFactory, BeanFactoryExt, ConfigurableBeanFactory, ConfigurableListableBeanFactory,
    DefaultListableBeanFactory, ListableBeanFactory,
};
use crate::bean_post_processor::BeanPostProcessor;
use crate::component::scan_components;
use crate::config::{BeanFactoryConfig, Environment, PropertySource};
use crate::constants::ENVIRONMENT_BEAN_NAME;
use crate::error::{ContainerError, ContainerResult};
use crate::lifecycle::{sort_by_precedence, BeanFactoryPostProcessor};
use crate::metadata::TypeMetadata;
use crate::value::{BeanInstance, TypeKey, Value};

/// 应用上下文
pub struct ApplicationContext {
    factory: Arc<DefaultListableBeanFactory>,
    factory_post_processors: RwLock<Vec<Arc<dyn BeanFactoryPostProcessor>>>,
    active: AtomicBool,
    /// refresh / close 互斥
    startup: Mutex<()>,
}

impl ApplicationContext {
    pub fn new() -> Arc<Self> {
        Self::with_factory(DefaultListableBeanFactory::new())
    }

    pub fn with_factory(factory: Arc<DefaultListableBeanFactory>) -> Arc<Self> {
        Arc::new(Self {
            factory,
            factory_post_processors: RwLock::new(Vec::new()),
            active: AtomicBool::new(false),
            startup: Mutex::new(()),
        })
    }

    /// 构建器模式创建上下文
    pub fn builder() -> ApplicationContextBuilder {
        ApplicationContextBuilder::new()
    }

    pub fn bean_factory(&self) -> &Arc<DefaultListableBeanFactory> {
        &self.factory
    }

    pub fn environment(&self) -> &Arc<Environment> {
        self.factory.environment()
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// 注册类型元数据
    pub fn register_type(&self, meta: TypeMetadata) -> Arc<TypeMetadata> {
        self.factory.register_type(meta)
    }

    /// 注册 BeanFactoryPostProcessor，先于容器中以 Bean 形式声明的处理器执行
    pub fn add_bean_factory_post_processor(&self, processor: Arc<dyn BeanFactoryPostProcessor>) {
        let mut processors = self.factory_post_processors.write();
        processors.push(processor);
        tracing::debug!("Registered BeanFactoryPostProcessor, total: {}", processors.len());
    }

    /// 启动上下文
    ///
    /// 失败时销毁已经创建的单例，上下文保持未激活状态
    pub fn refresh(&self) -> ContainerResult<()> {
        let _guard = self.startup.lock();
        if self.is_active() {
            return Err(ContainerError::Other(anyhow!(
                "application context has already been refreshed"
            )));
        }
        tracing::info!("Refreshing application context");

        if let Err(e) = self.do_refresh() {
            tracing::warn!("Exception encountered during context initialization - cancelling refresh attempt: {}", e);
            self.factory.destroy_singletons();
            return Err(e);
        }

        self.active.store(true, Ordering::Release);
        tracing::info!(
            "Application context refreshed, {} singleton(s) created",
            self.factory.singleton_names().len()
        );
        Ok(())
    }

    fn do_refresh(&self) -> ContainerResult<()> {
        if !self.factory.contains_bean(ENVIRONMENT_BEAN_NAME) {
            self.factory.register_singleton(
                ENVIRONMENT_BEAN_NAME,
                BeanInstance::from_arc(self.factory.environment().clone()),
            )?;
        }

        self.invoke_bean_factory_post_processors()?;
        self.register_bean_post_processors()?;

        self.factory.freeze_configuration();
        self.factory.preinstantiate_singletons()
    }

    /// 先执行编程方式注册的处理器（注册顺序），再执行容器中声明的处理器（优先级顺序）
    ///
    /// 处理器可能注册新的处理器定义，循环直到没有新的处理器出现
    fn invoke_bean_factory_post_processors(&self) -> ContainerResult<()> {
        let programmatic = self.factory_post_processors.read().clone();
        for processor in &programmatic {
            processor.post_process_bean_factory(&self.factory)?;
        }

        let required = TypeKey::of::<dyn BeanFactoryPostProcessor>();
        let mut processed: HashSet<String> = HashSet::new();
        loop {
            let mut pending = Vec::new();
            for name in self.factory.get_bean_names_for_type(required, true, false)? {
                if processed.insert(name.clone()) {
                    let processor = self.factory.get_bean_typed::<dyn BeanFactoryPostProcessor>(&name)?;
                    pending.push(processor);
                }
            }
            if pending.is_empty() {
                break;
            }
            sort_by_precedence(&mut pending, |p| p.precedence());
            for processor in &pending {
                processor.post_process_bean_factory(&self.factory)?;
            }
        }

        tracing::debug!(
            "Invoked {} BeanFactoryPostProcessor(s)",
            programmatic.len() + processed.len()
        );
        Ok(())
    }

    fn register_bean_post_processors(&self) -> ContainerResult<()> {
        let required = TypeKey::of::<dyn BeanPostProcessor>();
        let names = self.factory.get_bean_names_for_type(required, true, false)?;
        if names.is_empty() {
            return Ok(());
        }

        let mut processors = Vec::with_capacity(names.len());
        for name in &names {
            processors.push(self.factory.get_bean_typed::<dyn BeanPostProcessor>(name)?);
        }
        sort_by_precedence(&mut processors, |p| p.precedence());
        for processor in processors {
            tracing::debug!("Registering BeanPostProcessor '{}'", processor.name());
            self.factory.add_bean_post_processor(processor);
        }
        Ok(())
    }

    /// 关闭上下文并销毁单例；未激活时什么也不做
    pub fn close(&self) {
        let _guard = self.startup.lock();
        if self.active.swap(false, Ordering::AcqRel) {
            tracing::info!("Closing application context");
            self.factory.destroy_singletons();
        }
    }

    pub fn get_bean_typed<T: ?Sized + Send + Sync + 'static>(&self, name: &str) -> ContainerResult<Arc<T>> {
        self.factory.get_bean_typed::<T>(name)
    }

    pub fn get_bean_by_type<T: ?Sized + Send + Sync + 'static>(&self) -> ContainerResult<Arc<T>> {
        self.factory.get_bean_by_type::<T>()
    }

    pub fn get_bean_definition_names(&self) -> Vec<String> {
        self.factory.get_bean_definition_names()
    }

    pub fn validate_dependencies(&self) -> ContainerResult<()> {
        self.factory.validate_dependencies()
    }
}

impl BeanFactory for ApplicationContext {
    fn get_bean(&self, name: &str) -> ContainerResult<BeanInstance> {
        self.factory.get_bean(name)
    }

    fn get_bean_with_args(&self, name: &str, args: Vec<Value>) -> ContainerResult<BeanInstance> {
        self.factory.get_bean_with_args(name, args)
    }

    fn get_bean_of_type_key(&self, name: &str, required: TypeKey) -> ContainerResult<BeanInstance> {
        self.factory.get_bean_of_type_key(name, required)
    }

    fn contains_bean(&self, name: &str) -> bool {
        self.factory.contains_bean(name)
    }

    fn is_singleton(&self, name: &str) -> ContainerResult<bool> {
        self.factory.is_singleton(name)
    }

    fn is_prototype(&self, name: &str) -> ContainerResult<bool> {
        self.factory.is_prototype(name)
    }

    fn get_type(&self, name: &str) -> ContainerResult<Option<TypeKey>> {
        self.factory.get_type(name)
    }

    fn is_type_match(&self, name: &str, required: TypeKey) -> ContainerResult<bool> {
        self.factory.is_type_match(name, required)
    }

    fn get_aliases(&self, name: &str) -> Vec<String> {
        self.factory.get_aliases(name)
    }
}

/// 应用上下文构建器
#[derive(Default)]
pub struct ApplicationContextBuilder {
    config: BeanFactoryConfig,
    property_sources: Vec<Box<dyn PropertySource>>,
    factory_post_processors: Vec<Arc<dyn BeanFactoryPostProcessor>>,
    scan_components: bool,
}

impl ApplicationContextBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, config: BeanFactoryConfig) -> Self {
        self.config = config;
        self
    }

    /// 添加配置源到 Environment
    pub fn add_property_source(mut self, source: Box<dyn PropertySource>) -> Self {
        self.property_sources.push(source);
        self
    }

    pub fn add_bean_factory_post_processor(mut self, processor: Arc<dyn BeanFactoryPostProcessor>) -> Self {
        self.factory_post_processors.push(processor);
        self
    }

    /// 构建时注册所有通过 inventory 提交的组件
    pub fn scan_components(mut self, scan: bool) -> Self {
        self.scan_components = scan;
        self
    }

    /// 构建上下文（尚未 refresh）
    pub fn build(self) -> ContainerResult<Arc<ApplicationContext>> {
        let factory = DefaultListableBeanFactory::with_config(self.config);
        for source in self.property_sources {
            factory.environment().add_property_source(source);
        }
        if self.scan_components {
            let count = scan_components(&factory)?;
            tracing::debug!("Registered {} scanned component(s)", count);
        }

        let context = ApplicationContext::with_factory(factory);
        for processor in self.factory_post_processors {
            context.add_bean_factory_post_processor(processor);
        }
        Ok(context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bean::{BeanDefinition, BeanValue};
    use crate::bean_post_processor::{Capability, Precedence};
    use crate::config::{ConfigValue, MapPropertySource};
    use crate::lifecycle::DisposableBean;
    use crate::metadata::BeanType;

    struct Client {
        timeout: Mutex<i64>,
        closed: AtomicBool,
    }

    impl Client {
        fn new() -> Self {
            Self { timeout: Mutex::new(10), closed: AtomicBool::new(false) }
        }
    }

    impl DisposableBean for Client {
        fn destroy(&self) -> anyhow::Result<()> {
            self.closed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    struct TimeoutOverride;

    impl BeanFactoryPostProcessor for TimeoutOverride {
        fn post_process_bean_factory(&self, factory: &DefaultListableBeanFactory) -> ContainerResult<()> {
            factory.modify_bean_definition("client", |d| d.property_values.add("timeout", BeanValue::placeholder("${client.timeout}")))
        }
    }

    #[derive(Default)]
    struct Counter {
        seen: Mutex<Vec<String>>,
    }

    impl BeanPostProcessor for Counter {
        fn capabilities(&self) -> Vec<Capability> {
            vec![Capability::AfterInitialization]
        }

        fn precedence(&self) -> Precedence {
            Precedence::Ordered(1)
        }

        fn post_process_after_initialization(&self, bean: BeanInstance, bean_name: &str) -> ContainerResult<BeanInstance> {
            self.seen.lock().push(bean_name.to_string());
            Ok(bean)
        }
    }

    fn context() -> Arc<ApplicationContext> {
        let context = ApplicationContext::builder()
            .add_property_source(Box::new(
                MapPropertySource::new("test").with_property("client.timeout", ConfigValue::String("45".into())),
            ))
            .add_bean_factory_post_processor(Arc::new(TimeoutOverride))
            .build()
            .unwrap();
        context.register_type(
            BeanType::<Client>::new()
                .constructor(Client::new)
                .property("timeout", |c: &Client, v: i64| *c.timeout.lock() = v)
                .implements::<dyn DisposableBean>(|c| c)
                .build(),
        );
        context.register_type(
            BeanType::<Counter>::new()
                .constructor(Counter::default)
                .implements::<dyn BeanPostProcessor>(|c| c)
                .build(),
        );
        let factory = context.bean_factory();
        factory.register_bean_definition("client", BeanDefinition::of::<Client>()).unwrap();
        factory.register_bean_definition("counter", BeanDefinition::of::<Counter>()).unwrap();
        context
    }

    #[test]
    fn test_refresh_runs_processors_and_preinstantiates() {
        let context = context();
        context.refresh().unwrap();
        assert!(context.is_active());
        assert!(context.bean_factory().is_configuration_frozen());

        let client = context.get_bean_typed::<Client>("client").unwrap();
        assert_eq!(*client.timeout.lock(), 45);

        let counter = context.get_bean_typed::<Counter>("counter").unwrap();
        assert_eq!(*counter.seen.lock(), vec!["client".to_string()]);
        assert!(context.contains_bean(ENVIRONMENT_BEAN_NAME));

        assert!(context.refresh().is_err());

        context.close();
        assert!(!context.is_active());
        assert!(client.closed.load(Ordering::SeqCst));
    }

    #[test]
    fn test_failed_refresh_destroys_created_singletons() {
        struct Broken;

        let context = context();
        context.register_type(
            BeanType::<Broken>::new()
                .try_constructor(|| -> anyhow::Result<Broken> { anyhow::bail!("no connection") })
                .build(),
        );
        context
            .bean_factory()
            .register_bean_definition("zbroken", BeanDefinition::of::<Broken>())
            .unwrap();

        assert!(context.refresh().is_err());
        assert!(!context.is_active());
        assert!(context.bean_factory().singleton_names().is_empty());
    }
}
