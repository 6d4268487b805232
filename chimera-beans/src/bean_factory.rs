//! Bean Factory - 核心容器接口
//!
//! 接口分层沿用 BeanFactory / ListableBeanFactory / ConfigurableBeanFactory /
//! ConfigurableListableBeanFactory 的划分，[`DefaultListableBeanFactory`] 是唯一实现。
//! 创建流程拆分在 `creation`、`constructor_resolver`、`populate`、`dependency`、
//! `factory_bean` 几个模块中，它们都为同一个结构体补充 `impl` 块。

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};

use crate::bean::BeanDefinition;
use crate::bean_post_processor::{BeanPostProcessor, BeanPostProcessorRegistry};
use crate::config::{BeanFactoryConfig, Environment};
use crate::conversion::TypeConverter;
use crate::definition_registry::{BeanDefinitionRegistry, MergedBeanDefinition};
use crate::disposable::DisposableBeanAdapter;
use crate::error::{ContainerError, ContainerResult, LifecyclePhase};
use crate::instantiation::{InstantiationStrategy, OverridingInstantiationStrategy};
use crate::lifecycle::{FactoryBean, SmartInitializingSingleton};
use crate::metadata::{TypeCatalog, TypeMetadata};
use crate::scope::{Scope, ScopeHandler};
use crate::singleton_registry::DefaultSingletonRegistry;
use crate::utils::dependency::{validate_dependency_graph, CreationTracker, DependencyValidationError};
use crate::utils::naming;
use crate::value::{BeanInstance, TypeKey, Value};
use crate::FACTORY_BEAN_PREFIX;

/// BeanFactory - 最基础的容器接口
///
/// 注意：此 trait 不包含泛型方法，因此可以作为 trait object 使用
pub trait BeanFactory: Send + Sync {
    /// 通过名称获取 Bean；`&name` 返回 FactoryBean 本身
    fn get_bean(&self, name: &str) -> ContainerResult<BeanInstance>;

    /// 使用显式参数创建（不会缓存解析结果）
    fn get_bean_with_args(&self, name: &str, args: Vec<Value>) -> ContainerResult<BeanInstance>;

    /// 获取 Bean 并转换为指定类型视图
    fn get_bean_of_type_key(&self, name: &str, required: TypeKey) -> ContainerResult<BeanInstance>;

    fn contains_bean(&self, name: &str) -> bool;

    fn is_singleton(&self, name: &str) -> ContainerResult<bool>;

    fn is_prototype(&self, name: &str) -> ContainerResult<bool>;

    /// Bean 的类型；对 FactoryBean 返回产品类型
    fn get_type(&self, name: &str) -> ContainerResult<Option<TypeKey>>;

    fn is_type_match(&self, name: &str, required: TypeKey) -> ContainerResult<bool>;

    fn get_aliases(&self, name: &str) -> Vec<String>;
}

/// BeanFactory 的扩展 trait
///
/// 提供泛型方法，不能作为 trait object 使用
pub trait BeanFactoryExt: BeanFactory {
    /// 通过名称获取强类型的 Bean
    fn get_bean_typed<T: ?Sized + Send + Sync + 'static>(&self, name: &str) -> ContainerResult<Arc<T>>;

    /// 通过类型获取唯一的 Bean
    fn get_bean_by_type<T: ?Sized + Send + Sync + 'static>(&self) -> ContainerResult<Arc<T>>;

    fn contains_bean_by_type<T: ?Sized + Send + Sync + 'static>(&self) -> bool;
}

/// 可列举的 Bean 工厂
pub trait ListableBeanFactory: BeanFactory {
    /// 所有 Bean 定义的名称（注册顺序）
    fn get_bean_definition_names(&self) -> Vec<String>;

    fn get_bean_definition_count(&self) -> usize;

    fn contains_bean_definition(&self, name: &str) -> bool;

    /// 匹配类型的 Bean 名称
    ///
    /// `allow_eager_init` 为 false 时不会为了确定 FactoryBean 的产品类型而实例化它
    fn get_bean_names_for_type(
        &self,
        required: TypeKey,
        include_non_singletons: bool,
        allow_eager_init: bool,
    ) -> ContainerResult<Vec<String>>;

    /// 匹配类型的所有 Bean（会触发创建）
    fn get_beans_of_type(&self, required: TypeKey) -> ContainerResult<Vec<(String, BeanInstance)>>;
}

/// 可配置的 Bean 工厂
pub trait ConfigurableBeanFactory: BeanFactory {
    fn register_bean_definition(&self, name: &str, definition: BeanDefinition) -> ContainerResult<()>;

    fn remove_bean_definition(&self, name: &str) -> ContainerResult<()>;

    fn get_bean_definition(&self, name: &str) -> ContainerResult<BeanDefinition>;

    /// 修改 Bean 定义（会使合并缓存失效）
    fn modify_bean_definition<F>(&self, name: &str, modifier: F) -> ContainerResult<()>
    where
        F: FnOnce(&mut BeanDefinition);

    fn get_merged_bean_definition(&self, name: &str) -> ContainerResult<Arc<MergedBeanDefinition>>;

    fn register_alias(&self, name: &str, alias: &str) -> ContainerResult<()>;

    /// 注册一个已经创建好的单例（不经过生命周期）
    fn register_singleton(&self, name: &str, instance: BeanInstance) -> ContainerResult<()>;

    fn add_bean_post_processor(&self, processor: Arc<dyn BeanPostProcessor>);

    fn get_bean_post_processors(&self) -> Vec<Arc<dyn BeanPostProcessor>>;

    fn register_scope(&self, name: &str, handler: Arc<dyn ScopeHandler>);

    /// 注册可按类型注入但不是 Bean 的对象
    fn register_resolvable_dependency(&self, key: TypeKey, instance: BeanInstance);

    /// 销毁所有单例（调用 destroy 回调）
    fn destroy_singletons(&self);
}

/// 可配置且可列举的 Bean 工厂
///
/// 这是 BeanFactoryPostProcessor 操作的工厂能力集合
pub trait ConfigurableListableBeanFactory: ListableBeanFactory + ConfigurableBeanFactory {
    /// 预实例化所有非延迟单例，然后回调 SmartInitializingSingleton
    fn preinstantiate_singletons(&self) -> ContainerResult<()>;

    fn freeze_configuration(&self);

    fn is_configuration_frozen(&self) -> bool;

    /// 静态校验定义之间的依赖（循环和缺失）
    fn validate_dependencies(&self) -> ContainerResult<()>;
}

/// DefaultListableBeanFactory - 默认的 Bean 工厂实现
pub struct DefaultListableBeanFactory {
    pub(crate) self_ref: Weak<DefaultListableBeanFactory>,
    pub(crate) config: RwLock<BeanFactoryConfig>,
    pub(crate) catalog: Arc<TypeCatalog>,
    pub(crate) converter: TypeConverter,
    pub(crate) definitions: BeanDefinitionRegistry,
    pub(crate) singletons: DefaultSingletonRegistry,
    pub(crate) processors: BeanPostProcessorRegistry,
    instantiation_strategy: RwLock<Arc<dyn InstantiationStrategy>>,
    scopes: RwLock<HashMap<String, Arc<dyn ScopeHandler>>>,
    /// 原型 / 自定义作用域的创建跟踪（按线程）
    prototypes_in_creation: CreationTracker,
    /// 正在为类型检查做快捷实例化的 FactoryBean
    pub(crate) type_checks: CreationTracker,
    /// 单例 FactoryBean 的产品缓存
    pub(crate) factory_bean_objects: Mutex<HashMap<String, BeanInstance>>,
    /// 类型检查时创建的 FactoryBean 原始实例，真正创建时复用
    pub(crate) factory_bean_instance_cache: Mutex<HashMap<String, BeanInstance>>,
    resolvable_dependencies: RwLock<Vec<(TypeKey, BeanInstance)>>,
    pub(crate) environment: Arc<Environment>,
    pub(crate) resolution_count: AtomicUsize,
    pub(crate) inner_bean_counter: AtomicUsize,
    already_created: Mutex<HashSet<String>>,
    suppressed: Mutex<Vec<String>>,
}

impl DefaultListableBeanFactory {
    /// 创建新的 Bean 工厂
    pub fn new() -> Arc<Self> {
        Self::with_config(BeanFactoryConfig::default())
    }

    pub fn with_config(config: BeanFactoryConfig) -> Arc<Self> {
        Self::with_catalog(Arc::new(TypeCatalog::new()), config)
    }

    /// 使用共享的类型目录创建
    pub fn with_catalog(catalog: Arc<TypeCatalog>, config: BeanFactoryConfig) -> Arc<Self> {
        Arc::new_cyclic(|self_ref| Self {
            self_ref: self_ref.clone(),
            definitions: BeanDefinitionRegistry::new(config.allow_bean_definition_overriding),
            config: RwLock::new(config),
            converter: TypeConverter::new(catalog.clone()),
            catalog,
            singletons: DefaultSingletonRegistry::new(),
            processors: BeanPostProcessorRegistry::new(),
            instantiation_strategy: RwLock::new(Arc::new(OverridingInstantiationStrategy)),
            scopes: RwLock::new(HashMap::new()),
            prototypes_in_creation: CreationTracker::new(),
            type_checks: CreationTracker::new(),
            factory_bean_objects: Mutex::new(HashMap::new()),
            factory_bean_instance_cache: Mutex::new(HashMap::new()),
            resolvable_dependencies: RwLock::new(Vec::new()),
            environment: Arc::new(Environment::new()),
            resolution_count: AtomicUsize::new(0),
            inner_bean_counter: AtomicUsize::new(0),
            already_created: Mutex::new(HashSet::new()),
            suppressed: Mutex::new(Vec::new()),
        })
    }

    pub fn self_ref(&self) -> Weak<Self> {
        self.self_ref.clone()
    }

    pub fn catalog(&self) -> &Arc<TypeCatalog> {
        &self.catalog
    }

    /// 注册类型元数据
    pub fn register_type(&self, meta: TypeMetadata) -> Arc<TypeMetadata> {
        self.catalog.register(meta)
    }

    pub fn converter(&self) -> &TypeConverter {
        &self.converter
    }

    pub fn environment(&self) -> &Arc<Environment> {
        &self.environment
    }

    pub fn config(&self) -> BeanFactoryConfig {
        self.config.read().clone()
    }

    pub fn set_allow_circular_references(&self, allow: bool) {
        self.config.write().allow_circular_references = allow;
    }

    pub fn set_allow_raw_injection_despite_wrapping(&self, allow: bool) {
        self.config.write().allow_raw_injection_despite_wrapping = allow;
    }

    pub fn set_allow_bean_definition_overriding(&self, allow: bool) {
        self.config.write().allow_bean_definition_overriding = allow;
        self.definitions.set_allow_overriding(allow);
    }

    pub fn set_instantiation_strategy(&self, strategy: Arc<dyn InstantiationStrategy>) {
        *self.instantiation_strategy.write() = strategy;
    }

    pub(crate) fn instantiation_strategy(&self) -> Arc<dyn InstantiationStrategy> {
        self.instantiation_strategy.read().clone()
    }

    /// 构造函数 / 工厂方法评分算法执行的次数
    pub fn constructor_resolution_count(&self) -> usize {
        self.resolution_count.load(Ordering::SeqCst)
    }

    /// 类型探测期间被记录并忽略的异常
    pub fn suppressed_errors(&self) -> Vec<String> {
        self.suppressed.lock().clone()
    }

    pub(crate) fn on_suppressed(&self, message: String) {
        self.suppressed.lock().push(message);
    }

    pub fn contains_singleton(&self, name: &str) -> bool {
        self.singletons.contains_singleton(name)
    }

    pub fn singleton_names(&self) -> Vec<String> {
        self.singletons.singleton_names()
    }

    /// 依赖于 `name` 的 Bean 名称
    pub fn dependents_of(&self, name: &str) -> Vec<String> {
        self.singletons.dependents_of(&self.transformed_bean_name(name))
    }

    pub fn dependencies_of(&self, name: &str) -> Vec<String> {
        self.singletons.dependencies_of(&self.transformed_bean_name(name))
    }

    /// 去掉 `&` 前缀并把别名解析为规范名称
    pub(crate) fn transformed_bean_name(&self, name: &str) -> String {
        self.definitions
            .canonical_name(naming::transformed_bean_name(name))
    }

    pub(crate) fn scope_handler(&self, bean_name: &str, scope: &str) -> ContainerResult<Arc<dyn ScopeHandler>> {
        self.scopes
            .read()
            .get(scope)
            .cloned()
            .ok_or_else(|| ContainerError::NoSuchScope {
                bean: bean_name.to_string(),
                scope: scope.to_string(),
            })
    }

    pub(crate) fn resolvable_dependencies(&self) -> Vec<(TypeKey, BeanInstance)> {
        self.resolvable_dependencies.read().clone()
    }

    pub(crate) fn is_already_created(&self, name: &str) -> bool {
        self.already_created.lock().contains(name)
    }

    /// 类型检查期间创建、尚未被真正使用的单例可以直接移除
    pub(crate) fn remove_singleton_if_created_for_type_check_only(&self, name: &str) -> bool {
        if self.is_already_created(name) {
            return false;
        }
        self.singletons.remove_singleton(name);
        true
    }

    fn reset_bean_definition(&self, name: &str) {
        self.singletons.destroy_singleton(name);
        self.factory_bean_objects.lock().remove(name);
        self.factory_bean_instance_cache.lock().remove(name);
    }

    /// 实例是否可以作为 `required` 使用
    pub(crate) fn instance_matches(&self, instance: &BeanInstance, required: TypeKey) -> bool {
        instance.type_key() == required || self.catalog.cast(instance, required).is_some()
    }

    fn adapt_bean_instance(
        &self,
        name: &str,
        bean: BeanInstance,
        required: TypeKey,
    ) -> ContainerResult<BeanInstance> {
        self.catalog
            .cast(&bean, required)
            .ok_or_else(|| ContainerError::BeanNotOfRequiredType {
                name: name.to_string(),
                required: required.name().to_string(),
                actual: bean.type_name().to_string(),
            })
    }

    /// 获取 Bean 的核心流程
    pub(crate) fn do_get_bean(
        &self,
        name: &str,
        required: Option<TypeKey>,
        args: Option<Vec<Value>>,
        type_check_only: bool,
    ) -> ContainerResult<BeanInstance> {
        let bean_name = self.transformed_bean_name(name);

        let shared = if args.is_none() {
            self.singletons.get_singleton(&bean_name, true)?
        } else {
            None
        };

        let bean = match shared {
            Some(shared) => {
                if self.singletons.is_currently_in_creation(&bean_name) {
                    tracing::trace!(
                        "Returning eagerly cached instance of singleton bean '{}' that is not fully initialized yet - a consequence of a circular reference",
                        bean_name
                    );
                } else {
                    tracing::trace!("Returning cached instance of singleton bean '{}'", bean_name);
                }
                self.object_for_bean_instance(shared, name, &bean_name, None)?
            }
            None => {
                if !type_check_only {
                    self.already_created.lock().insert(bean_name.clone());
                }
                let created = self.create_for_scope(name, &bean_name, args);
                if created.is_err() && !type_check_only {
                    self.already_created.lock().remove(&bean_name);
                }
                created?
            }
        };

        match required {
            Some(required) => self.adapt_bean_instance(name, bean, required),
            None => Ok(bean),
        }
    }

    fn create_for_scope(
        &self,
        name: &str,
        bean_name: &str,
        args: Option<Vec<Value>>,
    ) -> ContainerResult<BeanInstance> {
        if self.prototypes_in_creation.is_creating(bean_name) {
            return Err(ContainerError::CircularDependency {
                bean: bean_name.to_string(),
                message: format!(
                    "prototype creation chain: {} -> {}",
                    self.prototypes_in_creation.current_creating().join(" -> "),
                    bean_name
                ),
            });
        }
        if !self.definitions.contains(bean_name) {
            return Err(ContainerError::NoSuchDefinition {
                name: name.to_string(),
            });
        }

        let merged = self.definitions.merged(bean_name)?;
        if merged.is_abstract() {
            return Err(ContainerError::BeanIsAbstract {
                name: bean_name.to_string(),
            });
        }

        let depends_on = merged.definition().depends_on.clone();
        for dependency in depends_on {
            let dependency = self.transformed_bean_name(&dependency);
            if self.singletons.is_dependent(bean_name, &dependency) {
                return Err(ContainerError::CircularDependency {
                    bean: bean_name.to_string(),
                    message: format!(
                        "circular depends-on relationship between '{}' and '{}'",
                        bean_name, dependency
                    ),
                });
            }
            self.singletons.register_dependent(&dependency, bean_name);
            self.get_bean(&dependency).map_err(|e| {
                ContainerError::lifecycle(
                    bean_name,
                    merged.resource_description().as_deref(),
                    LifecyclePhase::Requested,
                    anyhow::Error::new(e)
                        .context(format!("'{}' depends on missing bean '{}'", bean_name, dependency)),
                )
            })?;
        }

        match merged.scope() {
            Scope::Singleton => {
                let instance = self.singletons.get_or_create(bean_name, || {
                    self.create_bean_internal(bean_name, &merged, args)
                        .inspect_err(|_| self.singletons.destroy_singleton(bean_name))
                })?;
                self.object_for_bean_instance(instance, name, bean_name, Some(&merged))
            }
            Scope::Prototype => {
                let instance = self.create_non_singleton(bean_name, &merged, args)?;
                self.object_for_bean_instance(instance, name, bean_name, Some(&merged))
            }
            Scope::Custom(scope) => {
                let handler = self.scope_handler(bean_name, &scope)?;
                let instance = handler.get(bean_name, &|| {
                    self.create_non_singleton(bean_name, &merged, args.clone())
                })?;
                self.object_for_bean_instance(instance, name, bean_name, Some(&merged))
            }
        }
    }

    fn create_non_singleton(
        &self,
        bean_name: &str,
        merged: &Arc<MergedBeanDefinition>,
        args: Option<Vec<Value>>,
    ) -> ContainerResult<BeanInstance> {
        if !self.prototypes_in_creation.start_creating(bean_name) {
            return Err(ContainerError::CircularDependency {
                bean: bean_name.to_string(),
                message: "requested while already in creation on this thread".to_string(),
            });
        }
        let result = self.create_bean_internal(bean_name, merged, args);
        self.prototypes_in_creation.finish_creating(bean_name);
        result
    }

    /// 是否为 FactoryBean（不会创建 Bean）
    pub fn is_factory_bean(&self, name: &str) -> ContainerResult<bool> {
        let bean_name = self.transformed_bean_name(name);
        if let Some(instance) = self.singletons.get_singleton(&bean_name, false)? {
            return Ok(self.catalog.view::<dyn FactoryBean>(&instance).is_some());
        }
        if !self.definitions.contains(&bean_name) {
            return Ok(false);
        }
        let merged = self.definitions.merged(&bean_name)?;
        if let Some(known) = *merged.is_factory_bean.read() {
            return Ok(known);
        }
        let is_factory = self
            .predict_bean_type(&bean_name, &merged)
            .is_some_and(|key| self.is_factory_bean_type(key));
        *merged.is_factory_bean.write() = Some(is_factory);
        Ok(is_factory)
    }

    /// 在独立于命名注册表的情况下创建并完整初始化一个对象（原型语义，不缓存）
    pub fn create_bean<T: Send + Sync + 'static>(&self) -> ContainerResult<Arc<T>> {
        let key = TypeKey::of::<T>();
        let name = key.name().to_string();
        let definition = BeanDefinition::of::<T>().with_scope(Scope::Prototype);
        let merged = Arc::new(MergedBeanDefinition::new(&name, definition));
        let instance = self.create_bean_internal(&name, &merged, None)?;
        instance
            .downcast::<T>()
            .ok_or_else(|| ContainerError::BeanNotOfRequiredType {
                name,
                required: key.name().to_string(),
                actual: instance.type_name().to_string(),
            })
    }

    /// 销毁一个不由注册表管理的对象：销毁钩子、DisposableBean、默认 destroy 方法
    pub fn destroy_bean(&self, instance: &BeanInstance) -> ContainerResult<()> {
        let name = instance.type_name().to_string();
        let destroy_method = self.config.read().default_destroy_method.clone();
        let adapter = DisposableBeanAdapter::new(
            &name,
            instance.clone(),
            self.catalog.clone(),
            destroy_method,
            false,
            &self.processors.snapshot(),
        )?;
        match adapter {
            Some(adapter) => adapter.run().map_err(ContainerError::Other),
            None => Ok(()),
        }
    }
}

impl BeanFactory for DefaultListableBeanFactory {
    fn get_bean(&self, name: &str) -> ContainerResult<BeanInstance> {
        self.do_get_bean(name, None, None, false)
    }

    fn get_bean_with_args(&self, name: &str, args: Vec<Value>) -> ContainerResult<BeanInstance> {
        self.do_get_bean(name, None, Some(args), false)
    }

    fn get_bean_of_type_key(&self, name: &str, required: TypeKey) -> ContainerResult<BeanInstance> {
        self.do_get_bean(name, Some(required), None, false)
    }

    fn contains_bean(&self, name: &str) -> bool {
        let bean_name = self.transformed_bean_name(name);
        if !self.singletons.contains_singleton(&bean_name) && !self.definitions.contains(&bean_name) {
            return false;
        }
        !naming::is_factory_dereference(name) || self.is_factory_bean(&bean_name).unwrap_or(false)
    }

    fn is_singleton(&self, name: &str) -> ContainerResult<bool> {
        let bean_name = self.transformed_bean_name(name);
        let dereference = naming::is_factory_dereference(name);

        if let Some(instance) = self.singletons.get_singleton(&bean_name, false)? {
            return Ok(match self.catalog.view::<dyn FactoryBean>(&instance) {
                Some(factory) => dereference || factory.is_singleton(),
                None => !dereference,
            });
        }

        let merged = self.get_merged_bean_definition(&bean_name)?;
        if !merged.is_singleton() {
            return Ok(false);
        }
        let is_factory = self.is_factory_bean(&bean_name)?;
        if is_factory && !dereference {
            let factory = self.get_bean(&format!("{}{}", FACTORY_BEAN_PREFIX, bean_name))?;
            return Ok(self
                .catalog
                .view::<dyn FactoryBean>(&factory)
                .is_some_and(|f| f.is_singleton()));
        }
        Ok(!dereference || is_factory)
    }

    fn is_prototype(&self, name: &str) -> ContainerResult<bool> {
        let bean_name = self.transformed_bean_name(name);
        let dereference = naming::is_factory_dereference(name);

        if !self.definitions.contains(&bean_name) {
            if let Some(instance) = self.singletons.get_singleton(&bean_name, false)? {
                return Ok(!dereference
                    && self
                        .catalog
                        .view::<dyn FactoryBean>(&instance)
                        .is_some_and(|f| !f.is_singleton()));
            }
            return Err(ContainerError::NoSuchDefinition {
                name: name.to_string(),
            });
        }

        let merged = self.definitions.merged(&bean_name)?;
        if merged.is_prototype() {
            return Ok(!dereference || self.is_factory_bean(&bean_name)?);
        }
        if dereference || !self.is_factory_bean(&bean_name)? {
            return Ok(false);
        }
        let factory = self.get_bean(&format!("{}{}", FACTORY_BEAN_PREFIX, bean_name))?;
        Ok(self
            .catalog
            .view::<dyn FactoryBean>(&factory)
            .is_some_and(|f| !f.is_singleton()))
    }

    fn get_type(&self, name: &str) -> ContainerResult<Option<TypeKey>> {
        let bean_name = self.transformed_bean_name(name);
        let dereference = naming::is_factory_dereference(name);

        if let Some(instance) = self.singletons.get_singleton(&bean_name, false)? {
            if let Some(factory) = self.catalog.view::<dyn FactoryBean>(&instance) {
                if !dereference {
                    return Ok(factory.object_type());
                }
            }
            return Ok(Some(instance.type_key()));
        }

        if !self.definitions.contains(&bean_name) {
            return Err(ContainerError::NoSuchDefinition {
                name: name.to_string(),
            });
        }
        let merged = self.definitions.merged(&bean_name)?;
        match self.predict_bean_type(&bean_name, &merged) {
            Some(key) if self.is_factory_bean_type(key) && !dereference => {
                self.factory_bean_object_type(&bean_name, &merged, true)
            }
            Some(key) if dereference && !self.is_factory_bean_type(key) => Ok(None),
            other => Ok(other),
        }
    }

    fn is_type_match(&self, name: &str, required: TypeKey) -> ContainerResult<bool> {
        self.is_type_match_internal(name, required, true)
    }

    fn get_aliases(&self, name: &str) -> Vec<String> {
        let bean_name = self.transformed_bean_name(name);
        let mut aliases = Vec::new();
        if naming::is_factory_dereference(name) {
            aliases.push(bean_name.clone());
        }
        if bean_name != naming::transformed_bean_name(name) {
            aliases.push(bean_name.clone());
        }
        let prefix = if naming::is_factory_dereference(name) {
            FACTORY_BEAN_PREFIX
        } else {
            ""
        };
        for alias in self.definitions.aliases_of(&bean_name) {
            let alias = format!("{}{}", prefix, alias);
            if alias != name {
                aliases.push(alias);
            }
        }
        aliases
    }
}

impl BeanFactoryExt for DefaultListableBeanFactory {
    fn get_bean_typed<T: ?Sized + Send + Sync + 'static>(&self, name: &str) -> ContainerResult<Arc<T>> {
        let required = TypeKey::of::<T>();
        let bean = self.do_get_bean(name, Some(required), None, false)?;
        bean.downcast::<T>()
            .ok_or_else(|| ContainerError::BeanNotOfRequiredType {
                name: name.to_string(),
                required: required.name().to_string(),
                actual: bean.type_name().to_string(),
            })
    }

    fn get_bean_by_type<T: ?Sized + Send + Sync + 'static>(&self) -> ContainerResult<Arc<T>> {
        let required = TypeKey::of::<T>();
        let bean = self.get_bean_by_type_key(required)?;
        bean.downcast::<T>()
            .ok_or_else(|| ContainerError::NoSuchBeanOfType {
                type_name: required.name().to_string(),
            })
    }

    fn contains_bean_by_type<T: ?Sized + Send + Sync + 'static>(&self) -> bool {
        self.get_bean_names_for_type(TypeKey::of::<T>(), true, false)
            .map(|names| !names.is_empty())
            .unwrap_or(false)
    }
}

impl ListableBeanFactory for DefaultListableBeanFactory {
    fn get_bean_definition_names(&self) -> Vec<String> {
        self.definitions.names()
    }

    fn get_bean_definition_count(&self) -> usize {
        self.definitions.len()
    }

    fn contains_bean_definition(&self, name: &str) -> bool {
        self.definitions.contains(name)
    }

    fn get_bean_names_for_type(
        &self,
        required: TypeKey,
        include_non_singletons: bool,
        allow_eager_init: bool,
    ) -> ContainerResult<Vec<String>> {
        let mut result = Vec::new();

        for name in self.definitions.names() {
            let merged = match self.definitions.merged(&name) {
                Ok(merged) => merged,
                Err(e) if allow_eager_init => return Err(e),
                Err(e) => {
                    tracing::debug!("Ignoring bean definition '{}' for type matching: {}", name, e);
                    continue;
                }
            };
            if merged.is_abstract() {
                continue;
            }

            let is_factory = self
                .predict_bean_type(&name, &merged)
                .is_some_and(|key| self.is_factory_bean_type(key));
            let eligible = include_non_singletons || merged.is_singleton();

            if eligible && self.is_type_match_internal(&name, required, allow_eager_init)? {
                result.push(name);
                continue;
            }
            if is_factory && eligible {
                let factory_name = format!("{}{}", FACTORY_BEAN_PREFIX, name);
                if self.is_type_match_internal(&factory_name, required, allow_eager_init)? {
                    result.push(factory_name);
                }
            }
        }

        for name in self.singletons.singleton_names() {
            if self.definitions.contains(&name) {
                continue;
            }
            let Some(instance) = self.singletons.get_singleton(&name, false)? else {
                continue;
            };
            match self.catalog.view::<dyn FactoryBean>(&instance) {
                Some(factory) => {
                    if factory
                        .object_type()
                        .is_some_and(|key| self.catalog.is_assignable(key, required))
                    {
                        result.push(name);
                    } else if self.instance_matches(&instance, required) {
                        result.push(format!("{}{}", FACTORY_BEAN_PREFIX, name));
                    }
                }
                None if self.instance_matches(&instance, required) => result.push(name),
                None => {}
            }
        }

        Ok(result)
    }

    fn get_beans_of_type(&self, required: TypeKey) -> ContainerResult<Vec<(String, BeanInstance)>> {
        let mut beans = Vec::new();
        for name in self.get_bean_names_for_type(required, true, true)? {
            match self.get_bean_of_type_key(&name, required) {
                Ok(bean) => beans.push((name, bean)),
                Err(e) if e.is_circular_dependency() => {
                    tracing::trace!("Ignoring match to currently created bean '{}': {}", name, e);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(beans)
    }
}

impl ConfigurableBeanFactory for DefaultListableBeanFactory {
    fn register_bean_definition(&self, name: &str, definition: BeanDefinition) -> ContainerResult<()> {
        if self.definitions.is_frozen() {
            return Err(ContainerError::BeanDefinitionStore {
                name: name.to_string(),
                reason: "bean factory configuration is frozen".to_string(),
            });
        }
        let replaced = self.definitions.register(name, definition)?;
        if replaced || self.singletons.contains_singleton(name) {
            self.reset_bean_definition(name);
        }
        Ok(())
    }

    fn remove_bean_definition(&self, name: &str) -> ContainerResult<()> {
        self.definitions.remove(name)?;
        self.reset_bean_definition(name);
        Ok(())
    }

    fn get_bean_definition(&self, name: &str) -> ContainerResult<BeanDefinition> {
        self.definitions.get(&self.transformed_bean_name(name))
    }

    fn modify_bean_definition<F>(&self, name: &str, modifier: F) -> ContainerResult<()>
    where
        F: FnOnce(&mut BeanDefinition),
    {
        let bean_name = self.transformed_bean_name(name);
        self.definitions.modify(&bean_name, modifier)?;
        if self.singletons.contains_singleton(&bean_name) {
            self.reset_bean_definition(&bean_name);
        }
        Ok(())
    }

    fn get_merged_bean_definition(&self, name: &str) -> ContainerResult<Arc<MergedBeanDefinition>> {
        self.definitions.merged(&self.transformed_bean_name(name))
    }

    fn register_alias(&self, name: &str, alias: &str) -> ContainerResult<()> {
        self.definitions.register_alias(name, alias)
    }

    fn register_singleton(&self, name: &str, instance: BeanInstance) -> ContainerResult<()> {
        tracing::debug!("Registering singleton '{}' of type {}", name, instance.type_name());
        self.singletons.register_singleton(name, instance)
    }

    fn add_bean_post_processor(&self, processor: Arc<dyn BeanPostProcessor>) {
        self.processors.add(processor);
    }

    fn get_bean_post_processors(&self) -> Vec<Arc<dyn BeanPostProcessor>> {
        self.processors.all()
    }

    fn register_scope(&self, name: &str, handler: Arc<dyn ScopeHandler>) {
        tracing::debug!("Registering scope '{}'", name);
        self.scopes.write().insert(name.to_string(), handler);
    }

    fn register_resolvable_dependency(&self, key: TypeKey, instance: BeanInstance) {
        let mut dependencies = self.resolvable_dependencies.write();
        dependencies.retain(|(k, _)| *k != key);
        dependencies.push((key, instance));
    }

    fn destroy_singletons(&self) {
        tracing::info!("Destroying singletons");
        self.singletons.destroy_singletons();
        self.factory_bean_objects.lock().clear();
        self.factory_bean_instance_cache.lock().clear();
        self.already_created.lock().clear();
    }
}

impl ConfigurableListableBeanFactory for DefaultListableBeanFactory {
    fn preinstantiate_singletons(&self) -> ContainerResult<()> {
        let names = self.definitions.names();
        tracing::info!("Pre-instantiating {} bean definition(s)", names.len());

        for name in &names {
            let merged = self.definitions.merged(name)?;
            let eager = {
                let definition = merged.definition();
                !definition.is_abstract && definition.is_singleton() && !definition.is_lazy_init()
            };
            if !eager {
                continue;
            }
            if self.is_factory_bean(name)? {
                self.get_bean(&format!("{}{}", FACTORY_BEAN_PREFIX, name))?;
            } else {
                self.get_bean(name)?;
            }
        }

        for name in &names {
            let Some(instance) = self.singletons.get_singleton(name, false)? else {
                continue;
            };
            if let Some(smart) = self.catalog.view::<dyn SmartInitializingSingleton>(&instance) {
                tracing::trace!("Invoking after_singletons_instantiated on '{}'", name);
                smart.after_singletons_instantiated().map_err(|e| {
                    ContainerError::lifecycle(name, None, LifecyclePhase::Registered, e)
                })?;
            }
        }
        Ok(())
    }

    fn freeze_configuration(&self) {
        self.definitions.freeze();
    }

    fn is_configuration_frozen(&self) -> bool {
        self.definitions.is_frozen()
    }

    fn validate_dependencies(&self) -> ContainerResult<()> {
        let graph: HashMap<String, Vec<String>> = self
            .definitions
            .dependency_graph()
            .into_iter()
            .map(|(name, deps)| {
                let deps = deps
                    .iter()
                    .map(|dep| self.transformed_bean_name(dep))
                    .collect();
                (name, deps)
            })
            .collect();
        let known: HashSet<String> = self.singletons.singleton_names().into_iter().collect();

        validate_dependency_graph(&graph, &known).map_err(|e| match e {
            DependencyValidationError::CircularDependency { cycle } => ContainerError::CircularDependency {
                bean: cycle.first().cloned().unwrap_or_default(),
                message: cycle.join(" -> "),
            },
            DependencyValidationError::MissingDependency { missing, .. } => {
                ContainerError::NoSuchDefinition { name: missing }
            }
        })?;
        tracing::debug!("Validated dependencies of {} bean definition(s)", graph.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::BeanType;

    struct Repository;

    struct Service {
        label: String,
    }

    fn factory() -> Arc<DefaultListableBeanFactory> {
        let factory = DefaultListableBeanFactory::new();
        factory.register_type(BeanType::<Repository>::new().constructor(|| Repository).build());
        factory.register_type(
            BeanType::<Service>::new()
                .constructor(|label: String| Service { label })
                .build(),
        );
        factory
    }

    #[test]
    fn test_singleton_is_cached() {
        let factory = factory();
        factory
            .register_bean_definition("repository", BeanDefinition::of::<Repository>())
            .unwrap();

        let first = factory.get_bean("repository").unwrap();
        let second = factory.get_bean("repository").unwrap();
        assert!(first.same_instance(&second));
        assert!(factory.contains_singleton("repository"));
    }

    #[test]
    fn test_prototype_creates_new_instances() {
        let factory = factory();
        factory
            .register_bean_definition(
                "repository",
                BeanDefinition::of::<Repository>().with_scope(Scope::Prototype),
            )
            .unwrap();

        let first = factory.get_bean("repository").unwrap();
        let second = factory.get_bean("repository").unwrap();
        assert!(!first.same_instance(&second));
        assert!(factory.is_prototype("repository").unwrap());
        assert!(!factory.is_singleton("repository").unwrap());
    }

    #[test]
    fn test_alias_and_typed_lookup() {
        let factory = factory();
        factory
            .register_bean_definition("service", BeanDefinition::of::<Service>().with_arg("main"))
            .unwrap();
        factory.register_alias("service", "svc").unwrap();

        let service = factory.get_bean_typed::<Service>("svc").unwrap();
        assert_eq!(service.label, "main");
        assert_eq!(factory.get_aliases("service"), vec!["svc"]);
        assert!(factory.get_bean_typed::<Repository>("svc").is_err());
        assert_eq!(factory.get_bean_by_type::<Service>().unwrap().label, "main");
    }

    #[test]
    fn test_missing_and_abstract_definitions() {
        let factory = factory();
        assert!(matches!(
            factory.get_bean("nothing"),
            Err(ContainerError::NoSuchDefinition { .. })
        ));

        factory
            .register_bean_definition("template", BeanDefinition::of::<Repository>().with_abstract(true))
            .unwrap();
        assert!(matches!(
            factory.get_bean("template"),
            Err(ContainerError::BeanIsAbstract { .. })
        ));
    }

    #[test]
    fn test_depends_on_cycle_is_rejected() {
        let factory = factory();
        factory
            .register_bean_definition("a", BeanDefinition::of::<Repository>().with_depends_on(&["b"]))
            .unwrap();
        factory
            .register_bean_definition("b", BeanDefinition::of::<Repository>().with_depends_on(&["a"]))
            .unwrap();

        let err = factory.get_bean("a").unwrap_err();
        assert!(err.is_circular_dependency());
        assert!(factory.validate_dependencies().is_err());
    }

    #[test]
    fn test_frozen_configuration_rejects_registration() {
        let factory = factory();
        factory.freeze_configuration();
        assert!(factory.is_configuration_frozen());
        assert!(factory
            .register_bean_definition("late", BeanDefinition::of::<Repository>())
            .is_err());
    }

    #[test]
    fn test_reregistration_discards_singleton() {
        let factory = factory();
        factory
            .register_bean_definition("service", BeanDefinition::of::<Service>().with_arg("v1"))
            .unwrap();
        assert_eq!(factory.get_bean_typed::<Service>("service").unwrap().label, "v1");

        factory
            .register_bean_definition("service", BeanDefinition::of::<Service>().with_arg("v2"))
            .unwrap();
        assert_eq!(factory.get_bean_typed::<Service>("service").unwrap().label, "v2");
    }

    #[test]
    fn test_standalone_creation_is_not_registered() {
        let factory = factory();
        let repository = factory.create_bean::<Repository>();
        assert!(repository.is_ok());
        assert!(factory.singleton_names().is_empty());
        assert_eq!(factory.get_bean_definition_count(), 0);
    }

    #[derive(Default)]
    struct Connection {
        log: Mutex<Vec<&'static str>>,
    }

    impl crate::lifecycle::DisposableBean for Connection {
        fn destroy(&self) -> anyhow::Result<()> {
            self.log.lock().push("destroy");
            Ok(())
        }
    }

    #[test]
    fn test_destroy_unmanaged_bean() {
        let config = BeanFactoryConfig {
            default_destroy_method: Some("release".to_string()),
            ..Default::default()
        };
        let factory = DefaultListableBeanFactory::with_config(config);
        factory.register_type(
            BeanType::<Connection>::new()
                .constructor(Connection::default)
                .method("release", |c: &Connection| {
                    c.log.lock().push("release");
                    Ok(())
                })
                .implements::<dyn crate::lifecycle::DisposableBean>(|c| c)
                .build(),
        );
        factory.register_type(BeanType::<Repository>::new().constructor(|| Repository).build());

        let connection = factory.create_bean::<Connection>().unwrap();
        factory.destroy_bean(&BeanInstance::from_arc(connection.clone())).unwrap();
        assert_eq!(*connection.log.lock(), vec!["destroy", "release"]);
        assert!(factory.singleton_names().is_empty());

        let repository = factory.create_bean::<Repository>().unwrap();
        assert!(factory.destroy_bean(&BeanInstance::from_arc(repository)).is_ok());
    }
}
