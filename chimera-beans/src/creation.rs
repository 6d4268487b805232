//! Bean 创建流程
//!
//! 一次创建依次经过：解析类型、实例化前钩子（可以短路）、实例化、早期暴露、
//! 属性填充、初始化、初始化后钩子、注册销毁回调。任何阶段失败都会带上阶段标记返回。

use std::sync::Arc;

use anyhow::{bail, Context};

use crate::bean::{AutowireMode, BeanClass};
use crate::bean_factory::DefaultListableBeanFactory;
use crate::bean_post_processor::Capability;
use crate::definition_registry::MergedBeanDefinition;
use crate::disposable::DisposableBeanAdapter;
use crate::error::{ContainerError, ContainerResult, LifecyclePhase};
use crate::lifecycle::{BeanFactoryAware, BeanNameAware, InitializingBean};
use crate::metadata::{Executable, TypeMetadata};
use crate::scope::Scope;
use crate::value::{BeanInstance, TypeKey, Value};

impl DefaultListableBeanFactory {
    /// 按合并后的定义创建一个完整初始化的 Bean
    pub(crate) fn create_bean_internal(
        &self,
        bean_name: &str,
        merged: &Arc<MergedBeanDefinition>,
        args: Option<Vec<Value>>,
    ) -> ContainerResult<BeanInstance> {
        tracing::debug!("Creating instance of bean '{}'", bean_name);

        let bean_type = self.resolve_bean_class(bean_name, merged)?;
        self.prepare_method_overrides(bean_name, merged, bean_type)?;

        if let Some(bean) = self.resolve_before_instantiation(bean_name, merged, bean_type)? {
            tracing::debug!("Bean '{}' provided by a pre-instantiation hook", bean_name);
            return Ok(bean);
        }

        let bean = self.do_create_bean(bean_name, merged, args)?;
        tracing::debug!("Finished creating instance of bean '{}'", bean_name);
        Ok(bean)
    }

    /// 解析目标类型；按名称声明的类型只记录解析结果，不改写共享的合并定义
    pub(crate) fn resolve_bean_class(
        &self,
        bean_name: &str,
        merged: &Arc<MergedBeanDefinition>,
    ) -> ContainerResult<Option<TypeKey>> {
        let bean_class = merged.definition().bean_class.clone();
        match bean_class {
            Some(BeanClass::Key(key)) => Ok(Some(key)),
            Some(BeanClass::Name(_)) if merged.resolved_class().is_some() => Ok(merged.resolved_class()),
            Some(BeanClass::Name(class_name)) => {
                let key = self.catalog.resolve_name(&class_name).ok_or_else(|| {
                    ContainerError::lifecycle(
                        bean_name,
                        merged.resource_description().as_deref(),
                        LifecyclePhase::ClassResolved,
                        anyhow::anyhow!("cannot resolve type '{}' in the type catalog", class_name),
                    )
                })?;
                tracing::trace!("Resolved type '{}' of bean '{}' to {}", class_name, bean_name, key);
                merged.set_resolved_class(key);
                Ok(Some(key))
            }
            None => Ok(None),
        }
    }

    fn prepare_method_overrides(
        &self,
        bean_name: &str,
        merged: &Arc<MergedBeanDefinition>,
        bean_type: Option<TypeKey>,
    ) -> ContainerResult<()> {
        let overrides = merged.definition().method_overrides.clone();
        if overrides.is_empty() {
            return Ok(());
        }

        let meta = bean_type
            .and_then(|key| self.catalog.get(key))
            .ok_or_else(|| ContainerError::BeanDefinitionStore {
                name: bean_name.to_string(),
                reason: "method overrides require a bean type registered in the type catalog".to_string(),
            })?;
        for method_override in &overrides {
            if meta.overridable_method_count(method_override.method_name()) == 0 {
                return Err(ContainerError::BeanDefinitionStore {
                    name: bean_name.to_string(),
                    reason: format!(
                        "invalid method override: no overridable method named '{}' on type [{}]",
                        method_override.method_name(),
                        meta.name()
                    ),
                });
            }
        }
        Ok(())
    }

    /// 实例化前钩子，返回替代对象时只再执行初始化后钩子
    fn resolve_before_instantiation(
        &self,
        bean_name: &str,
        merged: &Arc<MergedBeanDefinition>,
        bean_type: Option<TypeKey>,
    ) -> ContainerResult<Option<BeanInstance>> {
        if *merged.before_instantiation_resolved.read() == Some(false) {
            return Ok(None);
        }

        let processors = self.processors.snapshot();
        let mut bean = None;
        if !merged.definition().synthetic && processors.has(Capability::PreInstantiation) {
            let target = bean_type.or_else(|| self.determine_target_type(bean_name, merged));
            if let Some(target) = target {
                let resource = merged.resource_description();
                for processor in processors.get(Capability::PreInstantiation) {
                    let result = processor
                        .post_process_before_instantiation(target, bean_name)
                        .map_err(|e| {
                            ContainerError::lifecycle(
                                bean_name,
                                resource.as_deref(),
                                LifecyclePhase::PreInstantiationHook,
                                e,
                            )
                        })?;
                    if let Some(substitute) = result {
                        tracing::trace!(
                            "Processor '{}' short-circuited creation of bean '{}'",
                            processor.name(),
                            bean_name
                        );
                        bean = Some(self.apply_after_initialization(substitute, bean_name).map_err(|e| {
                            ContainerError::lifecycle(
                                bean_name,
                                resource.as_deref(),
                                LifecyclePhase::PostInitialized,
                                e,
                            )
                        })?);
                        break;
                    }
                }
            }
        }
        *merged.before_instantiation_resolved.write() = Some(bean.is_some());
        Ok(bean)
    }

    fn do_create_bean(
        &self,
        bean_name: &str,
        merged: &Arc<MergedBeanDefinition>,
        args: Option<Vec<Value>>,
    ) -> ContainerResult<BeanInstance> {
        let resource = merged.resource_description();
        let is_singleton = merged.is_singleton();

        let cached = if is_singleton {
            self.factory_bean_instance_cache.lock().remove(bean_name)
        } else {
            None
        };
        let raw = match cached {
            Some(instance) => instance,
            None => self.create_bean_instance(bean_name, merged, args)?,
        };
        merged.set_target_type(raw.type_key());

        self.apply_merged_definition_hooks(bean_name, merged, raw.type_key())?;

        let config = self.config();
        let early_exposure = is_singleton
            && config.allow_circular_references
            && self.singletons.is_currently_in_creation(bean_name);
        if early_exposure {
            tracing::trace!(
                "Eagerly caching bean '{}' to allow for resolving potential circular references",
                bean_name
            );
            let factory = self.self_ref();
            let name = bean_name.to_string();
            let early = raw.clone();
            let early_merged = merged.clone();
            self.singletons.add_singleton_factory(
                bean_name,
                Box::new(move || match factory.upgrade() {
                    Some(factory) => factory.get_early_bean_reference(&name, &early_merged, early),
                    None => Ok(early),
                }),
            );
        }

        let exposed = match self
            .populate_bean(bean_name, merged, &raw)
            .and_then(|_| self.initialize_bean(bean_name, raw.clone(), Some(merged)))
        {
            Ok(bean) => bean,
            Err(e) if e.bean_name() == Some(bean_name) => return Err(e),
            Err(e) => {
                return Err(ContainerError::lifecycle(
                    bean_name,
                    resource.as_deref(),
                    LifecyclePhase::Populated,
                    e,
                ))
            }
        };

        let mut exposed = exposed;
        if early_exposure {
            if let Some(early_reference) = self.singletons.get_singleton(bean_name, false)? {
                if exposed.same_instance(&raw) {
                    exposed = early_reference;
                } else if !config.allow_raw_injection_despite_wrapping {
                    let dependents: Vec<String> = self
                        .singletons
                        .dependents_of(bean_name)
                        .into_iter()
                        .filter(|d| !self.remove_singleton_if_created_for_type_check_only(d))
                        .collect();
                    if !dependents.is_empty() {
                        return Err(ContainerError::RawReferenceEscaped {
                            bean: bean_name.to_string(),
                            dependents,
                        });
                    }
                }
            }
        }

        self.register_disposable_bean_if_necessary(bean_name, &raw, merged)
            .map_err(|e| {
                ContainerError::lifecycle(bean_name, resource.as_deref(), LifecyclePhase::Registered, e)
            })?;
        Ok(exposed)
    }

    /// 合并定义钩子，每个合并定义只执行一次
    fn apply_merged_definition_hooks(
        &self,
        bean_name: &str,
        merged: &Arc<MergedBeanDefinition>,
        bean_type: TypeKey,
    ) -> ContainerResult<()> {
        let mut post_processed = merged.post_processed.lock();
        if *post_processed {
            return Ok(());
        }
        let processors = self.processors.snapshot();
        if processors.has(Capability::MergedDefinition) {
            let mut definition = merged.snapshot();
            for processor in processors.get(Capability::MergedDefinition) {
                processor
                    .post_process_merged_bean_definition(&mut definition, bean_type, bean_name)
                    .map_err(|e| {
                        ContainerError::lifecycle(
                            bean_name,
                            definition.resource_description.as_deref(),
                            LifecyclePhase::Instantiated,
                            e,
                        )
                    })?;
            }
            merged.modify(|d| *d = definition);
        }
        *post_processed = true;
        Ok(())
    }

    /// 早期引用，经过早期引用钩子转换
    pub(crate) fn get_early_bean_reference(
        &self,
        bean_name: &str,
        merged: &Arc<MergedBeanDefinition>,
        bean: BeanInstance,
    ) -> ContainerResult<BeanInstance> {
        let mut exposed = bean;
        if merged.definition().synthetic {
            return Ok(exposed);
        }
        for processor in self.processors.snapshot().get(Capability::EarlyReference) {
            exposed = processor
                .get_early_bean_reference(exposed, bean_name)
                .map_err(|e| ContainerError::lifecycle(bean_name, None, LifecyclePhase::EarlyExposed, e))?;
        }
        Ok(exposed)
    }

    /// Aware 回调、初始化前钩子、init 回调、初始化后钩子
    pub(crate) fn initialize_bean(
        &self,
        bean_name: &str,
        bean: BeanInstance,
        merged: Option<&Arc<MergedBeanDefinition>>,
    ) -> ContainerResult<BeanInstance> {
        self.invoke_aware_methods(bean_name, &bean);

        let synthetic = merged.is_some_and(|m| m.definition().synthetic);
        let resource = merged.and_then(|m| m.resource_description());
        let fail = |phase: LifecyclePhase| {
            let resource = resource.clone();
            move |e: ContainerError| ContainerError::lifecycle(bean_name, resource.as_deref(), phase, e)
        };

        let mut wrapped = bean;
        if !synthetic {
            wrapped = self
                .apply_before_initialization(wrapped, bean_name)
                .map_err(fail(LifecyclePhase::Initialized))?;
        }

        self.invoke_init_methods(bean_name, &wrapped, merged)
            .map_err(|e| ContainerError::lifecycle(bean_name, resource.as_deref(), LifecyclePhase::Initialized, e))?;

        if !synthetic {
            wrapped = self
                .apply_after_initialization(wrapped, bean_name)
                .map_err(fail(LifecyclePhase::PostInitialized))?;
        }
        Ok(wrapped)
    }

    fn invoke_aware_methods(&self, bean_name: &str, bean: &BeanInstance) {
        if let Some(aware) = self.catalog.view::<dyn BeanNameAware>(bean) {
            aware.set_bean_name(bean_name);
        }
        if let Some(aware) = self.catalog.view::<dyn BeanFactoryAware>(bean) {
            aware.set_bean_factory(self.self_ref());
        }
    }

    fn invoke_init_methods(
        &self,
        bean_name: &str,
        bean: &BeanInstance,
        merged: Option<&Arc<MergedBeanDefinition>>,
    ) -> anyhow::Result<()> {
        let initializing = self.catalog.view::<dyn InitializingBean>(bean);
        if let Some(initializing) = &initializing {
            tracing::trace!("Invoking after_properties_set() on bean with name '{}'", bean_name);
            initializing.after_properties_set()?;
        }

        let declared = merged.and_then(|m| {
            let definition = m.definition();
            definition
                .init_method_name
                .clone()
                .map(|name| (name, definition.enforce_init_method))
        });
        let (init_method, enforce) = match declared {
            Some(declared) => declared,
            None => match self.config.read().default_init_method.clone() {
                Some(name) => (name, false),
                None => return Ok(()),
            },
        };
        if initializing.is_some() && init_method == "after_properties_set" {
            return Ok(());
        }

        let result = self
            .catalog
            .get(bean.type_key())
            .and_then(|meta| meta.invoke_method(&init_method, bean));
        match result {
            Some(result) => {
                tracing::trace!("Invoking init method '{}' on bean with name '{}'", init_method, bean_name);
                result.with_context(|| format!("init method '{}' failed", init_method))
            }
            None if enforce => bail!(
                "could not find an init method named '{}' on bean with name '{}'",
                init_method,
                bean_name
            ),
            None => {
                tracing::trace!(
                    "No default init method named '{}' found on bean with name '{}'",
                    init_method,
                    bean_name
                );
                Ok(())
            }
        }
    }

    pub(crate) fn apply_before_initialization(
        &self,
        bean: BeanInstance,
        bean_name: &str,
    ) -> ContainerResult<BeanInstance> {
        let mut current = bean;
        for processor in self.processors.snapshot().get(Capability::BeforeInitialization) {
            current = processor.post_process_before_initialization(current, bean_name)?;
        }
        Ok(current)
    }

    pub(crate) fn apply_after_initialization(
        &self,
        bean: BeanInstance,
        bean_name: &str,
    ) -> ContainerResult<BeanInstance> {
        let mut current = bean;
        for processor in self.processors.snapshot().get(Capability::AfterInitialization) {
            current = processor.post_process_after_initialization(current, bean_name)?;
        }
        Ok(current)
    }

    fn register_disposable_bean_if_necessary(
        &self,
        bean_name: &str,
        bean: &BeanInstance,
        merged: &Arc<MergedBeanDefinition>,
    ) -> ContainerResult<()> {
        let scope = merged.scope();
        if scope == Scope::Prototype {
            return Ok(());
        }

        let (destroy_method, enforce) = {
            let definition = merged.definition();
            match &definition.destroy_method_name {
                Some(name) => (Some(name.clone()), definition.enforce_destroy_method),
                None => (self.config.read().default_destroy_method.clone(), false),
            }
        };
        let adapter = DisposableBeanAdapter::new(
            bean_name,
            bean.clone(),
            self.catalog.clone(),
            destroy_method,
            enforce,
            &self.processors.snapshot(),
        )?;
        let Some(adapter) = adapter else {
            return Ok(());
        };

        match scope {
            Scope::Custom(scope) => {
                let handler = self.scope_handler(bean_name, &scope)?;
                let adapter = Arc::new(adapter);
                let name = bean_name.to_string();
                handler.register_destruction_callback(
                    bean_name,
                    Box::new(move || {
                        if let Err(e) = adapter.run() {
                            tracing::warn!("Destruction of scoped bean '{}' failed: {:#}", name, e);
                        }
                    }),
                );
            }
            _ => self.singletons.register_disposable(bean_name, Arc::new(adapter)),
        }
        Ok(())
    }

    /// 创建原始实例：supplier、工厂方法或构造函数
    pub(crate) fn create_bean_instance(
        &self,
        bean_name: &str,
        merged: &Arc<MergedBeanDefinition>,
        args: Option<Vec<Value>>,
    ) -> ContainerResult<BeanInstance> {
        let definition = merged.creation_snapshot();

        if let Some(supplier) = &definition.instance_supplier {
            tracing::trace!("Obtaining bean '{}' from its instance supplier", bean_name);
            return supplier().map_err(|e| ContainerError::Instantiation {
                bean: bean_name.to_string(),
                type_name: definition
                    .bean_type_key()
                    .map(|key| key.name().to_string())
                    .unwrap_or_else(|| "unknown".to_string()),
                message: "instance supplier threw exception".to_string(),
                source: Some(e),
            });
        }

        if definition.factory_method_name.is_some() {
            return self.instantiate_using_factory_method(bean_name, merged, &definition, args);
        }

        let bean_type = definition
            .bean_type_key()
            .ok_or_else(|| ContainerError::BeanDefinitionStore {
                name: bean_name.to_string(),
                reason: "bean definition declares neither a bean class nor a factory method".to_string(),
            })?;
        let meta = self
            .catalog
            .get(bean_type)
            .ok_or_else(|| ContainerError::Instantiation {
                bean: bean_name.to_string(),
                type_name: bean_type.name().to_string(),
                message: "type is not registered in the type catalog".to_string(),
                source: None,
            })?;

        if args.is_none() {
            let (resolved, autowire_necessary) = {
                let cache = merged.resolution.lock();
                (cache.resolved_executable.is_some(), cache.arguments_resolved)
            };
            if resolved {
                return if autowire_necessary {
                    self.autowire_constructor(bean_name, merged, &definition, &meta, None, None)
                } else {
                    self.instantiate_default(bean_name, merged, &definition, &meta)
                };
            }
        }

        let candidates = self.determine_candidate_constructors(bean_name, &meta, merged)?;
        if candidates.is_some()
            || definition.autowire_mode == AutowireMode::Constructor
            || definition.has_constructor_args()
            || args.as_ref().is_some_and(|args| !args.is_empty())
        {
            return self.autowire_constructor(bean_name, merged, &definition, &meta, candidates, args);
        }

        self.instantiate_default(bean_name, merged, &definition, &meta)
    }

    fn determine_candidate_constructors(
        &self,
        bean_name: &str,
        meta: &TypeMetadata,
        merged: &Arc<MergedBeanDefinition>,
    ) -> ContainerResult<Option<Vec<Arc<Executable>>>> {
        for processor in self.processors.snapshot().get(Capability::CandidateConstructors) {
            let candidates = processor
                .determine_candidate_constructors(meta, bean_name)
                .map_err(|e| {
                    ContainerError::lifecycle(
                        bean_name,
                        merged.resource_description().as_deref(),
                        LifecyclePhase::Instantiated,
                        e,
                    )
                })?;
            if candidates.is_some() {
                return Ok(candidates);
            }
        }
        Ok(None)
    }

    /// 使用无参构造函数；没有时退回到构造函数自动装配
    fn instantiate_default(
        &self,
        bean_name: &str,
        merged: &Arc<MergedBeanDefinition>,
        definition: &crate::bean::BeanDefinition,
        meta: &Arc<TypeMetadata>,
    ) -> ContainerResult<BeanInstance> {
        let default_constructor = meta
            .constructors()
            .iter()
            .find(|c| c.parameter_count() == 0)
            .cloned();
        let Some(constructor) = default_constructor else {
            let all = meta.constructors().to_vec();
            return self.autowire_constructor(bean_name, merged, definition, meta, Some(all), None);
        };

        {
            let mut cache = merged.resolution.lock();
            if cache.resolved_executable.is_none() {
                cache.resolved_executable = Some(constructor.clone());
                cache.arguments_resolved = false;
            }
        }
        self.instantiation_strategy()
            .instantiate(definition, bean_name, &constructor, None, Vec::new(), self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bean::BeanDefinition;
    use crate::bean_factory::{BeanFactory, BeanFactoryExt, ConfigurableBeanFactory};
    use crate::bean_post_processor::BeanPostProcessor;
    use crate::config::BeanFactoryConfig;
    use crate::metadata::BeanType;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Journal {
        steps: Mutex<Vec<String>>,
    }

    impl Journal {
        fn record(&self, step: &str) {
            self.steps.lock().push(step.to_string());
        }
    }

    impl BeanNameAware for Journal {
        fn set_bean_name(&self, name: &str) {
            self.record(&format!("name:{}", name));
        }
    }

    impl InitializingBean for Journal {
        fn after_properties_set(&self) -> anyhow::Result<()> {
            self.record("after_properties_set");
            Ok(())
        }
    }

    struct Recorder;

    impl BeanPostProcessor for Recorder {
        fn post_process_before_initialization(
            &self,
            bean: BeanInstance,
            _bean_name: &str,
        ) -> ContainerResult<BeanInstance> {
            if let Some(journal) = bean.downcast::<Journal>() {
                journal.record("before_init");
            }
            Ok(bean)
        }

        fn post_process_after_initialization(
            &self,
            bean: BeanInstance,
            _bean_name: &str,
        ) -> ContainerResult<BeanInstance> {
            if let Some(journal) = bean.downcast::<Journal>() {
                journal.record("after_init");
            }
            Ok(bean)
        }
    }

    fn journal_type() -> crate::metadata::TypeMetadata {
        BeanType::<Journal>::new()
            .constructor(Journal::default)
            .property("entry", |j: &Journal, entry: String| j.record(&format!("set:{}", entry)))
            .method("start", |j: &Journal| {
                j.record("start");
                Ok(())
            })
            .implements::<dyn BeanNameAware>(|j| j)
            .implements::<dyn InitializingBean>(|j| j)
            .build()
    }

    #[test]
    fn test_lifecycle_order() {
        let factory = DefaultListableBeanFactory::new();
        factory.register_type(journal_type());
        factory.add_bean_post_processor(Arc::new(Recorder));
        factory
            .register_bean_definition(
                "journal",
                BeanDefinition::of::<Journal>()
                    .with_property("entry", "a")
                    .with_init_method("start"),
            )
            .unwrap();

        let journal = factory.get_bean_typed::<Journal>("journal").unwrap();
        assert_eq!(
            *journal.steps.lock(),
            vec![
                "set:a",
                "name:journal",
                "before_init",
                "after_properties_set",
                "start",
                "after_init"
            ]
        );
    }

    #[test]
    fn test_missing_explicit_init_method_fails() {
        let factory = DefaultListableBeanFactory::new();
        factory.register_type(journal_type());
        factory
            .register_bean_definition("journal", BeanDefinition::of::<Journal>().with_init_method("boot"))
            .unwrap();

        match factory.get_bean("journal") {
            Err(ContainerError::LifecyclePhase { phase, .. }) => assert_eq!(phase, LifecyclePhase::Initialized),
            other => panic!("expected lifecycle error, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_default_init_method_is_ignored() {
        let config = BeanFactoryConfig {
            default_init_method: Some("boot".to_string()),
            ..Default::default()
        };
        let factory = DefaultListableBeanFactory::with_config(config);
        factory.register_type(journal_type());
        factory
            .register_bean_definition("journal", BeanDefinition::of::<Journal>())
            .unwrap();

        assert!(factory.get_bean("journal").is_ok());
    }

    #[test]
    fn test_supplier_replaces_constructor_resolution() {
        let factory = DefaultListableBeanFactory::new();
        factory
            .register_bean_definition(
                "answer",
                BeanDefinition::of::<i64>().with_supplier(|| Ok(BeanInstance::new(42i64))),
            )
            .unwrap();

        assert_eq!(*factory.get_bean_typed::<i64>("answer").unwrap(), 42);
    }

    #[test]
    fn test_unresolvable_named_class() {
        let factory = DefaultListableBeanFactory::new();
        factory
            .register_bean_definition("ghost", BeanDefinition::named_class("Ghost"))
            .unwrap();

        match factory.get_bean("ghost") {
            Err(ContainerError::LifecyclePhase { phase, .. }) => assert_eq!(phase, LifecyclePhase::ClassResolved),
            other => panic!("expected class resolution failure, got {:?}", other),
        }
    }

    static SHORT_CIRCUITED_CONSTRUCTED: std::sync::atomic::AtomicUsize = std::sync::atomic::AtomicUsize::new(0);

    #[derive(Default)]
    struct Gadget {
        origin: Mutex<Vec<String>>,
    }

    struct Substitutor;

    impl BeanPostProcessor for Substitutor {
        fn capabilities(&self) -> Vec<Capability> {
            vec![Capability::PreInstantiation, Capability::AfterInitialization]
        }

        fn post_process_before_instantiation(
            &self,
            bean_type: TypeKey,
            _bean_name: &str,
        ) -> ContainerResult<Option<BeanInstance>> {
            if bean_type != TypeKey::of::<Gadget>() {
                return Ok(None);
            }
            let gadget = Gadget::default();
            gadget.origin.lock().push("substitute".to_string());
            Ok(Some(BeanInstance::new(gadget)))
        }

        fn post_process_after_initialization(
            &self,
            bean: BeanInstance,
            _bean_name: &str,
        ) -> ContainerResult<BeanInstance> {
            if let Some(gadget) = bean.downcast::<Gadget>() {
                gadget.origin.lock().push("after_init".to_string());
            }
            Ok(bean)
        }
    }

    #[test]
    fn test_pre_instantiation_substitute_skips_creation() {
        let factory = DefaultListableBeanFactory::new();
        factory.register_type(
            BeanType::<Gadget>::new()
                .constructor(|| {
                    SHORT_CIRCUITED_CONSTRUCTED.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                    Gadget::default()
                })
                .property("label", |g: &Gadget, label: String| g.origin.lock().push(label))
                .build(),
        );
        factory.add_bean_post_processor(Arc::new(Substitutor));
        factory
            .register_bean_definition("gadget", BeanDefinition::of::<Gadget>().with_property("label", "declared"))
            .unwrap();

        let gadget = factory.get_bean_typed::<Gadget>("gadget").unwrap();
        assert_eq!(*gadget.origin.lock(), vec!["substitute", "after_init"]);
        assert_eq!(SHORT_CIRCUITED_CONSTRUCTED.load(std::sync::atomic::Ordering::SeqCst), 0);
        assert!(factory.contains_singleton("gadget"));
    }

    struct Fragile;

    #[test]
    fn test_failing_constructor_is_instantiation_error() {
        let factory = DefaultListableBeanFactory::new();
        factory.register_type(
            BeanType::<Fragile>::new()
                .try_constructor(|| -> anyhow::Result<Fragile> { Err(anyhow::anyhow!("kaboom")) })
                .build(),
        );
        factory
            .register_bean_definition("fragile", BeanDefinition::of::<Fragile>())
            .unwrap();

        let err = factory.get_bean("fragile").unwrap_err();
        match err.find_cause(|e| matches!(e, ContainerError::Instantiation { .. })) {
            Some(ContainerError::Instantiation { bean, source: Some(source), .. }) => {
                assert_eq!(bean, "fragile");
                assert!(format!("{:#}", source).contains("kaboom"));
            }
            other => panic!("expected instantiation failure, got {:?}", other),
        }
        assert!(!factory.contains_singleton("fragile"));
    }

    #[test]
    fn test_named_class_resolution_leaves_definition_untouched() {
        let factory = DefaultListableBeanFactory::new();
        factory.register_type(journal_type());
        factory
            .register_bean_definition("journal", BeanDefinition::named_class("Journal"))
            .unwrap();

        factory.get_bean_typed::<Journal>("journal").unwrap();

        let merged = factory.get_merged_bean_definition("journal").unwrap();
        assert!(matches!(merged.definition().bean_class, Some(BeanClass::Name(ref name)) if name == "Journal"));
        assert_eq!(merged.resolved_class(), Some(TypeKey::of::<Journal>()));
        assert_eq!(merged.creation_snapshot().bean_type_key(), Some(TypeKey::of::<Journal>()));
    }
}
