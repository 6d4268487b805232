//! 属性填充与自动装配

use std::sync::atomic::Ordering;
use std::sync::Arc;

use anyhow::Context;

use crate::bean::{AutowireMode, BeanDefinition, BeanValue, DependencyCheck, PropertyValues};
use crate::bean_factory::{BeanFactory, DefaultListableBeanFactory};
use crate::bean_post_processor::Capability;
use crate::constants::{GENERATED_BEAN_NAME_SEPARATOR, INNER_BEAN_PREFIX};
use crate::definition_registry::MergedBeanDefinition;
use crate::dependency::DependencyDescriptor;
use crate::error::{ContainerError, ContainerResult, LifecyclePhase};
use crate::metadata::{PropertyDescriptor, TypeMetadata};
use crate::value::{BeanInstance, Value};

impl DefaultListableBeanFactory {
    /// 用定义中的属性值和自动装配结果填充实例
    pub(crate) fn populate_bean(
        &self,
        bean_name: &str,
        merged: &Arc<MergedBeanDefinition>,
        bean: &BeanInstance,
    ) -> ContainerResult<()> {
        let definition = merged.snapshot();
        let processors = self.processors.snapshot();

        if !definition.synthetic {
            for processor in processors.get(Capability::AfterInstantiation) {
                if !processor.post_process_after_instantiation(bean, bean_name)? {
                    tracing::trace!(
                        "Processor '{}' skipped property population of bean '{}'",
                        processor.name(),
                        bean_name
                    );
                    return Ok(());
                }
            }
        }

        let meta = self.catalog.get(bean.type_key());
        let mut property_values = definition.property_values.clone();
        if let Some(meta) = &meta {
            match definition.autowire_mode {
                AutowireMode::ByName => self.autowire_by_name(bean_name, meta, &mut property_values)?,
                AutowireMode::ByType => {
                    self.autowire_by_type(bean_name, &definition, meta, &mut property_values)?
                }
                _ => {}
            }
        }

        if !definition.synthetic {
            for processor in processors.get(Capability::PropertyRewrite) {
                property_values = processor.post_process_properties(property_values, bean, bean_name)?;
            }
        }

        if definition.dependency_check != DependencyCheck::None {
            if let Some(meta) = &meta {
                check_dependencies(bean_name, &definition, meta, &property_values)?;
            }
        }

        if property_values.is_empty() {
            return Ok(());
        }
        self.apply_property_values(bean_name, merged, bean, meta.as_deref(), &property_values)
    }

    fn autowire_by_name(
        &self,
        bean_name: &str,
        meta: &TypeMetadata,
        property_values: &mut PropertyValues,
    ) -> ContainerResult<()> {
        for property in unsatisfied_non_simple_properties(meta, property_values) {
            let name = property.name();
            if !self.contains_bean(name) {
                tracing::trace!(
                    "Not autowiring property '{}' of bean '{}' by name: no matching bean found",
                    name,
                    bean_name
                );
                continue;
            }
            let bean = self.get_bean(name)?;
            property_values.add(name, bean);
            self.singletons
                .register_dependent(&self.transformed_bean_name(name), bean_name);
            tracing::debug!(
                "Added autowiring by name from bean name '{}' via property '{}' to bean named '{}'",
                bean_name,
                name,
                name
            );
        }
        Ok(())
    }

    fn autowire_by_type(
        &self,
        bean_name: &str,
        definition: &BeanDefinition,
        meta: &TypeMetadata,
        property_values: &mut PropertyValues,
    ) -> ContainerResult<()> {
        for property in unsatisfied_non_simple_properties(meta, property_values) {
            let injection_point = format!("bean property '{}'", property.name());
            let mut descriptor = DependencyDescriptor::new(property.value_type().clone(), injection_point.clone())
                .with_name(property.name());
            descriptor.required = property.is_required();

            let mut autowired = Vec::new();
            let value = self
                .resolve_dependency(&descriptor, Some(bean_name), &mut autowired)
                .map_err(|e| ContainerError::UnsatisfiedDependency {
                    bean: bean_name.to_string(),
                    resource: definition.resource_description.clone(),
                    injection_point,
                    reason: e.to_string(),
                    cause: Some(Box::new(e)),
                })?;

            if !value.is_null() {
                property_values.add(property.name(), value);
            }
            for autowired_name in autowired {
                self.singletons.register_dependent(&autowired_name, bean_name);
                tracing::debug!(
                    "Autowiring by type from bean name '{}' via property '{}' to bean named '{}'",
                    bean_name,
                    property.name(),
                    autowired_name
                );
            }
        }
        Ok(())
    }

    fn apply_property_values(
        &self,
        bean_name: &str,
        merged: &Arc<MergedBeanDefinition>,
        bean: &BeanInstance,
        meta: Option<&TypeMetadata>,
        property_values: &PropertyValues,
    ) -> ContainerResult<()> {
        let mut pending = Vec::with_capacity(property_values.len());
        for (name, value) in property_values.iter() {
            let property = meta
                .and_then(|meta| meta.property(name))
                .ok_or_else(|| ContainerError::NotWritableProperty {
                    bean: bean_name.to_string(),
                    property: name.to_string(),
                    type_name: bean.type_name().to_string(),
                })?;
            let context = format!("bean property '{}'", name);
            let resolved =
                self.resolve_value_if_necessary(bean_name, merged, &context, value, LifecyclePhase::Populated)?;
            let converted = self.converter.convert(resolved, property.value_type(), Some(name))?;
            pending.push((property, converted));
        }

        for (property, value) in pending {
            tracing::trace!("Setting property '{}' on bean '{}'", property.name(), bean_name);
            property
                .set(bean, value)
                .with_context(|| format!("error setting property values: property '{}' threw exception", property.name()))
                .map_err(|e| {
                    ContainerError::lifecycle(
                        bean_name,
                        merged.resource_description().as_deref(),
                        LifecyclePhase::Populated,
                        e,
                    )
                })?;
        }
        Ok(())
    }

    /// 把声明值解析为运行时值：Bean 引用、内部 Bean、占位符、列表
    pub(crate) fn resolve_value_if_necessary(
        &self,
        bean_name: &str,
        merged: &Arc<MergedBeanDefinition>,
        context: &str,
        value: &BeanValue,
        phase: LifecyclePhase,
    ) -> ContainerResult<Value> {
        match value {
            BeanValue::Literal(value) => Ok(value.clone()),
            BeanValue::Ref(reference) => {
                let bean = self.get_bean(reference).map_err(|e| {
                    ContainerError::lifecycle(
                        bean_name,
                        merged.resource_description().as_deref(),
                        phase,
                        anyhow::Error::new(e).context(format!(
                            "cannot resolve reference to bean '{}' while setting {}",
                            reference, context
                        )),
                    )
                })?;
                self.singletons
                    .register_dependent(&self.transformed_bean_name(reference), bean_name);
                Ok(Value::Object(bean))
            }
            BeanValue::Inner(definition) => self.resolve_inner_bean(bean_name, merged, context, definition, phase),
            BeanValue::Placeholder(expression) => self
                .environment
                .resolve_placeholders(expression)
                .map(Value::Str),
            BeanValue::List(items) => items
                .iter()
                .map(|item| self.resolve_value_if_necessary(bean_name, merged, context, item, phase))
                .collect::<ContainerResult<Vec<_>>>()
                .map(Value::List),
        }
    }

    fn resolve_inner_bean(
        &self,
        outer_name: &str,
        outer: &Arc<MergedBeanDefinition>,
        context: &str,
        definition: &BeanDefinition,
        phase: LifecyclePhase,
    ) -> ContainerResult<Value> {
        let id = self.inner_bean_counter.fetch_add(1, Ordering::Relaxed);
        let inner_name = format!(
            "{}{}{}{}{}",
            INNER_BEAN_PREFIX, GENERATED_BEAN_NAME_SEPARATOR, outer_name, GENERATED_BEAN_NAME_SEPARATOR, id
        );
        let fail = |e: ContainerError| {
            ContainerError::lifecycle(
                outer_name,
                outer.resource_description().as_deref(),
                phase,
                anyhow::Error::new(e).context(format!(
                    "cannot create inner bean '{}' while setting {}",
                    inner_name, context
                )),
            )
        };

        let merged = self
            .definitions
            .merge_standalone(&inner_name, definition)
            .map_err(fail)?;
        if !outer.is_singleton() {
            let scope = outer.scope();
            merged.modify(|d| d.scope = Some(scope));
        }

        tracing::trace!("Creating inner bean '{}' for bean '{}'", inner_name, outer_name);
        let instance = self
            .create_bean_internal(&inner_name, &merged, None)
            .map_err(fail)?;
        if outer.is_singleton() {
            self.singletons.register_contained(&inner_name, outer_name);
        }
        self.singletons.register_dependent(&inner_name, outer_name);

        self.object_for_bean_instance(instance, &inner_name, &inner_name, Some(&merged))
            .map(Value::Object)
            .map_err(fail)
    }
}

fn unsatisfied_non_simple_properties<'a>(
    meta: &'a TypeMetadata,
    property_values: &PropertyValues,
) -> Vec<&'a PropertyDescriptor> {
    meta.properties()
        .iter()
        .filter(|p| !p.is_simple() && !property_values.contains(p.name()))
        .collect()
}

fn check_dependencies(
    bean_name: &str,
    definition: &BeanDefinition,
    meta: &TypeMetadata,
    property_values: &PropertyValues,
) -> ContainerResult<()> {
    for property in meta.properties() {
        if !property.is_required() || property_values.contains(property.name()) {
            continue;
        }
        let checked = match definition.dependency_check {
            DependencyCheck::All => true,
            DependencyCheck::Simple => property.is_simple(),
            DependencyCheck::Objects => !property.is_simple(),
            DependencyCheck::None => false,
        };
        if checked {
            return Err(ContainerError::UnsatisfiedDependency {
                bean: bean_name.to_string(),
                resource: definition.resource_description.clone(),
                injection_point: format!("bean property '{}'", property.name()),
                reason: "set this property value or disable dependency checking for this bean".to_string(),
                cause: None,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bean_factory::{BeanFactoryExt, ConfigurableBeanFactory};
    use crate::config::{ConfigValue, MapPropertySource};
    use crate::metadata::BeanType;
    use crate::scope::Scope;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Engine {
        power: Mutex<i64>,
    }

    #[derive(Default)]
    struct Car {
        engine: Mutex<Option<Arc<Engine>>>,
        model: Mutex<String>,
    }

    fn factory() -> Arc<DefaultListableBeanFactory> {
        let factory = DefaultListableBeanFactory::new();
        factory.register_type(
            BeanType::<Engine>::new()
                .constructor(Engine::default)
                .property("power", |e: &Engine, power: i64| *e.power.lock() = power)
                .build(),
        );
        factory.register_type(
            BeanType::<Car>::new()
                .constructor(Car::default)
                .property("engine", |c: &Car, engine: Arc<Engine>| *c.engine.lock() = Some(engine))
                .property("model", |c: &Car, model: String| *c.model.lock() = model)
                .build(),
        );
        factory
    }

    #[test]
    fn test_autowire_by_name() {
        let factory = factory();
        factory
            .register_bean_definition("engine", BeanDefinition::of::<Engine>())
            .unwrap();
        factory
            .register_bean_definition("car", BeanDefinition::of::<Car>().with_autowire(AutowireMode::ByName))
            .unwrap();

        let car = factory.get_bean_typed::<Car>("car").unwrap();
        let engine = factory.get_bean_typed::<Engine>("engine").unwrap();
        assert!(Arc::ptr_eq(car.engine.lock().as_ref().unwrap(), &engine));
        assert_eq!(factory.dependents_of("engine"), vec!["car"]);
    }

    #[test]
    fn test_dependency_check_reports_unset_property() {
        let factory = factory();
        factory
            .register_bean_definition(
                "car",
                BeanDefinition::of::<Car>()
                    .with_property("model", "roadster")
                    .with_dependency_check(DependencyCheck::Objects),
            )
            .unwrap();

        let err = factory.get_bean("car").unwrap_err();
        let unsatisfied = err
            .find_cause(|e| matches!(e, ContainerError::UnsatisfiedDependency { .. }))
            .expect("unsatisfied dependency");
        assert!(unsatisfied.to_string().contains("bean property 'engine'"));
    }

    #[test]
    fn test_unknown_property_is_rejected() {
        let factory = factory();
        factory
            .register_bean_definition("engine", BeanDefinition::of::<Engine>().with_property("torque", 5))
            .unwrap();

        let err = factory.get_bean("engine").unwrap_err();
        assert!(err
            .find_cause(|e| matches!(e, ContainerError::NotWritableProperty { .. }))
            .is_some());
    }

    #[test]
    fn test_conversion_failure_names_types() {
        let factory = factory();
        factory
            .register_bean_definition("engine", BeanDefinition::of::<Engine>().with_property("power", "lots"))
            .unwrap();

        let err = factory.get_bean("engine").unwrap_err();
        match err.find_cause(|e| matches!(e, ContainerError::TypeConversion { .. })) {
            Some(ContainerError::TypeConversion { value_type, required_type, .. }) => {
                assert_eq!(value_type, "String");
                assert_eq!(required_type, "i64");
            }
            other => panic!("expected conversion error, got {:?}", other),
        }
    }

    #[test]
    fn test_placeholder_and_inner_bean() {
        let factory = factory();
        factory.environment().add_property_source(Box::new(
            MapPropertySource::new("test").with_property("engine.power", ConfigValue::Int(300)),
        ));
        factory
            .register_bean_definition(
                "car",
                BeanDefinition::of::<Car>()
                    .with_property("model", BeanValue::placeholder("${car.model:coupe}"))
                    .with_property(
                        "engine",
                        BeanValue::inner(
                            BeanDefinition::of::<Engine>()
                                .with_property("power", BeanValue::placeholder("${engine.power}")),
                        ),
                    ),
            )
            .unwrap();

        let car = factory.get_bean_typed::<Car>("car").unwrap();
        assert_eq!(*car.model.lock(), "coupe");
        let engine = car.engine.lock().clone().unwrap();
        assert_eq!(*engine.power.lock(), 300);
        assert_eq!(factory.dependencies_of("car").len(), 1);
    }

    #[test]
    fn test_inner_bean_follows_prototype_outer_scope() {
        let factory = factory();
        factory
            .register_bean_definition(
                "car",
                BeanDefinition::of::<Car>()
                    .with_scope(Scope::Prototype)
                    .with_property("engine", BeanValue::inner(BeanDefinition::of::<Engine>())),
            )
            .unwrap();

        let first = factory.get_bean_typed::<Car>("car").unwrap();
        let second = factory.get_bean_typed::<Car>("car").unwrap();
        let first_engine = first.engine.lock().clone().unwrap();
        let second_engine = second.engine.lock().clone().unwrap();
        assert!(!Arc::ptr_eq(&first_engine, &second_engine));
        assert_eq!(factory.singleton_names().len(), 0);
    }

    struct SelfInjecting;

    impl crate::bean_post_processor::BeanPostProcessor for SelfInjecting {
        fn capabilities(&self) -> Vec<Capability> {
            vec![Capability::AfterInstantiation]
        }

        fn post_process_after_instantiation(&self, bean: &BeanInstance, _bean_name: &str) -> ContainerResult<bool> {
            if let Some(car) = bean.downcast::<Car>() {
                *car.model.lock() = "hand-wired".to_string();
                return Ok(false);
            }
            Ok(true)
        }
    }

    #[test]
    fn test_after_instantiation_veto_skips_population() {
        let factory = factory();
        factory.add_bean_post_processor(Arc::new(SelfInjecting));
        factory
            .register_bean_definition("car", BeanDefinition::of::<Car>().with_property("model", "roadster"))
            .unwrap();
        factory
            .register_bean_definition("engine", BeanDefinition::of::<Engine>().with_property("power", 120))
            .unwrap();

        let car = factory.get_bean_typed::<Car>("car").unwrap();
        assert_eq!(*car.model.lock(), "hand-wired");
        assert!(car.engine.lock().is_none());
        assert_eq!(*factory.get_bean_typed::<Engine>("engine").unwrap().power.lock(), 120);
    }

    struct Tuner;

    impl crate::bean_post_processor::BeanPostProcessor for Tuner {
        fn capabilities(&self) -> Vec<Capability> {
            vec![Capability::PropertyRewrite]
        }

        fn post_process_properties(
            &self,
            properties: PropertyValues,
            bean: &BeanInstance,
            _bean_name: &str,
        ) -> ContainerResult<PropertyValues> {
            if bean.downcast::<Engine>().is_some() {
                return Ok(properties.with("power", 450));
            }
            Ok(properties)
        }
    }

    #[test]
    fn test_property_rewrite_replaces_and_adds_values() {
        let factory = factory();
        factory.add_bean_post_processor(Arc::new(Tuner));
        factory
            .register_bean_definition("tuned", BeanDefinition::of::<Engine>().with_property("power", 200))
            .unwrap();
        factory
            .register_bean_definition("stock", BeanDefinition::of::<Engine>())
            .unwrap();

        assert_eq!(*factory.get_bean_typed::<Engine>("tuned").unwrap().power.lock(), 450);
        assert_eq!(*factory.get_bean_typed::<Engine>("stock").unwrap().power.lock(), 450);
    }
}
