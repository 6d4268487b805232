//! FactoryBean 支持与类型预测
//!
//! 名称为 `name` 的 FactoryBean 以 `name` 暴露产品、以 `&name` 暴露自身。
//! 单例产品缓存在工厂中；尚未创建的 FactoryBean 在类型匹配时做一次快捷实例化（不填充属性），
//! 原始实例留给之后真正的创建过程复用。

use std::sync::Arc;

use crate::bean::BeanClass;
use crate::bean_factory::DefaultListableBeanFactory;
use crate::bean_post_processor::Capability;
use crate::definition_registry::MergedBeanDefinition;
use crate::error::{ContainerError, ContainerResult, LifecyclePhase};
use crate::lifecycle::FactoryBean;
use crate::utils::naming;
use crate::value::{BeanInstance, TypeKey};

impl DefaultListableBeanFactory {
    /// 取得请求名称对应的对象：普通 Bean 原样返回，FactoryBean 返回产品（`&` 前缀时返回自身）
    pub(crate) fn object_for_bean_instance(
        &self,
        instance: BeanInstance,
        requested_name: &str,
        bean_name: &str,
        merged: Option<&Arc<MergedBeanDefinition>>,
    ) -> ContainerResult<BeanInstance> {
        let factory = self.catalog.view::<dyn FactoryBean>(&instance);

        if naming::is_factory_dereference(requested_name) {
            return match factory {
                Some(_) => Ok(instance),
                None => Err(ContainerError::BeanIsNotAFactory {
                    name: bean_name.to_string(),
                    actual: instance.type_name().to_string(),
                }),
            };
        }

        let Some(factory) = factory else {
            return Ok(instance);
        };

        let synthetic = match merged {
            Some(merged) => {
                *merged.is_factory_bean.write() = Some(true);
                merged.definition().synthetic
            }
            None => false,
        };
        self.get_object_from_factory_bean(&factory, bean_name, !synthetic)
    }

    fn get_object_from_factory_bean(
        &self,
        factory: &Arc<dyn FactoryBean>,
        bean_name: &str,
        should_post_process: bool,
    ) -> ContainerResult<BeanInstance> {
        if !(factory.is_singleton() && self.singletons.contains_singleton(bean_name)) {
            let object = self.do_get_object_from_factory_bean(factory, bean_name)?;
            if !should_post_process {
                return Ok(object);
            }
            return self
                .apply_after_initialization(object, bean_name)
                .map_err(|e| ContainerError::lifecycle(bean_name, None, LifecyclePhase::PostInitialized, e));
        }

        if let Some(cached) = self.factory_bean_objects.lock().get(bean_name) {
            return Ok(cached.clone());
        }

        let object = self.do_get_object_from_factory_bean(factory, bean_name)?;
        // 另一个线程可能已经放入了产品
        if let Some(existing) = self.factory_bean_objects.lock().get(bean_name) {
            return Ok(existing.clone());
        }

        let object = if should_post_process {
            if self.singletons.is_currently_in_creation(bean_name) {
                // 循环引用期间暂时返回未经后置处理的产品，不缓存
                return Ok(object);
            }
            self.apply_after_initialization(object, bean_name)
                .map_err(|e| ContainerError::lifecycle(bean_name, None, LifecyclePhase::PostInitialized, e))?
        } else {
            object
        };

        if !self.singletons.contains_singleton(bean_name) {
            return Ok(object);
        }
        Ok(self
            .factory_bean_objects
            .lock()
            .entry(bean_name.to_string())
            .or_insert(object)
            .clone())
    }

    fn do_get_object_from_factory_bean(
        &self,
        factory: &Arc<dyn FactoryBean>,
        bean_name: &str,
    ) -> ContainerResult<BeanInstance> {
        tracing::trace!("Obtaining object from FactoryBean '{}'", bean_name);
        factory.get_object().map_err(|e| ContainerError::Instantiation {
            bean: bean_name.to_string(),
            type_name: factory
                .object_type()
                .map(|key| key.name().to_string())
                .unwrap_or_else(|| "unknown".to_string()),
            message: "FactoryBean threw exception on object creation".to_string(),
            source: Some(e),
        })
    }

    pub(crate) fn is_factory_bean_type(&self, key: TypeKey) -> bool {
        let factory = TypeKey::of::<dyn FactoryBean>();
        key == factory || self.catalog.get(key).is_some_and(|meta| meta.implements(factory))
    }

    /// 名称对应的对象能否作为 `required` 使用
    ///
    /// `allow_init` 为 false 时不会为了确定产品类型而实例化 FactoryBean
    pub(crate) fn is_type_match_internal(
        &self,
        name: &str,
        required: TypeKey,
        allow_init: bool,
    ) -> ContainerResult<bool> {
        let bean_name = self.transformed_bean_name(name);
        let dereference = naming::is_factory_dereference(name);

        if let Some(instance) = self.singletons.get_singleton(&bean_name, false)? {
            return Ok(match self.catalog.view::<dyn FactoryBean>(&instance) {
                Some(factory) if !dereference => factory
                    .object_type()
                    .is_some_and(|key| self.catalog.is_assignable(key, required)),
                Some(_) => self.instance_matches(&instance, required),
                None => !dereference && self.instance_matches(&instance, required),
            });
        }

        if !self.definitions.contains(&bean_name) {
            return Ok(false);
        }
        let merged = self.definitions.merged(&bean_name)?;
        let Some(predicted) = self.predict_bean_type(&bean_name, &merged) else {
            return Ok(false);
        };

        if self.is_factory_bean_type(predicted) {
            if dereference {
                return Ok(self.catalog.is_assignable(predicted, required));
            }
            let object_type = self.factory_bean_object_type(&bean_name, &merged, allow_init)?;
            return Ok(object_type.is_some_and(|key| self.catalog.is_assignable(key, required)));
        }
        Ok(!dereference && self.catalog.is_assignable(predicted, required))
    }

    /// 预测 Bean 的类型（不创建 Bean），类型预测钩子可以修正结果
    pub(crate) fn predict_bean_type(
        &self,
        bean_name: &str,
        merged: &Arc<MergedBeanDefinition>,
    ) -> Option<TypeKey> {
        let target = self.determine_target_type(bean_name, merged)?;
        if merged.definition().synthetic {
            return Some(target);
        }
        let processors = self.processors.snapshot();
        processors
            .get(Capability::TypePrediction)
            .iter()
            .find_map(|p| p.predict_bean_type(target, bean_name))
            .or(Some(target))
    }

    pub(crate) fn determine_target_type(
        &self,
        bean_name: &str,
        merged: &Arc<MergedBeanDefinition>,
    ) -> Option<TypeKey> {
        if let Some(cached) = merged.target_type() {
            return Some(cached);
        }

        let (bean_class, factory_bean, factory_method) = {
            let definition = merged.definition();
            (
                definition.bean_class.clone(),
                definition.factory_bean_name.clone(),
                definition.factory_method_name.clone(),
            )
        };

        let target = match factory_method {
            Some(method) => self.factory_method_return_type(bean_name, bean_class, factory_bean, &method),
            None => match bean_class {
                Some(BeanClass::Key(key)) => Some(key),
                Some(BeanClass::Name(name)) => self.catalog.resolve_name(&name),
                None => None,
            },
        }?;
        merged.set_target_type(target);
        Some(target)
    }

    /// 工厂方法的返回类型；重载方法返回类型不一致时无法确定
    fn factory_method_return_type(
        &self,
        bean_name: &str,
        bean_class: Option<BeanClass>,
        factory_bean: Option<String>,
        method: &str,
    ) -> Option<TypeKey> {
        let (factory_type, is_static) = match factory_bean {
            Some(factory_bean) => {
                let factory_bean = self.transformed_bean_name(&factory_bean);
                if factory_bean == bean_name {
                    return None;
                }
                let factory_type = match self.singletons.get_singleton(&factory_bean, false) {
                    Ok(Some(instance)) => instance.type_key(),
                    _ => {
                        let merged = self.definitions.merged(&factory_bean).ok()?;
                        self.determine_target_type(&factory_bean, &merged)?
                    }
                };
                (factory_type, false)
            }
            None => match bean_class {
                Some(BeanClass::Key(key)) => (key, true),
                Some(BeanClass::Name(name)) => (self.catalog.resolve_name(&name)?, true),
                None => return None,
            },
        };

        let meta = self.catalog.get(factory_type)?;
        let mut return_types = meta
            .factory_methods_named(method, is_static)
            .into_iter()
            .map(|m| m.return_type());
        let first = return_types.next()??;
        return_types.all(|t| t == Some(first)).then_some(first)
    }

    /// FactoryBean 的产品类型
    pub(crate) fn factory_bean_object_type(
        &self,
        bean_name: &str,
        merged: &Arc<MergedBeanDefinition>,
        allow_init: bool,
    ) -> ContainerResult<Option<TypeKey>> {
        if let Some(instance) = self.singletons.get_singleton(bean_name, false)? {
            return Ok(self
                .catalog
                .view::<dyn FactoryBean>(&instance)
                .and_then(|factory| factory.object_type()));
        }
        if !allow_init {
            return Ok(None);
        }

        let cached = self.factory_bean_instance_cache.lock().get(bean_name).cloned();
        let instance = match cached {
            Some(instance) => Some(instance),
            None => self.factory_bean_for_type_check(bean_name, merged)?,
        };
        Ok(instance
            .and_then(|instance| self.catalog.view::<dyn FactoryBean>(&instance))
            .and_then(|factory| factory.object_type()))
    }

    /// 为确定产品类型而做的快捷实例化
    ///
    /// 失败时记录并返回 None，只有依赖无法满足的错误会向上传播
    fn factory_bean_for_type_check(
        &self,
        bean_name: &str,
        merged: &Arc<MergedBeanDefinition>,
    ) -> ContainerResult<Option<BeanInstance>> {
        if self.singletons.is_currently_in_creation(bean_name) || !self.type_checks.start_creating(bean_name) {
            return Ok(None);
        }

        let created = self
            .resolve_bean_class(bean_name, merged)
            .and_then(|_| self.create_bean_instance(bean_name, merged, None));
        self.type_checks.finish_creating(bean_name);

        match created {
            Ok(instance) => {
                if merged.is_singleton() {
                    self.factory_bean_instance_cache
                        .lock()
                        .insert(bean_name.to_string(), instance.clone());
                }
                Ok(Some(instance))
            }
            Err(e) => {
                if e.find_cause(|c| matches!(c, ContainerError::UnsatisfiedDependency { .. }))
                    .is_some()
                {
                    return Err(e);
                }
                tracing::debug!(
                    "Bean creation exception on FactoryBean type check for '{}': {}",
                    bean_name,
                    e
                );
                self.on_suppressed(e.to_string());
                Ok(None)
            }
        }
    }
}
