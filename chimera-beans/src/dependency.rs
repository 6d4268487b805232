//! 按类型解析依赖
//!
//! 候选来源：可解析依赖（预先注册的对象）和类型匹配的 Bean 名称。
//! 多个候选时依次按 primary、依赖名称、可解析依赖区分，仍无法区分则报告歧义。

use std::cell::RefCell;

use crate::bean_factory::{BeanFactory, DefaultListableBeanFactory, ListableBeanFactory};
use crate::error::{ContainerError, ContainerResult};
use crate::metadata::Parameter;
use crate::utils::naming;
use crate::value::{BeanInstance, TypeKey, Value, ValueType};

/// 一次依赖查找的描述
#[derive(Debug, Clone)]
pub struct DependencyDescriptor {
    pub value_type: ValueType,
    pub required: bool,
    /// 注入点描述，用于错误信息
    pub injection_point: String,
    /// 参数名或属性名，多个候选时作为回退的匹配依据
    pub name: Option<String>,
    pub qualifier: Option<String>,
}

impl DependencyDescriptor {
    pub fn new(value_type: ValueType, injection_point: impl Into<String>) -> Self {
        Self {
            value_type,
            required: true,
            injection_point: injection_point.into(),
            name: None,
            qualifier: None,
        }
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_qualifier(mut self, qualifier: impl Into<String>) -> Self {
        self.qualifier = Some(qualifier.into());
        self
    }

    pub(crate) fn for_parameter(param: &Parameter, injection_point: String) -> Self {
        Self {
            value_type: param.value_type.clone(),
            required: param.required,
            injection_point,
            name: param.name.clone(),
            qualifier: None,
        }
    }
}

/// 当前正在被注入的位置
///
/// 构造参数或属性声明为 `Arc<InjectionPoint>` 时，容器注入触发本次创建的注入点
#[derive(Debug, Clone)]
pub struct InjectionPoint {
    pub requesting_bean: Option<String>,
    pub description: String,
    pub value_type: ValueType,
}

thread_local! {
    static INJECTION_POINTS: RefCell<Vec<InjectionPoint>> = const { RefCell::new(Vec::new()) };
}

impl InjectionPoint {
    /// 当前线程最内层的注入点
    pub fn current() -> Option<InjectionPoint> {
        INJECTION_POINTS.with(|points| points.borrow().last().cloned())
    }

    fn enter(point: InjectionPoint) -> InjectionPointGuard {
        INJECTION_POINTS.with(|points| points.borrow_mut().push(point));
        InjectionPointGuard
    }
}

struct InjectionPointGuard;

impl Drop for InjectionPointGuard {
    fn drop(&mut self) {
        INJECTION_POINTS.with(|points| {
            points.borrow_mut().pop();
        });
    }
}

struct Candidate {
    name: String,
    /// 可解析依赖直接携带实例
    instance: Option<BeanInstance>,
}

impl DefaultListableBeanFactory {
    /// 解析一个依赖；`autowired` 收集被注入的 Bean 名称以便记录依赖关系
    pub fn resolve_dependency(
        &self,
        descriptor: &DependencyDescriptor,
        requesting_bean: Option<&str>,
        autowired: &mut Vec<String>,
    ) -> ContainerResult<Value> {
        if descriptor.value_type == ValueType::object::<InjectionPoint>() {
            return match InjectionPoint::current() {
                Some(point) => Ok(Value::Object(BeanInstance::new(point))),
                None if descriptor.required => Err(ContainerError::NoSuchBeanOfType {
                    type_name: "InjectionPoint".to_string(),
                }),
                None => Ok(Value::Null),
            };
        }

        let _guard = InjectionPoint::enter(InjectionPoint {
            requesting_bean: requesting_bean.map(str::to_string),
            description: descriptor.injection_point.clone(),
            value_type: descriptor.value_type.clone(),
        });

        match &descriptor.value_type {
            ValueType::Object(key) => self.resolve_single(descriptor, *key, requesting_bean, autowired),
            ValueType::List(element) => match element.type_key() {
                Some(key) => self.resolve_multiple(descriptor, key, requesting_bean, autowired),
                None => self.unresolvable_simple(descriptor),
            },
            _ => self.unresolvable_simple(descriptor),
        }
    }

    fn unresolvable_simple(&self, descriptor: &DependencyDescriptor) -> ContainerResult<Value> {
        if descriptor.required {
            return Err(ContainerError::NoSuchBeanOfType {
                type_name: descriptor.value_type.to_string(),
            });
        }
        Ok(Value::Null)
    }

    fn resolve_multiple(
        &self,
        descriptor: &DependencyDescriptor,
        key: TypeKey,
        requesting_bean: Option<&str>,
        autowired: &mut Vec<String>,
    ) -> ContainerResult<Value> {
        let mut items = Vec::new();
        for name in self.get_bean_names_for_type(key, true, true)? {
            if self.is_self_reference(requesting_bean, &name)
                || !self.is_autowire_candidate(&name, descriptor.qualifier.as_deref())
            {
                continue;
            }
            let bean = self.get_bean_of_type_key(&name, key)?;
            autowired.push(naming::transformed_bean_name(&name).to_string());
            items.push(Value::Object(bean));
        }

        if items.is_empty() && descriptor.required {
            return Err(ContainerError::NoSuchBeanOfType {
                type_name: key.name().to_string(),
            });
        }
        Ok(Value::List(items))
    }

    fn resolve_single(
        &self,
        descriptor: &DependencyDescriptor,
        key: TypeKey,
        requesting_bean: Option<&str>,
        autowired: &mut Vec<String>,
    ) -> ContainerResult<Value> {
        let mut candidates = Vec::new();
        for (registered, instance) in self.resolvable_dependencies() {
            if registered == key || self.instance_matches(&instance, key) {
                candidates.push(Candidate {
                    name: registered.name().to_string(),
                    instance: Some(instance),
                });
            }
        }

        let mut self_references = Vec::new();
        for name in self.get_bean_names_for_type(key, true, true)? {
            if !self.is_autowire_candidate(&name, descriptor.qualifier.as_deref()) {
                continue;
            }
            let candidate = Candidate { name, instance: None };
            if self.is_self_reference(requesting_bean, &candidate.name) {
                self_references.push(candidate);
            } else {
                candidates.push(candidate);
            }
        }
        if candidates.is_empty() {
            candidates = self_references;
        }

        let chosen = match candidates.len() {
            0 => {
                if descriptor.required {
                    return Err(ContainerError::NoSuchBeanOfType {
                        type_name: key.name().to_string(),
                    });
                }
                return Ok(Value::Null);
            }
            1 => candidates.remove(0),
            _ => match self.determine_autowire_candidate(descriptor, key, &mut candidates)? {
                Some(chosen) => chosen,
                None if descriptor.required => {
                    return Err(ContainerError::AmbiguousDependency {
                        injection_point: descriptor.injection_point.clone(),
                        type_name: key.name().to_string(),
                        candidates: candidates.into_iter().map(|c| c.name).collect(),
                    })
                }
                None => return Ok(Value::Null),
            },
        };

        let bean = match chosen.instance {
            Some(instance) => self.catalog.cast(&instance, key).unwrap_or(instance),
            None => {
                let bean = self.get_bean_of_type_key(&chosen.name, key)?;
                autowired.push(naming::transformed_bean_name(&chosen.name).to_string());
                bean
            }
        };
        Ok(Value::Object(bean))
    }

    fn determine_autowire_candidate(
        &self,
        descriptor: &DependencyDescriptor,
        key: TypeKey,
        candidates: &mut Vec<Candidate>,
    ) -> ContainerResult<Option<Candidate>> {
        let primaries: Vec<usize> = candidates
            .iter()
            .enumerate()
            .filter(|(_, c)| c.instance.is_none() && self.is_primary(&c.name))
            .map(|(index, _)| index)
            .collect();
        match primaries.as_slice() {
            [index] => return Ok(Some(candidates.remove(*index))),
            [] => {}
            _ => {
                return Err(ContainerError::AmbiguousDependency {
                    injection_point: descriptor.injection_point.clone(),
                    type_name: key.name().to_string(),
                    candidates: primaries.iter().map(|i| candidates[*i].name.clone()).collect(),
                })
            }
        }

        if let Some(wanted) = &descriptor.name {
            let by_name = candidates.iter().position(|c| {
                let plain = naming::transformed_bean_name(&c.name);
                plain == wanted || self.get_aliases(plain).iter().any(|alias| alias == wanted)
            });
            if let Some(index) = by_name {
                return Ok(Some(candidates.remove(index)));
            }
        }

        Ok(candidates
            .iter()
            .position(|c| c.instance.is_some())
            .map(|index| candidates.remove(index)))
    }

    fn is_self_reference(&self, requesting_bean: Option<&str>, candidate: &str) -> bool {
        let Some(requesting) = requesting_bean else {
            return false;
        };
        let candidate = self.transformed_bean_name(candidate);
        if candidate == requesting {
            return true;
        }
        self.definitions
            .merged(&candidate)
            .map(|merged| merged.definition().factory_bean_name.as_deref() == Some(requesting))
            .unwrap_or(false)
    }

    fn is_autowire_candidate(&self, name: &str, qualifier: Option<&str>) -> bool {
        let plain = naming::transformed_bean_name(name);
        if !self.definitions.contains(plain) {
            return qualifier.is_none_or(|q| q == plain);
        }
        match self.definitions.merged(plain) {
            Ok(merged) => {
                let definition = merged.definition();
                definition.autowire_candidate
                    && qualifier.is_none_or(|q| q == plain || definition.qualifies_as(q))
            }
            Err(e) => {
                tracing::debug!("Skipping autowire candidate '{}': {}", name, e);
                false
            }
        }
    }

    fn is_primary(&self, name: &str) -> bool {
        let plain = naming::transformed_bean_name(name);
        self.definitions.contains(plain)
            && self
                .definitions
                .merged(plain)
                .map(|merged| merged.definition().primary)
                .unwrap_or(false)
    }

    /// 按类型获取唯一的 Bean，多个候选时使用 primary 区分
    pub fn get_bean_by_type_key(&self, required: TypeKey) -> ContainerResult<BeanInstance> {
        let mut names = self.get_bean_names_for_type(required, true, true)?;
        if names.len() > 1 {
            names.retain(|name| self.is_autowire_candidate(name, None));
        }

        match names.len() {
            0 => Err(ContainerError::NoSuchBeanOfType {
                type_name: required.name().to_string(),
            }),
            1 => self.get_bean_of_type_key(&names[0], required),
            _ => {
                let primaries: Vec<&String> = names.iter().filter(|name| self.is_primary(name)).collect();
                match primaries.as_slice() {
                    [primary] => self.get_bean_of_type_key(primary, required),
                    _ => Err(ContainerError::AmbiguousDependency {
                        injection_point: "bean lookup by type".to_string(),
                        type_name: required.name().to_string(),
                        candidates: names,
                    }),
                }
            }
        }
    }
}
