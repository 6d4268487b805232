//! 构造函数与工厂方法解析
//!
//! 按"公开优先、参数多者优先"的顺序遍历候选，为每个参数依次匹配索引参数、
//! 通用参数、自动装配依赖，再用类型差异权重挑选最佳候选。
//! 结果缓存在合并定义上；含自动装配或待解析值的参数只缓存标记，每次重新解析。

use std::collections::BTreeMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use crate::bean::{AutowireMode, BeanDefinition, BeanValue, ValueHolder};
use crate::bean_factory::{BeanFactory, DefaultListableBeanFactory};
use crate::definition_registry::{MergedBeanDefinition, PreparedArgument};
use crate::dependency::DependencyDescriptor;
use crate::error::{ContainerError, ContainerResult, LifecyclePhase};
use crate::metadata::{Executable, Parameter, TypeMetadata};
use crate::value::{BeanInstance, Value, ValueType};

const MAX_WEIGHT: i64 = i32::MAX as i64;

/// 为某个候选准备好的参数
struct ArgumentsHolder {
    /// 转换前的值
    raw: Vec<Value>,
    /// 转换后的值
    arguments: Vec<Value>,
    prepared: Vec<PreparedArgument>,
    /// 是否有参数需要在每次实例化时重新解析
    resolve_necessary: bool,
}

impl ArgumentsHolder {
    fn explicit(args: Vec<Value>) -> Self {
        Self {
            raw: args.clone(),
            prepared: args.iter().cloned().map(PreparedArgument::Resolved).collect(),
            arguments: args,
            resolve_necessary: false,
        }
    }

    /// 宽松模式：转换后权重与原始值权重取较优者，原始值匹配额外奖励 1024
    fn type_difference_weight(&self, factory: &DefaultListableBeanFactory, params: &[Parameter]) -> i64 {
        let converted = argument_weight(factory, params, &self.arguments);
        let raw = argument_weight(factory, params, &self.raw).saturating_sub(1024);
        converted.min(raw)
    }

    /// 严格模式：只区分可赋值与不可赋值
    fn assignability_weight(&self, factory: &DefaultListableBeanFactory, params: &[Parameter]) -> i64 {
        let converter = factory.converter();
        let all_assignable = |args: &[Value]| {
            params
                .iter()
                .zip(args)
                .all(|(param, arg)| converter.is_assignable_value(arg, &param.value_type))
        };
        if !all_assignable(&self.arguments) {
            MAX_WEIGHT
        } else if !all_assignable(&self.raw) {
            MAX_WEIGHT - 512
        } else {
            MAX_WEIGHT - 1024
        }
    }
}

fn argument_weight(factory: &DefaultListableBeanFactory, params: &[Parameter], args: &[Value]) -> i64 {
    let mut weight = 0i64;
    for (param, arg) in params.iter().zip(args) {
        match factory.converter().assignable_distance(arg, &param.value_type) {
            Some(distance) => weight += i64::from(distance),
            None => return MAX_WEIGHT,
        }
    }
    weight
}

/// 已解析的声明参数值
struct ResolvedValue {
    value: Value,
    source: BeanValue,
    type_hint: Option<ValueType>,
    name: Option<String>,
}

struct ResolvedArguments {
    indexed: BTreeMap<usize, ResolvedValue>,
    generic: Vec<ResolvedValue>,
    min_args: usize,
}

struct ResolutionContext<'a> {
    bean_name: &'a str,
    merged: &'a Arc<MergedBeanDefinition>,
    definition: &'a BeanDefinition,
    /// "constructor" 或 "factory method"
    kind: &'static str,
    autowiring: bool,
    declaring: String,
}

impl ResolutionContext<'_> {
    fn resource(&self) -> Option<String> {
        self.definition.resource_description.clone()
    }
}

impl DefaultListableBeanFactory {
    /// 通过构造函数自动装配创建实例
    ///
    /// `chosen` 为钩子确定的候选构造函数；`explicit_args` 为调用方显式传入的参数
    pub(crate) fn autowire_constructor(
        &self,
        bean_name: &str,
        merged: &Arc<MergedBeanDefinition>,
        definition: &BeanDefinition,
        meta: &Arc<TypeMetadata>,
        chosen: Option<Vec<Arc<Executable>>>,
        explicit_args: Option<Vec<Value>>,
    ) -> ContainerResult<BeanInstance> {
        let autowiring = chosen.is_some() || definition.autowire_mode == AutowireMode::Constructor;
        let candidates = match chosen {
            Some(chosen) => chosen,
            None => meta
                .constructors()
                .iter()
                .filter(|c| c.is_public() || definition.non_public_access_allowed)
                .cloned()
                .collect(),
        };

        let ctx = ResolutionContext {
            bean_name,
            merged,
            definition,
            kind: "constructor",
            autowiring,
            declaring: meta.name().to_string(),
        };
        let (constructor, args) = self.select_executable(&ctx, candidates, explicit_args)?;
        self.instantiation_strategy()
            .instantiate(definition, bean_name, &constructor, None, args, self)
    }

    /// 通过静态工厂方法或工厂 Bean 上的实例工厂方法创建实例
    pub(crate) fn instantiate_using_factory_method(
        &self,
        bean_name: &str,
        merged: &Arc<MergedBeanDefinition>,
        definition: &BeanDefinition,
        explicit_args: Option<Vec<Value>>,
    ) -> ContainerResult<BeanInstance> {
        let method_name = definition.factory_method_name.clone().unwrap_or_default();

        let (factory_target, declaring, is_static) = match &definition.factory_bean_name {
            Some(factory_bean_name) => {
                if self.transformed_bean_name(factory_bean_name) == bean_name {
                    return Err(ContainerError::BeanDefinitionStore {
                        name: bean_name.to_string(),
                        reason: "factory-bean reference points back to the same bean definition".to_string(),
                    });
                }
                let target = self.get_bean(factory_bean_name)?;
                self.singletons.register_dependent(factory_bean_name, bean_name);
                let declaring = target.type_key();
                (Some(target), declaring, false)
            }
            None => {
                let declaring = definition
                    .bean_type_key()
                    .ok_or_else(|| ContainerError::BeanDefinitionStore {
                        name: bean_name.to_string(),
                        reason: "bean definition declares neither a bean class nor a factory-bean reference"
                            .to_string(),
                    })?;
                (None, declaring, true)
            }
        };

        let meta = self
            .catalog
            .get(declaring)
            .ok_or_else(|| ContainerError::Instantiation {
                bean: bean_name.to_string(),
                type_name: declaring.name().to_string(),
                message: "factory type is not registered in the type catalog".to_string(),
                source: None,
            })?;

        let candidates: Vec<Arc<Executable>> = meta
            .factory_methods_named(&method_name, is_static)
            .into_iter()
            .filter(|m| m.is_public() || definition.non_public_access_allowed)
            .collect();
        if candidates.is_empty() {
            return Err(ContainerError::NoMatchingExecutable {
                bean: bean_name.to_string(),
                resource: definition.resource_description.clone(),
                detail: format!(
                    "no {} factory method '{}' found on type [{}]",
                    if is_static { "static" } else { "instance" },
                    method_name,
                    meta.name()
                ),
                cause: None,
            });
        }

        let ctx = ResolutionContext {
            bean_name,
            merged,
            definition,
            kind: "factory method",
            autowiring: definition.autowire_mode == AutowireMode::Constructor,
            declaring: meta.name().to_string(),
        };
        let (method, args) = self.select_executable(&ctx, candidates, explicit_args)?;
        self.instantiation_strategy().instantiate(
            definition,
            bean_name,
            &method,
            factory_target.as_ref(),
            args,
            self,
        )
    }

    fn select_executable(
        &self,
        ctx: &ResolutionContext<'_>,
        mut candidates: Vec<Arc<Executable>>,
        explicit_args: Option<Vec<Value>>,
    ) -> ContainerResult<(Arc<Executable>, Vec<Value>)> {
        if explicit_args.is_none() {
            if let Some(cached) = self.cached_resolution(ctx)? {
                tracing::trace!("Using cached {} resolution for bean '{}'", ctx.kind, ctx.bean_name);
                return Ok(cached);
            }
        }

        if candidates.len() == 1
            && candidates[0].parameter_count() == 0
            && !ctx.definition.has_constructor_args()
            && explicit_args.as_ref().is_none_or(|args| args.is_empty())
        {
            let only = candidates.remove(0);
            self.ensure_non_void(ctx, &only)?;
            if explicit_args.is_none() {
                let mut cache = ctx.merged.resolution.lock();
                cache.resolved_executable = Some(only.clone());
                cache.arguments_resolved = true;
                cache.resolved_arguments = Some(Vec::new());
                cache.prepared_arguments = None;
            }
            return Ok((only, Vec::new()));
        }

        let resolved = match &explicit_args {
            Some(_) => None,
            None => Some(self.resolve_constructor_arguments(ctx)?),
        };
        let min_args = match (&explicit_args, &resolved) {
            (Some(args), _) => args.len(),
            (None, Some(resolved)) => resolved.min_args,
            (None, None) => 0,
        };

        candidates.sort_by(|a, b| {
            b.is_public()
                .cmp(&a.is_public())
                .then_with(|| b.parameter_count().cmp(&a.parameter_count()))
        });
        self.resolution_count.fetch_add(1, Ordering::Relaxed);

        let lenient = ctx.definition.lenient_constructor_resolution
            && self.config.read().lenient_constructor_resolution;

        let mut chosen: Option<(Arc<Executable>, ArgumentsHolder)> = None;
        let mut min_weight = MAX_WEIGHT;
        let mut ambiguous: Vec<Arc<Executable>> = Vec::new();
        let mut causes: Vec<ContainerError> = Vec::new();

        for candidate in &candidates {
            let param_count = candidate.parameter_count();
            if let Some((_, holder)) = &chosen {
                if holder.arguments.len() > param_count {
                    break;
                }
            }
            if param_count < min_args {
                continue;
            }

            let holder = match (&explicit_args, &resolved) {
                (Some(args), _) => {
                    if param_count != args.len() {
                        continue;
                    }
                    ArgumentsHolder::explicit(args.clone())
                }
                (None, Some(resolved)) => match self.create_argument_array(ctx, candidate, resolved) {
                    Ok(holder) => holder,
                    Err(e) => {
                        tracing::trace!(
                            "Ignoring {} [{}] of bean '{}': {}",
                            ctx.kind,
                            candidate.signature(),
                            ctx.bean_name,
                            e
                        );
                        causes.push(e);
                        continue;
                    }
                },
                (None, None) => continue,
            };

            let weight = if lenient {
                holder.type_difference_weight(self, candidate.parameters())
            } else {
                holder.assignability_weight(self, candidate.parameters())
            };

            if weight < min_weight {
                min_weight = weight;
                chosen = Some((candidate.clone(), holder));
                ambiguous.clear();
            } else if let Some((current, _)) = &chosen {
                if weight == min_weight && current.parameter_count() == param_count {
                    if ambiguous.is_empty() {
                        ambiguous.push(current.clone());
                    }
                    ambiguous.push(candidate.clone());
                }
            }
        }

        let Some((executable, holder)) = chosen else {
            let cause = causes.pop();
            for suppressed in &causes {
                self.on_suppressed(suppressed.to_string());
            }
            let hint = if ctx.definition.has_constructor_args() || explicit_args.is_some() {
                "specify index/type/name arguments for simple parameters to avoid type ambiguities"
            } else {
                "declare constructor arguments or enable constructor autowiring"
            };
            return Err(ContainerError::NoMatchingExecutable {
                bean: ctx.bean_name.to_string(),
                resource: ctx.resource(),
                detail: format!(
                    "could not resolve matching {} on type [{}] (hint: {})",
                    ctx.kind, ctx.declaring, hint
                ),
                cause: cause.map(Box::new),
            });
        };

        if !lenient && !ambiguous.is_empty() {
            return Err(ContainerError::AmbiguousExecutable {
                bean: ctx.bean_name.to_string(),
                resource: ctx.resource(),
                kind: ctx.kind,
                candidates: ambiguous.iter().map(|e| e.signature()).collect(),
            });
        }
        if !ambiguous.is_empty() {
            tracing::debug!(
                "Ambiguous {} matches for bean '{}', using {}",
                ctx.kind,
                ctx.bean_name,
                executable.signature()
            );
        }
        self.ensure_non_void(ctx, &executable)?;

        if explicit_args.is_none() {
            let mut cache = ctx.merged.resolution.lock();
            cache.resolved_executable = Some(executable.clone());
            cache.arguments_resolved = true;
            if holder.resolve_necessary {
                cache.prepared_arguments = Some(holder.prepared);
                cache.resolved_arguments = None;
            } else {
                cache.resolved_arguments = Some(holder.arguments.clone());
                cache.prepared_arguments = None;
            }
        }
        Ok((executable, holder.arguments))
    }

    fn ensure_non_void(&self, ctx: &ResolutionContext<'_>, executable: &Executable) -> ContainerResult<()> {
        if ctx.kind == "factory method" && executable.return_type().is_none() {
            return Err(ContainerError::InvalidFactoryMethod {
                bean: ctx.bean_name.to_string(),
                resource: ctx.resource(),
                method: executable.signature(),
                reason: "needs to have a non-void return type".to_string(),
            });
        }
        Ok(())
    }

    fn cached_resolution(
        &self,
        ctx: &ResolutionContext<'_>,
    ) -> ContainerResult<Option<(Arc<Executable>, Vec<Value>)>> {
        let (executable, resolved, prepared) = {
            let cache = ctx.merged.resolution.lock();
            match &cache.resolved_executable {
                Some(executable) if cache.arguments_resolved => (
                    executable.clone(),
                    cache.resolved_arguments.clone(),
                    cache.prepared_arguments.clone(),
                ),
                _ => return Ok(None),
            }
        };

        if let Some(args) = resolved {
            return Ok(Some((executable, args)));
        }
        match prepared {
            Some(prepared) => {
                let args = self.resolve_prepared_arguments(ctx, &executable, prepared)?;
                Ok(Some((executable, args)))
            }
            None => Ok(None),
        }
    }

    fn resolve_prepared_arguments(
        &self,
        ctx: &ResolutionContext<'_>,
        executable: &Executable,
        prepared: Vec<PreparedArgument>,
    ) -> ContainerResult<Vec<Value>> {
        let mut args = Vec::with_capacity(prepared.len());
        for (index, (param, argument)) in executable.parameters().iter().zip(prepared).enumerate() {
            let value = match argument {
                PreparedArgument::Resolved(value) => value,
                PreparedArgument::Source(source) => {
                    let context = format!("{} argument with index {}", ctx.kind, index);
                    let value = self.resolve_value_if_necessary(
                        ctx.bean_name,
                        ctx.merged,
                        &context,
                        &source,
                        LifecyclePhase::Instantiated,
                    )?;
                    self.converter
                        .convert(value, &param.value_type, None)
                        .map_err(|e| self.conversion_failure(ctx, executable, index, param, e))?
                }
                PreparedArgument::Autowired => self.autowire_argument(ctx, executable, index, param)?,
            };
            args.push(value);
        }
        Ok(args)
    }

    /// 解析定义中声明的构造参数（引用、内部 Bean、占位符）
    fn resolve_constructor_arguments(&self, ctx: &ResolutionContext<'_>) -> ContainerResult<ResolvedArguments> {
        let declared = &ctx.definition.constructor_args;
        let mut min_args = declared.len();

        let mut indexed = BTreeMap::new();
        for (index, holder) in declared.indexed() {
            min_args = min_args.max(index + 1);
            let context = format!("{} argument with index {}", ctx.kind, index);
            indexed.insert(*index, self.resolve_declared(ctx, &context, holder)?);
        }

        let mut generic = Vec::with_capacity(declared.generic().len());
        for holder in declared.generic() {
            let context = format!("{} argument", ctx.kind);
            generic.push(self.resolve_declared(ctx, &context, holder)?);
        }

        Ok(ResolvedArguments { indexed, generic, min_args })
    }

    fn resolve_declared(
        &self,
        ctx: &ResolutionContext<'_>,
        context: &str,
        holder: &ValueHolder,
    ) -> ContainerResult<ResolvedValue> {
        let value = self.resolve_value_if_necessary(
            ctx.bean_name,
            ctx.merged,
            context,
            &holder.value,
            LifecyclePhase::Instantiated,
        )?;
        Ok(ResolvedValue {
            value,
            source: holder.value.clone(),
            type_hint: holder.type_hint.clone(),
            name: holder.name.clone(),
        })
    }

    /// 为一个候选的每个参数找到取值
    fn create_argument_array(
        &self,
        ctx: &ResolutionContext<'_>,
        executable: &Executable,
        resolved: &ResolvedArguments,
    ) -> ContainerResult<ArgumentsHolder> {
        let params = executable.parameters();
        let total_declared = resolved.indexed.len() + resolved.generic.len();
        let mut used = vec![false; resolved.generic.len()];

        let mut holder = ArgumentsHolder {
            raw: Vec::with_capacity(params.len()),
            arguments: Vec::with_capacity(params.len()),
            prepared: Vec::with_capacity(params.len()),
            resolve_necessary: false,
        };

        for (index, param) in params.iter().enumerate() {
            let mut declared = resolved.indexed.get(&index).filter(|value| {
                value.type_hint.as_ref().is_none_or(|hint| *hint == param.value_type)
                    && value
                        .name
                        .as_ref()
                        .is_none_or(|name| param.name.as_ref() == Some(name))
            });
            if declared.is_none() {
                declared = take_generic(self, resolved, &mut used, Some(param));
            }
            if declared.is_none() && (!ctx.autowiring || params.len() == total_declared) {
                declared = take_generic(self, resolved, &mut used, None);
            }

            if let Some(declared) = declared {
                let converted = self
                    .converter
                    .convert(declared.value.clone(), &param.value_type, None)
                    .map_err(|e| self.conversion_failure(ctx, executable, index, param, e))?;
                holder.raw.push(declared.value.clone());
                holder.arguments.push(converted.clone());
                if declared.source.needs_resolution() {
                    holder.prepared.push(PreparedArgument::Source(declared.source.clone()));
                    holder.resolve_necessary = true;
                } else {
                    holder.prepared.push(PreparedArgument::Resolved(converted));
                }
                continue;
            }

            if !ctx.autowiring {
                return Err(ContainerError::UnsatisfiedDependency {
                    bean: ctx.bean_name.to_string(),
                    resource: ctx.resource(),
                    injection_point: parameter_description(ctx, executable, index),
                    reason: format!(
                        "ambiguous argument values for parameter of type [{}] - did you specify the correct bean references as arguments?",
                        param.value_type
                    ),
                    cause: None,
                });
            }

            let value = self.autowire_argument(ctx, executable, index, param)?;
            holder.raw.push(value.clone());
            holder.arguments.push(value);
            holder.prepared.push(PreparedArgument::Autowired);
            holder.resolve_necessary = true;
        }

        Ok(holder)
    }

    fn autowire_argument(
        &self,
        ctx: &ResolutionContext<'_>,
        executable: &Executable,
        index: usize,
        param: &Parameter,
    ) -> ContainerResult<Value> {
        let injection_point = parameter_description(ctx, executable, index);
        let descriptor = DependencyDescriptor::for_parameter(param, injection_point.clone());
        let mut autowired = Vec::new();
        let value = self
            .resolve_dependency(&descriptor, Some(ctx.bean_name), &mut autowired)
            .map_err(|e| ContainerError::UnsatisfiedDependency {
                bean: ctx.bean_name.to_string(),
                resource: ctx.resource(),
                injection_point,
                reason: e.to_string(),
                cause: Some(Box::new(e)),
            })?;
        for name in &autowired {
            self.singletons.register_dependent(name, ctx.bean_name);
            tracing::debug!(
                "Autowiring by type from bean name '{}' via {} to bean named '{}'",
                ctx.bean_name,
                ctx.kind,
                name
            );
        }
        Ok(value)
    }

    fn conversion_failure(
        &self,
        ctx: &ResolutionContext<'_>,
        executable: &Executable,
        index: usize,
        param: &Parameter,
        error: ContainerError,
    ) -> ContainerError {
        let value_type = match &error {
            ContainerError::TypeConversion { value_type, .. } => value_type.clone(),
            _ => "unknown".to_string(),
        };
        ContainerError::UnsatisfiedDependency {
            bean: ctx.bean_name.to_string(),
            resource: ctx.resource(),
            injection_point: parameter_description(ctx, executable, index),
            reason: format!(
                "could not convert argument value of type [{}] to required type [{}]: {}",
                value_type, param.value_type, error
            ),
            cause: Some(Box::new(error)),
        }
    }
}

/// 找一个未使用的通用参数；`param` 为 None 时只接受无类型、无名称的值
fn take_generic<'a>(
    factory: &DefaultListableBeanFactory,
    resolved: &'a ResolvedArguments,
    used: &mut [bool],
    param: Option<&Parameter>,
) -> Option<&'a ResolvedValue> {
    for (position, value) in resolved.generic.iter().enumerate() {
        if used[position] {
            continue;
        }
        let matches = match param {
            Some(param) => {
                if let Some(name) = &value.name {
                    param.name.as_ref() == Some(name)
                        && value.type_hint.as_ref().is_none_or(|hint| *hint == param.value_type)
                } else if let Some(hint) = &value.type_hint {
                    *hint == param.value_type
                } else {
                    factory
                        .converter()
                        .is_assignable_value(&value.value, &param.value_type)
                }
            }
            None => value.name.is_none() && value.type_hint.is_none(),
        };
        if matches {
            used[position] = true;
            return Some(value);
        }
    }
    None
}

fn parameter_description(ctx: &ResolutionContext<'_>, executable: &Executable, index: usize) -> String {
    format!("{} parameter {} of {}", ctx.kind, index, executable.signature())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bean::{BeanValue, ValueHolder};
    use crate::bean_factory::{BeanFactoryExt, ConfigurableBeanFactory};
    use crate::metadata::BeanType;

    struct Widget {
        name: String,
        size: i64,
    }

    fn widget_factory() -> Arc<DefaultListableBeanFactory> {
        let factory = DefaultListableBeanFactory::new();
        factory.register_type(
            BeanType::<Widget>::new()
                .constructor(|name: String| Widget { name, size: 0 })
                .constructor(|name: String, size: i64| Widget { name, size })
                .param_names(&["name", "size"])
                .build(),
        );
        factory
    }

    #[test]
    fn test_only_viable_arity_is_chosen() {
        let factory = widget_factory();
        factory
            .register_bean_definition("x", BeanDefinition::of::<Widget>().with_arg("hello"))
            .unwrap();

        let widget = factory.get_bean_typed::<Widget>("x").unwrap();
        assert_eq!(widget.name, "hello");
        assert_eq!(widget.size, 0);
    }

    #[test]
    fn test_greedy_constructor_wins() {
        let factory = widget_factory();
        factory
            .register_bean_definition("x", BeanDefinition::of::<Widget>().with_arg("x").with_arg(1))
            .unwrap();

        let widget = factory.get_bean_typed::<Widget>("x").unwrap();
        assert_eq!(widget.name, "x");
        assert_eq!(widget.size, 1);
    }

    #[test]
    fn test_string_values_are_converted() {
        let factory = widget_factory();
        factory
            .register_bean_definition(
                "x",
                BeanDefinition::of::<Widget>()
                    .with_indexed_arg(0, "gear")
                    .with_indexed_arg(1, "42"),
            )
            .unwrap();

        let widget = factory.get_bean_typed::<Widget>("x").unwrap();
        assert_eq!(widget.size, 42);
    }

    #[test]
    fn test_named_argument_matches_parameter_name() {
        let factory = widget_factory();
        factory
            .register_bean_definition(
                "x",
                BeanDefinition::of::<Widget>()
                    .with_arg_holder(ValueHolder::new(7).named("size"))
                    .with_arg_holder(ValueHolder::new("bolt").named("name")),
            )
            .unwrap();

        let widget = factory.get_bean_typed::<Widget>("x").unwrap();
        assert_eq!(widget.name, "bolt");
        assert_eq!(widget.size, 7);
    }

    #[test]
    fn test_unconvertible_argument_reports_cause() {
        let factory = widget_factory();
        factory
            .register_bean_definition(
                "x",
                BeanDefinition::of::<Widget>()
                    .with_indexed_arg(0, "gear")
                    .with_indexed_arg(1, "large"),
            )
            .unwrap();

        match factory.get_bean("x") {
            Err(ContainerError::NoMatchingExecutable { cause: Some(cause), .. }) => {
                assert!(matches!(*cause, ContainerError::UnsatisfiedDependency { .. }));
            }
            other => panic!("expected NoMatchingExecutable, got {:?}", other),
        }
    }

    struct Registry;

    struct Gauge {
        registry: Arc<Registry>,
    }

    #[test]
    fn test_void_factory_method_is_rejected() {
        let factory = DefaultListableBeanFactory::new();
        factory.register_type(
            BeanType::<Registry>::new()
                .void_factory_method("reset", || ())
                .build(),
        );
        factory
            .register_bean_definition("reset", BeanDefinition::of::<Registry>().with_factory_method("reset"))
            .unwrap();

        assert!(matches!(
            factory.get_bean("reset"),
            Err(ContainerError::InvalidFactoryMethod { .. })
        ));
    }

    #[test]
    fn test_instance_factory_method_with_reference_argument() {
        let factory = DefaultListableBeanFactory::new();
        factory.register_type(BeanType::<Registry>::new().constructor(|| Registry).build());
        factory.register_type(
            BeanType::<GaugeSource>::new()
                .constructor(|| GaugeSource)
                .instance_factory_method("gauge", |_: &GaugeSource, registry: Arc<Registry>| Gauge {
                    registry,
                })
                .build(),
        );
        factory
            .register_bean_definition("registry", BeanDefinition::of::<Registry>())
            .unwrap();
        factory
            .register_bean_definition("source", BeanDefinition::of::<GaugeSource>())
            .unwrap();
        factory
            .register_bean_definition(
                "gauge",
                BeanDefinition::default()
                    .with_factory_bean("source", "gauge")
                    .with_arg(BeanValue::reference("registry")),
            )
            .unwrap();

        let gauge = factory.get_bean_typed::<Gauge>("gauge").unwrap();
        let registry = factory.get_bean_typed::<Registry>("registry").unwrap();
        assert!(Arc::ptr_eq(&gauge.registry, &registry));
        assert!(factory.dependents_of("source").contains(&"gauge".to_string()));
    }

    struct GaugeSource;

    #[test]
    fn test_explicit_args_bypass_cache() {
        let factory = widget_factory();
        factory
            .register_bean_definition(
                "proto",
                BeanDefinition::of::<Widget>()
                    .with_scope(crate::scope::Scope::Prototype)
                    .with_arg("a"),
            )
            .unwrap();

        let first = factory.get_bean_typed::<Widget>("proto").unwrap();
        let explicit = factory
            .get_bean_with_args("proto", vec![Value::from("b"), Value::from(3)])
            .unwrap()
            .downcast::<Widget>()
            .unwrap();
        let again = factory.get_bean_typed::<Widget>("proto").unwrap();

        assert_eq!(first.name, "a");
        assert_eq!((explicit.name.as_str(), explicit.size), ("b", 3));
        assert_eq!(again.name, "a");
    }
}
