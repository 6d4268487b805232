//! Bean 定义 - 描述如何创建和管理 Bean
//!
//! [`BeanDefinition`] 是可变的模板：目标类型或工厂引用、作用域、构造参数、属性值、
//! 初始化/销毁方法、自动装配模式等。使用前会与父定义合并为
//! [`MergedBeanDefinition`](crate::definition_registry::MergedBeanDefinition)。

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::scope::Scope;
use crate::value::{BeanInstance, TypeKey, Value, ValueType};

/// Bean 的目标类型
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BeanClass {
    /// 已知的类型
    Key(TypeKey),
    /// 按名称在类型目录中动态解析
    Name(String),
}

/// 自动装配模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AutowireMode {
    #[default]
    No,
    ByName,
    ByType,
    Constructor,
}

/// 依赖检查模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DependencyCheck {
    #[default]
    None,
    /// 只检查对象引用
    Objects,
    /// 只检查基本类型和字符串
    Simple,
    All,
}

/// 定义中声明的值，使用前由容器解析
#[derive(Debug, Clone)]
pub enum BeanValue {
    /// 字面量
    Literal(Value),
    /// 对另一个 Bean 的引用
    Ref(String),
    /// 内部 Bean（不注册到容器）
    Inner(Box<BeanDefinition>),
    /// `${key:default}` 占位符，从 Environment 解析
    Placeholder(String),
    List(Vec<BeanValue>),
}

impl BeanValue {
    pub fn literal(value: impl Into<Value>) -> Self {
        BeanValue::Literal(value.into())
    }

    pub fn reference(name: impl Into<String>) -> Self {
        BeanValue::Ref(name.into())
    }

    pub fn inner(definition: BeanDefinition) -> Self {
        BeanValue::Inner(Box::new(definition))
    }

    pub fn placeholder(expression: impl Into<String>) -> Self {
        BeanValue::Placeholder(expression.into())
    }

    /// 是否需要容器解析（字面量除外）
    pub fn needs_resolution(&self) -> bool {
        match self {
            BeanValue::Literal(_) => false,
            BeanValue::List(items) => items.iter().any(BeanValue::needs_resolution),
            _ => true,
        }
    }
}

macro_rules! impl_from_literal {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for BeanValue {
                fn from(value: $ty) -> Self {
                    BeanValue::Literal(value.into())
                }
            }
        )*
    };
}

impl_from_literal!(Value, &str, String, i64, i32, f64, bool, BeanInstance);

/// 构造参数值
#[derive(Debug, Clone)]
pub struct ValueHolder {
    pub value: BeanValue,
    /// 显式声明的参数类型
    pub type_hint: Option<ValueType>,
    /// 显式声明的参数名称
    pub name: Option<String>,
}

impl ValueHolder {
    pub fn new(value: impl Into<BeanValue>) -> Self {
        Self {
            value: value.into(),
            type_hint: None,
            name: None,
        }
    }

    pub fn typed(mut self, value_type: ValueType) -> Self {
        self.type_hint = Some(value_type);
        self
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// 构造参数集合：按索引的参数和通用参数
#[derive(Debug, Clone, Default)]
pub struct ConstructorArgumentValues {
    indexed: BTreeMap<usize, ValueHolder>,
    generic: Vec<ValueHolder>,
}

impl ConstructorArgumentValues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_indexed(&mut self, index: usize, holder: ValueHolder) {
        self.indexed.insert(index, holder);
    }

    pub fn add_generic(&mut self, holder: ValueHolder) {
        self.generic.push(holder);
    }

    pub fn indexed(&self) -> &BTreeMap<usize, ValueHolder> {
        &self.indexed
    }

    pub fn generic(&self) -> &[ValueHolder] {
        &self.generic
    }

    pub fn len(&self) -> usize {
        self.indexed.len() + self.generic.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indexed.is_empty() && self.generic.is_empty()
    }

    /// 合并另一组参数（子定义覆盖父定义的同索引参数）
    pub fn merge(&mut self, other: &ConstructorArgumentValues) {
        for (index, holder) in &other.indexed {
            self.indexed.insert(*index, holder.clone());
        }
        self.generic.extend(other.generic.iter().cloned());
    }
}

/// 属性值集合，保持声明顺序
#[derive(Debug, Clone, Default)]
pub struct PropertyValues {
    values: Vec<(String, BeanValue)>,
}

impl PropertyValues {
    pub fn new() -> Self {
        Self::default()
    }

    /// 添加或替换属性值
    pub fn add(&mut self, name: impl Into<String>, value: impl Into<BeanValue>) {
        let name = name.into();
        let value = value.into();
        match self.values.iter_mut().find(|(n, _)| *n == name) {
            Some(existing) => existing.1 = value,
            None => self.values.push((name, value)),
        }
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<BeanValue>) -> Self {
        self.add(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&BeanValue> {
        self.values.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn remove(&mut self, name: &str) -> Option<BeanValue> {
        let index = self.values.iter().position(|(n, _)| n == name)?;
        Some(self.values.remove(index).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &BeanValue)> {
        self.values.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn merge(&mut self, other: &PropertyValues) {
        for (name, value) in &other.values {
            self.add(name.clone(), value.clone());
        }
    }
}

/// 方法注入覆盖
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MethodOverride {
    /// 查找方法：每次调用返回容器中的 Bean（未指定名称时按返回类型查找）
    Lookup { method: String, bean_name: Option<String> },
    /// 替换方法：调用被转发给 MethodReplacer Bean
    Replace { method: String, replacer_bean: String },
}

impl MethodOverride {
    pub fn method_name(&self) -> &str {
        match self {
            MethodOverride::Lookup { method, .. } | MethodOverride::Replace { method, .. } => method,
        }
    }
}

/// 实例提供者 - 替代构造函数解析
pub type InstanceSupplier = Arc<dyn Fn() -> anyhow::Result<BeanInstance> + Send + Sync>;

/// Bean 定义
#[derive(Clone, Default)]
pub struct BeanDefinition {
    pub bean_class: Option<BeanClass>,
    pub parent_name: Option<String>,
    /// None 表示未设置（合并后默认为单例）
    pub scope: Option<Scope>,
    pub is_abstract: bool,
    pub lazy_init: Option<bool>,
    pub primary: bool,
    pub autowire_candidate: bool,
    pub qualifiers: Vec<String>,
    pub depends_on: Vec<String>,
    pub autowire_mode: AutowireMode,
    pub dependency_check: DependencyCheck,
    pub constructor_args: ConstructorArgumentValues,
    pub property_values: PropertyValues,
    pub factory_bean_name: Option<String>,
    pub factory_method_name: Option<String>,
    pub instance_supplier: Option<InstanceSupplier>,
    pub init_method_name: Option<String>,
    pub enforce_init_method: bool,
    pub destroy_method_name: Option<String>,
    pub enforce_destroy_method: bool,
    pub method_overrides: Vec<MethodOverride>,
    pub lenient_constructor_resolution: bool,
    pub non_public_access_allowed: bool,
    /// 由框架内部生成（不参与生命周期钩子）
    pub synthetic: bool,
    /// 定义来源描述，例如配置文件名
    pub resource_description: Option<String>,
}

impl BeanDefinition {
    /// 创建指定类型的 Bean 定义
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self::for_class(BeanClass::Key(TypeKey::of::<T>()))
    }

    pub fn for_class(bean_class: BeanClass) -> Self {
        Self {
            bean_class: Some(bean_class),
            autowire_candidate: true,
            lenient_constructor_resolution: true,
            non_public_access_allowed: true,
            ..Default::default()
        }
    }

    /// 类型按名称动态解析的定义
    pub fn named_class(class_name: impl Into<String>) -> Self {
        Self::for_class(BeanClass::Name(class_name.into()))
    }

    /// 继承父定义的子定义
    pub fn child(parent_name: impl Into<String>) -> Self {
        Self {
            parent_name: Some(parent_name.into()),
            autowire_candidate: true,
            lenient_constructor_resolution: true,
            non_public_access_allowed: true,
            ..Default::default()
        }
    }

    /// 设置作用域
    pub fn with_scope(mut self, scope: Scope) -> Self {
        self.scope = Some(scope);
        self
    }

    /// 设置延迟初始化
    pub fn with_lazy(mut self, lazy: bool) -> Self {
        self.lazy_init = Some(lazy);
        self
    }

    pub fn with_abstract(mut self, is_abstract: bool) -> Self {
        self.is_abstract = is_abstract;
        self
    }

    pub fn with_primary(mut self, primary: bool) -> Self {
        self.primary = primary;
        self
    }

    pub fn with_autowire_candidate(mut self, candidate: bool) -> Self {
        self.autowire_candidate = candidate;
        self
    }

    pub fn with_qualifier(mut self, qualifier: impl Into<String>) -> Self {
        self.qualifiers.push(qualifier.into());
        self
    }

    /// 设置依赖列表（这些 Bean 会先被创建）
    pub fn with_depends_on(mut self, names: &[&str]) -> Self {
        self.depends_on = names.iter().map(|n| n.to_string()).collect();
        self
    }

    pub fn with_autowire(mut self, mode: AutowireMode) -> Self {
        self.autowire_mode = mode;
        self
    }

    pub fn with_dependency_check(mut self, check: DependencyCheck) -> Self {
        self.dependency_check = check;
        self
    }

    /// 追加通用构造参数
    pub fn with_arg(mut self, value: impl Into<BeanValue>) -> Self {
        self.constructor_args.add_generic(ValueHolder::new(value));
        self
    }

    pub fn with_arg_holder(mut self, holder: ValueHolder) -> Self {
        self.constructor_args.add_generic(holder);
        self
    }

    pub fn with_indexed_arg(mut self, index: usize, value: impl Into<BeanValue>) -> Self {
        self.constructor_args.add_indexed(index, ValueHolder::new(value));
        self
    }

    pub fn with_indexed_holder(mut self, index: usize, holder: ValueHolder) -> Self {
        self.constructor_args.add_indexed(index, holder);
        self
    }

    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<BeanValue>) -> Self {
        self.property_values.add(name, value);
        self
    }

    /// 使用另一个 Bean 上的实例工厂方法
    pub fn with_factory_bean(mut self, factory_bean: impl Into<String>, method: impl Into<String>) -> Self {
        self.factory_bean_name = Some(factory_bean.into());
        self.factory_method_name = Some(method.into());
        self
    }

    /// 使用 Bean 类型上的静态工厂方法
    pub fn with_factory_method(mut self, method: impl Into<String>) -> Self {
        self.factory_method_name = Some(method.into());
        self
    }

    pub fn with_supplier<F>(mut self, supplier: F) -> Self
    where
        F: Fn() -> anyhow::Result<BeanInstance> + Send + Sync + 'static,
    {
        self.instance_supplier = Some(Arc::new(supplier));
        self
    }

    /// 设置初始化方法（显式声明，找不到时报错）
    pub fn with_init_method(mut self, name: impl Into<String>) -> Self {
        self.init_method_name = Some(name.into());
        self.enforce_init_method = true;
        self
    }

    /// 设置销毁方法（显式声明，找不到时报错）
    pub fn with_destroy_method(mut self, name: impl Into<String>) -> Self {
        self.destroy_method_name = Some(name.into());
        self.enforce_destroy_method = true;
        self
    }

    pub fn with_method_override(mut self, method_override: MethodOverride) -> Self {
        self.method_overrides.push(method_override);
        self
    }

    pub fn with_lenient_constructor_resolution(mut self, lenient: bool) -> Self {
        self.lenient_constructor_resolution = lenient;
        self
    }

    pub fn with_non_public_access(mut self, allowed: bool) -> Self {
        self.non_public_access_allowed = allowed;
        self
    }

    pub fn with_synthetic(mut self, synthetic: bool) -> Self {
        self.synthetic = synthetic;
        self
    }

    pub fn with_resource_description(mut self, description: impl Into<String>) -> Self {
        self.resource_description = Some(description.into());
        self
    }

    pub fn bean_type_key(&self) -> Option<TypeKey> {
        match &self.bean_class {
            Some(BeanClass::Key(key)) => Some(*key),
            _ => None,
        }
    }

    pub fn is_singleton(&self) -> bool {
        matches!(self.scope, None | Some(Scope::Singleton))
    }

    pub fn is_prototype(&self) -> bool {
        matches!(self.scope, Some(Scope::Prototype))
    }

    pub fn is_lazy_init(&self) -> bool {
        self.lazy_init.unwrap_or(false)
    }

    pub fn has_constructor_args(&self) -> bool {
        !self.constructor_args.is_empty()
    }

    pub fn qualifies_as(&self, qualifier: &str) -> bool {
        self.qualifiers.iter().any(|q| q == qualifier)
    }

    /// 用子定义中设置过的值覆盖当前定义（合并父子定义时使用）
    pub fn override_from(&mut self, other: &BeanDefinition) {
        if other.bean_class.is_some() {
            self.bean_class = other.bean_class.clone();
        }
        if other.scope.is_some() {
            self.scope = other.scope.clone();
        }
        self.is_abstract = other.is_abstract;
        if other.lazy_init.is_some() {
            self.lazy_init = other.lazy_init;
        }
        if other.factory_bean_name.is_some() {
            self.factory_bean_name = other.factory_bean_name.clone();
        }
        if other.factory_method_name.is_some() {
            self.factory_method_name = other.factory_method_name.clone();
        }
        self.constructor_args.merge(&other.constructor_args);
        self.property_values.merge(&other.property_values);
        self.method_overrides.extend(other.method_overrides.iter().cloned());
        self.autowire_mode = other.autowire_mode;
        self.dependency_check = other.dependency_check;
        self.depends_on = other.depends_on.clone();
        self.autowire_candidate = other.autowire_candidate;
        self.primary = other.primary;
        for qualifier in &other.qualifiers {
            if !self.qualifies_as(qualifier) {
                self.qualifiers.push(qualifier.clone());
            }
        }
        if other.instance_supplier.is_some() {
            self.instance_supplier = other.instance_supplier.clone();
        }
        self.non_public_access_allowed = other.non_public_access_allowed;
        self.lenient_constructor_resolution = other.lenient_constructor_resolution;
        if other.init_method_name.is_some() {
            self.init_method_name = other.init_method_name.clone();
            self.enforce_init_method = other.enforce_init_method;
        }
        if other.destroy_method_name.is_some() {
            self.destroy_method_name = other.destroy_method_name.clone();
            self.enforce_destroy_method = other.enforce_destroy_method;
        }
        self.synthetic = other.synthetic;
        if other.resource_description.is_some() {
            self.resource_description = other.resource_description.clone();
        }
    }
}

impl fmt::Debug for BeanDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BeanDefinition")
            .field("bean_class", &self.bean_class)
            .field("parent_name", &self.parent_name)
            .field("scope", &self.scope)
            .field("abstract", &self.is_abstract)
            .field("lazy_init", &self.lazy_init)
            .field("autowire_mode", &self.autowire_mode)
            .field("constructor_args", &self.constructor_args.len())
            .field("property_values", &self.property_values.len())
            .field("factory_bean_name", &self.factory_bean_name)
            .field("factory_method_name", &self.factory_method_name)
            .field("has_supplier", &self.instance_supplier.is_some())
            .field("init_method_name", &self.init_method_name)
            .field("destroy_method_name", &self.destroy_method_name)
            .field("resource_description", &self.resource_description)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Engine;

    #[test]
    fn test_override_from_keeps_parent_defaults() {
        let mut parent = BeanDefinition::of::<Engine>()
            .with_property("cylinders", 4)
            .with_property("fuel", "petrol")
            .with_init_method("start");
        let child = BeanDefinition::child("engine")
            .with_property("cylinders", 6)
            .with_lazy(true);

        parent.override_from(&child);

        assert_eq!(parent.bean_type_key(), Some(TypeKey::of::<Engine>()));
        assert!(parent.is_lazy_init());
        assert_eq!(parent.init_method_name.as_deref(), Some("start"));
        assert!(matches!(
            parent.property_values.get("cylinders"),
            Some(BeanValue::Literal(Value::Int(6)))
        ));
        assert!(parent.property_values.contains("fuel"));
    }

    #[test]
    fn test_constructor_argument_merge() {
        let mut args = ConstructorArgumentValues::new();
        args.add_indexed(0, ValueHolder::new("a"));
        let mut other = ConstructorArgumentValues::new();
        other.add_indexed(0, ValueHolder::new("b"));
        other.add_generic(ValueHolder::new(1));

        args.merge(&other);

        assert_eq!(args.len(), 2);
        assert!(matches!(
            &args.indexed()[&0].value,
            BeanValue::Literal(Value::Str(s)) if s == "b"
        ));
    }

    #[test]
    fn test_needs_resolution() {
        assert!(!BeanValue::literal(1).needs_resolution());
        assert!(BeanValue::reference("other").needs_resolution());
        assert!(BeanValue::List(vec![BeanValue::literal(1), BeanValue::placeholder("${x}")])
            .needs_resolution());
    }
}
