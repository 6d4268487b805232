//! 类型元数据 - 反射的显式替代
//!
//! 每个由容器管理的类型通过 [`BeanType`] 构建器声明自己的构造函数、工厂方法、
//! 可写属性、命名方法和接口视图，然后注册到 [`TypeCatalog`]。
//! 解析器、实例化策略和属性填充都只依赖这里的元数据。

use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use anyhow::bail;
use parking_lot::RwLock;

use crate::instantiation::{MethodInterceptor, MethodOverrideSlot};
use crate::value::{BeanInstance, Injectable, TypeKey, Value, ValueType};

/// 可执行体的种类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutableKind {
    Constructor,
    /// 定义在 Bean 类型上的静态工厂方法
    StaticFactory,
    /// 定义在工厂 Bean 上的实例工厂方法
    InstanceFactory,
}

/// 构造函数 / 工厂方法的参数
#[derive(Debug, Clone)]
pub struct Parameter {
    pub name: Option<String>,
    pub value_type: ValueType,
    pub required: bool,
}

impl Parameter {
    pub fn of<V: Injectable>() -> Self {
        Self {
            name: None,
            value_type: V::value_type(),
            required: V::required(),
        }
    }
}

type StaticInvoker = dyn Fn(Vec<Value>) -> anyhow::Result<Option<BeanInstance>> + Send + Sync;
type InstanceInvoker =
    dyn Fn(&BeanInstance, Vec<Value>) -> anyhow::Result<Option<BeanInstance>> + Send + Sync;

enum Invoker {
    Static(Box<StaticInvoker>),
    Instance(Box<InstanceInvoker>),
}

/// 构造函数或工厂方法
pub struct Executable {
    kind: ExecutableKind,
    name: String,
    declaring_type: TypeKey,
    parameters: Vec<Parameter>,
    /// None 表示无返回值（仅工厂方法可能出现）
    return_type: Option<TypeKey>,
    public: bool,
    invoker: Invoker,
}

impl Executable {
    pub fn kind(&self) -> ExecutableKind {
        self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn declaring_type(&self) -> TypeKey {
        self.declaring_type
    }

    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    pub fn parameter_count(&self) -> usize {
        self.parameters.len()
    }

    pub fn return_type(&self) -> Option<TypeKey> {
        self.return_type
    }

    pub fn is_public(&self) -> bool {
        self.public
    }

    pub fn is_static(&self) -> bool {
        !matches!(self.kind, ExecutableKind::InstanceFactory)
    }

    /// 例如 `Widget::new(String, i64)`
    pub fn signature(&self) -> String {
        let params = self
            .parameters
            .iter()
            .map(|p| p.value_type.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        format!("{}::{}({})", self.declaring_type.short_name(), self.name, params)
    }

    /// 调用可执行体；实例工厂方法需要提供目标实例
    pub fn invoke(
        &self,
        target: Option<&BeanInstance>,
        args: Vec<Value>,
    ) -> anyhow::Result<Option<BeanInstance>> {
        if args.len() != self.parameters.len() {
            bail!(
                "{} expects {} arguments but {} were given",
                self.signature(),
                self.parameters.len(),
                args.len()
            );
        }
        match (&self.invoker, target) {
            (Invoker::Static(f), _) => f(args),
            (Invoker::Instance(f), Some(target)) => f(target, args),
            (Invoker::Instance(_), None) => {
                bail!("{} requires a target instance", self.signature())
            }
        }
    }
}

impl fmt::Debug for Executable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.signature())
    }
}

/// 可调用对象 - 把强类型闭包适配为接收 `Vec<Value>` 的调用
pub trait Callable<Args>: Send + Sync + 'static {
    type Output;

    fn parameters() -> Vec<Parameter>;

    fn call(&self, args: Vec<Value>) -> anyhow::Result<Self::Output>;
}

/// 以 `&T` 作为接收者的可调用对象（实例工厂方法）
pub trait InstanceCallable<T, Args>: Send + Sync + 'static {
    type Output;

    fn parameters() -> Vec<Parameter>;

    fn call(&self, target: &T, args: Vec<Value>) -> anyhow::Result<Self::Output>;
}

macro_rules! impl_callable {
    ($($ty:ident $var:ident),*) => {
        impl<F, R, $($ty,)*> Callable<($($ty,)*)> for F
        where
            F: Fn($($ty),*) -> R + Send + Sync + 'static,
            $($ty: Injectable,)*
        {
            type Output = R;

            fn parameters() -> Vec<Parameter> {
                vec![$(Parameter::of::<$ty>()),*]
            }

            #[allow(unused_mut, unused_variables)]
            fn call(&self, args: Vec<Value>) -> anyhow::Result<R> {
                let mut args = args.into_iter();
                $(let $var = $ty::from_value(args.next().unwrap_or(Value::Null))?;)*
                Ok(self($($var),*))
            }
        }

        impl<T, F, R, $($ty,)*> InstanceCallable<T, ($($ty,)*)> for F
        where
            F: Fn(&T, $($ty),*) -> R + Send + Sync + 'static,
            $($ty: Injectable,)*
        {
            type Output = R;

            fn parameters() -> Vec<Parameter> {
                vec![$(Parameter::of::<$ty>()),*]
            }

            #[allow(unused_mut, unused_variables)]
            fn call(&self, target: &T, args: Vec<Value>) -> anyhow::Result<R> {
                let mut args = args.into_iter();
                $(let $var = $ty::from_value(args.next().unwrap_or(Value::Null))?;)*
                Ok(self(target, $($var),*))
            }
        }
    };
}

impl_callable!();
impl_callable!(A1 a1);
impl_callable!(A1 a1, A2 a2);
impl_callable!(A1 a1, A2 a2, A3 a3);
impl_callable!(A1 a1, A2 a2, A3 a3, A4 a4);
impl_callable!(A1 a1, A2 a2, A3 a3, A4 a4, A5 a5);
impl_callable!(A1 a1, A2 a2, A3 a3, A4 a4, A5 a5, A6 a6);

/// 可写属性
pub struct PropertyDescriptor {
    name: String,
    value_type: ValueType,
    required: bool,
    setter: Box<dyn Fn(&BeanInstance, Value) -> anyhow::Result<()> + Send + Sync>,
}

impl PropertyDescriptor {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value_type(&self) -> &ValueType {
        &self.value_type
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    pub fn is_simple(&self) -> bool {
        self.value_type.is_simple()
    }

    pub fn set(&self, target: &BeanInstance, value: Value) -> anyhow::Result<()> {
        (self.setter)(target, value)
    }
}

impl fmt::Debug for PropertyDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyDescriptor")
            .field("name", &self.name)
            .field("value_type", &self.value_type)
            .field("required", &self.required)
            .finish()
    }
}

type Caster = dyn Fn(&BeanInstance) -> Option<BeanInstance> + Send + Sync;
type MethodFn = dyn Fn(&BeanInstance) -> anyhow::Result<()> + Send + Sync;
type Installer = dyn Fn(&BeanInstance, Arc<dyn MethodInterceptor>) -> bool + Send + Sync;

struct MethodInjection {
    methods: Vec<String>,
    install: Box<Installer>,
}

/// 一个类型的完整元数据
pub struct TypeMetadata {
    key: TypeKey,
    name: String,
    constructors: Vec<Arc<Executable>>,
    factory_methods: Vec<Arc<Executable>>,
    properties: Vec<PropertyDescriptor>,
    methods: HashMap<String, Box<MethodFn>>,
    interfaces: Vec<(TypeKey, Box<Caster>)>,
    method_injection: Option<MethodInjection>,
}

impl TypeMetadata {
    pub fn key(&self) -> TypeKey {
        self.key
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn constructors(&self) -> &[Arc<Executable>] {
        &self.constructors
    }

    pub fn factory_methods(&self) -> &[Arc<Executable>] {
        &self.factory_methods
    }

    /// 按名称和静态/实例模式筛选工厂方法
    pub fn factory_methods_named(&self, name: &str, is_static: bool) -> Vec<Arc<Executable>> {
        self.factory_methods
            .iter()
            .filter(|m| m.name() == name && m.is_static() == is_static)
            .cloned()
            .collect()
    }

    pub fn properties(&self) -> &[PropertyDescriptor] {
        &self.properties
    }

    pub fn property(&self, name: &str) -> Option<&PropertyDescriptor> {
        self.properties.iter().find(|p| p.name == name)
    }

    pub fn has_method(&self, name: &str) -> bool {
        self.methods.contains_key(name)
    }

    /// 调用无参命名方法；方法不存在时返回 None
    pub fn invoke_method(
        &self,
        name: &str,
        target: &BeanInstance,
    ) -> Option<anyhow::Result<()>> {
        self.methods.get(name).map(|m| m(target))
    }

    pub fn interfaces(&self) -> impl Iterator<Item = TypeKey> + '_ {
        self.interfaces.iter().map(|(key, _)| *key)
    }

    pub fn implements(&self, interface: TypeKey) -> bool {
        self.interfaces.iter().any(|(key, _)| *key == interface)
    }

    fn cast(&self, instance: &BeanInstance, target: TypeKey) -> Option<BeanInstance> {
        self.interfaces
            .iter()
            .find(|(key, _)| *key == target)
            .and_then(|(_, cast)| cast(instance))
    }

    /// 可被方法注入覆盖的方法数量（按名称）
    pub fn overridable_method_count(&self, method: &str) -> usize {
        self.method_injection
            .as_ref()
            .map(|mi| mi.methods.iter().filter(|m| m.as_str() == method).count())
            .unwrap_or(0)
    }

    pub fn supports_method_injection(&self) -> bool {
        self.method_injection.is_some()
    }

    pub(crate) fn install_interceptor(
        &self,
        instance: &BeanInstance,
        interceptor: Arc<dyn MethodInterceptor>,
    ) -> bool {
        match &self.method_injection {
            Some(mi) => (mi.install)(instance, interceptor),
            None => false,
        }
    }
}

impl fmt::Debug for TypeMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeMetadata")
            .field("name", &self.name)
            .field("constructors", &self.constructors)
            .field("factory_methods", &self.factory_methods)
            .field("properties", &self.properties)
            .finish()
    }
}

/// 类型元数据构建器
///
/// ```ignore
/// let meta = BeanType::<Widget>::new()
///     .constructor(|name: String| Widget::new(name, 0))
///     .constructor(|name: String, size: i64| Widget::new(name, size))
///     .property("color", |w: &Widget, color: String| w.set_color(color))
///     .method("init", |w: &Widget| w.init())
///     .build();
/// ```
pub struct BeanType<T> {
    meta: TypeMetadata,
    last_was_factory: bool,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Send + Sync + 'static> Default for BeanType<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send + Sync + 'static> BeanType<T> {
    pub fn new() -> Self {
        let key = TypeKey::of::<T>();
        Self {
            meta: TypeMetadata {
                key,
                name: key.short_name().to_string(),
                constructors: Vec::new(),
                factory_methods: Vec::new(),
                properties: Vec::new(),
                methods: HashMap::new(),
                interfaces: Vec::new(),
                method_injection: None,
            },
            last_was_factory: false,
            _marker: PhantomData,
        }
    }

    /// 覆盖在目录中使用的类型名称（默认为不带路径的类型名）
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.meta.name = name.into();
        self
    }

    pub fn constructor<Args, F>(self, f: F) -> Self
    where
        F: Callable<Args, Output = T>,
    {
        self.push_constructor(F::parameters(), move |args| f.call(args))
    }

    /// 可失败的构造函数
    pub fn try_constructor<Args, F>(self, f: F) -> Self
    where
        F: Callable<Args, Output = anyhow::Result<T>>,
    {
        self.push_constructor(F::parameters(), move |args| f.call(args)?)
    }

    fn push_constructor(
        mut self,
        parameters: Vec<Parameter>,
        construct: impl Fn(Vec<Value>) -> anyhow::Result<T> + Send + Sync + 'static,
    ) -> Self {
        let key = self.meta.key;
        self.last_was_factory = false;
        self.meta.constructors.push(Arc::new(Executable {
            kind: ExecutableKind::Constructor,
            name: "new".to_string(),
            declaring_type: key,
            parameters,
            return_type: Some(key),
            public: true,
            invoker: Invoker::Static(Box::new(move |args| {
                construct(args).map(|t| Some(BeanInstance::new(t)))
            })),
        }));
        self
    }

    /// 静态工厂方法
    pub fn factory_method<Args, F, R>(self, name: &str, f: F) -> Self
    where
        F: Callable<Args, Output = R>,
        R: Send + Sync + 'static,
    {
        self.push_static_factory(name, F::parameters(), Some(TypeKey::of::<R>()), move |args| {
            f.call(args).map(|r| Some(BeanInstance::new(r)))
        })
    }

    pub fn try_factory_method<Args, F, R>(self, name: &str, f: F) -> Self
    where
        F: Callable<Args, Output = anyhow::Result<R>>,
        R: Send + Sync + 'static,
    {
        self.push_static_factory(name, F::parameters(), Some(TypeKey::of::<R>()), move |args| {
            f.call(args)?.map(|r| Some(BeanInstance::new(r)))
        })
    }

    /// 无返回值的静态方法（不能作为工厂方法使用）
    pub fn void_factory_method<Args, F>(self, name: &str, f: F) -> Self
    where
        F: Callable<Args, Output = ()>,
    {
        self.push_static_factory(name, F::parameters(), None, move |args| {
            f.call(args).map(|_| None)
        })
    }

    fn push_static_factory(
        mut self,
        name: &str,
        parameters: Vec<Parameter>,
        return_type: Option<TypeKey>,
        invoke: impl Fn(Vec<Value>) -> anyhow::Result<Option<BeanInstance>> + Send + Sync + 'static,
    ) -> Self {
        self.last_was_factory = true;
        self.meta.factory_methods.push(Arc::new(Executable {
            kind: ExecutableKind::StaticFactory,
            name: name.to_string(),
            declaring_type: self.meta.key,
            parameters,
            return_type,
            public: true,
            invoker: Invoker::Static(Box::new(invoke)),
        }));
        self
    }

    /// 实例工厂方法 - 在工厂 Bean 实例上调用
    pub fn instance_factory_method<Args, F, R>(mut self, name: &str, f: F) -> Self
    where
        F: InstanceCallable<T, Args, Output = R>,
        R: Send + Sync + 'static,
    {
        self.last_was_factory = true;
        self.meta.factory_methods.push(Arc::new(Executable {
            kind: ExecutableKind::InstanceFactory,
            name: name.to_string(),
            declaring_type: self.meta.key,
            parameters: F::parameters(),
            return_type: Some(TypeKey::of::<R>()),
            public: true,
            invoker: Invoker::Instance(Box::new(move |target, args| {
                let target = target.try_downcast::<T>()?;
                f.call(&target, args).map(|r| Some(BeanInstance::new(r)))
            })),
        }));
        self
    }

    /// 把最近声明的构造函数或工厂方法标记为非公开
    pub fn non_public(mut self) -> Self {
        if let Some(last) = self.last_executable() {
            last.public = false;
        }
        self
    }

    /// 为最近声明的构造函数或工厂方法设置参数名称
    pub fn param_names(mut self, names: &[&str]) -> Self {
        if let Some(last) = self.last_executable() {
            for (param, name) in last.parameters.iter_mut().zip(names) {
                param.name = Some(name.to_string());
            }
        }
        self
    }

    fn last_executable(&mut self) -> Option<&mut Executable> {
        let list = if self.last_was_factory {
            &mut self.meta.factory_methods
        } else {
            &mut self.meta.constructors
        };
        list.last_mut().and_then(Arc::get_mut)
    }

    /// 可写属性，setter 通过内部可变性修改 `&T`
    pub fn property<V, F>(self, name: &str, setter: F) -> Self
    where
        V: Injectable,
        F: Fn(&T, V) + Send + Sync + 'static,
    {
        self.try_property(name, move |target: &T, value: V| {
            setter(target, value);
            Ok(())
        })
    }

    pub fn try_property<V, F>(mut self, name: &str, setter: F) -> Self
    where
        V: Injectable,
        F: Fn(&T, V) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.meta.properties.push(PropertyDescriptor {
            name: name.to_string(),
            value_type: V::value_type(),
            required: V::required(),
            setter: Box::new(move |target, value| {
                let target = target.try_downcast::<T>()?;
                setter(&target, V::from_value(value)?)
            }),
        });
        self
    }

    /// 无参命名方法，可作为 init / destroy 方法
    pub fn method<F>(mut self, name: &str, f: F) -> Self
    where
        F: Fn(&T) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.meta.methods.insert(
            name.to_string(),
            Box::new(move |target| {
                let target = target.try_downcast::<T>()?;
                f(&target)
            }),
        );
        self
    }

    /// 声明接口视图，例如 `.implements::<dyn InitializingBean>(|b| b)`
    pub fn implements<I>(mut self, cast: fn(Arc<T>) -> Arc<I>) -> Self
    where
        I: ?Sized + Send + Sync + 'static,
    {
        self.meta.interfaces.push((
            TypeKey::of::<I>(),
            Box::new(move |instance| instance.downcast::<T>().map(|t| BeanInstance::from_arc(cast(t)))),
        ));
        self
    }

    /// 启用方法注入：`slot` 返回实例上的分派槽，`methods` 列出可被覆盖的方法
    pub fn method_injection(mut self, slot: fn(&T) -> &MethodOverrideSlot, methods: &[&str]) -> Self {
        self.meta.method_injection = Some(MethodInjection {
            methods: methods.iter().map(|m| m.to_string()).collect(),
            install: Box::new(move |instance, interceptor| match instance.downcast::<T>() {
                Some(target) => slot(&target).install(interceptor),
                None => false,
            }),
        });
        self
    }

    pub fn build(self) -> TypeMetadata {
        self.meta
    }
}

/// 类型目录 - 所有已注册类型的元数据
#[derive(Default)]
pub struct TypeCatalog {
    types: RwLock<HashMap<TypeKey, Arc<TypeMetadata>>>,
    names: RwLock<HashMap<String, TypeKey>>,
}

impl TypeCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册类型元数据，同名类型会被替换
    pub fn register(&self, meta: TypeMetadata) -> Arc<TypeMetadata> {
        let meta = Arc::new(meta);
        tracing::trace!("Registering type metadata: {} ({})", meta.name(), meta.key());
        self.names.write().insert(meta.name().to_string(), meta.key());
        self.names
            .write()
            .insert(meta.key().name().to_string(), meta.key());
        self.types.write().insert(meta.key(), meta.clone());
        meta
    }

    pub fn get(&self, key: TypeKey) -> Option<Arc<TypeMetadata>> {
        self.types.read().get(&key).cloned()
    }

    pub fn contains(&self, key: TypeKey) -> bool {
        self.types.read().contains_key(&key)
    }

    /// 按名称查找（短名称或完整类型名）
    pub fn resolve_name(&self, name: &str) -> Option<TypeKey> {
        self.names.read().get(name).copied()
    }

    /// `actual` 类型的实例能否作为 `required` 使用
    pub fn is_assignable(&self, actual: TypeKey, required: TypeKey) -> bool {
        self.type_distance(actual, required).is_some()
    }

    /// 类型距离：完全相同为 0，通过接口视图为 1，不兼容为 None
    pub fn type_distance(&self, actual: TypeKey, required: TypeKey) -> Option<u32> {
        if actual == required {
            return Some(0);
        }
        match self.get(actual) {
            Some(meta) if meta.implements(required) => Some(1),
            _ => None,
        }
    }

    /// 把实例转换为指定的类型视图
    pub fn cast(&self, instance: &BeanInstance, required: TypeKey) -> Option<BeanInstance> {
        if instance.type_key() == required {
            return Some(instance.clone());
        }
        self.get(instance.type_key())
            .and_then(|meta| meta.cast(instance, required))
    }

    /// 强类型的接口视图，例如 `catalog.view::<dyn DisposableBean>(&bean)`
    pub fn view<I: ?Sized + Send + Sync + 'static>(&self, instance: &BeanInstance) -> Option<Arc<I>> {
        self.cast(instance, TypeKey::of::<I>())
            .and_then(|view| view.downcast::<I>())
    }

    /// 所有能赋值给 `required` 的已注册类型
    pub fn assignable_types(&self, required: TypeKey) -> Vec<TypeKey> {
        self.types
            .read()
            .values()
            .filter(|meta| meta.key() == required || meta.implements(required))
            .map(|meta| meta.key())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    trait Shape: Send + Sync {
        fn area(&self) -> f64;
    }

    struct Square {
        side: f64,
        label: Mutex<String>,
    }

    impl Shape for Square {
        fn area(&self) -> f64 {
            self.side * self.side
        }
    }

    fn square_type() -> TypeMetadata {
        BeanType::<Square>::new()
            .constructor(|| Square { side: 1.0, label: Mutex::new(String::new()) })
            .constructor(|side: f64| Square { side, label: Mutex::new(String::new()) })
            .param_names(&["side"])
            .property("label", |s: &Square, label: String| *s.label.lock() = label)
            .method("reset", |s: &Square| {
                s.label.lock().clear();
                Ok(())
            })
            .implements::<dyn Shape>(|s| s)
            .factory_method("unit", || Square { side: 1.0, label: Mutex::new("unit".into()) })
            .void_factory_method("noop", || ())
            .build()
    }

    #[test]
    fn test_constructors_and_signature() {
        let meta = square_type();
        assert_eq!(meta.constructors().len(), 2);
        let ctor = &meta.constructors()[1];
        assert_eq!(ctor.signature(), "Square::new(f64)");
        assert_eq!(ctor.parameters()[0].name.as_deref(), Some("side"));

        let instance = ctor.invoke(None, vec![Value::Float(3.0)]).unwrap().unwrap();
        assert_eq!(instance.downcast::<Square>().unwrap().side, 3.0);
        assert!(ctor.invoke(None, vec![]).is_err());
    }

    #[test]
    fn test_property_method_and_view() {
        let catalog = TypeCatalog::new();
        let meta = catalog.register(square_type());
        let instance = meta.constructors()[0].invoke(None, vec![]).unwrap().unwrap();

        meta.property("label")
            .unwrap()
            .set(&instance, Value::from("big"))
            .unwrap();
        assert_eq!(*instance.downcast::<Square>().unwrap().label.lock(), "big");
        meta.invoke_method("reset", &instance).unwrap().unwrap();
        assert!(instance.downcast::<Square>().unwrap().label.lock().is_empty());
        assert!(meta.invoke_method("missing", &instance).is_none());

        let shape = catalog.view::<dyn Shape>(&instance).unwrap();
        assert_eq!(shape.area(), 1.0);
        assert_eq!(
            catalog.type_distance(TypeKey::of::<Square>(), TypeKey::of::<dyn Shape>()),
            Some(1)
        );
        assert_eq!(catalog.resolve_name("Square"), Some(TypeKey::of::<Square>()));
    }

    #[test]
    fn test_factory_methods() {
        let meta = square_type();
        assert_eq!(meta.factory_methods_named("unit", true).len(), 1);
        assert_eq!(meta.factory_methods_named("unit", false).len(), 0);
        let noop = &meta.factory_methods_named("noop", true)[0];
        assert!(noop.return_type().is_none());
        assert!(noop.invoke(None, vec![]).unwrap().is_none());
    }
}
