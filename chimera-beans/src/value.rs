//! 运行时类型与值模型
//!
//! Rust 没有运行时反射，容器通过 [`TypeKey`] 标识类型，通过 [`BeanInstance`]
//! 持有类型擦除后的共享实例，通过 [`Value`] / [`ValueType`] 描述构造参数和属性值。

use std::any::{Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use anyhow::anyhow;

/// 类型标识 - 可以是具体类型，也可以是 `dyn Trait` 接口
#[derive(Clone, Copy)]
pub struct TypeKey {
    id: TypeId,
    name: &'static str,
}

impl TypeKey {
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    pub fn id(&self) -> TypeId {
        self.id
    }

    /// 完整类型名称，例如 `my_app::service::UserService`
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// 不带模块路径的类型名称，例如 `UserService`
    pub fn short_name(&self) -> &'static str {
        let base = self.name.split('<').next().unwrap_or(self.name);
        let base = base.trim_start_matches("dyn ");
        match base.rfind("::") {
            Some(idx) => &base[idx + 2..],
            None => base,
        }
    }
}

impl PartialEq for TypeKey {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeKey {}

impl Hash for TypeKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

impl fmt::Display for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// 容器管理的共享实例
///
/// 内部保存一个 `Arc<T>`（`T` 可以是 `dyn Trait`），因此同一个对象的具体类型视图
/// 和接口视图可以通过 [`BeanInstance::same_instance`] 判断是否为同一对象。
#[derive(Clone)]
pub struct BeanInstance {
    handle: Arc<dyn Any + Send + Sync>,
    type_key: TypeKey,
    addr: usize,
}

impl BeanInstance {
    pub fn new<T: Send + Sync + 'static>(value: T) -> Self {
        Self::from_arc(Arc::new(value))
    }

    pub fn from_arc<T: ?Sized + Send + Sync + 'static>(arc: Arc<T>) -> Self {
        let addr = Arc::as_ptr(&arc) as *const () as usize;
        Self {
            handle: Arc::new(arc),
            type_key: TypeKey::of::<T>(),
            addr,
        }
    }

    pub fn type_key(&self) -> TypeKey {
        self.type_key
    }

    pub fn type_name(&self) -> &'static str {
        self.type_key.name()
    }

    pub fn is<T: ?Sized + 'static>(&self) -> bool {
        self.type_key == TypeKey::of::<T>()
    }

    /// 取出指定类型的 `Arc`，类型不匹配时返回 None
    pub fn downcast<T: ?Sized + Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.handle.downcast_ref::<Arc<T>>().cloned()
    }

    /// 与 [`BeanInstance::downcast`] 相同，但返回带上下文的错误
    pub fn try_downcast<T: ?Sized + Send + Sync + 'static>(&self) -> anyhow::Result<Arc<T>> {
        self.downcast::<T>().ok_or_else(|| {
            anyhow!(
                "expected instance of type '{}' but found '{}'",
                std::any::type_name::<T>(),
                self.type_key.name()
            )
        })
    }

    /// 是否与另一个实例指向同一个对象（忽略视图类型）
    pub fn same_instance(&self, other: &BeanInstance) -> bool {
        self.addr == other.addr
    }
}

impl fmt::Debug for BeanInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BeanInstance({}@{:#x})", self.type_key.name(), self.addr)
    }
}

/// 动态值 - 构造参数、工厂方法参数和属性值的统一表示
#[derive(Clone, Debug)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
    Object(BeanInstance),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// 值的类型描述（用于错误信息）
    pub fn type_description(&self) -> String {
        match self {
            Value::Null => "null".to_string(),
            Value::Bool(_) => "bool".to_string(),
            Value::Int(_) => "i64".to_string(),
            Value::Float(_) => "f64".to_string(),
            Value::Str(_) => "String".to_string(),
            Value::List(_) => "list".to_string(),
            Value::Object(instance) => instance.type_name().to_string(),
        }
    }

    pub fn as_object(&self) -> Option<&BeanInstance> {
        match self {
            Value::Object(instance) => Some(instance),
            _ => None,
        }
    }

    /// 判断两个值是否相等；对象按实例身份比较
    pub fn same_value(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.same_value(y))
            }
            (Value::Object(a), Value::Object(b)) => a.same_instance(b),
            _ => false,
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Str(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Str(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(value as i64)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<BeanInstance> for Value {
    fn from(value: BeanInstance) -> Self {
        Value::Object(value)
    }
}

/// 声明的参数 / 属性类型
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ValueType {
    Bool,
    Int,
    Float,
    Str,
    Object(TypeKey),
    List(Box<ValueType>),
}

impl ValueType {
    pub fn object<T: ?Sized + 'static>() -> Self {
        ValueType::Object(TypeKey::of::<T>())
    }

    /// 简单类型（基本类型、字符串以及它们的列表）不参与自动装配
    pub fn is_simple(&self) -> bool {
        match self {
            ValueType::Bool | ValueType::Int | ValueType::Float | ValueType::Str => true,
            ValueType::List(element) => element.is_simple(),
            ValueType::Object(_) => false,
        }
    }

    pub fn type_key(&self) -> Option<TypeKey> {
        match self {
            ValueType::Object(key) => Some(*key),
            _ => None,
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueType::Bool => f.write_str("bool"),
            ValueType::Int => f.write_str("i64"),
            ValueType::Float => f.write_str("f64"),
            ValueType::Str => f.write_str("String"),
            ValueType::Object(key) => f.write_str(key.name()),
            ValueType::List(element) => write!(f, "Vec<{}>", element),
        }
    }
}

/// 可注入的 Rust 类型
///
/// 把构造函数参数、setter 参数映射为 [`ValueType`]，并从 [`Value`] 中取出具体值。
/// `Option<_>` 表示可选依赖，`Vec<_>` 表示集合注入。
pub trait Injectable: Sized + 'static {
    fn value_type() -> ValueType;

    fn required() -> bool {
        true
    }

    fn from_value(value: Value) -> anyhow::Result<Self>;
}

fn mismatch<T>(value: &Value) -> anyhow::Error {
    anyhow!(
        "cannot use value of type '{}' as '{}'",
        value.type_description(),
        std::any::type_name::<T>()
    )
}

impl Injectable for String {
    fn value_type() -> ValueType {
        ValueType::Str
    }

    fn from_value(value: Value) -> anyhow::Result<Self> {
        match value {
            Value::Str(s) => Ok(s),
            other => Err(mismatch::<Self>(&other)),
        }
    }
}

impl Injectable for bool {
    fn value_type() -> ValueType {
        ValueType::Bool
    }

    fn from_value(value: Value) -> anyhow::Result<Self> {
        match value {
            Value::Bool(b) => Ok(b),
            other => Err(mismatch::<Self>(&other)),
        }
    }
}

macro_rules! impl_injectable_int {
    ($($ty:ty),*) => {
        $(
            impl Injectable for $ty {
                fn value_type() -> ValueType {
                    ValueType::Int
                }

                fn from_value(value: Value) -> anyhow::Result<Self> {
                    match value {
                        Value::Int(i) => <$ty>::try_from(i)
                            .map_err(|_| anyhow!("value {} out of range for {}", i, stringify!($ty))),
                        other => Err(mismatch::<Self>(&other)),
                    }
                }
            }
        )*
    };
}

impl_injectable_int!(i8, i16, i32, i64, u8, u16, u32, u64, usize);

impl Injectable for f64 {
    fn value_type() -> ValueType {
        ValueType::Float
    }

    fn from_value(value: Value) -> anyhow::Result<Self> {
        match value {
            Value::Float(f) => Ok(f),
            other => Err(mismatch::<Self>(&other)),
        }
    }
}

impl Injectable for f32 {
    fn value_type() -> ValueType {
        ValueType::Float
    }

    fn from_value(value: Value) -> anyhow::Result<Self> {
        match value {
            Value::Float(f) => Ok(f as f32),
            other => Err(mismatch::<Self>(&other)),
        }
    }
}

impl<T: ?Sized + Send + Sync + 'static> Injectable for Arc<T> {
    fn value_type() -> ValueType {
        ValueType::Object(TypeKey::of::<T>())
    }

    fn from_value(value: Value) -> anyhow::Result<Self> {
        match value {
            Value::Object(instance) => instance.try_downcast::<T>(),
            other => Err(mismatch::<Self>(&other)),
        }
    }
}

impl<T: Injectable> Injectable for Option<T> {
    fn value_type() -> ValueType {
        T::value_type()
    }

    fn required() -> bool {
        false
    }

    fn from_value(value: Value) -> anyhow::Result<Self> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

impl<T: Injectable> Injectable for Vec<T> {
    fn value_type() -> ValueType {
        ValueType::List(Box::new(T::value_type()))
    }

    fn from_value(value: Value) -> anyhow::Result<Self> {
        match value {
            Value::List(items) => items.into_iter().map(T::from_value).collect(),
            Value::Null => Ok(Vec::new()),
            other => Err(mismatch::<Self>(&other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    trait Greeter: Send + Sync {
        fn greet(&self) -> String;
    }

    struct English;

    impl Greeter for English {
        fn greet(&self) -> String {
            "hello".to_string()
        }
    }

    #[test]
    fn test_instance_identity_across_views() {
        let concrete = Arc::new(English);
        let as_trait: Arc<dyn Greeter> = concrete.clone();

        let a = BeanInstance::from_arc(concrete);
        let b = BeanInstance::from_arc(as_trait);

        assert!(a.same_instance(&b));
        assert!(a.is::<English>());
        assert!(b.is::<dyn Greeter>());
        assert_eq!(b.downcast::<dyn Greeter>().unwrap().greet(), "hello");
        assert!(a.downcast::<dyn Greeter>().is_none());
    }

    #[test]
    fn test_injectable_conversions() {
        assert_eq!(String::from_value(Value::from("x")).unwrap(), "x");
        assert_eq!(u16::from_value(Value::Int(8080)).unwrap(), 8080);
        assert!(u8::from_value(Value::Int(300)).is_err());
        assert_eq!(Option::<i64>::from_value(Value::Null).unwrap(), None);
        assert!(!Option::<i64>::required());
        assert_eq!(
            Vec::<i64>::from_value(Value::List(vec![Value::Int(1), Value::Int(2)])).unwrap(),
            vec![1, 2]
        );
    }

    #[test]
    fn test_short_name() {
        assert_eq!(TypeKey::of::<English>().short_name(), "English");
        assert_eq!(TypeKey::of::<dyn Greeter>().short_name(), "Greeter");
        assert!(ValueType::List(Box::new(ValueType::Int)).is_simple());
        assert!(!ValueType::object::<English>().is_simple());
    }
}
