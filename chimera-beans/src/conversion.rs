//! 类型转换
//!
//! 把解析出来的 [`Value`] 转换为参数或属性声明的 [`ValueType`]，
//! 并为构造函数解析提供类型差异计算。

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::{ContainerError, ContainerResult};
use crate::metadata::TypeCatalog;
use crate::value::{BeanInstance, TypeKey, Value, ValueType};

type Converter = dyn Fn(&str) -> anyhow::Result<BeanInstance> + Send + Sync;

/// 类型转换器
pub struct TypeConverter {
    catalog: Arc<TypeCatalog>,
    converters: RwLock<HashMap<TypeKey, Arc<Converter>>>,
}

impl TypeConverter {
    pub fn new(catalog: Arc<TypeCatalog>) -> Self {
        Self {
            catalog,
            converters: RwLock::new(HashMap::new()),
        }
    }

    /// 注册字符串到领域对象的转换器
    pub fn register_converter<T, F>(&self, convert: F)
    where
        T: Send + Sync + 'static,
        F: Fn(&str) -> anyhow::Result<T> + Send + Sync + 'static,
    {
        tracing::debug!("Registering custom converter for {}", std::any::type_name::<T>());
        self.converters.write().insert(
            TypeKey::of::<T>(),
            Arc::new(move |text| convert(text).map(BeanInstance::new)),
        );
    }

    pub fn has_converter(&self, key: TypeKey) -> bool {
        self.converters.read().contains_key(&key)
    }

    /// 转换值；`property` 仅用于错误信息
    pub fn convert(
        &self,
        value: Value,
        required: &ValueType,
        property: Option<&str>,
    ) -> ContainerResult<Value> {
        let fail = |value: &Value, reason: String| ContainerError::TypeConversion {
            value_type: value.type_description(),
            required_type: required.to_string(),
            property: property.map(str::to_string),
            reason,
        };

        match (value, required) {
            (Value::Null, _) => Ok(Value::Null),
            (v @ Value::Bool(_), ValueType::Bool)
            | (v @ Value::Int(_), ValueType::Int)
            | (v @ Value::Float(_), ValueType::Float)
            | (v @ Value::Str(_), ValueType::Str) => Ok(v),
            (Value::Int(i), ValueType::Float) => Ok(Value::Float(i as f64)),
            (Value::Int(i), ValueType::Str) => Ok(Value::Str(i.to_string())),
            (Value::Float(f), ValueType::Str) => Ok(Value::Str(f.to_string())),
            (Value::Bool(b), ValueType::Str) => Ok(Value::Str(b.to_string())),
            (Value::Str(s), ValueType::Int) => s
                .trim()
                .parse::<i64>()
                .map(Value::Int)
                .map_err(|e| fail(&Value::Str(s.clone()), e.to_string())),
            (Value::Str(s), ValueType::Float) => s
                .trim()
                .parse::<f64>()
                .map(Value::Float)
                .map_err(|e| fail(&Value::Str(s.clone()), e.to_string())),
            (Value::Str(s), ValueType::Bool) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" | "on" | "1" => Ok(Value::Bool(true)),
                "false" | "no" | "off" | "0" => Ok(Value::Bool(false)),
                _ => Err(fail(&Value::Str(s.clone()), "not a boolean".to_string())),
            },
            (Value::Str(s), ValueType::Object(key)) => {
                let converter = self.converters.read().get(key).cloned();
                match converter {
                    Some(convert) => convert(&s)
                        .map(Value::Object)
                        .map_err(|e| fail(&Value::Str(s.clone()), format!("{:#}", e))),
                    None => Err(fail(
                        &Value::Str(s),
                        "no matching editors or conversion strategy found".to_string(),
                    )),
                }
            }
            (Value::Object(instance), ValueType::Object(key)) => {
                match self.catalog.cast(&instance, *key) {
                    Some(view) => Ok(Value::Object(view)),
                    None => Err(fail(
                        &Value::Object(instance),
                        "instance is not assignable to the required type".to_string(),
                    )),
                }
            }
            (Value::List(items), ValueType::List(element)) => items
                .into_iter()
                .map(|item| self.convert(item, element, property))
                .collect::<ContainerResult<Vec<_>>>()
                .map(Value::List),
            (single, ValueType::List(element)) => {
                Ok(Value::List(vec![self.convert(single, element, property)?]))
            }
            (other, _) => Err(fail(&other, "incompatible value".to_string())),
        }
    }

    /// 值与声明类型之间的距离；不可直接赋值时返回 None
    pub fn assignable_distance(&self, value: &Value, required: &ValueType) -> Option<u32> {
        match (value, required) {
            (Value::Null, ValueType::Object(_))
            | (Value::Null, ValueType::Str)
            | (Value::Null, ValueType::List(_)) => Some(0),
            (Value::Bool(_), ValueType::Bool)
            | (Value::Int(_), ValueType::Int)
            | (Value::Float(_), ValueType::Float)
            | (Value::Str(_), ValueType::Str) => Some(0),
            (Value::Object(instance), ValueType::Object(key)) => {
                self.catalog.type_distance(instance.type_key(), *key)
            }
            (Value::List(items), ValueType::List(element)) => items
                .iter()
                .map(|item| self.assignable_distance(item, element))
                .try_fold(0, |acc, d| d.map(|d| acc.max(d))),
            _ => None,
        }
    }

    pub fn is_assignable_value(&self, value: &Value, required: &ValueType) -> bool {
        self.assignable_distance(value, required).is_some()
    }

    pub fn catalog(&self) -> &Arc<TypeCatalog> {
        &self.catalog
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::BeanType;

    #[derive(Debug, PartialEq)]
    struct Color(String);

    fn converter() -> TypeConverter {
        let catalog = Arc::new(TypeCatalog::new());
        catalog.register(BeanType::<Color>::new().build());
        TypeConverter::new(catalog)
    }

    #[test]
    fn test_string_coercions() {
        let conv = converter();
        assert!(matches!(
            conv.convert(Value::from("42"), &ValueType::Int, None).unwrap(),
            Value::Int(42)
        ));
        assert!(matches!(
            conv.convert(Value::from("on"), &ValueType::Bool, None).unwrap(),
            Value::Bool(true)
        ));
        assert!(matches!(
            conv.convert(Value::Int(3), &ValueType::Float, None).unwrap(),
            Value::Float(f) if f == 3.0
        ));
    }

    #[test]
    fn test_conversion_failure_names_types() {
        let conv = converter();
        let err = conv
            .convert(Value::from("abc"), &ValueType::Int, Some("port"))
            .unwrap_err();
        let text = err.to_string();
        assert!(text.contains("'String'"));
        assert!(text.contains("'i64'"));
        assert!(text.contains("property 'port'"));
    }

    #[test]
    fn test_custom_converter() {
        let conv = converter();
        let target = ValueType::object::<Color>();
        assert!(conv.convert(Value::from("red"), &target, None).is_err());

        conv.register_converter(|text: &str| Ok(Color(text.to_uppercase())));
        let value = conv.convert(Value::from("red"), &target, None).unwrap();
        let color = value.as_object().unwrap().downcast::<Color>().unwrap();
        assert_eq!(*color, Color("RED".to_string()));
    }

    #[test]
    fn test_assignable_distance() {
        let conv = converter();
        assert_eq!(conv.assignable_distance(&Value::from("x"), &ValueType::Str), Some(0));
        assert_eq!(conv.assignable_distance(&Value::from("1"), &ValueType::Int), None);
        assert_eq!(conv.assignable_distance(&Value::Null, &ValueType::Int), None);
        let list = Value::List(vec![Value::Int(1), Value::Int(2)]);
        assert_eq!(
            conv.assignable_distance(&list, &ValueType::List(Box::new(ValueType::Int))),
            Some(0)
        );
    }
}
