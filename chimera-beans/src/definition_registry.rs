//! Bean 定义存储
//!
//! 保存按名称注册的 [`BeanDefinition`]，沿父定义链合并出 [`MergedBeanDefinition`]
//! 并缓存在 `DashMap` 中。注册、移除、修改定义时会让受影响名称及其子定义的缓存失效。

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock, RwLockReadGuard};

use crate::bean::{BeanClass, BeanDefinition, BeanValue};
use crate::error::{ContainerError, ContainerResult};
use crate::metadata::Executable;
use crate::scope::Scope;
use crate::value::{TypeKey, Value};

/// 缓存的构造参数
///
/// 自动装配的参数和需要容器解析的声明值在每次实例化时重新解析
#[derive(Debug, Clone)]
pub enum PreparedArgument {
    Resolved(Value),
    Source(BeanValue),
    Autowired,
}

/// 构造函数 / 工厂方法的解析缓存
#[derive(Debug, Default)]
pub(crate) struct ResolutionCache {
    pub resolved_executable: Option<Arc<Executable>>,
    /// 参数是否已确定（false 表示无参实例化）
    pub arguments_resolved: bool,
    pub resolved_arguments: Option<Vec<Value>>,
    pub prepared_arguments: Option<Vec<PreparedArgument>>,
}

/// 合并后的 Bean 定义
///
/// 对调用方是只读的，只有合并定义后置处理器在第一次创建前可以修改一次
pub struct MergedBeanDefinition {
    name: String,
    definition: RwLock<BeanDefinition>,
    stale: AtomicBool,
    pub(crate) resolution: Mutex<ResolutionCache>,
    pub(crate) post_processed: Mutex<bool>,
    pub(crate) target_type: RwLock<Option<TypeKey>>,
    /// 按名称声明的类型的解析结果，定义本身保持不变
    resolved_class: RwLock<Option<TypeKey>>,
    pub(crate) is_factory_bean: RwLock<Option<bool>>,
    pub(crate) before_instantiation_resolved: RwLock<Option<bool>>,
}

impl MergedBeanDefinition {
    pub(crate) fn new(name: &str, mut definition: BeanDefinition) -> Self {
        if definition.scope.is_none() {
            definition.scope = Some(Scope::Singleton);
        }
        Self {
            name: name.to_string(),
            definition: RwLock::new(definition),
            stale: AtomicBool::new(false),
            resolution: Mutex::new(ResolutionCache::default()),
            post_processed: Mutex::new(false),
            target_type: RwLock::new(None),
            resolved_class: RwLock::new(None),
            is_factory_bean: RwLock::new(None),
            before_instantiation_resolved: RwLock::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// 读取合并后的定义；不要在持有返回的守卫时调用用户代码
    pub fn definition(&self) -> RwLockReadGuard<'_, BeanDefinition> {
        self.definition.read()
    }

    /// 合并后的定义副本
    pub fn snapshot(&self) -> BeanDefinition {
        self.definition.read().clone()
    }

    /// 供一次创建使用的定义副本，按名称声明的类型替换为已解析的类型
    pub fn creation_snapshot(&self) -> BeanDefinition {
        let mut definition = self.snapshot();
        let declared_by_name = matches!(definition.bean_class, Some(BeanClass::Name(_)));
        if let Some(key) = self.resolved_class().filter(|_| declared_by_name) {
            definition.bean_class = Some(BeanClass::Key(key));
        }
        definition
    }

    pub fn resolved_class(&self) -> Option<TypeKey> {
        *self.resolved_class.read()
    }

    pub(crate) fn set_resolved_class(&self, key: TypeKey) {
        *self.resolved_class.write() = Some(key);
    }

    pub(crate) fn modify<F: FnOnce(&mut BeanDefinition)>(&self, modifier: F) {
        modifier(&mut self.definition.write());
    }

    pub fn scope(&self) -> Scope {
        self.definition.read().scope.clone().unwrap_or_default()
    }

    pub fn is_singleton(&self) -> bool {
        self.definition.read().is_singleton()
    }

    pub fn is_prototype(&self) -> bool {
        self.definition.read().is_prototype()
    }

    pub fn is_abstract(&self) -> bool {
        self.definition.read().is_abstract
    }

    pub fn resource_description(&self) -> Option<String> {
        self.definition.read().resource_description.clone()
    }

    pub fn is_stale(&self) -> bool {
        self.stale.load(Ordering::Acquire)
    }

    fn mark_stale(&self) {
        self.stale.store(true, Ordering::Release);
    }

    /// 已解析的目标类型（类型预测的结果也会缓存在这里）
    pub fn target_type(&self) -> Option<TypeKey> {
        *self.target_type.read()
    }

    pub(crate) fn set_target_type(&self, key: TypeKey) {
        *self.target_type.write() = Some(key);
    }

    /// 清空解析缓存，之后的实例化会重新解析构造函数
    pub fn clear_resolution_cache(&self) {
        *self.resolution.lock() = ResolutionCache::default();
    }
}

impl std::fmt::Debug for MergedBeanDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MergedBeanDefinition")
            .field("name", &self.name)
            .field("definition", &*self.definition.read())
            .field("stale", &self.is_stale())
            .finish()
    }
}

/// Bean 定义注册表
pub struct BeanDefinitionRegistry {
    definitions: RwLock<HashMap<String, BeanDefinition>>,
    /// 注册顺序
    names: RwLock<Vec<String>>,
    aliases: RwLock<HashMap<String, String>>,
    merged: DashMap<String, Arc<MergedBeanDefinition>>,
    allow_overriding: AtomicBool,
    frozen: AtomicBool,
}

impl Default for BeanDefinitionRegistry {
    fn default() -> Self {
        Self::new(true)
    }
}

impl BeanDefinitionRegistry {
    pub fn new(allow_overriding: bool) -> Self {
        Self {
            definitions: RwLock::new(HashMap::new()),
            names: RwLock::new(Vec::new()),
            aliases: RwLock::new(HashMap::new()),
            merged: DashMap::new(),
            allow_overriding: AtomicBool::new(allow_overriding),
            frozen: AtomicBool::new(false),
        }
    }

    pub fn set_allow_overriding(&self, allow: bool) {
        self.allow_overriding.store(allow, Ordering::Release);
    }

    /// 注册 Bean 定义，返回是否替换了已有定义
    pub fn register(&self, name: &str, definition: BeanDefinition) -> ContainerResult<bool> {
        if name.is_empty() {
            return Err(ContainerError::BeanDefinitionStore {
                name: name.to_string(),
                reason: "bean name must not be empty".to_string(),
            });
        }
        Self::validate(name, &definition)?;

        let replaced = {
            let mut definitions = self.definitions.write();
            let existing = definitions.contains_key(name);
            if existing && !self.allow_overriding.load(Ordering::Acquire) {
                return Err(ContainerError::BeanDefinitionStore {
                    name: name.to_string(),
                    reason: format!(
                        "cannot register bean definition {:?} for bean '{}': there is already a definition bound",
                        definition.bean_class, name
                    ),
                });
            }
            if existing {
                tracing::debug!("Overriding bean definition for bean '{}'", name);
            } else {
                self.names.write().push(name.to_string());
            }
            definitions.insert(name.to_string(), definition);
            existing
        };

        self.aliases.write().remove(name);
        self.invalidate(name);
        tracing::trace!("Registered bean definition '{}'", name);
        Ok(replaced)
    }

    fn validate(name: &str, definition: &BeanDefinition) -> ContainerResult<()> {
        if !definition.method_overrides.is_empty() && definition.factory_method_name.is_some() {
            return Err(ContainerError::BeanDefinitionStore {
                name: name.to_string(),
                reason: "cannot combine factory method with container-generated method overrides: \
                         the factory method must create the concrete bean instance"
                    .to_string(),
            });
        }
        if definition.bean_class.is_none()
            && definition.parent_name.is_none()
            && definition.factory_bean_name.is_none()
            && definition.instance_supplier.is_none()
        {
            return Err(ContainerError::BeanDefinitionStore {
                name: name.to_string(),
                reason: "bean definition declares neither a type, a parent, a factory bean nor a supplier"
                    .to_string(),
            });
        }
        Ok(())
    }

    /// 移除 Bean 定义
    pub fn remove(&self, name: &str) -> ContainerResult<BeanDefinition> {
        let removed = self.definitions.write().remove(name);
        match removed {
            Some(definition) => {
                self.names.write().retain(|n| n != name);
                self.invalidate(name);
                Ok(definition)
            }
            None => Err(ContainerError::NoSuchDefinition {
                name: name.to_string(),
            }),
        }
    }

    /// 修改已注册的定义（会使合并缓存失效）
    pub fn modify<F>(&self, name: &str, modifier: F) -> ContainerResult<()>
    where
        F: FnOnce(&mut BeanDefinition),
    {
        {
            let mut definitions = self.definitions.write();
            let definition = definitions.get_mut(name).ok_or_else(|| ContainerError::NoSuchDefinition {
                name: name.to_string(),
            })?;
            modifier(definition);
        }
        self.invalidate(name);
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.definitions.read().contains_key(name)
    }

    pub fn get(&self, name: &str) -> ContainerResult<BeanDefinition> {
        self.definitions
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| ContainerError::NoSuchDefinition {
                name: name.to_string(),
            })
    }

    /// 所有定义名称（注册顺序）
    pub fn names(&self) -> Vec<String> {
        self.names.read().clone()
    }

    pub fn len(&self) -> usize {
        self.definitions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.read().is_empty()
    }

    pub fn freeze(&self) {
        self.frozen.store(true, Ordering::Release);
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen.load(Ordering::Acquire)
    }

    /// 获取合并后的定义（带缓存）
    pub fn merged(&self, name: &str) -> ContainerResult<Arc<MergedBeanDefinition>> {
        if let Some(cached) = self.merged.get(name) {
            if !cached.is_stale() {
                return Ok(cached.clone());
            }
        }

        let mut chain = Vec::new();
        let flattened = self.flatten(name, &mut chain)?;
        let merged = Arc::new(MergedBeanDefinition::new(name, flattened));
        // 并发时重复合并是安全的，后写入者覆盖
        self.merged.insert(name.to_string(), merged.clone());
        Ok(merged)
    }

    /// 合并一个未注册的定义（例如内部 Bean），结果不缓存
    pub fn merge_standalone(
        &self,
        name: &str,
        definition: &BeanDefinition,
    ) -> ContainerResult<Arc<MergedBeanDefinition>> {
        let flattened = match &definition.parent_name {
            Some(parent) => {
                let mut chain = vec![name.to_string()];
                let mut base = self.flatten(parent, &mut chain)?;
                base.override_from(definition);
                base
            }
            None => definition.clone(),
        };
        Ok(Arc::new(MergedBeanDefinition::new(name, flattened)))
    }

    fn flatten(&self, name: &str, chain: &mut Vec<String>) -> ContainerResult<BeanDefinition> {
        if chain.iter().any(|n| n == name) {
            chain.push(name.to_string());
            return Err(ContainerError::BeanDefinitionStore {
                name: chain[0].clone(),
                reason: format!("circular parent definition chain: {}", chain.join(" -> ")),
            });
        }
        chain.push(name.to_string());

        let definition = self.get(&self.canonical_name(name))?;
        match &definition.parent_name {
            None => Ok(definition),
            Some(parent) => {
                let parent = self.canonical_name(parent);
                if !self.contains(&parent) {
                    return Err(ContainerError::NoSuchDefinition { name: parent });
                }
                let mut base = self.flatten(&parent, chain)?;
                base.override_from(&definition);
                Ok(base)
            }
        }
    }

    /// 使名称及所有（直接或间接、包括通过别名）以它为父定义的子定义的合并缓存失效
    pub fn invalidate(&self, name: &str) {
        let parents: Vec<(String, String)> = self
            .definitions
            .read()
            .iter()
            .filter_map(|(n, d)| d.parent_name.as_deref().map(|parent| (n.clone(), self.canonical_name(parent))))
            .collect();

        let mut visited: HashSet<String> = HashSet::new();
        let mut pending = vec![name.to_string()];
        while let Some(current) = pending.pop() {
            if !visited.insert(current.clone()) {
                continue;
            }
            if let Some((_, merged)) = self.merged.remove(&current) {
                merged.mark_stale();
            }
            pending.extend(
                parents
                    .iter()
                    .filter(|(child, parent)| *parent == current && !visited.contains(child))
                    .map(|(child, _)| child.clone()),
            );
        }
    }

    /// 注册别名
    pub fn register_alias(&self, name: &str, alias: &str) -> ContainerResult<()> {
        if alias == name {
            let previous = self.aliases.write().remove(alias);
            if let Some(previous) = previous {
                self.invalidate(&self.canonical_name(&previous));
            }
            return Ok(());
        }
        if self.contains(alias) {
            return Err(ContainerError::BeanDefinitionStore {
                name: alias.to_string(),
                reason: format!("cannot register alias '{}' for name '{}': a bean definition with that name exists", alias, name),
            });
        }
        // 检查别名循环：name 已经（直接或间接）指向 alias
        let mut current = name.to_string();
        {
            let aliases = self.aliases.read();
            while let Some(target) = aliases.get(&current) {
                if target == alias {
                    return Err(ContainerError::BeanDefinitionStore {
                        name: alias.to_string(),
                        reason: format!(
                            "cannot register alias '{}' for name '{}': circular reference - '{}' is a direct or indirect alias for '{}' already",
                            alias, name, name, alias
                        ),
                    });
                }
                current = target.clone();
            }
            if current == alias {
                return Err(ContainerError::BeanDefinitionStore {
                    name: alias.to_string(),
                    reason: format!("cannot register alias '{}' for name '{}': circular reference", alias, name),
                });
            }
        }
        let previous = self.aliases.write().insert(alias.to_string(), name.to_string());
        // 以别名引用父定义的子定义需要重新合并
        if let Some(previous) = previous {
            self.invalidate(&self.canonical_name(&previous));
        }
        self.invalidate(&self.canonical_name(name));
        tracing::trace!("Registered alias '{}' for bean '{}'", alias, name);
        Ok(())
    }

    /// 别名解析为规范名称
    pub fn canonical_name(&self, name: &str) -> String {
        let aliases = self.aliases.read();
        let mut current = name;
        let mut hops = 0;
        while let Some(target) = aliases.get(current) {
            current = target;
            hops += 1;
            if hops > aliases.len() {
                break;
            }
        }
        current.to_string()
    }

    pub fn aliases_of(&self, name: &str) -> Vec<String> {
        let aliases = self.aliases.read();
        let mut result: Vec<String> = aliases
            .keys()
            .filter(|alias| {
                let mut current = alias.as_str();
                let mut hops = 0;
                while let Some(target) = aliases.get(current) {
                    if target == name {
                        return true;
                    }
                    current = target;
                    hops += 1;
                    if hops > aliases.len() {
                        break;
                    }
                }
                false
            })
            .cloned()
            .collect();
        result.sort();
        result
    }

    pub fn is_alias(&self, name: &str) -> bool {
        self.aliases.read().contains_key(name)
    }

    /// 依赖关系图（用于静态依赖校验）：名称 -> depends-on 及引用的 Bean
    pub fn dependency_graph(&self) -> HashMap<String, Vec<String>> {
        fn collect_refs(value: &BeanValue, out: &mut Vec<String>) {
            match value {
                BeanValue::Ref(name) => out.push(name.clone()),
                BeanValue::List(items) => items.iter().for_each(|item| collect_refs(item, out)),
                BeanValue::Inner(inner) => {
                    inner.property_values.iter().for_each(|(_, v)| collect_refs(v, out));
                }
                _ => {}
            }
        }

        self.definitions
            .read()
            .iter()
            .map(|(name, definition)| {
                let mut deps = definition.depends_on.clone();
                for holder in definition.constructor_args.indexed().values() {
                    collect_refs(&holder.value, &mut deps);
                }
                for holder in definition.constructor_args.generic() {
                    collect_refs(&holder.value, &mut deps);
                }
                if let Some(factory) = &definition.factory_bean_name {
                    deps.push(factory.clone());
                }
                deps.sort();
                deps.dedup();
                (name.clone(), deps)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Base;
    struct Special;

    #[test]
    fn test_merge_overlays_child_on_parent() {
        let registry = BeanDefinitionRegistry::default();
        registry
            .register(
                "base",
                BeanDefinition::of::<Base>()
                    .with_abstract(true)
                    .with_property("timeout", 30)
                    .with_property("name", "base"),
            )
            .unwrap();
        registry
            .register(
                "child",
                BeanDefinition::child("base").with_property("name", "child"),
            )
            .unwrap();

        let merged = registry.merged("child").unwrap();
        let def = merged.definition();
        assert!(!def.is_abstract);
        assert_eq!(def.bean_type_key(), Some(TypeKey::of::<Base>()));
        assert!(def.property_values.contains("timeout"));
        assert!(matches!(
            def.property_values.get("name"),
            Some(BeanValue::Literal(Value::Str(s))) if s == "child"
        ));
        assert!(def.is_singleton());
    }

    #[test]
    fn test_missing_parent_fails() {
        let registry = BeanDefinitionRegistry::default();
        registry
            .register("orphan", BeanDefinition::child("nobody"))
            .unwrap();
        let err = registry.merged("orphan").unwrap_err();
        assert!(matches!(err, ContainerError::NoSuchDefinition { name } if name == "nobody"));
    }

    #[test]
    fn test_parent_cycle_fails() {
        let registry = BeanDefinitionRegistry::default();
        registry.register("a", BeanDefinition::child("b")).unwrap();
        registry.register("b", BeanDefinition::child("a")).unwrap();
        let err = registry.merged("a").unwrap_err();
        assert!(matches!(err, ContainerError::BeanDefinitionStore { .. }));
    }

    #[test]
    fn test_reregistration_invalidates_children() {
        let registry = BeanDefinitionRegistry::default();
        registry.register("base", BeanDefinition::of::<Base>()).unwrap();
        registry.register("child", BeanDefinition::child("base")).unwrap();

        let before = registry.merged("child").unwrap();
        assert_eq!(before.definition().bean_type_key(), Some(TypeKey::of::<Base>()));

        assert!(registry.register("base", BeanDefinition::of::<Special>()).unwrap());
        assert!(before.is_stale());
        let after = registry.merged("child").unwrap();
        assert_eq!(after.definition().bean_type_key(), Some(TypeKey::of::<Special>()));
    }

    #[test]
    fn test_reregistration_invalidates_children_declared_through_alias() {
        let registry = BeanDefinitionRegistry::default();
        registry.register("base", BeanDefinition::of::<Base>()).unwrap();
        registry.register_alias("base", "baseAlias").unwrap();
        registry.register("child", BeanDefinition::child("baseAlias")).unwrap();
        registry.register("grandchild", BeanDefinition::child("child")).unwrap();

        let child = registry.merged("child").unwrap();
        let grandchild = registry.merged("grandchild").unwrap();
        assert_eq!(child.definition().bean_type_key(), Some(TypeKey::of::<Base>()));

        registry.register("base", BeanDefinition::of::<Special>()).unwrap();
        assert!(child.is_stale());
        assert!(grandchild.is_stale());
        assert_eq!(
            registry.merged("grandchild").unwrap().definition().bean_type_key(),
            Some(TypeKey::of::<Special>())
        );
    }

    #[test]
    fn test_alias_registration_invalidates_children_naming_it() {
        let registry = BeanDefinitionRegistry::default();
        registry.register("base", BeanDefinition::of::<Base>()).unwrap();
        registry.register("special", BeanDefinition::of::<Special>()).unwrap();
        registry.register_alias("base", "parent").unwrap();
        registry.register("child", BeanDefinition::child("parent")).unwrap();

        let before = registry.merged("child").unwrap();
        assert_eq!(before.definition().bean_type_key(), Some(TypeKey::of::<Base>()));

        registry.register_alias("special", "parent").unwrap();
        assert!(before.is_stale());
        assert_eq!(
            registry.merged("child").unwrap().definition().bean_type_key(),
            Some(TypeKey::of::<Special>())
        );
    }

    #[test]
    fn test_registering_parent_cycle_terminates() {
        let registry = BeanDefinitionRegistry::default();
        registry.register("a", BeanDefinition::child("b")).unwrap();
        registry.register("b", BeanDefinition::child("c")).unwrap();
        registry.register("c", BeanDefinition::child("a")).unwrap();

        registry.modify("b", |d| d.lazy_init = Some(true)).unwrap();
        registry.invalidate("a");
        for name in ["a", "b", "c"] {
            assert!(matches!(
                registry.merged(name),
                Err(ContainerError::BeanDefinitionStore { .. })
            ));
        }
    }

    #[test]
    fn test_overriding_disallowed() {
        let registry = BeanDefinitionRegistry::new(false);
        registry.register("x", BeanDefinition::of::<Base>()).unwrap();
        assert!(registry.register("x", BeanDefinition::of::<Special>()).is_err());
    }

    #[test]
    fn test_alias_resolution_and_cycles() {
        let registry = BeanDefinitionRegistry::default();
        registry.register("dataSource", BeanDefinition::of::<Base>()).unwrap();
        registry.register_alias("dataSource", "ds").unwrap();
        registry.register_alias("ds", "primaryDs").unwrap();

        assert_eq!(registry.canonical_name("primaryDs"), "dataSource");
        assert_eq!(registry.aliases_of("dataSource"), vec!["ds", "primaryDs"]);
        assert!(registry.register_alias("primaryDs", "ds").is_err());
    }
}
