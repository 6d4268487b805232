//! BeanPostProcessor - Bean 工厂扩展机制
//!
//! 扩展钩子在 Bean 生命周期的各个阶段被调用，可以观察或替换正在创建的对象。
//! 每个处理器声明自己支持的 [`Capability`] 和排序用的 [`Precedence`]，
//! 注册时一次性排好序并按能力分组缓存，创建 Bean 时不再做任何类型判断。

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::bean::{BeanDefinition, PropertyValues};
use crate::error::ContainerResult;
use crate::metadata::{Executable, TypeMetadata};
use crate::value::{BeanInstance, TypeKey};

/// 处理器参与的生命周期阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// 实例化之前，可以返回替代对象直接短路整个创建过程
    PreInstantiation,
    /// 决定候选构造函数
    CandidateConstructors,
    /// 修改合并后的 Bean 定义（每个定义只执行一次）
    MergedDefinition,
    /// 转换早期引用（例如提前创建代理）
    EarlyReference,
    /// 实例化之后，返回 false 跳过属性填充
    AfterInstantiation,
    /// 改写即将应用的属性值
    PropertyRewrite,
    BeforeInitialization,
    AfterInitialization,
    /// 预测 Bean 的最终类型
    TypePrediction,
    /// 单例销毁前回调
    Destruction,
}

/// 处理器的排序优先级
///
/// `Priority` 总是排在 `Ordered` 之前，`Ordered` 排在 `Unordered` 之前；
/// 同组内数字越小越靠前，相同时保持注册顺序
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precedence {
    Priority(i32),
    Ordered(i32),
    Unordered,
}

impl Precedence {
    pub(crate) fn sort_key(self) -> (u8, i32) {
        match self {
            Precedence::Priority(order) => (0, order),
            Precedence::Ordered(order) => (1, order),
            Precedence::Unordered => (2, 0),
        }
    }
}

/// BeanPostProcessor trait
///
/// 所有钩子都有默认实现，处理器只需重写自己关心的阶段，并在 [`capabilities`](BeanPostProcessor::capabilities)
/// 中声明它们。
///
/// # 示例
///
/// ```ignore
/// struct TracingPostProcessor;
///
/// impl BeanPostProcessor for TracingPostProcessor {
///     fn capabilities(&self) -> Vec<Capability> {
///         vec![Capability::AfterInitialization]
///     }
///
///     fn post_process_after_initialization(
///         &self,
///         bean: BeanInstance,
///         bean_name: &str,
///     ) -> ContainerResult<BeanInstance> {
///         tracing::info!("After initialization: {}", bean_name);
///         Ok(bean)
///     }
/// }
/// ```
pub trait BeanPostProcessor: Send + Sync {
    /// 获取处理器的名称（用于日志和调试）
    fn name(&self) -> &str {
        "BeanPostProcessor"
    }

    /// 处理器参与的阶段（默认：初始化前后）
    fn capabilities(&self) -> Vec<Capability> {
        vec![Capability::BeforeInitialization, Capability::AfterInitialization]
    }

    fn precedence(&self) -> Precedence {
        Precedence::Unordered
    }

    /// 返回 Some 时跳过实例化、填充和初始化，只再执行初始化后钩子
    fn post_process_before_instantiation(
        &self,
        _bean_type: TypeKey,
        _bean_name: &str,
    ) -> ContainerResult<Option<BeanInstance>> {
        Ok(None)
    }

    fn determine_candidate_constructors(
        &self,
        _bean_type: &TypeMetadata,
        _bean_name: &str,
    ) -> ContainerResult<Option<Vec<Arc<Executable>>>> {
        Ok(None)
    }

    fn post_process_merged_bean_definition(
        &self,
        _definition: &mut BeanDefinition,
        _bean_type: TypeKey,
        _bean_name: &str,
    ) -> ContainerResult<()> {
        Ok(())
    }

    fn get_early_bean_reference(
        &self,
        bean: BeanInstance,
        _bean_name: &str,
    ) -> ContainerResult<BeanInstance> {
        Ok(bean)
    }

    /// 返回 false 表示由处理器自己完成注入，容器跳过属性填充
    fn post_process_after_instantiation(
        &self,
        _bean: &BeanInstance,
        _bean_name: &str,
    ) -> ContainerResult<bool> {
        Ok(true)
    }

    fn post_process_properties(
        &self,
        properties: PropertyValues,
        _bean: &BeanInstance,
        _bean_name: &str,
    ) -> ContainerResult<PropertyValues> {
        Ok(properties)
    }

    /// 在 Bean 初始化回调（init）之前调用
    fn post_process_before_initialization(
        &self,
        bean: BeanInstance,
        _bean_name: &str,
    ) -> ContainerResult<BeanInstance> {
        Ok(bean)
    }

    /// 在 Bean 初始化回调（init）之后调用，典型用途是包装或代理
    fn post_process_after_initialization(
        &self,
        bean: BeanInstance,
        _bean_name: &str,
    ) -> ContainerResult<BeanInstance> {
        Ok(bean)
    }

    fn predict_bean_type(&self, _bean_type: TypeKey, _bean_name: &str) -> Option<TypeKey> {
        None
    }

    fn post_process_before_destruction(
        &self,
        _bean: &BeanInstance,
        _bean_name: &str,
    ) -> ContainerResult<()> {
        Ok(())
    }

    /// 该 Bean 是否需要本处理器的销毁回调
    fn requires_destruction(&self, _bean: &BeanInstance) -> bool {
        true
    }
}

/// 按能力分组、已排序的处理器快照
#[derive(Default)]
pub struct ProcessorCache {
    by_capability: HashMap<Capability, Vec<Arc<dyn BeanPostProcessor>>>,
}

impl ProcessorCache {
    fn build(processors: &[Arc<dyn BeanPostProcessor>]) -> Self {
        let mut by_capability: HashMap<Capability, Vec<Arc<dyn BeanPostProcessor>>> = HashMap::new();
        for processor in processors {
            for capability in processor.capabilities() {
                let group = by_capability.entry(capability).or_default();
                if !group.iter().any(|p| Arc::ptr_eq(p, processor)) {
                    group.push(processor.clone());
                }
            }
        }
        Self { by_capability }
    }

    pub fn get(&self, capability: Capability) -> &[Arc<dyn BeanPostProcessor>] {
        self.by_capability
            .get(&capability)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn has(&self, capability: Capability) -> bool {
        !self.get(capability).is_empty()
    }
}

/// 扩展钩子注册表
#[derive(Default)]
pub struct BeanPostProcessorRegistry {
    processors: RwLock<Vec<Arc<dyn BeanPostProcessor>>>,
    cache: RwLock<Arc<ProcessorCache>>,
}

impl BeanPostProcessorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 添加处理器；同一个处理器重复添加时移到末尾后重新排序
    pub fn add(&self, processor: Arc<dyn BeanPostProcessor>) {
        let mut processors = self.processors.write();
        processors.retain(|p| !Arc::ptr_eq(p, &processor));
        tracing::debug!(
            "Registering bean post processor '{}' with {:?}",
            processor.name(),
            processor.precedence()
        );
        processors.push(processor);
        crate::lifecycle::sort_by_precedence(processors.as_mut_slice(), |p| p.precedence());
        *self.cache.write() = Arc::new(ProcessorCache::build(&processors));
    }

    /// 当前处理器快照；创建一个 Bean 期间使用同一个快照
    pub fn snapshot(&self) -> Arc<ProcessorCache> {
        self.cache.read().clone()
    }

    pub fn for_capability(&self, capability: Capability) -> Vec<Arc<dyn BeanPostProcessor>> {
        self.snapshot().get(capability).to_vec()
    }

    pub fn has(&self, capability: Capability) -> bool {
        self.cache.read().has(capability)
    }

    pub fn all(&self) -> Vec<Arc<dyn BeanPostProcessor>> {
        self.processors.read().clone()
    }

    pub fn len(&self) -> usize {
        self.processors.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.processors.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Tagged {
        name: &'static str,
        precedence: Precedence,
        capabilities: Vec<Capability>,
    }

    impl BeanPostProcessor for Tagged {
        fn name(&self) -> &str {
            self.name
        }

        fn capabilities(&self) -> Vec<Capability> {
            self.capabilities.clone()
        }

        fn precedence(&self) -> Precedence {
            self.precedence
        }
    }

    fn tagged(name: &'static str, precedence: Precedence, capabilities: &[Capability]) -> Arc<dyn BeanPostProcessor> {
        Arc::new(Tagged {
            name,
            precedence,
            capabilities: capabilities.to_vec(),
        })
    }

    #[test]
    fn test_processors_grouped_and_sorted_once() {
        let registry = BeanPostProcessorRegistry::new();
        registry.add(tagged("plain", Precedence::Unordered, &[Capability::AfterInitialization]));
        registry.add(tagged(
            "ordered",
            Precedence::Ordered(1),
            &[Capability::AfterInitialization, Capability::PropertyRewrite],
        ));
        registry.add(tagged("priority", Precedence::Priority(100), &[Capability::AfterInitialization]));

        let snapshot = registry.snapshot();
        let names: Vec<&str> = snapshot
            .get(Capability::AfterInitialization)
            .iter()
            .map(|p| p.name())
            .collect();
        assert_eq!(names, vec!["priority", "ordered", "plain"]);
        assert_eq!(snapshot.get(Capability::PropertyRewrite).len(), 1);
        assert!(!snapshot.has(Capability::PreInstantiation));
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn test_re_adding_moves_processor() {
        let registry = BeanPostProcessorRegistry::new();
        let first = tagged("first", Precedence::Unordered, &[Capability::BeforeInitialization]);
        registry.add(first.clone());
        registry.add(tagged("second", Precedence::Unordered, &[Capability::BeforeInitialization]));
        registry.add(first);

        let names: Vec<String> = registry
            .for_capability(Capability::BeforeInitialization)
            .iter()
            .map(|p| p.name().to_string())
            .collect();
        assert_eq!(names, vec!["second", "first"]);
    }
}
