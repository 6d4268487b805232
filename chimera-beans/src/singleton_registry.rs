//! 单例注册表
//!
//! 三级可见性：完全创建的单例、早期引用、早期引用工厂。
//! 一把 `parking_lot::Mutex` 保护缓存查找和插入，配合 `Condvar` 保证同名单例最多构造一次；
//! 构造本身在锁外执行。

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::thread::ThreadId;

use parking_lot::{Condvar, Mutex, MutexGuard};

use crate::error::{ContainerError, ContainerResult};
use crate::value::BeanInstance;

/// 早期引用工厂，最多调用一次
pub type EarlyReferenceFactory = Box<dyn FnOnce() -> ContainerResult<BeanInstance> + Send>;

/// 单例销毁回调
pub trait DestructionCallback: Send + Sync {
    fn destroy(&self) -> anyhow::Result<()>;
}

impl<F> DestructionCallback for F
where
    F: Fn() -> anyhow::Result<()> + Send + Sync,
{
    fn destroy(&self) -> anyhow::Result<()> {
        self()
    }
}

#[derive(Default)]
struct State {
    singletons: HashMap<String, BeanInstance>,
    early: HashMap<String, BeanInstance>,
    factories: HashMap<String, EarlyReferenceFactory>,
    /// 注册顺序
    registered: Vec<String>,
    /// 正在创建的单例 -> 创建线程
    in_creation: HashMap<String, ThreadId>,
    /// 正在调用早期引用工厂的单例 -> 调用线程
    early_pending: HashMap<String, ThreadId>,
    /// 阻塞等待中的线程 -> 等待的单例
    waiting: HashMap<ThreadId, String>,
    in_destruction: bool,
}

impl State {
    fn is_mid_creation(&self, thread: ThreadId) -> bool {
        self.in_creation.values().any(|t| *t == thread)
    }

    fn early_available(&self, name: &str) -> bool {
        self.early.contains_key(name)
            || self.factories.contains_key(name)
            || self.early_pending.contains_key(name)
    }

    /// 线程是否真正阻塞（可以拿到早期引用的线程不算）
    fn is_blocked(&self, thread: ThreadId) -> Option<&String> {
        let awaited = self.waiting.get(&thread)?;
        if self.is_mid_creation(thread) && self.early_available(awaited) {
            None
        } else {
            Some(awaited)
        }
    }

    /// 当前线程等待 `name` 是否会形成跨线程的等待环
    fn wait_would_deadlock(&self, name: &str, me: ThreadId) -> Option<Vec<String>> {
        let mut path = vec![name.to_string()];
        let mut owner = *self.in_creation.get(name)?;
        for _ in 0..=self.waiting.len() {
            if owner == me {
                return Some(path);
            }
            let awaited = self.is_blocked(owner)?;
            path.push(awaited.clone());
            owner = *self.in_creation.get(awaited)?;
        }
        None
    }

    fn add_singleton(&mut self, name: &str, instance: BeanInstance) {
        self.singletons.insert(name.to_string(), instance);
        self.early.remove(name);
        self.factories.remove(name);
        if !self.registered.iter().any(|n| n == name) {
            self.registered.push(name.to_string());
        }
    }
}

/// 创建守卫 - 离开作用域时清除 "正在创建" 标记并唤醒等待者
struct CreationGuard<'a> {
    registry: &'a DefaultSingletonRegistry,
    name: String,
}

impl Drop for CreationGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.registry.state.lock();
        state.in_creation.remove(&self.name);
        drop(state);
        self.registry.cond.notify_all();
    }
}

/// 单例注册表
#[derive(Default)]
pub struct DefaultSingletonRegistry {
    state: Mutex<State>,
    cond: Condvar,
    /// bean -> 依赖它的 bean
    dependents: Mutex<HashMap<String, HashSet<String>>>,
    /// bean -> 它依赖的 bean
    dependencies: Mutex<HashMap<String, HashSet<String>>>,
    /// 外部 bean -> 内部 bean
    contained: Mutex<HashMap<String, HashSet<String>>>,
    disposables: Mutex<Vec<(String, Arc<dyn DestructionCallback>)>>,
}

impl DefaultSingletonRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 查找单例
    ///
    /// 先查完全创建的单例；若该名称正在创建，且当前线程可以看到早期引用
    /// （创建线程本身，或自己也正在创建某个单例的线程），再查早期引用；
    /// `allow_early_reference` 为 true 时最多调用一次早期引用工厂。
    pub fn get_singleton(
        &self,
        name: &str,
        allow_early_reference: bool,
    ) -> ContainerResult<Option<BeanInstance>> {
        let me = std::thread::current().id();
        let mut state = self.state.lock();
        loop {
            if let Some(instance) = state.singletons.get(name) {
                return Ok(Some(instance.clone()));
            }
            let owner = match state.in_creation.get(name) {
                Some(owner) => *owner,
                None => return Ok(None),
            };
            if owner != me && !state.is_mid_creation(me) {
                return Ok(None);
            }
            if let Some(early) = state.early.get(name) {
                return Ok(Some(early.clone()));
            }
            if !allow_early_reference {
                return Ok(None);
            }
            match state.early_pending.get(name) {
                Some(invoker) if *invoker == me => {
                    return Err(ContainerError::CircularDependency {
                        bean: name.to_string(),
                        message: "early reference requested while its own early reference is being created"
                            .to_string(),
                    });
                }
                Some(_) => {
                    self.cond.wait(&mut state);
                    continue;
                }
                None => {}
            }
            return match state.factories.remove(name) {
                Some(factory) => self.invoke_early_factory(state, name, factory).map(Some),
                None => Ok(None),
            };
        }
    }

    fn invoke_early_factory(
        &self,
        mut state: MutexGuard<'_, State>,
        name: &str,
        factory: EarlyReferenceFactory,
    ) -> ContainerResult<BeanInstance> {
        let me = std::thread::current().id();
        state.early_pending.insert(name.to_string(), me);
        drop(state);

        tracing::trace!("Obtaining early reference for singleton '{}'", name);
        let result = factory();

        let mut state = self.state.lock();
        state.early_pending.remove(name);
        if let Ok(early) = &result {
            if !state.singletons.contains_key(name) {
                state.early.insert(name.to_string(), early.clone());
            }
        }
        drop(state);
        self.cond.notify_all();
        result
    }

    /// 返回已存在的单例，否则在当前线程创建
    ///
    /// 同名单例的并发请求只有一个线程执行 `create`，其他线程阻塞等待结果。
    /// 失败的创建不会被缓存。
    pub fn get_or_create<F>(&self, name: &str, create: F) -> ContainerResult<BeanInstance>
    where
        F: FnOnce() -> ContainerResult<BeanInstance>,
    {
        let me = std::thread::current().id();
        let mut state = self.state.lock();
        loop {
            if let Some(instance) = state.singletons.get(name) {
                return Ok(instance.clone());
            }
            if state.in_destruction {
                return Err(ContainerError::CreationNotAllowed {
                    name: name.to_string(),
                });
            }
            let owner = match state.in_creation.get(name) {
                None => break,
                Some(owner) => *owner,
            };
            if owner == me {
                return Err(ContainerError::CircularDependency {
                    bean: name.to_string(),
                    message: format!("'{}' is already being created by the current thread", name),
                });
            }
            if state.is_mid_creation(me) {
                if let Some(early) = state.early.get(name) {
                    return Ok(early.clone());
                }
                if let Some(factory) = state.factories.remove(name) {
                    return self.invoke_early_factory(state, name, factory);
                }
            }
            if let Some(path) = state.wait_would_deadlock(name, me) {
                return Err(ContainerError::CircularDependency {
                    bean: name.to_string(),
                    message: format!("cross-thread creation cycle: {}", path.join(" -> ")),
                });
            }

            tracing::trace!("Waiting for singleton '{}' created by another thread", name);
            state.waiting.insert(me, name.to_string());
            self.cond.wait(&mut state);
            state.waiting.remove(&me);
        }

        state.in_creation.insert(name.to_string(), me);
        drop(state);
        let guard = CreationGuard {
            registry: self,
            name: name.to_string(),
        };

        tracing::debug!("Creating shared instance of singleton bean '{}'", name);
        let instance = create()?;

        self.state.lock().add_singleton(name, instance.clone());
        drop(guard);
        Ok(instance)
    }

    /// 注册早期引用工厂
    pub fn add_singleton_factory(&self, name: &str, factory: EarlyReferenceFactory) {
        let mut state = self.state.lock();
        if !state.singletons.contains_key(name) {
            state.factories.insert(name.to_string(), factory);
            state.early.remove(name);
            if !state.registered.iter().any(|n| n == name) {
                state.registered.push(name.to_string());
            }
        }
        drop(state);
        self.cond.notify_all();
    }

    /// 手动注册一个已完成的单例
    pub fn register_singleton(&self, name: &str, instance: BeanInstance) -> ContainerResult<()> {
        let mut state = self.state.lock();
        if let Some(existing) = state.singletons.get(name) {
            return Err(ContainerError::BeanDefinitionStore {
                name: name.to_string(),
                reason: format!(
                    "could not register object [{:?}]: there is already object [{:?}] bound",
                    instance, existing
                ),
            });
        }
        state.add_singleton(name, instance);
        drop(state);
        self.cond.notify_all();
        Ok(())
    }

    pub fn contains_singleton(&self, name: &str) -> bool {
        self.state.lock().singletons.contains_key(name)
    }

    /// 已注册单例的名称（注册顺序）
    pub fn singleton_names(&self) -> Vec<String> {
        let state = self.state.lock();
        state
            .registered
            .iter()
            .filter(|n| state.singletons.contains_key(*n))
            .cloned()
            .collect()
    }

    pub fn singleton_count(&self) -> usize {
        self.state.lock().singletons.len()
    }

    pub fn is_currently_in_creation(&self, name: &str) -> bool {
        self.state.lock().in_creation.contains_key(name)
    }

    pub fn is_in_destruction(&self) -> bool {
        self.state.lock().in_destruction
    }

    /// 是否已有其他构造观察到该单例的早期引用
    pub fn has_early_reference(&self, name: &str) -> bool {
        self.state.lock().early.contains_key(name)
    }

    /// 从三级缓存中移除
    pub fn remove_singleton(&self, name: &str) {
        let mut state = self.state.lock();
        state.singletons.remove(name);
        state.early.remove(name);
        state.factories.remove(name);
        state.registered.retain(|n| n != name);
    }

    /// 记录依赖关系：`dependent` 依赖 `bean`
    pub fn register_dependent(&self, bean: &str, dependent: &str) {
        self.dependents
            .lock()
            .entry(bean.to_string())
            .or_default()
            .insert(dependent.to_string());
        self.dependencies
            .lock()
            .entry(dependent.to_string())
            .or_default()
            .insert(bean.to_string());
    }

    /// `dependent` 是否（直接或间接）依赖 `bean`
    pub fn is_dependent(&self, bean: &str, dependent: &str) -> bool {
        let dependents = self.dependents.lock();
        let mut seen = HashSet::new();
        let mut stack = vec![bean.to_string()];
        while let Some(current) = stack.pop() {
            if !seen.insert(current.clone()) {
                continue;
            }
            if let Some(direct) = dependents.get(&current) {
                if direct.contains(dependent) {
                    return true;
                }
                stack.extend(direct.iter().cloned());
            }
        }
        false
    }

    pub fn dependents_of(&self, bean: &str) -> Vec<String> {
        let mut names: Vec<String> = self
            .dependents
            .lock()
            .get(bean)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default();
        names.sort();
        names
    }

    pub fn dependencies_of(&self, bean: &str) -> Vec<String> {
        let mut names: Vec<String> = self
            .dependencies
            .lock()
            .get(bean)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default();
        names.sort();
        names
    }

    /// 记录内部 bean，外部 bean 销毁时一并销毁
    pub fn register_contained(&self, inner: &str, outer: &str) {
        self.contained
            .lock()
            .entry(outer.to_string())
            .or_default()
            .insert(inner.to_string());
        self.register_dependent(inner, outer);
    }

    pub fn register_disposable(&self, name: &str, callback: Arc<dyn DestructionCallback>) {
        let mut disposables = self.disposables.lock();
        disposables.retain(|(n, _)| n != name);
        disposables.push((name.to_string(), callback));
    }

    pub fn has_disposable(&self, name: &str) -> bool {
        self.disposables.lock().iter().any(|(n, _)| n == name)
    }

    /// 销毁所有单例：按注册的逆序，依赖者先于被依赖者
    pub fn destroy_singletons(&self) {
        tracing::debug!("Destroying singletons in {:p}", self);
        self.state.lock().in_destruction = true;

        let names: Vec<String> = self
            .disposables
            .lock()
            .iter()
            .map(|(n, _)| n.clone())
            .collect();
        for name in names.iter().rev() {
            self.destroy_singleton(name);
        }

        self.contained.lock().clear();
        self.dependents.lock().clear();
        self.dependencies.lock().clear();
        {
            let mut state = self.state.lock();
            state.singletons.clear();
            state.early.clear();
            state.factories.clear();
            state.registered.clear();
            state.in_destruction = false;
        }
        self.cond.notify_all();
    }

    /// 销毁单个单例（先销毁依赖它的 bean）
    pub fn destroy_singleton(&self, name: &str) {
        self.remove_singleton(name);
        let callback = {
            let mut disposables = self.disposables.lock();
            disposables
                .iter()
                .position(|(n, _)| n == name)
                .map(|index| disposables.remove(index).1)
        };
        self.destroy_bean(name, callback);
    }

    fn destroy_bean(&self, name: &str, callback: Option<Arc<dyn DestructionCallback>>) {
        let dependents = self.dependents.lock().remove(name);
        if let Some(dependents) = dependents {
            let mut dependents: Vec<String> = dependents.into_iter().collect();
            dependents.sort();
            tracing::trace!("Retrieved dependent beans for bean '{}': {:?}", name, dependents);
            for dependent in dependents {
                self.destroy_singleton(&dependent);
            }
        }

        if let Some(callback) = callback {
            if let Err(e) = callback.destroy() {
                tracing::warn!("Destruction of bean with name '{}' threw an exception: {:#}", name, e);
            }
        }

        let contained = self.contained.lock().remove(name);
        if let Some(contained) = contained {
            for inner in contained {
                self.destroy_singleton(&inner);
            }
        }

        {
            let mut dependents = self.dependents.lock();
            for set in dependents.values_mut() {
                set.remove(name);
            }
            dependents.retain(|_, set| !set.is_empty());
        }
        self.dependencies.lock().remove(name);
    }
}
