use std::collections::HashMap;
use std::fmt;
use std::thread::ThreadId;

use parking_lot::Mutex;

use crate::error::ContainerResult;
use crate::value::BeanInstance;

/// Bean 的作用域
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum Scope {
    /// 单例模式 - 容器中只有一个实例
    #[default]
    Singleton,

    /// 原型模式 - 每次请求都创建新实例
    Prototype,

    /// 自定义作用域 - 由注册的 [`ScopeHandler`] 管理
    Custom(String),
}

impl Scope {
    pub fn name(&self) -> &str {
        match self {
            Scope::Singleton => "singleton",
            Scope::Prototype => "prototype",
            Scope::Custom(name) => name,
        }
    }

    /// 从名称解析作用域
    pub fn parse(name: &str) -> Self {
        match name {
            "" | "singleton" => Scope::Singleton,
            "prototype" => Scope::Prototype,
            other => Scope::Custom(other.to_string()),
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// 自定义作用域的实现
pub trait ScopeHandler: Send + Sync {
    /// 返回作用域内的对象，不存在时调用 `create` 创建
    fn get(
        &self,
        name: &str,
        create: &dyn Fn() -> ContainerResult<BeanInstance>,
    ) -> ContainerResult<BeanInstance>;

    /// 从作用域中移除对象
    fn remove(&self, name: &str) -> Option<BeanInstance>;

    /// 注册对象销毁时的回调
    fn register_destruction_callback(&self, name: &str, _callback: Box<dyn FnOnce() + Send>) {
        tracing::warn!(
            "Scope does not support destruction callbacks; bean '{}' will not be destroyed",
            name
        );
    }

    /// 当前作用域实例的标识
    fn conversation_id(&self) -> Option<String> {
        None
    }
}

/// 线程作用域 - 每个线程持有自己的实例
#[derive(Default)]
pub struct SimpleThreadScope {
    objects: Mutex<HashMap<ThreadId, HashMap<String, BeanInstance>>>,
}

impl SimpleThreadScope {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ScopeHandler for SimpleThreadScope {
    fn get(
        &self,
        name: &str,
        create: &dyn Fn() -> ContainerResult<BeanInstance>,
    ) -> ContainerResult<BeanInstance> {
        let thread = std::thread::current().id();
        if let Some(existing) = self
            .objects
            .lock()
            .get(&thread)
            .and_then(|scoped| scoped.get(name))
        {
            return Ok(existing.clone());
        }

        let created = create()?;
        self.objects
            .lock()
            .entry(thread)
            .or_default()
            .insert(name.to_string(), created.clone());
        Ok(created)
    }

    fn remove(&self, name: &str) -> Option<BeanInstance> {
        let thread = std::thread::current().id();
        self.objects
            .lock()
            .get_mut(&thread)
            .and_then(|scoped| scoped.remove(name))
    }

    fn conversation_id(&self) -> Option<String> {
        Some(format!("{:?}", std::thread::current().id()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_scope_parse() {
        assert_eq!(Scope::parse("singleton"), Scope::Singleton);
        assert_eq!(Scope::parse("prototype"), Scope::Prototype);
        assert_eq!(Scope::parse("thread"), Scope::Custom("thread".to_string()));
        assert_eq!(Scope::Custom("thread".to_string()).to_string(), "thread");
    }

    #[test]
    fn test_thread_scope_isolates_threads() {
        let scope = Arc::new(SimpleThreadScope::new());
        let counter = Arc::new(AtomicUsize::new(0));

        let create = {
            let counter = counter.clone();
            move || -> ContainerResult<BeanInstance> {
                Ok(BeanInstance::new(counter.fetch_add(1, Ordering::SeqCst)))
            }
        };

        let first = scope.get("bean", &create).unwrap();
        let again = scope.get("bean", &create).unwrap();
        assert!(first.same_instance(&again));

        let other = {
            let scope = scope.clone();
            let create = create.clone();
            std::thread::spawn(move || scope.get("bean", &create).unwrap())
                .join()
                .unwrap()
        };
        assert!(!first.same_instance(&other));
        assert_eq!(counter.load(Ordering::SeqCst), 2);

        assert!(scope.remove("bean").is_some());
        assert!(scope.remove("bean").is_none());
    }
}
