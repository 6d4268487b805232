//! 单例销毁适配器
//!
//! 把销毁钩子、[`DisposableBean`] 回调和自定义 destroy 方法合并成一个销毁回调，
//! 按这个顺序执行；某一步失败时记录警告并继续执行后续步骤。

use std::sync::Arc;

use crate::bean_post_processor::{BeanPostProcessor, Capability, ProcessorCache};
use crate::error::{ContainerError, ContainerResult};
use crate::lifecycle::DisposableBean;
use crate::metadata::TypeCatalog;
use crate::singleton_registry::DestructionCallback;
use crate::value::BeanInstance;

pub struct DisposableBeanAdapter {
    bean_name: String,
    bean: BeanInstance,
    catalog: Arc<TypeCatalog>,
    destroy_method: Option<String>,
    processors: Vec<Arc<dyn BeanPostProcessor>>,
}

impl DisposableBeanAdapter {
    /// 没有任何需要执行的销毁逻辑时返回 `Ok(None)`
    ///
    /// `enforce` 为 true 时（显式声明的 destroy 方法），方法不存在视为定义错误
    pub fn new(
        bean_name: &str,
        bean: BeanInstance,
        catalog: Arc<TypeCatalog>,
        destroy_method: Option<String>,
        enforce: bool,
        processors: &ProcessorCache,
    ) -> ContainerResult<Option<Self>> {
        let disposable = catalog.view::<dyn DisposableBean>(&bean).is_some();
        let meta = catalog.get(bean.type_key());

        let destroy_method = match destroy_method {
            Some(method) if disposable && method == "destroy" => None,
            Some(method) => {
                let exists = meta.as_ref().is_some_and(|meta| meta.has_method(&method));
                if exists {
                    Some(method)
                } else if enforce {
                    return Err(ContainerError::BeanDefinitionStore {
                        name: bean_name.to_string(),
                        reason: format!("could not find a destroy method named '{}' on bean with name '{}'", method, bean_name),
                    });
                } else {
                    None
                }
            }
            None => None,
        };

        let processors: Vec<Arc<dyn BeanPostProcessor>> = processors
            .get(Capability::Destruction)
            .iter()
            .filter(|p| p.requires_destruction(&bean))
            .cloned()
            .collect();

        if !disposable && destroy_method.is_none() && processors.is_empty() {
            return Ok(None);
        }
        Ok(Some(Self {
            bean_name: bean_name.to_string(),
            bean,
            catalog,
            destroy_method,
            processors,
        }))
    }

    pub fn bean_name(&self) -> &str {
        &self.bean_name
    }

    /// 执行全部销毁步骤，返回第一个错误
    pub fn run(&self) -> anyhow::Result<()> {
        let mut first_error: Option<anyhow::Error> = None;
        let mut record = |error: anyhow::Error| {
            tracing::warn!("Destruction step of bean '{}' failed: {:#}", self.bean_name, error);
            first_error.get_or_insert(error);
        };

        for processor in &self.processors {
            if let Err(e) = processor.post_process_before_destruction(&self.bean, &self.bean_name) {
                record(anyhow::Error::new(e).context(format!("destruction hook '{}' failed", processor.name())));
            }
        }

        if let Some(disposable) = self.catalog.view::<dyn DisposableBean>(&self.bean) {
            tracing::trace!("Invoking destroy() on bean with name '{}'", self.bean_name);
            if let Err(e) = disposable.destroy() {
                record(e.context("destroy() threw exception"));
            }
        }

        if let Some(method) = &self.destroy_method {
            tracing::trace!("Invoking destroy method '{}' on bean with name '{}'", method, self.bean_name);
            let result = self
                .catalog
                .get(self.bean.type_key())
                .and_then(|meta| meta.invoke_method(method, &self.bean));
            if let Some(Err(e)) = result {
                record(e.context(format!("destroy method '{}' threw exception", method)));
            }
        }

        match first_error {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

impl DestructionCallback for DisposableBeanAdapter {
    fn destroy(&self) -> anyhow::Result<()> {
        self.run()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bean_post_processor::BeanPostProcessorRegistry;
    use crate::metadata::BeanType;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Pool {
        log: Mutex<Vec<&'static str>>,
    }

    impl DisposableBean for Pool {
        fn destroy(&self) -> anyhow::Result<()> {
            self.log.lock().push("destroy");
            Ok(())
        }
    }

    fn catalog() -> Arc<TypeCatalog> {
        let catalog = Arc::new(TypeCatalog::new());
        catalog.register(
            BeanType::<Pool>::new()
                .constructor(Pool::default)
                .method("close", |p: &Pool| {
                    p.log.lock().push("close");
                    anyhow::bail!("close failed")
                })
                .implements::<dyn DisposableBean>(|p| p)
                .build(),
        );
        catalog
    }

    #[test]
    fn test_runs_every_step_and_reports_first_error() {
        let pool = Arc::new(Pool::default());
        let adapter = DisposableBeanAdapter::new(
            "pool",
            BeanInstance::from_arc(pool.clone()),
            catalog(),
            Some("close".to_string()),
            true,
            &BeanPostProcessorRegistry::new().snapshot(),
        )
        .unwrap()
        .unwrap();

        assert!(adapter.run().is_err());
        assert_eq!(*pool.log.lock(), vec!["destroy", "close"]);
    }

    #[test]
    fn test_missing_destroy_method() {
        let empty = BeanPostProcessorRegistry::new().snapshot();
        let bean = BeanInstance::new(Pool::default());

        let enforced = DisposableBeanAdapter::new("pool", bean.clone(), catalog(), Some("shutdown".into()), true, &empty);
        assert!(matches!(enforced, Err(ContainerError::BeanDefinitionStore { .. })));

        let inferred = DisposableBeanAdapter::new("pool", bean, catalog(), Some("shutdown".into()), false, &empty)
            .unwrap()
            .unwrap();
        assert!(inferred.destroy_method.is_none());
    }

    #[test]
    fn test_nothing_to_do() {
        struct Plain;
        let adapter = DisposableBeanAdapter::new(
            "plain",
            BeanInstance::new(Plain),
            Arc::new(TypeCatalog::new()),
            None,
            false,
            &BeanPostProcessorRegistry::new().snapshot(),
        )
        .unwrap();
        assert!(adapter.is_none());
    }
}
