//! 组件扫描
//!
//! 组件在编译期通过 `inventory` 提交 [`ComponentRegistration`]，
//! [`scan_components`] 把它们的类型元数据和 Bean 定义注册到工厂。

use crate::bean::BeanDefinition;
use crate::bean_factory::{ConfigurableBeanFactory, DefaultListableBeanFactory};
use crate::error::ContainerResult;
use crate::metadata::TypeMetadata;
use crate::utils::naming::to_camel_case;

/// 组件注册项 - 用于 inventory 收集
pub struct ComponentRegistration {
    /// Bean 名称，为空时使用类型短名的 camelCase 形式
    pub name: fn() -> &'static str,
    pub bean_type: fn() -> TypeMetadata,
    pub definition: fn() -> BeanDefinition,
}

inventory::collect!(ComponentRegistration);

/// 可以自动注册到容器的组件
///
/// ```ignore
/// struct UserService {
///     repository: Arc<UserRepository>,
/// }
///
/// impl Component for UserService {
///     fn bean_type() -> TypeMetadata {
///         BeanType::<UserService>::new()
///             .constructor(|repository: Arc<UserRepository>| UserService { repository })
///             .build()
///     }
///
///     fn definition() -> BeanDefinition {
///         BeanDefinition::of::<UserService>().with_autowire(AutowireMode::Constructor)
///     }
/// }
///
/// chimera_beans::component!(UserService);
/// ```
pub trait Component: Send + Sync + 'static {
    /// Bean 名称，默认由类型名推导
    fn bean_name() -> &'static str {
        ""
    }

    fn bean_type() -> TypeMetadata;

    fn definition() -> BeanDefinition {
        BeanDefinition::of::<Self>()
    }
}

/// 提交一个实现了 [`Component`] 的类型
#[macro_export]
macro_rules! component {
    ($ty:ty) => {
        $crate::inventory::submit! {
            $crate::component::ComponentRegistration {
                name: <$ty as $crate::component::Component>::bean_name,
                bean_type: <$ty as $crate::component::Component>::bean_type,
                definition: <$ty as $crate::component::Component>::definition,
            }
        }
    };
}

/// 注册所有已提交的组件，返回注册数量
pub fn scan_components(factory: &DefaultListableBeanFactory) -> ContainerResult<usize> {
    let components: Vec<_> = inventory::iter::<ComponentRegistration>().collect();
    let total = components.len();
    if total == 0 {
        tracing::debug!("No components submitted for scanning");
        return Ok(0);
    }
    tracing::info!("Found {} component(s) to register", total);

    for (idx, component) in components.iter().enumerate() {
        let meta = factory.register_type((component.bean_type)());
        let name = match (component.name)() {
            "" => to_camel_case(meta.key().short_name()),
            name => name.to_string(),
        };
        tracing::debug!("Registering component [{}/{}]: '{}' ({})", idx + 1, total, name, meta.name());

        factory
            .register_bean_definition(&name, (component.definition)())
            .inspect_err(|e| tracing::error!("Failed to register component '{}': {}", name, e))?;
    }

    tracing::info!("Component scan completed, registered {} bean(s)", total);
    Ok(total)
}
