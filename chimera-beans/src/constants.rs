/// 容器常量定义
///
/// 容器内部名称、前缀和注册给自身的组件名称，确保工厂、上下文和组件扫描使用相同的标识符

/// 以此前缀请求 Bean 时返回 FactoryBean 本身而不是它的产品
pub const FACTORY_BEAN_PREFIX: &str = "&";

/// 生成的 Bean 名称中的分隔符，例如内部 Bean `app.Widget#0`
pub const GENERATED_BEAN_NAME_SEPARATOR: &str = "#";

/// 内部 Bean 名称前缀
pub const INNER_BEAN_PREFIX: &str = "(inner bean)";

/// Environment 注册为单例时使用的名称
pub const ENVIRONMENT_BEAN_NAME: &str = "environment";

/// 作用域名称
pub const SCOPE_SINGLETON: &str = "singleton";
pub const SCOPE_PROTOTYPE: &str = "prototype";
pub const SCOPE_THREAD: &str = "thread";

/// 检查名称是否为容器生成的内部 Bean 名称
///
/// # Example
/// ```
/// use chimera_beans::constants::is_inner_bean_name;
///
/// assert!(is_inner_bean_name("(inner bean)#widget#0"));
/// assert!(!is_inner_bean_name("widget"));
/// ```
pub fn is_inner_bean_name(name: &str) -> bool {
    name.starts_with(INNER_BEAN_PREFIX)
}
