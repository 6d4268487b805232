use std::any::Any;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use chimera_beans::instantiation::MethodOverrideSlot;
use chimera_beans::prelude::*;
use chimera_beans::{LifecyclePhase, MethodOverride, MethodReplacer, SimpleThreadScope};
use parking_lot::Mutex;

struct Connector;

#[test]
fn failing_init_method_leaves_no_singleton() {
    let factory = DefaultListableBeanFactory::new();
    factory.register_type(
        BeanType::<Connector>::new()
            .constructor(|| Connector)
            .method("connect", |_: &Connector| Err(anyhow!("connection refused")))
            .build(),
    );
    factory
        .register_bean_definition("connector", BeanDefinition::of::<Connector>().with_init_method("connect"))
        .unwrap();

    let err = factory.get_bean("connector").unwrap_err();
    match &err {
        ContainerError::LifecyclePhase { bean, phase, .. } => {
            assert_eq!(bean, "connector");
            assert_eq!(*phase, LifecyclePhase::Initialized);
        }
        other => panic!("expected lifecycle error, got {:?}", other),
    }
    assert!(err.to_string().contains("init method 'connect' failed"), "{}", err);
    assert!(!factory.contains_singleton("connector"));

    // 失败不会被缓存，下一次请求重新尝试创建
    assert!(factory.get_bean("connector").is_err());
}

struct Engine;

struct Car {
    engine: Mutex<Option<Arc<Engine>>>,
}

fn car_factory() -> Arc<DefaultListableBeanFactory> {
    let factory = DefaultListableBeanFactory::new();
    factory.register_type(BeanType::<Engine>::new().constructor(|| Engine).build());
    factory.register_type(
        BeanType::<Car>::new()
            .constructor(|| Car { engine: Mutex::new(None) })
            .property("engine", |c: &Car, engine: Arc<Engine>| *c.engine.lock() = Some(engine))
            .build(),
    );
    factory
        .register_bean_definition("car", BeanDefinition::of::<Car>().with_autowire(AutowireMode::ByType))
        .unwrap();
    factory
}

#[test]
fn by_type_autowiring_without_candidate_is_unsatisfied() {
    let factory = car_factory();

    let err = factory.get_bean("car").unwrap_err();
    let cause = err.find_cause(|e| matches!(e, ContainerError::UnsatisfiedDependency { .. }));
    match cause {
        Some(ContainerError::UnsatisfiedDependency { bean, injection_point, .. }) => {
            assert_eq!(bean, "car");
            assert!(injection_point.contains("engine"), "{}", injection_point);
        }
        _ => panic!("expected unsatisfied dependency, got {}", err),
    }
    assert!(!factory.contains_singleton("car"));
}

#[test]
fn by_type_autowiring_records_dependency_edge() {
    let factory = car_factory();
    factory
        .register_bean_definition("v8", BeanDefinition::of::<Engine>())
        .unwrap();

    let car = factory.get_bean_typed::<Car>("car").unwrap();
    let engine = factory.get_bean_typed::<Engine>("v8").unwrap();
    assert!(Arc::ptr_eq(car.engine.lock().as_ref().unwrap(), &engine));
    assert_eq!(factory.dependents_of("v8"), vec!["car".to_string()]);
    assert_eq!(factory.dependencies_of("car"), vec!["v8".to_string()]);
}

struct Slow;

#[test]
fn singleton_is_created_once_under_contention() {
    let constructions = Arc::new(AtomicUsize::new(0));
    let counter = constructions.clone();

    let factory = DefaultListableBeanFactory::new();
    factory.register_type(
        BeanType::<Slow>::new()
            .constructor(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                thread::sleep(Duration::from_millis(20));
                Slow
            })
            .build(),
    );
    factory
        .register_bean_definition("slow", BeanDefinition::of::<Slow>())
        .unwrap();

    let barrier = Arc::new(Barrier::new(8));
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let factory = factory.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                factory.get_bean_typed::<Slow>("slow").unwrap()
            })
        })
        .collect();
    let results: Vec<Arc<Slow>> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert_eq!(constructions.load(Ordering::SeqCst), 1);
    assert!(results.windows(2).all(|pair| Arc::ptr_eq(&pair[0], &pair[1])));
}

#[derive(Default)]
struct EventLog {
    entries: Mutex<Vec<String>>,
}

struct Resource {
    name: String,
    log: Arc<EventLog>,
}

impl DisposableBean for Resource {
    fn destroy(&self) -> anyhow::Result<()> {
        self.log.entries.lock().push(format!("destroy:{}", self.name));
        Ok(())
    }
}

#[test]
fn dependents_are_destroyed_before_their_dependencies() {
    let log = Arc::new(EventLog::default());
    let factory = DefaultListableBeanFactory::new();
    factory.register_type(
        BeanType::<Resource>::new()
            .constructor(|name: String, log: Arc<EventLog>| Resource { name, log })
            .method("close", |r: &Resource| {
                r.log.entries.lock().push(format!("close:{}", r.name));
                Ok(())
            })
            .implements::<dyn DisposableBean>(|r| r)
            .build(),
    );
    factory
        .register_singleton("eventLog", BeanInstance::from_arc(log.clone()))
        .unwrap();
    factory
        .register_bean_definition(
            "pool",
            BeanDefinition::of::<Resource>()
                .with_arg("pool")
                .with_arg(BeanValue::reference("eventLog"))
                .with_destroy_method("close"),
        )
        .unwrap();
    factory
        .register_bean_definition(
            "repo",
            BeanDefinition::of::<Resource>()
                .with_arg("repo")
                .with_arg(BeanValue::reference("eventLog"))
                .with_depends_on(&["pool"]),
        )
        .unwrap();

    factory.get_bean("repo").unwrap();
    factory.destroy_singletons();

    assert_eq!(
        *log.entries.lock(),
        vec!["destroy:repo", "destroy:pool", "close:pool"]
    );
    assert!(factory.singleton_names().is_empty());
}

struct Connection {
    url: String,
}

struct ConnectionFactoryBean {
    url: String,
}

impl FactoryBean for ConnectionFactoryBean {
    fn get_object(&self) -> anyhow::Result<BeanInstance> {
        Ok(BeanInstance::new(Connection { url: self.url.clone() }))
    }

    fn object_type(&self) -> Option<TypeKey> {
        Some(TypeKey::of::<Connection>())
    }
}

struct Dao {
    connection: Arc<Connection>,
}

#[test]
fn factory_bean_product_is_injected_by_type() {
    let factory = DefaultListableBeanFactory::new();
    factory.register_type(
        BeanType::<ConnectionFactoryBean>::new()
            .constructor(|url: String| ConnectionFactoryBean { url })
            .implements::<dyn FactoryBean>(|f| f)
            .build(),
    );
    factory.register_type(
        BeanType::<Dao>::new()
            .constructor(|connection: Arc<Connection>| Dao { connection })
            .build(),
    );
    factory
        .register_bean_definition(
            "connection",
            BeanDefinition::of::<ConnectionFactoryBean>().with_arg("mem://orders"),
        )
        .unwrap();
    factory
        .register_bean_definition("dao", BeanDefinition::of::<Dao>().with_autowire(AutowireMode::Constructor))
        .unwrap();

    let dao = factory.get_bean_typed::<Dao>("dao").unwrap();
    assert_eq!(dao.connection.url, "mem://orders");
    assert!(factory.get_bean_typed::<ConnectionFactoryBean>("&connection").is_ok());
    assert!(Arc::ptr_eq(
        &dao.connection,
        &factory.get_bean_typed::<Connection>("connection").unwrap()
    ));
}

struct Cart {
    id: usize,
}

struct Checkout {
    overrides: MethodOverrideSlot,
}

impl Checkout {
    fn cart(&self) -> Option<Arc<Cart>> {
        self.overrides.lookup::<Cart>("cart").and_then(Result::ok)
    }
}

#[test]
fn lookup_method_returns_fresh_prototypes() {
    let ids = Arc::new(AtomicUsize::new(0));
    let next = ids.clone();

    let factory = DefaultListableBeanFactory::new();
    factory.register_type(
        BeanType::<Cart>::new()
            .constructor(move || Cart {
                id: next.fetch_add(1, Ordering::SeqCst),
            })
            .build(),
    );
    factory.register_type(
        BeanType::<Checkout>::new()
            .constructor(|| Checkout {
                overrides: MethodOverrideSlot::new(),
            })
            .method_injection(|c| &c.overrides, &["cart"])
            .build(),
    );
    factory
        .register_bean_definition("cart", BeanDefinition::of::<Cart>().with_scope(Scope::Prototype))
        .unwrap();
    factory
        .register_bean_definition(
            "checkout",
            BeanDefinition::of::<Checkout>().with_method_override(MethodOverride::Lookup {
                method: "cart".to_string(),
                bean_name: Some("cart".to_string()),
            }),
        )
        .unwrap();

    let checkout = factory.get_bean_typed::<Checkout>("checkout").unwrap();
    let first = checkout.cart().unwrap();
    let second = checkout.cart().unwrap();
    assert_ne!(first.id, second.id);
}

struct Pricing {
    overrides: MethodOverrideSlot,
    margin: i64,
}

impl Pricing {
    fn quote(&self, base: i64) -> anyhow::Result<i64> {
        match self.overrides.replace(self, "quote", vec![Value::Int(base)]) {
            Some(result) => match result? {
                Value::Int(v) => Ok(v),
                other => Err(anyhow!("unexpected quote {:?}", other)),
            },
            None => Ok(base + self.margin),
        }
    }
}

struct DoublePricing;

impl MethodReplacer for DoublePricing {
    fn reimplement(&self, target: &(dyn Any + Send + Sync), _method: &str, args: Vec<Value>) -> anyhow::Result<Value> {
        let pricing = target
            .downcast_ref::<Pricing>()
            .ok_or_else(|| anyhow!("not a pricing bean"))?;
        match args.first() {
            Some(Value::Int(base)) => Ok(Value::Int(base * 2 + pricing.margin)),
            _ => Err(anyhow!("missing base price")),
        }
    }
}

#[test]
fn replaced_method_is_dispatched_to_replacer_bean() {
    let factory = DefaultListableBeanFactory::new();
    factory.register_type(
        BeanType::<Pricing>::new()
            .constructor(|margin: i64| Pricing {
                overrides: MethodOverrideSlot::new(),
                margin,
            })
            .method_injection(|p| &p.overrides, &["quote"])
            .build(),
    );
    factory.register_type(
        BeanType::<DoublePricing>::new()
            .constructor(|| DoublePricing)
            .implements::<dyn MethodReplacer>(|r| r)
            .build(),
    );
    factory
        .register_bean_definition("doubler", BeanDefinition::of::<DoublePricing>())
        .unwrap();
    factory
        .register_bean_definition("plain", BeanDefinition::of::<Pricing>().with_arg(1))
        .unwrap();
    factory
        .register_bean_definition(
            "doubled",
            BeanDefinition::of::<Pricing>()
                .with_arg(1)
                .with_method_override(MethodOverride::Replace {
                    method: "quote".to_string(),
                    replacer_bean: "doubler".to_string(),
                }),
        )
        .unwrap();

    let plain = factory.get_bean_typed::<Pricing>("plain").unwrap();
    let doubled = factory.get_bean_typed::<Pricing>("doubled").unwrap();
    assert_eq!(plain.quote(10).unwrap(), 11);
    assert_eq!(doubled.quote(10).unwrap(), 21);
}

struct Session {
    serial: usize,
}

#[test]
fn thread_scope_keeps_one_instance_per_thread() {
    let serials = Arc::new(AtomicUsize::new(0));
    let next = serials.clone();

    let factory = DefaultListableBeanFactory::new();
    factory.register_scope("thread", Arc::new(SimpleThreadScope::new()));
    factory.register_type(
        BeanType::<Session>::new()
            .constructor(move || Session {
                serial: next.fetch_add(1, Ordering::SeqCst),
            })
            .build(),
    );
    factory
        .register_bean_definition(
            "session",
            BeanDefinition::of::<Session>().with_scope(Scope::Custom("thread".to_string())),
        )
        .unwrap();

    let here = factory.get_bean_typed::<Session>("session").unwrap();
    let again = factory.get_bean_typed::<Session>("session").unwrap();
    assert!(Arc::ptr_eq(&here, &again));

    let other = {
        let factory = factory.clone();
        thread::spawn(move || factory.get_bean_typed::<Session>("session").unwrap().serial)
            .join()
            .unwrap()
    };
    assert_ne!(here.serial, other);
    assert!(!factory.contains_singleton("session"));
}

#[test]
fn unregistered_scope_is_reported() {
    let factory = DefaultListableBeanFactory::new();
    factory.register_type(BeanType::<Session>::new().constructor(|| Session { serial: 0 }).build());
    factory
        .register_bean_definition(
            "session",
            BeanDefinition::of::<Session>().with_scope(Scope::Custom("conversation".to_string())),
        )
        .unwrap();

    let err = factory.get_bean("session").unwrap_err();
    assert!(
        err.find_cause(|e| matches!(e, ContainerError::NoSuchScope { .. })).is_some(),
        "{}",
        err
    );
}
