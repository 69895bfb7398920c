use crate::error::{BeanError, Failure};
use crate::registry::{BeanNameAware, BeanType, Registry, RegistryAware, RegistryRef};
use crate::Instance;
use once_cell::sync::OnceCell;
use std::any::Any;
use std::cell::{Cell, RefCell};
use std::fmt::{Debug, Formatter};
use std::sync::Arc;
use tracing::debug;

/// how many nested factories a factory bean may unwrap before its bean is reached
pub const DEFAULT_MAX_FACTORY_NESTING: usize = 32;

/// a capability producing bean instances and reporting their lifecycle
pub trait FactoryBean: Send + Sync {
    fn produce(&self) -> Result<Instance, BeanError>;

    fn is_singleton(&self) -> bool;

    /// factory beans that want to know the name they are registered under
    fn bean_name_aware(&self) -> Option<&dyn BeanNameAware> {
        None
    }

    /// factory beans that want a handle to the registry holding them
    fn registry_aware(&self) -> Option<&dyn RegistryAware> {
        None
    }
}

/// what a creator hands back: either the bean itself, or another factory
/// whose product is the bean
#[derive(Clone)]
pub enum Product {
    Bean(Instance),
    Factory(Arc<dyn FactoryBean>),
}

impl Product {
    pub fn bean<T>(bean: T) -> Self
    where
        T: Any + Send + Sync,
    {
        Product::Bean(Arc::new(bean))
    }

    pub fn factory(factory: impl FactoryBean + 'static) -> Self {
        Product::Factory(Arc::new(factory))
    }
}

impl Debug for Product {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Product::Bean(_) => write!(f, "`bean`"),
            Product::Factory(_) => write!(f, "`factory bean`"),
        }
    }
}

/// what a creator may know about the bean it is building
pub struct CreateContext<'a> {
    bean_name: &'a str,
    registry: Option<&'a RegistryRef>,
}

impl<'a> CreateContext<'a> {
    pub fn bean_name(&self) -> &str {
        self.bean_name
    }

    /// the registry holding this bean, if it was registered in one that is still alive
    pub fn registry(&self) -> Result<Registry, Failure> {
        let registry = self.registry.ok_or_else(|| {
            BeanError::InvalidConfiguration(format!(
                "bean \"{}\" is not registered in any registry",
                self.bean_name
            ))
        })?;
        Ok(registry.try_acquire()?)
    }

    /// resolve a bean reference
    pub fn resolve(&self, name: &str) -> Result<Instance, Failure> {
        Ok(self.registry()?.resolve(name)?)
    }

    pub fn resolve_typed<T>(&self, ty: BeanType<T>, name: &str) -> Result<Arc<T>, Failure>
    where
        T: Any + Send + Sync,
    {
        Ok(self.registry()?.resolve_typed(ty, name)?)
    }
}

/// the overridable steps of building a bean
pub trait BeanCreator: Send + Sync {
    fn create(&self, ctx: &CreateContext<'_>) -> Result<Product, Failure>;

    /// runs once `create` returned, before nested factories are unwrapped
    fn post_create(&self, _product: &Product, _ctx: &CreateContext<'_>) -> Result<(), Failure> {
        Ok(())
    }
}

/// basic wrapper for a single function
pub struct FnCreator<F>
where
    F: Fn(&CreateContext<'_>) -> Result<Product, Failure>,
{
    f: F,
}

impl<F> FnCreator<F>
where
    F: Fn(&CreateContext<'_>) -> Result<Product, Failure>,
{
    pub fn wrap(f: F) -> Self {
        Self { f }
    }
}

impl<F> BeanCreator for FnCreator<F>
where
    F: Fn(&CreateContext<'_>) -> Result<Product, Failure> + Send + Sync,
{
    fn create(&self, ctx: &CreateContext<'_>) -> Result<Product, Failure> {
        (self.f)(ctx)
    }
}

thread_local! {
    /// factory beans producing on the current thread, checked for cycles
    static CREATION_STACK: RefCell<Vec<usize>> = RefCell::new(Vec::new());
    /// unwrap depth handed to the next factory bean entering on this thread
    static UNWRAP_DEPTH: Cell<Option<usize>> = Cell::new(None);
}

/// marks a factory bean as producing on the current thread
struct CreationGuard {
    /// how many nested factories were unwrapped to reach this one
    depth: usize,
}

impl CreationGuard {
    fn enter(id: usize, name: &str, max_nesting: usize) -> Result<Self, BeanError> {
        // beans resolved from inside a creator start over at depth 0
        let depth = UNWRAP_DEPTH.with(Cell::take).unwrap_or(0);
        CREATION_STACK.with(|stack| {
            let mut stack = stack.borrow_mut();
            if stack.contains(&id) {
                return Err(BeanError::CircularFactory(name.to_string()));
            }
            if depth >= max_nesting {
                return Err(BeanError::NestingTooDeep {
                    name: name.to_string(),
                    depth: max_nesting,
                });
            }
            stack.push(id);
            Ok(CreationGuard { depth })
        })
    }
}

impl Drop for CreationGuard {
    fn drop(&mut self) {
        CREATION_STACK.with(|stack| {
            stack.borrow_mut().pop();
        });
    }
}

/// set while a nested factory produces, so it enters one level deeper
struct Unwrapping;

impl Unwrapping {
    fn begin(depth: usize) -> Self {
        UNWRAP_DEPTH.with(|cell| cell.set(Some(depth)));
        Unwrapping
    }
}

impl Drop for Unwrapping {
    fn drop(&mut self) {
        // a cached singleton never enters, clear what it left unclaimed
        UNWRAP_DEPTH.with(|cell| cell.set(None));
    }
}

/// state shared by singleton and prototype factory beans
struct CreatorCore {
    creator: Box<dyn BeanCreator>,
    name: OnceCell<String>,
    registry: OnceCell<RegistryRef>,
}

impl CreatorCore {
    fn new(creator: Box<dyn BeanCreator>) -> Self {
        Self {
            creator,
            name: OnceCell::new(),
            registry: OnceCell::new(),
        }
    }

    fn name(&self) -> &str {
        self.name.get().map(String::as_str).unwrap_or("<unnamed>")
    }

    fn max_nesting(&self) -> usize {
        self.registry
            .get()
            .and_then(|r| r.try_acquire().ok())
            .map(|r| r.max_factory_nesting())
            .unwrap_or(DEFAULT_MAX_FACTORY_NESTING)
    }

    fn enter(&self, owner: *const ()) -> Result<CreationGuard, BeanError> {
        CreationGuard::enter(owner as usize, self.name(), self.max_nesting())
    }

    /// create, post-create, then unwrap a nested factory
    fn create_and_unwrap(&self, guard: &CreationGuard) -> Result<Instance, BeanError> {
        let ctx = CreateContext {
            bean_name: self.name(),
            registry: self.registry.get(),
        };
        let run = || -> Result<Instance, Failure> {
            let product = self.creator.create(&ctx)?;
            self.creator.post_create(&product, &ctx)?;
            match product {
                Product::Bean(bean) => Ok(bean),
                Product::Factory(factory) => {
                    self.lend_identity(factory.as_ref());
                    let _unwrapping = Unwrapping::begin(guard.depth + 1);
                    Ok(factory.produce()?)
                }
            }
        };
        run().map_err(BeanError::UnableToCreate)
    }

    /// a nested factory was never registered, it borrows our name and registry
    fn lend_identity(&self, nested: &dyn FactoryBean) {
        if let (Some(aware), Some(name)) = (nested.bean_name_aware(), self.name.get()) {
            aware.set_bean_name(name);
        }
        if let (Some(aware), Some(registry)) = (nested.registry_aware(), self.registry.get()) {
            aware.set_registry(registry.clone());
        }
    }

    fn set_bean_name(&self, name: &str) {
        if self.name.get().is_none() {
            let _ = self.name.set(name.to_string());
        }
    }

    fn set_registry(&self, registry: RegistryRef) {
        let _ = self.registry.set(registry);
    }
}

/// creates its bean on the first `produce` and hands out the cached instance afterwards.
/// a failed creation caches nothing, the next `produce` tries again
pub struct SingletonFactoryBean {
    core: CreatorCore,
    instance: OnceCell<Instance>,
}

impl SingletonFactoryBean {
    pub fn new(creator: impl BeanCreator + 'static) -> Self {
        Self {
            core: CreatorCore::new(Box::new(creator)),
            instance: OnceCell::new(),
        }
    }

    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(&CreateContext<'_>) -> Result<Product, Failure> + Send + Sync + 'static,
    {
        Self::new(FnCreator::wrap(f))
    }

    /// whether the bean was already created
    pub fn is_created(&self) -> bool {
        self.instance.get().is_some()
    }
}

impl FactoryBean for SingletonFactoryBean {
    fn produce(&self) -> Result<Instance, BeanError> {
        if let Some(instance) = self.instance.get() {
            return Ok(instance.clone());
        }
        // entering the cell while it initializes on this thread would deadlock
        let guard = self.core.enter(self as *const Self as *const ())?;
        let instance = self
            .instance
            .get_or_try_init(|| self.core.create_and_unwrap(&guard))?;
        debug!(bean = self.core.name(), "singleton bean created");
        Ok(instance.clone())
    }

    fn is_singleton(&self) -> bool {
        true
    }

    fn bean_name_aware(&self) -> Option<&dyn BeanNameAware> {
        Some(self)
    }

    fn registry_aware(&self) -> Option<&dyn RegistryAware> {
        Some(self)
    }
}

impl BeanNameAware for SingletonFactoryBean {
    fn set_bean_name(&self, name: &str) {
        self.core.set_bean_name(name);
    }
}

impl RegistryAware for SingletonFactoryBean {
    fn set_registry(&self, registry: RegistryRef) {
        self.core.set_registry(registry);
    }
}

/// creates a fresh bean on every `produce`
pub struct PrototypeFactoryBean {
    core: CreatorCore,
}

impl PrototypeFactoryBean {
    pub fn new(creator: impl BeanCreator + 'static) -> Self {
        Self {
            core: CreatorCore::new(Box::new(creator)),
        }
    }

    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(&CreateContext<'_>) -> Result<Product, Failure> + Send + Sync + 'static,
    {
        Self::new(FnCreator::wrap(f))
    }
}

impl FactoryBean for PrototypeFactoryBean {
    fn produce(&self) -> Result<Instance, BeanError> {
        let guard = self.core.enter(self as *const Self as *const ())?;
        self.core.create_and_unwrap(&guard)
    }

    fn is_singleton(&self) -> bool {
        false
    }

    fn bean_name_aware(&self) -> Option<&dyn BeanNameAware> {
        Some(self)
    }

    fn registry_aware(&self) -> Option<&dyn RegistryAware> {
        Some(self)
    }
}

impl BeanNameAware for PrototypeFactoryBean {
    fn set_bean_name(&self, name: &str) {
        self.core.set_bean_name(name);
    }
}

impl RegistryAware for PrototypeFactoryBean {
    fn set_registry(&self, registry: RegistryRef) {
        self.core.set_registry(registry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use thiserror::Error;

    #[derive(Error, Debug)]
    #[error("not yet")]
    struct NotYet;

    fn counting(counter: &Arc<AtomicUsize>) -> impl Fn(&CreateContext<'_>) -> Result<Product, Failure> {
        let counter = counter.clone();
        move |_| {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            Ok(Product::bean(n))
        }
    }

    #[test]
    fn singleton_creates_once() -> anyhow::Result<()> {
        let counter = Arc::new(AtomicUsize::new(0));
        let factory = SingletonFactoryBean::from_fn(counting(&counter));
        assert!(!factory.is_created());
        let first = factory.produce()?;
        let second = factory.produce()?;
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert!(factory.is_created());
        assert!(factory.is_singleton());
        Ok(())
    }

    #[test]
    fn prototype_creates_every_time() -> anyhow::Result<()> {
        let counter = Arc::new(AtomicUsize::new(0));
        let factory = PrototypeFactoryBean::from_fn(counting(&counter));
        let first = factory.produce()?;
        let second = factory.produce()?;
        let third = factory.produce()?;
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(third.downcast_ref::<usize>(), Some(&2));
        assert_eq!(counter.load(Ordering::SeqCst), 3);
        assert!(!factory.is_singleton());
        Ok(())
    }

    #[test]
    fn failed_creation_is_wrapped_and_retried() -> anyhow::Result<()> {
        let attempts = Arc::new(AtomicUsize::new(0));
        let seen = attempts.clone();
        let factory = SingletonFactoryBean::from_fn(move |_| {
            if seen.fetch_add(1, Ordering::SeqCst) == 0 {
                return Err(NotYet.into());
            }
            Ok(Product::bean("ready"))
        });

        let err = factory.produce().err();
        assert!(matches!(err, Some(BeanError::UnableToCreate(_))));
        assert!(err.as_ref().and_then(|e| e.root_cause_as::<NotYet>()).is_some());
        assert!(!factory.is_created());

        let bean = factory.produce()?;
        factory.produce()?;
        assert_eq!(bean.downcast_ref::<&str>(), Some(&"ready"));
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
        Ok(())
    }

    struct Recording(Arc<Mutex<Vec<&'static str>>>);

    impl BeanCreator for Recording {
        fn create(&self, _ctx: &CreateContext<'_>) -> Result<Product, Failure> {
            self.0.lock().expect("poisoned").push("create");
            let log = self.0.clone();
            Ok(Product::factory(PrototypeFactoryBean::from_fn(move |_| {
                log.lock().expect("poisoned").push("inner");
                Ok(Product::bean(5_u8))
            })))
        }

        fn post_create(&self, product: &Product, _ctx: &CreateContext<'_>) -> Result<(), Failure> {
            assert!(matches!(product, Product::Factory(_)));
            self.0.lock().expect("poisoned").push("post_create");
            Ok(())
        }
    }

    #[test]
    fn singleton_unwraps_nested_factory_after_post_create() -> anyhow::Result<()> {
        let log = Arc::new(Mutex::new(Vec::new()));
        let factory = SingletonFactoryBean::new(Recording(log.clone()));
        let first = factory.produce()?;
        let second = factory.produce()?;
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.downcast_ref::<u8>(), Some(&5));
        assert_eq!(*log.lock().expect("poisoned"), vec!["create", "post_create", "inner"]);
        Ok(())
    }

    #[test]
    fn factory_producing_itself_is_detected() {
        let slot: Arc<OnceCell<Arc<dyn FactoryBean>>> = Arc::new(OnceCell::new());
        let inner = slot.clone();
        let factory: Arc<dyn FactoryBean> = Arc::new(SingletonFactoryBean::from_fn(move |_| {
            let me = inner.get().cloned().ok_or(NotYet)?;
            Ok(Product::Factory(me))
        }));
        let _ = slot.set(factory.clone());

        let err = factory.produce().err();
        assert!(matches!(err, Some(BeanError::UnableToCreate(_))));
        assert!(matches!(
            err.as_ref().and_then(|e| e.root_cause_as::<BeanError>()),
            Some(BeanError::UnableToCreate(_))
        ));
        let cause = err.map(|e| e.to_string()).unwrap_or_default();
        assert!(cause.contains("while producing it"), "{cause}");
    }

    fn nested(levels: usize) -> PrototypeFactoryBean {
        PrototypeFactoryBean::from_fn(move |_| {
            if levels == 0 {
                Ok(Product::bean("leaf"))
            } else {
                Ok(Product::factory(nested(levels - 1)))
            }
        })
    }

    #[test]
    fn nesting_depth_is_bounded() -> anyhow::Result<()> {
        let shallow = nested(3).produce()?;
        assert_eq!(shallow.downcast_ref::<&str>(), Some(&"leaf"));

        let err = nested(DEFAULT_MAX_FACTORY_NESTING + 1).produce().err();
        let msg = err.map(|e| e.to_string()).unwrap_or_default();
        assert!(msg.contains("nests more than"), "{msg}");
        Ok(())
    }

    #[test]
    fn context_without_registry_cannot_resolve() {
        let factory = PrototypeFactoryBean::from_fn(|ctx| {
            let dep = ctx.resolve("dao")?;
            Ok(Product::Bean(dep))
        });
        factory.set_bean_name("service");
        let err = factory.produce().err().map(|e| e.to_string()).unwrap_or_default();
        assert!(err.contains("\"service\" is not registered"), "{err}");
    }
}
