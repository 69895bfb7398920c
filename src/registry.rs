use crate::config::{parse_aliases, parse_names, RegistryConfig};
use crate::error::{BeanError, Failure, RegistryDroppedError};
use crate::factory::{
    CreateContext, FactoryBean, Product, PrototypeFactoryBean, SingletonFactoryBean,
    DEFAULT_MAX_FACTORY_NESTING,
};
use crate::Instance;
use std::any::{type_name, Any};
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::{Arc, Weak};
use tracing::{debug, info};

/// like `Class<T>` in java
pub struct BeanType<T>(PhantomData<fn() -> T>);

impl<T> Clone for BeanType<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for BeanType<T> {}

pub trait BeanTypeOf<T> {
    const BEAN_TYPE: BeanType<T>;
}

impl<T> BeanTypeOf<T> for T {
    const BEAN_TYPE: BeanType<T> = BeanType(PhantomData);
}

/// a factory bean told the name it is registered under
pub trait BeanNameAware {
    fn set_bean_name(&self, name: &str);
}

/// a factory bean handed the registry it belongs to.
/// it only gets a weak handle, the registry owns its factory beans
pub trait RegistryAware {
    fn set_registry(&self, registry: RegistryRef);
}

/// the storage of a built registry
struct RegistryInner {
    /// primary names and aliases share this table
    factory_beans: HashMap<String, Arc<dyn FactoryBean>>,
    primary_names: Vec<String>,
    aliases: HashMap<String, String>,
    max_factory_nesting: usize,
}

/// a name based, aliasable registry of factory beans.
/// it is built once by `RegistryBuilder` and never changes afterwards,
/// only singleton factory beans fill their caches
#[derive(Clone)]
pub struct Registry {
    inner: Arc<RegistryInner>,
}

impl Registry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    fn factory_bean(&self, name: &str) -> Result<&Arc<dyn FactoryBean>, BeanError> {
        self.inner
            .factory_beans
            .get(name)
            .ok_or_else(|| BeanError::NotFound(name.to_string()))
    }

    /// produce the bean registered under a name or alias.
    /// every failure while producing comes back as `CreationFailed`
    pub fn resolve(&self, name: &str) -> Result<Instance, BeanError> {
        self.factory_bean(name)?
            .produce()
            .map_err(|e| BeanError::CreationFailed {
                name: name.to_string(),
                source: Box::new(e),
            })
    }

    /// the method `resolve_typed` can be used to get a bean with its concrete type
    pub fn resolve_typed<T>(&self, _ty: BeanType<T>, name: &str) -> Result<Arc<T>, BeanError>
    where
        T: Any + Send + Sync,
    {
        self.resolve(name)?
            .downcast::<T>()
            .map_err(|_| BeanError::TypeMismatch {
                name: name.to_string(),
                expected: type_name::<T>(),
            })
    }

    /// ask the factory bean without producing anything
    pub fn is_singleton(&self, name: &str) -> Result<bool, BeanError> {
        Ok(self.factory_bean(name)?.is_singleton())
    }

    pub fn contains_bean(&self, name: &str) -> bool {
        self.inner.factory_beans.contains_key(name)
    }

    /// names beans were registered under, aliases excluded, in registration order
    pub fn bean_names(&self) -> &[String] {
        &self.inner.primary_names
    }

    /// the bean an alias points at
    pub fn alias_target(&self, alias: &str) -> Option<&str> {
        self.inner.aliases.get(alias).map(String::as_str)
    }

    pub fn max_factory_nesting(&self) -> usize {
        self.inner.max_factory_nesting
    }

    /// a weak handle which does not keep the registry alive
    pub fn downgrade(&self) -> RegistryRef {
        RegistryRef {
            inner: Arc::downgrade(&self.inner),
        }
    }
}

/// the weak reference of a registry, avoiding circular references between
/// the registry and the factory beans it owns
#[derive(Clone)]
pub struct RegistryRef {
    inner: Weak<RegistryInner>,
}

impl RegistryRef {
    /// acquire the registry, if it is dropped an error will be returned
    pub fn try_acquire(&self) -> Result<Registry, RegistryDroppedError> {
        self.inner
            .upgrade()
            .map(|inner| Registry { inner })
            .ok_or(RegistryDroppedError)
    }

    /// check whether the registry is still alive
    pub fn is_active(&self) -> bool {
        self.inner.strong_count() > 0
    }
}

/// collects registrations and bootstraps a `Registry`.
/// bootstrap runs in a fixed order: register primary beans, tell factory beans
/// their names and registry, register aliases, produce the eager beans
pub struct RegistryBuilder {
    factory_beans: HashMap<String, Arc<dyn FactoryBean>>,
    primary_names: Vec<String>,
    aliases: Vec<(String, String)>,
    eager_beans: Vec<String>,
    max_factory_nesting: usize,
}

impl Default for RegistryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self {
            factory_beans: HashMap::new(),
            primary_names: Vec::new(),
            aliases: Vec::new(),
            eager_beans: Vec::new(),
            max_factory_nesting: DEFAULT_MAX_FACTORY_NESTING,
        }
    }

    /// register a factory bean under a name.
    /// name aware factory beans are told their name right away
    pub fn register_factory_bean(
        self,
        name: impl Into<String>,
        factory_bean: impl FactoryBean + 'static,
    ) -> Result<Self, BeanError> {
        self.register_shared(name, Arc::new(factory_bean))
    }

    /// register a factory bean which may also be referenced elsewhere
    pub fn register_shared(
        mut self,
        name: impl Into<String>,
        factory_bean: Arc<dyn FactoryBean>,
    ) -> Result<Self, BeanError> {
        let name = name.into();
        if name.is_empty() {
            return Err(BeanError::InvalidConfiguration(
                "bean name must not be empty".to_string(),
            ));
        }
        if self.factory_beans.contains_key(&name) {
            return Err(BeanError::InvalidConfiguration(format!(
                "bean \"{name}\" is registered twice"
            )));
        }
        if let Some(aware) = factory_bean.bean_name_aware() {
            aware.set_bean_name(&name);
        }
        debug!(bean = %name, singleton = factory_bean.is_singleton(), "registered factory bean");
        self.factory_beans.insert(name.clone(), factory_bean);
        self.primary_names.push(name);
        Ok(self)
    }

    /// shortcut for registering a `SingletonFactoryBean`
    pub fn singleton<F>(self, name: impl Into<String>, f: F) -> Result<Self, BeanError>
    where
        F: Fn(&CreateContext<'_>) -> Result<Product, Failure> + Send + Sync + 'static,
    {
        self.register_factory_bean(name, SingletonFactoryBean::from_fn(f))
    }

    /// shortcut for registering a `PrototypeFactoryBean`
    pub fn prototype<F>(self, name: impl Into<String>, f: F) -> Result<Self, BeanError>
    where
        F: Fn(&CreateContext<'_>) -> Result<Product, Failure> + Send + Sync + 'static,
    {
        self.register_factory_bean(name, PrototypeFactoryBean::from_fn(f))
    }

    pub fn alias(mut self, alias: impl Into<String>, bean: impl Into<String>) -> Self {
        self.aliases.push((alias.into(), bean.into()));
        self
    }

    /// add aliases from a comma separated `alias=beanName` list
    pub fn aliases(mut self, aliases: &str) -> Result<Self, BeanError> {
        self.aliases.extend(parse_aliases(aliases)?);
        Ok(self)
    }

    pub fn eager(mut self, name: impl Into<String>) -> Self {
        self.eager_beans.push(name.into());
        self
    }

    /// add eager beans from a comma separated list of names
    pub fn eager_beans(mut self, names: &str) -> Self {
        self.eager_beans.extend(parse_names(names));
        self
    }

    pub fn max_factory_nesting(mut self, max: usize) -> Self {
        self.max_factory_nesting = max;
        self
    }

    /// apply the declarative part of a configuration
    pub fn with_config(self, config: &RegistryConfig) -> Result<Self, BeanError> {
        Ok(self
            .aliases(&config.aliases)?
            .eager_beans(&config.eager_beans)
            .max_factory_nesting(config.max_factory_nesting))
    }

    /// aliases may point at beans or at aliases declared before them
    fn resolve_aliases(&self) -> Result<HashMap<String, String>, BeanError> {
        let mut resolved: HashMap<String, String> = HashMap::new();
        for (alias, bean) in &self.aliases {
            if alias.is_empty() || bean.is_empty() {
                return Err(BeanError::InvalidConfiguration(format!(
                    "alias \"{alias}={bean}\" has an empty side"
                )));
            }
            if self.factory_beans.contains_key(alias) || resolved.contains_key(alias) {
                return Err(BeanError::InvalidConfiguration(format!(
                    "alias \"{alias}\" shadows an existing bean or alias"
                )));
            }
            let target = if self.factory_beans.contains_key(bean) {
                bean.clone()
            } else if let Some(target) = resolved.get(bean) {
                target.clone()
            } else {
                return Err(BeanError::InvalidConfiguration(format!(
                    "alias \"{alias}\" refers to unknown bean \"{bean}\""
                )));
            };
            resolved.insert(alias.clone(), target);
        }
        Ok(resolved)
    }

    /// bootstrap the registry, then produce and throw away every eager bean
    pub fn build(self) -> Result<Registry, BeanError> {
        if self.max_factory_nesting == 0 {
            return Err(BeanError::InvalidConfiguration(
                "max_factory_nesting must be at least 1".to_string(),
            ));
        }
        let aliases = self.resolve_aliases()?;
        let RegistryBuilder {
            mut factory_beans,
            primary_names,
            eager_beans,
            max_factory_nesting,
            ..
        } = self;

        let inner = Arc::new_cyclic(|weak: &Weak<RegistryInner>| {
            for name in &primary_names {
                let factory_bean = &factory_beans[name];
                if let Some(aware) = factory_bean.bean_name_aware() {
                    aware.set_bean_name(name);
                }
                if let Some(aware) = factory_bean.registry_aware() {
                    aware.set_registry(RegistryRef {
                        inner: weak.clone(),
                    });
                }
            }
            for (alias, bean) in &aliases {
                let shared = factory_beans[bean].clone();
                debug!(alias = %alias, bean = %bean, "registered alias");
                factory_beans.insert(alias.clone(), shared);
            }
            RegistryInner {
                factory_beans,
                primary_names,
                aliases,
                max_factory_nesting,
            }
        });
        let registry = Registry { inner };

        for name in &eager_beans {
            let _ = registry.resolve(name)?;
            if cfg!(debug_assertions) && !registry.is_singleton(name)? {
                return Err(BeanError::InvalidConfiguration(format!(
                    "the bean \"{name}\" must be a singleton to be loaded eagerly"
                )));
            }
        }

        info!(
            beans = registry.inner.primary_names.len(),
            aliases = registry.inner.aliases.len(),
            eager = eager_beans.len(),
            "bean registry built"
        );
        Ok(registry)
    }
}
