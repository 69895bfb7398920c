//! A bean registry with method interception, like `BeanFactory` plus AOP proxies in SpringBoot.
//!
//! Beans are produced by named factory beans, either singleton (created once and cached)
//! or prototype (created on every request). A `Registry` is bootstrapped once from those
//! factory beans, an alias list and an eager bean list, and is read only afterwards.
//!
//! Proxies route every intercepted call through an `InterceptorChain`: the advices attached
//! to the method run in the order they were added, each wrapping the ones after it, and the
//! last link calls the real method on the target.

pub mod aop;
mod config;
mod error;
mod factory;
mod registry;

use std::any::Any;
use std::sync::Arc;

pub use crate::config::{parse_aliases, parse_names, RegistryConfig, CONFIG_ENV_PREFIX};
pub use crate::error::{BeanError, ChainError, Failure, RegistryDroppedError};
pub use crate::factory::{
    BeanCreator, CreateContext, FactoryBean, FnCreator, Product, PrototypeFactoryBean,
    SingletonFactoryBean, DEFAULT_MAX_FACTORY_NESTING,
};
pub use crate::registry::{
    BeanNameAware, BeanType, BeanTypeOf, Registry, RegistryAware, RegistryBuilder, RegistryRef,
};

/// a bean instance handed out by the registry. identity is `Arc::ptr_eq`
pub type Instance = Arc<dyn Any + Send + Sync>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aop::{
        Advice, AfterFinallyAdvice, AfterThrowingAdvice, BeforeAdvice, InterceptorChain,
        MethodIdentity, MethodInterceptor, MethodInvocation, Value,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use thiserror::Error;

    #[derive(Error, Debug)]
    #[error("nobody to greet")]
    struct NobodyToGreet;

    pub trait Greeter {
        fn greet(&self, name: &str, times: i32) -> Result<String, Failure>;
    }

    pub struct PlainGreeter {
        greeting: String,
    }

    impl Greeter for PlainGreeter {
        fn greet(&self, name: &str, times: i32) -> Result<String, Failure> {
            if name.is_empty() {
                return Err(NobodyToGreet.into());
            }
            Ok(vec![format!("{} {}", self.greeting, name); times as usize].join(" "))
        }
    }

    /// what a generator emits for `Greeter`: one method identity per method,
    /// interceptors adapted once, a fresh chain per call
    pub struct GreeterProxy {
        target: Arc<PlainGreeter>,
        greet_method: Arc<MethodIdentity>,
        greet_interceptors: Vec<Arc<dyn MethodInterceptor>>,
    }

    impl GreeterProxy {
        fn new(target: Arc<PlainGreeter>, advices: Vec<Advice>) -> Self {
            Self {
                target,
                greet_method: Arc::new(
                    MethodIdentity::new("Greeter", "greet", "String")
                        .with_parameter_types(["&str", "int"]),
                ),
                greet_interceptors: advices.into_iter().map(Advice::into_interceptor).collect(),
            }
        }
    }

    impl Greeter for GreeterProxy {
        fn greet(&self, name: &str, times: i32) -> Result<String, Failure> {
            let mut chain = InterceptorChain::new();
            chain
                .set_target(self.target.clone())
                .set_method(self.greet_method.clone())
                .set_parameters(vec![
                    Value::object(name.to_string()),
                    InterceptorChain::as_object(times),
                ])
                .set_target_method(|invocation| {
                    let target = invocation
                        .target()
                        .clone()
                        .downcast::<PlainGreeter>()
                        .map_err(|_| "target is not a PlainGreeter")?;
                    let name = invocation
                        .parameter(0)?
                        .downcast::<String>()
                        .ok_or("first parameter is not a String")?;
                    let times = invocation.parameter(1)?.as_i32()?;
                    Ok(Value::object(target.greet(&name, times)?))
                });
            for interceptor in &self.greet_interceptors {
                chain.add_method_interceptor(interceptor.clone());
            }
            let result = chain.proceed()?;
            let greeting = result
                .downcast::<String>()
                .ok_or("greet returned something else than a String")?;
            Ok(greeting.as_ref().clone())
        }
    }

    #[derive(Default)]
    struct Audit {
        entries: Mutex<Vec<String>>,
        finished: AtomicUsize,
    }

    impl BeforeAdvice for Audit {
        fn before(&self, invocation: &MethodInvocation<'_>) -> Result<(), Failure> {
            self.entries.lock().expect("poisoned").push(format!(
                "{}.{} x{}",
                invocation.enclosing_type(),
                invocation.method(),
                invocation.parameter(1)?.as_i32()?
            ));
            Ok(())
        }
    }

    impl AfterFinallyAdvice for Audit {
        fn after_finally(&self, _invocation: &MethodInvocation<'_>) {
            self.finished.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct Fallback;

    impl AfterThrowingAdvice for Fallback {
        fn after_throwing(
            &self,
            failure: Failure,
            _invocation: &MethodInvocation<'_>,
        ) -> Result<Value, Failure> {
            if failure.downcast_ref::<NobodyToGreet>().is_some() {
                return Ok(Value::object("hello stranger".to_string()));
            }
            Err(failure)
        }
    }

    fn build(audit: &Arc<Audit>, proxies_made: &Arc<AtomicUsize>) -> Result<Registry, BeanError> {
        let audit = audit.clone();
        let proxies_made = proxies_made.clone();
        Registry::builder()
            .singleton("plainGreeter", |_| {
                Ok(Product::bean(PlainGreeter {
                    greeting: "hello".to_string(),
                }))
            })?
            // the product of this factory is a factory producing the proxy
            .singleton("greeter", move |_| {
                let audit = audit.clone();
                let proxies_made = proxies_made.clone();
                Ok(Product::factory(PrototypeFactoryBean::from_fn(
                    move |ctx| {
                        proxies_made.fetch_add(1, Ordering::SeqCst);
                        let target = ctx.resolve_typed(PlainGreeter::BEAN_TYPE, "plainGreeter")?;
                        let advices = vec![
                            Advice::AfterFinally(audit.clone()),
                            Advice::Before(audit.clone()),
                            Advice::after_throwing(Fallback),
                        ];
                        Ok(Product::bean(GreeterProxy::new(target, advices)))
                    },
                )))
            })?
            .aliases("welcomer=greeter")?
            .eager_beans("greeter")
            .build()
    }

    #[test]
    fn registry_hands_out_an_advised_proxy() -> anyhow::Result<()> {
        let audit = Arc::new(Audit::default());
        let proxies_made = Arc::new(AtomicUsize::new(0));
        let registry = build(&audit, &proxies_made)?;
        assert_eq!(proxies_made.load(Ordering::SeqCst), 1);

        let greeter = registry.resolve_typed(GreeterProxy::BEAN_TYPE, "welcomer")?;
        let same = registry.resolve_typed(GreeterProxy::BEAN_TYPE, "greeter")?;
        assert!(Arc::ptr_eq(&greeter, &same));
        assert_eq!(proxies_made.load(Ordering::SeqCst), 1);

        let greeting = greeter.greet("world", 2).map_err(anyhow::Error::msg)?;
        assert_eq!(greeting, "hello world hello world");

        let recovered = greeter.greet("", 1).map_err(anyhow::Error::msg)?;
        assert_eq!(recovered, "hello stranger");

        assert_eq!(
            *audit.entries.lock().expect("poisoned"),
            vec!["Greeter.greet x2", "Greeter.greet x1"]
        );
        assert_eq!(audit.finished.load(Ordering::SeqCst), 2);
        Ok(())
    }

    #[test]
    fn unadvised_failure_propagates_unchanged() -> anyhow::Result<()> {
        let target = Arc::new(PlainGreeter {
            greeting: "hi".to_string(),
        });
        let finished = Arc::new(Audit::default());
        let proxy = GreeterProxy::new(target, vec![Advice::AfterFinally(finished.clone())]);
        let err = proxy.greet("", 1).err();
        assert!(err.as_deref().and_then(|e| e.downcast_ref::<NobodyToGreet>()).is_some());
        assert_eq!(finished.finished.load(Ordering::SeqCst), 1);
        Ok(())
    }

    #[test]
    fn missing_bean_reference_fails_bootstrap() -> anyhow::Result<()> {
        let result = Registry::builder()
            .singleton("service", |ctx| Ok(Product::Bean(ctx.resolve("dao")?)))?
            .eager("service")
            .build();
        let err = result.err();
        assert!(matches!(&err, Some(BeanError::CreationFailed { name, .. }) if name == "service"));
        let message = err.map(|e| e.to_string()).unwrap_or_default();
        assert!(message.contains("unable to find bean \"dao\""), "{message}");
        Ok(())
    }
}
