use crate::aop::{MethodInvocation, Value};
use crate::error::Failure;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

/// the uniform capability every advice is adapted into.
/// an interceptor decides whether, when and how often the rest of the chain runs
/// by calling `invocation.proceed()`
pub trait MethodInterceptor: Send + Sync {
    fn invoke(&self, invocation: &MethodInvocation<'_>) -> Result<Value, Failure>;
}

/// basic wrapper for a single function
pub struct FnInterceptor<F>
where
    F: Fn(&MethodInvocation<'_>) -> Result<Value, Failure>,
{
    f: F,
}

impl<F> FnInterceptor<F>
where
    F: Fn(&MethodInvocation<'_>) -> Result<Value, Failure>,
{
    pub fn wrap(f: F) -> Self {
        Self { f }
    }
}

impl<F> MethodInterceptor for FnInterceptor<F>
where
    F: Fn(&MethodInvocation<'_>) -> Result<Value, Failure> + Send + Sync,
{
    fn invoke(&self, invocation: &MethodInvocation<'_>) -> Result<Value, Failure> {
        (self.f)(invocation)
    }
}

/// runs before the wrapped call. it sees the parameters but never the result
pub trait BeforeAdvice: Send + Sync {
    fn before(&self, invocation: &MethodInvocation<'_>) -> Result<(), Failure>;
}

/// runs only after a normal return, observing the result
pub trait AfterReturningAdvice: Send + Sync {
    fn after_returning(
        &self,
        result: &Value,
        invocation: &MethodInvocation<'_>,
    ) -> Result<(), Failure>;
}

/// runs only when the wrapped call fails.
/// returning `Err` re-signals (the same or another failure), returning `Ok`
/// suppresses the failure and makes the value the result of the call
pub trait AfterThrowingAdvice: Send + Sync {
    fn after_throwing(
        &self,
        failure: Failure,
        invocation: &MethodInvocation<'_>,
    ) -> Result<Value, Failure>;
}

/// runs exactly once on every exit path of the wrapped call
pub trait AfterFinallyAdvice: Send + Sync {
    fn after_finally(&self, invocation: &MethodInvocation<'_>);
}

/// the closed set of advice kinds a chain accepts.
/// the kind is picked where the chain is assembled, `InterceptorChain::add_advice`
/// turns each into a `MethodInterceptor`
#[derive(Clone)]
pub enum Advice {
    Before(Arc<dyn BeforeAdvice>),
    AfterReturning(Arc<dyn AfterReturningAdvice>),
    AfterThrowing(Arc<dyn AfterThrowingAdvice>),
    AfterFinally(Arc<dyn AfterFinallyAdvice>),
    Interceptor(Arc<dyn MethodInterceptor>),
}

impl Advice {
    pub fn before(advice: impl BeforeAdvice + 'static) -> Self {
        Advice::Before(Arc::new(advice))
    }

    pub fn after_returning(advice: impl AfterReturningAdvice + 'static) -> Self {
        Advice::AfterReturning(Arc::new(advice))
    }

    pub fn after_throwing(advice: impl AfterThrowingAdvice + 'static) -> Self {
        Advice::AfterThrowing(Arc::new(advice))
    }

    pub fn after_finally(advice: impl AfterFinallyAdvice + 'static) -> Self {
        Advice::AfterFinally(Arc::new(advice))
    }

    pub fn interceptor(interceptor: impl MethodInterceptor + 'static) -> Self {
        Advice::Interceptor(Arc::new(interceptor))
    }
}

impl Debug for Advice {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Advice::Before(_) => write!(f, "`before advice`"),
            Advice::AfterReturning(_) => write!(f, "`after returning advice`"),
            Advice::AfterThrowing(_) => write!(f, "`after throwing advice`"),
            Advice::AfterFinally(_) => write!(f, "`after finally advice`"),
            Advice::Interceptor(_) => write!(f, "`method interceptor`"),
        }
    }
}
