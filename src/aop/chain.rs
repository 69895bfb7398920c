use crate::aop::adapters::{
    AfterFinallyAdviceInterceptor, AfterReturningAdviceInterceptor,
    AfterThrowingAdviceInterceptor, BeforeAdviceInterceptor,
};
use crate::aop::{Advice, MethodInterceptor, Value};
use crate::error::{ChainError, Failure};
use crate::Instance;
use crossbeam::atomic::AtomicCell;
use std::cmp::Ordering;
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use tracing::trace;

/// the last link of every chain, supplied by the generated proxy.
/// it unwraps the parameters and calls the real method on the target
pub type TargetMethod = dyn Fn(&MethodInvocation<'_>) -> Result<Value, Failure> + Send + Sync;

/// identity of an intercepted method. built once per proxied method and shared
/// by reference with every chain and invocation, so nobody can alter it
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct MethodIdentity {
    enclosing_type: String,
    name: String,
    parameter_types: Vec<String>,
    return_type: String,
    native: bool,
}

impl MethodIdentity {
    pub fn new(
        enclosing_type: impl Into<String>,
        name: impl Into<String>,
        return_type: impl Into<String>,
    ) -> Self {
        Self {
            enclosing_type: enclosing_type.into(),
            name: name.into(),
            parameter_types: Vec::new(),
            return_type: return_type.into(),
            native: false,
        }
    }

    pub fn with_parameter_types<I, S>(mut self, parameter_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.parameter_types = parameter_types.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_native(mut self, native: bool) -> Self {
        self.native = native;
        self
    }

    pub fn enclosing_type(&self) -> &str {
        &self.enclosing_type
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parameter_types(&self) -> &[String] {
        &self.parameter_types
    }

    pub fn return_type(&self) -> &str {
        &self.return_type
    }

    pub fn is_native(&self) -> bool {
        self.native
    }

    fn validate(&self) -> Result<(), ChainError> {
        if self.enclosing_type.is_empty() {
            return Err(ChainError::NotConfigured("enclosing type"));
        }
        if self.name.is_empty() {
            return Err(ChainError::NotConfigured("method name"));
        }
        if self.return_type.is_empty() {
            return Err(ChainError::NotConfigured("return type"));
        }
        Ok(())
    }
}

impl Display for MethodIdentity {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}.{}({}) -> {}",
            self.enclosing_type,
            self.name,
            self.parameter_types.join(", "),
            self.return_type
        )
    }
}

/// progress of one chain. it only ever moves forward
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ChainState {
    /// configured, `proceed` not called yet
    Created,
    /// the interceptor with this index was entered
    Running(usize),
    /// all interceptors passed, the target method was called
    TargetInvoked,
    Returned,
    Failed,
}

impl ChainState {
    pub fn is_finished(&self) -> bool {
        matches!(self, ChainState::Returned | ChainState::Failed)
    }
}

/// drives an ordered list of interceptors around one call of a target method.
/// a chain is configured, proceeded once and then thrown away
pub struct InterceptorChain {
    target: Option<Instance>,
    method: Option<Arc<MethodIdentity>>,
    parameters: Vec<Value>,
    interceptors: Vec<Arc<dyn MethodInterceptor>>,
    target_method: Option<Arc<TargetMethod>>,
    state: AtomicCell<ChainState>,
}

impl Default for InterceptorChain {
    fn default() -> Self {
        Self::new()
    }
}

impl InterceptorChain {
    pub fn new() -> Self {
        Self {
            target: None,
            method: None,
            parameters: Vec::new(),
            interceptors: Vec::new(),
            target_method: None,
            state: AtomicCell::new(ChainState::Created),
        }
    }

    /// the object being proxied
    pub fn set_target(&mut self, target: Instance) -> &mut Self {
        self.target = Some(target);
        self
    }

    pub fn set_method(&mut self, method: Arc<MethodIdentity>) -> &mut Self {
        self.method = Some(method);
        self
    }

    /// the actual parameter values of this call
    pub fn set_parameters(&mut self, parameters: Vec<Value>) -> &mut Self {
        self.parameters = parameters;
        self
    }

    pub fn set_target_method<F>(&mut self, target_method: F) -> &mut Self
    where
        F: Fn(&MethodInvocation<'_>) -> Result<Value, Failure> + Send + Sync + 'static,
    {
        self.target_method = Some(Arc::new(target_method));
        self
    }

    /// share one target method between many chains
    pub fn set_shared_target_method(&mut self, target_method: Arc<TargetMethod>) -> &mut Self {
        self.target_method = Some(target_method);
        self
    }

    /// append an advice, adapting it to an interceptor.
    /// interceptors run in the order they were added, the first one wraps all others
    pub fn add_advice(&mut self, advice: Advice) -> &mut Self {
        self.add_method_interceptor(advice.into_interceptor())
    }

    pub fn add_method_interceptor(&mut self, interceptor: Arc<dyn MethodInterceptor>) -> &mut Self {
        self.interceptors.push(interceptor);
        self
    }

    pub fn interceptor_count(&self) -> usize {
        self.interceptors.len()
    }

    pub fn state(&self) -> ChainState {
        self.state.load()
    }

    /// run every interceptor and finally the target method
    pub fn proceed(&self) -> Result<Value, Failure> {
        let invocation = self.start()?;
        let outcome = invocation.proceed();
        let finished = if outcome.is_ok() {
            ChainState::Returned
        } else {
            ChainState::Failed
        };
        self.state.store(finished);
        trace!(method = %invocation.method, state = ?finished, "interceptor chain finished");
        outcome
    }

    fn start(&self) -> Result<MethodInvocation<'_>, ChainError> {
        let state = self.state.load();
        if state != ChainState::Created {
            return Err(ChainError::AlreadyProceeded(state));
        }
        let target = self
            .target
            .as_ref()
            .ok_or(ChainError::NotConfigured("target"))?;
        let method = self
            .method
            .as_deref()
            .ok_or(ChainError::NotConfigured("method"))?;
        method.validate()?;
        let target_method = self
            .target_method
            .as_deref()
            .ok_or(ChainError::NotConfigured("target method"))?;
        Ok(MethodInvocation {
            chain: self,
            target,
            method,
            target_method,
            index: 0,
        })
    }

    fn advance(&self, next: ChainState) {
        // a failed update only means we are already further along
        let _ = self
            .state
            .fetch_update(|current| (next > current).then_some(next));
    }

    /// a parameter of this call, untouched
    pub fn parameter(&self, index: usize) -> Result<&Value, ChainError> {
        parameter_at(&self.parameters, index)
    }

    /// box a primitive (or pass an object through) as a chain value
    pub fn as_object(value: impl Into<Value>) -> Value {
        value.into()
    }
}

fn parameter_at(parameters: &[Value], index: usize) -> Result<&Value, ChainError> {
    parameters.get(index).ok_or(ChainError::ParameterOutOfBounds {
        index,
        len: parameters.len(),
    })
}

macro_rules! typed_chain_access {
    ($($ty:ty, $as_fn:ident, $proceed_fn:ident, $param_fn:ident;)*) => {
        impl InterceptorChain {
            $(
                #[doc = concat!("proceed and unwrap the result as `", stringify!($ty), "`")]
                pub fn $proceed_fn(&self) -> Result<$ty, Failure> {
                    Ok(self.proceed()?.$as_fn()?)
                }

                pub fn $param_fn(&self, index: usize) -> Result<$ty, ChainError> {
                    self.parameter(index)?.$as_fn()
                }
            )*
        }
    };
}

typed_chain_access! {
    bool, as_bool, proceed_returning_bool, get_bool_parameter;
    i8, as_i8, proceed_returning_i8, get_i8_parameter;
    i16, as_i16, proceed_returning_i16, get_i16_parameter;
    i32, as_i32, proceed_returning_i32, get_i32_parameter;
    i64, as_i64, proceed_returning_i64, get_i64_parameter;
    f32, as_f32, proceed_returning_f32, get_f32_parameter;
    f64, as_f64, proceed_returning_f64, get_f64_parameter;
    char, as_char, proceed_returning_char, get_char_parameter;
}

impl Advice {
    /// adapt the advice into the uniform interceptor capability
    pub fn into_interceptor(self) -> Arc<dyn MethodInterceptor> {
        match self {
            Advice::AfterFinally(a) => Arc::new(AfterFinallyAdviceInterceptor::new(a)),
            Advice::AfterReturning(a) => Arc::new(AfterReturningAdviceInterceptor::new(a)),
            Advice::AfterThrowing(a) => Arc::new(AfterThrowingAdviceInterceptor::new(a)),
            Advice::Before(a) => Arc::new(BeforeAdviceInterceptor::new(a)),
            Advice::Interceptor(i) => i,
        }
    }
}

/// the view of the chain handed to interceptor number `index`.
/// `proceed` passes control to the next interceptor, or to the target method
/// once all interceptors are used up
pub struct MethodInvocation<'a> {
    chain: &'a InterceptorChain,
    target: &'a Instance,
    method: &'a MethodIdentity,
    target_method: &'a TargetMethod,
    index: usize,
}

impl<'a> MethodInvocation<'a> {
    pub fn target(&self) -> &Instance {
        self.target
    }

    pub fn parameters(&self) -> &[Value] {
        &self.chain.parameters
    }

    pub fn parameter(&self, index: usize) -> Result<&Value, ChainError> {
        parameter_at(&self.chain.parameters, index)
    }

    pub fn method(&self) -> &str {
        self.method.name()
    }

    pub fn method_identity(&self) -> &MethodIdentity {
        self.method
    }

    pub fn parameter_types(&self) -> &[String] {
        self.method.parameter_types()
    }

    pub fn return_type(&self) -> &str {
        self.method.return_type()
    }

    pub fn is_native(&self) -> bool {
        self.method.is_native()
    }

    pub fn enclosing_type(&self) -> &str {
        self.method.enclosing_type()
    }

    pub fn proceed(&self) -> Result<Value, Failure> {
        let interceptors = &self.chain.interceptors;
        match self.index.cmp(&interceptors.len()) {
            Ordering::Less => {
                self.chain.advance(ChainState::Running(self.index));
                trace!(method = %self.method, index = self.index, "entering interceptor");
                interceptors[self.index].invoke(&self.next())
            }
            Ordering::Equal => {
                self.chain.advance(ChainState::TargetInvoked);
                trace!(method = %self.method, "invoking target method");
                (self.target_method)(&self.next())
            }
            // the target method itself has nothing left to proceed to
            Ordering::Greater => Err(ChainError::AlreadyProceeded(ChainState::TargetInvoked).into()),
        }
    }

    fn next(&self) -> MethodInvocation<'a> {
        MethodInvocation {
            chain: self.chain,
            target: self.target,
            method: self.method,
            target_method: self.target_method,
            index: self.index + 1,
        }
    }
}
