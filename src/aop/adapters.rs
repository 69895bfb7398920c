//! adapters turning the narrow advice traits into `MethodInterceptor`s,
//! so the chain only ever deals with one abstraction

use crate::aop::{
    AfterFinallyAdvice, AfterReturningAdvice, AfterThrowingAdvice, BeforeAdvice,
    MethodInterceptor, MethodInvocation, Value,
};
use crate::error::Failure;
use std::sync::Arc;
use tracing::warn;

pub struct BeforeAdviceInterceptor {
    advice: Arc<dyn BeforeAdvice>,
}

impl BeforeAdviceInterceptor {
    pub fn new(advice: Arc<dyn BeforeAdvice>) -> Self {
        Self { advice }
    }
}

impl MethodInterceptor for BeforeAdviceInterceptor {
    fn invoke(&self, invocation: &MethodInvocation<'_>) -> Result<Value, Failure> {
        self.advice.before(invocation)?;
        invocation.proceed()
    }
}

pub struct AfterReturningAdviceInterceptor {
    advice: Arc<dyn AfterReturningAdvice>,
}

impl AfterReturningAdviceInterceptor {
    pub fn new(advice: Arc<dyn AfterReturningAdvice>) -> Self {
        Self { advice }
    }
}

impl MethodInterceptor for AfterReturningAdviceInterceptor {
    fn invoke(&self, invocation: &MethodInvocation<'_>) -> Result<Value, Failure> {
        let result = invocation.proceed()?;
        self.advice.after_returning(&result, invocation)?;
        Ok(result)
    }
}

pub struct AfterThrowingAdviceInterceptor {
    advice: Arc<dyn AfterThrowingAdvice>,
}

impl AfterThrowingAdviceInterceptor {
    pub fn new(advice: Arc<dyn AfterThrowingAdvice>) -> Self {
        Self { advice }
    }
}

impl MethodInterceptor for AfterThrowingAdviceInterceptor {
    fn invoke(&self, invocation: &MethodInvocation<'_>) -> Result<Value, Failure> {
        match invocation.proceed() {
            Ok(result) => Ok(result),
            Err(failure) => {
                let outcome = self.advice.after_throwing(failure, invocation);
                if outcome.is_ok() {
                    warn!(
                        method = invocation.method(),
                        enclosing_type = invocation.enclosing_type(),
                        "after throwing advice suppressed a failure"
                    );
                }
                outcome
            }
        }
    }
}

pub struct AfterFinallyAdviceInterceptor {
    advice: Arc<dyn AfterFinallyAdvice>,
}

impl AfterFinallyAdviceInterceptor {
    pub fn new(advice: Arc<dyn AfterFinallyAdvice>) -> Self {
        Self { advice }
    }
}

/// runs the advice when dropped, so it also runs while unwinding
struct FinallyGuard<'a, 'b> {
    advice: &'a dyn AfterFinallyAdvice,
    invocation: &'a MethodInvocation<'b>,
}

impl Drop for FinallyGuard<'_, '_> {
    fn drop(&mut self) {
        self.advice.after_finally(self.invocation);
    }
}

impl MethodInterceptor for AfterFinallyAdviceInterceptor {
    fn invoke(&self, invocation: &MethodInvocation<'_>) -> Result<Value, Failure> {
        let _guard = FinallyGuard {
            advice: self.advice.as_ref(),
            invocation,
        };
        invocation.proceed()
    }
}
