//! method interception: advices, the adapters turning them into interceptors,
//! and the chain that drives interceptors around one target call

mod adapters;
mod advice;
mod chain;
mod value;

pub use adapters::{
    AfterFinallyAdviceInterceptor, AfterReturningAdviceInterceptor,
    AfterThrowingAdviceInterceptor, BeforeAdviceInterceptor,
};
pub use advice::{
    Advice, AfterFinallyAdvice, AfterReturningAdvice, AfterThrowingAdvice, BeforeAdvice,
    FnInterceptor, MethodInterceptor,
};
pub use chain::{ChainState, InterceptorChain, MethodIdentity, MethodInvocation, TargetMethod};
pub use value::{Value, ValueKind};
