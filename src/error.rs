use crate::aop::{ChainState, ValueKind};
use std::error::Error;
use thiserror::Error;

/// the failure type flowing through an interceptor chain.
/// anything raised by a target method, an interceptor or an advice travels as one of these
pub type Failure = Box<dyn Error + Send + Sync + 'static>;

#[derive(Error, Debug)]
pub enum BeanError {
    /// no factory bean is registered under the name or alias
    #[error("unable to find bean \"{0}\"")]
    NotFound(String),

    /// the registry wraps every failure raised while producing a bean into this one
    #[error("unable to get bean \"{name}\" because {source}")]
    CreationFailed {
        name: String,
        #[source]
        source: Failure,
    },

    /// raised by a factory bean when its create, post-create or unwrap step fails
    #[error("unable to create bean, because {0}")]
    UnableToCreate(#[source] Failure),

    /// a factory bean was asked for its product while it was already producing it,
    /// through a nested factory or a bean reference
    #[error("factory bean \"{0}\" was asked for its bean while producing it")]
    CircularFactory(String),

    /// nested factory unwrapping went deeper than the configured bound
    #[error("factory bean \"{name}\" nests more than {depth} factories")]
    NestingTooDeep { name: String, depth: usize },

    /// typed resolution found a bean of another type
    #[error("bean \"{name}\" is not of type {expected}")]
    TypeMismatch { name: String, expected: &'static str },

    /// programming errors found while the registry is bootstrapped
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
}

impl BeanError {
    /// walk down the chain of sources and downcast the innermost user error.
    /// useful when a `CreationFailed` wraps an `UnableToCreate` which wraps a custom error
    pub fn root_cause_as<T>(&self) -> Option<&T>
    where
        T: Error + 'static,
    {
        let mut current: &(dyn Error + 'static) = self;
        loop {
            if let Some(found) = current.downcast_ref::<T>() {
                return Some(found);
            }
            current = current.source()?;
        }
    }

    /// name of the bean the error is about, if it carries one
    pub fn bean_name(&self) -> Option<&str> {
        match self {
            BeanError::NotFound(name)
            | BeanError::CreationFailed { name, .. }
            | BeanError::CircularFactory(name)
            | BeanError::NestingTooDeep { name, .. }
            | BeanError::TypeMismatch { name, .. } => Some(name),
            BeanError::UnableToCreate(_) | BeanError::InvalidConfiguration(_) => None,
        }
    }
}

/// contract violations detected by the interceptor chain itself.
/// failures raised by targets and advices are never turned into one of these
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ChainError {
    /// a required piece of the chain was not set before `proceed`
    #[error("interceptor chain is missing its {0}")]
    NotConfigured(&'static str),

    /// the chain is driven exactly once
    #[error("interceptor chain cannot proceed again, it is already {0:?}")]
    AlreadyProceeded(ChainState),

    /// a value was unwrapped as the wrong primitive kind
    #[error("expected a {expected} value but found {found}")]
    TypeMismatch { expected: ValueKind, found: ValueKind },

    #[error("parameter index {index} is out of bounds for {len} parameters")]
    ParameterOutOfBounds { index: usize, len: usize },
}

/// error type for acquiring the registry through a `RegistryRef` after it is dropped
#[derive(Error, Debug)]
#[error("bean registry is dropped, all related factory beans are dropped too")]
pub struct RegistryDroppedError;
