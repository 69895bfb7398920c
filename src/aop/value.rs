use crate::error::ChainError;
use crate::Instance;
use std::any::Any;
use std::fmt::{Debug, Display, Formatter};
use std::sync::Arc;

/// the kind tag of a `Value`, used in mismatch errors
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Void,
    Bool,
    I8,
    I16,
    I32,
    I64,
    F32,
    F64,
    Char,
    Object,
}

impl Display for ValueKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ValueKind::Void => "void",
            ValueKind::Bool => "bool",
            ValueKind::I8 => "i8",
            ValueKind::I16 => "i16",
            ValueKind::I32 => "i32",
            ValueKind::I64 => "i64",
            ValueKind::F32 => "f32",
            ValueKind::F64 => "f64",
            ValueKind::Char => "char",
            ValueKind::Object => "object",
        };
        f.write_str(name)
    }
}

/// a parameter or a result carried through an interceptor chain.
/// primitives keep their kind so that unwrapping with the wrong kind fails
/// instead of coercing
#[derive(Clone)]
pub enum Value {
    /// result of a method returning nothing
    Void,
    Bool(bool),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    Char(char),
    Object(Instance),
}

impl Value {
    /// wrap any shared object
    pub fn object<T>(value: T) -> Self
    where
        T: Any + Send + Sync,
    {
        Value::Object(Arc::new(value))
    }

    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Void => ValueKind::Void,
            Value::Bool(_) => ValueKind::Bool,
            Value::I8(_) => ValueKind::I8,
            Value::I16(_) => ValueKind::I16,
            Value::I32(_) => ValueKind::I32,
            Value::I64(_) => ValueKind::I64,
            Value::F32(_) => ValueKind::F32,
            Value::F64(_) => ValueKind::F64,
            Value::Char(_) => ValueKind::Char,
            Value::Object(_) => ValueKind::Object,
        }
    }

    pub fn is_void(&self) -> bool {
        matches!(self, Value::Void)
    }

    /// the shared object, or a mismatch for primitives and void
    pub fn as_object(&self) -> Result<&Instance, ChainError> {
        match self {
            Value::Object(o) => Ok(o),
            other => Err(ChainError::TypeMismatch {
                expected: ValueKind::Object,
                found: other.kind(),
            }),
        }
    }

    /// the shared object downcast to a concrete type
    pub fn downcast<T>(&self) -> Option<Arc<T>>
    where
        T: Any + Send + Sync,
    {
        match self {
            Value::Object(o) => o.clone().downcast::<T>().ok(),
            _ => None,
        }
    }
}

macro_rules! primitive_value {
    ($($variant:ident, $ty:ty, $as_fn:ident;)*) => {
        impl Value {
            $(
                #[doc = concat!("unwrap a `", stringify!($ty), "`, failing on any other kind")]
                pub fn $as_fn(&self) -> Result<$ty, ChainError> {
                    match self {
                        Value::$variant(v) => Ok(*v),
                        other => Err(ChainError::TypeMismatch {
                            expected: ValueKind::$variant,
                            found: other.kind(),
                        }),
                    }
                }
            )*
        }

        $(
            impl From<$ty> for Value {
                fn from(value: $ty) -> Self {
                    Value::$variant(value)
                }
            }
        )*
    };
}

primitive_value! {
    Bool, bool, as_bool;
    I8, i8, as_i8;
    I16, i16, as_i16;
    I32, i32, as_i32;
    I64, i64, as_i64;
    F32, f32, as_f32;
    F64, f64, as_f64;
    Char, char, as_char;
}

impl From<()> for Value {
    fn from(_: ()) -> Self {
        Value::Void
    }
}

impl From<Instance> for Value {
    fn from(value: Instance) -> Self {
        Value::Object(value)
    }
}

/// objects compare by identity, primitives by value
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Void, Value::Void) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::I8(a), Value::I8(b)) => a == b,
            (Value::I16(a), Value::I16(b)) => a == b,
            (Value::I32(a), Value::I32(b)) => a == b,
            (Value::I64(a), Value::I64(b)) => a == b,
            (Value::F32(a), Value::F32(b)) => a == b,
            (Value::F64(a), Value::F64(b)) => a == b,
            (Value::Char(a), Value::Char(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl Debug for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Void => write!(f, "Void"),
            Value::Bool(v) => write!(f, "Bool({v})"),
            Value::I8(v) => write!(f, "I8({v})"),
            Value::I16(v) => write!(f, "I16({v})"),
            Value::I32(v) => write!(f, "I32({v})"),
            Value::I64(v) => write!(f, "I64({v})"),
            Value::F32(v) => write!(f, "F32({v})"),
            Value::F64(v) => write!(f, "F64({v})"),
            Value::Char(v) => write!(f, "Char({v:?})"),
            Value::Object(o) => write!(f, "Object({:p})", Arc::as_ptr(o)),
        }
    }
}
