//! Dynamically typed values passed to and from external functions.

use crate::{Fault, Outcome, Trap};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    Void,
    I1(bool),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    I128(i128),
    F32(f32),
    F64(f64),
    Ptr(u64),
}

impl Value {
    /// Extract a typed value, trapping on a type mismatch.
    pub fn get<T: FromValue>(self) -> Outcome<T> {
        T::from_value(self).ok_or(Fault::Trap(Trap::ExternalSignatureMismatch))
    }
}

pub trait FromValue: Sized {
    fn from_value(value: Value) -> Option<Self>;
}

macro_rules! value_conversions {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::$variant(v)
                }
            }

            impl FromValue for $ty {
                fn from_value(value: Value) -> Option<Self> {
                    match value {
                        Value::$variant(v) => Some(v),
                        _ => None,
                    }
                }
            }
        )*
    };
}

value_conversions! {
    bool => I1,
    i8 => I8,
    i16 => I16,
    i32 => I32,
    i64 => I64,
    i128 => I128,
    f32 => F32,
    f64 => F64,
    u64 => Ptr,
}

impl From<()> for Value {
    fn from(_: ()) -> Self {
        Value::Void
    }
}

impl FromValue for () {
    fn from_value(value: Value) -> Option<Self> {
        matches!(value, Value::Void).then_some(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_extraction() {
        assert_eq!(Value::from(7i32).get::<i32>(), Ok(7));
        assert_eq!(Value::Ptr(128).get::<u64>(), Ok(128));
        assert_eq!(
            Value::I64(1).get::<i32>(),
            Err(Fault::Trap(Trap::ExternalSignatureMismatch))
        );
        assert_eq!(Value::Void.get::<()>(), Ok(()));
    }
}
