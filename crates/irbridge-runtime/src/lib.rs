//! `irbridge-runtime`: runtime library for irbridge translated output.
//!
//! Translated functions have the shape
//! `fn name(ctx: &mut Context, ..) -> Outcome<T>`. It provides:
//! - [`Memory`]: flat guest memory with a null guard, globals, a stack and a heap
//! - [`Trap`] / [`Exception`] / [`Fault`] and the [`Outcome`] alias
//! - [`Emulated`] results for intrinsics that may raise an emulated exception
//! - checked numeric operations ([`ops`]) and the intrinsic library ([`intrinsics`])

mod context;
mod memory;
mod value;

pub mod intrinsics;
pub mod ops;

pub use context::{Context, ExternalFn};
pub use memory::{Frame, Memory, MemoryConfig, NULL_GUARD};
pub use value::{FromValue, Value};

/// Non-recoverable execution errors. No invoke edge can catch a trap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Trap {
    #[error("memory access out of bounds")]
    OutOfBounds,
    #[error("null pointer dereference")]
    NullDereference,
    #[error("integer division by zero")]
    DivisionByZero,
    /// Signed/unsigned overflow on an instruction that declared it impossible.
    #[error("integer overflow")]
    IntegerOverflow,
    /// Float to integer conversion of NaN or an out-of-range value.
    #[error("invalid float to integer conversion")]
    InvalidConversion,
    #[error("unreachable executed")]
    Unreachable,
    #[error("stack overflow")]
    StackOverflow,
    #[error("abort")]
    Abort,
    /// The function was too large to translate and was replaced by a stub.
    #[error("function was not translated")]
    Untranslated,
    #[error("call to unresolved external function")]
    UnresolvedExternal,
    #[error("external function returned a value of the wrong type")]
    ExternalSignatureMismatch,
    #[error("resume without a pending exception")]
    ResumeWithoutException,
}

/// Result type for memory and numeric operations.
pub type TrapResult<T> = Result<T, Trap>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ExceptionKind {
    #[error("division by zero")]
    DivisionByZero,
    #[error("arithmetic overflow")]
    ArithmeticOverflow,
    /// Raised explicitly by `irbridge.throw` with a user code.
    #[error("thrown with code {0}")]
    Thrown(i32),
}

/// An emulated exception travelling up the call chain.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("exception: {kind}")]
pub struct Exception {
    pub kind: ExceptionKind,
}

impl Exception {
    pub fn new(kind: ExceptionKind) -> Self {
        Self { kind }
    }

    /// Integer code for the exception, `-1`/`-2` for the arithmetic kinds.
    pub fn code(&self) -> i32 {
        match self.kind {
            ExceptionKind::DivisionByZero => -1,
            ExceptionKind::ArithmeticOverflow => -2,
            ExceptionKind::Thrown(code) => code,
        }
    }
}

/// Why a translated function did not return normally.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Fault {
    #[error("trap: {0}")]
    Trap(Trap),
    #[error(transparent)]
    Exception(Exception),
}

impl Fault {
    /// Re-raise the exception held by a landing pad.
    pub fn resume(pending: Option<Exception>) -> Fault {
        match pending {
            Some(e) => Fault::Exception(e),
            None => Fault::Trap(Trap::ResumeWithoutException),
        }
    }

    pub fn as_trap(&self) -> Option<Trap> {
        match self {
            Fault::Trap(t) => Some(*t),
            Fault::Exception(_) => None,
        }
    }

    pub fn as_exception(&self) -> Option<&Exception> {
        match self {
            Fault::Exception(e) => Some(e),
            Fault::Trap(_) => None,
        }
    }
}

impl From<Trap> for Fault {
    fn from(trap: Trap) -> Self {
        Fault::Trap(trap)
    }
}

impl From<Exception> for Fault {
    fn from(e: Exception) -> Self {
        Fault::Exception(e)
    }
}

/// Result of a translated function.
pub type Outcome<T> = Result<T, Fault>;

/// Side status returned by intrinsics that may raise an emulated exception.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    Ok,
    Pending(Exception),
}

/// Primary value plus emulated-exception status.
///
/// When `status` is pending, `value` is the type's default and must not be
/// observed by translated code.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use]
pub struct Emulated<T> {
    pub value: T,
    pub status: Status,
}

impl<T> Emulated<T> {
    pub fn ok(value: T) -> Self {
        Self {
            value,
            status: Status::Ok,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.status, Status::Pending(_))
    }

    pub fn into_outcome(self) -> Outcome<T> {
        match self.status {
            Status::Ok => Ok(self.value),
            Status::Pending(e) => Err(Fault::Exception(e)),
        }
    }
}

impl<T: Default> Emulated<T> {
    pub fn pending(kind: ExceptionKind) -> Self {
        Self {
            value: T::default(),
            status: Status::Pending(Exception::new(kind)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trap_converts_into_fault() {
        fn fails() -> Outcome<i32> {
            Err(Trap::DivisionByZero)?
        }
        assert_eq!(fails(), Err(Fault::Trap(Trap::DivisionByZero)));
    }

    #[test]
    fn resume_without_exception_traps() {
        assert_eq!(
            Fault::resume(None),
            Fault::Trap(Trap::ResumeWithoutException)
        );
        let e = Exception::new(ExceptionKind::Thrown(7));
        assert_eq!(Fault::resume(Some(e.clone())), Fault::Exception(e));
    }

    #[test]
    fn emulated_into_outcome() {
        assert_eq!(Emulated::ok(5i32).into_outcome(), Ok(5));
        let pending = Emulated::<i32>::pending(ExceptionKind::DivisionByZero);
        assert!(pending.is_pending());
        assert_eq!(pending.value, 0);
        let fault = pending.into_outcome().unwrap_err();
        assert_eq!(fault.as_exception().map(Exception::code), Some(-1));
    }
}
