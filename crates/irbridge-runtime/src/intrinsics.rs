//! Intrinsic library called from translated code.
//!
//! Overloaded intrinsics live in one module per type (`intrinsics::i32::smax`,
//! `intrinsics::f64::sqrt`). Functions that may raise an emulated exception
//! return [`Emulated`] and never fail any other way.

use crate::{Emulated, ExceptionKind, Memory, Trap, TrapResult};

macro_rules! int_intrinsics {
    ($module:ident, $s:ty, $u:ty) => {
        pub mod $module {
            use crate::{Emulated, ExceptionKind};

            // ── may throw ──

            pub fn checked_div(lhs: $s, rhs: $s) -> Emulated<$s> {
                if rhs == 0 {
                    return Emulated::pending(ExceptionKind::DivisionByZero);
                }
                match lhs.checked_div(rhs) {
                    Some(v) => Emulated::ok(v),
                    None => Emulated::pending(ExceptionKind::ArithmeticOverflow),
                }
            }

            pub fn checked_rem(lhs: $s, rhs: $s) -> Emulated<$s> {
                if rhs == 0 {
                    return Emulated::pending(ExceptionKind::DivisionByZero);
                }
                Emulated::ok(lhs.checked_rem(rhs).unwrap_or(0))
            }

            pub fn checked_add(lhs: $s, rhs: $s) -> Emulated<$s> {
                lhs.checked_add(rhs)
                    .map_or_else(|| Emulated::pending(ExceptionKind::ArithmeticOverflow), Emulated::ok)
            }

            pub fn checked_sub(lhs: $s, rhs: $s) -> Emulated<$s> {
                lhs.checked_sub(rhs)
                    .map_or_else(|| Emulated::pending(ExceptionKind::ArithmeticOverflow), Emulated::ok)
            }

            pub fn checked_mul(lhs: $s, rhs: $s) -> Emulated<$s> {
                lhs.checked_mul(rhs)
                    .map_or_else(|| Emulated::pending(ExceptionKind::ArithmeticOverflow), Emulated::ok)
            }

            // ── pure ──

            pub fn smax(a: $s, b: $s) -> $s {
                a.max(b)
            }

            pub fn smin(a: $s, b: $s) -> $s {
                a.min(b)
            }

            pub fn umax(a: $s, b: $s) -> $s {
                (a as $u).max(b as $u) as $s
            }

            pub fn umin(a: $s, b: $s) -> $s {
                (a as $u).min(b as $u) as $s
            }

            /// `llvm.abs`: `abs(MIN)` wraps to `MIN`.
            pub fn abs(a: $s) -> $s {
                a.wrapping_abs()
            }

            pub fn ctpop(a: $s) -> $s {
                a.count_ones() as $s
            }

            pub fn ctlz(a: $s) -> $s {
                a.leading_zeros() as $s
            }

            pub fn cttz(a: $s) -> $s {
                a.trailing_zeros() as $s
            }

            pub fn bswap(a: $s) -> $s {
                a.swap_bytes()
            }
        }
    };
}

int_intrinsics!(i8, i8, u8);
int_intrinsics!(i16, i16, u16);
int_intrinsics!(i32, i32, u32);
int_intrinsics!(i64, i64, u64);

macro_rules! float_intrinsics {
    ($module:ident, $f:ty) => {
        pub mod $module {
            pub fn fabs(a: $f) -> $f {
                a.abs()
            }

            pub fn sqrt(a: $f) -> $f {
                a.sqrt()
            }

            pub fn floor(a: $f) -> $f {
                a.floor()
            }

            pub fn ceil(a: $f) -> $f {
                a.ceil()
            }

            pub fn trunc(a: $f) -> $f {
                a.trunc()
            }

            /// `llvm.minnum`: a NaN operand yields the other operand.
            pub fn minnum(a: $f, b: $f) -> $f {
                a.min(b)
            }

            pub fn maxnum(a: $f, b: $f) -> $f {
                a.max(b)
            }
        }
    };
}

float_intrinsics!(f32, f32);
float_intrinsics!(f64, f64);

/// `irbridge.throw(code)`: always raises [`ExceptionKind::Thrown`].
pub fn throw(code: std::primitive::i32) -> Emulated<()> {
    Emulated::pending(ExceptionKind::Thrown(code))
}

/// `llvm.trap` / `abort`.
pub fn trap() -> TrapResult<()> {
    Err(Trap::Abort)
}

// ── memory ──

pub fn memcpy(memory: &mut Memory, dst: u64, src: u64, len: u64) -> TrapResult<()> {
    memory.copy(dst, src, len)
}

pub fn memmove(memory: &mut Memory, dst: u64, src: u64, len: u64) -> TrapResult<()> {
    memory.copy(dst, src, len)
}

pub fn memset(memory: &mut Memory, dst: u64, byte: u8, len: u64) -> TrapResult<()> {
    memory.fill(dst, byte, len)
}

pub fn malloc(memory: &mut Memory, size: u64) -> TrapResult<u64> {
    Ok(memory.malloc(size))
}

pub fn calloc(memory: &mut Memory, count: u64, size: u64) -> TrapResult<u64> {
    Ok(memory.calloc(count, size))
}

pub fn free(memory: &mut Memory, addr: u64) -> TrapResult<()> {
    memory.free(addr);
    Ok(())
}
