//! Integer and conversion operations that need a runtime check.
//!
//! One module per integer width (`ops::i32::sdiv`, `ops::i64::add_nsw`, ..).
//! Values are carried in the signed Rust type of the width; unsigned
//! operations reinterpret through the unsigned type.
//!
//! ## Division
//!
//! `sdiv`/`udiv`/`srem`/`urem` by zero trap with `DivisionByZero`.
//! `sdiv MIN, -1` traps with `IntegerOverflow`; `srem MIN, -1` is 0.
//!
//! ## Poison flags
//!
//! `*_nsw`, `*_nuw` and `*_exact` variants trap with `IntegerOverflow`
//! when the flag's promise is broken, instead of producing poison.
//!
//! ## Float to integer
//!
//! Rust's `as` saturates; LLVM gives poison. The conversions here trap with
//! `InvalidConversion` on NaN or when the truncated value does not fit.

macro_rules! int_ops {
    ($module:ident, $s:ty, $u:ty) => {
        pub mod $module {
            use crate::{Trap, TrapResult};

            const BITS: u32 = <$s>::BITS;

            #[inline(never)]
            pub fn sdiv(lhs: $s, rhs: $s) -> TrapResult<$s> {
                if rhs == 0 {
                    return Err(Trap::DivisionByZero);
                }
                lhs.checked_div(rhs).ok_or(Trap::IntegerOverflow)
            }

            #[inline(never)]
            pub fn udiv(lhs: $s, rhs: $s) -> TrapResult<$s> {
                (lhs as $u)
                    .checked_div(rhs as $u)
                    .map(|v| v as $s)
                    .ok_or(Trap::DivisionByZero)
            }

            #[inline(never)]
            pub fn srem(lhs: $s, rhs: $s) -> TrapResult<$s> {
                if rhs == 0 {
                    return Err(Trap::DivisionByZero);
                }
                // MIN % -1 overflows the division but the remainder is 0.
                Ok(lhs.checked_rem(rhs).unwrap_or(0))
            }

            #[inline(never)]
            pub fn urem(lhs: $s, rhs: $s) -> TrapResult<$s> {
                (lhs as $u)
                    .checked_rem(rhs as $u)
                    .map(|v| v as $s)
                    .ok_or(Trap::DivisionByZero)
            }

            #[inline(never)]
            pub fn sdiv_exact(lhs: $s, rhs: $s) -> TrapResult<$s> {
                let q = sdiv(lhs, rhs)?;
                if srem(lhs, rhs)? != 0 {
                    return Err(Trap::IntegerOverflow);
                }
                Ok(q)
            }

            #[inline(never)]
            pub fn udiv_exact(lhs: $s, rhs: $s) -> TrapResult<$s> {
                let q = udiv(lhs, rhs)?;
                if urem(lhs, rhs)? != 0 {
                    return Err(Trap::IntegerOverflow);
                }
                Ok(q)
            }

            #[inline(never)]
            pub fn add_nsw(lhs: $s, rhs: $s) -> TrapResult<$s> {
                lhs.checked_add(rhs).ok_or(Trap::IntegerOverflow)
            }

            #[inline(never)]
            pub fn add_nuw(lhs: $s, rhs: $s) -> TrapResult<$s> {
                (lhs as $u)
                    .checked_add(rhs as $u)
                    .map(|v| v as $s)
                    .ok_or(Trap::IntegerOverflow)
            }

            #[inline(never)]
            pub fn sub_nsw(lhs: $s, rhs: $s) -> TrapResult<$s> {
                lhs.checked_sub(rhs).ok_or(Trap::IntegerOverflow)
            }

            #[inline(never)]
            pub fn sub_nuw(lhs: $s, rhs: $s) -> TrapResult<$s> {
                (lhs as $u)
                    .checked_sub(rhs as $u)
                    .map(|v| v as $s)
                    .ok_or(Trap::IntegerOverflow)
            }

            #[inline(never)]
            pub fn mul_nsw(lhs: $s, rhs: $s) -> TrapResult<$s> {
                lhs.checked_mul(rhs).ok_or(Trap::IntegerOverflow)
            }

            #[inline(never)]
            pub fn mul_nuw(lhs: $s, rhs: $s) -> TrapResult<$s> {
                (lhs as $u)
                    .checked_mul(rhs as $u)
                    .map(|v| v as $s)
                    .ok_or(Trap::IntegerOverflow)
            }

            #[inline(never)]
            pub fn shl_nsw(lhs: $s, rhs: $s) -> TrapResult<$s> {
                let amount = rhs as $u;
                if amount >= BITS as $u {
                    return Err(Trap::IntegerOverflow);
                }
                let out = lhs << amount;
                if out >> amount != lhs {
                    return Err(Trap::IntegerOverflow);
                }
                Ok(out)
            }

            #[inline(never)]
            pub fn shl_nuw(lhs: $s, rhs: $s) -> TrapResult<$s> {
                let amount = rhs as $u;
                if amount >= BITS as $u {
                    return Err(Trap::IntegerOverflow);
                }
                let out = (lhs as $u) << amount;
                if out >> amount != lhs as $u {
                    return Err(Trap::IntegerOverflow);
                }
                Ok(out as $s)
            }

            #[inline(never)]
            pub fn lshr_exact(lhs: $s, rhs: $s) -> TrapResult<$s> {
                let amount = (rhs as $u as u32) % BITS;
                let out = (lhs as $u) >> amount;
                if out << amount != lhs as $u {
                    return Err(Trap::IntegerOverflow);
                }
                Ok(out as $s)
            }

            #[inline(never)]
            pub fn ashr_exact(lhs: $s, rhs: $s) -> TrapResult<$s> {
                let amount = (rhs as $u as u32) % BITS;
                let out = lhs >> amount;
                if out << amount != lhs {
                    return Err(Trap::IntegerOverflow);
                }
                Ok(out)
            }

            /// `fptosi` from `double`.
            #[inline(never)]
            pub fn fptosi_f64(v: f64) -> TrapResult<$s> {
                let t = v.trunc();
                let bound = -(<$s>::MIN as f64);
                if t.is_nan() || t >= bound || t < -bound {
                    return Err(Trap::InvalidConversion);
                }
                Ok(t as $s)
            }

            /// `fptoui` from `double`; the result is reinterpreted as signed.
            #[inline(never)]
            pub fn fptoui_f64(v: f64) -> TrapResult<$s> {
                let t = v.trunc();
                let bound = <$u>::MAX as f64 + 1.0;
                if t.is_nan() || t >= bound || t < 0.0 {
                    return Err(Trap::InvalidConversion);
                }
                Ok(t as $u as $s)
            }

            #[inline(never)]
            pub fn fptosi_f32(v: f32) -> TrapResult<$s> {
                fptosi_f64(v as f64)
            }

            #[inline(never)]
            pub fn fptoui_f32(v: f32) -> TrapResult<$s> {
                fptoui_f64(v as f64)
            }
        }
    };
}

int_ops!(i8, i8, u8);
int_ops!(i16, i16, u16);
int_ops!(i32, i32, u32);
int_ops!(i64, i64, u64);
int_ops!(i128, i128, u128);

#[cfg(test)]
mod tests {
    use super::{i32 as w32, i64 as w64, i8 as w8};
    use crate::Trap;

    // ── division ──

    #[test]
    fn sdiv_by_zero_traps() {
        assert_eq!(w32::sdiv(10, 0), Err(Trap::DivisionByZero));
        assert_eq!(w32::udiv(10, 0), Err(Trap::DivisionByZero));
    }

    #[test]
    fn sdiv_min_by_minus_one_overflows() {
        assert_eq!(w32::sdiv(i32::MIN, -1), Err(Trap::IntegerOverflow));
        assert_eq!(w64::sdiv(i64::MIN, -1), Err(Trap::IntegerOverflow));
    }

    #[test]
    fn srem_min_by_minus_one_is_zero() {
        assert_eq!(w32::srem(i32::MIN, -1), Ok(0));
        assert_eq!(w32::srem(-7, 2), Ok(-1));
        assert_eq!(w32::srem(7, 0), Err(Trap::DivisionByZero));
    }

    #[test]
    fn unsigned_division_reinterprets() {
        // -1 as u32 = 4294967295; / 2 = 2147483647
        assert_eq!(w32::udiv(-1, 2), Ok(i32::MAX));
        assert_eq!(w32::urem(-1, 16), Ok(15));
        assert_eq!(w8::udiv(-2, 2), Ok(127));
    }

    #[test]
    fn exact_division() {
        assert_eq!(w32::sdiv_exact(12, 4), Ok(3));
        assert_eq!(w32::sdiv_exact(13, 4), Err(Trap::IntegerOverflow));
        assert_eq!(w32::udiv_exact(16, 8), Ok(2));
    }

    // ── poison flags ──

    #[test]
    fn nsw_nuw_add() {
        assert_eq!(w32::add_nsw(i32::MAX, 1), Err(Trap::IntegerOverflow));
        assert_eq!(w32::add_nsw(i32::MAX - 1, 1), Ok(i32::MAX));
        // Unsigned: MAX as signed is fine, -1 (u32::MAX) + 1 wraps.
        assert_eq!(w32::add_nuw(i32::MAX, 1), Ok(i32::MIN));
        assert_eq!(w32::add_nuw(-1, 1), Err(Trap::IntegerOverflow));
    }

    #[test]
    fn nsw_nuw_sub_mul() {
        assert_eq!(w32::sub_nsw(i32::MIN, 1), Err(Trap::IntegerOverflow));
        assert_eq!(w32::sub_nuw(0, 1), Err(Trap::IntegerOverflow));
        assert_eq!(w32::mul_nsw(1 << 16, 1 << 15), Err(Trap::IntegerOverflow));
        assert_eq!(w32::mul_nuw(1 << 16, 1 << 15), Ok(i32::MIN));
        assert_eq!(w8::mul_nsw(-8, 16), Ok(-128));
    }

    #[test]
    fn shift_flags() {
        assert_eq!(w32::shl_nsw(1, 30), Ok(1 << 30));
        assert_eq!(w32::shl_nsw(1, 31), Err(Trap::IntegerOverflow));
        assert_eq!(w32::shl_nuw(1, 31), Ok(i32::MIN));
        assert_eq!(w32::shl_nuw(3, 31), Err(Trap::IntegerOverflow));
        assert_eq!(w32::shl_nsw(1, 32), Err(Trap::IntegerOverflow));
        assert_eq!(w32::lshr_exact(8, 3), Ok(1));
        assert_eq!(w32::lshr_exact(9, 3), Err(Trap::IntegerOverflow));
        assert_eq!(w32::ashr_exact(-8, 2), Ok(-2));
    }

    // ── conversions ──

    #[test]
    fn fptosi_truncates_toward_zero() {
        assert_eq!(w32::fptosi_f64(-1.9), Ok(-1));
        assert_eq!(w32::fptosi_f32(2.7), Ok(2));
        assert_eq!(w32::fptosi_f64(-2147483648.5), Ok(i32::MIN));
        assert_eq!(w32::fptosi_f64(2147483647.9), Ok(i32::MAX));
    }

    #[test]
    fn fptosi_out_of_range_traps() {
        assert_eq!(w32::fptosi_f64(2147483648.0), Err(Trap::InvalidConversion));
        assert_eq!(w32::fptosi_f64(-2147483649.0), Err(Trap::InvalidConversion));
        assert_eq!(w32::fptosi_f64(f64::NAN), Err(Trap::InvalidConversion));
        assert_eq!(w64::fptosi_f32(f32::INFINITY), Err(Trap::InvalidConversion));
        assert_eq!(w8::fptosi_f64(128.0), Err(Trap::InvalidConversion));
        assert_eq!(w8::fptosi_f64(-128.0), Ok(-128));
    }

    #[test]
    fn fptoui_range() {
        assert_eq!(w32::fptoui_f64(4294967295.0), Ok(-1));
        assert_eq!(w32::fptoui_f64(4294967296.0), Err(Trap::InvalidConversion));
        assert_eq!(w32::fptoui_f64(-0.5), Ok(0));
        assert_eq!(w32::fptoui_f64(-1.0), Err(Trap::InvalidConversion));
        assert_eq!(w64::fptoui_f64(1e19), Ok(10_000_000_000_000_000_000u64 as i64));
    }
}
