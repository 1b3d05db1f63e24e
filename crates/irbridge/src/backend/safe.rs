//! Safe backend: emits 100% safe Rust over `irbridge_runtime`.
//!
//! Memory goes through the bounds-checked `ctx.memory` accessors, checked
//! arithmetic through `irbridge_runtime::ops`, and every failure is a
//! `Fault` propagated with `?`.

use crate::backend::Backend;
use crate::config::OverflowPolicy;
use crate::ir::{BinaryOp, BlockId, CastOp, FloatPredicate, IntPredicate, WrapFlags};
use crate::mapper::Scalar;

/// Sign-wrap `value` into a `bits`-wide two's complement integer.
fn wrap_to_width(value: i128, bits: u32) -> i128 {
    if bits >= 128 {
        return value;
    }
    let shift = 128 - bits;
    (value << shift) >> shift
}

fn ops_path(ty: Scalar, name: &str) -> String {
    format!("irbridge_runtime::ops::{}::{name}", ty.rust_type())
}

/// Emit a float const, handling NaN and infinity special values.
fn float_const(value: f64, ty: &str, display: String) -> String {
    if value.is_nan() {
        format!("{ty}::NAN")
    } else if value.is_infinite() {
        if value.is_sign_positive() {
            format!("{ty}::INFINITY")
        } else {
            format!("{ty}::NEG_INFINITY")
        }
    } else if display.starts_with('-') {
        format!("({display}{ty})")
    } else {
        format!("{display}{ty}")
    }
}

/// Safe code generation backend.
pub struct SafeBackend;

impl SafeBackend {
    pub fn new() -> Self {
        SafeBackend
    }
}

impl Default for SafeBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl SafeBackend {
    fn int_binop(
        &self,
        dest: &str,
        op: BinaryOp,
        ty: Scalar,
        (lhs, rhs): (&str, &str),
        flags: WrapFlags,
        checked: bool,
    ) -> Result<Vec<String>, String> {
        let call = |name: &str| format!("{}({lhs}, {rhs})?", ops_path(ty, name));
        // Both promises: check nuw first as a bare statement, keep the nsw result.
        let flagged = |base: &str, nsw: bool, nuw: bool, wrapping: String| match (nsw, nuw) {
            (false, false) => vec![format!("{dest} = {wrapping};")],
            (true, false) => vec![format!("{dest} = {};", call(&format!("{base}_nsw")))],
            (false, true) => vec![format!("{dest} = {};", call(&format!("{base}_nuw")))],
            (true, true) => vec![
                format!("{};", call(&format!("{base}_nuw"))),
                format!("{dest} = {};", call(&format!("{base}_nsw"))),
            ],
        };
        let nsw = checked && flags.nsw;
        let nuw = checked && flags.nuw;
        let exact = checked && flags.exact;
        let unsigned = ty.unsigned_type();
        let rust_ty = ty.rust_type();

        Ok(match op {
            BinaryOp::Add => flagged("add", nsw, nuw, format!("{lhs}.wrapping_add({rhs})")),
            BinaryOp::Sub => flagged("sub", nsw, nuw, format!("{lhs}.wrapping_sub({rhs})")),
            BinaryOp::Mul => flagged("mul", nsw, nuw, format!("{lhs}.wrapping_mul({rhs})")),
            BinaryOp::Shl => flagged("shl", nsw, nuw, format!("{lhs}.wrapping_shl({rhs} as u32)")),
            BinaryOp::SDiv if exact => vec![format!("{dest} = {};", call("sdiv_exact"))],
            BinaryOp::UDiv if exact => vec![format!("{dest} = {};", call("udiv_exact"))],
            BinaryOp::SDiv => vec![format!("{dest} = {};", call("sdiv"))],
            BinaryOp::UDiv => vec![format!("{dest} = {};", call("udiv"))],
            // Division traps even under the wrap policy: there is no value to wrap to.
            BinaryOp::SRem => vec![format!("{dest} = {};", call("srem"))],
            BinaryOp::URem => vec![format!("{dest} = {};", call("urem"))],
            BinaryOp::LShr if exact => vec![format!("{dest} = {};", call("lshr_exact"))],
            BinaryOp::LShr => vec![format!(
                "{dest} = ({lhs} as {unsigned}).wrapping_shr({rhs} as u32) as {rust_ty};"
            )],
            BinaryOp::AShr if exact => vec![format!("{dest} = {};", call("ashr_exact"))],
            BinaryOp::AShr => vec![format!("{dest} = {lhs}.wrapping_shr({rhs} as u32);")],
            BinaryOp::And => vec![format!("{dest} = {lhs} & {rhs};")],
            BinaryOp::Or => vec![format!("{dest} = {lhs} | {rhs};")],
            BinaryOp::Xor => vec![format!("{dest} = {lhs} ^ {rhs};")],
            float => return Err(format!("`{}` on integer type {rust_ty}", float.opcode())),
        })
    }
}

impl Backend for SafeBackend {
    fn int_literal(&self, value: i128, ty: Scalar) -> String {
        match ty {
            Scalar::Bool => (value & 1 != 0).to_string(),
            Scalar::Ptr => format!("{}u64", value as u64),
            Scalar::F32 | Scalar::F64 => self.float_literal(value as f64, ty),
            Scalar::Int(bits) => {
                let rust_ty = ty.rust_type();
                let v = wrap_to_width(value, bits.min(128));
                if bits < 128 && v == -(1i128 << (bits - 1)) || bits == 128 && v == i128::MIN {
                    format!("{rust_ty}::MIN")
                } else if v < 0 {
                    format!("({v}{rust_ty})")
                } else {
                    format!("{v}{rust_ty}")
                }
            }
        }
    }

    fn float_literal(&self, value: f64, ty: Scalar) -> String {
        match ty {
            Scalar::F32 => {
                let v = value as f32;
                float_const(f64::from(v), "f32", v.to_string())
            }
            _ => float_const(value, "f64", value.to_string()),
        }
    }

    fn emit_assign(&self, dest: &str, src: &str) -> String {
        format!("{dest} = {src};")
    }

    fn emit_binop(
        &self,
        dest: &str,
        op: BinaryOp,
        ty: Scalar,
        operands: (&str, &str),
        flags: WrapFlags,
        overflow: OverflowPolicy,
    ) -> Result<Vec<String>, String> {
        let (lhs, rhs) = operands;
        match ty {
            Scalar::Int(_) => self.int_binop(dest, op, ty, operands, flags, overflow == OverflowPolicy::Trap),
            Scalar::Bool => match op {
                // i1 arithmetic is arithmetic modulo 2.
                BinaryOp::Add | BinaryOp::Sub | BinaryOp::Xor => Ok(vec![format!("{dest} = {lhs} ^ {rhs};")]),
                BinaryOp::Mul | BinaryOp::And => Ok(vec![format!("{dest} = {lhs} & {rhs};")]),
                BinaryOp::Or => Ok(vec![format!("{dest} = {lhs} | {rhs};")]),
                other => Err(format!("`{}` on i1 is not supported", other.opcode())),
            },
            Scalar::F32 | Scalar::F64 => {
                let sym = match op {
                    BinaryOp::FAdd => "+",
                    BinaryOp::FSub => "-",
                    BinaryOp::FMul => "*",
                    BinaryOp::FDiv => "/",
                    BinaryOp::FRem => "%",
                    other => return Err(format!("`{}` on a float type", other.opcode())),
                };
                Ok(vec![format!("{dest} = {lhs} {sym} {rhs};")])
            }
            Scalar::Ptr => Err(format!("`{}` on a pointer", op.opcode())),
        }
    }

    fn emit_icmp(&self, dest: &str, pred: IntPredicate, ty: Scalar, lhs: &str, rhs: &str) -> String {
        use IntPredicate::*;
        let sym = match pred {
            Eq => "==",
            Ne => "!=",
            Ugt | Sgt => ">",
            Uge | Sge => ">=",
            Ult | Slt => "<",
            Ule | Sle => "<=",
        };
        let signed = matches!(pred, Sgt | Sge | Slt | Sle);
        let unsigned = matches!(pred, Ugt | Uge | Ult | Ule);
        match ty {
            // As a signed i1, true is -1: the signed order is the reverse of bool's.
            Scalar::Bool if signed => {
                let flipped = match pred {
                    Sgt => "<",
                    Sge => "<=",
                    Slt => ">",
                    _ => ">=",
                };
                format!("{dest} = {lhs} {flipped} {rhs};")
            }
            Scalar::Int(_) if unsigned => {
                let u = ty.unsigned_type();
                format!("{dest} = ({lhs} as {u}) {sym} ({rhs} as {u});")
            }
            Scalar::Ptr if signed => format!("{dest} = ({lhs} as i64) {sym} ({rhs} as i64);"),
            _ => format!("{dest} = {lhs} {sym} {rhs};"),
        }
    }

    fn emit_fcmp(&self, dest: &str, pred: FloatPredicate, lhs: &str, rhs: &str) -> String {
        use FloatPredicate::*;
        // Rust's float comparisons are the ordered predicates, except `!=`.
        let expr = match pred {
            False => "false".to_string(),
            True => "true".to_string(),
            Oeq => format!("{lhs} == {rhs}"),
            Ogt => format!("{lhs} > {rhs}"),
            Oge => format!("{lhs} >= {rhs}"),
            Olt => format!("{lhs} < {rhs}"),
            Ole => format!("{lhs} <= {rhs}"),
            One => format!("({lhs} < {rhs} || {lhs} > {rhs})"),
            Ord => format!("(!{lhs}.is_nan() && !{rhs}.is_nan())"),
            Ueq => format!("!({lhs} < {rhs} || {lhs} > {rhs})"),
            Ugt => format!("!({lhs} <= {rhs})"),
            Uge => format!("!({lhs} < {rhs})"),
            Ult => format!("!({lhs} >= {rhs})"),
            Ule => format!("!({lhs} > {rhs})"),
            Une => format!("{lhs} != {rhs}"),
            Uno => format!("({lhs}.is_nan() || {rhs}.is_nan())"),
        };
        format!("{dest} = {expr};")
    }

    fn emit_select(&self, dest: &str, cond: &str, then_value: &str, else_value: &str) -> String {
        format!("{dest} = if {cond} {{ {then_value} }} else {{ {else_value} }};")
    }

    fn emit_fneg(&self, dest: &str, value: &str) -> String {
        if value.starts_with('-') {
            format!("{dest} = -({value});")
        } else {
            format!("{dest} = -{value};")
        }
    }

    fn emit_cast(&self, dest: &str, op: CastOp, from: Scalar, to: Scalar, value: &str) -> Option<String> {
        use Scalar::*;
        let t = to.rust_type();
        let expr = match op {
            CastOp::Trunc => match (from, to) {
                (Int(_), Bool) => format!("({value} & 1) != 0"),
                (Int(a), Int(b)) if b <= a => format!("{value} as {t}"),
                _ => return None,
            },
            CastOp::ZExt => match (from, to) {
                (Bool, Int(_)) => format!("{value} as {t}"),
                (Int(a), Int(b)) if a <= b => format!("({value} as {}) as {t}", from.unsigned_type()),
                _ => return None,
            },
            CastOp::SExt => match (from, to) {
                (Bool, Int(_)) => format!("({value} as {t}).wrapping_neg()"),
                (Int(a), Int(b)) if a <= b => format!("{value} as {t}"),
                _ => return None,
            },
            CastOp::FpTrunc => match (from, to) {
                (F64, F32) => format!("{value} as f32"),
                _ => return None,
            },
            CastOp::FpExt => match (from, to) {
                (F32, F64) => format!("{value} as f64"),
                _ => return None,
            },
            CastOp::FpToSi | CastOp::FpToUi => match (from, to) {
                (F32 | F64, Int(_)) => {
                    let base = if op == CastOp::FpToSi { "fptosi" } else { "fptoui" };
                    format!("{}({value})?", ops_path(to, &format!("{base}_{}", from.rust_type())))
                }
                _ => return None,
            },
            CastOp::SiToFp => match (from, to) {
                (Bool, F32 | F64) => format!("({value} as i8).wrapping_neg() as {t}"),
                (Int(_), F32 | F64) => format!("{value} as {t}"),
                _ => return None,
            },
            CastOp::UiToFp => match (from, to) {
                (Bool, F32 | F64) => format!("({value} as u8) as {t}"),
                (Int(_), F32 | F64) => format!("({value} as {}) as {t}", from.unsigned_type()),
                _ => return None,
            },
            CastOp::PtrToInt => match (from, to) {
                (Ptr, Bool) => format!("({value} & 1) != 0"),
                (Ptr, Int(_)) => format!("{value} as {t}"),
                _ => return None,
            },
            CastOp::IntToPtr => match (from, to) {
                (Bool, Ptr) => format!("{value} as u64"),
                (Int(_), Ptr) => format!("({value} as {}) as u64", from.unsigned_type()),
                _ => return None,
            },
            CastOp::Bitcast => match (from, to) {
                (a, b) if a == b => value.to_string(),
                (Int(32), F32) => format!("f32::from_bits({value} as u32)"),
                (Int(64), F64) => format!("f64::from_bits({value} as u64)"),
                (F32, Int(32)) => format!("{value}.to_bits() as i32"),
                (F64, Int(64)) => format!("{value}.to_bits() as i64"),
                _ => return None,
            },
            CastOp::AddrSpaceCast => match (from, to) {
                (Ptr, Ptr) => value.to_string(),
                _ => return None,
            },
        };
        Some(format!("{dest} = {expr};"))
    }

    fn emit_alloca(&self, dest: &str, size: &str, align: u64) -> String {
        format!("{dest} = ctx.memory.alloca({size}, {align})?;")
    }

    fn emit_load(&self, dest: &str, ty: Scalar, addr: &str) -> String {
        format!("{dest} = ctx.memory.load_{}({addr})?;", ty.memory_suffix())
    }

    fn emit_store(&self, ty: Scalar, addr: &str, value: &str) -> String {
        format!("ctx.memory.store_{}({addr}, {value})?;", ty.memory_suffix())
    }

    fn emit_gep(&self, dest: &str, base: &str, offset: i64, terms: &[(String, i64)]) -> String {
        let mut expr = base.to_string();
        if offset > 0 {
            expr = format!("{expr}.wrapping_add({offset}u64)");
        } else if offset < 0 {
            expr = format!("{expr}.wrapping_sub({}u64)", offset.unsigned_abs());
        }
        for (index, stride) in terms {
            expr = format!("{expr}.wrapping_add(({index} as i64).wrapping_mul({stride}i64) as u64)");
        }
        format!("{dest} = {expr};")
    }

    fn emit_call(&self, dest: Option<&str>, callee: &str, args: &[String]) -> String {
        let mut call_args = vec!["ctx".to_string()];
        call_args.extend(args.iter().cloned());
        let call = format!("{callee}({})?", call_args.join(", "));
        match dest {
            Some(d) => format!("{d} = {call};"),
            None => format!("{call};"),
        }
    }

    fn emit_call_external(&self, dest: Option<&str>, name: &str, args: &[String], ret: &str) -> String {
        let values: Vec<String> = args.iter().map(|a| format!("Value::from({a})")).collect();
        let call = format!("ctx.call_external({name:?}, &[{}])?", values.join(", "));
        match dest {
            Some(d) => format!("{d} = {call}.get::<{ret}>()?;"),
            None => format!("{call};"),
        }
    }

    fn emit_intrinsic(
        &self,
        dest: Option<&str>,
        path: &str,
        args: &[String],
        fallible: bool,
        memory: bool,
    ) -> String {
        let mut call_args = Vec::with_capacity(args.len() + 1);
        if memory {
            call_args.push("&mut ctx.memory".to_string());
        }
        call_args.extend(args.iter().cloned());
        let q = if fallible { "?" } else { "" };
        let call = format!("{path}({}){q}", call_args.join(", "));
        match dest {
            Some(d) => format!("{d} = {call};"),
            None => format!("{call};"),
        }
    }

    fn emit_phi_copies(&self, copies: &[(String, String)]) -> Option<String> {
        match copies {
            [] => None,
            [(dest, src)] => Some(format!("{dest} = {src};")),
            _ => {
                let dests: Vec<&str> = copies.iter().map(|(d, _)| d.as_str()).collect();
                let srcs: Vec<&str> = copies.iter().map(|(_, s)| s.as_str()).collect();
                Some(format!("({}) = ({});", dests.join(", "), srcs.join(", ")))
            }
        }
    }

    fn emit_set_block(&self, target: BlockId) -> String {
        format!("__current_block = Block::{target};")
    }

    fn emit_return(&self, value: Option<&str>) -> String {
        match value {
            Some(v) => format!("return Ok({v});"),
            None => "return Ok(());".to_string(),
        }
    }

    fn emit_unreachable(&self) -> String {
        "return Err(Trap::Unreachable.into());".to_string()
    }
}
