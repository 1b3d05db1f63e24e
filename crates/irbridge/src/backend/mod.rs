//! Code generation backends.
//!
//! The Backend trait is the seam between instruction lowering and the Rust
//! text it produces. Operands arrive already rendered as Rust expressions;
//! a backend returns unindented statements and the emitter places them.

mod safe;
pub use safe::SafeBackend;

use crate::config::OverflowPolicy;
use crate::ir::{BinaryOp, BlockId, CastOp, FloatPredicate, IntPredicate, WrapFlags};
use crate::mapper::Scalar;

/// Code generation backend trait.
///
/// Implementations are shared across translator threads.
pub trait Backend: Sync {
    /// Rust literal for an integer constant of type `ty`, wrapped to its width.
    fn int_literal(&self, value: i128, ty: Scalar) -> String;

    /// Rust literal for a float constant, handling NaN and infinities.
    fn float_literal(&self, value: f64, ty: Scalar) -> String;

    fn emit_assign(&self, dest: &str, src: &str) -> String;

    /// Integer or float arithmetic. `Err` carries the reason the operation
    /// cannot be lowered for `ty`.
    fn emit_binop(
        &self,
        dest: &str,
        op: BinaryOp,
        ty: Scalar,
        operands: (&str, &str),
        flags: WrapFlags,
        overflow: OverflowPolicy,
    ) -> Result<Vec<String>, String>;

    fn emit_icmp(&self, dest: &str, pred: IntPredicate, ty: Scalar, lhs: &str, rhs: &str) -> String;

    fn emit_fcmp(&self, dest: &str, pred: FloatPredicate, lhs: &str, rhs: &str) -> String;

    fn emit_select(&self, dest: &str, cond: &str, then_value: &str, else_value: &str) -> String;

    /// `fneg`: flips the sign bit, NaN and zero included.
    fn emit_fneg(&self, dest: &str, value: &str) -> String;

    /// `None` when the cast has no lowering between these scalars.
    fn emit_cast(&self, dest: &str, op: CastOp, from: Scalar, to: Scalar, value: &str) -> Option<String>;

    /// Stack allocation of `size` bytes (an expression of type `u64`).
    fn emit_alloca(&self, dest: &str, size: &str, align: u64) -> String;

    fn emit_load(&self, dest: &str, ty: Scalar, addr: &str) -> String;

    fn emit_store(&self, ty: Scalar, addr: &str, value: &str) -> String;

    /// Address arithmetic: `base + offset + sum(index * stride)`.
    fn emit_gep(&self, dest: &str, base: &str, offset: i64, terms: &[(String, i64)]) -> String;

    /// Call of a translated function, propagating its fault.
    fn emit_call(&self, dest: Option<&str>, callee: &str, args: &[String]) -> String;

    /// Call through `Context::call_external`. `ret` is the Rust return type.
    fn emit_call_external(&self, dest: Option<&str>, name: &str, args: &[String], ret: &str) -> String;

    /// Direct call of a runtime intrinsic. `fallible` appends `?`;
    /// `memory` passes `&mut ctx.memory` first.
    fn emit_intrinsic(
        &self,
        dest: Option<&str>,
        path: &str,
        args: &[String],
        fallible: bool,
        memory: bool,
    ) -> String;

    /// Parallel copies for phi nodes on one edge. `None` when there are none.
    fn emit_phi_copies(&self, copies: &[(String, String)]) -> Option<String>;

    /// Set the next block of the state machine (without `continue`).
    fn emit_set_block(&self, target: BlockId) -> String;

    fn emit_return(&self, value: Option<&str>) -> String;

    fn emit_unreachable(&self) -> String;
}
