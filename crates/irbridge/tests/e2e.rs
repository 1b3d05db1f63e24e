//! End-to-end integration tests for irbridge.
//!
//! These tests verify the complete pipeline: LLVM IR text → IR → Rust source.

use anyhow::Result;
use irbridge::{inspect, transpile, TranslateError, TranspileOptions, UnknownIntrinsicPolicy};
use pretty_assertions::assert_eq;

fn transpile_ir(source: &str) -> Result<String> {
    transpile(source.as_bytes(), &TranspileOptions::default())
}

fn translate_error(source: &str, options: &TranspileOptions) -> TranslateError {
    let err = transpile(source.as_bytes(), options).expect_err("translation should fail");
    match err.downcast::<TranslateError>() {
        Ok(e) => e,
        Err(other) => panic!("expected a TranslateError, got {other:?}"),
    }
}

#[test]
fn test_simple_add() -> Result<()> {
    let ir = r#"
        define i32 @add(i32 %a, i32 %b) {
        entry:
          %sum = add i32 %a, %b
          ret i32 %sum
        }
    "#;

    let rust_code = transpile_ir(ir)?;

    assert!(rust_code.contains("use irbridge_runtime::*;"));
    assert!(rust_code.contains("pub fn new_context() -> Context"));
    assert!(rust_code.contains("pub fn add(ctx: &mut Context, mut v0: i32, mut v1: i32) -> Outcome<i32>"));
    assert!(rust_code.contains("v2 = v0.wrapping_add(v1);"));
    assert!(rust_code.contains("return Ok(v2);"));
    // Single block: no state machine.
    assert!(!rust_code.contains("enum Block"));
    Ok(())
}

#[test]
fn test_nsw_flags_follow_the_overflow_policy() -> Result<()> {
    let ir = r#"
        define i64 @scale(i64 %x) {
          %r = mul nsw i64 %x, 3
          ret i64 %r
        }
    "#;

    let checked = transpile_ir(ir)?;
    assert!(checked.contains("v1 = irbridge_runtime::ops::i64::mul_nsw(v0, 3i64)?;"));

    let mut options = TranspileOptions::default();
    options.profile.overflow = irbridge::OverflowPolicy::Wrap;
    let wrapped = transpile(ir.as_bytes(), &options)?;
    assert!(wrapped.contains("v1 = v0.wrapping_mul(3i64);"));
    Ok(())
}

#[test]
fn test_division_traps_through_ops() -> Result<()> {
    let ir = r#"
        define i32 @quot(i32 %a, i32 %b) {
          %q = sdiv i32 %a, %b
          %r = urem i32 %a, %b
          %s = add i32 %q, %r
          ret i32 %s
        }
    "#;

    let rust_code = transpile_ir(ir)?;
    assert!(rust_code.contains("irbridge_runtime::ops::i32::sdiv(v0, v1)?"));
    assert!(rust_code.contains("irbridge_runtime::ops::i32::urem(v0, v1)?"));
    Ok(())
}

#[test]
fn test_may_throw_intrinsic_propagates() -> Result<()> {
    let ir = r#"
        declare i32 @checked_div(i32, i32)

        define i32 @safe_div(i32 %a, i32 %b) {
        entry:
          %q = call i32 @checked_div(i32 %a, i32 %b)
          ret i32 %q
        }
    "#;

    let rust_code = transpile_ir(ir)?;
    assert!(rust_code.contains("let __r = irbridge_runtime::intrinsics::i32::checked_div(v0, v1);"));
    assert!(rust_code.contains("v2 = __r.value;"));
    assert!(rust_code.contains("if let Status::Pending(__e) = __r.status {"));
    assert!(rust_code.contains("return Err(Fault::Exception(__e));"));
    // The declaration itself is not emitted.
    assert!(!rust_code.contains("pub fn checked_div"));
    Ok(())
}

#[test]
fn test_proven_checks_are_elided_when_enabled() -> Result<()> {
    let ir = r#"
        declare i32 @checked_div(i32, i32)

        define i32 @half(i32 %a) {
          %q = call i32 @checked_div(i32 %a, i32 2)
          ret i32 %q
        }
    "#;

    assert!(transpile_ir(ir)?.contains("Status::Pending"));

    let mut options = TranspileOptions::default();
    options.profile.elide_proven_checks = true;
    let elided = transpile(ir.as_bytes(), &options)?;
    assert!(elided.contains("v1 = __r.value;"));
    assert!(!elided.contains("Status::Pending"));
    Ok(())
}

#[test]
fn test_invoke_catches_into_landing_pad() -> Result<()> {
    let ir = r#"
        declare void @irbridge.throw(i32)
        declare i32 @__gxx_personality_v0(...)

        define i32 @guarded(i32 %code) personality ptr @__gxx_personality_v0 {
        entry:
          invoke void @irbridge.throw(i32 %code)
                  to label %ok unwind label %lpad

        ok:
          ret i32 0

        lpad:
          %ex = landingpad { ptr, i32 }
                  catch ptr null
          ret i32 1
        }
    "#;

    let rust_code = transpile_ir(ir)?;
    assert!(rust_code.contains("enum Block { B0, B1, B2 }"));
    assert!(rust_code.contains("let mut __exception: Option<Exception> = None;"));
    assert!(rust_code.contains("__exception = Some(__e);"));
    assert!(rust_code.contains("__current_block = Block::B2;"));
    assert!(rust_code.contains(" = __exception.take();"));
    Ok(())
}

#[test]
fn test_phi_and_loop_become_state_machine() -> Result<()> {
    let ir = r#"
        define i32 @sum_to(i32 %n) {
        entry:
          br label %loop

        loop:
          %i = phi i32 [ 0, %entry ], [ %next, %loop ]
          %acc = phi i32 [ 0, %entry ], [ %acc.next, %loop ]
          %acc.next = add i32 %acc, %i
          %next = add i32 %i, 1
          %done = icmp sge i32 %next, %n
          br i1 %done, label %exit, label %loop

        exit:
          ret i32 %acc.next
        }
    "#;

    let rust_code = transpile_ir(ir)?;
    assert!(rust_code.contains("let mut __current_block = Block::B0;"));
    assert!(rust_code.contains("Block::B1 => {"));
    // Both phis are updated together on the back edge.
    assert!(rust_code.contains(") = ("));

    let summary = inspect(&rust_code);
    assert_eq!(summary.functions, vec![("sum_to".to_string(), 3)]);
    Ok(())
}

#[test]
fn test_globals_and_memory() -> Result<()> {
    let ir = r#"
        @counter = global i32 7, align 4
        @msg = private constant [3 x i8] c"hi\00"

        define i32 @bump() {
          %old = load i32, ptr @counter, align 4
          %new = add i32 %old, 1
          store i32 %new, ptr @counter, align 4
          ret i32 %new
        }

        define i8 @second() {
          %p = getelementptr inbounds [3 x i8], ptr @msg, i64 0, i64 1
          %c = load i8, ptr %p
          ret i8 %c
        }
    "#;

    let rust_code = transpile_ir(ir)?;
    assert!(rust_code.contains("pub const GLOBAL_COUNTER: u64 = 64;"));
    assert!(rust_code.contains("pub const GLOBAL_MSG: u64 = 68;"));
    assert!(rust_code.contains("7, 0, 0, 0, 104, 105, 0,"));
    assert!(rust_code.contains("ctx.memory.load_i32(GLOBAL_COUNTER)?"));
    assert!(rust_code.contains("ctx.memory.store_i32(GLOBAL_COUNTER, v1)?"));
    Ok(())
}

#[test]
fn test_alloca_uses_a_frame() -> Result<()> {
    let ir = r#"
        define i64 @roundtrip(i64 %x) {
          %slot = alloca i64, align 8
          store i64 %x, ptr %slot, align 8
          %y = load i64, ptr %slot, align 8
          ret i64 %y
        }
    "#;

    let rust_code = transpile_ir(ir)?;
    assert!(rust_code.contains("let __frame = ctx.memory.enter_frame();"));
    assert!(rust_code.contains("ctx.memory.leave_frame(__frame);"));
    assert!(rust_code.contains("fn __roundtrip_body(ctx: &mut Context, mut v0: i64)"));
    assert!(rust_code.contains("ctx.memory.alloca(8u64, 8)?"));
    Ok(())
}

#[test]
fn test_unknown_declaration_is_rejected_by_default() {
    let ir = r#"
        declare i32 @puts(ptr)

        define void @hello(ptr %s) {
        entry:
          %r = call i32 @puts(ptr %s)
          ret void
        }
    "#;

    match translate_error(ir, &TranspileOptions::default()) {
        TranslateError::UnsupportedIntrinsic { name, function, block } => {
            assert_eq!(name, "puts");
            assert_eq!(function, "@hello");
            assert_eq!(block, "entry");
        }
        other => panic!("unexpected error: {other}"),
    }

    let mut options = TranspileOptions::default();
    options.profile.unknown_intrinsics = UnknownIntrinsicPolicy::External;
    let rust_code = transpile(ir.as_bytes(), &options).unwrap();
    assert!(rust_code.contains(r#"ctx.call_external("puts", &[Value::from(v0)])?.get::<i32>()?"#));
}

#[test]
fn test_calls_between_defined_functions() -> Result<()> {
    let ir = r#"
        define i32 @inc(i32 %x) {
          %y = add i32 %x, 1
          ret i32 %y
        }

        define i32 @twice(i32 %x) {
          %a = call i32 @inc(i32 %x)
          %b = call i32 @inc(i32 %a)
          ret i32 %b
        }
    "#;

    let rust_code = transpile_ir(ir)?;
    assert!(rust_code.contains("v1 = inc(ctx, v0)?;"));
    assert!(rust_code.contains("v2 = inc(ctx, v1)?;"));
    Ok(())
}

#[test]
fn test_mangled_names_are_demangled() -> Result<()> {
    let ir = r#"
        define i32 @_Z6squarei(i32 %x) {
          %y = mul i32 %x, %x
          ret i32 %y
        }
    "#;

    let rust_code = transpile_ir(ir)?;
    assert!(rust_code.contains("pub fn square(ctx: &mut Context, mut v0: i32)"));
    assert!(rust_code.contains("// irbridge: fn _Z6squarei blocks=1"));
    Ok(())
}

#[test]
fn test_syntax_errors_are_reported() {
    match translate_error("define i32 @f( {", &TranspileOptions::default()) {
        TranslateError::Parse { .. } => {}
        other => panic!("unexpected error: {other}"),
    }
}
