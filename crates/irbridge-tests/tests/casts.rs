//! Execution tests for type conversions.

use irbridge_runtime::{Fault, Trap};
use irbridge_tests::casts;

#[test]
fn test_integer_widening_and_narrowing() {
    let mut ctx = casts::new_context();
    assert_eq!(casts::widen_signed(&mut ctx, -1).unwrap(), -1);
    assert_eq!(casts::widen_unsigned(&mut ctx, -1).unwrap(), 255);
    assert_eq!(casts::narrow(&mut ctx, 0x1ff).unwrap(), -1);
    assert_eq!(casts::narrow(&mut ctx, 300).unwrap(), 44);
}

#[test]
fn test_bool_conversions() {
    let mut ctx = casts::new_context();
    assert_eq!(casts::equal_as_int(&mut ctx, 3, 3).unwrap(), 1);
    assert_eq!(casts::equal_as_int(&mut ctx, 3, 4).unwrap(), 0);
    // i1 true is -1 when sign extended.
    assert_eq!(casts::bool_sext(&mut ctx, true).unwrap(), -1);
    assert_eq!(casts::bool_sext(&mut ctx, false).unwrap(), 0);
}

#[test]
fn test_float_to_int_truncates() {
    let mut ctx = casts::new_context();
    assert_eq!(casts::float_to_int(&mut ctx, 3.9).unwrap(), 3);
    assert_eq!(casts::float_to_int(&mut ctx, -2.5).unwrap(), -2);
}

#[test]
fn test_float_to_int_traps_out_of_range() {
    let mut ctx = casts::new_context();
    assert_eq!(
        casts::float_to_int(&mut ctx, f64::NAN),
        Err(Fault::Trap(Trap::InvalidConversion))
    );
    assert_eq!(
        casts::float_to_int(&mut ctx, 1e10),
        Err(Fault::Trap(Trap::InvalidConversion))
    );
}

#[test]
fn test_int_to_float_and_bits() {
    let mut ctx = casts::new_context();
    assert_eq!(casts::unsigned_to_float(&mut ctx, -1).unwrap(), 4294967295.0);
    assert_eq!(casts::float_bits(&mut ctx, 1.0).unwrap(), 0x3f80_0000);
    assert_eq!(casts::narrow_float(&mut ctx, 0.5).unwrap(), 0.5f32);
}

#[test]
fn test_pointer_roundtrip() {
    let mut ctx = casts::new_context();
    assert_eq!(casts::pointer_roundtrip(&mut ctx, 0x1234).unwrap(), 0x1234);
    assert_eq!(casts::pointer_roundtrip(&mut ctx, -1).unwrap(), -1);
}
