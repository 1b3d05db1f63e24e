//! Execution tests for loops, phis, switches and unreachable code.

use irbridge_runtime::{Fault, Trap};
use irbridge_tests::{control, fibo_orig};

#[test]
fn test_loop_with_phis() {
    let mut ctx = control::new_context();
    assert_eq!(control::sum_to(&mut ctx, 5).unwrap(), 10);
    assert_eq!(control::sum_to(&mut ctx, 1).unwrap(), 0);
    assert_eq!(control::sum_to(&mut ctx, 101).unwrap(), 5050);
}

#[test]
fn test_phi_swap_is_parallel() {
    let mut ctx = control::new_context();
    for n in 0..25 {
        assert_eq!(control::fib(&mut ctx, n).unwrap(), fibo_orig(n), "fib({n})");
    }
}

#[test]
fn test_switch() {
    let mut ctx = control::new_context();
    assert_eq!(control::classify(&mut ctx, 0).unwrap(), 100);
    assert_eq!(control::classify(&mut ctx, 1).unwrap(), 101);
    assert_eq!(control::classify(&mut ctx, -1).unwrap(), 99);
    assert_eq!(control::classify(&mut ctx, 42).unwrap(), 0);
}

#[test]
fn test_unreachable_traps() {
    let mut ctx = control::new_context();
    assert_eq!(control::checked_index(&mut ctx, 3).unwrap(), 30);
    assert_eq!(
        control::checked_index(&mut ctx, 4),
        Err(Fault::Trap(Trap::Unreachable))
    );
}

#[test]
fn test_abort_traps() {
    let mut ctx = control::new_context();
    assert_eq!(control::fail(&mut ctx), Err(Fault::Trap(Trap::Abort)));
}
