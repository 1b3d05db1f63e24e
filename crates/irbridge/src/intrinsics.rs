//! Intrinsic Registry.
//!
//! A static table from intrinsic name to its runtime implementation in
//! `irbridge_runtime::intrinsics`, the number of arguments the runtime
//! function takes, and whether it may raise an emulated exception. The
//! table is built once and never mutated.

use std::collections::HashMap;
use std::sync::OnceLock;

const RUNTIME: &str = "irbridge_runtime::intrinsics";

const INT_WIDTHS: &[&str] = &["i8", "i16", "i32", "i64"];
const FLOAT_WIDTHS: &[&str] = &["f32", "f64"];

/// How a call to the intrinsic is lowered. The string is the runtime
/// function name; overloaded entries live in a per-type module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Direct call producing a plain value.
    Pure(&'static str),
    /// Direct call returning `TrapResult`, propagated with `?`.
    Fallible(&'static str),
    /// Returns `Emulated<T>`; lowered by the exception rewriter.
    MayThrow(&'static str),
    /// Takes `&mut ctx.memory`, returns `TrapResult`.
    Memory(&'static str),
    /// Compiles to nothing.
    NoOp,
}

/// Decides, from the constant operands (`None` for non-constants) and the
/// integer width, that a may-throw call site cannot raise.
pub type NeverThrows = fn(&[Option<i128>], u32) -> bool;

#[derive(Debug, Clone, Copy)]
pub struct IntrinsicSpec {
    pub name: &'static str,
    /// Arguments passed to the runtime.
    pub arity: usize,
    /// IR operands after the runtime arguments that carry no meaning for
    /// the lowering (`isvolatile`, `is_int_min_poison`). A call site must
    /// supply exactly `arity + trailing` arguments.
    pub trailing: usize,
    pub may_throw: bool,
    pub strategy: Strategy,
    /// Rust types accepted for the first argument of an overloaded entry;
    /// empty when the entry is not overloaded.
    pub overloads: &'static [&'static str],
    /// Casts applied to each argument of a `Memory` entry.
    pub arg_casts: &'static [&'static str],
    pub never_throws: Option<NeverThrows>,
}

impl IntrinsicSpec {
    const fn new(name: &'static str, arity: usize, strategy: Strategy) -> Self {
        Self {
            name,
            arity,
            trailing: 0,
            may_throw: matches!(strategy, Strategy::MayThrow(_)),
            strategy,
            overloads: &[],
            arg_casts: &[],
            never_throws: None,
        }
    }

    const fn overloaded(mut self, widths: &'static [&'static str]) -> Self {
        self.overloads = widths;
        self
    }

    const fn trailing(mut self, trailing: usize) -> Self {
        self.trailing = trailing;
        self
    }

    /// Number of arguments a call site must pass.
    pub fn ir_arity(&self) -> usize {
        self.arity + self.trailing
    }

    const fn casts(mut self, casts: &'static [&'static str]) -> Self {
        self.arg_casts = casts;
        self
    }

    const fn proof(mut self, never_throws: NeverThrows) -> Self {
        self.never_throws = Some(never_throws);
        self
    }

    /// Fully qualified runtime path. `ty` selects the overload and must be
    /// one of [`IntrinsicSpec::overloads`] for overloaded entries.
    pub fn path(&self, ty: Option<&str>) -> Option<String> {
        let function = match self.strategy {
            Strategy::Pure(f) | Strategy::Fallible(f) | Strategy::MayThrow(f) | Strategy::Memory(f) => f,
            Strategy::NoOp => return None,
        };
        if self.overloads.is_empty() {
            return Some(format!("{RUNTIME}::{function}"));
        }
        let ty = ty.filter(|t| self.overloads.contains(t))?;
        Some(format!("{RUNTIME}::{ty}::{function}"))
    }
}

fn divisor_is_safe(args: &[Option<i128>], _bits: u32) -> bool {
    matches!(args.get(1), Some(Some(d)) if *d != 0 && *d != -1)
}

fn fits(value: Option<i128>, bits: u32) -> bool {
    let Some(v) = value else { return false };
    let min = -(1i128 << (bits - 1));
    let max = (1i128 << (bits - 1)) - 1;
    (min..=max).contains(&v)
}

fn constants(args: &[Option<i128>]) -> Option<(i128, i128)> {
    match args {
        [Some(a), Some(b), ..] => Some((*a, *b)),
        _ => None,
    }
}

fn add_is_safe(args: &[Option<i128>], bits: u32) -> bool {
    constants(args).is_some_and(|(a, b)| fits(a.checked_add(b), bits))
}

fn sub_is_safe(args: &[Option<i128>], bits: u32) -> bool {
    constants(args).is_some_and(|(a, b)| fits(a.checked_sub(b), bits))
}

fn mul_is_safe(args: &[Option<i128>], bits: u32) -> bool {
    constants(args).is_some_and(|(a, b)| fits(a.checked_mul(b), bits))
}

const SPECS: &[IntrinsicSpec] = &[
    // ── may throw ──
    IntrinsicSpec::new("checked_div", 2, Strategy::MayThrow("checked_div"))
        .overloaded(INT_WIDTHS)
        .proof(divisor_is_safe),
    IntrinsicSpec::new("checked_rem", 2, Strategy::MayThrow("checked_rem"))
        .overloaded(INT_WIDTHS)
        .proof(divisor_is_safe),
    IntrinsicSpec::new("checked_add", 2, Strategy::MayThrow("checked_add"))
        .overloaded(INT_WIDTHS)
        .proof(add_is_safe),
    IntrinsicSpec::new("checked_sub", 2, Strategy::MayThrow("checked_sub"))
        .overloaded(INT_WIDTHS)
        .proof(sub_is_safe),
    IntrinsicSpec::new("checked_mul", 2, Strategy::MayThrow("checked_mul"))
        .overloaded(INT_WIDTHS)
        .proof(mul_is_safe),
    IntrinsicSpec::new("irbridge.throw", 1, Strategy::MayThrow("throw")),
    IntrinsicSpec::new("__irbridge_throw", 1, Strategy::MayThrow("throw")),
    // ── pure integer ──
    IntrinsicSpec::new("llvm.smax", 2, Strategy::Pure("smax")).overloaded(INT_WIDTHS),
    IntrinsicSpec::new("llvm.smin", 2, Strategy::Pure("smin")).overloaded(INT_WIDTHS),
    IntrinsicSpec::new("llvm.umax", 2, Strategy::Pure("umax")).overloaded(INT_WIDTHS),
    IntrinsicSpec::new("llvm.umin", 2, Strategy::Pure("umin")).overloaded(INT_WIDTHS),
    IntrinsicSpec::new("llvm.abs", 1, Strategy::Pure("abs")).overloaded(INT_WIDTHS).trailing(1),
    IntrinsicSpec::new("llvm.ctpop", 1, Strategy::Pure("ctpop")).overloaded(INT_WIDTHS),
    IntrinsicSpec::new("llvm.ctlz", 1, Strategy::Pure("ctlz")).overloaded(INT_WIDTHS).trailing(1),
    IntrinsicSpec::new("llvm.cttz", 1, Strategy::Pure("cttz")).overloaded(INT_WIDTHS).trailing(1),
    IntrinsicSpec::new("llvm.bswap", 1, Strategy::Pure("bswap")).overloaded(INT_WIDTHS),
    // ── pure float ──
    IntrinsicSpec::new("llvm.fabs", 1, Strategy::Pure("fabs")).overloaded(FLOAT_WIDTHS),
    IntrinsicSpec::new("llvm.sqrt", 1, Strategy::Pure("sqrt")).overloaded(FLOAT_WIDTHS),
    IntrinsicSpec::new("llvm.floor", 1, Strategy::Pure("floor")).overloaded(FLOAT_WIDTHS),
    IntrinsicSpec::new("llvm.ceil", 1, Strategy::Pure("ceil")).overloaded(FLOAT_WIDTHS),
    IntrinsicSpec::new("llvm.trunc", 1, Strategy::Pure("trunc")).overloaded(FLOAT_WIDTHS),
    IntrinsicSpec::new("llvm.minnum", 2, Strategy::Pure("minnum")).overloaded(FLOAT_WIDTHS),
    IntrinsicSpec::new("llvm.maxnum", 2, Strategy::Pure("maxnum")).overloaded(FLOAT_WIDTHS),
    // ── memory ──
    IntrinsicSpec::new("llvm.memcpy", 3, Strategy::Memory("memcpy")).casts(&["u64", "u64", "u64"]).trailing(1),
    IntrinsicSpec::new("llvm.memmove", 3, Strategy::Memory("memmove")).casts(&["u64", "u64", "u64"]).trailing(1),
    IntrinsicSpec::new("llvm.memset", 3, Strategy::Memory("memset")).casts(&["u64", "u8", "u64"]).trailing(1),
    IntrinsicSpec::new("malloc", 1, Strategy::Memory("malloc")).casts(&["u64"]),
    IntrinsicSpec::new("calloc", 2, Strategy::Memory("calloc")).casts(&["u64", "u64"]),
    IntrinsicSpec::new("free", 1, Strategy::Memory("free")).casts(&["u64"]),
    // ── traps ──
    IntrinsicSpec::new("llvm.trap", 0, Strategy::Fallible("trap")),
    IntrinsicSpec::new("abort", 0, Strategy::Fallible("trap")),
    // ── markers ──
    IntrinsicSpec::new("llvm.lifetime.start", 0, Strategy::NoOp),
    IntrinsicSpec::new("llvm.lifetime.end", 0, Strategy::NoOp),
    IntrinsicSpec::new("llvm.assume", 0, Strategy::NoOp),
    IntrinsicSpec::new("llvm.dbg.declare", 0, Strategy::NoOp),
    IntrinsicSpec::new("llvm.dbg.value", 0, Strategy::NoOp),
    IntrinsicSpec::new("llvm.dbg.label", 0, Strategy::NoOp),
    IntrinsicSpec::new("llvm.dbg.assign", 0, Strategy::NoOp),
    IntrinsicSpec::new("llvm.experimental.noalias.scope.decl", 0, Strategy::NoOp),
];

pub struct IntrinsicRegistry {
    entries: HashMap<&'static str, IntrinsicSpec>,
}

impl IntrinsicRegistry {
    pub fn from_specs(specs: &[IntrinsicSpec]) -> Self {
        Self {
            entries: specs.iter().map(|s| (s.name, *s)).collect(),
        }
    }

    /// The process-wide standard library of intrinsics.
    pub fn standard() -> &'static IntrinsicRegistry {
        static STANDARD: OnceLock<IntrinsicRegistry> = OnceLock::new();
        STANDARD.get_or_init(|| IntrinsicRegistry::from_specs(SPECS))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Exact match first, then with trailing type suffixes stripped
    /// (`llvm.memcpy.p0.p0.i64` finds `llvm.memcpy`).
    pub fn lookup(&self, name: &str) -> Option<&IntrinsicSpec> {
        let mut candidate = name;
        loop {
            if let Some(spec) = self.entries.get(candidate) {
                return Some(spec);
            }
            let (base, suffix) = candidate.rsplit_once('.')?;
            if !is_type_suffix(suffix) {
                return None;
            }
            candidate = base;
        }
    }
}

/// `i32`, `f64`, `p0`, `v4i32`, `v2f64` and the like.
fn is_type_suffix(suffix: &str) -> bool {
    let digits = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
    match suffix.as_bytes().first() {
        Some(b'i' | b'p') => digits(&suffix[1..]),
        Some(b'f') => matches!(suffix, "f16" | "f32" | "f64" | "f80" | "f128"),
        Some(b'v') => {
            let rest = suffix[1..].trim_start_matches(|c: char| c.is_ascii_digit());
            rest.len() < suffix.len() - 1 && is_type_suffix(rest)
        }
        _ => false,
    }
}
