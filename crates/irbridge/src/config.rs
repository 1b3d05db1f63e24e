//! Translation configuration.
//!
//! A [`TargetProfile`] captures the per-target decisions the translator must
//! not guess: how wide an integer may be, what to do with an unregistered
//! intrinsic, and whether `nsw`/`nuw`/`exact` promises are checked.

use serde::{Deserialize, Serialize};

/// What to do with a call to a declared function that is not a registered intrinsic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnknownIntrinsicPolicy {
    /// Fail the function with `UnsupportedIntrinsic`.
    #[default]
    Reject,
    /// Emit `ctx.call_external(..)`, resolved at run time.
    External,
}

/// Treatment of the `nsw`, `nuw` and `exact` instruction flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// A broken promise traps with `IntegerOverflow`.
    #[default]
    Trap,
    /// Flags are ignored and the operation wraps.
    Wrap,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetProfile {
    pub name: String,
    /// Widest integer type accepted by the type mapper (64 or 128).
    pub max_int_width: u32,
    pub unknown_intrinsics: UnknownIntrinsicPolicy,
    pub overflow: OverflowPolicy,
    /// Statement limit per emitted function.
    pub max_statements: usize,
    /// Drop the status check after a may-throw intrinsic whose constant
    /// operands prove it cannot raise.
    pub elide_proven_checks: bool,
}

impl Default for TargetProfile {
    fn default() -> Self {
        Self {
            name: "safe-rust".to_string(),
            max_int_width: 64,
            unknown_intrinsics: UnknownIntrinsicPolicy::Reject,
            overflow: OverflowPolicy::Trap,
            max_statements: 100_000,
            elide_proven_checks: false,
        }
    }
}

impl TargetProfile {
    /// Parse a profile from JSON. Missing fields take their defaults.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

/// Configuration options for transpilation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TranspileOptions {
    pub profile: TargetProfile,
    /// Translate functions on the rayon thread pool.
    pub parallel: bool,
}

impl Default for TranspileOptions {
    fn default() -> Self {
        Self {
            profile: TargetProfile::default(),
            parallel: true,
        }
    }
}
