//! irbridge: LLVM IR to safe Rust translator.
//!
//! This crate reads textual LLVM IR through the `irbridge-shim` object
//! model and emits Rust source that runs against `irbridge-runtime`.
//! Intrinsics that emulate C++ exceptions are rewritten into explicit
//! status checks at every call site.

pub mod backend;
pub mod codegen;
pub mod config;
pub mod error;
pub mod intrinsics;
pub mod ir;
pub mod mapper;

// Re-export key types for convenience
pub use anyhow::{Context, Result};
pub use codegen::{inspect, ArtifactSummary, CancellationToken, ModuleTranslation, ModuleTranslator};
pub use config::{OverflowPolicy, TargetProfile, TranspileOptions, UnknownIntrinsicPolicy};
pub use error::TranslateError;

use irbridge_shim::TextShim;
use ir::{IrReader, Module};

/// Transpile a textual LLVM IR module to Rust source code.
///
/// # Example
/// ```no_run
/// use irbridge::{transpile, TranspileOptions};
///
/// let ir = std::fs::read("input.ll").unwrap();
/// let rust_code = transpile(&ir, &TranspileOptions::default()).unwrap();
/// std::fs::write("output.rs", rust_code).unwrap();
/// ```
pub fn transpile(source: &[u8], options: &TranspileOptions) -> Result<String> {
    let module = read_module(source)?;
    let translation = translate_module(&module, options, &CancellationToken::new())?;
    Ok(codegen::emit_module(&translation))
}

/// Parse and read a module with the in-process shim.
pub fn read_module(source: &[u8]) -> Result<Module> {
    let shim = TextShim::new();
    let reader = IrReader::connect(&shim).context("failed to connect to the IR shim")?;
    reader.read_buffer(source).context("failed to read LLVM IR module")
}

pub fn translate_module(
    module: &Module,
    options: &TranspileOptions,
    cancel: &CancellationToken,
) -> Result<ModuleTranslation> {
    ModuleTranslator::new(options, cancel.clone())
        .translate(module)
        .context("failed to generate Rust code")
}
