//! Code generation: emits Rust source code from IR.
//!
//! ```text
//!   Module ──► ModuleTranslator ──► FunctionTranslator ──► emit ──► emit_module
//!              (globals, names)     (Backend statements)   (text)    (artifact)
//! ```
//!
//! - **`module`**: orchestration, global layout, identifier assignment, rayon fan-out
//! - **`function`**: lowering of one function into per-block statements
//! - **`exceptions`**: status checks after may-throw intrinsic calls
//! - **`globals`**: addresses and initial bytes of global variables
//! - **`emit`**: function and module text, artifact inspection
//! - **`utils`**: Rust identifiers for IR symbols

pub mod emit;
pub mod exceptions;
pub mod function;
pub mod globals;
pub mod module;
pub mod utils;

pub use emit::{emit, emit_module, emit_stub, inspect, ArtifactSummary};
pub use exceptions::{ExceptionRewriter, Handler, ThrowingCall};
pub use function::{FunctionTranslator, ModuleContext, TargetFunction};
pub use globals::{GlobalLayout, GLOBALS_BASE};
pub use module::{CancellationToken, EmittedFunction, ModuleTranslation, ModuleTranslator, SkippedFunction};
