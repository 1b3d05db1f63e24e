//! irbridge-shim: the interop surface between irbridge and LLVM IR modules.
//!
//! Modules are opened into handles. Every query names a handle plus
//! positional indices (function, block, instruction) and returns owned
//! records, so callers never hold references into a module's storage.
//!
//! The same surface is exported as a C ABI from the `cdylib` build (see
//! [`ffi`]) and staged under `runtimes/<rid>/native/` (see [`layout`]).

pub mod ffi;
pub mod layout;
pub mod model;

mod demangle;
mod handles;
mod parse;

use std::fmt;
use std::path::Path;

pub use demangle::demangle;
pub use handles::TextShim;
pub use model::*;

/// Version of the query surface.
///
/// Consumers accept a shim with the same major version and a minor version
/// at least as new as the one they were built against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AbiVersion {
    pub major: u16,
    pub minor: u16,
}

impl AbiVersion {
    pub const fn new(major: u16, minor: u16) -> Self {
        Self { major, minor }
    }

    /// Whether a shim reporting `self` can serve a consumer built against `required`.
    pub fn satisfies(self, required: AbiVersion) -> bool {
        self.major == required.major && self.minor >= required.minor
    }

    /// Packed form used across the C ABI: `major << 16 | minor`.
    pub const fn packed(self) -> u32 {
        ((self.major as u32) << 16) | self.minor as u32
    }

    pub const fn from_packed(raw: u32) -> Self {
        Self {
            major: (raw >> 16) as u16,
            minor: (raw & 0xffff) as u16,
        }
    }
}

impl fmt::Display for AbiVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Version implemented by this crate.
pub const ABI_VERSION: AbiVersion = AbiVersion::new(1, 2);

/// Opaque module handle. Handle values are never reused within a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModuleHandle(pub u64);

impl fmt::Display for ModuleHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ShimError {
    #[error("invalid or released module handle {0}")]
    InvalidHandle(ModuleHandle),

    #[error("parse error at byte {offset} (line {line}, column {column}): {message}")]
    Parse {
        offset: usize,
        line: usize,
        column: usize,
        message: String,
    },

    #[error("{what} index {index} out of range (count {count})")]
    OutOfRange {
        what: &'static str,
        index: usize,
        count: usize,
    },

    #[error("no value named %{name} in function {function}")]
    UnknownValue { function: String, name: String },

    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

pub type ShimResult<T> = Result<T, ShimError>;

/// The query surface over opened modules.
///
/// Implementations must accept concurrent queries on the same handle; a
/// handle is read-only once opened.
pub trait ShimApi: Send + Sync {
    fn abi_version(&self) -> AbiVersion;

    // ── Lifecycle ──
    fn open_buffer(&self, bytes: &[u8]) -> ShimResult<ModuleHandle>;
    fn open_path(&self, path: &Path) -> ShimResult<ModuleHandle>;
    fn close(&self, handle: ModuleHandle) -> ShimResult<()>;

    // ── Enumeration ──
    fn module_info(&self, handle: ModuleHandle) -> ShimResult<ModuleInfoRecord>;
    fn named_types(&self, handle: ModuleHandle) -> ShimResult<Vec<NamedTypeRecord>>;
    fn global_count(&self, handle: ModuleHandle) -> ShimResult<usize>;
    fn global(&self, handle: ModuleHandle, index: usize) -> ShimResult<GlobalRecord>;
    fn function_count(&self, handle: ModuleHandle) -> ShimResult<usize>;
    fn function(&self, handle: ModuleHandle, index: usize) -> ShimResult<FunctionRecord>;
    fn block(&self, handle: ModuleHandle, func: usize, block: usize) -> ShimResult<BlockRecord>;
    fn instruction(
        &self,
        handle: ModuleHandle,
        func: usize,
        block: usize,
        index: usize,
    ) -> ShimResult<InstructionRecord>;

    // ── Introspection ──
    fn value_type(&self, handle: ModuleHandle, func: usize, name: &str) -> ShimResult<TypeRecord>;
    fn function_return_type(&self, handle: ModuleHandle, func: usize) -> ShimResult<TypeRecord>;
    fn function_type(&self, handle: ModuleHandle, func: usize) -> ShimResult<TypeRecord>;
    /// Raw bytes of a global's constant data array initializer, if it has one.
    fn constant_data(&self, handle: ModuleHandle, global: usize) -> ShimResult<Option<Vec<u8>>>;
    fn demangled_name(&self, handle: ModuleHandle, func: usize) -> ShimResult<Option<String>>;
    fn has_no_signed_wrap(
        &self,
        handle: ModuleHandle,
        func: usize,
        block: usize,
        index: usize,
    ) -> ShimResult<bool>;
    fn has_no_unsigned_wrap(
        &self,
        handle: ModuleHandle,
        func: usize,
        block: usize,
        index: usize,
    ) -> ShimResult<bool>;
}
