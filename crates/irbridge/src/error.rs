//! Translation-time errors.
//!
//! These describe why the translator could not produce code. They are
//! distinct from the `Fault` values translated programs report at run time.

use irbridge_shim::{AbiVersion, ModuleHandle, ShimError};

#[derive(Debug, thiserror::Error)]
pub enum TranslateError {
    #[error("invalid or released module handle {0}")]
    InvalidHandle(ModuleHandle),

    #[error("parse error{}: {message}", at_offset(.offset))]
    Parse {
        offset: Option<usize>,
        message: String,
    },

    #[error("unsupported construct in {location}: {what}")]
    UnsupportedConstruct { what: String, location: String },

    #[error("unsupported type `{ty}`: {reason}")]
    UnsupportedType { ty: String, reason: String },

    #[error("unsupported intrinsic `{name}` called from {function} (block %{block})")]
    UnsupportedIntrinsic {
        name: String,
        function: String,
        block: String,
    },

    #[error("cannot lower `{opcode}` in {function} (block %{block}): {detail}")]
    UnsupportedInstruction {
        opcode: String,
        function: String,
        block: String,
        detail: String,
    },

    #[error("function {function} has {statements} statements, limit is {limit}")]
    EmissionLimitExceeded {
        function: String,
        statements: usize,
        limit: usize,
    },

    #[error("shim version {found} is incompatible with required {required}")]
    IncompatibleShimVersion {
        found: AbiVersion,
        required: AbiVersion,
    },

    #[error("translation cancelled")]
    Cancelled,

    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

fn at_offset(offset: &Option<usize>) -> String {
    offset.map(|o| format!(" at byte {o}")).unwrap_or_default()
}

impl TranslateError {
    pub(crate) fn parse(message: impl Into<String>) -> Self {
        TranslateError::Parse {
            offset: None,
            message: message.into(),
        }
    }

    /// Whether the module translator may skip the offending function and continue.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, TranslateError::EmissionLimitExceeded { .. })
    }
}

impl From<ShimError> for TranslateError {
    fn from(err: ShimError) -> Self {
        match err {
            ShimError::InvalidHandle(handle) => TranslateError::InvalidHandle(handle),
            ShimError::Parse {
                offset,
                line,
                column,
                message,
            } => TranslateError::Parse {
                offset: Some(offset),
                message: format!("line {line}, column {column}: {message}"),
            },
            ShimError::Io { path, source } => TranslateError::Io { path, source },
            other @ (ShimError::OutOfRange { .. } | ShimError::UnknownValue { .. }) => {
                TranslateError::parse(other.to_string())
            }
        }
    }
}
