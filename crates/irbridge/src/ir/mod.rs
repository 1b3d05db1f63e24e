//! Intermediate representation read from the shim.

pub mod reader;
pub mod types;

pub use reader::{IrReader, REQUIRED_SHIM_VERSION};
pub use types::*;
