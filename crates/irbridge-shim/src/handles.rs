//! Handle table for modules parsed from text.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;

use crate::model::*;
use crate::parse::{parse_module, ParsedBlock, ParsedFunction, ParsedModule};
use crate::{AbiVersion, ModuleHandle, ShimApi, ShimError, ShimResult, ABI_VERSION};

/// [`ShimApi`] implementation over textual `.ll` input.
///
/// Each open module is parsed once and stored behind an `Arc`; queries
/// clone records out of it. Handle numbers start at 1 and are never reused.
pub struct TextShim {
    modules: DashMap<u64, Arc<ParsedModule>>,
    next_handle: AtomicU64,
}

impl Default for TextShim {
    fn default() -> Self {
        Self::new()
    }
}

impl TextShim {
    pub fn new() -> Self {
        Self {
            modules: DashMap::new(),
            next_handle: AtomicU64::new(1),
        }
    }

    /// Number of handles currently open.
    pub fn open_handles(&self) -> usize {
        self.modules.len()
    }

    fn module(&self, handle: ModuleHandle) -> ShimResult<Arc<ParsedModule>> {
        self.modules
            .get(&handle.0)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(ShimError::InvalidHandle(handle))
    }

    fn with_function<T>(
        &self,
        handle: ModuleHandle,
        func: usize,
        f: impl FnOnce(&ParsedFunction) -> ShimResult<T>,
    ) -> ShimResult<T> {
        let module = self.module(handle)?;
        let function = module.functions.get(func).ok_or(ShimError::OutOfRange {
            what: "function",
            index: func,
            count: module.functions.len(),
        })?;
        f(function)
    }

    fn with_block<T>(
        &self,
        handle: ModuleHandle,
        func: usize,
        block: usize,
        f: impl FnOnce(&ParsedBlock) -> ShimResult<T>,
    ) -> ShimResult<T> {
        self.with_function(handle, func, |function| {
            let b = function.blocks.get(block).ok_or(ShimError::OutOfRange {
                what: "block",
                index: block,
                count: function.blocks.len(),
            })?;
            f(b)
        })
    }

    fn with_instruction<T>(
        &self,
        handle: ModuleHandle,
        func: usize,
        block: usize,
        index: usize,
        f: impl FnOnce(&InstructionRecord) -> T,
    ) -> ShimResult<T> {
        self.with_block(handle, func, block, |b| {
            b.instructions
                .get(index)
                .map(f)
                .ok_or(ShimError::OutOfRange {
                    what: "instruction",
                    index,
                    count: b.instructions.len(),
                })
        })
    }
}

impl ShimApi for TextShim {
    fn abi_version(&self) -> AbiVersion {
        ABI_VERSION
    }

    fn open_buffer(&self, bytes: &[u8]) -> ShimResult<ModuleHandle> {
        let module = parse_module(bytes)?;
        let handle = ModuleHandle(self.next_handle.fetch_add(1, Ordering::Relaxed));
        self.modules.insert(handle.0, Arc::new(module));
        tracing::debug!(%handle, bytes = bytes.len(), "opened module");
        Ok(handle)
    }

    fn open_path(&self, path: &Path) -> ShimResult<ModuleHandle> {
        let bytes = std::fs::read(path).map_err(|source| ShimError::Io {
            path: path.display().to_string(),
            source,
        })?;
        self.open_buffer(&bytes)
    }

    fn close(&self, handle: ModuleHandle) -> ShimResult<()> {
        if self.modules.remove(&handle.0).is_none() {
            return Err(ShimError::InvalidHandle(handle));
        }
        tracing::debug!(%handle, "closed module");
        Ok(())
    }

    fn module_info(&self, handle: ModuleHandle) -> ShimResult<ModuleInfoRecord> {
        Ok(self.module(handle)?.info.clone())
    }

    fn named_types(&self, handle: ModuleHandle) -> ShimResult<Vec<NamedTypeRecord>> {
        Ok(self.module(handle)?.named_types.clone())
    }

    fn global_count(&self, handle: ModuleHandle) -> ShimResult<usize> {
        Ok(self.module(handle)?.globals.len())
    }

    fn global(&self, handle: ModuleHandle, index: usize) -> ShimResult<GlobalRecord> {
        let module = self.module(handle)?;
        module
            .globals
            .get(index)
            .cloned()
            .ok_or(ShimError::OutOfRange {
                what: "global",
                index,
                count: module.globals.len(),
            })
    }

    fn function_count(&self, handle: ModuleHandle) -> ShimResult<usize> {
        Ok(self.module(handle)?.functions.len())
    }

    fn function(&self, handle: ModuleHandle, index: usize) -> ShimResult<FunctionRecord> {
        self.with_function(handle, index, |f| Ok(f.record.clone()))
    }

    fn block(&self, handle: ModuleHandle, func: usize, block: usize) -> ShimResult<BlockRecord> {
        self.with_block(handle, func, block, |b| Ok(b.record.clone()))
    }

    fn instruction(
        &self,
        handle: ModuleHandle,
        func: usize,
        block: usize,
        index: usize,
    ) -> ShimResult<InstructionRecord> {
        self.with_instruction(handle, func, block, index, InstructionRecord::clone)
    }

    fn value_type(&self, handle: ModuleHandle, func: usize, name: &str) -> ShimResult<TypeRecord> {
        self.with_function(handle, func, |f| {
            f.value_types
                .get(name)
                .cloned()
                .ok_or_else(|| ShimError::UnknownValue {
                    function: f.record.name.clone(),
                    name: name.to_string(),
                })
        })
    }

    fn function_return_type(&self, handle: ModuleHandle, func: usize) -> ShimResult<TypeRecord> {
        self.with_function(handle, func, |f| Ok(f.record.return_type.clone()))
    }

    fn function_type(&self, handle: ModuleHandle, func: usize) -> ShimResult<TypeRecord> {
        self.with_function(handle, func, |f| {
            Ok(TypeRecord::Function {
                ret: Box::new(f.record.return_type.clone()),
                params: f.record.params.iter().map(|p| p.ty.clone()).collect(),
                varargs: f.record.varargs,
            })
        })
    }

    fn constant_data(&self, handle: ModuleHandle, global: usize) -> ShimResult<Option<Vec<u8>>> {
        let record = self.global(handle, global)?;
        Ok(constant_bytes(&record))
    }

    fn demangled_name(&self, handle: ModuleHandle, func: usize) -> ShimResult<Option<String>> {
        self.with_function(handle, func, |f| Ok(f.demangled.clone()))
    }

    fn has_no_signed_wrap(
        &self,
        handle: ModuleHandle,
        func: usize,
        block: usize,
        index: usize,
    ) -> ShimResult<bool> {
        self.with_instruction(handle, func, block, index, |i| i.flags.nsw)
    }

    fn has_no_unsigned_wrap(
        &self,
        handle: ModuleHandle,
        func: usize,
        block: usize,
        index: usize,
    ) -> ShimResult<bool> {
        self.with_instruction(handle, func, block, index, |i| i.flags.nuw)
    }
}

/// Flatten a data-array initializer (`c"..."` or `[N x iM] [...]`) to bytes.
fn constant_bytes(global: &GlobalRecord) -> Option<Vec<u8>> {
    match &global.initializer {
        Some(ValueRecord::Const(ConstRecord::Bytes(bytes))) => Some(bytes.clone()),
        Some(ValueRecord::Const(ConstRecord::Array(items))) => {
            let TypeRecord::Array { elem, .. } = &global.ty else {
                return None;
            };
            let TypeRecord::Int(bits) = elem.as_ref() else {
                return None;
            };
            if *bits % 8 != 0 || *bits > 128 {
                return None;
            }
            let width = (*bits / 8) as usize;
            let mut out = Vec::with_capacity(items.len() * width);
            for item in items {
                let ValueRecord::Const(ConstRecord::Int(v)) = &item.value else {
                    return None;
                };
                out.extend_from_slice(&v.to_le_bytes()[..width]);
            }
            Some(out)
        }
        _ => None,
    }
}
