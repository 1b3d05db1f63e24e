//! Globals image: addresses and initial bytes of every global variable.
//!
//! Globals are placed from `irbridge_runtime::NULL_GUARD` upward, each at
//! its alignment, in declaration order. `image[0]` is the byte at address
//! `GLOBALS_BASE`; the generated `new_context` hands the image to
//! `Memory::with_globals`.

use crate::error::TranslateError;
use crate::ir::{Constant, GlobalId, IrType, Module};
use crate::mapper::{TypeDescriptor, TypeKind, TypeMapper};

/// First address of the globals region. Matches the runtime null guard.
pub const GLOBALS_BASE: u64 = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalEntry {
    pub id: GlobalId,
    pub const_name: String,
    pub address: u64,
    pub size: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GlobalLayout {
    pub entries: Vec<GlobalEntry>,
    pub image: Vec<u8>,
}

impl GlobalLayout {
    pub fn address(&self, id: GlobalId) -> Option<u64> {
        self.entries.iter().find(|e| e.id == id).map(|e| e.address)
    }

    pub fn const_name(&self, id: GlobalId) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| e.id == id)
            .map(|e| e.const_name.as_str())
    }

    /// Lay out every global of `module`. `names` gives each global's constant name.
    pub fn build(
        module: &Module,
        mapper: &TypeMapper,
        names: impl Fn(GlobalId) -> String,
    ) -> Result<Self, TranslateError> {
        let mut entries = Vec::with_capacity(module.globals.len());
        let mut descriptors = Vec::with_capacity(module.globals.len());
        let mut cursor = GLOBALS_BASE;
        for global in &module.globals {
            let desc = mapper.map(&global.ty)?;
            let align = global.align.unwrap_or(1).max(desc.align).max(1);
            let address = cursor.div_ceil(align) * align;
            cursor = address + desc.size;
            entries.push(GlobalEntry {
                id: global.id,
                const_name: names(global.id),
                address,
                size: desc.size,
            });
            descriptors.push(desc);
        }

        let mut layout = GlobalLayout {
            image: vec![0; (cursor - GLOBALS_BASE) as usize],
            entries,
        };
        // Second pass: addresses of every global are known, so pointer
        // initializers can be encoded.
        for (global, desc) in module.globals.iter().zip(&descriptors) {
            let Some(init) = &global.initializer else {
                continue;
            };
            let at = layout.address(global.id).unwrap_or(GLOBALS_BASE) - GLOBALS_BASE;
            let mut bytes = std::mem::take(&mut layout.image);
            let result = layout.encode(&global.ty, desc, init, at as usize, &mut bytes, mapper);
            layout.image = bytes;
            result.map_err(|reason| TranslateError::UnsupportedConstruct {
                what: reason,
                location: format!("initializer of @{}", global.name),
            })?;
        }
        Ok(layout)
    }

    fn encode(
        &self,
        ty: &IrType,
        desc: &TypeDescriptor,
        value: &Constant,
        at: usize,
        out: &mut [u8],
        mapper: &TypeMapper,
    ) -> Result<(), String> {
        let size = desc.size as usize;
        let slot = out
            .get_mut(at..at + size)
            .ok_or_else(|| format!("constant of type {ty} overruns its global"))?;
        match (value, &desc.kind) {
            (Constant::Zero | Constant::Undef | Constant::Null, _) => slot.fill(0),
            (Constant::Bool(b), _) => slot[0] = u8::from(*b),
            (Constant::Int(v), TypeKind::Bool) => slot[0] = (*v & 1) as u8,
            (Constant::Int(v), TypeKind::Int { .. } | TypeKind::Ptr) => {
                slot.copy_from_slice(&v.to_le_bytes()[..size]);
            }
            (Constant::Float(v), TypeKind::F32) => slot.copy_from_slice(&(*v as f32).to_le_bytes()),
            (Constant::Float(v), TypeKind::F64) => slot.copy_from_slice(&v.to_le_bytes()),
            (Constant::Global(target), TypeKind::Ptr) => {
                let address = self
                    .address(*target)
                    .ok_or_else(|| format!("reference to unknown global {target}"))?;
                slot.copy_from_slice(&address.to_le_bytes());
            }
            (Constant::Bytes(bytes), _) => {
                if bytes.len() > size {
                    return Err(format!("{} bytes do not fit in {ty}", bytes.len()));
                }
                slot[..bytes.len()].copy_from_slice(bytes);
            }
            (Constant::Array(elems), TypeKind::Array { elem, .. }) => {
                let stride = elem.stride() as usize;
                for (i, (elem_ty, c)) in elems.iter().enumerate() {
                    let elem_desc = mapper.map(elem_ty).map_err(|e| e.to_string())?;
                    self.encode(elem_ty, &elem_desc, c, at + i * stride, out, mapper)?;
                }
            }
            (Constant::Struct(fields), TypeKind::Struct { offsets, .. }) => {
                for ((field_ty, c), offset) in fields.iter().zip(offsets) {
                    let field_desc = mapper.map(field_ty).map_err(|e| e.to_string())?;
                    self.encode(field_ty, &field_desc, c, at + *offset as usize, out, mapper)?;
                }
            }
            (other, _) => return Err(format!("cannot encode {other:?} as {ty}")),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TargetProfile;
    use crate::ir::Global;

    fn global(id: u32, name: &str, ty: IrType, init: Option<Constant>) -> Global {
        Global {
            id: GlobalId(id),
            name: name.to_string(),
            ty,
            is_constant: false,
            initializer: init,
            align: None,
        }
    }

    fn layout(globals: Vec<Global>) -> GlobalLayout {
        let module = Module {
            source_filename: None,
            functions: Vec::new(),
            globals,
        };
        let mapper = TypeMapper::new(&TargetProfile::default());
        GlobalLayout::build(&module, &mapper, |id| format!("G{}", id.0)).unwrap()
    }

    #[test]
    fn globals_are_aligned_from_the_guard() {
        let l = layout(vec![
            global(0, "flag", IrType::Int(8), Some(Constant::Int(1))),
            global(1, "counter", IrType::Int(64), Some(Constant::Int(-2))),
        ]);
        assert_eq!(l.address(GlobalId(0)), Some(64));
        assert_eq!(l.address(GlobalId(1)), Some(72));
        assert_eq!(l.image.len(), 16);
        assert_eq!(l.image[0], 1);
        assert_eq!(&l.image[8..16], &(-2i64).to_le_bytes());
    }

    #[test]
    fn pointer_initializers_reference_addresses() {
        let l = layout(vec![
            global(0, "msg", IrType::Array { len: 3, elem: Box::new(IrType::Int(8)) }, Some(Constant::Bytes(b"hi\0".to_vec()))),
            global(1, "msg_ptr", IrType::Ptr, Some(Constant::Global(GlobalId(0)))),
        ]);
        assert_eq!(&l.image[..3], b"hi\0");
        let at = (l.address(GlobalId(1)).unwrap() - GLOBALS_BASE) as usize;
        assert_eq!(&l.image[at..at + 8], &64u64.to_le_bytes());
    }

    #[test]
    fn struct_initializers_use_field_offsets() {
        let ty = IrType::Struct {
            fields: vec![IrType::Int(8), IrType::Int(32)],
            packed: false,
        };
        let init = Constant::Struct(vec![(IrType::Int(8), Constant::Int(7)), (IrType::Int(32), Constant::Int(0x0102_0304))]);
        let l = layout(vec![global(0, "pair", ty, Some(init))]);
        assert_eq!(l.image, vec![7, 0, 0, 0, 4, 3, 2, 1]);
    }

    #[test]
    fn external_globals_are_zero_filled() {
        let l = layout(vec![global(0, "ext", IrType::Int(32), None)]);
        assert_eq!(l.image, vec![0; 4]);
        assert_eq!(l.const_name(GlobalId(0)), Some("G0"));
    }
}
