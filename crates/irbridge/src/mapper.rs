//! Type Mapper: IR types to target type descriptors.
//!
//! Descriptors carry the natural C layout (x86-64 rules: scalars aligned to
//! their size, 8-byte pointers, padded struct fields) used for `alloca`,
//! `getelementptr` and global images. Results are memoized by structural
//! key; the memo table is shared across translator threads.

use std::sync::Arc;

use dashmap::DashMap;

use crate::config::TargetProfile;
use crate::error::TranslateError;
use crate::ir::IrType;

/// A scalar as carried in a generated local.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scalar {
    Bool,
    Int(u32),
    F32,
    F64,
    Ptr,
}

impl Scalar {
    pub fn rust_type(self) -> &'static str {
        match self {
            Scalar::Bool => "bool",
            Scalar::Int(8) => "i8",
            Scalar::Int(16) => "i16",
            Scalar::Int(32) => "i32",
            Scalar::Int(64) => "i64",
            Scalar::Int(_) => "i128",
            Scalar::F32 => "f32",
            Scalar::F64 => "f64",
            Scalar::Ptr => "u64",
        }
    }

    /// The unsigned reinterpretation used by unsigned comparisons and shifts.
    pub fn unsigned_type(self) -> &'static str {
        match self {
            Scalar::Int(8) => "u8",
            Scalar::Int(16) => "u16",
            Scalar::Int(32) => "u32",
            Scalar::Int(64) | Scalar::Ptr => "u64",
            Scalar::Int(_) => "u128",
            other => other.rust_type(),
        }
    }

    /// Suffix of the `Memory::load_*`/`store_*` accessor.
    pub fn memory_suffix(self) -> &'static str {
        match self {
            Scalar::Ptr => "ptr",
            other => other.rust_type(),
        }
    }

    pub fn zero_literal(self) -> &'static str {
        match self {
            Scalar::Bool => "false",
            Scalar::Int(8) => "0i8",
            Scalar::Int(16) => "0i16",
            Scalar::Int(32) => "0i32",
            Scalar::Int(64) => "0i64",
            Scalar::Int(_) => "0i128",
            Scalar::F32 => "0.0f32",
            Scalar::F64 => "0.0f64",
            Scalar::Ptr => "0u64",
        }
    }

    pub fn bits(self) -> u32 {
        match self {
            Scalar::Bool => 1,
            Scalar::Int(bits) => bits,
            Scalar::F32 => 32,
            Scalar::F64 | Scalar::Ptr => 64,
        }
    }

    pub fn is_int(self) -> bool {
        matches!(self, Scalar::Int(_))
    }

    pub fn is_float(self) -> bool {
        matches!(self, Scalar::F32 | Scalar::F64)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeKind {
    Void,
    Bool,
    Int { bits: u32 },
    F32,
    F64,
    Ptr,
    Array {
        elem: Arc<TypeDescriptor>,
        len: u64,
    },
    Struct {
        fields: Vec<Arc<TypeDescriptor>>,
        offsets: Vec<u64>,
        packed: bool,
    },
    Function {
        params: Vec<Arc<TypeDescriptor>>,
        ret: Arc<TypeDescriptor>,
        varargs: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeDescriptor {
    pub kind: TypeKind,
    pub size: u64,
    pub align: u64,
}

impl TypeDescriptor {
    fn scalar_of(kind: TypeKind, size: u64) -> Self {
        Self {
            kind,
            size,
            align: size,
        }
    }

    pub fn scalar(&self) -> Option<Scalar> {
        Some(match self.kind {
            TypeKind::Bool => Scalar::Bool,
            TypeKind::Int { bits } => Scalar::Int(bits),
            TypeKind::F32 => Scalar::F32,
            TypeKind::F64 => Scalar::F64,
            TypeKind::Ptr => Scalar::Ptr,
            _ => return None,
        })
    }

    /// Rust spelling of a scalar descriptor; `()` for void.
    pub fn rust_type(&self) -> Option<&'static str> {
        match self.kind {
            TypeKind::Void => Some("()"),
            _ => self.scalar().map(Scalar::rust_type),
        }
    }

    /// Distance between consecutive elements in an array of this type.
    pub fn stride(&self) -> u64 {
        round_up(self.size, self.align)
    }
}

fn round_up(value: u64, align: u64) -> u64 {
    if align <= 1 {
        value
    } else {
        value.div_ceil(align) * align
    }
}

pub struct TypeMapper {
    max_int_width: u32,
    memo: DashMap<IrType, Arc<TypeDescriptor>>,
}

impl TypeMapper {
    pub fn new(profile: &TargetProfile) -> Self {
        Self {
            max_int_width: profile.max_int_width,
            memo: DashMap::new(),
        }
    }

    /// Number of distinct types mapped so far.
    pub fn len(&self) -> usize {
        self.memo.len()
    }

    pub fn is_empty(&self) -> bool {
        self.memo.is_empty()
    }

    pub fn map(&self, ty: &IrType) -> Result<Arc<TypeDescriptor>, TranslateError> {
        if let Some(found) = self.memo.get(ty) {
            return Ok(Arc::clone(found.value()));
        }
        // Children are mapped before the entry is locked: a shard lock is
        // never held across a recursive call.
        let built = self.build(ty)?;
        let entry = self.memo.entry(ty.clone()).or_insert_with(|| Arc::new(built));
        Ok(Arc::clone(entry.value()))
    }

    pub fn scalar(&self, ty: &IrType) -> Result<Option<Scalar>, TranslateError> {
        Ok(self.map(ty)?.scalar())
    }

    fn build(&self, ty: &IrType) -> Result<TypeDescriptor, TranslateError> {
        let unsupported = |reason: &str| TranslateError::UnsupportedType {
            ty: ty.to_string(),
            reason: reason.to_string(),
        };
        Ok(match ty {
            IrType::Void => TypeDescriptor {
                kind: TypeKind::Void,
                size: 0,
                align: 1,
            },
            IrType::Int(1) => TypeDescriptor::scalar_of(TypeKind::Bool, 1),
            IrType::Int(bits @ (8 | 16 | 32 | 64 | 128)) => {
                if *bits > self.max_int_width {
                    return Err(unsupported(&format!(
                        "wider than the profile's {}-bit limit",
                        self.max_int_width
                    )));
                }
                TypeDescriptor::scalar_of(TypeKind::Int { bits: *bits }, u64::from(*bits / 8))
            }
            IrType::Int(_) => return Err(unsupported("only i1, i8, i16, i32, i64 and i128 are mapped")),
            IrType::Float => TypeDescriptor::scalar_of(TypeKind::F32, 4),
            IrType::Double => TypeDescriptor::scalar_of(TypeKind::F64, 8),
            IrType::Half | IrType::X86Fp80 | IrType::Fp128 => {
                return Err(unsupported("no Rust float of this format"))
            }
            IrType::Ptr => TypeDescriptor::scalar_of(TypeKind::Ptr, 8),
            IrType::Label | IrType::Metadata => return Err(unsupported("not a value type")),
            IrType::Array { len, elem } => {
                let elem = self.map(elem)?;
                TypeDescriptor {
                    size: elem.stride() * len,
                    align: elem.align,
                    kind: TypeKind::Array { elem, len: *len },
                }
            }
            IrType::Struct { fields, packed } => {
                let fields = fields
                    .iter()
                    .map(|f| self.map(f))
                    .collect::<Result<Vec<_>, _>>()?;
                let mut offsets = Vec::with_capacity(fields.len());
                let mut offset = 0;
                let mut align = 1;
                for field in &fields {
                    let field_align = if *packed { 1 } else { field.align };
                    offset = round_up(offset, field_align);
                    offsets.push(offset);
                    offset += field.size;
                    align = align.max(field_align);
                }
                TypeDescriptor {
                    size: round_up(offset, align),
                    align,
                    kind: TypeKind::Struct {
                        fields,
                        offsets,
                        packed: *packed,
                    },
                }
            }
            IrType::Function {
                ret,
                params,
                varargs,
            } => TypeDescriptor {
                kind: TypeKind::Function {
                    params: params
                        .iter()
                        .map(|p| self.map(p))
                        .collect::<Result<Vec<_>, _>>()?,
                    ret: self.map(ret)?,
                    varargs: *varargs,
                },
                size: 0,
                align: 1,
            },
        })
    }
}
