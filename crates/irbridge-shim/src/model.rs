//! Record types handed across the shim surface.
//!
//! These mirror the shape of the native object model (types, values,
//! instructions addressed by position) without exposing any of the parser's
//! internals. Every record is an owned copy: holding one never keeps a
//! module handle alive.

use std::fmt;

/// A type as spelled in the source module.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeRecord {
    Void,
    Int(u32),
    Half,
    Float,
    Double,
    X86Fp80,
    Fp128,
    Ptr,
    Label,
    Metadata,
    Array { len: u64, elem: Box<TypeRecord> },
    Vector { len: u64, elem: Box<TypeRecord> },
    Struct { fields: Vec<TypeRecord>, packed: bool },
    /// Reference to a named struct (`%struct.S`), resolved by the reader.
    Named(String),
    Function {
        ret: Box<TypeRecord>,
        params: Vec<TypeRecord>,
        varargs: bool,
    },
}

impl fmt::Display for TypeRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeRecord::Void => write!(f, "void"),
            TypeRecord::Int(bits) => write!(f, "i{bits}"),
            TypeRecord::Half => write!(f, "half"),
            TypeRecord::Float => write!(f, "float"),
            TypeRecord::Double => write!(f, "double"),
            TypeRecord::X86Fp80 => write!(f, "x86_fp80"),
            TypeRecord::Fp128 => write!(f, "fp128"),
            TypeRecord::Ptr => write!(f, "ptr"),
            TypeRecord::Label => write!(f, "label"),
            TypeRecord::Metadata => write!(f, "metadata"),
            TypeRecord::Array { len, elem } => write!(f, "[{len} x {elem}]"),
            TypeRecord::Vector { len, elem } => write!(f, "<{len} x {elem}>"),
            TypeRecord::Struct { fields, packed } => {
                let body = fields
                    .iter()
                    .map(|t| t.to_string())
                    .collect::<Vec<_>>()
                    .join(", ");
                if *packed {
                    write!(f, "<{{ {body} }}>")
                } else {
                    write!(f, "{{ {body} }}")
                }
            }
            TypeRecord::Named(name) => write!(f, "%{name}"),
            TypeRecord::Function {
                ret,
                params,
                varargs,
            } => {
                let mut parts: Vec<String> = params.iter().map(|t| t.to_string()).collect();
                if *varargs {
                    parts.push("...".to_string());
                }
                write!(f, "{ret} ({})", parts.join(", "))
            }
        }
    }
}

/// A constant operand.
#[derive(Debug, Clone, PartialEq)]
pub enum ConstRecord {
    Int(i128),
    /// Floating constants are carried as f64; `float` constants are exactly
    /// representable because LLVM prints them in double form.
    Float(f64),
    Bool(bool),
    Null,
    Undef,
    Poison,
    Zero,
    /// `c"..."` byte string, escapes already decoded.
    Bytes(Vec<u8>),
    Array(Vec<OperandRecord>),
    Struct(Vec<OperandRecord>),
}

/// What an operand refers to.
#[derive(Debug, Clone, PartialEq)]
pub enum ValueRecord {
    /// `%name` without the sigil.
    Local(String),
    /// `@name` without the sigil.
    Global(String),
    Const(ConstRecord),
    /// A metadata argument (`metadata !12`), kept verbatim.
    Metadata(String),
}

impl fmt::Display for ValueRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueRecord::Local(name) => write!(f, "%{name}"),
            ValueRecord::Global(name) => write!(f, "@{name}"),
            ValueRecord::Const(c) => write!(f, "{c:?}"),
            ValueRecord::Metadata(text) => write!(f, "{text}"),
        }
    }
}

/// An operand together with its type where the syntax provides one.
#[derive(Debug, Clone, PartialEq)]
pub struct OperandRecord {
    pub ty: Option<TypeRecord>,
    pub value: ValueRecord,
}

/// Flags attached to an instruction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InstFlags {
    pub nuw: bool,
    pub nsw: bool,
    pub exact: bool,
    pub inbounds: bool,
    pub volatile: bool,
    pub tail: bool,
}

/// One instruction, addressed by (function, block, index).
///
/// Field meaning depends on `opcode`:
/// - binary ops, `icmp`, `fcmp`: `ty` is the operand type, `operands = [lhs, rhs]`
/// - casts: `ty` is the destination type, `operands = [value]`
/// - `alloca`: `ty` is the allocated type, `operands = [count]` when present
/// - `load`: `ty` is the loaded type, `operands = [ptr]`
/// - `store`: `operands = [value, ptr]`
/// - `getelementptr`: `ty` is the source element type, `operands = [base, indices..]`
/// - `call`/`invoke`: `ty` is the return type, `operands = [callee, args..]`,
///   `labels = [normal, unwind]` for `invoke`
/// - `br`: `labels = [target]` or `operands = [cond]`, `labels = [then, else]`
/// - `switch`: `operands = [value]`, `labels = [default]`, `cases` filled
#[derive(Debug, Clone, PartialEq)]
pub struct InstructionRecord {
    pub result: Option<String>,
    pub opcode: String,
    pub ty: Option<TypeRecord>,
    pub result_type: Option<TypeRecord>,
    pub operands: Vec<OperandRecord>,
    pub labels: Vec<String>,
    pub cases: Vec<(OperandRecord, String)>,
    pub incoming: Vec<(ValueRecord, String)>,
    pub predicate: Option<String>,
    pub flags: InstFlags,
    pub align: Option<u64>,
    pub callee_type: Option<TypeRecord>,
    pub cleanup: bool,
    pub clauses: Vec<OperandRecord>,
    /// Set when the line was only recognised by its opcode word.
    pub raw: bool,
    /// Source text of the instruction, for diagnostics.
    pub text: String,
    /// Byte offset of the instruction in the source buffer.
    pub offset: usize,
}

impl InstructionRecord {
    pub(crate) fn new(opcode: &str, text: &str, offset: usize) -> Self {
        Self {
            result: None,
            opcode: opcode.to_string(),
            ty: None,
            result_type: None,
            operands: Vec::new(),
            labels: Vec::new(),
            cases: Vec::new(),
            incoming: Vec::new(),
            predicate: None,
            flags: InstFlags::default(),
            align: None,
            callee_type: None,
            cleanup: false,
            clauses: Vec::new(),
            raw: false,
            text: text.trim().to_string(),
            offset,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BlockRecord {
    pub label: String,
    pub instruction_count: usize,
    pub offset: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParamRecord {
    pub ty: TypeRecord,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionRecord {
    pub name: String,
    pub return_type: TypeRecord,
    pub params: Vec<ParamRecord>,
    pub varargs: bool,
    pub is_declaration: bool,
    pub linkage: Vec<String>,
    pub personality: Option<String>,
    pub block_count: usize,
    pub offset: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GlobalRecord {
    pub name: String,
    pub ty: TypeRecord,
    pub is_constant: bool,
    pub initializer: Option<ValueRecord>,
    pub linkage: Vec<String>,
    pub align: Option<u64>,
    pub offset: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NamedTypeRecord {
    pub name: String,
    /// `None` for `opaque` types.
    pub body: Option<TypeRecord>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModuleInfoRecord {
    pub source_filename: Option<String>,
    pub target_triple: Option<String>,
    pub data_layout: Option<String>,
    pub function_count: usize,
    pub global_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_record_display_matches_llvm_spelling() {
        let ty = TypeRecord::Struct {
            fields: vec![
                TypeRecord::Int(32),
                TypeRecord::Array {
                    len: 4,
                    elem: Box::new(TypeRecord::Int(8)),
                },
                TypeRecord::Ptr,
            ],
            packed: false,
        };
        assert_eq!(ty.to_string(), "{ i32, [4 x i8], ptr }");

        let f = TypeRecord::Function {
            ret: Box::new(TypeRecord::Int(32)),
            params: vec![TypeRecord::Ptr],
            varargs: true,
        };
        assert_eq!(f.to_string(), "i32 (ptr, ...)");
    }
}
