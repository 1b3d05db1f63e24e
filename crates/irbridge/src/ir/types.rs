//! IR type definitions.
//!
//! An owned, arena-style graph of one module. Functions, blocks, values and
//! globals are addressed by `u32` newtype ids; nothing here refers back to a
//! shim handle.

use std::fmt;

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub u32);

        impl $name {
            pub fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "{}"), self.0)
            }
        }
    };
}

id_type!(
    /// Index into [`Module::functions`].
    FuncId,
    "f"
);
id_type!(
    /// Index into [`Function::blocks`].
    BlockId,
    "B"
);
id_type!(
    /// Index into [`Function::values`]. Displays as the generated local name.
    ValueId,
    "v"
);
id_type!(
    /// Index into [`Module::globals`].
    GlobalId,
    "g"
);

/// A structurally resolved IR type: named structs are already expanded.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IrType {
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
    Array { len: u64, elem: Box<IrType> },
    Struct { fields: Vec<IrType>, packed: bool },
    Function {
        ret: Box<IrType>,
        params: Vec<IrType>,
        varargs: bool,
    },
}

impl IrType {
    pub fn is_aggregate(&self) -> bool {
        matches!(self, IrType::Array { .. } | IrType::Struct { .. })
    }
}

impl fmt::Display for IrType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IrType::Void => write!(f, "void"),
            IrType::Int(bits) => write!(f, "i{bits}"),
            IrType::Half => write!(f, "half"),
            IrType::Float => write!(f, "float"),
            IrType::Double => write!(f, "double"),
            IrType::X86Fp80 => write!(f, "x86_fp80"),
            IrType::Fp128 => write!(f, "fp128"),
            IrType::Ptr => write!(f, "ptr"),
            IrType::Label => write!(f, "label"),
            IrType::Metadata => write!(f, "metadata"),
            IrType::Array { len, elem } => write!(f, "[{len} x {elem}]"),
            IrType::Struct { fields, packed } => {
                let body: Vec<String> = fields.iter().map(|t| t.to_string()).collect();
                if *packed {
                    write!(f, "<{{ {} }}>", body.join(", "))
                } else {
                    write!(f, "{{ {} }}", body.join(", "))
                }
            }
            IrType::Function {
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

/// Constant data, both for instruction operands and global initializers.
#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    Int(i128),
    Float(f64),
    Bool(bool),
    Null,
    /// `undef` and `poison`; translated as the type's zero value.
    Undef,
    Zero,
    Bytes(Vec<u8>),
    Array(Vec<(IrType, Constant)>),
    Struct(Vec<(IrType, Constant)>),
    /// Address of a global variable.
    Global(GlobalId),
}

impl Constant {
    /// The integer value, when this is an integer or boolean constant.
    pub fn as_int(&self) -> Option<i128> {
        match self {
            Constant::Int(v) => Some(*v),
            Constant::Bool(b) => Some(*b as i128),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Value(ValueId),
    Const(Constant),
    Global(GlobalId),
    /// A function used as a value rather than as a callee.
    Function(FuncId),
    /// A `metadata` call argument, kept verbatim.
    Metadata(String),
}

impl Operand {
    pub fn as_const_int(&self) -> Option<i128> {
        match self {
            Operand::Const(c) => c.as_int(),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    SDiv,
    UDiv,
    SRem,
    URem,
    Shl,
    LShr,
    AShr,
    And,
    Or,
    Xor,
    FAdd,
    FSub,
    FMul,
    FDiv,
    FRem,
}

impl BinaryOp {
    pub fn from_opcode(opcode: &str) -> Option<Self> {
        Some(match opcode {
            "add" => BinaryOp::Add,
            "sub" => BinaryOp::Sub,
            "mul" => BinaryOp::Mul,
            "sdiv" => BinaryOp::SDiv,
            "udiv" => BinaryOp::UDiv,
            "srem" => BinaryOp::SRem,
            "urem" => BinaryOp::URem,
            "shl" => BinaryOp::Shl,
            "lshr" => BinaryOp::LShr,
            "ashr" => BinaryOp::AShr,
            "and" => BinaryOp::And,
            "or" => BinaryOp::Or,
            "xor" => BinaryOp::Xor,
            "fadd" => BinaryOp::FAdd,
            "fsub" => BinaryOp::FSub,
            "fmul" => BinaryOp::FMul,
            "fdiv" => BinaryOp::FDiv,
            "frem" => BinaryOp::FRem,
            _ => return None,
        })
    }

    pub fn opcode(self) -> &'static str {
        match self {
            BinaryOp::Add => "add",
            BinaryOp::Sub => "sub",
            BinaryOp::Mul => "mul",
            BinaryOp::SDiv => "sdiv",
            BinaryOp::UDiv => "udiv",
            BinaryOp::SRem => "srem",
            BinaryOp::URem => "urem",
            BinaryOp::Shl => "shl",
            BinaryOp::LShr => "lshr",
            BinaryOp::AShr => "ashr",
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
            BinaryOp::Xor => "xor",
            BinaryOp::FAdd => "fadd",
            BinaryOp::FSub => "fsub",
            BinaryOp::FMul => "fmul",
            BinaryOp::FDiv => "fdiv",
            BinaryOp::FRem => "frem",
        }
    }

    pub fn is_float(self) -> bool {
        matches!(
            self,
            BinaryOp::FAdd | BinaryOp::FSub | BinaryOp::FMul | BinaryOp::FDiv | BinaryOp::FRem
        )
    }
}

/// Poison-generating flags that survive into translation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WrapFlags {
    pub nsw: bool,
    pub nuw: bool,
    pub exact: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntPredicate {
    Eq,
    Ne,
    Ugt,
    Uge,
    Ult,
    Ule,
    Sgt,
    Sge,
    Slt,
    Sle,
}

impl IntPredicate {
    pub fn parse(text: &str) -> Option<Self> {
        Some(match text {
            "eq" => IntPredicate::Eq,
            "ne" => IntPredicate::Ne,
            "ugt" => IntPredicate::Ugt,
            "uge" => IntPredicate::Uge,
            "ult" => IntPredicate::Ult,
            "ule" => IntPredicate::Ule,
            "sgt" => IntPredicate::Sgt,
            "sge" => IntPredicate::Sge,
            "slt" => IntPredicate::Slt,
            "sle" => IntPredicate::Sle,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FloatPredicate {
    False,
    Oeq,
    Ogt,
    Oge,
    Olt,
    Ole,
    One,
    Ord,
    Ueq,
    Ugt,
    Uge,
    Ult,
    Ule,
    Une,
    Uno,
    True,
}

impl FloatPredicate {
    pub fn parse(text: &str) -> Option<Self> {
        Some(match text {
            "false" => FloatPredicate::False,
            "oeq" => FloatPredicate::Oeq,
            "ogt" => FloatPredicate::Ogt,
            "oge" => FloatPredicate::Oge,
            "olt" => FloatPredicate::Olt,
            "ole" => FloatPredicate::Ole,
            "one" => FloatPredicate::One,
            "ord" => FloatPredicate::Ord,
            "ueq" => FloatPredicate::Ueq,
            "ugt" => FloatPredicate::Ugt,
            "uge" => FloatPredicate::Uge,
            "ult" => FloatPredicate::Ult,
            "ule" => FloatPredicate::Ule,
            "une" => FloatPredicate::Une,
            "uno" => FloatPredicate::Uno,
            "true" => FloatPredicate::True,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CastOp {
    Trunc,
    ZExt,
    SExt,
    FpTrunc,
    FpExt,
    FpToUi,
    FpToSi,
    UiToFp,
    SiToFp,
    PtrToInt,
    IntToPtr,
    Bitcast,
    AddrSpaceCast,
}

impl CastOp {
    pub fn from_opcode(opcode: &str) -> Option<Self> {
        Some(match opcode {
            "trunc" => CastOp::Trunc,
            "zext" => CastOp::ZExt,
            "sext" => CastOp::SExt,
            "fptrunc" => CastOp::FpTrunc,
            "fpext" => CastOp::FpExt,
            "fptoui" => CastOp::FpToUi,
            "fptosi" => CastOp::FpToSi,
            "uitofp" => CastOp::UiToFp,
            "sitofp" => CastOp::SiToFp,
            "ptrtoint" => CastOp::PtrToInt,
            "inttoptr" => CastOp::IntToPtr,
            "bitcast" => CastOp::Bitcast,
            "addrspacecast" => CastOp::AddrSpaceCast,
            _ => return None,
        })
    }

    pub fn opcode(self) -> &'static str {
        match self {
            CastOp::Trunc => "trunc",
            CastOp::ZExt => "zext",
            CastOp::SExt => "sext",
            CastOp::FpTrunc => "fptrunc",
            CastOp::FpExt => "fpext",
            CastOp::FpToUi => "fptoui",
            CastOp::FpToSi => "fptosi",
            CastOp::UiToFp => "uitofp",
            CastOp::SiToFp => "sitofp",
            CastOp::PtrToInt => "ptrtoint",
            CastOp::IntToPtr => "inttoptr",
            CastOp::Bitcast => "bitcast",
            CastOp::AddrSpaceCast => "addrspacecast",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Callee {
    Direct(FuncId),
    /// Call through a pointer value.
    Indirect(Operand),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CallSite {
    pub callee: Callee,
    pub ret: IrType,
    pub args: Vec<(IrType, Operand)>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum InstKind {
    Binary {
        op: BinaryOp,
        ty: IrType,
        lhs: Operand,
        rhs: Operand,
        flags: WrapFlags,
    },
    ICmp {
        pred: IntPredicate,
        ty: IrType,
        lhs: Operand,
        rhs: Operand,
    },
    FCmp {
        pred: FloatPredicate,
        ty: IrType,
        lhs: Operand,
        rhs: Operand,
    },
    FNeg {
        ty: IrType,
        value: Operand,
    },
    Select {
        ty: IrType,
        cond: Operand,
        then_value: Operand,
        else_value: Operand,
    },
    Cast {
        op: CastOp,
        from: IrType,
        to: IrType,
        value: Operand,
    },
    Alloca {
        ty: IrType,
        count: Option<Operand>,
        align: Option<u64>,
    },
    Load {
        ty: IrType,
        ptr: Operand,
    },
    Store {
        ty: IrType,
        value: Operand,
        ptr: Operand,
    },
    GetElementPtr {
        source: IrType,
        base: Operand,
        indices: Vec<(IrType, Operand)>,
    },
    Phi {
        ty: IrType,
        incoming: Vec<(Operand, BlockId)>,
    },
    Call(CallSite),
    LandingPad {
        ty: IrType,
        cleanup: bool,
        clauses: usize,
    },
}

impl InstKind {
    pub fn opcode(&self) -> &'static str {
        match self {
            InstKind::Binary { op, .. } => op.opcode(),
            InstKind::ICmp { .. } => "icmp",
            InstKind::FCmp { .. } => "fcmp",
            InstKind::FNeg { .. } => "fneg",
            InstKind::Select { .. } => "select",
            InstKind::Cast { op, .. } => op.opcode(),
            InstKind::Alloca { .. } => "alloca",
            InstKind::Load { .. } => "load",
            InstKind::Store { .. } => "store",
            InstKind::GetElementPtr { .. } => "getelementptr",
            InstKind::Phi { .. } => "phi",
            InstKind::Call(_) => "call",
            InstKind::LandingPad { .. } => "landingpad",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    pub result: Option<ValueId>,
    pub kind: InstKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Terminator {
    Ret(Option<(IrType, Operand)>),
    Br(BlockId),
    CondBr {
        cond: Operand,
        then_block: BlockId,
        else_block: BlockId,
    },
    Switch {
        ty: IrType,
        value: Operand,
        default: BlockId,
        cases: Vec<(i128, BlockId)>,
    },
    Invoke {
        result: Option<ValueId>,
        call: CallSite,
        normal: BlockId,
        unwind: BlockId,
    },
    Resume(Operand),
    Unreachable,
}

impl Terminator {
    pub fn opcode(&self) -> &'static str {
        match self {
            Terminator::Ret(_) => "ret",
            Terminator::Br(_) | Terminator::CondBr { .. } => "br",
            Terminator::Switch { .. } => "switch",
            Terminator::Invoke { .. } => "invoke",
            Terminator::Resume(_) => "resume",
            Terminator::Unreachable => "unreachable",
        }
    }

    /// Successor blocks, in edge order.
    pub fn successors(&self) -> Vec<BlockId> {
        match self {
            Terminator::Ret(_) | Terminator::Resume(_) | Terminator::Unreachable => Vec::new(),
            Terminator::Br(target) => vec![*target],
            Terminator::CondBr {
                then_block,
                else_block,
                ..
            } => vec![*then_block, *else_block],
            Terminator::Switch { default, cases, .. } => std::iter::once(*default)
                .chain(cases.iter().map(|(_, b)| *b))
                .collect(),
            Terminator::Invoke { normal, unwind, .. } => vec![*normal, *unwind],
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub id: BlockId,
    /// Source label without the `%` sigil.
    pub label: String,
    pub instructions: Vec<Instruction>,
    pub terminator: Terminator,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValueInfo {
    /// Source name without the `%` sigil.
    pub name: String,
    pub ty: IrType,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub id: FuncId,
    pub name: String,
    pub demangled: Option<String>,
    pub params: Vec<ValueId>,
    pub ret: IrType,
    pub varargs: bool,
    pub is_declaration: bool,
    /// Parameters first, then instruction results in definition order.
    pub values: Vec<ValueInfo>,
    pub blocks: Vec<Block>,
}

impl Function {
    pub fn value(&self, id: ValueId) -> &ValueInfo {
        &self.values[id.index()]
    }

    pub fn block(&self, id: BlockId) -> &Block {
        &self.blocks[id.index()]
    }

    pub fn instruction_count(&self) -> usize {
        self.blocks.iter().map(|b| b.instructions.len() + 1).sum()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Global {
    pub id: GlobalId,
    pub name: String,
    pub ty: IrType,
    pub is_constant: bool,
    /// `None` for external declarations.
    pub initializer: Option<Constant>,
    pub align: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Module {
    pub source_filename: Option<String>,
    pub functions: Vec<Function>,
    pub globals: Vec<Global>,
}

impl Module {
    pub fn function(&self, id: FuncId) -> &Function {
        &self.functions[id.index()]
    }

    pub fn global(&self, id: GlobalId) -> &Global {
        &self.globals[id.index()]
    }

    pub fn function_by_name(&self, name: &str) -> Option<&Function> {
        self.functions.iter().find(|f| f.name == name)
    }

    pub fn defined_functions(&self) -> impl Iterator<Item = &Function> {
        self.functions.iter().filter(|f| !f.is_declaration)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_display_as_generated_names() {
        assert_eq!(ValueId(3).to_string(), "v3");
        assert_eq!(BlockId(0).to_string(), "B0");
    }

    #[test]
    fn switch_successors_start_with_default() {
        let term = Terminator::Switch {
            ty: IrType::Int(32),
            value: Operand::Const(Constant::Int(1)),
            default: BlockId(3),
            cases: vec![(0, BlockId(1)), (1, BlockId(2))],
        };
        assert_eq!(term.successors(), vec![BlockId(3), BlockId(1), BlockId(2)]);
    }

    #[test]
    fn struct_type_display() {
        let ty = IrType::Struct {
            fields: vec![IrType::Ptr, IrType::Int(32)],
            packed: false,
        };
        assert_eq!(ty.to_string(), "{ ptr, i32 }");
    }
}
