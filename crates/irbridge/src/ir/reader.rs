//! IR Reader: walks a shim handle once and builds the owned [`Module`] graph.
//!
//! The reader is the only component that talks to the shim. Names are
//! resolved to ids here (values, blocks, callees, globals), named struct
//! types are expanded, and block structure is validated. Nothing partial is
//! returned on failure.

use std::collections::HashMap;
use std::path::Path;

use irbridge_shim::{
    AbiVersion, ConstRecord, FunctionRecord, GlobalRecord, InstructionRecord, ModuleHandle,
    OperandRecord, ShimApi, TypeRecord, ValueRecord,
};

use super::types::*;
use crate::error::TranslateError;

/// Oldest shim surface this reader can drive.
pub const REQUIRED_SHIM_VERSION: AbiVersion = AbiVersion::new(1, 2);

type Result<T> = std::result::Result<T, TranslateError>;

/// Check a shim's reported version against [`REQUIRED_SHIM_VERSION`].
pub fn check_shim_version(found: AbiVersion) -> Result<()> {
    if found.satisfies(REQUIRED_SHIM_VERSION) {
        Ok(())
    } else {
        Err(TranslateError::IncompatibleShimVersion {
            found,
            required: REQUIRED_SHIM_VERSION,
        })
    }
}

pub struct IrReader<'s> {
    shim: &'s dyn ShimApi,
}

impl<'s> IrReader<'s> {
    /// Bind to a shim, failing fast if its version is incompatible.
    pub fn connect(shim: &'s dyn ShimApi) -> Result<Self> {
        check_shim_version(shim.abi_version())?;
        Ok(Self { shim })
    }

    /// Open `bytes`, read the module and close the handle.
    pub fn read_buffer(&self, bytes: &[u8]) -> Result<Module> {
        let handle = self.shim.open_buffer(bytes)?;
        self.read_and_close(handle)
    }

    pub fn read_path(&self, path: &Path) -> Result<Module> {
        let handle = self.shim.open_path(path)?;
        self.read_and_close(handle)
    }

    fn read_and_close(&self, handle: ModuleHandle) -> Result<Module> {
        let module = self.read(handle);
        let closed = self.shim.close(handle);
        let module = module?;
        closed?;
        Ok(module)
    }

    /// Materialize the module behind `handle`. The handle stays open.
    pub fn read(&self, handle: ModuleHandle) -> Result<Module> {
        let shim = self.shim;
        let info = shim.module_info(handle)?;
        let types = TypeResolver {
            named: shim
                .named_types(handle)?
                .into_iter()
                .map(|t| (t.name, t.body))
                .collect(),
        };

        let global_records = (0..shim.global_count(handle)?)
            .map(|i| shim.global(handle, i))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let function_records = (0..shim.function_count(handle)?)
            .map(|i| shim.function(handle, i))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let symbols = Symbols::collect(&global_records, &function_records)?;

        let globals = global_records
            .iter()
            .enumerate()
            .map(|(i, record)| read_global(GlobalId(i as u32), record, &types, &symbols))
            .collect::<Result<Vec<_>>>()?;

        let functions = function_records
            .iter()
            .enumerate()
            .map(|(i, record)| self.read_function(handle, i, record, &types, &symbols))
            .collect::<Result<Vec<_>>>()?;

        tracing::debug!(
            functions = functions.len(),
            globals = globals.len(),
            "read module"
        );
        Ok(Module {
            source_filename: info.source_filename,
            functions,
            globals,
        })
    }

    fn read_function(
        &self,
        handle: ModuleHandle,
        index: usize,
        record: &FunctionRecord,
        types: &TypeResolver,
        symbols: &Symbols,
    ) -> Result<Function> {
        let location = format!("function @{}", record.name);
        let demangled = self.shim.demangled_name(handle, index)?;
        let ret = types.resolve(&record.return_type, &location)?;

        let mut values = ValueTable::default();
        let mut params = Vec::with_capacity(record.params.len());
        for param in &record.params {
            let ty = types.resolve(&param.ty, &location)?;
            params.push(values.define(&param.name, ty, &location)?);
        }

        let mut function = Function {
            id: FuncId(index as u32),
            name: record.name.clone(),
            demangled,
            params,
            ret,
            varargs: record.varargs,
            is_declaration: record.is_declaration,
            values: Vec::new(),
            blocks: Vec::new(),
        };
        if record.is_declaration {
            function.values = values.infos;
            return Ok(function);
        }

        let mut labels = HashMap::new();
        let mut bodies = Vec::with_capacity(record.block_count);
        for b in 0..record.block_count {
            let block = self.shim.block(handle, index, b)?;
            if labels
                .insert(block.label.clone(), BlockId(b as u32))
                .is_some()
            {
                return Err(TranslateError::parse(format!(
                    "block label %{} defined twice in {location}",
                    block.label
                )));
            }
            let instructions = (0..block.instruction_count)
                .map(|i| self.shim.instruction(handle, index, b, i))
                .collect::<std::result::Result<Vec<_>, _>>()?;
            bodies.push((block.label, instructions));
        }

        // First pass: every result gets its id so forward references (phi) resolve.
        for (label, instructions) in &bodies {
            for inst in instructions {
                if inst.raw {
                    return Err(TranslateError::UnsupportedConstruct {
                        what: format!("opcode `{}`", inst.opcode),
                        location: format!("{location}, block %{label}"),
                    });
                }
                if let Some(name) = &inst.result {
                    let ty = inst.result_type.as_ref().ok_or_else(|| {
                        TranslateError::parse(format!(
                            "%{name} in {location} names a value of no type"
                        ))
                    })?;
                    let ty = types.resolve(ty, &location)?;
                    values.define(name, ty, &location)?;
                }
            }
        }

        let scope = Scope {
            location: &location,
            labels: &labels,
            values: &values.ids,
            symbols,
            types,
        };
        function.blocks = bodies
            .iter()
            .enumerate()
            .map(|(b, (label, instructions))| {
                scope.block(BlockId(b as u32), label, instructions)
            })
            .collect::<Result<Vec<_>>>()?;
        function.values = values.infos;
        Ok(function)
    }
}

// ── Symbols and types ──

struct Symbols {
    globals: HashMap<String, GlobalId>,
    functions: HashMap<String, FuncId>,
}

impl Symbols {
    fn collect(globals: &[GlobalRecord], functions: &[FunctionRecord]) -> Result<Self> {
        let mut symbols = Symbols {
            globals: HashMap::new(),
            functions: HashMap::new(),
        };
        for (i, g) in globals.iter().enumerate() {
            if symbols.globals.insert(g.name.clone(), GlobalId(i as u32)).is_some() {
                return Err(duplicate_symbol(&g.name));
            }
        }
        for (i, f) in functions.iter().enumerate() {
            if symbols.globals.contains_key(&f.name)
                || symbols.functions.insert(f.name.clone(), FuncId(i as u32)).is_some()
            {
                return Err(duplicate_symbol(&f.name));
            }
        }
        Ok(symbols)
    }
}

fn duplicate_symbol(name: &str) -> TranslateError {
    TranslateError::parse(format!("symbol @{name} defined twice"))
}

struct TypeResolver {
    named: HashMap<String, Option<TypeRecord>>,
}

impl TypeResolver {
    fn resolve(&self, ty: &TypeRecord, location: &str) -> Result<IrType> {
        self.resolve_in(ty, location, &mut Vec::new())
    }

    fn resolve_in(&self, ty: &TypeRecord, location: &str, active: &mut Vec<String>) -> Result<IrType> {
        Ok(match ty {
            TypeRecord::Void => IrType::Void,
            TypeRecord::Int(bits) => IrType::Int(*bits),
            TypeRecord::Half => IrType::Half,
            TypeRecord::Float => IrType::Float,
            TypeRecord::Double => IrType::Double,
            TypeRecord::X86Fp80 => IrType::X86Fp80,
            TypeRecord::Fp128 => IrType::Fp128,
            TypeRecord::Ptr => IrType::Ptr,
            TypeRecord::Label => IrType::Label,
            TypeRecord::Metadata => IrType::Metadata,
            TypeRecord::Array { len, elem } => IrType::Array {
                len: *len,
                elem: Box::new(self.resolve_in(elem, location, active)?),
            },
            TypeRecord::Vector { .. } => {
                return Err(TranslateError::UnsupportedConstruct {
                    what: format!("vector type `{ty}`"),
                    location: location.to_string(),
                })
            }
            TypeRecord::Struct { fields, packed } => IrType::Struct {
                fields: fields
                    .iter()
                    .map(|f| self.resolve_in(f, location, active))
                    .collect::<Result<Vec<_>>>()?,
                packed: *packed,
            },
            TypeRecord::Named(name) => {
                if active.iter().any(|n| n == name) {
                    return Err(TranslateError::UnsupportedConstruct {
                        what: format!("type %{name} contains itself"),
                        location: location.to_string(),
                    });
                }
                let body = match self.named.get(name) {
                    None => {
                        return Err(TranslateError::parse(format!(
                            "unknown type %{name} in {location}"
                        )))
                    }
                    Some(None) => {
                        return Err(TranslateError::UnsupportedConstruct {
                            what: format!("opaque type %{name}"),
                            location: location.to_string(),
                        })
                    }
                    Some(Some(body)) => body,
                };
                active.push(name.clone());
                let resolved = self.resolve_in(body, location, active);
                active.pop();
                resolved?
            }
            TypeRecord::Function {
                ret,
                params,
                varargs,
            } => IrType::Function {
                ret: Box::new(self.resolve_in(ret, location, active)?),
                params: params
                    .iter()
                    .map(|p| self.resolve_in(p, location, active))
                    .collect::<Result<Vec<_>>>()?,
                varargs: *varargs,
            },
        })
    }
}

#[derive(Default)]
struct ValueTable {
    ids: HashMap<String, ValueId>,
    infos: Vec<ValueInfo>,
}

impl ValueTable {
    fn define(&mut self, name: &str, ty: IrType, location: &str) -> Result<ValueId> {
        let id = ValueId(self.infos.len() as u32);
        if self.ids.insert(name.to_string(), id).is_some() {
            return Err(TranslateError::parse(format!(
                "%{name} defined more than once in {location}"
            )));
        }
        self.infos.push(ValueInfo {
            name: name.to_string(),
            ty,
        });
        Ok(id)
    }
}

// ── Constants ──

fn read_global(
    id: GlobalId,
    record: &GlobalRecord,
    types: &TypeResolver,
    symbols: &Symbols,
) -> Result<Global> {
    let location = format!("global @{}", record.name);
    let ty = types.resolve(&record.ty, &location)?;
    let initializer = record
        .initializer
        .as_ref()
        .map(|v| const_value(v, types, symbols, &location))
        .transpose()?;
    Ok(Global {
        id,
        name: record.name.clone(),
        ty,
        is_constant: record.is_constant,
        initializer,
        align: record.align,
    })
}

/// A value usable inside constant data: a literal or a global's address.
fn const_value(
    value: &ValueRecord,
    types: &TypeResolver,
    symbols: &Symbols,
    location: &str,
) -> Result<Constant> {
    match value {
        ValueRecord::Const(c) => constant(c, types, symbols, location),
        ValueRecord::Global(name) => {
            if let Some(id) = symbols.globals.get(name) {
                Ok(Constant::Global(*id))
            } else if symbols.functions.contains_key(name) {
                Err(TranslateError::UnsupportedConstruct {
                    what: format!("address of function @{name} in constant data"),
                    location: location.to_string(),
                })
            } else {
                Err(TranslateError::parse(format!(
                    "unknown symbol @{name} in {location}"
                )))
            }
        }
        ValueRecord::Local(name) => Err(TranslateError::parse(format!(
            "local %{name} used as a constant in {location}"
        ))),
        ValueRecord::Metadata(text) => Err(TranslateError::parse(format!(
            "metadata `{text}` used as a constant in {location}"
        ))),
    }
}

fn constant(
    c: &ConstRecord,
    types: &TypeResolver,
    symbols: &Symbols,
    location: &str,
) -> Result<Constant> {
    let elements = |ops: &[OperandRecord]| -> Result<Vec<(IrType, Constant)>> {
        ops.iter()
            .map(|op| {
                let ty = op.ty.as_ref().ok_or_else(|| {
                    TranslateError::parse(format!("untyped element in {location}"))
                })?;
                Ok((
                    types.resolve(ty, location)?,
                    const_value(&op.value, types, symbols, location)?,
                ))
            })
            .collect()
    };
    Ok(match c {
        ConstRecord::Int(v) => Constant::Int(*v),
        ConstRecord::Float(v) => Constant::Float(*v),
        ConstRecord::Bool(b) => Constant::Bool(*b),
        ConstRecord::Null => Constant::Null,
        ConstRecord::Undef | ConstRecord::Poison => Constant::Undef,
        ConstRecord::Zero => Constant::Zero,
        ConstRecord::Bytes(bytes) => Constant::Bytes(bytes.clone()),
        ConstRecord::Array(ops) => Constant::Array(elements(ops)?),
        ConstRecord::Struct(ops) => Constant::Struct(elements(ops)?),
    })
}

// ── Instructions ──

fn is_terminator(opcode: &str) -> bool {
    matches!(
        opcode,
        "ret" | "br" | "switch" | "invoke" | "resume" | "unreachable"
    )
}

/// Name resolution context for one function body.
struct Scope<'a> {
    location: &'a str,
    labels: &'a HashMap<String, BlockId>,
    values: &'a HashMap<String, ValueId>,
    symbols: &'a Symbols,
    types: &'a TypeResolver,
}

impl Scope<'_> {
    fn block(&self, id: BlockId, label: &str, records: &[InstructionRecord]) -> Result<Block> {
        let (last, body) = records.split_last().ok_or_else(|| {
            TranslateError::parse(format!("block %{label} in {} is empty", self.location))
        })?;
        let mut instructions = Vec::with_capacity(body.len());
        for inst in body {
            if is_terminator(&inst.opcode) {
                return Err(TranslateError::parse(format!(
                    "terminator `{}` in the middle of block %{label} in {}",
                    inst.opcode, self.location
                )));
            }
            instructions.push(self.instruction(inst, label)?);
        }
        if !is_terminator(&last.opcode) {
            return Err(TranslateError::parse(format!(
                "block %{label} in {} does not end with a terminator",
                self.location
            )));
        }
        Ok(Block {
            id,
            label: label.to_string(),
            instructions,
            terminator: self.terminator(last, label)?,
        })
    }

    fn unsupported(&self, inst: &InstructionRecord, label: &str) -> TranslateError {
        TranslateError::UnsupportedConstruct {
            what: format!("opcode `{}`", inst.opcode),
            location: format!("{}, block %{label}", self.location),
        }
    }

    fn instruction(&self, inst: &InstructionRecord, label: &str) -> Result<Instruction> {
        let result = self.result(inst)?;
        let opcode = inst.opcode.as_str();
        let kind = if let Some(op) = BinaryOp::from_opcode(opcode) {
            InstKind::Binary {
                op,
                ty: self.ty(inst.ty.as_ref(), inst)?,
                lhs: self.operand(self.nth(inst, 0)?)?,
                rhs: self.operand(self.nth(inst, 1)?)?,
                flags: WrapFlags {
                    nsw: inst.flags.nsw,
                    nuw: inst.flags.nuw,
                    exact: inst.flags.exact,
                },
            }
        } else if let Some(op) = CastOp::from_opcode(opcode) {
            let (from, value) = self.typed(self.nth(inst, 0)?)?;
            InstKind::Cast {
                op,
                from,
                to: self.ty(inst.ty.as_ref(), inst)?,
                value,
            }
        } else {
            match opcode {
                "icmp" => InstKind::ICmp {
                    pred: self.predicate(inst, IntPredicate::parse)?,
                    ty: self.ty(inst.ty.as_ref(), inst)?,
                    lhs: self.operand(self.nth(inst, 0)?)?,
                    rhs: self.operand(self.nth(inst, 1)?)?,
                },
                "fcmp" => InstKind::FCmp {
                    pred: self.predicate(inst, FloatPredicate::parse)?,
                    ty: self.ty(inst.ty.as_ref(), inst)?,
                    lhs: self.operand(self.nth(inst, 0)?)?,
                    rhs: self.operand(self.nth(inst, 1)?)?,
                },
                "fneg" => {
                    let (ty, value) = self.typed(self.nth(inst, 0)?)?;
                    InstKind::FNeg { ty, value }
                }
                "select" => InstKind::Select {
                    ty: self.ty(inst.ty.as_ref(), inst)?,
                    cond: self.operand(self.nth(inst, 0)?)?,
                    then_value: self.operand(self.nth(inst, 1)?)?,
                    else_value: self.operand(self.nth(inst, 2)?)?,
                },
                "alloca" => InstKind::Alloca {
                    ty: self.ty(inst.ty.as_ref(), inst)?,
                    count: inst.operands.first().map(|op| self.operand(op)).transpose()?,
                    align: inst.align,
                },
                "load" => InstKind::Load {
                    ty: self.ty(inst.ty.as_ref(), inst)?,
                    ptr: self.operand(self.nth(inst, 0)?)?,
                },
                "store" => {
                    let (ty, value) = self.typed(self.nth(inst, 0)?)?;
                    InstKind::Store {
                        ty,
                        value,
                        ptr: self.operand(self.nth(inst, 1)?)?,
                    }
                }
                "getelementptr" => InstKind::GetElementPtr {
                    source: self.ty(inst.ty.as_ref(), inst)?,
                    base: self.operand(self.nth(inst, 0)?)?,
                    indices: inst.operands[1..]
                        .iter()
                        .map(|op| self.typed(op))
                        .collect::<Result<Vec<_>>>()?,
                },
                "phi" => InstKind::Phi {
                    ty: self.ty(inst.ty.as_ref(), inst)?,
                    incoming: inst
                        .incoming
                        .iter()
                        .map(|(value, block)| Ok((self.value(value)?, self.label(block)?)))
                        .collect::<Result<Vec<_>>>()?,
                },
                "call" => InstKind::Call(self.call_site(inst)?),
                "landingpad" => InstKind::LandingPad {
                    ty: self.ty(inst.ty.as_ref(), inst)?,
                    cleanup: inst.cleanup,
                    clauses: inst.clauses.len(),
                },
                _ => return Err(self.unsupported(inst, label)),
            }
        };
        Ok(Instruction { result, kind })
    }

    fn terminator(&self, inst: &InstructionRecord, label: &str) -> Result<Terminator> {
        Ok(match inst.opcode.as_str() {
            "ret" => Terminator::Ret(inst.operands.first().map(|op| self.typed(op)).transpose()?),
            "br" if inst.operands.is_empty() => Terminator::Br(self.label(self.nth_label(inst, 0)?)?),
            "br" => Terminator::CondBr {
                cond: self.operand(self.nth(inst, 0)?)?,
                then_block: self.label(self.nth_label(inst, 0)?)?,
                else_block: self.label(self.nth_label(inst, 1)?)?,
            },
            "switch" => {
                let (ty, value) = self.typed(self.nth(inst, 0)?)?;
                let cases = inst
                    .cases
                    .iter()
                    .map(|(case, target)| {
                        let v = match &case.value {
                            ValueRecord::Const(ConstRecord::Int(v)) => *v,
                            ValueRecord::Const(ConstRecord::Bool(b)) => *b as i128,
                            other => {
                                return Err(TranslateError::parse(format!(
                                    "switch case {other} is not an integer in {}",
                                    self.location
                                )))
                            }
                        };
                        Ok((v, self.label(target)?))
                    })
                    .collect::<Result<Vec<_>>>()?;
                Terminator::Switch {
                    ty,
                    value,
                    default: self.label(self.nth_label(inst, 0)?)?,
                    cases,
                }
            }
            "invoke" => Terminator::Invoke {
                result: self.result(inst)?,
                call: self.call_site(inst)?,
                normal: self.label(self.nth_label(inst, 0)?)?,
                unwind: self.label(self.nth_label(inst, 1)?)?,
            },
            "resume" => Terminator::Resume(self.operand(self.nth(inst, 0)?)?),
            "unreachable" => Terminator::Unreachable,
            _ => return Err(self.unsupported(inst, label)),
        })
    }

    fn result(&self, inst: &InstructionRecord) -> Result<Option<ValueId>> {
        inst.result
            .as_ref()
            .map(|name| self.value(&ValueRecord::Local(name.clone())))
            .transpose()
            .map(|op| match op {
                Some(Operand::Value(id)) => Some(id),
                _ => None,
            })
    }

    fn call_site(&self, inst: &InstructionRecord) -> Result<CallSite> {
        let callee = match self.operand(self.nth(inst, 0)?)? {
            Operand::Function(id) => Callee::Direct(id),
            other => Callee::Indirect(other),
        };
        Ok(CallSite {
            callee,
            ret: self.ty(inst.ty.as_ref(), inst)?,
            args: inst.operands[1..]
                .iter()
                .map(|op| self.typed(op))
                .collect::<Result<Vec<_>>>()?,
        })
    }

    fn nth<'r>(&self, inst: &'r InstructionRecord, i: usize) -> Result<&'r OperandRecord> {
        inst.operands.get(i).ok_or_else(|| {
            TranslateError::parse(format!(
                "`{}` is missing operand {i} in {}",
                inst.opcode, self.location
            ))
        })
    }

    fn nth_label<'r>(&self, inst: &'r InstructionRecord, i: usize) -> Result<&'r str> {
        inst.labels.get(i).map(String::as_str).ok_or_else(|| {
            TranslateError::parse(format!(
                "`{}` is missing label {i} in {}",
                inst.opcode, self.location
            ))
        })
    }

    fn predicate<P>(&self, inst: &InstructionRecord, parse: fn(&str) -> Option<P>) -> Result<P> {
        inst.predicate.as_deref().and_then(parse).ok_or_else(|| {
            TranslateError::parse(format!(
                "`{}` without a valid predicate in {}",
                inst.opcode, self.location
            ))
        })
    }

    fn ty(&self, ty: Option<&TypeRecord>, inst: &InstructionRecord) -> Result<IrType> {
        let ty = ty.ok_or_else(|| {
            TranslateError::parse(format!("`{}` without a type in {}", inst.opcode, self.location))
        })?;
        self.types.resolve(ty, self.location)
    }

    fn label(&self, name: &str) -> Result<BlockId> {
        self.labels.get(name).copied().ok_or_else(|| {
            TranslateError::parse(format!("unknown block %{name} in {}", self.location))
        })
    }

    fn operand(&self, op: &OperandRecord) -> Result<Operand> {
        self.value(&op.value)
    }

    fn typed(&self, op: &OperandRecord) -> Result<(IrType, Operand)> {
        let ty = op.ty.as_ref().ok_or_else(|| {
            TranslateError::parse(format!("untyped operand {} in {}", op.value, self.location))
        })?;
        Ok((self.types.resolve(ty, self.location)?, self.operand(op)?))
    }

    fn value(&self, value: &ValueRecord) -> Result<Operand> {
        Ok(match value {
            ValueRecord::Local(name) => Operand::Value(*self.values.get(name).ok_or_else(|| {
                TranslateError::parse(format!("unknown value %{name} in {}", self.location))
            })?),
            ValueRecord::Global(name) => {
                if let Some(id) = self.symbols.globals.get(name) {
                    Operand::Global(*id)
                } else if let Some(id) = self.symbols.functions.get(name) {
                    Operand::Function(*id)
                } else {
                    return Err(TranslateError::parse(format!(
                        "unknown symbol @{name} in {}",
                        self.location
                    )));
                }
            }
            ValueRecord::Const(c) => {
                Operand::Const(constant(c, self.types, self.symbols, self.location)?)
            }
            ValueRecord::Metadata(text) => Operand::Metadata(text.clone()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use irbridge_shim::TextShim;

    fn read(source: &str) -> Result<Module> {
        let shim = TextShim::new();
        let reader = IrReader::connect(&shim)?;
        let module = reader.read_buffer(source.as_bytes());
        assert_eq!(shim.open_handles(), 0, "handle must be closed");
        module
    }

    #[test]
    fn version_checks() {
        assert!(check_shim_version(AbiVersion::new(1, 2)).is_ok());
        assert!(check_shim_version(AbiVersion::new(1, 9)).is_ok());
        assert!(matches!(
            check_shim_version(AbiVersion::new(1, 1)),
            Err(TranslateError::IncompatibleShimVersion { .. })
        ));
        assert!(matches!(
            check_shim_version(AbiVersion::new(2, 2)),
            Err(TranslateError::IncompatibleShimVersion { .. })
        ));
    }

    #[test]
    fn reads_functions_blocks_and_values() {
        let module = read(
            r#"
@limit = constant i32 10

define i32 @clamp(i32 %x) {
entry:
  %lim = load i32, ptr @limit
  %big = icmp sgt i32 %x, %lim
  br i1 %big, label %high, label %done
high:
  br label %done
done:
  %r = phi i32 [ %lim, %high ], [ %x, %entry ]
  ret i32 %r
}

declare i32 @checked_div(i32, i32)
"#,
        )
        .unwrap();
        assert_eq!(module.functions.len(), 2);
        assert_eq!(module.globals[0].initializer, Some(Constant::Int(10)));

        let f = &module.functions[0];
        assert_eq!(f.blocks.len(), 3);
        assert_eq!(f.params, vec![ValueId(0)]);
        assert_eq!(f.values.len(), 4);
        match &f.blocks[2].instructions[0].kind {
            InstKind::Phi { incoming, .. } => {
                assert_eq!(
                    incoming,
                    &vec![
                        (Operand::Value(ValueId(1)), BlockId(1)),
                        (Operand::Value(ValueId(0)), BlockId(0)),
                    ]
                );
            }
            other => panic!("expected phi, got {other:?}"),
        }
        assert!(module.functions[1].is_declaration);
    }

    #[test]
    fn resolves_direct_callees() {
        let module = read(
            r#"
define i32 @f(i32 %x) {
  %q = call i32 @checked_div(i32 %x, i32 0)
  ret i32 %q
}
declare i32 @checked_div(i32, i32)
"#,
        )
        .unwrap();
        match &module.functions[0].blocks[0].instructions[0].kind {
            InstKind::Call(site) => {
                assert_eq!(site.callee, Callee::Direct(FuncId(1)));
                assert_eq!(site.args.len(), 2);
            }
            other => panic!("expected call, got {other:?}"),
        }
    }

    #[test]
    fn unknown_opcode_is_unsupported_construct() {
        let err = read(
            r#"
define void @f() {
entry:
  fence seq_cst
  ret void
}
"#,
        )
        .unwrap_err();
        match err {
            TranslateError::UnsupportedConstruct { what, location } => {
                assert_eq!(what, "opcode `fence`");
                assert_eq!(location, "function @f, block %entry");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn fneg_is_read_as_unary_arithmetic() {
        let module = read(
            r#"
define double @neg(double %0) {
  %2 = fneg double %0
  ret double %2
}
"#,
        )
        .unwrap();
        let f = &module.functions[0];
        assert_eq!(
            f.blocks[0].instructions[0].kind,
            InstKind::FNeg {
                ty: IrType::Double,
                value: Operand::Value(ValueId(0)),
            }
        );
    }

    #[test]
    fn missing_terminator_is_parse_error() {
        let err = read(
            r#"
define i32 @f(i32 %x) {
entry:
  %y = add i32 %x, 1
}
"#,
        )
        .unwrap_err();
        assert!(
            err.to_string().contains("does not end with a terminator"),
            "{err}"
        );
    }

    #[test]
    fn terminator_in_the_middle_is_parse_error() {
        let err = read(
            r#"
define void @f() {
entry:
  ret void
  ret void
}
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("in the middle of block %entry"), "{err}");
    }

    #[test]
    fn unknown_value_is_parse_error() {
        let err = read(
            r#"
define i32 @f() {
  ret i32 %nope
}
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("unknown value %nope"), "{err}");
    }

    #[test]
    fn named_structs_expand_and_recursion_is_rejected() {
        let module = read(
            r#"
%struct.P = type { i32, i64 }
@p = global %struct.P zeroinitializer
"#,
        )
        .unwrap();
        assert_eq!(
            module.globals[0].ty,
            IrType::Struct {
                fields: vec![IrType::Int(32), IrType::Int(64)],
                packed: false
            }
        );

        let err = read(
            r#"
%struct.L = type { i32, %struct.L }
@l = global %struct.L zeroinitializer
"#,
        )
        .unwrap_err();
        assert!(matches!(err, TranslateError::UnsupportedConstruct { .. }), "{err}");
    }

    #[test]
    fn vector_types_are_unsupported() {
        let err = read(
            r#"
define <4 x i32> @v(<4 x i32> %a) {
  ret <4 x i32> %a
}
"#,
        )
        .unwrap_err();
        assert!(matches!(err, TranslateError::UnsupportedConstruct { .. }), "{err}");
    }

    #[test]
    fn malformed_text_is_parse_error_with_offset() {
        let err = read("define i32 @f( {").unwrap_err();
        assert!(matches!(err, TranslateError::Parse { offset: Some(_), .. }), "{err}");
    }
}
