//! Function translation from IR.
//!
//! Lowers one [`Function`] into a [`TargetFunction`]: the Rust signature,
//! local declarations and the statements of each block. Blocks keep their
//! source order so `Block::B{n}` names the same block the IR does.
//!
//! A `landingpad` catches every emulated exception that reaches it. Its
//! `catch`/`filter` clauses are not matched against the exception kind, so
//! a pad written for one type also receives exceptions of any other.

use std::collections::HashSet;

use tracing::debug;

use crate::backend::Backend;
use crate::codegen::exceptions::{ExceptionRewriter, Handler, ThrowingCall};
use crate::codegen::globals::GlobalLayout;
use crate::config::{TargetProfile, UnknownIntrinsicPolicy};
use crate::error::TranslateError;
use crate::intrinsics::{IntrinsicRegistry, IntrinsicSpec, Strategy};
use crate::ir::*;
use crate::mapper::{Scalar, TypeKind, TypeMapper};

type Result<T> = std::result::Result<T, TranslateError>;

/// A generated local variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Local {
    pub name: String,
    pub ty: String,
    pub init: String,
}

/// Translated body of one function, ready for the emitter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetFunction {
    pub name: String,
    pub source_name: String,
    /// `(local, rust type)`.
    pub params: Vec<(String, String)>,
    pub ret: String,
    pub locals: Vec<Local>,
    /// Unindented statements per block, in source block order.
    pub blocks: Vec<Vec<String>>,
    /// Emit the body without the block state machine.
    pub flat: bool,
    /// The function allocates stack memory and needs a frame.
    pub uses_frame: bool,
}

impl TargetFunction {
    pub fn statement_count(&self) -> usize {
        self.locals.len() + self.blocks.iter().map(Vec::len).sum::<usize>()
    }
}

/// Read-only state shared by every function translation of a module.
pub struct ModuleContext<'m> {
    pub module: &'m Module,
    pub mapper: &'m TypeMapper,
    pub registry: &'m IntrinsicRegistry,
    pub profile: &'m TargetProfile,
    pub backend: &'m dyn Backend,
    pub globals: &'m GlobalLayout,
    /// Rust identifier of each function, indexed by [`FuncId`].
    pub names: &'m [String],
}

pub struct FunctionTranslator<'m> {
    cx: &'m ModuleContext<'m>,
    rewriter: ExceptionRewriter,
}

impl<'m> FunctionTranslator<'m> {
    pub fn new(cx: &'m ModuleContext<'m>) -> Self {
        Self {
            cx,
            rewriter: ExceptionRewriter::new(cx.profile.elide_proven_checks),
        }
    }

    pub fn translate(&self, func: &Function) -> Result<TargetFunction> {
        debug!(function = %func.name, blocks = func.blocks.len(), "translating function");
        let lowering = Lowering::new(self.cx, func, self.rewriter);

        let name = self
            .cx
            .names
            .get(func.id.index())
            .cloned()
            .ok_or_else(|| TranslateError::parse(format!("no identifier for @{}", func.name)))?;
        let (params, ret) = lowering.signature()?;

        let mut blocks = Vec::with_capacity(func.blocks.len());
        for block in &func.blocks {
            blocks.push(lowering.block(block)?);
        }

        let uses_frame = func
            .blocks
            .iter()
            .flat_map(|b| &b.instructions)
            .any(|i| matches!(i.kind, InstKind::Alloca { .. }));
        let flat = func.blocks.len() == 1 && func.blocks[0].terminator.successors().is_empty();

        Ok(TargetFunction {
            name,
            source_name: func.name.clone(),
            params,
            ret,
            locals: lowering.locals(),
            blocks,
            flat,
            uses_frame,
        })
    }
}

/// Per-function lowering state.
struct Lowering<'a> {
    cx: &'a ModuleContext<'a>,
    func: &'a Function,
    rewriter: ExceptionRewriter,
    /// Landing pad values and phis of landing pad type: `Option<Exception>`.
    exception_values: HashSet<ValueId>,
    has_invoke: bool,
}

fn indent(lines: &[String], depth: usize) -> String {
    let pad = "    ".repeat(depth);
    lines
        .iter()
        .flat_map(|s| s.lines())
        .map(|l| format!("{pad}{l}\n"))
        .collect()
}

impl<'a> Lowering<'a> {
    fn new(cx: &'a ModuleContext<'a>, func: &'a Function, rewriter: ExceptionRewriter) -> Self {
        let insts = || func.blocks.iter().flat_map(|b| &b.instructions);
        let pad_types: HashSet<&IrType> = insts()
            .filter_map(|i| match &i.kind {
                InstKind::LandingPad { ty, .. } => Some(ty),
                _ => None,
            })
            .collect();
        let exception_values = insts()
            .filter_map(|i| match (&i.kind, i.result) {
                (InstKind::LandingPad { .. }, Some(v)) => Some(v),
                (InstKind::Phi { ty, .. }, Some(v)) if pad_types.contains(ty) => Some(v),
                _ => None,
            })
            .collect();
        let has_invoke = func
            .blocks
            .iter()
            .any(|b| matches!(b.terminator, Terminator::Invoke { .. }));
        Self {
            cx,
            func,
            rewriter,
            exception_values,
            has_invoke,
        }
    }

    fn backend(&self) -> &dyn Backend {
        self.cx.backend
    }

    fn unsupported(&self, block: &Block, opcode: &str, detail: impl Into<String>) -> TranslateError {
        TranslateError::UnsupportedInstruction {
            opcode: opcode.to_string(),
            function: format!("@{}", self.func.name),
            block: block.label.clone(),
            detail: detail.into(),
        }
    }

    fn scalar(&self, block: &Block, opcode: &str, ty: &IrType) -> Result<Scalar> {
        self.cx
            .mapper
            .scalar(ty)?
            .ok_or_else(|| self.unsupported(block, opcode, format!("aggregate value of type {ty}")))
    }

    /// Rust type of a return or parameter; `()` for void.
    fn abi_type(&self, ty: &IrType, what: &str) -> Result<String> {
        self.cx
            .mapper
            .map(ty)?
            .rust_type()
            .map(str::to_string)
            .ok_or_else(|| TranslateError::UnsupportedType {
                ty: ty.to_string(),
                reason: format!("aggregate {what} of @{}", self.func.name),
            })
    }

    fn signature(&self) -> Result<(Vec<(String, String)>, String)> {
        if self.func.varargs {
            return Err(TranslateError::UnsupportedType {
                ty: format!("@{}", self.func.name),
                reason: "variadic functions cannot be defined".to_string(),
            });
        }
        let ret = self.abi_type(&self.func.ret, "return type")?;
        let params = self
            .func
            .params
            .iter()
            .map(|p| -> Result<(String, String)> {
                Ok((p.to_string(), self.abi_type(&self.func.value(*p).ty, "parameter")?))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok((params, ret))
    }

    fn locals(&self) -> Vec<Local> {
        let mut locals = Vec::new();
        for (index, info) in self.func.values.iter().enumerate().skip(self.func.params.len()) {
            let id = ValueId(index as u32);
            if self.exception_values.contains(&id) {
                locals.push(Local {
                    name: id.to_string(),
                    ty: "Option<Exception>".to_string(),
                    init: "None".to_string(),
                });
                continue;
            }
            if let Some(scalar) = self.cx.mapper.scalar(&info.ty).ok().flatten() {
                locals.push(Local {
                    name: id.to_string(),
                    ty: scalar.rust_type().to_string(),
                    init: scalar.zero_literal().to_string(),
                });
            }
        }
        if self.has_invoke {
            locals.push(Local {
                name: "__exception".to_string(),
                ty: "Option<Exception>".to_string(),
                init: "None".to_string(),
            });
        }
        locals
    }

    /// Destination local for a result, `None` for void results.
    fn dest(&self, result: Option<ValueId>) -> Option<String> {
        result
            .filter(|v| self.func.value(*v).ty != IrType::Void)
            .map(|v| v.to_string())
    }

    fn global_name(&self, id: GlobalId) -> Result<String> {
        self.cx
            .globals
            .const_name(id)
            .map(str::to_string)
            .ok_or_else(|| TranslateError::parse(format!("unknown global {id}")))
    }

    fn operand(&self, block: &Block, opcode: &str, op: &Operand, ty: &IrType) -> Result<String> {
        let backend = self.backend();
        Ok(match op {
            Operand::Value(id) => id.to_string(),
            Operand::Global(g) | Operand::Const(Constant::Global(g)) => self.global_name(*g)?,
            Operand::Const(c) => {
                let scalar = self.scalar(block, opcode, ty)?;
                match c {
                    Constant::Int(v) => backend.int_literal(*v, scalar),
                    Constant::Bool(b) => backend.int_literal(i128::from(*b), scalar),
                    Constant::Float(f) => backend.float_literal(*f, scalar),
                    Constant::Null | Constant::Zero | Constant::Undef => scalar.zero_literal().to_string(),
                    _ => return Err(self.unsupported(block, opcode, "aggregate constant operand")),
                }
            }
            Operand::Function(f) => {
                let name = &self.cx.module.function(*f).name;
                return Err(self.unsupported(block, opcode, format!("address of @{name} used as a value")));
            }
            Operand::Metadata(_) => return Err(self.unsupported(block, opcode, "metadata operand")),
        })
    }

    fn operands(&self, block: &Block, opcode: &str, args: &[(IrType, Operand)]) -> Result<Vec<String>> {
        args.iter()
            .map(|(ty, op)| self.operand(block, opcode, op, ty))
            .collect()
    }

    // ── Blocks ───────────────────────────────────────────────────────

    fn block(&self, block: &Block) -> Result<Vec<String>> {
        let mut out = Vec::new();
        for inst in &block.instructions {
            out.extend(self.instruction(block, inst)?);
        }
        out.extend(self.terminator(block)?);
        Ok(out)
    }

    /// Phi copies into `to` followed by the block switch, for the edge `from -> to`.
    fn edge(&self, from: &Block, to: BlockId) -> Result<Vec<String>> {
        let target = self
            .func
            .blocks
            .get(to.index())
            .ok_or_else(|| TranslateError::parse(format!("branch to unknown block {to}")))?;
        let mut copies = Vec::new();
        for inst in &target.instructions {
            let (InstKind::Phi { ty, incoming }, Some(dest)) = (&inst.kind, inst.result) else {
                continue;
            };
            let (value, _) = incoming.iter().find(|(_, pred)| *pred == from.id).ok_or_else(|| {
                TranslateError::parse(format!(
                    "phi in %{} has no value for predecessor %{}",
                    target.label, from.label
                ))
            })?;
            let src = if self.exception_values.contains(&dest) {
                match value {
                    Operand::Value(v) => format!("{v}.clone()"),
                    _ => "None".to_string(),
                }
            } else {
                self.operand(from, "phi", value, ty)?
            };
            copies.push((dest.to_string(), src));
        }
        let mut out: Vec<String> = self.backend().emit_phi_copies(&copies).into_iter().collect();
        out.push(self.backend().emit_set_block(to));
        Ok(out)
    }

    fn instruction(&self, block: &Block, inst: &Instruction) -> Result<Vec<String>> {
        let opcode = inst.kind.opcode();
        let backend = self.backend();
        let dest = self.dest(inst.result);
        let dest_or = |what: &str| {
            dest.clone()
                .ok_or_else(|| self.unsupported(block, opcode, format!("{what} without a result")))
        };

        Ok(match &inst.kind {
            InstKind::Binary {
                op,
                ty,
                lhs,
                rhs,
                flags,
            } => {
                let scalar = self.scalar(block, opcode, ty)?;
                let lhs = self.operand(block, opcode, lhs, ty)?;
                let rhs = self.operand(block, opcode, rhs, ty)?;
                backend
                    .emit_binop(&dest_or("binary operation")?, *op, scalar, (&lhs, &rhs), *flags, self.cx.profile.overflow)
                    .map_err(|detail| self.unsupported(block, opcode, detail))?
            }
            InstKind::ICmp { pred, ty, lhs, rhs } => {
                let scalar = self.scalar(block, opcode, ty)?;
                let lhs = self.operand(block, opcode, lhs, ty)?;
                let rhs = self.operand(block, opcode, rhs, ty)?;
                vec![backend.emit_icmp(&dest_or("comparison")?, *pred, scalar, &lhs, &rhs)]
            }
            InstKind::FCmp { pred, ty, lhs, rhs } => {
                if !self.scalar(block, opcode, ty)?.is_float() {
                    return Err(self.unsupported(block, opcode, format!("fcmp on {ty}")));
                }
                let lhs = self.operand(block, opcode, lhs, ty)?;
                let rhs = self.operand(block, opcode, rhs, ty)?;
                vec![backend.emit_fcmp(&dest_or("comparison")?, *pred, &lhs, &rhs)]
            }
            InstKind::FNeg { ty, value } => {
                if !self.scalar(block, opcode, ty)?.is_float() {
                    return Err(self.unsupported(block, opcode, format!("fneg on {ty}")));
                }
                let value = self.operand(block, opcode, value, ty)?;
                vec![backend.emit_fneg(&dest_or("fneg")?, &value)]
            }
            InstKind::Select {
                ty,
                cond,
                then_value,
                else_value,
            } => {
                self.scalar(block, opcode, ty)?;
                let cond = self.operand(block, opcode, cond, &IrType::Int(1))?;
                let a = self.operand(block, opcode, then_value, ty)?;
                let b = self.operand(block, opcode, else_value, ty)?;
                vec![backend.emit_select(&dest_or("select")?, &cond, &a, &b)]
            }
            InstKind::Cast { op, from, to, value } => {
                let from_scalar = self.scalar(block, opcode, from)?;
                let to_scalar = self.scalar(block, opcode, to)?;
                let value = self.operand(block, opcode, value, from)?;
                let stmt = backend
                    .emit_cast(&dest_or("cast")?, *op, from_scalar, to_scalar, &value)
                    .ok_or_else(|| self.unsupported(block, opcode, format!("cannot cast {from} to {to}")))?;
                vec![stmt]
            }
            InstKind::Alloca { ty, count, align } => {
                let desc = self.cx.mapper.map(ty)?;
                let size = match count {
                    None => format!("{}u64", desc.size),
                    Some(op) => match op.as_const_int() {
                        Some(n) => format!("{}u64", desc.size.wrapping_mul(n as u64)),
                        None => {
                            let n = match op {
                                Operand::Value(v) => v.to_string(),
                                _ => return Err(self.unsupported(block, opcode, "non-integer element count")),
                            };
                            format!("{}u64.wrapping_mul({n} as u64)", desc.size)
                        }
                    },
                };
                let align = align.unwrap_or(1).max(desc.align).max(1);
                vec![backend.emit_alloca(&dest_or("alloca")?, &size, align)]
            }
            InstKind::Load { ty, ptr } => {
                let scalar = self.scalar(block, opcode, ty)?;
                let addr = self.operand(block, opcode, ptr, &IrType::Ptr)?;
                vec![backend.emit_load(&dest_or("load")?, scalar, &addr)]
            }
            InstKind::Store { ty, value, ptr } => {
                let scalar = self.scalar(block, opcode, ty)?;
                let value = self.operand(block, opcode, value, ty)?;
                let addr = self.operand(block, opcode, ptr, &IrType::Ptr)?;
                vec![backend.emit_store(scalar, &addr, &value)]
            }
            InstKind::GetElementPtr {
                source,
                base,
                indices,
            } => {
                let base = self.operand(block, opcode, base, &IrType::Ptr)?;
                let (offset, terms) = self.gep_offsets(block, source, indices)?;
                vec![backend.emit_gep(&dest_or("getelementptr")?, &base, offset, &terms)]
            }
            // Phis are materialized as copies on incoming edges.
            InstKind::Phi { .. } => Vec::new(),
            InstKind::Call(site) => self.call(block, site, dest.clone(), None)?,
            InstKind::LandingPad { .. } => {
                vec![backend.emit_assign(&dest_or("landingpad")?, "__exception.take()")]
            }
        })
    }

    /// Constant byte offset plus `(index expression, stride)` terms.
    fn gep_offsets(
        &self,
        block: &Block,
        source: &IrType,
        indices: &[(IrType, Operand)],
    ) -> Result<(i64, Vec<(String, i64)>)> {
        let opcode = "getelementptr";
        let mut offset = 0i64;
        let mut terms = Vec::new();
        let mut current = self.cx.mapper.map(source)?;
        for (i, (index_ty, index)) in indices.iter().enumerate() {
            let stride = if i == 0 {
                current.stride()
            } else {
                let next = match &current.kind {
                    TypeKind::Array { elem, .. } => elem.clone(),
                    TypeKind::Struct { fields, offsets, .. } => {
                        let k = index
                            .as_const_int()
                            .ok_or_else(|| self.unsupported(block, opcode, "dynamic struct index"))?;
                        let (field, field_offset) = usize::try_from(k)
                            .ok()
                            .and_then(|k| Some((fields.get(k)?.clone(), *offsets.get(k)?)))
                            .ok_or_else(|| self.unsupported(block, opcode, format!("struct index {k} out of range")))?;
                        offset = offset.wrapping_add(field_offset as i64);
                        current = field;
                        continue;
                    }
                    _ => return Err(self.unsupported(block, opcode, "index into a non-aggregate type")),
                };
                current = next;
                current.stride()
            };
            match index.as_const_int() {
                Some(k) => offset = offset.wrapping_add((k as i64).wrapping_mul(stride as i64)),
                None => terms.push((self.operand(block, opcode, index, index_ty)?, stride as i64)),
            }
        }
        Ok((offset, terms))
    }

    // ── Calls ────────────────────────────────────────────────────────

    /// Lower a call. `invoke` carries the `(normal, unwind)` successors of
    /// an invoke terminator; the returned statements then end with the
    /// block switch of whichever edge is taken.
    fn call(
        &self,
        block: &Block,
        site: &CallSite,
        dest: Option<String>,
        invoke: Option<(BlockId, BlockId)>,
    ) -> Result<Vec<String>> {
        let opcode = if invoke.is_some() { "invoke" } else { "call" };
        let callee = match &site.callee {
            Callee::Direct(f) => self.cx.module.function(*f),
            Callee::Indirect(_) => return Err(self.unsupported(block, opcode, "indirect calls are not supported")),
        };
        let ret = if dest.is_some() {
            self.scalar(block, opcode, &site.ret)?.rust_type()
        } else {
            "()"
        };

        if !callee.is_declaration {
            if callee.varargs || callee.params.len() != site.args.len() {
                return Err(self.unsupported(block, opcode, format!("call of @{} with mismatched arguments", callee.name)));
            }
            let args = self.operands(block, opcode, &site.args)?;
            let name = self
                .cx
                .names
                .get(callee.id.index())
                .ok_or_else(|| TranslateError::parse(format!("no identifier for @{}", callee.name)))?;
            let Some(edges) = invoke else {
                return Ok(vec![self.backend().emit_call(dest.as_deref(), name, &args)]);
            };
            let mut call_args = vec!["ctx".to_string()];
            call_args.extend(args);
            let expr = format!("{name}({})", call_args.join(", "));
            return self.invoke_match(block, &expr, dest, edges);
        }

        if let Some(spec) = self.cx.registry.lookup(&callee.name) {
            return self.intrinsic(block, spec, &callee.name, site, dest, invoke);
        }

        match self.cx.profile.unknown_intrinsics {
            UnknownIntrinsicPolicy::Reject => Err(TranslateError::UnsupportedIntrinsic {
                name: callee.name.clone(),
                function: format!("@{}", self.func.name),
                block: block.label.clone(),
            }),
            UnknownIntrinsicPolicy::External => {
                let args = self.operands(block, opcode, &site.args)?;
                let Some(edges) = invoke else {
                    return Ok(vec![self.backend().emit_call_external(dest.as_deref(), &callee.name, &args, ret)]);
                };
                let values: Vec<String> = args.iter().map(|a| format!("Value::from({a})")).collect();
                // An unused non-void result is discarded whatever its type.
                let extract = if dest.is_none() && site.ret != IrType::Void {
                    ".map(|_| ())".to_string()
                } else {
                    format!(".and_then(|__v| __v.get::<{ret}>())")
                };
                let expr = format!("ctx.call_external({:?}, &[{}]){extract}", callee.name, values.join(", "));
                self.invoke_match(block, &expr, dest, edges)
            }
        }
    }

    /// `match` over the callee's outcome: exceptions take the unwind edge,
    /// traps propagate.
    fn invoke_match(
        &self,
        block: &Block,
        expr: &str,
        dest: Option<String>,
        (normal, unwind): (BlockId, BlockId),
    ) -> Result<Vec<String>> {
        let mut on_normal: Vec<String> = dest.map(|d| format!("{d} = __v;")).into_iter().collect();
        on_normal.extend(self.edge(block, normal)?);
        let mut on_unwind = vec!["__exception = Some(__e);".to_string()];
        on_unwind.extend(self.edge(block, unwind)?);
        Ok(vec![format!(
            "match {expr} {{\n    Ok(__v) => {{\n{}    }}\n    Err(Fault::Exception(__e)) => {{\n{}    }}\n    Err(__f) => return Err(__f),\n}}",
            indent(&on_normal, 2),
            indent(&on_unwind, 2)
        )])
    }

    fn intrinsic(
        &self,
        block: &Block,
        spec: &IntrinsicSpec,
        name: &str,
        site: &CallSite,
        dest: Option<String>,
        invoke: Option<(BlockId, BlockId)>,
    ) -> Result<Vec<String>> {
        let opcode = if invoke.is_some() { "invoke" } else { "call" };
        if spec.strategy == Strategy::NoOp {
            return match invoke {
                Some((normal, _)) => self.edge(block, normal),
                None => Ok(Vec::new()),
            };
        }
        if site.args.len() != spec.ir_arity() {
            return Err(self.unsupported(
                block,
                opcode,
                format!("@{name} expects {} arguments, got {}", spec.ir_arity(), site.args.len()),
            ));
        }
        let ir_args = &site.args[..spec.arity];
        let args = self.operands(block, opcode, ir_args)?;

        let overload = match ir_args.first() {
            Some((ty, _)) if !spec.overloads.is_empty() => Some(self.scalar(block, opcode, ty)?),
            _ => None,
        };
        let path = spec.path(overload.map(Scalar::rust_type)).ok_or_else(|| {
            let ty = overload.map(Scalar::rust_type).unwrap_or("this type");
            self.unsupported(block, opcode, format!("no {ty} overload of @{name}"))
        })?;
        if let Some(scalar) = overload {
            self.check_overload(block, opcode, name, scalar, site, ir_args)?;
        }

        let backend = self.backend();
        let mut out = match spec.strategy {
            Strategy::Pure(_) => vec![backend.emit_intrinsic(dest.as_deref(), &path, &args, false, false)],
            Strategy::Fallible(_) => vec![backend.emit_intrinsic(dest.as_deref(), &path, &args, true, false)],
            Strategy::Memory(_) => {
                let casted: Vec<String> = args
                    .iter()
                    .zip(spec.arg_casts.iter().chain(std::iter::repeat(&"u64")))
                    .map(|(a, cast)| format!("{a} as {cast}"))
                    .collect();
                vec![backend.emit_intrinsic(dest.as_deref(), &path, &casted, true, true)]
            }
            Strategy::MayThrow(_) => {
                let call = ThrowingCall {
                    spec,
                    path,
                    args,
                    constants: ir_args.iter().map(|(_, op)| op.as_const_int()).collect(),
                    bits: overload.map(Scalar::bits),
                    dest,
                };
                let handler = match invoke {
                    Some((normal, unwind)) => Handler::Invoke {
                        normal: self.edge(block, normal)?,
                        unwind: self.edge(block, unwind)?,
                    },
                    None => Handler::Propagate,
                };
                return Ok(self.rewriter.rewrite(&call, handler));
            }
            Strategy::NoOp => Vec::new(),
        };
        if let Some((normal, _)) = invoke {
            out.extend(self.edge(block, normal)?);
        }
        Ok(out)
    }

    /// Every operand and the result of an overloaded call share one type.
    fn check_overload(
        &self,
        block: &Block,
        opcode: &str,
        name: &str,
        scalar: Scalar,
        site: &CallSite,
        ir_args: &[(IrType, Operand)],
    ) -> Result<()> {
        for (ty, _) in ir_args {
            if self.scalar(block, opcode, ty)? != scalar {
                return Err(self.unsupported(
                    block,
                    opcode,
                    format!("@{name} mixes {} and {ty} operands", scalar.rust_type()),
                ));
            }
        }
        let ret = match site.ret {
            IrType::Void => None,
            ref ty => Some(self.scalar(block, opcode, ty)?),
        };
        if ret != Some(scalar) {
            return Err(self.unsupported(
                block,
                opcode,
                format!("@{name} on {} cannot return {}", scalar.rust_type(), site.ret),
            ));
        }
        Ok(())
    }

    // ── Terminators ──────────────────────────────────────────────────

    fn terminator(&self, block: &Block) -> Result<Vec<String>> {
        let backend = self.backend();
        let opcode = block.terminator.opcode();
        let continue_ = || "continue;".to_string();
        Ok(match &block.terminator {
            Terminator::Ret(None) => vec![backend.emit_return(None)],
            Terminator::Ret(Some((ty, value))) => {
                let value = self.operand(block, opcode, value, ty)?;
                vec![backend.emit_return(Some(&value))]
            }
            Terminator::Br(target) => {
                let mut out = self.edge(block, *target)?;
                out.push(continue_());
                out
            }
            Terminator::CondBr {
                cond,
                then_block,
                else_block,
            } => {
                let cond = self.operand(block, opcode, cond, &IrType::Int(1))?;
                let then_edge = self.edge(block, *then_block)?;
                let else_edge = self.edge(block, *else_block)?;
                vec![
                    format!(
                        "if {cond} {{\n{}}} else {{\n{}}}",
                        indent(&then_edge, 1),
                        indent(&else_edge, 1)
                    ),
                    continue_(),
                ]
            }
            Terminator::Switch {
                ty,
                value,
                default,
                cases,
            } => {
                let scalar = self.scalar(block, opcode, ty)?;
                let value = self.operand(block, opcode, value, ty)?;
                let mut arms = String::new();
                for (case, target) in cases {
                    let pattern = backend.int_literal(*case, scalar);
                    arms.push_str(&format!("    {pattern} => {{\n{}    }}\n", indent(&self.edge(block, *target)?, 2)));
                }
                arms.push_str(&format!("    _ => {{\n{}    }}\n", indent(&self.edge(block, *default)?, 2)));
                vec![format!("match {value} {{\n{arms}}}"), continue_()]
            }
            Terminator::Invoke {
                result,
                call,
                normal,
                unwind,
            } => {
                let mut out = self.call(block, call, self.dest(*result), Some((*normal, *unwind)))?;
                out.push(continue_());
                out
            }
            Terminator::Resume(value) => {
                let pending = match value {
                    Operand::Value(v) => format!("{v}.take()"),
                    _ => "None".to_string(),
                };
                vec![format!("return Err(Fault::resume({pending}));")]
            }
            Terminator::Unreachable => vec![backend.emit_unreachable()],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::SafeBackend;

    struct Fixture {
        module: Module,
        mapper: TypeMapper,
        profile: TargetProfile,
        globals: GlobalLayout,
        names: Vec<String>,
    }

    impl Fixture {
        fn new(functions: Vec<Function>) -> Self {
            let names = functions.iter().map(|f| f.name.clone()).collect();
            Self {
                module: Module {
                    source_filename: None,
                    functions,
                    globals: Vec::new(),
                },
                mapper: TypeMapper::new(&TargetProfile::default()),
                profile: TargetProfile::default(),
                globals: GlobalLayout::default(),
                names,
            }
        }

        fn translate(&self, index: usize) -> Result<TargetFunction> {
            let backend = SafeBackend::new();
            let cx = ModuleContext {
                module: &self.module,
                mapper: &self.mapper,
                registry: IntrinsicRegistry::standard(),
                profile: &self.profile,
                backend: &backend,
                globals: &self.globals,
                names: &self.names,
            };
            FunctionTranslator::new(&cx).translate(&self.module.functions[index])
        }
    }

    fn value(name: &str, ty: IrType) -> ValueInfo {
        ValueInfo {
            name: name.to_string(),
            ty,
        }
    }

    fn declare(id: u32, name: &str, ret: IrType, params: usize) -> Function {
        Function {
            id: FuncId(id),
            name: name.to_string(),
            demangled: None,
            params: (0..params as u32).map(ValueId).collect(),
            ret,
            varargs: false,
            is_declaration: true,
            values: (0..params).map(|i| value(&i.to_string(), IrType::Int(32))).collect(),
            blocks: Vec::new(),
        }
    }

    /// `i32 divide(i32 %x) { %q = call checked_div(%x, %d); ret %q }`
    fn divide(divisor: Operand) -> Function {
        let i32t = IrType::Int(32);
        Function {
            id: FuncId(0),
            name: "divide".to_string(),
            demangled: None,
            params: vec![ValueId(0)],
            ret: i32t.clone(),
            varargs: false,
            is_declaration: false,
            values: vec![value("x", i32t.clone()), value("q", i32t.clone())],
            blocks: vec![Block {
                id: BlockId(0),
                label: "entry".to_string(),
                instructions: vec![Instruction {
                    result: Some(ValueId(1)),
                    kind: InstKind::Call(CallSite {
                        callee: Callee::Direct(FuncId(1)),
                        ret: i32t.clone(),
                        args: vec![(i32t.clone(), Operand::Value(ValueId(0))), (i32t.clone(), divisor)],
                    }),
                }],
                terminator: Terminator::Ret(Some((i32t, Operand::Value(ValueId(1))))),
            }],
        }
    }

    #[test]
    fn may_throw_call_is_rewritten() {
        let fx = Fixture::new(vec![
            divide(Operand::Const(Constant::Int(0))),
            declare(1, "checked_div", IrType::Int(32), 2),
        ]);
        let f = fx.translate(0).unwrap();
        assert!(f.flat);
        assert_eq!(f.params, vec![("v0".to_string(), "i32".to_string())]);
        assert_eq!(
            f.blocks[0],
            vec![
                "let __r = irbridge_runtime::intrinsics::i32::checked_div(v0, 0i32);".to_string(),
                "v1 = __r.value;".to_string(),
                "if let Status::Pending(__e) = __r.status {\n    return Err(Fault::Exception(__e));\n}".to_string(),
                "return Ok(v1);".to_string(),
            ]
        );
        assert_eq!(f.locals.len(), 1);
    }

    #[test]
    fn unknown_declarations_follow_the_policy() {
        let mut fx = Fixture::new(vec![
            divide(Operand::Const(Constant::Int(3))),
            declare(1, "my_div", IrType::Int(32), 2),
        ]);
        assert!(matches!(
            fx.translate(0),
            Err(TranslateError::UnsupportedIntrinsic { ref name, .. }) if name == "my_div"
        ));

        fx.profile.unknown_intrinsics = UnknownIntrinsicPolicy::External;
        let f = fx.translate(0).unwrap();
        assert_eq!(
            f.blocks[0][0],
            "v1 = ctx.call_external(\"my_div\", &[Value::from(v0), Value::from(3i32)])?.get::<i32>()?;"
        );
    }

    fn call_site(f: &mut Function) -> &mut CallSite {
        match &mut f.blocks[0].instructions[0].kind {
            InstKind::Call(site) => site,
            other => panic!("expected a call, got {other:?}"),
        }
    }

    #[test]
    fn intrinsic_argument_count_must_match() {
        let mut f = divide(Operand::Const(Constant::Int(2)));
        call_site(&mut f)
            .args
            .push((IrType::Int(32), Operand::Const(Constant::Int(99))));
        let fx = Fixture::new(vec![f, declare(1, "checked_div", IrType::Int(32), 2)]);
        match fx.translate(0) {
            Err(TranslateError::UnsupportedInstruction { opcode, detail, .. }) => {
                assert_eq!(opcode, "call");
                assert_eq!(detail, "@checked_div expects 2 arguments, got 3");
            }
            other => panic!("expected UnsupportedInstruction, got {other:?}"),
        }
    }

    #[test]
    fn overload_must_agree_with_result_and_operands() {
        let mut wide_result = divide(Operand::Const(Constant::Int(2)));
        call_site(&mut wide_result).ret = IrType::Int(64);
        wide_result.values[1].ty = IrType::Int(64);
        let fx = Fixture::new(vec![wide_result, declare(1, "checked_div", IrType::Int(64), 2)]);
        assert!(matches!(
            fx.translate(0),
            Err(TranslateError::UnsupportedInstruction { ref detail, .. }) if detail == "@checked_div on i32 cannot return i64"
        ));

        let mut mixed = divide(Operand::Const(Constant::Int(2)));
        call_site(&mut mixed).args[1].0 = IrType::Int(64);
        let fx = Fixture::new(vec![mixed, declare(1, "checked_div", IrType::Int(32), 2)]);
        assert!(matches!(
            fx.translate(0),
            Err(TranslateError::UnsupportedInstruction { ref detail, .. }) if detail == "@checked_div mixes i32 and i64 operands"
        ));
    }

    #[test]
    fn indirect_calls_are_rejected() {
        let mut f = divide(Operand::Const(Constant::Int(1)));
        if let InstKind::Call(site) = &mut f.blocks[0].instructions[0].kind {
            site.callee = Callee::Indirect(Operand::Value(ValueId(0)));
        }
        let fx = Fixture::new(vec![f]);
        match fx.translate(0) {
            Err(TranslateError::UnsupportedInstruction { opcode, block, .. }) => {
                assert_eq!(opcode, "call");
                assert_eq!(block, "entry");
            }
            other => panic!("expected UnsupportedInstruction, got {other:?}"),
        }
    }

    #[test]
    fn branches_copy_phis_on_edges() {
        // entry: br %loop ; loop: %i = phi [0, entry], [%n, loop]; %n = add %i, 1; %c = icmp slt %n, 10; br %c, loop, exit ; exit: ret %n
        let i32t = IrType::Int(32);
        let f = Function {
            id: FuncId(0),
            name: "count".to_string(),
            demangled: None,
            params: Vec::new(),
            ret: i32t.clone(),
            varargs: false,
            is_declaration: false,
            values: vec![value("i", i32t.clone()), value("n", i32t.clone()), value("c", IrType::Int(1))],
            blocks: vec![
                Block {
                    id: BlockId(0),
                    label: "entry".to_string(),
                    instructions: Vec::new(),
                    terminator: Terminator::Br(BlockId(1)),
                },
                Block {
                    id: BlockId(1),
                    label: "loop".to_string(),
                    instructions: vec![
                        Instruction {
                            result: Some(ValueId(0)),
                            kind: InstKind::Phi {
                                ty: i32t.clone(),
                                incoming: vec![
                                    (Operand::Const(Constant::Int(0)), BlockId(0)),
                                    (Operand::Value(ValueId(1)), BlockId(1)),
                                ],
                            },
                        },
                        Instruction {
                            result: Some(ValueId(1)),
                            kind: InstKind::Binary {
                                op: BinaryOp::Add,
                                ty: i32t.clone(),
                                lhs: Operand::Value(ValueId(0)),
                                rhs: Operand::Const(Constant::Int(1)),
                                flags: WrapFlags::default(),
                            },
                        },
                        Instruction {
                            result: Some(ValueId(2)),
                            kind: InstKind::ICmp {
                                pred: IntPredicate::Slt,
                                ty: i32t.clone(),
                                lhs: Operand::Value(ValueId(1)),
                                rhs: Operand::Const(Constant::Int(10)),
                            },
                        },
                    ],
                    terminator: Terminator::CondBr {
                        cond: Operand::Value(ValueId(2)),
                        then_block: BlockId(1),
                        else_block: BlockId(2),
                    },
                },
                Block {
                    id: BlockId(2),
                    label: "exit".to_string(),
                    instructions: Vec::new(),
                    terminator: Terminator::Ret(Some((i32t, Operand::Value(ValueId(1))))),
                },
            ],
        };
        let fx = Fixture::new(vec![f]);
        let t = fx.translate(0).unwrap();
        assert!(!t.flat);
        assert_eq!(t.blocks[0], vec!["v0 = 0i32;", "__current_block = Block::B1;", "continue;"]);
        assert_eq!(
            t.blocks[1][2],
            "if v2 {\n    v0 = v1;\n    __current_block = Block::B1;\n} else {\n    __current_block = Block::B2;\n}"
        );
        assert_eq!(t.locals.len(), 3);
    }
}
