//! Text front end: turns `.ll` source into a [`ParsedModule`].
//!
//! The grammar keeps every piece of syntax the records need and skips
//! attributes, metadata and linkage details the translator never reads.

use std::collections::HashMap;

use pest::error::{InputLocation, LineColLocation};
use pest::iterators::{Pair, Pairs};
use pest::{Parser, Span};
use pest_derive::Parser;

use crate::demangle::demangle;
use crate::model::{
    BlockRecord, ConstRecord, FunctionRecord, GlobalRecord, InstructionRecord, ModuleInfoRecord,
    NamedTypeRecord, OperandRecord, ParamRecord, TypeRecord, ValueRecord,
};
use crate::ShimError;

#[derive(Parser)]
#[grammar = "grammar.pest"]
struct LlParser;

type Result<T> = std::result::Result<T, ShimError>;

/// A fully parsed module, owned by one handle.
#[derive(Debug, Clone, Default)]
pub struct ParsedModule {
    pub info: ModuleInfoRecord,
    pub named_types: Vec<NamedTypeRecord>,
    pub globals: Vec<GlobalRecord>,
    pub functions: Vec<ParsedFunction>,
}

#[derive(Debug, Clone)]
pub struct ParsedFunction {
    pub record: FunctionRecord,
    pub demangled: Option<String>,
    pub blocks: Vec<ParsedBlock>,
    /// Types of parameters and instruction results, keyed by local name.
    pub value_types: HashMap<String, TypeRecord>,
}

#[derive(Debug, Clone)]
pub struct ParsedBlock {
    pub record: BlockRecord,
    pub instructions: Vec<InstructionRecord>,
}

/// Parse a module from raw bytes.
pub fn parse_module(bytes: &[u8]) -> Result<ParsedModule> {
    let text = std::str::from_utf8(bytes).map_err(|e| {
        let offset = e.valid_up_to();
        let (line, column) = line_col(&bytes[..offset]);
        ShimError::Parse {
            offset,
            line,
            column,
            message: "input is not valid UTF-8".to_string(),
        }
    })?;

    let mut pairs = LlParser::parse(Rule::module, text).map_err(from_pest)?;
    let root = pairs.next().ok_or_else(|| ShimError::Parse {
        offset: 0,
        line: 1,
        column: 1,
        message: "empty parse tree".to_string(),
    })?;

    let mut module = ParsedModule::default();
    for item in root.into_inner() {
        match item.as_rule() {
            Rule::source_filename => {
                let span = item.as_span();
                let lit = expect(&mut item.into_inner(), span, "file name")?;
                module.info.source_filename = Some(unquote(lit.as_str()));
            }
            Rule::target_decl => {
                let span = item.as_span();
                let mut inner = item.into_inner();
                let key = expect(&mut inner, span, "target key")?;
                let value = unquote(expect(&mut inner, span, "target value")?.as_str());
                match key.as_str() {
                    "triple" => module.info.target_triple = Some(value),
                    _ => module.info.data_layout = Some(value),
                }
            }
            Rule::type_def => module.named_types.push(parse_type_def(item)?),
            Rule::global_def => module.globals.push(parse_global(item)?),
            Rule::function_def => module.functions.push(parse_function(item, true)?),
            Rule::function_decl => module.functions.push(parse_function(item, false)?),
            _ => {}
        }
    }
    module.info.function_count = module.functions.len();
    module.info.global_count = module.globals.len();
    tracing::debug!(
        functions = module.info.function_count,
        globals = module.info.global_count,
        "parsed module"
    );
    Ok(module)
}

// ── Errors ───────────────────────────────────────────────────────────

fn from_pest(err: pest::error::Error<Rule>) -> ShimError {
    let offset = match err.location {
        InputLocation::Pos(p) => p,
        InputLocation::Span((start, _)) => start,
    };
    let (line, column) = match err.line_col {
        LineColLocation::Pos(lc) => lc,
        LineColLocation::Span(lc, _) => lc,
    };
    ShimError::Parse {
        offset,
        line,
        column,
        message: err.variant.message().into_owned(),
    }
}

fn error_at(span: Span<'_>, message: impl Into<String>) -> ShimError {
    let (line, column) = span.start_pos().line_col();
    ShimError::Parse {
        offset: span.start(),
        line,
        column,
        message: message.into(),
    }
}

fn line_col(prefix: &[u8]) -> (usize, usize) {
    let line = prefix.iter().filter(|&&b| b == b'\n').count() + 1;
    let column = prefix.iter().rev().take_while(|&&b| b != b'\n').count() + 1;
    (line, column)
}

fn expect<'i>(pairs: &mut Pairs<'i, Rule>, parent: Span<'i>, what: &str) -> Result<Pair<'i, Rule>> {
    pairs
        .next()
        .ok_or_else(|| error_at(parent, format!("expected {what}")))
}

// ── Lexical helpers ──────────────────────────────────────────────────

/// `%name`, `@"quoted name"` -> `name`, `quoted name`.
fn ident_name(raw: &str) -> String {
    let body = &raw[1..];
    unquote(body)
}

fn unquote(raw: &str) -> String {
    if raw.len() >= 2 && raw.starts_with('"') && raw.ends_with('"') {
        raw[1..raw.len() - 1].to_string()
    } else {
        raw.to_string()
    }
}

/// Decode LLVM string escapes: `\XX` hex pairs and `\\`.
pub(crate) fn unescape(body: &str) -> Vec<u8> {
    let bytes = body.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' {
            if bytes.get(i + 1) == Some(&b'\\') {
                out.push(b'\\');
                i += 2;
                continue;
            }
            if let (Some(hi), Some(lo)) = (
                bytes.get(i + 1).and_then(|b| (*b as char).to_digit(16)),
                bytes.get(i + 2).and_then(|b| (*b as char).to_digit(16)),
            ) {
                out.push((hi * 16 + lo) as u8);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    out
}

fn parse_u64(pair: &Pair<'_, Rule>) -> Result<u64> {
    pair.as_str()
        .parse::<u64>()
        .map_err(|_| error_at(pair.as_span(), format!("invalid count `{}`", pair.as_str())))
}

fn parse_align(pair: Pair<'_, Rule>) -> Result<u64> {
    let span = pair.as_span();
    let lit = expect(&mut pair.into_inner(), span, "alignment")?;
    parse_u64(&lit)
}

// ── Types ────────────────────────────────────────────────────────────

fn parse_type(pair: Pair<'_, Rule>) -> Result<TypeRecord> {
    let span = pair.as_span();
    let mut inner = pair.into_inner();
    let base = parse_base_type(expect(&mut inner, span, "type")?)?;
    // Legacy typed pointers (`i8*`) all collapse to the opaque pointer.
    if inner.next().is_some() {
        Ok(TypeRecord::Ptr)
    } else {
        Ok(base)
    }
}

fn parse_base_type(pair: Pair<'_, Rule>) -> Result<TypeRecord> {
    let span = pair.as_span();
    Ok(match pair.as_rule() {
        Rule::void_type => TypeRecord::Void,
        Rule::int_type => {
            let bits = pair.as_str()[1..]
                .parse::<u32>()
                .map_err(|_| error_at(span, "integer width out of range"))?;
            TypeRecord::Int(bits)
        }
        Rule::half_type => TypeRecord::Half,
        Rule::float_type => TypeRecord::Float,
        Rule::double_type => TypeRecord::Double,
        Rule::fp80_type => TypeRecord::X86Fp80,
        Rule::fp128_type => TypeRecord::Fp128,
        Rule::ptr_type => TypeRecord::Ptr,
        Rule::label_type => TypeRecord::Label,
        Rule::metadata_type => TypeRecord::Metadata,
        Rule::array_type | Rule::vector_type => {
            let vector = pair.as_rule() == Rule::vector_type;
            let mut inner = pair.into_inner();
            let len = parse_u64(&expect(&mut inner, span, "element count")?)?;
            let elem = Box::new(parse_type(expect(&mut inner, span, "element type")?)?);
            if vector {
                TypeRecord::Vector { len, elem }
            } else {
                TypeRecord::Array { len, elem }
            }
        }
        Rule::struct_type | Rule::packed_struct_type => {
            let packed = pair.as_rule() == Rule::packed_struct_type;
            let fields = pair
                .into_inner()
                .map(parse_type)
                .collect::<Result<Vec<_>>>()?;
            TypeRecord::Struct { fields, packed }
        }
        Rule::named_type => {
            let ident = expect(&mut pair.into_inner(), span, "type name")?;
            TypeRecord::Named(ident_name(ident.as_str()))
        }
        other => return Err(error_at(span, format!("unexpected {other:?} in type"))),
    })
}

fn parse_type_def(pair: Pair<'_, Rule>) -> Result<NamedTypeRecord> {
    let span = pair.as_span();
    let mut inner = pair.into_inner();
    let name = ident_name(expect(&mut inner, span, "type name")?.as_str());
    let body = expect(&mut inner, span, "type body")?;
    let body = match body.as_rule() {
        Rule::opaque_kw => None,
        _ => Some(parse_type(body)?),
    };
    Ok(NamedTypeRecord { name, body })
}

// ── Values ───────────────────────────────────────────────────────────

fn parse_value(pair: Pair<'_, Rule>) -> Result<ValueRecord> {
    let span = pair.as_span();
    let inner = expect(&mut pair.into_inner(), span, "value")?;
    Ok(match inner.as_rule() {
        Rule::local_ident => ValueRecord::Local(ident_name(inner.as_str())),
        Rule::global_ident => ValueRecord::Global(ident_name(inner.as_str())),
        _ => ValueRecord::Const(parse_constant(inner)?),
    })
}

fn parse_constant(pair: Pair<'_, Rule>) -> Result<ConstRecord> {
    let span = pair.as_span();
    let text = pair.as_str();
    Ok(match pair.as_rule() {
        Rule::bool_lit => ConstRecord::Bool(text == "true"),
        Rule::null_lit => ConstRecord::Null,
        Rule::undef_lit => ConstRecord::Undef,
        Rule::poison_lit => ConstRecord::Poison,
        Rule::zero_lit => ConstRecord::Zero,
        Rule::int_lit => ConstRecord::Int(
            text.parse::<i128>()
                .map_err(|_| error_at(span, format!("integer literal `{text}` out of range")))?,
        ),
        Rule::float_lit => {
            let value = match text.strip_prefix("0x") {
                Some(hex) => u64::from_str_radix(hex, 16)
                    .map(f64::from_bits)
                    .map_err(|_| error_at(span, format!("invalid hex float `{text}`")))?,
                None => text
                    .parse::<f64>()
                    .map_err(|_| error_at(span, format!("invalid float `{text}`")))?,
            };
            ConstRecord::Float(value)
        }
        Rule::c_string => ConstRecord::Bytes(unescape(&text[2..text.len() - 1])),
        Rule::array_const => ConstRecord::Array(
            pair.into_inner()
                .map(parse_typed_value)
                .collect::<Result<Vec<_>>>()?,
        ),
        Rule::struct_const => ConstRecord::Struct(
            pair.into_inner()
                .map(parse_typed_value)
                .collect::<Result<Vec<_>>>()?,
        ),
        other => return Err(error_at(span, format!("unexpected {other:?} in constant"))),
    })
}

fn parse_typed_value(pair: Pair<'_, Rule>) -> Result<OperandRecord> {
    let span = pair.as_span();
    let mut inner = pair.into_inner();
    let ty = parse_type(expect(&mut inner, span, "operand type")?)?;
    let value = parse_value(expect(&mut inner, span, "operand value")?)?;
    Ok(OperandRecord {
        ty: Some(ty),
        value,
    })
}

// ── Globals ──────────────────────────────────────────────────────────

fn parse_global(pair: Pair<'_, Rule>) -> Result<GlobalRecord> {
    let offset = pair.as_span().start();
    let mut name = String::new();
    let mut linkage = Vec::new();
    let mut is_constant = false;
    let mut ty = None;
    let mut initializer = None;
    let mut align = None;

    for part in pair.into_inner() {
        match part.as_rule() {
            Rule::global_ident => name = ident_name(part.as_str()),
            Rule::linkage_word => linkage.push(part.as_str().to_string()),
            Rule::global_kind => is_constant = part.as_str() == "constant",
            Rule::type_ => ty = Some(parse_type(part)?),
            Rule::global_init => {
                let span = part.as_span();
                initializer = Some(parse_value(expect(&mut part.into_inner(), span, "initializer")?)?);
            }
            Rule::global_suffix => {
                for clause in part.into_inner() {
                    if clause.as_rule() == Rule::align_clause {
                        align = Some(parse_align(clause)?);
                    }
                }
            }
            _ => {}
        }
    }

    Ok(GlobalRecord {
        name,
        ty: ty.unwrap_or(TypeRecord::Void),
        is_constant,
        initializer,
        linkage,
        align,
        offset,
    })
}

// ── Functions ────────────────────────────────────────────────────────

/// LLVM's implicit slot numbering: unnamed parameters, unlabeled blocks and
/// numbered results share one counter per function.
#[derive(Default)]
struct Numbering {
    next: u64,
}

impl Numbering {
    fn fresh(&mut self) -> String {
        let n = self.next;
        self.next += 1;
        n.to_string()
    }

    fn observe(&mut self, name: &str) {
        if let Ok(n) = name.parse::<u64>() {
            self.next = self.next.max(n + 1);
        }
    }
}

fn parse_function(pair: Pair<'_, Rule>, defined: bool) -> Result<ParsedFunction> {
    let offset = pair.as_span().start();
    let mut numbering = Numbering::default();
    let mut linkage = Vec::new();
    let mut return_type = TypeRecord::Void;
    let mut name = String::new();
    let mut params = Vec::new();
    let mut varargs = false;
    let mut personality = None;
    let mut blocks = Vec::new();
    let mut value_types = HashMap::new();

    for part in pair.into_inner() {
        match part.as_rule() {
            Rule::linkage_word => linkage.push(part.as_str().to_string()),
            Rule::type_ => return_type = parse_type(part)?,
            Rule::global_ident => name = ident_name(part.as_str()),
            Rule::param_list => {
                for param in part.into_inner() {
                    match param.as_rule() {
                        Rule::vararg => varargs = true,
                        Rule::param => {
                            let mut ty = TypeRecord::Void;
                            let mut param_name = None;
                            for piece in param.into_inner() {
                                match piece.as_rule() {
                                    Rule::type_ => ty = parse_type(piece)?,
                                    Rule::local_ident => param_name = Some(ident_name(piece.as_str())),
                                    _ => {}
                                }
                            }
                            let param_name = match param_name {
                                Some(n) => {
                                    numbering.observe(&n);
                                    n
                                }
                                None => numbering.fresh(),
                            };
                            value_types.insert(param_name.clone(), ty.clone());
                            params.push(ParamRecord {
                                ty,
                                name: param_name,
                            });
                        }
                        _ => {}
                    }
                }
            }
            Rule::fn_suffix => {
                for suffix in part.into_inner() {
                    if suffix.as_rule() == Rule::personality {
                        for piece in suffix.into_inner() {
                            if piece.as_rule() == Rule::value {
                                if let ValueRecord::Global(g) = parse_value(piece)? {
                                    personality = Some(g);
                                }
                            }
                        }
                    }
                }
            }
            Rule::block => blocks.push(parse_block(part, &mut numbering, &mut value_types)?),
            _ => {}
        }
    }

    let demangled = demangle(&name);
    Ok(ParsedFunction {
        record: FunctionRecord {
            name,
            return_type,
            params,
            varargs,
            is_declaration: !defined,
            linkage,
            personality,
            block_count: blocks.len(),
            offset,
        },
        demangled,
        blocks,
        value_types,
    })
}

fn parse_block(
    pair: Pair<'_, Rule>,
    numbering: &mut Numbering,
    value_types: &mut HashMap<String, TypeRecord>,
) -> Result<ParsedBlock> {
    let offset = pair.as_span().start();
    let mut label = None;
    let mut instructions = Vec::new();

    for part in pair.into_inner() {
        match part.as_rule() {
            Rule::block_label => {
                let span = part.as_span();
                let name = expect(&mut part.into_inner(), span, "label")?;
                let name = unquote(name.as_str());
                numbering.observe(&name);
                label = Some(name);
            }
            Rule::instruction => {
                // An unlabeled block takes its number before any result in it.
                if label.is_none() {
                    label = Some(numbering.fresh());
                }
                let inst = parse_instruction(part)?;
                if let Some(result) = &inst.result {
                    numbering.observe(result);
                    if let Some(ty) = &inst.result_type {
                        value_types.insert(result.clone(), ty.clone());
                    }
                }
                instructions.push(inst);
            }
            _ => {}
        }
    }

    let label = label.unwrap_or_else(|| numbering.fresh());
    Ok(ParsedBlock {
        record: BlockRecord {
            label,
            instruction_count: instructions.len(),
            offset,
        },
        instructions,
    })
}

// ── Instructions ─────────────────────────────────────────────────────

fn parse_instruction(pair: Pair<'_, Rule>) -> Result<InstructionRecord> {
    let span = pair.as_span();
    let text = pair.as_str();
    let mut result = None;
    let mut body = None;
    for part in pair.into_inner() {
        match part.as_rule() {
            Rule::local_ident => result = Some(ident_name(part.as_str())),
            Rule::inst_trailer => {}
            _ => body = Some(part),
        }
    }
    let body = body.ok_or_else(|| error_at(span, "expected instruction"))?;
    let mut inst = parse_body(body, text, span.start())?;
    inst.result = result;
    inst.result_type = result_type(&inst);
    Ok(inst)
}

fn apply_flag(inst: &mut InstructionRecord, flag: &str) {
    match flag {
        "nuw" => inst.flags.nuw = true,
        "nsw" => inst.flags.nsw = true,
        "exact" => inst.flags.exact = true,
        _ => {}
    }
}

fn parse_body(body: Pair<'_, Rule>, text: &str, offset: usize) -> Result<InstructionRecord> {
    let span = body.as_span();
    let rule = body.as_rule();
    let opcode = match rule {
        Rule::ret_inst => "ret",
        Rule::br_inst | Rule::cond_br_inst => "br",
        Rule::switch_inst => "switch",
        Rule::unreachable_inst => "unreachable",
        Rule::resume_inst => "resume",
        Rule::icmp_inst => "icmp",
        Rule::fcmp_inst => "fcmp",
        Rule::select_inst => "select",
        Rule::fneg_inst => "fneg",
        Rule::alloca_inst => "alloca",
        Rule::load_inst => "load",
        Rule::store_inst => "store",
        Rule::gep_inst => "getelementptr",
        Rule::phi_inst => "phi",
        Rule::call_inst => "call",
        Rule::invoke_inst => "invoke",
        Rule::landingpad_inst => "landingpad",
        // Binary ops, casts and generic lines name their opcode in a child.
        _ => "",
    };
    let mut inst = InstructionRecord::new(opcode, text, offset);

    match rule {
        Rule::ret_inst => {
            for part in body.into_inner() {
                match part.as_rule() {
                    Rule::void_kw => inst.ty = Some(TypeRecord::Void),
                    _ => {
                        let op = parse_typed_value(part)?;
                        inst.ty = op.ty.clone();
                        inst.operands.push(op);
                    }
                }
            }
        }
        Rule::br_inst => {
            for part in body.into_inner() {
                inst.labels.push(ident_name(part.as_str()));
            }
        }
        Rule::cond_br_inst => {
            let mut inner = body.into_inner();
            let ty = parse_type(expect(&mut inner, span, "condition type")?)?;
            let value = parse_value(expect(&mut inner, span, "condition")?)?;
            inst.operands.push(OperandRecord {
                ty: Some(ty),
                value,
            });
            for part in inner {
                inst.labels.push(ident_name(part.as_str()));
            }
        }
        Rule::switch_inst => {
            for part in body.into_inner() {
                match part.as_rule() {
                    Rule::typed_value => {
                        let op = parse_typed_value(part)?;
                        inst.ty = op.ty.clone();
                        inst.operands.push(op);
                    }
                    Rule::local_ident => inst.labels.push(ident_name(part.as_str())),
                    Rule::switch_case => {
                        let case_span = part.as_span();
                        let mut inner = part.into_inner();
                        let value = parse_typed_value(expect(&mut inner, case_span, "case value")?)?;
                        let target = ident_name(expect(&mut inner, case_span, "case label")?.as_str());
                        inst.cases.push((value, target));
                    }
                    _ => {}
                }
            }
        }
        Rule::unreachable_inst => {}
        Rule::resume_inst => {
            let op = parse_typed_value(expect(&mut body.into_inner(), span, "resumed value")?)?;
            inst.ty = op.ty.clone();
            inst.operands.push(op);
        }
        Rule::binary_inst | Rule::icmp_inst | Rule::fcmp_inst => {
            let mut ty = None;
            for part in body.into_inner() {
                match part.as_rule() {
                    Rule::binary_op => inst.opcode = part.as_str().to_string(),
                    Rule::inst_flag => apply_flag(&mut inst, part.as_str()),
                    Rule::icmp_pred | Rule::fcmp_pred => {
                        inst.predicate = Some(part.as_str().to_string())
                    }
                    Rule::type_ => ty = Some(parse_type(part)?),
                    Rule::value => inst.operands.push(OperandRecord {
                        ty: ty.clone(),
                        value: parse_value(part)?,
                    }),
                    _ => {}
                }
            }
            inst.ty = ty;
        }
        Rule::fneg_inst => {
            for part in body.into_inner() {
                match part.as_rule() {
                    Rule::inst_flag => apply_flag(&mut inst, part.as_str()),
                    Rule::typed_value => inst.operands.push(parse_typed_value(part)?),
                    _ => {}
                }
            }
            inst.ty = inst.operands.first().and_then(|op| op.ty.clone());
        }
        Rule::select_inst => {
            for part in body.into_inner() {
                if part.as_rule() == Rule::typed_value {
                    inst.operands.push(parse_typed_value(part)?);
                }
            }
            inst.ty = inst.operands.get(1).and_then(|op| op.ty.clone());
        }
        Rule::cast_inst => {
            for part in body.into_inner() {
                match part.as_rule() {
                    Rule::cast_op => inst.opcode = part.as_str().to_string(),
                    Rule::inst_flag => apply_flag(&mut inst, part.as_str()),
                    Rule::typed_value => inst.operands.push(parse_typed_value(part)?),
                    Rule::type_ => inst.ty = Some(parse_type(part)?),
                    _ => {}
                }
            }
        }
        Rule::alloca_inst | Rule::load_inst | Rule::store_inst | Rule::gep_inst => {
            for part in body.into_inner() {
                match part.as_rule() {
                    Rule::volatile_kw => inst.flags.volatile = true,
                    Rule::inbounds_kw => inst.flags.inbounds = true,
                    Rule::type_ => inst.ty = Some(parse_type(part)?),
                    Rule::typed_value => inst.operands.push(parse_typed_value(part)?),
                    Rule::align_clause => inst.align = Some(parse_align(part)?),
                    _ => {}
                }
            }
            if rule == Rule::store_inst {
                inst.ty = inst.operands.first().and_then(|op| op.ty.clone());
            }
        }
        Rule::phi_inst => {
            for part in body.into_inner() {
                match part.as_rule() {
                    Rule::type_ => inst.ty = Some(parse_type(part)?),
                    Rule::phi_incoming => {
                        let in_span = part.as_span();
                        let mut inner = part.into_inner();
                        let value = parse_value(expect(&mut inner, in_span, "incoming value")?)?;
                        let block = ident_name(expect(&mut inner, in_span, "incoming block")?.as_str());
                        inst.incoming.push((value, block));
                    }
                    _ => {}
                }
            }
        }
        Rule::call_inst | Rule::invoke_inst => parse_call(body, &mut inst)?,
        Rule::landingpad_inst => {
            for part in body.into_inner() {
                match part.as_rule() {
                    Rule::type_ => inst.ty = Some(parse_type(part)?),
                    Rule::cleanup_kw => inst.cleanup = true,
                    Rule::catch_clause => {
                        let clause_span = part.as_span();
                        let clause = expect(&mut part.into_inner(), clause_span, "clause value")?;
                        inst.clauses.push(parse_typed_value(clause)?);
                    }
                    _ => {}
                }
            }
        }
        Rule::generic_inst => {
            inst.raw = true;
            let word = expect(&mut body.into_inner(), span, "opcode")?;
            inst.opcode = word.as_str().to_string();
        }
        other => return Err(error_at(span, format!("unexpected {other:?} in block"))),
    }
    Ok(inst)
}

fn parse_call(body: Pair<'_, Rule>, inst: &mut InstructionRecord) -> Result<()> {
    for part in body.into_inner() {
        match part.as_rule() {
            Rule::tail_kw => inst.flags.tail = true,
            Rule::type_ => inst.ty = Some(parse_type(part)?),
            Rule::fn_sig => {
                let mut params = Vec::new();
                let mut varargs = false;
                for piece in part.into_inner() {
                    match piece.as_rule() {
                        Rule::vararg => varargs = true,
                        _ => params.push(parse_type(piece)?),
                    }
                }
                inst.callee_type = Some(TypeRecord::Function {
                    ret: Box::new(inst.ty.clone().unwrap_or(TypeRecord::Void)),
                    params,
                    varargs,
                });
            }
            Rule::value => inst.operands.push(OperandRecord {
                ty: Some(TypeRecord::Ptr),
                value: parse_value(part)?,
            }),
            Rule::call_args => {
                for arg in part.into_inner() {
                    inst.operands.push(parse_call_arg(arg)?);
                }
            }
            Rule::local_ident => inst.labels.push(ident_name(part.as_str())),
            _ => {}
        }
    }
    Ok(())
}

fn parse_call_arg(arg: Pair<'_, Rule>) -> Result<OperandRecord> {
    let mut ty = None;
    let mut value = None;
    for piece in arg.into_inner() {
        match piece.as_rule() {
            Rule::metadata_arg => {
                return Ok(OperandRecord {
                    ty: Some(TypeRecord::Metadata),
                    value: ValueRecord::Metadata(piece.as_str().to_string()),
                })
            }
            Rule::type_ => ty = Some(parse_type(piece)?),
            Rule::value => value = Some(parse_value(piece)?),
            _ => {}
        }
    }
    Ok(OperandRecord {
        ty,
        value: value.unwrap_or(ValueRecord::Const(ConstRecord::Undef)),
    })
}

/// Type of the value an instruction defines, `None` when it defines nothing.
fn result_type(inst: &InstructionRecord) -> Option<TypeRecord> {
    inst.result.as_ref()?;
    let ty = match inst.opcode.as_str() {
        "icmp" | "fcmp" => match &inst.ty {
            Some(TypeRecord::Vector { len, .. }) => TypeRecord::Vector {
                len: *len,
                elem: Box::new(TypeRecord::Int(1)),
            },
            _ => TypeRecord::Int(1),
        },
        "alloca" | "getelementptr" => TypeRecord::Ptr,
        _ if inst.raw => return None,
        _ => inst.ty.clone()?,
    };
    match ty {
        TypeRecord::Void => None,
        ty => Some(ty),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SAMPLE: &str = r#"
; ModuleID = 'sample.c'
source_filename = "sample.c"
target datalayout = "e-m:e-i64:64"
target triple = "x86_64-unknown-linux-gnu"

%struct.Pair = type { i32, i64 }
%struct.Handle = type opaque

@.str = private unnamed_addr constant [6 x i8] c"hello\00", align 1
@counter = dso_local global i32 7, align 4

define dso_local i32 @add_one(i32 noundef %x) #0 {
entry:
  %sum = add nsw i32 %x, 1
  ret i32 %sum
}

declare i32 @checked_div(i32, i32)

attributes #0 = { noinline nounwind }
!llvm.ident = !{!0}
!0 = !{!"clang"}
"#;

    #[test]
    fn parses_top_level_items() {
        let module = parse_module(SAMPLE.as_bytes()).unwrap();
        assert_eq!(module.info.source_filename.as_deref(), Some("sample.c"));
        assert_eq!(
            module.info.target_triple.as_deref(),
            Some("x86_64-unknown-linux-gnu")
        );
        assert_eq!(module.named_types.len(), 2);
        assert_eq!(module.named_types[1].body, None);
        assert_eq!(module.globals.len(), 2);
        assert_eq!(module.functions.len(), 2);

        let s = &module.globals[0];
        assert!(s.is_constant);
        assert_eq!(s.align, Some(1));
        assert_eq!(
            s.initializer,
            Some(ValueRecord::Const(ConstRecord::Bytes(b"hello\0".to_vec())))
        );
    }

    #[test]
    fn parses_function_body_and_flags() {
        let module = parse_module(SAMPLE.as_bytes()).unwrap();
        let f = &module.functions[0];
        assert_eq!(f.record.name, "add_one");
        assert!(!f.record.is_declaration);
        assert_eq!(f.blocks.len(), 1);
        assert_eq!(f.blocks[0].record.label, "entry");

        let add = &f.blocks[0].instructions[0];
        assert_eq!(add.opcode, "add");
        assert!(add.flags.nsw);
        assert!(!add.flags.nuw);
        assert_eq!(add.result.as_deref(), Some("sum"));
        assert_eq!(add.result_type, Some(TypeRecord::Int(32)));
        assert_eq!(f.value_types.get("x"), Some(&TypeRecord::Int(32)));

        let decl = &module.functions[1];
        assert!(decl.record.is_declaration);
        assert_eq!(decl.record.params.len(), 2);
    }

    #[test]
    fn implicit_numbering_covers_params_and_blocks() {
        let src = r#"
define i32 @f(i32 %0) {
  %2 = add i32 %0, 1
  br label %3
3:
  ret i32 %2
}
"#;
        let module = parse_module(src.as_bytes()).unwrap();
        let f = &module.functions[0];
        let labels: Vec<_> = f.blocks.iter().map(|b| b.record.label.as_str()).collect();
        assert_eq!(labels, vec!["1", "3"]);
        assert_eq!(f.blocks[0].instructions[1].labels, vec!["3".to_string()]);
    }

    #[test]
    fn call_invoke_and_landingpad_shapes() {
        let src = r#"
define i32 @g(i32 %a) personality ptr @__gxx_personality_v0 {
entry:
  %r = invoke i32 @checked_div(i32 %a, i32 0) to label %ok unwind label %lpad
ok:
  ret i32 %r
lpad:
  %lp = landingpad { ptr, i32 } cleanup catch ptr null
  resume { ptr, i32 } %lp
}
"#;
        let module = parse_module(src.as_bytes()).unwrap();
        let f = &module.functions[0];
        assert_eq!(f.record.personality.as_deref(), Some("__gxx_personality_v0"));
        let invoke = &f.blocks[0].instructions[0];
        assert_eq!(invoke.opcode, "invoke");
        assert_eq!(invoke.operands.len(), 3);
        assert_eq!(
            invoke.operands[0].value,
            ValueRecord::Global("checked_div".into())
        );
        assert_eq!(invoke.labels, vec!["ok".to_string(), "lpad".to_string()]);

        let lp = &f.blocks[2].instructions[0];
        assert!(lp.cleanup);
        assert_eq!(lp.clauses.len(), 1);
    }

    #[test]
    fn fneg_is_parsed_structurally() {
        let src = "define double @neg(double %0) {\n  %2 = fneg nnan double %0\n  ret double %2\n}\n";
        let module = parse_module(src.as_bytes()).unwrap();
        let neg = &module.functions[0].blocks[0].instructions[0];
        assert!(!neg.raw);
        assert_eq!(neg.opcode, "fneg");
        assert_eq!(neg.ty, Some(TypeRecord::Double));
        assert_eq!(neg.operands.len(), 1);
        assert_eq!(neg.operands[0].value, ValueRecord::Local("0".into()));
        assert_eq!(neg.result_type, Some(TypeRecord::Double));
    }

    #[test]
    fn unknown_opcode_is_kept_as_raw_line() {
        let src = "define void @h(ptr %p) {\n  fence seq_cst\n  ret void\n}\n";
        let module = parse_module(src.as_bytes()).unwrap();
        let fence = &module.functions[0].blocks[0].instructions[0];
        assert!(fence.raw);
        assert_eq!(fence.opcode, "fence");
    }

    #[test]
    fn parse_error_reports_position() {
        let src = "define i32 @f() {\n  ret i32 0\n";
        match parse_module(src.as_bytes()) {
            Err(ShimError::Parse { line, offset, .. }) => {
                assert!(line >= 2);
                assert!(offset > 0);
            }
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[test]
    fn invalid_utf8_reports_first_bad_byte() {
        let mut bytes = b"define void @f() {\n  ret void\n}\n".to_vec();
        bytes.insert(5, 0xff);
        match parse_module(&bytes) {
            Err(ShimError::Parse { offset, line, .. }) => {
                assert_eq!(offset, 5);
                assert_eq!(line, 1);
            }
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[test]
    fn unescape_decodes_hex_pairs() {
        assert_eq!(unescape(r"a\0Ab\\c\00"), b"a\nb\\c\0".to_vec());
    }
}
