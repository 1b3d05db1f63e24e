//! Module-level translation.
//!
//! Lays out globals, assigns a Rust identifier to every function and
//! translates the defined functions, on the rayon pool when
//! [`TranspileOptions::parallel`] is set. Output order always follows the
//! source module.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rayon::prelude::*;
use tracing::{info, warn};

use crate::backend::SafeBackend;
use crate::codegen::emit::{emit, emit_stub};
use crate::codegen::function::{FunctionTranslator, ModuleContext};
use crate::codegen::globals::GlobalLayout;
use crate::codegen::utils::{function_ident, global_ident, NameAllocator};
use crate::config::TranspileOptions;
use crate::error::TranslateError;
use crate::intrinsics::IntrinsicRegistry;
use crate::ir::{Function, Module};
use crate::mapper::TypeMapper;

/// Cooperative cancellation flag, checked before each function.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmittedFunction {
    pub name: String,
    pub source_name: String,
    pub blocks: usize,
    pub code: String,
}

/// A function replaced by an untranslated stub.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedFunction {
    pub name: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModuleTranslation {
    pub source_filename: Option<String>,
    pub globals: GlobalLayout,
    pub functions: Vec<EmittedFunction>,
    pub skipped: Vec<SkippedFunction>,
}

enum FunctionOutcome {
    Emitted(EmittedFunction),
    Skipped(EmittedFunction, SkippedFunction),
}

pub struct ModuleTranslator<'o> {
    options: &'o TranspileOptions,
    cancel: CancellationToken,
}

impl<'o> ModuleTranslator<'o> {
    pub fn new(options: &'o TranspileOptions, cancel: CancellationToken) -> Self {
        Self { options, cancel }
    }

    pub fn translate(&self, module: &Module) -> Result<ModuleTranslation, TranslateError> {
        let profile = &self.options.profile;
        let mapper = TypeMapper::new(profile);

        let mut global_names = NameAllocator::default();
        let global_idents: Vec<String> = module
            .globals
            .iter()
            .map(|g| global_names.allocate(global_ident(g)))
            .collect();
        let globals = GlobalLayout::build(module, &mapper, |id| {
            global_idents
                .get(id.index())
                .cloned()
                .unwrap_or_else(|| format!("GLOBAL_{}", id.0))
        })?;

        // Defined functions get the first pick of identifiers.
        let mut function_names = NameAllocator::for_functions();
        let mut names = vec![String::new(); module.functions.len()];
        let (defined, declared): (Vec<&Function>, Vec<&Function>) =
            module.functions.iter().partition(|f| !f.is_declaration);
        for func in defined.iter().chain(&declared) {
            if let Some(slot) = names.get_mut(func.id.index()) {
                *slot = function_names.allocate(function_ident(func));
            }
        }

        let backend = SafeBackend::new();
        let cx = ModuleContext {
            module,
            mapper: &mapper,
            registry: IntrinsicRegistry::standard(),
            profile,
            backend: &backend,
            globals: &globals,
            names: &names,
        };
        let translator = FunctionTranslator::new(&cx);

        let run = |func: &&Function| -> Result<FunctionOutcome, TranslateError> {
            if self.cancel.is_cancelled() {
                return Err(TranslateError::Cancelled);
            }
            let target = translator.translate(func)?;
            let blocks = target.blocks.len();
            match emit(&target, profile.max_statements) {
                Ok(code) => Ok(FunctionOutcome::Emitted(EmittedFunction {
                    name: target.name.clone(),
                    source_name: target.source_name.clone(),
                    blocks,
                    code,
                })),
                Err(err) if err.is_recoverable() => {
                    warn!(function = %func.name, error = %err, "replacing function with an untranslated stub");
                    Ok(FunctionOutcome::Skipped(
                        EmittedFunction {
                            name: target.name.clone(),
                            source_name: target.source_name.clone(),
                            blocks,
                            code: emit_stub(&target),
                        },
                        SkippedFunction {
                            name: target.source_name.clone(),
                            reason: err.to_string(),
                        },
                    ))
                }
                Err(err) => Err(err),
            }
        };

        let outcomes: Vec<FunctionOutcome> = if self.options.parallel {
            defined.par_iter().map(run).collect::<Result<_, _>>()?
        } else {
            defined.iter().map(run).collect::<Result<_, _>>()?
        };

        let mut translation = ModuleTranslation {
            source_filename: module.source_filename.clone(),
            globals,
            functions: Vec::with_capacity(outcomes.len()),
            skipped: Vec::new(),
        };
        for outcome in outcomes {
            match outcome {
                FunctionOutcome::Emitted(f) => translation.functions.push(f),
                FunctionOutcome::Skipped(f, skipped) => {
                    translation.functions.push(f);
                    translation.skipped.push(skipped);
                }
            }
        }

        info!(
            functions = translation.functions.len(),
            skipped = translation.skipped.len(),
            globals = translation.globals.entries.len(),
            types = mapper.len(),
            "translated module"
        );
        Ok(translation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::*;

    fn ret_const(id: u32, name: &str, value: i128) -> Function {
        Function {
            id: FuncId(id),
            name: name.to_string(),
            demangled: None,
            params: Vec::new(),
            ret: IrType::Int(32),
            varargs: false,
            is_declaration: false,
            values: Vec::new(),
            blocks: vec![Block {
                id: BlockId(0),
                label: "entry".to_string(),
                instructions: Vec::new(),
                terminator: Terminator::Ret(Some((IrType::Int(32), Operand::Const(Constant::Int(value))))),
            }],
        }
    }

    fn module(functions: Vec<Function>) -> Module {
        Module {
            source_filename: Some("test.c".to_string()),
            functions,
            globals: vec![Global {
                id: GlobalId(0),
                name: "counter".to_string(),
                ty: IrType::Int(32),
                is_constant: false,
                initializer: Some(Constant::Int(3)),
                align: Some(4),
            }],
        }
    }

    #[test]
    fn order_is_preserved_in_parallel() {
        let functions = (0..32).map(|i| ret_const(i, &format!("f{i}"), i as i128)).collect();
        let m = module(functions);
        for parallel in [true, false] {
            let options = TranspileOptions {
                parallel,
                ..TranspileOptions::default()
            };
            let out = ModuleTranslator::new(&options, CancellationToken::new()).translate(&m).unwrap();
            let names: Vec<&str> = out.functions.iter().map(|f| f.source_name.as_str()).collect();
            let expected: Vec<String> = (0..32).map(|i| format!("f{i}")).collect();
            assert_eq!(names, expected);
            assert_eq!(out.globals.const_name(GlobalId(0)), Some("GLOBAL_COUNTER"));
        }
    }

    #[test]
    fn emission_limit_produces_a_stub() {
        let mut options = TranspileOptions::default();
        options.profile.max_statements = 0;
        let out = ModuleTranslator::new(&options, CancellationToken::new())
            .translate(&module(vec![ret_const(0, "big", 1)]))
            .unwrap();
        assert_eq!(out.skipped.len(), 1);
        assert_eq!(out.skipped[0].name, "big");
        assert!(out.functions[0].code.contains("Trap::Untranslated"));
    }

    #[test]
    fn cancelled_token_stops_translation() {
        let token = CancellationToken::new();
        token.cancel();
        let options = TranspileOptions::default();
        let err = ModuleTranslator::new(&options, token)
            .translate(&module(vec![ret_const(0, "f", 1)]))
            .unwrap_err();
        assert!(matches!(err, TranslateError::Cancelled));
    }

    #[test]
    fn colliding_identifiers_are_renamed() {
        let out = ModuleTranslator::new(&TranspileOptions::default(), CancellationToken::new())
            .translate(&module(vec![ret_const(0, "fooBar", 1), ret_const(1, "foo_bar", 2)]))
            .unwrap();
        let names: Vec<&str> = out.functions.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["foo_bar", "foo_bar_2"]);
    }
}
