//! Output emitter: Rust source text for translated functions and modules.
//!
//! Every function is preceded by a marker line
//! `// irbridge: fn <source name> blocks=<n>` so an emitted artifact can be
//! summarized again by [`inspect`].

use crate::codegen::function::TargetFunction;
use crate::codegen::module::ModuleTranslation;
use crate::error::TranslateError;

const MARKER: &str = "// irbridge: fn ";

/// Suppress warnings for generated code patterns that are hard to avoid.
const ALLOWS: &str = "#[allow(unused_mut, unused_variables, unused_assignments, unused_parens, unreachable_code, unreachable_patterns, clippy::needless_return, clippy::never_loop, clippy::unnecessary_cast, clippy::bool_comparison, clippy::nonminimal_bool, clippy::identity_op, clippy::match_single_binding, clippy::let_and_return)]\n";

fn push_indented(out: &mut String, text: &str, depth: usize) {
    let pad = "    ".repeat(depth);
    for line in text.lines() {
        out.push_str(&pad);
        out.push_str(line);
        out.push('\n');
    }
}

fn marker(func: &TargetFunction) -> String {
    format!("{MARKER}{} blocks={}\n", func.source_name, func.blocks.len())
}

fn param_list(func: &TargetFunction, mutable: bool) -> String {
    let prefix = if mutable { "mut " } else { "" };
    std::iter::once("ctx: &mut Context".to_string())
        .chain(func.params.iter().map(|(name, ty)| format!("{prefix}{name}: {ty}")))
        .collect::<Vec<_>>()
        .join(", ")
}

fn body(func: &TargetFunction, out: &mut String) {
    for local in &func.locals {
        out.push_str(&format!("    let mut {}: {} = {};\n", local.name, local.ty, local.init));
    }

    if func.flat {
        // Single-block optimization: emit flat body without loop/match
        for stmt in func.blocks.iter().flatten() {
            push_indented(out, stmt, 1);
        }
        return;
    }

    // Multi-block: state machine with per-function Block enum
    let variants: Vec<String> = (0..func.blocks.len()).map(|i| format!("B{i}")).collect();
    out.push_str("    #[derive(Clone, Copy)]\n    #[allow(dead_code)]\n");
    out.push_str(&format!("    enum Block {{ {} }}\n", variants.join(", ")));
    out.push_str("    let mut __current_block = Block::B0;\n");
    out.push_str("    loop {\n");
    out.push_str("        match __current_block {\n");
    for (idx, stmts) in func.blocks.iter().enumerate() {
        out.push_str(&format!("            Block::B{idx} => {{\n"));
        for stmt in stmts {
            push_indented(out, stmt, 4);
        }
        out.push_str("            }\n");
    }
    out.push_str("        }\n");
    out.push_str("    }\n");
}

/// Serialize one function. Fails with `EmissionLimitExceeded` when it has
/// more than `limit` statements.
pub fn emit(func: &TargetFunction, limit: usize) -> Result<String, TranslateError> {
    let statements = func.statement_count();
    if statements > limit {
        return Err(TranslateError::EmissionLimitExceeded {
            function: func.source_name.clone(),
            statements,
            limit,
        });
    }

    let mut out = marker(func);
    let sig_ret = format!("Outcome<{}>", func.ret);
    if func.uses_frame {
        // Stack allocations are released on every exit path, `?` included.
        let inner = format!("__{}_body", func.name);
        let args: Vec<&str> = std::iter::once("ctx")
            .chain(func.params.iter().map(|(n, _)| n.as_str()))
            .collect();
        out.push_str(&format!("pub fn {}({}) -> {sig_ret} {{\n", func.name, param_list(func, false)));
        out.push_str("    let __frame = ctx.memory.enter_frame();\n");
        out.push_str(&format!("    let __result = {inner}({});\n", args.join(", ")));
        out.push_str("    ctx.memory.leave_frame(__frame);\n");
        out.push_str("    __result\n");
        out.push_str("}\n\n");
        out.push_str(ALLOWS);
        out.push_str(&format!("fn {inner}({}) -> {sig_ret} {{\n", param_list(func, true)));
    } else {
        out.push_str(ALLOWS);
        out.push_str(&format!("pub fn {}({}) -> {sig_ret} {{\n", func.name, param_list(func, true)));
    }
    body(func, &mut out);
    out.push_str("}\n");
    Ok(out)
}

/// Replacement for a function that could not be emitted: same signature,
/// always traps with `Trap::Untranslated`.
pub fn emit_stub(func: &TargetFunction) -> String {
    let mut out = marker(func);
    out.push_str("#[allow(unused_variables)]\n");
    out.push_str(&format!(
        "pub fn {}({}) -> Outcome<{}> {{\n    Err(Trap::Untranslated.into())\n}}\n",
        func.name,
        param_list(func, false),
        func.ret
    ));
    out
}

/// Serialize a translated module: preamble, global addresses, the
/// `new_context` constructor and every function.
pub fn emit_module(translation: &ModuleTranslation) -> String {
    let mut out = String::new();
    match &translation.source_filename {
        Some(source) => out.push_str(&format!("// Generated by irbridge from {source}. Do not edit.\n")),
        None => out.push_str("// Generated by irbridge. Do not edit.\n"),
    }
    out.push_str("use irbridge_runtime::*;\n\n");

    for entry in &translation.globals.entries {
        out.push_str(&format!("pub const {}: u64 = {};\n", entry.const_name, entry.address));
    }
    if !translation.globals.entries.is_empty() {
        out.push('\n');
    }

    out.push_str("static GLOBAL_IMAGE: &[u8] = &[");
    for (i, chunk) in translation.globals.image.chunks(16).enumerate() {
        out.push_str(if i == 0 { "\n    " } else { "    " });
        let bytes: Vec<String> = chunk.iter().map(|b| b.to_string()).collect();
        out.push_str(&bytes.join(", "));
        out.push_str(",\n");
    }
    out.push_str("];\n\n");

    out.push_str("/// Execution context with this module's globals installed.\n");
    out.push_str("pub fn new_context() -> Context {\n");
    out.push_str("    Context::new(Memory::with_globals(GLOBAL_IMAGE))\n");
    out.push_str("}\n");

    for func in &translation.functions {
        out.push('\n');
        out.push_str(&func.code);
    }
    out
}

/// Function names and block counts recovered from an emitted artifact.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArtifactSummary {
    pub functions: Vec<(String, usize)>,
}

impl ArtifactSummary {
    pub fn block_count(&self) -> usize {
        self.functions.iter().map(|(_, n)| n).sum()
    }
}

pub fn inspect(source: &str) -> ArtifactSummary {
    let functions = source
        .lines()
        .filter_map(|line| line.strip_prefix(MARKER))
        .filter_map(|rest| {
            let (name, blocks) = rest.rsplit_once(" blocks=")?;
            Some((name.to_string(), blocks.trim().parse().ok()?))
        })
        .collect();
    ArtifactSummary { functions }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::function::Local;
    use pretty_assertions::assert_eq;

    fn add_function() -> TargetFunction {
        TargetFunction {
            name: "add".to_string(),
            source_name: "add".to_string(),
            params: vec![("v0".to_string(), "i32".to_string()), ("v1".to_string(), "i32".to_string())],
            ret: "i32".to_string(),
            locals: vec![Local {
                name: "v2".to_string(),
                ty: "i32".to_string(),
                init: "0i32".to_string(),
            }],
            blocks: vec![vec!["v2 = v0.wrapping_add(v1);".to_string(), "return Ok(v2);".to_string()]],
            flat: true,
            uses_frame: false,
        }
    }

    #[test]
    fn flat_function() {
        let code = emit(&add_function(), 100).unwrap();
        let expected = format!(
            "// irbridge: fn add blocks=1\n{ALLOWS}pub fn add(ctx: &mut Context, mut v0: i32, mut v1: i32) -> Outcome<i32> {{\n    let mut v2: i32 = 0i32;\n    v2 = v0.wrapping_add(v1);\n    return Ok(v2);\n}}\n"
        );
        assert_eq!(code, expected);
    }

    #[test]
    fn frame_wrapper_releases_the_stack() {
        let mut f = add_function();
        f.uses_frame = true;
        let code = emit(&f, 100).unwrap();
        assert!(code.contains("pub fn add(ctx: &mut Context, v0: i32, v1: i32) -> Outcome<i32> {\n    let __frame = ctx.memory.enter_frame();\n    let __result = __add_body(ctx, v0, v1);\n    ctx.memory.leave_frame(__frame);\n    __result\n}"));
        assert!(code.contains("fn __add_body(ctx: &mut Context, mut v0: i32, mut v1: i32)"));
    }

    #[test]
    fn state_machine_for_multiple_blocks() {
        let mut f = add_function();
        f.flat = false;
        f.blocks = vec![
            vec!["__current_block = Block::B1;".to_string(), "continue;".to_string()],
            vec!["return Ok(v0);".to_string()],
        ];
        let code = emit(&f, 100).unwrap();
        assert!(code.contains("    enum Block { B0, B1 }\n"));
        assert!(code.contains("            Block::B1 => {\n                return Ok(v0);\n            }\n"));
    }

    #[test]
    fn statement_limit() {
        match emit(&add_function(), 2) {
            Err(TranslateError::EmissionLimitExceeded { statements, limit, .. }) => {
                assert_eq!((statements, limit), (3, 2));
            }
            other => panic!("expected EmissionLimitExceeded, got {other:?}"),
        }
        let stub = emit_stub(&add_function());
        assert!(stub.contains("Err(Trap::Untranslated.into())"));
    }

    #[test]
    fn inspect_reads_markers() {
        let mut f = add_function();
        f.source_name = "with space".to_string();
        let text = format!("{}\n{}", emit(&add_function(), 100).unwrap(), emit_stub(&f));
        let summary = inspect(&text);
        assert_eq!(summary.functions, vec![("add".to_string(), 1), ("with space".to_string(), 1)]);
        assert_eq!(summary.block_count(), 2);
    }
}
