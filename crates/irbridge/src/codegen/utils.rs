//! Rust identifiers for IR symbols.

use std::collections::HashSet;

use heck::{ToShoutySnakeCase, ToSnakeCase};

use crate::ir::{Function, Global};

const KEYWORDS: &[&str] = &[
    "abstract", "as", "async", "await", "become", "box", "break", "const", "continue", "crate", "do",
    "dyn", "else", "enum", "extern", "false", "final", "fn", "for", "gen", "if", "impl", "in", "let",
    "loop", "macro", "match", "mod", "move", "mut", "override", "priv", "pub", "ref", "return", "self",
    "static", "struct", "super", "trait", "true", "try", "type", "typeof", "union", "unsafe", "unsized",
    "use", "virtual", "where", "while", "yield",
];

/// Names the generated module defines itself or threads through every function.
const RESERVED: &[&str] = &["new_context", "ctx"];

/// Hands out unique identifiers in one namespace.
#[derive(Debug, Default)]
pub struct NameAllocator {
    used: HashSet<String>,
}

impl NameAllocator {
    pub fn for_functions() -> Self {
        Self {
            used: RESERVED.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn allocate(&mut self, base: String) -> String {
        if self.used.insert(base.clone()) {
            return base;
        }
        let mut n = 2;
        loop {
            let candidate = format!("{base}_{n}");
            if self.used.insert(candidate.clone()) {
                return candidate;
            }
            n += 1;
        }
    }
}

fn sanitize(raw: &str) -> String {
    raw.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

/// Snake-case identifier for a function. Prefers the demangled name with
/// the parameter list cut off and `::` flattened.
pub fn function_ident(func: &Function) -> String {
    let source = func.demangled.as_deref().unwrap_or(&func.name);
    let base = source.split('(').next().unwrap_or(source).replace("::", "_");
    let mut ident = sanitize(&base).to_snake_case();
    if ident.is_empty() {
        ident = format!("func_{}", func.id.0);
    }
    if ident.starts_with(|c: char| c.is_ascii_digit()) {
        ident = format!("f_{ident}");
    }
    if KEYWORDS.contains(&ident.as_str()) {
        ident.push('_');
    }
    ident
}

/// `GLOBAL_<SHOUTY_NAME>` constant holding a global's address.
pub fn global_ident(global: &Global) -> String {
    let shouty = sanitize(&global.name).to_shouty_snake_case();
    if shouty.is_empty() {
        format!("GLOBAL_{}", global.id.0)
    } else {
        format!("GLOBAL_{shouty}")
    }
}
