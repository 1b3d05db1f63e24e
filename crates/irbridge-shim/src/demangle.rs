//! Itanium C++ symbol demangling.

use cpp_demangle::Symbol;

/// Demangle an Itanium-mangled symbol.
///
/// Returns `None` when the name is not mangled or the demangled form is
/// identical to the raw name.
pub fn demangle(raw: &str) -> Option<String> {
    if !raw.starts_with("_Z") {
        return None;
    }
    let symbol = Symbol::new(raw.as_bytes()).ok()?;
    let text = symbol.to_string();
    (text != raw).then_some(text)
}
