//! Exception-emulation rewriter.
//!
//! A call to a may-throw intrinsic returns `Emulated<T>`. The call site is
//! rewritten into the call, the extraction of the primary value, and an
//! explicit status check. A pending status either leaves the function as
//! `Err(Fault::Exception(..))` or, under an `invoke`, is stored in the
//! function's exception slot before control moves to the unwind block.

use crate::intrinsics::IntrinsicSpec;

/// Where a pending exception goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Handler {
    /// No handler in the function: the function itself fails this way.
    Propagate,
    /// Statements for each edge of an `invoke` (phi copies and block switch).
    Invoke {
        normal: Vec<String>,
        unwind: Vec<String>,
    },
}

/// One rewritten call site.
#[derive(Debug, Clone)]
pub struct ThrowingCall<'a> {
    pub spec: &'a IntrinsicSpec,
    pub path: String,
    /// Rendered Rust arguments.
    pub args: Vec<String>,
    /// Constant integer value of each argument, when known.
    pub constants: Vec<Option<i128>>,
    /// Integer width of the overload, for the elision predicate. `None`
    /// for entries without an overload, which are never elided.
    pub bits: Option<u32>,
    pub dest: Option<String>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ExceptionRewriter {
    elide_proven_checks: bool,
}

fn indent(lines: &[String]) -> String {
    lines
        .iter()
        .flat_map(|s| s.lines())
        .map(|l| format!("    {l}\n"))
        .collect()
}

impl ExceptionRewriter {
    pub fn new(elide_proven_checks: bool) -> Self {
        Self { elide_proven_checks }
    }

    /// Whether the status check at this call site may be dropped.
    pub fn can_elide(&self, call: &ThrowingCall<'_>) -> bool {
        let (Some(proof), Some(bits)) = (call.spec.never_throws, call.bits) else {
            return false;
        };
        self.elide_proven_checks && proof(&call.constants, bits)
    }

    pub fn rewrite(&self, call: &ThrowingCall<'_>, handler: Handler) -> Vec<String> {
        let mut out = vec![format!("let __r = {}({});", call.path, call.args.join(", "))];
        let take_value = call.dest.as_ref().map(|d| format!("{d} = __r.value;"));

        if self.can_elide(call) {
            out.extend(take_value);
            if let Handler::Invoke { normal, .. } = handler {
                out.extend(normal);
            }
            return out;
        }

        match handler {
            Handler::Propagate => {
                out.extend(take_value);
                out.push(
                    "if let Status::Pending(__e) = __r.status {\n    return Err(Fault::Exception(__e));\n}"
                        .to_string(),
                );
            }
            Handler::Invoke { normal, unwind } => {
                let mut on_unwind = vec!["__exception = Some(__e);".to_string()];
                on_unwind.extend(unwind);
                let on_normal: Vec<String> = take_value.into_iter().chain(normal).collect();
                out.push(format!(
                    "if let Status::Pending(__e) = __r.status {{\n{}}} else {{\n{}}}",
                    indent(&on_unwind),
                    indent(&on_normal)
                ));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intrinsics::IntrinsicRegistry;

    fn checked_div(constants: Vec<Option<i128>>) -> ThrowingCall<'static> {
        ThrowingCall {
            spec: IntrinsicRegistry::standard().lookup("checked_div").unwrap(),
            path: "irbridge_runtime::intrinsics::i32::checked_div".to_string(),
            args: vec!["v0".to_string(), "2i32".to_string()],
            constants,
            bits: Some(32),
            dest: Some("v1".to_string()),
        }
    }

    #[test]
    fn propagating_check_returns_the_exception() {
        let out = ExceptionRewriter::new(false).rewrite(&checked_div(vec![None, Some(2)]), Handler::Propagate);
        assert_eq!(
            out,
            vec![
                "let __r = irbridge_runtime::intrinsics::i32::checked_div(v0, 2i32);".to_string(),
                "v1 = __r.value;".to_string(),
                "if let Status::Pending(__e) = __r.status {\n    return Err(Fault::Exception(__e));\n}".to_string(),
            ]
        );
    }

    #[test]
    fn invoke_check_stores_the_slot_and_unwinds() {
        let handler = Handler::Invoke {
            normal: vec!["__current_block = Block::B1;".to_string()],
            unwind: vec!["__current_block = Block::B2;".to_string()],
        };
        let out = ExceptionRewriter::new(false).rewrite(&checked_div(vec![None, None]), handler);
        assert_eq!(out.len(), 2);
        assert_eq!(
            out[1],
            "if let Status::Pending(__e) = __r.status {\n    __exception = Some(__e);\n    __current_block = Block::B2;\n} else {\n    v1 = __r.value;\n    __current_block = Block::B1;\n}"
        );
    }

    #[test]
    fn proven_call_sites_drop_the_check_only_when_enabled() {
        let proven = checked_div(vec![None, Some(2)]);
        assert!(!ExceptionRewriter::new(false).can_elide(&proven));
        assert!(ExceptionRewriter::new(true).can_elide(&proven));
        let out = ExceptionRewriter::new(true).rewrite(&proven, Handler::Propagate);
        assert_eq!(out.len(), 2);
        assert_eq!(out[1], "v1 = __r.value;");

        let zero = checked_div(vec![None, Some(0)]);
        assert!(!ExceptionRewriter::new(true).can_elide(&zero));

        let mut widthless = checked_div(vec![None, Some(2)]);
        widthless.bits = None;
        assert!(!ExceptionRewriter::new(true).can_elide(&widthless));
    }
}
