//! Capture Validator
//!
//! Runtime dependency tracking only sees *store* reads; it is blind to
//! ordinary closures over outer-scope values. A render computation that
//! captured a variable from an enclosing scope would silently use stale
//! data that never triggers re-evaluation. The validator turns that trap
//! into a construction-time failure: a render computation must be a free
//! function over its own parameters, locals, and module-level bindings.
//!
//! # What counts as a capture
//!
//! An identifier use whose declaring scope is neither the module scope nor
//! any scope lexically inside the render function. In particular:
//!
//! - An inner function closing over a binding *outside* the render function
//!   is still a capture of the render function (transitivity).
//! - Module-level bindings are allowed.
//! - An inner function closing over a render-local is allowed; only
//!   reaching outside the render function's own scope counts.

use std::collections::HashSet;

use indexmap::IndexSet;
use thiserror::Error;

use super::function::{FnIr, IrTerm, ScopeId, MODULE_SCOPE};

/// Construction-time rejection of a non-free render computation.
///
/// `captures` lists every distinct captured name in first-occurrence order.
/// Not retryable; the computation must be rewritten.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error(
    "{name} body must be a free function with no captures from parent scope.\n\
     Found captures: [{}].\n\
     Move reads inside the body or use shared state for shared data.",
    .captures.join(", ")
)]
pub struct CaptureError {
    /// Name of the rejected render computation.
    pub name: String,
    /// Captured binding names, deduplicated, first occurrence first.
    pub captures: Vec<String>,
}

/// Check that `ir` is a free function.
///
/// Pure over the IR: touches neither the store nor the tracking context.
/// Runs once, at the moment a reactive node is constructed.
pub fn validate(ir: &FnIr) -> Result<(), CaptureError> {
    let inside = ir.scopes();
    let mut captures = IndexSet::new();
    collect_captures(ir, &inside, &mut captures);

    if captures.is_empty() {
        Ok(())
    } else {
        Err(CaptureError {
            name: ir.name.clone(),
            captures: captures.into_iter().collect(),
        })
    }
}

fn collect_captures(
    ir: &FnIr,
    inside: &HashSet<ScopeId>,
    out: &mut IndexSet<String>,
) {
    for term in &ir.body {
        match term {
            IrTerm::Use { name, scope } => {
                if *scope != MODULE_SCOPE && !inside.contains(scope) {
                    out.insert(name.clone());
                }
            }
            IrTerm::Func(inner) => collect_captures(inner, inside, out),
            IrTerm::Decl { .. } => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn use_of(name: &str, scope: ScopeId) -> IrTerm {
        IrTerm::Use {
            name: name.to_owned(),
            scope,
        }
    }

    fn render_fn(body: Vec<IrTerm>) -> FnIr {
        FnIr {
            name: "render".to_owned(),
            scope: 2,
            params: vec!["props".to_owned()],
            body,
        }
    }

    #[test]
    fn free_function_passes() {
        // Reads its own local, its parameter, and a module-level constant.
        let ir = render_fn(vec![
            IrTerm::Decl {
                name: "total".to_owned(),
            },
            use_of("total", 2),
            use_of("props", 2),
            use_of("PALETTE", MODULE_SCOPE),
        ]);

        assert!(validate(&ir).is_ok());
    }

    #[test]
    fn parent_scope_use_is_rejected_in_order() {
        // Captures `multiplier` then `offset` (scope 1 encloses the render
        // function's scope 2), with a repeat that must be deduplicated.
        let ir = render_fn(vec![
            use_of("multiplier", 1),
            use_of("offset", 1),
            use_of("multiplier", 1),
        ]);

        let err = validate(&ir).unwrap_err();
        assert_eq!(err.captures, vec!["multiplier", "offset"]);
    }

    #[test]
    fn transitive_capture_through_inner_function_is_rejected() {
        // An inner callback closes over a binding declared outside the
        // render function. The render function is still non-free.
        let inner = FnIr {
            name: "on_click".to_owned(),
            scope: 3,
            params: vec![],
            body: vec![use_of("selection", 1)],
        };
        let ir = render_fn(vec![IrTerm::Func(inner)]);

        let err = validate(&ir).unwrap_err();
        assert_eq!(err.captures, vec!["selection"]);
    }

    #[test]
    fn inner_function_over_render_local_is_allowed() {
        // A callback created inside the body may freely use render-locals
        // and its own locals; local-to-local is not a capture.
        let inner = FnIr {
            name: "on_click".to_owned(),
            scope: 3,
            params: vec!["event".to_owned()],
            body: vec![use_of("row", 2), use_of("event", 3)],
        };
        let ir = render_fn(vec![
            IrTerm::Decl {
                name: "row".to_owned(),
            },
            IrTerm::Func(inner),
        ]);

        assert!(validate(&ir).is_ok());
    }

    #[test]
    fn module_level_bindings_are_not_captures() {
        let ir = render_fn(vec![use_of("GLOBAL_THEME", MODULE_SCOPE)]);
        assert!(validate(&ir).is_ok());
    }

    #[test]
    fn error_message_matches_contract() {
        let ir = render_fn(vec![use_of("multiplier", 1), use_of("offset", 1)]);
        let err = validate(&ir).unwrap_err();

        assert_eq!(
            err.to_string(),
            "render body must be a free function with no captures from parent scope.\n\
             Found captures: [multiplier, offset].\n\
             Move reads inside the body or use shared state for shared data."
        );
    }
}
