//! Render-Function IR and Capture Validation
//!
//! The upstream expression compiler lowers a render computation to a small
//! IR that tags every binding and identifier use with the lexical scope
//! that declared it. This module consumes that IR for exactly one purpose:
//! statically rejecting computations that capture bindings from an
//! enclosing scope, before the computation ever runs.
//!
//! # Architecture
//!
//! 1. The compiler serializes a function's IR as JSON.
//! 2. [`FnIr::from_json`] parses it into scope-tagged terms.
//! 3. [`validate`] walks the terms once at node construction time and
//!    fails with [`CaptureError`] if any use reaches outside the function.

mod function;
mod validate;

pub use function::{FnIr, IrTerm, ScopeId, MODULE_SCOPE};
pub use validate::{validate, CaptureError};
