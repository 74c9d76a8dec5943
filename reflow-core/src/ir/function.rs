//! Render-Function Intermediate Representation
//!
//! Defines the IR types describing a render computation as reported by the
//! upstream expression compiler. The compiler resolves every identifier use
//! to the scope that declared it; this crate only inspects those scope tags,
//! never the computation's semantics.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// Identifier for one lexical scope, assigned at IR construction time.
pub type ScopeId = u32;

/// The module/global scope. Bindings declared here are not lexically local
/// to any function body and are never treated as captures.
pub const MODULE_SCOPE: ScopeId = 0;

/// One item of a function body, in compiler-reported source order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IrTerm {
    /// A local binding declared in the enclosing function's own scope.
    Decl { name: String },

    /// An identifier use, resolved by the compiler to the scope that
    /// declared the binding.
    Use { name: String, scope: ScopeId },

    /// A function value created inside the body (e.g. a callback passed to
    /// a control). Its own uses are part of the outer function's capture
    /// analysis.
    Func(FnIr),
}

/// IR for one function body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FnIr {
    /// Display name, used in diagnostics.
    pub name: String,
    /// The scope introduced by this function's body.
    pub scope: ScopeId,
    /// Parameter names (declared in `scope`).
    #[serde(default)]
    pub params: Vec<String>,
    /// Body items in source order.
    #[serde(default)]
    pub body: Vec<IrTerm>,
}

impl FnIr {
    /// Parse IR from the compiler's JSON wire format.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// All scopes lexically inside this function: its own scope plus every
    /// inner function's scope, transitively.
    pub fn scopes(&self) -> HashSet<ScopeId> {
        let mut out = HashSet::new();
        self.collect_scopes(&mut out);
        out
    }

    fn collect_scopes(&self, out: &mut HashSet<ScopeId>) {
        out.insert(self.scope);
        for term in &self.body {
            if let IrTerm::Func(inner) = term {
                inner.collect_scopes(out);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_simple_ir() {
        let json = r#"{
            "name": "render",
            "scope": 1,
            "params": ["props"],
            "body": [
                {"kind": "decl", "name": "total"},
                {"kind": "use", "name": "total", "scope": 1},
                {"kind": "use", "name": "format", "scope": 0}
            ]
        }"#;

        let ir = FnIr::from_json(json).unwrap();
        assert_eq!(ir.name, "render");
        assert_eq!(ir.scope, 1);
        assert_eq!(ir.params, vec!["props"]);
        assert_eq!(ir.body.len(), 3);
    }

    #[test]
    fn parse_nested_function() {
        let json = r#"{
            "name": "render",
            "scope": 1,
            "body": [
                {"kind": "func", "name": "on_click", "scope": 2, "body": [
                    {"kind": "use", "name": "row", "scope": 1}
                ]}
            ]
        }"#;

        let ir = FnIr::from_json(json).unwrap();
        let scopes = ir.scopes();
        assert!(scopes.contains(&1));
        assert!(scopes.contains(&2));
        assert_eq!(scopes.len(), 2);
    }

    #[test]
    fn missing_body_defaults_to_empty() {
        let ir = FnIr::from_json(r#"{"name": "render", "scope": 3}"#).unwrap();
        assert!(ir.params.is_empty());
        assert!(ir.body.is_empty());
        assert_eq!(ir.scopes().len(), 1);
    }
}
