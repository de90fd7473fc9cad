//! Lexical scopes for variable resolution.

use indexmap::IndexMap;

use flow_core::{FlowType, SourceSpan};

/// A declared local variable.
#[derive(Debug, Clone)]
pub struct VarInfo {
    pub ty: FlowType,
    pub declared_at: SourceSpan,
}

/// Stack of lexical scopes.
///
/// Handlers open the outer scope; compound statements nest inner ones.
/// Name lookup walks the stack innermost-first. `IndexMap` keeps the
/// declaration order stable for deterministic diagnostics.
#[derive(Debug, Default)]
pub struct ScopeStack {
    scopes: Vec<IndexMap<String, VarInfo>>,
}

impl ScopeStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self) {
        self.scopes.push(IndexMap::new());
    }

    pub fn pop(&mut self) {
        let popped = self.scopes.pop();
        debug_assert!(popped.is_some(), "scope underflow");
    }

    pub fn declare(&mut self, name: impl Into<String>, info: VarInfo) {
        self.scopes
            .last_mut()
            .expect("no open scope")
            .insert(name.into(), info);
    }

    pub fn lookup(&self, name: &str) -> Option<&VarInfo> {
        self.scopes.iter().rev().find_map(|s| s.get(name))
    }

    /// Whether `name` is declared in the innermost scope.
    pub fn declared_here(&self, name: &str) -> bool {
        self.scopes
            .last()
            .map(|s| s.contains_key(name))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info() -> VarInfo {
        VarInfo {
            ty: FlowType::Number,
            declared_at: SourceSpan::zero(),
        }
    }

    #[test]
    fn inner_scopes_shadow_outer() {
        let mut scopes = ScopeStack::new();
        scopes.push();
        scopes.declare("x", info());
        scopes.push();
        scopes.declare(
            "x",
            VarInfo {
                ty: FlowType::String,
                declared_at: SourceSpan::zero(),
            },
        );
        assert_eq!(scopes.lookup("x").unwrap().ty, FlowType::String);
        scopes.pop();
        assert_eq!(scopes.lookup("x").unwrap().ty, FlowType::Number);
    }

    #[test]
    fn lookup_misses_after_pop() {
        let mut scopes = ScopeStack::new();
        scopes.push();
        scopes.push();
        scopes.declare("y", info());
        scopes.pop();
        assert!(scopes.lookup("y").is_none());
    }
}
