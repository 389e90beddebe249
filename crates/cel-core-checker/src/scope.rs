//! Scope management for variable resolution during type checking.
//!
//! Scopes hold the block-local bindings introduced by comprehensions. They
//! live in an arena owned by one check so that ids stay valid while scopes are
//! entered and left; lookups that miss every scope fall back to the
//! environment.

use std::collections::HashMap;

use cel_core_common::VariableDecl;

use crate::env::TypeCheckEnv;

/// Index of a scope within [`Scopes`].
pub type ScopeId = usize;

/// A scope containing variable declarations.
#[derive(Debug, Clone, Default)]
pub struct VariableScope {
    parent: Option<ScopeId>,
    variables: HashMap<String, VariableDecl>,
}

impl VariableScope {
    /// Look up a variable in this scope only.
    pub fn get(&self, name: &str) -> Option<&VariableDecl> {
        self.variables.get(name)
    }
}

/// Arena of nested scopes backed by a [`TypeCheckEnv`].
#[derive(Debug)]
pub struct Scopes<'env> {
    env: &'env TypeCheckEnv,
    scopes: Vec<VariableScope>,
}

impl<'env> Scopes<'env> {
    /// The root scope, whose parent is the environment.
    pub const ROOT: ScopeId = 0;

    pub fn new(env: &'env TypeCheckEnv) -> Self {
        Self {
            env,
            scopes: vec![VariableScope::default()],
        }
    }

    /// Create a scope nested in `parent` and return its id.
    pub fn make_nested(&mut self, parent: ScopeId) -> ScopeId {
        self.scopes.push(VariableScope {
            parent: Some(parent),
            variables: HashMap::new(),
        });
        self.scopes.len() - 1
    }

    /// Parent of `scope`, or None for the root.
    pub fn parent(&self, scope: ScopeId) -> Option<ScopeId> {
        self.scopes.get(scope).and_then(|s| s.parent)
    }

    /// Bind `decl` in `scope` unless the name is already bound there.
    ///
    /// Returns false when the name was already present.
    pub fn insert_variable_if_absent(&mut self, scope: ScopeId, decl: VariableDecl) -> bool {
        let Some(scope) = self.scopes.get_mut(scope) else {
            return false;
        };
        if scope.variables.contains_key(&decl.name) {
            return false;
        }
        scope.variables.insert(decl.name.clone(), decl);
        true
    }

    /// Look up a variable from `scope` outwards, then in the environment.
    pub fn lookup_variable(&self, scope: ScopeId, name: &str) -> Option<&VariableDecl> {
        let mut current = Some(scope);
        while let Some(id) = current {
            let scope = self.scopes.get(id)?;
            if let Some(decl) = scope.get(name) {
                return Some(decl);
            }
            current = scope.parent;
        }
        self.env.lookup_variable(name)
    }

    /// Number of scopes allocated so far, including the root.
    pub fn len(&self) -> usize {
        self.scopes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }
}
