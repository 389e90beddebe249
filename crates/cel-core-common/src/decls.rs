//! Identifiers and functions a checked expression may refer to.

use thiserror::Error;

use crate::{CelType, CelValue};

/// Errors raised while registering declarations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeclError {
    #[error("overload '{overload_id}' already exists on function '{function}'")]
    OverloadCollision { function: String, overload_id: String },
    #[error("variable '{0}' declared multiple times")]
    DuplicateVariable(String),
    #[error("function '{0}' declared multiple times")]
    DuplicateFunction(String),
    #[error("function '{0}' is reserved and cannot be redeclared")]
    ReservedFunction(String),
}

/// A named, typed value in scope. Constants also carry their value.
#[derive(Debug, Clone, PartialEq)]
pub struct VariableDecl {
    /// Fully qualified, e.g. `x` or `acme.limits.max`.
    pub name: String,
    pub cel_type: CelType,
    pub value: Option<CelValue>,
}

impl VariableDecl {
    pub fn new(name: impl Into<String>, cel_type: CelType) -> Self {
        Self {
            name: name.into(),
            cel_type,
            value: None,
        }
    }

    /// A variable of type `dyn`.
    pub fn dynamic(name: impl Into<String>) -> Self {
        Self::new(name, CelType::Dyn)
    }

    pub fn constant(name: impl Into<String>, cel_type: CelType, value: CelValue) -> Self {
        Self {
            name: name.into(),
            cel_type,
            value: Some(value),
        }
    }
}

/// One signature of a function.
///
/// Type parameters are written as `CelType::TypeParam` anywhere in the
/// signature; every use of the overload instantiates them afresh.
#[derive(Debug, Clone, PartialEq)]
pub struct OverloadDecl {
    /// Unique across every function in an environment, e.g. `size_string`.
    pub id: String,
    /// For receiver-style overloads the receiver comes first.
    pub params: Vec<CelType>,
    pub result: CelType,
    /// Called as `target.name(args)` rather than `name(args)`.
    pub is_member: bool,
}

impl OverloadDecl {
    /// A global overload called as `name(args)`.
    pub fn function(id: impl Into<String>, params: Vec<CelType>, result: CelType) -> Self {
        Self {
            id: id.into(),
            params,
            result,
            is_member: false,
        }
    }

    /// A receiver-style overload; `params[0]` is the receiver.
    pub fn method(id: impl Into<String>, params: Vec<CelType>, result: CelType) -> Self {
        Self {
            id: id.into(),
            params,
            result,
            is_member: true,
        }
    }

    pub fn receiver_type(&self) -> Option<&CelType> {
        self.params.first().filter(|_| self.is_member)
    }

    /// Returns true if this overload can be called with the given shape.
    pub fn matches_shape(&self, arg_count: usize, is_receiver: bool) -> bool {
        self.is_member == is_receiver && self.params.len() == arg_count
    }
}

/// A function name and every overload declared for it.
///
/// Overloads keep their registration order. Environments reject a
/// declaration whose overload ids repeat.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDecl {
    pub name: String,
    pub overloads: Vec<OverloadDecl>,
}

impl FunctionDecl {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            overloads: Vec::new(),
        }
    }

    /// Builder-style overload registration.
    ///
    /// Ids are not checked here; [`FunctionDecl::add_overload`] and
    /// [`FunctionDecl::merge`] report collisions.
    pub fn with_overload(mut self, overload: OverloadDecl) -> Self {
        self.overloads.push(overload);
        self
    }

    /// Add an overload, failing if its id is already declared.
    pub fn add_overload(&mut self, overload: OverloadDecl) -> Result<(), DeclError> {
        if self.get_overload(&overload.id).is_some() {
            return Err(DeclError::OverloadCollision {
                function: self.name.clone(),
                overload_id: overload.id,
            });
        }
        self.overloads.push(overload);
        Ok(())
    }

    /// Merge the overloads of `other` into this declaration.
    ///
    /// Overloads identical to an existing one are skipped; a different overload
    /// reusing an existing id is a collision.
    pub fn merge(&mut self, other: FunctionDecl) -> Result<(), DeclError> {
        for overload in other.overloads {
            match self.get_overload(&overload.id) {
                Some(existing) if *existing == overload => {}
                Some(_) => {
                    return Err(DeclError::OverloadCollision {
                        function: self.name.clone(),
                        overload_id: overload.id,
                    })
                }
                None => self.overloads.push(overload),
            }
        }
        Ok(())
    }

    /// Look up an overload by id.
    pub fn get_overload(&self, id: &str) -> Option<&OverloadDecl> {
        self.overloads.iter().find(|overload| overload.id == id)
    }

    /// Returns true if any overload accepts the given call shape.
    pub fn has_shape(&self, arg_count: usize, is_receiver: bool) -> bool {
        self.overloads
            .iter()
            .any(|o| o.matches_shape(arg_count, is_receiver))
    }
}
