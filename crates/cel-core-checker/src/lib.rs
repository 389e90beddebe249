//! CEL Type Checker
//!
//! This crate resolves the names in a CEL expression against a declaration
//! environment and deduces the type of every node. A successful check returns
//! the expression with qualified names collapsed, function names made
//! canonical, and `type_map` / `reference_map` attached for downstream
//! planning.
//!
//! # Example
//!
//! ```
//! use cel_core_checker::{standard_library, TypeChecker};
//! use cel_core_common::{Ast, CelType, ExprFactory, VariableDecl};
//!
//! let mut builder = TypeChecker::builder();
//! builder.add_library(standard_library()).unwrap();
//! builder.add_variable(VariableDecl::new("x", CelType::Int)).unwrap();
//! let checker = builder.build().unwrap();
//!
//! // x + 1
//! let mut f = ExprFactory::new();
//! let x = f.ident("x");
//! let one = f.int(1);
//! let expr = f.call("_+_", vec![x, one]);
//!
//! let result = checker.check(Ast::from(expr)).unwrap();
//! assert!(result.is_valid());
//! assert_eq!(result.ast().unwrap().result_type(), Some(&CelType::Int));
//! ```

mod checker;
mod env;
mod inference;
mod issues;
mod library;
mod namespace;
mod options;
mod resolver;
mod rewrite;
mod scope;

pub use checker::{TypeChecker, TypeCheckerBuilder, ValidationResult};
pub use env::TypeCheckEnv;
pub use inference::{AssignabilityContext, InstanceMap, OverloadResolution, TypeInferenceContext};
pub use issues::{CheckerError, IssueKind, Severity, TypeCheckIssue};
pub use library::{
    optional_library, standard_library, CheckerLibrary, OPTIONAL_SELECT,
    SELECT_OPTIONAL_FIELD_OVERLOAD,
};
pub use namespace::{NamespaceError, NamespaceGenerator};
pub use options::CheckerOptions;
pub use scope::{ScopeId, Scopes, VariableScope};
