//! The type checker entry points.
//!
//! A [`TypeCheckerBuilder`] collects declarations into a [`TypeCheckEnv`];
//! [`TypeCheckerBuilder::build`] freezes it into a [`TypeChecker`] that can
//! check any number of expressions, from any number of threads.

use std::collections::HashSet;
use std::sync::Arc;

use cel_core_common::{
    Ast, AstTraversal, CelType, DeclError, FunctionDecl, ProtoTypeRegistry, SourceLocation,
    TypeProvider, VariableDecl,
};
use prost_reflect::DescriptorPool;
use tracing::{debug, instrument, warn};

use crate::env::TypeCheckEnv;
use crate::issues::{CheckerError, IssueKind, TypeCheckIssue};
use crate::library::{CheckerLibrary, OPTIONAL_SELECT, SELECT_OPTIONAL_FIELD_OVERLOAD};
use crate::namespace::{NamespaceError, NamespaceGenerator};
use crate::options::CheckerOptions;
use crate::resolver::ResolveVisitor;
use crate::rewrite::rewrite_ast;

/// Outcome of checking one expression.
///
/// Holds the checked AST when no error was reported. Warnings may be present
/// either way.
#[derive(Debug, Clone)]
pub struct ValidationResult {
    ast: Option<Ast>,
    issues: Vec<TypeCheckIssue>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.ast.is_some()
    }

    /// The checked AST, if checking succeeded.
    pub fn ast(&self) -> Option<&Ast> {
        self.ast.as_ref()
    }

    pub fn into_ast(self) -> Option<Ast> {
        self.ast
    }

    pub fn issues(&self) -> &[TypeCheckIssue] {
        &self.issues
    }

    /// Iterate over error-severity issues.
    pub fn errors(&self) -> impl Iterator<Item = &TypeCheckIssue> {
        self.issues.iter().filter(|issue| issue.is_error())
    }

    /// All issues, one per line.
    pub fn format_issues(&self) -> String {
        self.issues
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// A configured, immutable type checker.
#[derive(Debug, Clone)]
pub struct TypeChecker {
    env: Arc<TypeCheckEnv>,
    namespace: NamespaceGenerator,
    options: CheckerOptions,
    libraries: HashSet<String>,
}

impl TypeChecker {
    /// Start a builder over the generated descriptor pool.
    pub fn builder() -> TypeCheckerBuilder {
        TypeCheckerBuilder::new()
    }

    pub fn env(&self) -> &TypeCheckEnv {
        &self.env
    }

    pub fn options(&self) -> &CheckerOptions {
        &self.options
    }

    /// Start a builder whose environment extends this checker's.
    ///
    /// Declarations added to the builder shadow this checker's; the checker
    /// itself is unaffected.
    pub fn extend(&self) -> TypeCheckerBuilder {
        TypeCheckerBuilder {
            env: TypeCheckEnv::extend(Arc::clone(&self.env)),
            options: self.options.clone(),
            libraries: self.libraries.clone(),
        }
    }

    /// Type check `ast`.
    ///
    /// Problems in the expression are returned as issues of the result.
    /// `Err` is reserved for failures of the checker or its type providers,
    /// and for expressions over the node budget.
    #[instrument(skip_all, fields(container = self.env.container()))]
    pub fn check(&self, mut ast: Ast) -> Result<ValidationResult, CheckerError> {
        let max_errors = self.options.max_error_issues;
        let output = {
            let mut visitor =
                ResolveVisitor::new(&self.env, &self.namespace, &ast.source_info, &self.options);
            let mut traversal = AstTraversal::new(&ast.expr);

            let max_steps = self.options.max_expression_node_count.saturating_mul(2);
            let mut steps = 0;
            while steps < max_steps && !traversal.is_done() {
                traversal.step(&mut visitor);
                steps += 1;
                if let Some(err) = visitor.take_status() {
                    return Err(err);
                }
                if visitor.error_limit_exceeded() {
                    break;
                }
            }

            let overflow = visitor.error_limit_exceeded();
            if !traversal.is_done() && !overflow {
                warn!(
                    limit = self.options.max_expression_node_count,
                    "expression exceeds node budget"
                );
                return Err(CheckerError::NodeBudgetExceeded(
                    self.options.max_expression_node_count,
                ));
            }

            if !overflow {
                if let Some(expected) = self.env.expected_type() {
                    visitor.assert_expected_type(&ast.expr, expected);
                    if let Some(err) = visitor.take_status() {
                        return Err(err);
                    }
                }
            }

            let mut output = visitor.finish();
            if overflow {
                warn!(limit = max_errors, "too many errors, checking stopped");
                output.issues.push(TypeCheckIssue::error(
                    SourceLocation::UNKNOWN,
                    0,
                    IssueKind::TooManyErrors { limit: max_errors },
                ));
            }
            debug!(steps, issues = output.issues.len(), "resolved expression");
            output
        };

        if output.issues.iter().any(TypeCheckIssue::is_error) {
            return Ok(ValidationResult {
                ast: None,
                issues: output.issues,
            });
        }

        rewrite_ast(
            &mut ast,
            &output.tables,
            &output.inference,
            self.options.update_struct_type_names,
        );
        Ok(ValidationResult {
            ast: Some(ast),
            issues: output.issues,
        })
    }
}

/// Collects declarations and options for a [`TypeChecker`].
#[derive(Debug)]
pub struct TypeCheckerBuilder {
    env: TypeCheckEnv,
    options: CheckerOptions,
    /// Ids of libraries already added.
    libraries: HashSet<String>,
}

impl Default for TypeCheckerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeCheckerBuilder {
    /// Create an empty builder over the generated descriptor pool.
    pub fn new() -> Self {
        Self::with_registry(ProtoTypeRegistry::new())
    }

    /// Create an empty builder that resolves message types in `registry`.
    pub fn with_registry(registry: ProtoTypeRegistry) -> Self {
        Self {
            env: TypeCheckEnv::new(registry),
            options: CheckerOptions::default(),
            libraries: HashSet::new(),
        }
    }

    /// Create an empty builder that resolves message types in `pool`.
    pub fn with_descriptor_pool(pool: DescriptorPool) -> Self {
        Self::with_registry(ProtoTypeRegistry::from_pool(pool))
    }

    pub fn with_options(mut self, options: CheckerOptions) -> Self {
        self.options = options;
        self
    }

    pub fn env(&self) -> &TypeCheckEnv {
        &self.env
    }

    pub fn set_container(&mut self, container: impl Into<String>) {
        self.env.set_container(container);
    }

    /// Require checked expressions to be assignable to `expected`.
    pub fn set_expected_type(&mut self, expected: CelType) {
        self.env.set_expected_type(expected);
    }

    pub fn add_type_provider(&mut self, provider: Arc<dyn TypeProvider>) {
        self.env.add_type_provider(provider);
    }

    // ==================== Declarations ====================

    /// Declare a variable, failing if this builder already declares it.
    pub fn add_variable(&mut self, decl: VariableDecl) -> Result<(), DeclError> {
        let name = decl.name.clone();
        if self.env.insert_variable_if_absent(decl) {
            Ok(())
        } else {
            Err(DeclError::DuplicateVariable(name))
        }
    }

    pub fn add_or_replace_variable(&mut self, decl: VariableDecl) {
        self.env.insert_or_replace_variable(decl);
    }

    /// Declare a function, failing if this builder already declares it.
    pub fn add_function(&mut self, decl: FunctionDecl) -> Result<(), DeclError> {
        check_reserved(&decl)?;
        let decl = with_unique_overloads(decl)?;
        let name = decl.name.clone();
        if self.env.insert_function_if_absent(decl) {
            Ok(())
        } else {
            Err(DeclError::DuplicateFunction(name))
        }
    }

    /// Add the overloads of `decl` to any visible declaration of the same name.
    ///
    /// Fails on an overload id collision with a different signature.
    pub fn merge_function(&mut self, decl: FunctionDecl) -> Result<(), DeclError> {
        check_reserved(&decl)?;
        let decl = with_unique_overloads(decl)?;
        let mut merged = self
            .env
            .lookup_function(&decl.name)
            .cloned()
            .unwrap_or_else(|| FunctionDecl::new(decl.name.clone()));
        merged.merge(decl)?;
        self.env.insert_or_replace_function(merged);
        Ok(())
    }

    /// Add every declaration of `library`. Adding a library twice is a no-op.
    pub fn add_library(&mut self, library: &CheckerLibrary) -> Result<(), DeclError> {
        if !self.libraries.insert(library.id.clone()) {
            return Ok(());
        }
        for variable in &library.variables {
            self.add_variable(variable.clone())?;
        }
        for function in &library.functions {
            self.merge_function(function.clone())?;
        }
        debug!(library = %library.id, "added checker library");
        Ok(())
    }

    /// Freeze the environment into a checker.
    pub fn build(self) -> Result<TypeChecker, NamespaceError> {
        let namespace = NamespaceGenerator::new(self.env.container())?;
        Ok(TypeChecker {
            env: Arc::new(self.env),
            namespace,
            options: self.options,
            libraries: self.libraries,
        })
    }
}

/// Re-register every overload of `decl`, failing on a repeated id.
fn with_unique_overloads(decl: FunctionDecl) -> Result<FunctionDecl, DeclError> {
    let mut unique = FunctionDecl::new(decl.name);
    for overload in decl.overloads {
        unique.add_overload(overload)?;
    }
    Ok(unique)
}

/// Only the built-in optional field selection may declare `_?._`.
fn check_reserved(decl: &FunctionDecl) -> Result<(), DeclError> {
    let reserved = decl.name == OPTIONAL_SELECT
        && decl
            .overloads
            .iter()
            .any(|overload| overload.id != SELECT_OPTIONAL_FIELD_OVERLOAD);
    if reserved {
        return Err(DeclError::ReservedFunction(decl.name.clone()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::{optional_library, standard_library};
    use cel_core_common::{ExprFactory, OverloadDecl};

    fn checker_with(variables: Vec<VariableDecl>) -> TypeChecker {
        let mut builder = TypeChecker::builder();
        builder.add_library(standard_library()).unwrap();
        for variable in variables {
            builder.add_variable(variable).unwrap();
        }
        builder.build().unwrap()
    }

    #[test]
    fn test_checker_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<TypeChecker>();
    }

    #[test]
    fn test_duplicate_variable() {
        let mut builder = TypeChecker::builder();
        builder
            .add_variable(VariableDecl::new("x", CelType::Int))
            .unwrap();
        let err = builder
            .add_variable(VariableDecl::new("x", CelType::String))
            .unwrap_err();
        assert!(matches!(err, DeclError::DuplicateVariable(name) if name == "x"));

        builder.add_or_replace_variable(VariableDecl::new("x", CelType::String));
        assert_eq!(
            builder.env().lookup_variable("x").map(|d| &d.cel_type),
            Some(&CelType::String)
        );
    }

    #[test]
    fn test_duplicate_function() {
        let mut builder = TypeChecker::builder();
        let decl = FunctionDecl::new("f").with_overload(OverloadDecl::function(
            "f_int",
            vec![CelType::Int],
            CelType::Int,
        ));
        builder.add_function(decl.clone()).unwrap();
        assert!(matches!(
            builder.add_function(decl),
            Err(DeclError::DuplicateFunction(_))
        ));
    }

    #[test]
    fn test_colliding_overload_ids_rejected() {
        let colliding = FunctionDecl::new("f")
            .with_overload(OverloadDecl::function("f_x", vec![CelType::Int], CelType::Int))
            .with_overload(OverloadDecl::function(
                "f_x",
                vec![CelType::String],
                CelType::String,
            ));

        let mut builder = TypeChecker::builder();
        let err = builder.add_function(colliding.clone()).unwrap_err();
        assert_eq!(
            err,
            DeclError::OverloadCollision {
                function: "f".to_string(),
                overload_id: "f_x".to_string(),
            }
        );
        assert!(builder.env().lookup_function("f").is_none());

        assert!(matches!(
            builder.merge_function(colliding),
            Err(DeclError::OverloadCollision { .. })
        ));
        assert!(builder.env().lookup_function("f").is_none());
    }

    #[test]
    fn test_reserved_optional_select() {
        let mut builder = TypeChecker::builder();
        let decl = FunctionDecl::new(OPTIONAL_SELECT).with_overload(OverloadDecl::function(
            "my_select",
            vec![CelType::Dyn, CelType::String],
            CelType::Dyn,
        ));
        assert!(matches!(
            builder.add_function(decl),
            Err(DeclError::ReservedFunction(_))
        ));
        builder.add_library(optional_library()).unwrap();
    }

    #[test]
    fn test_merge_function_extends_library() {
        let mut builder = TypeChecker::builder();
        builder.add_library(standard_library()).unwrap();
        builder
            .merge_function(FunctionDecl::new("size").with_overload(OverloadDecl::function(
                "size_custom",
                vec![CelType::message("test.Thing")],
                CelType::Int,
            )))
            .unwrap();
        let size = builder.env().lookup_function("size").unwrap();
        assert!(size.get_overload("size_custom").is_some());
        assert!(size.get_overload("size_string").is_some());
    }

    #[test]
    fn test_library_added_once() {
        let mut builder = TypeChecker::builder();
        builder.add_library(standard_library()).unwrap();
        builder.add_library(standard_library()).unwrap();
    }

    #[test]
    fn test_invalid_container() {
        let mut builder = TypeChecker::builder();
        builder.set_container(".bad");
        assert!(builder.build().is_err());
    }

    #[test]
    fn test_check_simple() {
        let checker = checker_with(vec![VariableDecl::new("x", CelType::Int)]);
        let mut f = ExprFactory::new();
        let x = f.ident("x");
        let one = f.int(1);
        let expr = f.call("_+_", vec![x, one]);
        let root = expr.id;

        let result = checker.check(Ast::from(expr)).unwrap();
        assert!(result.is_valid(), "{}", result.format_issues());
        let ast = result.ast().unwrap();
        assert!(ast.is_checked());
        assert_eq!(ast.get_type(root), Some(&CelType::Int));
        assert_eq!(
            ast.get_reference(root).map(|r| r.overload_ids.clone()),
            Some(vec!["add_int64".to_string()])
        );
    }

    #[test]
    fn test_checker_reusable() {
        let checker = checker_with(vec![VariableDecl::new("x", CelType::Int)]);
        for _ in 0..3 {
            let mut f = ExprFactory::new();
            let result = checker.check(Ast::from(f.ident("x"))).unwrap();
            assert!(result.is_valid());
        }
    }

    #[test]
    fn test_extend_shadows_parent() {
        let parent = checker_with(vec![VariableDecl::new("x", CelType::Int)]);
        let mut builder = parent.extend();
        builder
            .add_variable(VariableDecl::new("x", CelType::String))
            .unwrap();
        let child = builder.build().unwrap();

        let mut f = ExprFactory::new();
        let expr = f.ident("x");
        let id = expr.id;
        let child_ast = child.check(Ast::from(expr.clone())).unwrap().into_ast().unwrap();
        let parent_ast = parent.check(Ast::from(expr)).unwrap().into_ast().unwrap();
        assert_eq!(child_ast.get_type(id), Some(&CelType::String));
        assert_eq!(parent_ast.get_type(id), Some(&CelType::Int));
    }
}
