//! Name resolution and type deduction over one expression tree.
//!
//! [`ResolveVisitor`] runs as the visitor of an [`AstTraversal`]. It never
//! mutates the tree: every result is recorded in id-keyed side tables that the
//! rewrite pass applies once checking has succeeded.
//!
//! Dotted names are ambiguous until resolved. In `a.b.c`, the identifier may be
//! `a` with two field selections, or a variable named `a.b`, or `a.b.c`. When
//! the identifier is visited, the enclosing selects are collected and marked
//! deferred; the longest resolvable prefix becomes the root and the remaining
//! selects are typed as field accesses. A receiver call `a.b.f()` is parked
//! until the call itself is visited, where `a.b.f` is tried as a namespaced
//! function before `a.b` is resolved as a value.
//!
//! [`AstTraversal`]: cel_core_common::AstTraversal

use std::collections::{HashMap, HashSet};

use cel_core_common::{
    AstVisitor, CallExpr, CelType, CelValue, ComprehensionArg, ComprehensionExpr, Expr, ExprKind,
    FunctionDecl, IdentExpr, ListExpr, MapExpr, ProtoTypeRegistry, SelectExpr, SourceInfo,
    StructExpr, VariableDecl,
};
use tracing::warn;

use crate::env::TypeCheckEnv;
use crate::inference::TypeInferenceContext;
use crate::issues::{CheckerError, IssueKind, TypeCheckIssue};
use crate::library::OPTIONAL_SELECT;
use crate::namespace::NamespaceGenerator;
use crate::options::CheckerOptions;
use crate::scope::{ScopeId, Scopes};

/// A resolved call: the function narrowed to its matching overloads.
#[derive(Debug, Clone)]
pub(crate) struct FunctionResolution {
    pub decl: FunctionDecl,
    /// The call target was a namespace prefix, not a receiver.
    pub namespace_rewrite: bool,
}

/// Side tables produced by a successful traversal.
#[derive(Debug, Default)]
pub(crate) struct ResolveTables {
    pub types: HashMap<i64, CelType>,
    /// Nodes that resolved to a declared variable or constant.
    pub attributes: HashMap<i64, VariableDecl>,
    pub functions: HashMap<i64, FunctionResolution>,
    /// Fully qualified names of struct literal types.
    pub struct_types: HashMap<i64, String>,
}

/// Everything a finished traversal hands to the driver.
#[derive(Debug)]
pub(crate) struct ResolveOutput {
    pub tables: ResolveTables,
    pub inference: TypeInferenceContext,
    pub issues: Vec<TypeCheckIssue>,
}

#[derive(Debug, Clone, Copy)]
struct ComprehensionScope {
    comprehension_id: i64,
    parent: ScopeId,
    accu_scope: ScopeId,
    iter_scope: ScopeId,
}

/// Resolves names and deduces types for every node of one expression.
pub(crate) struct ResolveVisitor<'a> {
    env: &'a TypeCheckEnv,
    namespace: &'a NamespaceGenerator,
    source_info: &'a SourceInfo,
    inference: TypeInferenceContext,
    scopes: Scopes<'a>,
    current_scope: ScopeId,
    /// Path from the root to the node being visited.
    expr_stack: Vec<&'a Expr>,
    comprehension_scopes: Vec<ComprehensionScope>,
    /// Selects typed as part of a qualified identifier.
    deferred_selects: HashSet<i64>,
    /// Receiver calls whose target may be a namespace, with its qualifiers.
    maybe_namespaced_functions: HashMap<i64, Vec<String>>,
    tables: ResolveTables,
    issues: Vec<TypeCheckIssue>,
    error_count: usize,
    max_error_issues: usize,
    status: Option<CheckerError>,
}

impl<'a> ResolveVisitor<'a> {
    pub fn new(
        env: &'a TypeCheckEnv,
        namespace: &'a NamespaceGenerator,
        source_info: &'a SourceInfo,
        options: &CheckerOptions,
    ) -> Self {
        Self {
            env,
            namespace,
            source_info,
            inference: TypeInferenceContext::new(options.enable_legacy_null_assignment),
            scopes: Scopes::new(env),
            current_scope: Scopes::ROOT,
            expr_stack: Vec::new(),
            comprehension_scopes: Vec::new(),
            deferred_selects: HashSet::new(),
            maybe_namespaced_functions: HashMap::new(),
            tables: ResolveTables::default(),
            issues: Vec::new(),
            error_count: 0,
            max_error_issues: options.max_error_issues,
            status: None,
        }
    }

    /// Take the internal failure recorded during the last steps, if any.
    pub fn take_status(&mut self) -> Option<CheckerError> {
        self.status.take()
    }

    pub fn error_limit_exceeded(&self) -> bool {
        self.error_count > self.max_error_issues
    }

    /// Report a mismatch if the root's type is not assignable to `expected`.
    pub fn assert_expected_type(&mut self, root: &Expr, expected: &CelType) {
        let actual = self.deduced_type(root);
        if !self.inference.is_assignable(&actual, expected) {
            let actual = self.inference.fully_substitute(&actual, false);
            self.report_error(
                root.id,
                IssueKind::TypeMismatch {
                    expected: expected.clone(),
                    actual,
                },
            );
        }
    }

    pub fn finish(self) -> ResolveOutput {
        ResolveOutput {
            tables: self.tables,
            inference: self.inference,
            issues: self.issues,
        }
    }

    // ==================== Reporting ====================

    fn report_issue(&mut self, issue: TypeCheckIssue) {
        if issue.is_error() {
            self.error_count += 1;
            if self.error_limit_exceeded() {
                return;
            }
        }
        self.issues.push(issue);
    }

    fn report_error(&mut self, expr_id: i64, kind: IssueKind) {
        let location = self.source_info.location(expr_id);
        self.report_issue(TypeCheckIssue::error(location, expr_id, kind));
    }

    fn report_missing_reference(&mut self, expr_id: i64, name: String) {
        let container = self.namespace.container().to_string();
        self.report_error(expr_id, IssueKind::UndeclaredReference { container, name });
    }

    /// Record an internal failure; the driver aborts after the current step.
    fn fail(&mut self, err: CheckerError) {
        warn!(%err, "type check failed");
        if self.status.is_none() {
            self.status = Some(err);
        }
    }

    fn deduced_type(&mut self, expr: &Expr) -> CelType {
        match self.tables.types.get(&expr.id) {
            Some(ty) => ty.clone(),
            None => {
                self.fail(CheckerError::Internal(format!(
                    "type of expression {} was not deduced",
                    expr.id
                )));
                CelType::Error
            }
        }
    }

    fn set_type(&mut self, expr: &Expr, ty: CelType) {
        self.tables.types.insert(expr.id, ty);
    }

    // ==================== Identifiers ====================

    /// Look up a candidate name among locals, variables and type constants.
    fn lookup_identifier(&self, name: &str) -> Result<Option<VariableDecl>, CheckerError> {
        if let Some(decl) = self.scopes.lookup_variable(self.current_scope, name) {
            return Ok(Some(decl.clone()));
        }
        Ok(self.env.lookup_type_constant(name)?)
    }

    /// Resolve the dotted name ending at `outer`.
    ///
    /// `qualifiers` holds the identifier followed by the field of every select
    /// between it and `outer`.
    fn resolve_qualified_identifier(&mut self, outer: &'a Expr, qualifiers: &[String]) {
        let mut found: Option<(VariableDecl, usize)> = None;
        let mut failure: Option<CheckerError> = None;
        self.namespace
            .generate_candidates_qualified(qualifiers, |candidate, segment| {
                match self.lookup_identifier(candidate) {
                    Ok(Some(decl)) => {
                        found = Some((decl, segment));
                        false
                    }
                    Ok(None) => true,
                    Err(err) => {
                        failure = Some(err);
                        false
                    }
                }
            });

        if let Some(err) = failure {
            self.fail(err);
            self.set_type(outer, CelType::Error);
            return;
        }
        let Some((decl, segment)) = found else {
            self.report_missing_reference(outer.id, qualifiers.join("."));
            let mut node = outer;
            loop {
                self.set_type(node, CelType::Error);
                match &node.kind {
                    ExprKind::Select(select) => node = select.operand.as_ref(),
                    _ => break,
                }
            }
            return;
        };

        // Walk down to the node the declaration stands for.
        let num_selects = qualifiers.len() - segment - 1;
        let mut root = outer;
        let mut selects = Vec::with_capacity(num_selects);
        for _ in 0..num_selects {
            let ExprKind::Select(select) = &root.kind else {
                self.fail(CheckerError::Internal(format!(
                    "expected select expression at {}",
                    root.id
                )));
                return;
            };
            selects.push(root);
            root = select.operand.as_ref();
        }

        let root_type = self.inference.instantiate_type_params(&decl.cel_type);
        self.set_type(root, root_type);
        self.tables.attributes.insert(root.id, decl);

        for select in selects.into_iter().rev() {
            self.resolve_select_operation(select);
        }
    }

    // ==================== Field Selection ====================

    fn resolve_select_operation(&mut self, expr: &'a Expr) {
        let ExprKind::Select(select) = &expr.kind else {
            self.fail(CheckerError::Internal(format!(
                "expected select expression at {}",
                expr.id
            )));
            return;
        };
        let operand_type = self.deduced_type(&select.operand);
        let operand_type = self.inference.fully_substitute(&operand_type, false);

        let result = match &operand_type {
            CelType::Optional(inner) => self
                .check_field_type(expr.id, inner, &select.field)
                .map(CelType::optional),
            _ => self.check_field_type(expr.id, &operand_type, &select.field),
        };
        let ty = match result {
            Some(_) if select.test_only => CelType::Bool,
            Some(ty) => ty,
            None => CelType::Error,
        };
        self.set_type(expr, ty);
    }

    /// Type of `operand.field`, or None once an issue has been reported.
    fn check_field_type(
        &mut self,
        expr_id: i64,
        operand: &CelType,
        field: &str,
    ) -> Option<CelType> {
        match operand {
            CelType::Dyn | CelType::Any => Some(CelType::Dyn),
            CelType::Error => None,
            CelType::Message(name) => match self.env.lookup_struct_field(name, field) {
                Ok(Some(found)) => match found.cel_type {
                    CelType::Enum(_) => Some(CelType::Int),
                    other => Some(other),
                },
                Ok(None) => {
                    self.report_error(
                        expr_id,
                        IssueKind::UndefinedField {
                            type_name: name.to_string(),
                            field: field.to_string(),
                        },
                    );
                    None
                }
                Err(err) => {
                    self.fail(err.into());
                    None
                }
            },
            CelType::Map(_, value) => Some(value.as_ref().clone()),
            CelType::TypeParam(_) if self.inference.is_assignable(&CelType::Dyn, operand) => {
                Some(CelType::Dyn)
            }
            _ => {
                self.report_error(
                    expr_id,
                    IssueKind::NotSelectable {
                        operand: operand.clone(),
                    },
                );
                None
            }
        }
    }

    /// `operand.?field`, expressed as the call `_?._(operand, "field")`.
    fn handle_opt_select(&mut self, expr: &'a Expr, call: &'a CallExpr) {
        let field = match (call.target.as_ref(), call.args.as_slice()) {
            (None, [_, field]) => match &field.kind {
                ExprKind::Constant(CelValue::String(name)) => name,
                _ => {
                    self.fail(CheckerError::MalformedExpression {
                        expr_id: expr.id,
                        message: "optional select field must be a string constant".to_string(),
                    });
                    return;
                }
            },
            _ => {
                self.fail(CheckerError::MalformedExpression {
                    expr_id: expr.id,
                    message: "optional select expects an operand and a field".to_string(),
                });
                return;
            }
        };

        let operand_type = self.deduced_type(&call.args[0]);
        let operand_type = match self.inference.fully_substitute(&operand_type, false) {
            CelType::Optional(inner) => inner.as_ref().clone(),
            other => other,
        };
        let ty = match self.check_field_type(expr.id, &operand_type, field) {
            Some(ty) => CelType::optional(ty),
            None => CelType::Error,
        };
        self.set_type(expr, ty);

        if let Some(decl) = self.env.lookup_function(OPTIONAL_SELECT) {
            self.tables.functions.insert(
                expr.id,
                FunctionResolution {
                    decl: decl.clone(),
                    namespace_rewrite: false,
                },
            );
        }
    }

    // ==================== Function Calls ====================

    fn find_function_call_shape(
        &self,
        name: &str,
        arg_count: usize,
        is_receiver: bool,
    ) -> Option<&'a FunctionDecl> {
        let env = self.env;
        let mut found = None;
        self.namespace.generate_candidates(name, |candidate| {
            match env.lookup_function(candidate) {
                Some(decl) if decl.has_shape(arg_count, is_receiver) => {
                    found = Some(decl);
                    false
                }
                _ => true,
            }
        });
        found
    }

    fn resolve_function_overloads(
        &mut self,
        expr: &Expr,
        decl: &FunctionDecl,
        arg_types: Vec<CelType>,
        is_receiver: bool,
        namespace_rewrite: bool,
    ) {
        let Some(resolution) = self.inference.resolve_overload(decl, &arg_types, is_receiver)
        else {
            let arg_types = arg_types
                .iter()
                .map(|ty| self.inference.fully_substitute(ty, false))
                .collect();
            self.report_error(
                expr.id,
                IssueKind::NoMatchingOverload {
                    function: decl.name.clone(),
                    arg_types,
                },
            );
            self.set_type(expr, CelType::Error);
            return;
        };

        let mut narrowed = FunctionDecl::new(decl.name.clone());
        for overload in resolution.overloads {
            if let Err(err) = narrowed.add_overload(overload) {
                self.fail(CheckerError::Internal(err.to_string()));
                return;
            }
        }
        self.tables.functions.insert(
            expr.id,
            FunctionResolution {
                decl: narrowed,
                namespace_rewrite,
            },
        );
        self.set_type(expr, resolution.result_type);
    }

    fn arg_types<'e>(&mut self, args: impl Iterator<Item = &'e Expr>) -> Vec<CelType> {
        args.map(|arg| self.deduced_type(arg)).collect()
    }

    // ==================== Aggregates ====================

    /// Element type contributed by an optional entry `?value`.
    fn optional_entry_type(&mut self, value: &Expr) -> Option<CelType> {
        let ty = self.deduced_type(value);
        match self.inference.fully_substitute(&ty, false) {
            CelType::Optional(inner) => Some(inner.as_ref().clone()),
            CelType::Dyn | CelType::Error | CelType::TypeParam(_) => Some(CelType::Dyn),
            other => {
                self.report_error(
                    value.id,
                    IssueKind::TypeMismatch {
                        expected: CelType::optional(other.clone()),
                        actual: other,
                    },
                );
                None
            }
        }
    }

    /// The most specific type every entry is assignable to, or `dyn`.
    fn join_types(&mut self, param: &str, types: &[CelType]) -> CelType {
        let mut overall = self
            .inference
            .instantiate_type_params(&CelType::type_param(param));
        let mut batch = self.inference.create_assignability_context();
        for ty in types {
            if !batch.is_assignable(ty, &overall) {
                overall = CelType::Dyn;
                batch.reset();
                break;
            }
        }
        if overall != CelType::Dyn {
            batch.update_inferred_type_assignments();
        }
        overall
    }

    // ==================== Comprehensions ====================

    fn current_comprehension(&mut self, expr: &Expr) -> Option<ComprehensionScope> {
        match self.comprehension_scopes.last().copied() {
            Some(scope) if scope.comprehension_id == expr.id => Some(scope),
            Some(scope) => {
                self.fail(CheckerError::Internal(format!(
                    "comprehension scope mismatch: expected {} but found {}",
                    expr.id, scope.comprehension_id
                )));
                None
            }
            None => {
                self.fail(CheckerError::Internal(format!(
                    "comprehension scope stack is empty at {}",
                    expr.id
                )));
                None
            }
        }
    }

    fn check_iter_range(&mut self, comprehension: &ComprehensionExpr, scope: ComprehensionScope) {
        let range = &comprehension.iter_range;
        let range_type = self.deduced_type(range);
        let range_type = self.inference.fully_substitute(&range_type, false);
        let two_vars = comprehension.iter_var2.is_some();

        let (first, second) = match &range_type {
            CelType::List(elem) if two_vars => (CelType::Int, elem.as_ref().clone()),
            CelType::List(elem) => (elem.as_ref().clone(), CelType::Dyn),
            CelType::Map(key, value) => (key.as_ref().clone(), value.as_ref().clone()),
            CelType::Dyn | CelType::Any | CelType::Error => (CelType::Dyn, CelType::Dyn),
            CelType::TypeParam(_) if self.inference.is_assignable(&CelType::Dyn, &range_type) => {
                (CelType::Dyn, CelType::Dyn)
            }
            _ => {
                self.report_error(
                    range.id,
                    IssueKind::NotAComprehensionRange {
                        range: range_type.clone(),
                    },
                );
                (CelType::Dyn, CelType::Dyn)
            }
        };

        self.scopes.insert_variable_if_absent(
            scope.iter_scope,
            VariableDecl::new(comprehension.iter_var.clone(), first),
        );
        if let Some(iter_var2) = &comprehension.iter_var2 {
            self.scopes
                .insert_variable_if_absent(scope.iter_scope, VariableDecl::new(iter_var2.clone(), second));
        }
    }

    fn check_loop_type(&mut self, expr: &Expr, expected: &CelType) {
        let actual = self.deduced_type(expr);
        if !self.inference.is_assignable(&actual, expected) {
            let expected = self.inference.fully_substitute(expected, false);
            let actual = self.inference.fully_substitute(&actual, false);
            self.report_error(expr.id, IssueKind::TypeMismatch { expected, actual });
        }
    }
}

impl<'a> AstVisitor<'a> for ResolveVisitor<'a> {
    fn pre_visit_expr(&mut self, expr: &'a Expr) {
        self.expr_stack.push(expr);
    }

    fn post_visit_expr(&mut self, _expr: &'a Expr) {
        self.expr_stack.pop();
    }

    fn post_visit_const(&mut self, expr: &'a Expr, value: &'a CelValue) {
        self.set_type(expr, value.cel_type());
    }

    fn post_visit_ident(&mut self, expr: &'a Expr, ident: &'a IdentExpr) {
        let mut qualifiers = vec![ident.name.clone()];
        let mut root_candidate = expr;
        let mut receiver_call = None;

        for &parent in self.expr_stack.iter().rev().skip(1) {
            match &parent.kind {
                // A presence test checks its operand; it never names a variable.
                ExprKind::Select(select) if select.test_only => break,
                ExprKind::Select(select) => {
                    qualifiers.push(select.field.clone());
                    self.deferred_selects.insert(parent.id);
                    root_candidate = parent;
                }
                ExprKind::Call(call)
                    if call
                        .target
                        .as_ref()
                        .is_some_and(|target| target.id == root_candidate.id) =>
                {
                    receiver_call = Some(parent.id);
                    break;
                }
                _ => break,
            }
        }

        match receiver_call {
            Some(call_id) => {
                self.maybe_namespaced_functions.insert(call_id, qualifiers);
            }
            None => self.resolve_qualified_identifier(root_candidate, &qualifiers),
        }
    }

    fn post_visit_select(&mut self, expr: &'a Expr, _select: &'a SelectExpr) {
        if self.deferred_selects.contains(&expr.id) {
            return;
        }
        self.resolve_select_operation(expr);
    }

    fn post_visit_call(&mut self, expr: &'a Expr, call: &'a CallExpr) {
        if call.function == OPTIONAL_SELECT {
            self.handle_opt_select(expr, call);
            return;
        }

        if let Some(qualifiers) = self.maybe_namespaced_functions.remove(&expr.id) {
            let name = format!("{}.{}", qualifiers.join("."), call.function);
            if let Some(decl) = self.find_function_call_shape(&name, call.args.len(), false) {
                let arg_types = self.arg_types(call.args.iter());
                self.resolve_function_overloads(expr, decl, arg_types, false, true);
                return;
            }
            // Not a namespaced function: the target is a value after all.
            if let Some(target) = &call.target {
                self.resolve_qualified_identifier(target, &qualifiers);
            }
        }

        let is_receiver = call.target.is_some();
        let arg_count = call.args.len() + usize::from(is_receiver);
        let Some(decl) = self.find_function_call_shape(&call.function, arg_count, is_receiver)
        else {
            self.report_missing_reference(expr.id, call.function.clone());
            self.set_type(expr, CelType::Error);
            return;
        };

        let arg_types = self.arg_types(call.target.as_deref().into_iter().chain(&call.args));
        self.resolve_function_overloads(expr, decl, arg_types, is_receiver, false);
    }

    fn post_visit_list(&mut self, expr: &'a Expr, list: &'a ListExpr) {
        let mut elem_types = Vec::with_capacity(list.elements.len());
        for element in &list.elements {
            if element.optional {
                if let Some(ty) = self.optional_entry_type(&element.expr) {
                    elem_types.push(ty);
                }
            } else {
                elem_types.push(self.deduced_type(&element.expr));
            }
        }

        let elem = self.join_types("E", &elem_types);
        let list_type = self.inference.fully_substitute(&CelType::list(elem), false);
        self.set_type(expr, list_type);
    }

    fn post_visit_map(&mut self, expr: &'a Expr, map: &'a MapExpr) {
        let mut key_types = Vec::with_capacity(map.entries.len());
        let mut value_types = Vec::with_capacity(map.entries.len());
        for entry in &map.entries {
            let key_type = self.deduced_type(&entry.key);
            let shown = self.inference.fully_substitute(&key_type, false);
            if !is_supported_key_type(&shown) {
                let location = self.source_info.location(entry.key.id);
                self.report_issue(TypeCheckIssue::warning(
                    location,
                    entry.key.id,
                    IssueKind::UnsupportedMapKey { key: shown },
                ));
            }

            let value_type = if entry.optional {
                match self.optional_entry_type(&entry.value) {
                    Some(ty) => ty,
                    None => continue,
                }
            } else {
                self.deduced_type(&entry.value)
            };
            key_types.push(key_type);
            value_types.push(value_type);
        }

        let key = self.join_types("K", &key_types);
        let value = self.join_types("V", &value_types);
        let map_type = self
            .inference
            .fully_substitute(&CelType::map(key, value), false);
        self.set_type(expr, map_type);
    }

    fn post_visit_struct(&mut self, expr: &'a Expr, structure: &'a StructExpr) {
        let env = self.env;
        let mut resolved: Option<(String, CelType)> = None;
        let mut failure = None;
        self.namespace
            .generate_candidates(&structure.name, |candidate| match env.lookup_type_name(candidate) {
                Ok(Some(ty)) => {
                    resolved = Some((candidate.to_string(), ty));
                    false
                }
                Ok(None) => true,
                Err(err) => {
                    failure = Some(err);
                    false
                }
            });

        if let Some(err) = failure {
            self.fail(err.into());
            self.set_type(expr, CelType::Error);
            return;
        }
        let Some((type_name, struct_type)) = resolved else {
            self.report_missing_reference(expr.id, structure.name.clone());
            self.set_type(expr, CelType::Error);
            return;
        };
        if !matches!(struct_type, CelType::Message(_))
            && !ProtoTypeRegistry::is_well_known_message(&type_name)
        {
            self.report_error(expr.id, IssueKind::NotAMessageType { type_name });
            self.set_type(expr, CelType::Error);
            return;
        }

        self.set_type(expr, struct_type);
        self.tables.struct_types.insert(expr.id, type_name.clone());

        for field in &structure.fields {
            let value_type = self.deduced_type(&field.value);
            let field_type = match env.lookup_struct_field(&type_name, &field.name) {
                Ok(Some(found)) => found.cel_type,
                Ok(None) => {
                    self.report_error(
                        field.id,
                        IssueKind::UndefinedField {
                            type_name: type_name.clone(),
                            field: field.name.clone(),
                        },
                    );
                    continue;
                }
                Err(err) => {
                    self.fail(err.into());
                    return;
                }
            };
            let field_type = if field.optional {
                CelType::optional(field_type)
            } else {
                field_type
            };

            if self.inference.is_assignable(&value_type, &field_type) {
                continue;
            }
            let actual = self.inference.fully_substitute(&value_type, false);
            if is_null_field_assignable(&actual, &field_type) {
                continue;
            }
            self.report_error(
                field.id,
                IssueKind::FieldTypeMismatch {
                    field: field.name.clone(),
                    expected: field_type,
                    actual,
                },
            );
        }
    }

    fn post_visit_unspecified(&mut self, expr: &'a Expr) {
        self.fail(CheckerError::MalformedExpression {
            expr_id: expr.id,
            message: "expression kind is not set".to_string(),
        });
        self.set_type(expr, CelType::Error);
    }

    fn pre_visit_comprehension(&mut self, expr: &'a Expr, _comprehension: &'a ComprehensionExpr) {
        let parent = self.current_scope;
        let accu_scope = self.scopes.make_nested(parent);
        let iter_scope = self.scopes.make_nested(accu_scope);
        self.comprehension_scopes.push(ComprehensionScope {
            comprehension_id: expr.id,
            parent,
            accu_scope,
            iter_scope,
        });
    }

    fn post_visit_comprehension(&mut self, expr: &'a Expr, comprehension: &'a ComprehensionExpr) {
        let Some(scope) = self.current_comprehension(expr) else {
            return;
        };
        self.comprehension_scopes.pop();
        self.current_scope = scope.parent;
        let result_type = self.deduced_type(&comprehension.result);
        self.set_type(expr, result_type);
    }

    fn pre_visit_comprehension_subexpression(
        &mut self,
        expr: &'a Expr,
        _comprehension: &'a ComprehensionExpr,
        arg: ComprehensionArg,
    ) {
        let Some(scope) = self.current_comprehension(expr) else {
            return;
        };
        self.current_scope = match arg {
            ComprehensionArg::LoopCondition | ComprehensionArg::LoopStep => scope.iter_scope,
            ComprehensionArg::Result => scope.accu_scope,
            ComprehensionArg::IterRange | ComprehensionArg::AccuInit => scope.parent,
        };
    }

    fn post_visit_comprehension_subexpression(
        &mut self,
        expr: &'a Expr,
        comprehension: &'a ComprehensionExpr,
        arg: ComprehensionArg,
    ) {
        let Some(scope) = self.current_comprehension(expr) else {
            return;
        };
        self.current_scope = scope.parent;

        match arg {
            ComprehensionArg::AccuInit => {
                let accu_type = self.deduced_type(&comprehension.accu_init);
                self.scopes.insert_variable_if_absent(
                    scope.accu_scope,
                    VariableDecl::new(comprehension.accu_var.clone(), accu_type),
                );
            }
            ComprehensionArg::IterRange => self.check_iter_range(comprehension, scope),
            ComprehensionArg::LoopCondition => {
                self.check_loop_type(&comprehension.loop_condition, &CelType::Bool);
            }
            ComprehensionArg::LoopStep => {
                let accu_type = self
                    .scopes
                    .lookup_variable(scope.accu_scope, &comprehension.accu_var)
                    .map(|decl| decl.cel_type.clone());
                match accu_type {
                    Some(accu_type) => self.check_loop_type(&comprehension.loop_step, &accu_type),
                    None => self.fail(CheckerError::Internal(format!(
                        "accumulator '{}' is not in scope",
                        comprehension.accu_var
                    ))),
                }
            }
            ComprehensionArg::Result => {}
        }
    }
}

fn is_supported_key_type(ty: &CelType) -> bool {
    matches!(
        ty,
        CelType::Bool | CelType::Int | CelType::UInt | CelType::String | CelType::Dyn
    )
}

/// `google.protobuf.NullValue` fields accept both ints and `null`.
fn is_null_field_assignable(value: &CelType, field: &CelType) -> bool {
    let accepts = |v: &CelType| matches!(v, CelType::Int | CelType::Null);
    match (value, field) {
        (_, CelType::Null) => accepts(value),
        (CelType::Optional(value), CelType::Optional(field)) if **field == CelType::Null => {
            accepts(value)
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::standard_library;
    use cel_core_common::{AstTraversal, ExprFactory};

    fn env_with(variables: Vec<VariableDecl>) -> TypeCheckEnv {
        let mut env = TypeCheckEnv::default();
        for decl in &standard_library().functions {
            env.insert_or_replace_function(decl.clone());
        }
        for decl in variables {
            env.insert_or_replace_variable(decl);
        }
        env
    }

    fn resolve(env: &TypeCheckEnv, expr: &Expr) -> ResolveOutput {
        let namespace = NamespaceGenerator::default();
        let source_info = SourceInfo::default();
        let options = CheckerOptions::default();
        let mut visitor = ResolveVisitor::new(env, &namespace, &source_info, &options);
        AstTraversal::new(expr).run(&mut visitor);
        assert!(visitor.take_status().is_none());
        visitor.finish()
    }

    #[test]
    fn test_longest_prefix_becomes_attribute() {
        let env = env_with(vec![VariableDecl::new(
            "a.b",
            CelType::map(CelType::String, CelType::Int),
        )]);
        let mut f = ExprFactory::new();
        let expr = f.qualified("a.b.c");
        let ExprKind::Select(outer) = &expr.kind else {
            panic!("expected select");
        };
        let inner_id = outer.operand.id;

        let output = resolve(&env, &expr);
        assert!(output.issues.is_empty());
        assert_eq!(output.tables.attributes[&inner_id].name, "a.b");
        assert_eq!(output.tables.types[&expr.id], CelType::Int);
        assert!(!output.tables.attributes.contains_key(&expr.id));
    }

    #[test]
    fn test_receiver_call_resolves_target() {
        let env = env_with(vec![VariableDecl::new("s", CelType::String)]);
        let mut f = ExprFactory::new();
        let target = f.ident("s");
        let target_id = target.id;
        let expr = f.member_call("size", target, vec![]);

        let output = resolve(&env, &expr);
        assert!(output.issues.is_empty());
        assert_eq!(output.tables.types[&target_id], CelType::String);
        let resolution = &output.tables.functions[&expr.id];
        assert!(!resolution.namespace_rewrite);
        assert_eq!(resolution.decl.overloads.len(), 1);
    }

    #[test]
    fn test_error_operand_reports_once() {
        let env = env_with(vec![]);
        let mut f = ExprFactory::new();
        let one = f.int(1);
        let call = f.call("nope", vec![one]);
        let expr = f.select(call, "field");

        let output = resolve(&env, &expr);
        assert_eq!(output.issues.len(), 1);
        assert_eq!(output.tables.types[&expr.id], CelType::Error);
    }

    #[test]
    fn test_comprehension_scopes_restored() {
        let env = env_with(vec![VariableDecl::new("xs", CelType::list(CelType::Int))]);
        let mut f = ExprFactory::new();
        let range = f.ident("xs");
        let inner_range = f.ident("xs");
        let expr = f.all_macro(range, "x", |f| {
            f.all_macro(inner_range, "y", |f| {
                let x = f.ident("x");
                let y = f.ident("y");
                f.call("_==_", vec![x, y])
            })
        });

        let output = resolve(&env, &expr);
        assert!(output.issues.is_empty(), "{:?}", output.issues);
        assert_eq!(output.tables.types[&expr.id], CelType::Bool);
    }

    #[test]
    fn test_comprehension_scope_mismatch_is_internal() {
        let env = env_with(vec![]);
        let mut f = ExprFactory::new();
        let range = f.list(vec![]);
        let expr = f.all_macro(range, "x", |f| f.bool(true));
        let stranger = f.int(0);
        let ExprKind::Comprehension(comprehension) = &expr.kind else {
            panic!("expected comprehension");
        };

        let namespace = NamespaceGenerator::default();
        let source_info = SourceInfo::default();
        let options = CheckerOptions::default();

        let mut visitor = ResolveVisitor::new(&env, &namespace, &source_info, &options);
        visitor.pre_visit_comprehension(&expr, comprehension);
        visitor.pre_visit_comprehension_subexpression(
            &stranger,
            comprehension,
            ComprehensionArg::IterRange,
        );
        assert!(matches!(visitor.take_status(), Some(CheckerError::Internal(_))));

        let mut visitor = ResolveVisitor::new(&env, &namespace, &source_info, &options);
        visitor.post_visit_comprehension(&expr, comprehension);
        assert!(matches!(visitor.take_status(), Some(CheckerError::Internal(_))));
    }

    #[test]
    fn test_null_field_assignable() {
        assert!(is_null_field_assignable(&CelType::Int, &CelType::Null));
        assert!(is_null_field_assignable(
            &CelType::optional(CelType::Null),
            &CelType::optional(CelType::Null)
        ));
        assert!(!is_null_field_assignable(&CelType::String, &CelType::Null));
    }
}
