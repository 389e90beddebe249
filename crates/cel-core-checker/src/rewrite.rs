//! Applies resolution results to a checked expression.
//!
//! Qualified names that resolved to a variable collapse into a single
//! identifier, calls take the canonical function name, and every node
//! receives its finalized type.

use std::collections::HashMap;

use cel_core_common::{Ast, CelType, Expr, ExprKind, IdentExpr, Reference};

use crate::inference::TypeInferenceContext;
use crate::resolver::ResolveTables;

struct Rewriter<'r> {
    tables: &'r ResolveTables,
    inference: &'r TypeInferenceContext,
    update_struct_type_names: bool,
    reference_map: HashMap<i64, Reference>,
    type_map: HashMap<i64, CelType>,
}

/// Rewrite `ast` in place and attach its reference and type maps.
pub(crate) fn rewrite_ast(
    ast: &mut Ast,
    tables: &ResolveTables,
    inference: &TypeInferenceContext,
    update_struct_type_names: bool,
) {
    let mut rewriter = Rewriter {
        tables,
        inference,
        update_struct_type_names,
        reference_map: HashMap::new(),
        type_map: HashMap::new(),
    };
    rewriter.rewrite(&mut ast.expr);

    ast.reference_map = rewriter.reference_map;
    ast.type_map = rewriter.type_map;
    ast.is_checked = true;
}

impl Rewriter<'_> {
    fn rewrite(&mut self, expr: &mut Expr) {
        let id = expr.id;
        let tables = self.tables;

        if let Some(decl) = tables.attributes.get(&id) {
            self.reference_map
                .insert(id, Reference::variable(decl.name.clone(), decl.value.clone()));
            expr.kind = ExprKind::Ident(IdentExpr::new(decl.name.clone()));
        } else {
            match &mut expr.kind {
                ExprKind::Select(select) => self.rewrite(&mut select.operand),
                ExprKind::Call(call) => {
                    let resolution = tables.functions.get(&id);
                    let namespaced = resolution.is_some_and(|r| r.namespace_rewrite);
                    if let Some(target) = call.target.as_deref_mut().filter(|_| !namespaced) {
                        self.rewrite(target);
                    }
                    for arg in &mut call.args {
                        self.rewrite(arg);
                    }

                    if let Some(resolution) = resolution {
                        let overload_ids = resolution
                            .decl
                            .overloads
                            .iter()
                            .map(|o| o.id.clone())
                            .collect();
                        self.reference_map.insert(
                            id,
                            Reference::function(resolution.decl.name.clone(), overload_ids),
                        );
                        call.function = resolution.decl.name.clone();
                        if namespaced {
                            call.target = None;
                        }
                    }
                }
                ExprKind::List(list) => {
                    for element in &mut list.elements {
                        self.rewrite(&mut element.expr);
                    }
                }
                ExprKind::Map(map) => {
                    for entry in &mut map.entries {
                        self.rewrite(&mut entry.key);
                        self.rewrite(&mut entry.value);
                    }
                }
                ExprKind::Struct(structure) => {
                    for field in &mut structure.fields {
                        self.rewrite(&mut field.value);
                    }
                    if let Some(name) = tables.struct_types.get(&id) {
                        self.reference_map
                            .insert(id, Reference::variable(name.clone(), None));
                        if self.update_struct_type_names {
                            structure.name = name.clone();
                        }
                    }
                }
                ExprKind::Comprehension(comprehension) => {
                    self.rewrite(&mut comprehension.iter_range);
                    self.rewrite(&mut comprehension.accu_init);
                    self.rewrite(&mut comprehension.loop_condition);
                    self.rewrite(&mut comprehension.loop_step);
                    self.rewrite(&mut comprehension.result);
                }
                ExprKind::Unspecified | ExprKind::Constant(_) | ExprKind::Ident(_) => {}
            }
        }

        if let Some(ty) = tables.types.get(&id) {
            self.type_map.insert(id, self.inference.finalize_type(ty));
        }
    }
}
