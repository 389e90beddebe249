//! Stepped depth-first traversal over an [`Expr`] tree.
//!
//! The traversal keeps an explicit stack instead of recursing, so callers can
//! bound the work done on a single tree: each node costs exactly two steps, one
//! for its pre-visit and one for its post-visit.

use crate::ast::{
    CallExpr, ComprehensionExpr, Expr, ExprKind, IdentExpr, ListExpr, MapExpr, SelectExpr,
    StructExpr,
};
use crate::CelValue;

/// Role of a sub-expression within a comprehension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComprehensionArg {
    IterRange,
    AccuInit,
    LoopCondition,
    LoopStep,
    Result,
}

/// Callbacks invoked by [`AstTraversal`].
///
/// Pre-visits run parent first; post-visits run children first. For every node
/// the kind-specific hook runs between `pre_visit_expr` and `post_visit_expr`.
#[allow(unused_variables)]
pub trait AstVisitor<'a> {
    fn pre_visit_expr(&mut self, expr: &'a Expr) {}
    fn post_visit_expr(&mut self, expr: &'a Expr) {}

    fn post_visit_const(&mut self, expr: &'a Expr, value: &'a CelValue) {}
    fn post_visit_ident(&mut self, expr: &'a Expr, ident: &'a IdentExpr) {}
    fn post_visit_select(&mut self, expr: &'a Expr, select: &'a SelectExpr) {}
    fn post_visit_call(&mut self, expr: &'a Expr, call: &'a CallExpr) {}
    fn post_visit_list(&mut self, expr: &'a Expr, list: &'a ListExpr) {}
    fn post_visit_map(&mut self, expr: &'a Expr, map: &'a MapExpr) {}
    fn post_visit_struct(&mut self, expr: &'a Expr, structure: &'a StructExpr) {}
    fn post_visit_unspecified(&mut self, expr: &'a Expr) {}

    fn pre_visit_comprehension(&mut self, expr: &'a Expr, comprehension: &'a ComprehensionExpr) {}
    fn post_visit_comprehension(&mut self, expr: &'a Expr, comprehension: &'a ComprehensionExpr) {}

    /// Called before a comprehension sub-expression is visited. `expr` is the
    /// comprehension node, not the sub-expression.
    fn pre_visit_comprehension_subexpression(
        &mut self,
        expr: &'a Expr,
        comprehension: &'a ComprehensionExpr,
        arg: ComprehensionArg,
    ) {
    }

    /// Called after a comprehension sub-expression has been fully visited.
    fn post_visit_comprehension_subexpression(
        &mut self,
        expr: &'a Expr,
        comprehension: &'a ComprehensionExpr,
        arg: ComprehensionArg,
    ) {
    }
}

#[derive(Clone, Copy)]
struct Frame<'a> {
    expr: &'a Expr,
    /// Set when `expr` is a direct sub-expression of a comprehension.
    role: Option<(&'a Expr, &'a ComprehensionExpr, ComprehensionArg)>,
    visited: bool,
}

impl<'a> Frame<'a> {
    fn new(expr: &'a Expr) -> Self {
        Self {
            expr,
            role: None,
            visited: false,
        }
    }
}

/// An in-progress traversal.
pub struct AstTraversal<'a> {
    stack: Vec<Frame<'a>>,
}

impl<'a> AstTraversal<'a> {
    /// Start a traversal rooted at `root`.
    pub fn new(root: &'a Expr) -> Self {
        Self {
            stack: vec![Frame::new(root)],
        }
    }

    /// Returns true once every node has been post-visited.
    pub fn is_done(&self) -> bool {
        self.stack.is_empty()
    }

    /// Perform one pre- or post-visit. Returns true while work remains.
    pub fn step<V>(&mut self, visitor: &mut V) -> bool
    where
        V: AstVisitor<'a> + ?Sized,
    {
        let Some(top) = self.stack.last_mut() else {
            return false;
        };

        if top.visited {
            if let Some(frame) = self.stack.pop() {
                post_visit(&frame, visitor);
            }
        } else {
            top.visited = true;
            let frame = *top;
            pre_visit(&frame, visitor);
            self.push_children(frame.expr);
        }
        !self.stack.is_empty()
    }

    /// Run the traversal to completion.
    pub fn run<V>(mut self, visitor: &mut V)
    where
        V: AstVisitor<'a> + ?Sized,
    {
        while self.step(visitor) {}
    }

    fn push_children(&mut self, expr: &'a Expr) {
        // Children are pushed in reverse so the first child is visited first.
        match &expr.kind {
            ExprKind::Select(select) => self.stack.push(Frame::new(&select.operand)),
            ExprKind::Call(call) => {
                for arg in call.args.iter().rev() {
                    self.stack.push(Frame::new(arg));
                }
                if let Some(target) = &call.target {
                    self.stack.push(Frame::new(target));
                }
            }
            ExprKind::List(list) => {
                for element in list.elements.iter().rev() {
                    self.stack.push(Frame::new(&element.expr));
                }
            }
            ExprKind::Map(map) => {
                for entry in map.entries.iter().rev() {
                    self.stack.push(Frame::new(&entry.value));
                    self.stack.push(Frame::new(&entry.key));
                }
            }
            ExprKind::Struct(structure) => {
                for field in structure.fields.iter().rev() {
                    self.stack.push(Frame::new(&field.value));
                }
            }
            ExprKind::Comprehension(comprehension) => {
                let parts = [
                    (&comprehension.result, ComprehensionArg::Result),
                    (&comprehension.loop_step, ComprehensionArg::LoopStep),
                    (&comprehension.loop_condition, ComprehensionArg::LoopCondition),
                    (&comprehension.accu_init, ComprehensionArg::AccuInit),
                    (&comprehension.iter_range, ComprehensionArg::IterRange),
                ];
                for (child, arg) in parts {
                    self.stack.push(Frame {
                        expr: child,
                        role: Some((expr, comprehension.as_ref(), arg)),
                        visited: false,
                    });
                }
            }
            ExprKind::Unspecified | ExprKind::Constant(_) | ExprKind::Ident(_) => {}
        }
    }
}

fn pre_visit<'a, V>(frame: &Frame<'a>, visitor: &mut V)
where
    V: AstVisitor<'a> + ?Sized,
{
    if let Some((parent, comprehension, arg)) = frame.role {
        visitor.pre_visit_comprehension_subexpression(parent, comprehension, arg);
    }
    visitor.pre_visit_expr(frame.expr);
    if let ExprKind::Comprehension(comprehension) = &frame.expr.kind {
        visitor.pre_visit_comprehension(frame.expr, comprehension);
    }
}

fn post_visit<'a, V>(frame: &Frame<'a>, visitor: &mut V)
where
    V: AstVisitor<'a> + ?Sized,
{
    let expr = frame.expr;
    match &expr.kind {
        ExprKind::Unspecified => visitor.post_visit_unspecified(expr),
        ExprKind::Constant(value) => visitor.post_visit_const(expr, value),
        ExprKind::Ident(ident) => visitor.post_visit_ident(expr, ident),
        ExprKind::Select(select) => visitor.post_visit_select(expr, select),
        ExprKind::Call(call) => visitor.post_visit_call(expr, call),
        ExprKind::List(list) => visitor.post_visit_list(expr, list),
        ExprKind::Map(map) => visitor.post_visit_map(expr, map),
        ExprKind::Struct(structure) => visitor.post_visit_struct(expr, structure),
        ExprKind::Comprehension(comprehension) => {
            visitor.post_visit_comprehension(expr, comprehension)
        }
    }
    visitor.post_visit_expr(expr);
    if let Some((parent, comprehension, arg)) = frame.role {
        visitor.post_visit_comprehension_subexpression(parent, comprehension, arg);
    }
}
