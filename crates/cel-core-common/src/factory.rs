//! Builder for expression trees with unique node ids.
//!
//! Ids are allocated in construction order starting at 1, so children always
//! receive smaller ids than their parents.

use crate::ast::{
    CallExpr, ComprehensionExpr, Expr, ExprKind, IdentExpr, ListElement, ListExpr, MapEntry,
    MapExpr, SelectExpr, StructExpr, StructField,
};
use crate::CelValue;

/// Accumulator variable name used by macro expansions.
pub const ACCUMULATOR_VAR: &str = "@result";

/// Allocates node ids while building expressions.
#[derive(Debug)]
pub struct ExprFactory {
    next_id: i64,
}

impl Default for ExprFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl ExprFactory {
    pub fn new() -> Self {
        Self { next_id: 1 }
    }

    /// Allocate the next node id.
    pub fn next_id(&mut self) -> i64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn expr(&mut self, kind: ExprKind) -> Expr {
        Expr::new(self.next_id(), kind)
    }

    // ==================== Literals ====================

    pub fn constant(&mut self, value: CelValue) -> Expr {
        self.expr(ExprKind::Constant(value))
    }

    pub fn null(&mut self) -> Expr {
        self.constant(CelValue::Null)
    }

    pub fn bool(&mut self, value: bool) -> Expr {
        self.constant(CelValue::Bool(value))
    }

    pub fn int(&mut self, value: i64) -> Expr {
        self.constant(CelValue::Int(value))
    }

    pub fn uint(&mut self, value: u64) -> Expr {
        self.constant(CelValue::UInt(value))
    }

    pub fn double(&mut self, value: f64) -> Expr {
        self.constant(CelValue::Double(value))
    }

    pub fn string(&mut self, value: impl Into<String>) -> Expr {
        self.constant(CelValue::String(value.into()))
    }

    pub fn bytes(&mut self, value: impl Into<Vec<u8>>) -> Expr {
        self.constant(CelValue::Bytes(value.into()))
    }

    // ==================== References ====================

    pub fn ident(&mut self, name: impl Into<String>) -> Expr {
        self.expr(ExprKind::Ident(IdentExpr::new(name)))
    }

    pub fn select(&mut self, operand: Expr, field: impl Into<String>) -> Expr {
        self.expr(ExprKind::Select(SelectExpr {
            operand: Box::new(operand),
            field: field.into(),
            test_only: false,
        }))
    }

    /// `has(operand.field)`
    pub fn presence_test(&mut self, operand: Expr, field: impl Into<String>) -> Expr {
        self.expr(ExprKind::Select(SelectExpr {
            operand: Box::new(operand),
            field: field.into(),
            test_only: true,
        }))
    }

    /// Build a select chain from a dotted path, e.g. `a.b.c`.
    pub fn qualified(&mut self, path: &str) -> Expr {
        let (prefix, rest) = match path.strip_prefix('.') {
            Some(rest) => (".", rest),
            None => ("", path),
        };
        let mut segments = rest.split('.');
        let root = format!("{}{}", prefix, segments.next().unwrap_or_default());
        let mut expr = self.ident(root);
        for segment in segments {
            expr = self.select(expr, segment);
        }
        expr
    }

    // ==================== Calls ====================

    pub fn call(&mut self, function: impl Into<String>, args: Vec<Expr>) -> Expr {
        self.expr(ExprKind::Call(CallExpr {
            function: function.into(),
            target: None,
            args,
        }))
    }

    pub fn member_call(
        &mut self,
        function: impl Into<String>,
        target: Expr,
        args: Vec<Expr>,
    ) -> Expr {
        self.expr(ExprKind::Call(CallExpr {
            function: function.into(),
            target: Some(Box::new(target)),
            args,
        }))
    }

    /// `operand.?field`
    pub fn optional_select(&mut self, operand: Expr, field: impl Into<String>) -> Expr {
        let field = self.string(field);
        self.call("_?._", vec![operand, field])
    }

    // ==================== Aggregates ====================

    pub fn list(&mut self, elements: Vec<Expr>) -> Expr {
        let elements = elements
            .into_iter()
            .map(|expr| ListElement {
                expr,
                optional: false,
            })
            .collect();
        self.expr(ExprKind::List(ListExpr { elements }))
    }

    pub fn list_with_elements(&mut self, elements: Vec<ListElement>) -> Expr {
        self.expr(ExprKind::List(ListExpr { elements }))
    }

    pub fn map_entry(&mut self, key: Expr, value: Expr, optional: bool) -> MapEntry {
        MapEntry {
            id: self.next_id(),
            key,
            value,
            optional,
        }
    }

    pub fn map(&mut self, entries: Vec<(Expr, Expr)>) -> Expr {
        let entries = entries
            .into_iter()
            .map(|(key, value)| self.map_entry(key, value, false))
            .collect();
        self.expr(ExprKind::Map(MapExpr { entries }))
    }

    pub fn map_with_entries(&mut self, entries: Vec<MapEntry>) -> Expr {
        self.expr(ExprKind::Map(MapExpr { entries }))
    }

    pub fn field(&mut self, name: impl Into<String>, value: Expr, optional: bool) -> StructField {
        StructField {
            id: self.next_id(),
            name: name.into(),
            value,
            optional,
        }
    }

    pub fn structure(&mut self, name: impl Into<String>, fields: Vec<StructField>) -> Expr {
        self.expr(ExprKind::Struct(StructExpr {
            name: name.into(),
            fields,
        }))
    }

    // ==================== Comprehensions ====================

    #[allow(clippy::too_many_arguments)]
    pub fn comprehension(
        &mut self,
        iter_var: impl Into<String>,
        iter_var2: Option<String>,
        iter_range: Expr,
        accu_var: impl Into<String>,
        accu_init: Expr,
        loop_condition: Expr,
        loop_step: Expr,
        result: Expr,
    ) -> Expr {
        self.expr(ExprKind::Comprehension(Box::new(ComprehensionExpr {
            iter_var: iter_var.into(),
            iter_var2,
            iter_range,
            accu_var: accu_var.into(),
            accu_init,
            loop_condition,
            loop_step,
            result,
        })))
    }

    /// Expansion of `range.map(var, transform)`.
    pub fn map_macro(
        &mut self,
        range: Expr,
        var: &str,
        transform: impl FnOnce(&mut Self) -> Expr,
    ) -> Expr {
        let accu_init = self.list(Vec::new());
        let condition = self.bool(true);
        let accu = self.ident(ACCUMULATOR_VAR);
        let mapped = transform(self);
        let mapped = self.list(vec![mapped]);
        let step = self.call("_+_", vec![accu, mapped]);
        let result = self.ident(ACCUMULATOR_VAR);
        self.comprehension(var, None, range, ACCUMULATOR_VAR, accu_init, condition, step, result)
    }

    /// Expansion of `range.all(var, predicate)`.
    pub fn all_macro(
        &mut self,
        range: Expr,
        var: &str,
        predicate: impl FnOnce(&mut Self) -> Expr,
    ) -> Expr {
        let accu_init = self.bool(true);
        let accu = self.ident(ACCUMULATOR_VAR);
        let condition = self.call("@not_strictly_false", vec![accu]);
        let accu = self.ident(ACCUMULATOR_VAR);
        let predicate = predicate(self);
        let step = self.call("_&&_", vec![accu, predicate]);
        let result = self.ident(ACCUMULATOR_VAR);
        self.comprehension(var, None, range, ACCUMULATOR_VAR, accu_init, condition, step, result)
    }
}
