//! Canonical CEL expression tree.
//!
//! Every node carries a stable `id` that is unique within one `Ast`. The checker
//! keys all of its side tables by this id, and the checked output (`type_map`,
//! `reference_map`) is keyed the same way.

use std::collections::HashMap;

use crate::{CelType, CelValue};

/// An expression node.
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    /// Unique node id.
    pub id: i64,
    /// The node payload.
    pub kind: ExprKind,
}

impl Expr {
    /// Create an expression node.
    pub fn new(id: i64, kind: ExprKind) -> Self {
        Self { id, kind }
    }
}

/// The kinds of expression nodes.
#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    /// A node whose kind was never set. Checking one is an internal failure.
    Unspecified,
    /// Literal constant.
    Constant(CelValue),
    /// Identifier. A leading `.` marks a root-relative name.
    Ident(IdentExpr),
    /// Field selection or presence test.
    Select(SelectExpr),
    /// Function call, operator, or receiver-style method call.
    Call(CallExpr),
    /// List literal.
    List(ListExpr),
    /// Map literal.
    Map(MapExpr),
    /// Message construction.
    Struct(StructExpr),
    /// Expanded macro loop.
    Comprehension(Box<ComprehensionExpr>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct IdentExpr {
    pub name: String,
}

impl IdentExpr {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectExpr {
    pub operand: Box<Expr>,
    pub field: String,
    /// True for `has(operand.field)`.
    pub test_only: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CallExpr {
    pub function: String,
    /// Receiver for `target.function(args)` calls.
    pub target: Option<Box<Expr>>,
    pub args: Vec<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ListElement {
    pub expr: Expr,
    /// `[?x]`: the element is included only when the optional is present.
    pub optional: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ListExpr {
    pub elements: Vec<ListElement>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MapEntry {
    pub id: i64,
    pub key: Expr,
    pub value: Expr,
    pub optional: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MapExpr {
    pub entries: Vec<MapEntry>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StructField {
    pub id: i64,
    pub name: String,
    pub value: Expr,
    pub optional: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StructExpr {
    /// Message name as written; may be relative to the container.
    pub name: String,
    pub fields: Vec<StructField>,
}

/// A fold over a list or map.
///
/// Sub-expressions are visited in field order: range, init, condition, step, result.
#[derive(Debug, Clone, PartialEq)]
pub struct ComprehensionExpr {
    pub iter_var: String,
    /// Second iteration variable of two-variable comprehensions.
    pub iter_var2: Option<String>,
    pub iter_range: Expr,
    pub accu_var: String,
    pub accu_init: Expr,
    pub loop_condition: Expr,
    pub loop_step: Expr,
    pub result: Expr,
}

// ==================== Source Positions ====================

/// A 1-based line and 0-based column, or unknown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceLocation {
    pub line: i32,
    pub column: i32,
}

impl SourceLocation {
    /// A location with no position information.
    pub const UNKNOWN: SourceLocation = SourceLocation { line: -1, column: -1 };

    pub fn new(line: i32, column: i32) -> Self {
        Self { line, column }
    }

    pub fn is_unknown(&self) -> bool {
        self.line < 1 || self.column < 0
    }
}

impl Default for SourceLocation {
    fn default() -> Self {
        Self::UNKNOWN
    }
}

/// Position information for an expression.
///
/// `line_offsets` holds, for every line, the code point offset one past its
/// terminator; the last entry closes the final line. `positions` maps node ids
/// to absolute code point offsets.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceInfo {
    pub line_offsets: Vec<i32>,
    pub positions: HashMap<i64, i32>,
}

impl SourceInfo {
    /// Compute line offsets for `source`. Node positions are added separately.
    ///
    /// Offsets are `i32`; text past `i32::MAX` code points gets no lines.
    pub fn from_source(source: &str) -> Self {
        Self {
            line_offsets: line_offsets(source, i32::MAX),
            positions: HashMap::new(),
        }
    }

    /// Record the absolute offset of a node.
    pub fn set_position(&mut self, id: i64, offset: i32) {
        self.positions.insert(id, offset);
    }

    /// Resolve a node id to a line and column.
    ///
    /// Returns `SourceLocation::UNKNOWN` when the node has no position or the
    /// line table is not strictly increasing.
    pub fn location(&self, id: i64) -> SourceLocation {
        let Some(&absolute) = self.positions.get(&id) else {
            return SourceLocation::UNKNOWN;
        };
        if absolute < 0 {
            return SourceLocation::UNKNOWN;
        }

        let mut line_start = 0;
        for (idx, &next_offset) in self.line_offsets.iter().enumerate() {
            if next_offset <= line_start {
                return SourceLocation::UNKNOWN;
            }
            if absolute < next_offset {
                return SourceLocation::new(idx as i32 + 1, absolute - line_start);
            }
            line_start = next_offset;
        }
        SourceLocation::UNKNOWN
    }
}

// ==================== Checked AST ====================

/// A resolved reference recorded by the checker.
#[derive(Debug, Clone, PartialEq)]
pub struct Reference {
    /// Canonical, fully qualified name.
    pub name: String,
    /// Candidate overload ids for function references.
    pub overload_ids: Vec<String>,
    /// Constant value, for enum constants and other valued declarations.
    pub value: Option<CelValue>,
}

impl Reference {
    pub fn variable(name: impl Into<String>, value: Option<CelValue>) -> Self {
        Self {
            name: name.into(),
            overload_ids: Vec::new(),
            value,
        }
    }

    pub fn function(name: impl Into<String>, overload_ids: Vec<String>) -> Self {
        Self {
            name: name.into(),
            overload_ids,
            value: None,
        }
    }
}

/// An expression plus its source information and, once checked, its annotations.
#[derive(Debug, Clone, PartialEq)]
pub struct Ast {
    pub expr: Expr,
    pub source_info: SourceInfo,
    pub reference_map: HashMap<i64, Reference>,
    pub type_map: HashMap<i64, CelType>,
    pub is_checked: bool,
}

impl Ast {
    /// Wrap an unchecked expression.
    pub fn new(expr: Expr, source_info: SourceInfo) -> Self {
        Self {
            expr,
            source_info,
            reference_map: HashMap::new(),
            type_map: HashMap::new(),
            is_checked: false,
        }
    }

    /// Returns the root expression.
    pub fn root_expr(&self) -> &Expr {
        &self.expr
    }

    pub fn is_checked(&self) -> bool {
        self.is_checked
    }

    /// Type of the root expression, if checked.
    pub fn result_type(&self) -> Option<&CelType> {
        self.type_map.get(&self.expr.id)
    }

    pub fn get_type(&self, id: i64) -> Option<&CelType> {
        self.type_map.get(&id)
    }

    pub fn get_reference(&self, id: i64) -> Option<&Reference> {
        self.reference_map.get(&id)
    }
}

impl From<Expr> for Ast {
    fn from(expr: Expr) -> Self {
        Ast::new(expr, SourceInfo::default())
    }
}

/// Line offsets of `source`, counting at most `max_offset` code points.
fn line_offsets(source: &str, max_offset: i32) -> Vec<i32> {
    let mut offsets = Vec::new();
    let mut count = 0i32;
    for ch in source.chars() {
        if count == max_offset {
            break;
        }
        count += 1;
        if ch == '\n' {
            offsets.push(count);
        }
    }
    offsets.push(count.saturating_add(1));
    offsets
}
