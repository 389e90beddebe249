//! Common types for the CEL type checker: type system, values, AST, and declarations.
//!
//! This crate provides the foundational types shared by the checker and its hosts:
//!
//! - **Type System**: `CelType` for representing CEL types with parameterized
//!   types like `list<T>`, `map<K, V>`, and `type(T)`.
//! - **Values**: `CelValue` for representing constant values.
//! - **AST**: the id-keyed expression tree (`Expr`, `ExprKind`), source positions,
//!   and the stepped pre/post-order traversal used by the checker.
//! - **Declarations**: `FunctionDecl`, `OverloadDecl`, `VariableDecl` for
//!   defining the type environment.
//! - **Type lookup**: `ProtoTypeRegistry` over a protobuf descriptor pool and the
//!   pluggable `TypeProvider` trait.

use std::fmt;
use std::sync::Arc;

mod ast;
pub use ast::{
    Ast, CallExpr, ComprehensionExpr, Expr, ExprKind, IdentExpr, ListElement, ListExpr, MapEntry,
    MapExpr, Reference, SelectExpr, SourceInfo, SourceLocation, StructExpr, StructField,
};

mod factory;
pub use factory::{ExprFactory, ACCUMULATOR_VAR};

mod traversal;
pub use traversal::{AstTraversal, AstVisitor, ComprehensionArg};

mod decls;
pub use decls::{DeclError, FunctionDecl, OverloadDecl, VariableDecl};

pub mod proto_types;
pub use proto_types::{proto_message_to_cel_type, ProtoTypeRegistry};

pub mod type_provider;
pub use type_provider::{EnumConstant, StructTypeField, TypeProvider, TypeProviderError};

// ==================== CelValue ====================

/// A literal known at check time.
///
/// Constants carry these, and so do references that resolve to enum values.
#[derive(Debug, Clone, PartialEq)]
pub enum CelValue {
    /// `null`
    Null,
    /// `true` or `false`
    Bool(bool),
    /// `42`
    Int(i64),
    /// `42u`
    UInt(u64),
    /// `4.2`
    Double(f64),
    /// `"text"`
    String(String),
    /// `b"raw"`
    Bytes(Vec<u8>),
}

impl CelValue {
    /// The type a constant of this value checks to.
    pub fn cel_type(&self) -> CelType {
        match self {
            CelValue::Null => CelType::Null,
            CelValue::Bool(_) => CelType::Bool,
            CelValue::Int(_) => CelType::Int,
            CelValue::UInt(_) => CelType::UInt,
            CelValue::Double(_) => CelType::Double,
            CelValue::String(_) => CelType::String,
            CelValue::Bytes(_) => CelType::Bytes,
        }
    }
}

impl fmt::Display for CelValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CelValue::Null => f.write_str("null"),
            CelValue::Bool(v) => write!(f, "{v}"),
            CelValue::Int(v) => write!(f, "{v}"),
            CelValue::UInt(v) => write!(f, "{v}u"),
            CelValue::Double(v) => write!(f, "{v}"),
            CelValue::String(v) => write!(f, "{v:?}"),
            CelValue::Bytes(v) => write!(f, "b{:?}", String::from_utf8_lossy(v)),
        }
    }
}

// ==================== CelType ====================

/// Prefix of type parameter names allocated by the checker during inference.
pub const TYPE_VAR_PREFIX: &str = "T%";

/// CEL types as seen by the type checker.
///
/// Equality is structural: two parameterized types are equal when their kind,
/// name and parameter lists match recursively.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CelType {
    // ==================== Primitives ====================
    /// `bool`
    Bool,
    /// `int`, a signed 64-bit integer
    Int,
    /// `uint`, an unsigned 64-bit integer
    UInt,
    /// `double`, a 64-bit float
    Double,
    /// `string` of Unicode code points
    String,
    /// `bytes`
    Bytes,

    // ==================== Collections ====================
    /// `list<E>`
    List(Arc<CelType>),
    /// `map<K, V>`
    Map(Arc<CelType>, Arc<CelType>),

    // ==================== Time ====================
    /// `timestamp`, from `google.protobuf.Timestamp`
    Timestamp,
    /// `duration`, from `google.protobuf.Duration`
    Duration,

    // ==================== Special Types ====================
    /// The type of the `null` literal.
    Null,
    /// Checks against anything; values are inspected at runtime.
    Dyn,
    /// `google.protobuf.Any`. Treated like `dyn` for assignability.
    Any,
    /// The type of a type expression, `type(T)`.
    Type(Arc<CelType>),

    // ==================== Named Types ====================
    /// A message, by fully qualified name.
    Message(Arc<str>),
    /// An enum, by fully qualified name. Enum values check as `int`.
    Enum(Arc<str>),
    /// A host-defined type such as `optional_type` or `vector<T>`.
    Opaque {
        name: Arc<str>,
        params: Arc<[CelType]>,
    },

    // ==================== Inference ====================
    /// A declared parameter (`A`) or an inference variable (`T%3`).
    TypeParam(Arc<str>),
    /// A protobuf wrapper such as `google.protobuf.Int64Value`, which also admits `null`.
    Wrapper(Arc<CelType>),
    /// `optional<T>`
    Optional(Arc<CelType>),
    /// Assigned to subexpressions that failed to check.
    Error,
}

// ==================== Constructors ====================

impl CelType {
    /// ```
    /// use cel_core_common::CelType;
    /// let names = CelType::list(CelType::String);
    /// assert_eq!(names.to_string(), "list<string>");
    /// ```
    pub fn list(elem: CelType) -> Self {
        CelType::List(Arc::new(elem))
    }

    /// ```
    /// use cel_core_common::CelType;
    /// let scores = CelType::map(CelType::String, CelType::Double);
    /// assert_eq!(scores.to_string(), "map<string, double>");
    /// ```
    pub fn map(key: CelType, value: CelType) -> Self {
        CelType::Map(Arc::new(key), Arc::new(value))
    }

    /// `type(inner)`
    pub fn type_of(inner: CelType) -> Self {
        CelType::Type(Arc::new(inner))
    }

    pub fn message(name: &str) -> Self {
        CelType::Message(Arc::from(name))
    }

    pub fn enum_type(name: &str) -> Self {
        CelType::Enum(Arc::from(name))
    }

    pub fn opaque(name: &str, params: &[CelType]) -> Self {
        CelType::Opaque {
            name: Arc::from(name),
            params: Arc::from(params),
        }
    }

    pub fn type_param(name: &str) -> Self {
        CelType::TypeParam(Arc::from(name))
    }

    pub fn wrapper(inner: CelType) -> Self {
        CelType::Wrapper(Arc::new(inner))
    }

    /// ```
    /// use cel_core_common::CelType;
    /// let maybe = CelType::optional(CelType::Bytes);
    /// assert_eq!(maybe.to_string(), "optional<bytes>");
    /// ```
    pub fn optional(inner: CelType) -> Self {
        CelType::Optional(Arc::new(inner))
    }
}

// ==================== Type Properties ====================

impl CelType {
    /// Returns true for `dyn`, `any` and `error`, which are assignable to and from anything.
    pub fn is_wildcard(&self) -> bool {
        matches!(self, CelType::Dyn | CelType::Any | CelType::Error)
    }

    /// Returns true for types that historically accepted `null` assignments.
    pub fn is_legacy_nullable(&self) -> bool {
        matches!(
            self,
            CelType::Message(_)
                | CelType::Duration
                | CelType::Timestamp
                | CelType::Any
                | CelType::Opaque { .. }
                | CelType::Optional(_)
        )
    }

    /// Returns true if this is a type parameter allocated during inference (`T%n`).
    pub fn is_type_var(&self) -> bool {
        matches!(self, CelType::TypeParam(name) if name.starts_with(TYPE_VAR_PREFIX))
    }

    /// The type parameters of this type, in declaration order.
    pub fn parameters(&self) -> Vec<&CelType> {
        match self {
            CelType::List(elem) => vec![elem.as_ref()],
            CelType::Map(key, val) => vec![key.as_ref(), val.as_ref()],
            CelType::Type(inner) | CelType::Wrapper(inner) | CelType::Optional(inner) => {
                vec![inner.as_ref()]
            }
            CelType::Opaque { params, .. } => params.iter().collect(),
            _ => Vec::new(),
        }
    }

    /// Rebuild this type with every direct parameter replaced by `f(param)`.
    pub fn map_parameters(&self, mut f: impl FnMut(&CelType) -> CelType) -> CelType {
        match self {
            CelType::List(elem) => CelType::list(f(elem)),
            CelType::Map(key, val) => CelType::map(f(key), f(val)),
            CelType::Type(inner) => CelType::type_of(f(inner)),
            CelType::Wrapper(inner) => CelType::wrapper(f(inner)),
            CelType::Optional(inner) => CelType::optional(f(inner)),
            CelType::Opaque { name, params } => CelType::Opaque {
                name: name.clone(),
                params: params.iter().map(&mut f).collect(),
            },
            other => other.clone(),
        }
    }

    /// Returns true when both types share a kind and, for named kinds, a name.
    ///
    /// Parameters are not compared.
    pub fn same_kind_and_name(&self, other: &CelType) -> bool {
        match (self, other) {
            (CelType::Message(a), CelType::Message(b))
            | (CelType::Enum(a), CelType::Enum(b))
            | (CelType::TypeParam(a), CelType::TypeParam(b)) => a == b,
            (CelType::Opaque { name: a, .. }, CelType::Opaque { name: b, .. }) => a == b,
            _ => std::mem::discriminant(self) == std::mem::discriminant(other),
        }
    }
}

// ==================== Display ====================

impl CelType {
    /// The name used for this type in issue messages.
    pub fn display_name(&self) -> String {
        let simple = match self {
            CelType::Bool => "bool",
            CelType::Int => "int",
            CelType::UInt => "uint",
            CelType::Double => "double",
            CelType::String => "string",
            CelType::Bytes => "bytes",
            CelType::Timestamp => "timestamp",
            CelType::Duration => "duration",
            CelType::Null => "null",
            CelType::Dyn => "dyn",
            CelType::Any => "any",
            CelType::Error => "error",
            CelType::Message(name) | CelType::Enum(name) | CelType::TypeParam(name) => &**name,
            CelType::List(elem) => return format!("list<{elem}>"),
            CelType::Map(key, val) => return format!("map<{key}, {val}>"),
            CelType::Type(inner) => return format!("type({inner})"),
            CelType::Wrapper(inner) => return format!("wrapper<{inner}>"),
            CelType::Optional(inner) => return format!("optional<{inner}>"),
            CelType::Opaque { name, params } if params.is_empty() => &**name,
            CelType::Opaque { name, params } => {
                let params: Vec<String> = params.iter().map(CelType::display_name).collect();
                return format!("{name}<{}>", params.join(", "));
            }
        };
        simple.to_string()
    }
}

impl fmt::Display for CelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display_name())
    }
}
