//! Diagnostics and error types for type checking.
//!
//! Problems with the checked expression are reported as [`TypeCheckIssue`]s
//! and never abort checking. Failures of the checker itself, or of the
//! environment it consults, are [`CheckerError`]s.

use std::fmt;

use cel_core_common::{CelType, SourceLocation, TypeProviderError};
use thiserror::Error;

use crate::namespace::NamespaceError;

/// Severity of a reported issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    Error,
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "ERROR"),
            Severity::Warning => write!(f, "WARNING"),
        }
    }
}

/// A problem found in the checked expression.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeCheckIssue {
    pub severity: Severity,
    pub location: SourceLocation,
    /// Id of the offending node, or 0 when not tied to a node.
    pub expr_id: i64,
    pub kind: IssueKind,
}

impl TypeCheckIssue {
    /// Create an error-severity issue.
    pub fn error(location: SourceLocation, expr_id: i64, kind: IssueKind) -> Self {
        Self {
            severity: Severity::Error,
            location,
            expr_id,
            kind,
        }
    }

    /// Create a warning-severity issue.
    pub fn warning(location: SourceLocation, expr_id: i64, kind: IssueKind) -> Self {
        Self {
            severity: Severity::Warning,
            location,
            expr_id,
            kind,
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }

    /// Get the issue message.
    pub fn message(&self) -> String {
        self.kind.to_string()
    }
}

impl fmt::Display for TypeCheckIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.location.is_unknown() {
            write!(f, "{}: {}", self.severity, self.kind)
        } else {
            write!(
                f,
                "{}: {}:{}: {}",
                self.severity, self.location.line, self.location.column, self.kind
            )
        }
    }
}

/// The kind of problem reported by an issue.
#[derive(Debug, Clone, PartialEq)]
pub enum IssueKind {
    /// Reference to an undeclared variable, function, or type.
    UndeclaredReference {
        /// Container namespace (empty if none).
        container: String,
        /// The name that was not found.
        name: String,
    },

    /// No function overload matches the provided arguments.
    NoMatchingOverload {
        function: String,
        /// Argument types, receiver first for member calls.
        arg_types: Vec<CelType>,
    },

    /// An observed type is not assignable to the expected one.
    TypeMismatch { expected: CelType, actual: CelType },

    /// Field not found on a struct type.
    UndefinedField { type_name: String, field: String },

    /// A struct literal field value has the wrong type.
    FieldTypeMismatch {
        field: String,
        expected: CelType,
        actual: CelType,
    },

    /// Field selection on a type without fields.
    NotSelectable { operand: CelType },

    /// Comprehension over something other than a list or map.
    NotAComprehensionRange { range: CelType },

    /// Struct literal naming a type that is not a message.
    NotAMessageType { type_name: String },

    /// Map literal with a key type outside bool, int, uint, string.
    UnsupportedMapKey { key: CelType },

    /// Checking stopped after too many errors.
    TooManyErrors { limit: usize },
}

impl fmt::Display for IssueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IssueKind::UndeclaredReference { container, name } => write!(
                f,
                "undeclared reference to '{}' (in container '{}')",
                name, container
            ),
            IssueKind::NoMatchingOverload {
                function,
                arg_types,
            } => {
                let types: Vec<_> = arg_types.iter().map(|t| t.display_name()).collect();
                write!(
                    f,
                    "found no matching overload for '{}' applied to '({})'",
                    function,
                    types.join(", ")
                )
            }
            IssueKind::TypeMismatch { expected, actual } => write!(
                f,
                "expected type '{}' but found '{}'",
                expected.display_name(),
                actual.display_name()
            ),
            IssueKind::UndefinedField { type_name, field } => write!(
                f,
                "undefined field '{}' not found in struct '{}'",
                field, type_name
            ),
            IssueKind::FieldTypeMismatch {
                field,
                expected,
                actual,
            } => write!(
                f,
                "expected type of field '{}' is '{}' but provided type is '{}'",
                field,
                expected.display_name(),
                actual.display_name()
            ),
            IssueKind::NotSelectable { operand } => write!(
                f,
                "expression of type '{}' cannot be the operand of a select operation",
                operand.display_name()
            ),
            IssueKind::NotAComprehensionRange { range } => write!(
                f,
                "expression of type '{}' cannot be the range of a comprehension (must be list, map, or dynamic)",
                range.display_name()
            ),
            IssueKind::NotAMessageType { type_name } => {
                write!(f, "type '{}' does not support message creation", type_name)
            }
            IssueKind::UnsupportedMapKey { key } => {
                write!(f, "unsupported map key type: {}", key.display_name())
            }
            IssueKind::TooManyErrors { limit } => {
                write!(f, "maximum number of ErrorIssues exceeded: {}", limit)
            }
        }
    }
}

/// Failures that abort a check.
#[derive(Debug, Error)]
pub enum CheckerError {
    /// The checker reached a state its traversal should make impossible.
    #[error("internal checker error: {0}")]
    Internal(String),
    #[error("malformed expression {expr_id}: {message}")]
    MalformedExpression { expr_id: i64, message: String },
    #[error("maximum expression node count exceeded: {0}")]
    NodeBudgetExceeded(usize),
    #[error(transparent)]
    TypeProvider(#[from] TypeProviderError),
    #[error("invalid container: {0}")]
    InvalidContainer(#[from] NamespaceError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_undeclared_reference_message() {
        let kind = IssueKind::UndeclaredReference {
            container: "a.b".to_string(),
            name: "foo".to_string(),
        };
        assert_eq!(
            kind.to_string(),
            "undeclared reference to 'foo' (in container 'a.b')"
        );
    }

    #[test]
    fn test_no_matching_overload_message() {
        let kind = IssueKind::NoMatchingOverload {
            function: "_+_".to_string(),
            arg_types: vec![CelType::Int, CelType::String],
        };
        assert_eq!(
            kind.to_string(),
            "found no matching overload for '_+_' applied to '(int, string)'"
        );
    }

    #[test]
    fn test_field_type_mismatch_message() {
        let kind = IssueKind::FieldTypeMismatch {
            field: "id".to_string(),
            expected: CelType::Int,
            actual: CelType::String,
        };
        assert_eq!(
            kind.to_string(),
            "expected type of field 'id' is 'int' but provided type is 'string'"
        );
    }

    #[test]
    fn test_issue_display_with_location() {
        let issue = TypeCheckIssue::error(
            SourceLocation::new(1, 4),
            3,
            IssueKind::TypeMismatch {
                expected: CelType::Bool,
                actual: CelType::Int,
            },
        );
        assert_eq!(
            issue.to_string(),
            "ERROR: 1:4: expected type 'bool' but found 'int'"
        );
        assert!(issue.is_error());
    }

    #[test]
    fn test_issue_display_without_location() {
        let issue = TypeCheckIssue::warning(
            SourceLocation::UNKNOWN,
            2,
            IssueKind::UnsupportedMapKey {
                key: CelType::Double,
            },
        );
        assert_eq!(issue.to_string(), "WARNING: unsupported map key type: double");
        assert!(!issue.is_error());
    }

    #[test]
    fn test_checker_error_from_namespace() {
        let err: CheckerError = NamespaceError::LeadingDot(".a".to_string()).into();
        assert!(err.to_string().starts_with("invalid container"));
    }
}
