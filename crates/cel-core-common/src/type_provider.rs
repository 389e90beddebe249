//! Pluggable type sources consulted by the checker.
//!
//! Every lookup separates "not found" (`Ok(None)`) from a failure of the
//! provider itself (`Err`), which aborts checking.

use std::fmt;

use thiserror::Error;

use crate::CelType;

/// Errors produced by type providers and the descriptor registry.
#[derive(Debug, Error)]
pub enum TypeProviderError {
    #[error("failed to decode file descriptor set: {0}")]
    Decode(#[from] prost::DecodeError),
    #[error("invalid descriptor set: {0}")]
    Descriptor(#[from] prost_reflect::DescriptorError),
    #[error("type provider failed to resolve '{name}': {message}")]
    Lookup { name: String, message: String },
}

/// A field of a struct type.
#[derive(Debug, Clone, PartialEq)]
pub struct StructTypeField {
    pub name: String,
    /// Declared type. Enum fields keep their enum type here.
    pub cel_type: CelType,
}

impl StructTypeField {
    pub fn new(name: impl Into<String>, cel_type: CelType) -> Self {
        Self {
            name: name.into(),
            cel_type,
        }
    }
}

/// A named value of an enum type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumConstant {
    /// Fully qualified enum type name.
    pub type_name: String,
    pub value_name: String,
    pub number: i64,
}

/// A source of struct, enum, and opaque type information.
pub trait TypeProvider: Send + Sync + fmt::Debug {
    /// Resolve a fully qualified type name.
    fn find_type(&self, name: &str) -> Result<Option<CelType>, TypeProviderError>;

    /// Resolve `value` within the enum `type_name`.
    fn find_enum_constant(
        &self,
        type_name: &str,
        value: &str,
    ) -> Result<Option<EnumConstant>, TypeProviderError>;

    /// Resolve a field of the struct `type_name`.
    fn find_struct_field(
        &self,
        type_name: &str,
        field: &str,
    ) -> Result<Option<StructTypeField>, TypeProviderError>;
}
