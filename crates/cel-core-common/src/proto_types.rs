//! Protobuf-backed type lookup.
//!
//! Messages check as `CelType::Message`, enum values as `int`, and the
//! well-known types as their CEL counterparts (`timestamp`, `wrapper<int>`, ...).

use prost::Message;
use prost_reflect::{DescriptorPool, FieldDescriptor, Kind, MessageDescriptor};

use crate::type_provider::{EnumConstant, StructTypeField, TypeProvider, TypeProviderError};
use crate::CelType;

const NULL_VALUE: &str = "google.protobuf.NullValue";

/// A [`TypeProvider`] over a `prost_reflect::DescriptorPool`.
///
/// Extension fields are found by their fully qualified name.
///
/// Cloning is cheap; clones share the underlying pool.
#[derive(Debug, Clone)]
pub struct ProtoTypeRegistry {
    pool: DescriptorPool,
}

impl ProtoTypeRegistry {
    /// Create a registry over the global pool, which carries the well-known types.
    pub fn new() -> Self {
        Self {
            pool: DescriptorPool::global(),
        }
    }

    pub fn from_pool(pool: DescriptorPool) -> Self {
        Self { pool }
    }

    /// Load an encoded `FileDescriptorSet`, e.g. the output of `protoc --descriptor_set_out`.
    pub fn add_file_descriptor_set(&mut self, bytes: &[u8]) -> Result<(), TypeProviderError> {
        let fds = prost_reflect::prost_types::FileDescriptorSet::decode(bytes)?;
        self.pool.add_file_descriptor_set(fds)?;
        Ok(())
    }

    pub fn get_message(&self, name: &str) -> Option<MessageDescriptor> {
        self.pool.get_message_by_name(name)
    }

    /// Resolve a message or enum name to its CEL type.
    ///
    /// Well-known type names resolve even when the pool does not carry them.
    pub fn resolve_type(&self, name: &str) -> Option<CelType> {
        if let Some(msg) = self.get_message(name) {
            return Some(proto_message_to_cel_type(msg.full_name()));
        }
        if let Some(enum_desc) = self.pool.get_enum_by_name(name) {
            return Some(enum_to_cel_type(enum_desc.full_name()));
        }
        well_known_type(name)
    }

    /// Look up `field_name` on a message, falling back to extensions by full name.
    pub fn get_field(&self, message_name: &str, field_name: &str) -> Option<StructTypeField> {
        let message = self.get_message(message_name)?;
        if let Some(field) = message.get_field_by_name(field_name) {
            return Some(StructTypeField::new(field.name(), field_to_cel_type(&field)));
        }

        let extension = self.pool.get_extension_by_name(field_name)?;
        if extension.containing_message().full_name() != message.full_name() {
            return None;
        }
        let base_type = kind_to_cel_type(extension.kind());
        let cel_type = if extension.is_list() {
            CelType::list(base_type)
        } else {
            base_type
        };
        Some(StructTypeField::new(extension.full_name(), cel_type))
    }

    /// The number of `enum_name.value_name`.
    pub fn get_enum_value(&self, enum_name: &str, value_name: &str) -> Option<i32> {
        let enum_desc = self.pool.get_enum_by_name(enum_name)?;
        let value = enum_desc.get_value_by_name(value_name)?;
        Some(value.number())
    }

    /// Returns true for well-known message names that may be constructed with
    /// struct literal syntax even though they do not check as messages.
    pub fn is_well_known_message(name: &str) -> bool {
        well_known_type(name).is_some() && name != NULL_VALUE
    }

    pub fn pool(&self) -> &DescriptorPool {
        &self.pool
    }
}

impl Default for ProtoTypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeProvider for ProtoTypeRegistry {
    fn find_type(&self, name: &str) -> Result<Option<CelType>, TypeProviderError> {
        Ok(self.resolve_type(name))
    }

    fn find_enum_constant(
        &self,
        type_name: &str,
        value: &str,
    ) -> Result<Option<EnumConstant>, TypeProviderError> {
        Ok(self
            .get_enum_value(type_name, value)
            .map(|number| EnumConstant {
                type_name: type_name.to_string(),
                value_name: value.to_string(),
                number: i64::from(number),
            }))
    }

    fn find_struct_field(
        &self,
        type_name: &str,
        field: &str,
    ) -> Result<Option<StructTypeField>, TypeProviderError> {
        Ok(self.get_field(type_name, field))
    }
}

fn field_to_cel_type(field: &FieldDescriptor) -> CelType {
    if field.is_map() {
        // Map fields are repeated entries of a synthetic key/value message.
        if let Kind::Message(map_entry) = field.kind() {
            let key_type = map_entry
                .get_field_by_name("key")
                .map(|f| kind_to_cel_type(f.kind()))
                .unwrap_or(CelType::Dyn);
            let value_type = map_entry
                .get_field_by_name("value")
                .map(|f| kind_to_cel_type(f.kind()))
                .unwrap_or(CelType::Dyn);
            return CelType::map(key_type, value_type);
        }
        return CelType::map(CelType::Dyn, CelType::Dyn);
    }

    let base_type = kind_to_cel_type(field.kind());
    if field.is_list() {
        CelType::list(base_type)
    } else {
        base_type
    }
}

fn kind_to_cel_type(kind: Kind) -> CelType {
    match kind {
        Kind::Bool => CelType::Bool,
        Kind::Int32 | Kind::Sint32 | Kind::Sfixed32 | Kind::Int64 | Kind::Sint64 | Kind::Sfixed64 => {
            CelType::Int
        }
        Kind::Uint32 | Kind::Fixed32 | Kind::Uint64 | Kind::Fixed64 => CelType::UInt,
        Kind::Float | Kind::Double => CelType::Double,
        Kind::String => CelType::String,
        Kind::Bytes => CelType::Bytes,
        Kind::Message(msg) => proto_message_to_cel_type(msg.full_name()),
        Kind::Enum(enum_desc) => enum_to_cel_type(enum_desc.full_name()),
    }
}

fn enum_to_cel_type(full_name: &str) -> CelType {
    if full_name == NULL_VALUE {
        CelType::Null
    } else {
        CelType::enum_type(full_name)
    }
}

/// CEL types of the well-known protobuf types, by full name.
fn well_known_type(full_name: &str) -> Option<CelType> {
    let cel_type = match full_name {
        "google.protobuf.Timestamp" => CelType::Timestamp,
        "google.protobuf.Duration" => CelType::Duration,

        "google.protobuf.BoolValue" => CelType::wrapper(CelType::Bool),
        "google.protobuf.Int32Value" | "google.protobuf.Int64Value" => {
            CelType::wrapper(CelType::Int)
        }
        "google.protobuf.UInt32Value" | "google.protobuf.UInt64Value" => {
            CelType::wrapper(CelType::UInt)
        }
        "google.protobuf.FloatValue" | "google.protobuf.DoubleValue" => {
            CelType::wrapper(CelType::Double)
        }
        "google.protobuf.StringValue" => CelType::wrapper(CelType::String),
        "google.protobuf.BytesValue" => CelType::wrapper(CelType::Bytes),

        "google.protobuf.Any" => CelType::Any,
        "google.protobuf.Value" => CelType::Dyn,
        "google.protobuf.Struct" => CelType::map(CelType::String, CelType::Dyn),
        "google.protobuf.ListValue" => CelType::list(CelType::Dyn),
        NULL_VALUE => CelType::Null,
        _ => return None,
    };
    Some(cel_type)
}

/// The CEL type of a message name.
///
/// Well-known types map to their CEL counterparts (`timestamp`, `wrapper<int>`,
/// `any`, ...); any other message is `CelType::Message(name)`.
pub fn proto_message_to_cel_type(full_name: &str) -> CelType {
    well_known_type(full_name).unwrap_or_else(|| CelType::message(full_name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use prost_reflect::prost_types::{
        field_descriptor_proto::{Label, Type},
        DescriptorProto, EnumDescriptorProto, EnumValueDescriptorProto, FieldDescriptorProto,
        FileDescriptorProto, FileDescriptorSet,
    };

    fn field(name: &str, number: i32, ty: Type, type_name: Option<&str>) -> FieldDescriptorProto {
        FieldDescriptorProto {
            name: Some(name.to_string()),
            number: Some(number),
            label: Some(Label::Optional as i32),
            r#type: Some(ty as i32),
            type_name: type_name.map(str::to_string),
            ..Default::default()
        }
    }

    fn test_file_set() -> FileDescriptorSet {
        let mut tags = field("tags", 3, Type::String, None);
        tags.label = Some(Label::Repeated as i32);

        let extension = FieldDescriptorProto {
            extendee: Some(".test.v1.Account".to_string()),
            ..field("nickname", 100, Type::String, None)
        };

        FileDescriptorSet {
            file: vec![FileDescriptorProto {
                name: Some("test/v1/account.proto".to_string()),
                package: Some("test.v1".to_string()),
                syntax: Some("proto2".to_string()),
                message_type: vec![DescriptorProto {
                    name: Some("Account".to_string()),
                    field: vec![
                        field("id", 1, Type::Int64, None),
                        field("state", 2, Type::Enum, Some(".test.v1.State")),
                        tags,
                    ],
                    extension_range: vec![
                        prost_reflect::prost_types::descriptor_proto::ExtensionRange {
                            start: Some(100),
                            end: Some(200),
                            ..Default::default()
                        },
                    ],
                    ..Default::default()
                }],
                enum_type: vec![EnumDescriptorProto {
                    name: Some("State".to_string()),
                    value: vec![
                        EnumValueDescriptorProto {
                            name: Some("UNKNOWN".to_string()),
                            number: Some(0),
                            ..Default::default()
                        },
                        EnumValueDescriptorProto {
                            name: Some("ACTIVE".to_string()),
                            number: Some(1),
                            ..Default::default()
                        },
                    ],
                    ..Default::default()
                }],
                extension: vec![extension],
                ..Default::default()
            }],
        }
    }

    fn registry() -> ProtoTypeRegistry {
        let pool = DescriptorPool::from_file_descriptor_set(test_file_set())
            .expect("valid descriptor set");
        ProtoTypeRegistry::from_pool(pool)
    }

    #[test]
    fn well_known_names() {
        assert_eq!(
            proto_message_to_cel_type("google.protobuf.Timestamp"),
            CelType::Timestamp
        );
        assert_eq!(
            proto_message_to_cel_type("google.protobuf.Int64Value"),
            CelType::wrapper(CelType::Int)
        );
        assert_eq!(proto_message_to_cel_type("google.protobuf.Any"), CelType::Any);
        assert_eq!(
            proto_message_to_cel_type("google.protobuf.Struct"),
            CelType::map(CelType::String, CelType::Dyn)
        );
    }

    #[test]
    fn other_messages_are_messages() {
        assert_eq!(
            proto_message_to_cel_type("acme.orders.Order"),
            CelType::message("acme.orders.Order")
        );
    }

    #[test]
    fn resolve_types_from_pool() {
        let registry = registry();
        assert_eq!(
            registry.resolve_type("test.v1.Account"),
            Some(CelType::message("test.v1.Account"))
        );
        assert_eq!(
            registry.resolve_type("test.v1.State"),
            Some(CelType::enum_type("test.v1.State"))
        );
        assert_eq!(
            registry.resolve_type("google.protobuf.Duration"),
            Some(CelType::Duration)
        );
        assert_eq!(registry.resolve_type("test.v1.Missing"), None);
    }

    #[test]
    fn field_types() {
        let registry = registry();
        assert_eq!(
            registry.get_field("test.v1.Account", "id").map(|f| f.cel_type),
            Some(CelType::Int)
        );
        assert_eq!(
            registry.get_field("test.v1.Account", "state").map(|f| f.cel_type),
            Some(CelType::enum_type("test.v1.State"))
        );
        assert_eq!(
            registry.get_field("test.v1.Account", "tags").map(|f| f.cel_type),
            Some(CelType::list(CelType::String))
        );
        assert!(registry.get_field("test.v1.Account", "missing").is_none());
    }

    #[test]
    fn extension_field_by_full_name() {
        let registry = registry();
        let field = registry
            .get_field("test.v1.Account", "test.v1.nickname")
            .expect("extension should resolve");
        assert_eq!(field.cel_type, CelType::String);
    }

    #[test]
    fn enum_constants() {
        let registry = registry();
        let constant = registry
            .find_enum_constant("test.v1.State", "ACTIVE")
            .unwrap()
            .unwrap();
        assert_eq!(constant.number, 1);
        assert!(registry
            .find_enum_constant("test.v1.State", "GONE")
            .unwrap()
            .is_none());
    }

    #[test]
    fn add_encoded_descriptor_set() {
        let mut registry = ProtoTypeRegistry::from_pool(DescriptorPool::new());
        let bytes = test_file_set().encode_to_vec();
        registry.add_file_descriptor_set(&bytes).unwrap();
        assert!(registry.get_message("test.v1.Account").is_some());

        assert!(matches!(
            registry.add_file_descriptor_set(&[0xff, 0xff]),
            Err(TypeProviderError::Decode(_))
        ));
    }
}
