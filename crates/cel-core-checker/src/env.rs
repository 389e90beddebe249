//! Type environment for CEL type checking.
//!
//! The type environment contains variable declarations, function declarations,
//! and the type sources used during type checking. Environments may be nested:
//! a child sees everything its parent declares and can add to or replace it at
//! its own level without touching the parent.

use std::collections::HashMap;
use std::sync::Arc;

use cel_core_common::{
    CelType, CelValue, FunctionDecl, ProtoTypeRegistry, StructTypeField, TypeProvider,
    TypeProviderError, VariableDecl,
};

/// Type environment for CEL type checking (mirrors cel-go `checker.Env`).
///
/// The environment manages:
/// - Variable declarations with their types
/// - Function declarations with their overloads
/// - The descriptor pool and custom type providers
/// - Container namespace for qualified name resolution
/// - The expected type of the root expression, if any
#[derive(Debug, Clone)]
pub struct TypeCheckEnv {
    /// Descriptor pool consulted before any type provider.
    registry: ProtoTypeRegistry,
    /// Container namespace for qualified name resolution.
    container: String,
    /// Variable declarations indexed by name.
    variables: HashMap<String, VariableDecl>,
    /// Function declarations indexed by name.
    functions: HashMap<String, FunctionDecl>,
    /// Custom type sources in registration order.
    type_providers: Vec<Arc<dyn TypeProvider>>,
    expected_type: Option<CelType>,
    parent: Option<Arc<TypeCheckEnv>>,
}

impl TypeCheckEnv {
    /// Create an empty environment over the given descriptor registry.
    pub fn new(registry: ProtoTypeRegistry) -> Self {
        Self {
            registry,
            container: String::new(),
            variables: HashMap::new(),
            functions: HashMap::new(),
            type_providers: Vec::new(),
            expected_type: None,
            parent: None,
        }
    }

    /// Create an empty child environment of `parent`.
    ///
    /// The child shares the parent's descriptor registry and starts with its
    /// container and expected type.
    pub fn extend(parent: Arc<TypeCheckEnv>) -> Self {
        Self {
            registry: parent.registry.clone(),
            container: parent.container.clone(),
            variables: HashMap::new(),
            functions: HashMap::new(),
            type_providers: Vec::new(),
            expected_type: parent.expected_type.clone(),
            parent: Some(parent),
        }
    }

    // ==================== Configuration ====================

    /// Get the container namespace.
    pub fn container(&self) -> &str {
        &self.container
    }

    /// Set the container namespace for qualified name resolution.
    pub fn set_container(&mut self, container: impl Into<String>) {
        self.container = container.into();
    }

    pub fn expected_type(&self) -> Option<&CelType> {
        self.expected_type.as_ref()
    }

    pub fn set_expected_type(&mut self, expected_type: CelType) {
        self.expected_type = Some(expected_type);
    }

    pub fn parent(&self) -> Option<&TypeCheckEnv> {
        self.parent.as_deref()
    }

    pub fn registry(&self) -> &ProtoTypeRegistry {
        &self.registry
    }

    /// Register a type provider. Later registrations take precedence.
    pub fn add_type_provider(&mut self, provider: Arc<dyn TypeProvider>) {
        self.type_providers.push(provider);
    }

    // ==================== Declarations ====================

    /// Add a variable at this level unless one with the same name exists here.
    ///
    /// Returns false if the name was already declared at this level.
    pub fn insert_variable_if_absent(&mut self, decl: VariableDecl) -> bool {
        if self.variables.contains_key(&decl.name) {
            return false;
        }
        self.variables.insert(decl.name.clone(), decl);
        true
    }

    /// Add a variable at this level, replacing any existing one.
    pub fn insert_or_replace_variable(&mut self, decl: VariableDecl) {
        self.variables.insert(decl.name.clone(), decl);
    }

    /// Add a function at this level unless one with the same name exists here.
    ///
    /// Returns false if the name was already declared at this level.
    pub fn insert_function_if_absent(&mut self, decl: FunctionDecl) -> bool {
        if self.functions.contains_key(&decl.name) {
            return false;
        }
        self.functions.insert(decl.name.clone(), decl);
        true
    }

    /// Add a function at this level, replacing any existing one.
    pub fn insert_or_replace_function(&mut self, decl: FunctionDecl) {
        self.functions.insert(decl.name.clone(), decl);
    }

    /// Iterate over this environment and its ancestors, innermost first.
    fn levels(&self) -> impl Iterator<Item = &TypeCheckEnv> {
        std::iter::successors(Some(self), |env| env.parent.as_deref())
    }

    /// Look up a variable by exact name, searching parents on a miss.
    pub fn lookup_variable(&self, name: &str) -> Option<&VariableDecl> {
        self.levels().find_map(|env| env.variables.get(name))
    }

    /// Look up a function by exact name, searching parents on a miss.
    pub fn lookup_function(&self, name: &str) -> Option<&FunctionDecl> {
        self.levels().find_map(|env| env.functions.get(name))
    }

    // ==================== Type Lookup ====================

    /// Search every level, innermost first. Each level asks its descriptor
    /// registry, then its type providers from newest to oldest.
    fn find_in_type_sources<T>(
        &self,
        mut find: impl FnMut(&dyn TypeProvider) -> Result<Option<T>, TypeProviderError>,
    ) -> Result<Option<T>, TypeProviderError> {
        for env in self.levels() {
            if let Some(found) = find(&env.registry)? {
                return Ok(Some(found));
            }
            for provider in env.type_providers.iter().rev() {
                if let Some(found) = find(&**provider)? {
                    return Ok(Some(found));
                }
            }
        }
        Ok(None)
    }

    /// Resolve a fully qualified type name.
    pub fn lookup_type_name(&self, name: &str) -> Result<Option<CelType>, TypeProviderError> {
        self.find_in_type_sources(|source| source.find_type(name))
    }

    /// Resolve an enum value to an int-typed constant named `Enum.VALUE`.
    pub fn lookup_enum_constant(
        &self,
        type_name: &str,
        value: &str,
    ) -> Result<Option<VariableDecl>, TypeProviderError> {
        let constant =
            self.find_in_type_sources(|source| source.find_enum_constant(type_name, value))?;
        Ok(constant.map(|constant| {
            enum_constant_decl(&constant.type_name, &constant.value_name, constant.number)
        }))
    }

    /// Resolve a field of a struct type, including proto extensions by full name.
    pub fn lookup_struct_field(
        &self,
        type_name: &str,
        field: &str,
    ) -> Result<Option<StructTypeField>, TypeProviderError> {
        self.find_in_type_sources(|source| source.find_struct_field(type_name, field))
    }

    /// Resolve a name that may denote a type or an enum value.
    ///
    /// A type name yields a `type(T)` constant. Otherwise, `pkg.Enum.VALUE`
    /// is tried as an enum constant.
    pub fn lookup_type_constant(
        &self,
        name: &str,
    ) -> Result<Option<VariableDecl>, TypeProviderError> {
        if let Some(found) = self.lookup_type_name(name)? {
            return Ok(Some(VariableDecl::new(name, CelType::type_of(found))));
        }
        match name.rsplit_once('.') {
            Some((enum_name, value)) if !enum_name.is_empty() => {
                self.lookup_enum_constant(enum_name, value)
            }
            _ => Ok(None),
        }
    }
}

impl Default for TypeCheckEnv {
    fn default() -> Self {
        Self::new(ProtoTypeRegistry::new())
    }
}

fn enum_constant_decl(type_name: &str, value: &str, number: i64) -> VariableDecl {
    VariableDecl::constant(
        format!("{}.{}", type_name, value),
        CelType::Int,
        CelValue::Int(number),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use cel_core_common::{EnumConstant, OverloadDecl};

    #[derive(Debug)]
    struct StaticProvider {
        type_name: &'static str,
        cel_type: CelType,
    }

    impl TypeProvider for StaticProvider {
        fn find_type(&self, name: &str) -> Result<Option<CelType>, TypeProviderError> {
            Ok((name == self.type_name).then(|| self.cel_type.clone()))
        }

        fn find_enum_constant(
            &self,
            type_name: &str,
            value: &str,
        ) -> Result<Option<EnumConstant>, TypeProviderError> {
            Ok((type_name == "ext.Color" && value == "RED").then(|| EnumConstant {
                type_name: type_name.to_string(),
                value_name: value.to_string(),
                number: 2,
            }))
        }

        fn find_struct_field(
            &self,
            type_name: &str,
            field: &str,
        ) -> Result<Option<StructTypeField>, TypeProviderError> {
            Ok((type_name == self.type_name && field == "value")
                .then(|| StructTypeField::new("value", CelType::String)))
        }
    }

    #[derive(Debug)]
    struct FailingProvider;

    impl TypeProvider for FailingProvider {
        fn find_type(&self, name: &str) -> Result<Option<CelType>, TypeProviderError> {
            Err(TypeProviderError::Lookup {
                name: name.to_string(),
                message: "unavailable".to_string(),
            })
        }

        fn find_enum_constant(
            &self,
            _type_name: &str,
            _value: &str,
        ) -> Result<Option<EnumConstant>, TypeProviderError> {
            Ok(None)
        }

        fn find_struct_field(
            &self,
            _type_name: &str,
            _field: &str,
        ) -> Result<Option<StructTypeField>, TypeProviderError> {
            Ok(None)
        }
    }

    fn provider(type_name: &'static str, cel_type: CelType) -> Arc<dyn TypeProvider> {
        Arc::new(StaticProvider {
            type_name,
            cel_type,
        })
    }

    #[test]
    fn test_insert_variable() {
        let mut env = TypeCheckEnv::default();
        assert!(env.insert_variable_if_absent(VariableDecl::new("x", CelType::Int)));
        assert!(!env.insert_variable_if_absent(VariableDecl::new("x", CelType::String)));
        assert_eq!(env.lookup_variable("x").unwrap().cel_type, CelType::Int);

        env.insert_or_replace_variable(VariableDecl::new("x", CelType::String));
        assert_eq!(env.lookup_variable("x").unwrap().cel_type, CelType::String);
    }

    #[test]
    fn test_child_shadows_without_touching_parent() {
        let mut parent = TypeCheckEnv::default();
        parent.insert_variable_if_absent(VariableDecl::new("x", CelType::Int));
        parent.insert_variable_if_absent(VariableDecl::new("y", CelType::Bool));
        let parent = Arc::new(parent);

        let mut child = TypeCheckEnv::extend(Arc::clone(&parent));
        assert!(child.insert_variable_if_absent(VariableDecl::new("x", CelType::String)));

        assert_eq!(child.lookup_variable("x").unwrap().cel_type, CelType::String);
        assert_eq!(child.lookup_variable("y").unwrap().cel_type, CelType::Bool);
        assert_eq!(parent.lookup_variable("x").unwrap().cel_type, CelType::Int);
    }

    #[test]
    fn test_child_inherits_configuration() {
        let mut parent = TypeCheckEnv::default();
        parent.set_container("a.b");
        parent.set_expected_type(CelType::Bool);

        let child = TypeCheckEnv::extend(Arc::new(parent));
        assert_eq!(child.container(), "a.b");
        assert_eq!(child.expected_type(), Some(&CelType::Bool));
        assert!(child.parent().is_some());
    }

    #[test]
    fn test_lookup_function_walks_parents() {
        let mut parent = TypeCheckEnv::default();
        parent.insert_function_if_absent(FunctionDecl::new("f").with_overload(
            OverloadDecl::function("f_int", vec![CelType::Int], CelType::Int),
        ));
        let child = TypeCheckEnv::extend(Arc::new(parent));

        assert!(child.lookup_function("f").is_some());
        assert!(child.lookup_function("g").is_none());
    }

    #[test]
    fn test_latest_provider_wins() {
        let mut env = TypeCheckEnv::default();
        env.add_type_provider(provider("ext.Thing", CelType::Int));
        env.add_type_provider(provider("ext.Thing", CelType::String));

        assert_eq!(
            env.lookup_type_name("ext.Thing").unwrap(),
            Some(CelType::String)
        );
    }

    #[test]
    fn test_descriptor_pool_wins_over_providers() {
        let mut env = TypeCheckEnv::default();
        env.add_type_provider(provider("google.protobuf.Duration", CelType::Int));

        assert_eq!(
            env.lookup_type_name("google.protobuf.Duration").unwrap(),
            Some(CelType::Duration)
        );
    }

    #[test]
    fn test_registry_fields_and_enums_win_over_providers() {
        let mut env = TypeCheckEnv::default();
        env.add_type_provider(provider("google.protobuf.Int64Value", CelType::Int));

        let field = env
            .lookup_struct_field("google.protobuf.Int64Value", "value")
            .unwrap()
            .unwrap();
        assert_eq!(field.cel_type, CelType::Int);

        let null = env
            .lookup_enum_constant("google.protobuf.NullValue", "NULL_VALUE")
            .unwrap()
            .unwrap();
        assert_eq!(null.name, "google.protobuf.NullValue.NULL_VALUE");
        assert_eq!(null.value, Some(CelValue::Int(0)));
    }

    #[test]
    fn test_parent_providers_are_consulted() {
        let mut parent = TypeCheckEnv::default();
        parent.add_type_provider(provider("ext.Thing", CelType::message("ext.Thing")));
        let child = TypeCheckEnv::extend(Arc::new(parent));

        assert_eq!(
            child.lookup_type_name("ext.Thing").unwrap(),
            Some(CelType::message("ext.Thing"))
        );
        assert_eq!(
            child
                .lookup_struct_field("ext.Thing", "value")
                .unwrap()
                .map(|f| f.cel_type),
            Some(CelType::String)
        );
        assert!(child.lookup_type_name("ext.Other").unwrap().is_none());
    }

    #[test]
    fn test_provider_error_propagates() {
        let mut env = TypeCheckEnv::default();
        env.add_type_provider(Arc::new(FailingProvider));

        assert!(matches!(
            env.lookup_type_name("ext.Thing"),
            Err(TypeProviderError::Lookup { .. })
        ));
    }

    #[test]
    fn test_type_constants() {
        let mut env = TypeCheckEnv::default();
        env.add_type_provider(provider("ext.Thing", CelType::message("ext.Thing")));

        let decl = env.lookup_type_constant("ext.Thing").unwrap().unwrap();
        assert_eq!(decl.cel_type, CelType::type_of(CelType::message("ext.Thing")));

        let decl = env.lookup_type_constant("ext.Color.RED").unwrap().unwrap();
        assert_eq!(decl.name, "ext.Color.RED");
        assert_eq!(decl.cel_type, CelType::Int);
        assert_eq!(decl.value, Some(CelValue::Int(2)));

        assert!(env.lookup_type_constant("Missing").unwrap().is_none());
    }
}
