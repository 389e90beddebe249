//! Common test utilities for cel-core-checker integration tests.

use cel_core_checker::{
    optional_library, standard_library, TypeCheckIssue, TypeChecker, TypeCheckerBuilder,
    ValidationResult,
};
use cel_core_common::{Ast, Expr, VariableDecl};
use prost_reflect::prost_types::{
    field_descriptor_proto::{Label, Type},
    DescriptorProto, EnumDescriptorProto, EnumValueDescriptorProto, FieldDescriptorProto,
    FileDescriptorProto,
};
use prost_reflect::DescriptorPool;

/// A builder with the standard and optional libraries loaded.
#[allow(dead_code)]
pub fn builder() -> TypeCheckerBuilder {
    let mut builder = TypeChecker::builder();
    builder.add_library(standard_library()).unwrap();
    builder.add_library(optional_library()).unwrap();
    builder
}

/// A builder over [`account_pool`] with both libraries loaded.
#[allow(dead_code)]
pub fn account_builder() -> TypeCheckerBuilder {
    let mut builder = TypeCheckerBuilder::with_descriptor_pool(account_pool());
    builder.add_library(standard_library()).unwrap();
    builder.add_library(optional_library()).unwrap();
    builder
}

/// A checker declaring the given variables.
#[allow(dead_code)]
pub fn checker(variables: Vec<VariableDecl>) -> TypeChecker {
    let mut builder = builder();
    for variable in variables {
        builder.add_variable(variable).unwrap();
    }
    builder.build().unwrap()
}

/// Check `expr` and assert it has no errors, returning the checked AST.
#[allow(dead_code)]
pub fn assert_checks(checker: &TypeChecker, expr: Expr) -> Ast {
    let result = checker.check(Ast::from(expr)).unwrap();
    if !result.is_valid() {
        panic!("expected expression to check, got:\n{}", result.format_issues());
    }
    result.into_ast().unwrap()
}

/// Check `expr` and assert it fails, returning the issues.
#[allow(dead_code)]
pub fn assert_check_error(checker: &TypeChecker, expr: Expr) -> Vec<TypeCheckIssue> {
    let result: ValidationResult = checker.check(Ast::from(expr)).unwrap();
    if result.is_valid() {
        panic!("expected check errors, got: {:?}", result.ast());
    }
    result.issues().to_vec()
}

/// Messages of the error-severity issues.
#[allow(dead_code)]
pub fn error_messages(issues: &[TypeCheckIssue]) -> Vec<String> {
    issues
        .iter()
        .filter(|issue| issue.is_error())
        .map(TypeCheckIssue::message)
        .collect()
}

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

/// The generated pool plus package `test.v1`:
///
/// ```text
/// message Account {
///   int64 id = 1;
///   string name = 2;
///   State state = 3;
///   repeated string tags = 4;
///   google.protobuf.NullValue nothing = 5;
///   Account parent = 6;
/// }
/// enum State { UNKNOWN = 0; ACTIVE = 1; }
/// ```
#[allow(dead_code)]
pub fn account_pool() -> DescriptorPool {
    let mut tags = field("tags", 4, Type::String, None);
    tags.label = Some(Label::Repeated as i32);

    let file = FileDescriptorProto {
        name: Some("test/v1/account.proto".to_string()),
        package: Some("test.v1".to_string()),
        dependency: vec!["google/protobuf/struct.proto".to_string()],
        syntax: Some("proto3".to_string()),
        message_type: vec![DescriptorProto {
            name: Some("Account".to_string()),
            field: vec![
                field("id", 1, Type::Int64, None),
                field("name", 2, Type::String, None),
                field("state", 3, Type::Enum, Some(".test.v1.State")),
                tags,
                field("nothing", 5, Type::Enum, Some(".google.protobuf.NullValue")),
                field("parent", 6, Type::Message, Some(".test.v1.Account")),
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
        ..Default::default()
    };

    let mut pool = DescriptorPool::global();
    pool.add_file_descriptor_proto(file)
        .expect("valid account descriptor");
    pool
}
