//! CEL standard and optional library declarations.
//!
//! This module defines all CEL operators, built-in functions, and type
//! constants with their type signatures and overload IDs matching cel-go
//! conventions. Type parameters are written as named `TypeParam`s and are
//! instantiated afresh at every call site.

use std::sync::LazyLock;

use cel_core_common::{CelType, FunctionDecl, OverloadDecl, VariableDecl};

/// Name of the optional field selection operator, `a.?b`.
pub const OPTIONAL_SELECT: &str = "_?._";

/// The only overload id accepted for [`OPTIONAL_SELECT`].
pub const SELECT_OPTIONAL_FIELD_OVERLOAD: &str = "select_optional_field";

/// A named bundle of declarations added to a checker in one step.
#[derive(Debug, Clone)]
pub struct CheckerLibrary {
    pub id: String,
    pub variables: Vec<VariableDecl>,
    pub functions: Vec<FunctionDecl>,
}

static STANDARD_LIBRARY: LazyLock<CheckerLibrary> = LazyLock::new(|| CheckerLibrary {
    id: "stdlib".to_string(),
    variables: build_type_constants(),
    functions: build_standard_functions(),
});

static OPTIONAL_LIBRARY: LazyLock<CheckerLibrary> = LazyLock::new(build_optional_library);

/// The CEL standard library: operators, conversions, and type constants.
pub fn standard_library() -> &'static CheckerLibrary {
    &STANDARD_LIBRARY
}

/// Optional values, optional field selection, and optional indexing.
pub fn optional_library() -> &'static CheckerLibrary {
    &OPTIONAL_LIBRARY
}

fn a() -> CelType {
    CelType::type_param("A")
}

fn k() -> CelType {
    CelType::type_param("K")
}

fn v() -> CelType {
    CelType::type_param("V")
}

fn build_type_constants() -> Vec<VariableDecl> {
    [
        ("bool", CelType::Bool),
        ("int", CelType::Int),
        ("uint", CelType::UInt),
        ("double", CelType::Double),
        ("string", CelType::String),
        ("bytes", CelType::Bytes),
        ("list", CelType::list(CelType::Dyn)),
        ("map", CelType::map(CelType::Dyn, CelType::Dyn)),
        ("null_type", CelType::Null),
        ("type", CelType::type_of(CelType::Dyn)),
        ("dyn", CelType::Dyn),
    ]
    .into_iter()
    .map(|(name, cel_type)| VariableDecl::new(name, CelType::type_of(cel_type)))
    .collect()
}

fn build_standard_functions() -> Vec<FunctionDecl> {
    let mut funcs: Vec<FunctionDecl> = Vec::new();

    // ==================== Operators ====================

    // _+_ also concatenates strings, bytes and lists.
    funcs.push(
        FunctionDecl::new("_+_")
            .with_overload(OverloadDecl::function("add_int64", vec![CelType::Int, CelType::Int], CelType::Int))
            .with_overload(OverloadDecl::function("add_uint64", vec![CelType::UInt, CelType::UInt], CelType::UInt))
            .with_overload(OverloadDecl::function("add_double", vec![CelType::Double, CelType::Double], CelType::Double))
            .with_overload(OverloadDecl::function("add_string", vec![CelType::String, CelType::String], CelType::String))
            .with_overload(OverloadDecl::function("add_bytes", vec![CelType::Bytes, CelType::Bytes], CelType::Bytes))
            .with_overload(OverloadDecl::function(
                "add_list",
                vec![CelType::list(a()), CelType::list(a())],
                CelType::list(a()),
            ))
            .with_overload(OverloadDecl::function("add_timestamp_duration", vec![CelType::Timestamp, CelType::Duration], CelType::Timestamp))
            .with_overload(OverloadDecl::function("add_duration_timestamp", vec![CelType::Duration, CelType::Timestamp], CelType::Timestamp))
            .with_overload(OverloadDecl::function("add_duration_duration", vec![CelType::Duration, CelType::Duration], CelType::Duration)),
    );

    // _-_
    funcs.push(
        FunctionDecl::new("_-_")
            .with_overload(OverloadDecl::function("subtract_int64", vec![CelType::Int, CelType::Int], CelType::Int))
            .with_overload(OverloadDecl::function("subtract_uint64", vec![CelType::UInt, CelType::UInt], CelType::UInt))
            .with_overload(OverloadDecl::function("subtract_double", vec![CelType::Double, CelType::Double], CelType::Double))
            .with_overload(OverloadDecl::function("subtract_timestamp_timestamp", vec![CelType::Timestamp, CelType::Timestamp], CelType::Duration))
            .with_overload(OverloadDecl::function("subtract_timestamp_duration", vec![CelType::Timestamp, CelType::Duration], CelType::Timestamp))
            .with_overload(OverloadDecl::function("subtract_duration_duration", vec![CelType::Duration, CelType::Duration], CelType::Duration)),
    );

    // _*_
    funcs.push(
        FunctionDecl::new("_*_")
            .with_overload(OverloadDecl::function("multiply_int64", vec![CelType::Int, CelType::Int], CelType::Int))
            .with_overload(OverloadDecl::function("multiply_uint64", vec![CelType::UInt, CelType::UInt], CelType::UInt))
            .with_overload(OverloadDecl::function("multiply_double", vec![CelType::Double, CelType::Double], CelType::Double)),
    );

    // _/_
    funcs.push(
        FunctionDecl::new("_/_")
            .with_overload(OverloadDecl::function("divide_int64", vec![CelType::Int, CelType::Int], CelType::Int))
            .with_overload(OverloadDecl::function("divide_uint64", vec![CelType::UInt, CelType::UInt], CelType::UInt))
            .with_overload(OverloadDecl::function("divide_double", vec![CelType::Double, CelType::Double], CelType::Double)),
    );

    // _%_ has no double overload.
    funcs.push(
        FunctionDecl::new("_%_")
            .with_overload(OverloadDecl::function("modulo_int64", vec![CelType::Int, CelType::Int], CelType::Int))
            .with_overload(OverloadDecl::function("modulo_uint64", vec![CelType::UInt, CelType::UInt], CelType::UInt)),
    );

    // Unary: -_
    funcs.push(
        FunctionDecl::new("-_")
            .with_overload(OverloadDecl::function("negate_int64", vec![CelType::Int], CelType::Int))
            .with_overload(OverloadDecl::function("negate_double", vec![CelType::Double], CelType::Double)),
    );

    // Equality
    funcs.push(
        FunctionDecl::new("_==_")
            .with_overload(OverloadDecl::function("equals", vec![a(), a()], CelType::Bool)),
    );
    funcs.push(
        FunctionDecl::new("_!=_")
            .with_overload(OverloadDecl::function("not_equals", vec![a(), a()], CelType::Bool)),
    );

    // Ordering: _<_, _<=_, _>_, _>=_
    let orderable = [
        ("bool", CelType::Bool),
        ("int64", CelType::Int),
        ("uint64", CelType::UInt),
        ("double", CelType::Double),
        ("string", CelType::String),
        ("bytes", CelType::Bytes),
        ("timestamp", CelType::Timestamp),
        ("duration", CelType::Duration),
    ];
    for (op, prefix) in [
        ("_<_", "less"),
        ("_<=_", "less_equals"),
        ("_>_", "greater"),
        ("_>=_", "greater_equals"),
    ] {
        let mut decl = FunctionDecl::new(op);
        for (suffix, ty) in &orderable {
            decl = decl.with_overload(OverloadDecl::function(
                format!("{}_{}", prefix, suffix),
                vec![ty.clone(), ty.clone()],
                CelType::Bool,
            ));
        }
        // Mixed numeric comparisons.
        for (lhs_name, lhs, rhs_name, rhs) in [
            ("int64", CelType::Int, "uint64", CelType::UInt),
            ("int64", CelType::Int, "double", CelType::Double),
            ("uint64", CelType::UInt, "int64", CelType::Int),
            ("uint64", CelType::UInt, "double", CelType::Double),
            ("double", CelType::Double, "int64", CelType::Int),
            ("double", CelType::Double, "uint64", CelType::UInt),
        ] {
            decl = decl.with_overload(OverloadDecl::function(
                format!("{}_{}_{}", prefix, lhs_name, rhs_name),
                vec![lhs, rhs],
                CelType::Bool,
            ));
        }
        funcs.push(decl);
    }

    // Logical: _&&_, _||_, !_
    funcs.push(
        FunctionDecl::new("_&&_")
            .with_overload(OverloadDecl::function("logical_and", vec![CelType::Bool, CelType::Bool], CelType::Bool)),
    );
    funcs.push(
        FunctionDecl::new("_||_")
            .with_overload(OverloadDecl::function("logical_or", vec![CelType::Bool, CelType::Bool], CelType::Bool)),
    );
    funcs.push(
        FunctionDecl::new("!_")
            .with_overload(OverloadDecl::function("logical_not", vec![CelType::Bool], CelType::Bool)),
    );

    // Loop condition of `all` and `exists` expansions.
    funcs.push(
        FunctionDecl::new("@not_strictly_false")
            .with_overload(OverloadDecl::function("not_strictly_false", vec![CelType::Bool], CelType::Bool)),
    );

    // cond ? a : b
    funcs.push(
        FunctionDecl::new("_?_:_")
            .with_overload(OverloadDecl::function("conditional", vec![CelType::Bool, a(), a()], a())),
    );

    // x in list, k in map
    funcs.push(
        FunctionDecl::new("@in")
            .with_overload(OverloadDecl::function("in_list", vec![a(), CelType::list(a())], CelType::Bool))
            .with_overload(OverloadDecl::function("in_map", vec![k(), CelType::map(k(), v())], CelType::Bool)),
    );

    // list[int], map[key]
    funcs.push(
        FunctionDecl::new("_[_]")
            .with_overload(OverloadDecl::function("index_list", vec![CelType::list(a()), CelType::Int], a()))
            .with_overload(OverloadDecl::function("index_map", vec![CelType::map(k(), v()), k()], v())),
    );

    // ==================== Conversions ====================

    funcs.push(
        FunctionDecl::new("bool")
            .with_overload(OverloadDecl::function("bool_to_bool", vec![CelType::Bool], CelType::Bool))
            .with_overload(OverloadDecl::function("string_to_bool", vec![CelType::String], CelType::Bool)),
    );

    funcs.push(
        FunctionDecl::new("bytes")
            .with_overload(OverloadDecl::function("bytes_to_bytes", vec![CelType::Bytes], CelType::Bytes))
            .with_overload(OverloadDecl::function("string_to_bytes", vec![CelType::String], CelType::Bytes)),
    );

    funcs.push(
        FunctionDecl::new("double")
            .with_overload(OverloadDecl::function("double_to_double", vec![CelType::Double], CelType::Double))
            .with_overload(OverloadDecl::function("int64_to_double", vec![CelType::Int], CelType::Double))
            .with_overload(OverloadDecl::function("uint64_to_double", vec![CelType::UInt], CelType::Double))
            .with_overload(OverloadDecl::function("string_to_double", vec![CelType::String], CelType::Double)),
    );

    funcs.push(
        FunctionDecl::new("duration")
            .with_overload(OverloadDecl::function("duration_to_duration", vec![CelType::Duration], CelType::Duration))
            .with_overload(OverloadDecl::function("string_to_duration", vec![CelType::String], CelType::Duration)),
    );

    funcs.push(
        FunctionDecl::new("dyn")
            .with_overload(OverloadDecl::function("to_dyn", vec![a()], CelType::Dyn)),
    );

    funcs.push(
        FunctionDecl::new("int")
            .with_overload(OverloadDecl::function("int64_to_int64", vec![CelType::Int], CelType::Int))
            .with_overload(OverloadDecl::function("uint64_to_int64", vec![CelType::UInt], CelType::Int))
            .with_overload(OverloadDecl::function("double_to_int64", vec![CelType::Double], CelType::Int))
            .with_overload(OverloadDecl::function("string_to_int64", vec![CelType::String], CelType::Int))
            .with_overload(OverloadDecl::function("timestamp_to_int64", vec![CelType::Timestamp], CelType::Int)),
    );

    funcs.push(
        FunctionDecl::new("string")
            .with_overload(OverloadDecl::function("string_to_string", vec![CelType::String], CelType::String))
            .with_overload(OverloadDecl::function("bool_to_string", vec![CelType::Bool], CelType::String))
            .with_overload(OverloadDecl::function("int64_to_string", vec![CelType::Int], CelType::String))
            .with_overload(OverloadDecl::function("uint64_to_string", vec![CelType::UInt], CelType::String))
            .with_overload(OverloadDecl::function("double_to_string", vec![CelType::Double], CelType::String))
            .with_overload(OverloadDecl::function("bytes_to_string", vec![CelType::Bytes], CelType::String))
            .with_overload(OverloadDecl::function("timestamp_to_string", vec![CelType::Timestamp], CelType::String))
            .with_overload(OverloadDecl::function("duration_to_string", vec![CelType::Duration], CelType::String)),
    );

    funcs.push(
        FunctionDecl::new("timestamp")
            .with_overload(OverloadDecl::function("timestamp_to_timestamp", vec![CelType::Timestamp], CelType::Timestamp))
            .with_overload(OverloadDecl::function("string_to_timestamp", vec![CelType::String], CelType::Timestamp))
            .with_overload(OverloadDecl::function("int64_to_timestamp", vec![CelType::Int], CelType::Timestamp)),
    );

    funcs.push(
        FunctionDecl::new("type")
            .with_overload(OverloadDecl::function("type", vec![a()], CelType::type_of(a()))),
    );

    funcs.push(
        FunctionDecl::new("uint")
            .with_overload(OverloadDecl::function("uint64_to_uint64", vec![CelType::UInt], CelType::UInt))
            .with_overload(OverloadDecl::function("int64_to_uint64", vec![CelType::Int], CelType::UInt))
            .with_overload(OverloadDecl::function("double_to_uint64", vec![CelType::Double], CelType::UInt))
            .with_overload(OverloadDecl::function("string_to_uint64", vec![CelType::String], CelType::UInt)),
    );

    // ==================== Size ====================

    funcs.push(
        FunctionDecl::new("size")
            .with_overload(OverloadDecl::function("size_string", vec![CelType::String], CelType::Int))
            .with_overload(OverloadDecl::function("size_bytes", vec![CelType::Bytes], CelType::Int))
            .with_overload(OverloadDecl::function("size_list", vec![CelType::list(a())], CelType::Int))
            .with_overload(OverloadDecl::function("size_map", vec![CelType::map(k(), v())], CelType::Int))
            // Receiver form: x.size()
            .with_overload(OverloadDecl::method("string_size", vec![CelType::String], CelType::Int))
            .with_overload(OverloadDecl::method("bytes_size", vec![CelType::Bytes], CelType::Int))
            .with_overload(OverloadDecl::method("list_size", vec![CelType::list(a())], CelType::Int))
            .with_overload(OverloadDecl::method("map_size", vec![CelType::map(k(), v())], CelType::Int)),
    );

    // ==================== Strings ====================

    funcs.push(
        FunctionDecl::new("contains")
            .with_overload(OverloadDecl::method("contains_string", vec![CelType::String, CelType::String], CelType::Bool)),
    );

    funcs.push(
        FunctionDecl::new("endsWith")
            .with_overload(OverloadDecl::method("ends_with_string", vec![CelType::String, CelType::String], CelType::Bool)),
    );

    funcs.push(
        FunctionDecl::new("startsWith")
            .with_overload(OverloadDecl::method("starts_with_string", vec![CelType::String, CelType::String], CelType::Bool)),
    );

    funcs.push(
        FunctionDecl::new("matches")
            .with_overload(OverloadDecl::function("matches", vec![CelType::String, CelType::String], CelType::Bool))
            .with_overload(OverloadDecl::method("matches_string", vec![CelType::String, CelType::String], CelType::Bool)),
    );

    // ==================== Time ====================

    let timestamp_accessors = [
        ("getDate", "date"),
        ("getDayOfMonth", "day_of_month"),
        ("getDayOfWeek", "day_of_week"),
        ("getDayOfYear", "day_of_year"),
        ("getFullYear", "year"),
        ("getMonth", "month"),
    ];

    for (name, base_id) in timestamp_accessors {
        funcs.push(
            FunctionDecl::new(name)
                .with_overload(OverloadDecl::method(
                    format!("timestamp_to_{base_id}"),
                    vec![CelType::Timestamp],
                    CelType::Int,
                ))
                .with_overload(OverloadDecl::method(
                    format!("timestamp_to_{base_id}_with_tz"),
                    vec![CelType::Timestamp, CelType::String],
                    CelType::Int,
                )),
        );
    }

    // Shared by timestamp and duration.
    let time_accessors = [
        ("getHours", "hours"),
        ("getMinutes", "minutes"),
        ("getSeconds", "seconds"),
        ("getMilliseconds", "milliseconds"),
    ];

    for (name, base_id) in time_accessors {
        funcs.push(
            FunctionDecl::new(name)
                .with_overload(OverloadDecl::method(
                    format!("timestamp_to_{base_id}"),
                    vec![CelType::Timestamp],
                    CelType::Int,
                ))
                .with_overload(OverloadDecl::method(
                    format!("timestamp_to_{base_id}_with_tz"),
                    vec![CelType::Timestamp, CelType::String],
                    CelType::Int,
                ))
                .with_overload(OverloadDecl::method(
                    format!("duration_to_{base_id}"),
                    vec![CelType::Duration],
                    CelType::Int,
                )),
        );
    }

    funcs
}

fn build_optional_library() -> CheckerLibrary {
    let opt = CelType::optional;
    let mut funcs: Vec<FunctionDecl> = Vec::new();

    funcs.push(
        FunctionDecl::new("optional.of")
            .with_overload(OverloadDecl::function("optional_of", vec![v()], opt(v()))),
    );
    funcs.push(
        FunctionDecl::new("optional.ofNonZeroValue")
            .with_overload(OverloadDecl::function("optional_ofNonZeroValue", vec![v()], opt(v()))),
    );
    funcs.push(
        FunctionDecl::new("optional.none")
            .with_overload(OverloadDecl::function("optional_none", vec![], opt(v()))),
    );
    funcs.push(
        FunctionDecl::new("hasValue")
            .with_overload(OverloadDecl::method("optional_hasValue", vec![opt(v())], CelType::Bool)),
    );
    funcs.push(
        FunctionDecl::new("value")
            .with_overload(OverloadDecl::method("optional_value", vec![opt(v())], v())),
    );
    funcs.push(
        FunctionDecl::new("or")
            .with_overload(OverloadDecl::method("optional_or_optional", vec![opt(v()), opt(v())], opt(v()))),
    );
    funcs.push(
        FunctionDecl::new("orValue")
            .with_overload(OverloadDecl::method("optional_orValue_value", vec![opt(v()), v()], v())),
    );

    // Field selection on optionals is typed by the checker itself.
    funcs.push(
        FunctionDecl::new(OPTIONAL_SELECT).with_overload(OverloadDecl::function(
            SELECT_OPTIONAL_FIELD_OVERLOAD,
            vec![CelType::Dyn, CelType::String],
            opt(CelType::Dyn),
        )),
    );

    funcs.push(
        FunctionDecl::new("_[?_]")
            .with_overload(OverloadDecl::function("map_optindex_optional_value", vec![CelType::map(k(), v()), k()], opt(v())))
            .with_overload(OverloadDecl::function("optional_map_optindex_optional_value", vec![opt(CelType::map(k(), v())), k()], opt(v())))
            .with_overload(OverloadDecl::function("list_optindex_optional_int", vec![CelType::list(v()), CelType::Int], opt(v())))
            .with_overload(OverloadDecl::function("optional_list_optindex_optional_int", vec![opt(CelType::list(v())), CelType::Int], opt(v()))),
    );

    // Plain indexing of optional containers; merged into the standard `_[_]`.
    funcs.push(
        FunctionDecl::new("_[_]")
            .with_overload(OverloadDecl::function("optional_map_index_value", vec![opt(CelType::map(k(), v())), k()], opt(v())))
            .with_overload(OverloadDecl::function("optional_list_index_int", vec![opt(CelType::list(v())), CelType::Int], opt(v()))),
    );

    CheckerLibrary {
        id: "optional".to_string(),
        variables: vec![VariableDecl::new(
            "optional_type",
            CelType::type_of(opt(CelType::Dyn)),
        )],
        functions: funcs,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stdlib_function(name: &str) -> Option<&'static FunctionDecl> {
        standard_library().functions.iter().find(|f| f.name == name)
    }

    #[test]
    fn stdlib_identity() {
        assert!(!standard_library().functions.is_empty());
        assert_eq!(standard_library().id, "stdlib");
    }

    #[test]
    fn plus_covers_numbers_and_sequences() {
        let plus = stdlib_function("_+_").unwrap();
        for id in ["add_int64", "add_double", "add_string", "add_list"] {
            assert!(plus.get_overload(id).is_some(), "missing {id}");
        }
    }

    #[test]
    fn ordering_includes_mixed_numerics() {
        for op in ["_==_", "_!=_", "_<_", "_<=_", "_>_", "_>=_"] {
            assert!(stdlib_function(op).is_some(), "missing {}", op);
        }
        let less = stdlib_function("_<_").unwrap();
        assert!(less.get_overload("less_int64_double").is_some());
    }

    #[test]
    fn size_is_global_and_receiver() {
        let size = stdlib_function("size").unwrap();
        assert!(size.has_shape(1, false));
        assert!(size.has_shape(1, true));
    }

    #[test]
    fn contains_is_receiver_only() {
        let contains = stdlib_function("contains").unwrap();
        assert!(contains.overloads.iter().all(|o| o.is_member));
    }

    #[test]
    fn type_constants_are_type_values() {
        let names: Vec<_> = standard_library()
            .variables
            .iter()
            .map(|v| v.name.as_str())
            .collect();
        assert!(names.contains(&"int"));
        assert!(names.contains(&"null_type"));
        let list = standard_library()
            .variables
            .iter()
            .find(|v| v.name == "list")
            .unwrap();
        assert_eq!(list.cel_type, CelType::type_of(CelType::list(CelType::Dyn)));
    }

    #[test]
    fn overload_ids_are_unique() {
        let libraries = [standard_library(), optional_library()];
        for func in libraries.iter().flat_map(|library| &library.functions) {
            let mut ids: Vec<_> = func.overloads.iter().map(|o| o.id.as_str()).collect();
            let before = ids.len();
            ids.sort_unstable();
            ids.dedup();
            assert_eq!(before, ids.len(), "duplicate overload in {}", func.name);
        }
    }

    #[test]
    fn optional_select_overload() {
        let optional = optional_library();
        let select = optional
            .functions
            .iter()
            .find(|f| f.name == OPTIONAL_SELECT)
            .unwrap();
        assert_eq!(select.overloads[0].id, SELECT_OPTIONAL_FIELD_OVERLOAD);
        assert!(optional.functions.iter().any(|f| f.name == "optional.of"));
    }
}
