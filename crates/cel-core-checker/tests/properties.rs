//! Property tests for type inference using proptest.
//!
//! Invariants that must hold for any type, not just hand-picked ones:
//!
//! 1. Assignability is reflexive.
//! 2. `dyn` is assignable to and from every type.
//! 3. Each instantiation of a generic type allocates fresh type variables.
//! 4. Finalized types contain no free type parameters.

use cel_core_checker::TypeInferenceContext;
use cel_core_common::CelType;
use proptest::prelude::*;

fn contains_type_param(ty: &CelType) -> bool {
    match ty {
        CelType::TypeParam(_) => true,
        other => other.parameters().into_iter().any(contains_type_param),
    }
}

fn collect_type_vars(ty: &CelType, out: &mut Vec<String>) {
    if let CelType::TypeParam(name) = ty {
        out.push(name.to_string());
    }
    for param in ty.parameters() {
        collect_type_vars(param, out);
    }
}

// ---------------------------------------------------------------------------
// Strategies for generating types
// ---------------------------------------------------------------------------

const MESSAGE_POOL: &[&str] = &["test.v1.Account", "test.v1.Widget", "acme.Order"];

fn arb_primitive() -> impl Strategy<Value = CelType> {
    prop_oneof![
        Just(CelType::Bool),
        Just(CelType::Int),
        Just(CelType::UInt),
        Just(CelType::Double),
        Just(CelType::String),
        Just(CelType::Bytes),
    ]
}

fn arb_leaf() -> impl Strategy<Value = CelType> {
    prop_oneof![
        4 => arb_primitive(),
        1 => Just(CelType::Null),
        1 => Just(CelType::Timestamp),
        1 => Just(CelType::Duration),
        1 => Just(CelType::Any),
        1 => prop::sample::select(MESSAGE_POOL).prop_map(CelType::message),
        1 => arb_primitive().prop_map(CelType::wrapper),
    ]
}

fn nest(leaf: impl Strategy<Value = CelType> + 'static) -> impl Strategy<Value = CelType> {
    leaf.prop_recursive(3, 24, 2, |inner| {
        prop_oneof![
            inner.clone().prop_map(CelType::list),
            (inner.clone(), inner.clone()).prop_map(|(k, v)| CelType::map(k, v)),
            inner.clone().prop_map(CelType::optional),
            inner.prop_map(CelType::type_of),
        ]
    })
}

/// Types without type parameters.
fn arb_ground_type() -> impl Strategy<Value = CelType> {
    nest(arb_leaf())
}

/// Types that may mention the declared parameters `A` and `B`.
fn arb_generic_type() -> impl Strategy<Value = CelType> {
    nest(prop_oneof![
        3 => arb_leaf(),
        1 => prop::sample::select(&["A", "B"][..]).prop_map(CelType::type_param),
    ])
}

proptest! {
    #[test]
    fn assignability_is_reflexive(ty in arb_ground_type()) {
        let mut ctx = TypeInferenceContext::new(true);
        prop_assert!(ctx.is_assignable(&ty, &ty));
    }

    #[test]
    fn dyn_is_a_wildcard(ty in arb_ground_type()) {
        let mut ctx = TypeInferenceContext::new(true);
        prop_assert!(ctx.is_assignable(&ty, &CelType::Dyn));
        prop_assert!(ctx.is_assignable(&CelType::Dyn, &ty));
    }

    #[test]
    fn instantiation_is_fresh(ty in arb_generic_type()) {
        let mut ctx = TypeInferenceContext::new(true);
        let first = ctx.instantiate_type_params(&ty);
        let second = ctx.instantiate_type_params(&ty);

        let mut first_vars = Vec::new();
        collect_type_vars(&first, &mut first_vars);
        let mut second_vars = Vec::new();
        collect_type_vars(&second, &mut second_vars);

        for var in &first_vars {
            prop_assert!(!second_vars.contains(var));
            let origin = ctx.type_var_origin(var);
            prop_assert!(origin == Some("A") || origin == Some("B"));
        }
        prop_assert_eq!(first_vars.len(), second_vars.len());
    }

    #[test]
    fn finalized_types_are_closed(ty in arb_generic_type()) {
        let mut ctx = TypeInferenceContext::new(true);
        let instance = ctx.instantiate_type_params(&ty);
        prop_assert!(!contains_type_param(&ctx.finalize_type(&instance)));
    }

    #[test]
    fn instantiation_preserves_ground_types(ty in arb_ground_type()) {
        let mut ctx = TypeInferenceContext::new(true);
        prop_assert_eq!(ctx.instantiate_type_params(&ty), ty);
    }
}
