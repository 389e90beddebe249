//! Type parameter inference and overload resolution.
//!
//! Declared type parameters (`A`, `K`, `V`, ...) are instantiated with fresh
//! type variables (`T%1`, `T%2`, ...) at every use. Assignability checks bind
//! those variables, first into a prospective substitution map and then, once
//! the whole check succeeds, into the context. A binding only ever widens: a
//! later, more general candidate (such as `wrapper<int>` after `int`) replaces
//! an earlier one when the earlier binding is assignable into it.

use std::collections::HashMap;
use std::sync::Arc;

use cel_core_common::{CelType, FunctionDecl, OverloadDecl, TYPE_VAR_PREFIX};
use tracing::{trace, warn};

/// Type variable bindings proposed by an in-progress assignability check.
pub(crate) type SubstitutionMap = HashMap<Arc<str>, CelType>;

/// Maps declared type parameter names to the type variables instantiated for them.
pub type InstanceMap = HashMap<Arc<str>, CelType>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Generality {
    LessGeneral,
    Equivalent,
    MoreGeneral,
}

#[derive(Debug, Clone)]
struct TypeVar {
    /// Name of the declared parameter this variable was instantiated from.
    origin: Arc<str>,
    binding: Option<CelType>,
}

/// Result of overload resolution.
#[derive(Debug, Clone)]
pub struct OverloadResolution {
    /// The resolved result type, `dyn` when matching overloads disagree.
    pub result_type: CelType,
    /// Every overload whose signature accepts the arguments.
    pub overloads: Vec<OverloadDecl>,
}

/// Inference state for one check.
#[derive(Debug)]
pub struct TypeInferenceContext {
    next_type_var_id: u64,
    type_vars: HashMap<Arc<str>, TypeVar>,
    enable_legacy_null_assignment: bool,
}

impl TypeInferenceContext {
    pub fn new(enable_legacy_null_assignment: bool) -> Self {
        Self {
            next_type_var_id: 1,
            type_vars: HashMap::new(),
            enable_legacy_null_assignment,
        }
    }

    // ==================== Instantiation ====================

    /// Replace every declared type parameter in `ty` with a fresh type variable.
    pub fn instantiate_type_params(&mut self, ty: &CelType) -> CelType {
        let mut instances = InstanceMap::new();
        self.instantiate_type_params_with(ty, &mut instances)
    }

    /// Like [`instantiate_type_params`](Self::instantiate_type_params), sharing
    /// variables with earlier calls that used the same `instances` map.
    pub fn instantiate_type_params_with(
        &mut self,
        ty: &CelType,
        instances: &mut InstanceMap,
    ) -> CelType {
        match ty {
            CelType::TypeParam(name) => {
                if name.starts_with(TYPE_VAR_PREFIX) {
                    return ty.clone();
                }
                if let Some(instance) = instances.get(name) {
                    return instance.clone();
                }
                let instance = self.new_type_var(name);
                instances.insert(name.clone(), instance.clone());
                instance
            }
            _ => ty.map_parameters(|param| self.instantiate_type_params_with(param, instances)),
        }
    }

    fn new_type_var(&mut self, origin: &Arc<str>) -> CelType {
        let name: Arc<str> = Arc::from(format!("{}{}", TYPE_VAR_PREFIX, self.next_type_var_id));
        self.next_type_var_id += 1;
        self.type_vars.insert(
            name.clone(),
            TypeVar {
                origin: origin.clone(),
                binding: None,
            },
        );
        CelType::TypeParam(name)
    }

    /// Name of the declared parameter `type_var` was instantiated from.
    pub fn type_var_origin(&self, type_var: &str) -> Option<&str> {
        self.type_vars.get(type_var).map(|v| v.origin.as_ref())
    }

    // ==================== Substitution ====================

    /// Follow bindings from `ty` until reaching a non-variable or a free variable.
    fn substitute(&self, ty: &CelType, prospective: &SubstitutionMap) -> CelType {
        let mut current = ty.clone();
        loop {
            let next = match &current {
                CelType::TypeParam(name) => prospective
                    .get(name)
                    .or_else(|| self.type_vars.get(name).and_then(|v| v.binding.as_ref()))
                    .cloned(),
                _ => None,
            };
            match next {
                Some(bound) => current = bound,
                None => return current,
            }
        }
    }

    /// Apply every committed binding throughout `ty`.
    ///
    /// Free variables are kept, or replaced by `dyn` when `free_to_dyn` is set.
    pub fn fully_substitute(&self, ty: &CelType, free_to_dyn: bool) -> CelType {
        match ty {
            CelType::TypeParam(_) => {
                let resolved = self.substitute(ty, &SubstitutionMap::new());
                if !matches!(resolved, CelType::TypeParam(_)) {
                    self.fully_substitute(&resolved, free_to_dyn)
                } else if free_to_dyn {
                    CelType::Dyn
                } else {
                    resolved
                }
            }
            _ => ty.map_parameters(|param| self.fully_substitute(param, free_to_dyn)),
        }
    }

    /// The final type of an expression: fully substituted, free variables as `dyn`.
    pub fn finalize_type(&self, ty: &CelType) -> CelType {
        self.fully_substitute(ty, true)
    }

    fn occurs_within(&self, var: &str, ty: &CelType, prospective: &SubstitutionMap) -> bool {
        if let CelType::TypeParam(name) = ty {
            if name.as_ref() == var {
                return true;
            }
            let resolved = self.substitute(ty, prospective);
            return resolved != *ty && self.occurs_within(var, &resolved, prospective);
        }
        ty.parameters()
            .into_iter()
            .any(|param| self.occurs_within(var, param, prospective))
    }

    // ==================== Assignability ====================

    /// Check whether a value of type `from` may be used where `to` is expected.
    ///
    /// Type variables bound by a successful check stay bound.
    pub fn is_assignable(&mut self, from: &CelType, to: &CelType) -> bool {
        let mut prospective = SubstitutionMap::new();
        if !self.is_assignable_internal(from, to, &mut prospective) {
            return false;
        }
        self.update_type_var_bindings(prospective);
        true
    }

    /// Start a batch of assignability checks committed or discarded together.
    pub fn create_assignability_context(&mut self) -> AssignabilityContext<'_> {
        AssignabilityContext {
            inference: self,
            prospective: SubstitutionMap::new(),
        }
    }

    fn update_type_var_bindings(&mut self, prospective: SubstitutionMap) {
        for (name, ty) in prospective {
            match self.type_vars.get_mut(&name) {
                Some(var) => var.binding = Some(ty),
                None => warn!(type_param = %name, "binding for uninferred type parameter ignored"),
            }
        }
    }

    fn is_assignable_internal(
        &self,
        from: &CelType,
        to: &CelType,
        prospective: &mut SubstitutionMap,
    ) -> bool {
        let from_subs = self.substitute(from, prospective);
        let to_subs = self.substitute(to, prospective);

        if from_subs == to_subs {
            return true;
        }

        if matches!(from_subs, CelType::TypeParam(_)) || matches!(to_subs, CelType::TypeParam(_)) {
            return self.is_assignable_with_constraints(&from_subs, &to_subs, prospective);
        }

        // Widen a prospective binding to a more general candidate.
        if let CelType::TypeParam(to_name) = to {
            if prospective.contains_key(to_name)
                && self.compare_generality(&from_subs, &to_subs, prospective)
                    == Generality::MoreGeneral
            {
                let mut trial = prospective.clone();
                if self.is_assignable_internal(&to_subs, &from_subs, &mut trial)
                    && !self.occurs_within(to_name, &from_subs, &trial)
                {
                    trial.insert(to_name.clone(), from_subs);
                    *prospective = trial;
                    return true;
                }
            }
        }

        if self.enable_legacy_null_assignment {
            if from_subs == CelType::Null && to_subs.is_legacy_nullable() {
                return true;
            }
            if to_subs == CelType::Null && from_subs.is_legacy_nullable() {
                return true;
            }
        }

        match (&from_subs, &to_subs) {
            (CelType::Wrapper(_), CelType::Wrapper(_)) => {}
            (_, CelType::Wrapper(inner)) => {
                return from_subs == CelType::Null
                    || self.is_assignable_internal(&from_subs, inner, prospective);
            }
            (CelType::Wrapper(inner), _) => {
                let mut trial = prospective.clone();
                if self.is_assignable_internal(inner, &to_subs, &mut trial) {
                    *prospective = trial;
                    return true;
                }
            }
            _ => {}
        }

        if matches!(
            (&from_subs, &to_subs),
            (CelType::Enum(_), CelType::Int) | (CelType::Int, CelType::Enum(_))
        ) {
            return true;
        }

        if from_subs.is_wildcard() || to_subs.is_wildcard() {
            return true;
        }

        if !from_subs.same_kind_and_name(&to_subs) {
            return false;
        }
        let from_params = from_subs.parameters();
        let to_params = to_subs.parameters();
        from_params.len() == to_params.len()
            && from_params
                .into_iter()
                .zip(to_params)
                .all(|(f, t)| self.is_assignable_internal(f, t, prospective))
    }

    fn is_assignable_with_constraints(
        &self,
        from: &CelType,
        to: &CelType,
        prospective: &mut SubstitutionMap,
    ) -> bool {
        if let (CelType::TypeParam(from_name), CelType::TypeParam(to_name)) = (from, to) {
            if from_name != to_name {
                prospective.insert(from_name.clone(), to.clone());
            }
            return true;
        }
        if let CelType::TypeParam(to_name) = to {
            if !self.occurs_within(to_name, from, prospective) {
                prospective.insert(to_name.clone(), from.clone());
                return true;
            }
        }
        if let CelType::TypeParam(from_name) = from {
            if !self.occurs_within(from_name, to, prospective) {
                prospective.insert(from_name.clone(), to.clone());
                return true;
            }
        }
        from.is_wildcard() || to.is_wildcard()
    }

    fn compare_generality(
        &self,
        from: &CelType,
        to: &CelType,
        prospective: &SubstitutionMap,
    ) -> Generality {
        let from = self.substitute(from, prospective);
        let to = self.substitute(to, prospective);
        if from == to {
            return Generality::Equivalent;
        }
        if is_union_type(&from) && is_union_subset(&from, &to) {
            return Generality::MoreGeneral;
        }
        if is_union_type(&to) {
            return Generality::LessGeneral;
        }
        if self.enable_legacy_null_assignment && from.is_legacy_nullable() && to == CelType::Null {
            return Generality::MoreGeneral;
        }
        match (&from, &to) {
            (CelType::List(from_elem), CelType::List(to_elem)) => {
                self.compare_generality(from_elem, to_elem, prospective)
            }
            (CelType::Map(from_key, from_val), CelType::Map(to_key, to_val)) => {
                let key = self.compare_generality(from_key, to_key, prospective);
                let val = self.compare_generality(from_val, to_val, prospective);
                match (key, val) {
                    _ if key == val => key,
                    (Generality::Equivalent, other) | (other, Generality::Equivalent) => other,
                    _ => Generality::Equivalent,
                }
            }
            _ => Generality::Equivalent,
        }
    }

    // ==================== Overload Resolution ====================

    /// Resolve the overloads of `decl` that accept `arg_types`.
    ///
    /// For receiver-style calls the receiver type comes first in `arg_types`.
    /// Each overload is matched against its own fresh instantiation; the
    /// bindings of a matching overload are committed. Returns None if no
    /// overload matches.
    pub fn resolve_overload(
        &mut self,
        decl: &FunctionDecl,
        arg_types: &[CelType],
        is_receiver: bool,
    ) -> Option<OverloadResolution> {
        let mut result_type: Option<CelType> = None;
        let mut overloads = Vec::new();

        for overload in &decl.overloads {
            if !overload.matches_shape(arg_types.len(), is_receiver) {
                continue;
            }

            let mut instances = InstanceMap::new();
            let params: Vec<CelType> = overload
                .params
                .iter()
                .map(|param| self.instantiate_type_params_with(param, &mut instances))
                .collect();
            let result = self.instantiate_type_params_with(&overload.result, &mut instances);

            let mut prospective = SubstitutionMap::new();
            let matched = arg_types
                .iter()
                .zip(&params)
                .all(|(arg, param)| self.is_assignable_internal(arg, param, &mut prospective));
            if !matched {
                continue;
            }
            self.update_type_var_bindings(prospective);

            let result = self.fully_substitute(&result, false);
            result_type = match result_type {
                Some(existing) if existing != result => Some(CelType::Dyn),
                Some(existing) => Some(existing),
                None => Some(result),
            };
            overloads.push(overload.clone());
        }

        let result_type = result_type?;
        trace!(
            function = %decl.name,
            overloads = ?overloads.iter().map(|o| o.id.as_str()).collect::<Vec<_>>(),
            result = %result_type,
            "resolved overloads"
        );
        Some(OverloadResolution {
            result_type,
            overloads,
        })
    }
}

/// Types that admit values of more than one other type.
fn is_union_type(ty: &CelType) -> bool {
    matches!(ty, CelType::Any | CelType::Dyn | CelType::Wrapper(_))
}

fn is_union_subset(union: &CelType, ty: &CelType) -> bool {
    match union {
        CelType::Any | CelType::Dyn => true,
        CelType::Wrapper(inner) => ty == inner.as_ref() || *ty == CelType::Null,
        _ => false,
    }
}

/// A batch of assignability checks sharing one prospective substitution map.
///
/// Bindings made by the batch reach the inference context only through
/// [`update_inferred_type_assignments`](Self::update_inferred_type_assignments).
#[derive(Debug)]
pub struct AssignabilityContext<'c> {
    inference: &'c mut TypeInferenceContext,
    prospective: SubstitutionMap,
}

impl AssignabilityContext<'_> {
    /// Check assignability, keeping any bindings only if the check succeeds.
    pub fn is_assignable(&mut self, from: &CelType, to: &CelType) -> bool {
        let mut trial = self.prospective.clone();
        if self.inference.is_assignable_internal(from, to, &mut trial) {
            self.prospective = trial;
            true
        } else {
            false
        }
    }

    /// Commit the accumulated bindings to the inference context.
    pub fn update_inferred_type_assignments(&mut self) {
        let prospective = std::mem::take(&mut self.prospective);
        self.inference.update_type_var_bindings(prospective);
    }

    /// Discard the accumulated bindings.
    pub fn reset(&mut self) {
        self.prospective.clear();
    }
}
