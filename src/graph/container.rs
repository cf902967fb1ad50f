//! The read-only bundle handed to a resolver when its fact is evaluated
//! (§4.4).

use crate::ids::{EntityId, FactName, InputName};
use crate::value::{Errors, Value};
use std::collections::BTreeMap;

/// The value of a resolved dependency, as seen by the dependent fact.
///
/// A dependency on a per-entity fact, observed from a non-per-entity (or
/// differently-addressed) consumer, fans out to the whole `EntityId → Value`
/// mapping rather than a single value (§3, invariant on dependency lookup).
#[derive(Debug, Clone)]
pub enum DependencyValue {
    /// A single resolved value, the common case.
    Scalar(Value),
    /// Every entity's resolved value, keyed by entity id.
    PerEntity(BTreeMap<EntityId, Value>),
}

impl DependencyValue {
    /// Borrow the scalar value, if this is the `Scalar` variant.
    pub fn as_scalar(&self) -> Option<&Value> {
        match self {
            DependencyValue::Scalar(v) => Some(v),
            DependencyValue::PerEntity(_) => None,
        }
    }

    /// Borrow the per-entity map, if this is the `PerEntity` variant.
    pub fn as_per_entity(&self) -> Option<&BTreeMap<EntityId, Value>> {
        match self {
            DependencyValue::Scalar(_) => None,
            DependencyValue::PerEntity(m) => Some(m),
        }
    }

    /// Whether any value reachable through this dependency is an `Errors`
    /// record, the condition under which a dependent fact treats this
    /// dependency as unmet (§7, propagation rule).
    pub fn has_errors(&self) -> bool {
        match self {
            DependencyValue::Scalar(v) => v.is_errors(),
            DependencyValue::PerEntity(m) => m.values().any(Value::is_errors),
        }
    }
}

/// The bundle of filtered input and resolved dependencies passed to a
/// resolver. Resolvers read from it but cannot mutate it or observe any
/// other fact's cache state.
#[derive(Debug, Clone)]
pub struct DataContainer {
    input: serde_json::Value,
    dependencies: BTreeMap<FactName, DependencyValue>,
    deferred_errors: Option<Errors>,
}

impl DataContainer {
    pub(crate) fn new(
        input: serde_json::Value,
        dependencies: BTreeMap<FactName, DependencyValue>,
        deferred_errors: Option<Errors>,
    ) -> Self {
        DataContainer { input, dependencies, deferred_errors }
    }

    /// The filtered input record, containing only the keys this fact
    /// declared.
    pub fn input(&self) -> &serde_json::Value {
        &self.input
    }

    /// The filtered value for a single declared input, if present.
    pub fn input_value(&self, name: &InputName) -> Option<&serde_json::Value> {
        self.input.get(name.as_str())
    }

    /// The resolved value of a declared dependency.
    pub fn dependency(&self, name: &FactName) -> Option<&DependencyValue> {
        self.dependencies.get(name)
    }

    /// The deferred errors record if this fact allows unmet dependencies and
    /// something was unmet, or the `incomplete_definition` sentinel
    /// otherwise. Only meaningful for `allow_unmet_dependencies` facts: for
    /// every other fact this resolver never runs when errors exist, so
    /// the method is never called with anything to report.
    pub fn data_errors(&self) -> Value {
        match &self.deferred_errors {
            Some(errors) => Value::Errors(errors.clone()),
            None => Value::incomplete_definition(),
        }
    }

    /// Run `f`; if it returns `None` (standing in for the host language's
    /// pattern-match failure), fall back to [`DataContainer::data_errors`]
    /// instead of propagating the failure as a panic (§4.4, §9).
    pub fn must_match<T>(&self, f: impl FnOnce() -> Option<T>) -> Result<T, Value> {
        match f() {
            Some(value) => Ok(value),
            None => Err(self.data_errors()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_errors_falls_back_to_incomplete_definition() {
        let container = DataContainer::new(serde_json::json!({}), BTreeMap::new(), None);
        assert!(container.data_errors().is_incomplete_definition());
    }

    #[test]
    fn data_errors_surfaces_deferred_record() {
        let mut errors = Errors::default();
        errors.add_bad_input(crate::keypath::KeyPath::of("scale"), "must be Numeric");
        let container = DataContainer::new(serde_json::json!({}), BTreeMap::new(), Some(errors));
        assert!(container.data_errors().is_errors());
    }

    #[test]
    fn must_match_recovers_from_failed_pattern() {
        let container = DataContainer::new(serde_json::json!({}), BTreeMap::new(), None);
        let result: Result<i64, Value> = container.must_match(|| None::<i64>);
        assert!(result.is_err());
    }

    #[test]
    fn per_entity_dependency_has_errors_if_any_entity_errored() {
        let mut map = BTreeMap::new();
        map.insert(EntityId::new(0), Value::computed(true));
        map.insert(EntityId::new(1), Value::Errors(Errors::default()));
        let dep = DependencyValue::PerEntity(map);
        assert!(dep.has_errors());
    }
}
