//! The result of resolving a single fact: either a computed payload, or a
//! structured record of why it could not be computed.

use crate::ids::{FactName, ModuleName};
use crate::keypath::KeyPath;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// A computed value or a structured error, produced by resolving one fact.
///
/// `Errors` is never constructed empty: at least one of `bad_inputs` or
/// `dependency_unmet` is non-empty whenever this variant appears. Use
/// [`Errors::bad_input`] / [`Errors::dependency_unmet_entry`] or
/// [`ErrorsBuilder`] rather than building the struct by hand, since those
/// helpers preserve that invariant.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind")]
pub enum Value {
    /// A successfully computed payload.
    Computed(serde_json::Value),
    /// A structured failure: bad inputs, unmet upstream dependencies, or
    /// both.
    Errors(Errors),
}

impl Value {
    /// Shorthand for `Value::Computed(payload.into())`.
    pub fn computed(payload: impl Into<serde_json::Value>) -> Self {
        Value::Computed(payload.into())
    }

    /// The sentinel value returned by [`crate::graph::container::DataContainer::must_match`]
    /// when a resolver's pattern match fails and no deferred errors are
    /// available to fall back on (§7, `IncompleteDefinition`).
    pub fn incomplete_definition() -> Self {
        Value::Computed(serde_json::json!({ "_factgraph_sentinel": "incomplete_definition" }))
    }

    /// Whether this value is the `incomplete_definition` sentinel.
    pub fn is_incomplete_definition(&self) -> bool {
        matches!(
            self,
            Value::Computed(serde_json::Value::Object(map))
                if map.get("_factgraph_sentinel").and_then(|v| v.as_str()) == Some("incomplete_definition")
        )
    }

    /// Whether this value is an `Errors` record.
    pub fn is_errors(&self) -> bool {
        matches!(self, Value::Errors(_))
    }

    /// Borrow the computed payload, if this is a `Computed` value.
    pub fn as_computed(&self) -> Option<&serde_json::Value> {
        match self {
            Value::Computed(v) => Some(v),
            Value::Errors(_) => None,
        }
    }

    /// Borrow the error record, if this is an `Errors` value.
    pub fn as_errors(&self) -> Option<&Errors> {
        match self {
            Value::Errors(e) => Some(e),
            Value::Computed(_) => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Computed(v) => write!(f, "{v}"),
            Value::Errors(e) => write!(f, "{e}"),
        }
    }
}

/// A structured failure record: invalid inputs and/or unmet upstream
/// dependencies observed while resolving a fact.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Errors {
    /// Per-key-path validation failure messages.
    pub bad_inputs: BTreeMap<KeyPath, BTreeSet<String>>,
    /// Upstream fact names, grouped by module, whose resolution failed.
    pub dependency_unmet: BTreeMap<ModuleName, BTreeSet<FactName>>,
}

impl Errors {
    /// Whether neither map has any entries. An empty `Errors` should never
    /// be stored as a fact's result, this is for assembling one
    /// incrementally before deciding whether to surface it.
    pub fn is_empty(&self) -> bool {
        self.bad_inputs.is_empty() && self.dependency_unmet.is_empty()
    }

    /// Record a validation failure at `path`.
    pub fn add_bad_input(&mut self, path: KeyPath, message: impl Into<String>) {
        self.bad_inputs.entry(path).or_default().insert(message.into());
    }

    /// Record that `name` in `module` did not resolve successfully.
    pub fn add_dependency_unmet(&mut self, module: ModuleName, name: FactName) {
        self.dependency_unmet.entry(module).or_default().insert(name);
    }

    /// Merge another `Errors` record into this one.
    pub fn merge(&mut self, other: &Errors) {
        for (path, messages) in &other.bad_inputs {
            self.bad_inputs
                .entry(path.clone())
                .or_default()
                .extend(messages.iter().cloned());
        }
        for (module, names) in &other.dependency_unmet {
            self.dependency_unmet
                .entry(module.clone())
                .or_default()
                .extend(names.iter().cloned());
        }
    }
}

impl fmt::Display for Errors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.bad_inputs.is_empty() {
            write!(f, "bad inputs: ")?;
            for (path, messages) in &self.bad_inputs {
                write!(f, "{path} -> {messages:?} ")?;
            }
        }
        if !self.dependency_unmet.is_empty() {
            write!(f, "dependency unmet: ")?;
            for (module, names) in &self.dependency_unmet {
                let names: Vec<_> = names.iter().map(|n| n.as_str()).collect();
                write!(f, "{module}: {names:?} ")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_merge_unions_message_sets() {
        let mut a = Errors::default();
        a.add_bad_input(KeyPath::of("scale"), "must be Numeric");

        let mut b = Errors::default();
        b.add_bad_input(KeyPath::of("scale"), "must be positive");

        a.merge(&b);
        assert_eq!(
            a.bad_inputs.get(&KeyPath::of("scale")).unwrap().len(),
            2
        );
    }

    #[test]
    fn incomplete_definition_round_trips() {
        let v = Value::incomplete_definition();
        assert!(v.is_incomplete_definition());
        assert!(!Value::computed(5).is_incomplete_definition());
    }
}
