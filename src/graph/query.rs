//! Registry-level queries that answer "which facts touch this?" without
//! building a graph or evaluating anything (§4.5's query operations,
//! §4.5.1's key-path matching, §4.6).

use crate::graph::fact::{CacheSlot, Fact};
use crate::graph::registry::FactDef;
use crate::ids::{FactName, ModuleName};
use crate::keypath::{KeyPath, KeySegment};
use crate::value::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

fn segment_matches(query: &KeySegment, declared: &KeySegment) -> bool {
    match (query, declared) {
        (KeySegment::Name(a), KeySegment::Name(b)) => a == b,
        (KeySegment::Index(_), KeySegment::Index(_)) => true,
        _ => false,
    }
}

/// Whether `query` is a prefix of (or equal to) `declared`, segment-wise,
/// with any index position treated as matching any other (§4.5.1).
fn is_prefix(query: &[KeySegment], declared: &[KeySegment]) -> bool {
    query.len() <= declared.len() && query.iter().zip(declared).all(|(q, d)| segment_matches(q, d))
}

fn fact_from(def: &FactDef) -> Fact {
    Fact::new(Arc::new(def.clone()), None)
}

/// Every fact with at least one input schema that declares `key_path` or an
/// extension of it (§4.5, §8 property 9).
pub fn facts_using_input(registry: &[FactDef], key_path: &KeyPath) -> Vec<Fact> {
    registry
        .iter()
        .filter(|def| {
            def.inputs.iter().any(|input_def| {
                input_def.schema.key_map().paths().iter().any(|relative| {
                    let full = KeyPath::new(
                        KeyPath::of(input_def.name.as_str())
                            .segments()
                            .iter()
                            .cloned()
                            .chain(relative.segments().iter().cloned()),
                    );
                    is_prefix(key_path.segments(), full.segments())
                })
            })
        })
        .map(fact_from)
        .collect()
}

/// Every fact that declared a dependency on `(dep_module, dep_name)`.
pub fn facts_with_dependency(registry: &[FactDef], dep_module: &ModuleName, dep_name: &FactName) -> Vec<Fact> {
    registry
        .iter()
        .filter(|def| def.dependencies.get(dep_name) == Some(dep_module))
        .map(fact_from)
        .collect()
}

/// Worklist traversal from the facts that read `key_path` down to the
/// leaves of the dependency graph they feed (§4.5, §8 property 9).
pub fn leaf_facts_depending_on_input(registry: &[FactDef], key_path: &KeyPath) -> Vec<Fact> {
    let mut frontier: Vec<Fact> = facts_using_input(registry, key_path);
    let mut visited: BTreeSet<(ModuleName, FactName)> = BTreeSet::new();
    let mut leaves: BTreeMap<(ModuleName, FactName), Fact> = BTreeMap::new();

    while !frontier.is_empty() {
        let mut next_frontier = Vec::new();
        for fact in frontier {
            let coordinate = (fact.module_name().clone(), fact.name().clone());
            if !visited.insert(coordinate.clone()) {
                continue;
            }
            let downstream = facts_with_dependency(registry, &coordinate.0, &coordinate.1);
            if downstream.is_empty() {
                leaves.insert(coordinate, fact);
            } else {
                next_frontier.extend(downstream);
            }
        }
        frontier = next_frontier;
    }

    leaves.into_values().collect()
}

/// Scan every entry of a results snapshot, merging every `Errors` record's
/// `bad_inputs` map into a single accumulator (§4.5, §8 property, §9
/// `input_errors`).
pub fn input_errors(
    results: &BTreeMap<ModuleName, BTreeMap<FactName, CacheSlot>>,
) -> BTreeMap<KeyPath, BTreeSet<String>> {
    let mut accumulator: BTreeMap<KeyPath, BTreeSet<String>> = BTreeMap::new();
    let mut merge_value = |value: &Value| {
        if let Value::Errors(errors) = value {
            for (path, messages) in &errors.bad_inputs {
                accumulator.entry(path.clone()).or_default().extend(messages.iter().cloned());
            }
        }
    };

    for facts in results.values() {
        for slot in facts.values() {
            match slot {
                CacheSlot::Single(value) => merge_value(value),
                CacheSlot::PerEntity(entities) => {
                    for value in entities.values() {
                        merge_value(value);
                    }
                }
            }
        }
    }
    accumulator
}
