//! `Fact` instances and the built `Graph` they live in (§3, §4.3).
//!
//! A `Fact` is a `FactDef` bound to an optional entity id. The `Graph` is
//! what `GraphBuilder` produces: one slot per declaration, each either a
//! single `Fact` or a per-entity `EntityId → Fact` map.

use crate::errors::{FactGraphError, Result};
use crate::graph::container::{DataContainer, DependencyValue};
use crate::graph::registry::{FactDef, Resolver};
use crate::ids::{EntityId, FactName, ModuleName};
use crate::value::{Errors, Value};
use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex};

/// A concrete node in a built graph: a declaration bound to an entity id
/// when the declaration is per-entity.
#[derive(Clone, Debug)]
pub struct Fact {
    pub def: Arc<FactDef>,
    pub entity_id: Option<EntityId>,
}

impl Fact {
    pub fn new(def: Arc<FactDef>, entity_id: Option<EntityId>) -> Self {
        Fact { def, entity_id }
    }

    pub fn module_name(&self) -> &ModuleName {
        &self.def.module_name
    }

    pub fn name(&self) -> &FactName {
        &self.def.name
    }

    /// Resolve this fact's value within `graph`, against `input`, memoizing
    /// through `cache`. Implements the eight steps of fact resolution.
    pub fn resolve(&self, graph: &Graph, input: &serde_json::Value, cache: &ResultsCache) -> Result<Value> {
        // Step 1: memoization.
        if let Some(cached) = cache.get(&self.def.module_name, &self.def.name, self.entity_id) {
            return Ok(cached);
        }

        // Step 2: constant fast path.
        if let Resolver::Constant(value) = &self.def.resolver {
            cache.insert(&self.def.module_name, &self.def.name, self.entity_id, value.clone());
            return Ok(value.clone());
        }

        // Step 3: dependency resolution.
        let mut dependencies = BTreeMap::new();
        let mut dependency_modules = BTreeMap::new();
        for (dep_name, dep_module) in &self.def.dependencies {
            let slot = graph.get(dep_module, dep_name).ok_or_else(|| {
                FactGraphError::MissingDependencyReference {
                    module: self.def.module_name.clone(),
                    name: self.def.name.clone(),
                    missing_module: dep_module.clone(),
                    missing_name: dep_name.clone(),
                }
            })?;

            let resolved = match slot {
                GraphSlot::Single(fact) => {
                    DependencyValue::Scalar(fact.resolve(graph, input, cache)?)
                }
                GraphSlot::PerEntity(entities) => match self.entity_id {
                    Some(id) => {
                        let target = entities.get(&id).ok_or_else(|| {
                            FactGraphError::InconsistentEntityAddressing {
                                module: self.def.module_name.clone(),
                                name: self.def.name.clone(),
                                entity_id: Some(id),
                            }
                        })?;
                        DependencyValue::Scalar(target.resolve(graph, input, cache)?)
                    }
                    None => {
                        let mut values = BTreeMap::new();
                        for (id, fact) in entities {
                            values.insert(*id, fact.resolve(graph, input, cache)?);
                        }
                        DependencyValue::PerEntity(values)
                    }
                },
            };
            dependency_modules.insert(dep_name.clone(), dep_module.clone());
            dependencies.insert(dep_name.clone(), resolved);
        }

        // Step 4: input filtering.
        let mut filtered = serde_json::Map::new();
        for input_def in &self.def.inputs {
            let raw = if input_def.per_entity {
                let entity_name = self.def.per_entity.as_ref().ok_or_else(|| {
                    FactGraphError::InconsistentEntityAddressing {
                        module: self.def.module_name.clone(),
                        name: self.def.name.clone(),
                        entity_id: self.entity_id,
                    }
                })?;
                let id = self.entity_id.ok_or_else(|| FactGraphError::InconsistentEntityAddressing {
                    module: self.def.module_name.clone(),
                    name: self.def.name.clone(),
                    entity_id: None,
                })?;
                input
                    .get(entity_name.as_str())
                    .and_then(|arr| arr.get(id.index()))
                    .and_then(|entity| entity.get(input_def.name.as_str()))
            } else {
                input.get(input_def.name.as_str())
            };

            if let Some(raw) = raw {
                let projected = input_def.schema.key_map().project(raw);
                filtered.insert(input_def.name.as_str().to_string(), projected);
            }
        }
        let filtered_input = serde_json::Value::Object(filtered);

        // Step 5: input validation.
        let mut errors = Errors::default();
        for input_def in &self.def.inputs {
            let value = filtered_input
                .get(input_def.name.as_str())
                .cloned()
                .unwrap_or(serde_json::Value::Null);
            let result = catch_unwind(AssertUnwindSafe(|| input_def.schema.call(&value))).map_err(|e| {
                FactGraphError::SchemaFailure {
                    module: self.def.module_name.clone(),
                    name: self.def.name.clone(),
                    message: panic_message(e),
                }
            })?;
            if !result.success {
                for schema_error in result.errors {
                    let path = crate::keypath::KeyPath::new(
                        crate::keypath::KeyPath::of(input_def.name.as_str())
                            .segments()
                            .iter()
                            .cloned()
                            .chain(schema_error.path.segments().iter().cloned()),
                    );
                    errors.add_bad_input(path, schema_error.text);
                }
            }
        }

        // Step 6: dependency-error propagation.
        for (dep_name, dep_value) in &dependencies {
            if dep_value.has_errors() {
                let module = dependency_modules.get(dep_name).cloned().unwrap_or_else(|| self.def.module_name.clone());
                errors.add_dependency_unmet(module, dep_name.clone());
            }
        }

        // Step 7: decision.
        let result = if errors.is_empty() {
            self.invoke_resolver(&filtered_input, dependencies, None)?
        } else if !self.def.allow_unmet_dependencies {
            Value::Errors(errors)
        } else {
            self.invoke_resolver(&filtered_input, dependencies, Some(errors))?
        };

        // Step 8: write into cache.
        cache.insert(&self.def.module_name, &self.def.name, self.entity_id, result.clone());
        Ok(result)
    }

    fn invoke_resolver(
        &self,
        filtered_input: &serde_json::Value,
        dependencies: BTreeMap<FactName, DependencyValue>,
        deferred_errors: Option<Errors>,
    ) -> Result<Value> {
        let Resolver::Function(resolver) = &self.def.resolver else {
            unreachable!("constant resolvers return in step 2")
        };
        let container = DataContainer::new(filtered_input.clone(), dependencies, deferred_errors);
        catch_unwind(AssertUnwindSafe(|| resolver(&container))).map_err(|e| FactGraphError::ResolverPanic {
            module: self.def.module_name.clone(),
            name: self.def.name.clone(),
            message: panic_message(e),
        })
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "resolver panicked with a non-string payload".to_string()
    }
}

/// What lives at one `(module, name)` slot in a built graph.
#[derive(Clone, Debug)]
pub enum GraphSlot {
    /// A single, non-per-entity fact.
    Single(Arc<Fact>),
    /// A per-entity fact's expansion. Present even when empty (no entity
    /// ids were found in the input), the slot always exists.
    PerEntity(BTreeMap<EntityId, Arc<Fact>>),
}

/// The materialized graph: every declared fact, instantiated against one
/// input record (§4.2).
#[derive(Clone, Debug, Default)]
pub struct Graph {
    modules: BTreeMap<ModuleName, BTreeMap<FactName, GraphSlot>>,
}

impl Graph {
    pub fn new() -> Self {
        Graph::default()
    }

    pub(crate) fn insert(&mut self, module: ModuleName, name: FactName, slot: GraphSlot) {
        self.modules.entry(module).or_default().insert(name, slot);
    }

    pub fn get(&self, module: &ModuleName, name: &FactName) -> Option<&GraphSlot> {
        self.modules.get(module)?.get(name)
    }

    /// Every `(module, name, slot)` triple in the graph, in module/name
    /// order (declaration order is not preserved by the `BTreeMap` storage;
    /// callers that need registry order should drive iteration from the
    /// registry itself instead).
    pub fn iter(&self) -> impl Iterator<Item = (&ModuleName, &FactName, &GraphSlot)> {
        self.modules
            .iter()
            .flat_map(|(module, facts)| facts.iter().map(move |(name, slot)| (module, name, slot)))
    }

    pub fn modules(&self) -> impl Iterator<Item = &ModuleName> {
        self.modules.keys()
    }
}

/// What lives at one `(module, name)` slot in the results of an
/// `evaluate()` call.
#[derive(Clone, Debug)]
pub enum CacheSlot {
    Single(Value),
    PerEntity(BTreeMap<EntityId, Value>),
}

/// Memoization store for one `evaluate()` call: `module → name → (Value |
/// EntityId → Value)`. Shared by reference across a recursive resolution
/// pass, so interior mutability is required even though a single
/// `evaluate()` call is single-threaded (§5).
#[derive(Debug, Default)]
pub struct ResultsCache {
    modules: Mutex<BTreeMap<ModuleName, BTreeMap<FactName, CacheSlot>>>,
}

impl ResultsCache {
    pub fn new() -> Self {
        ResultsCache::default()
    }

    pub fn get(&self, module: &ModuleName, name: &FactName, entity_id: Option<EntityId>) -> Option<Value> {
        let modules = self.modules.lock().unwrap();
        let slot = modules.get(module)?.get(name)?;
        match (slot, entity_id) {
            (CacheSlot::Single(v), None) => Some(v.clone()),
            (CacheSlot::PerEntity(map), Some(id)) => map.get(&id).cloned(),
            _ => None,
        }
    }

    pub fn insert(&self, module: &ModuleName, name: &FactName, entity_id: Option<EntityId>, value: Value) {
        let mut modules = self.modules.lock().unwrap();
        let facts = modules.entry(module.clone()).or_default();
        match entity_id {
            None => {
                facts.insert(name.clone(), CacheSlot::Single(value));
            }
            Some(id) => match facts.entry(name.clone()).or_insert_with(|| CacheSlot::PerEntity(BTreeMap::new())) {
                CacheSlot::PerEntity(map) => {
                    map.insert(id, value);
                }
                CacheSlot::Single(_) => {
                    facts.insert(name.clone(), CacheSlot::PerEntity(BTreeMap::from([(id, value)])));
                }
            },
        }
    }

    /// Ensure an (initially empty) per-entity slot exists even when no
    /// entity ids were produced for this fact, so the results map carries
    /// the slot rather than omitting it (§3 invariant, §8 property 5).
    pub fn ensure_per_entity_slot(&self, module: &ModuleName, name: &FactName) {
        let mut modules = self.modules.lock().unwrap();
        modules
            .entry(module.clone())
            .or_default()
            .entry(name.clone())
            .or_insert_with(|| CacheSlot::PerEntity(BTreeMap::new()));
    }

    /// A full, read-only snapshot of the cache's current contents.
    pub fn snapshot(&self) -> BTreeMap<ModuleName, BTreeMap<FactName, CacheSlot>> {
        self.modules.lock().unwrap().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::registry::InputDef;
    use crate::ids::InputName;
    use crate::schema::{JsonType, JsonTypeSchema};

    fn def(module: &str, name: &str, resolver: Resolver) -> FactDef {
        FactDef {
            module_name: ModuleName::from(module),
            name: FactName::from(name),
            per_entity: None,
            allow_unmet_dependencies: false,
            resolver,
            inputs: Vec::new(),
            dependencies: BTreeMap::new(),
            source_location: None,
        }
    }

    #[test]
    fn constant_fact_resolves_without_input() {
        let fact = Fact::new(Arc::new(def("simple", "two", Resolver::Constant(Value::computed(2)))), None);
        let graph = Graph::new();
        let cache = ResultsCache::new();
        let value = fact.resolve(&graph, &serde_json::json!({}), &cache).unwrap();
        assert_eq!(value, Value::computed(2));
    }

    #[test]
    fn resolver_runs_at_most_once_per_coordinate() {
        let calls = Arc::new(Mutex::new(0));
        let calls_clone = calls.clone();
        let resolver = Resolver::function(move |_| {
            *calls_clone.lock().unwrap() += 1;
            Value::computed(42)
        });
        let fact = Fact::new(Arc::new(def("math", "answer", resolver)), None);
        let graph = Graph::new();
        let cache = ResultsCache::new();

        fact.resolve(&graph, &serde_json::json!({}), &cache).unwrap();
        fact.resolve(&graph, &serde_json::json!({}), &cache).unwrap();

        assert_eq!(*calls.lock().unwrap(), 1);
    }

    #[test]
    fn missing_input_produces_bad_input_error() {
        let mut scale = def("math", "squared_scale", Resolver::function(|c| {
            let scale = c.input_value(&InputName::from("scale")).and_then(|v| v.as_i64()).unwrap();
            Value::computed(scale * scale)
        }));
        scale.inputs.push(InputDef {
            name: InputName::from("scale"),
            per_entity: false,
            schema: Arc::new(JsonTypeSchema::new(JsonType::Number)),
        });
        let fact = Fact::new(Arc::new(scale), None);
        let graph = Graph::new();
        let cache = ResultsCache::new();

        let value = fact.resolve(&graph, &serde_json::json!({}), &cache).unwrap();
        match value {
            Value::Errors(errors) => {
                assert!(errors.bad_inputs.contains_key(&crate::keypath::KeyPath::of("scale")));
            }
            Value::Computed(_) => panic!("expected an Errors value"),
        }
    }

    #[test]
    fn resolver_panic_becomes_fatal_error() {
        let fact = Fact::new(
            Arc::new(def("math", "boom", Resolver::function(|_| panic!("kaboom")))),
            None,
        );
        let graph = Graph::new();
        let cache = ResultsCache::new();
        let err = fact.resolve(&graph, &serde_json::json!({}), &cache).unwrap_err();
        assert!(matches!(err, FactGraphError::ResolverPanic { .. }));
    }
}
