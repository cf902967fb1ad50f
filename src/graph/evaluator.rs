//! Lazy, memoized evaluation of a registry against one input record (§4.5).

use crate::errors::Result;
use crate::graph::builder::GraphBuilder;
use crate::graph::fact::{CacheSlot, Fact, GraphSlot, ResultsCache};
use crate::graph::query;
use crate::graph::registry::{filter_registry, FactDef};
use crate::ids::{EntityId, FactName, ModuleName};
use crate::keypath::KeyPath;
use crate::value::Value;
use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Tunables for an [`Evaluator`] that don't affect resolution semantics.
#[derive(Debug, Clone, Copy, Default)]
pub struct EvaluatorConfig {
    /// Emit a `log::trace!` line for every top-level fact visited during
    /// `evaluate()`. Off by default, even at trace level this is one line
    /// per declared fact, which adds up on large registries.
    pub trace_resolution: bool,
}

/// Evaluates a fixed registry against successive input records.
///
/// One `Evaluator` can be reused across many `evaluate()` calls, the
/// registry it holds is immutable, but each call gets its own freshly
/// built `Graph` and `ResultsCache`; nothing is shared between calls (§5).
#[derive(Clone, Debug)]
pub struct Evaluator {
    registry: Vec<FactDef>,
    builder: GraphBuilder,
    config: EvaluatorConfig,
}

impl Evaluator {
    pub fn new(registry: Vec<FactDef>) -> Self {
        Evaluator { registry, builder: GraphBuilder::new(), config: EvaluatorConfig::default() }
    }

    /// Use a non-default [`GraphBuilder`] (e.g. with cycle detection
    /// enabled) for subsequent builds.
    pub fn with_builder(mut self, builder: GraphBuilder) -> Self {
        self.builder = builder;
        self
    }

    /// Override this evaluator's [`EvaluatorConfig`].
    pub fn with_config(mut self, config: EvaluatorConfig) -> Self {
        self.config = config;
        self
    }

    /// Build a graph, then resolve every declared fact, returning the
    /// completed results.
    ///
    /// Visitation follows registry order; memoization means the effective
    /// resolution order is dependency-driven regardless (§4.5, §5).
    pub fn evaluate(&self, input: &serde_json::Value, module_filter: Option<&[ModuleName]>) -> Result<EvaluationResults> {
        let filtered = filter_registry(&self.registry, module_filter);
        let graph = self.builder.build(&filtered, input)?;
        let cache = ResultsCache::new();

        log::debug!("evaluating {} declared facts", filtered.len());

        for def in &filtered {
            if self.config.trace_resolution {
                log::trace!("visiting {}.{}", def.module_name, def.name);
            }
            match &def.per_entity {
                Some(_) => {
                    cache.ensure_per_entity_slot(&def.module_name, &def.name);
                    if let Some(GraphSlot::PerEntity(entities)) = graph.get(&def.module_name, &def.name) {
                        for fact in entities.values() {
                            fact.resolve(&graph, input, &cache)?;
                        }
                    }
                }
                None => {
                    if let Some(GraphSlot::Single(fact)) = graph.get(&def.module_name, &def.name) {
                        fact.resolve(&graph, input, &cache)?;
                    }
                }
            }
        }

        Ok(EvaluationResults::new(cache.snapshot()))
    }

    /// `Fact` instances built directly from the registry, not expanded for
    /// per-entity declarations (§4.6). Useful for static analysis without
    /// an input record.
    pub fn fact_definitions(&self, module_filter: Option<&[ModuleName]>) -> BTreeMap<ModuleName, BTreeMap<FactName, Fact>> {
        let filtered = filter_registry(&self.registry, module_filter);
        let mut out: BTreeMap<ModuleName, BTreeMap<FactName, Fact>> = BTreeMap::new();
        for def in filtered {
            let fact = Fact::new(Arc::new(def.clone()), None);
            out.entry(def.module_name).or_default().insert(def.name, fact);
        }
        out
    }

    /// Every fact with an input schema that declares `key_path` or an
    /// extension of it.
    pub fn facts_using_input(&self, key_path: &KeyPath) -> Vec<Fact> {
        query::facts_using_input(&self.registry, key_path)
    }

    /// Every fact declaring a dependency on `(dep_module, dep_name)`.
    pub fn facts_with_dependency(&self, dep_module: &ModuleName, dep_name: &FactName) -> Vec<Fact> {
        query::facts_with_dependency(&self.registry, dep_module, dep_name)
    }

    /// Leaves of the dependency graph transitively fed by `key_path`.
    pub fn leaf_facts_depending_on_input(&self, key_path: &KeyPath) -> Vec<Fact> {
        query::leaf_facts_depending_on_input(&self.registry, key_path)
    }
}

/// The outcome of one `evaluate()` call: a snapshot of the results cache
/// with convenience accessors (§3's "Results cache").
#[derive(Clone, Debug)]
pub struct EvaluationResults {
    modules: BTreeMap<ModuleName, BTreeMap<FactName, CacheSlot>>,
}

impl EvaluationResults {
    fn new(modules: BTreeMap<ModuleName, BTreeMap<FactName, CacheSlot>>) -> Self {
        EvaluationResults { modules }
    }

    /// The value of a non-per-entity fact.
    pub fn get(&self, module: &ModuleName, name: &FactName) -> Option<&Value> {
        match self.modules.get(module)?.get(name)? {
            CacheSlot::Single(value) => Some(value),
            CacheSlot::PerEntity(_) => None,
        }
    }

    /// The value of one entity's instance of a per-entity fact.
    pub fn get_entity(&self, module: &ModuleName, name: &FactName, entity_id: EntityId) -> Option<&Value> {
        match self.modules.get(module)?.get(name)? {
            CacheSlot::PerEntity(map) => map.get(&entity_id),
            CacheSlot::Single(_) => None,
        }
    }

    /// The full `EntityId → Value` mapping for a per-entity fact.
    pub fn entities(&self, module: &ModuleName, name: &FactName) -> Option<&BTreeMap<EntityId, Value>> {
        match self.modules.get(module)?.get(name)? {
            CacheSlot::PerEntity(map) => Some(map),
            CacheSlot::Single(_) => None,
        }
    }

    /// Every module name present in these results.
    pub fn iter_modules(&self) -> impl Iterator<Item = &ModuleName> {
        self.modules.keys()
    }

    /// `(FactName, CacheSlot)` pairs for one module, in name order.
    pub fn iter_module(&self, module: &ModuleName) -> impl Iterator<Item = (&FactName, &CacheSlot)> {
        self.modules.get(module).into_iter().flat_map(|facts| facts.iter())
    }

    /// Union every errored fact's `bad_inputs` map into one accumulator
    /// (§4.5, §8 property 9, S6).
    pub fn input_errors(&self) -> BTreeMap<KeyPath, BTreeSet<String>> {
        query::input_errors(&self.modules)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::registry::{InputDef, Resolver};
    use crate::ids::{EntityName, InputName};
    use crate::schema::{array, hash, Key, JsonType, JsonTypeSchema};
    use std::sync::Mutex;

    fn declarations() -> Vec<FactDef> {
        let two = FactDef {
            module_name: ModuleName::from("simple"),
            name: FactName::from("two"),
            per_entity: None,
            allow_unmet_dependencies: false,
            resolver: Resolver::Constant(Value::computed(2)),
            inputs: Vec::new(),
            dependencies: BTreeMap::new(),
            source_location: None,
        };
        let pi = FactDef {
            module_name: ModuleName::from("math"),
            name: FactName::from("pi"),
            per_entity: None,
            allow_unmet_dependencies: false,
            resolver: Resolver::Constant(Value::computed(3.14)),
            inputs: Vec::new(),
            dependencies: BTreeMap::new(),
            source_location: None,
        };
        let squared_scale = FactDef {
            module_name: ModuleName::from("math"),
            name: FactName::from("squared_scale"),
            per_entity: None,
            allow_unmet_dependencies: false,
            resolver: Resolver::function(|c| {
                let scale = c.input_value(&InputName::from("scale")).and_then(|v| v.as_f64()).unwrap();
                Value::computed(scale * scale)
            }),
            inputs: vec![InputDef {
                name: InputName::from("scale"),
                per_entity: false,
                schema: Arc::new(JsonTypeSchema::new(JsonType::Number)),
            }],
            dependencies: BTreeMap::new(),
            source_location: None,
        };
        let areas = FactDef {
            module_name: ModuleName::from("circles"),
            name: FactName::from("areas"),
            per_entity: None,
            allow_unmet_dependencies: false,
            resolver: Resolver::function(|c| {
                let circles = match c.input_value(&InputName::from("circles")).and_then(|v| v.as_array()) {
                    Some(c) => c,
                    None => return c.data_errors(),
                };
                let pi = c.dependency(&FactName::from("pi")).and_then(|d| d.as_scalar()).and_then(|v| v.as_computed()).and_then(|v| v.as_f64()).unwrap();
                let scale = c.dependency(&FactName::from("squared_scale")).and_then(|d| d.as_scalar()).and_then(|v| v.as_computed()).and_then(|v| v.as_f64()).unwrap();
                let areas: Vec<_> = circles
                    .iter()
                    .map(|c| {
                        let radius = c.get("radius").and_then(|v| v.as_f64()).unwrap_or(0.0);
                        pi * radius * radius * scale
                    })
                    .collect();
                Value::computed(serde_json::json!(areas))
            }),
            inputs: vec![InputDef {
                name: InputName::from("circles"),
                per_entity: false,
                schema: Arc::new(CirclesSchema),
            }],
            dependencies: BTreeMap::from([
                (FactName::from("pi"), ModuleName::from("math")),
                (FactName::from("squared_scale"), ModuleName::from("math")),
            ]),
            source_location: None,
        };
        vec![two, pi, squared_scale, areas]
    }

    struct CirclesSchema;
    impl crate::schema::Schema for CirclesSchema {
        fn call(&self, value: &serde_json::Value) -> crate::schema::SchemaResult {
            if value.is_array() {
                crate::schema::SchemaResult::ok()
            } else {
                crate::schema::SchemaResult::fail(vec![crate::schema::SchemaError::new(
                    KeyPath::root(),
                    "must be an array",
                )])
            }
        }
        fn key_map(&self) -> &crate::schema::KeyMap {
            static SHAPE: std::sync::OnceLock<Key> = std::sync::OnceLock::new();
            SHAPE.get_or_init(|| array(hash([("radius", Key::Scalar)])))
        }
    }

    #[test]
    fn scenario_constants_and_simple_math() {
        let evaluator = Evaluator::new(declarations());
        let input = serde_json::json!({ "scale": 5, "circles": [{"radius": 1}, {"radius": 2}] });
        let results = evaluator.evaluate(&input, None).unwrap();

        assert_eq!(results.get(&ModuleName::from("simple"), &FactName::from("two")), Some(&Value::computed(2)));

        let squared_scale = results
            .get(&ModuleName::from("math"), &FactName::from("squared_scale"))
            .and_then(Value::as_computed)
            .and_then(|v| v.as_f64())
            .unwrap();
        assert!((squared_scale - 25.0).abs() < 1e-9);

        let areas: Vec<f64> = results
            .get(&ModuleName::from("circles"), &FactName::from("areas"))
            .and_then(Value::as_computed)
            .and_then(|v| v.as_array())
            .unwrap()
            .iter()
            .map(|v| v.as_f64().unwrap())
            .collect();
        assert!((areas[0] - 78.5).abs() < 1e-9);
        assert!((areas[1] - 314.0).abs() < 1e-9);
    }

    #[test]
    fn scenario_no_input_reports_bad_inputs_and_unmet_dependency() {
        let evaluator = Evaluator::new(declarations());
        let results = evaluator.evaluate(&serde_json::json!({}), None).unwrap();

        let squared_scale = results.get(&ModuleName::from("math"), &FactName::from("squared_scale")).unwrap();
        assert!(squared_scale.is_errors());

        let areas = results.get(&ModuleName::from("circles"), &FactName::from("areas")).unwrap();
        match areas {
            Value::Errors(errors) => {
                assert!(errors.bad_inputs.contains_key(&KeyPath::of("circles")));
                assert!(errors.dependency_unmet.get(&ModuleName::from("math")).unwrap().contains(&FactName::from("squared_scale")));
            }
            Value::Computed(_) => panic!("expected errors"),
        }
    }

    #[test]
    fn resolver_invoked_at_most_once_across_shared_dependency() {
        let calls = Arc::new(Mutex::new(0));
        let calls_clone = calls.clone();
        let pi = FactDef {
            module_name: ModuleName::from("math"),
            name: FactName::from("pi"),
            per_entity: None,
            allow_unmet_dependencies: false,
            resolver: Resolver::function(move |_| {
                *calls_clone.lock().unwrap() += 1;
                Value::computed(3.14)
            }),
            inputs: Vec::new(),
            dependencies: BTreeMap::new(),
            source_location: None,
        };
        let a = FactDef {
            module_name: ModuleName::from("math"),
            name: FactName::from("a"),
            per_entity: None,
            allow_unmet_dependencies: false,
            resolver: Resolver::Constant(Value::computed(1)),
            inputs: Vec::new(),
            dependencies: BTreeMap::from([(FactName::from("pi"), ModuleName::from("math"))]),
            source_location: None,
        };
        let b = FactDef {
            module_name: ModuleName::from("math"),
            name: FactName::from("b"),
            per_entity: None,
            allow_unmet_dependencies: false,
            resolver: Resolver::Constant(Value::computed(2)),
            inputs: Vec::new(),
            dependencies: BTreeMap::from([(FactName::from("pi"), ModuleName::from("math"))]),
            source_location: None,
        };

        let evaluator = Evaluator::new(vec![pi, a, b]);
        evaluator.evaluate(&serde_json::json!({}), None).unwrap();
        assert_eq!(*calls.lock().unwrap(), 1);
    }

    #[test]
    fn per_entity_aggregator_counts_eligible_applicants() {
        let income = FactDef {
            module_name: ModuleName::from("applicants"),
            name: FactName::from("income"),
            per_entity: Some(EntityName::from("applicants")),
            allow_unmet_dependencies: false,
            resolver: Resolver::function(|c| {
                let income = c.input_value(&InputName::from("income")).and_then(|v| v.as_i64()).unwrap();
                Value::computed(income)
            }),
            inputs: vec![InputDef {
                name: InputName::from("income"),
                per_entity: true,
                schema: Arc::new(JsonTypeSchema::new(JsonType::Number)),
            }],
            dependencies: BTreeMap::new(),
            source_location: None,
        };
        let eligible = FactDef {
            module_name: ModuleName::from("applicants"),
            name: FactName::from("eligible"),
            per_entity: Some(EntityName::from("applicants")),
            allow_unmet_dependencies: true,
            resolver: Resolver::function(|c| {
                match c.dependency(&FactName::from("income")).and_then(|d| d.as_scalar()).and_then(|v| v.as_computed()).and_then(|v| v.as_i64()) {
                    Some(income) => Value::computed(income < 100),
                    None => c.data_errors(),
                }
            }),
            inputs: Vec::new(),
            dependencies: BTreeMap::from([(FactName::from("income"), ModuleName::from("applicants"))]),
            source_location: None,
        };
        let num_eligible = FactDef {
            module_name: ModuleName::from("applicants"),
            name: FactName::from("num_eligible"),
            per_entity: None,
            allow_unmet_dependencies: false,
            resolver: Resolver::function(|c| {
                let count = c
                    .dependency(&FactName::from("eligible"))
                    .and_then(|d| d.as_per_entity())
                    .map(|m| m.values().filter(|v| v.as_computed() == Some(&serde_json::json!(true))).count())
                    .unwrap_or(0);
                Value::computed(count as i64)
            }),
            inputs: Vec::new(),
            dependencies: BTreeMap::from([(FactName::from("eligible"), ModuleName::from("applicants"))]),
            source_location: None,
        };

        let evaluator = Evaluator::new(vec![income, eligible, num_eligible]);
        let input = serde_json::json!({ "applicants": [{"income": 48}, {"income": 380}] });
        let results = evaluator.evaluate(&input, None).unwrap();

        assert_eq!(
            results.get_entity(&ModuleName::from("applicants"), &FactName::from("eligible"), EntityId::new(0)),
            Some(&Value::computed(true))
        );
        assert_eq!(
            results.get_entity(&ModuleName::from("applicants"), &FactName::from("eligible"), EntityId::new(1)),
            Some(&Value::computed(false))
        );
        assert_eq!(
            results.get(&ModuleName::from("applicants"), &FactName::from("num_eligible")),
            Some(&Value::computed(1))
        );
    }
}
