//! # FactGraph
//!
//! A declarative evaluation engine for policy and eligibility computations.
//! A *fact* is a named value derived from other facts and externally
//! supplied input. Facts are grouped into *modules* and form a directed
//! graph of dependencies: given an input record, the engine validates
//! inputs against per-fact schemas, resolves each fact at most once, and
//! returns either the computed value or a structured error describing which
//! inputs or upstream facts were unmet.
//!
//! ## Quick start
//!
//! ```rust
//! use factgraph::{Namespace, Evaluator};
//!
//! let ns = Namespace::new("simple");
//! ns.constant("two", 2).unwrap();
//!
//! let evaluator = Evaluator::new(ns.registry());
//! let results = evaluator.evaluate(&serde_json::json!({}), None).unwrap();
//! assert!(results.get(&"simple".into(), &"two".into()).unwrap().as_computed().is_some());
//! ```
//!
//! Facts that read input and depend on one another are declared the same
//! way, with a resolver closure:
//!
//! ```rust
//! use factgraph::{Namespace, Evaluator};
//! use factgraph::schema::{JsonType, JsonTypeSchema};
//! use std::sync::Arc;
//!
//! let ns = Namespace::new("math");
//! ns.constant("pi", 3.14).unwrap();
//! ns.declare(
//!     ns.fact("squared_scale").input("scale", Arc::new(JsonTypeSchema::new(JsonType::Number))),
//!     |c| {
//!         let scale = c.input_value(&"scale".into()).and_then(|v| v.as_f64()).unwrap();
//!         factgraph::Value::computed(scale * scale)
//!     },
//! ).unwrap();
//!
//! let evaluator = Evaluator::new(ns.registry());
//! let results = evaluator.evaluate(&serde_json::json!({ "scale": 5 }), None).unwrap();
//! assert!(results.get(&"math".into(), &"squared_scale".into()).unwrap().as_computed().is_some());
//! ```
//!
//! ## Core components
//!
//! - [`Namespace`]: where fact declarations accumulate (§4.1).
//! - [`graph::GraphBuilder`]: compiles a registry and an input record into a [`graph::Graph`] (§4.2).
//! - [`Evaluator`]: lazily resolves facts with memoization and structured error propagation (§4.5).
//! - [`EvaluationResults`]: the completed `module → name → value` mapping produced by `evaluate()`.
//! - [`Value`] / [`value::Errors`]: the computed-or-structured-error result of resolving one fact.
//! - [`schema::Schema`]: the pluggable input-validation capability attached to a fact's inputs.

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Fatal, build-time error types and the crate's `Result` alias.
pub mod errors;
/// The fact-dependency graph: registry, built graph, resolution, and queries.
pub mod graph;
/// Opaque symbolic identifiers (module, fact, entity, input names).
pub mod ids;
/// Key-paths addressing locations in nested input records.
pub mod keypath;
/// Input-validation capabilities attached to facts (`Schema`, `Key`, `KeyMap`).
pub mod schema;
/// The tagged `Computed`/`Errors` result of resolving a fact.
pub mod value;

/// Fluent declaration sugar layered over the raw registry types.
pub mod dsl;

pub use dsl::FactDefBuilder;
pub use errors::{FactGraphError, Result};
pub use graph::{
    DataContainer, DependencyValue, EvaluationResults, Evaluator, EvaluatorConfig, FactDef, Graph, GraphBuilder,
    GraphSlot, InputDef, Namespace, Resolver,
};
pub use ids::{EntityId, EntityName, FactName, InputName, ModuleName};
pub use keypath::{KeyPath, KeySegment};
pub use schema::Schema;
pub use value::{Errors, Value};
