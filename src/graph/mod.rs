//! The fact-dependency graph: registry, built graph, resolution, and the
//! queries layered on top of it.

pub mod builder;
pub mod container;
pub mod evaluator;
pub mod fact;
pub mod query;
pub mod registry;

pub use builder::GraphBuilder;
pub use container::{DataContainer, DependencyValue};
pub use evaluator::{EvaluationResults, Evaluator, EvaluatorConfig};
pub use fact::{CacheSlot, Fact, Graph, GraphSlot, ResultsCache};
pub use registry::{FactDef, InputDef, Namespace, Resolver};
