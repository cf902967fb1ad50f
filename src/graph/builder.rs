//! Compiles a filtered registry and an input record into a [`Graph`]
//! (§4.2), with an opt-in build-time cycle check (§9, design notes).

use crate::errors::{FactGraphError, Result};
use crate::graph::fact::{Fact, Graph, GraphSlot};
use crate::graph::registry::{entity_ids, FactDef};
use crate::ids::{FactName, ModuleName};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Builds a [`Graph`] from a registry and an input record.
///
/// An acyclic declaration set is a contract between the caller and the
/// registry, not something the core enforces by default. A depth-first
/// check is cheap relative to the rest of graph construction and turns an
/// unbounded-recursion bug into a diagnosable error, so it's available
/// behind an explicit opt-in.
#[derive(Debug, Clone, Default)]
pub struct GraphBuilder {
    detect_cycles: bool,
}

impl GraphBuilder {
    pub fn new() -> Self {
        GraphBuilder::default()
    }

    /// Enable the depth-first cycle check before building.
    pub fn detect_cycles(mut self, enabled: bool) -> Self {
        self.detect_cycles = enabled;
        self
    }

    /// Materialize `registry` against `input` into a [`Graph`] (§4.2).
    pub fn build(&self, registry: &[FactDef], input: &serde_json::Value) -> Result<Graph> {
        if self.detect_cycles {
            check_acyclic(registry)?;
        }

        let mut graph = Graph::new();
        for def in registry {
            let def = Arc::new(def.clone());
            match &def.per_entity {
                Some(entity_name) => {
                    let ids = entity_ids(input, entity_name);
                    let mut entities = BTreeMap::new();
                    for id in ids {
                        entities.insert(id, Arc::new(Fact::new(def.clone(), Some(id))));
                    }
                    graph.insert(def.module_name.clone(), def.name.clone(), GraphSlot::PerEntity(entities));
                }
                None => {
                    graph.insert(
                        def.module_name.clone(),
                        def.name.clone(),
                        GraphSlot::Single(Arc::new(Fact::new(def.clone(), None))),
                    );
                }
            }
        }
        Ok(graph)
    }
}

/// Depth-first grey/black cycle check over the registry's declared
/// `(module, name) → dependency` edges.
fn check_acyclic(registry: &[FactDef]) -> Result<()> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        Grey,
        Black,
    }

    let mut marks: BTreeMap<(ModuleName, FactName), Mark> = BTreeMap::new();

    fn visit(
        coordinate: (ModuleName, FactName),
        registry: &[FactDef],
        marks: &mut BTreeMap<(ModuleName, FactName), Mark>,
        path: &mut Vec<(ModuleName, FactName)>,
    ) -> Result<()> {
        match marks.get(&coordinate) {
            Some(Mark::Black) => return Ok(()),
            Some(Mark::Grey) => {
                let start = path.iter().position(|c| c == &coordinate).unwrap_or(0);
                let mut cycle = path[start..].to_vec();
                cycle.push(coordinate);
                return Err(FactGraphError::CyclicDependency { path: cycle });
            }
            None => {}
        }

        marks.insert(coordinate.clone(), Mark::Grey);
        path.push(coordinate.clone());

        if let Some(def) = registry
            .iter()
            .find(|def| def.module_name == coordinate.0 && def.name == coordinate.1)
        {
            for (dep_name, dep_module) in &def.dependencies {
                visit((dep_module.clone(), dep_name.clone()), registry, marks, path)?;
            }
        }

        path.pop();
        marks.insert(coordinate, Mark::Black);
        Ok(())
    }

    let mut seen: BTreeSet<(ModuleName, FactName)> = BTreeSet::new();
    for def in registry {
        let coordinate = def.coordinate();
        if seen.insert(coordinate.clone()) {
            visit(coordinate, registry, &mut marks, &mut Vec::new())?;
        }
    }
    Ok(())
}
