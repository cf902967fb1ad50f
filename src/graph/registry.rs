//! Fact declarations and the namespaces that collect them (§4.1).
//!
//! `FactDef`s are immutable and registered once, at declaration time. A
//! [`Namespace`] is where that declaration happens: it owns a registry (a
//! flat, ordered list of `FactDef`), but, mirroring the common pattern
//! where a concrete class accumulates facts while a sibling class evaluates
//! them, declarations in a child namespace land in its parent's registry,
//! not its own.

use crate::errors::{FactGraphError, Result};
use crate::graph::container::DataContainer;
use crate::ids::{EntityId, EntityName, FactName, InputName, ModuleName};
use crate::schema::Schema;
use crate::value::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex};

/// Where a fact's value comes from: a fixed constant, or a function of its
/// `DataContainer`.
#[derive(Clone)]
pub enum Resolver {
    /// A pure value with no inputs and no dependencies (§4.1, `constant`).
    Constant(Value),
    /// A function invoked with the fact's filtered input and resolved
    /// dependencies.
    Function(Arc<dyn Fn(&DataContainer) -> Value + Send + Sync>),
}

impl Resolver {
    /// Build a function resolver from any closure with the right shape.
    pub fn function(f: impl Fn(&DataContainer) -> Value + Send + Sync + 'static) -> Self {
        Resolver::Function(Arc::new(f))
    }
}

impl fmt::Debug for Resolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resolver::Constant(v) => f.debug_tuple("Constant").field(v).finish(),
            Resolver::Function(_) => f.write_str("Function(..)"),
        }
    }
}

/// The declaration of a single named input a fact reads.
#[derive(Clone)]
pub struct InputDef {
    /// Name under which the input is addressed, both in the raw input
    /// record and in the fact's filtered `DataContainer`.
    pub name: InputName,
    /// When true, the value is read from `input[entity_name][entity_id][name]`
    /// instead of `input[name]`, requires the owning fact to be per-entity.
    pub per_entity: bool,
    /// Validation capability for this input's value.
    pub schema: Arc<dyn Schema>,
}

impl fmt::Debug for InputDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InputDef")
            .field("name", &self.name)
            .field("per_entity", &self.per_entity)
            .finish()
    }
}

/// Where a `FactDef` was declared, for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLocation {
    pub file: String,
    pub line: u32,
}

/// An immutable, registered fact declaration.
#[derive(Clone, Debug)]
pub struct FactDef {
    pub module_name: ModuleName,
    pub name: FactName,
    pub per_entity: Option<EntityName>,
    pub allow_unmet_dependencies: bool,
    pub resolver: Resolver,
    pub inputs: Vec<InputDef>,
    /// Upstream facts this one reads, keyed by dependency name to the
    /// module it is declared in.
    pub dependencies: BTreeMap<FactName, ModuleName>,
    pub source_location: Option<SourceLocation>,
}

impl FactDef {
    /// The `(module, name)` coordinate identifying this declaration.
    pub fn coordinate(&self) -> (ModuleName, FactName) {
        (self.module_name.clone(), self.name.clone())
    }
}

type RegistryHandle = Arc<Mutex<Vec<FactDef>>>;

/// A scope that declarations are collected into. See the module docs for
/// how declaration targets are threaded through parent/child namespaces.
#[derive(Clone)]
pub struct Namespace {
    /// This namespace's own registry, what `fact_definitions` and
    /// evaluation read from.
    own_registry: RegistryHandle,
    /// Where `declare_fact` actually appends. Equal to `own_registry` for a
    /// root namespace; equal to a parent's `own_registry` for a child.
    target_registry: RegistryHandle,
    default_module: ModuleName,
    module_stack: Arc<Mutex<Vec<ModuleName>>>,
}

impl Namespace {
    /// Create a root namespace whose declarations default to `module` and
    /// land in its own, freshly-empty registry.
    pub fn new(default_module: impl Into<ModuleName>) -> Self {
        let own_registry = Arc::new(Mutex::new(Vec::new()));
        Namespace {
            target_registry: own_registry.clone(),
            own_registry,
            default_module: default_module.into(),
            module_stack: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Create a sub-namespace: its own registry starts empty, but its
    /// declarations are appended to *this* namespace's registry, so
    /// evaluating `self` later sees the union of both.
    pub fn child(&self, default_module: impl Into<ModuleName>) -> Namespace {
        Namespace {
            own_registry: Arc::new(Mutex::new(Vec::new())),
            target_registry: self.own_registry.clone(),
            default_module: default_module.into(),
            module_stack: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// The module a declaration lands in absent an explicit override: the
    /// innermost active `in_module` scope, or this namespace's default.
    pub fn current_module(&self) -> ModuleName {
        let stack = self.module_stack.lock().unwrap();
        stack.last().cloned().unwrap_or_else(|| self.default_module.clone())
    }

    /// Push `module` as the active lexical override for the duration of the
    /// returned guard (§4.1's "stack discipline: push module, run
    /// declarations, pop"). Dropping the guard pops it.
    pub fn in_module(&self, module: impl Into<ModuleName>) -> ModuleScope<'_> {
        self.module_stack.lock().unwrap().push(module.into());
        ModuleScope { namespace: self }
    }

    /// Append `def` to this namespace's target registry, rejecting a
    /// duplicate `(module, name)` coordinate.
    pub fn declare_fact(&self, def: FactDef) -> Result<()> {
        let mut registry = self.target_registry.lock().unwrap();
        if registry.iter().any(|existing| existing.coordinate() == def.coordinate()) {
            return Err(FactGraphError::DuplicateFactDeclaration {
                module: def.module_name,
                name: def.name,
            });
        }
        registry.push(def);
        Ok(())
    }

    /// A snapshot of every `FactDef` currently registered in this
    /// namespace's own registry, in declaration order.
    pub fn registry(&self) -> Vec<FactDef> {
        self.own_registry.lock().unwrap().clone()
    }

    /// Check every declared `dependency` reference against the rest of the
    /// registry, returning the first dangling reference found. Build-time
    /// diagnostic; `GraphBuilder` re-checks this implicitly by failing to
    /// find the target when wiring dependencies.
    pub fn validate(&self) -> Result<()> {
        let registry = self.registry();
        for def in &registry {
            for (dep_name, dep_module) in &def.dependencies {
                let exists = registry
                    .iter()
                    .any(|other| &other.module_name == dep_module && &other.name == dep_name);
                if !exists {
                    return Err(FactGraphError::MissingDependencyReference {
                        module: def.module_name.clone(),
                        name: def.name.clone(),
                        missing_module: dep_module.clone(),
                        missing_name: dep_name.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}

/// RAII guard returned by [`Namespace::in_module`]; pops the lexical module
/// override when dropped.
pub struct ModuleScope<'a> {
    namespace: &'a Namespace,
}

impl Drop for ModuleScope<'_> {
    fn drop(&mut self) {
        self.namespace.module_stack.lock().unwrap().pop();
    }
}

/// `[0, 1, …, N-1]` where `N` is the length of the array at
/// `input[entity_name]`, or empty if that key is absent (§4.1).
pub fn entity_ids(input: &serde_json::Value, entity_name: &EntityName) -> Vec<EntityId> {
    input
        .get(entity_name.as_str())
        .and_then(|v| v.as_array())
        .map(|arr| (0..arr.len()).map(EntityId::new).collect())
        .unwrap_or_default()
}

/// Restrict `registry` to declarations in `modules`, or return it unchanged
/// when no filter is given.
pub fn filter_registry(registry: &[FactDef], modules: Option<&[ModuleName]>) -> Vec<FactDef> {
    match modules {
        None => registry.to_vec(),
        Some(modules) => registry
            .iter()
            .filter(|def| modules.contains(&def.module_name))
            .cloned()
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::JsonTypeSchema;

    fn constant_def(module: &str, name: &str) -> FactDef {
        FactDef {
            module_name: ModuleName::from(module),
            name: FactName::from(name),
            per_entity: None,
            allow_unmet_dependencies: false,
            resolver: Resolver::Constant(Value::computed(1)),
            inputs: Vec::new(),
            dependencies: BTreeMap::new(),
            source_location: None,
        }
    }

    #[test]
    fn child_declarations_land_in_parent_registry() {
        let parent = Namespace::new("simple");
        let child = parent.child("simple");
        child.declare_fact(constant_def("simple", "two")).unwrap();

        assert_eq!(parent.registry().len(), 1);
        assert_eq!(child.registry().len(), 0);
    }

    #[test]
    fn duplicate_declaration_is_rejected() {
        let ns = Namespace::new("simple");
        ns.declare_fact(constant_def("simple", "two")).unwrap();
        let err = ns.declare_fact(constant_def("simple", "two")).unwrap_err();
        assert!(matches!(err, FactGraphError::DuplicateFactDeclaration { .. }));
    }

    #[test]
    fn in_module_overrides_current_module_until_dropped() {
        let ns = Namespace::new("simple");
        assert_eq!(ns.current_module().as_str(), "simple");
        {
            let _scope = ns.in_module("math");
            assert_eq!(ns.current_module().as_str(), "math");
        }
        assert_eq!(ns.current_module().as_str(), "simple");
    }

    #[test]
    fn entity_ids_is_empty_when_key_absent() {
        let ids = entity_ids(&serde_json::json!({}), &EntityName::from("applicants"));
        assert!(ids.is_empty());
    }

    #[test]
    fn entity_ids_counts_array_elements() {
        let input = serde_json::json!({ "applicants": [{"income": 1}, {"income": 2}] });
        let ids = entity_ids(&input, &EntityName::from("applicants"));
        assert_eq!(ids, vec![EntityId::new(0), EntityId::new(1)]);
    }

    #[test]
    fn validate_reports_missing_dependency_reference() {
        let ns = Namespace::new("math");
        let mut def = constant_def("math", "squared_scale");
        def.inputs.push(InputDef {
            name: InputName::from("scale"),
            per_entity: false,
            schema: Arc::new(JsonTypeSchema::new(crate::schema::JsonType::Number)),
        });
        def.dependencies.insert(FactName::from("pi"), ModuleName::from("math"));
        ns.declare_fact(def).unwrap();

        let err = ns.validate().unwrap_err();
        assert!(matches!(err, FactGraphError::MissingDependencyReference { .. }));
    }
}
