//! Fluent declaration sugar over the raw [`crate::graph::registry`] types
//! (§6's "declaration surface"). This is deliberately thin: the embedding
//! host language is expected to layer its own macro or builder surface on
//! top, but a convenient Rust-native one is provided here so a graph can be
//! declared directly against this crate.

use crate::graph::registry::{FactDef, InputDef, Namespace, Resolver, SourceLocation};
use crate::ids::{EntityName, FactName, InputName, ModuleName};
use crate::schema::Schema;
use crate::value::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Accumulates the pieces of a [`FactDef`] before it's registered.
pub struct FactDefBuilder {
    module_name: ModuleName,
    name: FactName,
    per_entity: Option<EntityName>,
    allow_unmet_dependencies: bool,
    inputs: Vec<InputDef>,
    dependencies: BTreeMap<FactName, ModuleName>,
    source_location: Option<SourceLocation>,
}

impl FactDefBuilder {
    pub fn new(module: impl Into<ModuleName>, name: impl Into<FactName>) -> Self {
        FactDefBuilder {
            module_name: module.into(),
            name: name.into(),
            per_entity: None,
            allow_unmet_dependencies: false,
            inputs: Vec::new(),
            dependencies: BTreeMap::new(),
            source_location: None,
        }
    }

    /// Declare this fact as producing one value per element of `entity`.
    pub fn per_entity(mut self, entity: impl Into<EntityName>) -> Self {
        self.per_entity = Some(entity.into());
        self
    }

    /// Let this fact's resolver see unmet dependencies via `data_errors()`
    /// instead of being skipped automatically.
    pub fn allow_unmet_dependencies(mut self) -> Self {
        self.allow_unmet_dependencies = true;
        self
    }

    /// Declare a top-level input, validated against `schema`.
    pub fn input(mut self, name: impl Into<InputName>, schema: Arc<dyn Schema>) -> Self {
        self.inputs.push(InputDef { name: name.into(), per_entity: false, schema });
        self
    }

    /// Declare an input read per-entity, from `input[per_entity][id][name]`.
    /// Only meaningful when this builder also called
    /// [`FactDefBuilder::per_entity`].
    pub fn per_entity_input(mut self, name: impl Into<InputName>, schema: Arc<dyn Schema>) -> Self {
        self.inputs.push(InputDef { name: name.into(), per_entity: true, schema });
        self
    }

    /// Declare a dependency on `name` in `module`.
    pub fn dependency(mut self, name: impl Into<FactName>, module: impl Into<ModuleName>) -> Self {
        self.dependencies.insert(name.into(), module.into());
        self
    }

    /// Declare a dependency on `name` in this fact's own module, the
    /// default when `from` is omitted in the declaration surface (§6).
    pub fn dependency_local(self, name: impl Into<FactName>) -> Self {
        let module = self.module_name.clone();
        self.dependency(name, module)
    }

    pub fn source_location(mut self, file: impl Into<String>, line: u32) -> Self {
        self.source_location = Some(SourceLocation { file: file.into(), line });
        self
    }

    /// Finish the declaration with a resolver function.
    pub fn resolve_with(self, resolver: impl Fn(&crate::graph::container::DataContainer) -> Value + Send + Sync + 'static) -> FactDef {
        self.build(Resolver::function(resolver))
    }

    fn build(self, resolver: Resolver) -> FactDef {
        FactDef {
            module_name: self.module_name,
            name: self.name,
            per_entity: self.per_entity,
            allow_unmet_dependencies: self.allow_unmet_dependencies,
            resolver,
            inputs: self.inputs,
            dependencies: self.dependencies,
            source_location: self.source_location,
        }
    }
}

/// Declaration sugar attached to a [`Namespace`]: `fact`, `constant`, and
/// lexical module overrides (§6).
impl Namespace {
    /// Start declaring a fact in the namespace's current module.
    pub fn fact(&self, name: impl Into<FactName>) -> FactDefBuilder {
        FactDefBuilder::new(self.current_module(), name)
    }

    /// `constant(name, value)`, a fact with a pure-value resolver, no
    /// inputs and no dependencies.
    pub fn constant(&self, name: impl Into<FactName>, value: impl Into<serde_json::Value>) -> crate::errors::Result<()> {
        let def = FactDefBuilder::new(self.current_module(), name).build(Resolver::Constant(Value::computed(value)));
        self.declare_fact(def)
    }

    /// Register a fact built with [`FactDefBuilder`] and a resolver
    /// function in one call.
    pub fn declare(
        &self,
        builder: FactDefBuilder,
        resolver: impl Fn(&crate::graph::container::DataContainer) -> Value + Send + Sync + 'static,
    ) -> crate::errors::Result<()> {
        self.declare_fact(builder.resolve_with(resolver))
    }

    /// `in_module(name) { ... }` sugar: run `body` with `name` pushed as
    /// the active lexical module override for every declaration inside.
    pub fn in_module_block(&self, module: impl Into<ModuleName>, body: impl FnOnce()) {
        let _scope = self.in_module(module);
        body();
    }
}
