use crate::ids::{EntityId, FactName, ModuleName};
use thiserror::Error;

/// Fatal error types that can occur while building or evaluating a graph.
///
/// These are failure modes of the engine itself, not of the data being
/// evaluated, a rejected input or an unmet dependency is represented as
/// [`crate::value::Value::Errors`], never as a `FactGraphError`.
#[derive(Error, Debug)]
pub enum FactGraphError {
    /// A `dependency` declaration named a `(module, name)` pair that does
    /// not exist anywhere in the built graph.
    #[error("fact {module}.{name} depends on {missing_module}.{missing_name}, which is not in the graph")]
    MissingDependencyReference {
        /// Module of the fact whose dependency could not be resolved.
        module: ModuleName,
        /// Name of the fact whose dependency could not be resolved.
        name: FactName,
        /// Module named in the dangling dependency reference.
        missing_module: ModuleName,
        /// Fact name named in the dangling dependency reference.
        missing_name: FactName,
    },

    /// A resolver panicked instead of returning a value.
    #[error("resolver for {module}.{name} panicked: {message}")]
    ResolverPanic {
        /// Module of the fact whose resolver panicked.
        module: ModuleName,
        /// Name of the fact whose resolver panicked.
        name: FactName,
        /// Panic payload, converted to a string where possible.
        message: String,
    },

    /// The schema capability raised an unexpected error while validating an
    /// input (as opposed to returning a structured `SchemaResult`).
    #[error("schema for {module}.{name} raised an unexpected error: {message}")]
    SchemaFailure {
        /// Module of the fact whose schema invocation failed.
        module: ModuleName,
        /// Name of the fact whose schema invocation failed.
        name: FactName,
        /// Error message from the schema capability.
        message: String,
    },

    /// Two `FactDef`s were declared with the same `(module, name)` pair.
    #[error("fact {module}.{name} is already declared")]
    DuplicateFactDeclaration {
        /// Module of the duplicate declaration.
        module: ModuleName,
        /// Name of the duplicate declaration.
        name: FactName,
    },

    /// A module filter named a module with no matching declarations in the
    /// registry.
    #[error("module '{module}' has no declared facts")]
    UnknownModule {
        /// The module name that was filtered on.
        module: ModuleName,
    },

    /// A per-entity fact was resolved without an entity id, or a
    /// non-per-entity fact was resolved with one. Indicates a bug in graph
    /// construction rather than a malformed input.
    #[error("fact {module}.{name} was addressed with an inconsistent entity id ({entity_id:?})")]
    InconsistentEntityAddressing {
        /// Module of the misaddressed fact.
        module: ModuleName,
        /// Name of the misaddressed fact.
        name: FactName,
        /// Entity id involved, if any.
        entity_id: Option<EntityId>,
    },

    /// A build-time cycle was detected by the opt-in cycle checker.
    #[error("cyclic dependency detected: {}", path.iter().map(|(m, n)| format!("{m}.{n}")).collect::<Vec<_>>().join(" -> "))]
    CyclicDependency {
        /// The cycle, as an ordered sequence of `(module, name)` pairs.
        path: Vec<(ModuleName, FactName)>,
    },
}

/// Convenient `Result` alias for fallible FactGraph operations.
pub type Result<T> = std::result::Result<T, FactGraphError>;
