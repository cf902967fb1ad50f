//! Opaque symbolic identifiers used throughout the graph.
//!
//! `ModuleName`, `FactName`, `EntityName` and `InputName` are thin wrappers
//! around `Arc<str>` so that cloning an identifier (which happens on every
//! registry lookup and cache key) is a refcount bump rather than a heap
//! allocation.

use std::fmt;
use std::sync::Arc;

macro_rules! symbolic_id {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(Arc<str>);

        impl $name {
            /// Wrap a string as this identifier kind.
            pub fn new(s: impl Into<Arc<str>>) -> Self {
                Self(s.into())
            }

            /// Borrow the identifier as a plain string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self::new(s)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self::new(s)
            }
        }

        impl serde::Serialize for $name {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: serde::Serializer,
            {
                serializer.serialize_str(&self.0)
            }
        }

        impl<'de> serde::Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                let s = String::deserialize(deserializer)?;
                Ok(Self::new(s))
            }
        }
    };
}

symbolic_id!(ModuleName);
symbolic_id!(FactName);
symbolic_id!(EntityName);
symbolic_id!(InputName);

/// Non-negative index of an entity within its input collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityId(usize);

use serde::{Deserialize, Serialize};

impl EntityId {
    /// Build an `EntityId` from a raw index.
    pub fn new(index: usize) -> Self {
        Self(index)
    }

    /// The raw index this id wraps.
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<usize> for EntityId {
    fn from(index: usize) -> Self {
        Self(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifiers_compare_by_value() {
        let a = ModuleName::new("math");
        let b = ModuleName::from("math");
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "math");
    }

    #[test]
    fn entity_id_orders_numerically() {
        let mut ids = vec![EntityId::new(3), EntityId::new(1), EntityId::new(2)];
        ids.sort();
        assert_eq!(ids, vec![EntityId::new(1), EntityId::new(2), EntityId::new(3)]);
    }
}
