//! Input validation capabilities attached to facts that accept raw input
//! (§4.1, §4.5 of the design notes).
//!
//! A [`Schema`] is handed the raw `serde_json::Value` bound to a fact's
//! `InputName` before the fact's resolver runs, and reports which key-paths
//! within that value are invalid. A schema also declares its own shape via
//! [`Schema::key_map`], which the query layer (`crate::graph::query`) walks
//! to answer "which facts read key-path X" without invoking any resolver.

use crate::keypath::KeyPath;
use std::collections::BTreeMap;
use std::sync::Arc;

/// A single validation failure reported by a schema.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SchemaError {
    /// Key-path of the offending value, relative to the schema's root.
    pub path: KeyPath,
    /// Human-readable description of the failure.
    pub text: String,
}

impl SchemaError {
    pub fn new(path: KeyPath, text: impl Into<String>) -> Self {
        SchemaError { path, text: text.into() }
    }
}

/// The outcome of running a [`Schema`] against a candidate value.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SchemaResult {
    /// Whether the value matched the schema with no errors.
    pub success: bool,
    /// Validation failures, empty when `success` is true.
    pub errors: Vec<SchemaError>,
}

impl SchemaResult {
    pub fn ok() -> Self {
        SchemaResult { success: true, errors: Vec::new() }
    }

    pub fn fail(errors: Vec<SchemaError>) -> Self {
        SchemaResult { success: false, errors }
    }
}

/// Static shape of a schema's key space, used by the query layer to find
/// which declared key-paths a schema recognizes without running it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Key {
    /// A leaf value, a string, number, bool or opaque JSON scalar.
    Scalar,
    /// A homogeneous list, all of whose elements share one key shape.
    Array(Box<Key>),
    /// A record with named fields, each with its own key shape.
    Hash(BTreeMap<Arc<str>, Key>),
}

/// Top-level declared shape of a schema, rooted at the schema itself.
pub type KeyMap = Key;

impl Key {
    /// Every concrete key-path reachable under this shape, up to `max_depth`
    /// array expansions (arrays are represented once, with index `0`, since
    /// the number of elements is a runtime property of the data, not the
    /// schema).
    pub fn paths(&self) -> Vec<KeyPath> {
        let mut out = Vec::new();
        self.collect_paths(KeyPath::root(), &mut out);
        out
    }

    fn collect_paths(&self, prefix: KeyPath, out: &mut Vec<KeyPath>) {
        match self {
            Key::Scalar => out.push(prefix),
            Key::Array(elem) => {
                let indexed = prefix.join(0usize);
                elem.collect_paths(indexed, out);
            }
            Key::Hash(fields) => {
                if fields.is_empty() {
                    out.push(prefix);
                }
                for (name, shape) in fields {
                    shape.collect_paths(prefix.join(name.as_ref()), out);
                }
            }
        }
    }

    /// Whether `query` addresses a location that exists under this shape.
    /// Index segments in `query` match any `Array` segment in the shape
    /// regardless of the concrete index carried.
    pub fn matches(&self, query: &KeyPath) -> bool {
        self.matches_segments(query.segments())
    }

    fn matches_segments(&self, segments: &[crate::keypath::KeySegment]) -> bool {
        use crate::keypath::KeySegment;
        match (self, segments.split_first()) {
            (Key::Scalar, None) => true,
            (Key::Scalar, Some(_)) => false,
            (Key::Array(elem), Some((KeySegment::Index(_), rest))) => elem.matches_segments(rest),
            (Key::Array(_), _) => false,
            (Key::Hash(fields), Some((KeySegment::Name(name), rest))) => fields
                .get(name.as_ref())
                .map(|shape| shape.matches_segments(rest))
                .unwrap_or(false),
            (Key::Hash(_), _) => false,
        }
    }

    /// Restrict `value` to the sub-structure this shape recognizes,
    /// dropping any object key that has no corresponding member key (§4.3
    /// step 4, `key_map.write` fallback per the design notes). Values that
    /// don't match this shape's kind at all (e.g. a string where a `Hash`
    /// is expected) pass through unchanged, shape mismatches are a schema
    /// validation concern, not a filtering one.
    pub fn project(&self, value: &serde_json::Value) -> serde_json::Value {
        match (self, value) {
            (Key::Scalar, v) => v.clone(),
            (Key::Array(elem), serde_json::Value::Array(items)) => {
                serde_json::Value::Array(items.iter().map(|item| elem.project(item)).collect())
            }
            (Key::Hash(fields), serde_json::Value::Object(map)) => {
                let mut out = serde_json::Map::new();
                for (key, shape) in fields {
                    if let Some(v) = map.get(key.as_ref()) {
                        out.insert(key.to_string(), shape.project(v));
                    }
                }
                serde_json::Value::Object(out)
            }
            (_, v) => v.clone(),
        }
    }
}

/// Builder sugar for assembling a `Key::Hash` from named fields.
pub fn hash(fields: impl IntoIterator<Item = (&'static str, Key)>) -> Key {
    Key::Hash(fields.into_iter().map(|(k, v)| (Arc::from(k), v)).collect())
}

/// Builder sugar for `Key::Array`.
pub fn array(element: Key) -> Key {
    Key::Array(Box::new(element))
}

/// A validation capability bound to a fact's input. Implementors check a
/// raw JSON value against some expected shape and report where it fails.
///
/// Schemas are plain values, not resolvers: they never see dependency
/// results and must not perform I/O. Implementations are expected to be
/// cheap enough to run on every resolution of the fact they're attached to.
pub trait Schema: Send + Sync {
    /// Validate `value`, reporting every key-path at which it fails to
    /// match this schema's expected shape.
    fn call(&self, value: &serde_json::Value) -> SchemaResult;

    /// The static shape this schema enforces, used by the query layer.
    fn key_map(&self) -> &KeyMap;
}

/// A schema that checks a value's JSON type at the root, with no further
/// structural constraints. Useful for simple scalar inputs and as a
/// starting point for hand-rolled schemas.
pub struct JsonTypeSchema {
    expected: JsonType,
    key_map: KeyMap,
}

/// The JSON type categories [`JsonTypeSchema`] can check for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JsonType {
    Null,
    Bool,
    Number,
    String,
    Array,
    Object,
}

impl JsonTypeSchema {
    pub fn new(expected: JsonType) -> Self {
        JsonTypeSchema { expected, key_map: Key::Scalar }
    }

    fn type_name(ty: JsonType) -> &'static str {
        match ty {
            JsonType::Null => "Null",
            JsonType::Bool => "Boolean",
            JsonType::Number => "Numeric",
            JsonType::String => "String",
            JsonType::Array => "Array",
            JsonType::Object => "Hash",
        }
    }

    fn matches(value: &serde_json::Value, expected: JsonType) -> bool {
        match expected {
            JsonType::Null => value.is_null(),
            JsonType::Bool => value.is_boolean(),
            JsonType::Number => value.is_number(),
            JsonType::String => value.is_string(),
            JsonType::Array => value.is_array(),
            JsonType::Object => value.is_object(),
        }
    }
}

impl Schema for JsonTypeSchema {
    fn call(&self, value: &serde_json::Value) -> SchemaResult {
        if Self::matches(value, self.expected) {
            SchemaResult::ok()
        } else {
            SchemaResult::fail(vec![SchemaError::new(
                KeyPath::root(),
                format!("must be {}", Self::type_name(self.expected)),
            )])
        }
    }

    fn key_map(&self) -> &KeyMap {
        &self.key_map
    }
}
