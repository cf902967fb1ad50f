//! Key-paths address a location in a nested input record: an ordered
//! sequence of name segments (object keys) and index segments (array
//! positions). See [`crate::schema`] for how schemas match against them.

use std::fmt;
use std::sync::Arc;

/// A single segment of a [`KeyPath`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum KeySegment {
    /// A named object key.
    Name(Arc<str>),
    /// An array index. Any concrete index matches an `Index` segment when
    /// comparing a query path against a schema's declared key-paths. The
    /// position itself is not significant to matching, only its presence.
    Index(usize),
}

impl fmt::Display for KeySegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeySegment::Name(n) => f.write_str(n),
            KeySegment::Index(i) => write!(f, "{i}"),
        }
    }
}

impl From<&str> for KeySegment {
    fn from(s: &str) -> Self {
        KeySegment::Name(Arc::from(s))
    }
}

impl From<usize> for KeySegment {
    fn from(i: usize) -> Self {
        KeySegment::Index(i)
    }
}

/// An ordered sequence of [`KeySegment`]s addressing a location in a nested
/// input record, e.g. `[:circles, 0, :radius]`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct KeyPath(Vec<KeySegment>);

impl KeyPath {
    /// The empty key-path.
    pub fn root() -> Self {
        KeyPath(Vec::new())
    }

    /// Build a key-path from a slice of segments.
    pub fn new(segments: impl IntoIterator<Item = KeySegment>) -> Self {
        KeyPath(segments.into_iter().collect())
    }

    /// A single-name key-path, e.g. `KeyPath::of("scale")`.
    pub fn of(name: &str) -> Self {
        KeyPath(vec![KeySegment::from(name)])
    }

    /// Append a segment, returning the extended path.
    pub fn join(&self, segment: impl Into<KeySegment>) -> Self {
        let mut segments = self.0.clone();
        segments.push(segment.into());
        KeyPath(segments)
    }

    /// The segments making up this path.
    pub fn segments(&self) -> &[KeySegment] {
        &self.0
    }

    /// The first segment, if any.
    pub fn head(&self) -> Option<&KeySegment> {
        self.0.first()
    }

    /// Every segment after the first.
    pub fn tail(&self) -> KeyPath {
        KeyPath(self.0.iter().skip(1).cloned().collect())
    }

    /// Whether this path has no segments.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl fmt::Display for KeyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, seg) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{seg}")?;
        }
        write!(f, "]")
    }
}

impl FromIterator<KeySegment> for KeyPath {
    fn from_iter<I: IntoIterator<Item = KeySegment>>(iter: I) -> Self {
        KeyPath(iter.into_iter().collect())
    }
}

// KeyPath is used as a BTreeMap key inside `Value::Errors`, which derives
// `Serialize`/`Deserialize` for JSON transport, map keys must serialize to
// plain strings, so this round-trips through the `[a, 0, b]` display form
// rather than a JSON array.
impl serde::Serialize for KeyPath {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> serde::Deserialize<'de> for KeyPath {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(parse_display_form(&s))
    }
}

fn parse_display_form(s: &str) -> KeyPath {
    let inner = s.trim().trim_start_matches('[').trim_end_matches(']');
    if inner.is_empty() {
        return KeyPath::root();
    }
    inner
        .split(", ")
        .map(|segment| match segment.parse::<usize>() {
            Ok(index) => KeySegment::Index(index),
            Err(_) => KeySegment::from(segment),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_extends_the_path() {
        let p = KeyPath::of("circles").join(0usize).join("radius");
        assert_eq!(p.to_string(), "[circles, 0, radius]");
        assert_eq!(p.len(), 3);
    }

    #[test]
    fn serde_round_trips_through_the_display_form() {
        let p = KeyPath::of("circles").join(0usize).join("radius");
        let json = serde_json::to_string(&p).unwrap();
        let back: KeyPath = serde_json::from_str(&json).unwrap();
        assert_eq!(p, back);
        assert_eq!(parse_display_form("[]"), KeyPath::root());
    }

    #[test]
    fn head_and_tail_split_the_path() {
        let p = KeyPath::of("circles").join(0usize).join("radius");
        assert_eq!(p.head(), Some(&KeySegment::from("circles")));
        assert_eq!(p.tail(), KeyPath::new([KeySegment::from(0usize), KeySegment::from("radius")]));
    }
}
