//! Per-key shape resolution
//!
//! A key can be rewritten with a value of a different type at any time, so
//! the shape is asked for with `TYPE` on every access and never cached.

use std::fmt;
use tracing::warn;

use storelens_common::{Column, Error, Result};

use crate::client::KvConnection;
use crate::resp::Cmd;

/// Native value shapes of a key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Shape {
    /// `string`: one value
    Scalar,
    /// `hash`: field to value map
    Mapping,
    /// `list`: ordered values, duplicates allowed
    Sequence,
    /// `set`: unordered unique members
    UniqueSet,
    /// `zset`: unique members ordered by score
    OrderedSet,
}

impl Shape {
    pub const ALL: [Shape; 5] = [
        Shape::Scalar,
        Shape::Mapping,
        Shape::Sequence,
        Shape::UniqueSet,
        Shape::OrderedSet,
    ];

    /// Shape for a `TYPE` reply; `None` for `none` and unknown types
    #[must_use]
    pub fn from_native(name: &str) -> Option<Self> {
        Shape::ALL.into_iter().find(|s| s.native_name() == name)
    }

    #[must_use]
    pub fn native_name(self) -> &'static str {
        match self {
            Shape::Scalar => "string",
            Shape::Mapping => "hash",
            Shape::Sequence => "list",
            Shape::UniqueSet => "set",
            Shape::OrderedSet => "zset",
        }
    }

    /// Column names of the tabular projection
    #[must_use]
    pub fn column_names(self) -> &'static [&'static str] {
        match self {
            Shape::Scalar => &["value"],
            Shape::Mapping => &["field", "value"],
            Shape::Sequence | Shape::UniqueSet => &["index", "value"],
            Shape::OrderedSet => &["index", "member", "score"],
        }
    }

    #[must_use]
    pub fn columns(self) -> Vec<Column> {
        self.column_names().iter().map(|n| Column::string(*n)).collect()
    }

    /// Command reporting the key's size attribute
    #[must_use]
    pub fn size_command(self, key: &str) -> Cmd {
        let name = match self {
            Shape::Scalar => "STRLEN",
            Shape::Mapping => "HLEN",
            Shape::Sequence => "LLEN",
            Shape::UniqueSet => "SCARD",
            Shape::OrderedSet => "ZCARD",
        };
        Cmd::new(name).arg(key)
    }

    /// Whether the backend can read an index window of this shape
    #[must_use]
    pub fn has_native_range(self) -> bool {
        matches!(self, Shape::Sequence | Shape::OrderedSet)
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.native_name())
    }
}

/// Parses a `TYPE` reply into a shape, failing `UnsupportedShape` with the
/// native name for missing keys and unknown types
pub fn parse_native(key: &str, native: &str) -> Result<Shape> {
    Shape::from_native(native).ok_or_else(|| {
        warn!(unit = %key, native_type = %native, "Unsupported shape");
        Error::UnsupportedShape(native.to_string())
    })
}

/// Asks the backend for the current shape of `key`
pub async fn resolve<K: KvConnection>(conn: &mut K, key: &str) -> Result<Shape> {
    let native = conn
        .query(&Cmd::new("TYPE").arg(key))
        .await?
        .into_string()?
        .unwrap_or_default();
    parse_native(key, &native)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("string", Some(Shape::Scalar))]
    #[case("hash", Some(Shape::Mapping))]
    #[case("list", Some(Shape::Sequence))]
    #[case("set", Some(Shape::UniqueSet))]
    #[case("zset", Some(Shape::OrderedSet))]
    #[case("none", None)]
    #[case("stream", None)]
    fn test_from_native(#[case] native: &str, #[case] expected: Option<Shape>) {
        assert_eq!(Shape::from_native(native), expected);
    }

    #[test]
    fn test_unknown_shape_carries_native_name() {
        let err = parse_native("events", "stream").unwrap_err();
        assert!(matches!(err, Error::UnsupportedShape(ref n) if n == "stream"));
    }

    #[test]
    fn test_columns_are_strings() {
        let columns = Shape::OrderedSet.columns();
        assert_eq!(columns.len(), 3);
        assert!(columns.iter().all(|c| c.ty == "string"));
        assert_eq!(Shape::Mapping.column_names(), &["field", "value"]);
    }

    #[test]
    fn test_size_commands() {
        assert_eq!(Shape::Scalar.size_command("k").to_string(), "STRLEN k");
        assert_eq!(Shape::OrderedSet.size_command("k").to_string(), "ZCARD k");
    }
}
