//! Tagged scalar values.

use crate::error::CodecError;
use std::fmt;

/// The scalar types a secondary index can be declared over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ValueKind {
    /// UTF-8 text, compared bytewise.
    Text = 0,
    /// Signed 64-bit integer.
    Int = 1,
    /// Unsigned 64-bit integer.
    Uint = 2,
    /// Time instant, nanoseconds since the Unix epoch.
    Time = 3,
    /// Raw byte string.
    Bytes = 4,
}

impl ValueKind {
    /// Converts the kind to its persistence tag byte.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        self as u8
    }

    /// Converts a persistence tag byte back to a kind.
    pub fn from_byte(tag: u8) -> Result<Self, CodecError> {
        match tag {
            0 => Ok(Self::Text),
            1 => Ok(Self::Int),
            2 => Ok(Self::Uint),
            3 => Ok(Self::Time),
            4 => Ok(Self::Bytes),
            _ => Err(CodecError::UnknownKind { tag }),
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Text => "text",
            Self::Int => "int",
            Self::Uint => "uint",
            Self::Time => "time",
            Self::Bytes => "bytes",
        };
        f.write_str(name)
    }
}

/// A typed scalar value.
///
/// Filter values and indexed values are heterogeneous scalars; the tag
/// carries the declared type so that type checking happens at
/// construction rather than deep inside query execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// UTF-8 text.
    Text(String),
    /// Signed 64-bit integer.
    Int(i64),
    /// Unsigned 64-bit integer.
    Uint(u64),
    /// Time instant, nanoseconds since the Unix epoch.
    Time(i64),
    /// Raw byte string.
    Bytes(Vec<u8>),
}

impl Value {
    /// Returns the kind of this value.
    #[must_use]
    pub const fn kind(&self) -> ValueKind {
        match self {
            Self::Text(_) => ValueKind::Text,
            Self::Int(_) => ValueKind::Int,
            Self::Uint(_) => ValueKind::Uint,
            Self::Time(_) => ValueKind::Time,
            Self::Bytes(_) => ValueKind::Bytes,
        }
    }

    /// Coerces a JSON node to a value of the requested kind.
    ///
    /// Returns `None` when the node's runtime type does not match the
    /// requested kind. This is the non-fatal path: a record whose field
    /// does not coerce simply does not participate in that index.
    ///
    /// Coercion rules:
    /// - `Text` from JSON strings
    /// - `Int` from numbers representable as `i64`
    /// - `Uint` from non-negative integers
    /// - `Time` from integer nanosecond timestamps
    /// - `Bytes` from JSON strings, taking their raw UTF-8 bytes
    #[must_use]
    pub fn from_json(kind: ValueKind, node: &serde_json::Value) -> Option<Self> {
        match kind {
            ValueKind::Text => node.as_str().map(|s| Self::Text(s.to_owned())),
            ValueKind::Int => node.as_i64().map(Self::Int),
            ValueKind::Uint => node.as_u64().map(Self::Uint),
            ValueKind::Time => node.as_i64().map(Self::Time),
            ValueKind::Bytes => node.as_str().map(|s| Self::Bytes(s.as_bytes().to_vec())),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) => write!(f, "{s:?}"),
            Self::Int(n) => write!(f, "{n}"),
            Self::Uint(n) => write!(f, "{n}"),
            Self::Time(n) => write!(f, "t:{n}"),
            Self::Bytes(b) => write!(f, "0x{}", hex(b)),
        }
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Text(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<u64> for Value {
    fn from(n: u64) -> Self {
        Self::Uint(n)
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Self::Bytes(b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn kind_tag_round_trip() {
        for kind in [
            ValueKind::Text,
            ValueKind::Int,
            ValueKind::Uint,
            ValueKind::Time,
            ValueKind::Bytes,
        ] {
            assert_eq!(ValueKind::from_byte(kind.as_byte()).unwrap(), kind);
        }
        assert!(ValueKind::from_byte(17).is_err());
    }

    #[test]
    fn from_json_matching_types() {
        let doc = json!({"name": "alice", "age": 30, "balance": -5});

        assert_eq!(
            Value::from_json(ValueKind::Text, &doc["name"]),
            Some(Value::Text("alice".into()))
        );
        assert_eq!(
            Value::from_json(ValueKind::Uint, &doc["age"]),
            Some(Value::Uint(30))
        );
        assert_eq!(
            Value::from_json(ValueKind::Int, &doc["balance"]),
            Some(Value::Int(-5))
        );
        assert_eq!(
            Value::from_json(ValueKind::Bytes, &doc["name"]),
            Some(Value::Bytes(b"alice".to_vec()))
        );
    }

    #[test]
    fn from_json_mismatch_is_none() {
        let doc = json!({"name": "alice", "balance": -5});

        assert_eq!(Value::from_json(ValueKind::Int, &doc["name"]), None);
        assert_eq!(Value::from_json(ValueKind::Uint, &doc["balance"]), None);
        assert_eq!(Value::from_json(ValueKind::Text, &doc["missing"]), None);
    }

    #[test]
    fn value_conversions() {
        assert_eq!(Value::from("f").kind(), ValueKind::Text);
        assert_eq!(Value::from(19i64).kind(), ValueKind::Int);
        assert_eq!(Value::from(19u64).kind(), ValueKind::Uint);
        assert_eq!(Value::from(vec![1u8, 2]).kind(), ValueKind::Bytes);
    }
}
