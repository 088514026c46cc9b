//! Decoding of encoded index values.
//!
//! Query execution compares encoded forms and never decodes; this module
//! exists so diagnostics and introspection tools can render stored keys.

use crate::error::{CodecError, CodecResult};
use crate::value::{Value, ValueKind};

/// Decodes a value previously produced by [`crate::encode`].
pub fn decode(kind: ValueKind, bytes: &[u8]) -> CodecResult<Value> {
    match kind {
        ValueKind::Text => String::from_utf8(bytes.to_vec())
            .map(Value::Text)
            .map_err(|_| CodecError::InvalidUtf8),
        ValueKind::Bytes => Ok(Value::Bytes(bytes.to_vec())),
        ValueKind::Int => decode_i64(kind, bytes).map(Value::Int),
        ValueKind::Time => decode_i64(kind, bytes).map(Value::Time),
        ValueKind::Uint => {
            let arr = fixed8(kind, bytes)?;
            Ok(Value::Uint(u64::from_be_bytes(arr)))
        }
    }
}

#[allow(clippy::cast_possible_wrap)]
fn decode_i64(kind: ValueKind, bytes: &[u8]) -> CodecResult<i64> {
    let arr = fixed8(kind, bytes)?;
    Ok((u64::from_be_bytes(arr) ^ (1 << 63)) as i64)
}

fn fixed8(kind: ValueKind, bytes: &[u8]) -> CodecResult<[u8; 8]> {
    bytes.try_into().map_err(|_| CodecError::InvalidLength {
        kind,
        expected: 8,
        actual: bytes.len(),
    })
}
