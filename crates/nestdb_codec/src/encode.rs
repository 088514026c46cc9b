//! Order-preserving encoding.

use crate::error::{CodecError, CodecResult};
use crate::value::{Value, ValueKind};

/// Encodes a value so that lexicographic byte order matches the natural
/// order of the value.
///
/// - `Int` and `Time` flip the sign bit of the big-endian form, so
///   negative values sort before positive ones
/// - `Uint` encodes as fixed-width big-endian
/// - `Text` and `Bytes` encode as their raw bytes
#[must_use]
pub fn encode(value: &Value) -> Vec<u8> {
    match value {
        Value::Text(s) => s.as_bytes().to_vec(),
        Value::Bytes(b) => b.clone(),
        Value::Int(n) | Value::Time(n) => encode_i64(*n).to_vec(),
        Value::Uint(n) => n.to_be_bytes().to_vec(),
    }
}

/// Encodes a value after checking it against a declared kind.
///
/// This is the fatal path used when executing explicitly constructed
/// filters: a filter value whose kind disagrees with the index's
/// declared kind is a caller error, not a silent skip.
pub fn encode_as(kind: ValueKind, value: &Value) -> CodecResult<Vec<u8>> {
    if value.kind() != kind {
        return Err(CodecError::TypeMismatch {
            expected: kind,
            actual: value.kind(),
        });
    }
    Ok(encode(value))
}

/// Flipping the sign bit makes the big-endian form of an i64 sort in
/// numeric order.
#[allow(clippy::cast_sign_loss)]
pub(crate) fn encode_i64(n: i64) -> [u8; 8] {
    ((n as u64) ^ (1 << 63)).to_be_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn int_order_around_zero() {
        let neg = encode(&Value::Int(-1));
        let zero = encode(&Value::Int(0));
        let pos = encode(&Value::Int(1));

        assert!(neg < zero);
        assert!(zero < pos);
    }

    #[test]
    fn int_extremes() {
        let min = encode(&Value::Int(i64::MIN));
        let max = encode(&Value::Int(i64::MAX));

        assert_eq!(min, vec![0u8; 8]);
        assert_eq!(max, vec![0xff; 8]);
    }

    #[test]
    fn text_is_raw_bytes() {
        assert_eq!(encode(&Value::Text("abc".into())), b"abc".to_vec());
    }

    #[test]
    fn encode_as_checks_kind() {
        let err = encode_as(ValueKind::Int, &Value::Text("x".into())).unwrap_err();
        assert_eq!(
            err,
            CodecError::TypeMismatch {
                expected: ValueKind::Int,
                actual: ValueKind::Text,
            }
        );

        assert!(encode_as(ValueKind::Time, &Value::Time(42)).is_ok());
    }

    proptest! {
        #[test]
        fn int_encoding_preserves_order(a: i64, b: i64) {
            let ea = encode(&Value::Int(a));
            let eb = encode(&Value::Int(b));
            prop_assert_eq!(a.cmp(&b), ea.cmp(&eb));
        }

        #[test]
        fn uint_encoding_preserves_order(a: u64, b: u64) {
            let ea = encode(&Value::Uint(a));
            let eb = encode(&Value::Uint(b));
            prop_assert_eq!(a.cmp(&b), ea.cmp(&eb));
        }

        #[test]
        fn time_encoding_preserves_order(a: i64, b: i64) {
            let ea = encode(&Value::Time(a));
            let eb = encode(&Value::Time(b));
            prop_assert_eq!(a.cmp(&b), ea.cmp(&eb));
        }
    }
}
