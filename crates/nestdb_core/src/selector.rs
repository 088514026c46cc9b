//! Field-path selectors.

use crate::error::{Error, Result};
use sha2::{Digest, Sha256};
use std::fmt;

/// A non-empty path of field names into a record.
///
/// `Selector::new(["Address", "ZipCode"])` names the `ZipCode` field of
/// the nested `Address` object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector(Vec<String>);

impl Selector {
    /// Creates a selector from a field path.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::InvalidSelector`] when the path is empty or
    /// contains an empty field name.
    pub fn new<I, S>(path: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let fields: Vec<String> = path.into_iter().map(Into::into).collect();
        if fields.is_empty() {
            return Err(Error::invalid_selector("selector path is empty"));
        }
        if fields.iter().any(String::is_empty) {
            return Err(Error::invalid_selector("selector contains an empty field"));
        }
        Ok(Self(fields))
    }

    /// Returns the field path.
    #[must_use]
    pub fn fields(&self) -> &[String] {
        &self.0
    }

    /// Returns the stable hash identifying this selector across
    /// indexes.
    #[must_use]
    pub fn hash(&self) -> SelectorHash {
        let mut hasher = Sha256::new();
        for field in &self.0 {
            hasher.update(field.as_bytes());
            // Separator keeps ["ab","c"] distinct from ["a","bc"].
            hasher.update([0x1f]);
        }
        let digest = hasher.finalize();
        let first8: [u8; 8] = digest[..8].try_into().expect("8-byte prefix");
        SelectorHash(u64::from_be_bytes(first8))
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("."))
    }
}

/// Stable identifier of a selector, used to key per-index value
/// annotations on query results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SelectorHash(u64);

impl SelectorHash {
    /// Returns the raw hash value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SelectorHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_path_rejected() {
        assert!(Selector::new(Vec::<String>::new()).is_err());
        assert!(Selector::new(["a", ""]).is_err());
    }

    #[test]
    fn hash_is_stable_and_distinct() {
        let a = Selector::new(["Address", "ZipCode"]).unwrap();
        let b = Selector::new(["Address", "ZipCode"]).unwrap();
        let c = Selector::new(["AddressZip", "Code"]).unwrap();

        assert_eq!(a.hash(), b.hash());
        assert_ne!(a.hash(), c.hash());
    }

    #[test]
    fn boundary_ambiguity() {
        let a = Selector::new(["ab", "c"]).unwrap();
        let b = Selector::new(["a", "bc"]).unwrap();
        assert_ne!(a.hash(), b.hash());
    }

    #[test]
    fn display_joins_with_dots() {
        let s = Selector::new(["Address", "ZipCode"]).unwrap();
        assert_eq!(s.to_string(), "Address.ZipCode");
    }
}
