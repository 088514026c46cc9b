//! # NestDB Codec
//!
//! Order-preserving byte encodings for the scalar types NestDB can index.
//!
//! This crate provides:
//! - [`Value`]: a tagged scalar over text, signed/unsigned integers,
//!   time instants and byte strings
//! - [`encode`] / [`encode_as`]: deterministic encodings whose
//!   lexicographic byte order matches the natural order of the value
//! - [`decode`]: the inverse, used for diagnostics only
//!
//! Index lookups never decode: range and equality comparisons operate on
//! the encoded forms directly.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod decode;
mod encode;
mod error;
mod value;

pub use decode::decode;
pub use encode::{encode, encode_as};
pub use error::{CodecError, CodecResult};
pub use value::{Value, ValueKind};
