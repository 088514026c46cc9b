//! # NestDB KV
//!
//! The ordered key/value engine contract NestDB core is written against,
//! plus the two built-in engines:
//!
//! - [`MemoryEngine`]: copy-on-write snapshot buckets, for tests and
//!   ephemeral databases
//! - [`FileEngine`]: the in-memory state layered over a CRC-checked
//!   append-only journal with an advisory directory lock
//!
//! Engines expose buckets (ordered maps of byte keys to byte values),
//! bidirectional cursors, and serializable transactions: any number of
//! concurrent snapshot readers, at most one writer.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod engine;
mod error;
mod file;
mod memory;

pub use engine::{Bucket, BucketMut, Cursor, Engine, ReadTx, WriteTx};
pub use error::{KvError, KvResult};
pub use file::FileEngine;
pub use memory::MemoryEngine;
