//! # NestDB Testkit
//!
//! Test fixtures and deterministic dataset generators shared by the
//! NestDB test suites.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod fixtures;
mod generators;

pub use fixtures::{init_tracing, with_temp_db, TestDatabase};
pub use generators::{standard_indexes, user_dataset, Address, User};
