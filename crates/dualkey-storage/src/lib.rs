//! # dualkey-storage
//!
//! Storage abstraction layer for dualkey using RocksDB.
//!
//! Services are generic over [`Storage`] so tests and alternative backends
//! can stand in for RocksDB.

#![warn(clippy::all)]

pub mod column_families;
pub mod errors;
pub mod rocksdb_impl;
pub mod traits;

pub use column_families::*;
pub use errors::{Result, StorageError};
pub use rocksdb_impl::RocksDbStorage;
pub use traits::{Batch, BatchExt, Storage};
