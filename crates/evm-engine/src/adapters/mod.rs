//! # Adapters
//!
//! Concrete implementations of the `ports::outbound` traits: an in-memory
//! state store for tests and embeddings with no durability requirement, and
//! an optional RocksDB-backed durable store behind the `rocksdb-backend`
//! feature.

pub mod state_adapter;

#[cfg(feature = "rocksdb-backend")]
pub mod rocksdb_adapter;

pub use state_adapter::*;

#[cfg(feature = "rocksdb-backend")]
pub use rocksdb_adapter::*;
