//! # Durable Storage
//!
//! redb-backed implementations of the persistence traits.

mod redb_library;

pub use redb_library::RedbGraphLibrary;
