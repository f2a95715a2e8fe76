//! SQLite-backed graph store

pub mod codec;
mod repository;

pub use repository::SqliteGraphStore;
