//! Infrastructure layer
//!
//! Adapters for the ports the domain defines: the SQLite graph store and the
//! embedding providers.

pub mod embedding;
pub mod graph;
