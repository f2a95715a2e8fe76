//! Domain layer
//!
//! Contains the graph model and the engines built on top of it.

pub mod graph;
