//! Storage layer - SQLite
//!
//! Provides database management and migrations for the graph store.
//!
//! # Architecture
//!
//! - `database`: Connection pool management and initialization
//! - `migrations`: Schema versioning and automatic migration
//!
//! # Usage
//!
//! ```ignore
//! use knowgraph_core::storage::{Database, DatabaseConfig};
//!
//! // In-memory database for tests
//! let db = Database::in_memory().await?;
//!
//! // File-backed database at the platform data dir
//! let db = Database::new(DatabaseConfig::default()).await?;
//! ```

pub mod database;
pub mod migrations;

pub use database::{Database, DatabaseConfig};
pub use migrations::{CURRENT_VERSION, MigrationStatus, migration_status, run_migrations};
