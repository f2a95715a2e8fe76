//! Knowgraph Core Library
//!
//! Semantic knowledge graph for agent workspaces:
//! - Nodes with embeddings and typed, weighted edges (per workspace)
//! - Automatic relationship discovery on insert
//! - Natural-language queries with path finding
//! - Clustering, graph metrics and generated insights
//! - TTL-bounded evolution log
//! - Storage (SQLite via sqlx)

pub mod config;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod logging;
pub mod storage;

pub use error::{Error, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::domain::graph::{
        ClusteringAlgorithm, EmbeddingProvider, GraphQuery, GraphStore, KnowledgeCluster,
        KnowledgeEdge, KnowledgeGraphService, KnowledgeInsight, KnowledgeNode, NodeMetadata,
        NodeType, QueryResult, RelationshipType,
    };
    pub use crate::error::{Error, Result};
    pub use crate::infrastructure::embedding::{HashingEmbeddingProvider, HttpEmbeddingProvider};
    pub use crate::infrastructure::graph::SqliteGraphStore;
    pub use crate::storage::Database;
}
