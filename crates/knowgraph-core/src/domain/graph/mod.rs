//! Semantic knowledge graph
//!
//! Stores short text nodes with embeddings and typed, weighted edges per
//! workspace, and layers analytics on top:
//!
//! - **Relationship discovery**: link new nodes to similar existing ones
//! - **Queries**: vector KNN plus bounded path finding between top hits
//! - **Clustering**: community detection, k-means, hierarchical
//! - **Metrics**: density, degree, clustering coefficient, centrality
//! - **Insights**: patterns, gaps, contradictions, trends
//! - **Evolution log**: TTL-bounded audit of every mutation
//!
//! ## Architecture
//!
//! ```text
//!   EmbeddingProvider ──► KnowledgeGraphService ──► GraphStore (SQLite)
//!                              │
//!        ┌──────────┬──────────┼───────────┬────────────┐
//!   Discovery   QueryEngine  Clustering  Metrics   InsightEngine
//!        └──────────┴─────── EvolutionLog ─────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use knowgraph_core::prelude::*;
//!
//! let store = Arc::new(SqliteGraphStore::new(db.pool().clone()));
//! let service = KnowledgeGraphService::new(store, Arc::new(HashingEmbeddingProvider::default()), Config::load()?);
//!
//! let added = service
//!     .add_node("research", NodeType::insight(), "Deep learning requires large datasets", NodeMetadata::default(), "alice")
//!     .await?;
//! let result = service.search("research", "training data").await;
//! ```

mod cluster;
mod clustering;
mod discovery;
mod edge;
mod embedding;
mod evolution;
mod insight;
mod insights;
mod metrics;
mod node;
mod path;
mod query;
mod service;
mod similarity;
mod store;

pub use cluster::{ClusteringAlgorithm, KnowledgeCluster};
pub use clustering::{Clusterer, ClusteringEngine, membership};
pub use discovery::{DiscoveryOutcome, RelationshipDiscovery, infer_relationship_type};
pub use edge::{Direction, KnowledgeEdge, NodeAdjacency, RelationshipType, validate_strength};
pub use embedding::{Embedding, EmbeddingProvider};
pub use evolution::{ChangeKind, EvolutionLog, ImpactEstimate, KnowledgeEvolution};
pub use insight::{InsightImpact, InsightType, KnowledgeInsight, sort_by_confidence};
pub use insights::InsightEngine;
pub use metrics::{GraphMetrics, MetricsCalculator, clustering_coefficient, compute_metrics, degrees};
pub use node::{KnowledgeNode, NodeMetadata, NodeType};
pub use path::{KnowledgePath, PathFinder, PathType, path_score};
pub use query::{GraphQuery, QueryEngine, QueryResult};
pub use service::{AddNodeOutcome, KnowledgeGraphService};
pub use similarity::{average_linkage, average_pairwise_similarity, cosine_similarity, mean_vector};
pub use store::{GraphStats, GraphStore, PurgeStats, ScoredNode};
