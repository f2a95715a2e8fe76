//! Graph store port
//!
//! This module defines the trait for graph storage operations. Every call is
//! scoped to a workspace; records from different workspaces never mix.

use std::collections::{BTreeMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::cluster::{ClusteringAlgorithm, KnowledgeCluster};
use super::edge::{KnowledgeEdge, NodeAdjacency};
use super::evolution::KnowledgeEvolution;
use super::insight::KnowledgeInsight;
use super::node::{KnowledgeNode, NodeType};
use crate::error::Result;

/// A node paired with its similarity to a query vector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredNode {
    pub node: KnowledgeNode,
    pub similarity: f32,
}

/// Rows removed by an expiry sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PurgeStats {
    pub evolution: u64,
    pub clusters: u64,
    pub insights: u64,
}

impl PurgeStats {
    pub fn total(&self) -> u64 {
        self.evolution + self.clusters + self.insights
    }
}

/// Record counts for a workspace
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphStats {
    pub node_count: u64,
    pub edge_count: u64,
    pub nodes_by_type: BTreeMap<String, u64>,
    pub edges_by_relationship: BTreeMap<String, u64>,
    pub average_strength: f64,
    pub evolution_entries: u64,
}

/// Storage backend for the knowledge graph
///
/// Implementations must keep the adjacency index in lockstep with the edge
/// table and treat adjacency inserts as idempotent set adds.
#[async_trait]
pub trait GraphStore: Send + Sync {
    // ========== Node Operations ==========

    /// Persist a node together with its embedding
    async fn insert_node(&self, node: &KnowledgeNode) -> Result<()>;

    /// Get a node by ID
    async fn get_node(&self, workspace: &str, id: &str) -> Result<Option<KnowledgeNode>>;

    /// List all nodes in insertion order
    async fn list_nodes(&self, workspace: &str) -> Result<Vec<KnowledgeNode>>;

    /// Check whether a node exists
    async fn node_exists(&self, workspace: &str, id: &str) -> Result<bool>;

    /// Count nodes
    async fn count_nodes(&self, workspace: &str) -> Result<u64>;

    /// Delete a node; incident edges and adjacency entries go with it
    async fn delete_node(&self, workspace: &str, id: &str) -> Result<bool>;

    /// Embedding dimension fixed by the first stored node, if any
    async fn embedding_dimension(&self, workspace: &str) -> Result<Option<usize>>;

    // ========== Edge Operations ==========

    /// Persist an edge and both adjacency entries atomically
    ///
    /// Fails with `NodeNotFound` when either endpoint is missing; nothing is
    /// written in that case.
    async fn insert_edge(&self, edge: &KnowledgeEdge) -> Result<()>;

    /// Get an edge by ID
    async fn get_edge(&self, workspace: &str, id: &str) -> Result<Option<KnowledgeEdge>>;

    /// List all edges in insertion order
    async fn list_edges(&self, workspace: &str) -> Result<Vec<KnowledgeEdge>>;

    /// Count edges
    async fn count_edges(&self, workspace: &str) -> Result<u64>;

    /// Delete an edge and its adjacency entries
    async fn delete_edge(&self, workspace: &str, id: &str) -> Result<bool>;

    // ========== Adjacency ==========

    /// Outgoing and incoming edge ids of a node
    async fn adjacency(&self, workspace: &str, node_id: &str) -> Result<NodeAdjacency>;

    /// Edges incident to a node, in either direction
    async fn edges_for_node(&self, workspace: &str, node_id: &str) -> Result<Vec<KnowledgeEdge>>;

    /// Union of in- and out-neighbor ids
    async fn neighbor_ids(&self, workspace: &str, node_id: &str) -> Result<Vec<String>> {
        let edges = self.edges_for_node(workspace, node_id).await?;
        let mut seen = HashSet::new();
        let mut neighbors = Vec::new();
        for edge in &edges {
            if let Some(other) = edge.other_end(node_id) {
                if other != node_id && seen.insert(other.to_string()) {
                    neighbors.push(other.to_string());
                }
            }
        }
        Ok(neighbors)
    }

    // ========== Vector Search ==========

    /// K nearest nodes to `query` by cosine similarity, best first
    ///
    /// Nodes whose embedding dimension differs from the query are skipped.
    async fn nearest_nodes(
        &self,
        workspace: &str,
        query: &[f32],
        limit: usize,
        node_type: Option<&NodeType>,
    ) -> Result<Vec<ScoredNode>>;

    // ========== Evolution Log ==========

    /// Append an evolution entry
    async fn append_evolution(&self, entry: &KnowledgeEvolution) -> Result<()>;

    /// Unexpired entries, newest first
    async fn evolution_history(
        &self,
        workspace: &str,
        limit: usize,
    ) -> Result<Vec<KnowledgeEvolution>>;

    /// Unexpired entries with timestamp >= `since`, oldest first
    async fn evolution_since(
        &self,
        workspace: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<KnowledgeEvolution>>;

    /// Delete evolution entries, clusters and insights expired at `now`
    async fn purge_expired(&self, workspace: &str, now: DateTime<Utc>) -> Result<PurgeStats>;

    // ========== Derived Caches ==========

    /// Replace the cached clusters for an algorithm
    async fn save_clusters(
        &self,
        workspace: &str,
        algorithm: ClusteringAlgorithm,
        clusters: &[KnowledgeCluster],
    ) -> Result<()>;

    /// Unexpired cached clusters for an algorithm
    async fn load_clusters(
        &self,
        workspace: &str,
        algorithm: ClusteringAlgorithm,
    ) -> Result<Vec<KnowledgeCluster>>;

    /// Replace the cached insights
    async fn save_insights(&self, workspace: &str, insights: &[KnowledgeInsight]) -> Result<()>;

    /// Unexpired cached insights, highest confidence first
    async fn load_insights(&self, workspace: &str) -> Result<Vec<KnowledgeInsight>>;

    // ========== Statistics ==========

    /// Record counts for a workspace
    async fn stats(&self, workspace: &str) -> Result<GraphStats>;
}
