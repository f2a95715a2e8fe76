//! Knowledge graph service
//!
//! The entry point for callers. A service is constructed once with its store,
//! embedding provider and configuration, then shared by reference; it holds
//! no graph state of its own.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{Error, Result};

use super::cluster::{ClusteringAlgorithm, KnowledgeCluster};
use super::clustering::ClusteringEngine;
use super::discovery::{DiscoveryOutcome, RelationshipDiscovery};
use super::edge::{KnowledgeEdge, NodeAdjacency, RelationshipType, validate_strength};
use super::embedding::EmbeddingProvider;
use super::evolution::{EvolutionLog, KnowledgeEvolution};
use super::insight::KnowledgeInsight;
use super::insights::InsightEngine;
use super::metrics::{GraphMetrics, MetricsCalculator};
use super::node::{KnowledgeNode, NodeMetadata, NodeType};
use super::path::{KnowledgePath, PathFinder};
use super::query::{GraphQuery, QueryEngine, QueryResult};
use super::store::{GraphStats, GraphStore, PurgeStats};

/// A node together with the edges discovery created for it
#[derive(Debug, Clone)]
pub struct AddNodeOutcome {
    pub node: KnowledgeNode,
    pub discovery: DiscoveryOutcome,
}

/// Knowledge graph service
///
/// Provides high-level operations for:
/// - Adding nodes (with relationship discovery) and edges
/// - Queries combining vector search and path finding
/// - Clustering, metrics and insight generation
/// - The evolution audit log
pub struct KnowledgeGraphService<S: GraphStore> {
    store: Arc<S>,
    embedder: Arc<dyn EmbeddingProvider>,
    evolution: EvolutionLog<S>,
    discovery: RelationshipDiscovery<S>,
    paths: PathFinder<S>,
    query: QueryEngine<S>,
    clustering: ClusteringEngine<S>,
    metrics: MetricsCalculator<S>,
    insights: InsightEngine<S>,
    config: Config,
}

impl<S: GraphStore> KnowledgeGraphService<S> {
    /// Create a new service
    pub fn new(store: Arc<S>, embedder: Arc<dyn EmbeddingProvider>, config: Config) -> Self {
        let evolution = EvolutionLog::new(Arc::clone(&store), config.evolution.retention());
        Self {
            discovery: RelationshipDiscovery::new(
                Arc::clone(&store),
                evolution.clone(),
                config.discovery.clone(),
            ),
            paths: PathFinder::new(Arc::clone(&store)),
            query: QueryEngine::new(
                Arc::clone(&store),
                Arc::clone(&embedder),
                config.query.clone(),
            ),
            clustering: ClusteringEngine::new(Arc::clone(&store), config.clustering.clone()),
            metrics: MetricsCalculator::new(Arc::clone(&store), config.clustering.clone()),
            insights: InsightEngine::new(
                Arc::clone(&store),
                evolution.clone(),
                config.clustering.clone(),
                config.insights.clone(),
            ),
            evolution,
            store,
            embedder,
            config,
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    // ========== Mutations ==========

    /// Embed, persist and link a new node
    ///
    /// An embedding failure aborts before anything is written. If discovery
    /// cannot read the workspace the node is removed again and the error is
    /// returned, so a node never exists without its discovery pass.
    pub async fn add_node(
        &self,
        workspace: &str,
        node_type: NodeType,
        content: &str,
        metadata: NodeMetadata,
        created_by: &str,
    ) -> Result<AddNodeOutcome> {
        if workspace.trim().is_empty() {
            return Err(Error::InvalidInput("workspace must not be empty".into()));
        }
        if content.trim().is_empty() {
            return Err(Error::InvalidInput("node content must not be empty".into()));
        }
        if node_type.is_empty() {
            return Err(Error::InvalidInput("node type must not be empty".into()));
        }
        metadata.validate()?;

        let embedding = self.embedder.embed(content).await.map_err(|e| {
            if e.is_embedding_failure() {
                e
            } else {
                Error::EmbeddingFailed(e.to_string())
            }
        })?;
        if embedding.vector.is_empty() {
            return Err(Error::EmbeddingFailed("provider returned an empty vector".into()));
        }

        if let Some(expected) = self.store.embedding_dimension(workspace).await? {
            if expected != embedding.dimension() {
                return Err(Error::DimensionMismatch {
                    expected,
                    actual: embedding.dimension(),
                });
            }
        }

        let node = KnowledgeNode::new(
            workspace,
            node_type,
            content,
            embedding.vector,
            metadata,
            created_by,
        );
        self.store.insert_node(&node).await?;

        if let Err(e) = self.evolution.node_added(&node).await {
            self.rollback_node(&node).await;
            return Err(e);
        }

        let discovery = match self.discovery.discover(&node).await {
            Ok(outcome) => outcome,
            Err(e) => {
                self.rollback_node(&node).await;
                return Err(e);
            }
        };

        info!(
            workspace = workspace,
            node_id = %node.id,
            node_type = %node.node_type,
            edges = discovery.edges.len(),
            "Added node"
        );

        Ok(AddNodeOutcome { node, discovery })
    }

    async fn rollback_node(&self, node: &KnowledgeNode) {
        match self.store.delete_node(&node.workspace, &node.id).await {
            Ok(_) => {
                if let Err(e) = self.evolution.node_deleted(node).await {
                    warn!(node_id = %node.id, error = %e, "Failed to record node rollback");
                }
            }
            Err(e) => warn!(node_id = %node.id, error = %e, "Failed to roll back node"),
        }
    }

    /// Connect two existing nodes
    pub async fn add_edge(
        &self,
        workspace: &str,
        source_id: &str,
        target_id: &str,
        relationship: RelationshipType,
        strength: f32,
    ) -> Result<KnowledgeEdge> {
        validate_strength(strength)?;

        let edge = KnowledgeEdge::new(workspace, source_id, target_id, relationship, strength)?;
        self.store.insert_edge(&edge).await?;
        self.evolution.edge_added(&edge).await?;

        info!(
            workspace = workspace,
            edge_id = %edge.id,
            source = source_id,
            target = target_id,
            relationship = %relationship,
            strength = strength,
            "Added edge"
        );

        Ok(edge)
    }

    /// Delete an edge and record the removal
    pub async fn remove_edge(&self, workspace: &str, edge_id: &str) -> Result<KnowledgeEdge> {
        let edge = self
            .store
            .get_edge(workspace, edge_id)
            .await?
            .ok_or_else(|| Error::EdgeNotFound(edge_id.to_string()))?;

        self.store.delete_edge(workspace, edge_id).await?;
        self.evolution.edge_deleted(&edge).await?;

        info!(workspace = workspace, edge_id = edge_id, "Removed edge");
        Ok(edge)
    }

    /// Delete a node, its incident edges and its embedding
    pub async fn remove_node(&self, workspace: &str, node_id: &str) -> Result<KnowledgeNode> {
        let node = self
            .store
            .get_node(workspace, node_id)
            .await?
            .ok_or_else(|| Error::NodeNotFound(node_id.to_string()))?;

        let incident = self.store.edges_for_node(workspace, node_id).await?;
        for edge in &incident {
            if self.store.delete_edge(workspace, &edge.id).await? {
                self.evolution.edge_deleted(edge).await?;
            }
        }

        self.store.delete_node(workspace, node_id).await?;
        self.evolution.node_deleted(&node).await?;

        info!(
            workspace = workspace,
            node_id = node_id,
            edges = incident.len(),
            "Removed node"
        );
        Ok(node)
    }

    // ========== Reads ==========

    pub async fn get_node(&self, workspace: &str, id: &str) -> Result<Option<KnowledgeNode>> {
        self.store.get_node(workspace, id).await
    }

    pub async fn get_edge(&self, workspace: &str, id: &str) -> Result<Option<KnowledgeEdge>> {
        self.store.get_edge(workspace, id).await
    }

    pub async fn get_all_nodes(&self, workspace: &str) -> Result<Vec<KnowledgeNode>> {
        self.store.list_nodes(workspace).await
    }

    pub async fn get_all_edges(&self, workspace: &str) -> Result<Vec<KnowledgeEdge>> {
        self.store.list_edges(workspace).await
    }

    /// Ids of every node connected to `node_id` in either direction
    pub async fn get_adjacent(&self, workspace: &str, node_id: &str) -> Result<Vec<String>> {
        self.store.neighbor_ids(workspace, node_id).await
    }

    /// Raw adjacency entry of a node
    pub async fn get_adjacency(&self, workspace: &str, node_id: &str) -> Result<NodeAdjacency> {
        self.store.adjacency(workspace, node_id).await
    }

    pub async fn graph_stats(&self, workspace: &str) -> Result<GraphStats> {
        self.store.stats(workspace).await
    }

    // ========== Search ==========

    pub async fn find_paths(
        &self,
        workspace: &str,
        source_id: &str,
        target_id: &str,
        max_depth: u32,
    ) -> Result<Vec<KnowledgePath>> {
        self.paths
            .find_paths(workspace, source_id, target_id, max_depth)
            .await
    }

    /// Run a query; never fails, degraded paths return an empty result
    pub async fn query_graph(&self, workspace: &str, query: &GraphQuery) -> QueryResult {
        self.query.query(workspace, query).await
    }

    /// Query with the configured default depth and limit
    pub async fn search(&self, workspace: &str, text: &str) -> QueryResult {
        let query = self.query.default_query(text);
        self.query.query(workspace, &query).await
    }

    // ========== Analytics ==========

    pub async fn cluster(
        &self,
        workspace: &str,
        algorithm: ClusteringAlgorithm,
        k: Option<usize>,
    ) -> Result<Vec<KnowledgeCluster>> {
        self.clustering.cluster(workspace, algorithm, k).await
    }

    /// Unexpired clusters from the last run of `algorithm`
    pub async fn cached_clusters(
        &self,
        workspace: &str,
        algorithm: ClusteringAlgorithm,
    ) -> Result<Vec<KnowledgeCluster>> {
        self.clustering.cached(workspace, algorithm).await
    }

    pub async fn get_graph_metrics(&self, workspace: &str) -> Result<GraphMetrics> {
        self.metrics.calculate(workspace).await
    }

    pub async fn generate_insights(&self, workspace: &str) -> Result<Vec<KnowledgeInsight>> {
        self.insights.generate(workspace).await
    }

    /// Unexpired insights from the last generation
    pub async fn active_insights(&self, workspace: &str) -> Result<Vec<KnowledgeInsight>> {
        self.insights.active(workspace).await
    }

    // ========== Evolution ==========

    /// Unexpired evolution entries, newest first
    pub async fn evolution_history(
        &self,
        workspace: &str,
        limit: usize,
    ) -> Result<Vec<KnowledgeEvolution>> {
        self.evolution.history(workspace, limit).await
    }

    /// Remove expired evolution entries, clusters and insights
    pub async fn purge_expired(&self, workspace: &str) -> Result<PurgeStats> {
        let stats = self.evolution.purge_expired(workspace).await?;
        debug!(workspace = workspace, removed = stats.total(), "Purge finished");
        Ok(stats)
    }
}
