//! Natural-language graph queries
//!
//! A query embeds its text, runs a KNN search over node embeddings, gathers
//! the edges incident to the hits and looks for paths between the top hits.
//! This is a read path: embedding or search failures yield an empty result
//! and a warning instead of an error.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use super::edge::{KnowledgeEdge, RelationshipType};
use super::embedding::EmbeddingProvider;
use super::node::NodeType;
use super::path::{KnowledgePath, PathFinder};
use super::store::{GraphStore, ScoredNode};
use crate::config::QueryConfig;

/// Query request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphQuery {
    pub text: String,
    pub node_type: Option<NodeType>,
    pub relationship_type: Option<RelationshipType>,
    pub max_depth: u32,
    pub limit: usize,
}

impl GraphQuery {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            node_type: None,
            relationship_type: None,
            max_depth: 3,
            limit: 10,
        }
    }

    pub fn with_node_type(mut self, node_type: NodeType) -> Self {
        self.node_type = Some(node_type);
        self
    }

    pub fn with_relationship_type(mut self, relationship: RelationshipType) -> Self {
        self.relationship_type = Some(relationship);
        self
    }

    pub fn with_max_depth(mut self, max_depth: u32) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }
}

/// Query response
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    /// Hits, most similar first
    pub nodes: Vec<ScoredNode>,
    /// Edges incident to the hits
    pub edges: Vec<KnowledgeEdge>,
    /// Paths between top hits, best first
    pub paths: Vec<KnowledgePath>,
    pub total_results: usize,
    pub query_time: Duration,
}

impl QueryResult {
    pub fn empty(query_time: Duration) -> Self {
        Self {
            query_time,
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Ids of the returned nodes, in rank order
    pub fn node_ids(&self) -> Vec<&str> {
        self.nodes.iter().map(|s| s.node.id.as_str()).collect()
    }
}

pub struct QueryEngine<S: GraphStore> {
    store: Arc<S>,
    embedder: Arc<dyn EmbeddingProvider>,
    paths: PathFinder<S>,
    config: QueryConfig,
}

impl<S: GraphStore> Clone for QueryEngine<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            embedder: Arc::clone(&self.embedder),
            paths: self.paths.clone(),
            config: self.config.clone(),
        }
    }
}

impl<S: GraphStore> QueryEngine<S> {
    pub fn new(store: Arc<S>, embedder: Arc<dyn EmbeddingProvider>, config: QueryConfig) -> Self {
        Self {
            paths: PathFinder::new(Arc::clone(&store)),
            store,
            embedder,
            config,
        }
    }

    /// A query with the configured default depth and limit
    pub fn default_query(&self, text: impl Into<String>) -> GraphQuery {
        GraphQuery::new(text)
            .with_max_depth(self.config.default_max_depth)
            .with_limit(self.config.default_limit)
    }

    /// Run a query against a workspace
    pub async fn query(&self, workspace: &str, query: &GraphQuery) -> QueryResult {
        let started = Instant::now();

        if query.text.trim().is_empty() || query.limit == 0 {
            return QueryResult::empty(started.elapsed());
        }

        let embedding = match self.embedder.embed(&query.text).await {
            Ok(embedding) => embedding,
            Err(e) => {
                tracing::warn!(workspace = workspace, error = %e, "Query embedding failed");
                return QueryResult::empty(started.elapsed());
            }
        };

        let search = self.store.nearest_nodes(
            workspace,
            &embedding.vector,
            query.limit,
            query.node_type.as_ref(),
        );
        let nodes = match tokio::time::timeout(self.config.search_timeout(), search).await {
            Ok(Ok(nodes)) => nodes,
            Ok(Err(e)) => {
                tracing::warn!(workspace = workspace, error = %e, "Vector search failed");
                return QueryResult::empty(started.elapsed());
            }
            Err(_) => {
                tracing::warn!(
                    workspace = workspace,
                    timeout_ms = self.config.search_timeout_ms,
                    "Vector search exceeded its deadline"
                );
                return QueryResult::empty(started.elapsed());
            }
        };

        let edges = self.collect_edges(workspace, &nodes, query.relationship_type).await;
        let paths = self.collect_paths(workspace, &nodes, query.max_depth).await;

        let result = QueryResult {
            total_results: nodes.len(),
            nodes,
            edges,
            paths,
            query_time: started.elapsed(),
        };

        tracing::info!(
            workspace = workspace,
            nodes = result.total_results,
            edges = result.edges.len(),
            paths = result.paths.len(),
            elapsed_ms = result.query_time.as_millis() as u64,
            "Query completed"
        );

        result
    }

    async fn collect_edges(
        &self,
        workspace: &str,
        nodes: &[ScoredNode],
        relationship: Option<RelationshipType>,
    ) -> Vec<KnowledgeEdge> {
        let mut seen = HashSet::new();
        let mut edges = Vec::new();

        for scored in nodes {
            match self.store.edges_for_node(workspace, &scored.node.id).await {
                Ok(incident) => {
                    for edge in incident {
                        if relationship.is_some_and(|r| edge.relationship != r) {
                            continue;
                        }
                        if seen.insert(edge.id.clone()) {
                            edges.push(edge);
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        workspace = workspace,
                        node_id = %scored.node.id,
                        error = %e,
                        "Stopped collecting edges"
                    );
                    break;
                }
            }
        }

        edges
    }

    async fn collect_paths(
        &self,
        workspace: &str,
        nodes: &[ScoredNode],
        max_depth: u32,
    ) -> Vec<KnowledgePath> {
        let anchors: Vec<&str> = nodes
            .iter()
            .take(self.config.path_anchor_count)
            .map(|s| s.node.id.as_str())
            .collect();
        let mut paths = Vec::new();

        'pairs: for i in 0..anchors.len() {
            for j in (i + 1)..anchors.len() {
                if paths.len() >= self.config.max_paths {
                    break 'pairs;
                }
                match self
                    .paths
                    .find_paths(workspace, anchors[i], anchors[j], max_depth)
                    .await
                {
                    Ok(found) => paths.extend(found),
                    Err(e) => {
                        tracing::warn!(
                            workspace = workspace,
                            source = anchors[i],
                            target = anchors[j],
                            error = %e,
                            "Stopped path search"
                        );
                        break 'pairs;
                    }
                }
            }
        }

        paths.sort_by(|a, b| b.score.total_cmp(&a.score));
        paths.truncate(self.config.max_paths);
        paths
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_builder_defaults() {
        let query = GraphQuery::new("transfer learning");
        assert_eq!(query.max_depth, 3);
        assert_eq!(query.limit, 10);
        assert!(query.node_type.is_none());

        let query = query
            .with_node_type(NodeType::decision())
            .with_relationship_type(RelationshipType::Supports)
            .with_limit(3);
        assert_eq!(query.node_type, Some(NodeType::decision()));
        assert_eq!(query.relationship_type, Some(RelationshipType::Supports));
        assert_eq!(query.limit, 3);
    }

    #[test]
    fn test_empty_result() {
        let result = QueryResult::empty(Duration::from_millis(3));
        assert!(result.is_empty());
        assert_eq!(result.total_results, 0);
        assert_eq!(result.query_time, Duration::from_millis(3));
    }
}
