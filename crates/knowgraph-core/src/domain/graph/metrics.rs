//! Structural graph metrics

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::cluster::KnowledgeCluster;
use super::clustering::Clusterer;
use super::edge::KnowledgeEdge;
use super::node::KnowledgeNode;
use super::store::GraphStore;
use crate::config::ClusteringConfig;
use crate::error::Result;

/// Structural report for one workspace
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphMetrics {
    pub node_count: usize,
    pub edge_count: usize,
    /// 2E / (N(N-1)) for N > 1, else 0
    pub density: f64,
    /// 2E / N, else 0
    pub average_degree: f64,
    /// Mean local clustering coefficient over nodes with at least two neighbors
    pub clustering_coefficient: f64,
    /// Degree normalised by the maximum degree
    pub centrality_scores: HashMap<String, f64>,
    /// Community-detection clusters
    pub community_structure: Vec<KnowledgeCluster>,
}

/// Total degree (in + out) per node; edges to unknown nodes are ignored
pub fn degrees<'a>(nodes: &'a [KnowledgeNode], edges: &[KnowledgeEdge]) -> HashMap<&'a str, usize> {
    let mut degree: HashMap<&str, usize> = nodes.iter().map(|n| (n.id.as_str(), 0)).collect();
    for edge in edges {
        if let Some(d) = degree.get_mut(edge.source_id.as_str()) {
            *d += 1;
        }
        if let Some(d) = degree.get_mut(edge.target_id.as_str()) {
            *d += 1;
        }
    }
    degree
}

/// Compute every metric except community structure
pub fn compute_metrics(nodes: &[KnowledgeNode], edges: &[KnowledgeEdge]) -> GraphMetrics {
    let n = nodes.len();
    let e = edges.len();

    let density = if n > 1 {
        (2.0 * e as f64) / (n as f64 * (n as f64 - 1.0))
    } else {
        0.0
    };
    let average_degree = if n > 0 {
        (2.0 * e as f64) / n as f64
    } else {
        0.0
    };

    let degree = degrees(nodes, edges);
    let max_degree = degree.values().copied().max().unwrap_or(0);
    let centrality_scores = degree
        .iter()
        .map(|(id, &d)| {
            let score = if max_degree == 0 {
                0.0
            } else {
                d as f64 / max_degree as f64
            };
            (id.to_string(), score)
        })
        .collect();

    GraphMetrics {
        node_count: n,
        edge_count: e,
        density,
        average_degree,
        clustering_coefficient: clustering_coefficient(nodes, edges),
        centrality_scores,
        community_structure: Vec::new(),
    }
}

/// Average local clustering coefficient
///
/// Neighborhoods are undirected and distinct; nodes with fewer than two
/// neighbors do not contribute. Returns 0 when no node qualifies.
pub fn clustering_coefficient(nodes: &[KnowledgeNode], edges: &[KnowledgeEdge]) -> f64 {
    let known: HashSet<&str> = nodes.iter().map(|n| n.id.as_str()).collect();
    let mut adjacency: HashMap<&str, HashSet<&str>> = HashMap::new();
    for edge in edges {
        let (s, t) = (edge.source_id.as_str(), edge.target_id.as_str());
        if s == t || !known.contains(s) || !known.contains(t) {
            continue;
        }
        adjacency.entry(s).or_default().insert(t);
        adjacency.entry(t).or_default().insert(s);
    }

    let mut total = 0.0;
    let mut counted = 0usize;
    for neighbors in adjacency.values() {
        let k = neighbors.len();
        if k < 2 {
            continue;
        }
        let list: Vec<&str> = neighbors.iter().copied().collect();
        let mut links = 0usize;
        for i in 0..list.len() {
            for j in (i + 1)..list.len() {
                if adjacency.get(list[i]).is_some_and(|adj| adj.contains(list[j])) {
                    links += 1;
                }
            }
        }
        let possible = k * (k - 1) / 2;
        total += links as f64 / possible as f64;
        counted += 1;
    }

    if counted == 0 {
        0.0
    } else {
        total / counted as f64
    }
}

/// Store-backed metrics calculator
pub struct MetricsCalculator<S: GraphStore> {
    store: Arc<S>,
    clusterer: Clusterer,
}

impl<S: GraphStore> Clone for MetricsCalculator<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            clusterer: self.clusterer.clone(),
        }
    }
}

impl<S: GraphStore> MetricsCalculator<S> {
    pub fn new(store: Arc<S>, config: ClusteringConfig) -> Self {
        Self {
            store,
            clusterer: Clusterer::new(config),
        }
    }

    /// Compute the full report from a fresh snapshot
    pub async fn calculate(&self, workspace: &str) -> Result<GraphMetrics> {
        let nodes = self.store.list_nodes(workspace).await?;
        let edges = self.store.list_edges(workspace).await?;

        let mut metrics = compute_metrics(&nodes, &edges);
        metrics.community_structure = self.clusterer.community(workspace, &nodes, &edges);

        tracing::info!(
            workspace = workspace,
            nodes = metrics.node_count,
            edges = metrics.edge_count,
            density = metrics.density,
            communities = metrics.community_structure.len(),
            "Computed graph metrics"
        );

        Ok(metrics)
    }
}
