//! Evolution log
//!
//! Every structural mutation is recorded as an append-only entry with a
//! heuristic impact estimate. Entries expire after the retention window.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::edge::KnowledgeEdge;
use super::node::KnowledgeNode;
use super::store::{GraphStore, PurgeStats};
use crate::error::Result;

/// Kind of structural change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeKind {
    NodeAdded,
    NodeUpdated,
    NodeDeleted,
    EdgeAdded,
    EdgeUpdated,
    EdgeDeleted,
    RelationshipStrengthened,
    RelationshipWeakened,
}

impl ChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NodeAdded => "NODE_ADDED",
            Self::NodeUpdated => "NODE_UPDATED",
            Self::NodeDeleted => "NODE_DELETED",
            Self::EdgeAdded => "EDGE_ADDED",
            Self::EdgeUpdated => "EDGE_UPDATED",
            Self::EdgeDeleted => "EDGE_DELETED",
            Self::RelationshipStrengthened => "RELATIONSHIP_STRENGTHENED",
            Self::RelationshipWeakened => "RELATIONSHIP_WEAKENED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "NODE_ADDED" => Some(Self::NodeAdded),
            "NODE_UPDATED" => Some(Self::NodeUpdated),
            "NODE_DELETED" => Some(Self::NodeDeleted),
            "EDGE_ADDED" => Some(Self::EdgeAdded),
            "EDGE_UPDATED" => Some(Self::EdgeUpdated),
            "EDGE_DELETED" => Some(Self::EdgeDeleted),
            "RELATIONSHIP_STRENGTHENED" => Some(Self::RelationshipStrengthened),
            "RELATIONSHIP_WEAKENED" => Some(Self::RelationshipWeakened),
            _ => None,
        }
    }
}

impl std::fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Heuristic estimate of how far a change reaches
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImpactEstimate {
    /// Influence on the directly affected records (0.0 to 1.0)
    pub local_impact: f32,
    /// Share of the graph touched by the change (0.0 to 1.0)
    pub global_impact: f32,
    pub affected_nodes: Vec<String>,
    pub affected_clusters: Vec<String>,
}

impl ImpactEstimate {
    /// Impact of a node change; local impact follows the node's confidence
    pub fn for_node(node: &KnowledgeNode, graph_size: usize) -> Self {
        let affected_nodes = vec![node.id.clone()];
        Self {
            local_impact: node.metadata.confidence.clamp(0.0, 1.0),
            global_impact: global_share(affected_nodes.len(), graph_size),
            affected_nodes,
            affected_clusters: Vec::new(),
        }
    }

    /// Impact of an edge change; local impact follows the edge strength
    pub fn for_edge(edge: &KnowledgeEdge, graph_size: usize) -> Self {
        let mut affected_nodes = vec![edge.source_id.clone()];
        if edge.target_id != edge.source_id {
            affected_nodes.push(edge.target_id.clone());
        }
        Self {
            local_impact: edge.strength.clamp(0.0, 1.0),
            global_impact: global_share(affected_nodes.len(), graph_size),
            affected_nodes,
            affected_clusters: Vec::new(),
        }
    }
}

fn global_share(affected: usize, graph_size: usize) -> f32 {
    if graph_size == 0 {
        return 0.0;
    }
    (affected as f32 / graph_size as f32).clamp(0.0, 1.0)
}

/// One audit record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeEvolution {
    pub id: String,
    pub workspace: String,
    pub timestamp: DateTime<Utc>,
    pub change_kind: ChangeKind,
    pub affected_ids: Vec<String>,
    pub old_value: Option<serde_json::Value>,
    pub new_value: Option<serde_json::Value>,
    pub impact: ImpactEstimate,
    pub expires_at: DateTime<Utc>,
}

impl KnowledgeEvolution {
    pub fn new(
        workspace: impl Into<String>,
        change_kind: ChangeKind,
        affected_ids: Vec<String>,
        impact: ImpactEstimate,
        retention: chrono::Duration,
    ) -> Self {
        let timestamp = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            workspace: workspace.into(),
            timestamp,
            change_kind,
            affected_ids,
            old_value: None,
            new_value: None,
            impact,
            expires_at: timestamp + retention,
        }
    }

    pub fn with_old_value(mut self, value: serde_json::Value) -> Self {
        self.old_value = Some(value);
        self
    }

    pub fn with_new_value(mut self, value: serde_json::Value) -> Self {
        self.new_value = Some(value);
        self
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Writer and reader for the evolution log of a store
pub struct EvolutionLog<S: GraphStore> {
    store: Arc<S>,
    retention: chrono::Duration,
}

impl<S: GraphStore> Clone for EvolutionLog<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            retention: self.retention,
        }
    }
}

impl<S: GraphStore> EvolutionLog<S> {
    pub fn new(store: Arc<S>, retention: chrono::Duration) -> Self {
        Self { store, retention }
    }

    pub fn retention(&self) -> chrono::Duration {
        self.retention
    }

    /// Record that a node was added
    pub async fn node_added(&self, node: &KnowledgeNode) -> Result<KnowledgeEvolution> {
        let graph_size = self.store.count_nodes(&node.workspace).await? as usize;
        let entry = KnowledgeEvolution::new(
            &node.workspace,
            ChangeKind::NodeAdded,
            vec![node.id.clone()],
            ImpactEstimate::for_node(node, graph_size),
            self.retention,
        )
        .with_new_value(node.snapshot());
        self.record(entry).await
    }

    /// Record that a node was removed
    pub async fn node_deleted(&self, node: &KnowledgeNode) -> Result<KnowledgeEvolution> {
        // The node is already gone; count it back in so the share stays bounded
        let graph_size = self.store.count_nodes(&node.workspace).await? as usize + 1;
        let entry = KnowledgeEvolution::new(
            &node.workspace,
            ChangeKind::NodeDeleted,
            vec![node.id.clone()],
            ImpactEstimate::for_node(node, graph_size),
            self.retention,
        )
        .with_old_value(node.snapshot());
        self.record(entry).await
    }

    /// Record that an edge was added
    pub async fn edge_added(&self, edge: &KnowledgeEdge) -> Result<KnowledgeEvolution> {
        let graph_size = self.store.count_nodes(&edge.workspace).await? as usize;
        let entry = KnowledgeEvolution::new(
            &edge.workspace,
            ChangeKind::EdgeAdded,
            vec![edge.id.clone(), edge.source_id.clone(), edge.target_id.clone()],
            ImpactEstimate::for_edge(edge, graph_size),
            self.retention,
        )
        .with_new_value(edge.snapshot());
        self.record(entry).await
    }

    /// Record that an edge was removed
    pub async fn edge_deleted(&self, edge: &KnowledgeEdge) -> Result<KnowledgeEvolution> {
        let graph_size = self.store.count_nodes(&edge.workspace).await? as usize;
        let entry = KnowledgeEvolution::new(
            &edge.workspace,
            ChangeKind::EdgeDeleted,
            vec![edge.id.clone(), edge.source_id.clone(), edge.target_id.clone()],
            ImpactEstimate::for_edge(edge, graph_size),
            self.retention,
        )
        .with_old_value(edge.snapshot());
        self.record(entry).await
    }

    /// Append an entry
    pub async fn record(&self, entry: KnowledgeEvolution) -> Result<KnowledgeEvolution> {
        self.store.append_evolution(&entry).await?;
        tracing::debug!(
            workspace = %entry.workspace,
            change = %entry.change_kind,
            affected = entry.affected_ids.len(),
            "Recorded evolution entry"
        );
        Ok(entry)
    }

    /// Unexpired entries, newest first
    pub async fn history(&self, workspace: &str, limit: usize) -> Result<Vec<KnowledgeEvolution>> {
        self.store.evolution_history(workspace, limit).await
    }

    /// Unexpired entries at or after `since`, oldest first
    pub async fn since(
        &self,
        workspace: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<KnowledgeEvolution>> {
        self.store.evolution_since(workspace, since).await
    }

    /// Delete expired entries along with expired derived caches
    pub async fn purge_expired(&self, workspace: &str) -> Result<PurgeStats> {
        let stats = self.store.purge_expired(workspace, Utc::now()).await?;
        if stats.total() > 0 {
            tracing::info!(
                workspace = workspace,
                evolution = stats.evolution,
                clusters = stats.clusters,
                insights = stats.insights,
                "Purged expired records"
            );
        }
        Ok(stats)
    }
}
