//! Insight engine
//!
//! Mines four kinds of insight from a workspace snapshot: coherent patterns
//! within node types, poorly connected nodes, contradicting pairs and the
//! dominant kind of recent change. Results are sorted by confidence and
//! cached with a TTL.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;

use super::clustering::Clusterer;
use super::edge::{KnowledgeEdge, RelationshipType};
use super::evolution::{ChangeKind, EvolutionLog, KnowledgeEvolution};
use super::insight::{InsightImpact, InsightType, KnowledgeInsight, sort_by_confidence};
use super::metrics::degrees;
use super::node::{KnowledgeNode, NodeType};
use super::store::GraphStore;
use crate::config::{ClusteringConfig, InsightConfig};
use crate::error::Result;

pub struct InsightEngine<S: GraphStore> {
    store: Arc<S>,
    evolution: EvolutionLog<S>,
    clusterer: Clusterer,
    config: InsightConfig,
}

impl<S: GraphStore> Clone for InsightEngine<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            evolution: self.evolution.clone(),
            clusterer: self.clusterer.clone(),
            config: self.config.clone(),
        }
    }
}

impl<S: GraphStore> InsightEngine<S> {
    pub fn new(
        store: Arc<S>,
        evolution: EvolutionLog<S>,
        clustering: ClusteringConfig,
        config: InsightConfig,
    ) -> Self {
        Self {
            store,
            evolution,
            clusterer: Clusterer::new(clustering),
            config,
        }
    }

    /// Generate, rank and cache insights for a workspace
    pub async fn generate(&self, workspace: &str) -> Result<Vec<KnowledgeInsight>> {
        let nodes = self.store.list_nodes(workspace).await?;
        let edges = self.store.list_edges(workspace).await?;
        let recent = self
            .evolution
            .since(workspace, Utc::now() - self.config.trend_window())
            .await?;

        let mut insights = self.patterns(workspace, &nodes);
        insights.extend(self.gaps(workspace, &nodes, &edges));
        insights.extend(self.contradictions(workspace, &edges));
        insights.extend(self.trends(workspace, &recent));

        let ttl = self.config.ttl();
        let mut insights: Vec<KnowledgeInsight> =
            insights.into_iter().map(|i| i.with_ttl(ttl)).collect();
        sort_by_confidence(&mut insights);

        self.store.save_insights(workspace, &insights).await?;

        tracing::info!(
            workspace = workspace,
            insights = insights.len(),
            nodes = nodes.len(),
            edges = edges.len(),
            "Generated insights"
        );

        Ok(insights)
    }

    /// Unexpired cached insights
    pub async fn active(&self, workspace: &str) -> Result<Vec<KnowledgeInsight>> {
        self.store.load_insights(workspace).await
    }

    /// One insight per coherent k-means cluster within each node type
    pub fn patterns(&self, workspace: &str, nodes: &[KnowledgeNode]) -> Vec<KnowledgeInsight> {
        let mut by_type: BTreeMap<&NodeType, Vec<&KnowledgeNode>> = BTreeMap::new();
        for node in nodes {
            by_type.entry(&node.node_type).or_default().push(node);
        }

        let mut insights = Vec::new();
        for (node_type, group) in by_type {
            if group.len() < self.config.pattern_min_group {
                continue;
            }

            for cluster in self.clusterer.k_means(workspace, &group, self.config.pattern_k) {
                if cluster.coherence_score <= self.config.pattern_min_coherence {
                    continue;
                }
                let coherence = cluster.coherence_score;
                let topics = if cluster.topics.is_empty() {
                    String::from("shared content")
                } else {
                    cluster.topics.join(", ")
                };
                insights.push(KnowledgeInsight::new(
                    workspace,
                    InsightType::Pattern,
                    format!("Pattern in {} nodes", node_type),
                    format!(
                        "{} {} nodes cluster around {} (coherence {:.2})",
                        cluster.size(),
                        node_type,
                        topics,
                        coherence
                    ),
                    cluster.members,
                    coherence,
                    InsightImpact {
                        relevance: coherence,
                        novelty: 0.5,
                        actionability: 0.4,
                        confidence: coherence,
                    },
                ));
            }
        }
        insights
    }

    /// One aggregate insight for nodes with total degree below the threshold
    pub fn gaps(
        &self,
        workspace: &str,
        nodes: &[KnowledgeNode],
        edges: &[KnowledgeEdge],
    ) -> Option<KnowledgeInsight> {
        let degree = degrees(nodes, edges);
        let isolated: Vec<String> = nodes
            .iter()
            .filter(|n| degree.get(n.id.as_str()).copied().unwrap_or(0) < self.config.gap_degree_threshold)
            .map(|n| n.id.clone())
            .collect();

        if isolated.is_empty() {
            return None;
        }

        let ratio = isolated.len() as f32 / nodes.len() as f32;
        let confidence = 0.5 + 0.5 * ratio;
        Some(KnowledgeInsight::new(
            workspace,
            InsightType::Gap,
            format!("Knowledge gap: {} weakly connected nodes", isolated.len()),
            format!(
                "{} of {} nodes have fewer than {} connections",
                isolated.len(),
                nodes.len(),
                self.config.gap_degree_threshold
            ),
            isolated,
            confidence,
            InsightImpact {
                relevance: ratio,
                novelty: 0.3,
                actionability: 0.8,
                confidence,
            },
        ))
    }

    /// One insight per CONTRADICTS edge
    pub fn contradictions(&self, workspace: &str, edges: &[KnowledgeEdge]) -> Vec<KnowledgeInsight> {
        edges
            .iter()
            .filter(|e| e.relationship == RelationshipType::Contradicts)
            .map(|e| {
                KnowledgeInsight::new(
                    workspace,
                    InsightType::Contradiction,
                    "Contradicting knowledge",
                    format!("Node {} contradicts node {}", e.source_id, e.target_id),
                    vec![e.source_id.clone(), e.target_id.clone()],
                    e.strength,
                    InsightImpact {
                        relevance: e.strength,
                        novelty: 0.6,
                        actionability: 0.9,
                        confidence: e.strength,
                    },
                )
            })
            .collect()
    }

    /// Dominant change kind among recent entries, when there are enough of them
    pub fn trends(&self, workspace: &str, recent: &[KnowledgeEvolution]) -> Option<KnowledgeInsight> {
        if recent.len() <= self.config.trend_min_entries {
            return None;
        }

        let mut tally: BTreeMap<ChangeKind, usize> = BTreeMap::new();
        for entry in recent {
            *tally.entry(entry.change_kind).or_insert(0) += 1;
        }

        let mut dominant: Option<(ChangeKind, usize)> = None;
        for (&kind, &count) in &tally {
            if dominant.is_none_or(|(_, best)| count > best) {
                dominant = Some((kind, count));
            }
        }
        let (kind, count) = dominant?;

        let confidence = count as f32 / recent.len() as f32;
        let mut evidence: Vec<String> = Vec::new();
        for entry in recent.iter().filter(|e| e.change_kind == kind) {
            for id in &entry.impact.affected_nodes {
                if !evidence.contains(id) {
                    evidence.push(id.clone());
                }
            }
        }

        Some(KnowledgeInsight::new(
            workspace,
            InsightType::Trend,
            format!("Trend: {}", kind),
            format!(
                "{} of the last {} changes in the past {} days were {}",
                count,
                recent.len(),
                self.config.trend_window_days,
                kind
            ),
            evidence,
            confidence,
            InsightImpact {
                relevance: confidence,
                novelty: 0.4,
                actionability: 0.3,
                confidence,
            },
        ))
    }
}
