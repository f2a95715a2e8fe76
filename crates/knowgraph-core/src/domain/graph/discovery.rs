//! Relationship discovery
//!
//! When a node is inserted its embedding is compared against every other node
//! in the workspace. Pairs at or above the similarity threshold are linked
//! with an edge whose strength equals the similarity. The scan is O(N) per
//! insert; edge creation for matching candidates runs concurrently under a
//! deadline.

use std::sync::Arc;

use futures_util::StreamExt;
use futures_util::stream;
use tokio::time::Instant;

use super::edge::{KnowledgeEdge, RelationshipType};
use super::evolution::EvolutionLog;
use super::node::KnowledgeNode;
use super::similarity::cosine_similarity;
use super::store::GraphStore;
use crate::config::DiscoveryConfig;
use crate::error::{Error, Result};

const CAUSAL_MARKERS: &[&str] = &[
    "because",
    "therefore",
    "requires",
    "depends",
    "due to",
    "leads to",
    "causes",
    "results in",
    "so that",
];

const NEGATION_MARKERS: &[&str] = &[
    "not", "no", "never", "cannot", "won't", "isn't", "however", "but", "contrary",
];

const SUPPORT_MARKERS: &[&str] = &[
    "supports",
    "confirms",
    "agrees",
    "validates",
    "consistent with",
    "evidence",
    "proves",
    "reinforces",
];

const REFERENCE_MARKERS: &[&str] = &[
    "see",
    "refer",
    "according to",
    "as described",
    "mentioned",
    "cited",
    "source",
];

fn words(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !(c.is_alphanumeric() || c == '\''))
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect()
}

/// Whether `phrase` occurs in `tokens` as a run of whole words
fn has_phrase(tokens: &[String], phrase: &str) -> bool {
    let needle: Vec<&str> = phrase.split_whitespace().collect();
    if needle.is_empty() || needle.len() > tokens.len() {
        return false;
    }
    tokens
        .windows(needle.len())
        .any(|window| window.iter().zip(&needle).all(|(t, n)| t == n))
}

fn has_any(tokens: &[String], markers: &[&str]) -> bool {
    markers.iter().any(|m| has_phrase(tokens, m))
}

/// Infer the relationship type between two contents from keyword cues
///
/// Rules are checked in order: causal connectives, negation mismatch,
/// supportive phrasing, referential phrasing, then `RELATES_TO`.
pub fn infer_relationship_type(a: &str, b: &str) -> RelationshipType {
    let a = words(a);
    let b = words(b);

    if has_any(&a, CAUSAL_MARKERS) || has_any(&b, CAUSAL_MARKERS) {
        return RelationshipType::DependsOn;
    }
    if has_any(&a, NEGATION_MARKERS) != has_any(&b, NEGATION_MARKERS) {
        return RelationshipType::Contradicts;
    }
    if has_any(&a, SUPPORT_MARKERS) || has_any(&b, SUPPORT_MARKERS) {
        return RelationshipType::Supports;
    }
    if has_any(&a, REFERENCE_MARKERS) || has_any(&b, REFERENCE_MARKERS) {
        return RelationshipType::References;
    }
    RelationshipType::RelatesTo
}

/// Per-candidate failures that leave the rest of the run valid
fn is_skippable(error: &Error) -> bool {
    matches!(error, Error::NodeNotFound(_)) || error.is_embedding_failure()
}

/// What a discovery run did
#[derive(Debug, Clone, Default)]
pub struct DiscoveryOutcome {
    /// Edges created
    pub edges: Vec<KnowledgeEdge>,
    /// Other nodes compared against
    pub scanned: usize,
    /// Candidates dropped because they vanished before linking
    pub skipped: usize,
    /// Whether the deadline cut the run short
    pub timed_out: bool,
}

/// Similarity-driven edge creation
pub struct RelationshipDiscovery<S: GraphStore> {
    store: Arc<S>,
    evolution: EvolutionLog<S>,
    config: DiscoveryConfig,
}

impl<S: GraphStore> Clone for RelationshipDiscovery<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            evolution: self.evolution.clone(),
            config: self.config.clone(),
        }
    }
}

impl<S: GraphStore> RelationshipDiscovery<S> {
    pub fn new(store: Arc<S>, evolution: EvolutionLog<S>, config: DiscoveryConfig) -> Self {
        Self {
            store,
            evolution,
            config,
        }
    }

    /// Link `node` to every sufficiently similar node in its workspace
    ///
    /// A candidate deleted between the scan and its edge insert is logged
    /// and skipped. Any other store failure aborts the run and is returned,
    /// so no edge write is ever lost silently.
    pub async fn discover(&self, node: &KnowledgeNode) -> Result<DiscoveryOutcome> {
        let existing = self.store.list_nodes(&node.workspace).await?;
        let mut outcome = DiscoveryOutcome::default();

        let mut candidates = Vec::new();
        for other in existing {
            if other.id == node.id {
                continue;
            }
            outcome.scanned += 1;
            if other.embedding.len() != node.embedding.len() {
                continue;
            }
            let similarity = cosine_similarity(&node.embedding, &other.embedding);
            if similarity >= self.config.similarity_threshold {
                candidates.push((other, similarity));
            }
        }

        if candidates.is_empty() {
            tracing::debug!(
                workspace = %node.workspace,
                node_id = %node.id,
                scanned = outcome.scanned,
                "No related nodes above threshold"
            );
            return Ok(outcome);
        }

        let matched = candidates.len();
        let deadline = Instant::now() + self.config.timeout();
        let mut pending = stream::iter(candidates)
            .map(|(candidate, similarity)| self.link(node, candidate, similarity))
            .buffer_unordered(self.config.max_concurrency.max(1));

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match tokio::time::timeout(remaining, pending.next()).await {
                Ok(Some(Ok(edge))) => outcome.edges.push(edge),
                Ok(Some(Err(e))) if is_skippable(&e) => {
                    outcome.skipped += 1;
                    tracing::warn!(
                        workspace = %node.workspace,
                        node_id = %node.id,
                        error = %e,
                        "Skipping discovery candidate"
                    );
                }
                Ok(Some(Err(e))) => {
                    tracing::error!(
                        workspace = %node.workspace,
                        node_id = %node.id,
                        created = outcome.edges.len(),
                        error = %e,
                        code = e.code(),
                        "Relationship discovery failed"
                    );
                    return Err(e);
                }
                Ok(None) => break,
                Err(_) => {
                    outcome.timed_out = true;
                    tracing::warn!(
                        workspace = %node.workspace,
                        node_id = %node.id,
                        created = outcome.edges.len(),
                        matched = matched,
                        timeout_ms = self.config.timeout_ms,
                        "Relationship discovery deadline reached; remaining candidates skipped"
                    );
                    break;
                }
            }
        }

        tracing::info!(
            workspace = %node.workspace,
            node_id = %node.id,
            scanned = outcome.scanned,
            created = outcome.edges.len(),
            skipped = outcome.skipped,
            "Relationship discovery completed"
        );

        Ok(outcome)
    }

    async fn link(
        &self,
        node: &KnowledgeNode,
        candidate: KnowledgeNode,
        similarity: f32,
    ) -> Result<KnowledgeEdge> {
        let relationship = infer_relationship_type(&node.content, &candidate.content);
        let edge = KnowledgeEdge::new(
            &node.workspace,
            &node.id,
            &candidate.id,
            relationship,
            similarity.clamp(0.0, 1.0),
        )?;

        self.store.insert_edge(&edge).await?;
        self.evolution.edge_added(&edge).await?;

        tracing::debug!(
            workspace = %edge.workspace,
            edge_id = %edge.id,
            target = %candidate.id,
            relationship = %relationship,
            strength = edge.strength,
            "Discovered relationship"
        );

        Ok(edge)
    }
}
