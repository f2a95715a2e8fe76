//! Topic clusters
//!
//! Clusters are derived views over the node set. They are cached with a short
//! TTL and recomputed on demand; nothing treats them as authoritative.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Clustering strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClusteringAlgorithm {
    /// Connected components over strong edges
    Community,
    /// Single assignment pass against seeded centroids
    KMeans,
    /// Agglomerative average-linkage merging
    Hierarchical,
}

impl ClusteringAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Community => "community",
            Self::KMeans => "k_means",
            Self::Hierarchical => "hierarchical",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "community" => Some(Self::Community),
            "k_means" | "kmeans" => Some(Self::KMeans),
            "hierarchical" => Some(Self::Hierarchical),
            _ => None,
        }
    }
}

impl std::fmt::Display for ClusteringAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A group of related nodes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeCluster {
    pub id: String,
    pub workspace: String,
    pub algorithm: ClusteringAlgorithm,
    /// Member whose embedding lies closest to the cluster mean
    pub centroid: String,
    /// Member node ids
    pub members: Vec<String>,
    /// Average pairwise cosine similarity among members
    pub coherence_score: f32,
    /// Most frequent content words
    pub topics: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl KnowledgeCluster {
    pub fn new(
        workspace: impl Into<String>,
        algorithm: ClusteringAlgorithm,
        centroid: String,
        members: Vec<String>,
        coherence_score: f32,
        topics: Vec<String>,
        ttl: chrono::Duration,
    ) -> Self {
        let created_at = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            workspace: workspace.into(),
            algorithm,
            centroid,
            members,
            coherence_score,
            topics,
            created_at,
            expires_at: created_at + ttl,
        }
    }

    pub fn size(&self) -> usize {
        self.members.len()
    }

    pub fn contains(&self, node_id: &str) -> bool {
        self.members.iter().any(|m| m == node_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_algorithm_parse() {
        assert_eq!(ClusteringAlgorithm::parse("kmeans"), Some(ClusteringAlgorithm::KMeans));
        assert_eq!(ClusteringAlgorithm::parse("K-Means"), Some(ClusteringAlgorithm::KMeans));
        assert_eq!(
            ClusteringAlgorithm::parse("community"),
            Some(ClusteringAlgorithm::Community)
        );
        assert_eq!(ClusteringAlgorithm::parse("spectral"), None);
    }

    #[test]
    fn test_cluster_membership() {
        let cluster = KnowledgeCluster::new(
            "ws",
            ClusteringAlgorithm::Hierarchical,
            "a".into(),
            vec!["a".into(), "b".into()],
            0.9,
            vec!["learning".into()],
            chrono::Duration::hours(1),
        );
        assert_eq!(cluster.size(), 2);
        assert!(cluster.contains("b"));
        assert!(!cluster.contains("c"));
        assert!(cluster.expires_at > cluster.created_at);
    }
}
