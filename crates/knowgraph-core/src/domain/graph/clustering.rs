//! Clustering engine
//!
//! Three interchangeable algorithms share one output shape:
//!
//! - community detection: connected components over strong edges
//! - k-means: one assignment pass against the first k nodes as seeds
//! - hierarchical: agglomerative average-linkage merging
//!
//! The algorithms themselves are pure functions over node and edge slices
//! (`Clusterer`); `ClusteringEngine` fetches from the store and writes the
//! result to the cluster cache.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::Arc;

use super::cluster::{ClusteringAlgorithm, KnowledgeCluster};
use super::edge::KnowledgeEdge;
use super::node::KnowledgeNode;
use super::similarity::{average_linkage, average_pairwise_similarity, cosine_similarity, mean_vector};
use super::store::GraphStore;
use crate::config::ClusteringConfig;
use crate::error::Result;

/// Pure clustering over in-memory snapshots
#[derive(Debug, Clone, Default)]
pub struct Clusterer {
    config: ClusteringConfig,
}

impl Clusterer {
    pub fn new(config: ClusteringConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ClusteringConfig {
        &self.config
    }

    /// Run `algorithm` over a snapshot
    pub fn run(
        &self,
        workspace: &str,
        algorithm: ClusteringAlgorithm,
        k: Option<usize>,
        nodes: &[KnowledgeNode],
        edges: &[KnowledgeEdge],
    ) -> Vec<KnowledgeCluster> {
        match algorithm {
            ClusteringAlgorithm::Community => self.community(workspace, nodes, edges),
            ClusteringAlgorithm::KMeans => {
                let refs: Vec<&KnowledgeNode> = nodes.iter().collect();
                self.k_means(workspace, &refs, k.unwrap_or(self.config.default_k))
            }
            ClusteringAlgorithm::Hierarchical => self.hierarchical(workspace, nodes),
        }
    }

    /// Connected components over edges stronger than the community threshold
    ///
    /// Edges are treated as undirected. Components with a single member are
    /// dropped.
    pub fn community(
        &self,
        workspace: &str,
        nodes: &[KnowledgeNode],
        edges: &[KnowledgeEdge],
    ) -> Vec<KnowledgeCluster> {
        let index: HashMap<&str, usize> = nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (n.id.as_str(), i))
            .collect();

        let mut neighbors: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];
        for edge in edges {
            if edge.strength <= self.config.community_strength_threshold {
                continue;
            }
            let (Some(&s), Some(&t)) = (
                index.get(edge.source_id.as_str()),
                index.get(edge.target_id.as_str()),
            ) else {
                continue;
            };
            if s != t {
                neighbors[s].push(t);
                neighbors[t].push(s);
            }
        }

        let mut visited = vec![false; nodes.len()];
        let mut clusters = Vec::new();

        for start in 0..nodes.len() {
            if visited[start] {
                continue;
            }
            visited[start] = true;

            let mut component = vec![start];
            let mut queue = VecDeque::from([start]);
            while let Some(current) = queue.pop_front() {
                for &next in &neighbors[current] {
                    if !visited[next] {
                        visited[next] = true;
                        component.push(next);
                        queue.push_back(next);
                    }
                }
            }

            if component.len() >= 2 {
                let members: Vec<&KnowledgeNode> = component.iter().map(|&i| &nodes[i]).collect();
                clusters.push(self.build_cluster(workspace, ClusteringAlgorithm::Community, &members));
            }
        }

        clusters
    }

    /// Single assignment pass against the first `k` nodes as seeds
    ///
    /// Centroids are never recomputed. Empty clusters are dropped.
    pub fn k_means(
        &self,
        workspace: &str,
        nodes: &[&KnowledgeNode],
        k: usize,
    ) -> Vec<KnowledgeCluster> {
        let k = k.min(nodes.len());
        if k == 0 {
            return Vec::new();
        }

        let seeds: Vec<&[f32]> = nodes[..k].iter().map(|n| n.embedding.as_slice()).collect();
        let mut groups: Vec<Vec<&KnowledgeNode>> = vec![Vec::new(); k];

        for &node in nodes {
            let mut best = 0;
            let mut best_similarity = f32::NEG_INFINITY;
            for (i, seed) in seeds.iter().enumerate() {
                let similarity = cosine_similarity(&node.embedding, seed);
                if similarity > best_similarity {
                    best = i;
                    best_similarity = similarity;
                }
            }
            groups[best].push(node);
        }

        groups
            .into_iter()
            .filter(|g| !g.is_empty())
            .map(|g| self.build_cluster(workspace, ClusteringAlgorithm::KMeans, &g))
            .collect()
    }

    /// Agglomerative clustering until at most max(2, N/3) clusters remain
    pub fn hierarchical(&self, workspace: &str, nodes: &[KnowledgeNode]) -> Vec<KnowledgeCluster> {
        if nodes.is_empty() {
            return Vec::new();
        }

        let target = (nodes.len() / 3).max(2);
        let mut groups: Vec<Vec<usize>> = (0..nodes.len()).map(|i| vec![i]).collect();

        while groups.len() > target {
            let mut best = (0, 1);
            let mut best_similarity = f32::NEG_INFINITY;

            for i in 0..groups.len() {
                let a: Vec<&[f32]> = groups[i].iter().map(|&m| nodes[m].embedding.as_slice()).collect();
                for j in (i + 1)..groups.len() {
                    let b: Vec<&[f32]> =
                        groups[j].iter().map(|&m| nodes[m].embedding.as_slice()).collect();
                    let similarity = average_linkage(&a, &b);
                    if similarity > best_similarity {
                        best = (i, j);
                        best_similarity = similarity;
                    }
                }
            }

            let merged = groups.remove(best.1);
            groups[best.0].extend(merged);
        }

        groups
            .iter()
            .map(|g| {
                let members: Vec<&KnowledgeNode> = g.iter().map(|&i| &nodes[i]).collect();
                self.build_cluster(workspace, ClusteringAlgorithm::Hierarchical, &members)
            })
            .collect()
    }

    /// Compute centroid, coherence and topics for a member set
    pub fn build_cluster(
        &self,
        workspace: &str,
        algorithm: ClusteringAlgorithm,
        members: &[&KnowledgeNode],
    ) -> KnowledgeCluster {
        let vectors: Vec<&[f32]> = members.iter().map(|n| n.embedding.as_slice()).collect();

        let centroid = match mean_vector(vectors.iter().copied()) {
            Some(mean) => {
                let mut best = 0;
                let mut best_similarity = f32::NEG_INFINITY;
                for (i, v) in vectors.iter().enumerate() {
                    let similarity = cosine_similarity(v, &mean);
                    if similarity > best_similarity {
                        best = i;
                        best_similarity = similarity;
                    }
                }
                members[best].id.clone()
            }
            None => String::new(),
        };

        let coherence = average_pairwise_similarity(&vectors).clamp(0.0, 1.0);
        let topics = self.extract_topics(members.iter().map(|n| n.content.as_str()));

        KnowledgeCluster::new(
            workspace,
            algorithm,
            centroid,
            members.iter().map(|n| n.id.clone()).collect(),
            coherence,
            topics,
            self.config.cache_ttl(),
        )
    }

    /// Most frequent lower-cased words of at least `min_topic_word_len` chars
    ///
    /// Ties are broken alphabetically.
    pub fn extract_topics<'a, I>(&self, contents: I) -> Vec<String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut counts: BTreeMap<String, usize> = BTreeMap::new();
        for content in contents {
            for word in content
                .to_lowercase()
                .split(|c: char| !c.is_alphanumeric())
                .filter(|w| w.chars().count() >= self.config.min_topic_word_len)
            {
                *counts.entry(word.to_string()).or_insert(0) += 1;
            }
        }

        let mut ranked: Vec<(String, usize)> = counts.into_iter().collect();
        // BTreeMap iteration is alphabetical and the sort is stable
        ranked.sort_by(|a, b| b.1.cmp(&a.1));
        ranked
            .into_iter()
            .take(self.config.topic_count)
            .map(|(word, _)| word)
            .collect()
    }
}

/// Store-backed clustering with a TTL cache
pub struct ClusteringEngine<S: GraphStore> {
    store: Arc<S>,
    clusterer: Clusterer,
}

impl<S: GraphStore> Clone for ClusteringEngine<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            clusterer: self.clusterer.clone(),
        }
    }
}

impl<S: GraphStore> ClusteringEngine<S> {
    pub fn new(store: Arc<S>, config: ClusteringConfig) -> Self {
        Self {
            store,
            clusterer: Clusterer::new(config),
        }
    }

    pub fn clusterer(&self) -> &Clusterer {
        &self.clusterer
    }

    /// Cluster the workspace and refresh the cache for `algorithm`
    pub async fn cluster(
        &self,
        workspace: &str,
        algorithm: ClusteringAlgorithm,
        k: Option<usize>,
    ) -> Result<Vec<KnowledgeCluster>> {
        let nodes = self.store.list_nodes(workspace).await?;
        let edges = match algorithm {
            ClusteringAlgorithm::Community => self.store.list_edges(workspace).await?,
            _ => Vec::new(),
        };

        let clusters = self.clusterer.run(workspace, algorithm, k, &nodes, &edges);

        if let Err(e) = self.store.save_clusters(workspace, algorithm, &clusters).await {
            tracing::warn!(
                workspace = workspace,
                algorithm = %algorithm,
                error = %e,
                "Failed to cache clusters"
            );
        }

        tracing::info!(
            workspace = workspace,
            algorithm = %algorithm,
            nodes = nodes.len(),
            clusters = clusters.len(),
            "Clustering completed"
        );

        Ok(clusters)
    }

    /// Unexpired cached clusters
    pub async fn cached(
        &self,
        workspace: &str,
        algorithm: ClusteringAlgorithm,
    ) -> Result<Vec<KnowledgeCluster>> {
        self.store.load_clusters(workspace, algorithm).await
    }
}

/// Membership of each cluster as a set, for comparing runs
pub fn membership(clusters: &[KnowledgeCluster]) -> Vec<HashSet<String>> {
    clusters
        .iter()
        .map(|c| c.members.iter().cloned().collect())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::graph::edge::RelationshipType;
    use crate::domain::graph::node::{NodeMetadata, NodeType};

    fn node(id: &str, content: &str, embedding: Vec<f32>) -> KnowledgeNode {
        let mut n = KnowledgeNode::new(
            "ws",
            NodeType::insight(),
            content,
            embedding,
            NodeMetadata::default(),
            "tester",
        );
        n.id = id.to_string();
        n
    }

    fn edge(source: &str, target: &str, strength: f32) -> KnowledgeEdge {
        KnowledgeEdge::new("ws", source, target, RelationshipType::RelatesTo, strength).unwrap()
    }

    fn clusterer() -> Clusterer {
        Clusterer::new(ClusteringConfig::default())
    }

    #[test]
    fn test_community_strong_edges_only() {
        let nodes = vec![
            node("a", "alpha", vec![1.0, 0.0]),
            node("b", "beta", vec![1.0, 0.1]),
            node("c", "gamma", vec![0.0, 1.0]),
            node("d", "delta", vec![0.1, 1.0]),
            node("e", "epsilon", vec![0.5, 0.5]),
        ];
        let edges = vec![
            edge("a", "b", 0.9),
            edge("c", "d", 0.6),
            edge("b", "c", 0.5), // not strictly above threshold
        ];

        let clusters = clusterer().community("ws", &nodes, &edges);
        let sets = membership(&clusters);
        assert_eq!(clusters.len(), 2);
        assert!(sets.contains(&HashSet::from(["a".to_string(), "b".to_string()])));
        assert!(sets.contains(&HashSet::from(["c".to_string(), "d".to_string()])));
    }

    #[test]
    fn test_k_means_single_pass() {
        let nodes = vec![
            node("a", "x", vec![1.0, 0.0]),
            node("b", "y", vec![0.0, 1.0]),
            node("c", "z", vec![0.9, 0.1]),
            node("d", "w", vec![0.1, 0.9]),
        ];
        let refs: Vec<&KnowledgeNode> = nodes.iter().collect();
        let clusters = clusterer().k_means("ws", &refs, 2);

        assert_eq!(clusters.len(), 2);
        assert_eq!(clusters[0].members, vec!["a", "c"]);
        assert_eq!(clusters[1].members, vec!["b", "d"]);
        assert!(clusters.iter().all(|c| c.algorithm == ClusteringAlgorithm::KMeans));
    }

    #[test]
    fn test_k_means_drops_empty_and_caps_k() {
        let nodes = vec![
            node("a", "x", vec![1.0, 0.0]),
            node("b", "y", vec![1.0, 0.0]),
        ];
        let refs: Vec<&KnowledgeNode> = nodes.iter().collect();
        // Both seeds are identical, so the second never wins a tie
        let clusters = clusterer().k_means("ws", &refs, 10);
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].members.len(), 2);

        assert!(clusterer().k_means("ws", &[], 3).is_empty());
    }

    #[test]
    fn test_hierarchical_target_count() {
        let nodes: Vec<KnowledgeNode> = (0..9)
            .map(|i| {
                let axis = (i / 3) as usize;
                let mut v = vec![0.0; 3];
                v[axis] = 1.0;
                v[(axis + 1) % 3] = 0.05 * (i % 3) as f32;
                node(&format!("n{}", i), "text", v)
            })
            .collect();

        let clusters = clusterer().hierarchical("ws", &nodes);
        assert_eq!(clusters.len(), 3);
        for cluster in &clusters {
            assert_eq!(cluster.size(), 3);
            assert!(cluster.coherence_score > 0.9);
        }
    }

    #[test]
    fn test_hierarchical_small_graph() {
        let nodes = vec![node("a", "x", vec![1.0, 0.0])];
        let clusters = clusterer().hierarchical("ws", &nodes);
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].coherence_score, 1.0);
        assert!(clusterer().hierarchical("ws", &[]).is_empty());
    }

    #[test]
    fn test_centroid_closest_to_mean() {
        let nodes = vec![
            node("a", "x", vec![1.0, 0.0]),
            node("b", "y", vec![0.7, 0.7]),
            node("c", "z", vec![0.0, 1.0]),
        ];
        let refs: Vec<&KnowledgeNode> = nodes.iter().collect();
        let cluster = clusterer().build_cluster("ws", ClusteringAlgorithm::KMeans, &refs);
        assert_eq!(cluster.centroid, "b");
    }

    #[test]
    fn test_topics() {
        let topics = clusterer().extract_topics([
            "Transfer learning reduces data needs",
            "Learning from data requires care",
            "Data pipelines feed learning",
        ]);
        assert_eq!(topics[0], "data");
        assert_eq!(topics[1], "learning");
        assert_eq!(topics.len(), 5);
        assert!(topics.iter().all(|t| t.len() > 3));
        // Remaining single-count words come alphabetically
        assert_eq!(topics[2], "care");
    }
}
