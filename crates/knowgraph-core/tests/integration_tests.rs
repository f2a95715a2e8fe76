//! Knowgraph Core Integration Tests

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use knowgraph_core::{
    Error, Result,
    config::Config,
    domain::graph::{
        ChangeKind, ClusteringAlgorithm, Embedding, EmbeddingProvider, GraphQuery, GraphStore,
        KnowledgeGraphService, NodeMetadata, NodeType, RelationshipType, cosine_similarity,
        membership,
    },
    infrastructure::embedding::HashingEmbeddingProvider,
    infrastructure::graph::SqliteGraphStore,
    storage::{Database, DatabaseConfig},
};

const DEEP_LEARNING: &str = "Deep learning requires large training datasets";
const TRANSFER_LEARNING: &str = "We will use transfer learning to reduce data requirements";

/// Returns a fixed vector per known text
struct FixedEmbedder {
    vectors: HashMap<&'static str, Vec<f32>>,
}

impl FixedEmbedder {
    fn new(entries: &[(&'static str, Vec<f32>)]) -> Self {
        Self {
            vectors: entries.iter().cloned().collect(),
        }
    }
}

#[async_trait]
impl EmbeddingProvider for FixedEmbedder {
    async fn embed(&self, text: &str) -> Result<Embedding> {
        self.vectors
            .get(text)
            .map(|v| Embedding::new(v.clone(), "fixed"))
            .ok_or_else(|| Error::EmbeddingFailed(format!("no vector for '{}'", text)))
    }

    fn model(&self) -> &str {
        "fixed"
    }
}

async fn service_with(
    embedder: Arc<dyn EmbeddingProvider>,
) -> KnowledgeGraphService<SqliteGraphStore> {
    let store = Arc::new(
        SqliteGraphStore::in_memory()
            .await
            .expect("Failed to create test store"),
    );
    KnowledgeGraphService::new(store, embedder, Config::default())
}

/// Same vector for every text, so each new node matches all earlier ones
struct ConstantEmbedder;

#[async_trait]
impl EmbeddingProvider for ConstantEmbedder {
    async fn embed(&self, _text: &str) -> Result<Embedding> {
        Ok(Embedding::new(vec![1.0, 0.0], "constant"))
    }

    fn model(&self) -> &str {
        "constant"
    }
}

fn one_hot(dim: usize, axis: usize) -> Vec<f32> {
    let mut v = vec![0.0; dim];
    v[axis] = 1.0;
    v
}

#[tokio::test]
async fn test_end_to_end_discovery_and_query() {
    let embedder = FixedEmbedder::new(&[
        (DEEP_LEARNING, vec![0.8, 0.6, 0.0]),
        (TRANSFER_LEARNING, vec![0.6, 0.8, 0.0]),
        ("Sourdough needs a starter", vec![0.0, 0.1, 1.0]),
        ("transfer learning data", vec![0.5, 0.85, 0.1]),
    ]);
    let svc = service_with(Arc::new(embedder)).await;

    let a = svc
        .add_node("research", NodeType::insight(), DEEP_LEARNING, NodeMetadata::default(), "alice")
        .await
        .unwrap();
    let b = svc
        .add_node("research", NodeType::decision(), TRANSFER_LEARNING, NodeMetadata::default(), "bob")
        .await
        .unwrap();
    svc.add_node(
        "research",
        NodeType::fact(),
        "Sourdough needs a starter",
        NodeMetadata::default(),
        "carol",
    )
    .await
    .unwrap();

    let similarity = cosine_similarity(&a.node.embedding, &b.node.embedding);
    assert!(similarity >= 0.7);

    // Exactly one auto-discovered edge, created when B arrived
    let edges = svc.get_all_edges("research").await.unwrap();
    assert_eq!(edges.len(), 1);
    assert!(edges[0].connects(&a.node.id, &b.node.id));
    assert_eq!(edges[0].strength, similarity);

    let result = svc.search("research", "transfer learning data").await;
    let top: Vec<&str> = result.node_ids().into_iter().take(2).collect();
    assert!(top.contains(&b.node.id.as_str()));
    assert_eq!(result.nodes[0].node.id, b.node.id);
    assert!(result.edges.iter().any(|e| e.id == edges[0].id));
    assert!(!result.paths.is_empty());
    assert_eq!(result.total_results, 3);
}

#[tokio::test]
async fn test_end_to_end_with_hashing_embeddings() {
    let svc = service_with(Arc::new(HashingEmbeddingProvider::default())).await;

    let a = svc
        .add_node("ws", NodeType::insight(), DEEP_LEARNING, NodeMetadata::default(), "alice")
        .await
        .unwrap();
    let b = svc
        .add_node("ws", NodeType::decision(), TRANSFER_LEARNING, NodeMetadata::default(), "bob")
        .await
        .unwrap();

    let similarity = cosine_similarity(&a.node.embedding, &b.node.embedding);
    let edges = svc.get_all_edges("ws").await.unwrap();
    if similarity >= 0.7 {
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].strength, similarity);
    } else {
        assert!(edges.is_empty());
    }

    let result = svc.search("ws", "transfer learning data").await;
    assert!(result.node_ids().contains(&b.node.id.as_str()));
}

#[tokio::test]
async fn test_edge_strength_bounds() {
    let embedder = FixedEmbedder::new(&[("left", one_hot(2, 0)), ("right", one_hot(2, 1))]);
    let svc = service_with(Arc::new(embedder)).await;
    let left = svc
        .add_node("ws", NodeType::fact(), "left", NodeMetadata::default(), "t")
        .await
        .unwrap()
        .node;
    let right = svc
        .add_node("ws", NodeType::fact(), "right", NodeMetadata::default(), "t")
        .await
        .unwrap()
        .node;

    for strength in [0.0, 0.25, 0.5, 0.999, 1.0] {
        let edge = svc
            .add_edge("ws", &left.id, &right.id, RelationshipType::Supports, strength)
            .await
            .unwrap();
        let stored = svc.get_edge("ws", &edge.id).await.unwrap().unwrap();
        assert_eq!(stored.strength, strength);
    }

    for strength in [-0.01, 1.01, f32::NAN] {
        let err = svc
            .add_edge("ws", &left.id, &right.id, RelationshipType::Supports, strength)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidStrength(_)));
    }
    assert_eq!(svc.get_all_edges("ws").await.unwrap().len(), 5);
}

#[tokio::test]
async fn test_add_edge_with_missing_endpoint() {
    let embedder = FixedEmbedder::new(&[("only", one_hot(2, 0))]);
    let svc = service_with(Arc::new(embedder)).await;
    let node = svc
        .add_node("ws", NodeType::fact(), "only", NodeMetadata::default(), "t")
        .await
        .unwrap()
        .node;

    let err = svc
        .add_edge("ws", &node.id, "missing", RelationshipType::DependsOn, 0.5)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NodeNotFound(_)));

    let err = svc
        .add_edge("ws", "missing", &node.id, RelationshipType::DependsOn, 0.5)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NodeNotFound(_)));

    assert!(svc.get_all_edges("ws").await.unwrap().is_empty());
    assert_eq!(svc.get_adjacency("ws", &node.id).await.unwrap().degree(), 0);
    assert!(svc.get_adjacency("ws", "missing").await.unwrap().incoming.is_empty());
}

/// Five unrelated nodes with edges 0-1, 1-2, 2-3; node 4 isolated
async fn chain_graph() -> (KnowledgeGraphService<SqliteGraphStore>, Vec<String>) {
    let texts = ["n0", "n1", "n2", "n3", "n4"];
    let embedder = FixedEmbedder::new(
        &texts
            .iter()
            .enumerate()
            .map(|(i, t)| (*t, one_hot(5, i)))
            .collect::<Vec<_>>(),
    );
    let svc = service_with(Arc::new(embedder)).await;

    let mut ids = Vec::new();
    for text in texts {
        let added = svc
            .add_node("ws", NodeType::insight(), text, NodeMetadata::default(), "t")
            .await
            .unwrap();
        assert!(added.discovery.edges.is_empty());
        ids.push(added.node.id);
    }
    for (s, t) in [(0, 1), (1, 2), (2, 3)] {
        svc.add_edge("ws", &ids[s], &ids[t], RelationshipType::RelatesTo, 0.9)
            .await
            .unwrap();
    }
    (svc, ids)
}

#[tokio::test]
async fn test_metrics_on_chain_graph() {
    let (svc, ids) = chain_graph().await;

    let metrics = svc.get_graph_metrics("ws").await.unwrap();
    assert_eq!(metrics.node_count, 5);
    assert_eq!(metrics.edge_count, 3);
    assert!((metrics.density - 0.3).abs() < 1e-9);
    assert!((metrics.average_degree - 1.2).abs() < 1e-9);
    assert_eq!(metrics.centrality_scores[&ids[1]], 1.0);
    assert_eq!(metrics.centrality_scores[&ids[2]], 1.0);
    assert_eq!(metrics.centrality_scores[&ids[4]], 0.0);
    assert_eq!(metrics.clustering_coefficient, 0.0);

    // The chain is the only community; the isolate stays out
    assert_eq!(metrics.community_structure.len(), 1);
    assert_eq!(metrics.community_structure[0].size(), 4);
    assert!(!metrics.community_structure[0].contains(&ids[4]));
}

#[tokio::test]
async fn test_metrics_on_empty_workspace() {
    let svc = service_with(Arc::new(HashingEmbeddingProvider::default())).await;
    let metrics = svc.get_graph_metrics("empty").await.unwrap();
    assert_eq!(metrics.node_count, 0);
    assert_eq!(metrics.density, 0.0);
    assert_eq!(metrics.average_degree, 0.0);
    assert!(metrics.community_structure.is_empty());
}

#[tokio::test]
async fn test_community_detection_is_idempotent() {
    let (svc, _) = chain_graph().await;

    let first = svc
        .cluster("ws", ClusteringAlgorithm::Community, None)
        .await
        .unwrap();
    let second = svc
        .cluster("ws", ClusteringAlgorithm::Community, None)
        .await
        .unwrap();
    assert_eq!(membership(&first), membership(&second));
    assert_eq!(
        first.iter().map(|c| &c.centroid).collect::<Vec<_>>(),
        second.iter().map(|c| &c.centroid).collect::<Vec<_>>()
    );

    let cached = svc
        .cached_clusters("ws", ClusteringAlgorithm::Community)
        .await
        .unwrap();
    assert_eq!(cached, second);
}

#[tokio::test]
async fn test_paths_and_removal() {
    let (svc, ids) = chain_graph().await;

    let paths = svc.find_paths("ws", &ids[0], &ids[3], 3).await.unwrap();
    assert_eq!(paths.len(), 1);
    assert_eq!(paths[0].hops, 3);
    assert_eq!(paths[0].node_ids, vec![ids[0].clone(), ids[1].clone(), ids[2].clone(), ids[3].clone()]);
    assert!(svc.find_paths("ws", &ids[0], &ids[3], 2).await.unwrap().is_empty());
    assert!(svc.find_paths("ws", &ids[0], &ids[4], 5).await.unwrap().is_empty());

    svc.remove_node("ws", &ids[1]).await.unwrap();
    assert!(svc.find_paths("ws", &ids[0], &ids[3], 5).await.unwrap().is_empty());
    assert_eq!(svc.get_all_edges("ws").await.unwrap().len(), 1);
    assert!(svc.get_adjacent("ws", &ids[0]).await.unwrap().is_empty());

    let history = svc.evolution_history("ws", 3).await.unwrap();
    assert_eq!(history[0].change_kind, ChangeKind::NodeDeleted);
    assert!(history[1..].iter().all(|e| e.change_kind == ChangeKind::EdgeDeleted));
}

#[tokio::test]
async fn test_query_filters() {
    let (svc, ids) = chain_graph().await;

    let query = GraphQuery::new("n1")
        .with_node_type(NodeType::insight())
        .with_relationship_type(RelationshipType::Supports)
        .with_limit(2);
    let result = svc.query_graph("ws", &query).await;
    assert_eq!(result.nodes[0].node.id, ids[1]);
    assert!(result.edges.is_empty());

    let none = svc
        .query_graph("ws", &GraphQuery::new("n1").with_node_type(NodeType::question()))
        .await;
    assert!(none.is_empty());

    // Unknown text fails to embed; queries degrade instead of erroring
    assert!(svc.search("ws", "unknown").await.is_empty());
}

#[tokio::test]
async fn test_insights_and_purge() {
    let (svc, _) = chain_graph().await;

    let insights = svc.generate_insights("ws").await.unwrap();
    assert!(insights.windows(2).all(|w| w[0].confidence >= w[1].confidence));
    assert_eq!(svc.active_insights("ws").await.unwrap(), insights);

    let purged = svc.purge_expired("ws").await.unwrap();
    assert_eq!(purged.total(), 0);
    assert!(svc.store().count_nodes("ws").await.unwrap() == 5);
}

#[tokio::test]
async fn test_concurrent_discovery_on_file_database() {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::new(DatabaseConfig::with_path(dir.path().join("kg.db")))
        .await
        .expect("Failed to create file database");
    let store = Arc::new(SqliteGraphStore::from_database(&db));
    let svc = KnowledgeGraphService::new(
        Arc::clone(&store),
        Arc::new(ConstantEmbedder),
        Config::default(),
    );

    for i in 0..30 {
        let added = svc
            .add_node(
                "ws",
                NodeType::insight(),
                &format!("note {}", i),
                NodeMetadata::default(),
                "tester",
            )
            .await
            .unwrap();
        assert_eq!(added.discovery.edges.len(), i);
        assert_eq!(added.discovery.skipped, 0);
        assert!(!added.discovery.timed_out);
    }

    // Every pair of the 30 nodes is linked exactly once
    assert_eq!(store.count_edges("ws").await.unwrap(), 435);
    let last = store.list_nodes("ws").await.unwrap().pop().unwrap();
    assert_eq!(store.adjacency("ws", &last.id).await.unwrap().outgoing.len(), 29);

    db.close().await;
}
