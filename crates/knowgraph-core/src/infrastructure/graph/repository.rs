//! SQLite implementation of the GraphStore
//!
//! Nodes, edges and the adjacency index live in plain tables keyed by
//! workspace. Vector search is a full scan with cosine similarity computed in
//! Rust; payload columns go through the versioned codec.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, Sqlite, SqlitePool, Transaction};
use tracing::{debug, info};

use super::codec::{
    decode_embedding, decode_payload, decode_timestamp, encode_embedding, encode_payload,
    encode_timestamp,
};
use crate::domain::graph::{
    ChangeKind, ClusteringAlgorithm, Direction, GraphStats, GraphStore, ImpactEstimate,
    KnowledgeCluster, KnowledgeEdge, KnowledgeEvolution, KnowledgeInsight, KnowledgeNode,
    NodeAdjacency, NodeMetadata, NodeType, PurgeStats, RelationshipType, ScoredNode,
    cosine_similarity,
};
use crate::error::{Error, Result};
use crate::storage::Database;

const NODE_COLUMNS: &str = r#"
    n.workspace_id, n.id, n.node_type, n.content, n.metadata, n.created_by, n.created_at,
    e.dimension, e.embedding
"#;

const NODE_JOIN: &str = r#"
    kg_nodes n
    LEFT JOIN kg_node_embeddings e ON e.workspace_id = n.workspace_id AND e.node_id = n.id
"#;

const EDGE_COLUMNS: &str =
    "workspace_id, id, source_id, target_id, relationship, strength, created_at";

/// SQLite implementation of the graph store
#[derive(Clone)]
pub struct SqliteGraphStore {
    pool: SqlitePool,
}

impl SqliteGraphStore {
    /// Create a store over an existing, migrated pool
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a store sharing a database's pool
    pub fn from_database(db: &Database) -> Self {
        Self::new(db.pool().clone())
    }

    /// Migrated in-memory store (useful for testing)
    pub async fn in_memory() -> anyhow::Result<Self> {
        let db = Database::in_memory().await?;
        Ok(Self::from_database(&db))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Start a write transaction that holds the write lock from the outset
    ///
    /// A deferred transaction that reads before writing cannot upgrade its
    /// snapshot once another connection has committed; SQLite fails it with
    /// `SQLITE_BUSY` instead of waiting on the busy timeout.
    async fn begin_write(&self) -> Result<Transaction<'static, Sqlite>> {
        Ok(self.pool.begin_with("BEGIN IMMEDIATE").await?)
    }

    async fn nodes_where(&self, workspace: &str, node_type: Option<&NodeType>) -> Result<Vec<KnowledgeNode>> {
        let rows: Vec<NodeRow> = match node_type {
            Some(node_type) => {
                sqlx::query_as(&format!(
                    "SELECT {} FROM {} WHERE n.workspace_id = ? AND n.node_type = ? ORDER BY n.rowid",
                    NODE_COLUMNS, NODE_JOIN
                ))
                .bind(workspace)
                .bind(node_type.as_str())
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as(&format!(
                    "SELECT {} FROM {} WHERE n.workspace_id = ? ORDER BY n.rowid",
                    NODE_COLUMNS, NODE_JOIN
                ))
                .bind(workspace)
                .fetch_all(&self.pool)
                .await?
            }
        };

        rows.into_iter().map(NodeRow::into_node).collect()
    }
}

#[async_trait]
impl GraphStore for SqliteGraphStore {
    // ========== Node Operations ==========

    async fn insert_node(&self, node: &KnowledgeNode) -> Result<()> {
        if node.embedding.is_empty() {
            return Err(Error::InvalidInput(format!(
                "node '{}' has no embedding",
                node.id
            )));
        }
        let metadata = encode_payload("node", &node.metadata)?;

        let mut tx = self.begin_write().await?;

        sqlx::query(
            r#"
            INSERT INTO kg_nodes (workspace_id, id, node_type, content, metadata, created_by, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&node.workspace)
        .bind(&node.id)
        .bind(node.node_type.as_str())
        .bind(&node.content)
        .bind(&metadata)
        .bind(&node.created_by)
        .bind(encode_timestamp(&node.created_at))
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO kg_node_embeddings (workspace_id, node_id, dimension, embedding) VALUES (?, ?, ?, ?)",
        )
        .bind(&node.workspace)
        .bind(&node.id)
        .bind(node.embedding.len() as i64)
        .bind(encode_embedding(&node.embedding))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        debug!(workspace = %node.workspace, node_id = %node.id, "Node saved");
        Ok(())
    }

    async fn get_node(&self, workspace: &str, id: &str) -> Result<Option<KnowledgeNode>> {
        let row: Option<NodeRow> = sqlx::query_as(&format!(
            "SELECT {} FROM {} WHERE n.workspace_id = ? AND n.id = ?",
            NODE_COLUMNS, NODE_JOIN
        ))
        .bind(workspace)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(NodeRow::into_node).transpose()
    }

    async fn list_nodes(&self, workspace: &str) -> Result<Vec<KnowledgeNode>> {
        self.nodes_where(workspace, None).await
    }

    async fn node_exists(&self, workspace: &str, id: &str) -> Result<bool> {
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT 1 FROM kg_nodes WHERE workspace_id = ? AND id = ?")
                .bind(workspace)
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.is_some())
    }

    async fn count_nodes(&self, workspace: &str) -> Result<u64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM kg_nodes WHERE workspace_id = ?")
            .bind(workspace)
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }

    async fn delete_node(&self, workspace: &str, id: &str) -> Result<bool> {
        let mut tx = self.begin_write().await?;

        sqlx::query(
            r#"
            DELETE FROM kg_adjacency
            WHERE workspace_id = ? AND edge_id IN (
                SELECT id FROM kg_edges WHERE workspace_id = ? AND (source_id = ? OR target_id = ?)
            )
            "#,
        )
        .bind(workspace)
        .bind(workspace)
        .bind(id)
        .bind(id)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM kg_edges WHERE workspace_id = ? AND (source_id = ? OR target_id = ?)")
            .bind(workspace)
            .bind(id)
            .bind(id)
            .execute(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM kg_node_embeddings WHERE workspace_id = ? AND node_id = ?")
            .bind(workspace)
            .bind(id)
            .execute(&mut *tx)
            .await?;

        let result = sqlx::query("DELETE FROM kg_nodes WHERE workspace_id = ? AND id = ?")
            .bind(workspace)
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        let deleted = result.rows_affected() > 0;
        if deleted {
            info!(workspace = workspace, node_id = id, "Node deleted");
        }
        Ok(deleted)
    }

    async fn embedding_dimension(&self, workspace: &str) -> Result<Option<usize>> {
        let row: Option<(i64,)> = sqlx::query_as(
            "SELECT dimension FROM kg_node_embeddings WHERE workspace_id = ? LIMIT 1",
        )
        .bind(workspace)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|(d,)| d as usize))
    }

    // ========== Edge Operations ==========

    async fn insert_edge(&self, edge: &KnowledgeEdge) -> Result<()> {
        let mut tx = self.begin_write().await?;

        for endpoint in [&edge.source_id, &edge.target_id] {
            let exists: Option<(i64,)> =
                sqlx::query_as("SELECT 1 FROM kg_nodes WHERE workspace_id = ? AND id = ?")
                    .bind(&edge.workspace)
                    .bind(endpoint)
                    .fetch_optional(&mut *tx)
                    .await?;
            if exists.is_none() {
                // Dropping the transaction rolls it back
                return Err(Error::NodeNotFound(endpoint.clone()));
            }
        }

        sqlx::query(
            r#"
            INSERT INTO kg_edges (workspace_id, id, source_id, target_id, relationship, strength, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&edge.workspace)
        .bind(&edge.id)
        .bind(&edge.source_id)
        .bind(&edge.target_id)
        .bind(edge.relationship.as_str())
        .bind(edge.strength as f64)
        .bind(encode_timestamp(&edge.created_at))
        .execute(&mut *tx)
        .await?;

        for (node_id, direction) in [
            (&edge.source_id, Direction::Outgoing),
            (&edge.target_id, Direction::Incoming),
        ] {
            sqlx::query(
                "INSERT OR IGNORE INTO kg_adjacency (workspace_id, node_id, direction, edge_id) VALUES (?, ?, ?, ?)",
            )
            .bind(&edge.workspace)
            .bind(node_id)
            .bind(direction.as_str())
            .bind(&edge.id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        debug!(
            workspace = %edge.workspace,
            edge_id = %edge.id,
            source = %edge.source_id,
            target = %edge.target_id,
            "Edge saved"
        );
        Ok(())
    }

    async fn get_edge(&self, workspace: &str, id: &str) -> Result<Option<KnowledgeEdge>> {
        let row: Option<EdgeRow> = sqlx::query_as(&format!(
            "SELECT {} FROM kg_edges WHERE workspace_id = ? AND id = ?",
            EDGE_COLUMNS
        ))
        .bind(workspace)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(EdgeRow::into_edge).transpose()
    }

    async fn list_edges(&self, workspace: &str) -> Result<Vec<KnowledgeEdge>> {
        let rows: Vec<EdgeRow> = sqlx::query_as(&format!(
            "SELECT {} FROM kg_edges WHERE workspace_id = ? ORDER BY rowid",
            EDGE_COLUMNS
        ))
        .bind(workspace)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(EdgeRow::into_edge).collect()
    }

    async fn count_edges(&self, workspace: &str) -> Result<u64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM kg_edges WHERE workspace_id = ?")
            .bind(workspace)
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }

    async fn delete_edge(&self, workspace: &str, id: &str) -> Result<bool> {
        let mut tx = self.begin_write().await?;

        sqlx::query("DELETE FROM kg_adjacency WHERE workspace_id = ? AND edge_id = ?")
            .bind(workspace)
            .bind(id)
            .execute(&mut *tx)
            .await?;

        let result = sqlx::query("DELETE FROM kg_edges WHERE workspace_id = ? AND id = ?")
            .bind(workspace)
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        let deleted = result.rows_affected() > 0;
        if deleted {
            info!(workspace = workspace, edge_id = id, "Edge deleted");
        }
        Ok(deleted)
    }

    // ========== Adjacency ==========

    async fn adjacency(&self, workspace: &str, node_id: &str) -> Result<NodeAdjacency> {
        let rows: Vec<(String, String)> = sqlx::query_as(
            "SELECT direction, edge_id FROM kg_adjacency WHERE workspace_id = ? AND node_id = ? ORDER BY rowid",
        )
        .bind(workspace)
        .bind(node_id)
        .fetch_all(&self.pool)
        .await?;

        let mut adjacency = NodeAdjacency::new(node_id);
        for (direction, edge_id) in rows {
            match Direction::parse(&direction) {
                Some(Direction::Outgoing) => adjacency.outgoing.push(edge_id),
                Some(Direction::Incoming) => adjacency.incoming.push(edge_id),
                None => {
                    return Err(Error::decode(
                        "adjacency",
                        format!("unknown direction '{}'", direction),
                    ));
                }
            }
        }
        Ok(adjacency)
    }

    async fn edges_for_node(&self, workspace: &str, node_id: &str) -> Result<Vec<KnowledgeEdge>> {
        let rows: Vec<EdgeRow> = sqlx::query_as(&format!(
            r#"
            SELECT {} FROM kg_edges
            WHERE workspace_id = ? AND id IN (
                SELECT edge_id FROM kg_adjacency WHERE workspace_id = ? AND node_id = ?
            )
            ORDER BY rowid
            "#,
            EDGE_COLUMNS
        ))
        .bind(workspace)
        .bind(workspace)
        .bind(node_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(EdgeRow::into_edge).collect()
    }

    // ========== Vector Search ==========

    async fn nearest_nodes(
        &self,
        workspace: &str,
        query: &[f32],
        limit: usize,
        node_type: Option<&NodeType>,
    ) -> Result<Vec<ScoredNode>> {
        if limit == 0 || query.is_empty() {
            return Ok(Vec::new());
        }

        let nodes = self.nodes_where(workspace, node_type).await?;
        let scanned = nodes.len();

        let mut scored: Vec<ScoredNode> = nodes
            .into_iter()
            .filter(|n| n.embedding.len() == query.len())
            .map(|node| {
                let similarity = cosine_similarity(query, &node.embedding);
                ScoredNode { node, similarity }
            })
            .collect();

        scored.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        scored.truncate(limit);

        debug!(
            workspace = workspace,
            scanned = scanned,
            returned = scored.len(),
            "Vector search"
        );
        Ok(scored)
    }

    // ========== Evolution Log ==========

    async fn append_evolution(&self, entry: &KnowledgeEvolution) -> Result<()> {
        let affected = encode_payload("evolution", &entry.affected_ids)?;
        let impact = encode_payload("evolution", &entry.impact)?;
        let old_value = entry
            .old_value
            .as_ref()
            .map(|v| encode_payload("evolution", v))
            .transpose()?;
        let new_value = entry
            .new_value
            .as_ref()
            .map(|v| encode_payload("evolution", v))
            .transpose()?;

        sqlx::query(
            r#"
            INSERT INTO kg_evolution (
                workspace_id, id, timestamp, change_kind, affected_ids,
                old_value, new_value, impact, expires_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&entry.workspace)
        .bind(&entry.id)
        .bind(encode_timestamp(&entry.timestamp))
        .bind(entry.change_kind.as_str())
        .bind(&affected)
        .bind(&old_value)
        .bind(&new_value)
        .bind(&impact)
        .bind(encode_timestamp(&entry.expires_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn evolution_history(
        &self,
        workspace: &str,
        limit: usize,
    ) -> Result<Vec<KnowledgeEvolution>> {
        let rows: Vec<EvolutionRow> = sqlx::query_as(
            r#"
            SELECT * FROM kg_evolution
            WHERE workspace_id = ? AND expires_at > ?
            ORDER BY timestamp DESC, rowid DESC
            LIMIT ?
            "#,
        )
        .bind(workspace)
        .bind(encode_timestamp(&Utc::now()))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(EvolutionRow::into_entry).collect()
    }

    async fn evolution_since(
        &self,
        workspace: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<KnowledgeEvolution>> {
        let rows: Vec<EvolutionRow> = sqlx::query_as(
            r#"
            SELECT * FROM kg_evolution
            WHERE workspace_id = ? AND timestamp >= ? AND expires_at > ?
            ORDER BY timestamp, rowid
            "#,
        )
        .bind(workspace)
        .bind(encode_timestamp(&since))
        .bind(encode_timestamp(&Utc::now()))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(EvolutionRow::into_entry).collect()
    }

    async fn purge_expired(&self, workspace: &str, now: DateTime<Utc>) -> Result<PurgeStats> {
        let now = encode_timestamp(&now);
        let mut tx = self.begin_write().await?;

        let evolution = sqlx::query("DELETE FROM kg_evolution WHERE workspace_id = ? AND expires_at <= ?")
            .bind(workspace)
            .bind(&now)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        let clusters = sqlx::query("DELETE FROM kg_clusters WHERE workspace_id = ? AND expires_at <= ?")
            .bind(workspace)
            .bind(&now)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        let insights = sqlx::query(
            "DELETE FROM kg_insights WHERE workspace_id = ? AND expires_at IS NOT NULL AND expires_at <= ?",
        )
        .bind(workspace)
        .bind(&now)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        tx.commit().await?;

        Ok(PurgeStats {
            evolution,
            clusters,
            insights,
        })
    }

    // ========== Derived Caches ==========

    async fn save_clusters(
        &self,
        workspace: &str,
        algorithm: ClusteringAlgorithm,
        clusters: &[KnowledgeCluster],
    ) -> Result<()> {
        let mut tx = self.begin_write().await?;

        sqlx::query("DELETE FROM kg_clusters WHERE workspace_id = ? AND algorithm = ?")
            .bind(workspace)
            .bind(algorithm.as_str())
            .execute(&mut *tx)
            .await?;

        for cluster in clusters {
            sqlx::query(
                r#"
                INSERT INTO kg_clusters (workspace_id, id, algorithm, payload, created_at, expires_at)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(workspace)
            .bind(&cluster.id)
            .bind(algorithm.as_str())
            .bind(encode_payload("cluster", cluster)?)
            .bind(encode_timestamp(&cluster.created_at))
            .bind(encode_timestamp(&cluster.expires_at))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        debug!(
            workspace = workspace,
            algorithm = %algorithm,
            clusters = clusters.len(),
            "Clusters cached"
        );
        Ok(())
    }

    async fn load_clusters(
        &self,
        workspace: &str,
        algorithm: ClusteringAlgorithm,
    ) -> Result<Vec<KnowledgeCluster>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT payload FROM kg_clusters
            WHERE workspace_id = ? AND algorithm = ? AND expires_at > ?
            ORDER BY rowid
            "#,
        )
        .bind(workspace)
        .bind(algorithm.as_str())
        .bind(encode_timestamp(&Utc::now()))
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|(payload,)| decode_payload("cluster", payload))
            .collect()
    }

    async fn save_insights(&self, workspace: &str, insights: &[KnowledgeInsight]) -> Result<()> {
        let mut tx = self.begin_write().await?;

        sqlx::query("DELETE FROM kg_insights WHERE workspace_id = ?")
            .bind(workspace)
            .execute(&mut *tx)
            .await?;

        for insight in insights {
            sqlx::query(
                r#"
                INSERT INTO kg_insights (workspace_id, id, insight_type, confidence, payload, generated_at, expires_at)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(workspace)
            .bind(&insight.id)
            .bind(insight.insight_type.as_str())
            .bind(insight.confidence as f64)
            .bind(encode_payload("insight", insight)?)
            .bind(encode_timestamp(&insight.generated_at))
            .bind(insight.expires_at.as_ref().map(encode_timestamp))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        debug!(workspace = workspace, insights = insights.len(), "Insights cached");
        Ok(())
    }

    async fn load_insights(&self, workspace: &str) -> Result<Vec<KnowledgeInsight>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT payload FROM kg_insights
            WHERE workspace_id = ? AND (expires_at IS NULL OR expires_at > ?)
            ORDER BY confidence DESC, rowid
            "#,
        )
        .bind(workspace)
        .bind(encode_timestamp(&Utc::now()))
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|(payload,)| decode_payload("insight", payload))
            .collect()
    }

    // ========== Statistics ==========

    async fn stats(&self, workspace: &str) -> Result<GraphStats> {
        let by_type: Vec<(String, i64)> = sqlx::query_as(
            "SELECT node_type, COUNT(*) FROM kg_nodes WHERE workspace_id = ? GROUP BY node_type",
        )
        .bind(workspace)
        .fetch_all(&self.pool)
        .await?;

        let by_relationship: Vec<(String, i64)> = sqlx::query_as(
            "SELECT relationship, COUNT(*) FROM kg_edges WHERE workspace_id = ? GROUP BY relationship",
        )
        .bind(workspace)
        .fetch_all(&self.pool)
        .await?;

        let (average_strength,): (Option<f64>,) =
            sqlx::query_as("SELECT AVG(strength) FROM kg_edges WHERE workspace_id = ?")
                .bind(workspace)
                .fetch_one(&self.pool)
                .await?;

        let (evolution_entries,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM kg_evolution WHERE workspace_id = ?")
                .bind(workspace)
                .fetch_one(&self.pool)
                .await?;

        Ok(GraphStats {
            node_count: by_type.iter().map(|(_, c)| *c as u64).sum(),
            edge_count: by_relationship.iter().map(|(_, c)| *c as u64).sum(),
            nodes_by_type: by_type.into_iter().map(|(t, c)| (t, c as u64)).collect(),
            edges_by_relationship: by_relationship
                .into_iter()
                .map(|(r, c)| (r, c as u64))
                .collect(),
            average_strength: average_strength.unwrap_or(0.0),
            evolution_entries: evolution_entries as u64,
        })
    }
}

// ========== Row Types ==========

#[derive(Debug, FromRow)]
struct NodeRow {
    workspace_id: String,
    id: String,
    node_type: String,
    content: String,
    metadata: String,
    created_by: String,
    created_at: String,
    dimension: Option<i64>,
    embedding: Option<Vec<u8>>,
}

impl NodeRow {
    fn into_node(self) -> Result<KnowledgeNode> {
        let (Some(dimension), Some(blob)) = (self.dimension, self.embedding) else {
            return Err(Error::decode(
                "node",
                format!("node '{}' has no embedding", self.id),
            ));
        };
        let dimension = usize::try_from(dimension)
            .map_err(|_| Error::decode("embedding", format!("negative dimension {}", dimension)))?;

        let metadata: NodeMetadata = decode_payload("node", &self.metadata)?;

        Ok(KnowledgeNode {
            embedding: decode_embedding(&blob, dimension)?,
            created_at: decode_timestamp("node", &self.created_at)?,
            id: self.id,
            workspace: self.workspace_id,
            node_type: NodeType::new(&self.node_type),
            content: self.content,
            metadata,
            created_by: self.created_by,
        })
    }
}

#[derive(Debug, FromRow)]
struct EdgeRow {
    workspace_id: String,
    id: String,
    source_id: String,
    target_id: String,
    relationship: String,
    strength: f64,
    created_at: String,
}

impl EdgeRow {
    fn into_edge(self) -> Result<KnowledgeEdge> {
        let relationship = RelationshipType::parse(&self.relationship).ok_or_else(|| {
            Error::decode(
                "edge",
                format!("unknown relationship '{}'", self.relationship),
            )
        })?;

        Ok(KnowledgeEdge {
            created_at: decode_timestamp("edge", &self.created_at)?,
            id: self.id,
            workspace: self.workspace_id,
            source_id: self.source_id,
            target_id: self.target_id,
            relationship,
            strength: self.strength as f32,
        })
    }
}

#[derive(Debug, FromRow)]
struct EvolutionRow {
    workspace_id: String,
    id: String,
    timestamp: String,
    change_kind: String,
    affected_ids: String,
    old_value: Option<String>,
    new_value: Option<String>,
    impact: String,
    expires_at: String,
}

impl EvolutionRow {
    fn into_entry(self) -> Result<KnowledgeEvolution> {
        let change_kind = ChangeKind::parse(&self.change_kind).ok_or_else(|| {
            Error::decode(
                "evolution",
                format!("unknown change kind '{}'", self.change_kind),
            )
        })?;
        let impact: ImpactEstimate = decode_payload("evolution", &self.impact)?;

        Ok(KnowledgeEvolution {
            id: self.id,
            workspace: self.workspace_id,
            timestamp: decode_timestamp("evolution", &self.timestamp)?,
            change_kind,
            affected_ids: decode_payload("evolution", &self.affected_ids)?,
            old_value: self
                .old_value
                .as_deref()
                .map(|raw| decode_payload("evolution", raw))
                .transpose()?,
            new_value: self
                .new_value
                .as_deref()
                .map(|raw| decode_payload("evolution", raw))
                .transpose()?,
            impact,
            expires_at: decode_timestamp("evolution", &self.expires_at)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::graph::{InsightImpact, InsightType};

    async fn setup_test_store() -> SqliteGraphStore {
        SqliteGraphStore::in_memory()
            .await
            .expect("Failed to create test store")
    }

    fn node(workspace: &str, content: &str, embedding: Vec<f32>) -> KnowledgeNode {
        KnowledgeNode::new(
            workspace,
            NodeType::insight(),
            content,
            embedding,
            NodeMetadata::default().with_tags(vec!["test".into()]),
            "tester",
        )
    }

    async fn saved_node(store: &SqliteGraphStore, content: &str, embedding: Vec<f32>) -> KnowledgeNode {
        let n = node("ws", content, embedding);
        store.insert_node(&n).await.unwrap();
        n
    }

    #[tokio::test]
    async fn test_insert_and_get_node() {
        let store = setup_test_store().await;
        let n = saved_node(&store, "Deep learning requires data", vec![0.1, 0.2, 0.3]).await;

        let loaded = store.get_node("ws", &n.id).await.unwrap().unwrap();
        assert_eq!(loaded.id, n.id);
        assert_eq!(loaded.content, n.content);
        assert_eq!(loaded.embedding, n.embedding);
        assert_eq!(loaded.metadata, n.metadata);
        assert_eq!(loaded.created_at, n.created_at);

        assert!(store.get_node("other", &n.id).await.unwrap().is_none());
        assert_eq!(store.embedding_dimension("ws").await.unwrap(), Some(3));
        assert_eq!(store.embedding_dimension("other").await.unwrap(), None);
        assert!(store.node_exists("ws", &n.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_list_nodes_in_insertion_order() {
        let store = setup_test_store().await;
        let a = saved_node(&store, "a", vec![1.0]).await;
        let b = saved_node(&store, "b", vec![1.0]).await;
        let c = saved_node(&store, "c", vec![1.0]).await;

        let ids: Vec<String> = store
            .list_nodes("ws")
            .await
            .unwrap()
            .into_iter()
            .map(|n| n.id)
            .collect();
        assert_eq!(ids, vec![a.id, b.id, c.id]);
        assert_eq!(store.count_nodes("ws").await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_edge_strength_round_trips_exactly() {
        let store = setup_test_store().await;
        let a = saved_node(&store, "a", vec![1.0, 0.0]).await;
        let b = saved_node(&store, "b", vec![0.0, 1.0]).await;

        for strength in [0.0f32, 0.1, 0.333_333_3, 0.7, 1.0] {
            let edge =
                KnowledgeEdge::new("ws", &a.id, &b.id, RelationshipType::Supports, strength).unwrap();
            store.insert_edge(&edge).await.unwrap();
            let loaded = store.get_edge("ws", &edge.id).await.unwrap().unwrap();
            assert_eq!(loaded.strength, strength);
            assert_eq!(loaded.relationship, RelationshipType::Supports);
        }
    }

    #[tokio::test]
    async fn test_insert_edge_missing_endpoint() {
        let store = setup_test_store().await;
        let a = saved_node(&store, "a", vec![1.0]).await;

        let edge = KnowledgeEdge::new("ws", &a.id, "ghost", RelationshipType::RelatesTo, 0.5).unwrap();
        let err = store.insert_edge(&edge).await.unwrap_err();
        assert!(matches!(err, Error::NodeNotFound(ref id) if id == "ghost"));

        assert_eq!(store.count_edges("ws").await.unwrap(), 0);
        let adjacency = store.adjacency("ws", &a.id).await.unwrap();
        assert_eq!(adjacency.degree(), 0);
    }

    #[tokio::test]
    async fn test_adjacency_maintained() {
        let store = setup_test_store().await;
        let a = saved_node(&store, "a", vec![1.0]).await;
        let b = saved_node(&store, "b", vec![1.0]).await;
        let c = saved_node(&store, "c", vec![1.0]).await;

        let ab = KnowledgeEdge::new("ws", &a.id, &b.id, RelationshipType::RelatesTo, 0.5).unwrap();
        let cb = KnowledgeEdge::new("ws", &c.id, &b.id, RelationshipType::DependsOn, 0.9).unwrap();
        store.insert_edge(&ab).await.unwrap();
        store.insert_edge(&cb).await.unwrap();

        let adjacency = store.adjacency("ws", &b.id).await.unwrap();
        assert!(adjacency.outgoing.is_empty());
        assert_eq!(adjacency.incoming, vec![ab.id.clone(), cb.id.clone()]);

        let neighbors = store.neighbor_ids("ws", &b.id).await.unwrap();
        assert_eq!(neighbors, vec![a.id.clone(), c.id.clone()]);
        assert_eq!(store.edges_for_node("ws", &a.id).await.unwrap().len(), 1);

        assert!(store.delete_edge("ws", &ab.id).await.unwrap());
        assert!(!store.delete_edge("ws", &ab.id).await.unwrap());
        assert_eq!(store.adjacency("ws", &b.id).await.unwrap().incoming, vec![cb.id.clone()]);
        assert!(store.adjacency("ws", &a.id).await.unwrap().outgoing.is_empty());
    }

    #[tokio::test]
    async fn test_delete_node_removes_incident_edges() {
        let store = setup_test_store().await;
        let a = saved_node(&store, "a", vec![1.0]).await;
        let b = saved_node(&store, "b", vec![1.0]).await;
        let edge = KnowledgeEdge::new("ws", &a.id, &b.id, RelationshipType::RelatesTo, 0.5).unwrap();
        store.insert_edge(&edge).await.unwrap();

        assert!(store.delete_node("ws", &b.id).await.unwrap());
        assert_eq!(store.count_edges("ws").await.unwrap(), 0);
        assert_eq!(store.adjacency("ws", &a.id).await.unwrap().degree(), 0);
        assert!(!store.delete_node("ws", &b.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_nearest_nodes() {
        let store = setup_test_store().await;
        let a = saved_node(&store, "a", vec![1.0, 0.0]).await;
        let b = saved_node(&store, "b", vec![0.7, 0.7]).await;
        let _c = saved_node(&store, "c", vec![0.0, 1.0]).await;
        let mut q = node("ws", "question", vec![0.9, 0.1]);
        q.node_type = NodeType::question();
        store.insert_node(&q).await.unwrap();

        let hits = store.nearest_nodes("ws", &[1.0, 0.0], 2, None).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].node.id, a.id);
        assert!((hits[0].similarity - 1.0).abs() < 1e-6);
        assert_eq!(hits[1].node.id, q.id);

        let filtered = store
            .nearest_nodes("ws", &[1.0, 0.0], 10, Some(&NodeType::insight()))
            .await
            .unwrap();
        assert_eq!(filtered.len(), 3);
        assert_eq!(filtered[1].node.id, b.id);

        // Mismatched dimensions are skipped rather than scored
        assert!(store.nearest_nodes("ws", &[1.0, 0.0, 0.0], 10, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_evolution_ordering_and_expiry() {
        let store = setup_test_store().await;
        let retention = chrono::Duration::days(30);

        for kind in [ChangeKind::NodeAdded, ChangeKind::EdgeAdded, ChangeKind::EdgeDeleted] {
            let entry = KnowledgeEvolution::new("ws", kind, vec!["x".into()], ImpactEstimate::default(), retention)
                .with_new_value(serde_json::json!({"kind": kind}));
            store.append_evolution(&entry).await.unwrap();
        }

        let mut expired = KnowledgeEvolution::new(
            "ws",
            ChangeKind::NodeUpdated,
            vec!["y".into()],
            ImpactEstimate::default(),
            retention,
        );
        expired.timestamp = Utc::now() - chrono::Duration::days(40);
        expired.expires_at = Utc::now() - chrono::Duration::days(10);
        store.append_evolution(&expired).await.unwrap();

        let history = store.evolution_history("ws", 10).await.unwrap();
        let kinds: Vec<ChangeKind> = history.iter().map(|e| e.change_kind).collect();
        assert_eq!(
            kinds,
            vec![ChangeKind::EdgeDeleted, ChangeKind::EdgeAdded, ChangeKind::NodeAdded]
        );
        assert_eq!(history[0].new_value, Some(serde_json::json!({"kind": "EDGE_DELETED"})));
        assert_eq!(store.evolution_history("ws", 1).await.unwrap().len(), 1);

        let recent = store
            .evolution_since("ws", Utc::now() - chrono::Duration::days(1))
            .await
            .unwrap();
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].change_kind, ChangeKind::NodeAdded);

        let stats = store.purge_expired("ws", Utc::now()).await.unwrap();
        assert_eq!(stats.evolution, 1);
        assert_eq!(store.stats("ws").await.unwrap().evolution_entries, 3);
    }

    #[tokio::test]
    async fn test_cluster_cache_replaced_per_algorithm() {
        let store = setup_test_store().await;
        let ttl = chrono::Duration::hours(1);
        let cluster = |algorithm| {
            KnowledgeCluster::new("ws", algorithm, "a".into(), vec!["a".into(), "b".into()], 0.9, vec![], ttl)
        };

        store
            .save_clusters("ws", ClusteringAlgorithm::KMeans, &[cluster(ClusteringAlgorithm::KMeans)])
            .await
            .unwrap();
        store
            .save_clusters(
                "ws",
                ClusteringAlgorithm::Community,
                &[cluster(ClusteringAlgorithm::Community), cluster(ClusteringAlgorithm::Community)],
            )
            .await
            .unwrap();
        let replacement = cluster(ClusteringAlgorithm::KMeans);
        store
            .save_clusters("ws", ClusteringAlgorithm::KMeans, std::slice::from_ref(&replacement))
            .await
            .unwrap();

        let kmeans = store.load_clusters("ws", ClusteringAlgorithm::KMeans).await.unwrap();
        assert_eq!(kmeans, vec![replacement]);
        assert_eq!(
            store.load_clusters("ws", ClusteringAlgorithm::Community).await.unwrap().len(),
            2
        );
    }

    #[tokio::test]
    async fn test_insight_cache() {
        let store = setup_test_store().await;
        let insight = |confidence: f32| {
            KnowledgeInsight::new("ws", InsightType::Gap, "t", "d", vec![], confidence, InsightImpact::default())
                .with_ttl(chrono::Duration::days(7))
        };
        let mut stale = insight(0.99);
        stale.expires_at = Some(Utc::now() - chrono::Duration::seconds(1));

        store
            .save_insights("ws", &[insight(0.3), stale, insight(0.8)])
            .await
            .unwrap();
        let loaded = store.load_insights("ws").await.unwrap();
        let confidences: Vec<f32> = loaded.iter().map(|i| i.confidence).collect();
        assert_eq!(confidences, vec![0.8, 0.3]);

        let purged = store.purge_expired("ws", Utc::now()).await.unwrap();
        assert_eq!(purged.insights, 1);
    }

    #[tokio::test]
    async fn test_corrupt_payload_is_decode_error() {
        let store = setup_test_store().await;
        let n = saved_node(&store, "a", vec![1.0]).await;

        sqlx::query("UPDATE kg_nodes SET metadata = '{\"v\":99,\"data\":{}}' WHERE id = ?")
            .bind(&n.id)
            .execute(store.pool())
            .await
            .unwrap();

        let err = store.get_node("ws", &n.id).await.unwrap_err();
        assert!(matches!(err, Error::Decode { record: "node", .. }));
    }

    #[tokio::test]
    async fn test_stats() {
        let store = setup_test_store().await;
        let a = saved_node(&store, "a", vec![1.0]).await;
        let b = saved_node(&store, "b", vec![1.0]).await;
        for strength in [0.4, 0.8] {
            let edge = KnowledgeEdge::new("ws", &a.id, &b.id, RelationshipType::RelatesTo, strength).unwrap();
            store.insert_edge(&edge).await.unwrap();
        }

        let stats = store.stats("ws").await.unwrap();
        assert_eq!(stats.node_count, 2);
        assert_eq!(stats.edge_count, 2);
        assert_eq!(stats.nodes_by_type.get("INSIGHT"), Some(&2));
        assert_eq!(stats.edges_by_relationship.get("RELATES_TO"), Some(&2));
        assert!((stats.average_strength - 0.6).abs() < 1e-6);

        let empty = store.stats("nobody").await.unwrap();
        assert_eq!(empty, GraphStats::default());
    }
}
