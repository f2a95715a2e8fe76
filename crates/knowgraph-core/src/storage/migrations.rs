//! Database migrations
//!
//! This module manages SQLite schema migrations for the knowledge graph store.
//! Migrations are versioned and applied automatically on database connection.

use sqlx::SqlitePool;

/// Current schema version
pub const CURRENT_VERSION: i32 = 3;

/// SQL for creating the migrations tracking table
const CREATE_MIGRATIONS_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS _migrations (
        version INTEGER PRIMARY KEY NOT NULL,
        applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
    );
"#;

/// Migration 1: Nodes, embeddings, edges and the adjacency index
///
/// Every table is keyed by workspace first so tenants never share rows.
/// Adjacency membership uses a composite primary key, which makes
/// `INSERT OR IGNORE` an idempotent set add.
const MIGRATION_V1: &str = r#"
    CREATE TABLE IF NOT EXISTS kg_nodes (
        workspace_id TEXT NOT NULL,
        id TEXT NOT NULL,
        node_type TEXT NOT NULL,
        content TEXT NOT NULL,
        metadata TEXT NOT NULL,
        created_by TEXT NOT NULL,
        created_at TEXT NOT NULL,
        PRIMARY KEY (workspace_id, id)
    );

    CREATE INDEX IF NOT EXISTS idx_kg_nodes_type ON kg_nodes(workspace_id, node_type);

    CREATE TABLE IF NOT EXISTS kg_node_embeddings (
        workspace_id TEXT NOT NULL,
        node_id TEXT NOT NULL,
        dimension INTEGER NOT NULL CHECK (dimension > 0),
        embedding BLOB NOT NULL,
        PRIMARY KEY (workspace_id, node_id),
        FOREIGN KEY (workspace_id, node_id) REFERENCES kg_nodes(workspace_id, id) ON DELETE CASCADE
    );

    CREATE TABLE IF NOT EXISTS kg_edges (
        workspace_id TEXT NOT NULL,
        id TEXT NOT NULL,
        source_id TEXT NOT NULL,
        target_id TEXT NOT NULL,
        relationship TEXT NOT NULL,
        strength REAL NOT NULL CHECK (strength >= 0.0 AND strength <= 1.0),
        created_at TEXT NOT NULL,
        PRIMARY KEY (workspace_id, id),
        FOREIGN KEY (workspace_id, source_id) REFERENCES kg_nodes(workspace_id, id) ON DELETE CASCADE,
        FOREIGN KEY (workspace_id, target_id) REFERENCES kg_nodes(workspace_id, id) ON DELETE CASCADE
    );

    CREATE INDEX IF NOT EXISTS idx_kg_edges_source ON kg_edges(workspace_id, source_id);
    CREATE INDEX IF NOT EXISTS idx_kg_edges_target ON kg_edges(workspace_id, target_id);
    CREATE INDEX IF NOT EXISTS idx_kg_edges_relationship ON kg_edges(workspace_id, relationship);

    CREATE TABLE IF NOT EXISTS kg_adjacency (
        workspace_id TEXT NOT NULL,
        node_id TEXT NOT NULL,
        direction TEXT NOT NULL CHECK (direction IN ('out', 'in')),
        edge_id TEXT NOT NULL,
        PRIMARY KEY (workspace_id, node_id, direction, edge_id),
        FOREIGN KEY (workspace_id, edge_id) REFERENCES kg_edges(workspace_id, id) ON DELETE CASCADE
    );
"#;

/// Migration 2: Evolution log
const MIGRATION_V2: &str = r#"
    CREATE TABLE IF NOT EXISTS kg_evolution (
        workspace_id TEXT NOT NULL,
        id TEXT NOT NULL,
        timestamp TEXT NOT NULL,
        change_kind TEXT NOT NULL,
        affected_ids TEXT NOT NULL,
        old_value TEXT,
        new_value TEXT,
        impact TEXT NOT NULL,
        expires_at TEXT NOT NULL,
        PRIMARY KEY (workspace_id, id)
    );

    CREATE INDEX IF NOT EXISTS idx_kg_evolution_timestamp ON kg_evolution(workspace_id, timestamp);
    CREATE INDEX IF NOT EXISTS idx_kg_evolution_expires ON kg_evolution(expires_at);
"#;

/// Migration 3: Derived caches for clusters and insights
const MIGRATION_V3: &str = r#"
    CREATE TABLE IF NOT EXISTS kg_clusters (
        workspace_id TEXT NOT NULL,
        id TEXT NOT NULL,
        algorithm TEXT NOT NULL,
        payload TEXT NOT NULL,
        created_at TEXT NOT NULL,
        expires_at TEXT NOT NULL,
        PRIMARY KEY (workspace_id, id)
    );

    CREATE INDEX IF NOT EXISTS idx_kg_clusters_algorithm ON kg_clusters(workspace_id, algorithm);

    CREATE TABLE IF NOT EXISTS kg_insights (
        workspace_id TEXT NOT NULL,
        id TEXT NOT NULL,
        insight_type TEXT NOT NULL,
        confidence REAL NOT NULL,
        payload TEXT NOT NULL,
        generated_at TEXT NOT NULL,
        expires_at TEXT,
        PRIMARY KEY (workspace_id, id)
    );

    CREATE INDEX IF NOT EXISTS idx_kg_insights_confidence ON kg_insights(workspace_id, confidence);
"#;

/// Get the current schema version from the database
async fn get_current_version(pool: &SqlitePool) -> anyhow::Result<i32> {
    sqlx::raw_sql(CREATE_MIGRATIONS_TABLE).execute(pool).await?;

    let row: (Option<i32>,) = sqlx::query_as("SELECT MAX(version) FROM _migrations")
        .fetch_one(pool)
        .await?;

    Ok(row.0.unwrap_or(0))
}

/// Record that a migration was applied
async fn record_migration(pool: &SqlitePool, version: i32) -> anyhow::Result<()> {
    sqlx::query("INSERT INTO _migrations (version) VALUES (?)")
        .bind(version)
        .execute(pool)
        .await?;
    Ok(())
}

/// Run all pending migrations
pub async fn run_migrations(pool: &SqlitePool) -> anyhow::Result<()> {
    let current_version = get_current_version(pool).await?;

    tracing::info!(
        current_version = current_version,
        target_version = CURRENT_VERSION,
        "Checking database migrations"
    );

    if current_version >= CURRENT_VERSION {
        tracing::debug!("Database is up to date");
        return Ok(());
    }

    if current_version < 1 {
        tracing::info!("Applying migration v1: Graph nodes, edges and adjacency");
        sqlx::raw_sql(MIGRATION_V1).execute(pool).await?;
        record_migration(pool, 1).await?;
    }

    if current_version < 2 {
        tracing::info!("Applying migration v2: Evolution log");
        sqlx::raw_sql(MIGRATION_V2).execute(pool).await?;
        record_migration(pool, 2).await?;
    }

    if current_version < 3 {
        tracing::info!("Applying migration v3: Cluster and insight caches");
        sqlx::raw_sql(MIGRATION_V3).execute(pool).await?;
        record_migration(pool, 3).await?;
    }

    tracing::info!("Database migrations completed");
    Ok(())
}

/// Check if the database needs migrations
pub async fn needs_migration(pool: &SqlitePool) -> anyhow::Result<bool> {
    let current_version = get_current_version(pool).await?;
    Ok(current_version < CURRENT_VERSION)
}

/// Get migration status information
pub async fn migration_status(pool: &SqlitePool) -> anyhow::Result<MigrationStatus> {
    let current_version = get_current_version(pool).await?;
    Ok(MigrationStatus {
        current_version,
        target_version: CURRENT_VERSION,
        needs_migration: current_version < CURRENT_VERSION,
    })
}

/// Migration status information
#[derive(Debug, Clone)]
pub struct MigrationStatus {
    /// Current schema version in the database
    pub current_version: i32,
    /// Target schema version (latest)
    pub target_version: i32,
    /// Whether migrations need to be run
    pub needs_migration: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn create_test_pool() -> SqlitePool {
        SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("Failed to create test pool")
    }

    #[tokio::test]
    async fn test_run_migrations() {
        let pool = create_test_pool().await;

        let status = migration_status(&pool).await.unwrap();
        assert_eq!(status.current_version, 0);
        assert!(status.needs_migration);

        run_migrations(&pool).await.unwrap();

        let status = migration_status(&pool).await.unwrap();
        assert_eq!(status.current_version, CURRENT_VERSION);
        assert!(!status.needs_migration);
        assert!(!needs_migration(&pool).await.unwrap());
    }

    #[tokio::test]
    async fn test_migrations_idempotent() {
        let pool = create_test_pool().await;

        run_migrations(&pool).await.unwrap();
        run_migrations(&pool).await.unwrap();

        let status = migration_status(&pool).await.unwrap();
        assert_eq!(status.current_version, CURRENT_VERSION);
    }

    #[tokio::test]
    async fn test_tables_created() {
        let pool = create_test_pool().await;
        run_migrations(&pool).await.unwrap();

        let tables = vec![
            "kg_nodes",
            "kg_node_embeddings",
            "kg_edges",
            "kg_adjacency",
            "kg_evolution",
            "kg_clusters",
            "kg_insights",
        ];

        for table in tables {
            let result: (i32,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM {}", table))
                .fetch_one(&pool)
                .await
                .unwrap_or_else(|_| panic!("Table {} should exist", table));
            assert_eq!(result.0, 0, "Table {} should be empty", table);
        }
    }

    #[tokio::test]
    async fn test_strength_check_constraint() {
        let pool = create_test_pool().await;
        run_migrations(&pool).await.unwrap();

        sqlx::query("PRAGMA foreign_keys = OFF")
            .execute(&pool)
            .await
            .unwrap();

        let result = sqlx::query(
            "INSERT INTO kg_edges (workspace_id, id, source_id, target_id, relationship, strength, created_at)
             VALUES ('ws', 'e1', 'a', 'b', 'RELATES_TO', 1.5, '2026-01-01T00:00:00.000000Z')",
        )
        .execute(&pool)
        .await;

        assert!(result.is_err(), "strength above 1.0 must be rejected");
    }
}
