use rusqlite::Connection;
use std::path::Path;
use tokio::task;
use crate::error::{Result, ShopgraphError};

pub mod migrate;

/// Tables the external loader populates and every query reads.
pub const GRAPH_TABLES: [&str; 3] = ["nodes", "node_labels", "relations"];

/// Database connection wrapper
#[derive(Debug, Clone)]
pub struct Db {
    path: std::path::PathBuf,
}

impl Db {
    /// Create a new database connection manager
    pub fn new<P: AsRef<Path>>(db_path: P) -> Self {
        Self {
            path: db_path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Execute a closure with a database connection in a blocking task
    pub async fn with_connection<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let path = self.path.clone();
        task::spawn_blocking(move || {
            let mut conn = Connection::open(&path)
                .map_err(ShopgraphError::Database)?;

            // WAL lets the loader write while queries read; foreign keys keep
            // relation endpoints valid.
            conn.execute_batch(
                "PRAGMA journal_mode = WAL; \
                 PRAGMA synchronous = NORMAL; \
                 PRAGMA foreign_keys = ON; \
                 PRAGMA temp_store = MEMORY; \
                 PRAGMA cache_size = -65536;"
            )?;

            f(&mut conn)
        })
        .await
        .map_err(|e| ShopgraphError::Graph(format!("Blocking store task failed: {}", e)))?
    }

    /// Confirm the store is reachable and carries the graph schema.
    ///
    /// A usable store is a precondition of every query, so callers treat an
    /// error here as fatal.
    pub async fn verify_graph_schema(&self) -> Result<()> {
        self.with_connection(|conn| {
            let one: i64 = conn.query_row("SELECT 1", [], |row| row.get(0))?;
            if one != 1 {
                return Err(ShopgraphError::Graph("Store connectivity probe failed".to_string()));
            }

            let mut stmt = conn.prepare(
                "SELECT name FROM sqlite_master WHERE type='table' ORDER BY name",
            )?;
            let tables: Vec<String> = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;

            for table in GRAPH_TABLES {
                if !tables.iter().any(|t| t == table) {
                    return Err(ShopgraphError::Graph(format!(
                        "Missing table: {} (run `shopgraph migrate` and load the graph first)",
                        table
                    )));
                }
                log::debug!("✓ Table exists: {}", table);
            }
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_db_connection() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");
        let db = Db::new(&db_path);

        let result = db.with_connection(|conn| {
            conn.execute("CREATE TABLE test (id INTEGER PRIMARY KEY)", [])
                .map_err(ShopgraphError::Database)?;
            Ok(())
        }).await;

        assert!(result.is_ok());
        assert!(db_path.exists());
    }

    #[tokio::test]
    async fn test_pragmas_set() {
        let temp_dir = TempDir::new().unwrap();
        let db = Db::new(temp_dir.path().join("test.db"));

        db.with_connection(|conn| {
            let journal_mode: String = conn.query_row("PRAGMA journal_mode", [], |row| row.get(0))?;
            assert_eq!(journal_mode.to_uppercase(), "WAL");

            let foreign_keys: i32 = conn.query_row("PRAGMA foreign_keys", [], |row| row.get(0))?;
            assert_eq!(foreign_keys, 1);

            Ok::<(), ShopgraphError>(())
        }).await.unwrap();
    }

    #[tokio::test]
    async fn test_verify_schema_missing_tables() {
        let temp_dir = TempDir::new().unwrap();
        let db = Db::new(temp_dir.path().join("empty.db"));
        let err = db.verify_graph_schema().await.unwrap_err();
        assert!(err.to_string().contains("Missing table"));
    }

    #[tokio::test]
    async fn test_verify_schema_after_migrations() {
        let temp_dir = TempDir::new().unwrap();
        let db = Db::new(temp_dir.path().join("graph.db"));
        let migrations_dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations");
        db.with_connection(move |conn| migrate::run_migrations(conn, &migrations_dir))
            .await
            .unwrap();
        assert!(db.verify_graph_schema().await.is_ok());
    }

    #[tokio::test]
    async fn test_unopenable_path_is_error() {
        let temp_dir = TempDir::new().unwrap();
        let db = Db::new(temp_dir.path().join("no_such_dir").join("graph.db"));
        assert!(db.verify_graph_schema().await.is_err());
    }
}
