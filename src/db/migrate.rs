//! Versioned SQL migrations for the graph store.
//!
//! Files in the migrations directory are named `<version>_<name>.sql` and are
//! applied in version order, each in its own transaction.

use rusqlite::{params, Connection};
use std::fs;
use std::path::Path;
use crate::error::{Result, ShopgraphError};

struct Migration {
    version: u32,
    name: String,
    sql: String,
}

impl Migration {
    /// Read one migration file. Returns `None` for anything that is not `.sql`.
    fn from_path(path: &Path) -> Result<Option<Self>> {
        if path.extension().and_then(|s| s.to_str()) != Some("sql") {
            return Ok(None);
        }
        let name = path
            .file_stem()
            .and_then(|n| n.to_str())
            .ok_or_else(|| ShopgraphError::Config(format!("Invalid migration filename: {}", path.display())))?
            .to_string();

        let version = name
            .split_once('_')
            .and_then(|(v, _)| v.parse::<u32>().ok())
            .ok_or_else(|| ShopgraphError::Config(format!("Migration {} lacks a numeric version prefix", name)))?;

        let sql = fs::read_to_string(path)?;
        Ok(Some(Self { version, name, sql }))
    }
}

fn ensure_migrations_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
        )",
    )?;
    Ok(())
}

fn load_migrations(migrations_dir: &Path) -> Result<Vec<Migration>> {
    let mut migrations = Vec::new();
    for entry in fs::read_dir(migrations_dir)? {
        if let Some(migration) = Migration::from_path(&entry?.path())? {
            migrations.push(migration);
        }
    }
    migrations.sort_by_key(|m| m.version);

    if let Some(pair) = migrations.windows(2).find(|w| w[0].version == w[1].version) {
        return Err(ShopgraphError::Config(format!(
            "Migrations {} and {} share version {}",
            pair[0].name, pair[1].name, pair[0].version
        )));
    }
    Ok(migrations)
}

/// Names of applied migrations in version order. Empty for a fresh store.
pub fn get_applied_migrations(conn: &Connection) -> Result<Vec<String>> {
    let exists: bool = conn
        .prepare("SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_migrations'")?
        .exists([])?;
    if !exists {
        return Ok(Vec::new());
    }

    let mut stmt = conn.prepare("SELECT name FROM schema_migrations ORDER BY version")?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;
    Ok(names)
}

/// Names of migrations in `migrations_dir` not yet applied.
pub fn pending_migrations(conn: &Connection, migrations_dir: &Path) -> Result<Vec<String>> {
    let applied = get_applied_migrations(conn)?;
    Ok(load_migrations(migrations_dir)?
        .into_iter()
        .map(|m| m.name)
        .filter(|name| !applied.contains(name))
        .collect())
}

/// Apply pending migrations and return how many ran.
pub fn run_migrations(conn: &mut Connection, migrations_dir: &Path) -> Result<usize> {
    ensure_migrations_table(conn)?;
    let applied = get_applied_migrations(conn)?;

    let mut count = 0;
    for migration in load_migrations(migrations_dir)? {
        if applied.contains(&migration.name) {
            log::debug!("Migration {} already applied", migration.name);
            continue;
        }

        log::info!("Applying migration {} (version {})", migration.name, migration.version);
        let tx = conn.transaction()?;
        tx.execute_batch(&migration.sql).map_err(|e| {
            ShopgraphError::Graph(format!("Migration {} failed: {}", migration.name, e))
        })?;
        tx.execute(
            "INSERT INTO schema_migrations (version, name) VALUES (?1, ?2)",
            params![migration.version, migration.name],
        )?;
        tx.commit()?;
        count += 1;
    }

    log::info!("{} migrations applied", count);
    Ok(count)
}
