//! SQLite-backed grid store with an r2d2 connection pool and WAL mode.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gridcast_core::Voxel;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Connection, params};

use crate::errors::StoreError;
use crate::validate::check_world_bounds;
use crate::GridStore;

/// Alias for the connection pool type.
pub type ConnectionPool = Pool<SqliteConnectionManager>;

/// Default half-width of the square world.
pub const DEFAULT_WORLD_BOUND: i64 = 10_000;

/// SQLite pragma customizer that runs on each new connection.
#[derive(Debug)]
struct PragmaCustomizer;

impl r2d2::CustomizeConnection<Connection, rusqlite::Error> for PragmaCustomizer {
    fn on_acquire(&self, conn: &mut Connection) -> Result<(), rusqlite::Error> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;\
             PRAGMA busy_timeout = 5000;\
             PRAGMA synchronous = NORMAL;",
        )
    }
}

/// Create a file-backed connection pool.
pub fn new_file(path: &str, pool_size: u32) -> Result<ConnectionPool, StoreError> {
    let manager = SqliteConnectionManager::file(path);
    let pool = Pool::builder()
        .max_size(pool_size)
        .connection_timeout(std::time::Duration::from_secs(5))
        .connection_customizer(Box::new(PragmaCustomizer))
        .build(manager)?;
    Ok(pool)
}

/// Create an in-memory connection pool (for testing).
///
/// Pool size is pinned to 1: each in-memory connection gets its own
/// database, so handing out more than one would split the data.
pub fn new_in_memory() -> Result<ConnectionPool, StoreError> {
    let manager = SqliteConnectionManager::memory();
    let pool = Pool::builder()
        .max_size(1)
        .connection_customizer(Box::new(PragmaCustomizer))
        .build(manager)?;
    Ok(pool)
}

/// Create the voxel table if it does not exist.
pub fn run_migrations(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS voxels (
            x INTEGER NOT NULL,
            y INTEGER NOT NULL,
            owner TEXT NOT NULL,
            name TEXT,
            updated TEXT NOT NULL,
            PRIMARY KEY (x, y)
        );",
    )?;
    Ok(())
}

/// Grid store backed by SQLite.
pub struct SqliteGridStore {
    pool: ConnectionPool,
    world_bound: i64,
}

impl SqliteGridStore {
    /// Wrap a pool with the default world bounds.
    pub fn new(pool: ConnectionPool) -> Self {
        Self {
            pool,
            world_bound: DEFAULT_WORLD_BOUND,
        }
    }

    /// Override the world bounds.
    #[must_use]
    pub fn with_world_bound(mut self, bound: i64) -> Self {
        self.world_bound = bound;
        self
    }
}

fn row_to_voxel(row: &rusqlite::Row<'_>) -> rusqlite::Result<Voxel> {
    let updated_raw: String = row.get(4)?;
    let updated = DateTime::parse_from_rfc3339(&updated_raw)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
        })?;
    Ok(Voxel {
        x: row.get(0)?,
        y: row.get(1)?,
        owner: row.get(2)?,
        name: row.get(3)?,
        updated: Some(updated),
    })
}

#[async_trait]
impl GridStore for SqliteGridStore {
    async fn query_cells(&self, x: i64, y: i64, range: i64) -> Result<Vec<Voxel>, StoreError> {
        // Saturating: `range` is client-controlled and may sit at the i64
        // extremes.
        let (x_lo, x_hi) = (x.saturating_sub(range), x.saturating_add(range));
        let (y_lo, y_hi) = (y.saturating_sub(range), y.saturating_add(range));
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || -> Result<Vec<Voxel>, StoreError> {
            let conn = pool.get()?;
            let mut stmt = conn.prepare_cached(
                "SELECT x, y, owner, name, updated FROM voxels
                 WHERE x > ?1 AND x < ?2 AND y > ?3 AND y < ?4
                 ORDER BY x, y",
            )?;
            let rows = stmt.query_map(params![x_lo, x_hi, y_lo, y_hi], row_to_voxel)?;
            let mut cells = Vec::new();
            for row in rows {
                cells.push(row?);
            }
            Ok(cells)
        })
        .await?
    }

    async fn upsert_cell(&self, voxel: Voxel) -> Result<Voxel, StoreError> {
        check_world_bounds(voxel.x, voxel.y, self.world_bound)?;

        let pool = self.pool.clone();
        let stored = Voxel {
            updated: Some(Utc::now()),
            ..voxel
        };
        let record = stored.clone();
        tokio::task::spawn_blocking(move || -> Result<(), StoreError> {
            let conn = pool.get()?;
            let updated = record
                .updated
                .unwrap_or_else(Utc::now)
                .to_rfc3339_opts(chrono::SecondsFormat::Millis, true);
            let _ = conn.execute(
                "INSERT INTO voxels (x, y, owner, name, updated)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT (x, y) DO UPDATE SET
                     owner = excluded.owner,
                     name = excluded.name,
                     updated = excluded.updated",
                params![record.x, record.y, record.owner, record.name, updated],
            )?;
            Ok(())
        })
        .await??;
        Ok(stored)
    }
}
