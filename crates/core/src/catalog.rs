//! Catalog store: one row per absolute file path.

use crate::error::StoreError;
use crate::models::CatalogEntry;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

#[async_trait::async_trait]
pub trait CatalogStore: Send + Sync {
    /// Inserts or replaces the entry for `entry.path`.
    async fn upsert(&self, entry: &CatalogEntry) -> Result<(), StoreError>;
    async fn get(&self, path: &str) -> Result<Option<CatalogEntry>, StoreError>;
    async fn list_by_prefix(&self, path_prefix: &str) -> Result<Vec<CatalogEntry>, StoreError>;
    /// Case-insensitive substring match against filename or tags.
    async fn search(&self, text: &str) -> Result<Vec<CatalogEntry>, StoreError>;
    async fn all_paths(&self) -> Result<Vec<String>, StoreError>;
    async fn remove(&self, path: &str) -> Result<bool, StoreError>;
    async fn count(&self) -> Result<u64, StoreError>;
}

#[derive(Clone)]
pub struct SqliteCatalog {
    pool: SqlitePool,
}

const COLUMNS: &str = "path, filename, folder, tags, duration, size, last_modified";

impl SqliteCatalog {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn entry_from_row(row: &SqliteRow) -> Result<CatalogEntry, StoreError> {
    let tags: String = row.try_get("tags")?;
    let size: i64 = row.try_get("size")?;
    Ok(CatalogEntry {
        path: row.try_get("path")?,
        filename: row.try_get("filename")?,
        folder: row.try_get("folder")?,
        tags: serde_json::from_str(&tags)?,
        duration_seconds: row.try_get("duration")?,
        size_bytes: size.max(0) as u64,
        last_modified: row.try_get("last_modified")?,
    })
}

#[async_trait::async_trait]
impl CatalogStore for SqliteCatalog {
    async fn upsert(&self, entry: &CatalogEntry) -> Result<(), StoreError> {
        let tags = serde_json::to_string(&entry.tags)?;
        sqlx::query(
            r#"
            INSERT INTO files (path, filename, folder, tags, duration, size, last_modified, indexed_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, strftime('%s','now'))
            ON CONFLICT(path) DO UPDATE SET
                filename=excluded.filename,
                folder=excluded.folder,
                tags=excluded.tags,
                duration=excluded.duration,
                size=excluded.size,
                last_modified=excluded.last_modified,
                indexed_at=excluded.indexed_at
            "#,
        )
        .bind(&entry.path)
        .bind(&entry.filename)
        .bind(&entry.folder)
        .bind(tags)
        .bind(entry.duration_seconds)
        .bind(entry.size_bytes as i64)
        .bind(entry.last_modified)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, path: &str) -> Result<Option<CatalogEntry>, StoreError> {
        let row = sqlx::query(&format!("SELECT {COLUMNS} FROM files WHERE path = ?1"))
            .bind(path)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(entry_from_row).transpose()
    }

    async fn list_by_prefix(&self, path_prefix: &str) -> Result<Vec<CatalogEntry>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM files WHERE substr(path, 1, length(?1)) = ?1 ORDER BY path"
        ))
        .bind(path_prefix)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(entry_from_row).collect()
    }

    async fn search(&self, text: &str) -> Result<Vec<CatalogEntry>, StoreError> {
        let needle = text.to_lowercase();
        let rows = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM files \
             WHERE instr(lower(filename), ?1) > 0 \
             OR EXISTS (SELECT 1 FROM json_each(files.tags) WHERE instr(lower(json_each.value), ?1) > 0) \
             ORDER BY path"
        ))
        .bind(needle)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(entry_from_row).collect()
    }

    async fn all_paths(&self) -> Result<Vec<String>, StoreError> {
        let rows = sqlx::query("SELECT path FROM files ORDER BY path")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(|r| r.get::<String, _>(0)).collect())
    }

    async fn remove(&self, path: &str) -> Result<bool, StoreError> {
        let res = sqlx::query("DELETE FROM files WHERE path = ?1")
            .bind(path)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn count(&self) -> Result<u64, StoreError> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM files")
            .fetch_one(&self.pool)
            .await?;
        Ok(n.max(0) as u64)
    }
}
