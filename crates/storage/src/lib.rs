//! Storage layer: SQLite pool setup and the catalog migrations.

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;

/// Opens a pool for `database_url`, which may be a `sqlite:` URL or a plain
/// filesystem path. The database file is created when missing.
pub async fn connect(database_url: &str) -> anyhow::Result<SqlitePool> {
    let url = normalize_url(database_url);
    let in_memory = url.contains("memory");
    if !in_memory {
        if let Some(parent) = url_path(&url).and_then(|p| p.parent().map(|p| p.to_path_buf())) {
            if !parent.as_os_str().is_empty() {
                let _ = std::fs::create_dir_all(parent);
            }
        }
    }
    let options = SqliteConnectOptions::from_str(&url)?.create_if_missing(true);
    let mut opts = SqlitePoolOptions::new();
    if in_memory {
        opts = opts.max_connections(1);
    } else {
        opts = opts.max_connections(5);
    }
    let pool = opts.connect_with(options).await?;
    tracing::debug!("connected to {}", url);
    Ok(pool)
}

pub async fn migrate(pool: &SqlitePool) -> anyhow::Result<()> {
    // Applies migrations from crates/storage/migrations; idempotent.
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

fn normalize_url(database_url: &str) -> String {
    if database_url.starts_with("sqlite:") {
        return database_url.to_string();
    }
    let path = std::path::PathBuf::from(database_url);
    let norm = path.to_string_lossy().replace('\\', "/");
    if path.is_absolute() {
        format!("sqlite:///{}", norm.trim_start_matches('/'))
    } else {
        format!("sqlite://{}", norm)
    }
}

fn url_path(url: &str) -> Option<std::path::PathBuf> {
    let rest = url.strip_prefix("sqlite://")?;
    let rest = rest.split('?').next().unwrap_or(rest);
    Some(std::path::PathBuf::from(rest))
}
