//! Durable SQLite cache tier.

use chrono::{DateTime, Duration, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;

use super::memory::CacheEntry;

/// SQLite-backed cache storage. One record collection keyed by cache key.
pub struct SqliteStorage {
  conn: Mutex<Connection>,
}

impl SqliteStorage {
  /// Open the store at the default location.
  pub fn open() -> Result<Self> {
    let path = Self::default_path()?;
    Self::open_at(&path)
  }

  /// Open the store at an explicit path.
  pub fn open_at(path: &Path) -> Result<Self> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create cache directory: {}", e))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open cache database at {}: {}", path.display(), e))?;

    let storage = Self {
      conn: Mutex::new(conn),
    };
    storage.run_migrations()?;

    Ok(storage)
  }

  /// Get the default database path.
  fn default_path() -> Result<std::path::PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("larder").join("http_cache.db"))
  }

  /// Run database migrations for the cache table.
  fn run_migrations(&self) -> Result<()> {
    let conn = self.lock()?;

    conn
      .execute_batch(CACHE_SCHEMA)
      .map_err(|e| eyre!("Failed to run cache migrations: {}", e))?;

    Ok(())
  }

  pub fn get(&self, key: &str) -> Result<Option<CacheEntry>> {
    let conn = self.lock()?;

    let row: Option<(Vec<u8>, String)> = conn
      .query_row(
        "SELECT data, cached_at FROM response_cache WHERE cache_key = ?",
        params![key],
        |row| Ok((row.get(0)?, row.get(1)?)),
      )
      .optional()
      .map_err(|e| eyre!("Failed to read cache entry: {}", e))?;

    match row {
      Some((data, cached_at_str)) => {
        let data = serde_json::from_slice(&data)
          .map_err(|e| eyre!("Failed to deserialize cache entry: {}", e))?;
        let cached_at = parse_datetime(&cached_at_str)?;
        Ok(Some(CacheEntry { data, cached_at }))
      }
      None => Ok(None),
    }
  }

  pub fn put(&self, key: &str, entry: &CacheEntry) -> Result<()> {
    let conn = self.lock()?;

    let data = serde_json::to_vec(&entry.data)
      .map_err(|e| eyre!("Failed to serialize cache entry: {}", e))?;

    conn
      .execute(
        "INSERT OR REPLACE INTO response_cache (cache_key, data, cached_at)
         VALUES (?, ?, ?)",
        params![key, data, format_datetime(entry.cached_at)],
      )
      .map_err(|e| eyre!("Failed to store cache entry: {}", e))?;

    Ok(())
  }

  pub fn remove(&self, key: &str) -> Result<()> {
    let conn = self.lock()?;

    conn
      .execute(
        "DELETE FROM response_cache WHERE cache_key = ?",
        params![key],
      )
      .map_err(|e| eyre!("Failed to delete cache entry: {}", e))?;

    Ok(())
  }

  pub fn clear(&self) -> Result<()> {
    let conn = self.lock()?;

    conn
      .execute("DELETE FROM response_cache", [])
      .map_err(|e| eyre!("Failed to clear cache: {}", e))?;

    Ok(())
  }

  /// Delete every entry older than `ttl`. Returns the number removed.
  pub fn purge_expired(&self, ttl: Duration) -> Result<usize> {
    let conn = self.lock()?;
    let cutoff = Utc::now() - ttl;

    let removed = conn
      .execute(
        "DELETE FROM response_cache WHERE cached_at < ?",
        params![format_datetime(cutoff)],
      )
      .map_err(|e| eyre!("Failed to purge expired entries: {}", e))?;

    Ok(removed)
  }

  fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
    self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))
  }
}

/// Schema for the cache table.
const CACHE_SCHEMA: &str = r#"
-- Response cache keyed by derived cache key (stores serialized JSON)
CREATE TABLE IF NOT EXISTS response_cache (
    cache_key TEXT PRIMARY KEY,
    data BLOB NOT NULL,
    cached_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_response_cache_cached_at
    ON response_cache(cached_at);
"#;

fn format_datetime(dt: DateTime<Utc>) -> String {
  dt.format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Parse a datetime string from SQLite format.
fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
  // Stored as "YYYY-MM-DD HH:MM:SS"
  chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
    .map(|dt| dt.and_utc())
    .map_err(|e| eyre!("Failed to parse datetime '{}': {}", s, e))
}
