//! Durable response cache for the fetch gate.
//!
//! Cached responses are grouped into named generations (one for prefetched
//! static paths, one for live API responses) so that activating a new build
//! can drop every generation that is no longer on the allow-list. Lookup
//! keys are a hash of method plus URL, stable and fixed-length.

use rusqlite::{params, Connection, OptionalExtension};
use sha2::{Digest, Sha256};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use crate::error::StoreError;

/// Generation holding responses prefetched at install time.
pub const STATIC_GENERATION: &str = "marq-static-v1";

/// Generation holding live API responses cached as they pass through.
pub const DYNAMIC_GENERATION: &str = "marq-dynamic-v1";

/// Generations the current build keeps; everything else is purged on
/// activation.
pub const LIVE_GENERATIONS: &[&str] = &[STATIC_GENERATION, DYNAMIC_GENERATION];

const RESPONSE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS response_cache (
    generation TEXT NOT NULL,
    request_key TEXT NOT NULL,
    url TEXT NOT NULL,
    status INTEGER NOT NULL,
    content_type TEXT,
    body BLOB NOT NULL,
    cached_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (generation, request_key)
);
"#;

/// A previously cached response.
#[derive(Debug, Clone)]
pub struct CachedResponse {
  pub status: u16,
  pub content_type: Option<String>,
  pub body: Vec<u8>,
}

pub struct ResponseCache {
  conn: Mutex<Connection>,
}

impl ResponseCache {
  pub fn open_at(path: &Path) -> Result<Self, StoreError> {
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| StoreError::Unavailable(format!("cannot create cache directory: {e}")))?;
    }

    let conn = Connection::open(path).map_err(|e| {
      StoreError::Unavailable(format!("cannot open response cache at {}: {e}", path.display()))
    })?;
    Self::from_connection(conn)
  }

  pub fn open_in_memory() -> Result<Self, StoreError> {
    let conn = Connection::open_in_memory()
      .map_err(|e| StoreError::Unavailable(format!("cannot open in-memory cache: {e}")))?;
    Self::from_connection(conn)
  }

  fn from_connection(conn: Connection) -> Result<Self, StoreError> {
    conn.execute_batch(RESPONSE_SCHEMA)?;
    Ok(Self {
      conn: Mutex::new(conn),
    })
  }

  fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
    self
      .conn
      .lock()
      .map_err(|e| StoreError::Unavailable(format!("lock poisoned: {e}")))
  }

  pub fn put(
    &self,
    generation: &str,
    method: &str,
    url: &str,
    status: u16,
    content_type: Option<&str>,
    body: &[u8],
  ) -> Result<(), StoreError> {
    let conn = self.lock()?;
    conn.execute(
      "INSERT OR REPLACE INTO response_cache
         (generation, request_key, url, status, content_type, body, cached_at)
       VALUES (?1, ?2, ?3, ?4, ?5, ?6, datetime('now'))",
      params![generation, request_key(method, url), url, status, content_type, body],
    )?;
    Ok(())
  }

  /// Look a request up in one specific generation.
  pub fn get(
    &self,
    generation: &str,
    method: &str,
    url: &str,
  ) -> Result<Option<CachedResponse>, StoreError> {
    let conn = self.lock()?;
    let mut stmt = conn.prepare(
      "SELECT status, content_type, body FROM response_cache
       WHERE generation = ?1 AND request_key = ?2",
    )?;

    Ok(
      stmt
        .query_row(params![generation, request_key(method, url)], row_to_response)
        .optional()?,
    )
  }

  /// Look a request up across every generation, newest entry first.
  pub fn lookup(&self, method: &str, url: &str) -> Result<Option<CachedResponse>, StoreError> {
    let conn = self.lock()?;
    let mut stmt = conn.prepare(
      "SELECT status, content_type, body FROM response_cache
       WHERE request_key = ?1 ORDER BY cached_at DESC LIMIT 1",
    )?;

    Ok(
      stmt
        .query_row(params![request_key(method, url)], row_to_response)
        .optional()?,
    )
  }

  /// Drop every generation not named in `keep`.
  pub fn purge_except(&self, keep: &[&str]) -> Result<usize, StoreError> {
    let conn = self.lock()?;

    // Small fixed allow-list, so a fetch-then-delete pass keeps the SQL dumb.
    let mut stmt = conn.prepare("SELECT DISTINCT generation FROM response_cache")?;
    let stale: Vec<String> = stmt
      .query_map([], |row| row.get::<_, String>(0))?
      .filter_map(|r| r.ok())
      .filter(|generation| !keep.contains(&generation.as_str()))
      .collect();

    let mut purged = 0;
    for generation in stale {
      purged +=
        conn.execute("DELETE FROM response_cache WHERE generation = ?1", params![generation])?;
    }

    Ok(purged)
  }
}

fn row_to_response(row: &rusqlite::Row<'_>) -> rusqlite::Result<CachedResponse> {
  Ok(CachedResponse {
    status: row.get(0)?,
    content_type: row.get(1)?,
    body: row.get(2)?,
  })
}

fn request_key(method: &str, url: &str) -> String {
  let mut hasher = Sha256::new();
  hasher.update(method.as_bytes());
  hasher.update(b" ");
  hasher.update(url.as_bytes());
  hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
  use super::*;
  use pretty_assertions::assert_eq;

  #[test]
  fn test_put_get_round_trip() {
    let cache = ResponseCache::open_in_memory().unwrap();

    cache
      .put(DYNAMIC_GENERATION, "GET", "http://x/api/v1/brands", 200, Some("application/json"), b"[]")
      .unwrap();

    let hit = cache
      .get(DYNAMIC_GENERATION, "GET", "http://x/api/v1/brands")
      .unwrap()
      .unwrap();
    assert_eq!(hit.status, 200);
    assert_eq!(hit.body, b"[]");

    // Method is part of the key.
    assert!(cache
      .get(DYNAMIC_GENERATION, "POST", "http://x/api/v1/brands")
      .unwrap()
      .is_none());
  }

  #[test]
  fn test_lookup_searches_all_generations() {
    let cache = ResponseCache::open_in_memory().unwrap();

    cache
      .put(STATIC_GENERATION, "GET", "http://x/logo.webp", 200, Some("image/webp"), b"img")
      .unwrap();

    assert!(cache.lookup("GET", "http://x/logo.webp").unwrap().is_some());
    assert!(cache.lookup("GET", "http://x/other").unwrap().is_none());
  }

  #[test]
  fn test_purge_except_drops_stale_generations() {
    let cache = ResponseCache::open_in_memory().unwrap();

    cache
      .put("marq-static-v0", "GET", "http://x/old", 200, None, b"old")
      .unwrap();
    cache
      .put(STATIC_GENERATION, "GET", "http://x/new", 200, None, b"new")
      .unwrap();

    let purged = cache.purge_except(LIVE_GENERATIONS).unwrap();

    assert_eq!(purged, 1);
    assert!(cache.lookup("GET", "http://x/old").unwrap().is_none());
    assert!(cache.lookup("GET", "http://x/new").unwrap().is_some());
  }
}
