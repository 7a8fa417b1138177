//! Durable, offline-capable storage for brand records.
//!
//! One SQLite collection keyed by record id, with non-unique secondary
//! indexes over the searchable fields. Each call opens its own implicit
//! transaction; no multi-call atomicity is provided or required. The store
//! may be opened independently from several execution contexts (the sync
//! coordinator and the fetch gate both do), which is why writes tolerate a
//! busy neighbor instead of assuming exclusive access.

mod schema;

use chrono::{Duration, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{info, warn};
use uuid::Uuid;

use crate::brands::types::{Brand, BrandDraft, BrandPatch, BrandStatus};
use crate::error::StoreError;

const SELECT_FIELDS: &str = "id, name, owner, lang, status, created_at, updated_at";

/// SQLite-backed brand store.
#[derive(Clone, Debug)]
pub struct BrandStore {
  conn: Arc<Mutex<Connection>>,
}

impl BrandStore {
  /// Open or create the store at the default platform location.
  #[allow(dead_code)]
  pub fn open() -> Result<Self, StoreError> {
    Self::open_at(&Self::default_path()?)
  }

  /// Open or create the store at the given path, migrating the schema when
  /// the stored version is behind.
  pub fn open_at(path: &Path) -> Result<Self, StoreError> {
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| StoreError::Unavailable(format!("cannot create store directory: {e}")))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| StoreError::Unavailable(format!("cannot open store at {}: {e}", path.display())))?;

    // Another context may hold the file; wait instead of failing outright.
    conn.busy_timeout(std::time::Duration::from_secs(5))?;

    Self::from_connection(conn)
  }

  /// In-memory store, used by tests and ephemeral embedders.
  pub fn open_in_memory() -> Result<Self, StoreError> {
    let conn = Connection::open_in_memory()
      .map_err(|e| StoreError::Unavailable(format!("cannot open in-memory store: {e}")))?;
    Self::from_connection(conn)
  }

  fn from_connection(conn: Connection) -> Result<Self, StoreError> {
    migrate(&conn)?;
    Ok(Self {
      conn: Arc::new(Mutex::new(conn)),
    })
  }

  fn default_path() -> Result<PathBuf, StoreError> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| StoreError::Unavailable("could not determine data directory".to_string()))?;

    Ok(data_dir.join("marq").join("brands.db"))
  }

  fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
    self
      .conn
      .lock()
      .map_err(|e| StoreError::Unavailable(format!("lock poisoned: {e}")))
  }

  /// Insert a new record. A missing id is generated; timestamps are stamped
  /// here and the status starts as Pending, which is how offline-synthesized
  /// records come to exist.
  pub fn add(&self, draft: &BrandDraft, id: Option<&str>) -> Result<Brand, StoreError> {
    let conn = self.lock()?;

    let now = Utc::now();
    let record = Brand {
      id: id.map(str::to_owned).unwrap_or_else(|| Uuid::new_v4().to_string()),
      name: draft.name.clone(),
      owner: draft.owner.clone(),
      lang: draft.lang.clone(),
      status: BrandStatus::Pending,
      created_at: now,
      updated_at: now,
    };

    let inserted = conn.execute(
      "INSERT INTO brands (id, name, owner, lang, status, created_at, updated_at)
       VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
      params![
        record.id,
        record.name,
        record.owner,
        record.lang,
        record.status.as_str(),
        record.created_at,
        record.updated_at
      ],
    );

    match inserted {
      Ok(_) => Ok(record),
      Err(rusqlite::Error::SqliteFailure(e, _))
        if e.code == rusqlite::ErrorCode::ConstraintViolation =>
      {
        Err(StoreError::DuplicateKey(record.id))
      }
      Err(e) => Err(e.into()),
    }
  }

  pub fn get(&self, id: &str) -> Result<Option<Brand>, StoreError> {
    let conn = self.lock()?;
    let mut stmt =
      conn.prepare(&format!("SELECT {SELECT_FIELDS} FROM brands WHERE id = ?1"))?;

    Ok(stmt.query_row(params![id], row_to_brand).optional()?)
  }

  /// Unordered snapshot of every record. Rows that no longer parse are
  /// skipped rather than failing the whole read.
  pub fn get_all(&self) -> Result<Vec<Brand>, StoreError> {
    let conn = self.lock()?;
    let mut stmt = conn.prepare(&format!("SELECT {SELECT_FIELDS} FROM brands"))?;

    let records = stmt
      .query_map([], row_to_brand)?
      .filter_map(|row| match row {
        Ok(record) => Some(record),
        Err(e) => {
          warn!(error = %e, "skipping unreadable brand row");
          None
        }
      })
      .collect();

    Ok(records)
  }

  /// Merge present fields into an existing record and refresh `updated_at`.
  pub fn put(&self, id: &str, patch: &BrandPatch) -> Result<Brand, StoreError> {
    let conn = self.lock()?;

    let mut stmt =
      conn.prepare(&format!("SELECT {SELECT_FIELDS} FROM brands WHERE id = ?1"))?;
    let existing = stmt.query_row(params![id], row_to_brand).optional()?;
    let Some(mut record) = existing else {
      return Err(StoreError::NotFound(id.to_string()));
    };

    if let Some(name) = &patch.name {
      record.name = name.clone();
    }
    if let Some(owner) = &patch.owner {
      record.owner = owner.clone();
    }
    if let Some(lang) = &patch.lang {
      record.lang = lang.clone();
    }
    if let Some(status) = patch.status {
      record.status = status;
    }

    // Keep updated_at strictly increasing even within one clock tick.
    let mut now = Utc::now();
    if now <= record.updated_at {
      now = record.updated_at + Duration::milliseconds(1);
    }
    record.updated_at = now;

    conn.execute(
      "UPDATE brands SET name = ?2, owner = ?3, lang = ?4, status = ?5, updated_at = ?6
       WHERE id = ?1",
      params![
        record.id,
        record.name,
        record.owner,
        record.lang,
        record.status.as_str(),
        record.updated_at
      ],
    )?;

    Ok(record)
  }

  /// Idempotent delete; removing an absent id is not an error.
  pub fn delete(&self, id: &str) -> Result<(), StoreError> {
    let conn = self.lock()?;
    conn.execute("DELETE FROM brands WHERE id = ?1", params![id])?;
    Ok(())
  }

  /// Wipe the collection. Only schema migration and explicit reset use this.
  pub fn clear(&self) -> Result<(), StoreError> {
    let conn = self.lock()?;
    conn.execute("DELETE FROM brands", [])?;
    Ok(())
  }

  /// Upsert a batch of records, one row at a time. Records absent from the
  /// input are never touched, so reconciling a server listing cannot drop
  /// local-only entries. A failure partway leaves a partial merge that is
  /// safe to re-run.
  pub fn sync_many(&self, records: &[Brand]) -> Result<(), StoreError> {
    let conn = self.lock()?;

    for record in records {
      conn.execute(
        "INSERT OR REPLACE INTO brands (id, name, owner, lang, status, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
          record.id,
          record.name,
          record.owner,
          record.lang,
          record.status.as_str(),
          record.created_at,
          record.updated_at
        ],
      )?;
    }

    Ok(())
  }
}

fn row_to_brand(row: &rusqlite::Row<'_>) -> rusqlite::Result<Brand> {
  let status: String = row.get(4)?;
  let status = status.parse::<BrandStatus>().map_err(|e| {
    rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
  })?;

  Ok(Brand {
    id: row.get(0)?,
    name: row.get(1)?,
    owner: row.get(2)?,
    lang: row.get(3)?,
    status,
    created_at: row.get(5)?,
    updated_at: row.get(6)?,
  })
}

/// Walk the declared version transitions up to the current schema version.
fn migrate(conn: &Connection) -> Result<(), StoreError> {
  let stored: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;

  if stored > schema::SCHEMA_VERSION {
    return Err(StoreError::Unavailable(format!(
      "store schema version {stored} is newer than this build supports ({})",
      schema::SCHEMA_VERSION
    )));
  }

  if stored == 0 {
    conn.execute_batch(schema::CREATE_SCHEMA)?;
  } else if stored < schema::SCHEMA_VERSION {
    for (target, transition) in schema::TRANSITIONS {
      if *target <= stored {
        continue;
      }
      match transition {
        schema::Transition::Recreate => {
          info!(from = stored, to = target, "breaking schema change, recreating brand collection");
          conn.execute_batch("DROP TABLE IF EXISTS brands")?;
          conn.execute_batch(schema::CREATE_SCHEMA)?;
        }
        schema::Transition::Additive(ddl) => {
          info!(from = stored, to = target, "additive schema change");
          conn.execute_batch(ddl)?;
        }
      }
    }
  }

  conn.pragma_update(None, "user_version", schema::SCHEMA_VERSION)?;
  Ok(())
}
