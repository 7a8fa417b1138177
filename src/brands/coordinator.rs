//! Read/write routing between the remote registry and the local store.
//!
//! Every operation tries the backend while it is believed reachable and
//! falls back to the persistent store otherwise. Remote failures flip the
//! shared reachability flag and are absorbed into a local result; they never
//! escape as unhandled errors. Callers learn whether a result came from the
//! backend or was produced offline through the outcome's source tag.

use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};

use crate::brands::client::RegistryClient;
use crate::brands::types::{Brand, BrandDraft, BrandPatch};
use crate::error::{StoreError, SyncError, SyncResult};
use crate::liveness::{BackendStatus, LivenessMonitor};
use crate::store::BrandStore;

/// Where an operation's result came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataSource {
  /// The backend handled the operation.
  Remote,
  /// The backend was unreachable; the local store handled it and the result
  /// is pending synchronization.
  Offline,
}

/// Operation result plus the side channel telling callers which path served
/// it, so offline writes can be messaged as "saved locally".
#[derive(Debug, Clone)]
pub struct SyncOutcome<T> {
  pub data: T,
  pub source: DataSource,
}

impl<T> SyncOutcome<T> {
  fn remote(data: T) -> Self {
    Self {
      data,
      source: DataSource::Remote,
    }
  }

  fn offline(data: T) -> Self {
    Self {
      data,
      source: DataSource::Offline,
    }
  }

  pub fn is_offline(&self) -> bool {
    self.source == DataSource::Offline
  }
}

pub struct SyncCoordinator {
  remote: RegistryClient,
  store: BrandStore,
  monitor: LivenessMonitor,
  status: Arc<BackendStatus>,
  working: Vec<Brand>,
  last_error: Option<String>,
}

impl SyncCoordinator {
  pub fn new(remote: RegistryClient, store: BrandStore, monitor: LivenessMonitor) -> Self {
    let status = monitor.status_handle();
    Self {
      remote,
      store,
      monitor,
      status,
      working: Vec::new(),
      last_error: None,
    }
  }

  /// The in-memory view assembled by the last read, deduplicated by id.
  pub fn records(&self) -> &[Brand] {
    &self.working
  }

  /// Message from the last operation whose local fallback also failed.
  pub fn last_error(&self) -> Option<&str> {
    self.last_error.as_deref()
  }

  /// Fetch the listing: from the backend while reachable, mirrored into the
  /// store on success; from the store otherwise.
  pub async fn list(&mut self) -> SyncResult<SyncOutcome<Vec<Brand>>> {
    if self.status.backend_reachable() {
      match self.remote.fetch_all().await {
        Ok(records) => {
          let records = dedup_by_id(records);
          if let Err(e) = self.store.sync_many(&records) {
            warn!(error = %e, "failed to mirror server listing into the local store");
          }
          self.working = records.clone();
          self.last_error = None;
          self.status.set_backend_reachable(true);
          return Ok(SyncOutcome::remote(records));
        }
        Err(e) => {
          warn!(error = %e, "listing from backend failed, falling back to local store");
          self.status.set_backend_reachable(false);
        }
      }
    }

    match self.store.get_all() {
      Ok(records) => {
        info!(count = records.len(), "serving locally stored records");
        self.working = records.clone();
        Ok(SyncOutcome::offline(records))
      }
      Err(e) => {
        self.last_error = Some(e.to_string());
        Err(e.into())
      }
    }
  }

  /// Register a brand remotely, or synthesize it locally (generated id,
  /// Pending status) when the backend cannot take it.
  pub async fn add(&mut self, draft: BrandDraft) -> SyncResult<SyncOutcome<Brand>> {
    if self.status.backend_reachable() {
      match self.remote.create(&draft).await {
        Ok(record) => {
          if let Err(e) = self.store.sync_many(std::slice::from_ref(&record)) {
            warn!(error = %e, id = %record.id, "failed to mirror created record");
          }
          self.upsert_working(record.clone());
          return Ok(SyncOutcome::remote(record));
        }
        Err(e) => {
          warn!(error = %e, "create failed on backend, saving locally");
          self.status.set_backend_reachable(false);
        }
      }
    }

    match self.store.add(&draft, None) {
      Ok(record) => {
        info!(id = %record.id, "brand saved locally, pending sync");
        self.upsert_working(record.clone());
        Ok(SyncOutcome::offline(record))
      }
      Err(e) => {
        self.last_error = Some(e.to_string());
        Err(e.into())
      }
    }
  }

  /// Apply a partial update remotely or against the local store.
  pub async fn update(&mut self, id: &str, patch: BrandPatch) -> SyncResult<SyncOutcome<Brand>> {
    if self.status.backend_reachable() {
      match self.remote.update(id, &patch).await {
        Ok(record) => {
          if let Err(e) = self.store.sync_many(std::slice::from_ref(&record)) {
            warn!(error = %e, id = %record.id, "failed to mirror updated record");
          }
          self.upsert_working(record.clone());
          return Ok(SyncOutcome::remote(record));
        }
        Err(e) => {
          warn!(error = %e, id, "update failed on backend, applying locally");
          self.status.set_backend_reachable(false);
        }
      }
    }

    match self.store.put(id, &patch) {
      Ok(record) => {
        info!(id = %record.id, "brand updated locally, pending sync");
        self.upsert_working(record.clone());
        Ok(SyncOutcome::offline(record))
      }
      Err(StoreError::NotFound(id)) => {
        self.last_error = Some(format!("record {id} not found in local store"));
        Err(SyncError::NotFoundLocal(id))
      }
      Err(e) => {
        self.last_error = Some(e.to_string());
        Err(e.into())
      }
    }
  }

  /// Delete wherever the record currently lives. A remote delete also clears
  /// the local copy so stale data cannot resurrect from the store.
  pub async fn delete(&mut self, id: &str) -> SyncResult<SyncOutcome<()>> {
    if self.status.backend_reachable() {
      match self.remote.remove(id).await {
        Ok(()) => {
          self.store.delete(id)?;
          self.working.retain(|b| b.id != id);
          return Ok(SyncOutcome::remote(()));
        }
        Err(e) => {
          warn!(error = %e, id, "delete failed on backend, removing locally");
          self.status.set_backend_reachable(false);
        }
      }
    }

    match self.store.delete(id) {
      Ok(()) => {
        info!(id, "brand deleted locally, pending sync");
        self.working.retain(|b| b.id != id);
        Ok(SyncOutcome::offline(()))
      }
      Err(e) => {
        self.last_error = Some(e.to_string());
        Err(e.into())
      }
    }
  }

  /// Re-probe the backend, then fetch like `list`.
  pub async fn refresh(&mut self) -> SyncResult<SyncOutcome<Vec<Brand>>> {
    self.monitor.check_backend().await;
    self.list().await
  }

  /// Reconcile once the backend is back, by re-pulling the authoritative
  /// listing. Pull-only: records created or mutated offline are NOT replayed
  /// to the backend; they stay in the local store until the server learns of
  /// them by other means. Returns `None` while the backend is unreachable.
  pub async fn sync_offline_data(&mut self) -> SyncResult<Option<SyncOutcome<Vec<Brand>>>> {
    if !self.status.backend_reachable() {
      return Ok(None);
    }
    info!("reconciling with backend listing");
    self.list().await.map(Some)
  }

  fn upsert_working(&mut self, record: Brand) {
    match self.working.iter_mut().find(|b| b.id == record.id) {
      Some(existing) => *existing = record,
      None => self.working.push(record),
    }
  }
}

/// Keep the first occurrence of every id.
fn dedup_by_id(mut records: Vec<Brand>) -> Vec<Brand> {
  let mut seen = HashSet::new();
  records.retain(|b| seen.insert(b.id.clone()));
  records
}
