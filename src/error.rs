//! Error taxonomy for the offline synchronization core.

use thiserror::Error;

/// Errors raised by the persistent brand store.
#[derive(Debug, Error)]
pub enum StoreError {
  /// The durable store cannot be opened or used at all. Fatal to offline
  /// capability; callers should degrade to online-only mode.
  #[error("persistent store unavailable: {0}")]
  Unavailable(String),

  /// An insert collided with an existing record id.
  #[error("record {0} already exists")]
  DuplicateKey(String),

  /// A mutation targeted a record that is not in the store.
  #[error("record {0} not found")]
  NotFound(String),

  #[error("storage backend error: {0}")]
  Backend(#[from] rusqlite::Error),
}

/// Errors surfaced by the sync coordinator and the fetch gate.
#[derive(Debug, Error)]
pub enum SyncError {
  #[error("offline storage failed: {0}")]
  Storage(#[from] StoreError),

  /// The backend could not be reached, or the request timed out.
  #[error("network error: {0}")]
  Network(String),

  /// The backend answered, but with a non-2xx status.
  #[error("backend returned status {0}")]
  Api(u16),

  /// A mutation targeted a record missing from the local store while the
  /// backend was unreachable.
  #[error("record {0} not found in local store")]
  NotFoundLocal(String),
}

impl From<reqwest::Error> for SyncError {
  fn from(err: reqwest::Error) -> Self {
    SyncError::Network(err.to_string())
  }
}

pub type SyncResult<T> = std::result::Result<T, SyncError>;
