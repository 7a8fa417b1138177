use url::Url;

use crate::brands::types::{Brand, BrandDraft, BrandPatch, BrandStatus};
use crate::error::{SyncError, SyncResult};

/// Pre-shared credential header carried on every registry request.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Thin client for the remote brand registry.
#[derive(Clone)]
pub struct RegistryClient {
  http: reqwest::Client,
  base: String,
  api_key: String,
}

impl RegistryClient {
  /// `api_base` must already be normalized to end in `/api/v1`.
  pub fn new(api_base: &Url, api_key: String) -> Self {
    Self {
      http: reqwest::Client::new(),
      base: api_base.as_str().trim_end_matches('/').to_string(),
      api_key,
    }
  }

  fn endpoint(&self, suffix: &str) -> String {
    format!("{}/{}", self.base, suffix)
  }

  /// Fetch the full server listing.
  pub async fn fetch_all(&self) -> SyncResult<Vec<Brand>> {
    let response = self
      .http
      .get(self.endpoint("brands"))
      .header(API_KEY_HEADER, &self.api_key)
      .send()
      .await?;

    let status = response.status();
    if !status.is_success() {
      return Err(SyncError::Api(status.as_u16()));
    }

    Ok(response.json().await?)
  }

  /// Register a new brand; the server assigns the id and the status starts
  /// as Pending.
  pub async fn create(&self, draft: &BrandDraft) -> SyncResult<Brand> {
    let body = serde_json::json!({
      "name": draft.name,
      "owner": draft.owner,
      "lang": draft.lang,
      "status": BrandStatus::Pending,
    });

    let response = self
      .http
      .post(self.endpoint("brands"))
      .header(API_KEY_HEADER, &self.api_key)
      .json(&body)
      .send()
      .await?;

    let status = response.status();
    if !status.is_success() {
      return Err(SyncError::Api(status.as_u16()));
    }

    Ok(response.json().await?)
  }

  /// Partial update of an existing record.
  pub async fn update(&self, id: &str, patch: &BrandPatch) -> SyncResult<Brand> {
    let response = self
      .http
      .put(self.endpoint(&format!("brands/{id}")))
      .header(API_KEY_HEADER, &self.api_key)
      .json(patch)
      .send()
      .await?;

    let status = response.status();
    if !status.is_success() {
      return Err(SyncError::Api(status.as_u16()));
    }

    Ok(response.json().await?)
  }

  pub async fn remove(&self, id: &str) -> SyncResult<()> {
    let response = self
      .http
      .delete(self.endpoint(&format!("brands/{id}")))
      .header(API_KEY_HEADER, &self.api_key)
      .send()
      .await?;

    let status = response.status();
    if !status.is_success() {
      return Err(SyncError::Api(status.as_u16()));
    }

    Ok(())
  }
}
