//! Network-edge fallback for raw resource fetches.
//!
//! The fetch gate sits between the application and the wire for requests
//! that do not go through the sync coordinator. It runs on its own task and
//! is driven purely by messages: a fetch request comes with a reply channel,
//! and a single control message forces immediate activation of the current
//! cache generations. Matched API requests get a bounded live fetch, then a
//! cached response, then a reconstruction from the brand store, then a
//! canned offline body; unmatched requests are served cache-first. The gate
//! opens the brand store independently of the coordinator; the two converge
//! only through the store itself.

mod cache;

pub use cache::ResponseCache;

use reqwest::Method;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};
use url::Url;

use crate::brands::client::API_KEY_HEADER;
use crate::brands::types::Brand;
use crate::error::SyncError;
use crate::store::BrandStore;

/// Resource-path prefix the gate treats as registry API traffic.
const API_PREFIX: &str = "/api/v1/brands";

/// Budget for a live fetch before falling back.
const FETCH_TIMEOUT: Duration = Duration::from_secs(5);

const OFFLINE_BODY: &str =
  r#"{"offline":true,"message":"backend unreachable and no cached data available"}"#;

/// Shape of a matched API path.
#[derive(Debug, Clone, PartialEq, Eq)]
enum ApiPath {
  /// The whole collection.
  Collection,
  /// A single record, keyed by the trailing segment.
  Item(String),
  /// Not registry API traffic.
  Other,
}

fn classify_api_path(path: &str) -> ApiPath {
  let path = path.split('?').next().unwrap_or(path);
  let Some(rest) = path.strip_prefix(API_PREFIX) else {
    return ApiPath::Other;
  };

  if rest.is_empty() || rest == "/" {
    return ApiPath::Collection;
  }
  let Some(tail) = rest.strip_prefix('/') else {
    return ApiPath::Other;
  };
  let tail = tail.trim_end_matches('/');
  if tail.is_empty() {
    ApiPath::Collection
  } else if tail.contains('/') {
    ApiPath::Other
  } else {
    ApiPath::Item(tail.to_string())
  }
}

/// Which layer ultimately produced a gate response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Served {
  /// Live fetch succeeded.
  Network,
  /// A previously cached response for the identical request.
  Cache,
  /// Reconstructed from the brand store by path shape.
  Store,
  /// The canned offline response.
  Fallback,
}

#[derive(Debug, Clone)]
pub struct GateRequest {
  pub method: Method,
  /// Absolute path (plus optional query) under the configured origin.
  pub path: String,
  /// JSON body for mutating requests.
  pub body: Option<String>,
}

impl GateRequest {
  pub fn new(method: Method, path: impl Into<String>) -> Self {
    Self {
      method,
      path: path.into(),
      body: None,
    }
  }

  pub fn get(path: impl Into<String>) -> Self {
    Self::new(Method::GET, path)
  }
}

#[derive(Debug, Clone)]
pub struct GateResponse {
  pub status: u16,
  pub content_type: Option<String>,
  pub body: Vec<u8>,
  pub served: Served,
}

enum GateMsg {
  Fetch(GateRequest, oneshot::Sender<GateResponse>),
  Activate,
}

/// Handle for submitting requests to a spawned gate.
#[derive(Clone)]
pub struct GateHandle {
  tx: mpsc::UnboundedSender<GateMsg>,
}

impl GateHandle {
  pub async fn fetch(&self, request: GateRequest) -> Result<GateResponse, SyncError> {
    let (reply_tx, reply_rx) = oneshot::channel();
    self
      .tx
      .send(GateMsg::Fetch(request, reply_tx))
      .map_err(|_| SyncError::Network("fetch gate is not running".to_string()))?;
    reply_rx
      .await
      .map_err(|_| SyncError::Network("fetch gate dropped the request".to_string()))
  }

  /// Activate the current cache generations immediately instead of waiting
  /// for the next restart.
  pub fn activate_now(&self) {
    let _ = self.tx.send(GateMsg::Activate);
  }
}

pub struct FetchGate {
  http: reqwest::Client,
  origin: Url,
  api_key: String,
  fetch_timeout: Duration,
  cache: ResponseCache,
  store: BrandStore,
  static_paths: Vec<String>,
}

impl FetchGate {
  pub fn new(origin: Url, api_key: String, store: BrandStore, cache: ResponseCache) -> Self {
    Self {
      http: reqwest::Client::new(),
      origin,
      api_key,
      fetch_timeout: FETCH_TIMEOUT,
      cache,
      store,
      static_paths: Vec::new(),
    }
  }

  /// Paths prefetched into the static generation on install.
  pub fn with_static_paths(mut self, paths: Vec<String>) -> Self {
    self.static_paths = paths;
    self
  }

  #[allow(dead_code)]
  pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
    self.fetch_timeout = timeout;
    self
  }

  /// Install, activate and start serving requests on a background task.
  pub fn spawn(self) -> GateHandle {
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(self.run(rx));
    GateHandle { tx }
  }

  async fn run(self, mut rx: mpsc::UnboundedReceiver<GateMsg>) {
    self.install().await;
    self.activate();

    while let Some(msg) = rx.recv().await {
      match msg {
        GateMsg::Fetch(request, reply) => {
          let response = self.handle_request(request).await;
          let _ = reply.send(response);
        }
        GateMsg::Activate => self.activate(),
      }
    }
  }

  /// Prefetch the configured static paths into the static generation.
  async fn install(&self) {
    if self.static_paths.is_empty() {
      return;
    }

    let fetches = self.static_paths.iter().map(|path| async move {
      let url = match self.origin.join(path) {
        Ok(url) => url,
        Err(e) => {
          warn!(path = %path, error = %e, "skipping unparseable static path");
          return;
        }
      };

      match self.http.get(url.clone()).send().await {
        Ok(response) if response.status().is_success() => {
          let status = response.status().as_u16();
          let content_type = header_content_type(&response);
          match response.bytes().await {
            Ok(body) => {
              if let Err(e) = self.cache.put(
                cache::STATIC_GENERATION,
                "GET",
                url.as_str(),
                status,
                content_type.as_deref(),
                &body,
              ) {
                warn!(error = %e, %url, "failed to cache prefetched path");
              }
            }
            Err(e) => warn!(error = %e, %url, "failed reading prefetched body"),
          }
        }
        Ok(response) => {
          warn!(status = response.status().as_u16(), %url, "prefetch answered with an error");
        }
        Err(e) => warn!(error = %e, %url, "prefetch failed"),
      }
    });

    futures::future::join_all(fetches).await;
    info!(count = self.static_paths.len(), "static prefetch complete");
  }

  /// Drop cache generations the current build no longer allows.
  fn activate(&self) {
    match self.cache.purge_except(cache::LIVE_GENERATIONS) {
      Ok(0) => {}
      Ok(purged) => info!(purged, "purged stale cache generations"),
      Err(e) => warn!(error = %e, "failed to purge stale cache generations"),
    }
  }

  async fn handle_request(&self, request: GateRequest) -> GateResponse {
    match classify_api_path(&request.path) {
      ApiPath::Other => self.handle_static(request).await,
      shape => self.handle_api(request, shape).await,
    }
  }

  /// Matched API traffic: bounded live fetch, then cache, then store, then
  /// the offline body.
  async fn handle_api(&self, request: GateRequest, shape: ApiPath) -> GateResponse {
    let url = match self.origin.join(&request.path) {
      Ok(url) => url,
      Err(e) => {
        warn!(path = %request.path, error = %e, "unparseable request path");
        return offline_response();
      }
    };

    let live = tokio::time::timeout(self.fetch_timeout, self.forward(&request, &url, true)).await;

    match live {
      Ok(Ok(response)) if response.status().is_success() => {
        let status = response.status().as_u16();
        let content_type = header_content_type(&response);
        match response.bytes().await {
          Ok(body) => {
            let body = body.to_vec();
            if request.method == Method::GET {
              if let Err(e) = self.cache.put(
                cache::DYNAMIC_GENERATION,
                request.method.as_str(),
                url.as_str(),
                status,
                content_type.as_deref(),
                &body,
              ) {
                warn!(error = %e, %url, "failed to cache live response");
              }
            }
            self.mirror(&shape, &body);
            GateResponse {
              status,
              content_type,
              body,
              served: Served::Network,
            }
          }
          Err(e) => {
            debug!(error = %e, %url, "failed reading live response body, serving fallback");
            self.api_fallback(&request, &url, &shape)
          }
        }
      }
      Ok(Ok(response)) => {
        debug!(status = response.status().as_u16(), %url, "backend error, serving fallback");
        self.api_fallback(&request, &url, &shape)
      }
      Ok(Err(e)) => {
        debug!(error = %e, %url, "live fetch failed, serving fallback");
        self.api_fallback(&request, &url, &shape)
      }
      Err(_) => {
        debug!(timeout = ?self.fetch_timeout, %url, "live fetch timed out, serving fallback");
        self.api_fallback(&request, &url, &shape)
      }
    }
  }

  /// Unmatched traffic: cache-first for GETs, then live fetch, then a plain
  /// offline response.
  async fn handle_static(&self, request: GateRequest) -> GateResponse {
    let url = match self.origin.join(&request.path) {
      Ok(url) => url,
      Err(e) => {
        warn!(path = %request.path, error = %e, "unparseable request path");
        return offline_response();
      }
    };

    if request.method == Method::GET {
      if let Ok(Some(cached)) =
        self.cache.get(cache::STATIC_GENERATION, request.method.as_str(), url.as_str())
      {
        return GateResponse {
          status: cached.status,
          content_type: cached.content_type,
          body: cached.body,
          served: Served::Cache,
        };
      }
    }

    match self.forward(&request, &url, false).await {
      Ok(response) => {
        let status = response.status().as_u16();
        let success = response.status().is_success();
        let content_type = header_content_type(&response);
        let body = response.bytes().await.map(|b| b.to_vec()).unwrap_or_default();

        if success && request.method == Method::GET {
          if let Err(e) = self.cache.put(
            cache::STATIC_GENERATION,
            request.method.as_str(),
            url.as_str(),
            status,
            content_type.as_deref(),
            &body,
          ) {
            warn!(error = %e, %url, "failed to cache static response");
          }
        }

        GateResponse {
          status,
          content_type,
          body,
          served: Served::Network,
        }
      }
      Err(e) => {
        debug!(error = %e, %url, "static fetch failed");
        GateResponse {
          status: 503,
          content_type: Some("text/plain".to_string()),
          body: b"Offline".to_vec(),
          served: Served::Fallback,
        }
      }
    }
  }

  async fn forward(
    &self,
    request: &GateRequest,
    url: &Url,
    with_key: bool,
  ) -> Result<reqwest::Response, reqwest::Error> {
    let mut builder = self.http.request(request.method.clone(), url.clone());
    if with_key {
      builder = builder.header(API_KEY_HEADER, &self.api_key);
    }
    if let Some(body) = &request.body {
      builder = builder
        .header(reqwest::header::CONTENT_TYPE, "application/json")
        .body(body.clone());
    }
    builder.send().await
  }

  /// Best-effort mirror of successful API bodies into the brand store.
  fn mirror(&self, shape: &ApiPath, body: &[u8]) {
    match shape {
      ApiPath::Collection => match serde_json::from_slice::<Vec<Brand>>(body) {
        Ok(records) => {
          if let Err(e) = self.store.sync_many(&records) {
            warn!(error = %e, "failed to mirror listing into the store");
          }
        }
        Err(e) => debug!(error = %e, "response body is not a record listing, skipping mirror"),
      },
      ApiPath::Item(_) => match serde_json::from_slice::<Brand>(body) {
        Ok(record) => {
          if let Err(e) = self.store.sync_many(std::slice::from_ref(&record)) {
            warn!(error = %e, id = %record.id, "failed to mirror record into the store");
          }
        }
        Err(e) => debug!(error = %e, "response body is not a record, skipping mirror"),
      },
      ApiPath::Other => {}
    }
  }

  fn api_fallback(&self, request: &GateRequest, url: &Url, shape: &ApiPath) -> GateResponse {
    if request.method == Method::GET {
      if let Ok(Some(cached)) = self.cache.lookup(request.method.as_str(), url.as_str()) {
        info!(%url, "serving cached response");
        return GateResponse {
          status: cached.status,
          content_type: cached.content_type,
          body: cached.body,
          served: Served::Cache,
        };
      }
    }

    match shape {
      ApiPath::Collection => match self.store.get_all() {
        Ok(records) => {
          info!(count = records.len(), "reconstructing listing from the store");
          json_response(&records)
        }
        Err(e) => {
          warn!(error = %e, "store reconstruction failed");
          offline_response()
        }
      },
      ApiPath::Item(id) => match self.store.get(id) {
        Ok(Some(record)) => {
          info!(id = %id, "reconstructing record from the store");
          json_response(&record)
        }
        Ok(None) => offline_response(),
        Err(e) => {
          warn!(error = %e, "store reconstruction failed");
          offline_response()
        }
      },
      ApiPath::Other => offline_response(),
    }
  }
}

fn header_content_type(response: &reqwest::Response) -> Option<String> {
  response
    .headers()
    .get(reqwest::header::CONTENT_TYPE)
    .and_then(|v| v.to_str().ok())
    .map(String::from)
}

fn json_response<T: serde::Serialize>(value: &T) -> GateResponse {
  match serde_json::to_vec(value) {
    Ok(body) => GateResponse {
      status: 200,
      content_type: Some("application/json".to_string()),
      body,
      served: Served::Store,
    },
    Err(e) => {
      warn!(error = %e, "failed to serialize store reconstruction");
      offline_response()
    }
  }
}

fn offline_response() -> GateResponse {
  GateResponse {
    status: 503,
    content_type: Some("application/json".to_string()),
    body: OFFLINE_BODY.as_bytes().to_vec(),
    served: Served::Fallback,
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::brands::types::{BrandDraft, BrandStatus};
  use crate::testutil;
  use chrono::Utc;
  use pretty_assertions::assert_eq;

  fn gate_for(addr: &str, store: BrandStore) -> FetchGate {
    let origin: Url = format!("http://{addr}").parse().unwrap();
    FetchGate::new(
      origin,
      "test-key".to_string(),
      store,
      ResponseCache::open_in_memory().unwrap(),
    )
  }

  fn draft(name: &str) -> BrandDraft {
    BrandDraft {
      name: name.to_string(),
      owner: "Jane".to_string(),
      lang: "en".to_string(),
    }
  }

  #[test]
  fn test_classify_api_path_shapes() {
    assert_eq!(classify_api_path("/api/v1/brands"), ApiPath::Collection);
    assert_eq!(classify_api_path("/api/v1/brands/"), ApiPath::Collection);
    assert_eq!(classify_api_path("/api/v1/brands?lang=en"), ApiPath::Collection);
    assert_eq!(
      classify_api_path("/api/v1/brands/b-12"),
      ApiPath::Item("b-12".to_string())
    );
    assert_eq!(classify_api_path("/api/v1/brands/b-12/extra"), ApiPath::Other);
    assert_eq!(classify_api_path("/api/v1/brandsmith"), ApiPath::Other);
    assert_eq!(classify_api_path("/logo.webp"), ApiPath::Other);
  }

  #[tokio::test]
  async fn test_unreachable_collection_is_reconstructed_from_store() {
    let addr = testutil::dead_addr().await;
    let store = BrandStore::open_in_memory().unwrap();
    store.add(&draft("Acme"), None).unwrap();
    store.add(&draft("Globex"), None).unwrap();

    let gate = gate_for(&addr.to_string(), store);
    let response = gate.handle_request(GateRequest::get("/api/v1/brands")).await;

    assert_eq!(response.status, 200);
    assert_eq!(response.served, Served::Store);
    let records: Vec<Brand> = serde_json::from_slice(&response.body).unwrap();
    assert_eq!(records.len(), 2);
  }

  #[tokio::test]
  async fn test_unreachable_item_is_reconstructed_or_falls_back() {
    let addr = testutil::dead_addr().await;
    let store = BrandStore::open_in_memory().unwrap();
    let record = store.add(&draft("Acme"), None).unwrap();

    let gate = gate_for(&addr.to_string(), store);

    let hit = gate
      .handle_request(GateRequest::get(format!("/api/v1/brands/{}", record.id)))
      .await;
    assert_eq!(hit.served, Served::Store);
    let reconstructed: Brand = serde_json::from_slice(&hit.body).unwrap();
    assert_eq!(reconstructed.id, record.id);

    let miss = gate
      .handle_request(GateRequest::get("/api/v1/brands/ghost"))
      .await;
    assert_eq!(miss.status, 503);
    assert_eq!(miss.served, Served::Fallback);
  }

  #[tokio::test]
  async fn test_live_response_is_cached_mirrored_and_replayed() {
    let record = Brand {
      id: "srv-1".to_string(),
      name: "FromServer".to_string(),
      owner: "Jane".to_string(),
      lang: "en".to_string(),
      status: BrandStatus::Active,
      created_at: Utc::now(),
      updated_at: Utc::now(),
    };
    let body = serde_json::to_string(&vec![record.clone()]).unwrap();
    let stub = testutil::http_stub(200, "application/json", &body).await;

    let store = BrandStore::open_in_memory().unwrap();
    let gate = gate_for(&stub.addr.to_string(), store.clone());

    let live = gate.handle_request(GateRequest::get("/api/v1/brands")).await;
    assert_eq!(live.served, Served::Network);
    assert_eq!(store.get("srv-1").unwrap().unwrap().name, "FromServer");

    // Backend goes away; the identical request replays from cache.
    drop(stub);
    let replay = gate.handle_request(GateRequest::get("/api/v1/brands")).await;
    assert_eq!(replay.served, Served::Cache);
    assert_eq!(replay.body, live.body);
  }

  #[tokio::test]
  async fn test_static_path_is_cache_first_after_one_fetch() {
    let stub = testutil::http_stub(200, "image/webp", "logo-bytes").await;
    let store = BrandStore::open_in_memory().unwrap();
    let gate = gate_for(&stub.addr.to_string(), store);

    let first = gate.handle_request(GateRequest::get("/logo.webp")).await;
    assert_eq!(first.served, Served::Network);

    let second = gate.handle_request(GateRequest::get("/logo.webp")).await;
    assert_eq!(second.served, Served::Cache);
    assert_eq!(second.body, b"logo-bytes");
  }

  #[tokio::test]
  async fn test_static_path_offline_fallback() {
    let addr = testutil::dead_addr().await;
    let store = BrandStore::open_in_memory().unwrap();
    let gate = gate_for(&addr.to_string(), store);

    let response = gate.handle_request(GateRequest::get("/logo.webp")).await;

    assert_eq!(response.status, 503);
    assert_eq!(response.served, Served::Fallback);
    assert_eq!(response.body, b"Offline");
  }

  #[tokio::test]
  async fn test_spawned_gate_serves_and_takes_control_messages() {
    let stub = testutil::http_stub(200, "application/json", "[]").await;
    let store = BrandStore::open_in_memory().unwrap();
    let handle = gate_for(&stub.addr.to_string(), store).spawn();

    let response = handle.fetch(GateRequest::get("/api/v1/brands")).await.unwrap();
    assert_eq!(response.served, Served::Network);

    handle.activate_now();
    // The gate is still alive and serving after activation.
    let again = handle.fetch(GateRequest::get("/api/v1/brands")).await.unwrap();
    assert_eq!(again.status, 200);
  }
}
