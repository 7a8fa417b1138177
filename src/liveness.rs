//! Backend liveness probing and connectivity state.
//!
//! Two independent flags live here: whether the backend answered a recent
//! probe (gates read/write routing), and whether the host reports device
//! connectivity at all (informational; a device with network can still face
//! an unreachable backend).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info};
use url::Url;

use crate::brands::client::API_KEY_HEADER;

/// Probe budget: a backend that cannot answer within this window counts as
/// unreachable even if it answers later.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// How often the background probe re-checks the backend.
pub const PROBE_INTERVAL: Duration = Duration::from_secs(30);

/// Shared connectivity state, updated by the monitor and host notifications,
/// consumed by the sync coordinator.
#[derive(Debug)]
pub struct BackendStatus {
  backend_reachable: AtomicBool,
  device_online: AtomicBool,
}

impl BackendStatus {
  /// Starts optimistic: the backend is assumed reachable until a probe or a
  /// failed call says otherwise.
  pub fn new() -> Self {
    Self {
      backend_reachable: AtomicBool::new(true),
      device_online: AtomicBool::new(true),
    }
  }

  pub fn backend_reachable(&self) -> bool {
    self.backend_reachable.load(Ordering::Relaxed)
  }

  pub fn set_backend_reachable(&self, reachable: bool) {
    self.backend_reachable.store(reachable, Ordering::Relaxed);
  }

  pub fn device_online(&self) -> bool {
    self.device_online.load(Ordering::Relaxed)
  }

  /// Host connectivity hook; only affects messaging, never routing.
  pub fn set_device_online(&self, online: bool) {
    self.device_online.store(online, Ordering::Relaxed);
  }
}

impl Default for BackendStatus {
  fn default() -> Self {
    Self::new()
  }
}

/// Periodic and on-demand backend probe.
#[derive(Clone)]
pub struct LivenessMonitor {
  http: reqwest::Client,
  probe_url: String,
  api_key: String,
  status: Arc<BackendStatus>,
  probe_timeout: Duration,
  probe_interval: Duration,
}

impl LivenessMonitor {
  /// `api_base` is the registry base ending in `/api/v1`; the probe hits the
  /// collection endpoint under it.
  pub fn new(api_base: &Url, api_key: String, status: Arc<BackendStatus>) -> Self {
    Self {
      http: reqwest::Client::new(),
      probe_url: format!("{}/brands", api_base.as_str().trim_end_matches('/')),
      api_key,
      status,
      probe_timeout: PROBE_TIMEOUT,
      probe_interval: PROBE_INTERVAL,
    }
  }

  /// Override the probe budget.
  pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
    self.probe_timeout = timeout;
    self
  }

  /// Override the background probe interval.
  #[allow(dead_code)]
  pub fn with_probe_interval(mut self, interval: Duration) -> Self {
    self.probe_interval = interval;
    self
  }

  pub fn status_handle(&self) -> Arc<BackendStatus> {
    Arc::clone(&self.status)
  }

  /// Probe the backend once and update the shared flag.
  ///
  /// Reachable only on a 2xx inside the probe budget. Timeouts, transport
  /// errors and non-2xx responses (including auth rejections) all classify
  /// as unreachable.
  pub async fn check_backend(&self) -> bool {
    let request = self
      .http
      .get(&self.probe_url)
      .header(API_KEY_HEADER, &self.api_key)
      .send();

    let reachable = match tokio::time::timeout(self.probe_timeout, request).await {
      Ok(Ok(response)) => response.status().is_success(),
      Ok(Err(e)) => {
        debug!(error = %e, "backend probe failed");
        false
      }
      Err(_) => {
        debug!(timeout = ?self.probe_timeout, "backend probe timed out");
        false
      }
    };

    if self.status.backend_reachable() != reachable {
      info!(reachable, "backend reachability changed");
    }
    self.status.set_backend_reachable(reachable);

    reachable
  }

  /// Probe on a fixed interval for the life of the process. The task is not
  /// torn down; it ends with the hosting runtime.
  pub fn spawn(self) -> JoinHandle<()> {
    tokio::spawn(async move {
      let mut ticker = tokio::time::interval(self.probe_interval);
      // The first tick fires immediately; the startup probe already ran.
      ticker.tick().await;
      loop {
        ticker.tick().await;
        self.check_backend().await;
      }
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::testutil;

  fn monitor_for(addr: &str) -> LivenessMonitor {
    let base: Url = format!("http://{addr}/api/v1").parse().unwrap();
    LivenessMonitor::new(&base, "test-key".to_string(), Arc::new(BackendStatus::new()))
  }

  #[tokio::test]
  async fn test_probe_2xx_is_reachable() {
    let stub = testutil::http_stub(200, "application/json", "[]").await;
    let monitor = monitor_for(&stub.addr.to_string());

    assert!(monitor.check_backend().await);
    assert!(monitor.status_handle().backend_reachable());
  }

  #[tokio::test]
  async fn test_probe_server_error_is_unreachable() {
    let stub = testutil::http_stub(500, "text/plain", "boom").await;
    let monitor = monitor_for(&stub.addr.to_string());

    assert!(!monitor.check_backend().await);
    assert!(!monitor.status_handle().backend_reachable());
  }

  #[tokio::test]
  async fn test_rejected_credentials_read_as_unreachable() {
    // Auth rejection and a downed backend are deliberately not told apart.
    let stub = testutil::http_stub(401, "application/json", "{}").await;
    let monitor = monitor_for(&stub.addr.to_string());

    assert!(!monitor.check_backend().await);
  }

  #[tokio::test]
  async fn test_probe_timeout_is_unreachable() {
    // The backend does answer 200, but only after the probe budget.
    let stub = testutil::delayed_stub(Duration::from_millis(500), 200, "[]").await;
    let monitor =
      monitor_for(&stub.addr.to_string()).with_probe_timeout(Duration::from_millis(100));

    let started = std::time::Instant::now();
    assert!(!monitor.check_backend().await);
    assert!(started.elapsed() < Duration::from_millis(400));
  }

  #[tokio::test]
  async fn test_unanswered_probe_is_unreachable() {
    let stub = testutil::silent_stub().await;
    let monitor =
      monitor_for(&stub.addr.to_string()).with_probe_timeout(Duration::from_millis(100));

    assert!(!monitor.check_backend().await);
  }

  #[tokio::test]
  async fn test_device_connectivity_is_independent() {
    let stub = testutil::http_stub(200, "application/json", "[]").await;
    let monitor = monitor_for(&stub.addr.to_string());
    let status = monitor.status_handle();

    status.set_device_online(false);
    assert!(monitor.check_backend().await);

    assert!(status.backend_reachable());
    assert!(!status.device_online());
  }
}
