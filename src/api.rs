use anyhow::{Context, Result, anyhow};
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

use crate::settings::SettingsConfig;

const PROBE_PATH: &str = "api/stats";
const CHECK_PATH: &str = "api/check";
const STOP_PATH: &str = "api/stop";
const SETTINGS_PATH: &str = "api/settings";
const LOGS_PATH: &str = "api/logs";
const OPEN_PATH: &str = "api/open";
const PROGRESS_PATH: &str = "ws/progress";

/// Generic `{ status, ... }` reply used by the mutating endpoints.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StatusReply {
  #[serde(default)]
  pub status: String,
  #[serde(default)]
  pub method: Option<String>,
  #[serde(default)]
  pub message: Option<String>,
}

#[derive(Debug, Serialize)]
struct CheckRequest {
  update_range_days: u32,
}

#[derive(Debug, Serialize)]
struct OpenRequest<'a> {
  url: &'a str,
}

#[derive(Debug, Deserialize)]
struct LogsReply {
  #[serde(default)]
  data: Option<String>,
}

/// How the backend launched a browser.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMethod {
  /// The browser configured in settings.
  Custom,
  Default,
}

/// Outcome of asking the backend to start a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckStart {
  Started,
  /// A run was already in progress server-side.
  AlreadyRunning,
}

/// REST client for the live backend.
#[derive(Debug, Clone)]
pub struct BackendClient {
  http: Client,
  base: Url,
}

impl BackendClient {
  pub fn new(base: &str) -> Result<Self> {
    let mut base = Url::parse(base).with_context(|| format!("Invalid server URL: {base}"))?;
    if !base.path().ends_with('/') {
      let path = format!("{}/", base.path());
      base.set_path(&path);
    }
    Ok(Self { http: Client::new(), base })
  }

  pub fn base(&self) -> &Url {
    &self.base
  }

  pub fn http(&self) -> &Client {
    &self.http
  }

  fn endpoint(&self, path: &str) -> Result<Url> {
    self.base.join(path).with_context(|| format!("Invalid endpoint {path}"))
  }

  /// WebSocket URL of the progress stream, `ws`/`wss` matching the server scheme.
  pub fn progress_url(&self) -> Result<Url> {
    let mut url = self.endpoint(PROGRESS_PATH)?;
    let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
    url.set_scheme(scheme).map_err(|_| anyhow!("Cannot derive stream URL from {}", self.base))?;
    Ok(url)
  }

  /// Existence check used to pick the operating mode. The stats route only serves GET.
  pub async fn probe(&self, timeout: Duration) -> Result<()> {
    let url = self.endpoint(PROBE_PATH)?;
    debug!(url = %url, "api: probing backend");
    self
      .http
      .get(url)
      .timeout(timeout)
      .send()
      .await
      .context("Backend probe failed")?
      .error_for_status()
      .context("Backend probe rejected")?;
    Ok(())
  }

  pub async fn start_check(&self, update_range_days: u32) -> Result<CheckStart> {
    let mut url = self.endpoint(CHECK_PATH)?;
    // The server reads the range from the query string; the body mirrors it.
    url.query_pairs_mut().append_pair("update_range_days", &update_range_days.to_string());
    info!(update_range_days, "api: starting check");
    let reply: StatusReply = self
      .http
      .post(url)
      .json(&CheckRequest { update_range_days })
      .send()
      .await
      .context("Start request failed")?
      .error_for_status()
      .context("Start request rejected")?
      .json()
      .await
      .unwrap_or_default();
    Ok(if reply.status == "running" { CheckStart::AlreadyRunning } else { CheckStart::Started })
  }

  pub async fn stop_check(&self) -> Result<()> {
    let url = self.endpoint(STOP_PATH)?;
    info!("api: requesting stop");
    self
      .http
      .post(url)
      .send()
      .await
      .context("Stop request failed")?
      .error_for_status()
      .context("Stop request rejected")?;
    Ok(())
  }

  pub async fn get_settings(&self) -> Result<SettingsConfig> {
    let url = self.endpoint(SETTINGS_PATH)?;
    self
      .http
      .get(url)
      .send()
      .await
      .context("Settings request failed")?
      .error_for_status()
      .context("Settings request rejected")?
      .json()
      .await
      .context("Settings response is malformed")
  }

  pub async fn save_settings(&self, settings: &SettingsConfig) -> Result<()> {
    let url = self.endpoint(SETTINGS_PATH)?;
    let reply: StatusReply = self
      .http
      .post(url)
      .json(settings)
      .send()
      .await
      .context("Save request failed")?
      .error_for_status()
      .context("Save request rejected")?
      .json()
      .await
      .unwrap_or_default();
    if reply.status == "error" {
      return Err(anyhow!("Server refused settings: {}", reply.message.unwrap_or_default()));
    }
    Ok(())
  }

  /// Tail of the run log. `None` when the server has nothing yet.
  pub async fn fetch_logs(&self) -> Result<Option<String>> {
    let url = self.endpoint(LOGS_PATH)?;
    let reply: LogsReply = self
      .http
      .get(url)
      .send()
      .await
      .context("Logs request failed")?
      .error_for_status()
      .context("Logs request rejected")?
      .json()
      .await
      .context("Logs response is malformed")?;
    Ok(reply.data.filter(|d| !d.is_empty()))
  }

  /// Ask the server to launch a browser. Any non-success reply is an error.
  pub async fn open_url(&self, link: &str) -> Result<OpenMethod> {
    let url = self.endpoint(OPEN_PATH)?;
    let reply: StatusReply = self
      .http
      .post(url)
      .json(&OpenRequest { url: link })
      .send()
      .await
      .context("Open request failed")?
      .json()
      .await
      .context("Open response is malformed")?;
    if reply.status != "success" {
      return Err(anyhow!("Server could not open the link: {}", reply.message.unwrap_or(reply.status)));
    }
    Ok(if reply.method.as_deref() == Some("custom") { OpenMethod::Custom } else { OpenMethod::Default })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;
  use wiremock::matchers::{body_json, method, path, query_param};
  use wiremock::{Mock, MockServer, ResponseTemplate};

  async fn client_for(server: &MockServer) -> BackendClient {
    BackendClient::new(&server.uri()).unwrap()
  }

  #[test]
  fn progress_url_follows_scheme() {
    let plain = BackendClient::new("http://127.0.0.1:8000").unwrap();
    assert_eq!(plain.progress_url().unwrap().as_str(), "ws://127.0.0.1:8000/ws/progress");
    let tls = BackendClient::new("https://example.org/app").unwrap();
    assert_eq!(tls.progress_url().unwrap().as_str(), "wss://example.org/app/ws/progress");
  }

  #[test]
  fn rejects_invalid_base() {
    assert!(BackendClient::new("not a url").is_err());
  }

  #[tokio::test]
  async fn probe_succeeds_on_ok() {
    let server = MockServer::start().await;
    Mock::given(method("GET")).and(path("/api/stats")).respond_with(ResponseTemplate::new(200)).mount(&server).await;
    assert!(client_for(&server).await.probe(Duration::from_secs(2)).await.is_ok());
  }

  #[tokio::test]
  async fn probe_fails_on_missing_endpoint() {
    let server = MockServer::start().await;
    assert!(client_for(&server).await.probe(Duration::from_secs(2)).await.is_err());
  }

  #[tokio::test]
  async fn probe_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path("/api/stats"))
      .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
      .mount(&server)
      .await;
    assert!(client_for(&server).await.probe(Duration::from_millis(50)).await.is_err());
  }

  #[tokio::test]
  async fn start_check_sends_range() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
      .and(path("/api/check"))
      .and(query_param("update_range_days", "30"))
      .and(body_json(json!({"update_range_days": 30})))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "started"})))
      .expect(1)
      .mount(&server)
      .await;
    assert_eq!(client_for(&server).await.start_check(30).await.unwrap(), CheckStart::Started);
  }

  #[tokio::test]
  async fn start_check_reports_running() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
      .and(path("/api/check"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "running"})))
      .mount(&server)
      .await;
    assert_eq!(client_for(&server).await.start_check(7).await.unwrap(), CheckStart::AlreadyRunning);
  }

  #[tokio::test]
  async fn start_check_fails_on_server_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST")).and(path("/api/check")).respond_with(ResponseTemplate::new(500)).mount(&server).await;
    assert!(client_for(&server).await.start_check(7).await.is_err());
  }

  #[tokio::test]
  async fn stop_check_posts() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
      .and(path("/api/stop"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "stopping"})))
      .expect(1)
      .mount(&server)
      .await;
    assert!(client_for(&server).await.stop_check().await.is_ok());
  }

  #[tokio::test]
  async fn settings_round_trip() {
    let server = MockServer::start().await;
    let stored = json!({"check_interval": 7200, "update_range_days": 30, "auto_check": true, "browser_path": null});
    Mock::given(method("GET"))
      .and(path("/api/settings"))
      .respond_with(ResponseTemplate::new(200).set_body_json(stored.clone()))
      .mount(&server)
      .await;
    Mock::given(method("POST"))
      .and(path("/api/settings"))
      .and(body_json(stored))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "success"})))
      .expect(1)
      .mount(&server)
      .await;

    let client = client_for(&server).await;
    let settings = client.get_settings().await.unwrap();
    assert_eq!(settings.update_range_days, 30);
    assert!(settings.auto_check);
    client.save_settings(&settings).await.unwrap();
  }

  #[tokio::test]
  async fn save_settings_surfaces_server_error_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
      .and(path("/api/settings"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "error", "message": "db locked"})))
      .mount(&server)
      .await;
    let err = client_for(&server).await.save_settings(&SettingsConfig::default()).await.unwrap_err();
    assert!(format!("{err:#}").contains("db locked"));
  }

  #[tokio::test]
  async fn logs_null_and_empty_are_none() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path("/api/logs"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": null})))
      .up_to_n_times(1)
      .mount(&server)
      .await;
    Mock::given(method("GET"))
      .and(path("/api/logs"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": "line 1\nline 2"})))
      .mount(&server)
      .await;
    let client = client_for(&server).await;
    assert_eq!(client.fetch_logs().await.unwrap(), None);
    assert_eq!(client.fetch_logs().await.unwrap().as_deref(), Some("line 1\nline 2"));
  }

  #[tokio::test]
  async fn open_url_reports_method() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
      .and(path("/api/open"))
      .and(body_json(json!({"url": "https://x/y"})))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "success", "method": "custom"})))
      .mount(&server)
      .await;
    assert_eq!(client_for(&server).await.open_url("https://x/y").await.unwrap(), OpenMethod::Custom);
  }

  #[tokio::test]
  async fn open_url_non_success_is_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
      .and(path("/api/open"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "error", "message": "no display"})))
      .mount(&server)
      .await;
    assert!(client_for(&server).await.open_url("https://x/y").await.is_err());
  }
}
