//! Startup mode selection and the runtime object that owns process-wide
//! client state (backend client, cached settings, live transport).

use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::api::BackendClient;
use crate::constants::constants;
use crate::settings::SettingsConfig;
use crate::snapshot::SnapshotSource;
use crate::transport::{TransportManager, TransportSignal};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
  /// Live backend: REST + progress stream.
  Dynamic,
  /// Pre-published snapshot only.
  Static,
}

impl Mode {
  pub fn label(self) -> &'static str {
    match self {
      Mode::Dynamic => "live",
      Mode::Static => "hosted",
    }
  }
}

/// Probe the backend once. Any failure, including a timeout, selects static mode.
pub async fn detect_mode(client: &BackendClient, timeout: Duration) -> Mode {
  match client.probe(timeout).await {
    Ok(()) => {
      info!(server = %client.base(), "mode: backend reachable, dynamic mode");
      Mode::Dynamic
    }
    Err(e) => {
      warn!(err = %format!("{e:#}"), "mode: backend unreachable, static mode");
      Mode::Static
    }
  }
}

/// Process-wide client state, constructed once and torn down on exit.
pub struct Runtime {
  pub backend: BackendClient,
  /// Cached copy of the server's settings.
  pub settings: SettingsConfig,
  snapshot: Option<SnapshotSource>,
  mode: Option<Mode>,
  transport: Option<JoinHandle<()>>,
}

impl Runtime {
  pub fn new(backend: BackendClient, snapshot: Option<SnapshotSource>) -> Self {
    Self { backend, settings: SettingsConfig::default(), snapshot, mode: None, transport: None }
  }

  pub fn mode(&self) -> Option<Mode> {
    self.mode
  }

  pub fn is_dynamic(&self) -> bool {
    self.mode == Some(Mode::Dynamic)
  }

  /// Record the startup decision. Only the first call takes effect.
  pub fn settle_mode(&mut self, mode: Mode) -> bool {
    if self.mode.is_some() {
      return false;
    }
    self.mode = Some(mode);
    true
  }

  /// Explicit `--snapshot`, else `data.json` beside the server root.
  pub fn snapshot_source(&self) -> anyhow::Result<SnapshotSource> {
    match &self.snapshot {
      Some(source) => Ok(source.clone()),
      None => SnapshotSource::beside(self.backend.base()),
    }
  }

  /// Start the stream transport. Its signals arrive on the returned receiver.
  pub fn open_transport(&mut self) -> anyhow::Result<mpsc::UnboundedReceiver<TransportSignal>> {
    self.close_transport();
    let url = self.backend.progress_url()?;
    let (tx, rx) = mpsc::unbounded_channel();
    let manager = TransportManager::new(url, constants().reconnect_period());
    self.transport = Some(manager.spawn(tx));
    Ok(rx)
  }

  pub fn close_transport(&mut self) {
    if let Some(handle) = self.transport.take() {
      handle.abort();
    }
  }

  pub fn shutdown(&mut self) {
    self.close_transport();
  }
}

impl Drop for Runtime {
  fn drop(&mut self) {
    self.shutdown();
  }
}
