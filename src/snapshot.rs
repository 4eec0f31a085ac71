use anyhow::{Context, Result, anyhow};
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::time::Instant;
use tracing::info;

use crate::crypto::SealedSnapshot;
use crate::model::UpdateItem;
use crate::session::ProgressSession;
use crate::store::ResultStore;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotMetadata {
  #[serde(default)]
  pub generated_at: Option<String>,
  #[serde(default)]
  pub total_items: Option<u64>,
  #[serde(default)]
  pub range_days: Option<u32>,
}

/// The readable snapshot schema.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlainSnapshot {
  /// Absent or non-array `items` loads nothing.
  #[serde(default)]
  pub items: Option<Vec<UpdateItem>>,
  #[serde(default)]
  pub metadata: Option<SnapshotMetadata>,
}

impl PlainSnapshot {
  pub fn from_value(value: serde_json::Value) -> Result<Self> {
    let mut value = value;
    // A non-array `items` is treated the same as a missing one.
    if let Some(obj) = value.as_object_mut()
      && obj.get("items").is_some_and(|v| !v.is_array())
    {
      obj.remove("items");
    }
    serde_json::from_value(value).context("snapshot items are malformed")
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StaticSnapshot {
  Plain(PlainSnapshot),
  Sealed(SealedSnapshot),
}

impl StaticSnapshot {
  /// Classify a snapshot document by its `encrypted` flag.
  pub fn from_value(value: serde_json::Value) -> Result<Self> {
    let encrypted = value.get("encrypted").and_then(serde_json::Value::as_bool).unwrap_or(false);
    if encrypted {
      let sealed = serde_json::from_value(value).context("sealed snapshot is missing salt/iv/content")?;
      Ok(StaticSnapshot::Sealed(sealed))
    } else {
      Ok(StaticSnapshot::Plain(PlainSnapshot::from_value(value)?))
    }
  }

  pub fn from_slice(bytes: &[u8]) -> Result<Self> {
    let value: serde_json::Value = serde_json::from_slice(bytes).context("snapshot is not valid JSON")?;
    Self::from_value(value)
  }
}

/// Where the snapshot lives: a URL or a local file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotSource {
  Remote(Url),
  File(PathBuf),
}

impl SnapshotSource {
  /// `http(s)://` inputs are URLs, everything else is a path.
  pub fn parse(input: &str) -> Self {
    match Url::parse(input) {
      Ok(url) if matches!(url.scheme(), "http" | "https") => SnapshotSource::Remote(url),
      _ => SnapshotSource::File(PathBuf::from(input)),
    }
  }

  /// `<base>/data.json` next to the server root.
  pub fn beside(base: &Url) -> Result<Self> {
    let url = base.join(&crate::constants::constants().snapshot_file).context("Invalid snapshot URL")?;
    Ok(SnapshotSource::Remote(url))
  }
}

impl std::fmt::Display for SnapshotSource {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      SnapshotSource::Remote(url) => write!(f, "{url}"),
      SnapshotSource::File(path) => write!(f, "{}", path.display()),
    }
  }
}

/// Fetch and classify the snapshot once.
pub async fn fetch_snapshot(client: &Client, source: &SnapshotSource) -> Result<StaticSnapshot> {
  let bytes = match source {
    SnapshotSource::Remote(url) => {
      let response = client.get(url.clone()).send().await.with_context(|| format!("Failed to fetch {url}"))?;
      if !response.status().is_success() {
        return Err(anyhow!("Snapshot request failed with HTTP {}", response.status()));
      }
      response.bytes().await.context("Failed to read snapshot body")?.to_vec()
    }
    SnapshotSource::File(path) => {
      tokio::fs::read(path).await.with_context(|| format!("Failed to read {}", path.display()))?
    }
  };
  StaticSnapshot::from_slice(&bytes)
}

/// Replace the store contents with the snapshot's items.
///
/// Items are listed most recent first, so they are prepended in reverse.
/// Returns the number of records loaded.
pub fn load_into(
  snapshot: PlainSnapshot,
  store: &mut ResultStore,
  session: &mut ProgressSession,
  now: Instant,
) -> usize {
  store.reset();
  let Some(items) = snapshot.items else { return 0 };
  let count = items.len();
  for item in items.into_iter().rev() {
    store.prepend(item);
  }
  let metadata = snapshot.metadata.unwrap_or_default();
  info!(count, total_items = ?metadata.total_items, range_days = ?metadata.range_days, "snapshot: loaded items");
  if let Some(generated_at) = metadata.generated_at {
    session.show_snapshot_status(&generated_at, now);
  }
  count
}
