use reqwest::Url;
use serde::{Deserialize, Deserializer, Serialize};

/// Read a string field that may be absent or `null` as an empty string.
fn nullable_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
  D: Deserializer<'de>,
{
  Option::<String>::deserialize(deserializer).map(Option::unwrap_or_default)
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Video {
  #[serde(default, deserialize_with = "nullable_string")]
  pub video_id: String,
  #[serde(default, deserialize_with = "nullable_string")]
  pub title: String,
  #[serde(default, deserialize_with = "nullable_string")]
  pub thumbnail_url: String,
  /// Human-readable age as reported by the source, e.g. "3 hours ago".
  #[serde(default, deserialize_with = "nullable_string")]
  pub relative_time: String,
}

/// The tracked source a video was discovered on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bookmark {
  #[serde(default, deserialize_with = "nullable_string")]
  pub name: String,
  #[serde(default, deserialize_with = "nullable_string")]
  pub url: String,
  #[serde(default, deserialize_with = "nullable_string")]
  pub avatar_url: String,
}

/// One newly discovered video together with the bookmark it belongs to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateItem {
  #[serde(default)]
  pub video: Video,
  #[serde(default)]
  pub bookmark: Bookmark,
}

impl UpdateItem {
  /// Derive the watch link for this item.
  ///
  /// bilibili bookmarks link to the video page; other sources link to the
  /// bookmark itself. Returns `None` when the bookmark URL does not parse.
  pub fn watch_url(&self) -> Option<String> {
    let bilibili = || format!("https://www.bilibili.com/video/{}", self.video.video_id);
    if self.bookmark.url.is_empty() {
      return Some(bilibili());
    }
    let parsed = Url::parse(&self.bookmark.url).ok()?;
    let host = parsed.host_str().unwrap_or_default();
    if host.contains("hsex.men") || host.contains("hsex.icu") {
      Some(format!("https://{host}/video-{}.htm", self.video.video_id))
    } else if host.contains("bilibili.com") {
      Some(bilibili())
    } else {
      Some(self.bookmark.url.clone())
    }
  }
}

/// A message on the progress event stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ProgressEvent {
  /// The run moved on to bookmark `current` of `total`.
  Progress {
    current: u64,
    total: u64,
    #[serde(default, deserialize_with = "nullable_string")]
    name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    speed: Option<f64>,
  },
  /// A new video was discovered.
  Item { data: UpdateItem },
  /// The run finished with `count` discoveries.
  Done { count: u64 },
}

impl ProgressEvent {
  pub fn parse(text: &str) -> serde_json::Result<Self> {
    serde_json::from_str(text)
  }
}

/// `round(current / total * 100)`, clamped to `0..=100`. A zero total reads as 0%.
pub fn progress_percent(current: u64, total: u64) -> u16 {
  if total == 0 {
    return 0;
  }
  let pct = (current as f64 / total as f64 * 100.0).round();
  pct.clamp(0.0, 100.0) as u16
}
