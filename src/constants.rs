//! Application constants loaded from `constants.ron` at compile time.
//!
//! The RON file is embedded via `include_str!` so it's always available,
//! no runtime file I/O. Parsed once on first access via `LazyLock`.

use serde::Deserialize;
use std::sync::LazyLock;
use std::time::Duration;

/// All tuneable application constants.
#[derive(Debug, Deserialize)]
pub struct Constants {
  pub app_name: String,
  pub default_server_url: String,
  pub snapshot_file: String,

  // Timers
  pub reconnect_period_ms: u64,
  pub stop_fallback_ms: u64,
  pub probe_timeout_ms: u64,
  pub done_grace_ms: u64,
  pub snapshot_hide_ms: u64,
  pub toast_ms: u64,

  // Snapshot encryption
  pub kdf_iterations: u32,
}

impl Constants {
  pub fn reconnect_period(&self) -> Duration {
    Duration::from_millis(self.reconnect_period_ms)
  }

  pub fn probe_timeout(&self) -> Duration {
    Duration::from_millis(self.probe_timeout_ms)
  }

  pub fn toast_lifetime(&self) -> Duration {
    Duration::from_millis(self.toast_ms)
  }
}

static CONSTANTS: LazyLock<Constants> = LazyLock::new(|| {
  // Safety: the RON file is embedded at compile time; if it's malformed every test fails immediately.
  ron::from_str(include_str!("../constants.ron")).expect("constants.ron must be valid RON (embedded at compile time)")
});

/// Returns a reference to the parsed application constants.
pub fn constants() -> &'static Constants {
  &CONSTANTS
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn embedded_constants_parse() {
    let c = constants();
    assert_eq!(c.reconnect_period(), Duration::from_secs(3));
    assert_eq!(c.stop_fallback_ms, 1000);
    assert_eq!(c.kdf_iterations, 1000);
    assert!(!c.app_name.is_empty());
  }
}
