use anyhow::{Context, Result};
use std::process::{Command, Stdio};
use tracing::info;

#[cfg(target_os = "macos")]
const OPENER: &str = "open";
#[cfg(not(target_os = "macos"))]
const OPENER: &str = "xdg-open";

/// Open `url` with the platform's default handler without blocking.
pub fn open_locally(url: &str) -> Result<()> {
  let mut child = Command::new(OPENER)
    .arg(url)
    .stdin(Stdio::null())
    .stdout(Stdio::null())
    .stderr(Stdio::null())
    .spawn()
    .with_context(|| format!("Failed to launch {OPENER}"))?;
  info!(url = %url, "browser: opened locally");
  // Reap the child in a background thread to avoid zombie processes.
  std::thread::spawn(move || {
    let _ = child.wait();
  });
  Ok(())
}
