use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// User preferences kept in `prefs.toml`. Command-line flags win over these.
#[derive(Serialize, Deserialize, Default, Debug, Clone, PartialEq, Eq)]
pub struct Config {
  pub server_url: Option<String>,
  /// Snapshot URL or path used when the backend is unreachable.
  pub snapshot: Option<String>,
  pub theme_name: Option<String>,
}

fn project_dirs() -> Option<ProjectDirs> {
  ProjectDirs::from("", "", "upchk")
}

/// Directory the log file is written to.
pub fn log_dir() -> PathBuf {
  project_dirs().map(|d| d.data_local_dir().to_path_buf()).unwrap_or_else(std::env::temp_dir)
}

impl Config {
  pub fn load() -> Self {
    if let Some(proj_dirs) = project_dirs() {
      let config_file = proj_dirs.config_dir().join("prefs.toml");
      if let Ok(content) = std::fs::read_to_string(config_file) {
        return Self::parse(&content);
      }
    }
    Self::default()
  }

  /// Unreadable preferences are ignored rather than fatal.
  fn parse(content: &str) -> Self {
    toml::from_str(content).unwrap_or_default()
  }

  pub fn save(&self) {
    if let Some(proj_dirs) = project_dirs() {
      let config_dir = proj_dirs.config_dir();
      if std::fs::create_dir_all(config_dir).is_ok() {
        let config_file = config_dir.join("prefs.toml");
        if let Ok(content) = toml::to_string(self) {
          let _ = std::fs::write(config_file, content);
        }
      }
    }
  }
}
