use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  pub server: ServerConfig,
  #[serde(default)]
  pub autosave: AutosaveSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
  /// Base URL of the inventory/billing API, e.g. "https://shop.example.com/api"
  pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AutosaveSettings {
  #[serde(default = "default_autosave_enabled")]
  pub enabled: bool,
  /// Quiet period in milliseconds between the last edit and the save
  #[serde(default = "default_quiet_period_ms")]
  pub quiet_period_ms: u64,
}

fn default_autosave_enabled() -> bool {
  true
}

fn default_quiet_period_ms() -> u64 {
  3000
}

impl Default for AutosaveSettings {
  fn default() -> Self {
    Self {
      enabled: default_autosave_enabled(),
      quiet_period_ms: default_quiet_period_ms(),
    }
  }
}

impl AutosaveSettings {
  pub fn quiet_period(&self) -> Duration {
    Duration::from_millis(self.quiet_period_ms)
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./shopsync.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/shopsync/config.yaml
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Err(eyre!(
        "No configuration file found. Create one at ~/.config/shopsync/config.yaml"
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("shopsync.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("shopsync").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;
    Self::from_str(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  pub fn from_str(contents: &str) -> Result<Self> {
    let config: Config = serde_yaml::from_str(contents)?;
    Ok(config)
  }

  /// Get the API token from environment variables.
  ///
  /// Checks SHOPSYNC_API_TOKEN first, then SHOP_API_TOKEN as fallback.
  pub fn get_api_token() -> Result<String> {
    std::env::var("SHOPSYNC_API_TOKEN")
      .or_else(|_| std::env::var("SHOP_API_TOKEN"))
      .map_err(|_| {
        eyre!("API token not found. Set SHOPSYNC_API_TOKEN or SHOP_API_TOKEN environment variable.")
      })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_parse_minimal_config() {
    let config = Config::from_str("server:\n  url: http://localhost:4000/api\n").unwrap();
    assert_eq!(config.server.url, "http://localhost:4000/api");
    assert!(config.autosave.enabled);
    assert_eq!(config.autosave.quiet_period(), Duration::from_millis(3000));
  }

  #[test]
  fn test_parse_autosave_overrides() {
    let yaml = "server:\n  url: http://localhost:4000/api\nautosave:\n  enabled: false\n  quiet_period_ms: 500\n";
    let config = Config::from_str(yaml).unwrap();
    assert!(!config.autosave.enabled);
    assert_eq!(config.autosave.quiet_period(), Duration::from_millis(500));
  }
}
