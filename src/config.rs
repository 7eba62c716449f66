use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  pub api: ApiConfig,
  #[serde(default)]
  pub cache: CacheConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
  /// Root URL every endpoint path is resolved against.
  pub url: String,
  /// Default per-call timeout in milliseconds.
  #[serde(default = "default_timeout_ms")]
  pub timeout_ms: u64,
}

fn default_timeout_ms() -> u64 {
  5000
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CacheConfig {
  /// Override for the durable cache database location.
  /// Defaults to the platform data directory when unset.
  pub database: Option<PathBuf>,
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./larder.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/larder/config.yaml
  /// 4. ~/.config/larder/config.yaml
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
        "No configuration file found. Create one at ~/.config/larder/config.yaml"
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("larder.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("larder").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    let config: Config = serde_yaml::from_str(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))?;

    Ok(config)
  }

  /// Get the API bearer token from environment variables.
  ///
  /// Checks LARDER_API_TOKEN first, then API_TOKEN as fallback.
  /// Calls are sent unauthenticated when neither is set.
  pub fn get_api_token() -> Option<String> {
    std::env::var("LARDER_API_TOKEN")
      .or_else(|_| std::env::var("API_TOKEN"))
      .ok()
      .filter(|t| !t.is_empty())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_parse_minimal_config() {
    let yaml = "api:\n  url: https://api.larder.example\n";
    let config: Config = serde_yaml::from_str(yaml).unwrap();
    assert_eq!(config.api.url, "https://api.larder.example");
    assert_eq!(config.api.timeout_ms, 5000);
    assert!(config.cache.database.is_none());
  }

  #[test]
  fn test_parse_full_config() {
    let yaml = "api:\n  url: https://api.larder.example\n  timeout_ms: 2500\ncache:\n  database: /tmp/larder-cache.db\n";
    let config: Config = serde_yaml::from_str(yaml).unwrap();
    assert_eq!(config.api.timeout_ms, 2500);
    assert_eq!(
      config.cache.database.as_deref(),
      Some(Path::new("/tmp/larder-cache.db"))
    );
  }
}
