use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
  #[serde(default)]
  pub coordinator: CoordinatorConfig,
  #[serde(default)]
  pub store: StoreConfig,
  #[serde(default)]
  pub http: HttpConfig,
  #[serde(default)]
  pub refresh: RefreshConfig,
}

/// Behavior switches for a coordinator.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CoordinatorConfig {
  /// Attach the last locally observed value to `Loading` and fetch `Error`
  /// emissions instead of `None`
  pub carry_cached_value: bool,
  /// Serialize overlapping fetch cycles on one coordinator
  pub single_flight: bool,
  /// Emit `Error` for local read and persist failures instead of only
  /// reporting them to the resource's hooks
  pub surface_storage_errors: bool,
}

impl Default for CoordinatorConfig {
  fn default() -> Self {
    Self {
      carry_cached_value: false,
      single_flight: true,
      surface_storage_errors: false,
    }
  }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StoreConfig {
  /// Database file (default: $XDG_DATA_HOME/boundres/store.db)
  pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
  pub timeout_secs: u64,
  pub user_agent: String,
}

impl Default for HttpConfig {
  fn default() -> Self {
    Self {
      timeout_secs: 30,
      user_agent: concat!("boundres/", env!("CARGO_PKG_VERSION")).to_string(),
    }
  }
}

impl HttpConfig {
  pub fn timeout(&self) -> Duration {
    Duration::from_secs(self.timeout_secs)
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RefreshConfig {
  /// Stored documents older than this are refetched
  pub max_age_secs: u64,
}

impl Default for RefreshConfig {
  fn default() -> Self {
    Self { max_age_secs: 300 }
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./boundres.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/boundres/config.yaml
  ///
  /// Falls back to defaults when no file is found. `BOUNDRES_DB` overrides the
  /// store path.
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

    let mut config = match path {
      Some(p) => Self::load_from_path(&p)?,
      None => Self::default(),
    };

    if let Ok(db) = std::env::var("BOUNDRES_DB") {
      config.store.path = Some(PathBuf::from(db));
    }

    Ok(config)
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("boundres.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("boundres").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents).map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  fn parse(contents: &str) -> Result<Self> {
    let config: Config = serde_yaml::from_str(contents)?;
    Ok(config)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_defaults() {
    let config = Config::default();
    assert!(config.coordinator.single_flight);
    assert!(!config.coordinator.carry_cached_value);
    assert!(!config.coordinator.surface_storage_errors);
    assert_eq!(config.refresh.max_age_secs, 300);
    assert_eq!(config.http.timeout(), Duration::from_secs(30));
    assert!(config.store.path.is_none());
  }

  #[test]
  fn test_partial_yaml_keeps_defaults() {
    let config = Config::parse(
      r#"
coordinator:
  carry_cached_value: true
refresh:
  max_age_secs: 60
"#,
    )
    .unwrap();

    assert!(config.coordinator.carry_cached_value);
    assert!(config.coordinator.single_flight);
    assert_eq!(config.refresh.max_age_secs, 60);
    assert_eq!(config.http.timeout_secs, 30);
  }

  #[test]
  fn test_full_yaml() {
    let config = Config::parse(
      r#"
coordinator:
  carry_cached_value: false
  single_flight: false
  surface_storage_errors: true
store:
  path: /tmp/boundres.db
http:
  timeout_secs: 5
  user_agent: tester
"#,
    )
    .unwrap();

    assert!(!config.coordinator.single_flight);
    assert!(config.coordinator.surface_storage_errors);
    assert_eq!(config.store.path, Some(PathBuf::from("/tmp/boundres.db")));
    assert_eq!(config.http.user_agent, "tester");
    assert_eq!(config.http.timeout(), Duration::from_secs(5));
  }

  #[test]
  fn test_missing_explicit_path_is_an_error() {
    let err = Config::load(Some(Path::new("/nonexistent/boundres.yaml"))).unwrap_err();
    assert!(err.to_string().contains("Config file not found"));
  }
}
