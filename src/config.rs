use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::retry::RetryPolicy;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  pub backend: BackendConfig,
  /// Custom title for header (defaults to the backend host if not set)
  pub title: Option<String>,
  #[serde(default)]
  pub cache: CacheConfig,
  #[serde(default)]
  pub keepalive: KeepaliveConfig,
  #[serde(default)]
  pub connection: ConnectionConfig,
  #[serde(default)]
  pub retry: RetryConfig,
  #[serde(default)]
  pub report: ReportConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
  pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
  pub duration_secs: u64,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self { duration_secs: 300 }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct KeepaliveConfig {
  /// Ping cadence while the terminal is unfocused
  pub ping_interval_secs: u64,
  pub auth_refresh_interval_secs: u64,
  /// Refresh the session when it expires within this window
  pub refresh_margin_secs: u64,
}

impl Default for KeepaliveConfig {
  fn default() -> Self {
    Self {
      ping_interval_secs: 30,
      auth_refresh_interval_secs: 240,
      refresh_margin_secs: 300,
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
  pub probe_interval_secs: u64,
  pub liveness_path: String,
  pub request_timeout_secs: u64,
}

impl Default for ConnectionConfig {
  fn default() -> Self {
    Self {
      probe_interval_secs: 30,
      liveness_path: "/auth/v1/health".to_string(),
      request_timeout_secs: 10,
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
  pub attempts: u32,
  pub base_delay_ms: u64,
}

impl Default for RetryConfig {
  fn default() -> Self {
    Self {
      attempts: 3,
      base_delay_ms: 1000,
    }
  }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
  /// Overrides the `logo_url` system setting when present
  pub logo_url: Option<String>,
  pub output_dir: Option<PathBuf>,
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./taller.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/taller/config.yaml
  /// 4. ~/.config/taller/config.yaml
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
        "No configuration file found. Create one at ~/.config/taller/config.yaml\n\
                 See config.example.yaml for the format."
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from("taller.yaml");
    if local.exists() {
      return Some(local);
    }

    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("taller").join("config.yaml");
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
    url::Url::parse(&config.backend.url)
      .map_err(|e| eyre!("backend.url is not a valid URL: {}", e))?;
    Ok(config)
  }

  /// Get the backend's public API key from environment variables.
  ///
  /// Checks TALLER_ANON_KEY first, then SUPABASE_ANON_KEY as fallback.
  pub fn get_anon_key() -> Result<String> {
    std::env::var("TALLER_ANON_KEY")
      .or_else(|_| std::env::var("SUPABASE_ANON_KEY"))
      .map_err(|_| {
        eyre!("Backend API key not found. Set TALLER_ANON_KEY or SUPABASE_ANON_KEY environment variable.")
      })
  }

  /// Password for headless commands, from TALLER_PASSWORD.
  pub fn get_password() -> Result<String> {
    std::env::var("TALLER_PASSWORD")
      .map_err(|_| eyre!("Password not found. Set TALLER_PASSWORD environment variable."))
  }

  /// Header title, falling back to the backend host
  pub fn display_title(&self) -> String {
    self.title.clone().unwrap_or_else(|| {
      url::Url::parse(&self.backend.url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_else(|| self.backend.url.clone())
    })
  }

  pub fn cache_duration(&self) -> Duration {
    Duration::from_secs(self.cache.duration_secs)
  }

  pub fn retry_policy(&self) -> RetryPolicy {
    RetryPolicy::new(
      self.retry.attempts,
      Duration::from_millis(self.retry.base_delay_ms),
    )
  }

  pub fn output_dir(&self) -> PathBuf {
    self
      .report
      .output_dir
      .clone()
      .unwrap_or_else(|| PathBuf::from("."))
  }

  #[cfg(test)]
  pub fn for_tests(url: &str) -> Self {
    Self {
      backend: BackendConfig {
        url: url.to_string(),
      },
      title: None,
      cache: CacheConfig::default(),
      keepalive: KeepaliveConfig::default(),
      connection: ConnectionConfig::default(),
      retry: RetryConfig::default(),
      report: ReportConfig::default(),
    }
  }
}
