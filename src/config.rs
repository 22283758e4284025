use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use url::Url;

use crate::resilience::{RetryPolicy, StalePolicy};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
  pub service: ServiceConfig,
  pub retry: RetryConfig,
  pub snapshot: SnapshotConfig,
  pub signal: SignalConfig,
  pub watch: WatchConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
  pub base_url: String,
  /// Model used for signals, sports analysis and the market snapshot
  pub text_model: String,
  /// Model used for screenshot analysis
  pub vision_model: String,
  /// Per-attempt HTTP timeout
  pub request_timeout_secs: u64,
}

impl Default for ServiceConfig {
  fn default() -> Self {
    Self {
      base_url: "https://generativelanguage.googleapis.com".to_string(),
      text_model: "gemini-3-flash-preview".to_string(),
      vision_model: "gemini-3-pro-preview".to_string(),
      request_timeout_secs: 60,
    }
  }
}

impl ServiceConfig {
  /// Base URL with a trailing slash, so relative joins keep any path prefix.
  pub fn parsed_base_url(&self) -> Result<Url> {
    let mut base = self.base_url.trim().to_string();
    if !base.ends_with('/') {
      base.push('/');
    }
    Url::parse(&base).map_err(|e| eyre!("Invalid service.base_url {}: {}", self.base_url, e))
  }
}

/// Retry constants per call-site
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
  pub signal: RetryPolicy,
  pub sports: RetryPolicy,
  pub snapshot: RetryPolicy,
  pub image: RetryPolicy,
}

impl Default for RetryConfig {
  fn default() -> Self {
    Self {
      signal: RetryPolicy::new(2, 15_000),
      sports: RetryPolicy::default(),
      // Very patient backoff for the global sync
      snapshot: RetryPolicy::new(2, 20_000),
      image: RetryPolicy::default(),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SnapshotConfig {
  pub ttl_ms: i64,
  /// Serve the expired snapshot when a refresh fails instead of erroring
  pub serve_stale_on_error: bool,
}

impl Default for SnapshotConfig {
  fn default() -> Self {
    Self {
      ttl_ms: 600_000,
      serve_stale_on_error: false,
    }
  }
}

impl SnapshotConfig {
  pub fn stale_policy(&self) -> StalePolicy {
    if self.serve_stale_on_error {
      StalePolicy::ServeStale
    } else {
      StalePolicy::Propagate
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SignalConfig {
  /// Minimum time between successful market scans
  pub cooldown_ms: i64,
  pub default_node: String,
  /// Reasoning shown when a scan fails for any reason other than the cooldown
  pub exhausted_reason: String,
}

impl Default for SignalConfig {
  fn default() -> Self {
    Self {
      cooldown_ms: 15_000,
      default_node: "Betway Botswana".to_string(),
      exhausted_reason: "Node connection exhausted. Regional clusters are under heavy load. \
                         Please wait 30 seconds for automatic retry."
        .to_string(),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
  pub signal_interval_secs: u64,
  pub snapshot_interval_secs: u64,
  pub series_interval_secs: u64,
  /// Number of points kept in the synthetic series
  pub series_len: usize,
}

impl Default for WatchConfig {
  fn default() -> Self {
    Self {
      signal_interval_secs: 20,
      snapshot_interval_secs: 60,
      series_interval_secs: 5,
      series_len: 40,
    }
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./bwu.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/bwu/config.yaml
  ///
  /// Without a file the defaults are used.
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

    let config = match path {
      Some(p) => Self::load_from_path(&p)?,
      None => Config::default(),
    };
    config.validate()?;
    Ok(config)
  }

  fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from("bwu.yaml");
    if local.exists() {
      return Some(local);
    }

    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("bwu").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::from_yaml(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  fn from_yaml(contents: &str) -> Result<Self> {
    // An empty file deserializes to null
    if contents.trim().is_empty() {
      return Ok(Config::default());
    }
    Ok(serde_yaml::from_str(contents)?)
  }

  pub fn validate(&self) -> Result<()> {
    self.service.parsed_base_url()?;
    if self.service.request_timeout_secs == 0 {
      return Err(eyre!("service.request_timeout_secs must be positive"));
    }

    let policies = [
      ("signal", &self.retry.signal),
      ("sports", &self.retry.sports),
      ("snapshot", &self.retry.snapshot),
      ("image", &self.retry.image),
    ];
    for (name, policy) in policies {
      if policy.max_attempts < 1 {
        return Err(eyre!("retry.{}.max_attempts must be at least 1", name));
      }
      if policy.base_delay_ms == 0 {
        return Err(eyre!("retry.{}.base_delay_ms must be positive", name));
      }
      if !(policy.rate_limit_multiplier > 1.0 && policy.server_error_multiplier > 1.0) {
        return Err(eyre!("retry.{} multipliers must be greater than 1", name));
      }
    }

    if self.snapshot.ttl_ms <= 0 {
      return Err(eyre!("snapshot.ttl_ms must be positive"));
    }
    if self.signal.cooldown_ms < 0 {
      return Err(eyre!("signal.cooldown_ms must not be negative"));
    }
    if self.signal.exhausted_reason.trim().is_empty() {
      return Err(eyre!("signal.exhausted_reason must not be empty"));
    }

    let w = &self.watch;
    if w.signal_interval_secs == 0 || w.snapshot_interval_secs == 0 || w.series_interval_secs == 0 {
      return Err(eyre!("watch intervals must be positive"));
    }
    if w.series_len == 0 {
      return Err(eyre!("watch.series_len must be positive"));
    }

    Ok(())
  }

  /// Get the completion service API key from environment variables.
  ///
  /// Checks BWU_API_KEY first, then GEMINI_API_KEY and API_KEY as fallbacks.
  pub fn get_api_key() -> Result<String> {
    std::env::var("BWU_API_KEY")
      .or_else(|_| std::env::var("GEMINI_API_KEY"))
      .or_else(|_| std::env::var("API_KEY"))
      .map_err(|_| {
        eyre!("API key not found. Set BWU_API_KEY, GEMINI_API_KEY or API_KEY environment variable.")
      })
  }

  /// Directory for log files.
  pub fn log_dir() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("bwu").join("logs"))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_defaults_match_call_sites() {
    let config = Config::default();
    assert_eq!(config.retry.signal.max_attempts, 2);
    assert_eq!(config.retry.signal.base_delay_ms, 15_000);
    assert_eq!(config.retry.snapshot.base_delay_ms, 20_000);
    assert_eq!(config.retry.sports.max_attempts, 4);
    assert_eq!(config.retry.sports.rate_limit_multiplier, 4.0);
    assert_eq!(config.snapshot.ttl_ms, 600_000);
    assert_eq!(config.signal.cooldown_ms, 15_000);
    assert!(config.validate().is_ok());
  }

  #[test]
  fn test_empty_yaml_is_default() {
    let config = Config::from_yaml("").unwrap();
    assert_eq!(config.signal.default_node, "Betway Botswana");
  }

  #[test]
  fn test_partial_yaml_overrides() {
    let config = Config::from_yaml(
      r#"
service:
  text_model: gemini-2.5-flash
snapshot:
  serve_stale_on_error: true
retry:
  signal:
    max_attempts: 3
    base_delay_ms: 500
watch:
  signal_interval_secs: 45
"#,
    )
    .unwrap();

    assert_eq!(config.service.text_model, "gemini-2.5-flash");
    assert_eq!(config.service.request_timeout_secs, 60);
    assert_eq!(config.snapshot.stale_policy(), StalePolicy::ServeStale);
    assert_eq!(config.retry.signal.max_attempts, 3);
    assert_eq!(config.retry.signal.base_delay_ms, 500);
    assert_eq!(config.retry.signal.rate_limit_multiplier, 4.0);
    assert_eq!(config.watch.signal_interval_secs, 45);
    assert_eq!(config.watch.series_len, 40);
  }

  #[test]
  fn test_validate_rejects_bad_policy() {
    let mut config = Config::default();
    config.retry.sports.max_attempts = 0;
    assert!(config.validate().is_err());

    let mut config = Config::default();
    config.retry.image.rate_limit_multiplier = 1.0;
    assert!(config.validate().is_err());
  }

  #[test]
  fn test_validate_rejects_bad_base_url() {
    let mut config = Config::default();
    config.service.base_url = "not a url".to_string();
    assert!(config.validate().is_err());
  }

  #[test]
  fn test_missing_explicit_path_is_error() {
    let result = Config::load(Some(Path::new("/definitely/not/here/bwu.yaml")));
    assert!(result.is_err());
  }
}
