use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::retry::RetryPolicy;

/// Retry policy parameters (`[retry]` in config.toml).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum number of attempts per call (including the first).
    pub max_attempts: u32,
    /// Delay before the first retry, in seconds (e.g. 0.25 = 250ms).
    pub initial_interval_secs: f64,
    /// Growth factor between consecutive retries.
    pub multiplier: f64,
    /// Jitter as a fraction of each interval (0.1 = ±10%).
    pub randomization_factor: f64,
    /// Maximum single backoff delay in seconds.
    pub max_interval_secs: u64,
    /// Give up retrying after this many seconds (0 = no limit).
    pub max_elapsed_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 15,
            initial_interval_secs: 1.0,
            multiplier: 2.0,
            randomization_factor: 0.1,
            max_interval_secs: 60,
            max_elapsed_secs: 15 * 60,
        }
    }
}

impl RetryConfig {
    /// Reject values TOML accepts but a backoff cannot use (`nan`, `inf`, negatives).
    pub fn validate(&self) -> Result<()> {
        let fields = [
            ("initial_interval_secs", self.initial_interval_secs),
            ("multiplier", self.multiplier),
            ("randomization_factor", self.randomization_factor),
        ];
        for (name, value) in fields {
            if !value.is_finite() || value < 0.0 {
                anyhow::bail!("retry.{} must be a finite non-negative number, got {}", name, value);
            }
        }
        if Duration::try_from_secs_f64(self.initial_interval_secs).is_err() {
            anyhow::bail!(
                "retry.initial_interval_secs is out of range: {}",
                self.initial_interval_secs
            );
        }
        Ok(())
    }

    /// Out-of-range values fall back to the defaults; see [`RetryConfig::validate`].
    pub fn to_policy(&self) -> RetryPolicy {
        let defaults = RetryPolicy::default();
        let finite_or = |value: f64, fallback: f64| if value.is_finite() { value } else { fallback };
        RetryPolicy {
            max_attempts: self.max_attempts.max(1),
            initial_interval: Duration::try_from_secs_f64(self.initial_interval_secs.max(0.0))
                .unwrap_or(defaults.initial_interval),
            multiplier: finite_or(self.multiplier, defaults.multiplier).max(1.0),
            randomization_factor: finite_or(
                self.randomization_factor,
                defaults.randomization_factor,
            )
            .clamp(0.0, 1.0),
            max_interval: Duration::from_secs(self.max_interval_secs),
            max_elapsed_time: match self.max_elapsed_secs {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            },
        }
    }
}

/// Transport settings for the default curl transport (`[transport]`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Total time allowed for one request, in seconds.
    pub timeout_secs: u64,
    /// Time allowed to establish the connection, in seconds.
    pub connect_timeout_secs: u64,
    /// `User-Agent` sent unless the caller supplies one.
    pub user_agent: String,
    /// Follow 3xx redirects.
    pub follow_redirects: bool,
    /// Maximum redirects followed per request.
    pub max_redirections: u32,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 60,
            connect_timeout_secs: 15,
            user_agent: concat!("callapi/", env!("CARGO_PKG_VERSION")).to_string(),
            follow_redirects: true,
            max_redirections: 10,
        }
    }
}

/// Global configuration loaded from `~/.config/callapi/config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CallConfig {
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub transport: TransportConfig,
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("callapi")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<CallConfig> {
    let path = config_path()?;
    load_or_init_at(&path)
}

/// Like [`load_or_init`] but for an explicit path.
pub fn load_or_init_at(path: &Path) -> Result<CallConfig> {
    if !path.exists() {
        let default_cfg = CallConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, toml).with_context(|| format!("writing {}", path.display()))?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let cfg: CallConfig =
        toml::from_str(&data).with_context(|| format!("parsing {}", path.display()))?;
    cfg.retry
        .validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(cfg)
}
