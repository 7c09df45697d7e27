//! TOML configuration for the NetMedic daemon.
//!
//! Layered model with compiled-in defaults, an environment variable
//! override for the config file path, and a standard filesystem location.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::detect::DetectorSettings;
use crate::heal::ResolverSettings;
use crate::monitor::MonitorSettings;

/// Root configuration for the daemon.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NetmedicConfig {
    pub monitor: MonitorSettings,
    pub detector: DetectorSettings,
    pub healing: HealingConfig,
    pub store: StoreConfig,
    pub logging: LoggingConfig,
}

impl NetmedicConfig {
    /// Load configuration from a TOML file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;
        info!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    /// Try to load configuration from, in order:
    /// 1. The path in the `NETMEDIC_CONFIG` environment variable.
    /// 2. `/etc/netmedic/netmedic.toml`.
    /// 3. Compiled-in defaults.
    pub fn load_or_default() -> Self {
        if let Ok(env_path) = std::env::var("NETMEDIC_CONFIG") {
            let path = Path::new(&env_path);
            match Self::load(path) {
                Ok(cfg) => return cfg,
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        error = %e,
                        "NETMEDIC_CONFIG set but file could not be loaded, trying fallback"
                    );
                }
            }
        }

        let system_path = Path::new("/etc/netmedic/netmedic.toml");
        if system_path.exists() {
            match Self::load(system_path) {
                Ok(cfg) => return cfg,
                Err(e) => {
                    warn!(
                        path = %system_path.display(),
                        error = %e,
                        "system config file exists but could not be loaded, using defaults"
                    );
                }
            }
        }

        debug!("no config file found, using compiled-in defaults");
        Self::default()
    }
}

/// Resolution engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealingConfig {
    /// Period of the pending-issue retry sweep (seconds).
    pub sweep_interval_sec: u64,
    /// Minimum issue age before a pending issue is retried (seconds).
    pub retry_grace_sec: u64,
    /// Effectiveness boost applied to operator-triggered resolutions.
    pub manual_boost: f64,
    /// Effectiveness above this resolves an issue; at or below stays pending.
    pub resolve_threshold: f64,
    /// Stop a command batch at the first failing command.
    pub fatal_on_first_failure: bool,
    /// Simulate remediation commands instead of executing them.
    pub simulate_commands: bool,
}

impl Default for HealingConfig {
    fn default() -> Self {
        Self {
            sweep_interval_sec: 60,
            retry_grace_sec: 300,
            manual_boost: 0.15,
            resolve_threshold: 0.7,
            fatal_on_first_failure: false,
            simulate_commands: true,
        }
    }
}

impl HealingConfig {
    pub fn resolver_settings(&self) -> ResolverSettings {
        ResolverSettings {
            sweep_interval: Duration::from_secs(self.sweep_interval_sec.max(1)),
            retry_grace: Duration::from_secs(self.retry_grace_sec),
            fatal_on_first_failure: self.fatal_on_first_failure,
        }
    }
}

/// Durable state location.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub data_dir: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data/healing"),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Minimum tracing level (`trace`, `debug`, `info`, `warn`, `error`).
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_sane() {
        let cfg = NetmedicConfig::default();

        assert_eq!(cfg.monitor.interval_sec, 5);
        assert_eq!(cfg.monitor.probe_target, "8.8.8.8:53");

        assert_eq!(cfg.detector.warmup_size, 50);
        assert_eq!(cfg.detector.retrain_interval, 500);
        assert_eq!(cfg.detector.window_size, 1000);
        assert_eq!(cfg.detector.z_threshold, 3.0);
        assert_eq!(cfg.detector.latency_threshold_ms, 200.0);
        assert_eq!(cfg.detector.packet_loss_threshold_pct, 10.0);

        assert_eq!(cfg.healing.sweep_interval_sec, 60);
        assert_eq!(cfg.healing.retry_grace_sec, 300);
        assert!(!cfg.healing.fatal_on_first_failure);
        assert!(cfg.healing.simulate_commands);

        assert_eq!(cfg.store.data_dir, PathBuf::from("data/healing"));
        assert_eq!(cfg.logging.level, "info");
    }

    #[test]
    fn test_parse_example_toml() {
        let toml_str = r#"
[monitor]
interval_sec = 10
probe_target = "1.1.1.1:443"

[detector]
warmup_size = 30
z_threshold = 2.5

[healing]
sweep_interval_sec = 15
retry_grace_sec = 60
simulate_commands = false

[store]
data_dir = "/var/lib/netmedic"

[logging]
level = "debug"
"#;

        let cfg: NetmedicConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(cfg.monitor.interval_sec, 10);
        assert_eq!(cfg.monitor.probe_target, "1.1.1.1:443");
        assert_eq!(cfg.detector.warmup_size, 30);
        assert_eq!(cfg.detector.z_threshold, 2.5);
        assert_eq!(cfg.healing.sweep_interval_sec, 15);
        assert!(!cfg.healing.simulate_commands);
        assert_eq!(cfg.store.data_dir, PathBuf::from("/var/lib/netmedic"));
        assert_eq!(cfg.logging.level, "debug");
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let cfg: NetmedicConfig = toml::from_str("[monitor]\ninterval_sec = 30\n").unwrap();
        assert_eq!(cfg.monitor.interval_sec, 30);
        assert_eq!(cfg.monitor.probe_target, "8.8.8.8:53");
        assert_eq!(cfg.healing.retry_grace_sec, 300);
    }

    #[test]
    fn test_empty_toml_uses_all_defaults() {
        let cfg: NetmedicConfig = toml::from_str("").unwrap();
        let defaults = NetmedicConfig::default();
        assert_eq!(cfg.monitor.interval_sec, defaults.monitor.interval_sec);
        assert_eq!(cfg.detector.warmup_size, defaults.detector.warmup_size);
        assert_eq!(cfg.store.data_dir, defaults.store.data_dir);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("netmedic.toml");
        std::fs::write(&path, "[healing]\nsweep_interval_sec = 5\n").unwrap();

        let cfg = NetmedicConfig::load(&path).unwrap();
        assert_eq!(cfg.healing.sweep_interval_sec, 5);
    }

    #[test]
    fn test_load_missing_file_errors() {
        assert!(NetmedicConfig::load(Path::new("/nonexistent/netmedic.toml")).is_err());
    }

    #[test]
    fn test_serialization_roundtrip() {
        let cfg = NetmedicConfig::default();
        let toml_str = toml::to_string_pretty(&cfg).unwrap();
        let roundtripped: NetmedicConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(cfg.monitor.interval_sec, roundtripped.monitor.interval_sec);
        assert_eq!(
            cfg.healing.resolve_threshold,
            roundtripped.healing.resolve_threshold
        );
        assert_eq!(cfg.store.data_dir, roundtripped.store.data_dir);
    }

    #[test]
    fn test_resolver_settings_conversion() {
        let healing = HealingConfig {
            sweep_interval_sec: 0,
            retry_grace_sec: 10,
            ..Default::default()
        };
        let settings = healing.resolver_settings();
        // Zero sweep interval is clamped to one second.
        assert_eq!(settings.sweep_interval, Duration::from_secs(1));
        assert_eq!(settings.retry_grace, Duration::from_secs(10));
    }
}
