//! Watcher settings and their layered loading.

use crate::core::Validate;
use crate::error::{CertError, Result, ValidationError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default polling interval.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Default environment variable prefix, e.g. `CERTDIR_INTERVAL=30m`.
pub const ENV_PREFIX: &str = "CERTDIR";

/// Settings for watching a certificate directory.
///
/// Durations are written the humantime way (`"1h"`, `"90s"`, `"5m 30s"`).
///
/// ```toml
/// dir = "/etc/letsencrypt/live/example.com"
/// interval = "15m"
/// drain_timeout = "30s"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Directory containing `fullchain.pem` and `privkey.pem`
    pub dir: PathBuf,

    /// How often the directory is polled
    #[serde(with = "duration_str", default = "default_interval")]
    pub interval: Duration,

    /// Upper bound on waiting for a preempted consumer; unbounded if unset
    #[serde(with = "optional_duration_str", default)]
    pub drain_timeout: Option<Duration>,
}

fn default_interval() -> Duration {
    DEFAULT_INTERVAL
}

/// Values that take precedence over every other settings layer.
///
/// Typically filled from command-line arguments. Unset fields leave the
/// lower layers alone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SettingsOverrides {
    /// Replaces `dir`
    pub dir: Option<PathBuf>,
    /// Replaces `interval`
    pub interval: Option<Duration>,
}

impl WatchConfig {
    /// Settings for `dir` with default interval and no drain bound.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            interval: DEFAULT_INTERVAL,
            drain_timeout: None,
        }
    }

    /// Load settings from an optional file and `CERTDIR_*` environment variables.
    ///
    /// See [`load_with_prefix`](Self::load_with_prefix).
    pub fn load(file: Option<&Path>) -> Result<Self> {
        Self::load_with_prefix(file, ENV_PREFIX)
    }

    /// Load settings with standard precedence: defaults, then the file, then
    /// environment variables named `{prefix}_DIR`, `{prefix}_INTERVAL` and
    /// `{prefix}_DRAIN_TIMEOUT`.
    ///
    /// The file format is detected from its extension (`.toml`, `.yaml`,
    /// `.yml`, `.json`).
    ///
    /// # Errors
    ///
    /// Returns [`CertError::Config`] if the file is missing or malformed or no
    /// directory is configured, and [`CertError::Validation`] if the values
    /// are out of range.
    pub fn load_with_prefix(file: Option<&Path>, prefix: &str) -> Result<Self> {
        Self::load_layered(file, prefix, &SettingsOverrides::default())
    }

    /// Like [`load_with_prefix`](Self::load_with_prefix), with `overrides`
    /// applied last.
    ///
    /// The file and the environment need not name a directory when
    /// `overrides.dir` is set.
    ///
    /// # Errors
    ///
    /// As for [`load_with_prefix`](Self::load_with_prefix).
    pub fn load_layered(
        file: Option<&Path>,
        prefix: &str,
        overrides: &SettingsOverrides,
    ) -> Result<Self> {
        let mut builder = config::Config::builder()
            .set_default("interval", humantime::format_duration(DEFAULT_INTERVAL).to_string())
            .map_err(|e| CertError::Config(format!("Failed to set defaults: {}", e)))?;

        if let Some(path) = file {
            if !path.exists() {
                return Err(CertError::Config(format!(
                    "Settings file not found: {}",
                    path.display()
                )));
            }
            builder = builder.add_source(config::File::from(path.to_path_buf()).required(true));
        }
        builder = builder.add_source(config::Environment::with_prefix(prefix));

        if let Some(dir) = &overrides.dir {
            builder = builder
                .set_override("dir", dir.to_string_lossy().into_owned())
                .map_err(|e| CertError::Config(format!("Failed to override dir: {}", e)))?;
        }
        if let Some(interval) = overrides.interval {
            builder = builder
                .set_override("interval", humantime::format_duration(interval).to_string())
                .map_err(|e| CertError::Config(format!("Failed to override interval: {}", e)))?;
        }

        let settings = builder
            .build()
            .map_err(|e| CertError::Config(format!("Failed to build settings: {}", e)))?;
        let config: Self = settings
            .try_deserialize()
            .map_err(|e| CertError::Config(format!("Failed to deserialize settings: {}", e)))?;

        config.validate()?;
        Ok(config)
    }
}

impl Validate for WatchConfig {
    fn validate(&self) -> std::result::Result<(), ValidationError> {
        if self.dir.as_os_str().is_empty() {
            return Err(ValidationError::invalid_field("dir", "must not be empty"));
        }
        if self.interval.is_zero() {
            return Err(ValidationError::invalid_field(
                "interval",
                "must be greater than zero",
            ));
        }
        if self.drain_timeout.is_some_and(|timeout| timeout.is_zero()) {
            return Err(ValidationError::invalid_field(
                "drain_timeout",
                "must be greater than zero when set",
            ));
        }
        Ok(())
    }
}

mod duration_str {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}

mod optional_duration_str {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(
        duration: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match duration {
            Some(duration) => {
                serializer.serialize_some(&humantime::format_duration(*duration).to_string())
            }
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        Option::<String>::deserialize(deserializer)?
            .map(|s| humantime::parse_duration(&s).map_err(serde::de::Error::custom))
            .transpose()
    }
}

#[cfg(test)]
#[allow(unsafe_code)] // For env var manipulation in tests
mod tests {
    use super::*;
    use std::env;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = WatchConfig::new("/certs");
        assert_eq!(config.interval, DEFAULT_INTERVAL);
        assert_eq!(config.drain_timeout, None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation() {
        let mut config = WatchConfig::new("");
        assert!(config.validate().is_err());

        config.dir = PathBuf::from("/certs");
        config.drain_timeout = Some(Duration::ZERO);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("drain_timeout"));
    }

    #[test]
    fn test_load_toml_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("certdir.toml");
        fs::write(
            &path,
            r#"
dir = "/etc/letsencrypt/live/example.com"
interval = "15m"
drain_timeout = "30s"
"#,
        )
        .unwrap();

        let config = WatchConfig::load_with_prefix(Some(&path), "TEST_HOTSWAP_TLS_TOML").unwrap();
        assert_eq!(config.dir, PathBuf::from("/etc/letsencrypt/live/example.com"));
        assert_eq!(config.interval, Duration::from_secs(15 * 60));
        assert_eq!(config.drain_timeout, Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_load_yaml_uses_default_interval() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("certdir.yaml");
        fs::write(&path, "dir: /certs\n").unwrap();

        let config = WatchConfig::load_with_prefix(Some(&path), "TEST_HOTSWAP_TLS_YAML").unwrap();
        assert_eq!(config.interval, DEFAULT_INTERVAL);
    }

    #[test]
    fn test_env_overrides_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("certdir.toml");
        fs::write(&path, "dir = \"/certs\"\ninterval = \"1h\"\n").unwrap();

        unsafe {
            env::set_var("TEST_HOTSWAP_TLS_ENV_INTERVAL", "90s");
        }
        let config = WatchConfig::load_with_prefix(Some(&path), "TEST_HOTSWAP_TLS_ENV").unwrap();
        unsafe {
            env::remove_var("TEST_HOTSWAP_TLS_ENV_INTERVAL");
        }

        assert_eq!(config.interval, Duration::from_secs(90));
    }

    #[test]
    fn test_override_supplies_missing_dir() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("certdir.toml");
        fs::write(&path, "interval = \"10m\"\ndrain_timeout = \"5s\"\n").unwrap();

        let overrides = SettingsOverrides {
            dir: Some(PathBuf::from("/srv/certs")),
            interval: None,
        };
        let config =
            WatchConfig::load_layered(Some(&path), "TEST_HOTSWAP_TLS_NODIR_FILE", &overrides).unwrap();
        assert_eq!(config.dir, PathBuf::from("/srv/certs"));
        assert_eq!(config.interval, Duration::from_secs(600));
        assert_eq!(config.drain_timeout, Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_overrides_beat_env_and_keep_the_rest() {
        unsafe {
            env::set_var("TEST_HOTSWAP_TLS_OVR_DIR", "/from/env");
            env::set_var("TEST_HOTSWAP_TLS_OVR_INTERVAL", "2m");
            env::set_var("TEST_HOTSWAP_TLS_OVR_DRAIN_TIMEOUT", "7s");
        }
        let overrides = SettingsOverrides {
            dir: Some(PathBuf::from("/from/args")),
            interval: None,
        };
        let config = WatchConfig::load_layered(None, "TEST_HOTSWAP_TLS_OVR", &overrides);
        unsafe {
            env::remove_var("TEST_HOTSWAP_TLS_OVR_DIR");
            env::remove_var("TEST_HOTSWAP_TLS_OVR_INTERVAL");
            env::remove_var("TEST_HOTSWAP_TLS_OVR_DRAIN_TIMEOUT");
        }

        let config = config.unwrap();
        assert_eq!(config.dir, PathBuf::from("/from/args"));
        assert_eq!(config.interval, Duration::from_secs(120));
        assert_eq!(config.drain_timeout, Some(Duration::from_secs(7)));
    }

    #[test]
    fn test_interval_override() {
        let overrides = SettingsOverrides {
            dir: Some(PathBuf::from("/certs")),
            interval: Some(Duration::from_secs(45)),
        };
        let config = WatchConfig::load_layered(None, "TEST_HOTSWAP_TLS_IVL", &overrides).unwrap();
        assert_eq!(config.interval, Duration::from_secs(45));
    }

    #[test]
    fn test_missing_file() {
        let err = WatchConfig::load_with_prefix(
            Some(Path::new("/nonexistent/certdir.toml")),
            "TEST_HOTSWAP_TLS_MISSING",
        )
        .unwrap_err();
        assert!(matches!(err, CertError::Config(_)));
    }

    #[test]
    fn test_missing_dir() {
        let err = WatchConfig::load_with_prefix(None, "TEST_HOTSWAP_TLS_NODIR").unwrap_err();
        assert!(matches!(err, CertError::Config(_)));
    }

    #[test]
    fn test_bad_duration() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("certdir.json");
        fs::write(&path, r#"{"dir": "/certs", "interval": "soon"}"#).unwrap();

        let err = WatchConfig::load_with_prefix(Some(&path), "TEST_HOTSWAP_TLS_BAD").unwrap_err();
        assert!(matches!(err, CertError::Config(_)));
    }

    #[test]
    fn test_serialize_roundtrip_format() {
        let config = WatchConfig {
            dir: PathBuf::from("/certs"),
            interval: Duration::from_secs(90),
            drain_timeout: None,
        };
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["interval"], "1m 30s");
        assert!(json["drain_timeout"].is_null());
    }
}
