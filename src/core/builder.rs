//! Builder for constructing CertWatcher instances.

use crate::core::{CertWatcher, DEFAULT_INTERVAL, ENV_PREFIX, SettingsOverrides, Validate, WatchConfig};
use crate::error::{CertError, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Builder for constructing a `CertWatcher`.
///
/// Explicit `with_*` calls override values taken from [`with_config`](Self::with_config)
/// or [`with_settings_file`](Self::with_settings_file), whichever order they
/// are made in.
///
/// # Examples
///
/// ```rust
/// use hotswap_tls::core::CertWatcher;
/// use std::time::Duration;
///
/// # fn example() -> hotswap_tls::error::Result<()> {
/// let watcher = CertWatcher::builder()
///     .with_dir("/etc/letsencrypt/live/example.com")
///     .with_interval(Duration::from_secs(15 * 60))
///     .build()?;
/// assert_eq!(watcher.config().interval, Duration::from_secs(900));
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct CertWatcherBuilder {
    base: Option<WatchConfig>,
    settings_file: Option<PathBuf>,
    dir: Option<PathBuf>,
    interval: Option<Duration>,
    drain_timeout: Option<Duration>,
    shutdown: Option<CancellationToken>,
}

impl CertWatcherBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Directory holding `fullchain.pem` and `privkey.pem`.
    pub fn with_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dir = Some(dir.into());
        self
    }

    /// Polling interval. Defaults to one hour.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = Some(interval);
        self
    }

    /// Bound the wait for a preempted consumer to stop.
    ///
    /// Unbounded by default. When the bound is hit the old invocation is
    /// aborted and watching stops with [`CertError::DrainTimeout`].
    pub fn with_drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = Some(timeout);
        self
    }

    /// Token whose cancellation stops the watcher.
    ///
    /// A fresh token is created if none is given; fetch it back with
    /// [`CertWatcher::shutdown_token`].
    pub fn with_shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown = Some(token);
        self
    }

    /// Start from already loaded settings.
    pub fn with_config(mut self, config: WatchConfig) -> Self {
        self.base = Some(config);
        self
    }

    /// Start from a settings file layered with `CERTDIR_*` environment
    /// variables, loaded at [`build`](Self::build).
    pub fn with_settings_file(mut self, path: impl AsRef<Path>) -> Self {
        self.settings_file = Some(path.as_ref().to_path_buf());
        self
    }

    /// Build the watcher.
    ///
    /// Nothing is touched on disk besides the settings file; the certificate
    /// directory is first probed when the watcher runs.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - No directory was given
    /// - The settings file fails to load
    /// - Validation fails
    pub fn build(self) -> Result<CertWatcher> {
        let base = match (self.base, &self.settings_file) {
            (Some(config), _) => Some(config),
            (None, Some(path)) => {
                let overrides = SettingsOverrides {
                    dir: self.dir.clone(),
                    interval: self.interval,
                };
                Some(WatchConfig::load_layered(Some(path), ENV_PREFIX, &overrides)?)
            }
            (None, None) => None,
        };

        let dir = self
            .dir
            .or_else(|| base.as_ref().map(|config| config.dir.clone()))
            .ok_or_else(|| CertError::Config("no certificate directory given".to_string()))?;

        let config = WatchConfig {
            dir,
            interval: self
                .interval
                .or_else(|| base.as_ref().map(|config| config.interval))
                .unwrap_or(DEFAULT_INTERVAL),
            drain_timeout: self
                .drain_timeout
                .or_else(|| base.as_ref().and_then(|config| config.drain_timeout)),
        };
        config.validate()?;

        Ok(CertWatcher::new(
            config,
            self.shutdown.unwrap_or_default(),
        ))
    }
}
