//! Settings validation support.

use crate::error::ValidationError;

/// Trait for settings validation.
///
/// Checked before a watcher is built, so a bad interval or an empty path is
/// reported up front instead of as a runtime panic or a confusing probe
/// failure.
///
/// # Examples
///
/// ```rust
/// use hotswap_tls::core::{Validate, WatchConfig};
/// use std::time::Duration;
///
/// let mut config = WatchConfig::new("/etc/letsencrypt/live/example.com");
/// assert!(config.validate().is_ok());
///
/// config.interval = Duration::ZERO;
/// assert!(config.validate().is_err());
/// ```
pub trait Validate {
    /// Validate the settings.
    ///
    /// # Errors
    ///
    /// Should return a `ValidationError` describing what validation failed.
    fn validate(&self) -> Result<(), ValidationError>;
}
