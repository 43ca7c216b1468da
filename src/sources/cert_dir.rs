//! Directory-based certificate source.

use crate::error::{CertError, Result};
use crate::sources::X509KeyPair;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Name of the certificate bundle inside a [`CertDir`].
pub const CERT_FILE: &str = "fullchain.pem";

/// Name of the private key inside a [`CertDir`].
pub const KEY_FILE: &str = "privkey.pem";

/// A directory holding `fullchain.pem` and `privkey.pem`.
///
/// This is the layout ACME clients such as certbot deposit renewed
/// certificates into.
///
/// # Examples
///
/// ```rust
/// use hotswap_tls::sources::CertDir;
///
/// let source = CertDir::new("/etc/letsencrypt/live/example.com");
/// assert!(source.cert_path().ends_with("fullchain.pem"));
/// assert!(source.key_path().ends_with("privkey.pem"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertDir {
    dir: PathBuf,
}

/// Modification times of the two watched files.
///
/// Only ever compared for equality; it is a fingerprint, not a clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimestampPair {
    /// Modification time of the certificate bundle
    pub cert: SystemTime,
    /// Modification time of the private key
    pub key: SystemTime,
}

impl CertDir {
    /// Create a source for the given directory.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The watched directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Full path of the certificate bundle.
    pub fn cert_path(&self) -> PathBuf {
        self.dir.join(CERT_FILE)
    }

    /// Full path of the private key.
    pub fn key_path(&self) -> PathBuf {
        self.dir.join(KEY_FILE)
    }

    /// Stat both files and return their modification times.
    ///
    /// # Errors
    ///
    /// Returns [`CertError::Probe`] naming the first file that is missing or
    /// unreadable. There is no partial result.
    pub fn probe(&self) -> Result<TimestampPair> {
        Ok(TimestampPair {
            cert: modified(&self.cert_path())?,
            key: modified(&self.key_path())?,
        })
    }

    /// Read the raw PEM contents of both files.
    ///
    /// # Errors
    ///
    /// Returns [`CertError::Read`] naming the file that could not be read.
    pub fn read(&self) -> Result<X509KeyPair> {
        Ok(X509KeyPair {
            cert_pem: read(&self.cert_path())?,
            key_pem: read(&self.key_path())?,
        })
    }

    /// Human-readable name for logging.
    pub fn name(&self) -> String {
        format!("dir:{}", self.dir.display())
    }
}

fn modified(path: &Path) -> Result<SystemTime> {
    std::fs::metadata(path)
        .and_then(|meta| meta.modified())
        .map_err(|source| CertError::Probe {
            path: path.to_path_buf(),
            source,
        })
}

fn read(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).map_err(|source| CertError::Read {
        path: path.to_path_buf(),
        source,
    })
}
