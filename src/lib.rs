//! # hotswap-tls
//!
//! Zero-downtime TLS certificate rotation from a watched directory.
//!
//! ## Overview
//!
//! An ACME client (or anything else) drops renewed `fullchain.pem` and
//! `privkey.pem` files into a directory. `hotswap-tls` polls their
//! modification times and, when either changes, hands the new certificate to
//! your code:
//! - Preemptive consumer invocations: the server holding the old certificate
//!   is cancelled and awaited before the new one starts, never overlapping
//! - A plain certificate stream for callers that reconfigure themselves
//! - A lock-free hot-swap handle usable directly as a rustls certificate resolver
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use hotswap_tls::prelude::*;
//!
//! # async fn serve(_config: std::sync::Arc<rustls::ServerConfig>, _stop: CancellationToken) {}
//! # async fn example() -> Result<()> {
//! let shutdown = CancellationToken::new();
//!
//! let outcome = CertWatcher::builder()
//!     .with_dir("/etc/letsencrypt/live/example.com")
//!     .with_interval(std::time::Duration::from_secs(15 * 60))
//!     .with_shutdown(shutdown.clone())
//!     .build()?
//!     .run(|token: CancellationToken, cert: LoadedCertificate| async move {
//!         let config = match cert.server_config() {
//!             Ok(config) => config,
//!             Err(e) => return Err(ConsumerError::failed(e)),
//!         };
//!         // serve until a renewal or shutdown cancels the token
//!         serve(config, token).await;
//!         Err::<(), _>(ConsumerError::Cancelled)
//!     })
//!     .await;
//!
//! match outcome {
//!     Err(e) if e.is_shutdown() => Ok(()),
//!     other => other,
//! }
//! # }
//! ```
//!
//! ## Features
//!
//! - **Single-flight**: at most one consumer invocation runs at any time
//! - **Preemption**: a renewal cancels the running invocation and waits for it
//! - **Clean shutdown**: no invocation outlives the watcher
//! - **Lock-free reads**: the hot-swap handle uses `arc-swap`
//! - **Layered settings**: defaults, a TOML/YAML/JSON file and `CERTDIR_*` variables
//!
//! ## Feature Flags
//!
//! - `command` (default): [`sources::CommandSource`], certificates from a subprocess
//! - `cli` (default): the `certdir` binary

#![warn(missing_docs, rust_2024_compatibility)]
#![deny(unsafe_code)]

pub mod core;
pub mod error;
pub mod notify;
pub mod sources;

pub use tokio_util::sync::CancellationToken;

/// Convenient re-exports for common usage patterns.
pub mod prelude {
    pub use crate::CancellationToken;
    pub use crate::core::{CertWatcher, CertWatcherBuilder, LoadedCertificate, Validate, WatchConfig};
    pub use crate::error::{CertError, ConsumerError, ErrorKind, Result, ValidationError};
    pub use crate::notify::{CertificateHandle, CertificateStream};
}
