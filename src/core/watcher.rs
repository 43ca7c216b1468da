//! The main watcher handle tying a directory to a delivery strategy.

use crate::core::{CertWatcherBuilder, LoadedCertificate, PollLoop, WatchConfig};
use crate::error::{ConsumerError, Result};
use crate::notify::{
    CertificateHandle, CertificateStream, ChannelDelivery, PreemptiveDelivery, SwapDelivery,
};
use crate::sources::CertDir;
use std::future::Future;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Watches a certificate directory and reacts to renewals.
///
/// A watcher is consumed by one of three ways of running it:
///
/// - [`run`](Self::run) hands each certificate to a consumer, preempting the
///   previous invocation first
/// - [`stream`](Self::stream) yields each certificate on a stream
/// - [`hot_swap`](Self::hot_swap) keeps a shared handle up to date
///
/// # Examples
///
/// ```rust,no_run
/// use hotswap_tls::prelude::*;
///
/// # async fn example() -> Result<()> {
/// let watcher = CertWatcher::builder()
///     .with_dir("/etc/letsencrypt/live/example.com")
///     .build()?;
///
/// watcher
///     .run(|token: CancellationToken, cert: LoadedCertificate| async move {
///         if let Err(e) = cert.server_config() {
///             return Err(ConsumerError::failed(e));
///         }
///         token.cancelled().await;
///         Err::<(), _>(ConsumerError::Cancelled)
///     })
///     .await
/// # }
/// ```
#[derive(Debug)]
pub struct CertWatcher {
    config: WatchConfig,
    shutdown: CancellationToken,
}

impl CertWatcher {
    pub(crate) fn new(config: WatchConfig, shutdown: CancellationToken) -> Self {
        Self { config, shutdown }
    }

    /// Create a new builder.
    pub fn builder() -> CertWatcherBuilder {
        CertWatcherBuilder::new()
    }

    /// The settings this watcher was built with.
    pub fn config(&self) -> &WatchConfig {
        &self.config
    }

    /// The token that stops this watcher when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// The watched directory.
    pub fn source(&self) -> CertDir {
        CertDir::new(&self.config.dir)
    }

    fn poll_loop(&self) -> PollLoop {
        PollLoop::new(self.source(), self.config.interval)
    }

    /// Run `consumer` for each certificate until something stops the watcher.
    ///
    /// The consumer gets a token that is cancelled when a renewal arrives or
    /// the watcher shuts down; it should return promptly once it fires.
    /// Returning [`ConsumerError::Cancelled`] after cancellation lets the next
    /// certificate through. Returning `Ok(())` at any point, even while being
    /// preempted, means the consumer is done and ends the watcher with
    /// `Ok(())`. A failure ends it with that failure.
    ///
    /// # Errors
    ///
    /// - [`CertError::Shutdown`](crate::error::CertError::Shutdown) when the shutdown token fires
    /// - a probe or load error from the directory
    /// - [`CertError::Consumer`](crate::error::CertError::Consumer) when the consumer fails
    ///
    /// `Ok(())` means the consumer finished on its own without error.
    pub async fn run<F, Fut>(self, consumer: F) -> Result<()>
    where
        F: Fn(CancellationToken, LoadedCertificate) -> Fut + Send + Sync,
        Fut: Future<Output = std::result::Result<(), ConsumerError>> + Send + 'static,
    {
        info!(
            dir = %self.config.dir.display(),
            interval = %humantime::format_duration(self.config.interval),
            "watching certificate directory"
        );
        let delivery = PreemptiveDelivery::new(consumer).with_drain_timeout(self.config.drain_timeout);
        self.poll_loop().run(delivery, self.shutdown).await
    }

    /// Poll in the background and yield every new certificate.
    ///
    /// Must be called within a Tokio runtime. The first certificate is
    /// yielded as soon as the directory has been read.
    pub fn stream(self) -> CertificateStream {
        let (delivery, rx) = ChannelDelivery::new(1);
        let task = tokio::spawn(self.poll_loop().run(delivery, self.shutdown));
        CertificateStream::new(rx, task)
    }

    /// Load the current certificate, then keep the returned handle up to
    /// date in the background.
    ///
    /// The handle always holds a certificate once this returns. The returned
    /// task ends when the shutdown token fires or a later poll fails.
    ///
    /// # Errors
    ///
    /// Returns the probe or load error if the directory cannot be read the
    /// first time.
    pub async fn hot_swap(self) -> Result<(CertificateHandle, JoinHandle<Result<()>>)> {
        let handle = CertificateHandle::new();
        let mut delivery = SwapDelivery::new(handle.clone());
        let mut poller = self.poll_loop();

        poller.poll_once(&mut delivery, &self.shutdown).await?;
        let task = tokio::spawn(poller.run(delivery, self.shutdown));
        Ok((handle, task))
    }
}
