//! The fixed-interval poll loop driving certificate rotation.

use crate::core::{ChangeDetector, LoadedCertificate};
use crate::error::{CertError, Result};
use crate::notify::{Delivery, Prepared};
use crate::sources::CertDir;
use std::time::Duration;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// The outcome of a single [`PollLoop::poll_once`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Polled {
    /// The files have not changed since the last poll.
    Unchanged,
    /// A fresh certificate was handed to the delivery.
    Delivered,
    /// The consumer finished successfully while making room; nothing was read.
    Finished,
}

/// Polls a [`CertDir`] and hands every renewal to a [`Delivery`].
///
/// The loop owns the last observed timestamps; nothing else reads them.
#[derive(Debug)]
pub struct PollLoop {
    source: CertDir,
    interval: Duration,
    detector: ChangeDetector,
}

impl PollLoop {
    /// Create a poll loop.
    ///
    /// `interval` must be non-zero.
    pub fn new(source: CertDir, interval: Duration) -> Self {
        Self {
            source,
            interval,
            detector: ChangeDetector::new(),
        }
    }

    /// The polled directory.
    pub fn source(&self) -> &CertDir {
        &self.source
    }

    /// Run until shutdown, a probe or load failure, or the consumer ending.
    ///
    /// The first poll happens immediately. Whatever `delivery` still has
    /// running is released before this returns.
    ///
    /// # Errors
    ///
    /// Returns the terminal cause unchanged: [`CertError::Shutdown`] when
    /// `shutdown` fires, the probe or load error, or the consumer's error.
    /// `Ok(())` means the consumer finished without error.
    pub async fn run<D: Delivery>(mut self, mut delivery: D, shutdown: CancellationToken) -> Result<()> {
        let outcome = self.drive(&mut delivery, &shutdown).await;
        delivery.shutdown().await;

        match &outcome {
            Ok(()) => info!(source = %self.source.name(), "consumer completed"),
            Err(CertError::Shutdown) => info!(source = %self.source.name(), "shutdown requested"),
            Err(e) => warn!(source = %self.source.name(), error = %e, "certificate watching stopped"),
        }
        outcome
    }

    async fn drive<D: Delivery>(&mut self, delivery: &mut D, shutdown: &CancellationToken) -> Result<()> {
        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                () = shutdown.cancelled() => return Err(CertError::Shutdown),
                finished = delivery.finished() => return finished,
                _ = ticker.tick() => {}
            }
            if self.poll_once(delivery, shutdown).await? == Polled::Finished {
                return Ok(());
            }
        }
    }

    /// Probe once and, if the files changed, hand over a fresh certificate.
    ///
    /// A consumer that ends successfully while being preempted yields
    /// [`Polled::Finished`], and the new files are left unread.
    pub async fn poll_once<D: Delivery>(
        &mut self,
        delivery: &mut D,
        shutdown: &CancellationToken,
    ) -> Result<Polled> {
        let current = self.source.probe()?;
        if !self.detector.observe(current) {
            debug!(source = %self.source.name(), "certificate unchanged");
            return Ok(Polled::Unchanged);
        }

        if delivery.prepare(shutdown).await? == Prepared::Finished {
            return Ok(Polled::Finished);
        }
        if shutdown.is_cancelled() {
            return Err(CertError::Shutdown);
        }

        // Read only after the previous consumer is gone.
        let cert = LoadedCertificate::load(&self.source)?;
        info!(
            source = %self.source.name(),
            chain_len = cert.cert_chain().len(),
            "loaded certificate"
        );
        delivery.deliver(cert, shutdown).await?;
        Ok(Polled::Delivered)
    }
}
