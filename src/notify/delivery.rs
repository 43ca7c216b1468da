//! The hand-off strategy a poll loop uses for each new certificate.

use crate::core::LoadedCertificate;
use crate::error::Result;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// What [`Delivery::prepare`] found when making room for a new certificate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Prepared {
    /// Nothing is in the way; the new certificate may be read.
    Ready,
    /// The consumer ended successfully while being stopped, so no further
    /// certificate should be handed over.
    Finished,
}

/// How freshly loaded certificates reach their consumer.
///
/// [`PollLoop`](crate::core::PollLoop) calls these in a fixed order on every
/// detected change: [`prepare`](Delivery::prepare), then (after reading the
/// files) [`deliver`](Delivery::deliver). Between ticks it races
/// [`finished`](Delivery::finished) against the timer and the shutdown token.
#[async_trait]
pub trait Delivery: Send {
    /// Make room for a new certificate before it is read from disk.
    ///
    /// An error here ends the poll loop, and so does [`Prepared::Finished`],
    /// with `Ok(())`.
    async fn prepare(&mut self, _shutdown: &CancellationToken) -> Result<Prepared> {
        Ok(Prepared::Ready)
    }

    /// Hand over a newly loaded certificate.
    async fn deliver(&mut self, cert: LoadedCertificate, shutdown: &CancellationToken)
    -> Result<()>;

    /// Resolve when the consumer ends on its own.
    ///
    /// Must be cancel-safe: the poll loop drops this future on every tick.
    /// The default never resolves.
    async fn finished(&mut self) -> Result<()> {
        std::future::pending().await
    }

    /// Release whatever is still running before the poll loop returns.
    async fn shutdown(&mut self) {}
}
