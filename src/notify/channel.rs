//! Plain channel delivery: every new certificate is sent to a receiver.

use crate::core::LoadedCertificate;
use crate::error::{CertError, Result};
use crate::notify::Delivery;
use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Sends each certificate on an `mpsc` channel without managing consumers.
///
/// Useful when the caller wants to reconfigure a listener itself rather than
/// hand off a run loop. A dropped receiver ends the poll loop with
/// [`CertError::ReceiverClosed`].
pub struct ChannelDelivery {
    tx: mpsc::Sender<LoadedCertificate>,
}

impl ChannelDelivery {
    /// Create a delivery and the receiving end of its channel.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<LoadedCertificate>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }
}

#[async_trait]
impl Delivery for ChannelDelivery {
    async fn deliver(&mut self, cert: LoadedCertificate, shutdown: &CancellationToken) -> Result<()> {
        tokio::select! {
            biased;
            () = shutdown.cancelled() => Err(CertError::Shutdown),
            sent = self.tx.send(cert) => sent.map_err(|_| CertError::ReceiverClosed),
        }
    }

    async fn finished(&mut self) -> Result<()> {
        self.tx.closed().await;
        Err(CertError::ReceiverClosed)
    }
}

/// A stream of certificates produced by a background poll loop.
///
/// # Examples
///
/// ```rust,no_run
/// use hotswap_tls::core::CertWatcher;
///
/// # async fn example() -> hotswap_tls::error::Result<()> {
/// let mut stream = CertWatcher::builder()
///     .with_dir("/etc/letsencrypt/live/example.com")
///     .build()?
///     .stream();
///
/// while let Some(cert) = stream.next().await {
///     println!("new certificate, chain length {}", cert.cert_chain().len());
/// }
/// stream.finish().await?;
/// # Ok(())
/// # }
/// ```
pub struct CertificateStream {
    rx: mpsc::Receiver<LoadedCertificate>,
    task: JoinHandle<Result<()>>,
}

impl CertificateStream {
    pub(crate) fn new(rx: mpsc::Receiver<LoadedCertificate>, task: JoinHandle<Result<()>>) -> Self {
        Self { rx, task }
    }

    /// Wait for the next certificate.
    ///
    /// Returns `None` once the poll loop has stopped; call
    /// [`finish`](Self::finish) to learn why.
    pub async fn next(&mut self) -> Option<LoadedCertificate> {
        self.rx.recv().await
    }

    /// Stop receiving and report how the poll loop ended.
    ///
    /// Closing the stream from this side is not an error.
    ///
    /// # Errors
    ///
    /// Returns the probe, load or shutdown error that stopped the loop.
    pub async fn finish(self) -> Result<()> {
        drop(self.rx);
        match self.task.await {
            Ok(Err(CertError::ReceiverClosed)) => Ok(()),
            Ok(outcome) => outcome,
            Err(e) => Err(CertError::TaskFailed(e)),
        }
    }
}
