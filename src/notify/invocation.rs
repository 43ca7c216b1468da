//! Single-flight, preemptive consumer invocations.

use crate::core::LoadedCertificate;
use crate::error::{CertError, ConsumerError, Result};
use crate::notify::{Delivery, Prepared};
use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{Instrument, debug, info, info_span, warn};

type Completion = std::result::Result<(), ConsumerError>;

/// One running consumer invocation.
///
/// Dropping it cancels the invocation, so a dropped coordinator never leaves
/// a consumer running unobserved.
struct Invocation {
    generation: u64,
    token: CancellationToken,
    task: JoinHandle<Completion>,
    _guard: DropGuard,
}

/// How a preempted invocation ended.
enum Drained {
    /// It stopped because it was asked to.
    Acknowledged,
    /// It returned `Ok(())`, finishing its work instead of yielding.
    Completed,
    /// It failed for a reason of its own.
    Failed(CertError),
}

/// Runs the consumer for the current certificate, at most once at a time.
///
/// Each delivered certificate starts a fresh invocation of the consumer on
/// its own task, with a token derived from the outer shutdown token. When a
/// renewal arrives, the running invocation is cancelled and awaited before
/// the new certificate is even read, so two invocations never overlap.
///
/// An invocation that returns on its own, with or without an error, ends
/// the poll loop. Only [`ConsumerError::Cancelled`] acknowledges a
/// preemption; `Ok(())` returned while draining still means the consumer
/// is done, and the loop ends with `Ok(())` instead of starting another.
///
/// # Examples
///
/// ```rust,no_run
/// use hotswap_tls::CancellationToken;
/// use hotswap_tls::core::LoadedCertificate;
/// use hotswap_tls::error::ConsumerError;
/// use hotswap_tls::notify::PreemptiveDelivery;
///
/// let delivery = PreemptiveDelivery::new(|token: CancellationToken, cert: LoadedCertificate| async move {
///     let _config = cert.server_config();
///     // accept connections until told to stop
///     token.cancelled().await;
///     Err::<(), _>(ConsumerError::Cancelled)
/// });
/// ```
pub struct PreemptiveDelivery<F> {
    consumer: F,
    current: Option<Invocation>,
    generation: u64,
    drain_timeout: Option<Duration>,
}

impl<F, Fut> PreemptiveDelivery<F>
where
    F: Fn(CancellationToken, LoadedCertificate) -> Fut + Send,
    Fut: Future<Output = Completion> + Send + 'static,
{
    /// Create a coordinator for `consumer`.
    pub fn new(consumer: F) -> Self {
        Self {
            consumer,
            current: None,
            generation: 0,
            drain_timeout: None,
        }
    }

    /// Bound how long a preempted invocation may take to finish.
    ///
    /// When the bound expires the old task is aborted and the coordinator
    /// terminates with [`CertError::DrainTimeout`] rather than start a
    /// replacement next to it.
    pub fn with_drain_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.drain_timeout = timeout;
        self
    }

    /// Whether an invocation is currently live.
    pub fn is_running(&self) -> bool {
        self.current.is_some()
    }

    /// Number of invocations started so far.
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

#[async_trait]
impl<F, Fut> Delivery for PreemptiveDelivery<F>
where
    F: Fn(CancellationToken, LoadedCertificate) -> Fut + Send + Sync,
    Fut: Future<Output = Completion> + Send + 'static,
{
    async fn prepare(&mut self, shutdown: &CancellationToken) -> Result<Prepared> {
        let Some(mut invocation) = self.current.take() else {
            return Ok(Prepared::Ready);
        };

        debug!(generation = invocation.generation, "preempting invocation");
        invocation.token.cancel();
        let completion = settle(&mut invocation, self.drain_timeout).await?;

        match drained(completion) {
            // Outer shutdown wins even over a clean acknowledgement.
            Drained::Acknowledged if shutdown.is_cancelled() => Err(CertError::Shutdown),
            Drained::Acknowledged => {
                debug!(generation = invocation.generation, "invocation released its certificate");
                Ok(Prepared::Ready)
            }
            Drained::Completed => {
                info!(generation = invocation.generation, "invocation returned while being preempted");
                Ok(Prepared::Finished)
            }
            Drained::Failed(e) => Err(e),
        }
    }

    async fn deliver(&mut self, cert: LoadedCertificate, shutdown: &CancellationToken) -> Result<()> {
        self.generation += 1;
        let generation = self.generation;
        let token = shutdown.child_token();

        let run = (self.consumer)(token.clone(), cert);
        let task = tokio::spawn(run.instrument(info_span!("invocation", generation)));
        info!(generation, "started invocation");

        self.current = Some(Invocation {
            generation,
            _guard: token.clone().drop_guard(),
            token,
            task,
        });
        Ok(())
    }

    async fn finished(&mut self) -> Result<()> {
        let Some(invocation) = self.current.as_mut() else {
            return std::future::pending().await;
        };

        let joined = (&mut invocation.task).await;
        let generation = invocation.generation;
        let cancelled = invocation.token.is_cancelled();
        self.current = None;

        match joined.map_err(join_failure)? {
            Ok(()) => {
                info!(generation, "invocation returned");
                Ok(())
            }
            Err(ConsumerError::Cancelled) if cancelled => Err(CertError::Shutdown),
            Err(ConsumerError::Cancelled) => {
                Err(CertError::Consumer(Box::new(ConsumerError::Cancelled)))
            }
            Err(ConsumerError::Failed(e)) => Err(CertError::Consumer(e)),
        }
    }

    async fn shutdown(&mut self) {
        let Some(mut invocation) = self.current.take() else {
            return;
        };

        invocation.token.cancel();
        match settle(&mut invocation, self.drain_timeout).await {
            Ok(Ok(())) | Ok(Err(ConsumerError::Cancelled)) => {
                debug!(generation = invocation.generation, "invocation stopped");
            }
            Ok(Err(e)) => {
                warn!(generation = invocation.generation, error = %e, "invocation failed while stopping");
            }
            Err(e) => {
                warn!(generation = invocation.generation, error = %e, "invocation did not stop cleanly");
            }
        }
    }
}

/// Wait for a cancelled invocation, honoring the drain timeout.
async fn settle(invocation: &mut Invocation, drain_timeout: Option<Duration>) -> Result<Completion> {
    let joined = match drain_timeout {
        Some(limit) => match tokio::time::timeout(limit, &mut invocation.task).await {
            Ok(joined) => joined,
            Err(_) => {
                warn!(
                    generation = invocation.generation,
                    timeout = ?limit,
                    "preempted invocation did not finish, aborting it"
                );
                invocation.task.abort();
                return Err(CertError::DrainTimeout(limit));
            }
        },
        None => (&mut invocation.task).await,
    };
    joined.map_err(join_failure)
}

/// Classify the result of an invocation we cancelled ourselves.
fn drained(completion: Completion) -> Drained {
    match completion {
        Ok(()) => Drained::Completed,
        Err(ConsumerError::Cancelled) => Drained::Acknowledged,
        Err(ConsumerError::Failed(e)) => Drained::Failed(CertError::Consumer(e)),
    }
}

fn join_failure(err: JoinError) -> CertError {
    if err.is_panic() {
        CertError::ConsumerPanicked(err.to_string())
    } else {
        CertError::Consumer(Box::new(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::sources::X509KeyPair;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn certificate() -> LoadedCertificate {
        let rcgen::CertifiedKey { cert, key_pair } =
            rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
        LoadedCertificate::from_pair(X509KeyPair {
            cert_pem: cert.pem().into_bytes(),
            key_pem: key_pair.serialize_pem().into_bytes(),
        })
        .unwrap()
    }

    async fn until_cancelled(token: CancellationToken, _cert: LoadedCertificate) -> Completion {
        token.cancelled().await;
        Err(ConsumerError::Cancelled)
    }

    async fn fails_on_cancel(token: CancellationToken, _cert: LoadedCertificate) -> Completion {
        token.cancelled().await;
        Err(ConsumerError::failed("socket close failed"))
    }

    async fn returns_on_cancel(token: CancellationToken, _cert: LoadedCertificate) -> Completion {
        token.cancelled().await;
        Ok(())
    }

    async fn returns_at_once(_token: CancellationToken, _cert: LoadedCertificate) -> Completion {
        Ok(())
    }

    async fn fails_at_once(_token: CancellationToken, _cert: LoadedCertificate) -> Completion {
        Err(ConsumerError::failed("bind: address in use"))
    }

    async fn panics(_token: CancellationToken, _cert: LoadedCertificate) -> Completion {
        panic!("consumer bug")
    }

    async fn ignores_cancellation(_token: CancellationToken, _cert: LoadedCertificate) -> Completion {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(())
    }

    #[tokio::test]
    async fn test_prepare_when_idle() {
        let mut delivery = PreemptiveDelivery::new(until_cancelled);
        let shutdown = CancellationToken::new();
        assert!(!delivery.is_running());
        assert_eq!(delivery.prepare(&shutdown).await.unwrap(), Prepared::Ready);
    }

    #[tokio::test]
    async fn test_preemption_is_swallowed() {
        let mut delivery = PreemptiveDelivery::new(until_cancelled);
        let shutdown = CancellationToken::new();

        delivery.deliver(certificate(), &shutdown).await.unwrap();
        assert!(delivery.is_running());

        assert_eq!(delivery.prepare(&shutdown).await.unwrap(), Prepared::Ready);
        assert!(!delivery.is_running());

        delivery.deliver(certificate(), &shutdown).await.unwrap();
        assert_eq!(delivery.generation(), 2);
        delivery.shutdown().await;
    }

    #[tokio::test]
    async fn test_consumer_failure_during_drain() {
        let mut delivery = PreemptiveDelivery::new(fails_on_cancel);
        let shutdown = CancellationToken::new();

        delivery.deliver(certificate(), &shutdown).await.unwrap();
        let err = delivery.prepare(&shutdown).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConsumerFailure);
        assert!(err.to_string().contains("socket close failed"));
    }

    #[tokio::test]
    async fn test_success_during_drain_finishes() {
        let mut delivery = PreemptiveDelivery::new(returns_on_cancel);
        let shutdown = CancellationToken::new();

        delivery.deliver(certificate(), &shutdown).await.unwrap();
        assert_eq!(delivery.prepare(&shutdown).await.unwrap(), Prepared::Finished);
        assert!(!delivery.is_running());
        assert_eq!(delivery.generation(), 1);
    }

    #[tokio::test]
    async fn test_outer_shutdown_during_drain() {
        let mut delivery = PreemptiveDelivery::new(until_cancelled);
        let shutdown = CancellationToken::new();

        delivery.deliver(certificate(), &shutdown).await.unwrap();
        shutdown.cancel();
        let err = delivery.prepare(&shutdown).await.unwrap_err();
        assert!(err.is_shutdown());
    }

    #[tokio::test]
    async fn test_natural_completion() {
        let mut delivery = PreemptiveDelivery::new(returns_at_once);
        let shutdown = CancellationToken::new();

        delivery.deliver(certificate(), &shutdown).await.unwrap();
        delivery.finished().await.unwrap();
        assert!(!delivery.is_running());
    }

    #[tokio::test]
    async fn test_natural_failure() {
        let mut delivery = PreemptiveDelivery::new(fails_at_once);
        let shutdown = CancellationToken::new();

        delivery.deliver(certificate(), &shutdown).await.unwrap();
        let err = delivery.finished().await.unwrap_err();
        assert!(matches!(err, CertError::Consumer(_)));
    }

    #[tokio::test]
    async fn test_panic_is_reported() {
        let mut delivery = PreemptiveDelivery::new(panics);
        let shutdown = CancellationToken::new();

        delivery.deliver(certificate(), &shutdown).await.unwrap();
        let err = delivery.finished().await.unwrap_err();
        assert!(matches!(err, CertError::ConsumerPanicked(_)));
    }

    #[tokio::test]
    async fn test_drain_timeout() {
        let mut delivery = PreemptiveDelivery::new(ignores_cancellation)
            .with_drain_timeout(Some(Duration::from_millis(20)));
        let shutdown = CancellationToken::new();

        delivery.deliver(certificate(), &shutdown).await.unwrap();
        let err = delivery.prepare(&shutdown).await.unwrap_err();
        assert!(matches!(err, CertError::DrainTimeout(_)));
        assert!(!delivery.is_running());
    }

    #[tokio::test]
    async fn test_shutdown_waits_for_invocation() {
        let stopped = Arc::new(AtomicUsize::new(0));
        let stopped_clone = Arc::clone(&stopped);
        let mut delivery = PreemptiveDelivery::new(move |token: CancellationToken, _cert| {
            let stopped = Arc::clone(&stopped_clone);
            async move {
                token.cancelled().await;
                tokio::time::sleep(Duration::from_millis(20)).await;
                stopped.fetch_add(1, Ordering::SeqCst);
                Err(ConsumerError::Cancelled)
            }
        });
        let shutdown = CancellationToken::new();

        delivery.deliver(certificate(), &shutdown).await.unwrap();
        delivery.shutdown().await;
        assert_eq!(stopped.load(Ordering::SeqCst), 1);
        assert!(!delivery.is_running());
    }
}
