//! Lock-free hot-swap of the current certificate.

use crate::core::{LoadedCertificate, server_config_with};
use crate::error::Result;
use crate::notify::Delivery;
use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use rustls::ServerConfig;
use rustls::server::{ClientHello, ResolvesServerCert};
use rustls::sign::CertifiedKey;
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Shared handle to the most recently loaded certificate.
///
/// Reads are lock-free and never block the poll loop swapping in a renewal.
/// The handle is also a rustls certificate resolver, so a [`ServerConfig`]
/// built once keeps presenting the latest certificate.
///
/// # Examples
///
/// ```rust,no_run
/// use hotswap_tls::core::CertWatcher;
///
/// # async fn example() -> hotswap_tls::error::Result<()> {
/// let (handle, _task) = CertWatcher::builder()
///     .with_dir("/etc/letsencrypt/live/example.com")
///     .build()?
///     .hot_swap()
///     .await?;
///
/// let config = handle.server_config()?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Default)]
pub struct CertificateHandle {
    current: Arc<ArcSwapOption<LoadedCertificate>>,
}

impl CertificateHandle {
    /// Create an empty handle.
    pub fn new() -> Self {
        Self::default()
    }

    /// The current certificate, if one has been loaded.
    pub fn get(&self) -> Option<Arc<LoadedCertificate>> {
        self.current.load_full()
    }

    /// Replace the current certificate.
    pub fn store(&self, cert: LoadedCertificate) {
        self.current.store(Some(Arc::new(cert)));
    }

    /// A TLS server configuration that resolves through this handle.
    ///
    /// # Errors
    ///
    /// Returns an error if the crypto provider rejects the protocol versions.
    pub fn server_config(&self) -> Result<Arc<ServerConfig>> {
        server_config_with(Arc::new(self.clone()))
    }
}

impl fmt::Debug for CertificateHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CertificateHandle")
            .field("current", &self.get())
            .finish()
    }
}

impl ResolvesServerCert for CertificateHandle {
    fn resolve(&self, _client_hello: ClientHello<'_>) -> Option<Arc<CertifiedKey>> {
        self.get().map(|cert| cert.certified_key())
    }
}

/// Stores each new certificate in a [`CertificateHandle`].
pub struct SwapDelivery {
    handle: CertificateHandle,
}

impl SwapDelivery {
    /// Deliver into `handle`.
    pub fn new(handle: CertificateHandle) -> Self {
        Self { handle }
    }
}

#[async_trait]
impl Delivery for SwapDelivery {
    async fn deliver(&mut self, cert: LoadedCertificate, _shutdown: &CancellationToken) -> Result<()> {
        self.handle.store(cert);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::X509KeyPair;

    fn certificate() -> LoadedCertificate {
        let rcgen::CertifiedKey { cert, key_pair } =
            rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
        LoadedCertificate::from_pair(X509KeyPair {
            cert_pem: cert.pem().into_bytes(),
            key_pem: key_pair.serialize_pem().into_bytes(),
        })
        .unwrap()
    }

    #[test]
    fn test_empty_handle() {
        let handle = CertificateHandle::new();
        assert!(handle.get().is_none());
    }

    #[tokio::test]
    async fn test_delivery_swaps() {
        let handle = CertificateHandle::new();
        let mut delivery = SwapDelivery::new(handle.clone());
        let shutdown = CancellationToken::new();

        let first = certificate();
        let first_pem = first.pem().clone();
        delivery.deliver(first, &shutdown).await.unwrap();
        assert_eq!(handle.get().unwrap().pem(), &first_pem);

        let second = certificate();
        let second_pem = second.pem().clone();
        delivery.deliver(second, &shutdown).await.unwrap();
        assert_eq!(handle.get().unwrap().pem(), &second_pem);
    }

    #[test]
    fn test_server_config_from_handle() {
        let handle = CertificateHandle::new();
        handle.store(certificate());
        assert!(handle.server_config().is_ok());
    }
}
