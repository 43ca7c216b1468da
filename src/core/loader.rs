//! Certificate loading: PEM files in, rustls key material out.

use crate::error::{CertError, Result};
use crate::sources::{CertDir, X509KeyPair};
use rustls::ServerConfig;
use rustls::pki_types::CertificateDer;
use rustls::server::{ClientHello, ResolvesServerCert};
use rustls::sign::CertifiedKey;
use std::fmt;
use std::sync::Arc;
use std::time::SystemTime;

/// A parsed certificate chain plus matching private key.
///
/// Created fresh for every detected change and never mutated afterwards.
/// The raw PEM it was parsed from is kept alongside so it can be forwarded
/// to other processes unchanged.
///
/// # Examples
///
/// ```rust,no_run
/// use hotswap_tls::core::LoadedCertificate;
/// use hotswap_tls::sources::CertDir;
///
/// # fn example() -> hotswap_tls::error::Result<()> {
/// let cert = LoadedCertificate::load(&CertDir::new("/etc/letsencrypt/live/example.com"))?;
/// println!("chain length: {}", cert.cert_chain().len());
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct LoadedCertificate {
    certified: Arc<CertifiedKey>,
    pem: X509KeyPair,
    loaded_at: SystemTime,
}

impl LoadedCertificate {
    /// Read and parse the certificate bundle and key in `source`.
    ///
    /// # Errors
    ///
    /// Returns [`CertError::Read`] if either file is unreadable and
    /// [`CertError::Parse`] if the pair is not a valid certificate with a
    /// matching private key.
    pub fn load(source: &CertDir) -> Result<Self> {
        Self::from_pair(source.read()?)
    }

    /// Parse an in-memory PEM certificate chain and private key.
    pub fn from_pem(cert_pem: impl Into<Vec<u8>>, key_pem: impl Into<Vec<u8>>) -> Result<Self> {
        Self::from_pair(X509KeyPair {
            cert_pem: cert_pem.into(),
            key_pem: key_pem.into(),
        })
    }

    /// Parse a PEM key pair record.
    pub fn from_pair(pem: X509KeyPair) -> Result<Self> {
        let mut reader = pem.cert_pem.as_slice();
        let chain: Vec<CertificateDer<'static>> = rustls_pemfile::certs(&mut reader)
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| CertError::Parse(format!("reading certificate chain: {}", e)))?;
        if chain.is_empty() {
            return Err(CertError::Parse(
                "no certificates found in bundle".to_string(),
            ));
        }

        let mut reader = pem.key_pem.as_slice();
        let key = rustls_pemfile::private_key(&mut reader)
            .map_err(|e| CertError::Parse(format!("reading private key: {}", e)))?
            .ok_or_else(|| CertError::Parse("no private key found".to_string()))?;

        let signing_key = rustls::crypto::ring::sign::any_supported_type(&key)
            .map_err(|e| CertError::Parse(format!("unsupported private key: {}", e)))?;
        let certified = CertifiedKey::new(chain, signing_key);

        // Providers that cannot expose a public key report Unknown; accept those.
        match certified.keys_match() {
            Ok(()) | Err(rustls::Error::InconsistentKeys(rustls::InconsistentKeys::Unknown)) => {}
            Err(e) => {
                return Err(CertError::Parse(format!(
                    "private key does not match certificate: {}",
                    e
                )));
            }
        }

        Ok(Self {
            certified: Arc::new(certified),
            pem,
            loaded_at: SystemTime::now(),
        })
    }

    /// The rustls key material, ready for a handshake.
    pub fn certified_key(&self) -> Arc<CertifiedKey> {
        Arc::clone(&self.certified)
    }

    /// The certificate chain, leaf first.
    pub fn cert_chain(&self) -> &[CertificateDer<'static>] {
        &self.certified.cert
    }

    /// The PEM this certificate was parsed from.
    pub fn pem(&self) -> &X509KeyPair {
        &self.pem
    }

    /// When this certificate was loaded.
    pub fn loaded_at(&self) -> SystemTime {
        self.loaded_at
    }

    /// A TLS server configuration that always presents this certificate.
    ///
    /// # Errors
    ///
    /// Returns an error if the crypto provider rejects the protocol versions.
    pub fn server_config(&self) -> Result<Arc<ServerConfig>> {
        server_config_with(Arc::new(FixedCert(self.certified_key())))
    }
}

impl fmt::Debug for LoadedCertificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadedCertificate")
            .field("chain_len", &self.certified.cert.len())
            .field("loaded_at", &self.loaded_at)
            .finish()
    }
}

/// Build a server configuration around a certificate resolver.
pub(crate) fn server_config_with(
    resolver: Arc<dyn ResolvesServerCert>,
) -> Result<Arc<ServerConfig>> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let config = ServerConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| CertError::Parse(format!("building server config: {}", e)))?
        .with_no_client_auth()
        .with_cert_resolver(resolver);
    Ok(Arc::new(config))
}

#[derive(Debug)]
struct FixedCert(Arc<CertifiedKey>);

impl ResolvesServerCert for FixedCert {
    fn resolve(&self, _client_hello: ClientHello<'_>) -> Option<Arc<CertifiedKey>> {
        Some(Arc::clone(&self.0))
    }
}
