//! PEM key pair record used to move certificates between processes.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A PEM-encoded certificate chain and private key.
///
/// Serialized as `{"CertPEMBlock": "<base64>", "KeyPEMBlock": "<base64>"}`,
/// which is what the `certdir` binary prints and what
/// [`CommandSource`](crate::sources::CommandSource) expects to read.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct X509KeyPair {
    /// The certificate chain, PEM-encoded
    #[serde(rename = "CertPEMBlock", with = "base64_bytes")]
    pub cert_pem: Vec<u8>,
    /// The private key, PEM-encoded
    #[serde(rename = "KeyPEMBlock", with = "base64_bytes")]
    pub key_pem: Vec<u8>,
}

impl fmt::Debug for X509KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("X509KeyPair")
            .field("cert_pem_len", &self.cert_pem.len())
            .field("key_pem", &"<redacted>")
            .finish()
    }
}

mod base64_bytes {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}
