//! Key stores and signing key resolution.

mod credentials;
mod provider;

pub use credentials::{
    ConfigKeyStoreProvider, KeyStoreConfig, KeyStoreCredential, KeyStoreProvider, MemoryKeyStore,
    P12KeyStore,
};
pub use provider::resolve_signing_components;

use crate::signing::error::KeyError;
use std::fmt;

/// PKCS#8 DER encoded private key.
#[derive(Clone, PartialEq, Eq)]
pub struct PrivateKeyDer(Vec<u8>);

impl PrivateKeyDer {
    /// Wraps DER bytes.
    pub fn new(der: Vec<u8>) -> Self {
        Self(der)
    }

    /// The DER bytes.
    pub fn as_der(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for PrivateKeyDer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PrivateKeyDer(<{} bytes redacted>)", self.0.len())
    }
}

/// DER encoded X.509 certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateDer(Vec<u8>);

impl CertificateDer {
    /// Wraps DER bytes.
    pub fn new(der: Vec<u8>) -> Self {
        Self(der)
    }

    /// The DER bytes.
    pub fn as_der(&self) -> &[u8] {
        &self.0
    }
}

/// A private key entry: the key and its certificate chain, leaf first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrivateKeyEntry {
    /// The private key
    pub key: PrivateKeyDer,
    /// Certificate chain, leaf first
    pub chain: Vec<CertificateDer>,
}

/// Key material extracted once per invocation.
///
/// Never written to disk by the pipeline itself; signers that need files keep
/// them in private temporary storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigningComponents {
    /// Alias the key was read from
    pub alias: String,
    /// The private key
    pub private_key: PrivateKeyDer,
    /// Certificate chain, leaf first
    pub certificate_chain: Vec<CertificateDer>,
    /// Name of the v1 signature files (`META-INF/<name>.SF`)
    pub v1_signer_name: String,
}

/// A loaded credential container.
pub trait KeyStore: Send + Sync {
    /// Aliases holding a private key entry, in a stable order.
    fn private_key_aliases(&self) -> Vec<String>;

    /// Reads the private key entry stored under `alias`.
    ///
    /// `Ok(None)` when there is no such alias or it holds no private key.
    fn private_key_entry(&self, alias: &str) -> Result<Option<PrivateKeyEntry>, KeyError>;
}
