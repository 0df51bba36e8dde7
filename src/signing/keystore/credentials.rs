//! Credential lookup: turning a key store id into a loaded [`KeyStore`].
//!
//! Key stores are PKCS#12 containers. Their bytes come either from a file in
//! the workspace or from a base64 encoded environment variable, the usual
//! way CI systems hand out signing certificates.

use super::{CertificateDer, KeyStore, PrivateKeyDer, PrivateKeyEntry};
use crate::signing::{env::EnvVars, error::KeyError};
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A key store handle plus the alias to use when none is configured.
#[derive(Clone)]
pub struct KeyStoreCredential {
    /// Credential id
    pub id: String,
    /// Loaded key store
    pub store: Arc<dyn KeyStore>,
    /// Alias suggested by the credential itself
    pub default_alias: Option<String>,
}

impl std::fmt::Debug for KeyStoreCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyStoreCredential")
            .field("id", &self.id)
            .field("aliases", &self.store.private_key_aliases())
            .field("default_alias", &self.default_alias)
            .finish()
    }
}

/// Looks up key store credentials by id.
pub trait KeyStoreProvider {
    /// Loads the credential registered as `id`.
    fn lookup(&self, id: &str) -> Result<KeyStoreCredential, KeyError>;
}

impl KeyStoreProvider for BTreeMap<String, KeyStoreCredential> {
    fn lookup(&self, id: &str) -> Result<KeyStoreCredential, KeyError> {
        self.get(id).cloned().ok_or_else(|| KeyError::KeyStoreNotFound {
            key_store_id: id.to_string(),
        })
    }
}

/// One `[keystores.<id>]` table of the configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KeyStoreConfig {
    /// PKCS#12 file, relative to the workspace unless absolute
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// Environment variable holding the base64 encoded PKCS#12 bytes
    #[serde(default)]
    pub base64_env: Option<String>,
    /// Key store password
    #[serde(default)]
    pub password: Option<String>,
    /// Environment variable holding the key store password
    #[serde(default)]
    pub password_env: Option<String>,
    /// Alias to use when the step configures none
    #[serde(default)]
    pub default_alias: Option<String>,
    /// Free-form label shown in logs
    #[serde(default)]
    pub description: Option<String>,
}

/// Credentials declared in the configuration file.
#[derive(Debug, Clone)]
pub struct ConfigKeyStoreProvider {
    workspace: PathBuf,
    stores: BTreeMap<String, KeyStoreConfig>,
    env: EnvVars,
}

impl ConfigKeyStoreProvider {
    /// Creates a provider resolving relative key store paths against `workspace`.
    pub fn new(
        workspace: impl Into<PathBuf>,
        stores: BTreeMap<String, KeyStoreConfig>,
        env: EnvVars,
    ) -> Self {
        Self {
            workspace: workspace.into(),
            stores,
            env,
        }
    }

    /// Declared credential ids.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.stores.keys().map(String::as_str)
    }

    fn password(&self, id: &str, config: &KeyStoreConfig) -> Result<String, KeyError> {
        let password = match &config.password_env {
            Some(var) => self.env.get(var).map(str::to_string),
            None => config.password.clone(),
        };

        // An empty password collapses to "no password" in the store format.
        password
            .filter(|p| !p.is_empty())
            .ok_or_else(|| KeyError::NullKeyStorePassword {
                key_store_id: id.to_string(),
            })
    }

    fn bytes(&self, id: &str, config: &KeyStoreConfig) -> Result<Vec<u8>, KeyError> {
        let unreadable = |reason: String| KeyError::KeyStoreUnreadable {
            key_store_id: id.to_string(),
            reason,
        };

        if let Some(var) = &config.base64_env {
            let encoded = self
                .env
                .get(var)
                .ok_or_else(|| unreadable(format!("environment variable {var} is not set")))?;
            log::debug!("reading key store {id} from environment variable {var}");
            return base64::engine::general_purpose::STANDARD
                .decode(encoded.trim())
                .map_err(|e| unreadable(format!("{var} is not valid base64: {e}")));
        }

        let path = config
            .path
            .as_deref()
            .ok_or_else(|| unreadable("neither path nor base64_env is configured".to_string()))?;
        let path = resolve_path(&self.workspace, path);
        log::debug!("reading key store {id} from {}", path.display());
        std::fs::read(&path).map_err(|e| unreadable(format!("{}: {e}", path.display())))
    }
}

impl KeyStoreProvider for ConfigKeyStoreProvider {
    fn lookup(&self, id: &str) -> Result<KeyStoreCredential, KeyError> {
        let Some(config) = self.stores.get(id) else {
            let known = self.ids().collect::<Vec<_>>();
            log::warn!("key store {id} is not declared; declared key stores: [{}]", known.join(", "));
            return Err(KeyError::KeyStoreNotFound {
                key_store_id: id.to_string(),
            });
        };

        if let Some(description) = &config.description {
            log::info!("using key store {id} ({description})");
        }

        let password = self.password(id, config)?;
        let bytes = self.bytes(id, config)?;
        let store = P12KeyStore::from_pkcs12(id, &bytes, &password)?;

        Ok(KeyStoreCredential {
            id: id.to_string(),
            store: Arc::new(store),
            default_alias: config.default_alias.clone().filter(|a| !a.is_empty()),
        })
    }
}

fn resolve_path(workspace: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        workspace.join(path)
    }
}

/// A PKCS#12 key store.
pub struct P12KeyStore {
    inner: p12_keystore::KeyStore,
}

impl P12KeyStore {
    /// Parses PKCS#12 bytes protected by `password`.
    pub fn from_pkcs12(id: &str, bytes: &[u8], password: &str) -> Result<Self, KeyError> {
        let inner = p12_keystore::KeyStore::from_pkcs12(bytes, password).map_err(|e| {
            KeyError::KeyStoreUnreadable {
                key_store_id: id.to_string(),
                reason: e.to_string(),
            }
        })?;
        Ok(Self { inner })
    }
}

impl std::fmt::Debug for P12KeyStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("P12KeyStore")
            .field("aliases", &self.private_key_aliases())
            .finish()
    }
}

impl KeyStore for P12KeyStore {
    fn private_key_aliases(&self) -> Vec<String> {
        let mut aliases: Vec<String> = self
            .inner
            .entries()
            .filter(|(_, entry)| matches!(entry, p12_keystore::KeyStoreEntry::PrivateKeyChain(_)))
            .map(|(alias, _)| alias.to_string())
            .collect();
        aliases.sort();
        aliases
    }

    fn private_key_entry(&self, alias: &str) -> Result<Option<PrivateKeyEntry>, KeyError> {
        match self.inner.entry(alias) {
            Some(p12_keystore::KeyStoreEntry::PrivateKeyChain(chain)) => Ok(Some(PrivateKeyEntry {
                key: PrivateKeyDer::new(chain.key().to_vec()),
                chain: chain
                    .chain()
                    .iter()
                    .map(|cert| CertificateDer::new(cert.as_der().to_vec()))
                    .collect(),
            })),
            _ => Ok(None),
        }
    }
}

/// Key store held entirely in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryKeyStore {
    entries: BTreeMap<String, PrivateKeyEntry>,
}

impl MemoryKeyStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a private key entry.
    pub fn insert_private_key(
        &mut self,
        alias: &str,
        key: PrivateKeyDer,
        chain: Vec<CertificateDer>,
    ) {
        self.entries
            .insert(alias.to_string(), PrivateKeyEntry { key, chain });
    }

    /// Wraps the store in a credential registered as `id`.
    pub fn into_credential(self, id: &str) -> KeyStoreCredential {
        KeyStoreCredential {
            id: id.to_string(),
            store: Arc::new(self),
            default_alias: None,
        }
    }
}

impl KeyStore for MemoryKeyStore {
    fn private_key_aliases(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    fn private_key_entry(&self, alias: &str) -> Result<Option<PrivateKeyEntry>, KeyError> {
        Ok(self.entries.get(alias).cloned())
    }
}
