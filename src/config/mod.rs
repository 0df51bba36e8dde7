//! Step configuration file.
//!
//! ```toml
//! [step]
//! key_store_id = "release"
//! key_alias = "upload"
//! apks_to_sign = "app/build/outputs/apk/**/*-unsigned.apk"
//! archive_unsigned = true
//!
//! [keystores.release]
//! path = "signing/release.p12"
//! password_env = "RELEASE_KEYSTORE_PASSWORD"
//! ```

use crate::error::{Result, StepError};
use crate::signing::{KeyStoreConfig, MappingStrategy};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Configuration file looked up in the workspace when `--config` is absent.
pub const DEFAULT_CONFIG_FILE: &str = "apksign.toml";

/// Parsed configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StepConfig {
    /// Step parameters
    #[serde(default)]
    pub step: StepSection,
    /// Key store credentials by id
    #[serde(default)]
    pub keystores: BTreeMap<String, KeyStoreConfig>,
}

/// The `[step]` table. Every field can be overridden on the command line.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StepSection {
    pub key_store_id: Option<String>,
    pub key_alias: Option<String>,
    pub apks_to_sign: Option<String>,
    pub archive_signed: Option<bool>,
    pub archive_unsigned: Option<bool>,
    pub skip_zipalign: Option<bool>,
    pub zipalign_path: Option<String>,
    pub android_home: Option<String>,
    pub apksigner_path: Option<String>,
    pub mapping: Option<MappingStrategy>,
    pub archive_dir: Option<PathBuf>,
}

impl StepConfig {
    /// Parses configuration text.
    pub fn parse(path: &Path, text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|source| StepError::Config {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Loads the configuration.
    ///
    /// An explicit `path` must exist. Without one, `<workspace>/apksign.toml`
    /// is read if present and an empty configuration is used otherwise.
    pub async fn load(workspace: &Path, path: Option<&Path>) -> Result<Self> {
        let (path, required) = match path {
            Some(path) if path.is_absolute() => (path.to_path_buf(), true),
            Some(path) => (workspace.join(path), true),
            None => (workspace.join(DEFAULT_CONFIG_FILE), false),
        };

        match tokio::fs::read_to_string(&path).await {
            Ok(text) => {
                log::debug!("loaded configuration from {}", path.display());
                Self::parse(&path, &text)
            }
            Err(e) if !required && e.kind() == std::io::ErrorKind::NotFound => {
                log::debug!("no configuration at {}", path.display());
                Ok(Self::default())
            }
            Err(e) => Err(e.into()),
        }
    }
}
