//! Zipalign and sign Android APKs selected from a build workspace.
//!
//! The pipeline runs once per invocation:
//!
//! 1. locate `zipalign` ([`ToolResolver`])
//! 2. read the signing key ([`resolve_signing_components`])
//! 3. expand the APK globs ([`ApkSelector`])
//! 4. align, sign and record every APK ([`SigningOrchestrator`])
//! 5. hand the [`ArchiveManifest`] to an [`ArtifactArchiver`]

pub mod archive;
pub mod builder;
pub mod env;
pub mod error;
pub mod keystore;
pub mod selection;
pub mod settings;
pub mod utils;

pub use archive::{ArchiveManifest, ArtifactArchiver, DirectoryArchiver};
pub use builder::{
    APKSIGNER, ApkSigner, ApkState, ApksignerTool, ProcessedApk, SignRequest,
    SigningOrchestrator, SigningPlan, SigningReport, ToolResolver, ZIPALIGN,
};
pub use env::EnvVars;
pub use error::{Error, KeyError, Result};
pub use keystore::{
    ConfigKeyStoreProvider, KeyStoreConfig, KeyStoreCredential, KeyStoreProvider, MemoryKeyStore,
    SigningComponents, resolve_signing_components,
};
pub use selection::{ApkCandidate, ApkSelector};
pub use settings::{MappingStrategy, SettingsBuilder, SigningSettings};
