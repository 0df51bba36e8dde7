//! Signing pipeline: tool discovery, alignment, signing and orchestration.
//!
//! # Example
//!
//! ```no_run
//! use std::collections::BTreeMap;
//! use kodegen_bundler_apksign::signing::{
//!     ApksignerTool, ConfigKeyStoreProvider, DirectoryArchiver, EnvVars, SettingsBuilder,
//!     SigningOrchestrator,
//! };
//!
//! # async fn example() -> kodegen_bundler_apksign::signing::Result<()> {
//! let settings = SettingsBuilder::new()
//!     .workspace("/var/ci/workspace")
//!     .key_store_id("release")
//!     .apks_to_sign("app/build/outputs/apk/**/*-unsigned.apk")
//!     .build()?;
//!
//! let env = EnvVars::capture();
//! let provider = ConfigKeyStoreProvider::new(settings.workspace(), BTreeMap::new(), env.clone());
//! let archiver = DirectoryArchiver::new(settings.workspace(), settings.archive_dir());
//! let signer = ApksignerTool::new("/opt/android-sdk/build-tools/34.0.0/apksigner");
//!
//! let report = SigningOrchestrator::new(settings, env, signer, archiver)
//!     .run(&provider)
//!     .await?;
//! for apk in &report.apks {
//!     println!("signed {}", apk.signed.display());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Module Organization
//!
//! - [`checksum`] - SHA-256 of archived artifacts
//! - [`orchestrator`] - [`SigningOrchestrator`] and the per-APK state machine
//! - [`signer`] - [`ApkSigner`] and the `apksigner` implementation
//! - [`tool_detection`] - SDK build tool discovery
//! - [`zipalign`] - alignment subprocess

pub mod checksum;
pub mod orchestrator;
pub mod signer;
pub mod tool_detection;
pub mod zipalign;

pub use orchestrator::{
    ApkState, PlannedApk, ProcessedApk, SigningOrchestrator, SigningPlan, SigningReport,
};
pub use signer::{ApkSigner, ApksignerTool, SignRequest, v1_signer_name};
pub use tool_detection::{APKSIGNER, ToolResolver, ToolSpec, ZIPALIGN};
pub use zipalign::ToolCommand;
