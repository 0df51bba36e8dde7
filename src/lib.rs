//! Android APK signing step for build pipelines
//!
//! Locates unsigned APKs produced by a build, aligns them with `zipalign`,
//! signs them with a key from a PKCS#12 key store and archives both the
//! inputs and the signed outputs under deterministic names.
//!
//! It can be used both as a CLI tool and as a library dependency.

pub mod cli;
pub mod config;
pub mod error;
pub mod signing;

// Re-export commonly used types
pub use error::{CliError, Result, StepError};
