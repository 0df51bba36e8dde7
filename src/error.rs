//! Error types for the signing step.
//!
//! Pipeline failures live in [`crate::signing::Error`]; this module adds the
//! command line and configuration layer on top.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for step operations
pub type Result<T> = std::result::Result<T, StepError>;

/// Main error type of the signing step
#[derive(Error, Debug)]
pub enum StepError {
    /// CLI argument errors
    #[error("CLI error: {0}")]
    Cli(#[from] CliError),

    /// Configuration file errors
    #[error("failed to read configuration {}: {source}", path.display())]
    Config {
        /// Configuration file
        path: PathBuf,
        /// Parser error
        source: toml::de::Error,
    },

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Signing pipeline errors
    #[error("{}: {}", .0.kind(), .0)]
    Signing(#[from] crate::signing::Error),

    /// Generic errors from anyhow
    #[error("{0}")]
    Anyhow(#[from] anyhow::Error),
}

/// CLI-specific errors
#[derive(Error, Debug)]
pub enum CliError {
    /// Invalid command line arguments
    #[error("Invalid arguments: {reason}")]
    InvalidArguments {
        /// Reason for the error
        reason: String,
    },

    /// Missing required argument
    #[error("Missing required argument: {argument}")]
    MissingArgument {
        /// Argument name
        argument: String,
    },

    /// The run was interrupted
    #[error("interrupted before {stage} completed")]
    Interrupted {
        /// What was running
        stage: String,
    },
}

impl StepError {
    /// Actionable hints for the operator
    pub fn recovery_suggestions(&self) -> Vec<String> {
        use crate::signing::{Error, KeyError};

        match self {
            StepError::Signing(Error::ToolNotFound { .. }) => vec![
                "Set ANDROID_HOME to an SDK with build-tools installed".to_string(),
                "Or point --zipalign-path / ANDROID_ZIPALIGN at the executable".to_string(),
            ],
            StepError::Signing(Error::GlobNoMatch { .. }) => vec![
                "Globs are relative to the workspace; `*` does not cross directories, use `**`"
                    .to_string(),
            ],
            StepError::Signing(Error::KeyResolution { source, .. }) => match source {
                KeyError::UnrecoverableKey { .. } => {
                    vec!["Pass --key-alias to choose one of the key store entries".to_string()]
                }
                KeyError::NullKeyStorePassword { .. } => {
                    vec!["Configure a non-empty password for the key store".to_string()]
                }
                _ => vec!["Check the [keystores] table of the configuration".to_string()],
            },
            StepError::Config { .. } => {
                vec!["Fix the configuration file or pass --config".to_string()]
            }
            _ => vec!["Check the error message above for specific details".to_string()],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signing_errors_are_prefixed_with_their_kind() {
        let err = StepError::from(crate::signing::Error::GlobNoMatch {
            pattern: "*.apk".into(),
        });
        assert_eq!(
            err.to_string(),
            "GlobNoMatchError: No APKs in workspace matching *.apk"
        );
        assert!(!err.recovery_suggestions().is_empty());
    }
}
