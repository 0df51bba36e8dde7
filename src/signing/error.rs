//! Error types for the APK signing pipeline.
//!
//! Every variant is fatal for the invocation that raised it. The pipeline
//! never retries; it logs the failure and aborts.

use std::{
    fmt::Display,
    path::{Path, PathBuf},
};
use thiserror::Error as DeriveError;

/// Result type alias for signing operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while resolving key material from a key store.
#[derive(Debug, DeriveError)]
pub enum KeyError {
    /// No credential is registered under the requested key store id.
    #[error("no key store credential found with id {key_store_id}")]
    KeyStoreNotFound {
        /// Requested credential id
        key_store_id: String,
    },

    /// The key store password collapses to "no password".
    ///
    /// Reported separately from [`KeyError::GeneralSecurity`] because it is a
    /// configuration mistake the operator has to fix on the credential.
    #[error(
        "NullKeyStorePasswordException: key store {key_store_id} has an empty password; \
         key stores without a password cannot be read"
    )]
    NullKeyStorePassword {
        /// Credential id of the offending key store
        key_store_id: String,
    },

    /// The key store could not be read at all.
    #[error("GeneralSecurityException: unable to load key store {key_store_id}: {reason}")]
    KeyStoreUnreadable {
        /// Credential id of the key store
        key_store_id: String,
        /// What went wrong
        reason: String,
    },

    /// No single private key could be chosen.
    #[error("UnrecoverableKeyException: {reason}")]
    UnrecoverableKey {
        /// What went wrong
        reason: String,
    },

    /// A named entry is missing or cannot be read.
    #[error("GeneralSecurityException: unable to read key entry for alias {alias}: {reason}")]
    GeneralSecurity {
        /// Alias that was requested
        alias: String,
        /// What went wrong
        reason: String,
    },
}

/// Errors returned by the signing pipeline.
#[derive(Debug, DeriveError)]
#[non_exhaustive]
pub enum Error {
    /// No executable found in any precedence source.
    #[error("failed to find {tool}; locations tried:\n  {}", tried.join("\n  "))]
    ToolNotFound {
        /// Tool name, e.g. `zipalign`
        tool: String,
        /// Every location consulted, highest precedence first
        tried: Vec<String>,
    },

    /// A configured glob matched nothing.
    #[error("No APKs in workspace matching {pattern}")]
    GlobNoMatch {
        /// The unmatched pattern
        pattern: String,
    },

    /// A configured glob is not a valid pattern.
    #[error("invalid APK glob {pattern}: {source}")]
    InvalidGlob {
        /// The offending pattern
        pattern: String,
        /// Parser error
        source: glob::PatternError,
    },

    /// Key material could not be obtained.
    #[error("error reading signing key from key store credential {key_store_id}: {source}")]
    KeyResolution {
        /// Credential id that was consulted
        key_store_id: String,
        /// Underlying key error
        source: KeyError,
    },

    /// The alignment subprocess failed.
    #[error("zipalign failed on APK {}: {}", apk.display(), describe_exit(*code))]
    AlignmentProcess {
        /// APK being aligned
        apk: PathBuf,
        /// Exit code, `None` when terminated by a signal
        code: Option<i32>,
    },

    /// The alignment subprocess reported success but left no output.
    #[error("aligned APK does not exist: {}", path.display())]
    AlignedApkMissing {
        /// Expected aligned output
        path: PathBuf,
    },

    /// The signer raised an error.
    #[error("failed to sign APK {}: {reason}", apk.display())]
    SigningLibrary {
        /// APK that was being signed
        apk: PathBuf,
        /// Signer failure description
        reason: String,
    },

    /// File system failure on an artifact or the scratch directory.
    #[error("{context} {}: {source}", path.display())]
    ArtifactIo {
        /// Action being performed
        context: String,
        /// Path involved
        path: PathBuf,
        /// Underlying I/O error
        source: std::io::Error,
    },

    /// Plain I/O error without path context.
    #[error("{0}")]
    IoError(#[from] std::io::Error),

    /// Directory traversal error during APK selection.
    #[error("{0}")]
    WalkDir(#[from] walkdir::Error),

    /// Archive record serialization error.
    #[error("{0}")]
    Json(#[from] serde_json::Error),

    /// Generic message, produced by [`Context`] and [`bail!`](crate::bail).
    #[error("{0}")]
    GenericError(String),
}

fn describe_exit(code: Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {code}"),
        None => "terminated by signal".to_string(),
    }
}

impl Error {
    /// Name of the error kind, used in the operator log.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::ToolNotFound { .. } => "ToolNotFoundError",
            Error::GlobNoMatch { .. } | Error::InvalidGlob { .. } => "GlobNoMatchError",
            Error::KeyResolution { .. } => "KeyResolutionError",
            Error::AlignmentProcess { .. } | Error::AlignedApkMissing { .. } => {
                "AlignmentProcessError"
            }
            Error::SigningLibrary { .. } => "SigningLibraryError",
            Error::ArtifactIo { .. } | Error::IoError(_) | Error::WalkDir(_) => "ArtifactIOError",
            Error::Json(_) | Error::GenericError(_) => "AbortError",
        }
    }
}

/// Convenient conversion of `Option`s and `Result`s into [`Error::GenericError`].
pub trait Context<T> {
    /// Attach a message, discarding the original error.
    fn context<C>(self, context: C) -> Result<T>
    where
        C: Display + Send + Sync + 'static;

    /// Attach a lazily built message.
    fn with_context<C, F>(self, f: F) -> Result<T>
    where
        C: Display + Send + Sync + 'static,
        F: FnOnce() -> C;
}

impl<T, E: std::error::Error> Context<T> for std::result::Result<T, E> {
    fn context<C>(self, context: C) -> Result<T>
    where
        C: Display + Send + Sync + 'static,
    {
        self.map_err(|e| Error::GenericError(format!("{context}: {e}")))
    }

    fn with_context<C, F>(self, f: F) -> Result<T>
    where
        C: Display + Send + Sync + 'static,
        F: FnOnce() -> C,
    {
        self.map_err(|e| Error::GenericError(format!("{}: {e}", f())))
    }
}

impl<T> Context<T> for Option<T> {
    fn context<C>(self, context: C) -> Result<T>
    where
        C: Display + Send + Sync + 'static,
    {
        self.ok_or_else(|| Error::GenericError(context.to_string()))
    }

    fn with_context<C, F>(self, f: F) -> Result<T>
    where
        C: Display + Send + Sync + 'static,
        F: FnOnce() -> C,
    {
        self.ok_or_else(|| Error::GenericError(f().to_string()))
    }
}

/// Attach file system context to I/O results.
pub trait ErrorExt<T> {
    /// Map an I/O error to [`Error::ArtifactIo`] naming the action and path.
    fn fs_context(self, context: &str, path: impl AsRef<Path>) -> Result<T>;
}

impl<T> ErrorExt<T> for std::result::Result<T, std::io::Error> {
    fn fs_context(self, context: &str, path: impl AsRef<Path>) -> Result<T> {
        self.map_err(|source| Error::ArtifactIo {
            context: context.to_string(),
            path: path.as_ref().to_path_buf(),
            source,
        })
    }
}

/// Return early with a [`Error::GenericError`].
#[macro_export]
macro_rules! bail {
    ($msg:literal $(,)?) => {
        return Err($crate::signing::Error::GenericError(format!($msg)))
    };
    ($fmt:expr, $($arg:tt)*) => {
        return Err($crate::signing::Error::GenericError(format!($fmt, $($arg)*)))
    };
}
