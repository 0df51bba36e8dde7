//! Artifact checksums for the archive record.

use crate::{bail, signing::Result, signing::error::ErrorExt};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::path::Path;
use tokio::io::AsyncReadExt;

/// Size and SHA-256 of one archived file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileDigest {
    /// Length in bytes
    pub size: u64,
    /// Hex-encoded SHA-256 (64 characters)
    pub sha256: String,
}

/// Hashes a regular file in 8KB chunks.
///
/// # Errors
///
/// Fails if `path` is not a regular file or cannot be read.
pub async fn file_digest(path: &Path) -> Result<FileDigest> {
    let metadata = tokio::fs::metadata(path)
        .await
        .fs_context("reading metadata of", path)?;
    if !metadata.is_file() {
        bail!("cannot checksum {}: not a regular file", path.display());
    }

    let mut file = tokio::fs::File::open(path)
        .await
        .fs_context("opening file for hashing", path)?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; 8192];
    let mut size = 0u64;

    loop {
        let n = file
            .read(&mut buffer)
            .await
            .fs_context("reading file for hash calculation", path)?;
        if n == 0 {
            break;
        }
        size += n as u64;
        hasher.update(&buffer[..n]);
    }

    Ok(FileDigest {
        size,
        sha256: format!("{:x}", hasher.finalize()),
    })
}
