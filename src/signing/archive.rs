//! Archive manifest and the collaborator that publishes it.

use crate::bail;
use crate::signing::builder::checksum::{FileDigest, file_digest};
use crate::signing::error::{ErrorExt, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::future::Future;
use std::path::{Component, Path, PathBuf};

/// Name of the record written next to the archived files.
pub const ARCHIVE_RECORD: &str = "artifacts.json";

/// Archive name of a file produced for one APK:
/// `<scratch>/<keyStoreId>/<alias>/<apkFileName>/<leafName>`.
pub fn archive_name(
    scratch_dir_name: &str,
    key_store_id: &str,
    key_alias: &str,
    apk_file_name: &str,
    leaf_name: &str,
) -> String {
    format!("{scratch_dir_name}/{key_store_id}/{key_alias}/{apk_file_name}/{leaf_name}")
}

/// Insertion-ordered mapping of archive name to workspace-relative source.
///
/// Inserting an existing name replaces its source in place.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ArchiveManifest {
    entries: Vec<(String, String)>,
}

impl ArchiveManifest {
    /// Creates an empty manifest.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `source` under `name`.
    pub fn insert(&mut self, name: impl Into<String>, source: impl Into<String>) {
        let (name, source) = (name.into(), source.into());
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = source,
            None => self.entries.push((name, source)),
        }
    }

    /// Source recorded under `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, s)| s.as_str())
    }

    /// Entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, s)| (n.as_str(), s.as_str()))
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// `true` when nothing is recorded.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Publishes a manifest, once per invocation.
pub trait ArtifactArchiver {
    /// Archives every entry of `manifest`.
    fn archive(&self, manifest: &ArchiveManifest) -> impl Future<Output = Result<()>> + Send;
}

impl<T: ArtifactArchiver + Sync> ArtifactArchiver for &T {
    fn archive(&self, manifest: &ArchiveManifest) -> impl Future<Output = Result<()>> + Send {
        (**self).archive(manifest)
    }
}

/// One archived file in [`ARCHIVE_RECORD`].
#[derive(Debug, Clone, Serialize)]
pub struct ArchivedArtifact {
    /// Archive name
    pub name: String,
    /// Workspace-relative source
    pub source: String,
    /// Size and checksum
    #[serde(flatten)]
    pub digest: FileDigest,
}

#[derive(Debug, Serialize)]
struct ArchiveRecord<'a> {
    archived_at: DateTime<Utc>,
    artifacts: &'a [ArchivedArtifact],
}

/// Copies archived files into a directory and records their checksums.
#[derive(Debug, Clone)]
pub struct DirectoryArchiver {
    workspace: PathBuf,
    archive_dir: PathBuf,
}

impl DirectoryArchiver {
    /// Archives sources relative to `workspace` into `archive_dir`.
    pub fn new(workspace: impl Into<PathBuf>, archive_dir: impl Into<PathBuf>) -> Self {
        Self {
            workspace: workspace.into(),
            archive_dir: archive_dir.into(),
        }
    }

    /// Destination directory.
    pub fn archive_dir(&self) -> &Path {
        &self.archive_dir
    }
}

impl ArtifactArchiver for DirectoryArchiver {
    async fn archive(&self, manifest: &ArchiveManifest) -> Result<()> {
        let mut artifacts = Vec::with_capacity(manifest.len());

        for (name, source) in manifest.iter() {
            if !stays_inside(name) || !stays_inside(source) {
                bail!("refusing to archive {source} as {name}: path leaves its root");
            }
            let from = self.workspace.join(source);
            let to = self.archive_dir.join(name);

            if let Some(parent) = to.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .fs_context("failed to create archive directory", parent)?;
            }
            tokio::fs::copy(&from, &to)
                .await
                .fs_context("failed to archive", &from)?;

            let digest = file_digest(&to).await?;
            log::info!("archived {name} ({} bytes, sha256 {})", digest.size, digest.sha256);
            artifacts.push(ArchivedArtifact {
                name: name.to_string(),
                source: source.to_string(),
                digest,
            });
        }

        let record = ArchiveRecord {
            archived_at: Utc::now(),
            artifacts: &artifacts,
        };
        let record_path = self.archive_dir.join(ARCHIVE_RECORD);
        tokio::fs::write(&record_path, serde_json::to_vec_pretty(&record)?)
            .await
            .fs_context("failed to write archive record", &record_path)?;

        Ok(())
    }
}

fn stays_inside(relative: &str) -> bool {
    Path::new(relative)
        .components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}
