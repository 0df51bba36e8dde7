//! File system helpers for the signing pipeline.

use crate::signing::error::{ErrorExt, Result};
use std::{io, path::Path};
use tokio::fs;

/// Removes a file, treating a missing file as success.
pub async fn remove_file_if_exists(path: &Path, context: &str) -> Result<()> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).fs_context(context, path),
    }
}

/// Creates `path` and all of its parents.
pub async fn create_dir_all(path: &Path, context: &str) -> Result<()> {
    fs::create_dir_all(path).await.fs_context(context, path)
}

/// Workspace-relative, `/` separated name of `path`.
///
/// Paths outside the workspace are returned as given.
pub fn relative_to_workspace(workspace: &Path, path: &Path) -> String {
    match path.strip_prefix(workspace) {
        Ok(relative) => crate::signing::selection::to_slash(relative),
        Err(_) => path.to_string_lossy().into_owned(),
    }
}
