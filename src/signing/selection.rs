//! Selection of the APKs to sign from the configured glob list.
//!
//! Patterns follow Ant conventions relative to the workspace root: `*` stays
//! within a path segment, `**` spans directories and matching is case
//! sensitive. The scratch directory is never searched.

use crate::signing::error::{Error, Result};
use glob::{MatchOptions, Pattern};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// An APK selected for signing.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct ApkCandidate {
    /// Absolute path
    pub path: PathBuf,
    /// Path relative to the workspace, `/` separated
    pub relative: String,
}

impl ApkCandidate {
    /// File name of the APK.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Splits a comma separated glob list, trimming entries and dropping empty ones.
pub fn parse_globs(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|g| !g.is_empty())
        .map(str::to_string)
        .collect()
}

/// Expands glob patterns against a workspace.
#[derive(Debug, Clone)]
pub struct ApkSelector<'a> {
    workspace: &'a Path,
    exclude_dir: &'a str,
}

impl<'a> ApkSelector<'a> {
    /// Selects under `workspace`, never descending into `<workspace>/<exclude_dir>`.
    pub fn new(workspace: &'a Path, exclude_dir: &'a str) -> Self {
        Self {
            workspace,
            exclude_dir,
        }
    }

    /// Returns the union of all matches, ordered by full path, without duplicates.
    ///
    /// # Errors
    ///
    /// [`Error::GlobNoMatch`] naming the first pattern (in configuration order)
    /// that matched nothing.
    pub fn select(&self, globs: &[String]) -> Result<Vec<ApkCandidate>> {
        let patterns = globs
            .iter()
            .map(|glob| {
                Pattern::new(glob)
                    .map(|pattern| (glob.as_str(), pattern))
                    .map_err(|source| Error::InvalidGlob {
                        pattern: glob.clone(),
                        source,
                    })
            })
            .collect::<Result<Vec<_>>>()?;

        let files = self.workspace_files()?;
        let mut selected = BTreeMap::new();

        for (glob, pattern) in &patterns {
            let mut matched = 0usize;
            for (relative, path) in &files {
                if pattern.matches_with(relative, MATCH_OPTIONS) {
                    matched += 1;
                    selected
                        .entry(path.to_string_lossy().into_owned())
                        .or_insert_with(|| ApkCandidate {
                            path: path.clone(),
                            relative: relative.clone(),
                        });
                }
            }

            log::debug!("APK glob {glob} matched {matched} file(s)");
            if matched == 0 {
                return Err(Error::GlobNoMatch {
                    pattern: glob.to_string(),
                });
            }
        }

        Ok(selected.into_values().collect())
    }

    /// Every regular file in the workspace outside the excluded directory.
    ///
    /// Symlinks to files are selected; symlinked directories are not descended.
    fn workspace_files(&self) -> Result<Vec<(String, PathBuf)>> {
        let excluded = self.workspace.join(self.exclude_dir);
        let mut files = Vec::new();

        let walker = WalkDir::new(self.workspace)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| entry.path() != excluded);

        for entry in walker {
            let entry = entry?;
            let is_file = entry.file_type().is_file()
                || (entry.path_is_symlink() && entry.path().is_file());
            if !is_file {
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(self.workspace) else {
                continue;
            };
            files.push((to_slash(relative), entry.into_path()));
        }

        Ok(files)
    }
}

/// Renders a relative path with `/` separators.
pub(crate) fn to_slash(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
