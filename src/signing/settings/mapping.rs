//! Where signed APKs are written.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Suffix stripped from unsigned APK names by the sibling strategy.
const UNSIGNED_SUFFIX: &str = "-unsigned";

/// Suffix added to other APK names by the sibling strategy.
const SIGNED_SUFFIX: &str = "-signed";

/// Configured destination strategy.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum MappingStrategy {
    /// Next to the unsigned APK
    #[default]
    Sibling,
    /// Inside the scratch directory, namespaced by key store and alias
    BuilderDir,
}

/// Maps an unsigned APK to the path of its signed counterpart.
///
/// Pure: no file system access.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DestinationMapper {
    /// `dir/app-unsigned.apk` to `dir/app.apk`, `dir/app.apk` to `dir/app-signed.apk`
    Sibling,
    /// `<namespace>/<apkFileName>/<base>-signed.apk`, `-unsigned` dropped from `<base>`
    BuilderDir {
        /// `<workspace>/<scratch>/<keyStoreId>/<alias>`
        namespace: PathBuf,
    },
}

impl DestinationMapper {
    /// Destination of the signed APK for `unsigned`.
    pub fn map(&self, unsigned: &Path) -> PathBuf {
        let file_name = unsigned
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        match self {
            DestinationMapper::Sibling => unsigned.with_file_name(signed_file_name(&file_name)),
            DestinationMapper::BuilderDir { namespace } => {
                let signed = builder_dir_file_name(&file_name);
                namespace.join(file_name).join(signed)
            }
        }
    }
}

fn split_extension(file_name: &str) -> (&str, &str) {
    match file_name.rfind('.') {
        Some(dot) if dot > 0 => file_name.split_at(dot),
        _ => (file_name, ""),
    }
}

/// Sibling naming: drop a trailing `-unsigned` from the base name, otherwise
/// append `-signed` before the extension.
pub fn signed_file_name(file_name: &str) -> String {
    let (base, extension) = split_extension(file_name);

    match base.strip_suffix(UNSIGNED_SUFFIX) {
        Some(stripped) if !stripped.is_empty() => format!("{stripped}{extension}"),
        _ => format!("{base}{SIGNED_SUFFIX}{extension}"),
    }
}

/// Builder-dir naming: drop a trailing `-unsigned` from the base name, then
/// always append `-signed` before the extension.
pub fn builder_dir_file_name(file_name: &str) -> String {
    let (base, extension) = split_extension(file_name);
    let base = match base.strip_suffix(UNSIGNED_SUFFIX) {
        Some(stripped) if !stripped.is_empty() => stripped,
        _ => base,
    };
    format!("{base}{SIGNED_SUFFIX}{extension}")
}
