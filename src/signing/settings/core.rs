use super::mapping::{DestinationMapper, MappingStrategy};
use std::path::{Path, PathBuf};

/// Default name of the private scratch directory under the workspace.
pub const DEFAULT_SCRATCH_DIR: &str = "SignApksBuilder-out";

/// Validated configuration of one signing invocation.
///
/// Built through [`SettingsBuilder`](super::SettingsBuilder).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigningSettings {
    pub(super) workspace: PathBuf,
    pub(super) key_store_id: String,
    pub(super) key_alias: String,
    pub(super) apks_to_sign: String,
    pub(super) archive_signed: bool,
    pub(super) archive_unsigned: bool,
    pub(super) skip_zipalign: bool,
    pub(super) zipalign_path: Option<String>,
    pub(super) android_home: Option<String>,
    pub(super) apksigner_path: Option<String>,
    pub(super) mapping: MappingStrategy,
    pub(super) scratch_dir_name: String,
    pub(super) archive_dir: Option<PathBuf>,
}

impl SigningSettings {
    /// Absolute workspace root.
    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    /// Credential id of the key store.
    pub fn key_store_id(&self) -> &str {
        &self.key_store_id
    }

    /// Configured alias; empty requests auto-detection.
    pub fn key_alias(&self) -> &str {
        &self.key_alias
    }

    /// Raw comma separated glob list.
    pub fn apks_to_sign(&self) -> &str {
        &self.apks_to_sign
    }

    /// Whether signed APKs are archived.
    pub fn archive_signed(&self) -> bool {
        self.archive_signed
    }

    /// Whether the unsigned inputs are archived.
    pub fn archive_unsigned(&self) -> bool {
        self.archive_unsigned
    }

    /// Whether alignment is bypassed.
    pub fn skip_zipalign(&self) -> bool {
        self.skip_zipalign
    }

    /// Explicit zipalign path, unexpanded.
    pub fn zipalign_path(&self) -> Option<&str> {
        self.zipalign_path.as_deref()
    }

    /// Explicit SDK home, unexpanded.
    pub fn android_home(&self) -> Option<&str> {
        self.android_home.as_deref()
    }

    /// Explicit apksigner path, unexpanded.
    pub fn apksigner_path(&self) -> Option<&str> {
        self.apksigner_path.as_deref()
    }

    /// Destination strategy.
    pub fn mapping(&self) -> MappingStrategy {
        self.mapping
    }

    /// Scratch directory name, relative to the workspace.
    pub fn scratch_dir_name(&self) -> &str {
        &self.scratch_dir_name
    }

    /// Absolute scratch directory.
    pub fn scratch_dir(&self) -> PathBuf {
        self.workspace.join(&self.scratch_dir_name)
    }

    /// Directory the archiver publishes to, `<scratch>/archive` by default.
    pub fn archive_dir(&self) -> PathBuf {
        match &self.archive_dir {
            Some(dir) if dir.is_absolute() => dir.clone(),
            Some(dir) => self.workspace.join(dir),
            None => self.scratch_dir().join("archive"),
        }
    }

    /// The mapper for the configured strategy.
    pub fn destination_mapper(&self) -> DestinationMapper {
        match self.mapping {
            MappingStrategy::Sibling => DestinationMapper::Sibling,
            MappingStrategy::BuilderDir => DestinationMapper::BuilderDir {
                namespace: self
                    .scratch_dir()
                    .join(&self.key_store_id)
                    .join(&self.key_alias),
            },
        }
    }
}
