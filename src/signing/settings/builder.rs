//! Builder for constructing [`SigningSettings`].

use super::core::{DEFAULT_SCRATCH_DIR, SigningSettings};
use super::mapping::MappingStrategy;
use crate::bail;
use crate::signing::error::{Context, ErrorExt, Result};
use path_absolutize::Absolutize;
use std::path::{Path, PathBuf};

/// Fluent builder for [`SigningSettings`].
///
/// # Examples
///
/// ```no_run
/// use kodegen_bundler_apksign::signing::SettingsBuilder;
///
/// # fn example() -> kodegen_bundler_apksign::signing::Result<()> {
/// let settings = SettingsBuilder::new()
///     .workspace("/var/ci/workspace")
///     .key_store_id("release")
///     .apks_to_sign("app/build/outputs/apk/**/*-unsigned.apk")
///     .archive_unsigned(true)
///     .build()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct SettingsBuilder {
    workspace: Option<PathBuf>,
    key_store_id: Option<String>,
    key_alias: Option<String>,
    apks_to_sign: Option<String>,
    archive_signed: bool,
    archive_unsigned: bool,
    skip_zipalign: bool,
    zipalign_path: Option<String>,
    android_home: Option<String>,
    apksigner_path: Option<String>,
    mapping: MappingStrategy,
    scratch_dir_name: String,
    archive_dir: Option<PathBuf>,
}

impl Default for SettingsBuilder {
    fn default() -> Self {
        Self {
            workspace: None,
            key_store_id: None,
            key_alias: None,
            apks_to_sign: None,
            archive_signed: true,
            archive_unsigned: false,
            skip_zipalign: false,
            zipalign_path: None,
            android_home: None,
            apksigner_path: None,
            mapping: MappingStrategy::default(),
            scratch_dir_name: DEFAULT_SCRATCH_DIR.to_string(),
            archive_dir: None,
        }
    }
}

/// Blank strings mean "not configured".
fn strip_to_none(value: impl Into<String>) -> Option<String> {
    let value = value.into();
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Key store ids, aliases and the scratch directory name are joined into
/// destination paths and archive names as single components.
fn single_component(what: &str, value: &str) -> Result<()> {
    if value.contains(['/', '\\']) || value == "." || value == ".." {
        bail!("{what} {value:?} must not contain path separators or be `.` or `..`");
    }
    Ok(())
}

impl SettingsBuilder {
    /// Creates a builder with default flags.
    pub fn new() -> Self {
        Default::default()
    }

    /// Sets the workspace root. Relative paths are absolutized on build.
    ///
    /// # Required
    pub fn workspace<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.workspace = Some(path.as_ref().to_path_buf());
        self
    }

    /// Sets the key store credential id.
    ///
    /// # Required
    pub fn key_store_id(mut self, id: impl Into<String>) -> Self {
        self.key_store_id = strip_to_none(id);
        self
    }

    /// Sets the key alias. Empty requests auto-detection.
    pub fn key_alias(mut self, alias: impl Into<String>) -> Self {
        self.key_alias = Some(alias.into().trim().to_string());
        self
    }

    /// Sets the comma separated APK glob list.
    ///
    /// # Required
    pub fn apks_to_sign(mut self, globs: impl Into<String>) -> Self {
        self.apks_to_sign = strip_to_none(globs);
        self
    }

    /// Default: `true`
    pub fn archive_signed(mut self, archive: bool) -> Self {
        self.archive_signed = archive;
        self
    }

    /// Default: `false`
    pub fn archive_unsigned(mut self, archive: bool) -> Self {
        self.archive_unsigned = archive;
        self
    }

    /// Default: `false`
    pub fn skip_zipalign(mut self, skip: bool) -> Self {
        self.skip_zipalign = skip;
        self
    }

    /// Explicit zipalign executable; may contain `${VAR}` references.
    pub fn zipalign_path(mut self, path: impl Into<String>) -> Self {
        self.zipalign_path = strip_to_none(path);
        self
    }

    /// Explicit SDK home; may contain `${VAR}` references.
    pub fn android_home(mut self, path: impl Into<String>) -> Self {
        self.android_home = strip_to_none(path);
        self
    }

    /// Explicit apksigner executable; may contain `${VAR}` references.
    pub fn apksigner_path(mut self, path: impl Into<String>) -> Self {
        self.apksigner_path = strip_to_none(path);
        self
    }

    /// Default: [`MappingStrategy::Sibling`]
    pub fn mapping(mut self, mapping: MappingStrategy) -> Self {
        self.mapping = mapping;
        self
    }

    /// Default: `SignApksBuilder-out`
    pub fn scratch_dir_name(mut self, name: impl Into<String>) -> Self {
        if let Some(name) = strip_to_none(name) {
            self.scratch_dir_name = name;
        }
        self
    }

    /// Default: `<scratch>/archive`
    pub fn archive_dir<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.archive_dir = Some(path.as_ref().to_path_buf());
        self
    }

    /// Builds the settings.
    ///
    /// # Errors
    ///
    /// Returns an error if `workspace`, `key_store_id` or `apks_to_sign` is
    /// missing or blank, or if the key store id, key alias or scratch
    /// directory name is not a single path component.
    pub fn build(self) -> Result<SigningSettings> {
        let workspace = self.workspace.context("workspace is required")?;
        let workspace = workspace
            .absolutize()
            .fs_context("failed to absolutize workspace", &workspace)?
            .into_owned();

        let key_store_id = self.key_store_id.context("key store id is required")?;
        let key_alias = self.key_alias.unwrap_or_default();
        single_component("key store id", &key_store_id)?;
        single_component("key alias", &key_alias)?;
        single_component("scratch directory name", &self.scratch_dir_name)?;

        Ok(SigningSettings {
            workspace,
            key_store_id,
            key_alias,
            apks_to_sign: self.apks_to_sign.context("APKs to sign are required")?,
            archive_signed: self.archive_signed,
            archive_unsigned: self.archive_unsigned,
            skip_zipalign: self.skip_zipalign,
            zipalign_path: self.zipalign_path,
            android_home: self.android_home,
            apksigner_path: self.apksigner_path,
            mapping: self.mapping,
            scratch_dir_name: self.scratch_dir_name,
            archive_dir: self.archive_dir,
        })
    }
}
