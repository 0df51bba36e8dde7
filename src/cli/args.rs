//! Command line argument parsing and validation.

use crate::signing::MappingStrategy;
use clap::Parser;
use std::path::PathBuf;

/// Zipalign and sign Android APKs produced by a build
#[derive(Parser, Debug, Clone, Default)]
#[command(
    name = "kodegen_bundler_apksign",
    version,
    about = "Zipalign and sign Android APKs produced by a build",
    long_about = "Selects unsigned APKs from the workspace, aligns them with zipalign, signs them \
with a key from a PKCS#12 key store and archives the results under deterministic names.

Usage:
  kodegen_bundler_apksign --key-store-id release --apks 'app/build/outputs/apk/**/*-unsigned.apk'
  kodegen_bundler_apksign --config ci/apksign.toml --archive-unsigned --dry-run

Step parameters may also come from the [step] table of apksign.toml; command line values win."
)]
pub struct Args {
    /// Workspace root all globs and relative paths are resolved against
    #[arg(short = 'w', long, env = "WORKSPACE", default_value = ".", value_name = "DIR")]
    pub workspace: PathBuf,

    /// Configuration file (default: <workspace>/apksign.toml when present)
    #[arg(short = 'c', long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Id of the key store credential to sign with
    #[arg(short = 'k', long, value_name = "ID")]
    pub key_store_id: Option<String>,

    /// Key alias; leave empty to use the only private key in the key store
    #[arg(short = 'a', long, value_name = "ALIAS")]
    pub key_alias: Option<String>,

    /// Comma separated APK globs, relative to the workspace
    #[arg(long = "apks", value_name = "GLOBS")]
    pub apks_to_sign: Option<String>,

    /// Archive the signed APKs (default)
    #[arg(long, overrides_with = "no_archive_signed")]
    pub archive_signed: bool,

    /// Do not archive the signed APKs
    #[arg(long, overrides_with = "archive_signed")]
    pub no_archive_signed: bool,

    /// Also archive the unsigned input APKs
    #[arg(long)]
    pub archive_unsigned: bool,

    /// Sign the inputs as they are, without zipalign
    #[arg(long)]
    pub skip_zipalign: bool,

    /// zipalign executable; `${VAR}` references are expanded
    #[arg(long, value_name = "PATH")]
    pub zipalign_path: Option<String>,

    /// Android SDK home overriding ANDROID_HOME; `${VAR}` references are expanded
    #[arg(long, value_name = "DIR")]
    pub android_home: Option<String>,

    /// apksigner executable; `${VAR}` references are expanded
    #[arg(long, value_name = "PATH")]
    pub apksigner_path: Option<String>,

    /// Where signed APKs are written
    #[arg(long, value_enum, value_name = "STRATEGY")]
    pub mapping: Option<MappingStrategy>,

    /// Directory archived artifacts are copied to (default: <scratch>/archive)
    #[arg(long, value_name = "DIR")]
    pub archive_dir: Option<PathBuf>,

    /// Resolve tools, key and APKs, print the plan and stop
    #[arg(long)]
    pub dry_run: bool,
}

impl Args {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Tri-state of the archive-signed switch pair.
    pub fn archive_signed_flag(&self) -> Option<bool> {
        if self.no_archive_signed {
            Some(false)
        } else if self.archive_signed {
            Some(true)
        } else {
            None
        }
    }

    /// Validate arguments for consistency
    pub fn validate(&self) -> Result<(), String> {
        if self.workspace.as_os_str().is_empty() {
            return Err("Workspace cannot be empty".to_string());
        }
        if let Some(globs) = &self.apks_to_sign
            && crate::signing::selection::parse_globs(globs).is_empty()
        {
            return Err("--apks must contain at least one glob".to_string());
        }
        Ok(())
    }
}
