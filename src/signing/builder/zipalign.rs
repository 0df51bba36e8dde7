//! Invocation of the external `zipalign` executable.

use crate::signing::error::{Error, ErrorExt, Result};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

/// Page alignment requested from zipalign, in bytes.
const ALIGNMENT: &str = "4";

/// Subdirectory of the scratch dir holding aligned intermediates.
pub const ZIPALIGN_SCRATCH_DIR: &str = "zipalign";

/// One invocation of the alignment tool.
///
/// The executable path is resolved once per pipeline run; the argument list is
/// built fresh for every APK.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCommand {
    /// Absolute path of the executable
    pub program: PathBuf,
    /// Arguments, in order
    pub args: Vec<String>,
}

impl ToolCommand {
    /// Creates a command for `program` with the given arguments.
    pub fn new(program: &Path, args: impl IntoIterator<Item = String>) -> Self {
        Self {
            program: program.to_path_buf(),
            args: args.into_iter().collect(),
        }
    }

    /// Builds `<zipalign> -f -p 4 <input> <output>`.
    pub fn zipalign(program: &Path, input: &Path, output: &Path) -> Self {
        Self::new(
            program,
            [
                "-f".to_string(),
                "-p".to_string(),
                ALIGNMENT.to_string(),
                input.to_string_lossy().into_owned(),
                output.to_string_lossy().into_owned(),
            ],
        )
    }

    /// Renders the command line for log output.
    pub fn display(&self) -> String {
        std::iter::once(self.program.to_string_lossy().into_owned())
            .chain(self.args.iter().cloned())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Runs the command to completion, streaming its output to the log.
    ///
    /// Returns the exit code, or `None` when the process was terminated by a
    /// signal.
    pub async fn run(&self) -> Result<Option<i32>> {
        log::info!("$ {}", self.display());

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .fs_context("failed to spawn", &self.program)?;

        tokio::join!(
            async {
                if let Some(stdout) = child.stdout.take() {
                    let mut lines = BufReader::new(stdout).lines();
                    while let Ok(Some(line)) = lines.next_line().await {
                        log::info!("{line}");
                    }
                }
            },
            async {
                if let Some(stderr) = child.stderr.take() {
                    let mut lines = BufReader::new(stderr).lines();
                    while let Ok(Some(line)) = lines.next_line().await {
                        log::warn!("{line}");
                    }
                }
            }
        );

        let status = child
            .wait()
            .await
            .fs_context("failed to wait for", &self.program)?;
        Ok(status.code())
    }
}

/// Allocates a fresh output path `aligned-<apkname>-XXXXXX.apk` in `dir`.
///
/// The file is created empty and left on disk; zipalign overwrites it (`-f`).
pub fn aligned_output_path(dir: &Path, apk: &Path) -> Result<PathBuf> {
    let stem = apk
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "apk".to_string());

    let file = tempfile::Builder::new()
        .prefix(&format!("aligned-{stem}-"))
        .suffix(".apk")
        .tempfile_in(dir)
        .fs_context("failed to create aligned APK in", dir)?;

    let (_, path) = file
        .keep()
        .map_err(|e| e.error)
        .fs_context("failed to persist aligned APK in", dir)?;
    Ok(path)
}

/// Aligns `input` into a fresh file under `scratch_dir`.
///
/// # Errors
///
/// - [`Error::AlignmentProcess`] when zipalign exits non-zero
/// - [`Error::AlignedApkMissing`] when it exits zero without leaving output
pub async fn align(zipalign: &Path, input: &Path, scratch_dir: &Path) -> Result<PathBuf> {
    let dir = scratch_dir.join(ZIPALIGN_SCRATCH_DIR);
    tokio::fs::create_dir_all(&dir)
        .await
        .fs_context("failed to create zipalign directory", &dir)?;

    let output = aligned_output_path(&dir, input)?;
    let command = ToolCommand::zipalign(zipalign, input, &output);

    match command.run().await? {
        Some(0) => {}
        code => {
            return Err(Error::AlignmentProcess {
                apk: input.to_path_buf(),
                code,
            });
        }
    }

    if !tokio::fs::try_exists(&output).await.unwrap_or(false) {
        return Err(Error::AlignedApkMissing { path: output });
    }

    Ok(output)
}
