//! APK signing.
//!
//! The pipeline hands every aligned APK to an [`ApkSigner`]. The production
//! implementation drives the SDK's `apksigner` with v1, v2 and v3 schemes
//! enabled; tests plug in their own.

use super::zipalign::ToolCommand;
use crate::signing::keystore::SigningComponents;
use base64::Engine;
use std::future::Future;
use std::path::{Path, PathBuf};

/// Longest v1 signer name accepted by the JAR signature format.
const V1_SIGNER_NAME_MAX: usize = 8;

/// Inputs of one signing call.
#[derive(Debug, Clone, Copy)]
pub struct SignRequest<'a> {
    /// Aligned APK to sign
    pub input: &'a Path,
    /// Where the signed APK must be written
    pub output: &'a Path,
    /// Key, chain and v1 signer name
    pub components: &'a SigningComponents,
}

/// Produces a signed APK from an aligned one.
///
/// Implementations enable the v1, v2 and v3 signature schemes and do not
/// preserve signatures of other signers already present in the input.
pub trait ApkSigner {
    /// Signs `request.input` into `request.output`.
    fn sign(&self, request: SignRequest<'_>) -> impl Future<Output = anyhow::Result<()>> + Send;
}

/// Derives the v1 (JAR) signer name from a key alias.
///
/// Uppercased, restricted to `[A-Z0-9_-]`, at most eight characters, `CERT`
/// when nothing usable remains.
pub fn v1_signer_name(alias: &str) -> String {
    let name: String = alias
        .chars()
        .map(|c| c.to_ascii_uppercase())
        .map(|c| match c {
            'A'..='Z' | '0'..='9' | '_' | '-' => c,
            _ => '_',
        })
        .take(V1_SIGNER_NAME_MAX)
        .collect();

    if name.is_empty() { "CERT".to_string() } else { name }
}

/// Signer backed by the Android SDK `apksigner` executable.
#[derive(Debug, Clone)]
pub struct ApksignerTool {
    program: PathBuf,
}

impl ApksignerTool {
    /// Wraps an already resolved `apksigner` executable.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Path of the wrapped executable.
    pub fn program(&self) -> &Path {
        &self.program
    }
}

impl ApkSigner for ApksignerTool {
    async fn sign(&self, request: SignRequest<'_>) -> anyhow::Result<()> {
        use anyhow::Context as _;

        // Key material only lives in this directory for the duration of the call.
        let secrets = tempfile::Builder::new()
            .prefix("apksign-key-")
            .tempdir()
            .context("failed to create key material directory")?;

        let key_path = secrets.path().join("key.pk8");
        let cert_path = secrets.path().join("chain.pem");
        write_private(&key_path, request.components.private_key.as_der()).await?;
        write_private(&cert_path, chain_to_pem(request.components).as_bytes()).await?;

        let command = ToolCommand::new(
            &self.program,
            [
                "sign".to_string(),
                "--key".to_string(),
                key_path.to_string_lossy().into_owned(),
                "--cert".to_string(),
                cert_path.to_string_lossy().into_owned(),
                "--v1-signer-name".to_string(),
                request.components.v1_signer_name.clone(),
                "--v1-signing-enabled".to_string(),
                "true".to_string(),
                "--v2-signing-enabled".to_string(),
                "true".to_string(),
                "--v3-signing-enabled".to_string(),
                "true".to_string(),
                "--out".to_string(),
                request.output.to_string_lossy().into_owned(),
                request.input.to_string_lossy().into_owned(),
            ],
        );

        match command.run().await? {
            Some(0) => Ok(()),
            Some(code) => anyhow::bail!("apksigner exited with code {code}"),
            None => anyhow::bail!("apksigner was terminated by a signal"),
        }
    }
}

async fn write_private(path: &Path, contents: &[u8]) -> anyhow::Result<()> {
    use anyhow::Context as _;

    tokio::fs::write(path, contents)
        .await
        .with_context(|| format!("failed to write {}", path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
            .await
            .with_context(|| format!("failed to restrict {}", path.display()))?;
    }

    Ok(())
}

/// Encodes the certificate chain as concatenated PEM blocks, leaf first.
fn chain_to_pem(components: &SigningComponents) -> String {
    let engine = base64::engine::general_purpose::STANDARD;
    let mut pem = String::new();

    for cert in &components.certificate_chain {
        let encoded = engine.encode(cert.as_der());
        pem.push_str("-----BEGIN CERTIFICATE-----\n");
        for line in encoded.as_bytes().chunks(64) {
            pem.push_str(&String::from_utf8_lossy(line));
            pem.push('\n');
        }
        pem.push_str("-----END CERTIFICATE-----\n");
    }

    pem
}
