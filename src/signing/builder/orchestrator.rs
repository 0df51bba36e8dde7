//! Signing pipeline orchestration.
//!
//! [`SigningOrchestrator`] resolves everything an invocation needs up front
//! (alignment tool, key material, APK selection) and then drives every APK
//! through align, sign and archive, strictly one after the other. The first
//! failure aborts the whole invocation and nothing is archived.

use super::{
    signer::{ApkSigner, SignRequest},
    tool_detection::{ToolResolver, ZIPALIGN},
    zipalign,
};
use crate::signing::{
    archive::{ArchiveManifest, ArtifactArchiver, archive_name},
    env::EnvVars,
    error::{Error, Result},
    keystore::{KeyStoreProvider, SigningComponents, resolve_signing_components},
    selection::{ApkCandidate, ApkSelector, parse_globs},
    settings::SigningSettings,
    utils::fs::{create_dir_all, relative_to_workspace, remove_file_if_exists},
};
use std::fmt;
use std::path::{Path, PathBuf};

/// Where an APK is in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApkState {
    /// Chosen by the selector
    Selected,
    /// zipalign is running
    Aligning,
    /// An aligned file exists
    Aligned,
    /// The signer is running
    Signing,
    /// The signed file is published
    Signed,
    /// Recorded in the archive manifest
    Archivable,
    /// A hard failure stopped the invocation
    Aborted,
}

impl fmt::Display for ApkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ApkState::Selected => "SELECTED",
            ApkState::Aligning => "ALIGNING",
            ApkState::Aligned => "ALIGNED",
            ApkState::Signing => "SIGNING",
            ApkState::Signed => "SIGNED",
            ApkState::Archivable => "ARCHIVABLE",
            ApkState::Aborted => "ABORTED",
        };
        f.write_str(name)
    }
}

/// An APK together with the destination of its signed counterpart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedApk {
    /// The unsigned input
    pub candidate: ApkCandidate,
    /// Where the signed APK will be written
    pub destination: PathBuf,
}

/// Everything resolved before the first APK is touched.
#[derive(Debug, Clone)]
pub struct SigningPlan {
    /// Resolved zipalign, `None` when alignment is skipped
    pub zipalign: Option<PathBuf>,
    /// Key material
    pub components: SigningComponents,
    /// APKs in processing order
    pub apks: Vec<PlannedApk>,
}

/// Outcome of one APK.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedApk {
    /// The unsigned input
    pub source: PathBuf,
    /// Aligned intermediate; the source itself when alignment is skipped
    pub aligned: PathBuf,
    /// Published signed APK
    pub signed: PathBuf,
    /// Final state
    pub state: ApkState,
}

/// Result of a successful invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SigningReport {
    /// Every APK, in processing order
    pub apks: Vec<ProcessedApk>,
    /// What was handed to the archiver
    pub manifest: ArchiveManifest,
}

/// Drives the align, sign and archive pipeline.
#[derive(Debug)]
pub struct SigningOrchestrator<S, A> {
    settings: SigningSettings,
    env: EnvVars,
    signer: S,
    archiver: A,
}

impl<S: ApkSigner, A: ArtifactArchiver> SigningOrchestrator<S, A> {
    /// Creates an orchestrator over an environment snapshot.
    pub fn new(settings: SigningSettings, env: EnvVars, signer: S, archiver: A) -> Self {
        Self {
            settings,
            env,
            signer,
            archiver,
        }
    }

    /// Settings of this invocation.
    pub fn settings(&self) -> &SigningSettings {
        &self.settings
    }

    /// Plans and executes the invocation.
    pub async fn run(&self, provider: &impl KeyStoreProvider) -> Result<SigningReport> {
        let plan = self.plan(provider)?;
        self.execute(&plan).await
    }

    /// Resolves the alignment tool, key material and APK selection.
    ///
    /// Touches nothing on disk.
    pub fn plan(&self, provider: &impl KeyStoreProvider) -> Result<SigningPlan> {
        SigningPlan::prepare(&self.settings, &self.env, provider)
    }

    /// Runs every planned APK through the pipeline, then archives.
    pub async fn execute(&self, plan: &SigningPlan) -> Result<SigningReport> {
        self.execute_inner(plan).await.inspect_err(log_failure)
    }

    async fn execute_inner(&self, plan: &SigningPlan) -> Result<SigningReport> {
        let scratch_dir = self.settings.scratch_dir();
        create_dir_all(&scratch_dir, "failed to create scratch directory").await?;

        let mut report = SigningReport::default();
        for apk in &plan.apks {
            let processed = self.process(plan, apk, &mut report.manifest).await?;
            report.apks.push(processed);
        }

        if report.manifest.is_empty() {
            log::info!("nothing to archive");
        } else {
            log::info!("archiving {} artifact(s)", report.manifest.len());
            self.archiver.archive(&report.manifest).await?;
        }

        Ok(report)
    }

    async fn process(
        &self,
        plan: &SigningPlan,
        apk: &PlannedApk,
        manifest: &mut ArchiveManifest,
    ) -> Result<ProcessedApk> {
        let mut progress = Progress::new(&apk.candidate.relative);
        let result = self.advance(plan, apk, manifest, &mut progress).await;
        if result.is_err() {
            progress.enter(ApkState::Aborted);
        }
        result
    }

    async fn advance(
        &self,
        plan: &SigningPlan,
        apk: &PlannedApk,
        manifest: &mut ArchiveManifest,
        progress: &mut Progress<'_>,
    ) -> Result<ProcessedApk> {
        let settings = &self.settings;
        let source = &apk.candidate.path;

        let aligned = match &plan.zipalign {
            None => {
                log::info!("skipping zipalign for unsigned APK {}", source.display());
                source.clone()
            }
            Some(zipalign_path) => {
                progress.enter(ApkState::Aligning);
                zipalign::align(zipalign_path, source, &settings.scratch_dir()).await?
            }
        };
        progress.enter(ApkState::Aligned);

        if !tokio::fs::try_exists(&aligned).await.unwrap_or(false) {
            return Err(Error::AlignedApkMissing { path: aligned });
        }

        let destination = &apk.destination;
        if let Some(parent) = destination.parent() {
            create_dir_all(parent, "failed to create signed APK directory").await?;
        }
        remove_file_if_exists(destination, "failed to delete previous signed APK").await?;

        progress.enter(ApkState::Signing);
        log::info!("signing {} to {}", aligned.display(), destination.display());
        let guard = UnpublishedOutput::new(destination);
        self.signer
            .sign(SignRequest {
                input: &aligned,
                output: destination,
                components: &plan.components,
            })
            .await
            .map_err(|e| Error::SigningLibrary {
                apk: source.clone(),
                reason: format!("{e:#}"),
            })?;
        guard.publish();
        progress.enter(ApkState::Signed);

        let apk_name = apk.candidate.file_name();
        let name = |leaf: &str| {
            archive_name(
                settings.scratch_dir_name(),
                settings.key_store_id(),
                settings.key_alias(),
                &apk_name,
                leaf,
            )
        };
        if settings.archive_unsigned() {
            log::info!("archiving unsigned APK {}", source.display());
            manifest.insert(name(&apk_name), apk.candidate.relative.clone());
        }
        if settings.archive_signed() {
            let signed_name = file_name(destination);
            log::info!("archiving signed APK {}", destination.display());
            manifest.insert(
                name(&signed_name),
                relative_to_workspace(settings.workspace(), destination),
            );
        }
        progress.enter(ApkState::Archivable);

        Ok(ProcessedApk {
            source: source.clone(),
            aligned,
            signed: destination.clone(),
            state: progress.state,
        })
    }
}

fn resolve_key(
    settings: &SigningSettings,
    provider: &impl KeyStoreProvider,
) -> Result<SigningComponents> {
    let key_store_id = settings.key_store_id();
    let key_error = |source| Error::KeyResolution {
        key_store_id: key_store_id.to_string(),
        source,
    };

    let credential = provider.lookup(key_store_id).map_err(key_error)?;
    let alias = Some(settings.key_alias())
        .filter(|a| !a.is_empty())
        .or(credential.default_alias.as_deref());

    resolve_signing_components(credential.store.as_ref(), alias).map_err(key_error)
}

fn log_failure(err: &Error) {
    let mut message = format!("{}: {err}", err.kind());
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        message.push_str(&format!("\n  caused by: {cause}"));
        source = std::error::Error::source(cause);
    }
    log::error!("{message}");
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Per-APK state tracker; logs every transition.
struct Progress<'a> {
    apk: &'a str,
    state: ApkState,
}

impl<'a> Progress<'a> {
    fn new(apk: &'a str) -> Self {
        Self {
            apk,
            state: ApkState::Selected,
        }
    }

    fn enter(&mut self, state: ApkState) {
        log::debug!("{}: {} -> {}", self.apk, self.state, state);
        self.state = state;
    }
}

/// Removes a signer output unless it was published.
///
/// Covers both signer failures and cancellation of the signing future.
struct UnpublishedOutput<'a> {
    path: &'a Path,
    published: bool,
}

impl<'a> UnpublishedOutput<'a> {
    fn new(path: &'a Path) -> Self {
        Self {
            path,
            published: false,
        }
    }

    fn publish(mut self) {
        self.published = true;
    }
}

impl Drop for UnpublishedOutput<'_> {
    fn drop(&mut self) {
        if !self.published && self.path.exists() {
            log::warn!("removing partially written {}", self.path.display());
            if let Err(e) = std::fs::remove_file(self.path) {
                log::warn!("failed to remove {}: {e}", self.path.display());
            }
        }
    }
}

impl SigningPlan {
    /// Resolves the alignment tool, key material and APK selection.
    ///
    /// Touches nothing on disk. Failures are logged before they are returned.
    pub fn prepare(
        settings: &SigningSettings,
        env: &EnvVars,
        provider: &impl KeyStoreProvider,
    ) -> Result<Self> {
        Self::prepare_inner(settings, env, provider).inspect_err(log_failure)
    }

    fn prepare_inner(
        settings: &SigningSettings,
        env: &EnvVars,
        provider: &impl KeyStoreProvider,
    ) -> Result<Self> {
        let zipalign = if settings.skip_zipalign() {
            log::debug!("alignment skipped; not resolving zipalign");
            None
        } else {
            let path = ToolResolver::new(ZIPALIGN, env)
                .explicit_path(settings.zipalign_path())
                .android_home(settings.android_home())
                .resolve()?;
            log::info!("✓ zipalign available: {}", path.display());
            Some(path)
        };

        let components = resolve_key(settings, provider)?;

        let globs = parse_globs(settings.apks_to_sign());
        let candidates =
            ApkSelector::new(settings.workspace(), settings.scratch_dir_name()).select(&globs)?;

        let mapper = settings.destination_mapper();
        let apks = candidates
            .into_iter()
            .map(|candidate| PlannedApk {
                destination: mapper.map(&candidate.path),
                candidate,
            })
            .collect::<Vec<_>>();

        for apk in &apks {
            log::debug!("{}: {}", apk.candidate.relative, ApkState::Selected);
        }

        Ok(Self {
            zipalign,
            components,
            apks,
        })
    }

    /// Logs what an execution of this plan would do.
    pub fn log(&self, settings: &SigningSettings) {
        match &self.zipalign {
            Some(path) => log::info!("zipalign: {}", path.display()),
            None => log::info!("zipalign: skipped"),
        }
        log::info!(
            "key: {} (v1 signer name {})",
            self.components.alias,
            self.components.v1_signer_name
        );
        for apk in &self.apks {
            log::info!(
                "{} -> {}",
                apk.candidate.relative,
                relative_to_workspace(settings.workspace(), &apk.destination)
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signing::keystore::{
        CertificateDer, KeyStoreCredential, MemoryKeyStore, PrivateKeyDer,
    };
    use crate::signing::settings::{MappingStrategy, SettingsBuilder};
    use std::collections::BTreeMap;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Writes `signed-by:<cert>` followed by the input bytes.
    #[derive(Default)]
    struct FakeSigner {
        fail: bool,
    }

    impl ApkSigner for FakeSigner {
        async fn sign(&self, request: SignRequest<'_>) -> anyhow::Result<()> {
            let mut out = b"signed-by:".to_vec();
            out.extend_from_slice(request.components.certificate_chain[0].as_der());
            out.push(b'\n');
            out.extend(std::fs::read(request.input)?);
            std::fs::write(request.output, out)?;
            if self.fail {
                anyhow::bail!("signature block rejected");
            }
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingArchiver {
        calls: Mutex<Vec<ArchiveManifest>>,
    }

    impl ArtifactArchiver for RecordingArchiver {
        async fn archive(&self, manifest: &ArchiveManifest) -> Result<()> {
            self.calls.lock().unwrap().push(manifest.clone());
            Ok(())
        }
    }

    fn credentials(aliases: &[&str]) -> BTreeMap<String, KeyStoreCredential> {
        let mut store = MemoryKeyStore::new();
        for alias in aliases {
            store.insert_private_key(
                alias,
                PrivateKeyDer::new(vec![7]),
                vec![CertificateDer::new(format!("{alias}-cert").into_bytes())],
            );
        }
        BTreeMap::from([("ks1".to_string(), store.into_credential("ks1"))])
    }

    fn workspace(files: &[&str]) -> TempDir {
        let tmp = TempDir::new().unwrap();
        for file in files {
            let path = tmp.path().join(file);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, file.as_bytes()).unwrap();
        }
        tmp
    }

    fn settings(ws: &Path) -> SettingsBuilder {
        SettingsBuilder::new()
            .workspace(ws)
            .key_store_id("ks1")
            .apks_to_sign("*.apk")
            .skip_zipalign(true)
    }

    fn orchestrator(
        settings: SigningSettings,
        signer: FakeSigner,
    ) -> SigningOrchestrator<FakeSigner, RecordingArchiver> {
        SigningOrchestrator::new(settings, EnvVars::new(), signer, RecordingArchiver::default())
    }

    #[tokio::test]
    async fn signs_and_archives_every_apk_in_order() {
        let ws = workspace(&["b.apk", "a-unsigned.apk"]);
        let settings = settings(ws.path()).archive_unsigned(true).build().unwrap();
        let orchestrator = orchestrator(settings, FakeSigner::default());

        let report = orchestrator.run(&credentials(&["key0"])).await.unwrap();

        assert_eq!(report.apks.len(), 2);
        assert!(report.apks.iter().all(|a| a.state == ApkState::Archivable));
        assert_eq!(report.apks[0].signed, ws.path().join("a.apk"));
        assert_eq!(report.apks[1].signed, ws.path().join("b-signed.apk"));
        assert_eq!(report.apks[0].aligned, ws.path().join("a-unsigned.apk"));

        let names: Vec<_> = report.manifest.iter().collect();
        assert_eq!(
            names,
            [
                ("SignApksBuilder-out/ks1//a-unsigned.apk/a-unsigned.apk", "a-unsigned.apk"),
                ("SignApksBuilder-out/ks1//a-unsigned.apk/a.apk", "a.apk"),
                ("SignApksBuilder-out/ks1//b.apk/b.apk", "b.apk"),
                ("SignApksBuilder-out/ks1//b.apk/b-signed.apk", "b-signed.apk"),
            ]
        );

        let signed = std::fs::read_to_string(ws.path().join("a.apk")).unwrap();
        assert!(signed.starts_with("signed-by:key0-cert\n"));

        let calls = orchestrator.archiver.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0], report.manifest);
    }

    #[tokio::test]
    async fn empty_manifest_is_not_archived() {
        let ws = workspace(&["app.apk"]);
        let settings = settings(ws.path()).archive_signed(false).build().unwrap();
        let orchestrator = orchestrator(settings, FakeSigner::default());

        let report = orchestrator.run(&credentials(&["key0"])).await.unwrap();

        assert!(report.manifest.is_empty());
        assert!(ws.path().join("app-signed.apk").exists());
        assert!(orchestrator.archiver.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn configured_alias_names_the_archive_namespace() {
        let ws = workspace(&["app.apk"]);
        let settings = settings(ws.path()).key_alias("key2").build().unwrap();
        let orchestrator = orchestrator(settings, FakeSigner::default());

        let report = orchestrator
            .run(&credentials(&["key1", "key2"]))
            .await
            .unwrap();

        assert_eq!(
            report.manifest.get("SignApksBuilder-out/ks1/key2/app.apk/app-signed.apk"),
            Some("app-signed.apk")
        );
        let signed = std::fs::read_to_string(ws.path().join("app-signed.apk")).unwrap();
        assert!(signed.starts_with("signed-by:key2-cert"));
    }

    #[tokio::test]
    async fn builder_dir_mapping_writes_into_scratch() {
        let ws = workspace(&["app-unsigned.apk"]);
        let settings = settings(ws.path())
            .key_alias("key0")
            .archive_unsigned(true)
            .mapping(MappingStrategy::BuilderDir)
            .build()
            .unwrap();
        let orchestrator = orchestrator(settings, FakeSigner::default());

        let report = orchestrator.run(&credentials(&["key0"])).await.unwrap();

        let expected = ws
            .path()
            .join("SignApksBuilder-out/ks1/key0/app-unsigned.apk/app-signed.apk");
        assert_eq!(report.apks[0].signed, expected);
        assert!(expected.exists());
        assert_eq!(
            report
                .manifest
                .get("SignApksBuilder-out/ks1/key0/app-unsigned.apk/app-signed.apk"),
            Some("SignApksBuilder-out/ks1/key0/app-unsigned.apk/app-signed.apk")
        );
        assert_eq!(
            report
                .manifest
                .get("SignApksBuilder-out/ks1/key0/app-unsigned.apk/app-unsigned.apk"),
            Some("app-unsigned.apk")
        );
    }

    #[tokio::test]
    async fn stale_destination_is_replaced() {
        let ws = workspace(&["app-unsigned.apk", "app.apk"]);
        let settings = settings(ws.path())
            .apks_to_sign("app-unsigned.apk")
            .build()
            .unwrap();
        let orchestrator = orchestrator(settings, FakeSigner::default());

        orchestrator.run(&credentials(&["key0"])).await.unwrap();

        let signed = std::fs::read_to_string(ws.path().join("app.apk")).unwrap();
        assert!(signed.starts_with("signed-by:"));
    }

    #[tokio::test]
    async fn signer_failure_aborts_and_removes_partial_output() {
        let ws = workspace(&["a.apk", "b.apk"]);
        let settings = settings(ws.path()).build().unwrap();
        let orchestrator = orchestrator(settings, FakeSigner { fail: true });

        let err = orchestrator.run(&credentials(&["key0"])).await.unwrap_err();

        assert!(matches!(err, Error::SigningLibrary { .. }));
        assert!(err.to_string().contains("signature block rejected"));
        assert!(!ws.path().join("a-signed.apk").exists());
        assert!(!ws.path().join("b-signed.apk").exists());
        assert!(orchestrator.archiver.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn ambiguous_key_fails_before_any_scratch_output() {
        let ws = workspace(&["app.apk"]);
        let settings = settings(ws.path()).build().unwrap();
        let orchestrator = orchestrator(settings, FakeSigner::default());

        let err = orchestrator
            .run(&credentials(&["key1", "key2"]))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            Error::KeyResolution {
                source: crate::signing::error::KeyError::UnrecoverableKey { .. },
                ..
            }
        ));
        assert!(!ws.path().join("SignApksBuilder-out").exists());
        assert!(!ws.path().join("app-signed.apk").exists());
    }

    #[tokio::test]
    async fn unknown_key_store_is_a_key_resolution_error() {
        let ws = workspace(&["app.apk"]);
        let settings = settings(ws.path()).key_store_id("nope").build().unwrap();
        let orchestrator = orchestrator(settings, FakeSigner::default());

        let err = orchestrator.run(&credentials(&["key0"])).await.unwrap_err();
        assert_eq!(err.kind(), "KeyResolutionError");
    }

    #[tokio::test]
    async fn unmatched_glob_fails_before_any_scratch_output() {
        let ws = workspace(&["app.apk"]);
        let settings = settings(ws.path())
            .apks_to_sign("app.apk, missing-*.apk")
            .build()
            .unwrap();
        let orchestrator = orchestrator(settings, FakeSigner::default());

        let err = orchestrator.run(&credentials(&["key0"])).await.unwrap_err();

        assert!(matches!(err, Error::GlobNoMatch { .. }));
        assert!(!ws.path().join("SignApksBuilder-out").exists());
        assert!(!ws.path().join("app-signed.apk").exists());
    }

    #[tokio::test]
    async fn missing_zipalign_fails_the_plan() {
        let ws = workspace(&["app.apk"]);
        let settings = settings(ws.path()).skip_zipalign(false).build().unwrap();
        let orchestrator = orchestrator(settings, FakeSigner::default());

        let err = orchestrator.plan(&credentials(&["key0"])).unwrap_err();
        assert!(matches!(err, Error::ToolNotFound { .. }));
        assert!(err.to_string().contains("zipalign"));
    }

    #[tokio::test]
    async fn credential_default_alias_is_used_when_none_configured() {
        let ws = workspace(&["app.apk"]);
        let settings = settings(ws.path()).build().unwrap();
        let orchestrator = orchestrator(settings, FakeSigner::default());

        let mut credentials = credentials(&["key1", "key2"]);
        if let Some(credential) = credentials.get_mut("ks1") {
            credential.default_alias = Some("key1".into());
        }

        let plan = orchestrator.plan(&credentials).unwrap();
        assert_eq!(plan.components.alias, "key1");
        assert_eq!(plan.apks[0].destination, ws.path().join("app-signed.apk"));
    }
}
