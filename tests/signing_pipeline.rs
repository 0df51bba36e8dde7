//! End-to-end runs of the signing pipeline against a fake SDK.
//!
//! zipalign is a shell script that copies its input and tags the copy, so the
//! tests can tell aligned bytes from unaligned ones.

#![cfg(unix)]

use kodegen_bundler_apksign::signing::{
    self,
    ApkSigner, ApkState, ArchiveManifest, ArtifactArchiver, DirectoryArchiver, EnvVars, Error,
    KeyError, KeyStoreCredential, MemoryKeyStore, SettingsBuilder, SignRequest,
    SigningOrchestrator, SigningSettings,
    keystore::{CertificateDer, PrivateKeyDer},
};
use std::collections::BTreeMap;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tempfile::TempDir;

const SCRATCH: &str = "SignApksBuilder-out";

/// Prepends the leaf certificate to the aligned bytes.
struct CertStampingSigner;

impl ApkSigner for CertStampingSigner {
    async fn sign(&self, request: SignRequest<'_>) -> anyhow::Result<()> {
        let mut out = request.components.certificate_chain[0].as_der().to_vec();
        out.extend(tokio::fs::read(request.input).await?);
        tokio::fs::write(request.output, out).await?;
        Ok(())
    }
}

#[derive(Default)]
struct CountingArchiver {
    calls: Mutex<Vec<ArchiveManifest>>,
}

impl ArtifactArchiver for CountingArchiver {
    async fn archive(&self, manifest: &ArchiveManifest) -> signing::Result<()> {
        self.calls.lock().unwrap().push(manifest.clone());
        Ok(())
    }
}

struct Fixture {
    root: TempDir,
}

impl Fixture {
    fn new(apks: &[&str]) -> Self {
        let root = TempDir::new().unwrap();
        for apk in apks {
            let path = root.path().join("workspace").join(apk);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, format!("apk:{apk}\n")).unwrap();
        }
        Self { root }
    }

    fn workspace(&self) -> PathBuf {
        self.root.path().join("workspace")
    }

    /// Installs `android-sdk/build-tools/<version>/zipalign` and returns the SDK home.
    fn install_zipalign(&self, version: &str, body: &str) -> PathBuf {
        let home = self.root.path().join("android-sdk");
        let dir = home.join("build-tools").join(version);
        std::fs::create_dir_all(&dir).unwrap();
        let tool = dir.join("zipalign");
        std::fs::write(&tool, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&tool, std::fs::Permissions::from_mode(0o755)).unwrap();
        home
    }

    fn working_sdk(&self) -> EnvVars {
        let home = self.install_zipalign(
            "1.0",
            r#"for last; do :; done
cp "$4" "$last" && echo "aligned" >> "$last""#,
        );
        EnvVars::new().with("ANDROID_HOME", home.to_string_lossy())
    }

    fn settings(&self) -> SettingsBuilder {
        SettingsBuilder::new()
            .workspace(self.workspace())
            .key_store_id("ks1")
    }

    fn read(&self, relative: &str) -> String {
        std::fs::read_to_string(self.workspace().join(relative)).unwrap()
    }
}

fn key_stores(aliases: &[&str]) -> BTreeMap<String, KeyStoreCredential> {
    let mut store = MemoryKeyStore::new();
    for alias in aliases {
        store.insert_private_key(
            alias,
            PrivateKeyDer::new(alias.as_bytes().to_vec()),
            vec![CertificateDer::new(format!("cert:{alias}\n").into_bytes())],
        );
    }
    BTreeMap::from([("ks1".to_string(), store.into_credential("ks1"))])
}

fn orchestrator(
    settings: SigningSettings,
    env: EnvVars,
) -> SigningOrchestrator<CertStampingSigner, CountingArchiver> {
    SigningOrchestrator::new(settings, env, CertStampingSigner, CountingArchiver::default())
}

fn scratch_entries(workspace: &Path) -> Vec<PathBuf> {
    match std::fs::read_dir(workspace.join(SCRATCH)) {
        Ok(entries) => entries.map(|e| e.unwrap().path()).collect(),
        Err(_) => Vec::new(),
    }
}

#[tokio::test]
async fn signs_two_apks_and_archives_four_artifacts() {
    let fixture = Fixture::new(&["a-unsigned.apk", "b.apk"]);
    let settings = fixture
        .settings()
        .apks_to_sign("*.apk")
        .archive_signed(true)
        .archive_unsigned(true)
        .build()
        .unwrap();
    let archiver = CountingArchiver::default();
    let orchestrator =
        SigningOrchestrator::new(settings, fixture.working_sdk(), CertStampingSigner, &archiver);

    let report = orchestrator.run(&key_stores(&["key0"])).await.unwrap();

    let archived: Vec<_> = report.manifest.iter().collect();
    assert_eq!(
        archived,
        [
            ("SignApksBuilder-out/ks1//a-unsigned.apk/a-unsigned.apk", "a-unsigned.apk"),
            ("SignApksBuilder-out/ks1//a-unsigned.apk/a.apk", "a.apk"),
            ("SignApksBuilder-out/ks1//b.apk/b.apk", "b.apk"),
            ("SignApksBuilder-out/ks1//b.apk/b-signed.apk", "b-signed.apk"),
        ]
    );

    // Signed with the only certificate, over aligned bytes.
    assert_eq!(fixture.read("a.apk"), "cert:key0\napk:a-unsigned.apk\naligned\n");
    assert_eq!(fixture.read("b-signed.apk"), "cert:key0\napk:b.apk\naligned\n");
    // Inputs are left untouched.
    assert_eq!(fixture.read("a-unsigned.apk"), "apk:a-unsigned.apk\n");

    for apk in &report.apks {
        assert_eq!(apk.state, ApkState::Archivable);
        assert!(apk.aligned.starts_with(fixture.workspace().join(SCRATCH).join("zipalign")));
        let name = apk.aligned.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("aligned-"), "{name}");
    }

    let calls = archiver.calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0], report.manifest);
}

#[tokio::test]
async fn two_private_keys_without_alias_archive_nothing() {
    let fixture = Fixture::new(&["a-unsigned.apk", "b.apk"]);
    let archiver = CountingArchiver::default();
    let settings = fixture
        .settings()
        .apks_to_sign("*.apk")
        .archive_unsigned(true)
        .build()
        .unwrap();
    let orchestrator =
        SigningOrchestrator::new(settings, fixture.working_sdk(), CertStampingSigner, &archiver);

    let err = orchestrator
        .run(&key_stores(&["key1", "key2"]))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        Error::KeyResolution {
            source: KeyError::UnrecoverableKey { .. },
            ..
        }
    ));
    assert!(archiver.calls.lock().unwrap().is_empty());
    assert!(scratch_entries(&fixture.workspace()).is_empty());
}

#[tokio::test]
async fn missing_zipalign_archives_nothing() {
    let fixture = Fixture::new(&["app.apk"]);
    let archiver = CountingArchiver::default();
    let settings = fixture.settings().apks_to_sign("*.apk").build().unwrap();
    let env = EnvVars::new()
        .with("ANDROID_HOME", "/null_android")
        .with("PATH", "/null_bin");
    let orchestrator = SigningOrchestrator::new(settings, env, CertStampingSigner, &archiver);

    let err = orchestrator.run(&key_stores(&["key0"])).await.unwrap_err();

    assert!(matches!(err, Error::ToolNotFound { .. }));
    let message = err.to_string();
    assert!(message.contains("zipalign"));
    assert!(message.contains("/null_android"));
    assert!(message.contains("/null_bin"));
    assert!(archiver.calls.lock().unwrap().is_empty());
    assert!(!fixture.workspace().join("app-signed.apk").exists());
}

#[tokio::test]
async fn unmatched_glob_leaves_no_scratch_artifacts() {
    let fixture = Fixture::new(&["app.apk"]);
    let settings = fixture
        .settings()
        .apks_to_sign("app.apk, *-release.apk")
        .build()
        .unwrap();
    let orchestrator = orchestrator(settings, fixture.working_sdk());

    let err = orchestrator.run(&key_stores(&["key0"])).await.unwrap_err();

    assert_eq!(err.to_string(), "No APKs in workspace matching *-release.apk");
    assert!(scratch_entries(&fixture.workspace()).is_empty());
    assert!(!fixture.workspace().join("app-signed.apk").exists());
}

#[tokio::test]
async fn overlapping_globs_sign_each_apk_once() {
    let fixture = Fixture::new(&["SignApksBuilderTest.apk"]);
    let settings = fixture
        .settings()
        .apks_to_sign("SignApksBuilderTest.apk, *Test.apk")
        .build()
        .unwrap();
    let orchestrator = orchestrator(settings, fixture.working_sdk());

    let report = orchestrator.run(&key_stores(&["key0"])).await.unwrap();

    assert_eq!(report.apks.len(), 1);
    assert_eq!(report.manifest.len(), 1);
}

#[tokio::test]
async fn zipalign_failure_stops_at_the_first_apk() {
    let fixture = Fixture::new(&["a.apk", "b.apk"]);
    let home = fixture.install_zipalign("1.0", "echo 'bad archive' >&2; exit 1");
    let archiver = CountingArchiver::default();
    let settings = fixture.settings().apks_to_sign("*.apk").build().unwrap();
    let env = EnvVars::new().with("ANDROID_HOME", home.to_string_lossy());
    let orchestrator = SigningOrchestrator::new(settings, env, CertStampingSigner, &archiver);

    let err = orchestrator.run(&key_stores(&["key0"])).await.unwrap_err();

    match &err {
        Error::AlignmentProcess { apk, code } => {
            assert!(apk.ends_with("a.apk"));
            assert_eq!(*code, Some(1));
        }
        other => panic!("unexpected error {other}"),
    }
    assert!(err.to_string().contains("exit code 1"));
    assert!(!fixture.workspace().join("a-signed.apk").exists());
    assert!(!fixture.workspace().join("b-signed.apk").exists());
    assert!(archiver.calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn zipalign_exit_zero_without_output_is_fatal() {
    let fixture = Fixture::new(&["a.apk"]);
    let home = fixture.install_zipalign("1.0", r#"for last; do :; done; rm -f "$last""#);
    let settings = fixture.settings().apks_to_sign("*.apk").build().unwrap();
    let env = EnvVars::new().with("ANDROID_HOME", home.to_string_lossy());

    let err = orchestrator(settings, env)
        .run(&key_stores(&["key0"]))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::AlignedApkMissing { .. }));
}

#[tokio::test]
async fn skip_zipalign_signs_the_source_directly() {
    let fixture = Fixture::new(&["app-unsigned.apk"]);
    let settings = fixture
        .settings()
        .apks_to_sign("*.apk")
        .skip_zipalign(true)
        .build()
        .unwrap();
    // No SDK at all: zipalign is never looked up.
    let orchestrator = orchestrator(settings, EnvVars::new());

    let report = orchestrator.run(&key_stores(&["key0"])).await.unwrap();

    assert_eq!(report.apks[0].aligned, fixture.workspace().join("app-unsigned.apk"));
    assert_eq!(fixture.read("app.apk"), "cert:key0\napk:app-unsigned.apk\n");
    assert!(!fixture.workspace().join(SCRATCH).join("zipalign").exists());
}

#[tokio::test]
async fn latest_build_tools_zipalign_is_used() {
    let fixture = Fixture::new(&["app.apk"]);
    fixture.install_zipalign("1.0", "exit 9");
    let home = fixture.install_zipalign(
        "1.1",
        r#"for last; do :; done
cp "$4" "$last" && echo "aligned by 1.1" >> "$last""#,
    );
    let settings = fixture.settings().apks_to_sign("*.apk").build().unwrap();
    let env = EnvVars::new().with("ANDROID_HOME", home.to_string_lossy());

    orchestrator(settings, env)
        .run(&key_stores(&["key0"]))
        .await
        .unwrap();

    assert!(fixture.read("app-signed.apk").ends_with("aligned by 1.1\n"));
}

#[tokio::test]
async fn directory_archiver_publishes_the_manifest() {
    let fixture = Fixture::new(&["app-unsigned.apk"]);
    let settings = fixture
        .settings()
        .key_alias("key0")
        .apks_to_sign("**/*-unsigned.apk")
        .archive_unsigned(true)
        .build()
        .unwrap();
    let archive_dir = settings.archive_dir();
    let archiver = DirectoryArchiver::new(settings.workspace(), &archive_dir);
    let orchestrator =
        SigningOrchestrator::new(settings, fixture.working_sdk(), CertStampingSigner, archiver);

    orchestrator.run(&key_stores(&["key0"])).await.unwrap();

    let base = archive_dir.join("SignApksBuilder-out/ks1/key0/app-unsigned.apk");
    assert_eq!(
        std::fs::read_to_string(base.join("app-unsigned.apk")).unwrap(),
        "apk:app-unsigned.apk\n"
    );
    assert!(
        std::fs::read_to_string(base.join("app.apk"))
            .unwrap()
            .starts_with("cert:key0\n")
    );
    assert!(archive_dir.join("artifacts.json").exists());
}
