//! Command line interface for the APK signing step.

mod args;

pub use args::Args;

use crate::config::StepConfig;
use crate::error::{CliError, Result, StepError};
use crate::signing::{
    APKSIGNER, ApksignerTool, ConfigKeyStoreProvider, DirectoryArchiver, EnvVars, SettingsBuilder,
    SigningOrchestrator, SigningPlan, SigningSettings, ToolResolver,
};

/// Main CLI entry point
pub async fn run() -> Result<i32> {
    let args = Args::parse_args();
    execute(args, EnvVars::capture()).await
}

/// Runs the step for already parsed arguments against an environment snapshot.
pub async fn execute(args: Args, env: EnvVars) -> Result<i32> {
    args.validate()
        .map_err(|reason| CliError::InvalidArguments { reason })?;

    let config = StepConfig::load(&args.workspace, args.config.as_deref()).await?;
    let settings = merge_settings(&args, &config)?;
    log::info!(
        "signing APKs in {} with key store {}",
        settings.workspace().display(),
        settings.key_store_id()
    );

    let provider = ConfigKeyStoreProvider::new(settings.workspace(), config.keystores, env.clone());
    let plan = SigningPlan::prepare(&settings, &env, &provider)?;

    if args.dry_run {
        plan.log(&settings);
        log::info!("dry run: {} APK(s) would be signed", plan.apks.len());
        return Ok(0);
    }

    let apksigner = ToolResolver::new(APKSIGNER, &env)
        .explicit_path(settings.apksigner_path())
        .android_home(settings.android_home())
        .resolve()?;
    let signer = ApksignerTool::new(apksigner);
    log::info!("✓ apksigner available: {}", signer.program().display());

    let archiver = DirectoryArchiver::new(settings.workspace(), settings.archive_dir());
    let orchestrator = SigningOrchestrator::new(settings, env, signer, archiver);

    let report = tokio::select! {
        report = orchestrator.execute(&plan) => report?,
        _ = tokio::signal::ctrl_c() => {
            return Err(CliError::Interrupted { stage: "signing".to_string() }.into());
        }
    };

    for apk in &report.apks {
        log::info!("✓ {} -> {}", apk.source.display(), apk.signed.display());
    }
    log::info!(
        "signed {} APK(s), archived {} artifact(s) to {}",
        report.apks.len(),
        report.manifest.len(),
        orchestrator.settings().archive_dir().display()
    );
    Ok(0)
}

/// Command line values override the `[step]` table.
fn merge_settings(args: &Args, config: &StepConfig) -> Result<SigningSettings> {
    let step = &config.step;

    let key_store_id = args
        .key_store_id
        .clone()
        .or_else(|| step.key_store_id.clone())
        .ok_or_else(|| CliError::MissingArgument {
            argument: "--key-store-id".to_string(),
        })?;
    let apks_to_sign = args
        .apks_to_sign
        .clone()
        .or_else(|| step.apks_to_sign.clone())
        .ok_or_else(|| CliError::MissingArgument {
            argument: "--apks".to_string(),
        })?;

    let mut builder = SettingsBuilder::new()
        .workspace(&args.workspace)
        .key_store_id(key_store_id)
        .key_alias(
            args.key_alias
                .clone()
                .or_else(|| step.key_alias.clone())
                .unwrap_or_default(),
        )
        .apks_to_sign(apks_to_sign)
        .archive_signed(args.archive_signed_flag().or(step.archive_signed).unwrap_or(true))
        .archive_unsigned(args.archive_unsigned || step.archive_unsigned.unwrap_or(false))
        .skip_zipalign(args.skip_zipalign || step.skip_zipalign.unwrap_or(false))
        .mapping(args.mapping.or(step.mapping).unwrap_or_default());

    if let Some(path) = args.zipalign_path.as_ref().or(step.zipalign_path.as_ref()) {
        builder = builder.zipalign_path(path.as_str());
    }
    if let Some(home) = args.android_home.as_ref().or(step.android_home.as_ref()) {
        builder = builder.android_home(home.as_str());
    }
    if let Some(path) = args.apksigner_path.as_ref().or(step.apksigner_path.as_ref()) {
        builder = builder.apksigner_path(path.as_str());
    }
    if let Some(dir) = args.archive_dir.as_ref().or(step.archive_dir.as_ref()) {
        builder = builder.archive_dir(dir);
    }

    builder.build().map_err(StepError::from)
}
