//! Kodegen Bundler APK Sign - zipalign and sign Android APKs in a build workspace.
//!
//! Exit code 0 guarantees every selected APK was signed and archived.

use kodegen_bundler_apksign::cli;
use std::process;

#[tokio::main]
async fn main() {
    // Initialize logging, `info` unless RUST_LOG says otherwise
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let exit_code = match cli::run().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {}", e);
            for suggestion in e.recovery_suggestions() {
                eprintln!("  hint: {}", suggestion);
            }
            1
        }
    };

    process::exit(exit_code);
}
