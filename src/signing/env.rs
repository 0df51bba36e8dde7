//! Immutable environment snapshot used for tool resolution.
//!
//! The pipeline never reads the process environment directly after start-up;
//! it captures a snapshot once and threads it through every component.

use regex::{Captures, Regex};
use std::collections::BTreeMap;
use std::sync::LazyLock;

/// Environment variable naming the zipalign executable.
pub const ENV_ZIPALIGN_PATH: &str = "ANDROID_ZIPALIGN";

/// Environment variable naming the apksigner executable.
pub const ENV_APKSIGNER_PATH: &str = "ANDROID_APKSIGNER";

/// Environment variable naming the Android SDK root.
pub const ENV_ANDROID_HOME: &str = "ANDROID_HOME";

/// Searchable directory list.
pub const ENV_PATH: &str = "PATH";

static VAR_REF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_.]*)\}|\$([A-Za-z_][A-Za-z0-9_]*)")
        .expect("variable reference pattern is valid")
});

/// Snapshot of environment variables.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvVars {
    vars: BTreeMap<String, String>,
}

impl EnvVars {
    /// Creates an empty snapshot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Captures the current process environment.
    pub fn capture() -> Self {
        std::env::vars_os()
            .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
            .collect()
    }

    /// Sets a variable, replacing any previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(key.into(), value.into());
    }

    /// Builder-style [`EnvVars::insert`].
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    /// Returns a variable, treating blank values as unset.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
    }

    /// Expands `${VAR}` and `$VAR` references.
    ///
    /// References to unknown variables are left verbatim.
    pub fn expand(&self, value: &str) -> String {
        VAR_REF
            .replace_all(value, |caps: &Captures<'_>| {
                let name = caps
                    .get(1)
                    .or_else(|| caps.get(2))
                    .map(|m| m.as_str())
                    .unwrap_or_default();
                match self.vars.get(name) {
                    Some(v) => v.clone(),
                    None => caps[0].to_string(),
                }
            })
            .into_owned()
    }

    /// Splits the PATH-like variable into its entries, dropping empty ones.
    pub fn path_entries(&self) -> Vec<std::path::PathBuf> {
        match self.vars.get(ENV_PATH) {
            Some(path) => std::env::split_paths(path)
                .filter(|p| !p.as_os_str().is_empty())
                .collect(),
            None => Vec::new(),
        }
    }
}

impl FromIterator<(String, String)> for EnvVars {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            vars: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expands_braced_and_bare_references() {
        let env = EnvVars::new()
            .with("ALT_ZIPALIGN", "/opt/zipalign")
            .with("HOME", "/home/ci");
        assert_eq!(env.expand("${ALT_ZIPALIGN}"), "/opt/zipalign");
        assert_eq!(env.expand("$HOME/sdk"), "/home/ci/sdk");
    }

    #[test]
    fn leaves_unknown_references_untouched() {
        let env = EnvVars::new();
        assert_eq!(env.expand("${NOPE}/zipalign"), "${NOPE}/zipalign");
    }

    #[test]
    fn blank_values_read_as_unset() {
        let env = EnvVars::new().with(ENV_ANDROID_HOME, "  ");
        assert_eq!(env.get(ENV_ANDROID_HOME), None);
    }

    #[test]
    fn path_entries_skip_empty_segments() {
        let joined = std::env::join_paths(["/a", "", "/b"]).unwrap();
        let env = EnvVars::new().with(ENV_PATH, joined.to_string_lossy());
        assert_eq!(
            env.path_entries(),
            vec![std::path::PathBuf::from("/a"), std::path::PathBuf::from("/b")]
        );
    }
}
