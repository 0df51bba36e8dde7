//! External tool detection for the Android SDK build tools.
//!
//! Locates `zipalign` (and `apksigner`) by walking a fixed precedence chain:
//!
//! 1. an explicitly configured executable path,
//! 2. an explicitly configured SDK home,
//! 3. the tool's own environment variable (e.g. `ANDROID_ZIPALIGN`),
//! 4. `ANDROID_HOME`,
//! 5. every directory on `PATH`.
//!
//! Each source is a pure function over an immutable [`EnvVars`] snapshot that
//! either yields an existing file or falls through to the next one.

use crate::signing::{
    env::{ENV_ANDROID_HOME, ENV_APKSIGNER_PATH, ENV_ZIPALIGN_PATH, EnvVars},
    error::{Error, Result},
};
use std::cmp::Ordering;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Marker file present in the `tools` directory of an SDK tools install.
const SDK_TOOLS_MARKER: &str = "android";

/// Marker file present in `tools/bin` of an SDK manager install.
const SDK_MANAGER_MARKER: &str = "sdkmanager";

/// An SDK build tool and the environment variable that may point at it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToolSpec {
    /// Executable name without platform suffix
    pub name: &'static str,
    /// Environment variable naming the executable directly
    pub env_var: &'static str,
}

/// The zip alignment tool.
pub const ZIPALIGN: ToolSpec = ToolSpec {
    name: "zipalign",
    env_var: ENV_ZIPALIGN_PATH,
};

/// The APK signing tool.
pub const APKSIGNER: ToolSpec = ToolSpec {
    name: "apksigner",
    env_var: ENV_APKSIGNER_PATH,
};

/// Resolves the absolute path of an SDK build tool.
#[derive(Debug, Clone)]
pub struct ToolResolver<'a> {
    spec: ToolSpec,
    env: &'a EnvVars,
    explicit_path: Option<String>,
    android_home: Option<String>,
}

impl<'a> ToolResolver<'a> {
    /// Creates a resolver for `spec` over the given environment snapshot.
    pub fn new(spec: ToolSpec, env: &'a EnvVars) -> Self {
        Self {
            spec,
            env,
            explicit_path: None,
            android_home: None,
        }
    }

    /// Sets the explicitly configured executable path. Blank values are ignored.
    pub fn explicit_path(mut self, path: Option<&str>) -> Self {
        self.explicit_path = non_blank(path);
        self
    }

    /// Sets the explicitly configured SDK home. Blank values are ignored.
    pub fn android_home(mut self, path: Option<&str>) -> Self {
        self.android_home = non_blank(path);
        self
    }

    /// Walks the precedence chain and returns the first existing executable.
    ///
    /// # Errors
    ///
    /// [`Error::ToolNotFound`] listing every location consulted.
    pub fn resolve(&self) -> Result<PathBuf> {
        let sources: [(&str, fn(&Self, &mut Vec<String>) -> Option<PathBuf>); 5] = [
            ("explicit tool path", Self::from_explicit_path),
            ("explicit SDK home", Self::from_explicit_android_home),
            ("tool environment variable", Self::from_tool_env),
            ("SDK home environment variable", Self::from_android_home_env),
            ("PATH", Self::from_path_env),
        ];

        let mut tried = Vec::new();
        for (label, source) in sources {
            if let Some(path) = source(self, &mut tried) {
                let path = absolute(path);
                log::debug!("{} resolved from {}: {}", self.spec.name, label, path.display());
                return Ok(path);
            }
        }

        Err(Error::ToolNotFound {
            tool: self.spec.name.to_string(),
            tried,
        })
    }

    fn from_explicit_path(&self, tried: &mut Vec<String>) -> Option<PathBuf> {
        let raw = self.explicit_path.as_deref()?;
        let path = PathBuf::from(self.env.expand(raw));
        tried.push(format!("explicit {} path {}", self.spec.name, path.display()));
        existing_executable(&path)
    }

    fn from_explicit_android_home(&self, tried: &mut Vec<String>) -> Option<PathBuf> {
        let raw = self.android_home.as_deref()?;
        let home = PathBuf::from(self.env.expand(raw));
        tried.push(format!("explicit SDK home {}", home.display()));
        latest_build_tool(&home, self.spec.name)
    }

    fn from_tool_env(&self, tried: &mut Vec<String>) -> Option<PathBuf> {
        let Some(value) = self.env.get(self.spec.env_var) else {
            tried.push(format!("{} (unset)", self.spec.env_var));
            return None;
        };
        let path = PathBuf::from(value);
        tried.push(format!("{}={}", self.spec.env_var, path.display()));
        existing_executable(&path)
    }

    fn from_android_home_env(&self, tried: &mut Vec<String>) -> Option<PathBuf> {
        let Some(value) = self.env.get(ENV_ANDROID_HOME) else {
            tried.push(format!("{ENV_ANDROID_HOME} (unset)"));
            return None;
        };
        let home = PathBuf::from(value);
        tried.push(format!("{}={}", ENV_ANDROID_HOME, home.display()));
        latest_build_tool(&home, self.spec.name)
    }

    fn from_path_env(&self, tried: &mut Vec<String>) -> Option<PathBuf> {
        let entries = self.env.path_entries();
        if entries.is_empty() {
            tried.push("PATH (unset)".to_string());
            return None;
        }

        entries.iter().find_map(|dir| {
            tried.push(format!("PATH entry {}", dir.display()));
            self.from_path_entry(dir)
        })
    }

    /// Checks the SDK layouts a single PATH entry may represent.
    fn from_path_entry(&self, dir: &Path) -> Option<PathBuf> {
        if let Some(found) = existing_executable(&dir.join(self.spec.name)) {
            return Some(found);
        }

        // <sdk>/tools on PATH
        if dir.join(SDK_TOOLS_MARKER).is_file() {
            if let Some(found) = dir.parent().and_then(|home| latest_build_tool(home, self.spec.name)) {
                return Some(found);
            }
        }

        // <sdk>/tools/bin on PATH
        if dir.join(SDK_MANAGER_MARKER).is_file() {
            let home = dir.parent().and_then(Path::parent);
            if let Some(found) = home.and_then(|home| latest_build_tool(home, self.spec.name)) {
                return Some(found);
            }
        }

        // <sdk> itself on PATH
        latest_build_tool(dir, self.spec.name)
    }
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn absolute(path: PathBuf) -> PathBuf {
    if path.is_absolute() {
        return path;
    }
    std::env::current_dir()
        .map(|cwd| cwd.join(&path))
        .unwrap_or(path)
}

/// Returns `path` if it is a file, or its `.exe` sibling when that exists instead.
pub(crate) fn existing_executable(path: &Path) -> Option<PathBuf> {
    if path.is_file() {
        return Some(path.to_path_buf());
    }
    if path.extension().is_some() {
        return None;
    }

    let mut exe = OsString::from(path.as_os_str());
    exe.push(".exe");
    let exe = PathBuf::from(exe);
    exe.is_file().then_some(exe)
}

/// Finds `tool` in the highest versioned `build-tools` directory of `sdk_home`
/// that contains it.
///
/// Directories are ordered by [`cmp_version`], independent of iteration order.
pub(crate) fn latest_build_tool(sdk_home: &Path, tool: &str) -> Option<PathBuf> {
    let build_tools = sdk_home.join("build-tools");
    let entries = std::fs::read_dir(&build_tools).ok()?;

    entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().is_dir())
        .filter_map(|entry| {
            let version = entry.file_name().into_string().ok()?;
            let found = existing_executable(&entry.path().join(tool))?;
            Some((version, found))
        })
        .max_by(|(lhs, _), (rhs, _)| cmp_version(lhs, rhs))
        .map(|(_, path)| path)
}

/// Compares dotted version strings in natural order.
///
/// Digit runs compare numerically, everything else lexicographically, so
/// `1.10` orders after `1.9` and `34.0.0-rc1` after `33.0.2`.
pub fn cmp_version(mut lhs: &str, mut rhs: &str) -> Ordering {
    fn advance<'a>(stream: &mut &'a str) -> (&'a str, &'a str) {
        let rem = *stream;
        let (name, rem) = rem.split_at(rem.find(|c: char| c.is_ascii_digit()).unwrap_or(rem.len()));
        let (number, rem) =
            rem.split_at(rem.find(|c: char| !c.is_ascii_digit()).unwrap_or(rem.len()));
        *stream = rem;
        (name, number)
    }

    while !lhs.is_empty() || !rhs.is_empty() {
        let (l_name, l_num) = advance(&mut lhs);
        let (r_name, r_num) = advance(&mut rhs);

        let ordering = l_name.cmp(r_name).then_with(|| {
            match (l_num.parse::<u64>(), r_num.parse::<u64>()) {
                (Ok(l), Ok(r)) => l.cmp(&r),
                _ => Ordering::Equal,
            }
            .then_with(|| l_num.cmp(r_num))
        });
        if ordering != Ordering::Equal {
            return ordering;
        }
    }

    Ordering::Equal
}
