//! Compiler version read from an installed toolchain
//!
//! The installed `include/clang/Basic/Version.inc` header is the source of
//! truth: the long version names the resource directory and the PGO profile.

use crate::error::{BuildError, BuildResult};
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};

/// Version of a built compiler
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct CompilerVersion {
    pub major: String,
    pub minor: String,
    pub patch: String,
}

impl CompilerVersion {
    pub fn new(major: impl Into<String>, minor: impl Into<String>, patch: impl Into<String>) -> Self {
        Self {
            major: major.into(),
            minor: minor.into(),
            patch: patch.into(),
        }
    }

    /// Location of the version header inside an install tree
    pub fn header_path(install_dir: &Path) -> PathBuf {
        install_dir.join("include/clang/Basic/Version.inc")
    }

    /// Read the version of the compiler installed at `install_dir`
    pub fn from_install(install_dir: &Path) -> BuildResult<Self> {
        let header = Self::header_path(install_dir);
        let content =
            std::fs::read_to_string(&header).map_err(|e| BuildError::version_file(&header, e))?;
        Self::parse(&content).map_err(|reason| BuildError::version_file(&header, reason))
    }

    /// Parse the `#define CLANG_VERSION_*` lines of Version.inc
    pub fn parse(content: &str) -> Result<Self, String> {
        let mut major = None;
        let mut minor = None;
        let mut patch = None;

        for line in content.lines() {
            let mut parts = line.split_whitespace();
            if parts.next() != Some("#define") {
                continue;
            }
            let (Some(name), Some(value)) = (parts.next(), parts.next()) else {
                continue;
            };
            let slot = match name {
                "CLANG_VERSION_MAJOR" => &mut major,
                "CLANG_VERSION_MINOR" => &mut minor,
                "CLANG_VERSION_PATCHLEVEL" => &mut patch,
                _ => continue,
            };
            if value.is_empty() || !value.chars().all(|c| c.is_ascii_digit()) {
                return Err(format!("{} has non-numeric value '{}'", name, value));
            }
            *slot = Some(value.to_string());
        }

        match (major, minor, patch) {
            (Some(major), Some(minor), Some(patch)) => Ok(Self::new(major, minor, patch)),
            (None, _, _) => Err("CLANG_VERSION_MAJOR not defined".to_string()),
            (_, None, _) => Err("CLANG_VERSION_MINOR not defined".to_string()),
            (_, _, None) => Err("CLANG_VERSION_PATCHLEVEL not defined".to_string()),
        }
    }

    /// `major.minor.patch`; names the resource directory and PGO profile
    pub fn long_version(&self) -> String {
        format!("{}.{}.{}", self.major, self.minor, self.patch)
    }

    /// `major.minor`; used by versioned binaries and shared libraries
    pub fn short_version(&self) -> String {
        format!("{}.{}", self.major, self.minor)
    }
}

impl fmt::Display for CompilerVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.long_version())
    }
}
