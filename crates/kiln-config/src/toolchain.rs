//! Toolchain Configuration (kiln.toml)
//!
//! Every field has a default matching the pinned prebuilts of the release
//! branch, so an empty or missing kiln.toml is a valid configuration.

use crate::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Toolchain configuration from kiln.toml
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default, deny_unknown_fields)]
pub struct ToolchainConfig {
    /// Source, output and distribution directories
    pub paths: PathsConfig,

    /// Pinned prebuilt toolchains
    pub prebuilts: PrebuiltsConfig,

    /// Release identity stamped into the compiler
    pub release: ReleaseConfig,

    /// Final-stage compiler settings
    pub stage2: Stage2Config,
}

/// Directory configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default, deny_unknown_fields)]
pub struct PathsConfig {
    /// Root of the source checkout (default: directory holding kiln.toml)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_root: Option<PathBuf>,

    /// Output root for build and install trees (default: <source_root>/out)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub out_dir: Option<PathBuf>,

    /// Package destination (default: the output root)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dist_dir: Option<PathBuf>,
}

/// Prebuilt toolchain pins
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct PrebuiltsConfig {
    /// Baseline compiler used for stage 1 (directory under prebuilts/clang/host/<os>)
    pub clang: String,

    /// NDK release providing sysroots and the C++ runtime
    pub ndk: String,

    /// GCC cross-toolchain version providing binutils and libgcc
    pub gcc: String,

    /// Binutils release whose headers feed the gold plugin
    pub binutils: String,

    /// Mingw toolchain used for Windows hosts
    pub mingw: String,
}

impl Default for PrebuiltsConfig {
    fn default() -> Self {
        Self {
            clang: "clang-4393122".to_string(),
            ndk: "r16".to_string(),
            gcc: "4.9".to_string(),
            binutils: "2.27".to_string(),
            mingw: "x86_64-w64-mingw32-4.8".to_string(),
        }
    }
}

/// Release identity
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ReleaseConfig {
    /// Upstream source revision the toolchain is based on
    pub revision: String,

    /// Patch level stamped as LLVM_VERSION_PATCH / CLANG_VERSION_PATCHLEVEL
    pub patch_level: String,

    /// Repository string embedded in clang --version
    pub clang_repository: String,

    /// Repository string embedded in llvm tools --version
    pub llvm_repository: String,
}

impl Default for ReleaseConfig {
    fn default() -> Self {
        Self {
            revision: "r316199".to_string(),
            patch_level: "1".to_string(),
            clang_repository: "https://android.googlesource.com/toolchain/clang".to_string(),
            llvm_repository: "https://android.googlesource.com/toolchain/llvm".to_string(),
        }
    }
}

/// Final-stage compiler configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Stage2Config {
    /// LLVM backends built into the final compiler
    pub targets: Vec<String>,
}

impl Default for Stage2Config {
    fn default() -> Self {
        Self {
            targets: ["AArch64", "ARM", "BPF", "Mips", "X86"]
                .iter()
                .map(|t| t.to_string())
                .collect(),
        }
    }
}

impl Stage2Config {
    /// Targets in the `;`-separated form LLVM_TARGETS_TO_BUILD expects
    pub fn targets_to_build(&self) -> String {
        self.targets.join(";")
    }
}

impl ToolchainConfig {
    /// Load configuration from a kiln.toml file
    pub fn load_from_file(path: &Path) -> ConfigResult<Self> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content, path)
    }

    /// Parse configuration text; `origin` is only used in error messages
    pub fn parse(content: &str, origin: &Path) -> ConfigResult<Self> {
        let config: Self = toml::from_str(content).map_err(|error| ConfigError::TomlParseError {
            file: origin.to_path_buf(),
            error,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would produce malformed paths or build variables
    pub fn validate(&self) -> ConfigResult<()> {
        let pins = [
            ("prebuilts.clang", &self.prebuilts.clang),
            ("prebuilts.ndk", &self.prebuilts.ndk),
            ("prebuilts.gcc", &self.prebuilts.gcc),
            ("prebuilts.binutils", &self.prebuilts.binutils),
            ("prebuilts.mingw", &self.prebuilts.mingw),
        ];
        for (field, value) in pins {
            if value.is_empty() || value.contains('/') {
                return Err(ConfigError::InvalidValue {
                    field: field.to_string(),
                    reason: format!("'{}' is not a plain directory name", value),
                });
            }
        }

        if self.release.patch_level.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "release.patch_level".to_string(),
                reason: "must not be empty".to_string(),
            });
        }

        if self.stage2.targets.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "stage2.targets".to_string(),
                reason: "at least one LLVM target is required".to_string(),
            });
        }

        Ok(())
    }
}
