//! Source-tree and prebuilt layout
//!
//! Every fixed location the pipeline reads from or writes to is derived here
//! from the configured roots, so build steps never assemble paths ad hoc.

use crate::toolchain::PrebuiltsConfig;
use crate::{ConfigError, ConfigResult};
use std::path::{Path, PathBuf};

/// Operating system of the machine running the build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostOs {
    Linux,
    Darwin,
}

impl HostOs {
    /// Detect the build host this binary runs on
    pub fn detect() -> Self {
        if cfg!(target_os = "macos") {
            Self::Darwin
        } else {
            Self::Linux
        }
    }

    /// Parse a prebuilts host tag (`linux-x86`, `darwin-x86`)
    pub fn from_os_type(tag: &str) -> ConfigResult<Self> {
        match tag {
            "linux-x86" => Ok(Self::Linux),
            "darwin-x86" => Ok(Self::Darwin),
            other => Err(ConfigError::UnsupportedHost(other.to_string())),
        }
    }

    /// Prebuilts host tag
    pub fn os_type(&self) -> &'static str {
        match self {
            Self::Linux => "linux-x86",
            Self::Darwin => "darwin-x86",
        }
    }

    pub fn is_linux(&self) -> bool {
        matches!(self, Self::Linux)
    }

    pub fn is_darwin(&self) -> bool {
        matches!(self, Self::Darwin)
    }
}

impl std::fmt::Display for HostOs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.os_type())
    }
}

/// Resolved directory layout for one build host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    source_root: PathBuf,
    out_dir: PathBuf,
    prebuilts: PrebuiltsConfig,
    host: HostOs,
}

impl Layout {
    pub fn new(
        source_root: impl Into<PathBuf>,
        out_dir: impl Into<PathBuf>,
        prebuilts: PrebuiltsConfig,
        host: HostOs,
    ) -> Self {
        Self {
            source_root: source_root.into(),
            out_dir: out_dir.into(),
            prebuilts,
            host,
        }
    }

    pub fn host(&self) -> HostOs {
        self.host
    }

    pub fn prebuilts(&self) -> &PrebuiltsConfig {
        &self.prebuilts
    }

    pub fn source_root(&self) -> &Path {
        &self.source_root
    }

    /// Path inside the source checkout
    pub fn source_path(&self, rel: impl AsRef<Path>) -> PathBuf {
        self.source_root.join(rel)
    }

    /// Path inside the output root
    pub fn out_path(&self, rel: impl AsRef<Path>) -> PathBuf {
        self.out_dir.join(rel)
    }

    pub fn out_dir(&self) -> &Path {
        &self.out_dir
    }

    /// The toolchain/ directory holding llvm, binutils and the NDK
    pub fn toolchain_dir(&self) -> PathBuf {
        self.source_path("toolchain")
    }

    /// Path inside the LLVM source tree
    pub fn llvm_path(&self, rel: impl AsRef<Path>) -> PathBuf {
        let llvm = self.toolchain_dir().join("llvm");
        let rel = rel.as_ref();
        if rel.as_os_str().is_empty() {
            llvm
        } else {
            llvm.join(rel)
        }
    }

    /// Baseline compiler used to build stage 1
    pub fn prebuilt_clang_dir(&self) -> PathBuf {
        self.source_path("prebuilts/clang/host")
            .join(self.host.os_type())
            .join(&self.prebuilts.clang)
    }

    pub fn prebuilt_clang_bin(&self) -> PathBuf {
        self.prebuilt_clang_dir().join("bin")
    }

    pub fn prebuilt_clang_lib(&self) -> PathBuf {
        self.prebuilt_clang_dir().join("lib64")
    }

    /// libc++ headers shipped with the baseline compiler (include cxxabi)
    pub fn prebuilt_libcxx_headers(&self) -> PathBuf {
        self.prebuilt_clang_dir().join("include/c++/v1")
    }

    /// Directory holding collected PGO profiles (`<long-version>.profdata`)
    pub fn profiles_dir(&self) -> PathBuf {
        self.source_path("prebuilts/clang/host/linux-x86/profiles")
    }

    pub fn cmake_bin_dir(&self) -> PathBuf {
        self.source_path("prebuilts/cmake")
            .join(self.host.os_type())
            .join("bin")
    }

    pub fn cmake(&self) -> PathBuf {
        self.cmake_bin_dir().join("cmake")
    }

    pub fn ninja(&self) -> PathBuf {
        self.cmake_bin_dir().join("ninja")
    }

    /// Root of the pinned NDK
    pub fn ndk_base(&self) -> PathBuf {
        self.toolchain_dir()
            .join("prebuilts/ndk")
            .join(&self.prebuilts.ndk)
    }

    pub fn ndk_libcxx_headers(&self) -> PathBuf {
        self.ndk_base().join("sources/cxx-stl/llvm-libc++/include")
    }

    pub fn ndk_libcxxabi_headers(&self) -> PathBuf {
        self.ndk_base().join("sources/cxx-stl/llvm-libc++abi/include")
    }

    pub fn ndk_support_headers(&self) -> PathBuf {
        self.ndk_base().join("sources/android/support/include")
    }

    /// Root of the GCC cross toolchains for this host
    pub fn gcc_toolchain_root(&self) -> PathBuf {
        self.source_path("prebuilts/gcc").join(self.host.os_type())
    }

    pub fn binutils_include(&self) -> PathBuf {
        self.toolchain_dir()
            .join("binutils")
            .join(format!("binutils-{}", self.prebuilts.binutils))
            .join("include")
    }

    pub fn bionic_include(&self) -> PathBuf {
        self.source_path("bionic/libc/include")
    }

    /// Mingw toolchain used to cross-compile Windows hosts
    pub fn mingw_root(&self) -> PathBuf {
        self.source_path("prebuilts/gcc/linux-x86/host")
            .join(&self.prebuilts.mingw)
    }

    /// Android-specific files of the LLVM tree (wrappers, module licenses)
    pub fn llvm_android_dir(&self) -> PathBuf {
        self.llvm_path("android")
    }
}
