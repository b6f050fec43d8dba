//! Configuration matrix for cross-compiling device runtimes
//!
//! For each requested architecture this resolves the target triple, sysroot,
//! GCC builtins and C++ runtime search paths, and the resulting compiler and
//! linker flags. Everything is derived from fixed tables and the layout; no
//! filesystem access happens here.

use crate::error::{BuildError, BuildResult};
use crate::variables::{join_flags, BuildVariables};
use kiln_config::Layout;
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Device architectures runtimes are built for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Architecture {
    Arm,
    Aarch64,
    X86_64,
    I386,
    Mips,
    Mips64,
}

/// Per-architecture constants
struct ArchSpec {
    /// Architecture name used by the NDK (`arch-<name>` sysroots, ABI dirs)
    secondary_id: &'static str,
    /// Directory under prebuilts/gcc/<os> holding the GCC toolchain
    gcc_family: &'static str,
    /// GCC toolchain prefix, e.g. `arm-linux-androideabi`
    gcc_prefix: &'static str,
    /// LLVM target triple
    triple: &'static str,
    /// Extra code-generation flag
    extra_flag: Option<&'static str>,
}

impl Architecture {
    /// Every architecture, in reference build order
    pub const ALL: [Architecture; 6] = [
        Architecture::Arm,
        Architecture::Aarch64,
        Architecture::X86_64,
        Architecture::I386,
        Architecture::Mips,
        Architecture::Mips64,
    ];

    /// Canonical architecture id
    pub fn id(&self) -> &'static str {
        match self {
            Self::Arm => "arm",
            Self::Aarch64 => "aarch64",
            Self::X86_64 => "x86_64",
            Self::I386 => "i386",
            Self::Mips => "mips",
            Self::Mips64 => "mips64",
        }
    }

    /// Parse a canonical architecture id
    pub fn from_id(id: &str) -> BuildResult<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|arch| arch.id() == id)
            .ok_or_else(|| BuildError::UnknownArchitecture(id.to_string()))
    }

    fn spec(&self) -> ArchSpec {
        match self {
            Self::Arm => ArchSpec {
                secondary_id: "arm",
                gcc_family: "arm",
                gcc_prefix: "arm-linux-androideabi",
                triple: "arm-linux-android",
                extra_flag: Some("-march=armv7-a"),
            },
            Self::Aarch64 => ArchSpec {
                secondary_id: "arm64",
                gcc_family: "aarch64",
                gcc_prefix: "aarch64-linux-android",
                triple: "aarch64-linux-android",
                extra_flag: None,
            },
            Self::X86_64 => ArchSpec {
                secondary_id: "x86_64",
                gcc_family: "x86",
                gcc_prefix: "x86_64-linux-android",
                triple: "x86_64-linux-android",
                extra_flag: None,
            },
            Self::I386 => ArchSpec {
                secondary_id: "x86",
                gcc_family: "x86",
                gcc_prefix: "x86_64-linux-android",
                triple: "i686-linux-android",
                extra_flag: Some("-m32"),
            },
            Self::Mips => ArchSpec {
                secondary_id: "mips",
                gcc_family: "mips",
                gcc_prefix: "mips64el-linux-android",
                triple: "mipsel-linux-android",
                extra_flag: Some("-m32"),
            },
            Self::Mips64 => ArchSpec {
                secondary_id: "mips64",
                gcc_family: "mips",
                gcc_prefix: "mips64el-linux-android",
                triple: "mips64el-linux-android",
                extra_flag: Some("-m64"),
            },
        }
    }

    /// NDK alias of this architecture
    pub fn secondary_id(&self) -> &'static str {
        self.spec().secondary_id
    }

    pub fn triple(&self) -> &'static str {
        self.spec().triple
    }

    /// Whether the NDK ships only 32-bit libraries for this architecture
    pub fn is_32_bit(&self) -> bool {
        matches!(self, Self::Arm | Self::I386 | Self::Mips)
    }

    /// Subdirectory of `<resource>/lib/linux` runtimes are installed into.
    ///
    /// This is the triple's architecture with `i686` folded back to `i386`,
    /// so the MIPS variants diverge from their ids.
    pub fn resource_subdir(&self) -> &'static str {
        match self {
            Self::Arm => "arm",
            Self::Aarch64 => "aarch64",
            Self::X86_64 => "x86_64",
            Self::I386 => "i386",
            Self::Mips => "mipsel",
            Self::Mips64 => "mips64el",
        }
    }

    /// Architecture spelling inside compiler-rt artifact names
    /// (`libclang_rt.<name>-<arch>-android.*`)
    pub fn runtime_file_arch(&self) -> &'static str {
        match self {
            Self::I386 => "i686",
            other => other.id(),
        }
    }

    /// ABI directory of the NDK's prebuilt libc++
    pub fn libcxx_subdir(&self) -> &'static str {
        match self {
            Self::Arm => "armeabi",
            Self::Aarch64 => "arm64-v8a",
            other => other.secondary_id(),
        }
    }

    /// Extra subdirectory holding the 32-bit libgcc inside a multilib toolchain
    fn builtins_subdir(&self) -> Option<&'static str> {
        match self {
            Self::I386 => Some("32"),
            Self::Mips => Some("32/mips-r2"),
            _ => None,
        }
    }

    /// The MIPS linkers reject `--hash-style=both`
    fn supports_hash_style(&self) -> bool {
        !matches!(self, Self::Mips | Self::Mips64)
    }
}

impl FromStr for Architecture {
    type Err = BuildError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_id(s)
    }
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id())
    }
}

/// Which sysroot the runtimes are linked against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PlatformMode {
    /// The device platform sysroot (fixed, recent API level)
    Platform,
    /// The NDK sysroot (oldest supported API level per architecture)
    Ndk,
}

impl PlatformMode {
    /// `__ANDROID_API__` level for an architecture
    pub fn api_level(&self, arch: Architecture) -> &'static str {
        match self {
            Self::Platform => "26",
            Self::Ndk if arch.is_32_bit() => "14",
            Self::Ndk => "21",
        }
    }
}

/// Compiler driving a cross build
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HostCompiler {
    pub cc: PathBuf,
    pub cxx: PathBuf,
}

impl HostCompiler {
    /// The `clang`/`clang++` pair of an install tree
    pub fn from_install(install_dir: &Path) -> Self {
        Self {
            cc: install_dir.join("bin/clang"),
            cxx: install_dir.join("bin/clang++"),
        }
    }
}

/// Flags and variables for cross-compiling to one architecture
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArchitectureConfig {
    pub architecture: Architecture,
    pub secondary_arch_id: &'static str,
    pub toolchain_triple: &'static str,
    pub platform_mode: PlatformMode,
    pub compiler_flags: Vec<String>,
    pub linker_flags: Vec<String>,
    pub build_variables: BuildVariables,
}

impl ArchitectureConfig {
    /// Compiler flags joined for CMAKE_C_FLAGS and friends
    pub fn compiler_flags_string(&self) -> String {
        join_flags(&self.compiler_flags)
    }

    pub fn resource_subdir(&self) -> &'static str {
        self.architecture.resource_subdir()
    }
}

/// Generates [`ArchitectureConfig`]s for a host compiler
#[derive(Debug, Clone)]
pub struct MatrixGenerator<'a> {
    layout: &'a Layout,
    compiler: HostCompiler,
}

impl<'a> MatrixGenerator<'a> {
    pub fn new(layout: &'a Layout, compiler: HostCompiler) -> Self {
        Self { layout, compiler }
    }

    /// One config per requested id, in the caller's order.
    ///
    /// Any unrecognized id fails the whole request.
    pub fn generate<S: AsRef<str>>(
        &self,
        architectures: &[S],
        mode: PlatformMode,
    ) -> BuildResult<Vec<ArchitectureConfig>> {
        architectures
            .iter()
            .map(|id| Architecture::from_id(id.as_ref()).map(|arch| self.config_for(arch, mode)))
            .collect()
    }

    /// Config for every architecture in reference order
    pub fn generate_all(&self, mode: PlatformMode) -> Vec<ArchitectureConfig> {
        Architecture::ALL
            .iter()
            .map(|&arch| self.config_for(arch, mode))
            .collect()
    }

    pub fn config_for(&self, arch: Architecture, mode: PlatformMode) -> ArchitectureConfig {
        let spec = arch.spec();
        let gcc_version = &self.layout.prebuilts().gcc;
        let ndk = self.layout.ndk_base();

        let toolchain_dir = self
            .layout
            .gcc_toolchain_root()
            .join(spec.gcc_family)
            .join(format!("{}-{}", spec.gcc_prefix, gcc_version))
            .join(spec.gcc_prefix);
        let toolchain_bin = toolchain_dir.join("bin");

        let api = mode.api_level(arch);
        let sysroot_libs = ndk
            .join("platforms")
            .join(format!("android-{}", api))
            .join(format!("arch-{}", spec.secondary_id));
        let sysroot = ndk.join("sysroot");
        let header_triple = match arch {
            Architecture::Arm => "arm-linux-androideabi",
            _ => spec.triple,
        };
        let sysroot_headers = sysroot.join("usr/include").join(header_triple);

        let mut builtins = toolchain_dir
            .join("..")
            .join("lib/gcc")
            .join(spec.gcc_prefix)
            .join(format!("{}.x", gcc_version));
        if let Some(subdir) = arch.builtins_subdir() {
            builtins = builtins.join(subdir);
        }

        let libcxx_libs = ndk
            .join("sources/cxx-stl/llvm-libc++/libs")
            .join(arch.libcxx_subdir());
        let toolchain_lib = self.ndk_toolchain_lib(arch);

        let mut linker_flags = vec![
            format!("-L{}", builtins.display()),
            "-Wl,-z,defs".to_string(),
            format!("-L{}", libcxx_libs.display()),
            format!("-L{}", toolchain_lib.display()),
            format!("--sysroot={}", sysroot_libs.display()),
        ];
        if arch.supports_hash_style() {
            linker_flags.push("-Wl,--hash-style=both".to_string());
        }

        let mut compiler_flags = vec![
            format!("--target={}", spec.triple),
            format!("-B{}", toolchain_bin.display()),
            "-isystem".to_string(),
            sysroot_headers.display().to_string(),
            format!("-D__ANDROID_API__={}", api),
        ];
        if let Some(flag) = spec.extra_flag {
            compiler_flags.push(flag.to_string());
        }

        let ldflags = join_flags(&linker_flags);
        let sysroot = sysroot.display().to_string();
        let mut vars = BuildVariables::new();
        vars.set("CMAKE_C_COMPILER", self.compiler.cc.display().to_string())
            .set("CMAKE_CXX_COMPILER", self.compiler.cxx.display().to_string())
            .set("CMAKE_EXE_LINKER_FLAGS", ldflags.as_str())
            .set("CMAKE_SHARED_LINKER_FLAGS", ldflags.as_str())
            .set("CMAKE_MODULE_LINKER_FLAGS", ldflags.as_str())
            .set("CMAKE_SYSROOT", sysroot.as_str())
            .set("CMAKE_SYSROOT_COMPILE", sysroot.as_str());

        ArchitectureConfig {
            architecture: arch,
            secondary_arch_id: spec.secondary_id,
            toolchain_triple: spec.triple,
            platform_mode: mode,
            compiler_flags,
            linker_flags,
            build_variables: vars,
        }
    }

    /// NDK GCC runtime library directory (libatomic and friends)
    fn ndk_toolchain_lib(&self, arch: Architecture) -> PathBuf {
        let spec = arch.spec();
        let gcc_version = &self.layout.prebuilts().gcc;
        let (toolchain_name, host_tag) = match arch {
            Architecture::Arm => (
                format!("arm-linux-androideabi-{}", gcc_version),
                "arm-linux-androideabi",
            ),
            Architecture::X86_64 | Architecture::I386 => {
                (format!("{}-{}", spec.secondary_id, gcc_version), spec.triple)
            }
            _ => (format!("{}-{}", spec.triple, gcc_version), spec.triple),
        };
        let lib = if arch.is_32_bit() { "lib" } else { "lib64" };

        self.layout
            .ndk_base()
            .join("toolchains")
            .join(toolchain_name)
            .join("prebuilt/linux-x86_64")
            .join(host_tag)
            .join(lib)
    }
}
