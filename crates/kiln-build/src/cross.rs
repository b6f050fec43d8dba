//! Windows cross builds
//!
//! Windows toolchains are built with mingw while the stage-2 compiler builds
//! the native tablegen/config tools, described by a generated `NATIVE.cmake`.

use crate::error::{BuildError, BuildResult};
use crate::matrix::HostCompiler;
use crate::variables::{join_flags, BuildVariables};
use kiln_config::Layout;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Name of the generated native toolchain file
pub const NATIVE_TOOLCHAIN_FILE: &str = "NATIVE.cmake";

/// Secondary host platforms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CrossHost {
    Windows64,
    Windows32,
}

impl CrossHost {
    /// Build order
    pub const ALL: [CrossHost; 2] = [CrossHost::Windows64, CrossHost::Windows32];

    /// Package host tag
    pub fn host_tag(&self) -> &'static str {
        match self {
            Self::Windows64 => "windows-x86",
            Self::Windows32 => "windows-i386",
        }
    }

    pub fn is_32_bit(&self) -> bool {
        matches!(self, Self::Windows32)
    }

    /// Working directory under the output root
    pub fn build_dir(&self, layout: &Layout) -> PathBuf {
        layout.out_path(self.host_tag())
    }

    pub fn install_dir(&self, layout: &Layout) -> PathBuf {
        layout.out_path(format!("{}-install", self.host_tag()))
    }

    /// Variables layered over the common LLVM variables
    pub fn variables(
        &self,
        layout: &Layout,
        native_file: &Path,
        enable_assertions: bool,
    ) -> BuildVariables {
        let mingw_bin = layout.mingw_root().join("bin");
        let mut vars = BuildVariables::new();
        vars.set(
            "CMAKE_C_COMPILER",
            mingw_bin.join("x86_64-w64-mingw32-gcc").display().to_string(),
        )
        .set(
            "CMAKE_CXX_COMPILER",
            mingw_bin.join("x86_64-w64-mingw32-g++").display().to_string(),
        )
        .set("CMAKE_SYSTEM_NAME", "Windows")
        .set("LLVM_BUILD_RUNTIME", "OFF")
        .set("LLVM_TOOL_CLANG_TOOLS_EXTRA_BUILD", "ON")
        .set("LLVM_TOOL_OPENMP_BUILD", "OFF")
        .set(
            "CROSS_TOOLCHAIN_FLAGS_NATIVE",
            format!(
                "-DCMAKE_PREFIX_PATH={};-DCMAKE_TOOLCHAIN_FILE={}",
                layout.cmake_bin_dir().display(),
                native_file.display()
            ),
        );

        if enable_assertions {
            vars.set("LLVM_ENABLE_ASSERTIONS", "ON");
        }

        let mut cflags = vec![
            "-D_LARGEFILE_SOURCE".to_string(),
            "-D_FILE_OFFSET_BITS=64".to_string(),
        ];
        // mingw cannot de-duplicate some functions on 64-bit builds
        let mut ldflags = vec!["-Wl,--allow-multiple-definition".to_string()];
        if self.is_32_bit() {
            cflags.push("-m32".to_string());
            ldflags.push("-m32".to_string());
            vars.set("LLVM_LIBDIR_SUFFIX", "");
        }

        let cflags = join_flags(&cflags);
        let ldflags = join_flags(&ldflags);
        vars.set("CMAKE_C_FLAGS", cflags.as_str())
            .set("CMAKE_CXX_FLAGS", cflags.as_str())
            .set("CMAKE_EXE_LINKER_FLAGS", ldflags.as_str())
            .set("CMAKE_SHARED_LINKER_FLAGS", ldflags.as_str())
            .set("CMAKE_MODULE_LINKER_FLAGS", ldflags.as_str());
        vars
    }
}

impl fmt::Display for CrossHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.host_tag())
    }
}

/// Toolchain file content pointing cmake at the native compiler
pub fn native_toolchain_fragment(native: &HostCompiler) -> String {
    format!(
        "set(CMAKE_C_COMPILER {})\nset(CMAKE_CXX_COMPILER {})\n",
        native.cc.display(),
        native.cxx.display()
    )
}

/// Write [`NATIVE_TOOLCHAIN_FILE`] into `build_dir`, creating it if needed
pub fn write_native_toolchain_file(build_dir: &Path, native: &HostCompiler) -> BuildResult<PathBuf> {
    fs::create_dir_all(build_dir).map_err(|e| BuildError::io(build_dir, e))?;
    let path = build_dir.join(NATIVE_TOOLCHAIN_FILE);
    fs::write(&path, native_toolchain_fragment(native)).map_err(|e| BuildError::io(&path, e))?;
    log::debug!("wrote {}", path.display());
    Ok(path)
}
