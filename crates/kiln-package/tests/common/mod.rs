//! Shared helpers for kiln-package integration tests

#![allow(dead_code)]

use kiln_build::{BuildResult, ToolCommand, ToolOutput, ToolRunner};
use kiln_config::{HostOs, Layout, ToolchainConfig};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;
use tempfile::TempDir;

pub use pretty_assertions::assert_eq;

pub const VERSION_INC: &str = "\
#define CLANG_VERSION 6.0.1
#define CLANG_VERSION_MAJOR 6
#define CLANG_VERSION_MINOR 0
#define CLANG_VERSION_PATCHLEVEL 1
";

/// Records strip invocations without touching the files
#[derive(Default)]
pub struct RecordingRunner {
    commands: Mutex<Vec<ToolCommand>>,
}

impl RecordingRunner {
    pub fn commands(&self) -> Vec<ToolCommand> {
        self.commands.lock().unwrap().clone()
    }
}

impl ToolRunner for RecordingRunner {
    fn run(&self, _step: &str, command: &ToolCommand) -> BuildResult<ToolOutput> {
        self.commands.lock().unwrap().push(command.clone());
        Ok(ToolOutput {
            exit_code: 0,
            stdout: String::new(),
            stderr: String::new(),
            execution_time: Duration::ZERO,
        })
    }
}

pub fn write_file(path: &Path, content: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}

#[cfg(unix)]
pub fn link(target: &str, path: &Path) {
    std::os::unix::fs::symlink(target, path).unwrap();
}

/// Source checkout with the files packaging pulls in, plus an output root
pub struct Fixture {
    pub dir: TempDir,
    pub layout: Layout,
    pub toolchain: ToolchainConfig,
}

impl Fixture {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let toolchain = ToolchainConfig::default();
        let layout = Layout::new(
            dir.path().join("src"),
            dir.path().join("out"),
            toolchain.prebuilts.clone(),
            HostOs::Linux,
        );

        let android = layout.llvm_android_dir();
        write_file(&android.join("compiler_wrapper.py"), "#!/usr/bin/env python\n# wrapper\n");
        write_file(&android.join("bisect_driver.py"), "# bisect\n");
        write_file(&android.join("MODULE_LICENSE_BSD_LIKE"), "");
        write_file(&layout.llvm_path("LICENSE.TXT"), "LLVM license");
        write_file(&layout.llvm_path("tools/clang/LICENSE.TXT"), "Clang license");
        write_file(&layout.bionic_include().join("stdatomic.h"), "// stdatomic\n");

        let mingw = layout.mingw_root().join("x86_64-w64-mingw32");
        write_file(&mingw.join("bin/libwinpthread-1.dll"), "dll64");
        write_file(&mingw.join("lib32/libwinpthread-1.dll"), "dll32");

        Self {
            dir,
            layout,
            toolchain,
        }
    }

    pub fn out(&self, rel: &str) -> PathBuf {
        self.layout.out_path(rel)
    }

    pub fn dist(&self) -> PathBuf {
        self.dir.path().join("dist")
    }

    /// A Linux stage-2 install tree with versioned libraries
    #[cfg(unix)]
    pub fn linux_install(&self) -> PathBuf {
        let root = self.out("stage2-install");
        write_file(&root.join("include/clang/Basic/Version.inc"), VERSION_INC);

        let bin = root.join("bin");
        for name in ["clang", "clang-6.0", "clang-tidy", "clang-format", "llvm-ar", "llvm-tblgen", "opt", "scan-build"] {
            write_file(&bin.join(name), name);
        }
        link("clang", &bin.join("clang++"));

        let lib = root.join("lib64");
        write_file(&lib.join("libLLVM-6.0svn.so"), "llvm");
        link("libLLVM-6.0svn.so", &lib.join("libLLVM.so"));
        write_file(&lib.join("libclang.so.6.0"), "clang");
        link("libclang.so.6.0", &lib.join("libclang.so.6"));
        link("libclang.so.6", &lib.join("libclang.so"));
        write_file(&lib.join("libc++.so.1.0"), "c++");
        link("libc++.so.1.0", &lib.join("libc++.so.1"));
        write_file(&lib.join("libc++.so"), "INPUT(-lc++abi)");
        write_file(&lib.join("libc++abi.so.1.0"), "c++abi");
        link("libc++abi.so.1.0", &lib.join("libc++abi.so.1"));
        write_file(&lib.join("libc++.a"), "archive");
        write_file(&lib.join("libLTO.so"), "lto");
        root
    }

    /// A Windows cross install tree; libraries are not normalized there
    pub fn windows_install(&self, name: &str) -> PathBuf {
        let root = self.out(name);
        write_file(&root.join("include/clang/Basic/Version.inc"), VERSION_INC);
        for bin in ["clang.exe", "clang++.exe", "llvm-tblgen.exe", "git-clang-format"] {
            write_file(&root.join("bin").join(bin), bin);
        }
        write_file(&root.join("lib/libclang.a"), "archive");
        write_file(&root.join("lib64/libclang.a"), "archive");
        root
    }
}
