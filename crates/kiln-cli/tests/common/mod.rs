//! Shared helpers for pipeline tests
//!
//! [`FakeEngine`] stands in for cmake and [`RecordingPackager`] for the
//! packager, so a whole pipeline run leaves only a temp tree behind.

#![allow(dead_code)]

use kiln_build::{BaseEnvironment, BuildEngine, BuildError, BuildInvocation, BuildResult};
use kiln_cli::Packaging;
use kiln_config::{HostOs, Layout, ToolchainConfig};
use kiln_package::{PackageRequest, PackageResult};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tempfile::TempDir;

pub use pretty_assertions::assert_eq;

pub const VERSION_INC: &str = "\
#define CLANG_VERSION 6.0.1
#define CLANG_VERSION_MAJOR 6
#define CLANG_VERSION_MINOR 0
#define CLANG_VERSION_PATCHLEVEL 1
";

/// Build engine double
#[derive(Default)]
pub struct FakeEngine {
    calls: Mutex<Vec<BuildInvocation>>,
    failing: HashSet<String>,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the invocation with exactly this step name
    pub fn failing_on(mut self, step: &str) -> Self {
        self.failing.insert(step.to_string());
        self
    }

    pub fn calls(&self) -> Vec<BuildInvocation> {
        self.calls.lock().unwrap().clone()
    }

    pub fn names(&self) -> Vec<String> {
        self.calls().into_iter().map(|inv| inv.name).collect()
    }

    pub fn call(&self, name: &str) -> BuildInvocation {
        self.calls()
            .into_iter()
            .find(|inv| inv.name == name)
            .unwrap_or_else(|| panic!("no invocation named {}", name))
    }
}

impl BuildEngine for FakeEngine {
    fn build(&self, invocation: &BuildInvocation) -> BuildResult<()> {
        self.calls.lock().unwrap().push(invocation.clone());
        if self.failing.contains(&invocation.name) {
            return Err(BuildError::external(
                invocation.name.as_str(),
                "ninja",
                "exit status: 1",
                "simulated failure",
            ));
        }

        fs::create_dir_all(&invocation.build_dir).unwrap();
        for output in &invocation.outputs {
            write_file(output, output_content(output));
        }
        Ok(())
    }
}

fn output_content(path: &Path) -> &'static str {
    if path.ends_with("Version.inc") {
        VERSION_INC
    } else {
        "artifact"
    }
}

pub fn write_file(path: &Path, content: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}

/// Records package requests and reports the archive it would have written
#[derive(Default)]
pub struct RecordingPackager {
    requests: Mutex<Vec<PackageRequest>>,
}

impl RecordingPackager {
    pub fn requests(&self) -> Vec<PackageRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl Packaging for RecordingPackager {
    fn package_tree(&self, request: &PackageRequest) -> PackageResult<PathBuf> {
        self.requests.lock().unwrap().push(request.clone());
        Ok(request.dist_dir.join(format!(
            "{}-{}.tar.bz2",
            request.package_name(),
            request.host.tag()
        )))
    }
}

/// A source checkout and output root inside a temp dir
pub struct Fixture {
    pub dir: TempDir,
    pub layout: Layout,
    pub toolchain: ToolchainConfig,
}

impl Fixture {
    pub fn new() -> Self {
        Self::for_host(HostOs::Linux)
    }

    pub fn for_host(host: HostOs) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let toolchain = ToolchainConfig::default();
        let layout = Layout::new(
            dir.path().join("src"),
            dir.path().join("out"),
            toolchain.prebuilts.clone(),
            host,
        );
        write_file(
            &layout.llvm_path("projects/compiler-rt/lib/fuzzer/FuzzerInterface.h"),
            "// fuzzer interface",
        );
        write_file(
            &layout.llvm_path("projects/compiler-rt/lib/fuzzer/FuzzerFlags.def"),
            "// flags",
        );
        write_file(
            &layout.llvm_path("projects/compiler-rt/lib/fuzzer/FuzzerLoop.cpp"),
            "// not a header",
        );
        Self {
            dir,
            layout,
            toolchain,
        }
    }

    pub fn env(&self) -> BaseEnvironment {
        BaseEnvironment::from_vars([("PATH", "/usr/bin:/bin"), ("HOME", "/home/builder")])
    }

    pub fn out(&self, rel: &str) -> PathBuf {
        self.layout.out_path(rel)
    }

    pub fn dist(&self) -> PathBuf {
        self.dir.path().join("dist")
    }

    /// Place a collected profile for clang 6.0.1
    pub fn add_profile(&self) -> PathBuf {
        let profile = self.layout.profiles_dir().join("6.0.1.profdata");
        write_file(&profile, "profile");
        profile
    }
}
