//! Two-stage compiler bootstrap
//!
//! Stage 1 is built by the prebuilt baseline compiler; stage 2 is built by
//! stage 1 and may be instrumented or optimized with a collected profile.
//! Windows toolchains are cross-built once stage 2 exists.
//!
//! The orchestrator is a linear state machine. Every step checks the state it
//! starts from, so stage 2 cannot be requested before stage 1 has installed
//! and reported its version.

use crate::cross::{write_native_toolchain_file, CrossHost};
use crate::engine::{BuildEngine, BuildInvocation};
use crate::environment::BaseEnvironment;
use crate::error::{BuildError, BuildResult};
use crate::matrix::HostCompiler;
use crate::variables::{base_variables, BuildVariables};
use crate::version::CompilerVersion;
use kiln_config::{Layout, ToolchainConfig};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Stage 1 only needs to target the build host
const STAGE1_TARGETS: &str = "X86";

/// Bootstrap progress
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum StageState {
    NotStarted,
    Stage1Building,
    Stage1Done,
    Stage2Building,
    Stage2Done,
    Failed,
}

/// How stage 2 picks its PGO profile
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ProfileRequest {
    /// Use `<profiles>/<long-version>.profdata` when it exists
    #[default]
    Auto,
    /// Like `Auto`, but a missing profile is fatal
    Required,
    /// Use this file; it must exist
    Explicit(PathBuf),
}

/// Stage-2 switches
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageOptions {
    pub build_name: String,
    pub use_lld: bool,
    pub enable_assertions: bool,
    pub debug: bool,
    /// Build an instrumented compiler to collect a profile
    pub instrumented: bool,
    pub profile: ProfileRequest,
}

impl Default for StageOptions {
    fn default() -> Self {
        Self {
            build_name: "dev".to_string(),
            use_lld: false,
            enable_assertions: false,
            debug: false,
            instrumented: false,
            profile: ProfileRequest::Auto,
        }
    }
}

impl StageOptions {
    /// Reject contradictory combinations
    pub fn validate(&self) -> BuildResult<()> {
        if self.build_name.trim().is_empty() {
            return Err(BuildError::configuration("build name must not be empty"));
        }
        if self.instrumented && self.profile != ProfileRequest::Auto {
            return Err(BuildError::configuration(
                "cannot simultaneously instrument and use profiles",
            ));
        }
        Ok(())
    }
}

/// An installed stage and the compiler version it reports
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageResult {
    pub install_path: PathBuf,
    pub version: CompilerVersion,
}

impl StageResult {
    pub fn compiler(&self) -> HostCompiler {
        HostCompiler::from_install(&self.install_path)
    }

    pub fn bin(&self, tool: &str) -> PathBuf {
        self.install_path.join("bin").join(tool)
    }

    pub fn lib_dir(&self) -> PathBuf {
        self.install_path.join("lib64")
    }
}

/// Sequences stage 1, stage 2 and the cross builds
pub struct StageOrchestrator<'a, E: BuildEngine + ?Sized> {
    layout: &'a Layout,
    toolchain: &'a ToolchainConfig,
    engine: &'a E,
    env: BaseEnvironment,
    options: StageOptions,
    state: StageState,
    stage1: Option<StageResult>,
    stage2: Option<StageResult>,
}

impl<'a, E: BuildEngine + ?Sized> StageOrchestrator<'a, E> {
    /// Validates `options` before anything can reach the engine
    pub fn new(
        layout: &'a Layout,
        toolchain: &'a ToolchainConfig,
        engine: &'a E,
        env: BaseEnvironment,
        options: StageOptions,
    ) -> BuildResult<Self> {
        options.validate()?;
        Ok(Self {
            layout,
            toolchain,
            engine,
            env,
            options,
            state: StageState::NotStarted,
            stage1: None,
            stage2: None,
        })
    }

    pub fn state(&self) -> StageState {
        self.state
    }

    pub fn options(&self) -> &StageOptions {
        &self.options
    }

    pub fn stage1(&self) -> Option<&StageResult> {
        self.stage1.as_ref()
    }

    pub fn stage2(&self) -> Option<&StageResult> {
        self.stage2.as_ref()
    }

    pub fn stage1_install_dir(&self) -> PathBuf {
        self.layout.out_path("stage1-install")
    }

    pub fn stage2_install_dir(&self) -> PathBuf {
        self.layout.out_path("stage2-install")
    }

    /// Build and install stage 1 with the baseline compiler
    pub fn run_stage1(&mut self) -> BuildResult<&StageResult> {
        self.expect_state(StageState::NotStarted, "stage 1")?;
        self.state = StageState::Stage1Building;
        log::info!("Building stage 1");

        let install = self.stage1_install_dir();
        let invocation = BuildInvocation::new(
            "stage1",
            self.layout.out_path("stage1"),
            self.layout.llvm_path(""),
            self.stage1_variables(&install),
            self.env.clone(),
        )
        .clearing_cache()
        .expecting(CompilerVersion::header_path(&install));

        let version = self.build_and_read_version(&invocation, &install)?;
        log::info!("Stage 1 installed clang {}", version);
        self.state = StageState::Stage1Done;
        let stage1 = self.stage1.insert(StageResult {
            install_path: install,
            version,
        });
        Ok(&*stage1)
    }

    /// Resolve the profile stage 2 should consume, if any
    pub fn resolve_profile(&self, version: &CompilerVersion) -> BuildResult<Option<PathBuf>> {
        if self.options.instrumented {
            return Ok(None);
        }

        let default_profile = || {
            self.layout
                .profiles_dir()
                .join(format!("{}.profdata", version.long_version()))
        };
        match &self.options.profile {
            ProfileRequest::Auto => {
                let profile = default_profile();
                if profile.is_file() {
                    Ok(Some(profile))
                } else {
                    log::info!(
                        "No PGO profile at {}; building stage 2 without it",
                        profile.display()
                    );
                    Ok(None)
                }
            }
            ProfileRequest::Required => require_profile(version, default_profile()),
            ProfileRequest::Explicit(path) => require_profile(version, path.clone()),
        }
    }

    /// Build and install stage 2 with the stage-1 compiler
    pub fn run_stage2(&mut self) -> BuildResult<&StageResult> {
        self.expect_state(StageState::Stage1Done, "stage 2")?;
        let stage1 = match self.stage1.clone() {
            Some(stage1) => stage1,
            None => {
                self.state = StageState::Failed;
                return Err(BuildError::StageOrder(
                    "stage 1 finished without a result".to_string(),
                ));
            }
        };

        let profile = match self.resolve_profile(&stage1.version) {
            Ok(profile) => profile,
            Err(e) => {
                self.state = StageState::Failed;
                return Err(e);
            }
        };

        self.state = StageState::Stage2Building;
        match &profile {
            Some(path) => log::info!("Building stage 2 with profile {}", path.display()),
            None if self.options.instrumented => log::info!("Building instrumented stage 2"),
            None => log::info!("Building stage 2"),
        }

        let install = self.stage2_install_dir();
        let env = self.env.merged([(
            "LD_LIBRARY_PATH",
            stage1.lib_dir().display().to_string(),
        )]);
        let invocation = BuildInvocation::new(
            "stage2",
            self.layout.out_path("stage2"),
            self.layout.llvm_path(""),
            self.stage2_variables(&stage1, &install, profile.as_deref()),
            env,
        )
        .clearing_cache()
        .expecting(CompilerVersion::header_path(&install));

        let version = self.build_and_read_version(&invocation, &install)?;
        log::info!("Stage 2 installed clang {}", version);
        self.state = StageState::Stage2Done;
        let stage2 = self.stage2.insert(StageResult {
            install_path: install,
            version,
        });
        Ok(&*stage2)
    }

    /// Cross-build the stage-2 sources for a Windows host
    pub fn run_cross(&mut self, host: CrossHost) -> BuildResult<StageResult> {
        self.expect_state(StageState::Stage2Done, host.host_tag())?;
        let native = match &self.stage2 {
            Some(stage2) => stage2.compiler(),
            None => {
                self.state = StageState::Failed;
                return Err(BuildError::StageOrder(
                    "stage 2 finished without a result".to_string(),
                ));
            }
        };
        log::info!("Building clang for {}", host);

        let build_dir = host.build_dir(self.layout);
        let install = host.install_dir(self.layout);
        let result = write_native_toolchain_file(&build_dir, &native).and_then(|native_file| {
            let mut vars = self.llvm_variables(&install, &self.toolchain.stage2.targets_to_build());
            vars.merge(&host.variables(
                self.layout,
                &native_file,
                self.options.enable_assertions,
            ));
            let invocation = BuildInvocation::new(
                host.host_tag(),
                &build_dir,
                self.layout.llvm_path(""),
                vars,
                self.env.clone(),
            )
            .clearing_cache()
            .expecting(CompilerVersion::header_path(&install));
            self.engine.build(&invocation)?;
            CompilerVersion::from_install(&install)
        });

        match result {
            Ok(version) => Ok(StageResult {
                install_path: install,
                version,
            }),
            Err(e) => {
                self.state = StageState::Failed;
                Err(e)
            }
        }
    }

    /// Variables shared by every compiler build
    pub fn llvm_variables(&self, install: &Path, targets: &str) -> BuildVariables {
        let release = &self.toolchain.release;
        let mut vars = base_variables(release);
        vars.set("CMAKE_INSTALL_PREFIX", install.display().to_string())
            .set("LLVM_TARGETS_TO_BUILD", targets)
            .set("LLVM_BUILD_LLVM_DYLIB", "ON")
            .set(
                "CLANG_VENDOR",
                format!(
                    "Android ({} based on {}) ",
                    self.options.build_name, release.revision
                ),
            )
            .set(
                "LLVM_BINUTILS_INCDIR",
                self.layout.binutils_include().display().to_string(),
            );
        vars
    }

    pub fn stage1_variables(&self, install: &Path) -> BuildVariables {
        let prebuilt_bin = self.layout.prebuilt_clang_bin();
        // rpath keeps stage 1 on the prebuilt libc++ instead of its own
        let ldflags = format!("-Wl,-rpath,{}", self.layout.prebuilt_clang_lib().display());

        let mut vars = self.llvm_variables(install, STAGE1_TARGETS);
        vars.set("LLVM_BUILD_RUNTIME", "ON")
            .set("CLANG_ENABLE_ARCMT", "OFF")
            .set("CLANG_ENABLE_STATIC_ANALYZER", "OFF")
            .set("CMAKE_C_COMPILER", prebuilt_bin.join("clang").display().to_string())
            .set("CMAKE_CXX_COMPILER", prebuilt_bin.join("clang++").display().to_string())
            .set("LLVM_TOOL_CLANG_TOOLS_EXTRA_BUILD", "OFF")
            .set("LLVM_TOOL_OPENMP_BUILD", "OFF")
            .set(
                "LLVM_BUILD_TOOLS",
                if self.options.instrumented { "ON" } else { "OFF" },
            )
            .set("LLVM_ENABLE_LIBCXX", "ON")
            .set("CMAKE_EXE_LINKER_FLAGS", ldflags.as_str())
            .set("CMAKE_SHARED_LINKER_FLAGS", ldflags.as_str())
            .set("CMAKE_MODULE_LINKER_FLAGS", ldflags.as_str())
            .set("COMPILER_RT_BUILD_LIBFUZZER", "OFF");
        self.apply_host_libcxx(&mut vars);
        vars
    }

    pub fn stage2_variables(
        &self,
        stage1: &StageResult,
        install: &Path,
        profile: Option<&Path>,
    ) -> BuildVariables {
        let compiler = stage1.compiler();
        let mut vars = self.llvm_variables(install, &self.toolchain.stage2.targets_to_build());
        vars.set("CMAKE_C_COMPILER", compiler.cc.display().to_string())
            .set("CMAKE_CXX_COMPILER", compiler.cxx.display().to_string())
            .set("LLVM_BUILD_RUNTIME", "ON")
            .set("LLVM_ENABLE_LIBCXX", "ON")
            .set("SANITIZER_ALLOW_CXXABI", "OFF")
            .set("COMPILER_RT_BUILD_LIBFUZZER", "OFF");

        if self.options.use_lld {
            vars.set("LLVM_ENABLE_LLD", "ON");
        }
        if self.options.enable_assertions {
            vars.set("LLVM_ENABLE_ASSERTIONS", "ON");
        }
        if self.options.debug {
            vars.set("CMAKE_BUILD_TYPE", "Debug");
        }

        if self.options.instrumented {
            // libc++ links with -nodefaultlibs and cannot take the profile runtime
            vars.set("LLVM_BUILD_INSTRUMENTED", "ON")
                .set("LLVM_PROFDATA", stage1.bin("llvm-profdata").display().to_string())
                .set("LLVM_ENABLE_LIBCXX", "OFF")
                .set("LLVM_BUILD_RUNTIME", "OFF");
        } else if let Some(profile) = profile {
            vars.set("LLVM_PROFDATA_FILE", profile.display().to_string());
        }

        self.apply_host_libcxx(&mut vars);
        vars
    }

    fn apply_host_libcxx(&self, vars: &mut BuildVariables) {
        let host = self.layout.host();
        if host.is_linux() {
            vars.set("LIBCXX_ENABLE_ABI_LINKER_SCRIPT", "OFF")
                .set("LIBCXX_ENABLE_STATIC_ABI_LIBRARY", "ON");
        }
        if host.is_darwin() {
            // Host runtimes are not shipped for Darwin
            vars.set("LLVM_BUILD_EXTERNAL_COMPILER_RT", "ON");
        }
    }

    fn build_and_read_version(
        &mut self,
        invocation: &BuildInvocation,
        install: &Path,
    ) -> BuildResult<CompilerVersion> {
        let result = self
            .engine
            .build(invocation)
            .and_then(|_| CompilerVersion::from_install(install));
        if result.is_err() {
            self.state = StageState::Failed;
        }
        result
    }

    fn expect_state(&self, expected: StageState, step: &str) -> BuildResult<()> {
        if self.state == expected {
            return Ok(());
        }
        Err(BuildError::StageOrder(format!(
            "{} requires state {:?}, but the bootstrap is {:?}",
            step, expected, self.state
        )))
    }
}

fn require_profile(version: &CompilerVersion, path: PathBuf) -> BuildResult<Option<PathBuf>> {
    if path.is_file() {
        Ok(Some(path))
    } else {
        Err(BuildError::MissingProfile {
            version: version.long_version(),
            expected: path,
        })
    }
}
