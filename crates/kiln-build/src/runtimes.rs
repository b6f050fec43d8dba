//! Runtime library fan-out
//!
//! Builds compiler-rt, libFuzzer and libomp for every device architecture with
//! the stage-2 compiler and installs them into the compiler's resource tree.
//! Tasks are planned up front as an explicit list. Installs into the shared
//! resource tree run in order; the per-architecture builds after them run
//! either in order or on a bounded rayon pool. The first failure aborts the
//! whole fan-out.

use crate::engine::{BuildEngine, BuildInvocation};
use crate::environment::BaseEnvironment;
use crate::error::{BuildError, BuildResult};
use crate::mapfile;
use crate::matrix::{Architecture, ArchitectureConfig, MatrixGenerator, PlatformMode};
use crate::stage::StageResult;
use crate::variables::{base_variables, join_flags};
use kiln_config::{Layout, ReleaseConfig};
use rayon::prelude::*;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Runtime kinds that are known to be broken and skipped, with the reason
pub const DISABLED_RUNTIMES: &[(RuntimeKind, &str)] = &[(
    RuntimeKind::Cxx,
    "strtod_l is missing from the NDK sysroot and breaks the libc++ build",
)];

/// Architectures that get a placeholder `asan_test` binary
const ASAN_TEST_ARCHES: [&str; 5] = ["aarch64", "arm", "i686", "mips", "mips64"];

/// Architectures whose ASan runtime gets an export map, in reference order
const ASAN_MAP_ARCHES: [Architecture; 6] = [
    Architecture::Aarch64,
    Architecture::Arm,
    Architecture::I386,
    Architecture::X86_64,
    Architecture::Mips,
    Architecture::Mips64,
];

/// Runtime library built by the fan-out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RuntimeKind {
    /// Sanitizers and builtins for a device architecture
    CompilerRt,
    /// 32-bit x86 compiler-rt for the build host itself
    HostCompilerRt,
    Fuzzer,
    OpenMp,
    Cxx,
}

impl RuntimeKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::CompilerRt => "compiler-rt",
            Self::HostCompilerRt => "compiler-rt (i386 host)",
            Self::Fuzzer => "libfuzzer",
            Self::OpenMp => "libomp",
            Self::Cxx => "libcxx",
        }
    }

    /// Why this kind is skipped, if it is
    pub fn disabled_reason(&self) -> Option<&'static str> {
        DISABLED_RUNTIMES
            .iter()
            .find(|(kind, _)| kind == self)
            .map(|(_, reason)| *reason)
    }
}

/// Copy of a built artifact into the install tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactCopy {
    pub from: PathBuf,
    pub to: PathBuf,
}

/// One engine invocation of the fan-out
#[derive(Debug, Clone)]
pub struct RuntimeTask {
    pub kind: RuntimeKind,
    /// `None` for the host build
    pub architecture: Option<Architecture>,
    pub mode: PlatformMode,
    pub invocation: BuildInvocation,
    /// Artifacts not installed by the engine itself
    pub artifact: Option<ArtifactCopy>,
    /// Where the runtime ends up
    pub location: PathBuf,
}

/// A runtime that finished building and installing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstalledRuntime {
    pub kind: RuntimeKind,
    pub architecture: Option<Architecture>,
    pub mode: PlatformMode,
    pub location: PathBuf,
}

/// Outcome of a complete fan-out
#[derive(Debug, Clone, Default, Serialize)]
pub struct RuntimeReport {
    pub installed: Vec<InstalledRuntime>,
    pub skipped: Vec<RuntimeKind>,
    pub map_files: Vec<PathBuf>,
}

/// Builds every runtime for a stage-2 install
pub struct RuntimeBuilder<'a, E: BuildEngine + ?Sized> {
    layout: &'a Layout,
    release: &'a ReleaseConfig,
    stage2: &'a StageResult,
    engine: &'a E,
    env: BaseEnvironment,
    jobs: usize,
    architectures: Vec<Architecture>,
}

impl<'a, E: BuildEngine + ?Sized> RuntimeBuilder<'a, E> {
    pub fn new(
        layout: &'a Layout,
        release: &'a ReleaseConfig,
        stage2: &'a StageResult,
        engine: &'a E,
        env: BaseEnvironment,
    ) -> Self {
        Self {
            layout,
            release,
            stage2,
            engine,
            env,
            jobs: 1,
            architectures: Architecture::ALL.to_vec(),
        }
    }

    /// Size of the worker pool; 1 runs tasks in plan order on this thread
    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs.max(1);
        self
    }

    pub fn with_architectures(mut self, architectures: Vec<Architecture>) -> Self {
        self.architectures = architectures;
        self
    }

    /// `<stage2>/lib64/clang/<long-version>`
    pub fn resource_dir(&self) -> PathBuf {
        self.stage2
            .lib_dir()
            .join("clang")
            .join(self.stage2.version.long_version())
    }

    /// Per-architecture runtime directory inside the resource tree
    pub fn runtime_dir(&self, arch: Architecture) -> PathBuf {
        self.resource_dir()
            .join("lib/linux")
            .join(arch.resource_subdir())
    }

    /// Runtimes built against the NDK's libc++
    pub fn ndk_runtime_dir(&self, arch: Architecture) -> PathBuf {
        self.stage2
            .install_path
            .join("runtimes_ndk_cxx")
            .join(arch.resource_subdir())
    }

    fn lib_build_dir(&self, name: String) -> PathBuf {
        self.layout.out_path("lib").join(name)
    }

    fn llvm_config(&self) -> String {
        self.stage2.bin("llvm-config").display().to_string()
    }

    /// Every task of the fan-out in reference order
    pub fn plan(&self) -> Vec<RuntimeTask> {
        let generator = MatrixGenerator::new(self.layout, self.stage2.compiler());
        let configs = |mode| -> Vec<ArchitectureConfig> {
            self.architectures
                .iter()
                .map(|&arch| generator.config_for(arch, mode))
                .collect()
        };
        let ndk = configs(PlatformMode::Ndk);
        let platform = configs(PlatformMode::Platform);

        let mut tasks: Vec<RuntimeTask> = ndk.iter().map(|c| self.compiler_rt_task(c)).collect();
        tasks.push(self.host_compiler_rt_task());
        tasks.extend(platform.iter().map(|c| self.fuzzer_task(c)));
        tasks.extend(ndk.iter().map(|c| self.fuzzer_task(c)));
        tasks.extend(platform.iter().map(|c| self.openmp_task(c)));
        tasks.extend(ndk.iter().map(|c| self.openmp_task(c)));
        tasks
    }

    /// Build everything, then install headers, test stubs and export maps
    pub fn run(&self) -> BuildResult<RuntimeReport> {
        let mut report = RuntimeReport::default();
        for (kind, reason) in DISABLED_RUNTIMES {
            log::warn!("Skipping {}: {}", kind.name(), reason);
            report.skipped.push(*kind);
        }

        let tasks = self.plan();
        log::info!(
            "Building {} runtime tasks with {} job(s)",
            tasks.len(),
            self.jobs
        );
        report.installed = self.execute(&tasks)?;

        self.install_fuzzer_headers()?;
        self.create_asan_test_stubs()?;
        report.map_files = self.write_asan_map_files();
        Ok(report)
    }

    /// Run `tasks`, stopping at the first failure.
    ///
    /// Tasks that run an engine install share the resource-dir prefix, so they
    /// always run one at a time in plan order before anything else starts.
    /// The remaining tasks own their build and destination directories and go
    /// on the worker pool when `jobs > 1`. A failure there stops new tasks
    /// from being picked up; tasks already running finish before the error is
    /// returned.
    pub fn execute(&self, tasks: &[RuntimeTask]) -> BuildResult<Vec<InstalledRuntime>> {
        let (installing, isolated): (Vec<&RuntimeTask>, Vec<&RuntimeTask>) =
            tasks.iter().partition(|task| task.invocation.install);

        let mut installed = installing
            .iter()
            .map(|task| self.run_task(task))
            .collect::<BuildResult<Vec<_>>>()?;

        if self.jobs <= 1 {
            for task in &isolated {
                installed.push(self.run_task(task)?);
            }
            return Ok(installed);
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.jobs)
            .build()
            .map_err(|e| BuildError::WorkerPool(e.to_string()))?;
        let built: Vec<InstalledRuntime> = pool.install(|| {
            isolated
                .par_iter()
                .map(|task| self.run_task(task))
                .collect::<BuildResult<Vec<_>>>()
        })?;
        installed.extend(built);
        Ok(installed)
    }

    fn run_task(&self, task: &RuntimeTask) -> BuildResult<InstalledRuntime> {
        match task.architecture {
            Some(arch) => log::info!(
                "Building {} for {} ({:?})",
                task.kind.name(),
                arch,
                task.mode
            ),
            None => log::info!("Building {}", task.kind.name()),
        }

        self.engine.build(&task.invocation)?;

        if let Some(copy) = &task.artifact {
            if !copy.from.is_file() {
                return Err(BuildError::MissingArtifact {
                    path: copy.from.clone(),
                });
            }
            if let Some(parent) = copy.to.parent() {
                fs::create_dir_all(parent).map_err(|e| BuildError::io(parent, e))?;
            }
            log::info!("copy {} {}", copy.from.display(), copy.to.display());
            fs::copy(&copy.from, &copy.to).map_err(|e| BuildError::io(&copy.to, e))?;
        }

        Ok(InstalledRuntime {
            kind: task.kind,
            architecture: task.architecture,
            mode: task.mode,
            location: task.location.clone(),
        })
    }

    fn compiler_rt_task(&self, config: &ArchitectureConfig) -> RuntimeTask {
        let arch = config.architecture;
        let mut cflags = config.compiler_flags.clone();
        cflags.push("-isystem".to_string());
        cflags.push(self.layout.ndk_support_headers().display().to_string());
        let cflags = join_flags(&cflags);

        let link_libs = match arch {
            Architecture::Arm => "-latomic -landroid_support",
            _ => "-landroid_support",
        };

        let mut vars = config.build_variables.clone();
        vars.set("ANDROID", "1")
            .set("LLVM_CONFIG_PATH", self.llvm_config())
            .set("CMAKE_C_FLAGS", cflags.as_str())
            .set("CMAKE_ASM_FLAGS", cflags.as_str())
            .set("CMAKE_CXX_FLAGS", cflags.as_str())
            .set("COMPILER_RT_TEST_COMPILER_CFLAGS", cflags.as_str())
            .set("COMPILER_RT_TEST_TARGET_TRIPLE", config.toolchain_triple)
            .set("COMPILER_RT_INCLUDE_TESTS", "OFF")
            .set("CMAKE_INSTALL_PREFIX", self.resource_dir().display().to_string())
            .set("COMPILER_RT_BUILD_LIBFUZZER", "OFF")
            .set("SANITIZER_CXX_ABI", "libcxxabi")
            .set("SANITIZER_COMMON_LINK_LIBS", link_libs)
            .merge(&base_variables(self.release));

        let invocation = BuildInvocation::new(
            format!("compiler-rt-{}", arch),
            self.lib_build_dir(format!("clangrt-{}", arch)),
            self.layout.llvm_path("projects/compiler-rt"),
            vars,
            self.env.clone(),
        )
        .clearing_cache();

        RuntimeTask {
            kind: RuntimeKind::CompilerRt,
            architecture: Some(arch),
            mode: config.platform_mode,
            invocation,
            artifact: None,
            location: self.resource_dir().join("lib/linux"),
        }
    }

    fn host_compiler_rt_task(&self) -> RuntimeTask {
        let compiler = self.stage2.compiler();
        let cflags = "--target=i386-linux-gnu -march=i686";

        let mut vars = base_variables(self.release);
        vars.set("CMAKE_C_COMPILER", compiler.cc.display().to_string())
            .set("CMAKE_CXX_COMPILER", compiler.cxx.display().to_string())
            // only the i386 target, not every multilib
            .set("COMPILER_RT_DEFAULT_TARGET_ONLY", "ON")
            .set("CMAKE_C_COMPILER_TARGET", "i386-linux-gnu")
            .set("CMAKE_C_FLAGS", cflags)
            .set("CMAKE_CXX_FLAGS", cflags)
            .set("LLVM_CONFIG_PATH", self.llvm_config())
            .set("COMPILER_RT_INCLUDE_TESTS", "ON")
            .set("COMPILER_RT_ENABLE_WERROR", "ON")
            .set("CMAKE_INSTALL_PREFIX", self.resource_dir().display().to_string())
            .set("SANITIZER_CXX_ABI", "libstdc++")
            .set("COMPILER_RT_BUILD_LIBFUZZER", "OFF");

        let invocation = BuildInvocation::new(
            "compiler-rt-i386-host",
            self.lib_build_dir("clangrt-i386-host".to_string()),
            self.layout.llvm_path("projects/compiler-rt"),
            vars,
            self.env.clone(),
        )
        .clearing_cache();

        RuntimeTask {
            kind: RuntimeKind::HostCompilerRt,
            architecture: None,
            mode: PlatformMode::Platform,
            invocation,
            artifact: None,
            location: self.resource_dir().join("lib/linux"),
        }
    }

    /// `-isystem` flags for the C++ headers a runtime compiles against
    fn cxx_header_flags(&self, mode: PlatformMode) -> Vec<String> {
        let dirs = match mode {
            PlatformMode::Ndk => vec![
                self.layout.ndk_libcxx_headers(),
                self.layout.ndk_libcxxabi_headers(),
                self.layout.ndk_support_headers(),
            ],
            // the prebuilt libc++ headers include cxxabi
            PlatformMode::Platform => vec![
                self.layout.prebuilt_libcxx_headers(),
                self.layout.bionic_include(),
            ],
        };
        dirs.into_iter()
            .flat_map(|dir| ["-isystem".to_string(), dir.display().to_string()])
            .collect()
    }

    fn destination(&self, arch: Architecture, mode: PlatformMode) -> PathBuf {
        match mode {
            PlatformMode::Platform => self.runtime_dir(arch),
            PlatformMode::Ndk => self.ndk_runtime_dir(arch),
        }
    }

    fn build_dir_name(prefix: &str, arch: Architecture, mode: PlatformMode) -> String {
        match mode {
            PlatformMode::Platform => format!("{}-{}", prefix, arch),
            PlatformMode::Ndk => format!("{}-{}-ndk-cxx", prefix, arch),
        }
    }

    fn fuzzer_task(&self, config: &ArchitectureConfig) -> RuntimeTask {
        let arch = config.architecture;
        let mode = config.platform_mode;
        let mut cflags = config.compiler_flags.clone();
        cflags.extend(self.cxx_header_flags(mode));
        let cflags = join_flags(&cflags);

        let mut vars = config.build_variables.clone();
        vars.set("ANDROID", "1")
            .set("LLVM_CONFIG_PATH", self.llvm_config())
            .set("CMAKE_C_FLAGS", cflags.as_str())
            .set("CMAKE_CXX_FLAGS", cflags.as_str())
            // pass CMAKE_*_LINKER_FLAGS to try_compile()
            .set("CMAKE_POLICY_DEFAULT_CMP0056", "NEW");

        let build_dir = self.lib_build_dir(Self::build_dir_name("libfuzzer", arch, mode));
        let built = build_dir.join("lib/linux").join(format!(
            "libclang_rt.fuzzer-{}-android.a",
            arch.runtime_file_arch()
        ));
        let location = self.destination(arch, mode);

        let invocation = BuildInvocation::new(
            format!("libfuzzer-{}", arch),
            build_dir,
            self.layout.llvm_path("projects/compiler-rt"),
            vars,
            self.env.clone(),
        )
        .with_target("fuzzer")
        .without_install()
        .clearing_cache()
        .expecting(&built);

        RuntimeTask {
            kind: RuntimeKind::Fuzzer,
            architecture: Some(arch),
            mode,
            invocation,
            artifact: Some(ArtifactCopy {
                from: built,
                to: location.join("libFuzzer.a"),
            }),
            location,
        }
    }

    fn openmp_task(&self, config: &ArchitectureConfig) -> RuntimeTask {
        let arch = config.architecture;
        let mode = config.platform_mode;
        let mut cflags = config.compiler_flags.clone();
        cflags.extend(self.cxx_header_flags(mode));
        let cflags = join_flags(&cflags);

        let mut vars = config.build_variables.clone();
        vars.set("ANDROID", "1")
            .set("CMAKE_BUILD_TYPE", "Release")
            .set("CMAKE_C_FLAGS", cflags.as_str())
            .set("CMAKE_CXX_FLAGS", cflags.as_str())
            .set("LIBOMP_ENABLE_SHARED", "FALSE")
            .set("CMAKE_POLICY_DEFAULT_CMP0056", "NEW");

        let build_dir = self.lib_build_dir(Self::build_dir_name("libomp", arch, mode));
        let built = build_dir.join("src/libomp.a");
        let location = self.destination(arch, mode);

        let invocation = BuildInvocation::new(
            format!("libomp-{}", arch),
            build_dir,
            self.layout.llvm_path("projects/openmp/runtime"),
            vars,
            self.env.clone(),
        )
        .without_install()
        .clearing_cache()
        .expecting(&built);

        RuntimeTask {
            kind: RuntimeKind::OpenMp,
            architecture: Some(arch),
            mode,
            invocation,
            artifact: Some(ArtifactCopy {
                from: built,
                to: location.join("libomp.a"),
            }),
            location,
        }
    }

    /// Copy libFuzzer's public headers next to the stage-2 install
    pub fn install_fuzzer_headers(&self) -> BuildResult<usize> {
        let src = self.layout.llvm_path("projects/compiler-rt/lib/fuzzer");
        let dst = self
            .stage2
            .install_path
            .join("prebuilt_include/llvm/lib/Fuzzer");
        fs::create_dir_all(&dst).map_err(|e| BuildError::io(&dst, e))?;

        let mut entries: Vec<_> = fs::read_dir(&src)
            .map_err(|e| BuildError::io(&src, e))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| is_fuzzer_header(path))
            .collect();
        entries.sort();

        for header in &entries {
            if let Some(name) = header.file_name() {
                let target = dst.join(name);
                fs::copy(header, &target).map_err(|e| BuildError::io(&target, e))?;
            }
        }
        log::info!("Installed {} libFuzzer headers", entries.len());
        Ok(entries.len())
    }

    /// asan_test cannot be built here; platform checks only need it to exist
    pub fn create_asan_test_stubs(&self) -> BuildResult<()> {
        for arch in ASAN_TEST_ARCHES {
            let bin = self.stage2.install_path.join("test").join(arch).join("bin");
            fs::create_dir_all(&bin).map_err(|e| BuildError::io(&bin, e))?;
            let stub = bin.join("asan_test");
            fs::write(&stub, b"").map_err(|e| BuildError::io(&stub, e))?;
        }
        Ok(())
    }

    /// Export maps for the ASan runtimes that were built.
    ///
    /// Missing or unreadable runtimes are logged and skipped.
    pub fn write_asan_map_files(&self) -> Vec<PathBuf> {
        let lib_dir = self.resource_dir().join("lib/linux");
        let mut written = Vec::new();
        for arch in ASAN_MAP_ARCHES {
            let file_arch = arch.runtime_file_arch();
            let lib = lib_dir.join(format!("libclang_rt.asan-{}-android.so", file_arch));
            let map = lib_dir.join(format!("libclang_rt.asan-{}-android.map.txt", file_arch));
            if !lib.is_file() {
                log::warn!("No ASan runtime at {}; skipping map file", lib.display());
                continue;
            }
            match mapfile::create_map_file(&lib, &map) {
                Ok(_) => written.push(map),
                Err(e) => log::warn!("Skipping map file for {}: {}", lib.display(), e),
            }
        }
        written
    }
}

fn is_fuzzer_header(path: &Path) -> bool {
    path.is_file()
        && matches!(
            path.extension().and_then(|ext| ext.to_str()),
            Some("h") | Some("def")
        )
}
