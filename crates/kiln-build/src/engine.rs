//! External build engine contract
//!
//! A [`BuildInvocation`] names a working directory, a variable map and a
//! source directory. The engine configures, builds and optionally installs;
//! any failure comes back as [`BuildError::ExternalBuild`] and is never
//! retried.

use crate::environment::BaseEnvironment;
use crate::error::{BuildError, BuildResult};
use crate::process::{ProcessRunner, ToolCommand, ToolRunner};
use crate::variables::BuildVariables;
use kiln_config::Layout;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// One request to the build engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildInvocation {
    /// Step name used in logs and errors
    pub name: String,
    /// Working directory owned exclusively by this step
    pub build_dir: PathBuf,
    pub source_dir: PathBuf,
    pub variables: BuildVariables,
    pub env: BaseEnvironment,
    /// Build only this target instead of the default one
    pub target: Option<String>,
    pub install: bool,
    /// Remove stale configuration caches before configuring
    pub clear_cache: bool,
    /// Files the step must leave behind; checked after the build
    pub outputs: Vec<PathBuf>,
}

impl BuildInvocation {
    pub fn new(
        name: impl Into<String>,
        build_dir: impl Into<PathBuf>,
        source_dir: impl Into<PathBuf>,
        variables: BuildVariables,
        env: BaseEnvironment,
    ) -> Self {
        Self {
            name: name.into(),
            build_dir: build_dir.into(),
            source_dir: source_dir.into(),
            variables,
            env,
            target: None,
            install: true,
            clear_cache: false,
            outputs: Vec::new(),
        }
    }

    /// Declare a file this step produces
    pub fn expecting(mut self, output: impl Into<PathBuf>) -> Self {
        self.outputs.push(output.into());
        self
    }

    /// First declared output that does not exist
    pub fn missing_output(&self) -> Option<&Path> {
        self.outputs
            .iter()
            .map(PathBuf::as_path)
            .find(|path| !path.exists())
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn without_install(mut self) -> Self {
        self.install = false;
        self
    }

    pub fn clearing_cache(mut self) -> Self {
        self.clear_cache = true;
        self
    }

    /// Install prefix requested through the variables, if any
    pub fn install_prefix(&self) -> Option<&Path> {
        self.variables.get("CMAKE_INSTALL_PREFIX").map(Path::new)
    }
}

/// Performs a configure/build/install cycle
pub trait BuildEngine: Send + Sync {
    fn build(&self, invocation: &BuildInvocation) -> BuildResult<()>;
}

impl<E: BuildEngine + ?Sized> BuildEngine for &E {
    fn build(&self, invocation: &BuildInvocation) -> BuildResult<()> {
        (**self).build(invocation)
    }
}

/// cmake + ninja from the prebuilts
#[derive(Debug, Clone)]
pub struct CmakeEngine<R = ProcessRunner> {
    cmake: PathBuf,
    ninja: PathBuf,
    /// Lets `cmake -G Ninja` find the prebuilt ninja
    prefix_path: PathBuf,
    runner: R,
}

impl CmakeEngine<ProcessRunner> {
    pub fn new(layout: &Layout) -> Self {
        Self::with_runner(layout, ProcessRunner::new())
    }
}

impl<R: ToolRunner> CmakeEngine<R> {
    pub fn with_runner(layout: &Layout, runner: R) -> Self {
        Self {
            cmake: layout.cmake(),
            ninja: layout.ninja(),
            prefix_path: layout.cmake_bin_dir(),
            runner,
        }
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// `cmake -G Ninja -DCMAKE_PREFIX_PATH=... -D... <source>`
    pub fn configure_command(&self, invocation: &BuildInvocation) -> ToolCommand {
        ToolCommand::new(&self.cmake)
            .args(["-G", "Ninja"])
            .arg(format!("-DCMAKE_PREFIX_PATH={}", self.prefix_path.display()))
            .args(invocation.variables.to_args())
            .arg(invocation.source_dir.display().to_string())
            .current_dir(&invocation.build_dir)
            .env(invocation.env.clone())
    }

    pub fn build_command(&self, invocation: &BuildInvocation) -> ToolCommand {
        ToolCommand::new(&self.ninja)
            .args(invocation.target.iter().cloned())
            .current_dir(&invocation.build_dir)
            .env(invocation.env.clone())
    }

    pub fn install_command(&self, invocation: &BuildInvocation) -> ToolCommand {
        ToolCommand::new(&self.ninja)
            .arg("install")
            .current_dir(&invocation.build_dir)
            .env(invocation.env.clone())
    }
}

impl<R: ToolRunner> BuildEngine for CmakeEngine<R> {
    fn build(&self, invocation: &BuildInvocation) -> BuildResult<()> {
        fs::create_dir_all(&invocation.build_dir)
            .map_err(|e| BuildError::io(&invocation.build_dir, e))?;

        if invocation.clear_cache {
            clear_cmake_cache(&invocation.build_dir)?;
        }

        let step = invocation.name.as_str();
        self.runner.run(step, &self.configure_command(invocation))?;
        self.runner.run(step, &self.build_command(invocation))?;
        if invocation.install {
            self.runner.run(step, &self.install_command(invocation))?;
        }

        match invocation.missing_output() {
            Some(path) => Err(BuildError::MissingArtifact {
                path: path.to_path_buf(),
            }),
            None => Ok(()),
        }
    }
}

/// Remove every `CMakeCache.txt` and `CMakeFiles/` below `dir`.
///
/// Returns the number of entries removed. A missing `dir` is not an error.
pub fn clear_cmake_cache(dir: &Path) -> BuildResult<usize> {
    if !dir.exists() {
        return Ok(0);
    }

    let mut stale = Vec::new();
    let mut walker = WalkDir::new(dir).into_iter();
    while let Some(entry) = walker.next() {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(dir).to_path_buf();
            BuildError::io(path, e.into())
        })?;
        let name = entry.file_name();
        if entry.file_type().is_dir() && name == "CMakeFiles" {
            stale.push((entry.path().to_path_buf(), true));
            walker.skip_current_dir();
        } else if entry.file_type().is_file() && name == "CMakeCache.txt" {
            stale.push((entry.path().to_path_buf(), false));
        }
    }

    for (path, is_dir) in &stale {
        log::debug!("remove {}", path.display());
        let removed = if *is_dir {
            fs::remove_dir_all(path)
        } else {
            fs::remove_file(path)
        };
        removed.map_err(|e| BuildError::io(path, e))?;
    }
    Ok(stale.len())
}
