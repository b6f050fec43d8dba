//! End-to-end toolchain pipeline
//!
//! Build: stage 1, stage 2, runtime fan-out (Linux hosts), then the Windows
//! cross compilers. Package: the host toolchain, then windows-i386 and
//! windows-x86. The first fatal error stops everything after it, so a failed
//! fan-out never reaches packaging.

use anyhow::{Context, Result};
use kiln_build::{
    BaseEnvironment, BuildEngine, CrossHost, RuntimeBuilder, RuntimeReport, StageOptions,
    StageOrchestrator, StageResult,
};
use kiln_config::{Layout, ToolchainConfig};
use kiln_package::{HostTarget, PackageRequest, PackageResult, Packager};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Produces a release archive from an install tree
pub trait Packaging {
    fn package_tree(&self, request: &PackageRequest) -> PackageResult<PathBuf>;
}

impl Packaging for Packager<'_> {
    fn package_tree(&self, request: &PackageRequest) -> PackageResult<PathBuf> {
        self.package(request).map(|outcome| outcome.archive)
    }
}

/// What to run
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub stage: StageOptions,
    pub build: bool,
    pub package: bool,
    pub strip: bool,
    /// Cross-compile Windows toolchains; only honored on Linux hosts
    pub build_windows: bool,
    pub jobs: usize,
    pub dist_dir: PathBuf,
}

impl PipelineOptions {
    pub fn new(dist_dir: impl Into<PathBuf>) -> Self {
        Self {
            stage: StageOptions::default(),
            build: true,
            package: true,
            strip: true,
            build_windows: true,
            jobs: 1,
            dist_dir: dist_dir.into(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PipelineReport {
    pub stage1: Option<StageResult>,
    pub stage2: Option<StageResult>,
    pub runtimes: Option<RuntimeReport>,
    pub windows: Vec<StageResult>,
    pub packages: Vec<PathBuf>,
}

pub struct Pipeline<'a, E: BuildEngine + ?Sized, P: Packaging + ?Sized> {
    layout: &'a Layout,
    toolchain: &'a ToolchainConfig,
    engine: &'a E,
    packaging: &'a P,
    env: BaseEnvironment,
    options: PipelineOptions,
}

impl<'a, E: BuildEngine + ?Sized, P: Packaging + ?Sized> Pipeline<'a, E, P> {
    pub fn new(
        layout: &'a Layout,
        toolchain: &'a ToolchainConfig,
        engine: &'a E,
        packaging: &'a P,
        env: BaseEnvironment,
        options: PipelineOptions,
    ) -> Self {
        Self {
            layout,
            toolchain,
            engine,
            packaging,
            env,
            options,
        }
    }

    fn builds_windows(&self) -> bool {
        self.layout.host().is_linux() && self.options.build_windows
    }

    pub fn run(&self) -> Result<PipelineReport> {
        let mut stage_options = self.options.stage.clone();
        if stage_options.instrumented && !self.layout.host().is_linux() {
            log::warn!("Instrumented builds are only supported on Linux hosts; building normally");
            stage_options.instrumented = false;
        }

        let mut stages = StageOrchestrator::new(
            self.layout,
            self.toolchain,
            self.engine,
            self.env.clone(),
            stage_options,
        )?;
        let mut report = PipelineReport::default();

        if self.options.build {
            self.clean_install_dirs(&stages)?;

            report.stage1 = Some(stages.run_stage1()?.clone());
            let stage2 = stages.run_stage2()?.clone();

            if self.layout.host().is_linux() {
                let runtimes = RuntimeBuilder::new(
                    self.layout,
                    &self.toolchain.release,
                    &stage2,
                    self.engine,
                    self.env.clone(),
                )
                .with_jobs(self.options.jobs);
                report.runtimes = Some(runtimes.run()?);
            }
            report.stage2 = Some(stage2);

            if self.builds_windows() {
                for host in CrossHost::ALL {
                    report.windows.push(stages.run_cross(host)?);
                }
            }
        }

        if self.options.package {
            let strip_host = self.options.strip && !self.options.stage.debug;
            let host_tree = stages.stage2_install_dir();
            report
                .packages
                .push(self.package(&host_tree, self.layout.host().into(), strip_host)?);

            if self.builds_windows() {
                for host in [CrossHost::Windows32, CrossHost::Windows64] {
                    let tree = host.install_dir(self.layout);
                    report
                        .packages
                        .push(self.package(&tree, host.into(), self.options.strip)?);
                }
            }
        }

        Ok(report)
    }

    /// Remove the stage-2 and Windows install trees of an earlier run
    fn clean_install_dirs(&self, stages: &StageOrchestrator<'a, E>) -> Result<()> {
        let mut dirs = vec![stages.stage2_install_dir()];
        dirs.extend(CrossHost::ALL.iter().map(|host| host.install_dir(self.layout)));

        for dir in dirs {
            match fs::remove_dir_all(&dir) {
                Ok(()) => log::debug!("Removed {}", dir.display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(e).with_context(|| format!("Failed to remove {}", dir.display()))
                }
            }
        }
        Ok(())
    }

    fn package(&self, tree: &Path, host: HostTarget, strip: bool) -> Result<PathBuf> {
        let request = PackageRequest {
            source_tree: tree.to_path_buf(),
            host,
            build_name: self.options.stage.build_name.clone(),
            dist_dir: self.options.dist_dir.clone(),
            strip,
        };
        let archive = self.packaging.package_tree(&request)?;
        log::info!("Created {}", archive.display());
        Ok(archive)
    }
}
