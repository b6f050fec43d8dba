//! Package assembly
//!
//! A [`Packager`] takes a finished install tree through the full sequence:
//! copy, filter and strip, prune, wrap or add Windows runtime libraries,
//! normalize, stamp and archive.

use crate::archive::{archive_file_name, create_archive};
use crate::filter::{filter_binaries, remove_static_libraries, FilterReport};
use crate::host::HostTarget;
use crate::normalize::normalize_host_libs;
use crate::stamp::{install_license_files, install_stdatomic, write_version_file};
use crate::tree::{copy_tree, install_file, remove_dir_if_present};
use crate::wrappers::install_wrappers;
use crate::PackageResult;
use kiln_build::{CompilerVersion, ToolRunner};
use kiln_config::{Layout, ReleaseConfig};
use std::path::{Path, PathBuf};

pub const WINPTHREADS_DLL: &str = "libwinpthread-1.dll";

/// One package to produce
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageRequest {
    /// Install tree of the build being packaged
    pub source_tree: PathBuf,
    pub host: HostTarget,
    pub build_name: String,
    /// Directory receiving the archive
    pub dist_dir: PathBuf,
    pub strip: bool,
}

impl PackageRequest {
    /// `clang-<build-name>`
    pub fn package_name(&self) -> String {
        format!("clang-{}", self.build_name)
    }
}

/// Result of a packaging run
#[derive(Debug, Clone)]
pub struct PackageOutcome {
    pub archive: PathBuf,
    pub install_dir: PathBuf,
    pub version: CompilerVersion,
    pub binaries: FilterReport,
    pub static_libraries_removed: usize,
    pub normalized_libraries: Vec<PathBuf>,
}

pub struct Packager<'a> {
    layout: &'a Layout,
    release: &'a ReleaseConfig,
    runner: &'a dyn ToolRunner,
}

impl<'a> Packager<'a> {
    pub fn new(layout: &'a Layout, release: &'a ReleaseConfig, runner: &'a dyn ToolRunner) -> Self {
        Self {
            layout,
            release,
            runner,
        }
    }

    /// `<out>/install/<host>`; wiped before every package of that host
    pub fn install_host_dir(&self, host: HostTarget) -> PathBuf {
        self.layout.out_path("install").join(host.tag())
    }

    /// Mingw's winpthreads runtime for a Windows host
    pub fn winpthreads_dll(&self, host: HostTarget) -> PathBuf {
        let dir = match host {
            HostTarget::Windows32 => "lib32",
            _ => "bin",
        };
        self.layout
            .mingw_root()
            .join("x86_64-w64-mingw32")
            .join(dir)
            .join(WINPTHREADS_DLL)
    }

    pub fn package(&self, request: &PackageRequest) -> PackageResult<PackageOutcome> {
        let host = request.host;
        let version = CompilerVersion::from_install(&request.source_tree)?;
        let package_name = request.package_name();
        let install_host_dir = self.install_host_dir(host);
        let install_dir = install_host_dir.join(&package_name);
        log::info!("Packaging {} {} for {}", package_name, version, host);

        remove_dir_if_present(&install_host_dir)?;
        copy_tree(&request.source_tree, &install_dir)?;

        let binaries = filter_binaries(
            &install_dir.join("bin"),
            host,
            &version,
            request.strip,
            self.runner,
        )?;
        let lib_dir = install_dir.join(host.lib_dir_name());
        let static_libraries_removed = remove_static_libraries(&lib_dir)?;

        let normalized_libraries = if host.is_windows() {
            install_file(&self.winpthreads_dll(host), &install_dir.join("bin"))?;
            Vec::new()
        } else {
            install_wrappers(&install_dir, &self.layout.llvm_android_dir())?;
            normalize_host_libs(&install_dir, host, &version)?
        };

        self.stamp(&install_dir, host, &version)?;

        let archive = request
            .dist_dir
            .join(archive_file_name(&package_name, host));
        create_archive(&install_host_dir, &package_name, &archive)?;

        Ok(PackageOutcome {
            archive,
            install_dir,
            version,
            binaries,
            static_libraries_removed,
            normalized_libraries,
        })
    }

    fn stamp(&self, install_dir: &Path, host: HostTarget, version: &CompilerVersion) -> PackageResult<()> {
        install_stdatomic(
            &self.layout.bionic_include(),
            install_dir,
            host.lib_dir_name(),
            version,
        )?;
        install_license_files(
            &self.layout.toolchain_dir(),
            &self.layout.llvm_android_dir(),
            install_dir,
        )?;
        write_version_file(install_dir, version, &self.release.revision)
    }
}
