//! Binary allow-list filtering and static library pruning
//!
//! Removals here are advisory: a file that cannot be deleted is logged and
//! left in place. Stripping is not; a failing `strip` aborts packaging.

use crate::host::HostTarget;
use crate::{PackageError, PackageResult};
use kiln_build::{CompilerVersion, ToolCommand, ToolRunner};
use std::fs;
use std::path::{Path, PathBuf};

/// What happened to the contents of `bin/`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterReport {
    pub kept: Vec<String>,
    pub removed: Vec<String>,
    pub stripped: Vec<String>,
}

/// Delete every regular file in `bin_dir` outside the allow-list and strip
/// the ones that stay (scripts excepted) when `strip` is set.
///
/// Links count as the file they resolve to; directories are left alone.
pub fn filter_binaries(
    bin_dir: &Path,
    host: HostTarget,
    version: &CompilerVersion,
    strip: bool,
    runner: &dyn ToolRunner,
) -> PackageResult<FilterReport> {
    let allowed = host.shipped_binaries(version);
    let mut report = FilterReport::default();

    for (name, path) in sorted_entries(bin_dir)? {
        let is_file = fs::metadata(&path)
            .map(|meta| meta.file_type().is_file())
            .unwrap_or(false);
        if !is_file {
            continue;
        }

        if !allowed.contains(&name) {
            remove_advisory(&path);
            report.removed.push(name);
            continue;
        }

        if strip && !host.is_script(&name) {
            runner.run("strip", &ToolCommand::new("strip").arg(path.display().to_string()))?;
            report.stripped.push(name.clone());
        }
        report.kept.push(name);
    }

    log::info!(
        "Kept {} binaries in {} ({} removed, {} stripped)",
        report.kept.len(),
        bin_dir.display(),
        report.removed.len(),
        report.stripped.len()
    );
    Ok(report)
}

/// Delete the `.a` archives directly inside `lib_dir`; a missing directory
/// is not an error. Returns the number of archives removed.
pub fn remove_static_libraries(lib_dir: &Path) -> PackageResult<usize> {
    if !lib_dir.is_dir() {
        return Ok(0);
    }

    let mut removed = 0;
    for (name, path) in sorted_entries(lib_dir)? {
        if name.ends_with(".a") {
            remove_advisory(&path);
            removed += 1;
        }
    }
    log::debug!("Removed {} static libraries from {}", removed, lib_dir.display());
    Ok(removed)
}

/// Remove a file, warning instead of failing
pub(crate) fn remove_advisory(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => log::debug!("Removed {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => log::warn!("Could not remove {}: {}", path.display(), e),
    }
}

pub(crate) fn sorted_entries(dir: &Path) -> PackageResult<Vec<(String, PathBuf)>> {
    let entries = fs::read_dir(dir).map_err(|e| PackageError::packaging(dir, e))?;
    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| PackageError::packaging(dir, e))?;
        files.push((entry.file_name().to_string_lossy().to_string(), entry.path()));
    }
    files.sort();
    Ok(files)
}
