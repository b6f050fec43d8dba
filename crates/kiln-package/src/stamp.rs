//! Header, license and version stamping of a package

use crate::filter::sorted_entries;
use crate::tree::install_file;
use crate::{PackageError, PackageResult};
use kiln_build::CompilerVersion;
use std::fs;
use std::path::{Path, PathBuf};

/// Projects whose `LICENSE.*` files make up the NOTICE, relative to the toolchain dir
pub const LICENSE_PROJECTS: &[&str] = &[
    "llvm",
    "llvm/projects/compiler-rt",
    "llvm/projects/libcxx",
    "llvm/projects/libcxxabi",
    "llvm/projects/openmp",
    "llvm/tools/clang",
    "llvm/tools/clang/tools/extra",
    "llvm/tools/lld",
];

pub const VERSION_FILE: &str = "AndroidVersion.txt";

/// Copy bionic's `stdatomic.h` into the clang resource include dir
pub fn install_stdatomic(
    bionic_include: &Path,
    install_dir: &Path,
    lib_dir_name: &str,
    version: &CompilerVersion,
) -> PackageResult<PathBuf> {
    let include = install_dir
        .join(lib_dir_name)
        .join("clang")
        .join(version.long_version())
        .join("include");
    install_file(&bionic_include.join("stdatomic.h"), &include)?;
    Ok(include.join("stdatomic.h"))
}

/// Copy `MODULE_LICENSE_*` markers and write the aggregated `NOTICE`
pub fn install_license_files(
    toolchain_dir: &Path,
    android_dir: &Path,
    install_dir: &Path,
) -> PackageResult<()> {
    for path in matching(android_dir, "MODULE_LICENSE_")? {
        install_file(&path, install_dir)?;
    }

    let mut notices = Vec::new();
    for project in LICENSE_PROJECTS {
        for path in matching(&toolchain_dir.join(project), "LICENSE.")? {
            let text = fs::read_to_string(&path).map_err(|e| PackageError::packaging(&path, e))?;
            notices.push(text);
        }
    }

    let notice = install_dir.join("NOTICE");
    fs::write(&notice, notices.join("\n")).map_err(|e| PackageError::packaging(&notice, e))?;
    log::debug!("Wrote {} license texts to {}", notices.len(), notice.display());
    Ok(())
}

/// Write `AndroidVersion.txt`: the long version and the source revision
pub fn write_version_file(
    install_dir: &Path,
    version: &CompilerVersion,
    revision: &str,
) -> PackageResult<()> {
    let path = install_dir.join(VERSION_FILE);
    let content = format!("{}\nbased on {}\n", version.long_version(), revision);
    fs::write(&path, content).map_err(|e| PackageError::packaging(&path, e))
}

/// Regular files in `dir` whose names start with `prefix`, sorted by name.
/// A missing directory has no matches.
fn matching(dir: &Path, prefix: &str) -> PackageResult<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    Ok(sorted_entries(dir)?
        .into_iter()
        .filter(|(name, path)| name.starts_with(prefix) && path.is_file())
        .map(|(_, path)| path)
        .collect())
}
