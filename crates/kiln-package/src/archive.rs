//! Reproducible `.tar.bz2` release archives
//!
//! Entries are added in sorted order with deterministic headers (fixed
//! mtime, zero ownership), so the same tree always yields the same bytes.

use crate::host::HostTarget;
use crate::{PackageError, PackageResult};
use bzip2::write::BzEncoder;
use bzip2::Compression;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tar::{Builder, HeaderMode};
use walkdir::WalkDir;

/// `<package-name>-<host>.tar.bz2`
pub fn archive_file_name(package_name: &str, host: HostTarget) -> String {
    format!("{}-{}.tar.bz2", package_name, host.tag())
}

/// Archive `<root>/<package_name>` into `output`; entries are rooted at
/// `<package_name>/`.
pub fn create_archive(root: &Path, package_name: &str, output: &Path) -> PackageResult<PathBuf> {
    let source = root.join(package_name);
    if !source.is_dir() {
        return Err(PackageError::packaging(&source, "package directory does not exist"));
    }
    if let Some(parent) = output.parent() {
        fs::create_dir_all(parent).map_err(|e| PackageError::packaging(parent, e))?;
    }

    log::info!("Packaging {}", output.display());
    let file = File::create(output).map_err(|e| PackageError::packaging(output, e))?;
    let encoder = BzEncoder::new(file, Compression::best());
    let mut builder = Builder::new(encoder);
    builder.mode(HeaderMode::Deterministic);
    builder.follow_symlinks(false);

    for entry in WalkDir::new(&source).follow_links(false).sort_by_file_name() {
        let entry = entry.map_err(|e| PackageError::packaging(&source, e))?;
        let rel = entry
            .path()
            .strip_prefix(root)
            .map_err(|e| PackageError::packaging(entry.path(), e))?;

        let appended = if entry.file_type().is_dir() {
            builder.append_dir(rel, entry.path())
        } else {
            builder.append_path_with_name(entry.path(), rel)
        };
        appended.map_err(|e| PackageError::packaging(entry.path(), e))?;
    }

    let encoder = builder
        .into_inner()
        .map_err(|e| PackageError::packaging(output, e))?;
    encoder
        .finish()
        .map_err(|e| PackageError::packaging(output, e))?;

    Ok(output.to_path_buf())
}
