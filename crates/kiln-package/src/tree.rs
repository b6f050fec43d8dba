//! File tree helpers: symlink-preserving copies and single-file installs

use crate::{PackageError, PackageResult};
use std::fs;
use std::path::Path;
use walkdir::WalkDir;

#[cfg(unix)]
use std::os::unix::fs as unix_fs;

/// Copy `src` to `dst` recursively. Symlinks are recreated, not followed.
pub fn copy_tree(src: &Path, dst: &Path) -> PackageResult<()> {
    if !src.is_dir() {
        return Err(PackageError::packaging(src, "install tree does not exist"));
    }

    for entry in WalkDir::new(src).follow_links(false).sort_by_file_name() {
        let entry = entry.map_err(|e| PackageError::packaging(src, e))?;
        let rel = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| PackageError::packaging(entry.path(), e))?;
        let target = dst.join(rel);
        let file_type = entry.file_type();

        if file_type.is_dir() {
            fs::create_dir_all(&target).map_err(|e| PackageError::packaging(&target, e))?;
        } else if file_type.is_symlink() {
            let link = fs::read_link(entry.path())
                .map_err(|e| PackageError::packaging(entry.path(), e))?;
            symlink(&link, &target)?;
        } else {
            fs::copy(entry.path(), &target).map_err(|e| PackageError::packaging(&target, e))?;
        }
    }
    Ok(())
}

/// Create `link` pointing at `target`
pub fn symlink(target: &Path, link: &Path) -> PackageResult<()> {
    #[cfg(unix)]
    {
        unix_fs::symlink(target, link).map_err(|e| PackageError::packaging(link, e))?;
    }

    #[cfg(windows)]
    {
        use std::os::windows::fs as windows_fs;
        windows_fs::symlink_file(target, link).map_err(|e| PackageError::packaging(link, e))?;
    }

    #[cfg(not(any(unix, windows)))]
    {
        let _ = target;
        return Err(PackageError::packaging(
            link,
            "symlinks are not supported on this platform",
        ));
    }

    #[allow(unreachable_code)]
    Ok(())
}

/// Copy `file` into directory `dir`, creating it as needed
pub fn install_file(file: &Path, dir: &Path) -> PackageResult<()> {
    let name = file
        .file_name()
        .ok_or_else(|| PackageError::packaging(file, "not a file path"))?;
    fs::create_dir_all(dir).map_err(|e| PackageError::packaging(dir, e))?;
    let dest = dir.join(name);
    fs::copy(file, &dest).map_err(|e| PackageError::packaging(file, e))?;
    log::debug!("Installed {} to {}", file.display(), dest.display());
    Ok(())
}

/// Remove `path` if it exists
pub fn remove_dir_if_present(path: &Path) -> PackageResult<()> {
    match fs::remove_dir_all(path) {
        Ok(()) => {
            log::debug!("Removed {}", path.display());
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(PackageError::packaging(path, e)),
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;

    #[test]
    fn test_copy_tree_preserves_symlinks() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        fs::create_dir_all(src.join("lib64")).unwrap();
        fs::write(src.join("lib64/libc++.so.1.0"), "lib").unwrap();
        unix_fs::symlink("libc++.so.1.0", src.join("lib64/libc++.so.1")).unwrap();

        let dst = dir.path().join("dst");
        copy_tree(&src, &dst).unwrap();

        let link = dst.join("lib64/libc++.so.1");
        assert!(fs::symlink_metadata(&link).unwrap().file_type().is_symlink());
        assert_eq!(fs::read_link(&link).unwrap(), PathBuf::from("libc++.so.1.0"));
        assert_eq!(fs::read_to_string(dst.join("lib64/libc++.so.1.0")).unwrap(), "lib");
    }

    #[test]
    fn test_copy_missing_tree() {
        let dir = tempfile::tempdir().unwrap();
        let err = copy_tree(&dir.path().join("missing"), &dir.path().join("dst")).unwrap_err();
        assert!(matches!(err, PackageError::Packaging { .. }));
    }

    #[test]
    fn test_install_file_creates_dir() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("stdatomic.h");
        fs::write(&file, "header").unwrap();

        let include = dir.path().join("lib64/clang/6.0.1/include");
        install_file(&file, &include).unwrap();
        assert!(include.join("stdatomic.h").is_file());
        remove_dir_if_present(&dir.path().join("lib64")).unwrap();
        remove_dir_if_present(&dir.path().join("lib64")).unwrap();
    }
}
