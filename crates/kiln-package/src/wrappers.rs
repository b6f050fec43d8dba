//! Compiler wrapper installation
//!
//! `clang`, `clang++` and `clang-tidy` become copies of the Android wrapper
//! script; the real driver lives on as `clang.real` (with `clang++.real`
//! linking to it) and `clang-tidy.real`.

use crate::tree::{install_file, symlink};
use crate::{PackageError, PackageResult};
use std::fs;
use std::path::Path;

pub const COMPILER_WRAPPER: &str = "compiler_wrapper.py";
pub const BISECT_DRIVER: &str = "bisect_driver.py";

const WRAPPED: &[&str] = &["clang", "clang++", "clang-tidy"];

/// Install the wrapper scripts from `android_dir` into `<install_dir>/bin`
pub fn install_wrappers(install_dir: &Path, android_dir: &Path) -> PackageResult<()> {
    let bin = install_dir.join("bin");
    let wrapper = android_dir.join(COMPILER_WRAPPER);
    let bisect = android_dir.join(BISECT_DRIVER);
    for script in [&wrapper, &bisect] {
        if !script.is_file() {
            return Err(PackageError::packaging(script, "wrapper script is missing"));
        }
    }

    // a prebuilt install may already carry the .real drivers
    for tool in ["clang", "clang-tidy"] {
        let real = bin.join(format!("{}.real", tool));
        if !exists(&real) {
            let driver = bin.join(tool);
            fs::rename(&driver, &real).map_err(|e| PackageError::packaging(&driver, e))?;
        }
    }

    for name in WRAPPED.iter().copied().chain(["clang++.real"]) {
        remove_if_present(&bin.join(name))?;
    }
    symlink(Path::new("clang.real"), &bin.join("clang++.real"))?;

    for name in WRAPPED {
        let dest = bin.join(name);
        fs::copy(&wrapper, &dest).map_err(|e| PackageError::packaging(&dest, e))?;
    }
    install_file(&bisect, &bin)?;

    log::info!("Installed compiler wrappers in {}", bin.display());
    Ok(())
}

fn exists(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok()
}

fn remove_if_present(path: &Path) -> PackageResult<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(PackageError::packaging(path, e)),
        _ => Ok(()),
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;

    fn setup() -> (tempfile::TempDir, PathBuf, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let install = dir.path().join("install");
        let android = dir.path().join("android");
        fs::create_dir_all(install.join("bin")).unwrap();
        fs::create_dir_all(&android).unwrap();
        fs::write(android.join(COMPILER_WRAPPER), "#!/usr/bin/env python\n").unwrap();
        fs::write(android.join(BISECT_DRIVER), "# bisect\n").unwrap();
        fs::write(install.join("bin/clang"), "driver").unwrap();
        fs::write(install.join("bin/clang-tidy"), "tidy").unwrap();
        std::os::unix::fs::symlink("clang", install.join("bin/clang++")).unwrap();
        (dir, install, android)
    }

    #[test]
    fn test_wrappers_replace_drivers() {
        let (_dir, install, android) = setup();
        install_wrappers(&install, &android).unwrap();

        let bin = install.join("bin");
        assert_eq!(fs::read_to_string(bin.join("clang.real")).unwrap(), "driver");
        assert_eq!(fs::read_to_string(bin.join("clang-tidy.real")).unwrap(), "tidy");
        assert_eq!(fs::read_link(bin.join("clang++.real")).unwrap(), PathBuf::from("clang.real"));
        for name in WRAPPED {
            assert_eq!(
                fs::read_to_string(bin.join(name)).unwrap(),
                "#!/usr/bin/env python\n"
            );
        }
        assert!(bin.join(BISECT_DRIVER).is_file());
    }

    #[test]
    fn test_existing_real_driver_is_kept() {
        let (_dir, install, android) = setup();
        fs::write(install.join("bin/clang.real"), "prebuilt").unwrap();
        install_wrappers(&install, &android).unwrap();
        assert_eq!(
            fs::read_to_string(install.join("bin/clang.real")).unwrap(),
            "prebuilt"
        );
    }

    #[test]
    fn test_missing_wrapper_script() {
        let (_dir, install, android) = setup();
        fs::remove_file(android.join(COMPILER_WRAPPER)).unwrap();
        assert!(install_wrappers(&install, &android).is_err());
        assert!(install.join("bin/clang").is_file());
    }
}
