//! End-to-end packaging tests against temp install trees

mod common;

use common::{assert_eq, write_file, Fixture, RecordingRunner, VERSION_INC};
use kiln_build::BuildError;
use kiln_package::{HostTarget, PackageError, PackageRequest, Packager};
use std::fs;
use std::path::{Path, PathBuf};

fn request(fixture: &Fixture, tree: PathBuf, host: HostTarget) -> PackageRequest {
    PackageRequest {
        source_tree: tree,
        host,
        build_name: "dev".to_string(),
        dist_dir: fixture.dist(),
        strip: true,
    }
}

fn is_symlink(path: &Path) -> bool {
    fs::symlink_metadata(path)
        .map(|meta| meta.file_type().is_symlink())
        .unwrap_or(false)
}

fn listing(dir: &Path) -> Vec<String> {
    let mut names: Vec<_> = fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().to_string())
        .collect();
    names.sort();
    names
}

#[cfg(unix)]
#[test]
fn test_linux_package() {
    let fixture = Fixture::new();
    let tree = fixture.linux_install();
    let runner = RecordingRunner::default();
    let packager = Packager::new(&fixture.layout, &fixture.toolchain.release, &runner);

    let outcome = packager
        .package(&request(&fixture, tree.clone(), HostTarget::Linux))
        .unwrap();

    let install = fixture.out("install/linux-x86/clang-dev");
    assert_eq!(outcome.install_dir, install);
    assert_eq!(outcome.archive, fixture.dist().join("clang-dev-linux-x86.tar.bz2"));
    assert!(outcome.archive.is_file());
    assert_eq!(outcome.version.long_version(), "6.0.1");

    assert_eq!(
        listing(&install.join("bin")),
        vec![
            "bisect_driver.py",
            "clang",
            "clang++",
            "clang++.real",
            "clang-6.0",
            "clang-format",
            "clang-tidy",
            "clang-tidy.real",
            "clang.real",
            "llvm-ar",
            "scan-build",
        ]
    );
    assert_eq!(outcome.binaries.removed, vec!["llvm-tblgen", "opt"]);
    assert_eq!(runner.commands().len(), 6);
    assert!(runner
        .commands()
        .iter()
        .all(|cmd| !cmd.args[0].ends_with("scan-build")));

    let bin = install.join("bin");
    assert_eq!(fs::read_to_string(bin.join("clang.real")).unwrap(), "clang");
    assert_eq!(fs::read_link(bin.join("clang++.real")).unwrap(), PathBuf::from("clang.real"));
    assert!(fs::read_to_string(bin.join("clang++")).unwrap().contains("# wrapper"));

    let lib = install.join("lib64");
    assert_eq!(
        listing(&lib),
        vec![
            "clang",
            "libLLVM-6.0svn.so",
            "libLTO.so",
            "libc++.so.1",
            "libc++abi.so.1",
            "libclang.so.6",
        ]
    );
    for name in ["libclang.so.6", "libc++.so.1", "libc++abi.so.1"] {
        assert!(!is_symlink(&lib.join(name)), "{} should be the real library", name);
    }
    assert_eq!(fs::read_to_string(lib.join("libc++abi.so.1")).unwrap(), "c++abi");
    assert_eq!(outcome.normalized_libraries.len(), 4);
    assert_eq!(outcome.static_libraries_removed, 1);

    assert!(lib.join("clang/6.0.1/include/stdatomic.h").is_file());
    assert!(install.join("MODULE_LICENSE_BSD_LIKE").is_file());
    assert_eq!(
        fs::read_to_string(install.join("NOTICE")).unwrap(),
        "LLVM license\nClang license"
    );
    assert_eq!(
        fs::read_to_string(install.join("AndroidVersion.txt")).unwrap(),
        "6.0.1\nbased on r316199\n"
    );

    // the build tree itself is never modified
    assert!(tree.join("bin/opt").is_file());
    assert!(is_symlink(&tree.join("lib64/libclang.so.6")));
}

#[cfg(unix)]
#[test]
fn test_layout_violation_leaves_tree_untouched() {
    let fixture = Fixture::new();
    let tree = fixture.linux_install();
    let soname = tree.join("lib64/libc++.so.1");
    fs::remove_file(&soname).unwrap();
    write_file(&soname, "not a link");

    let runner = RecordingRunner::default();
    let packager = Packager::new(&fixture.layout, &fixture.toolchain.release, &runner);
    let err = packager
        .package(&request(&fixture, tree, HostTarget::Linux))
        .unwrap_err();

    match err {
        PackageError::LibraryLayout { path, reason } => {
            assert!(path.ends_with("lib64/libc++.so.1"));
            assert_eq!(reason, "must be a symlink");
        }
        other => panic!("expected LibraryLayout, got {:?}", other),
    }

    // earlier libraries were validated but not moved
    let lib = fixture.out("install/linux-x86/clang-dev/lib64");
    assert!(lib.join("libclang.so.6.0").is_file());
    assert!(is_symlink(&lib.join("libclang.so.6")));
    assert!(lib.join("libc++.so").exists());
    assert!(!fixture.dist().join("clang-dev-linux-x86.tar.bz2").exists());
}

#[cfg(unix)]
#[test]
fn test_archive_is_reproducible() {
    let fixture = Fixture::new();
    let tree = fixture.linux_install();
    let runner = RecordingRunner::default();
    let packager = Packager::new(&fixture.layout, &fixture.toolchain.release, &runner);

    let first = packager
        .package(&request(&fixture, tree.clone(), HostTarget::Linux))
        .unwrap();
    let first_bytes = fs::read(&first.archive).unwrap();

    let second = packager
        .package(&request(&fixture, tree, HostTarget::Linux))
        .unwrap();
    let second_bytes = fs::read(&second.archive).unwrap();

    assert_eq!(first.archive, second.archive);
    assert!(first_bytes == second_bytes, "archives differ between runs");
}

#[test]
fn test_windows_i386_package() {
    let fixture = Fixture::new();
    let tree = fixture.windows_install("windows-i386-install");
    let runner = RecordingRunner::default();
    let packager = Packager::new(&fixture.layout, &fixture.toolchain.release, &runner);

    let outcome = packager
        .package(&request(&fixture, tree, HostTarget::Windows32))
        .unwrap();

    let install = fixture.out("install/windows-i386/clang-dev");
    assert_eq!(
        listing(&install.join("bin")),
        vec!["clang++.exe", "clang.exe", "git-clang-format", "libwinpthread-1.dll"]
    );
    assert_eq!(
        fs::read_to_string(install.join("bin/libwinpthread-1.dll")).unwrap(),
        "dll32"
    );
    // only the 32-bit library dir is pruned
    assert!(!install.join("lib/libclang.a").exists());
    assert!(install.join("lib64/libclang.a").exists());
    assert!(install.join("lib/clang/6.0.1/include/stdatomic.h").is_file());
    assert!(!install.join("bin/clang.real").exists());
    assert!(outcome.normalized_libraries.is_empty());
    assert_eq!(runner.commands().len(), 2);
    assert_eq!(
        outcome.archive,
        fixture.dist().join("clang-dev-windows-i386.tar.bz2")
    );
}

#[test]
fn test_windows_x86_uses_64_bit_runtime() {
    let fixture = Fixture::new();
    let tree = fixture.windows_install("windows-x86-install");
    let runner = RecordingRunner::default();
    let packager = Packager::new(&fixture.layout, &fixture.toolchain.release, &runner);

    let mut req = request(&fixture, tree, HostTarget::Windows64);
    req.strip = false;
    packager.package(&req).unwrap();

    let install = fixture.out("install/windows-x86/clang-dev");
    assert_eq!(
        fs::read_to_string(install.join("bin/libwinpthread-1.dll")).unwrap(),
        "dll64"
    );
    assert!(!install.join("lib64/libclang.a").exists());
    assert!(runner.commands().is_empty());
}

#[cfg(unix)]
#[test]
fn test_darwin_normalizes_dylibs() {
    let fixture = Fixture::new();
    let root = fixture.out("darwin-install");
    write_file(&root.join("include/clang/Basic/Version.inc"), VERSION_INC);
    write_file(&root.join("bin/clang"), "clang");
    write_file(&root.join("bin/clang-tidy"), "tidy");
    let lib = root.join("lib64");
    write_file(&lib.join("libc++.1.0.dylib"), "c++");
    common::link("libc++.1.0.dylib", &lib.join("libc++.1.dylib"));
    common::link("libc++.1.dylib", &lib.join("libc++.dylib"));
    write_file(&lib.join("libc++abi.1.0.dylib"), "c++abi");
    common::link("libc++abi.1.0.dylib", &lib.join("libc++abi.1.dylib"));
    write_file(&lib.join("libclang.dylib"), "clang");

    let runner = RecordingRunner::default();
    let packager = Packager::new(&fixture.layout, &fixture.toolchain.release, &runner);
    packager
        .package(&request(&fixture, root, HostTarget::Darwin))
        .unwrap();

    let lib = fixture.out("install/darwin-x86/clang-dev/lib64");
    assert_eq!(
        listing(&lib),
        vec!["clang", "libc++.1.dylib", "libc++abi.1.dylib", "libclang.dylib"]
    );
    assert!(fixture.dist().join("clang-dev-darwin-x86.tar.bz2").is_file());
}

#[test]
fn test_missing_version_header() {
    let fixture = Fixture::new();
    let tree = fixture.out("empty-install");
    fs::create_dir_all(tree.join("bin")).unwrap();
    let runner = RecordingRunner::default();
    let packager = Packager::new(&fixture.layout, &fixture.toolchain.release, &runner);

    let err = packager
        .package(&request(&fixture, tree, HostTarget::Linux))
        .unwrap_err();
    assert!(matches!(err, PackageError::Build(BuildError::VersionFile { .. })));
    assert!(!fixture.out("install/linux-x86").exists());
}
