//! SONAME normalization of host shared libraries
//!
//! After normalization exactly one file remains per library and its name
//! matches the SONAME the linker recorded. The whole layout is validated
//! before anything is moved, so a violation leaves the tree untouched.

use crate::filter::{remove_advisory, sorted_entries};
use crate::host::HostTarget;
use crate::{PackageError, PackageResult};
use kiln_build::CompilerVersion;
use std::fs;
use std::path::{Path, PathBuf};

/// File name pattern of one host library; `{v}` is replaced by a version
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SonameRule {
    pub library: &'static str,
    pub template: &'static str,
}

const LINUX_RULES: &[SonameRule] = &[
    SonameRule {
        library: "libLLVM",
        template: "libLLVM-{v}svn.so",
    },
    SonameRule {
        library: "libclang",
        template: "libclang.so.{v}",
    },
    SonameRule {
        library: "libc++",
        template: "libc++.so.{v}",
    },
    SonameRule {
        library: "libc++abi",
        template: "libc++abi.so.{v}",
    },
];

const DARWIN_RULES: &[SonameRule] = &[
    SonameRule {
        library: "libc++",
        template: "libc++.{v}.dylib",
    },
    SonameRule {
        library: "libc++abi",
        template: "libc++abi.{v}.dylib",
    },
];

/// Libraries normalized for `host`; Windows packages have none
pub fn soname_rules(host: HostTarget) -> &'static [SonameRule] {
    match host {
        HostTarget::Linux => LINUX_RULES,
        HostTarget::Darwin => DARWIN_RULES,
        HostTarget::Windows64 | HostTarget::Windows32 => &[],
    }
}

impl SonameRule {
    /// libLLVM's real name already is its SONAME
    pub fn is_self_named(&self) -> bool {
        self.library == "libLLVM"
    }

    /// `(real, soname)` version strings; libc++ and libc++abi carry their own ABI version
    fn versions(&self, version: &CompilerVersion) -> (String, String) {
        if self.library.starts_with("libc++") {
            ("1.0".to_string(), "1".to_string())
        } else {
            (version.short_version(), version.major.clone())
        }
    }

    fn render(&self, v: &str) -> String {
        self.template.replace("{v}", v)
    }

    /// File names of the real library and of its SONAME link
    pub fn file_names(&self, version: &CompilerVersion) -> (String, String) {
        let (real, soname) = self.versions(version);
        let real = self.render(&real);
        if self.is_self_named() {
            (real.clone(), real)
        } else {
            (real, self.render(&soname))
        }
    }

    /// Siblings of this library that normalization deletes. The separator
    /// keeps `libc++` from claiming `libc++abi` files.
    fn owns(&self, file_name: &str) -> bool {
        file_name
            .strip_prefix(self.library)
            .is_some_and(|rest| rest.starts_with('.') || rest.starts_with('-'))
    }
}

struct PlannedMove {
    rule: SonameRule,
    real: PathBuf,
    soname: PathBuf,
}

/// Normalize the host libraries in `<install_dir>/lib64`, returning the
/// surviving library paths in rule order.
pub fn normalize_host_libs(
    install_dir: &Path,
    host: HostTarget,
    version: &CompilerVersion,
) -> PackageResult<Vec<PathBuf>> {
    let rules = soname_rules(host);
    if rules.is_empty() {
        return Ok(Vec::new());
    }

    let lib_dir = install_dir.join(host.lib_dir_name());
    let plan = rules
        .iter()
        .map(|rule| validate(&lib_dir, *rule, version))
        .collect::<PackageResult<Vec<_>>>()?;

    let mut kept = Vec::with_capacity(plan.len());
    for planned in plan {
        if !planned.rule.is_self_named() {
            fs::rename(&planned.real, &planned.soname)
                .map_err(|e| PackageError::packaging(&planned.real, e))?;
            log::debug!(
                "Renamed {} to {}",
                planned.real.display(),
                planned.soname.display()
            );
        }

        for (name, path) in sorted_entries(&lib_dir)? {
            if planned.rule.owns(&name) && path != planned.soname {
                remove_advisory(&path);
            }
        }
        kept.push(planned.soname);
    }

    log::info!("Normalized {} host libraries in {}", kept.len(), lib_dir.display());
    Ok(kept)
}

fn validate(lib_dir: &Path, rule: SonameRule, version: &CompilerVersion) -> PackageResult<PlannedMove> {
    let (real_name, soname_name) = rule.file_names(version);
    let real = lib_dir.join(real_name);
    let soname = lib_dir.join(soname_name);

    let real_is_file = fs::symlink_metadata(&real)
        .map(|meta| meta.file_type().is_file())
        .unwrap_or(false);
    if !real_is_file {
        return Err(PackageError::layout(&real, "must be a regular file"));
    }

    if !rule.is_self_named() {
        let soname_is_link = fs::symlink_metadata(&soname)
            .map(|meta| meta.file_type().is_symlink())
            .unwrap_or(false);
        if !soname_is_link {
            return Err(PackageError::layout(&soname, "must be a symlink"));
        }
    }

    Ok(PlannedMove { rule, real, soname })
}
