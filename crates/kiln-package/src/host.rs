//! Package host targets and their shipped-binary allow-lists

use kiln_build::{CompilerVersion, CrossHost};
use kiln_config::HostOs;
use std::collections::BTreeSet;
use std::fmt;

/// Tools shipped in every package, without platform suffix
const SHIPPED_TOOLS: &[&str] = &[
    "clang",
    "clang++",
    "clang-format",
    "clang-tidy",
    "ld.lld",
    "ld64.lld",
    "lld",
    "lld-link",
    "llvm-ar",
    "llvm-as",
    "llvm-cov",
    "llvm-dis",
    "llvm-link",
    "llvm-modextract",
    "llvm-nm",
    "llvm-profdata",
    "llvm-readobj",
    "llvm-symbolizer",
    "sancov",
    "sanstats",
    "scan-build",
    "scan-view",
];

/// Script tools; stripping would corrupt them
pub const SCRIPT_BINARIES: &[&str] = &["git-clang-format", "scan-build", "scan-view"];

/// Platform a package is built for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostTarget {
    Linux,
    Darwin,
    Windows64,
    Windows32,
}

impl HostTarget {
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Linux => "linux-x86",
            Self::Darwin => "darwin-x86",
            Self::Windows64 => "windows-x86",
            Self::Windows32 => "windows-i386",
        }
    }

    pub fn is_windows(&self) -> bool {
        matches!(self, Self::Windows64 | Self::Windows32)
    }

    pub fn exe_suffix(&self) -> &'static str {
        if self.is_windows() {
            ".exe"
        } else {
            ""
        }
    }

    pub fn shlib_suffix(&self) -> &'static str {
        match self {
            Self::Linux => ".so",
            Self::Darwin => ".dylib",
            Self::Windows64 | Self::Windows32 => ".dll",
        }
    }

    /// Library directory of the install tree; 32-bit Windows uses `lib`
    pub fn lib_dir_name(&self) -> &'static str {
        match self {
            Self::Windows32 => "lib",
            _ => "lib64",
        }
    }

    /// File names allowed to remain in `bin/`
    pub fn shipped_binaries(&self, version: &CompilerVersion) -> BTreeSet<String> {
        let ext = self.exe_suffix();
        let mut names: BTreeSet<String> = SHIPPED_TOOLS
            .iter()
            .map(|tool| format!("{}{}", tool, ext))
            .collect();
        names.insert(format!("clang-{}{}", version.short_version(), ext));
        names.insert("git-clang-format".to_string());
        names.insert(format!("LLVMgold{}", self.shlib_suffix()));
        names
    }

    /// Whether `file_name` is a script that must not be stripped
    pub fn is_script(&self, file_name: &str) -> bool {
        SCRIPT_BINARIES.contains(&file_name)
    }
}

impl From<HostOs> for HostTarget {
    fn from(host: HostOs) -> Self {
        match host {
            HostOs::Linux => Self::Linux,
            HostOs::Darwin => Self::Darwin,
        }
    }
}

impl From<CrossHost> for HostTarget {
    fn from(host: CrossHost) -> Self {
        match host {
            CrossHost::Windows64 => Self::Windows64,
            CrossHost::Windows32 => Self::Windows32,
        }
    }
}

impl fmt::Display for HostTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tag())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn version() -> CompilerVersion {
        CompilerVersion::new("6", "0", "1")
    }

    #[test]
    fn test_linux_allow_list() {
        let names = HostTarget::Linux.shipped_binaries(&version());
        assert!(names.contains("clang"));
        assert!(names.contains("clang-6.0"));
        assert!(names.contains("LLVMgold.so"));
        assert!(names.contains("git-clang-format"));
        assert!(!names.contains("llvm-tblgen"));
        assert_eq!(names.len(), SHIPPED_TOOLS.len() + 3);
    }

    #[test]
    fn test_windows_allow_list() {
        let names = HostTarget::Windows64.shipped_binaries(&version());
        assert!(names.contains("clang.exe"));
        assert!(names.contains("clang-6.0.exe"));
        assert!(names.contains("LLVMgold.dll"));
        // the script keeps its bare name everywhere
        assert!(names.contains("git-clang-format"));
        assert!(!names.contains("clang"));
    }

    #[rstest]
    #[case(HostTarget::Linux, "linux-x86", "lib64")]
    #[case(HostTarget::Darwin, "darwin-x86", "lib64")]
    #[case(HostTarget::Windows64, "windows-x86", "lib64")]
    #[case(HostTarget::Windows32, "windows-i386", "lib")]
    fn test_host_layout(#[case] host: HostTarget, #[case] tag: &str, #[case] lib: &str) {
        assert_eq!(host.tag(), tag);
        assert_eq!(host.lib_dir_name(), lib);
    }

    #[test]
    fn test_scripts() {
        assert!(HostTarget::Linux.is_script("scan-build"));
        assert!(!HostTarget::Linux.is_script("clang"));
    }
}
