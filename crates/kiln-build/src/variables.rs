//! Build-system variable assignments (`-DNAME=value`)

use kiln_config::ReleaseConfig;
use serde::Serialize;
use std::collections::BTreeMap;

/// Variable name → value map passed to the external build engine
///
/// Keys are unique and kept sorted so the rendered command line is stable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct BuildVariables(BTreeMap<String, String>);

impl BuildVariables {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign a variable, replacing any previous value
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.0.insert(name.into(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    /// Apply every assignment of `other` on top of this map
    pub fn merge(&mut self, other: &BuildVariables) -> &mut Self {
        for (name, value) in &other.0 {
            self.0.insert(name.clone(), value.clone());
        }
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Render as `-DNAME=value` arguments
    pub fn to_args(&self) -> Vec<String> {
        self.iter()
            .map(|(name, value)| format!("-D{}={}", name, value))
            .collect()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for BuildVariables {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// Join flags the way CMAKE_*_FLAGS expects them
pub fn join_flags(flags: &[String]) -> String {
    flags.join(" ")
}

/// Options common to every LLVM-tree build (compiler stages and runtimes)
pub fn base_variables(release: &ReleaseConfig) -> BuildVariables {
    let mut vars = BuildVariables::new();
    vars.set("CMAKE_BUILD_TYPE", "Release")
        .set("LLVM_ENABLE_ASSERTIONS", "OFF")
        .set("LLVM_ENABLE_THREADS", "OFF")
        .set("LLVM_LIBDIR_SUFFIX", "64")
        .set("LLVM_VERSION_PATCH", release.patch_level.as_str())
        .set("CLANG_VERSION_PATCHLEVEL", release.patch_level.as_str())
        .set("CLANG_REPOSITORY_STRING", release.clang_repository.as_str())
        .set("LLVM_REPOSITORY_STRING", release.llvm_repository.as_str());
    vars
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_are_sorted() {
        let vars: BuildVariables = [("Z_LAST", "1"), ("A_FIRST", "2")].into_iter().collect();
        assert_eq!(vars.to_args(), vec!["-DA_FIRST=2", "-DZ_LAST=1"]);
    }

    #[test]
    fn test_merge_overrides() {
        let mut base = base_variables(&ReleaseConfig::default());
        let mut extra = BuildVariables::new();
        extra.set("CMAKE_BUILD_TYPE", "Debug");
        base.merge(&extra);
        assert_eq!(base.get("CMAKE_BUILD_TYPE"), Some("Debug"));
        assert_eq!(base.get("LLVM_LIBDIR_SUFFIX"), Some("64"));
    }

    #[test]
    fn test_base_variables_carry_patch_level() {
        let release = ReleaseConfig {
            patch_level: "3".to_string(),
            ..ReleaseConfig::default()
        };
        let vars = base_variables(&release);
        assert_eq!(vars.get("LLVM_VERSION_PATCH"), Some("3"));
        assert_eq!(vars.get("CLANG_VERSION_PATCHLEVEL"), Some("3"));
    }
}
