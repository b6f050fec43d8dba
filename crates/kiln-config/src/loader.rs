//! Configuration Loader
//!
//! Handles loading kiln.toml and applying environment overrides with proper precedence.

use crate::layout::{HostOs, Layout};
use crate::toolchain::ToolchainConfig;
use crate::ConfigResult;
use std::env;
use std::path::{Path, PathBuf};

/// Name of the configuration file searched for by [`ConfigLoader`]
pub const CONFIG_FILE_NAME: &str = "kiln.toml";

/// Environment variable overriding the package destination
pub const DIST_DIR_VAR: &str = "DIST_DIR";

/// Environment variable overriding the output root
pub const OUT_DIR_VAR: &str = "KILN_OUT_DIR";

/// Configuration loader
///
/// Loads configuration and merges it with proper precedence:
/// 1. Built-in defaults - lowest priority
/// 2. Toolchain config (./kiln.toml) - overrides defaults
/// 3. Environment variables - overrides kiln.toml
/// 4. CLI flags - highest priority (handled by caller)
#[derive(Debug, Default)]
pub struct ConfigLoader {
    /// Skip environment overrides (used by tests and `--config` dry runs)
    ignore_env: bool,
}

/// Merged configuration result
#[derive(Debug, Clone)]
pub struct Config {
    /// Toolchain configuration
    pub toolchain: ToolchainConfig,

    /// Directory relative paths are resolved against
    pub base_dir: PathBuf,

    /// Location of the loaded kiln.toml, if one was found
    pub config_file: Option<PathBuf>,
}

impl ConfigLoader {
    /// Create a new configuration loader
    pub fn new() -> Self {
        Self { ignore_env: false }
    }

    /// Do not apply environment variable overrides
    pub fn without_env(mut self) -> Self {
        self.ignore_env = true;
        self
    }

    /// Load configuration starting from the given directory
    ///
    /// Walks up the directory tree to find kiln.toml. Without one, defaults
    /// are used and relative paths resolve against `start_dir`.
    pub fn load_from_directory(&self, start_dir: &Path) -> ConfigResult<Config> {
        let mut current = start_dir.to_path_buf();

        loop {
            let candidate = current.join(CONFIG_FILE_NAME);
            if candidate.exists() {
                return self.load_from_file(&candidate);
            }

            match current.parent() {
                Some(parent) => current = parent.to_path_buf(),
                None => break,
            }
        }

        let config = Config {
            toolchain: ToolchainConfig::default(),
            base_dir: start_dir.to_path_buf(),
            config_file: None,
        };
        Ok(self.apply_env_overrides(config))
    }

    /// Load configuration from a specific kiln.toml
    pub fn load_from_file(&self, config_path: &Path) -> ConfigResult<Config> {
        let toolchain = ToolchainConfig::load_from_file(config_path)?;
        let base_dir = config_path
            .parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));

        let config = Config {
            toolchain,
            base_dir,
            config_file: Some(config_path.to_path_buf()),
        };
        Ok(self.apply_env_overrides(config))
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&self, mut config: Config) -> Config {
        if self.ignore_env {
            return config;
        }

        if let Some(dist_dir) = non_empty_var(DIST_DIR_VAR) {
            config.toolchain.paths.dist_dir = Some(PathBuf::from(dist_dir));
        }

        if let Some(out_dir) = non_empty_var(OUT_DIR_VAR) {
            config.toolchain.paths.out_dir = Some(PathBuf::from(out_dir));
        }

        config
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.is_empty())
}

impl Config {
    /// Resolve a configured path against the base directory
    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }

    /// Root of the source checkout
    pub fn source_root(&self) -> PathBuf {
        match &self.toolchain.paths.source_root {
            Some(root) => self.resolve(root),
            None => self.base_dir.clone(),
        }
    }

    /// Output root for build and install trees
    pub fn out_dir(&self) -> PathBuf {
        match &self.toolchain.paths.out_dir {
            Some(out) => self.resolve(out),
            None => self.source_root().join("out"),
        }
    }

    /// Package destination
    pub fn dist_dir(&self) -> PathBuf {
        match &self.toolchain.paths.dist_dir {
            Some(dist) => self.resolve(dist),
            None => self.out_dir(),
        }
    }

    /// Derive the fixed path layout for the given build host
    pub fn layout(&self, host: HostOs) -> Layout {
        Layout::new(
            self.source_root(),
            self.out_dir(),
            self.toolchain.prebuilts.clone(),
            host,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::fs;
    use tempfile::TempDir;

    fn create_config_file(dir: &Path, content: &str) -> PathBuf {
        let config_path = dir.join(CONFIG_FILE_NAME);
        fs::write(&config_path, content).unwrap();
        config_path
    }

    #[test]
    fn test_no_config_file_uses_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config = ConfigLoader::new()
            .without_env()
            .load_from_directory(temp_dir.path())
            .unwrap();

        assert!(config.config_file.is_none());
        assert_eq!(config.source_root(), temp_dir.path());
        assert_eq!(config.out_dir(), temp_dir.path().join("out"));
        assert_eq!(config.dist_dir(), temp_dir.path().join("out"));
    }

    #[test]
    fn test_find_config_in_parent() {
        let temp_dir = TempDir::new().unwrap();
        create_config_file(temp_dir.path(), "[paths]\nout_dir = \"build-out\"\n");

        let sub_dir = temp_dir.path().join("toolchain").join("llvm");
        fs::create_dir_all(&sub_dir).unwrap();

        let config = ConfigLoader::new()
            .without_env()
            .load_from_directory(&sub_dir)
            .unwrap();

        assert_eq!(config.base_dir, temp_dir.path());
        assert_eq!(config.out_dir(), temp_dir.path().join("build-out"));
    }

    #[test]
    fn test_absolute_paths_kept() {
        let temp_dir = TempDir::new().unwrap();
        let dist = temp_dir.path().join("dist");
        let path = create_config_file(
            temp_dir.path(),
            &format!("[paths]\ndist_dir = \"{}\"\n", dist.display()),
        );

        let config = ConfigLoader::new().without_env().load_from_file(&path).unwrap();
        assert_eq!(config.dist_dir(), dist);
    }

    #[test]
    #[serial]
    fn test_env_override_dist_dir() {
        let temp_dir = TempDir::new().unwrap();
        create_config_file(temp_dir.path(), "[paths]\ndist_dir = \"from-file\"\n");

        env::set_var(DIST_DIR_VAR, "/tmp/kiln-dist");
        let config = ConfigLoader::new()
            .load_from_directory(temp_dir.path())
            .unwrap();
        env::remove_var(DIST_DIR_VAR);

        assert_eq!(config.dist_dir(), PathBuf::from("/tmp/kiln-dist"));
    }

    #[test]
    #[serial]
    fn test_env_override_out_dir() {
        let temp_dir = TempDir::new().unwrap();

        env::set_var(OUT_DIR_VAR, "/tmp/kiln-out");
        let config = ConfigLoader::new()
            .load_from_directory(temp_dir.path())
            .unwrap();
        env::remove_var(OUT_DIR_VAR);

        assert_eq!(config.out_dir(), PathBuf::from("/tmp/kiln-out"));
        // dist follows out when unset
        assert_eq!(config.dist_dir(), PathBuf::from("/tmp/kiln-out"));
    }

    #[test]
    #[serial]
    fn test_empty_env_value_ignored() {
        let temp_dir = TempDir::new().unwrap();

        env::set_var(DIST_DIR_VAR, "");
        let config = ConfigLoader::new()
            .load_from_directory(temp_dir.path())
            .unwrap();
        env::remove_var(DIST_DIR_VAR);

        assert_eq!(config.dist_dir(), temp_dir.path().join("out"));
    }
}
