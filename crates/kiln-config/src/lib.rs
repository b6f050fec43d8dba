//! Kiln Configuration System
//!
//! Provides configuration management for toolchain builds including:
//! - Toolchain configuration (kiln.toml)
//! - Environment overrides (DIST_DIR, KILN_OUT_DIR)
//! - The fixed source-tree and prebuilt layout derived from both
//!
//! # Configuration Hierarchy
//!
//! Configuration is loaded and merged in the following order (later overrides earlier):
//! 1. Built-in defaults
//! 2. Toolchain config (./kiln.toml, searched upwards)
//! 3. Environment variables
//! 4. CLI flags
//!
//! # Example
//!
//! ```no_run
//! use kiln_config::{ConfigLoader, HostOs};
//! use std::path::Path;
//!
//! let config = ConfigLoader::new().load_from_directory(Path::new(".")).unwrap();
//! let layout = config.layout(HostOs::detect());
//! ```

pub mod layout;
pub mod loader;
pub mod toolchain;

use std::path::PathBuf;
use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid TOML syntax in {file}: {error}")]
    TomlParseError {
        file: PathBuf,
        error: toml::de::Error,
    },

    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Unsupported build host: {0}")]
    UnsupportedHost(String),
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

// Re-export main types
pub use layout::{HostOs, Layout};
pub use loader::{Config, ConfigLoader, CONFIG_FILE_NAME};
pub use toolchain::{PathsConfig, PrebuiltsConfig, ReleaseConfig, Stage2Config, ToolchainConfig};
