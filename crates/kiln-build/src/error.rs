/// Build pipeline error types
use std::path::PathBuf;
use thiserror::Error;

pub type BuildResult<T> = Result<T, BuildError>;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Unrecognized architecture '{0}'")]
    UnknownArchitecture(String),

    #[error("PGO profile does not exist for {version}: expected {}", expected.display())]
    MissingProfile { version: String, expected: PathBuf },

    #[error("External build step '{step}' failed ({status}): {command}\n{output}")]
    ExternalBuild {
        step: String,
        command: String,
        status: String,
        output: String,
    },

    #[error("Failed to read compiler version from {path}: {reason}")]
    VersionFile { path: PathBuf, reason: String },

    #[error("Invalid stage transition: {0}")]
    StageOrder(String),

    #[error("Expected build artifact is missing: {}", path.display())]
    MissingArtifact { path: PathBuf },

    #[error("Cannot read build artifact {}: {reason}", path.display())]
    InvalidArtifact { path: PathBuf, reason: String },

    #[error("Worker pool error: {0}")]
    WorkerPool(String),

    #[error("I/O error at {path}: {error}")]
    IoError {
        path: PathBuf,
        error: std::io::Error,
    },
}

impl BuildError {
    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Create an I/O error with path context
    pub fn io(path: impl Into<PathBuf>, error: std::io::Error) -> Self {
        Self::IoError {
            path: path.into(),
            error,
        }
    }

    /// Create a version file error
    pub fn version_file(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::VersionFile {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Create an external build failure
    pub fn external(
        step: impl Into<String>,
        command: impl Into<String>,
        status: impl ToString,
        output: impl Into<String>,
    ) -> Self {
        Self::ExternalBuild {
            step: step.into(),
            command: command.into(),
            status: status.to_string(),
            output: output.into(),
        }
    }

    /// Whether this error was raised before any external tool ran
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_) | Self::UnknownArchitecture(_))
    }
}
