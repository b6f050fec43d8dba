//! kiln packaging
//!
//! Turns an installed toolchain into a release archive: binary allow-list
//! filtering and stripping, static library pruning, SONAME normalization,
//! license and version stamping, and a reproducible `.tar.bz2`.

pub mod archive;
pub mod filter;
pub mod host;
pub mod normalize;
pub mod packager;
pub mod stamp;
pub mod tree;
pub mod wrappers;

pub use archive::{archive_file_name, create_archive};
pub use filter::{filter_binaries, remove_static_libraries, FilterReport};
pub use host::HostTarget;
pub use normalize::{normalize_host_libs, soname_rules, SonameRule};
pub use packager::{PackageOutcome, PackageRequest, Packager};
pub use wrappers::install_wrappers;

use std::path::PathBuf;

/// Packaging errors
#[derive(Debug, thiserror::Error)]
pub enum PackageError {
    #[error("Library layout violated at {}: {reason}", path.display())]
    LibraryLayout { path: PathBuf, reason: String },

    #[error("Packaging failed at {}: {reason}", path.display())]
    Packaging { path: PathBuf, reason: String },

    #[error(transparent)]
    Build(#[from] kiln_build::BuildError),
}

impl PackageError {
    pub fn layout(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::LibraryLayout {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn packaging(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::Packaging {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

pub type PackageResult<T> = Result<T, PackageError>;
