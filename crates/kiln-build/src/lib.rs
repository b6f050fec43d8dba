//! kiln build pipeline
//!
//! Provides the build half of the toolchain bootstrap:
//! - Per-architecture cross-compilation matrix
//! - External build engine contract (cmake + ninja)
//! - Two-stage compiler bootstrap with PGO modes
//! - Windows cross builds driven by the stage-2 compiler
//! - Runtime library fan-out over a bounded worker pool

pub mod cross;
pub mod engine;
pub mod environment;
pub mod error;
pub mod mapfile;
pub mod matrix;
pub mod process;
pub mod runtimes;
pub mod stage;
pub mod variables;
pub mod version;

// Re-export main types
pub use cross::{native_toolchain_fragment, CrossHost};
pub use engine::{clear_cmake_cache, BuildEngine, BuildInvocation, CmakeEngine};
pub use environment::BaseEnvironment;
pub use error::{BuildError, BuildResult};
pub use matrix::{Architecture, ArchitectureConfig, HostCompiler, MatrixGenerator, PlatformMode};
pub use process::{ProcessRunner, ToolCommand, ToolOutput, ToolRunner};
pub use runtimes::{
    InstalledRuntime, RuntimeBuilder, RuntimeKind, RuntimeReport, RuntimeTask, DISABLED_RUNTIMES,
};
pub use stage::{ProfileRequest, StageOptions, StageOrchestrator, StageResult, StageState};
pub use variables::{base_variables, join_flags, BuildVariables};
pub use version::CompilerVersion;
