use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use kiln_build::{BaseEnvironment, CmakeEngine, ProcessRunner, ProfileRequest, StageOptions};
use kiln_cli::{Pipeline, PipelineOptions};
use kiln_config::{ConfigLoader, HostOs};
use kiln_package::Packager;
use log::LevelFilter;
use std::path::PathBuf;
use std::process::ExitCode;

/// Bootstrap, cross-build and package the Android clang toolchain.
///
/// Builds a stage-1 compiler with the prebuilt clang, rebuilds clang with
/// itself (optionally instrumented or profile-guided), cross-builds the
/// Android runtimes and Windows hosted compilers, and packages each host's
/// toolchain as a reproducible .tar.bz2.
///
/// EXAMPLES:
///     kiln                               Full build and package
///     kiln --build-name r1234 -j 16      Release build with 16 workers
///     kiln --skip-build --no-strip       Re-package the last build
///     kiln --check-pgo-profile           Fail without a PGO profile
///
/// ENVIRONMENT VARIABLES:
///     DIST_DIR        Package destination (defaults to the out dir)
///     KILN_OUT_DIR    Output root for build and install trees
///     KILN_JSON       Set to print the run report as JSON
///     RUST_LOG        Overrides the -v log level
#[derive(Parser)]
#[command(name = "kiln")]
#[command(version)]
struct Cli {
    /// Increase log verbosity (info by default, debug with -v)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    /// Release name for the package
    #[arg(long, default_value = "dev")]
    build_name: String,

    /// Use lld for linking (only affects stage 2)
    #[arg(long)]
    use_lld: bool,

    /// Enable assertions (only affects stage 2)
    #[arg(long)]
    enable_assertions: bool,

    /// Build debuggable clang and LLVM tools (only affects stage 2)
    #[arg(long)]
    debug: bool,

    /// Build LLVM tools with PGO instrumentation (Linux hosts only)
    #[arg(long)]
    build_instrumented: bool,

    /// Skip the build and only package
    #[arg(long, visible_alias = "sb", conflicts_with = "skip_package")]
    skip_build: bool,

    /// Skip packaging and only build
    #[arg(long, visible_alias = "sp")]
    skip_package: bool,

    /// Don't strip binaries
    #[arg(long)]
    no_strip: bool,

    /// Don't cross-build the Windows toolchains
    #[arg(long)]
    no_build_windows: bool,

    /// Fail if the expected PGO profile doesn't exist
    #[arg(long, conflicts_with = "pgo_profile")]
    check_pgo_profile: bool,

    /// Use this PGO profile instead of looking one up
    #[arg(long, value_name = "PATH")]
    pgo_profile: Option<PathBuf>,

    /// Worker count for the per-architecture runtime builds (defaults to the
    /// core count). Installs into the shared resource tree always run in order.
    #[arg(long, short = 'j')]
    jobs: Option<usize>,

    /// Path to kiln.toml (searched upward from the working directory otherwise)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Package destination
    #[arg(long, env = "DIST_DIR", value_name = "DIR")]
    dist_dir: Option<PathBuf>,

    /// Print the run report as JSON
    #[arg(long, env = "KILN_JSON")]
    json: bool,
}

impl Cli {
    fn profile_request(&self) -> ProfileRequest {
        match (&self.pgo_profile, self.check_pgo_profile) {
            (Some(path), _) => ProfileRequest::Explicit(path.clone()),
            (None, true) => ProfileRequest::Required,
            (None, false) => ProfileRequest::Auto,
        }
    }

    fn stage_options(&self) -> StageOptions {
        StageOptions {
            build_name: self.build_name.clone(),
            use_lld: self.use_lld,
            enable_assertions: self.enable_assertions,
            debug: self.debug,
            instrumented: self.build_instrumented,
            profile: self.profile_request(),
        }
    }
}

fn init_logging(verbose: u8) {
    let levels = [LevelFilter::Info, LevelFilter::Debug];
    let level = levels[usize::from(verbose).min(levels.len() - 1)];
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .format_timestamp(None)
        .init();
}

fn run(cli: Cli) -> Result<()> {
    let env = BaseEnvironment::snapshot();
    let loader = ConfigLoader::new();
    let config = match &cli.config {
        Some(path) => loader.load_from_file(path),
        None => {
            let cwd = std::env::current_dir().context("Failed to get current directory")?;
            loader.load_from_directory(&cwd)
        }
    }
    .context("Failed to load kiln configuration")?;

    if let Some(path) = &config.config_file {
        log::debug!("Using configuration from {}", path.display());
    }

    let host = HostOs::detect();
    let layout = config.layout(host);
    let toolchain = &config.toolchain;

    let jobs = cli.jobs.unwrap_or_else(|| {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    });

    let mut options = PipelineOptions::new(cli.dist_dir.clone().unwrap_or_else(|| config.dist_dir()));
    options.stage = cli.stage_options();
    options.build = !cli.skip_build;
    options.package = !cli.skip_package;
    options.strip = !cli.no_strip;
    options.build_windows = !cli.no_build_windows;
    options.jobs = jobs;

    let engine = CmakeEngine::new(&layout);
    let strip_runner = ProcessRunner::new();
    let packager = Packager::new(&layout, &toolchain.release, &strip_runner);

    log::info!(
        "Building clang-{} on {} (out dir {})",
        options.stage.build_name,
        host,
        layout.out_dir().display()
    );
    let report = Pipeline::new(&layout, toolchain, &engine, &packager, env, options).run()?;

    if let Some(stage2) = &report.stage2 {
        log::info!("Built clang {} in {}", stage2.version, stage2.install_path.display());
    }
    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for archive in &report.packages {
            println!("{}", archive.display());
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {:?}", err);
            ExitCode::from(1)
        }
    }
}
