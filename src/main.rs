//! # mb CLI Entry Point
//!
//! Parses arguments with clap, merges them with `mb.toml` into build options and
//! routes to the build, test, clean and list handlers. Every failure ends in the
//! single handler in `main`, which picks the exit code.

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use colored::*;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use modbuild::build::{self, BuildSystem};
use modbuild::config::{BuildOptions, Profile};
use modbuild::error::BuildError;
use modbuild::ui;

#[derive(Parser)]
#[command(name = "mb")]
#[command(about = "Incremental, dependency-aware builds for C++ modules", version = env!("CARGO_PKG_VERSION"))]
#[command(long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Args, Debug, Default)]
struct GlobalArgs {
    /// Build the release configuration, with optimizations
    #[arg(long, global = true)]
    release: bool,
    /// Project root [default: current directory]
    #[arg(long, global = true, value_name = "DIR")]
    path: Option<PathBuf>,
    /// Also scan examples/ directories
    #[arg(long, global = true)]
    include_examples: bool,
    /// Extra include directory (repeatable)
    #[arg(short = 'I', long = "include", global = true, value_name = "DIR")]
    include: Vec<PathBuf>,
    /// Extra compiler flags, split on whitespace
    #[arg(long, global = true, allow_hyphen_values = true, value_name = "FLAGS")]
    compile_flags: Option<String>,
    /// Extra linker flags, split on whitespace
    #[arg(long, global = true, allow_hyphen_values = true, value_name = "FLAGS")]
    link_flags: Option<String>,
    /// Link the C++ runtime statically
    #[arg(long = "static", global = true)]
    static_link: bool,
    /// Standard library module source (std.cppm) for `import std;`
    #[arg(long, global = true, value_name = "FILE")]
    std_module: Option<PathBuf>,
    /// Compile test units in release builds too
    #[arg(long, global = true)]
    build_tests: bool,
    /// Show commands and debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile and link the project (default)
    Build,
    /// Build with tests and run the test runner
    Test {
        /// Filter passed to the test runner
        filter: Option<String>,
        /// Arguments after `--` are passed to the test runner
        #[arg(last = true)]
        args: Vec<String>,
    },
    /// Clean, then build and run the tests
    Ci {
        /// Filter passed to the test runner
        filter: Option<String>,
        /// Arguments after `--` are passed to the test runner
        #[arg(last = true)]
        args: Vec<String>,
    },
    /// Remove the build directory of the selected configuration
    Clean,
    /// Show units, modules and dependency levels without building
    List,
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_env("MB_LOG").unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn build_options(global: &GlobalArgs, with_tests: bool) -> Result<BuildOptions, BuildError> {
    let root = global.path.clone().unwrap_or_else(|| PathBuf::from("."));
    let root = root
        .canonicalize()
        .map_err(|e| BuildError::Config(format!("project root {}: {}", root.display(), e)))?;
    let profile = if global.release {
        Profile::Release
    } else {
        Profile::Debug
    };

    let mut options = BuildOptions::new(root, profile);
    if let Some(config) = build::load_config(&options.project_root)
        .map_err(|e| BuildError::Config(format!("{e:#}")))?
    {
        options.apply_config(&config);
    }

    options.include_tests |= global.build_tests || with_tests;
    options.include_examples = global.include_examples;
    options.include_dirs.extend(global.include.iter().cloned());
    if let Some(flags) = &global.compile_flags {
        options.extra_compile_flags.extend(build::split_flags(flags));
    }
    if let Some(flags) = &global.link_flags {
        options.extra_link_flags.extend(build::split_flags(flags));
    }
    options.static_link |= global.static_link;
    if let Some(std_module) = &global.std_module {
        options.std_module = Some(std_module.clone());
    }
    options.verbose = global.verbose;
    Ok(options)
}

fn list(system: &BuildSystem) -> Result<()> {
    let plan = system.plan()?;
    ui::unit_table(&plan.units).print();

    let units = &plan.units;
    let modules = units.iter().filter(|u| u.is_modular).count();
    let entry_points = units.iter().filter(|u| u.has_main).count();
    let tests = units.iter().filter(|u| u.is_test).count();
    let levels = units
        .iter()
        .filter_map(|u| u.level())
        .max()
        .map_or(0, |max| max + 1);
    println!(
        "\n{} units, {} modules, {} entry points, {} tests, {} levels",
        units.len().to_string().bold(),
        modules.to_string().bold(),
        entry_points.to_string().bold(),
        tests.to_string().bold(),
        levels.to_string().bold()
    );
    Ok(())
}

fn run(cli: Cli) -> Result<()> {
    let command = cli.command.unwrap_or(Commands::Build);
    let with_tests = matches!(command, Commands::Test { .. } | Commands::Ci { .. });
    let system = BuildSystem::new(build_options(&cli.global, with_tests)?);

    match command {
        Commands::Build => {
            system.build()?;
            Ok(())
        }
        Commands::Test { filter, args } => {
            build::run_tests(&system, filter.as_deref(), &args)?;
            Ok(())
        }
        Commands::Ci { filter, args } => {
            build::clean(system.layout())?;
            build::run_tests(&system, filter.as_deref(), &args)?;
            Ok(())
        }
        Commands::Clean => {
            build::clean(system.layout())?;
            Ok(())
        }
        Commands::List => list(&system),
    }
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.global.verbose);

    if let Err(e) = run(cli) {
        eprintln!("{} {:#}", "error:".red().bold(), e);
        let code = e
            .downcast_ref::<BuildError>()
            .map_or(1, BuildError::exit_code);
        std::process::exit(code);
    }
}
