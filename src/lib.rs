//! # modbuild - Incremental builds for C++ modules
//!
//! modbuild (binary `mb`) builds projects made of C++20/23 module units without a
//! hand-written build description. It reads the preamble of every source file to
//! find module declarations and imports, orders the units by dependency and only
//! recompiles or relinks what actually changed.
//!
//! ## Features
//!
//! - **Zero Configuration**: `mb.toml` is optional; the source tree is the build description
//! - **Module Aware**: interfaces, partitions, implementation units and `import std;`
//! - **Parallel Builds**: every dependency level compiles concurrently
//! - **Incremental**: source timestamps for objects, link signatures for executables
//! - **Tests**: test units are linked into one aggregate runner
//!
//! ## Quick Start
//!
//! ```bash
//! mb build            # debug build, tests compiled
//! mb test -- --quiet  # build and run the test runner
//! mb list             # show units, modules and levels
//! ```
//!
//! ## Module Organization
//!
//! - [`scan`] - Source discovery and unit classification
//! - [`graph`] - Dependency graph and topological levels
//! - [`build`] - Artifact layout, caches, scheduling, linking
//! - [`config`] - Configuration parsing (`mb.toml`) and build options
//! - [`error`] - Error kinds and exit codes

/// Artifact layout, caches, compile scheduling and linking.
pub mod build;

/// Configuration file parsing (`mb.toml`).
pub mod config;

/// Fatal build errors and their exit codes.
pub mod error;

/// Dependency graph construction and leveling.
pub mod graph;

/// Source tree scanning.
pub mod scan;

/// Terminal UI utilities (tables, colors).
pub mod ui;

pub use error::{BuildError, BuildResult};
