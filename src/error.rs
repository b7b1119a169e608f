//! Error kinds for the build pipeline.
//!
//! Scan-level problems are recovered inside the scanner (the file is skipped) and
//! cache problems never leave the cache module. Everything that reaches this enum is
//! fatal and ends up in the single handler in `main`, which maps it to an exit code.

use std::path::PathBuf;

/// Fatal build failures.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    /// The configuration file or command line could not be turned into build options.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The scan found nothing to build.
    #[error("no sources found under {}", root.display())]
    NoSources { root: PathBuf },

    /// Two units claim the same identifier.
    #[error("duplicate unit '{unit}' defined by {} and {}", first.display(), second.display())]
    DuplicateUnit {
        unit: String,
        first: PathBuf,
        second: PathBuf,
    },

    /// Two units would write the same artifact.
    #[error("units {} and {} both produce {}", first.display(), second.display(), artifact.display())]
    ArtifactConflict {
        artifact: PathBuf,
        first: PathBuf,
        second: PathBuf,
    },

    /// The import graph has a cycle. Lists every unit that could not be leveled.
    #[error("cyclic dependency detected between units: {}", units.join(" "))]
    Cycle { units: Vec<String> },

    /// A compiler or linker invocation exited non-zero.
    #[error("command failed ({status}): {command}")]
    Command { command: String, status: String },

    /// A compiler or linker could not be started at all.
    #[error("failed to execute '{program}': {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    /// Filesystem failure outside the caches (directory creation, cleaning).
    #[error("I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// `test` was requested but no test objects were found to link a runner from.
    #[error("no tests found; nothing to run")]
    NoTests,

    /// The test runner ran and reported failures.
    #[error("tests failed (exit code {code})")]
    TestsFailed { code: i32 },

    /// Internal consistency violation; indicates a bug upstream.
    #[error("internal error: {0}")]
    Internal(String),
}

impl BuildError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Process exit code for this failure. Never zero.
    pub fn exit_code(&self) -> i32 {
        match self {
            BuildError::NoSources { .. } | BuildError::NoTests | BuildError::Io { .. } => 1,
            BuildError::Config(_) => 2,
            BuildError::DuplicateUnit { .. }
            | BuildError::ArtifactConflict { .. }
            | BuildError::Cycle { .. } => 3,
            BuildError::Command { .. } | BuildError::Spawn { .. } => 4,
            BuildError::TestsFailed { code } => (*code).max(1),
            BuildError::Internal(_) => 70,
        }
    }
}

pub type BuildResult<T> = Result<T, BuildError>;
