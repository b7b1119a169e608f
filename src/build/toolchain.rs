//! Compiler invocations.
//!
//! Every compile and link step is an [`Invocation`]: a program and an argument
//! vector, never a shell string. Invocations run through the [`CommandRunner`] seam so
//! the scheduler can be driven by a fake in tests.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};

use tracing::warn;

use super::layout::ArtifactLayout;
use super::utils::std_flag;
use crate::config::{BuildOptions, Profile};
use crate::error::{BuildError, BuildResult};
use crate::scan::{TranslationUnit, UnitKind};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
}

impl Invocation {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn path(self, path: &Path) -> Self {
        self.arg(path.to_string_lossy())
    }

    /// The argument following `-o`, if any.
    pub fn output(&self) -> Option<&Path> {
        self.args
            .iter()
            .position(|arg| arg == "-o")
            .and_then(|i| self.args.get(i + 1))
            .map(Path::new)
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Result of a captured run.
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub success: bool,
    /// Human-readable exit status, e.g. `exit status: 1`.
    pub status: String,
    pub stderr: String,
}

/// Executes invocations. Implementations are shared between worker threads.
pub trait CommandRunner: Send + Sync {
    /// Runs to completion, capturing stderr.
    fn run(&self, invocation: &Invocation) -> BuildResult<CommandOutput>;

    /// Runs with inherited stdio and returns the exit code.
    fn run_attached(&self, invocation: &Invocation) -> BuildResult<i32>;
}

/// Spawns real processes.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessRunner;

fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    1
}

impl CommandRunner for ProcessRunner {
    fn run(&self, invocation: &Invocation) -> BuildResult<CommandOutput> {
        let output = Command::new(&invocation.program)
            .args(&invocation.args)
            .output()
            .map_err(|source| BuildError::Spawn {
                program: invocation.program.clone(),
                source,
            })?;
        Ok(CommandOutput {
            success: output.status.success(),
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    fn run_attached(&self, invocation: &Invocation) -> BuildResult<i32> {
        let status = Command::new(&invocation.program)
            .args(&invocation.args)
            .status()
            .map_err(|source| BuildError::Spawn {
                program: invocation.program.clone(),
                source,
            })?;
        Ok(exit_code(status))
    }
}

/// Compiler and flag sets for one build.
#[derive(Debug, Clone)]
pub struct Toolchain {
    pub cxx: String,
    pub compile_flags: Vec<String>,
    /// Preprocessor flags (include directories); not needed when compiling from a pcm.
    pub cpp_flags: Vec<String>,
    pub link_flags: Vec<String>,
    pub module_flags: Vec<String>,
    module_ldflags: BTreeMap<String, Vec<String>>,
    runtime_object: Option<PathBuf>,
}

impl Toolchain {
    pub fn new(options: &BuildOptions, layout: &ArtifactLayout) -> Self {
        let mut compile_flags = vec![
            std_flag(&options.edition),
            "-pthread".to_string(),
            "-fPIC".to_string(),
            "-Wall".to_string(),
            "-Wextra".to_string(),
            "-Wno-reserved-module-identifier".to_string(),
        ];
        match options.profile {
            Profile::Debug => compile_flags.extend(["-O0".to_string(), "-g3".to_string()]),
            Profile::Release => compile_flags.extend(["-O3".to_string(), "-DNDEBUG".to_string()]),
        }
        compile_flags.extend(options.extra_compile_flags.iter().cloned());

        let cpp_flags = options
            .include_dirs
            .iter()
            .map(|dir| format!("-I{}", dir.display()))
            .collect();

        let mut link_flags = vec!["-pthread".to_string()];
        if options.static_link {
            if cfg!(target_os = "macos") {
                warn!("static linking is limited on macOS; the C++ runtime stays dynamic");
            } else {
                link_flags.push("-static-libstdc++".to_string());
            }
        }
        link_flags.extend(options.extra_link_flags.iter().cloned());

        let module_flags = vec![
            "-fno-implicit-modules".to_string(),
            "-fno-implicit-module-maps".to_string(),
            format!("-fprebuilt-module-path={}", layout.module_dir().display()),
        ];

        Self {
            cxx: options.compiler.clone(),
            compile_flags,
            cpp_flags,
            link_flags,
            module_flags,
            module_ldflags: options.module_ldflags.clone(),
            runtime_object: None,
        }
    }

    /// Makes `import std;` resolve to a prebuilt pcm and links its object everywhere.
    pub fn enable_std_module(&mut self, pcm: &Path, object: &Path) {
        self.module_flags
            .push(format!("-fmodule-file=std={}", pcm.display()));
        self.runtime_object = Some(object.to_path_buf());
    }

    pub fn runtime_object(&self) -> Option<&Path> {
        self.runtime_object.as_deref()
    }

    /// Maps every project module to its interface artifact, in topological order.
    pub fn register_modules(&mut self, units: &[TranslationUnit]) -> BuildResult<()> {
        for unit in units.iter().filter(|unit| unit.is_modular) {
            let Some(pcm) = &unit.artifacts()?.interface else {
                continue;
            };
            self.module_flags
                .push(format!("-fmodule-file={}={}", unit.module, pcm.display()));
        }
        Ok(())
    }

    /// Extra linker arguments configured for the given imports, in import order.
    pub fn import_ldflags<'a>(&self, imports: impl IntoIterator<Item = &'a String>) -> Vec<String> {
        imports
            .into_iter()
            .filter_map(|module| self.module_ldflags.get(module))
            .flatten()
            .cloned()
            .collect()
    }

    /// Commands that turn `unit` into its object: interface then object for modular
    /// units, a single compile otherwise.
    pub fn compile_steps(
        &self,
        unit: &TranslationUnit,
        layout: &ArtifactLayout,
    ) -> BuildResult<Vec<Invocation>> {
        let paths = unit.artifacts()?;
        if let Some(pcm) = paths.interface.as_deref().filter(|_| unit.is_modular) {
            let precompile = Invocation::new(&self.cxx)
                .args(&self.compile_flags)
                .args(&self.cpp_flags)
                .args(&self.module_flags)
                .path(&unit.full_path)
                .arg("--precompile")
                .arg("-o")
                .path(pcm);
            let object = Invocation::new(&self.cxx)
                .args(&self.compile_flags)
                .args(&self.module_flags)
                .path(pcm)
                .arg("-c")
                .arg("-o")
                .path(&paths.object);
            return Ok(vec![precompile, object]);
        }

        let mut compile = Invocation::new(&self.cxx)
            .args(&self.compile_flags)
            .args(&self.cpp_flags)
            .args(&self.module_flags);
        if unit.kind == UnitKind::Implementation {
            let owner = layout.interface_path(&unit.module)?;
            compile = compile.arg(format!("-fmodule-file={}={}", unit.module, owner.display()));
        }
        Ok(vec![
            compile
                .path(&unit.full_path)
                .arg("-c")
                .arg("-o")
                .path(&paths.object),
        ])
    }

    pub fn link(&self, objects: &[PathBuf], output: &Path, import_flags: &[String]) -> Invocation {
        let mut link = Invocation::new(&self.cxx)
            .args(&self.compile_flags)
            .args(import_flags)
            .args(&self.module_flags);
        for object in objects {
            link = link.path(object);
        }
        if let Some(runtime) = &self.runtime_object {
            link = link.path(runtime);
        }
        link.args(&self.link_flags).arg("-o").path(output)
    }

    pub fn precompile_std(&self, source: &Path, pcm: &Path) -> Invocation {
        Invocation::new(&self.cxx)
            .args(&self.compile_flags)
            .args(&self.cpp_flags)
            .args([
                "-Wno-unused-command-line-argument",
                "-fno-implicit-modules",
                "-fno-implicit-module-maps",
            ])
            .path(source)
            .arg("--precompile")
            .arg("-o")
            .path(pcm)
    }

    pub fn compile_std_object(&self, pcm: &Path, object: &Path) -> Invocation {
        Invocation::new(&self.cxx)
            .args(&self.compile_flags)
            .args(["-fno-implicit-modules", "-fno-implicit-module-maps"])
            .arg(format!("-fmodule-file=std={}", pcm.display()))
            .path(pcm)
            .arg("-c")
            .arg("-o")
            .path(object)
    }
}
