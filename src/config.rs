//! Build configuration.
//!
//! `mb.toml` at the project root is optional. When present it is merged into
//! [`BuildOptions`], and command-line options are applied on top.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::scan::ScanOptions;

pub const CONFIG_FILE: &str = "mb.toml";

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(deny_unknown_fields)]
pub struct MbConfig {
    #[serde(default)]
    pub package: PackageConfig,
    pub build: Option<BuildConfig>,
    /// Imported module name -> extra linker arguments.
    #[serde(default)]
    pub module_ldflags: BTreeMap<String, Vec<String>>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct PackageConfig {
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_edition")]
    pub edition: String,
}

impl Default for PackageConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            edition: default_edition(),
        }
    }
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(deny_unknown_fields)]
pub struct BuildConfig {
    pub compiler: Option<String>,
    pub flags: Option<Vec<String>>,
    pub link_flags: Option<Vec<String>>,
    pub include: Option<Vec<String>>,
    pub std_module: Option<String>,
    #[serde(default)]
    pub static_link: bool,
    pub exclude: Option<Vec<String>>,
    pub test_framework_dir: Option<String>,
}

fn default_edition() -> String {
    "c++23".to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Profile {
    #[default]
    Debug,
    Release,
}

impl Profile {
    pub fn name(self) -> &'static str {
        match self {
            Profile::Debug => "debug",
            Profile::Release => "release",
        }
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Everything a build needs to know, after merging file and command line.
#[derive(Debug, Clone)]
pub struct BuildOptions {
    pub project_root: PathBuf,
    pub profile: Profile,
    pub include_tests: bool,
    pub include_examples: bool,
    pub compiler: String,
    pub edition: String,
    pub include_dirs: Vec<PathBuf>,
    pub extra_compile_flags: Vec<String>,
    pub extra_link_flags: Vec<String>,
    pub module_ldflags: BTreeMap<String, Vec<String>>,
    /// Source of the standard library module (`std.cppm`).
    pub std_module: Option<PathBuf>,
    pub static_link: bool,
    pub exclude: Vec<String>,
    pub test_framework_dir: String,
    pub verbose: bool,
}

impl BuildOptions {
    /// Defaults for `profile`: tests are part of debug builds only.
    pub fn new(project_root: impl Into<PathBuf>, profile: Profile) -> Self {
        Self {
            project_root: project_root.into(),
            profile,
            include_tests: profile == Profile::Debug,
            include_examples: false,
            compiler: std::env::var("CXX").unwrap_or_else(|_| "clang++".to_string()),
            edition: default_edition(),
            include_dirs: Vec::new(),
            extra_compile_flags: Vec::new(),
            extra_link_flags: Vec::new(),
            module_ldflags: BTreeMap::new(),
            std_module: std::env::var_os("LLVM_PATH")
                .filter(|v| !v.is_empty())
                .map(PathBuf::from),
            static_link: false,
            exclude: Vec::new(),
            test_framework_dir: "tester".to_string(),
            verbose: false,
        }
    }

    /// Merges values from `mb.toml`. Relative paths are taken from the project root.
    pub fn apply_config(&mut self, config: &MbConfig) {
        self.edition = config.package.edition.clone();
        self.module_ldflags.extend(
            config
                .module_ldflags
                .iter()
                .map(|(module, flags)| (module.clone(), flags.clone())),
        );

        let Some(build) = &config.build else {
            return;
        };
        if let Some(compiler) = &build.compiler {
            self.compiler = compiler.clone();
        }
        if let Some(flags) = &build.flags {
            self.extra_compile_flags.extend(flags.iter().cloned());
        }
        if let Some(flags) = &build.link_flags {
            self.extra_link_flags.extend(flags.iter().cloned());
        }
        if let Some(include) = &build.include {
            let root = self.project_root.clone();
            self.include_dirs
                .extend(include.iter().map(|dir| resolve_from(&root, dir)));
        }
        if let Some(std_module) = &build.std_module {
            self.std_module = Some(resolve_from(&self.project_root, std_module));
        }
        self.static_link |= build.static_link;
        if let Some(exclude) = &build.exclude {
            self.exclude.extend(exclude.iter().cloned());
        }
        if let Some(dir) = &build.test_framework_dir {
            self.test_framework_dir = dir.clone();
        }
    }

    pub fn scan_options(&self) -> ScanOptions {
        ScanOptions {
            include_tests: self.include_tests,
            include_examples: self.include_examples,
            exclude: self.exclude.clone(),
            test_framework_dir: self.test_framework_dir.clone(),
        }
    }
}

fn resolve_from(root: &Path, value: &str) -> PathBuf {
    let path = Path::new(value);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}
