//! On-disk layout of a build.
//!
//! Everything here is a pure function of the project root, the configuration name
//! and the unit identity. Each configuration gets its own build root, so debug and
//! release artifacts never overwrite each other.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{BuildError, BuildResult};
use crate::scan::{TranslationUnit, UnitKind};

/// Output paths of one translation unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub object: PathBuf,
    /// Module interface artifact (`.pcm`); only for interfaces and partitions.
    pub interface: Option<PathBuf>,
    /// Only for units with an entry point.
    pub executable: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactLayout {
    root: PathBuf,
}

pub fn os_name() -> &'static str {
    match std::env::consts::OS {
        "macos" => "darwin",
        other => other,
    }
}

/// Module names may contain characters that are awkward in file names.
pub fn module_safe_name(module: &str) -> String {
    module.replace([':', '-', '.'], "_")
}

fn object_suffix(suffix: &str) -> BuildResult<String> {
    const ENDINGS: [&str; 4] = [".c++m", ".cppm", ".c++", ".cpp"];
    ENDINGS
        .iter()
        .find_map(|ending| suffix.strip_suffix(ending))
        .map(|qualifier| format!("{qualifier}.o"))
        .ok_or_else(|| BuildError::Internal(format!("unsupported suffix for object file: {suffix}")))
}

impl ArtifactLayout {
    pub fn new(project_root: &Path, config_name: &str) -> Self {
        Self {
            root: project_root.join(format!("build-{}-{}", os_name(), config_name)),
        }
    }

    pub fn build_root(&self) -> &Path {
        &self.root
    }

    pub fn module_dir(&self) -> PathBuf {
        self.root.join("pcm")
    }

    pub fn object_dir(&self) -> PathBuf {
        self.root.join("obj")
    }

    pub fn binary_dir(&self) -> PathBuf {
        self.root.join("bin")
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.root.join("cache")
    }

    pub fn object_cache_path(&self) -> PathBuf {
        self.cache_dir().join("object-cache.txt")
    }

    pub fn executable_cache_path(&self) -> PathBuf {
        self.cache_dir().join("executable-cache.txt")
    }

    pub fn std_pcm_path(&self) -> PathBuf {
        self.module_dir().join("std.pcm")
    }

    pub fn std_object_path(&self) -> PathBuf {
        self.object_dir().join("std.o")
    }

    /// Executable used when the project has no hand-written test runner.
    pub fn default_test_runner_path(&self) -> PathBuf {
        self.binary_dir().join("test_runner")
    }

    /// Creates every output directory. Runs once, before any worker starts.
    pub fn create_dirs(&self) -> BuildResult<()> {
        for dir in [
            self.module_dir(),
            self.object_dir(),
            self.binary_dir(),
            self.cache_dir(),
        ] {
            fs::create_dir_all(&dir).map_err(|e| BuildError::io(&dir, e))?;
        }
        Ok(())
    }

    pub fn interface_path(&self, module: &str) -> BuildResult<PathBuf> {
        if module.is_empty() {
            return Err(BuildError::Internal(
                "interface path requested for a unit without module".into(),
            ));
        }
        Ok(self
            .module_dir()
            .join(format!("{}.pcm", module_safe_name(module))))
    }

    pub fn resolve(&self, unit: &TranslationUnit) -> BuildResult<ArtifactPaths> {
        let stem = if unit.is_modular {
            module_safe_name(&unit.module)
        } else {
            unit.base_name.clone()
        };
        let object = self
            .object_dir()
            .join(format!("{}{}", stem, object_suffix(unit.suffix)?));
        let interface = if unit.is_modular {
            Some(self.interface_path(&unit.module)?)
        } else {
            None
        };
        let executable = unit
            .has_main
            .then(|| self.binary_dir().join(&unit.base_name));

        Ok(ArtifactPaths {
            object,
            interface,
            executable,
        })
    }

    /// Attaches paths to every unit, then checks each has what its kind requires
    /// and that no two units write the same artifact.
    pub fn resolve_all(&self, units: &mut [TranslationUnit]) -> BuildResult<()> {
        for unit in units.iter_mut() {
            let paths = self.resolve(unit)?;
            unit.attach_paths(paths)?;
        }
        units.iter().try_for_each(validate_unit)?;
        check_conflicts(units)
    }
}

/// `foo.c++m` and `foo.c++` would otherwise share `obj/foo.o`.
fn check_conflicts(units: &[TranslationUnit]) -> BuildResult<()> {
    let mut owners: HashMap<&Path, &TranslationUnit> = HashMap::new();
    for unit in units {
        let Some(paths) = unit.paths() else {
            continue;
        };
        let artifacts = std::iter::once(paths.object.as_path())
            .chain(paths.interface.as_deref())
            .chain(paths.executable.as_deref());
        for artifact in artifacts {
            if let Some(previous) = owners.insert(artifact, unit) {
                return Err(BuildError::ArtifactConflict {
                    artifact: artifact.to_path_buf(),
                    first: previous.full_path.clone(),
                    second: unit.full_path.clone(),
                });
            }
        }
    }
    Ok(())
}

pub fn validate_unit(unit: &TranslationUnit) -> BuildResult<()> {
    let fail = |what: &str| {
        Err(BuildError::Internal(format!(
            "{what}: {}",
            unit.relative_path()
        )))
    };
    let Some(paths) = unit.paths() else {
        return fail("translation unit missing object path");
    };
    if paths.object.as_os_str().is_empty() {
        return fail("translation unit missing object path");
    }
    if unit.is_modular {
        if unit.module.is_empty() {
            return fail("modular unit missing module name");
        }
        if paths.interface.is_none() {
            return fail("modular unit missing interface artifact path");
        }
    }
    if unit.kind == UnitKind::Implementation && unit.module.is_empty() {
        return fail("implementation unit missing module name");
    }
    if unit.has_main && paths.executable.is_none() {
        return fail("entry point unit missing executable path");
    }
    Ok(())
}
