use std::fmt;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::build::layout::ArtifactPaths;
use crate::error::{BuildError, BuildResult};

/// Recognized source suffixes, longest match first.
pub const SUPPORTED_SUFFIXES: &[&str] = &[
    ".test.c++m",
    ".test.cppm",
    ".test.c++",
    ".test.cpp",
    ".impl.c++",
    ".impl.cpp",
    ".c++m",
    ".cppm",
    ".c++",
    ".cpp",
];

/// Module names of the standard library. Never produce graph edges.
pub const STD_MODULES: &[&str] = &["std", "std.compat"];

/// What a translation unit declares about modules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum UnitKind {
    /// No module declaration at all.
    #[default]
    NonModule,
    /// `export module name;`
    Interface,
    /// `export module name:part;`
    Partition,
    /// `module name;`
    Implementation,
    /// Only a bare `module;` preamble.
    GlobalFragment,
}

impl UnitKind {
    pub fn label(self) -> &'static str {
        match self {
            UnitKind::NonModule => "source",
            UnitKind::Interface => "interface",
            UnitKind::Partition => "partition",
            UnitKind::Implementation => "implementation",
            UnitKind::GlobalFragment => "fragment",
        }
    }

    pub fn is_modular(self) -> bool {
        matches!(self, UnitKind::Interface | UnitKind::Partition)
    }
}

impl fmt::Display for UnitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Module metadata extracted from a file's preamble.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ModuleHeader {
    pub module: String,
    pub imports: Vec<String>,
    pub kind: UnitKind,
    pub has_main: bool,
}

/// One source file together with its module metadata.
///
/// Identity fields are fixed by the scanner. The dependency level and the artifact
/// paths are attached exactly once, by the leveler and the path resolver.
#[derive(Debug, Clone)]
pub struct TranslationUnit {
    pub filename: String,
    /// Directory relative to the project root, empty for the root itself.
    pub dir: String,
    pub suffix: &'static str,
    pub base_name: String,
    pub full_path: PathBuf,
    /// Module name for interfaces and partitions, filename otherwise.
    pub id: String,
    pub module: String,
    pub imports: Vec<String>,
    pub kind: UnitKind,
    pub has_main: bool,
    pub is_test: bool,
    pub is_modular: bool,
    pub modified: SystemTime,
    level: Option<usize>,
    paths: Option<ArtifactPaths>,
}

pub fn match_supported_suffix(filename: &str) -> Option<&'static str> {
    SUPPORTED_SUFFIXES
        .iter()
        .copied()
        .find(|suffix| filename.ends_with(suffix))
}

pub fn is_supported(path: &Path) -> bool {
    path.file_name()
        .map(|name| match_supported_suffix(&name.to_string_lossy()).is_some())
        .unwrap_or(false)
}

fn is_test_unit(dir: &str, filename: &str, suffix: &str, framework_dir: &str) -> bool {
    if suffix.starts_with(".test.") {
        return true;
    }
    let combined = if dir.is_empty() {
        filename.to_string()
    } else {
        format!("{}/{}", dir.replace('\\', "/"), filename)
    };
    let framework_prefix = format!("{}/", framework_dir.trim_end_matches('/'));
    if !framework_dir.is_empty() && combined.starts_with(&framework_prefix) {
        return false;
    }
    combined.contains("test")
}

impl TranslationUnit {
    /// Builds a unit from a relative path and its scanned header.
    ///
    /// Fails when the filename carries no supported suffix or when the suffix is the
    /// whole filename.
    pub fn from_scan(
        relative: &Path,
        full_path: PathBuf,
        header: ModuleHeader,
        modified: SystemTime,
        test_framework_dir: &str,
    ) -> Result<Self, super::ScanError> {
        let filename = relative
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let suffix = match_supported_suffix(&filename)
            .ok_or_else(|| super::ScanError::UnsupportedSuffix(filename.clone()))?;
        let base_name = filename[..filename.len() - suffix.len()].to_string();
        if base_name.is_empty() {
            return Err(super::ScanError::UnsupportedSuffix(filename));
        }

        let dir = match relative.parent() {
            Some(parent) if parent != Path::new(".") => parent.to_string_lossy().into_owned(),
            _ => String::new(),
        };

        let ModuleHeader {
            module,
            imports,
            kind,
            has_main,
        } = header;

        let id = if kind.is_modular() {
            module.clone()
        } else {
            filename.clone()
        };
        let is_test = is_test_unit(&dir, &filename, suffix, test_framework_dir);

        Ok(Self {
            filename,
            dir,
            suffix,
            base_name,
            full_path,
            id,
            module,
            imports,
            kind,
            has_main,
            is_test,
            is_modular: kind.is_modular(),
            modified,
            level: None,
            paths: None,
        })
    }

    /// `dir/filename`, or just the filename at the project root.
    pub fn relative_path(&self) -> String {
        if self.dir.is_empty() {
            self.filename.clone()
        } else {
            format!("{}/{}", self.dir, self.filename)
        }
    }

    pub fn level(&self) -> Option<usize> {
        self.level
    }

    pub(crate) fn set_level(&mut self, level: usize) {
        self.level = Some(level);
    }

    pub fn paths(&self) -> Option<&ArtifactPaths> {
        self.paths.as_ref()
    }

    /// Resolved artifact paths. Errors if the resolver has not run.
    pub fn artifacts(&self) -> BuildResult<&ArtifactPaths> {
        self.paths.as_ref().ok_or_else(|| {
            BuildError::Internal(format!("unit {} has no resolved paths", self.filename))
        })
    }

    pub(crate) fn attach_paths(&mut self, paths: ArtifactPaths) -> BuildResult<()> {
        if self.paths.is_some() {
            return Err(BuildError::Internal(format!(
                "artifact paths of {} assigned twice",
                self.filename
            )));
        }
        self.paths = Some(paths);
        Ok(())
    }

    /// Imports that refer to project units rather than the standard library.
    pub fn local_import_candidates(&self) -> impl Iterator<Item = &str> {
        self.imports
            .iter()
            .map(String::as_str)
            .filter(|name| !STD_MODULES.contains(name))
    }
}

#[cfg(test)]
pub(crate) fn test_unit(relative: &str, header: ModuleHeader) -> TranslationUnit {
    TranslationUnit::from_scan(
        Path::new(relative),
        PathBuf::from("/project").join(relative),
        header,
        SystemTime::UNIX_EPOCH,
        "tester",
    )
    .expect("valid test unit")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_longest_suffix_wins() {
        assert_eq!(match_supported_suffix("foo.test.c++m"), Some(".test.c++m"));
        assert_eq!(match_supported_suffix("foo.test.c++"), Some(".test.c++"));
        assert_eq!(match_supported_suffix("foo.impl.c++"), Some(".impl.c++"));
        assert_eq!(match_supported_suffix("foo.c++m"), Some(".c++m"));
        assert_eq!(match_supported_suffix("foo.cpp"), Some(".cpp"));
        assert_eq!(match_supported_suffix("foo.h"), None);
    }

    #[test]
    fn test_identity_of_interface_uses_module_name() {
        let unit = test_unit(
            "net/http.c++m",
            ModuleHeader {
                module: "net.http".into(),
                kind: UnitKind::Interface,
                ..Default::default()
            },
        );
        assert_eq!(unit.id, "net.http");
        assert_eq!(unit.base_name, "http");
        assert_eq!(unit.dir, "net");
        assert!(unit.is_modular);
        assert!(!unit.is_test);
    }

    #[test]
    fn test_identity_of_implementation_uses_filename() {
        let unit = test_unit(
            "a.impl.c++",
            ModuleHeader {
                module: "a".into(),
                kind: UnitKind::Implementation,
                ..Default::default()
            },
        );
        assert_eq!(unit.id, "a.impl.c++");
        assert_eq!(unit.base_name, "a");
        assert!(!unit.is_modular);
        assert_eq!(unit.relative_path(), "a.impl.c++");
    }

    #[test]
    fn test_test_classification() {
        let by_suffix = test_unit("src/foo.test.c++", ModuleHeader::default());
        assert!(by_suffix.is_test);

        let by_dir = test_unit("tests/helpers.c++", ModuleHeader::default());
        assert!(by_dir.is_test);

        let framework = test_unit("tester/test_runner.c++", ModuleHeader::default());
        assert!(!framework.is_test);

        let plain = test_unit("src/main.c++", ModuleHeader::default());
        assert!(!plain.is_test);
    }

    #[test]
    fn test_bare_suffix_is_rejected() {
        let err = TranslationUnit::from_scan(
            Path::new(".c++"),
            PathBuf::from("/p/.c++"),
            ModuleHeader::default(),
            SystemTime::UNIX_EPOCH,
            "tester",
        )
        .unwrap_err();
        assert!(err.to_string().contains(".c++"));
    }

    #[test]
    fn test_std_imports_are_not_local_candidates() {
        let unit = test_unit(
            "main.c++",
            ModuleHeader {
                imports: vec!["std".into(), "a".into(), "std.compat".into()],
                has_main: true,
                ..Default::default()
            },
        );
        let local: Vec<_> = unit.local_import_candidates().collect();
        assert_eq!(local, vec!["a"]);
        assert_eq!(unit.imports.len(), 3);
    }

    #[test]
    fn test_paths_attach_once() {
        let mut unit = test_unit("main.c++", ModuleHeader::default());
        assert!(unit.artifacts().is_err());
        unit.attach_paths(ArtifactPaths {
            object: PathBuf::from("obj/main.o"),
            interface: None,
            executable: None,
        })
        .unwrap();
        let again = unit.attach_paths(ArtifactPaths {
            object: PathBuf::from("obj/other.o"),
            interface: None,
            executable: None,
        });
        assert!(again.is_err());
        assert_eq!(unit.artifacts().unwrap().object, PathBuf::from("obj/main.o"));
    }
}
