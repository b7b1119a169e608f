//! Source tree scanning and unit classification.
//!
//! Walks the project, keeps files with a recognized suffix and reads each file's
//! preamble to classify it. A file that fails classification is logged and skipped;
//! the scan itself only fails when the root cannot be walked at all.

mod parser;
mod unit;

use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

pub use parser::{MAX_SCAN_LINES, parse_header};
#[cfg(test)]
pub(crate) use unit::test_unit;
pub use unit::{
    ModuleHeader, STD_MODULES, SUPPORTED_SUFFIXES, TranslationUnit, UnitKind, is_supported,
    match_supported_suffix,
};

/// Why a single file was skipped.
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("unsupported source suffix: {0}")]
    UnsupportedSuffix(String),
    #[error("{0} unit is missing its module name")]
    MissingModuleName(UnitKind),
    #[error("cannot read file: {0}")]
    Read(std::io::Error),
}

/// Which parts of the tree take part in a build.
#[derive(Debug, Clone)]
pub struct ScanOptions {
    pub include_tests: bool,
    pub include_examples: bool,
    /// Extra directory names to skip anywhere in the tree.
    pub exclude: Vec<String>,
    /// Directory of the test framework itself; its files are never test units.
    pub test_framework_dir: String,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            include_tests: false,
            include_examples: false,
            exclude: Vec::new(),
            test_framework_dir: "tester".to_string(),
        }
    }
}

impl ScanOptions {
    fn skips_dir(&self, name: &str) -> bool {
        if name.starts_with('.') || name.starts_with("build-") {
            return true;
        }
        match name {
            "build" | "target" | "tools" => true,
            "test" | "tests" => !self.include_tests,
            "examples" => !self.include_examples,
            _ => self.exclude.iter().any(|excluded| excluded == name),
        }
    }

    fn keeps(&self, entry: &DirEntry) -> bool {
        if entry.depth() == 0 || !entry.file_type().is_dir() {
            return true;
        }
        !self.skips_dir(&entry.file_name().to_string_lossy())
    }
}

/// Scans `root` and returns its units sorted by relative path.
pub fn scan_project(root: &Path, options: &ScanOptions) -> Vec<TranslationUnit> {
    if !root.is_dir() {
        warn!(root = %root.display(), "project root is not a directory");
        return Vec::new();
    }

    let candidates: Vec<PathBuf> = WalkDir::new(root)
        .into_iter()
        .filter_entry(|entry| options.keeps(entry))
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!("skipping unreadable entry: {}", e);
                None
            }
        })
        .filter(|entry| entry.file_type().is_file() && is_supported(entry.path()))
        .map(DirEntry::into_path)
        .collect();

    let mut units: Vec<TranslationUnit> = candidates
        .par_iter()
        .filter_map(|path| match scan_file(root, path, options) {
            Ok(unit) => Some(unit),
            Err(e) => {
                warn!(file = %path.display(), "skipping: {}", e);
                None
            }
        })
        .filter(|unit| options.include_tests || !unit.is_test)
        .collect();

    units.sort_by_key(TranslationUnit::relative_path);
    debug!(count = units.len(), root = %root.display(), "scan complete");
    units
}

/// Classifies one file.
pub fn scan_file(
    root: &Path,
    path: &Path,
    options: &ScanOptions,
) -> Result<TranslationUnit, ScanError> {
    let relative = match path.strip_prefix(root) {
        Ok(rel) if !rel.as_os_str().is_empty() => rel.to_path_buf(),
        _ => PathBuf::from(path.file_name().unwrap_or_default()),
    };

    let file = File::open(path).map_err(ScanError::Read)?;
    let modified = file
        .metadata()
        .and_then(|meta| meta.modified())
        .map_err(ScanError::Read)?;
    let header = parse_header(BufReader::new(file))?;

    let full_path = fs::canonicalize(path)
        .or_else(|_| std::path::absolute(path))
        .map_err(ScanError::Read)?;

    TranslationUnit::from_scan(
        &relative,
        full_path,
        header,
        modified,
        &options.test_framework_dir,
    )
}
