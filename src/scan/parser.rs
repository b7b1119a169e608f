//! Bounded preamble scanner.
//!
//! This is a line heuristic, not a C++ front end. Module and import syntax is only
//! recognized until the first line that looks like real code (a brace or one of a
//! few definition keywords). Keywords hidden inside string literals before that point
//! can be misread, and an import placed after it is missed.

use std::io::BufRead;
use std::sync::LazyLock;

use regex::Regex;

use super::ScanError;
use super::unit::{ModuleHeader, UnitKind};

/// Lines read per file before giving up.
pub const MAX_SCAN_LINES: usize = 1000;

static FRAGMENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*module\s*;").expect("valid regex"));
static EXPORT_MODULE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*export\s+module\s+([\w:.-]+)\s*;").expect("valid regex"));
static MODULE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*module\s+([\w:.-]+)\s*;").expect("valid regex"));
static IMPORT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:export\s+)?import\s+([\w:.-]+)\s*;").expect("valid regex")
});
static MAIN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bint\s+main\s*\(").expect("valid regex"));
static REAL_CODE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{|\b(?:class|struct|namespace|constexpr|inline|static)\b").expect("valid regex")
});

/// Reads the preamble of one source file.
pub fn parse_header<R: BufRead>(reader: R) -> Result<ModuleHeader, ScanError> {
    let mut header = ModuleHeader::default();
    let mut in_block_comment = false;
    let mut seen_real_code = false;

    for raw in reader.split(b'\n').take(MAX_SCAN_LINES) {
        let raw = raw.map_err(ScanError::Read)?;
        let owned = String::from_utf8_lossy(&raw);
        let mut line: &str = &owned;

        if in_block_comment {
            match line.find("*/") {
                Some(end) => {
                    in_block_comment = false;
                    line = &line[end + 2..];
                }
                None => continue,
            }
        }

        let mut trimmed = line.trim();
        if let Some(rest) = trimmed.strip_prefix("/*") {
            match rest.find("*/") {
                Some(end) => trimmed = rest[end + 2..].trim(),
                None => {
                    in_block_comment = true;
                    continue;
                }
            }
        }
        if trimmed.is_empty() || trimmed.starts_with("//") || trimmed.starts_with('#') {
            continue;
        }

        if MAIN_RE.is_match(trimmed) {
            header.has_main = true;
        }

        if !seen_real_code && REAL_CODE_RE.is_match(trimmed) {
            seen_real_code = true;
        }
        if seen_real_code {
            continue;
        }

        scan_module_line(trimmed, &mut header);
    }

    validate(&header)?;
    Ok(header)
}

fn scan_module_line(line: &str, header: &mut ModuleHeader) {
    if FRAGMENT_RE.is_match(line) {
        if header.kind == UnitKind::NonModule {
            header.kind = UnitKind::GlobalFragment;
        }
    } else if let Some(caps) = EXPORT_MODULE_RE.captures(line) {
        header.module = caps[1].to_string();
        header.kind = if header.module.contains(':') {
            UnitKind::Partition
        } else {
            UnitKind::Interface
        };
    } else if let Some(caps) = MODULE_RE.captures(line) {
        if matches!(
            header.kind,
            UnitKind::NonModule | UnitKind::GlobalFragment
        ) {
            header.module = caps[1].to_string();
            header.kind = UnitKind::Implementation;
        }
    } else if let Some(caps) = IMPORT_RE.captures(line) {
        let import = qualify_import(&caps[1], &header.module);
        if !import.is_empty() {
            header.imports.push(import);
        }
    }
}

/// Expands a partition-relative import (`:part`) against the enclosing module.
fn qualify_import(import: &str, module: &str) -> String {
    if import.starts_with(':') && !module.is_empty() {
        let base = module.split(':').next().unwrap_or(module);
        format!("{base}{import}")
    } else {
        import.to_string()
    }
}

fn validate(header: &ModuleHeader) -> Result<(), ScanError> {
    let (base, partition) = match header.module.split_once(':') {
        Some((base, part)) => (base, Some(part)),
        None => (header.module.as_str(), None),
    };
    let missing = match header.kind {
        UnitKind::Interface | UnitKind::Implementation => base.is_empty(),
        UnitKind::Partition => base.is_empty() || partition.is_none_or(str::is_empty),
        UnitKind::NonModule | UnitKind::GlobalFragment => false,
    };
    if missing {
        return Err(ScanError::MissingModuleName(header.kind));
    }
    Ok(())
}
