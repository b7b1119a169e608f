use crate::config::{CONFIG_FILE, MbConfig};
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

// --- Helper: Load mb.toml (optional) ---
pub fn load_config(project_root: &Path) -> Result<Option<MbConfig>> {
    let path = project_root.join(CONFIG_FILE);
    if !path.exists() {
        return Ok(None);
    }
    let config_str = fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {} - check file permissions", path.display()))?;
    let config: MbConfig = toml::from_str(&config_str).with_context(|| {
        format!(
            "Failed to parse {} - check for syntax errors or unknown keys",
            path.display()
        )
    })?;
    Ok(Some(config))
}

/// Splits a user-supplied flag string into arguments.
pub fn split_flags(flags: &str) -> Vec<String> {
    flags.split_whitespace().map(str::to_string).collect()
}

/// Get the `-std=` flag for an edition. Accepts `c++20`, `20`, `-std=c++20`
/// and the GNU and pre-release spellings.
pub fn std_flag(edition: &str) -> String {
    let normalized = edition.trim().to_lowercase();
    let edition_clean = normalized.strip_prefix("-std=").unwrap_or(&normalized);

    let canonical = match edition_clean {
        "17" | "c++17" | "c++1z" => "c++17",
        "20" | "c++20" | "c++2a" => "c++20",
        "23" | "c++23" | "c++2b" => "c++23",
        "26" | "c++26" | "c++2c" => "c++26",
        "gnu++20" | "gnu++2a" => "gnu++20",
        "gnu++23" | "gnu++2b" => "gnu++23",
        "gnu++26" | "gnu++2c" => "gnu++26",
        other => other,
    };
    format!("-std={canonical}")
}
