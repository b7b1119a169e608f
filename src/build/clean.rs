//! Build artifact cleanup.
//!
//! `mb clean` removes the build root of the selected profile. Other profiles and the
//! sources are left alone.

use colored::*;
use std::fs;

use super::layout::ArtifactLayout;
use crate::error::{BuildError, BuildResult};

/// Returns whether anything was removed.
pub fn clean(layout: &ArtifactLayout) -> BuildResult<bool> {
    let root = layout.build_root();
    if !root.exists() {
        println!("{} Nothing to clean", "!".yellow());
        return Ok(false);
    }
    fs::remove_dir_all(root).map_err(|e| BuildError::io(root, e))?;
    println!("{} Removed {}", "🗑️".red(), root.display());
    Ok(true)
}
