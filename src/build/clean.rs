//! Build artifact cleanup.
//!
//! `inox clean` removes the build folder, including the discovery caches
//! (`includes.cache`, `libraries.cache`) and `compile_commands.json`.

use anyhow::{Context, Result};
use colored::*;

use std::fs;
use std::path::Path;

/// Returns whether anything was removed.
pub fn clean(build_dir: &Path) -> Result<bool> {
    if !build_dir.exists() {
        println!("{} Nothing to clean", "!".yellow());
        return Ok(false);
    }
    fs::remove_dir_all(build_dir)
        .with_context(|| format!("Failed to remove build directory {}", build_dir.display()))?;
    println!("{} Clean complete.", "✓".green());
    Ok(true)
}
