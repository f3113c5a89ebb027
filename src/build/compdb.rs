//! `compile_commands.json` for editors and language servers.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompileCommand {
    pub directory: PathBuf,
    pub arguments: Vec<String>,
    pub file: PathBuf,
}

/// Collects compile commands from parallel jobs.
#[derive(Debug, Default)]
pub struct CompilationDatabase {
    directory: PathBuf,
    commands: Mutex<Vec<CompileCommand>>,
}

impl CompilationDatabase {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            commands: Mutex::new(Vec::new()),
        }
    }

    pub fn add(&self, file: &Path, arguments: &[String]) {
        let command = CompileCommand {
            directory: self.directory.clone(),
            arguments: arguments.to_vec(),
            file: file.to_path_buf(),
        };
        if let Ok(mut commands) = self.commands.lock() {
            commands.push(command);
        }
    }

    /// Commands sorted by file, so the output does not depend on job order.
    pub fn commands(&self) -> Vec<CompileCommand> {
        let mut commands = self
            .commands
            .lock()
            .map(|c| c.clone())
            .unwrap_or_default();
        commands.sort_by(|a, b| a.file.cmp(&b.file));
        commands
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.commands())?;
        fs::write(path, json)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }
}
