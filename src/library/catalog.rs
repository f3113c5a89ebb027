//! Read-only snapshot of every installed library.
//!
//! The catalog is built once per build from the library folders configured
//! in `inox.toml` and then handed to the resolver and the detector. Nothing
//! mutates it afterwards, so independent builds (and tests) can each use
//! their own snapshot.

use super::loader;
use super::{Library, LibraryLocation};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A folder to scan for libraries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibrariesDir {
    pub path: PathBuf,
    pub location: LibraryLocation,
    /// The folder is itself a library instead of a folder of libraries.
    pub single_library: bool,
}

impl LibrariesDir {
    pub fn new(path: impl Into<PathBuf>, location: LibraryLocation) -> Self {
        Self {
            path: path.into(),
            location,
            single_library: false,
        }
    }

    pub fn single(path: impl Into<PathBuf>, location: LibraryLocation) -> Self {
        Self {
            path: path.into(),
            location,
            single_library: true,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct LibraryCatalog {
    libraries: Vec<Arc<Library>>,
}

impl LibraryCatalog {
    pub fn new(libraries: Vec<Library>) -> Self {
        Self {
            libraries: libraries.into_iter().map(Arc::new).collect(),
        }
    }

    /// Loads every library under `dirs`. Folders that fail to load are
    /// reported as warnings and skipped.
    pub fn load(dirs: &[LibrariesDir]) -> (Self, Vec<String>) {
        let mut libraries = Vec::new();
        let mut warnings = Vec::new();

        for dir in dirs {
            if !dir.path.is_dir() {
                warnings.push(format!("Libraries folder not found: {}", dir.path.display()));
                continue;
            }
            if dir.single_library {
                load_one(&dir.path, dir.location, &mut libraries, &mut warnings);
                continue;
            }
            match sorted_subfolders(&dir.path) {
                Ok(folders) => {
                    for folder in folders {
                        load_one(&folder, dir.location, &mut libraries, &mut warnings);
                    }
                }
                Err(e) => warnings.push(format!(
                    "Failed to read libraries folder {}: {}",
                    dir.path.display(),
                    e
                )),
            }
        }

        (Self::new(libraries), warnings)
    }

    pub fn libraries(&self) -> &[Arc<Library>] {
        &self.libraries
    }

    pub fn is_empty(&self) -> bool {
        self.libraries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.libraries.len()
    }

    /// The installed library called `name`; the most local install wins.
    pub fn find_by_name(&self, name: &str) -> Option<Arc<Library>> {
        self.libraries
            .iter()
            .filter(|lib| lib.name == name || lib.dir_name == name)
            .max_by_key(|lib| lib.location)
            .cloned()
    }
}

fn load_one(
    folder: &Path,
    location: LibraryLocation,
    libraries: &mut Vec<Library>,
    warnings: &mut Vec<String>,
) {
    match loader::load(folder, location) {
        Ok(lib) => libraries.push(lib),
        Err(e) => warnings.push(format!("Skipping {}: {:#}", folder.display(), e)),
    }
}

fn sorted_subfolders(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut folders = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        if name.to_string_lossy().starts_with('.') {
            continue;
        }
        if entry.path().is_dir() {
            folders.push(entry.path());
        }
    }
    folders.sort();
    Ok(folders)
}
