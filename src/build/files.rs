//! Source file enumeration.

use crate::error::BuildError;
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

/// Extensions compiled into object files.
pub const SOURCE_EXTENSIONS: &[&str] = &["c", "cpp", "cc", "cxx", "S"];

/// Extensions a library exposes as includable headers.
pub const HEADER_EXTENSIONS: &[&str] = &["h", "hh", "hpp"];

/// Sketch files merged into the main translation unit.
pub const SKETCH_EXTENSIONS: &[&str] = &["ino", "pde"];

/// Version-control and editor folders that never contain build inputs.
const SOURCE_CONTROL_FOLDERS: &[&str] = &[
    "CVS",
    "RCS",
    ".git",
    ".github",
    ".svn",
    ".hg",
    ".bzr",
    ".vscode",
    ".settings",
    ".pioenvs",
    ".piolibdeps",
];

pub fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| extensions.contains(&e))
}

fn is_visible(entry: &DirEntry) -> bool {
    // The walk root itself is always accepted.
    if entry.depth() == 0 {
        return true;
    }
    let name = entry.file_name().to_string_lossy();
    !name.starts_with('.') && !SOURCE_CONTROL_FOLDERS.contains(&name.as_ref())
}

/// Lists files under `dir` whose extension is in `extensions` (all files when
/// empty), skipping hidden entries and source-control folders. The result is
/// sorted so that every caller sees a stable order.
pub fn find_files_in_folder(
    dir: &Path,
    recurse: bool,
    extensions: &[&str],
) -> Result<Vec<PathBuf>, BuildError> {
    let mut walker = WalkDir::new(dir).follow_links(true);
    if !recurse {
        walker = walker.max_depth(1);
    }

    let mut files = Vec::new();
    for entry in walker.into_iter().filter_entry(is_visible) {
        let entry = entry.map_err(|e| {
            let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| dir.to_path_buf());
            BuildError::io(path, e.into())
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        if extensions.is_empty() || has_extension(entry.path(), extensions) {
            files.push(entry.into_path());
        }
    }
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "").unwrap();
    }

    #[test]
    fn test_find_files_flat_and_recursive() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        touch(&root.join("b.cpp"));
        touch(&root.join("a.c"));
        touch(&root.join("notes.txt"));
        touch(&root.join("nested").join("deep.S"));

        let flat = find_files_in_folder(root, false, SOURCE_EXTENSIONS).unwrap();
        assert_eq!(flat, vec![root.join("a.c"), root.join("b.cpp")]);

        let all = find_files_in_folder(root, true, SOURCE_EXTENSIONS).unwrap();
        assert_eq!(all.len(), 3);
        assert!(all.contains(&root.join("nested").join("deep.S")));
    }

    #[test]
    fn test_find_files_skips_hidden_and_scm() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        touch(&root.join("main.cpp"));
        touch(&root.join(".hidden.cpp"));
        touch(&root.join(".git").join("hook.c"));
        touch(&root.join("CVS").join("old.c"));
        touch(&root.join(".cache").join("gen.cpp"));

        let files = find_files_in_folder(root, true, SOURCE_EXTENSIONS).unwrap();
        assert_eq!(files, vec![root.join("main.cpp")]);
    }

    #[test]
    fn test_extension_match_is_case_sensitive() {
        assert!(has_extension(Path::new("start.S"), SOURCE_EXTENSIONS));
        assert!(!has_extension(Path::new("start.s"), SOURCE_EXTENSIONS));
        assert!(has_extension(Path::new("Servo.h"), HEADER_EXTENSIONS));
    }
}
