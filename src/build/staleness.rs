//! Incremental build check: can a previously compiled object file be reused?

use super::depfile::DepFile;
use crate::error::BuildError;
use std::fs;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;
use tracing::debug;

/// Returns `Ok(true)` when `object_file` is up to date with respect to
/// `source_file` and every header recorded in `dependency_file`.
///
/// Anything unexpected (missing files, a malformed or foreign depfile, a
/// header that cannot be stat'ed) answers "rebuild". The only error is a
/// source file that cannot be stat'ed, because then there is nothing to build.
pub fn obj_file_is_up_to_date(
    source_file: &Path,
    object_file: &Path,
    dependency_file: &Path,
) -> Result<bool, BuildError> {
    debug!(
        source = %source_file.display(),
        object = %object_file.display(),
        depfile = %dependency_file.display(),
        "checking previous results"
    );

    let source_mtime = fs::metadata(source_file)
        .and_then(|m| m.modified())
        .map_err(|e| BuildError::io(source_file, e))?;

    let Some(object_mtime) = mtime_or_rebuild(object_file) else {
        return Ok(false);
    };
    let Some(depfile_mtime) = mtime_or_rebuild(dependency_file) else {
        return Ok(false);
    };

    if source_mtime >= object_mtime {
        debug!("{} not older than {}", source_file.display(), object_file.display());
        return Ok(false);
    }
    if source_mtime >= depfile_mtime {
        debug!("{} not older than {}", source_file.display(), dependency_file.display());
        return Ok(false);
    }

    let content = match fs::read_to_string(dependency_file) {
        Ok(content) => content,
        Err(e) => {
            debug!("could not read dependency file {}: {}", dependency_file.display(), e);
            return Ok(false);
        }
    };
    let deps = match DepFile::parse(&content) {
        Ok(deps) => deps,
        Err(e) => {
            debug!("malformed dependency file {}: {}", dependency_file.display(), e);
            return Ok(false);
        }
    };

    let Some((primary, headers)) = deps.dependencies.split_first() else {
        debug!("dependency file {} lists no sources", dependency_file.display());
        return Ok(false);
    };

    if !same_path(Path::new(&deps.object_file), object_file) {
        debug!(
            "depfile is about different object file: {} (expected {})",
            deps.object_file,
            object_file.display()
        );
        return Ok(false);
    }
    // Two sources with the same name in different folders would otherwise
    // share an object file without ever being rebuilt.
    if !same_path(Path::new(primary), source_file) {
        debug!(
            "depfile is about different source file: {} (expected {})",
            primary,
            source_file.display()
        );
        return Ok(false);
    }

    for header in headers {
        match fs::metadata(header).and_then(|m| m.modified()) {
            Ok(mtime) if mtime > object_mtime => {
                debug!("{} newer than {}", header, object_file.display());
                return Ok(false);
            }
            Ok(_) => {}
            Err(e) => {
                debug!("failed to stat {}: {}", header, e);
                return Ok(false);
            }
        }
    }

    Ok(true)
}

fn mtime_or_rebuild(path: &Path) -> Option<SystemTime> {
    match fs::metadata(path).and_then(|m| m.modified()) {
        Ok(mtime) => Some(mtime),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!("not found: {}", path.display());
            None
        }
        Err(e) => {
            debug!("could not stat {}: {}", path.display(), e);
            None
        }
    }
}

/// Lexical comparison that ignores `.` components and duplicate separators.
fn same_path(a: &Path, b: &Path) -> bool {
    clean(a) == clean(b)
}

fn clean(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
