//! Compilation units scanned during discovery and the queue that feeds them.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::ffi::OsString;
use std::path::{Component, Path, PathBuf};

/// A source file together with the roots that decide where its build
/// products go.
#[derive(Debug, Clone)]
pub struct CompilationUnit {
    relative_path: PathBuf,
    source_root: PathBuf,
    build_root: PathBuf,
    /// Extra `-I` for legacy libraries whose sources include files from
    /// their `utility/` folder.
    extra_include_path: Option<PathBuf>,
}

/// Two units are the same when they come from the same file under the same
/// roots; the extra include path does not take part.
impl PartialEq for CompilationUnit {
    fn eq(&self, other: &Self) -> bool {
        self.relative_path == other.relative_path
            && self.source_root == other.source_root
            && self.build_root == other.build_root
    }
}

impl Eq for CompilationUnit {}

impl CompilationUnit {
    /// `path` may be absolute or relative to `source_root`.
    pub fn new(
        source_root: impl Into<PathBuf>,
        build_root: impl Into<PathBuf>,
        path: impl AsRef<Path>,
        extra_include_path: Option<&Path>,
    ) -> Self {
        let source_root = source_root.into();
        let path = path.as_ref();
        let relative_path = if path.is_absolute() {
            relative_to(path, &source_root)
        } else {
            path.to_path_buf()
        };
        Self {
            relative_path,
            source_root,
            build_root: build_root.into(),
            extra_include_path: extra_include_path.map(Path::to_path_buf),
        }
    }

    pub fn relative_path(&self) -> &Path {
        &self.relative_path
    }

    pub fn extra_include_path(&self) -> Option<&Path> {
        self.extra_include_path.as_deref()
    }

    pub fn source_path(&self) -> PathBuf {
        self.source_root.join(&self.relative_path)
    }

    pub fn object_path(&self) -> PathBuf {
        self.build_root.join(with_suffix(&self.relative_path, ".o"))
    }

    pub fn depfile_path(&self) -> PathBuf {
        self.build_root.join(with_suffix(&self.relative_path, ".d"))
    }

    /// The paths recorded in the discovery cache for this unit.
    pub fn record(&self) -> UnitRecord {
        UnitRecord {
            source_path: self.source_path(),
            object_path: self.object_path(),
            depfile_path: self.depfile_path(),
            extra_include_path: self.extra_include_path.clone(),
        }
    }
}

/// Serialized form of a unit inside `includes.cache`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitRecord {
    pub source_path: PathBuf,
    pub object_path: PathBuf,
    pub depfile_path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra_include_path: Option<PathBuf>,
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name: OsString = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

/// `path` relative to `base`, climbing with `..` when `path` is not inside it.
fn relative_to(path: &Path, base: &Path) -> PathBuf {
    if let Ok(rel) = path.strip_prefix(base) {
        return rel.to_path_buf();
    }
    let path_parts: Vec<Component> = path.components().collect();
    let base_parts: Vec<Component> = base.components().collect();
    let common = path_parts
        .iter()
        .zip(&base_parts)
        .take_while(|(a, b)| a == b)
        .count();
    let mut rel = PathBuf::new();
    for _ in common..base_parts.len() {
        rel.push("..");
    }
    for part in &path_parts[common..] {
        rel.push(part.as_os_str());
    }
    rel
}

/// FIFO of units where pushing a unit that is already queued does nothing.
#[derive(Debug, Default)]
pub struct UnitQueue {
    units: VecDeque<CompilationUnit>,
}

impl UnitQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, unit: CompilationUnit) {
        if !self.units.contains(&unit) {
            self.units.push_back(unit);
        }
    }

    pub fn pop(&mut self) -> Option<CompilationUnit> {
        self.units.pop_front()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }
}
