//! Replayable log of discovery decisions (`includes.cache`).
//!
//! Discovery records, in order, every include folder it adds, every unit it
//! preprocesses (with the exact command line) and the missing header that
//! run reported. On the next build the same sequence of calls replays the
//! log: as long as each [`DetectorCache::expect`] matches the entry under the
//! cursor, the stored answers are reused and the preprocessor never runs.
//! The first mismatch cuts the log at the cursor and the cache switches to
//! recording for the rest of the run.

use super::source_file::{CompilationUnit, UnitRecord};
use crate::build::preprocess::PreprocessTask;
use crate::error::DiscoveryError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::trace;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CacheEntry {
    AddedIncludePath {
        added_include_path: PathBuf,
    },
    Compile {
        compile: UnitRecord,
        compile_task: PreprocessTask,
    },
    /// Empty when the unit preprocessed without a missing header.
    MissingIncludeH {
        missing_include_h: String,
    },
}

impl CacheEntry {
    pub fn added_include_path(path: &Path) -> Self {
        CacheEntry::AddedIncludePath {
            added_include_path: path.to_path_buf(),
        }
    }

    pub fn compile(unit: &CompilationUnit, task: PreprocessTask) -> Self {
        CacheEntry::Compile {
            compile: unit.record(),
            compile_task: task,
        }
    }

    pub fn missing_include(header: &str) -> Self {
        CacheEntry::MissingIncludeH {
            missing_include_h: header.to_string(),
        }
    }

    fn log_msg(&self) -> String {
        match self {
            CacheEntry::Compile { compile, .. } => {
                format!("Compiling: {}", compile.source_path.display())
            }
            other => other.to_string(),
        }
    }
}

impl fmt::Display for CacheEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheEntry::AddedIncludePath { added_include_path } => {
                write!(f, "Added include path: {}", added_include_path.display())
            }
            CacheEntry::Compile {
                compile,
                compile_task,
            } => write!(
                f,
                "Compiling: {} / {}",
                compile.source_path.display(),
                compile_task.args.join(" ")
            ),
            CacheEntry::MissingIncludeH { missing_include_h } if missing_include_h.is_empty() => {
                f.write_str("No missing include files detected")
            }
            CacheEntry::MissingIncludeH { missing_include_h } => {
                write!(f, "Missing include file: {}", missing_include_h)
            }
        }
    }
}

/// Whether the cache still agrees with the current run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CacheState {
    /// Every expectation so far matched; `cursor` is the next entry to compare.
    Replaying { cursor: usize },
    /// A mismatch (or the end of the log) was reached; entries are only appended.
    Recording,
}

#[derive(Debug, Clone)]
pub struct DetectorCache {
    entries: Vec<CacheEntry>,
    state: CacheState,
}

impl Default for DetectorCache {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            state: CacheState::Replaying { cursor: 0 },
        }
    }
}

impl DetectorCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: Vec<CacheEntry>) -> Self {
        Self {
            entries,
            state: CacheState::Replaying { cursor: 0 },
        }
    }

    /// Loads `path`; a missing file gives an empty cache.
    pub fn load(path: &Path) -> Result<Self, DiscoveryError> {
        let data = match fs::read(path) {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Self::new()),
            Err(e) => return Err(DiscoveryError::io(path, e)),
        };
        let entries = serde_json::from_slice(&data).map_err(|source| DiscoveryError::Cache {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::from_entries(entries))
    }

    /// Compares `entry` with the next cached one, advancing on a match.
    /// On a mismatch the rest of the log is dropped and recording starts.
    pub fn expect(&mut self, entry: CacheEntry) {
        match self.state {
            CacheState::Replaying { cursor } if cursor < self.entries.len() => {
                if self.entries[cursor] == entry {
                    trace!("CACHE: HIT {}", entry.log_msg());
                    self.state = CacheState::Replaying { cursor: cursor + 1 };
                    return;
                }
                trace!("CACHE: INVALIDATE {}", entry.log_msg());
                trace!("             (was {})", self.entries[cursor]);
                self.entries.truncate(cursor);
            }
            CacheState::Replaying { .. } => trace!("CACHE: MISSING {}", entry.log_msg()),
            CacheState::Recording => {}
        }
        self.entries.push(entry);
        self.state = CacheState::Recording;
    }

    /// The next cached entry, if the cache is still replaying.
    pub fn peek(&self) -> Option<&CacheEntry> {
        match self.state {
            CacheState::Replaying { cursor } => self.entries.get(cursor),
            CacheState::Recording => None,
        }
    }

    pub fn is_replaying(&self) -> bool {
        matches!(self.state, CacheState::Replaying { .. })
    }

    pub fn entries(&self) -> &[CacheEntry] {
        &self.entries
    }

    /// Writes the consumed part of the log to `path`.
    pub fn save(&mut self, path: &Path) -> Result<(), DiscoveryError> {
        if let CacheState::Replaying { cursor } = self.state {
            self.entries.truncate(cursor);
        }
        let data = serde_json::to_vec_pretty(&self.entries).map_err(|source| DiscoveryError::Cache {
            path: path.to_path_buf(),
            source,
        })?;
        fs::write(path, data).map_err(|e| DiscoveryError::io(path, e))
    }
}
