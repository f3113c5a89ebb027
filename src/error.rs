//! Error types for library discovery and compilation.
//!
//! Discovery and compilation are the two places where the build can fail for
//! reasons the user has to act on, so both get a typed taxonomy. The
//! orchestration layers above them (`build::core`, the CLI) wrap these in
//! `anyhow` errors with extra context.

use std::path::PathBuf;

/// Errors raised while discovering the libraries a sketch needs.
#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    /// A header is missing and no installed library provides it.
    #[error("{header}: no installed library provides this header (included by {source_file})\n{diagnostics}")]
    UnresolvedHeader {
        /// The missing header, as reported by the preprocessor.
        header: String,
        /// The compilation unit that includes it.
        source_file: PathBuf,
        /// The preprocessor diagnostic text, verbatim.
        diagnostics: String,
    },

    /// The preprocessor could not be started at all.
    #[error("failed to run the preprocessor on {path}: {source}")]
    PreprocessorSpawn {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The preprocessor failed without printing anything we could inspect.
    #[error("preprocessor failed on {path} without diagnostics ({})", exit_status(.code))]
    PreprocessorFailed { path: PathBuf, code: Option<i32> },

    /// A cached "missing header" could not be reproduced by a fresh run.
    #[error("internal error in library discovery cache: {header} is no longer missing in {source_file}")]
    CacheInconsistency { header: String, source_file: PathBuf },

    /// The per-unit resolution loop exceeded its bound.
    #[error("library discovery did not converge for {source_file} after {iterations} iterations")]
    DidNotConverge {
        source_file: PathBuf,
        iterations: usize,
    },

    /// Resolution picked a library that is already imported.
    #[error("library {library} was resolved again for {header}")]
    NonMonotonicResolution { header: String, library: String },

    /// A library explicitly attached to the project is not installed.
    #[error("library {name} is attached to the project but is not installed")]
    UnknownProfileLibrary { name: String },

    #[error("'arch' folder is no longer supported! Remove it from {install_dir}")]
    ArchFolderNotSupported { install_dir: PathBuf },

    #[error("missing '{property}' from library in {install_dir}")]
    MissingLibraryProperty {
        property: String,
        install_dir: PathBuf,
    },

    #[error("library can't use both 'src' and 'utility' folders. Double check in '{install_dir}'")]
    SrcAndUtilityFolders { install_dir: PathBuf },

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("malformed discovery cache {path}: {source}")]
    Cache {
        path: PathBuf,
        source: serde_json::Error,
    },

    /// Source enumeration, recipe expansion or a staleness check failed.
    #[error(transparent)]
    Build(#[from] BuildError),
}

impl DiscoveryError {
    /// Structural library errors are never downgraded, even when only the
    /// compilation database is being updated.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            DiscoveryError::ArchFolderNotSupported { .. }
                | DiscoveryError::MissingLibraryProperty { .. }
                | DiscoveryError::SrcAndUtilityFolders { .. }
        )
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        DiscoveryError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Errors raised while compiling source files.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to execute {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    /// The compiler exited with a non-zero status. Its output has already
    /// been written to the build log.
    #[error("compilation of {source_file} failed ({})", exit_status(.code))]
    CompileFailed {
        source_file: PathBuf,
        code: Option<i32>,
    },

    #[error("no compile recipe for '{extension}' files")]
    MissingRecipe { extension: String },

    #[error("recipe '{name}' is empty")]
    EmptyRecipe { name: String },

    #[error("build cancelled")]
    Cancelled,

    #[error("failed to start compile workers: {0}")]
    ThreadPool(String),
}

impl BuildError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        BuildError::Io {
            path: path.into(),
            source,
        }
    }
}

/// `exit code 1`, or `killed by a signal` when the tool has no exit code.
fn exit_status(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {}", code),
        None => "killed by a signal".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unresolved_header_keeps_diagnostics() {
        let err = DiscoveryError::UnresolvedHeader {
            header: "Servo.h".to_string(),
            source_file: PathBuf::from("/tmp/build/sketch/Blink.ino.cpp"),
            diagnostics: "Blink.ino:1:10: fatal error: Servo.h: No such file or directory".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("Servo.h"));
        assert!(msg.contains("Blink.ino.cpp"));
        assert!(msg.contains("fatal error: Servo.h: No such file or directory"));
    }

    #[test]
    fn test_structural_errors() {
        let arch = DiscoveryError::ArchFolderNotSupported {
            install_dir: PathBuf::from("/libs/Foo"),
        };
        assert!(arch.is_structural());

        let cache = DiscoveryError::CacheInconsistency {
            header: "Foo.h".to_string(),
            source_file: PathBuf::from("a.cpp"),
        };
        assert!(!cache.is_structural());
    }

    #[test]
    fn test_compile_failed_display() {
        let err = BuildError::CompileFailed {
            source_file: PathBuf::from("src/main.cpp"),
            code: Some(1),
        };
        assert_eq!(err.to_string(), "compilation of src/main.cpp failed (exit code 1)");

        let err = DiscoveryError::PreprocessorFailed {
            path: PathBuf::from("a.cpp"),
            code: None,
        };
        assert_eq!(
            err.to_string(),
            "preprocessor failed on a.cpp without diagnostics (killed by a signal)"
        );
    }
}
