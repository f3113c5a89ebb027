//! Installed libraries.
//!
//! A [`Library`] is loaded once from disk (see [`loader`]) and then shared
//! read-only between the catalog, the resolver and the discovery run.
//!
//! ## Layouts
//!
//! - **Recursive**: sources live under `src/` and are compiled recursively
//! - **Flat**: sources live in the library root, plus an optional `utility/`
//!   folder that gets its own `-I` when compiling the library itself

pub mod catalog;
pub mod loader;
pub mod resolver;

pub use catalog::{LibrariesDir, LibraryCatalog};
pub use resolver::LibraryResolver;

use crate::error::DiscoveryError;
use semver::Version;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// Properties every non-legacy `library.properties` must declare.
pub const MANDATORY_PROPERTIES: &[&str] = &["name", "version", "author", "maintainer"];

/// Where a library was installed. Later variants win ties in resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LibraryLocation {
    /// Shipped with the IDE.
    IdeBuiltIn,
    /// Bundled with a platform the board references but does not own.
    ReferencedPlatformBuiltIn,
    /// Bundled with the target platform.
    PlatformBuiltIn,
    /// Installed in the user's sketchbook.
    User,
    /// Passed explicitly as a single library folder.
    Unmanaged,
}

impl fmt::Display for LibraryLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LibraryLocation::IdeBuiltIn => "ide",
            LibraryLocation::ReferencedPlatformBuiltIn => "ref-platform",
            LibraryLocation::PlatformBuiltIn => "platform",
            LibraryLocation::User => "user",
            LibraryLocation::Unmanaged => "unmanaged",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LibraryLayout {
    Flat,
    Recursive,
}

/// A folder of library sources and whether to descend into it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDir {
    pub dir: PathBuf,
    pub recurse: bool,
}

#[derive(Debug, Clone)]
pub struct Library {
    pub name: String,
    /// Name of the install folder, also used as the build subfolder.
    pub dir_name: String,
    pub install_dir: PathBuf,
    pub source_dir: PathBuf,
    pub utility_dir: Option<PathBuf>,
    pub location: LibraryLocation,
    pub layout: LibraryLayout,
    pub architectures: Vec<String>,
    /// Pre-1.5 library without `library.properties`.
    pub is_legacy: bool,
    pub precompiled: bool,
    pub precompiled_with_sources: bool,
    pub dot_a_linkage: bool,
    pub ld_flags: String,
    pub version: Option<Version>,
    pub author: String,
    pub maintainer: String,
    pub sentence: String,
    pub url: String,
    /// Headers listed in the `includes` property.
    pub declared_headers: Vec<String>,
    /// Header files found directly in `source_dir`, sorted.
    pub source_headers: Vec<String>,
    /// Raw `library.properties`, after defaults were applied.
    pub properties: BTreeMap<String, String>,
}

/// Libraries are identified by where they are installed.
impl PartialEq for Library {
    fn eq(&self, other: &Self) -> bool {
        self.install_dir == other.install_dir
    }
}

impl Eq for Library {}

impl fmt::Display for Library {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.version {
            Some(v) => write!(f, "{}@{}", self.name, v),
            None => f.write_str(&self.name),
        }
    }
}

impl Library {
    /// True when `arch` is listed explicitly.
    pub fn is_optimized_for_architecture(&self, arch: &str) -> bool {
        self.architectures.iter().any(|a| a == arch)
    }

    pub fn is_architecture_independent(&self) -> bool {
        self.architectures.is_empty() || self.is_optimized_for_architecture("*")
    }

    pub fn is_compatible_with(&self, arch: &str) -> bool {
        self.is_architecture_independent() || self.is_optimized_for_architecture(arch)
    }

    /// Headers users include to pull in this library.
    pub fn declared_headers(&self) -> &[String] {
        if self.declared_headers.is_empty() {
            &self.source_headers
        } else {
            &self.declared_headers
        }
    }

    /// Folders whose sources belong to this library.
    pub fn source_dirs(&self) -> Vec<SourceDir> {
        let mut dirs = vec![SourceDir {
            dir: self.source_dir.clone(),
            recurse: self.layout == LibraryLayout::Recursive,
        }];
        if let Some(utility) = &self.utility_dir {
            dirs.push(SourceDir {
                dir: utility.clone(),
                recurse: false,
            });
        }
        dirs
    }

    /// Structural checks applied to every imported library.
    pub fn validate(&self) -> Result<(), DiscoveryError> {
        if self.is_legacy {
            return Ok(());
        }
        if self.install_dir.join("arch").is_dir() {
            return Err(DiscoveryError::ArchFolderNotSupported {
                install_dir: self.install_dir.clone(),
            });
        }
        for property in MANDATORY_PROPERTIES {
            if !self.properties.contains_key(*property) {
                return Err(DiscoveryError::MissingLibraryProperty {
                    property: property.to_string(),
                    install_dir: self.install_dir.clone(),
                });
            }
        }
        if self.layout == LibraryLayout::Recursive && self.utility_dir.is_some() {
            return Err(DiscoveryError::SrcAndUtilityFolders {
                install_dir: self.install_dir.clone(),
            });
        }
        Ok(())
    }

    /// A minimal library record, mostly useful for tests and benchmarks.
    pub fn new(name: &str, install_dir: impl Into<PathBuf>, location: LibraryLocation) -> Self {
        let install_dir = install_dir.into();
        let dir_name = install_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| name.to_string());
        Self {
            name: name.to_string(),
            dir_name,
            source_dir: install_dir.clone(),
            install_dir,
            utility_dir: None,
            location,
            layout: LibraryLayout::Flat,
            architectures: vec!["*".to_string()],
            is_legacy: false,
            precompiled: false,
            precompiled_with_sources: false,
            dot_a_linkage: false,
            ld_flags: String::new(),
            version: None,
            author: String::new(),
            maintainer: String::new(),
            sentence: String::new(),
            url: String::new(),
            declared_headers: Vec::new(),
            source_headers: Vec::new(),
            properties: BTreeMap::new(),
        }
    }
}
