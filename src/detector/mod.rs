//! Library discovery.
//!
//! Which libraries a sketch needs is only known after preprocessing it: a
//! missing header names a library, that library's sources may miss further
//! headers, and so on. [`LibrariesDetector::find_includes`] runs this to a
//! fixed point over a queue of compilation units:
//!
//! 1. Seed the queue with the merged sketch, the other sketch sources and
//!    the libraries attached to the project.
//! 2. Preprocess the next unit (or replay the cached answer when the unit
//!    is unchanged) and extract the first missing header.
//! 3. Resolve the header to a library, add its source folder to the include
//!    path, queue its sources and preprocess the same unit again.
//! 4. Once nothing is missing, move on to the next unit.
//!
//! The include folders are saved to `libraries.cache` and the decision log
//! to `includes.cache` in the build folder.

pub mod cache;
pub mod include_finder;
pub mod source_file;

pub use cache::{CacheEntry, DetectorCache};
pub use include_finder::find_missing_include;
pub use source_file::{CompilationUnit, UnitQueue};

use crate::build::files::{SOURCE_EXTENSIONS, find_files_in_folder};
use crate::build::logger::BuildLogger;
use crate::build::preprocess::{PreprocessTask, Preprocessor};
use crate::build::process::ProcessOutput;
use crate::build::staleness::obj_file_is_up_to_date;
use crate::error::DiscoveryError;
use crate::library::{Library, LibraryCatalog, LibraryResolver};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

const INCLUDES_CACHE: &str = "includes.cache";
const LIBRARIES_CACHE: &str = "libraries.cache";

/// The library chosen for a header and the ones that lost.
#[derive(Debug, Clone)]
pub struct ResolutionResult {
    pub library: Arc<Library>,
    pub not_used: Vec<Arc<Library>>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DetectorOptions {
    /// Trust `libraries.cache` from the previous build and skip discovery.
    pub use_cached_libraries_resolution: bool,
    /// Best effort: errors only make the compilation database incomplete.
    pub only_update_compilation_database: bool,
}

/// Where discovery reads and writes.
#[derive(Debug, Clone)]
pub struct DiscoveryPaths {
    /// Build folder holding `includes.cache` and `libraries.cache`.
    pub build_path: PathBuf,
    pub core_path: PathBuf,
    pub variant_path: Option<PathBuf>,
    /// Prepared sketch sources (`<build>/sketch`).
    pub sketch_build_path: PathBuf,
    /// File name of the merged sketch, e.g. `Blink.ino.cpp`.
    pub merged_sketch_file: String,
    /// Parent of the per-library object folders.
    pub libraries_build_path: PathBuf,
}

pub struct LibrariesDetector<'a, P: Preprocessor> {
    catalog: &'a LibraryCatalog,
    resolver: &'a LibraryResolver,
    preprocessor: &'a P,
    logger: &'a BuildLogger,
    options: DetectorOptions,
    imported_libraries: Vec<Arc<Library>>,
    include_folders: Vec<PathBuf>,
    resolution_results: BTreeMap<String, ResolutionResult>,
}

impl<'a, P: Preprocessor> LibrariesDetector<'a, P> {
    pub fn new(
        catalog: &'a LibraryCatalog,
        resolver: &'a LibraryResolver,
        preprocessor: &'a P,
        logger: &'a BuildLogger,
        options: DetectorOptions,
    ) -> Self {
        Self {
            catalog,
            resolver,
            preprocessor,
            logger,
            options,
            imported_libraries: Vec::new(),
            include_folders: Vec::new(),
            resolution_results: BTreeMap::new(),
        }
    }

    pub fn include_folders(&self) -> &[PathBuf] {
        &self.include_folders
    }

    pub fn imported_libraries(&self) -> &[Arc<Library>] {
        &self.imported_libraries
    }

    pub fn resolution_results(&self) -> &BTreeMap<String, ResolutionResult> {
        &self.resolution_results
    }

    /// Discovers the include folders and libraries the sketch needs.
    ///
    /// In best-effort mode every error except a structural library problem
    /// is reported as a message and swallowed, after the replay cache has
    /// been removed so the next full build starts clean.
    pub fn find_includes(
        &mut self,
        paths: &DiscoveryPaths,
        arch: &str,
        profile_libraries: &[String],
    ) -> Result<(), DiscoveryError> {
        match self.find_includes_inner(paths, arch, profile_libraries) {
            Err(e) if self.options.only_update_compilation_database && !e.is_structural() => {
                let _ = fs::remove_file(paths.build_path.join(INCLUDES_CACHE));
                debug!("discovery failed in best-effort mode: {}", e);
                self.logger.info(
                    "An error occurred detecting libraries: the compilation database may be incomplete or inaccurate",
                );
                Ok(())
            }
            other => other,
        }
    }

    fn find_includes_inner(
        &mut self,
        paths: &DiscoveryPaths,
        arch: &str,
        profile_libraries: &[String],
    ) -> Result<(), DiscoveryError> {
        let libraries_cache = paths.build_path.join(LIBRARIES_CACHE);
        if self.options.use_cached_libraries_resolution && libraries_cache.is_file() {
            let data = fs::read(&libraries_cache).map_err(|e| DiscoveryError::io(&libraries_cache, e))?;
            self.include_folders =
                serde_json::from_slice(&data).map_err(|source| DiscoveryError::Cache {
                    path: libraries_cache.clone(),
                    source,
                })?;
            self.imported_libraries = self
                .include_folders
                .iter()
                .filter_map(|folder| {
                    self.catalog
                        .libraries()
                        .iter()
                        .find(|lib| lib.source_dir == *folder)
                        .cloned()
                })
                .collect();
            if self.logger.verbose() {
                self.logger.info(format!(
                    "Using cached library discovery: {}",
                    libraries_cache.display()
                ));
            }
            return Ok(());
        }

        let cache_path = paths.build_path.join(INCLUDES_CACHE);
        let mut cache = DetectorCache::load(&cache_path).unwrap_or_else(|e| {
            warn!("ignoring discovery cache: {}", e);
            DetectorCache::new()
        });

        if let Err(e) = self.discover(&mut cache, paths, arch, profile_libraries) {
            let _ = fs::remove_file(&cache_path);
            return Err(e);
        }
        cache.save(&cache_path)?;

        for library in &self.imported_libraries {
            library.validate()?;
        }

        let data = serde_json::to_vec(&self.include_folders).map_err(|source| DiscoveryError::Cache {
            path: libraries_cache.clone(),
            source,
        })?;
        fs::write(&libraries_cache, data).map_err(|e| DiscoveryError::io(&libraries_cache, e))
    }

    fn discover(
        &mut self,
        cache: &mut DetectorCache,
        paths: &DiscoveryPaths,
        arch: &str,
        profile_libraries: &[String],
    ) -> Result<(), DiscoveryError> {
        self.append_include_folder(cache, &paths.core_path);
        if let Some(variant) = &paths.variant_path {
            self.append_include_folder(cache, variant);
        }

        let sketch = &paths.sketch_build_path;
        let mut queue = UnitQueue::new();
        queue.push(CompilationUnit::new(sketch, sketch, &paths.merged_sketch_file, None));
        queue_source_files(&mut queue, sketch, false, sketch, sketch, None)?;
        let src = sketch.join("src");
        if src.is_dir() {
            queue_source_files(&mut queue, &src, true, sketch, sketch, None)?;
        }

        for name in profile_libraries {
            let library = self
                .catalog
                .find_by_name(name)
                .ok_or_else(|| DiscoveryError::UnknownProfileLibrary { name: name.clone() })?;
            if self.imported_libraries.contains(&library) {
                continue;
            }
            self.import_library(cache, &mut queue, library, &paths.libraries_build_path)?;
        }

        while let Some(unit) = queue.pop() {
            self.find_includes_until_done(cache, &mut queue, unit, &paths.libraries_build_path, arch)?;
        }
        Ok(())
    }

    fn find_includes_until_done(
        &mut self,
        cache: &mut DetectorCache,
        queue: &mut UnitQueue,
        unit: CompilationUnit,
        libraries_build_path: &Path,
        arch: &str,
    ) -> Result<(), DiscoveryError> {
        let source_path = unit.source_path();
        let unchanged = obj_file_is_up_to_date(&source_path, &unit.object_path(), &unit.depfile_path())?;

        // Every pass but the last imports a library the catalog has not
        // given out yet, so the catalog size bounds the number of passes.
        let max_passes = self.catalog.len() + 1;
        let mut passes = 0;
        loop {
            passes += 1;
            if passes > max_passes {
                return Err(DiscoveryError::DidNotConverge {
                    source_file: source_path,
                    iterations: passes - 1,
                });
            }

            let mut includes = self.include_folders.clone();
            if let Some(extra) = unit.extra_include_path() {
                includes.push(extra.to_path_buf());
            }
            let task = self.preprocessor.task(&source_path, &includes)?;
            cache.expect(CacheEntry::compile(&unit, task.clone()));

            let mut first_result: Option<ProcessOutput> = None;
            let missing = match cache.peek() {
                Some(CacheEntry::MissingIncludeH { missing_include_h }) if unchanged => {
                    if passes == 1 && self.logger.verbose() {
                        self.logger.info(format!(
                            "Using cached library dependencies for file: {}",
                            source_path.display()
                        ));
                    }
                    missing_include_h.clone()
                }
                _ => {
                    let output = self.run_preprocessor(&source_path, &task)?;
                    let missing = if output.success {
                        String::new()
                    } else {
                        let found = find_missing_include(&output.stderr_lossy()).unwrap_or_default();
                        if found.is_empty() && self.logger.verbose() {
                            self.logger.info(format!(
                                "Error while detecting libraries included by {}",
                                source_path.display()
                            ));
                        }
                        found
                    };
                    first_result = Some(output);
                    missing
                }
            };

            cache.expect(CacheEntry::missing_include(&missing));
            if missing.is_empty() {
                return Ok(());
            }

            let Some(library) = self.resolve_library(&missing, arch) else {
                let output = match first_result.filter(|o| !o.success) {
                    Some(output) => output,
                    None => {
                        // The header came from the cache: rerun for a real diagnostic.
                        let output = self.run_preprocessor(&source_path, &task)?;
                        if output.success {
                            return Err(DiscoveryError::CacheInconsistency {
                                header: missing,
                                source_file: source_path,
                            });
                        }
                        output
                    }
                };
                return Err(DiscoveryError::UnresolvedHeader {
                    header: missing,
                    source_file: source_path,
                    diagnostics: output.stderr_lossy(),
                });
            };

            if self.imported_libraries.contains(&library) {
                return Err(DiscoveryError::NonMonotonicResolution {
                    header: missing,
                    library: library.name.clone(),
                });
            }
            self.import_library(cache, queue, library, libraries_build_path)?;
        }
    }

    /// Runs the preprocessor. Output without diagnostics on failure is fatal
    /// since there is nothing to look for a missing header in.
    fn run_preprocessor(
        &self,
        source_path: &Path,
        task: &PreprocessTask,
    ) -> Result<ProcessOutput, DiscoveryError> {
        let output = self
            .preprocessor
            .run(task)
            .map_err(|source| DiscoveryError::PreprocessorSpawn {
                path: source_path.to_path_buf(),
                source,
            })?;
        if self.logger.verbose() {
            self.logger.write_stdout(&output.stdout);
        }
        if !output.success && output.stderr.is_empty() {
            return Err(DiscoveryError::PreprocessorFailed {
                path: source_path.to_path_buf(),
                code: output.code,
            });
        }
        Ok(output)
    }

    /// Picks the library for `header`, or `None` when nothing provides it or
    /// a provider is already imported.
    fn resolve_library(&mut self, header: &str, arch: &str) -> Option<Arc<Library>> {
        let candidates = self.resolver.alternatives_for(header);
        if self.logger.verbose() {
            let names = candidates
                .iter()
                .map(|l| l.to_string())
                .collect::<Vec<_>>()
                .join(", ");
            self.logger.info(format!("Alternatives for {}: [{}]", header, names));
            self.logger.info(format!("ResolveLibrary({})", header));
            self.logger.info(format!("  -> candidates: [{}]", names));
        }

        if candidates.is_empty() {
            return None;
        }
        // An already imported provider means this header should have been
        // found; usually two libraries share a name.
        if candidates.iter().any(|c| self.imported_libraries.contains(c)) {
            return None;
        }

        let selected = self.resolver.resolve_for(header, arch)?;
        if let Some(other) = self
            .imported_libraries
            .iter()
            .find(|l| l.name == selected.name)
        {
            warn!(
                "library {} in {} has the same name as imported {}",
                selected.name,
                selected.install_dir.display(),
                other.install_dir.display()
            );
        }

        let not_used = candidates
            .iter()
            .filter(|c| **c != selected)
            .cloned()
            .collect();
        self.resolution_results.insert(
            header.to_string(),
            ResolutionResult {
                library: selected.clone(),
                not_used,
            },
        );
        Some(selected)
    }

    fn import_library(
        &mut self,
        cache: &mut DetectorCache,
        queue: &mut UnitQueue,
        library: Arc<Library>,
        libraries_build_path: &Path,
    ) -> Result<(), DiscoveryError> {
        self.imported_libraries.push(library.clone());
        self.append_include_folder(cache, &library.source_dir);

        if library.precompiled && library.precompiled_with_sources {
            if self.logger.verbose() {
                self.logger.info(format!(
                    "Skipping dependencies detection for precompiled library {}",
                    library.name
                ));
            }
            return Ok(());
        }
        let build_root = libraries_build_path.join(&library.dir_name);
        for dir in library.source_dirs() {
            queue_source_files(
                queue,
                &dir.dir,
                dir.recurse,
                &library.source_dir,
                &build_root,
                library.utility_dir.as_deref(),
            )?;
        }
        Ok(())
    }

    fn append_include_folder(&mut self, cache: &mut DetectorCache, folder: &Path) {
        self.include_folders.push(folder.to_path_buf());
        cache.expect(CacheEntry::added_include_path(folder));
    }

    /// Reports headers that more than one library could have provided: as a
    /// warning when the sketch failed to build, otherwise only when verbose.
    pub fn print_used_and_not_used_libraries(&self, sketch_error: bool) {
        if !sketch_error && !self.logger.verbose() {
            return;
        }
        let mut report = String::new();
        for (header, result) in &self.resolution_results {
            if result.not_used.is_empty() {
                continue;
            }
            report.push_str(&format!("Multiple libraries were found for \"{}\"\n", header));
            report.push_str(&format!("  Used: {}\n", result.library.install_dir.display()));
            for lib in &result.not_used {
                report.push_str(&format!("  Not used: {}\n", lib.install_dir.display()));
            }
        }
        let report = report.trim();
        if report.is_empty() {
            return;
        }
        if sketch_error {
            self.logger.warn(report);
        } else {
            self.logger.info(report);
        }
    }
}

fn queue_source_files(
    queue: &mut UnitQueue,
    folder: &Path,
    recurse: bool,
    source_root: &Path,
    build_root: &Path,
    extra_include_path: Option<&Path>,
) -> Result<(), DiscoveryError> {
    for file in find_files_in_folder(folder, recurse, SOURCE_EXTENSIONS)? {
        queue.push(CompilationUnit::new(source_root, build_root, &file, extra_include_path));
    }
    Ok(())
}
