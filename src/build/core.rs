use super::compdb::CompilationDatabase;
use super::compiler::{Compiler, RecipeCompiler};
use super::feedback::FeedbackAnalyzer;
use super::logger::BuildLogger;
use super::preprocess::{GccPreprocessor, Preprocessor};
use super::process::CancellationToken;
use super::scheduler::Scheduler;
use crate::config::InoxConfig;
use crate::detector::{DetectorOptions, DiscoveryPaths, LibrariesDetector, ResolutionResult};
use crate::library::catalog::LibrariesDir;
use crate::library::{Library, LibraryCatalog, LibraryLocation, LibraryResolver};
use crate::sketch::Sketch;
use anyhow::{Context, Result};
use colored::*;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

/// Command-line switches layered over `inox.toml`.
#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    /// Overrides `[build].jobs`.
    pub jobs: Option<usize>,
    pub verbose: bool,
    pub quiet: bool,
    pub only_update_compilation_database: bool,
    pub use_cached_libraries: bool,
}

impl BuildOptions {
    pub fn logger(&self) -> BuildLogger {
        BuildLogger::new(self.verbose, self.quiet)
    }

    fn detector_options(&self, config: &InoxConfig) -> DetectorOptions {
        DetectorOptions {
            use_cached_libraries_resolution: self.use_cached_libraries
                || config.build.use_cached_libraries_resolution,
            only_update_compilation_database: self.only_update_compilation_database,
        }
    }
}

/// What discovery decided for a sketch.
#[derive(Debug, Clone, Default)]
pub struct DiscoveryReport {
    pub include_folders: Vec<PathBuf>,
    pub imported_libraries: Vec<Arc<Library>>,
    pub resolution_results: BTreeMap<String, ResolutionResult>,
}

#[derive(Debug, Clone, Default)]
pub struct BuildSummary {
    pub discovery: DiscoveryReport,
    /// Object files of the sketch, libraries and core, in that order.
    pub objects: Vec<PathBuf>,
}

/// Build folder layout.
struct BuildLayout {
    build: PathBuf,
    sketch: PathBuf,
    libraries: PathBuf,
    core: PathBuf,
}

impl BuildLayout {
    fn new(build: &Path) -> Self {
        Self {
            build: build.to_path_buf(),
            sketch: build.join("sketch"),
            libraries: build.join("libraries"),
            core: build.join("core"),
        }
    }

    fn discovery_paths(&self, config: &InoxConfig, sketch: &Sketch) -> DiscoveryPaths {
        DiscoveryPaths {
            build_path: self.build.clone(),
            core_path: config.platform.core.clone(),
            variant_path: config.platform.variant.clone(),
            sketch_build_path: self.sketch.clone(),
            merged_sketch_file: sketch.merged_file_name(),
            libraries_build_path: self.libraries.clone(),
        }
    }
}

/// The library folders of `config`, least to most local.
pub fn libraries_dirs(config: &InoxConfig) -> Vec<LibrariesDir> {
    let mut dirs = Vec::new();
    for dir in &config.libraries.builtin {
        dirs.push(LibrariesDir::new(dir, LibraryLocation::IdeBuiltIn));
    }
    if let Some(dir) = &config.platform.referenced_libraries {
        dirs.push(LibrariesDir::new(dir, LibraryLocation::ReferencedPlatformBuiltIn));
    }
    if let Some(dir) = &config.platform.libraries {
        dirs.push(LibrariesDir::new(dir, LibraryLocation::PlatformBuiltIn));
    }
    for dir in &config.libraries.user {
        dirs.push(LibrariesDir::new(dir, LibraryLocation::User));
    }
    for dir in &config.libraries.unmanaged {
        dirs.push(LibrariesDir::single(dir, LibraryLocation::Unmanaged));
    }
    dirs
}

/// Scans every configured libraries folder.
pub fn load_catalog(config: &InoxConfig, logger: &BuildLogger) -> LibraryCatalog {
    let (catalog, warnings) = LibraryCatalog::load(&libraries_dirs(config));
    for warning in warnings {
        logger.warn(warning);
    }
    catalog
}

// --- COMMAND: Discover ---
pub fn discover_project(config: &InoxConfig, options: &BuildOptions) -> Result<DiscoveryReport> {
    let preprocessor = GccPreprocessor::new(&config.recipes, CancellationToken::new())
        .context("Invalid [recipes] in inox.toml")?;
    discover_with(config, options, &preprocessor)
}

/// Prepares the sketch and runs discovery with `preprocessor`.
pub fn discover_with<P: Preprocessor>(
    config: &InoxConfig,
    options: &BuildOptions,
    preprocessor: &P,
) -> Result<DiscoveryReport> {
    let logger = options.logger();

    // 1. Load Sketch & Catalog
    let sketch = Sketch::load(config.sketch_dir())?;
    let catalog = load_catalog(config, &logger);
    let resolver = LibraryResolver::new(&catalog);

    // 2. Prepare Sketch
    let layout = BuildLayout::new(&config.build.path);
    sketch.prepare(&layout.sketch)?;

    // 3. Discover
    let mut detector = LibrariesDetector::new(
        &catalog,
        &resolver,
        preprocessor,
        &logger,
        options.detector_options(config),
    );
    run_discovery(&mut detector, config, &layout, &sketch)?;
    detector.print_used_and_not_used_libraries(false);
    Ok(report(&detector))
}

// --- CORE: Build Project ---
pub fn build_project(config: &InoxConfig, options: &BuildOptions) -> Result<BuildSummary> {
    let cancel = CancellationToken::new();
    let preprocessor = GccPreprocessor::new(&config.recipes, cancel.clone())
        .context("Invalid [recipes] in inox.toml")?;
    let compiler = RecipeCompiler::new(config.recipes.clone());
    build_with(config, options, &preprocessor, &compiler, cancel)
}

/// The whole pipeline with explicit tools: prepare, discover, compile.
pub fn build_with<P: Preprocessor, C: Compiler>(
    config: &InoxConfig,
    options: &BuildOptions,
    preprocessor: &P,
    compiler: &C,
    cancel: CancellationToken,
) -> Result<BuildSummary> {
    let start_time = Instant::now();
    let logger = options.logger();

    // 1. Load Sketch & Catalog
    let sketch = Sketch::load(config.sketch_dir())?;
    let catalog = load_catalog(config, &logger);
    let resolver = LibraryResolver::new(&catalog);
    if options.verbose {
        logger.info(format!(
            "Sketch {} with {} installed libraries",
            sketch.name,
            catalog.len()
        ));
    }

    // 2. Prepare Sketch
    let layout = BuildLayout::new(&config.build.path);
    sketch.prepare(&layout.sketch)?;

    // 3. Discover Libraries
    let mut detector = LibrariesDetector::new(
        &catalog,
        &resolver,
        preprocessor,
        &logger,
        options.detector_options(config),
    );
    run_discovery(&mut detector, config, &layout, &sketch)?;
    let discovery = report(&detector);

    // 4. Compile
    let compdb = CompilationDatabase::new(&layout.build);
    let scheduler = Scheduler::new(compiler, &logger)
        .with_jobs(options.jobs.unwrap_or(config.build.jobs))
        .with_cancellation(cancel)
        .with_compilation_database(&compdb)
        .only_update_compilation_database(options.only_update_compilation_database);

    let objects = match compile_everything(&scheduler, &logger, config, &layout, &discovery) {
        Ok(objects) => objects,
        Err(e) => {
            detector.print_used_and_not_used_libraries(true);
            return Err(e);
        }
    };
    detector.print_used_and_not_used_libraries(false);

    // 5. Compilation Database
    let compdb_path = layout.build.join("compile_commands.json");
    compdb.save(&compdb_path)?;

    if options.only_update_compilation_database {
        logger.success(format!(
            "Compilation database written to {}",
            compdb_path.display()
        ));
    } else {
        logger.success(format!(
            "Compiled {} objects with {} libraries in {:.2?}",
            objects.len(),
            discovery.imported_libraries.len(),
            start_time.elapsed()
        ));
    }

    Ok(BuildSummary { discovery, objects })
}

fn run_discovery<P: Preprocessor>(
    detector: &mut LibrariesDetector<'_, P>,
    config: &InoxConfig,
    layout: &BuildLayout,
    sketch: &Sketch,
) -> Result<()> {
    let paths = layout.discovery_paths(config, sketch);
    fs::create_dir_all(&paths.build_path)
        .with_context(|| format!("Failed to create {}", paths.build_path.display()))?;

    if let Err(e) = detector.find_includes(&paths, &config.platform.arch, &config.libraries.profile) {
        detector.print_used_and_not_used_libraries(true);
        let message = e.to_string();
        if let Some(hint) = FeedbackAnalyzer::analyze(&message) {
            eprintln!("{} {}", "💡".yellow(), hint);
        }
        return Err(e).context("Library discovery failed");
    }
    Ok(())
}

fn report<P: Preprocessor>(detector: &LibrariesDetector<'_, P>) -> DiscoveryReport {
    DiscoveryReport {
        include_folders: detector.include_folders().to_vec(),
        imported_libraries: detector.imported_libraries().to_vec(),
        resolution_results: detector.resolution_results().clone(),
    }
}

fn compile_everything<C: Compiler>(
    scheduler: &Scheduler<'_, C>,
    logger: &BuildLogger,
    config: &InoxConfig,
    layout: &BuildLayout,
    discovery: &DiscoveryReport,
) -> Result<Vec<PathBuf>> {
    let includes = &discovery.include_folders;
    let mut objects = Vec::new();

    // Sketch
    objects.extend(
        scheduler
            .compile_all(&layout.sketch, &layout.sketch, false, includes)
            .context("Failed to compile the sketch")?,
    );
    let sketch_src = layout.sketch.join("src");
    if sketch_src.is_dir() {
        objects.extend(
            scheduler
                .compile_all(&sketch_src, &sketch_src, true, includes)
                .context("Failed to compile the sketch")?,
        );
    }

    // Libraries
    for library in &discovery.imported_libraries {
        if library.precompiled && library.precompiled_with_sources {
            if logger.verbose() {
                logger.info(format!("Skipping compilation of precompiled library {}", library.name));
            }
            continue;
        }
        let build_root = layout.libraries.join(&library.dir_name);
        let mut lib_includes = includes.clone();
        if let Some(utility) = &library.utility_dir {
            lib_includes.push(utility.clone());
        }
        for dir in library.source_dirs() {
            let rel = dir.dir.strip_prefix(&library.source_dir).unwrap_or(Path::new(""));
            objects.extend(
                scheduler
                    .compile_all(&dir.dir, &build_root.join(rel), dir.recurse, &lib_includes)
                    .with_context(|| format!("Failed to compile library {}", library.name))?,
            );
        }
    }

    // Core & Variant
    objects.extend(
        scheduler
            .compile_all(&config.platform.core, &layout.core, true, includes)
            .context("Failed to compile the core")?,
    );
    if let Some(variant) = &config.platform.variant {
        objects.extend(
            scheduler
                .compile_all(variant, &layout.core.join("variant"), false, includes)
                .context("Failed to compile the variant")?,
        );
    }

    Ok(objects)
}
