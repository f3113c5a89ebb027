//! The compiler seam used by the scheduler.

use super::process::{CancellationToken, ProcessOutput, run_captured};
use super::recipe::{RecipeVars, Recipes, expand};
use crate::error::BuildError;
use std::path::{Path, PathBuf};

/// One source file to compile.
#[derive(Debug, Clone)]
pub struct CompileJob<'a> {
    pub source: &'a Path,
    pub object: &'a Path,
    pub depfile: &'a Path,
    pub includes: &'a [PathBuf],
}

/// Turns a job into a command line and runs it. Shared between workers.
pub trait Compiler: Sync {
    fn command(&self, job: &CompileJob<'_>) -> Result<Vec<String>, BuildError>;

    fn run(&self, args: &[String], cancel: &CancellationToken) -> Result<ProcessOutput, BuildError>;
}

/// Compiles with the per-extension recipes from `inox.toml`.
#[derive(Debug, Clone)]
pub struct RecipeCompiler {
    recipes: Recipes,
}

impl RecipeCompiler {
    pub fn new(recipes: Recipes) -> Self {
        Self { recipes }
    }
}

impl Compiler for RecipeCompiler {
    fn command(&self, job: &CompileJob<'_>) -> Result<Vec<String>, BuildError> {
        let template = self.recipes.for_source(job.source)?;
        Ok(expand(
            template,
            &RecipeVars {
                source_file: job.source,
                object_file: job.object,
                dep_file: job.depfile,
                includes: job.includes,
            },
        ))
    }

    fn run(&self, args: &[String], cancel: &CancellationToken) -> Result<ProcessOutput, BuildError> {
        run_captured(args, cancel).map_err(|source| BuildError::Spawn {
            program: args.first().cloned().unwrap_or_default(),
            source,
        })
    }
}
