//! The preprocessor seam used by library discovery.
//!
//! Discovery only needs to know whether a translation unit preprocesses
//! cleanly and, if not, what the tool printed. The trait keeps the real
//! compiler out of the detector so tests can drive it with a fake.

use super::process::{CancellationToken, ProcessOutput, STDERR_LIMIT, run_captured_with_limit};
use super::recipe::{NULL_SINK, RecipeVars, Recipes, expand};
use crate::error::BuildError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// A fully expanded preprocessor command line.
///
/// Recorded in the discovery cache, so a changed command line (new include
/// folder, edited recipe) invalidates the cached answers that follow it.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PreprocessTask {
    pub args: Vec<String>,
}

pub trait Preprocessor {
    /// Builds the command that preprocesses `source` with `includes`.
    fn task(&self, source: &Path, includes: &[PathBuf]) -> Result<PreprocessTask, BuildError>;

    /// Runs a task. `Err` means the tool could not be started.
    fn run(&self, task: &PreprocessTask) -> std::io::Result<ProcessOutput>;
}

/// Runs the configured compiler with `-E`, discarding the output.
#[derive(Debug, Clone)]
pub struct GccPreprocessor {
    recipe: Vec<String>,
    cancel: CancellationToken,
}

impl GccPreprocessor {
    pub fn new(recipes: &Recipes, cancel: CancellationToken) -> Result<Self, BuildError> {
        Ok(Self {
            recipe: recipes.preprocess_recipe()?,
            cancel,
        })
    }
}

impl Preprocessor for GccPreprocessor {
    fn task(&self, source: &Path, includes: &[PathBuf]) -> Result<PreprocessTask, BuildError> {
        let vars = RecipeVars {
            source_file: source,
            object_file: Path::new(NULL_SINK),
            dep_file: Path::new(NULL_SINK),
            includes,
        };
        Ok(PreprocessTask {
            args: expand(&self.recipe, &vars),
        })
    }

    fn run(&self, task: &PreprocessTask) -> std::io::Result<ProcessOutput> {
        run_captured_with_limit(&task.args, &self.cancel, STDERR_LIMIT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_expands_includes_and_source() {
        let recipes = Recipes {
            cpp: ["g++", "-c", "-MMD", "{includes}", "{source_file}", "-o", "{object_file}"]
                .map(String::from)
                .to_vec(),
            ..Default::default()
        };
        let pp = GccPreprocessor::new(&recipes, CancellationToken::new()).unwrap();
        let task = pp
            .task(Path::new("/b/sketch/Blink.ino.cpp"), &[PathBuf::from("/core")])
            .unwrap();
        assert_eq!(task.args[0], "g++");
        assert!(task.args.contains(&"-E".to_string()));
        assert!(task.args.contains(&"-I/core".to_string()));
        assert!(task.args.contains(&"/b/sketch/Blink.ino.cpp".to_string()));
        assert_eq!(task.args.last().map(String::as_str), Some(NULL_SINK));
    }

    #[test]
    fn test_without_cpp_recipe_fails() {
        assert!(GccPreprocessor::new(&Recipes::default(), CancellationToken::new()).is_err());
    }
}
