//! Compile recipes: per-extension command templates from `inox.toml`.
//!
//! A recipe is an argument vector where some arguments contain placeholders:
//!
//! - `{source_file}`, `{object_file}`, `{dep_file}` are replaced in place
//! - `{includes}` as a whole argument expands to one `-I<dir>` per folder

use crate::error::BuildError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[cfg(windows)]
pub const NULL_SINK: &str = "nul";
#[cfg(not(windows))]
pub const NULL_SINK: &str = "/dev/null";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipes {
    #[serde(default)]
    pub c: Vec<String>,
    #[serde(default)]
    pub cpp: Vec<String>,
    #[serde(default, rename = "S")]
    pub asm: Vec<String>,
    /// Optional explicit preprocessor recipe. Derived from `cpp` when empty.
    #[serde(default)]
    pub preprocess: Vec<String>,
}

/// Values substituted into a recipe.
#[derive(Debug, Clone, Copy)]
pub struct RecipeVars<'a> {
    pub source_file: &'a Path,
    pub object_file: &'a Path,
    pub dep_file: &'a Path,
    pub includes: &'a [PathBuf],
}

impl Recipes {
    /// Picks the recipe for a source file by extension.
    pub fn for_source(&self, source: &Path) -> Result<&[String], BuildError> {
        let ext = source
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();
        let (name, recipe) = match ext {
            "c" => ("c", &self.c),
            "cpp" | "cc" | "cxx" => ("cpp", &self.cpp),
            "S" => ("S", &self.asm),
            other => {
                return Err(BuildError::MissingRecipe {
                    extension: other.to_string(),
                });
            }
        };
        if recipe.is_empty() {
            return Err(BuildError::EmptyRecipe {
                name: name.to_string(),
            });
        }
        Ok(recipe)
    }

    /// The recipe used to run the preprocessor during library discovery.
    ///
    /// Without an explicit `preprocess` recipe, the `cpp` recipe is turned
    /// into a preprocess-only run writing to the null sink: dependency-file
    /// generation is dropped and `-w -x c++ -E -CC` is inserted after the
    /// program.
    pub fn preprocess_recipe(&self) -> Result<Vec<String>, BuildError> {
        if !self.preprocess.is_empty() {
            return Ok(self.preprocess.clone());
        }
        let Some((program, rest)) = self.cpp.split_first() else {
            return Err(BuildError::EmptyRecipe {
                name: "cpp".to_string(),
            });
        };

        let mut recipe = vec![program.clone()];
        recipe.extend(["-w", "-x", "c++", "-E", "-CC"].map(String::from));

        let mut args = rest.iter();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "-MMD" | "-MD" | "-MP" => {}
                "-MF" | "-MT" => {
                    args.next();
                }
                _ => recipe.push(arg.replace("{object_file}", NULL_SINK)),
            }
        }
        Ok(recipe)
    }
}

/// Substitutes placeholders in `template`.
pub fn expand(template: &[String], vars: &RecipeVars<'_>) -> Vec<String> {
    let mut out = Vec::with_capacity(template.len() + vars.includes.len());
    for arg in template {
        if arg == "{includes}" {
            out.extend(vars.includes.iter().map(|dir| format!("-I{}", dir.display())));
            continue;
        }
        let mut expanded = arg
            .replace("{source_file}", &vars.source_file.to_string_lossy())
            .replace("{object_file}", &vars.object_file.to_string_lossy())
            .replace("{dep_file}", &vars.dep_file.to_string_lossy());
        if expanded.contains("{includes}") {
            let joined = vars
                .includes
                .iter()
                .map(|dir| format!("-I{}", dir.display()))
                .collect::<Vec<_>>()
                .join(" ");
            expanded = expanded.replace("{includes}", &joined);
        }
        out.push(expanded);
    }
    out
}
