//! Project configuration (`inox.toml`).

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::build::recipe::Recipes;

pub const CONFIG_FILE: &str = "inox.toml";

#[derive(Deserialize, Debug, Default)]
pub struct InoxConfig {
    #[serde(default)]
    pub sketch: SketchConfig,
    pub platform: PlatformConfig,
    #[serde(default)]
    pub libraries: LibrariesConfig,
    #[serde(default)]
    pub build: BuildConfig,
    #[serde(default)]
    pub recipes: Recipes,
}

#[derive(Deserialize, Debug, Default)]
pub struct SketchConfig {
    pub path: Option<PathBuf>,
}

#[derive(Deserialize, Debug, Default)]
pub struct PlatformConfig {
    pub arch: String,
    pub core: PathBuf,
    pub variant: Option<PathBuf>,
    /// Libraries bundled with the platform.
    pub libraries: Option<PathBuf>,
    /// Libraries of the platform this one references.
    pub referenced_libraries: Option<PathBuf>,
}

#[derive(Deserialize, Debug, Default)]
pub struct LibrariesConfig {
    #[serde(default)]
    pub builtin: Vec<PathBuf>,
    #[serde(default)]
    pub user: Vec<PathBuf>,
    /// Single-library folders that always win resolution.
    #[serde(default)]
    pub unmanaged: Vec<PathBuf>,
    /// Libraries attached to the project before discovery.
    #[serde(default)]
    pub profile: Vec<String>,
}

#[derive(Deserialize, Debug)]
pub struct BuildConfig {
    #[serde(default = "default_build_path")]
    pub path: PathBuf,
    /// 0 uses every available CPU.
    #[serde(default)]
    pub jobs: usize,
    #[serde(default)]
    pub use_cached_libraries_resolution: bool,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            path: default_build_path(),
            jobs: 0,
            use_cached_libraries_resolution: false,
        }
    }
}

fn default_build_path() -> PathBuf {
    PathBuf::from("build")
}

impl InoxConfig {
    pub fn parse(text: &str) -> Result<Self> {
        toml::from_str(text)
            .context("Failed to parse inox.toml - check for syntax errors (missing quotes, brackets)")
    }

    /// Makes every configured path absolute: `~/` is the home folder and
    /// relative paths start at `base`.
    pub fn resolve_paths(&mut self, base: &Path) {
        let fix = |p: &mut PathBuf| *p = resolve_path(p, base);
        self.sketch.path = Some(resolve_path(
            self.sketch.path.as_deref().unwrap_or(Path::new(".")),
            base,
        ));
        fix(&mut self.platform.core);
        self.platform.variant.iter_mut().for_each(fix);
        self.platform.libraries.iter_mut().for_each(fix);
        self.platform.referenced_libraries.iter_mut().for_each(fix);
        self.libraries.builtin.iter_mut().for_each(fix);
        self.libraries.user.iter_mut().for_each(fix);
        self.libraries.unmanaged.iter_mut().for_each(fix);
        fix(&mut self.build.path);
    }

    /// The sketch folder; only meaningful after [`resolve_paths`](Self::resolve_paths).
    pub fn sketch_dir(&self) -> &Path {
        self.sketch.path.as_deref().unwrap_or(Path::new("."))
    }
}

fn resolve_path(path: &Path, base: &Path) -> PathBuf {
    if let Ok(rest) = path.strip_prefix("~")
        && let Some(home) = dirs::home_dir()
    {
        return home.join(rest);
    }
    if path.is_absolute() {
        path.to_path_buf()
    } else if path == Path::new(".") {
        base.to_path_buf()
    } else {
        base.join(path)
    }
}

/// Loads `inox.toml` from `dir` with paths resolved against `dir`.
pub fn load_config(dir: &Path) -> Result<InoxConfig> {
    let path = dir.join(CONFIG_FILE);
    if !path.exists() {
        return Err(anyhow::anyhow!(
            "{} not found in {}.\n\n\
            Tip: describe the platform core, libraries and recipes in an inox.toml next to the sketch.",
            CONFIG_FILE,
            dir.display()
        ));
    }
    let text = fs::read_to_string(&path).context("Failed to read inox.toml - check file permissions")?;
    let mut config = InoxConfig::parse(&text)?;
    let base = dir
        .canonicalize()
        .with_context(|| format!("Failed to resolve {}", dir.display()))?;
    config.resolve_paths(&base);
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[platform]
arch = "avr"
core = "/opt/avr/cores/arduino"
variant = "variants/standard"

[libraries]
user = ["~/Arduino/libraries"]
unmanaged = ["../MyLib"]
profile = ["Servo"]

[build]
jobs = 4

[recipes]
cpp = ["avr-g++", "-c", "{includes}", "{source_file}", "-o", "{object_file}"]
S = ["avr-gcc", "-c", "{source_file}", "-o", "{object_file}"]
"#;

    #[test]
    fn test_parse_sample() {
        let config = InoxConfig::parse(SAMPLE).unwrap();
        assert_eq!(config.platform.arch, "avr");
        assert_eq!(config.libraries.profile, vec!["Servo".to_string()]);
        assert_eq!(config.build.jobs, 4);
        assert_eq!(config.build.path, PathBuf::from("build"));
        assert!(!config.build.use_cached_libraries_resolution);
        assert_eq!(config.recipes.cpp[0], "avr-g++");
        assert_eq!(config.recipes.asm[0], "avr-gcc");
        assert!(config.recipes.c.is_empty());
    }

    #[test]
    fn test_missing_platform_is_an_error() {
        assert!(InoxConfig::parse("[build]\njobs = 1\n").is_err());
    }

    #[test]
    fn test_resolve_paths() {
        let mut config = InoxConfig::parse(SAMPLE).unwrap();
        config.resolve_paths(Path::new("/work/Blink"));

        assert_eq!(config.sketch_dir(), Path::new("/work/Blink"));
        assert_eq!(config.platform.core, PathBuf::from("/opt/avr/cores/arduino"));
        assert_eq!(
            config.platform.variant,
            Some(PathBuf::from("/work/Blink/variants/standard"))
        );
        assert_eq!(config.libraries.unmanaged[0], PathBuf::from("/work/Blink/../MyLib"));
        assert_eq!(config.build.path, PathBuf::from("/work/Blink/build"));
        if let Some(home) = dirs::home_dir() {
            assert_eq!(config.libraries.user[0], home.join("Arduino/libraries"));
        }
    }

    #[test]
    fn test_load_config_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_config(dir.path()).unwrap_err();
        assert!(err.to_string().contains("inox.toml not found"));
    }

    #[test]
    fn test_load_config_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(CONFIG_FILE), SAMPLE).unwrap();
        let config = load_config(dir.path()).unwrap();
        assert!(config.build.path.is_absolute());
        assert!(config.build.path.ends_with("build"));
    }
}
