//! Sketch loading and preparation.
//!
//! A sketch is a folder `Name/` holding `Name.ino`, optionally more `.ino`
//! or `.pde` files, and plain C/C++ sources (at the root or under `src/`).
//! Preparation merges the sketch files into one C++ translation unit and
//! copies everything else into the sketch build folder.

use anyhow::{Context, Result, bail};
use std::fs;
use std::path::{Path, PathBuf};

use crate::build::files::{HEADER_EXTENSIONS, SKETCH_EXTENSIONS, SOURCE_EXTENSIONS, find_files_in_folder};

#[derive(Debug, Clone)]
pub struct Sketch {
    pub name: String,
    pub folder: PathBuf,
    pub main_file: PathBuf,
    /// Other `.ino`/`.pde` files, in name order.
    pub other_sketch_files: Vec<PathBuf>,
    /// C/C++ sources and headers copied verbatim.
    pub additional_files: Vec<PathBuf>,
}

impl Sketch {
    pub fn load(folder: &Path) -> Result<Self> {
        if !folder.is_dir() {
            bail!("sketch folder {} does not exist", folder.display());
        }
        let name = folder
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .with_context(|| format!("Invalid sketch folder {}", folder.display()))?;

        let main_file = SKETCH_EXTENSIONS
            .iter()
            .map(|ext| folder.join(format!("{}.{}", name, ext)))
            .find(|p| p.is_file())
            .with_context(|| format!("main file missing from sketch: {}/{}.ino", folder.display(), name))?;

        let other_sketch_files = find_files_in_folder(folder, false, SKETCH_EXTENSIONS)?
            .into_iter()
            .filter(|p| *p != main_file)
            .collect();

        let mut exts: Vec<&str> = SOURCE_EXTENSIONS.to_vec();
        exts.extend_from_slice(HEADER_EXTENSIONS);
        let mut additional_files = find_files_in_folder(folder, false, &exts)?;
        let src = folder.join("src");
        if src.is_dir() {
            additional_files.extend(find_files_in_folder(&src, true, &exts)?);
        }

        Ok(Self {
            name,
            folder: folder.to_path_buf(),
            main_file,
            other_sketch_files,
            additional_files,
        })
    }

    /// File name of the merged translation unit.
    pub fn merged_file_name(&self) -> String {
        let main = self
            .main_file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| format!("{}.ino", self.name));
        format!("{}.cpp", main)
    }

    /// Main file first, then the others.
    pub fn sketch_files(&self) -> impl Iterator<Item = &PathBuf> {
        std::iter::once(&self.main_file).chain(&self.other_sketch_files)
    }

    /// The merged source of every sketch file, each preceded by a `#line`
    /// marker pointing back at the original.
    pub fn merge_sources(&self) -> Result<String> {
        let mut merged = String::new();
        let mut has_arduino_h = false;
        for file in self.sketch_files() {
            let text = fs::read_to_string(file)
                .with_context(|| format!("Failed to read sketch file {}", file.display()))?;
            has_arduino_h |= text.contains("#include <Arduino.h>") || text.contains("#include \"Arduino.h\"");
            merged.push_str(&format!("#line 1 {}\n", quote_path(file)));
            merged.push_str(&text);
            if !text.ends_with('\n') {
                merged.push('\n');
            }
        }
        if !has_arduino_h {
            merged.insert_str(0, "#include <Arduino.h>\n");
        }
        Ok(merged)
    }

    /// Writes the merged sketch and the additional files into `sketch_build`.
    /// Files are only rewritten when their content changed, so unchanged
    /// sources keep their modification time.
    pub fn prepare(&self, sketch_build: &Path) -> Result<PathBuf> {
        fs::create_dir_all(sketch_build)
            .with_context(|| format!("Failed to create {}", sketch_build.display()))?;

        let merged_path = sketch_build.join(self.merged_file_name());
        write_if_different(&merged_path, self.merge_sources()?.as_bytes())?;

        for file in &self.additional_files {
            let rel = file.strip_prefix(&self.folder).unwrap_or(file);
            let target = sketch_build.join(rel);
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
            let data = fs::read(file).with_context(|| format!("Failed to read {}", file.display()))?;
            write_if_different(&target, &data)?;
        }
        Ok(merged_path)
    }
}

fn quote_path(path: &Path) -> String {
    let text = path.to_string_lossy().replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{}\"", text)
}

/// Returns whether the file was written.
fn write_if_different(path: &Path, data: &[u8]) -> Result<bool> {
    if let Ok(current) = fs::read(path)
        && current == data
    {
        return Ok(false);
    }
    fs::write(path, data).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(true)
}
