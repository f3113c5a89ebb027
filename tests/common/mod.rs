//! Scratch projects and fake tools shared by the integration tests.

#![allow(dead_code)]

use inox::build::compiler::{CompileJob, Compiler};
use inox::build::preprocess::{PreprocessTask, Preprocessor};
use inox::build::process::{CancellationToken, ProcessOutput};
use inox::config::InoxConfig;
use inox::error::BuildError;
use std::cell::RefCell;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::TempDir;
use walkdir::WalkDir;

/// Follows `#include` lines through the `-I` folders like `gcc -E` would,
/// failing on the first header it cannot find.
#[derive(Default)]
pub struct FakePreprocessor {
    pub runs: RefCell<Vec<PathBuf>>,
    /// Fails on this file name without printing anything.
    pub fail_silently_on: Option<&'static str>,
}

impl FakePreprocessor {
    pub fn calls(&self) -> usize {
        self.runs.borrow().len()
    }
}

impl Preprocessor for FakePreprocessor {
    fn task(&self, source: &Path, includes: &[PathBuf]) -> Result<PreprocessTask, BuildError> {
        let mut args = vec!["fakecpp".to_string(), "-E".to_string()];
        args.extend(includes.iter().map(|i| format!("-I{}", i.display())));
        args.push(source.display().to_string());
        Ok(PreprocessTask { args })
    }

    fn run(&self, task: &PreprocessTask) -> std::io::Result<ProcessOutput> {
        let source = PathBuf::from(task.args.last().cloned().unwrap_or_default());
        self.runs.borrow_mut().push(source.clone());
        if self
            .fail_silently_on
            .is_some_and(|name| source.file_name().is_some_and(|f| f == name))
        {
            return Ok(ProcessOutput {
                args: task.args.clone(),
                success: false,
                code: Some(1),
                ..Default::default()
            });
        }
        let includes: Vec<PathBuf> = task
            .args
            .iter()
            .filter_map(|a| a.strip_prefix("-I"))
            .map(PathBuf::from)
            .collect();

        let mut seen = HashSet::new();
        let stderr = match scan(&source, &includes, &mut seen) {
            Some((file, header)) => format!(
                "{}:1:10: fatal error: {}: No such file or directory\n    1 | #include <{}>\n      |          ^~~~~~~~~\ncompilation terminated.\n",
                file.display(),
                header,
                header
            ),
            None => String::new(),
        };
        Ok(ProcessOutput {
            args: task.args.clone(),
            success: stderr.is_empty(),
            code: Some(if stderr.is_empty() { 0 } else { 1 }),
            stderr: stderr.into_bytes(),
            ..Default::default()
        })
    }
}

/// The first header reachable from `file` that no folder provides.
fn scan(file: &Path, includes: &[PathBuf], seen: &mut HashSet<PathBuf>) -> Option<(PathBuf, String)> {
    if !seen.insert(file.to_path_buf()) {
        return None;
    }
    let text = fs::read_to_string(file).ok()?;
    for line in text.lines() {
        let Some(rest) = line.trim().strip_prefix("#include") else {
            continue;
        };
        let header = rest.trim().trim_matches(|c| matches!(c, '<' | '>' | '"'));
        let local = file.parent().map(|p| p.join(header));
        let found = local
            .into_iter()
            .chain(includes.iter().map(|dir| dir.join(header)))
            .find(|p| p.is_file());
        match found {
            Some(path) => {
                if let Some(missing) = scan(&path, includes, seen) {
                    return Some(missing);
                }
            }
            None => return Some((file.to_path_buf(), header.to_string())),
        }
    }
    None
}

/// Writes the object and a `gcc -MMD` style depfile.
#[derive(Default)]
pub struct FakeCompiler {
    pub runs: AtomicUsize,
    pub fail_on: Option<&'static str>,
    pub compiled: Mutex<Vec<PathBuf>>,
}

impl FakeCompiler {
    pub fn calls(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }
}

impl Compiler for FakeCompiler {
    fn command(&self, job: &CompileJob<'_>) -> Result<Vec<String>, BuildError> {
        Ok(vec![
            "fakecc".to_string(),
            job.source.display().to_string(),
            job.object.display().to_string(),
            job.depfile.display().to_string(),
        ])
    }

    fn run(&self, args: &[String], _cancel: &CancellationToken) -> Result<ProcessOutput, BuildError> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        let source = PathBuf::from(&args[1]);
        self.compiled.lock().unwrap().push(source.clone());
        if self
            .fail_on
            .is_some_and(|name| source.file_name().is_some_and(|f| f == name))
        {
            return Ok(ProcessOutput {
                args: args.to_vec(),
                success: false,
                code: Some(1),
                stderr: format!("{}:1:1: error: expected ';'\n", source.display()).into_bytes(),
                ..Default::default()
            });
        }
        fs::write(&args[2], "obj").unwrap();
        fs::write(&args[3], format!("{}: {}\n", args[2], args[1])).unwrap();
        Ok(ProcessOutput {
            args: args.to_vec(),
            success: true,
            code: Some(0),
            ..Default::default()
        })
    }
}

/// A sketch, a core and a set of library folders in a temporary directory.
pub struct Project {
    pub root: TempDir,
}

impl Project {
    /// `Blink/Blink.ino` with `sketch_source`, a core with `Arduino.h` and
    /// empty libraries folders.
    pub fn new(sketch_source: &str) -> Self {
        let project = Self {
            root: tempfile::tempdir().unwrap(),
        };
        project.write("Blink/Blink.ino", sketch_source);
        project.write("core/Arduino.h", "#pragma once\n");
        project.write("core/main.cpp", "#include <Arduino.h>\nint main() { return 0; }\n");
        fs::create_dir_all(project.path("user")).unwrap();
        fs::create_dir_all(project.path("platform")).unwrap();
        project
    }

    pub fn path(&self, rel: &str) -> PathBuf {
        self.root.path().join(rel)
    }

    pub fn write(&self, rel: &str, content: &str) {
        let path = self.path(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    /// A library with `library.properties` and a `src/` folder under `folder`.
    pub fn library(&self, folder: &str, name: &str, header: &str, source: &str) {
        self.write(
            &format!("{}/library.properties", folder),
            &format!(
                "name={}\nversion=1.0.0\nauthor=Someone\nmaintainer=Someone <a@b.c>\nsentence=Test\narchitectures=*\n",
                name
            ),
        );
        self.write(&format!("{}/src/{}", folder, header), "#pragma once\n");
        let stem = header.trim_end_matches(".h");
        self.write(&format!("{}/src/{}.cpp", folder, stem), source);
    }

    pub fn config(&self, extra: &str) -> InoxConfig {
        let toml = format!(
            r#"
[sketch]
path = "Blink"

[platform]
arch = "avr"
core = "core"
libraries = "platform"

[libraries]
user = ["user"]
{}

[build]
path = "build"
"#,
            extra
        );
        let mut config = InoxConfig::parse(&toml).unwrap();
        config.resolve_paths(self.root.path());
        config
    }

    pub fn build_path(&self, rel: &str) -> PathBuf {
        self.path("build").join(rel)
    }

    /// Ages every input so the objects written by the fake compiler are
    /// strictly newer than their sources.
    pub fn age_sources(&self) {
        let old = filetime::FileTime::from_unix_time(1_000_000_000, 0);
        for entry in WalkDir::new(self.root.path()).into_iter().filter_map(|e| e.ok()) {
            let path = entry.path();
            let is_output = path
                .extension()
                .is_some_and(|e| e == "o" || e == "d" || e == "cache" || e == "json");
            if entry.file_type().is_file() && !is_output {
                filetime::set_file_mtime(path, old).unwrap();
            }
        }
    }
}
