//! Parallel compilation of a source folder.
//!
//! The caller thread enumerates sources and feeds them one at a time through
//! a rendezvous channel to a fixed set of workers on a rayon pool. Once a job
//! fails no new job is handed out, but jobs already running finish normally.
//! Results come back over a second channel; the first error received wins.

use super::compdb::CompilationDatabase;
use super::compiler::{CompileJob, Compiler};
use super::files::{SOURCE_EXTENSIONS, find_files_in_folder};
use super::logger::BuildLogger;
use super::process::{CancellationToken, printable_command};
use super::staleness::obj_file_is_up_to_date;
use crate::error::BuildError;
use crossbeam::channel;
use indicatif::ProgressBar;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

pub struct Scheduler<'a, C: Compiler> {
    compiler: &'a C,
    logger: &'a BuildLogger,
    jobs: usize,
    cancel: CancellationToken,
    compdb: Option<&'a CompilationDatabase>,
    only_update_compilation_database: bool,
}

impl<'a, C: Compiler> Scheduler<'a, C> {
    pub fn new(compiler: &'a C, logger: &'a BuildLogger) -> Self {
        Self {
            compiler,
            logger,
            jobs: 0,
            cancel: CancellationToken::new(),
            compdb: None,
            only_update_compilation_database: false,
        }
    }

    /// Number of parallel jobs; `0` uses every available CPU.
    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_compilation_database(mut self, compdb: &'a CompilationDatabase) -> Self {
        self.compdb = Some(compdb);
        self
    }

    /// Record commands without running the compiler.
    pub fn only_update_compilation_database(mut self, enabled: bool) -> Self {
        self.only_update_compilation_database = enabled;
        self
    }

    fn worker_count(&self) -> usize {
        if self.jobs > 0 {
            return self.jobs;
        }
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    }

    /// Compiles every eligible source under `source_dir` into `build_dir`,
    /// returning the object files in sorted order.
    pub fn compile_all(
        &self,
        source_dir: &Path,
        build_dir: &Path,
        recurse: bool,
        includes: &[PathBuf],
    ) -> Result<Vec<PathBuf>, BuildError> {
        let sources = find_files_in_folder(source_dir, recurse, SOURCE_EXTENSIONS)?;
        if sources.is_empty() {
            return Ok(Vec::new());
        }

        let workers = self.worker_count().min(sources.len());
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .build()
            .map_err(|e| BuildError::ThreadPool(e.to_string()))?;

        let pb = self.logger.progress(sources.len());
        pb.set_message("Compiling...");

        let failed = AtomicBool::new(false);
        let (job_tx, job_rx) = channel::bounded::<PathBuf>(0);
        let (result_tx, result_rx) = channel::unbounded::<Result<PathBuf, BuildError>>();

        pool.in_place_scope(|scope| {
            for _ in 0..workers {
                let job_rx = job_rx.clone();
                let result_tx = result_tx.clone();
                let failed = &failed;
                let pb = &pb;
                scope.spawn(move |_| {
                    for source in job_rx.iter() {
                        // Jobs handed out after a failure or cancellation are dropped unstarted.
                        if failed.load(Ordering::SeqCst) || self.cancel.is_cancelled() {
                            continue;
                        }
                        let result = self.compile_file(&source, source_dir, build_dir, includes, pb);
                        if result.is_err() {
                            failed.store(true, Ordering::SeqCst);
                        }
                        pb.inc(1);
                        if result_tx.send(result).is_err() {
                            break;
                        }
                    }
                });
            }
            drop(job_rx);

            for source in sources {
                if failed.load(Ordering::SeqCst) || self.cancel.is_cancelled() {
                    break;
                }
                if job_tx.send(source).is_err() {
                    break;
                }
            }
            drop(job_tx);
        });
        drop(result_tx);
        pb.finish_and_clear();

        let mut objects = Vec::new();
        for result in result_rx.iter() {
            objects.push(result?);
        }
        if self.cancel.is_cancelled() {
            return Err(BuildError::Cancelled);
        }
        objects.sort();
        Ok(objects)
    }

    fn compile_file(
        &self,
        source: &Path,
        source_dir: &Path,
        build_dir: &Path,
        includes: &[PathBuf],
        pb: &ProgressBar,
    ) -> Result<PathBuf, BuildError> {
        let relative = source.strip_prefix(source_dir).unwrap_or(source);
        let object = build_dir.join(with_suffix(relative, ".o"));
        let depfile = build_dir.join(with_suffix(relative, ".d"));
        if let Some(parent) = object.parent() {
            fs::create_dir_all(parent).map_err(|e| BuildError::io(parent, e))?;
        }

        let up_to_date = obj_file_is_up_to_date(source, &object, &depfile)?;
        let args = self.compiler.command(&CompileJob {
            source,
            object: &object,
            depfile: &depfile,
            includes,
        })?;
        if let Some(compdb) = self.compdb {
            compdb.add(source, &args);
        }

        if self.only_update_compilation_database {
            return Ok(object);
        }
        if up_to_date {
            if self.logger.verbose() {
                pb.suspend(|| {
                    self.logger
                        .info(format!("Using previously compiled file: {}", object.display()))
                });
            }
            return Ok(object);
        }

        pb.set_message(format!("Compiling {}", relative.display()));
        if self.logger.verbose() {
            pb.suspend(|| self.logger.info(printable_command(&args)));
        }

        let output = self.compiler.run(&args, &self.cancel)?;
        if output.cancelled {
            return Err(BuildError::Cancelled);
        }
        pb.suspend(|| {
            if self.logger.verbose() {
                self.logger.write_stdout(&output.stdout);
            }
            self.logger.write_stderr(&output.stderr);
        });
        if !output.success {
            return Err(BuildError::CompileFailed {
                source_file: source.to_path_buf(),
                code: output.code,
            });
        }
        Ok(object)
    }
}

/// `main.cpp` + `.o` -> `main.cpp.o`, keeping any parent folders.
fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name: OsString = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::process::ProcessOutput;
    use std::sync::Mutex;

    /// Writes the object and a matching depfile, like `gcc -MMD` would.
    struct FakeCompiler {
        fail_on: Option<&'static str>,
        ran: Mutex<Vec<PathBuf>>,
    }

    impl FakeCompiler {
        fn new(fail_on: Option<&'static str>) -> Self {
            Self {
                fail_on,
                ran: Mutex::new(Vec::new()),
            }
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
            let source = PathBuf::from(&args[1]);
            self.ran.lock().unwrap().push(source.clone());
            if self
                .fail_on
                .is_some_and(|name| source.file_name().is_some_and(|f| f == name))
            {
                return Ok(ProcessOutput {
                    args: args.to_vec(),
                    success: false,
                    code: Some(1),
                    stderr: b"error: boom\n".to_vec(),
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

    fn sources(root: &Path, names: &[&str]) {
        for name in names {
            let path = root.join(name);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, "int x;\n").unwrap();
        }
    }

    #[test]
    fn test_compile_all_sorted_objects() {
        let src = tempfile::tempdir().unwrap();
        let build = tempfile::tempdir().unwrap();
        sources(src.path(), &["z.cpp", "a.c", "nested/m.cpp"]);

        let compiler = FakeCompiler::new(None);
        let logger = BuildLogger::silent();
        let objects = Scheduler::new(&compiler, &logger)
            .with_jobs(3)
            .compile_all(src.path(), build.path(), true, &[])
            .unwrap();

        assert_eq!(
            objects,
            vec![
                build.path().join("a.c.o"),
                build.path().join("nested").join("m.cpp.o"),
                build.path().join("z.cpp.o"),
            ]
        );
    }

    #[test]
    fn test_second_run_skips_up_to_date_objects() {
        let src = tempfile::tempdir().unwrap();
        let build = tempfile::tempdir().unwrap();
        sources(src.path(), &["a.cpp", "b.cpp"]);
        for name in ["a.cpp", "b.cpp"] {
            filetime::set_file_mtime(
                src.path().join(name),
                filetime::FileTime::from_unix_time(1_000_000_000, 0),
            )
            .unwrap();
        }

        let logger = BuildLogger::silent();
        let first = FakeCompiler::new(None);
        Scheduler::new(&first, &logger)
            .compile_all(src.path(), build.path(), false, &[])
            .unwrap();
        assert_eq!(first.ran.lock().unwrap().len(), 2);

        let second = FakeCompiler::new(None);
        let objects = Scheduler::new(&second, &logger)
            .compile_all(src.path(), build.path(), false, &[])
            .unwrap();
        assert_eq!(objects.len(), 2);
        assert!(second.ran.lock().unwrap().is_empty());
    }

    #[test]
    fn test_failure_is_reported() {
        let src = tempfile::tempdir().unwrap();
        let build = tempfile::tempdir().unwrap();
        sources(src.path(), &["a.cpp", "bad.cpp", "c.cpp", "d.cpp"]);

        let compiler = FakeCompiler::new(Some("bad.cpp"));
        let logger = BuildLogger::silent();
        let err = Scheduler::new(&compiler, &logger)
            .with_jobs(1)
            .compile_all(src.path(), build.path(), false, &[])
            .unwrap_err();

        match err {
            BuildError::CompileFailed { source_file, code } => {
                assert_eq!(source_file, src.path().join("bad.cpp"));
                assert_eq!(code, Some(1));
            }
            other => panic!("unexpected error: {}", other),
        }
        // With a single worker nothing after the failure may start, not even
        // the job that was already waiting in the channel.
        let ran = compiler.ran.lock().unwrap();
        assert_eq!(*ran, vec![src.path().join("a.cpp"), src.path().join("bad.cpp")]);
    }

    #[test]
    fn test_compdb_only_does_not_run_compiler() {
        let src = tempfile::tempdir().unwrap();
        let build = tempfile::tempdir().unwrap();
        sources(src.path(), &["a.cpp"]);

        let compiler = FakeCompiler::new(None);
        let logger = BuildLogger::silent();
        let compdb = CompilationDatabase::new(src.path());
        let objects = Scheduler::new(&compiler, &logger)
            .with_compilation_database(&compdb)
            .only_update_compilation_database(true)
            .compile_all(src.path(), build.path(), false, &[])
            .unwrap();

        assert_eq!(objects, vec![build.path().join("a.cpp.o")]);
        assert!(compiler.ran.lock().unwrap().is_empty());
        assert_eq!(compdb.commands().len(), 1);
    }

    #[test]
    fn test_cancelled_build_returns_cancelled() {
        let src = tempfile::tempdir().unwrap();
        let build = tempfile::tempdir().unwrap();
        sources(src.path(), &["a.cpp", "b.cpp"]);

        let compiler = FakeCompiler::new(None);
        let logger = BuildLogger::silent();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = Scheduler::new(&compiler, &logger)
            .with_cancellation(cancel)
            .compile_all(src.path(), build.path(), false, &[])
            .unwrap_err();
        assert!(matches!(err, BuildError::Cancelled));
        assert!(compiler.ran.lock().unwrap().is_empty());
    }

    #[test]
    fn test_empty_folder() {
        let src = tempfile::tempdir().unwrap();
        let build = tempfile::tempdir().unwrap();
        let compiler = FakeCompiler::new(None);
        let logger = BuildLogger::silent();
        let objects = Scheduler::new(&compiler, &logger)
            .compile_all(src.path(), build.path(), true, &[])
            .unwrap();
        assert!(objects.is_empty());
    }
}
