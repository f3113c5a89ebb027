//! Build output routing.
//!
//! Compile jobs run in parallel, so tool output is captured per job and
//! flushed here in a single locked write.

use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use std::io::Write;
use std::sync::Once;

static TRACING_INIT: Once = Once::new();

/// Initialize tracing for engine decisions (cache hits, resolver scores,
/// staleness reasons).
///
/// Enable with `RUST_LOG=inox=debug` or `RUST_LOG=inox=trace`.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::{EnvFilter, fmt, prelude::*};

        if std::env::var("RUST_LOG").is_ok() {
            let filter = EnvFilter::from_default_env();
            tracing_subscriber::registry()
                .with(fmt::layer().with_writer(std::io::stderr).with_target(true))
                .with(filter)
                .init();
        }
    });
}

#[derive(Debug, Clone, Default)]
pub struct BuildLogger {
    verbose: bool,
    quiet: bool,
}

impl BuildLogger {
    pub fn new(verbose: bool, quiet: bool) -> Self {
        Self { verbose, quiet }
    }

    /// A logger that prints nothing; used by tests and benchmarks.
    pub fn silent() -> Self {
        Self {
            verbose: false,
            quiet: true,
        }
    }

    pub fn verbose(&self) -> bool {
        self.verbose
    }

    pub fn quiet(&self) -> bool {
        self.quiet
    }

    pub fn info(&self, msg: impl AsRef<str>) {
        let msg = msg.as_ref();
        if self.quiet || msg.is_empty() {
            return;
        }
        println!("{} {}", "→".dimmed(), msg);
    }

    pub fn warn(&self, msg: impl AsRef<str>) {
        let msg = msg.as_ref();
        if msg.is_empty() {
            return;
        }
        eprintln!("{} {}", "!".yellow(), msg);
    }

    pub fn success(&self, msg: impl AsRef<str>) {
        if self.quiet {
            return;
        }
        println!("{} {}", "✓".green(), msg.as_ref());
    }

    pub fn write_stdout(&self, data: &[u8]) {
        if self.quiet || data.is_empty() {
            return;
        }
        let stdout = std::io::stdout();
        let mut lock = stdout.lock();
        let _ = lock.write_all(data);
        let _ = lock.flush();
    }

    /// Tool diagnostics are always shown, even in quiet mode.
    pub fn write_stderr(&self, data: &[u8]) {
        if data.is_empty() {
            return;
        }
        let stderr = std::io::stderr();
        let mut lock = stderr.lock();
        let _ = lock.write_all(data);
        let _ = lock.flush();
    }

    /// Progress bar for `len` compile jobs. Hidden when quiet or verbose,
    /// since verbose mode prints every command line instead.
    pub fn progress(&self, len: usize) -> ProgressBar {
        if self.quiet || self.verbose {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new(len as u64);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
        {
            pb.set_style(style.progress_chars("#>-"));
        }
        pb
    }
}
