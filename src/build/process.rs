//! External tool execution with captured output and cooperative cancellation.

use std::io::Read;
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

/// Preprocessor stderr is capped so that a runaway template error cannot eat
/// the whole memory of the build.
pub const STDERR_LIMIT: usize = 100 * 1024;

const TRUNCATION_NOTICE: &[u8] = b"\nCompiler error output has been truncated.\n";

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Shared flag telling running jobs to stop. Cloning shares the flag.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Result of running an external tool to completion.
#[derive(Debug, Clone, Default)]
pub struct ProcessOutput {
    pub args: Vec<String>,
    pub success: bool,
    pub code: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    /// The process was killed because the build was cancelled.
    pub cancelled: bool,
}

impl ProcessOutput {
    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

/// Runs `args[0]` with the remaining arguments, capturing both output streams.
///
/// A spawn failure (tool not found, permission denied) is an `Err`; a tool
/// that runs and fails is an `Ok` with `success == false`. When `cancel` fires
/// the child is killed and the output is marked as cancelled.
pub fn run_captured(args: &[String], cancel: &CancellationToken) -> std::io::Result<ProcessOutput> {
    run(args, cancel, None)
}

/// Like [`run_captured`], but keeps at most `stderr_limit` bytes of stderr.
///
/// The pipe is still drained to the end, so a chatty tool is never killed by
/// a closed pipe. Dropped output is replaced by a truncation notice.
pub fn run_captured_with_limit(
    args: &[String],
    cancel: &CancellationToken,
    stderr_limit: usize,
) -> std::io::Result<ProcessOutput> {
    run(args, cancel, Some(stderr_limit))
}

fn run(
    args: &[String],
    cancel: &CancellationToken,
    stderr_limit: Option<usize>,
) -> std::io::Result<ProcessOutput> {
    let Some((program, rest)) = args.split_first() else {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "empty command line",
        ));
    };

    let mut child = Command::new(program)
        .args(rest)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;

    let stdout_reader = child.stdout.take().map(|mut out| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = out.read_to_end(&mut buf);
            buf
        })
    });
    let stderr_reader = child.stderr.take().map(|mut err| {
        thread::spawn(move || match stderr_limit {
            Some(limit) => read_capped(err, limit),
            None => {
                let mut buf = Vec::new();
                let _ = err.read_to_end(&mut buf);
                (buf, false)
            }
        })
    });

    let mut cancelled = false;
    let status = loop {
        if let Some(status) = child.try_wait()? {
            break status;
        }
        if cancel.is_cancelled() {
            let _ = child.kill();
            cancelled = true;
            break child.wait()?;
        }
        thread::sleep(POLL_INTERVAL);
    };

    let stdout = stdout_reader
        .and_then(|h| h.join().ok())
        .unwrap_or_default();
    let (mut stderr, truncated) = stderr_reader
        .and_then(|h| h.join().ok())
        .unwrap_or_default();
    if truncated {
        stderr.extend_from_slice(TRUNCATION_NOTICE);
    }

    Ok(ProcessOutput {
        args: args.to_vec(),
        success: status.success() && !cancelled,
        code: status.code(),
        stdout,
        stderr,
        cancelled,
    })
}

/// Reads `reader` to EOF, keeping the first `limit` bytes. The flag tells
/// whether anything was dropped.
fn read_capped(mut reader: impl Read, limit: usize) -> (Vec<u8>, bool) {
    let mut kept = Vec::new();
    let mut truncated = false;
    let mut chunk = [0u8; 8192];
    loop {
        match reader.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => {
                let room = limit.saturating_sub(kept.len());
                kept.extend_from_slice(&chunk[..n.min(room)]);
                truncated |= n > room;
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(_) => break,
        }
    }
    (kept, truncated)
}

/// Joins a command line for display, quoting arguments that need it.
pub fn printable_command(args: &[String]) -> String {
    args.iter()
        .map(|arg| {
            if arg.contains(['"', '\\', ' ', '\t']) {
                format!("\"{}\"", arg.replace('\\', "\\\\").replace('"', "\\\""))
            } else {
                arg.clone()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_printable_command_quotes_spaces() {
        let args = vec![
            "gcc".to_string(),
            "-I/my libs/Servo".to_string(),
            "main.cpp".to_string(),
        ];
        assert_eq!(printable_command(&args), "gcc \"-I/my libs/Servo\" main.cpp");
    }

    #[test]
    fn test_empty_command_is_rejected() {
        let err = run_captured(&[], &CancellationToken::new()).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidInput);
    }

    #[test]
    fn test_missing_program_is_spawn_error() {
        let args = vec!["inox-definitely-not-a-real-tool".to_string()];
        assert!(run_captured(&args, &CancellationToken::new()).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_captures_failure_and_stderr() {
        let args = vec![
            "sh".to_string(),
            "-c".to_string(),
            "echo out; echo oops >&2; exit 3".to_string(),
        ];
        let out = run_captured(&args, &CancellationToken::new()).unwrap();
        assert!(!out.success);
        assert_eq!(out.code, Some(3));
        assert_eq!(out.stdout, b"out\n");
        assert_eq!(out.stderr_lossy(), "oops\n");
    }

    #[test]
    fn test_read_capped_drains_everything() {
        let data = vec![b'w'; 3 * 8192 + 17];
        let (kept, truncated) = read_capped(&data[..], 10_000);
        assert_eq!(kept.len(), 10_000);
        assert!(truncated);

        let (kept, truncated) = read_capped(&data[..], data.len());
        assert_eq!(kept, data);
        assert!(!truncated);
    }

    #[cfg(unix)]
    #[test]
    fn test_chatty_tool_still_succeeds() {
        let args = vec![
            "sh".to_string(),
            "-c".to_string(),
            "head -c 300000 /dev/zero >&2".to_string(),
        ];
        let out = run_captured(&args, &CancellationToken::new()).unwrap();
        assert!(out.success);
        assert_eq!(out.code, Some(0));
        assert_eq!(out.stderr.len(), 300_000);

        let out = run_captured_with_limit(&args, &CancellationToken::new(), STDERR_LIMIT).unwrap();
        assert!(out.success);
        assert_eq!(out.stderr.len(), STDERR_LIMIT + TRUNCATION_NOTICE.len());
        assert!(out.stderr_lossy().ends_with("Compiler error output has been truncated.\n"));
    }

    #[cfg(unix)]
    #[test]
    fn test_cancel_kills_child() {
        let token = CancellationToken::new();
        token.cancel();
        let args = vec!["sleep".to_string(), "5".to_string()];
        let out = run_captured(&args, &token).unwrap();
        assert!(out.cancelled);
        assert!(!out.success);
    }
}
