//! Local process execution and shell quoting.
//!
//! Remote commands reach the router through a local `ssh` process. This
//! module spawns that process, feeds it optional stdin, and collects its
//! output. Arguments that end up in the remote shell are quoted with
//! [`shellquote`].

use once_cell::sync::Lazy;
use regex::Regex;
use std::io;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;

use crate::error::{TransportError, TransportResult};

/// Regex for characters that need escaping in shell double-quotes.
/// Matches: $, `, ", \
///
/// Newlines are left alone so multi-line PEM blobs survive quoting.
static SHELL_ESCAPE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"([$`"\\])"#).expect("Invalid regex pattern"));

/// Quotes a string for safe use in a remote shell command line.
///
/// ```
/// use vr_transport::shell::shellquote;
///
/// assert_eq!(shellquote("simple"), "\"simple\"");
/// assert_eq!(shellquote("with$var"), "\"with\\$var\"");
/// ```
pub fn shellquote(s: &str) -> String {
    let escaped = SHELL_ESCAPE_RE.replace_all(s, r"\$1");
    format!("\"{}\"", escaped)
}

/// Result of a local process execution.
#[derive(Debug, Clone)]
pub struct ExecResult {
    /// The exit code of the process (-1 if killed by a signal).
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ExecResult {
    /// Returns true if the process exited with code 0.
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Returns stdout and stderr joined for error details.
    pub fn combined_output(&self) -> String {
        if self.stderr.is_empty() {
            self.stdout.clone()
        } else if self.stdout.is_empty() {
            self.stderr.clone()
        } else {
            format!("{}\n{}", self.stdout, self.stderr)
        }
    }
}

/// A line a remote command prints on stderr once it has started.
///
/// [`exec`] drops the line from the captured stderr and records that it was
/// seen, so a caller can still ask after a timeout or cancellation.
#[derive(Debug)]
pub struct StderrMarker {
    line: String,
    seen: AtomicBool,
}

impl StderrMarker {
    pub fn new(line: impl Into<String>) -> Self {
        Self {
            line: line.into(),
            seen: AtomicBool::new(false),
        }
    }

    pub fn line(&self) -> &str {
        &self.line
    }

    pub fn seen(&self) -> bool {
        self.seen.load(Ordering::Acquire)
    }

    fn observe(&self, raw: &[u8]) -> bool {
        if String::from_utf8_lossy(raw).trim_end() == self.line {
            self.seen.store(true, Ordering::Release);
            return true;
        }
        false
    }
}

async fn read_all<R: AsyncRead + Unpin>(pipe: Option<R>) -> io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        pipe.read_to_end(&mut buf).await?;
    }
    Ok(buf)
}

async fn read_stderr<R: AsyncRead + Unpin>(
    pipe: Option<R>,
    marker: Option<&StderrMarker>,
) -> io::Result<Vec<u8>> {
    let Some(pipe) = pipe else {
        return Ok(Vec::new());
    };
    let mut reader = BufReader::new(pipe);
    let mut collected = Vec::new();
    let mut line = Vec::new();
    loop {
        line.clear();
        if reader.read_until(b'\n', &mut line).await? == 0 {
            return Ok(collected);
        }
        if marker.is_some_and(|m| !m.seen() && m.observe(&line)) {
            continue;
        }
        collected.extend_from_slice(&line);
    }
}

/// Runs `program` with `args`, writing `stdin` to it if given.
///
/// Stdin is written while stdout and stderr are drained. A child that exits
/// without reading all of its stdin still yields an [`ExecResult`] as long
/// as it exited non-zero, so the caller can classify the exit status.
///
/// The child is killed when the returned future is dropped, so wrapping
/// this call in a timeout or a `select!` stops the local process.
pub async fn exec(
    program: &str,
    args: &[String],
    stdin: Option<&str>,
    marker: Option<&StderrMarker>,
) -> TransportResult<ExecResult> {
    tracing::debug!(program = %program, args = ?args, "Executing process");

    let mut child = Command::new(program)
        .args(args)
        .stdin(if stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| TransportError::exec(program, e.to_string()))?;

    let stdin_pipe = child.stdin.take();
    let write = async move {
        match (stdin, stdin_pipe) {
            // Dropping the pipe at the end closes it so the child sees EOF
            (Some(input), Some(mut pipe)) => pipe.write_all(input.as_bytes()).await,
            _ => Ok(()),
        }
    };
    let (written, stdout, stderr) = tokio::join!(
        write,
        read_all(child.stdout.take()),
        read_stderr(child.stderr.take(), marker)
    );

    let status = child
        .wait()
        .await
        .map_err(|e| TransportError::exec(program, e.to_string()))?;
    let stdout = stdout.map_err(|e| TransportError::exec(program, format!("reading stdout: {}", e)))?;
    let stderr = stderr.map_err(|e| TransportError::exec(program, format!("reading stderr: {}", e)))?;

    let result = ExecResult {
        exit_code: status.code().unwrap_or(-1),
        stdout: String::from_utf8_lossy(&stdout).trim().to_string(),
        stderr: String::from_utf8_lossy(&stderr).trim().to_string(),
    };

    match written {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::BrokenPipe && !result.success() => {
            tracing::debug!(program = %program, "Process exited before reading all of stdin");
        }
        Err(e) => {
            return Err(TransportError::exec(program, format!("writing stdin: {}", e)));
        }
    }

    if result.success() {
        tracing::trace!(program = %program, "Process succeeded");
    } else {
        tracing::warn!(
            program = %program,
            exit_code = result.exit_code,
            stderr = %result.stderr,
            "Process failed"
        );
    }

    Ok(result)
}
