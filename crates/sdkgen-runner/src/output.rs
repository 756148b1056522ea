//! Output collection helpers built on top of [`crate::spawn`].

use futures::StreamExt;

use crate::error::{OutputStreamKind, RunnerError};
use crate::process::{OutputChunkStream, spawn};
use crate::types::{ExitReason, ProcessSpec, StdioMode};

/// Default per-stream collection limit.
pub const DEFAULT_OUTPUT_LIMIT: usize = 8 * 1024 * 1024;

/// Result of [`run_collecting_output`].
#[derive(Debug, Clone)]
pub struct CollectedOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub exit: ExitReason,
}

impl CollectedOutput {
    #[must_use]
    pub fn stdout_string(&self) -> String {
        String::from_utf8_lossy(&self.stdout).to_string()
    }

    #[must_use]
    pub fn stderr_string(&self) -> String {
        String::from_utf8_lossy(&self.stderr).to_string()
    }
}

async fn collect(
    stream: Option<OutputChunkStream>,
    limit: usize,
    kind: OutputStreamKind,
) -> Result<Vec<u8>, RunnerError> {
    let Some(mut stream) = stream else {
        return Ok(Vec::new());
    };
    let mut out = Vec::new();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if out.len() + chunk.len() > limit {
            return Err(RunnerError::TooMuchProcessOutput { stream: kind });
        }
        out.extend(chunk);
    }
    Ok(out)
}

/// A collected stream must be piped; an uncollected pipe would deadlock
/// once full, so it degrades to discard. File and inherit modes pass
/// through untouched.
fn collection_mode(mode: StdioMode, collect: bool) -> StdioMode {
    if collect {
        StdioMode::Piped
    } else if mode == StdioMode::Piped {
        StdioMode::Discard
    } else {
        mode
    }
}

/// Run a process collecting the selected streams into memory.
///
/// A collected stream growing past `limit_bytes_per_stream` fails the run
/// and tears the child down.
pub async fn run_collecting_output(
    spec: ProcessSpec,
    collect_stdout: bool,
    collect_stderr: bool,
    limit_bytes_per_stream: usize,
) -> Result<CollectedOutput, RunnerError> {
    let stdout_mode = collection_mode(spec.stdout.clone(), collect_stdout);
    let stderr_mode = collection_mode(spec.stderr.clone(), collect_stderr);
    let spec = spec.stdout(stdout_mode).stderr(stderr_mode);
    let mut handle = spawn(spec)?;
    let stdout = if collect_stdout {
        Some(handle.take_stdout()?)
    } else {
        None
    };
    let stderr = if collect_stderr {
        Some(handle.take_stderr()?)
    } else {
        None
    };

    let (stdout, stderr) = tokio::join!(
        collect(stdout, limit_bytes_per_stream, OutputStreamKind::Stdout),
        collect(stderr, limit_bytes_per_stream, OutputStreamKind::Stderr),
    );
    match (stdout, stderr) {
        (Ok(stdout), Ok(stderr)) => {
            let exit = handle.wait().await?;
            Ok(CollectedOutput {
                stdout,
                stderr,
                exit,
            })
        }
        (Err(e), _) | (_, Err(e)) => {
            let _ = handle.teardown().await;
            Err(e)
        }
    }
}

async fn forward(
    mut stream: OutputChunkStream,
    kind: OutputStreamKind,
    split_into_lines: bool,
    tx: tokio::sync::mpsc::Sender<(OutputStreamKind, Result<Vec<u8>, RunnerError>)>,
) {
    if !split_into_lines {
        while let Some(chunk) = stream.next().await {
            if tx.send((kind, chunk)).await.is_err() {
                return;
            }
        }
        return;
    }
    let mut buf: Vec<u8> = Vec::new();
    while let Some(chunk) = stream.next().await {
        match chunk {
            Ok(bytes) => {
                buf.extend(bytes);
                while let Some(pos) = buf.iter().position(|b| *b == b'\n') {
                    let mut line: Vec<u8> = buf.drain(..=pos).collect();
                    line.pop();
                    if line.last() == Some(&b'\r') {
                        line.pop();
                    }
                    if tx.send((kind, Ok(line))).await.is_err() {
                        return;
                    }
                }
            }
            Err(e) => {
                let _ = tx.send((kind, Err(e))).await;
                return;
            }
        }
    }
    if !buf.is_empty() {
        let _ = tx.send((kind, Ok(buf))).await;
    }
}

/// Run a process, invoking `callback` for each chunk (or each line when
/// `split_into_lines`) as it arrives on either piped stream.
pub async fn run_processing_output<F>(
    spec: ProcessSpec,
    split_into_lines: bool,
    mut callback: F,
) -> Result<ExitReason, RunnerError>
where
    F: FnMut(OutputStreamKind, &[u8]),
{
    let mut handle = spawn(spec)?;
    let stdout = handle.take_stdout().ok();
    let stderr = handle.take_stderr().ok();

    let (tx, mut rx) =
        tokio::sync::mpsc::channel::<(OutputStreamKind, Result<Vec<u8>, RunnerError>)>(64);
    let mut tasks = Vec::new();
    if let Some(stream) = stdout {
        tasks.push(tokio::spawn(forward(
            stream,
            OutputStreamKind::Stdout,
            split_into_lines,
            tx.clone(),
        )));
    }
    if let Some(stream) = stderr {
        tasks.push(tokio::spawn(forward(
            stream,
            OutputStreamKind::Stderr,
            split_into_lines,
            tx.clone(),
        )));
    }
    drop(tx);

    while let Some((kind, item)) = rx.recv().await {
        match item {
            Ok(bytes) => callback(kind, &bytes),
            Err(e) => {
                for task in &tasks {
                    task.abort();
                }
                let _ = handle.teardown().await;
                return Err(e);
            }
        }
    }
    for task in tasks {
        let _ = task.await;
    }
    handle.wait().await
}

/// Run a process, routing each output line to the structured log with the
/// given level and a `context` field identifying the caller.
pub async fn run_log_output(
    spec: ProcessSpec,
    level: tracing::Level,
    context: &str,
) -> Result<ExitReason, RunnerError> {
    run_processing_output(spec, true, |kind, line| {
        let line = String::from_utf8_lossy(line);
        match level {
            tracing::Level::ERROR => tracing::error!(stream = %kind, context, "{line}"),
            tracing::Level::WARN => tracing::warn!(stream = %kind, context, "{line}"),
            tracing::Level::INFO => tracing::info!(stream = %kind, context, "{line}"),
            tracing::Level::DEBUG => tracing::debug!(stream = %kind, context, "{line}"),
            tracing::Level::TRACE => tracing::trace!(stream = %kind, context, "{line}"),
        }
    })
    .await
}

/// Run a process and require a clean zero exit.
pub async fn run_checking_success(spec: ProcessSpec) -> Result<(), RunnerError> {
    let command = spec.command.to_string();
    let output = run_collecting_output(spec, false, true, DEFAULT_OUTPUT_LIMIT).await?;
    match output.exit {
        ExitReason::Exited(0) => Ok(()),
        ExitReason::Exited(code) => {
            let stderr = output.stderr_string();
            if !stderr.is_empty() {
                tracing::debug!(command = %command, "process stderr: {}", stderr.trim_end());
            }
            Err(RunnerError::NonZeroExitCode { code, command })
        }
        ExitReason::Signaled(signal) => {
            Err(RunnerError::UnhandledChildProcessSignal { signal, command })
        }
    }
}

/// Run a process, require success, and return its stdout; empty stdout is a
/// [`RunnerError::NoProcessOutput`] failure.
pub async fn run_capturing_stdout(spec: ProcessSpec) -> Result<Vec<u8>, RunnerError> {
    let command = spec.command.to_string();
    let output = run_collecting_output(spec, true, true, DEFAULT_OUTPUT_LIMIT).await?;
    match output.exit {
        ExitReason::Exited(0) => {
            if output.stdout.is_empty() {
                return Err(RunnerError::NoProcessOutput { command });
            }
            Ok(output.stdout)
        }
        ExitReason::Exited(code) => Err(RunnerError::NonZeroExitCode { code, command }),
        ExitReason::Signaled(signal) => {
            Err(RunnerError::UnhandledChildProcessSignal { signal, command })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CommandSpec;

    fn sh(script: &str) -> ProcessSpec {
        ProcessSpec::new(CommandSpec::new("/bin/sh").arg("-c").arg(script))
    }

    #[tokio::test]
    async fn collects_both_streams() {
        let output = run_collecting_output(
            sh("printf out; printf err >&2"),
            true,
            true,
            DEFAULT_OUTPUT_LIMIT,
        )
        .await
        .unwrap();
        assert_eq!(output.stdout, b"out");
        assert_eq!(output.stderr, b"err");
        assert!(output.exit.success());
    }

    #[tokio::test]
    async fn enforces_stream_limit() {
        let err = run_collecting_output(sh("head -c 4096 /dev/zero"), true, false, 1024)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RunnerError::TooMuchProcessOutput {
                stream: OutputStreamKind::Stdout
            }
        ));
    }

    #[tokio::test]
    async fn processes_lines_in_order_per_stream() {
        let mut lines = Vec::new();
        let exit = run_processing_output(sh("printf 'a\\nb\\nc'"), true, |kind, line| {
            lines.push((kind, String::from_utf8_lossy(line).to_string()));
        })
        .await
        .unwrap();
        assert!(exit.success());
        let stdout_lines: Vec<_> = lines
            .iter()
            .filter(|(k, _)| *k == OutputStreamKind::Stdout)
            .map(|(_, l)| l.as_str())
            .collect();
        assert_eq!(stdout_lines, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn checking_success_preserves_file_redirection() {
        let dir = tempfile::tempdir().unwrap();
        let path =
            camino::Utf8PathBuf::from_path_buf(dir.path().join("redirect.txt")).unwrap();
        run_checking_success(sh("printf kept").stdout(StdioMode::File(path.clone())))
            .await
            .unwrap();
        assert_eq!(std::fs::read(path.as_std_path()).unwrap(), b"kept");
    }

    #[tokio::test]
    async fn checking_success_maps_nonzero_exit() {
        let err = run_checking_success(sh("exit 7")).await.unwrap_err();
        match err {
            RunnerError::NonZeroExitCode { code, .. } => assert_eq!(code, 7),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn capturing_stdout_requires_output() {
        let bytes = run_capturing_stdout(sh("printf abc123")).await.unwrap();
        assert_eq!(bytes, b"abc123");

        let err = run_capturing_stdout(sh("true")).await.unwrap_err();
        assert!(matches!(err, RunnerError::NoProcessOutput { .. }));
    }
}
