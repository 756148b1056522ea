//! Spawning and supervising child processes.

use futures::Stream;
use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use std::pin::Pin;
use std::process::Stdio;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Child;

use crate::error::{OutputStreamKind, RunnerError};
use crate::types::{ExitReason, ProcessSpec, StdinSource, StdioMode, TeardownStep};

/// Stream of byte chunks from a piped child stream.
pub type OutputChunkStream = Pin<Box<dyn Stream<Item = Result<Vec<u8>, RunnerError>> + Send>>;

const READ_CHUNK: usize = 32 * 1024;

enum StreamSlot {
    Available(OutputChunkStream),
    Taken,
    NotPiped,
}

/// A running child process.
///
/// Output streams are consumable at most once. On cancellation, call
/// [`ProcessHandle::wait_or_teardown`]; if the handle is simply dropped the
/// child is killed outright.
pub struct ProcessHandle {
    child: Child,
    command: String,
    new_session: bool,
    teardown: Vec<TeardownStep>,
    stdout_slot: StreamSlot,
    stderr_slot: StreamSlot,
}

fn chunk_stream<R>(reader: R) -> OutputChunkStream
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
{
    Box::pin(futures::stream::unfold(Some(reader), |state| async move {
        let mut reader = state?;
        let mut buf = vec![0u8; READ_CHUNK];
        match reader.read(&mut buf).await {
            Ok(0) => None,
            Ok(n) => {
                buf.truncate(n);
                Some((Ok(buf), Some(reader)))
            }
            Err(source) => Some((Err(RunnerError::Io { source }), None)),
        }
    }))
}

fn stdio_for(mode: &StdioMode, command: &str) -> Result<Stdio, RunnerError> {
    match mode {
        StdioMode::Inherit => Ok(Stdio::inherit()),
        StdioMode::Piped => Ok(Stdio::piped()),
        StdioMode::Discard => Ok(Stdio::null()),
        StdioMode::File(path) => {
            let file = std::fs::File::create(path.as_std_path()).map_err(|source| {
                RunnerError::SpawnFailed {
                    command: command.to_string(),
                    source,
                }
            })?;
            Ok(Stdio::from(file))
        }
    }
}

/// Spawn a process from its specification.
pub fn spawn(spec: ProcessSpec) -> Result<ProcessHandle, RunnerError> {
    let command_display = spec.command.to_string();
    let mut cmd = spec.command.to_command();

    cmd.stdin(match &spec.stdin {
        StdinSource::Null => Stdio::null(),
        StdinSource::Inherit => Stdio::inherit(),
        StdinSource::Bytes(_) => Stdio::piped(),
        StdinSource::File(path) => {
            let file =
                std::fs::File::open(path.as_std_path()).map_err(|source| RunnerError::SpawnFailed {
                    command: command_display.clone(),
                    source,
                })?;
            Stdio::from(file)
        }
    });
    cmd.stdout(stdio_for(&spec.stdout, &command_display)?);
    cmd.stderr(stdio_for(&spec.stderr, &command_display)?);
    cmd.kill_on_drop(true);

    if spec.new_session {
        // Own session so teardown signals reach the whole process group.
        unsafe {
            cmd.pre_exec(|| {
                nix::unistd::setsid()
                    .map(|_| ())
                    .map_err(|e| std::io::Error::from_raw_os_error(e as i32))
            });
        }
    }

    let mut child = cmd.spawn().map_err(|source| RunnerError::SpawnFailed {
        command: command_display.clone(),
        source,
    })?;

    if let StdinSource::Bytes(bytes) = spec.stdin {
        if let Some(mut stdin) = child.stdin.take() {
            tokio::spawn(async move {
                let _ = stdin.write_all(&bytes).await;
                let _ = stdin.shutdown().await;
            });
        }
    }

    let stdout_slot = match (&spec.stdout, child.stdout.take()) {
        (StdioMode::Piped, Some(out)) => StreamSlot::Available(chunk_stream(out)),
        _ => StreamSlot::NotPiped,
    };
    let stderr_slot = match (&spec.stderr, child.stderr.take()) {
        (StdioMode::Piped, Some(err)) => StreamSlot::Available(chunk_stream(err)),
        _ => StreamSlot::NotPiped,
    };

    Ok(ProcessHandle {
        child,
        command: command_display,
        new_session: spec.new_session,
        teardown: spec.teardown,
        stdout_slot,
        stderr_slot,
    })
}

fn exit_reason(status: std::process::ExitStatus) -> ExitReason {
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return ExitReason::Signaled(signal);
        }
    }
    ExitReason::Exited(status.code().unwrap_or(-1))
}

impl ProcessHandle {
    /// The rendered command line, for error messages.
    #[must_use]
    pub fn command(&self) -> &str {
        &self.command
    }

    /// Take the stdout stream. Fails if stdout was not piped or was already
    /// taken.
    pub fn take_stdout(&mut self) -> Result<OutputChunkStream, RunnerError> {
        Self::take_slot(&mut self.stdout_slot, OutputStreamKind::Stdout)
    }

    /// Take the stderr stream. Fails if stderr was not piped or was already
    /// taken.
    pub fn take_stderr(&mut self) -> Result<OutputChunkStream, RunnerError> {
        Self::take_slot(&mut self.stderr_slot, OutputStreamKind::Stderr)
    }

    fn take_slot(
        slot: &mut StreamSlot,
        kind: OutputStreamKind,
    ) -> Result<OutputChunkStream, RunnerError> {
        match std::mem::replace(slot, StreamSlot::Taken) {
            StreamSlot::Available(stream) => Ok(stream),
            StreamSlot::Taken | StreamSlot::NotPiped => {
                Err(RunnerError::IllegalStreamConsumption { stream: kind })
            }
        }
    }

    /// Deliver a signal to the child (to its whole group when it runs in its
    /// own session).
    pub fn send_signal(&self, signal: i32) -> Result<(), RunnerError> {
        let Some(pid) = self.child.id() else {
            // Already reaped; nothing to signal.
            return Ok(());
        };
        let raw = if self.new_session {
            -(pid as i32)
        } else {
            pid as i32
        };
        let sig = Signal::try_from(signal).map_err(|e| RunnerError::SignalDeliveryFailed {
            signal,
            reason: e.to_string(),
        })?;
        match kill(Pid::from_raw(raw), sig) {
            Ok(()) => Ok(()),
            // ESRCH races with exit; the child is gone, which is what we want.
            Err(nix::errno::Errno::ESRCH) => Ok(()),
            Err(e) => Err(RunnerError::SignalDeliveryFailed {
                signal,
                reason: e.to_string(),
            }),
        }
    }

    /// Wait for the child to stop on its own.
    pub async fn wait(&mut self) -> Result<ExitReason, RunnerError> {
        let status = self
            .child
            .wait()
            .await
            .map_err(|source| RunnerError::Io { source })?;
        Ok(exit_reason(status))
    }

    /// Walk the teardown sequence: each signal in turn with its grace period,
    /// then SIGKILL if the child is still alive.
    pub async fn teardown(&mut self) -> Result<ExitReason, RunnerError> {
        for step in self.teardown.clone() {
            if let Some(status) = self
                .child
                .try_wait()
                .map_err(|source| RunnerError::Io { source })?
            {
                return Ok(exit_reason(status));
            }
            tracing::debug!(signal = step.signal, "sending teardown signal");
            self.send_signal(step.signal)?;
            match tokio::time::timeout(step.grace, self.child.wait()).await {
                Ok(status) => {
                    let status = status.map_err(|source| RunnerError::Io { source })?;
                    return Ok(exit_reason(status));
                }
                Err(_elapsed) => continue,
            }
        }
        tracing::debug!("teardown grace expired, sending SIGKILL");
        self.send_signal(libc::SIGKILL)?;
        let status = self
            .child
            .wait()
            .await
            .map_err(|source| RunnerError::Io { source })?;
        Ok(exit_reason(status))
    }

    /// Wait for the child, or run the teardown sequence as soon as `cancel`
    /// completes.
    pub async fn wait_or_teardown<F>(&mut self, cancel: F) -> Result<ExitReason, RunnerError>
    where
        F: Future<Output = ()>,
    {
        let finished = {
            tokio::select! {
                status = self.child.wait() => {
                    Some(status.map_err(|source| RunnerError::Io { source })?)
                }
                () = cancel => None,
            }
        };
        match finished {
            Some(status) => Ok(exit_reason(status)),
            None => self.teardown().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CommandSpec;
    use futures::StreamExt;
    use std::time::Duration;

    fn sh(script: &str) -> ProcessSpec {
        ProcessSpec::new(CommandSpec::new("/bin/sh").arg("-c").arg(script))
    }

    #[tokio::test]
    async fn collects_exit_codes() {
        let mut handle = spawn(sh("exit 3")).unwrap();
        assert_eq!(handle.wait().await.unwrap(), ExitReason::Exited(3));
    }

    #[tokio::test]
    async fn streams_stdout_chunks() {
        let mut handle = spawn(sh("printf hello")).unwrap();
        let mut stream = handle.take_stdout().unwrap();
        let mut bytes = Vec::new();
        while let Some(chunk) = stream.next().await {
            bytes.extend(chunk.unwrap());
        }
        assert_eq!(bytes, b"hello");
        assert!(handle.wait().await.unwrap().success());
    }

    #[tokio::test]
    async fn stream_consumable_at_most_once() {
        let mut handle = spawn(sh("true")).unwrap();
        let _stream = handle.take_stdout().unwrap();
        let err = handle.take_stdout().unwrap_err();
        assert!(matches!(
            err,
            RunnerError::IllegalStreamConsumption {
                stream: OutputStreamKind::Stdout
            }
        ));
        handle.wait().await.unwrap();
    }

    #[tokio::test]
    async fn discarded_stream_cannot_be_consumed() {
        let mut handle = spawn(sh("true").stdout(StdioMode::Discard)).unwrap();
        let err = handle.take_stdout().unwrap_err();
        assert!(matches!(err, RunnerError::IllegalStreamConsumption { .. }));
        handle.wait().await.unwrap();
    }

    #[tokio::test]
    async fn stdin_bytes_reach_the_child() {
        let mut handle = spawn(sh("cat").stdin(StdinSource::Bytes(b"fed".to_vec()))).unwrap();
        let mut stream = handle.take_stdout().unwrap();
        let mut bytes = Vec::new();
        while let Some(chunk) = stream.next().await {
            bytes.extend(chunk.unwrap());
        }
        assert_eq!(bytes, b"fed");
        assert!(handle.wait().await.unwrap().success());
    }

    #[tokio::test]
    async fn stdout_redirects_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = camino::Utf8PathBuf::from_path_buf(dir.path().join("out.txt")).unwrap();
        let mut handle = spawn(sh("printf redirected").stdout(StdioMode::File(path.clone()))).unwrap();
        handle.wait().await.unwrap();
        assert_eq!(std::fs::read(path.as_std_path()).unwrap(), b"redirected");
    }

    #[tokio::test]
    async fn teardown_escalates_to_sigkill() {
        // The child ignores SIGTERM, so only SIGKILL stops it.
        let spec = sh("trap '' TERM; sleep 30").teardown(vec![TeardownStep::new(
            libc::SIGTERM,
            Duration::from_millis(200),
        )]);
        let mut handle = spawn(spec).unwrap();
        // Give the shell a moment to install the trap.
        tokio::time::sleep(Duration::from_millis(300)).await;
        let reason = handle
            .wait_or_teardown(async {})
            .await
            .unwrap();
        assert_eq!(reason, ExitReason::Signaled(libc::SIGKILL));
    }

    #[tokio::test]
    async fn teardown_respects_graceful_exit() {
        let spec = sh("sleep 30").teardown(vec![TeardownStep::new(
            libc::SIGTERM,
            Duration::from_secs(5),
        )]);
        let mut handle = spawn(spec).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        let reason = handle.wait_or_teardown(async {}).await.unwrap();
        assert_eq!(reason, ExitReason::Signaled(libc::SIGTERM));
    }

    #[tokio::test]
    async fn wait_or_teardown_passes_through_natural_exit() {
        let mut handle = spawn(sh("exit 0")).unwrap();
        let reason = handle
            .wait_or_teardown(futures::future::pending())
            .await
            .unwrap();
        assert!(reason.success());
    }
}
