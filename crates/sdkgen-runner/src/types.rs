//! Process specification value types.

use camino::Utf8PathBuf;
use std::time::Duration;

use crate::CommandSpec;

/// Where a child output stream goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StdioMode {
    /// Share the parent's stream.
    Inherit,
    /// Capture for the caller to consume.
    Piped,
    /// Throw away. Consuming a discarded stream is an error.
    Discard,
    /// Redirect into a file.
    File(Utf8PathBuf),
}

/// What the child reads on stdin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StdinSource {
    /// No input; stdin is closed immediately.
    Null,
    /// Share the parent's stdin.
    Inherit,
    /// Feed these bytes, then close.
    Bytes(Vec<u8>),
    /// Redirect from a file.
    File(Utf8PathBuf),
}

/// Why a process stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    Exited(i32),
    Signaled(i32),
}

impl ExitReason {
    /// True only for a clean zero exit.
    #[must_use]
    pub fn success(self) -> bool {
        matches!(self, Self::Exited(0))
    }
}

/// One step of the cancellation teardown sequence: send `signal`, then wait
/// up to `grace` for the child to exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TeardownStep {
    pub signal: i32,
    pub grace: Duration,
}

impl TeardownStep {
    #[must_use]
    pub fn new(signal: i32, grace: Duration) -> Self {
        Self { signal, grace }
    }
}

/// Full description of a process to spawn.
#[derive(Debug, Clone)]
pub struct ProcessSpec {
    pub command: CommandSpec,
    pub stdin: StdinSource,
    pub stdout: StdioMode,
    pub stderr: StdioMode,
    /// Start the child in its own session so signals reach the whole group.
    pub new_session: bool,
    /// Signals tried in order on cancellation. SIGKILL always follows.
    pub teardown: Vec<TeardownStep>,
}

impl ProcessSpec {
    /// A spec with piped output, no stdin, and the default teardown
    /// (SIGTERM with a two-second grace, then SIGKILL).
    #[must_use]
    pub fn new(command: CommandSpec) -> Self {
        Self {
            command,
            stdin: StdinSource::Null,
            stdout: StdioMode::Piped,
            stderr: StdioMode::Piped,
            new_session: false,
            teardown: vec![TeardownStep::new(libc::SIGTERM, Duration::from_secs(2))],
        }
    }

    #[must_use]
    pub fn stdin(mut self, stdin: StdinSource) -> Self {
        self.stdin = stdin;
        self
    }

    #[must_use]
    pub fn stdout(mut self, mode: StdioMode) -> Self {
        self.stdout = mode;
        self
    }

    #[must_use]
    pub fn stderr(mut self, mode: StdioMode) -> Self {
        self.stderr = mode;
        self
    }

    #[must_use]
    pub fn new_session(mut self, yes: bool) -> Self {
        self.new_session = yes;
        self
    }

    #[must_use]
    pub fn teardown(mut self, steps: Vec<TeardownStep>) -> Self {
        self.teardown = steps;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_reason_success() {
        assert!(ExitReason::Exited(0).success());
        assert!(!ExitReason::Exited(1).success());
        assert!(!ExitReason::Signaled(libc::SIGKILL).success());
    }

    #[test]
    fn default_teardown_is_sigterm_then_kill() {
        let spec = ProcessSpec::new(CommandSpec::new("sleep"));
        assert_eq!(spec.teardown.len(), 1);
        assert_eq!(spec.teardown[0].signal, libc::SIGTERM);
    }
}
