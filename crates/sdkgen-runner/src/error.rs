//! Runner error taxonomy.

use std::fmt;

/// Which output stream an error concerns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStreamKind {
    Stdout,
    Stderr,
}

impl fmt::Display for OutputStreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stdout => f.write_str("stdout"),
            Self::Stderr => f.write_str("stderr"),
        }
    }
}

/// Errors from spawning and supervising subprocesses.
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    #[error("failed to spawn `{command}`: {source}")]
    SpawnFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` exited with code {code}")]
    NonZeroExitCode { code: i32, command: String },

    #[error("`{command}` terminated by unhandled signal {signal}")]
    UnhandledChildProcessSignal { signal: i32, command: String },

    #[error("`{command}` produced no output")]
    NoProcessOutput { command: String },

    #[error("process {stream} exceeded the collection limit")]
    TooMuchProcessOutput { stream: OutputStreamKind },

    #[error("process {stream} was already consumed or was not piped")]
    IllegalStreamConsumption { stream: OutputStreamKind },

    #[error("failed to deliver signal {signal}: {reason}")]
    SignalDeliveryFailed { signal: i32, reason: String },

    #[error("I/O error on child process: {source}")]
    Io {
        #[source]
        source: std::io::Error,
    },
}
