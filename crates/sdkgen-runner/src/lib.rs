//! Subprocess execution.
//!
//! Every external tool (`tar`, `gzip`, `docker`, `rsync`, CMake) runs
//! through this crate. Commands are argv-style only; there is no shell
//! string evaluation anywhere. Cancellation walks a per-process teardown
//! sequence of signals with grace periods, ending in SIGKILL.

pub mod command_spec;
pub mod error;
pub mod output;
pub mod process;
pub mod types;

pub use command_spec::CommandSpec;
pub use error::{OutputStreamKind, RunnerError};
pub use output::{
    CollectedOutput, DEFAULT_OUTPUT_LIMIT, run_capturing_stdout, run_checking_success,
    run_collecting_output, run_log_output, run_processing_output,
};
pub use process::{spawn, OutputChunkStream, ProcessHandle};
pub use types::{ExitReason, ProcessSpec, StdinSource, StdioMode, TeardownStep};
