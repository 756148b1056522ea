//! Shared infrastructure for the SDK generator workspace.

pub mod atomic_write;
pub mod exit_codes;
pub mod logging;

pub use atomic_write::write_file_atomic;
pub use exit_codes::ExitCode;
pub use logging::init_tracing;
