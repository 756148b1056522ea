//! sdkgen assembles cross-compilation Swift SDK artifact bundles.
//!
//! Given a host and target platform it downloads compiler binaries, target
//! runtime libraries, system headers, and a linker, rearranges them into a
//! portable bundle, rewrites platform-specific paths, and emits the JSON
//! descriptors a package manager needs to perform cross-builds.
//!
//! The heavy lifting lives in the workspace crates; this crate is the thin
//! CLI over them.

pub mod cli;

pub use sdkgen_utils::ExitCode;
