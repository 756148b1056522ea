//! sdkgen CLI binary.
//!
//! All logic is in the library; main only maps failures to the process exit
//! code.

fn main() {
    if let Err(code) = sdkgen::cli::main() {
        std::process::exit(code.as_i32());
    }
}
