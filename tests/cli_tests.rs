//! CLI surface checks that run the real binary.

use assert_cmd::Command;
use predicates::prelude::*;

fn sdkgen() -> Command {
    Command::cargo_bin("sdkgen").expect("binary builds")
}

#[test]
fn help_lists_all_subcommands() {
    sdkgen()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("make-linux-sdk"))
        .stdout(predicate::str::contains("make-wasm-sdk"))
        .stdout(predicate::str::contains("make-freebsd-sdk"));
}

#[test]
fn unknown_flag_fails_with_nonzero_exit() {
    sdkgen()
        .arg("--definitely-not-a-flag")
        .assert()
        .failure()
        .stderr(predicate::str::contains("--definitely-not-a-flag"));
}

#[test]
fn unknown_distribution_is_reported_on_stderr() {
    let temp = tempfile::tempdir().unwrap();
    sdkgen()
        .current_dir(temp.path())
        .env("SDKGEN_OFFLINE", "1")
        .args([
            "make-linux-sdk",
            "--distribution-name",
            "gentoo",
            "--distribution-version",
            "latest",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown distribution"));
}

#[test]
fn invalid_swift_version_is_rejected() {
    let temp = tempfile::tempdir().unwrap();
    sdkgen()
        .current_dir(temp.path())
        .env("SDKGEN_OFFLINE", "1")
        .args(["--swift-version", "not-a-version", "make-linux-sdk"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid version string"));
}

#[test]
fn offline_mode_fails_without_a_cache() {
    let temp = tempfile::tempdir().unwrap();
    sdkgen()
        .current_dir(temp.path())
        .env("SDKGEN_OFFLINE", "1")
        .args(["make-linux-sdk", "--target-arch", "x86_64"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("offline mode"));
}
