//! Normalization round-trip law: re-parsing the canonical form of any parsed
//! triple yields the same value.

use proptest::prelude::*;
use sdkgen_triple::Triple;

proptest! {
    #[test]
    fn canonical_form_round_trips(s in "[a-z0-9_.]{0,12}(-[a-z0-9_.]{0,12}){0,4}") {
        let first = Triple::parse(&s, true);
        let second = Triple::parse(&first.canonical(), true);
        prop_assert_eq!(first, second);
    }

    #[test]
    fn canonical_is_idempotent(s in "[a-z0-9_.]{0,12}(-[a-z0-9_.]{0,12}){0,4}") {
        let parsed = Triple::parse(&s, true);
        let reparsed = Triple::parse(&parsed.canonical(), true);
        prop_assert_eq!(parsed.canonical(), reparsed.canonical());
    }
}

#[test]
fn known_triples_round_trip() {
    for s in [
        "x86_64-unknown-linux-gnu",
        "aarch64-unknown-linux-gnu",
        "armv7-unknown-linux-gnueabihf",
        "arm64-apple-macosx",
        "x86_64-apple-macosx13.0",
        "wasm32-unknown-wasi",
        "wasm32-unknown-wasip1-threads",
        "x86_64-unknown-freebsd14.3",
        "aarch64-unknown-freebsd15.0",
        "s390x-unknown-linux-gnu",
    ] {
        let first = Triple::parse(s, true);
        let second = Triple::parse(&first.canonical(), true);
        assert_eq!(first, second, "round-trip failed for {s}");
    }
}
