//! End-to-end WASI bundle assembly on the real filesystem.
//!
//! The WebAssembly recipe needs no network, so this drives the whole
//! pipeline: fixture packages in, assembled bundle out, and byte-identical
//! descriptors on an incremental re-run.

use camino::{Utf8Path, Utf8PathBuf};
use sdkgen_catalog::{PathsConfiguration, SwiftVersion};
use sdkgen_engine::QueryEngine;
use sdkgen_fs::OsFileSystem;
use sdkgen_http::OfflineHttpClient;
use sdkgen_recipes::{BundleGenerator, SdkRecipe, WasmTargetVariant, WebAssemblyRecipe};
use std::sync::Arc;

fn utf8(p: &std::path::Path) -> Utf8PathBuf {
    Utf8PathBuf::from_path_buf(p.to_path_buf()).unwrap()
}

fn write(path: &Utf8Path, contents: &str) {
    std::fs::create_dir_all(path.parent().unwrap().as_std_path()).unwrap();
    std::fs::write(path.as_std_path(), contents).unwrap();
}

/// Lay out a minimal target Swift package and WASI sysroot.
fn build_fixtures(root: &Utf8Path) -> (Utf8PathBuf, Utf8PathBuf) {
    let package = root.join("target-swift-package");
    for subdir in [
        "clang",
        "swift/clang",
        "swift/wasi",
        "swift_static/clang",
        "swift_static/wasi",
        "swift_static/shims",
    ] {
        write(
            &package.join("usr/lib").join(subdir).join("marker.txt"),
            subdir,
        );
    }
    write(
        &package.join("usr/lib/swift_static/CoreFoundation/module.map"),
        "module CoreFoundation {}\n",
    );

    let sysroot = root.join("wasi-sysroot");
    write(&sysroot.join("include/stdio.h"), "int printf();\n");
    write(&sysroot.join("lib/wasm32-wasi/libc.a"), "!<arch>\n");
    (package, sysroot)
}

fn make_recipe(package: Utf8PathBuf, sysroot: Utf8PathBuf) -> WebAssemblyRecipe {
    WebAssemblyRecipe {
        host_swift_package: None,
        target_swift_package: package,
        wasi_sysroot: sysroot,
        swift_version: SwiftVersion::parse("6.0.3-RELEASE").unwrap(),
        variants: vec![
            WasmTargetVariant::Plain,
            WasmTargetVariant::Threads,
            WasmTargetVariant::Embedded,
        ],
    }
}

fn make_generator(root: &Utf8Path, incremental: bool) -> BundleGenerator {
    let paths = PathsConfiguration::new(root, "6.0.3-RELEASE_wasm", "wasm32-unknown-wasi", "WASI.sdk");
    BundleGenerator::new(
        paths,
        "0.0.1".to_string(),
        incremental,
        Arc::new(OsFileSystem::default()),
    )
}

fn make_engine(root: &Utf8Path) -> QueryEngine {
    QueryEngine::new(
        Arc::new(OsFileSystem::default()),
        Arc::new(OfflineHttpClient),
        &root.join("Artifacts"),
    )
    .unwrap()
}

#[tokio::test]
async fn assembles_a_wasi_bundle_offline() {
    if which::which("rsync").is_err() {
        eprintln!("rsync unavailable, skipping");
        return;
    }

    let work = tempfile::tempdir().unwrap();
    let root = utf8(work.path());
    let (package, sysroot) = build_fixtures(&root);

    let recipe = make_recipe(package, sysroot);
    let generator = make_generator(&root, false);
    let engine = make_engine(&root);
    let product = recipe.make_sdk(&generator, &engine).await.unwrap();

    let sdk_root = &generator.paths.sdk_root_path;
    assert_eq!(&product.sdk_dir_path, sdk_root);
    assert_eq!(product.supported_host_triples, None);

    // The WASI sysroot was mirrored into the bundle.
    assert!(
        generator
            .paths
            .sysroot_path
            .join("include/stdio.h")
            .as_std_path()
            .exists()
    );
    // The target runtime landed in the toolchain.
    assert!(
        generator
            .paths
            .toolchain_dir_path
            .join("usr/lib/swift_static/wasi/marker.txt")
            .as_std_path()
            .exists()
    );
    // Optional CoreFoundation was picked up.
    assert!(
        generator
            .paths
            .toolchain_dir_path
            .join("usr/lib/swift_static/CoreFoundation/module.map")
            .as_std_path()
            .exists()
    );

    // All three variant toolsets exist and the descriptor names each triple.
    for toolset in ["toolset.json", "toolset-threads.json", "toolset-embedded.json"] {
        assert!(sdk_root.join(toolset).as_std_path().exists(), "{toolset}");
    }
    let descriptor: serde_json::Value = serde_json::from_slice(
        &std::fs::read(sdk_root.join("swift-sdk.json").as_std_path()).unwrap(),
    )
    .unwrap();
    assert_eq!(descriptor["schemaVersion"], "4.0");
    let triples = descriptor["targetTriples"].as_object().unwrap();
    assert_eq!(triples.len(), 3);
    assert!(triples.contains_key("wasm32-unknown-wasi"));
    assert!(triples.contains_key("wasm32-unknown-wasip1-threads"));
    assert!(triples.contains_key("wasm32-unknown-wasip1"));
    assert_eq!(
        triples["wasm32-unknown-wasi"]["sdkRootPath"],
        "WASI.sdk"
    );

    // Without a packaged host toolchain the bundle is universal:
    // supportedTriples is absent entirely.
    let manifest: serde_json::Value = serde_json::from_slice(
        &std::fs::read(generator.paths.bundle_manifest_path().as_std_path()).unwrap(),
    )
    .unwrap();
    let artifact = &manifest["artifacts"]["6.0.3-RELEASE_wasm"];
    assert_eq!(artifact["type"], "swiftSDK");
    assert!(artifact["variants"][0].get("supportedTriples").is_none());
}

#[tokio::test]
async fn incremental_rerun_is_byte_identical() {
    if which::which("rsync").is_err() {
        eprintln!("rsync unavailable, skipping");
        return;
    }

    let work = tempfile::tempdir().unwrap();
    let root = utf8(work.path());
    let (package, sysroot) = build_fixtures(&root);
    let recipe = make_recipe(package, sysroot);

    let generator = make_generator(&root, false);
    let engine_handle = make_engine(&root);
    recipe.make_sdk(&generator, &engine_handle).await.unwrap();

    let documents = [
        generator.paths.bundle_manifest_path(),
        generator.paths.sdk_root_path.join("swift-sdk.json"),
        generator.paths.sdk_root_path.join("toolset.json"),
        generator.paths.sdk_root_path.join("toolset-threads.json"),
    ];
    let before: Vec<Vec<u8>> = documents
        .iter()
        .map(|p| std::fs::read(p.as_std_path()).unwrap())
        .collect();

    let incremental = make_generator(&root, true);
    recipe.make_sdk(&incremental, &engine_handle).await.unwrap();

    for (path, expected) in documents.iter().zip(&before) {
        let after = std::fs::read(path.as_std_path()).unwrap();
        assert_eq!(&after, expected, "{path} changed across incremental runs");
    }
}
