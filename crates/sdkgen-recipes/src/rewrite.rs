//! Sysroot path rewriting: absolute symlinks and the glibc module map.

use camino::{Utf8Path, Utf8PathBuf};
use regex::Regex;
use sdkgen_fs::FileSystem;
use std::sync::{Arc, LazyLock};

use crate::error::RecipeError;

const MODULEMAP_LIMIT: usize = 4 * 1024 * 1024;
const MAX_SYMLINK_HOPS: usize = 40;

/// Exact content of every forwarding header written under
/// `private_includes/`, whichever directive it stands in for.
const FORWARDING_HEADER: &str = "#include <linux/uuid.h>\n";

/// `header "/usr/include/[<arch>-linux-gnu/]<path>"` directives.
static HEADER_DIRECTIVE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"header\s+"/usr/include/((?:[A-Za-z0-9_.]+-linux-gnu[A-Za-z0-9_.]*/)?)([^"]+)""#)
        .expect("directive pattern compiles")
});

/// Lexically normalize a path, resolving `.` and `..` components.
#[must_use]
pub fn normalize(path: &Utf8Path) -> Utf8PathBuf {
    let mut stack: Vec<&str> = Vec::new();
    let mut prefix_root = false;
    for component in path.as_str().split('/') {
        match component {
            "" => {
                if stack.is_empty() && !prefix_root {
                    prefix_root = true;
                }
            }
            "." => {}
            ".." => {
                if matches!(stack.last(), Some(&"..")) || (stack.is_empty() && !prefix_root) {
                    stack.push("..");
                } else if !stack.is_empty() {
                    stack.pop();
                }
            }
            other => stack.push(other),
        }
    }
    let mut joined = stack.join("/");
    if prefix_root {
        joined.insert(0, '/');
    }
    if joined.is_empty() {
        joined.push('.');
    }
    Utf8PathBuf::from(joined)
}

/// Rewrite an absolute target as a path relative to the symlink's parent,
/// treating the sysroot as the filesystem root.
///
/// One `..` per component between the parent and the sysroot, then the
/// target without its leading slash; shared leading components cancel, so a
/// target in the link's own directory reduces to its basename.
fn sysroot_relative_target(
    sysroot: &Utf8Path,
    link_parent: &Utf8Path,
    target: &Utf8Path,
) -> Utf8PathBuf {
    let from: Vec<&str> = link_parent
        .strip_prefix(sysroot)
        .map(|p| p.as_str().split('/').filter(|c| !c.is_empty()).collect())
        .unwrap_or_default();
    let to: Vec<&str> = target
        .as_str()
        .trim_start_matches('/')
        .split('/')
        .filter(|c| !c.is_empty())
        .collect();

    let common = from
        .iter()
        .zip(to.iter())
        .take_while(|(a, b)| a == b)
        .count();
    let mut parts: Vec<&str> = Vec::new();
    for _ in common..from.len() {
        parts.push("..");
    }
    parts.extend(&to[common..]);
    Utf8PathBuf::from(parts.join("/"))
}

/// Follow a symlink chain lexically; true when it ends at something that
/// exists.
async fn chain_resolves(fs: &Arc<dyn FileSystem>, start: &Utf8Path) -> bool {
    let mut current = start.to_owned();
    for _ in 0..MAX_SYMLINK_HOPS {
        match fs.read_symlink(&current).await {
            Ok(target) => {
                if target.as_str().starts_with('/') {
                    // Absolute targets are exactly what fixup removes; a
                    // chain ending in one does not resolve inside the
                    // sysroot.
                    return false;
                }
                let parent = current.parent().unwrap_or(Utf8Path::new("."));
                current = normalize(&parent.join(target));
            }
            Err(_) => return fs.exists(&current).await,
        }
    }
    false
}

/// Rewrite every absolute symlink under `sysroot` to a sysroot-relative one.
///
/// Links whose target points into `/etc` are deleted instead: host
/// configuration has no meaning inside a cross-compilation sysroot. After
/// each rewrite the link must resolve, or the run fails.
pub async fn fix_absolute_symlinks(
    fs: &Arc<dyn FileSystem>,
    sysroot: &Utf8Path,
) -> Result<(), RecipeError> {
    for link in fs.enumerate_symlinks(sysroot).await? {
        let target = fs.read_symlink(&link).await?;
        if !target.as_str().starts_with('/') {
            continue;
        }
        if target.starts_with("/etc") {
            tracing::debug!(link = %link, "deleting symlink into /etc");
            fs.remove_recursively(&link).await?;
            continue;
        }

        let parent = link.parent().unwrap_or(sysroot);
        let relative = sysroot_relative_target(sysroot, parent, &target);

        tracing::debug!(link = %link, target = %relative, "rewriting absolute symlink");
        fs.create_symlink(&link, &relative).await?;

        let resolved = normalize(&parent.join(&relative));
        if !chain_resolves(fs, &resolved).await {
            return Err(RecipeError::SymlinkFixupFailed {
                link,
                target: relative,
            });
        }
    }
    Ok(())
}

/// Rewrite `header "/usr/include/..."` directives in a glibc-style module
/// map to forwarding headers under `private_includes/`, writing each
/// forwarding header next to the map. Every forwarding header gets the same
/// fixed [`FORWARDING_HEADER`] line.
pub async fn rewrite_glibc_modulemap(
    fs: &Arc<dyn FileSystem>,
    modulemap_path: &Utf8Path,
) -> Result<(), RecipeError> {
    let bytes = fs.read_to_end(modulemap_path, MODULEMAP_LIMIT).await?;
    let text = String::from_utf8_lossy(&bytes).to_string();

    let map_dir = modulemap_path
        .parent()
        .unwrap_or(Utf8Path::new("."))
        .to_owned();
    let mut forwards: Vec<Utf8PathBuf> = Vec::new();
    let rewritten = HEADER_DIRECTIVE
        .replace_all(&text, |captures: &regex::Captures<'_>| {
            let flattened = captures[2].replace('/', "_");
            forwards.push(map_dir.join("private_includes").join(&flattened));
            format!("header \"private_includes/{flattened}\"")
        })
        .to_string();

    if forwards.is_empty() {
        return Ok(());
    }
    for path in forwards {
        fs.write(&path, FORWARDING_HEADER.as_bytes()).await?;
    }
    fs.write(modulemap_path, rewritten.as_bytes()).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sdkgen_fs::VirtualFileSystem;

    fn shared(fs: &VirtualFileSystem) -> Arc<dyn FileSystem> {
        Arc::new(fs.clone())
    }

    #[test]
    fn normalization() {
        assert_eq!(normalize(Utf8Path::new("a/b/../c")), Utf8PathBuf::from("a/c"));
        assert_eq!(
            normalize(Utf8Path::new("../../usr/lib/libc.so.6")),
            Utf8PathBuf::from("../../usr/lib/libc.so.6")
        );
        assert_eq!(
            normalize(Utf8Path::new("/root/usr/lib/../../x")),
            Utf8PathBuf::from("/root/x")
        );
        assert_eq!(normalize(Utf8Path::new("a/./b")), Utf8PathBuf::from("a/b"));
    }

    #[tokio::test]
    async fn absolute_link_in_same_directory_becomes_basename() {
        let vfs = VirtualFileSystem::new();
        let fs = shared(&vfs);
        let sysroot = Utf8Path::new("/sysroot");
        vfs.write(&sysroot.join("usr/lib/libc.so.6"), b"elf")
            .await
            .unwrap();
        vfs.create_symlink(
            &sysroot.join("usr/lib/liba.so"),
            Utf8Path::new("/usr/lib/libc.so.6"),
        )
        .await
        .unwrap();

        fix_absolute_symlinks(&fs, sysroot).await.unwrap();

        let target = vfs.read_symlink(&sysroot.join("usr/lib/liba.so")).await.unwrap();
        assert_eq!(target, Utf8PathBuf::from("libc.so.6"));
    }

    #[tokio::test]
    async fn cross_directory_link_gains_parent_components() {
        let vfs = VirtualFileSystem::new();
        let fs = shared(&vfs);
        let sysroot = Utf8Path::new("/sysroot");
        vfs.write(&sysroot.join("lib/ld-linux.so.2"), b"elf")
            .await
            .unwrap();
        vfs.create_symlink(
            &sysroot.join("usr/lib/ld.so"),
            Utf8Path::new("/lib/ld-linux.so.2"),
        )
        .await
        .unwrap();

        fix_absolute_symlinks(&fs, sysroot).await.unwrap();
        let target = vfs.read_symlink(&sysroot.join("usr/lib/ld.so")).await.unwrap();
        assert_eq!(target, Utf8PathBuf::from("../../lib/ld-linux.so.2"));
    }

    #[tokio::test]
    async fn etc_links_are_deleted() {
        let vfs = VirtualFileSystem::new();
        let fs = shared(&vfs);
        let sysroot = Utf8Path::new("/sysroot");
        vfs.create_symlink(
            &sysroot.join("usr/lib/localtime"),
            Utf8Path::new("/etc/localtime"),
        )
        .await
        .unwrap();

        fix_absolute_symlinks(&fs, sysroot).await.unwrap();
        assert!(!vfs.exists(&sysroot.join("usr/lib/localtime")).await);
    }

    #[tokio::test]
    async fn dangling_rewrite_fails() {
        let vfs = VirtualFileSystem::new();
        let fs = shared(&vfs);
        let sysroot = Utf8Path::new("/sysroot");
        vfs.create_symlink(
            &sysroot.join("usr/lib/libmissing.so"),
            Utf8Path::new("/usr/lib/nothing-here.so"),
        )
        .await
        .unwrap();

        let err = fix_absolute_symlinks(&fs, sysroot).await.unwrap_err();
        assert!(matches!(err, RecipeError::SymlinkFixupFailed { .. }));
    }

    #[tokio::test]
    async fn chained_links_resolve_through_intermediates() {
        let vfs = VirtualFileSystem::new();
        let fs = shared(&vfs);
        let sysroot = Utf8Path::new("/sysroot");
        vfs.write(&sysroot.join("usr/lib/libreal.so.1.2"), b"elf")
            .await
            .unwrap();
        vfs.create_symlink(
            &sysroot.join("usr/lib/libreal.so.1"),
            Utf8Path::new("libreal.so.1.2"),
        )
        .await
        .unwrap();
        vfs.create_symlink(
            &sysroot.join("usr/lib/libreal.so"),
            Utf8Path::new("/usr/lib/libreal.so.1"),
        )
        .await
        .unwrap();

        fix_absolute_symlinks(&fs, sysroot).await.unwrap();
        assert_eq!(
            vfs.read_symlink(&sysroot.join("usr/lib/libreal.so")).await.unwrap(),
            Utf8PathBuf::from("libreal.so.1")
        );
    }

    #[tokio::test]
    async fn no_absolute_targets_remain_after_fixup() {
        let vfs = VirtualFileSystem::new();
        let fs = shared(&vfs);
        let sysroot = Utf8Path::new("/sysroot");
        vfs.write(&sysroot.join("usr/lib/libc.so.6"), b"elf")
            .await
            .unwrap();
        vfs.write(&sysroot.join("lib/libz.so.1"), b"elf").await.unwrap();
        for (link, target) in [
            ("usr/lib/a.so", "/usr/lib/libc.so.6"),
            ("usr/lib/b.so", "/lib/libz.so.1"),
            ("lib/c.so", "/usr/lib/libc.so.6"),
            ("usr/lib/already-relative.so", "libc.so.6"),
        ] {
            vfs.create_symlink(&sysroot.join(link), Utf8Path::new(target))
                .await
                .unwrap();
        }

        fix_absolute_symlinks(&fs, sysroot).await.unwrap();
        for link in vfs.enumerate_symlinks(sysroot).await.unwrap() {
            let target = vfs.read_symlink(&link).await.unwrap();
            assert!(
                !target.as_str().starts_with('/'),
                "{link} still points at {target}"
            );
        }
    }

    #[tokio::test]
    async fn modulemap_headers_are_flattened() {
        let vfs = VirtualFileSystem::new();
        let fs = shared(&vfs);
        let map = Utf8Path::new("/sysroot/usr/lib/swift/linux/x86_64/glibc.modulemap");
        vfs.write(
            map,
            b"module CUUID [system] {\n  header \"/usr/include/linux/uuid.h\"\n  export *\n}\n",
        )
        .await
        .unwrap();

        rewrite_glibc_modulemap(&fs, map).await.unwrap();

        let text = String::from_utf8(vfs.read_to_end(map, 1 << 20).await.unwrap()).unwrap();
        assert!(text.contains("header \"private_includes/linux_uuid.h\""));
        assert!(!text.contains("/usr/include"));

        let forward = vfs
            .read_to_end(
                Utf8Path::new(
                    "/sysroot/usr/lib/swift/linux/x86_64/private_includes/linux_uuid.h",
                ),
                1 << 20,
            )
            .await
            .unwrap();
        assert_eq!(forward, b"#include <linux/uuid.h>\n");
    }

    #[tokio::test]
    async fn modulemap_arch_prefix_is_dropped_when_flattening() {
        let vfs = VirtualFileSystem::new();
        let fs = shared(&vfs);
        let map = Utf8Path::new("/sysroot/usr/lib/swift/linux/glibc.modulemap");
        vfs.write(
            map,
            b"header \"/usr/include/x86_64-linux-gnu/sys/stat.h\"\n",
        )
        .await
        .unwrap();

        rewrite_glibc_modulemap(&fs, map).await.unwrap();
        let text = String::from_utf8(vfs.read_to_end(map, 1 << 20).await.unwrap()).unwrap();
        assert!(text.contains("header \"private_includes/sys_stat.h\""));

        let forward = vfs
            .read_to_end(
                Utf8Path::new("/sysroot/usr/lib/swift/linux/private_includes/sys_stat.h"),
                1 << 20,
            )
            .await
            .unwrap();
        assert_eq!(forward, b"#include <linux/uuid.h>\n");
    }

    #[tokio::test]
    async fn forwarding_headers_carry_the_fixed_content() {
        // The forwarded line is the same for every match, not derived from
        // the header the directive named.
        let vfs = VirtualFileSystem::new();
        let fs = shared(&vfs);
        let map = Utf8Path::new("/m/glibc.modulemap");
        vfs.write(
            map,
            b"module CIoctl [system] {\n  header \"/usr/include/asm/ioctl.h\"\n  export *\n}\n",
        )
        .await
        .unwrap();

        rewrite_glibc_modulemap(&fs, map).await.unwrap();

        let text = String::from_utf8(vfs.read_to_end(map, 1 << 20).await.unwrap()).unwrap();
        assert!(text.contains("header \"private_includes/asm_ioctl.h\""));
        let forward = vfs
            .read_to_end(Utf8Path::new("/m/private_includes/asm_ioctl.h"), 1 << 20)
            .await
            .unwrap();
        assert_eq!(forward, b"#include <linux/uuid.h>\n");
    }

    #[tokio::test]
    async fn modulemap_without_absolute_headers_is_untouched() {
        let vfs = VirtualFileSystem::new();
        let fs = shared(&vfs);
        let map = Utf8Path::new("/m/glibc.modulemap");
        let original = b"module Glibc {\n  header \"relative.h\"\n}\n";
        vfs.write(map, original).await.unwrap();

        rewrite_glibc_modulemap(&fs, map).await.unwrap();
        assert_eq!(vfs.read_to_end(map, 1 << 20).await.unwrap(), original);
    }
}
