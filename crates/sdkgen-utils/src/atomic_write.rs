//! Atomic file writes: temp file in the target directory, fsync, rename.
//!
//! Emitted metadata documents must never be observable half-written; a
//! crashed run leaves either the old file or the new one.

use anyhow::{Context, Result};
use camino::Utf8Path;
use std::fs;
use std::io::Write;

use tempfile::NamedTempFile;

/// Atomically write `content` to `path`.
///
/// The temporary file is created in the same directory as the target so the
/// final rename stays on one filesystem.
pub fn write_file_atomic(path: &Utf8Path, content: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create parent directory {parent}"))?;
    }

    let dir = path.parent().unwrap_or_else(|| Utf8Path::new("."));
    let mut temp = NamedTempFile::new_in(dir)
        .with_context(|| format!("failed to create temporary file in {dir}"))?;

    temp.write_all(content)
        .with_context(|| format!("failed to write temporary file for {path}"))?;
    temp.as_file()
        .sync_all()
        .with_context(|| format!("failed to fsync temporary file for {path}"))?;

    temp.persist(path.as_std_path())
        .with_context(|| format!("failed to rename temporary file into place at {path}"))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;

    fn temp_target(name: &str) -> (tempfile::TempDir, Utf8PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = Utf8PathBuf::from_path_buf(dir.path().join(name)).unwrap();
        (dir, path)
    }

    #[test]
    fn writes_new_file() {
        let (_dir, path) = temp_target("out.json");
        write_file_atomic(&path, b"{}\n").unwrap();
        assert_eq!(fs::read(path.as_std_path()).unwrap(), b"{}\n");
    }

    #[test]
    fn replaces_existing_file() {
        let (_dir, path) = temp_target("out.json");
        write_file_atomic(&path, b"old").unwrap();
        write_file_atomic(&path, b"new").unwrap();
        assert_eq!(fs::read(path.as_std_path()).unwrap(), b"new");
    }

    #[test]
    fn creates_missing_parent_directories() {
        let (_dir, base) = temp_target("nested");
        let path = base.join("a/b/out.json");
        write_file_atomic(&path, b"deep").unwrap();
        assert_eq!(fs::read(path.as_std_path()).unwrap(), b"deep");
    }

    #[test]
    fn leaves_no_temp_files_behind() {
        let (dir, path) = temp_target("out.json");
        write_file_atomic(&path, b"x").unwrap();
        let entries: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(entries.len(), 1);
    }
}
