//! Archive extraction dispatched on the file suffix.
//!
//! Extraction shells out to the platform tools (`tar`, `gzip`, `ar`, `xar`,
//! `cpio`); intermediate steps run inside scoped temp directories so nothing
//! leaks on failure. Component stripping applies to the tar formats only.

use camino::{Utf8Path, Utf8PathBuf};
use sdkgen_fs::{FsError, in_temp_dir};
use sdkgen_runner::{
    CommandSpec, ProcessSpec, RunnerError, StdinSource, StdioMode, run_checking_success,
};

/// Archive extraction errors.
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("unknown archive format: {}", .0.as_deref().unwrap_or("<no extension>"))]
    UnknownArchiveFormat(Option<String>),

    #[error("{archive} does not contain expected member {member}")]
    MissingArchiveMember {
        archive: Utf8PathBuf,
        member: String,
    },

    #[error(transparent)]
    Runner(#[from] RunnerError),

    #[error(transparent)]
    Fs(#[from] FsError),
}

/// Recognized archive families.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArchiveKind {
    TarGz,
    TarXz,
    Tar,
    Gz,
    Deb,
    Pkg,
}

fn detect(path: &Utf8Path) -> Result<ArchiveKind, ArchiveError> {
    let name = path.file_name().unwrap_or("");
    if name.ends_with(".tar.gz") {
        Ok(ArchiveKind::TarGz)
    } else if name.ends_with(".tar.xz") || name.ends_with(".txz") {
        Ok(ArchiveKind::TarXz)
    } else if name.ends_with(".tar") {
        Ok(ArchiveKind::Tar)
    } else if name.ends_with(".gz") {
        Ok(ArchiveKind::Gz)
    } else if name.ends_with(".deb") {
        Ok(ArchiveKind::Deb)
    } else if name.ends_with(".pkg") {
        Ok(ArchiveKind::Pkg)
    } else {
        Err(ArchiveError::UnknownArchiveFormat(
            path.extension().map(str::to_string),
        ))
    }
}

/// Extract `archive` into `dest`, creating it first.
///
/// `strip_components` drops leading path components and is honored for the
/// tar formats only.
pub async fn extract(
    archive: &Utf8Path,
    dest: &Utf8Path,
    strip_components: Option<u32>,
) -> Result<(), ArchiveError> {
    let kind = detect(archive)?;
    tokio::fs::create_dir_all(dest.as_std_path())
        .await
        .map_err(|_| FsError::DirectoryCreationFailed(dest.to_owned()))?;
    tracing::debug!(archive = %archive, dest = %dest, "extracting");

    match kind {
        ArchiveKind::TarGz => extract_tar(archive, dest, "-xzf", strip_components).await,
        ArchiveKind::TarXz => extract_tar(archive, dest, "-xJf", strip_components).await,
        ArchiveKind::Tar => extract_tar(archive, dest, "-xf", strip_components).await,
        ArchiveKind::Gz => extract_gz(archive, dest).await,
        ArchiveKind::Deb => extract_deb(archive, dest).await,
        ArchiveKind::Pkg => extract_pkg(archive, dest).await,
    }
}

async fn extract_tar(
    archive: &Utf8Path,
    dest: &Utf8Path,
    flags: &str,
    strip_components: Option<u32>,
) -> Result<(), ArchiveError> {
    let mut command = CommandSpec::new("tar")
        .arg(flags)
        .arg(archive.as_str())
        .current_dir(dest);
    if let Some(n) = strip_components {
        command = command.arg(format!("--strip-components={n}"));
    }
    run_checking_success(ProcessSpec::new(command)).await?;
    Ok(())
}

/// Plain `.gz`: decompress next to nothing else, leaving the decompressed
/// file in `dest` under the archive's stem name.
async fn extract_gz(archive: &Utf8Path, dest: &Utf8Path) -> Result<(), ArchiveError> {
    let name = archive.file_name().unwrap_or("archive.gz");
    let staged = dest.join(name);
    tokio::fs::copy(archive.as_std_path(), staged.as_std_path())
        .await
        .map_err(|e| FsError::Io {
            path: staged.clone(),
            source: e,
        })?;
    run_checking_success(ProcessSpec::new(
        CommandSpec::new("gzip").arg("-d").arg(staged.as_str()),
    ))
    .await?;
    Ok(())
}

/// Debian package: `ar -x` into a temp dir, then unpack the inner
/// `data.tar.*` into `dest`.
async fn extract_deb(archive: &Utf8Path, dest: &Utf8Path) -> Result<(), ArchiveError> {
    let archive = archive.to_owned();
    let dest = dest.to_owned();
    in_temp_dir(move |tmp| async move {
        run_checking_success(ProcessSpec::new(
            CommandSpec::new("ar")
                .arg("-x")
                .arg(archive.as_str())
                .current_dir(&tmp),
        ))
        .await?;

        let data_tar = find_member(&tmp, "data.tar").await?.ok_or_else(|| {
            ArchiveError::MissingArchiveMember {
                archive: archive.clone(),
                member: "data.tar.*".to_string(),
            }
        })?;
        run_checking_success(ProcessSpec::new(
            CommandSpec::new("tar")
                .arg("-xf")
                .arg(data_tar.as_str())
                .current_dir(&dest),
        ))
        .await?;
        Ok(())
    })
    .await
}

/// macOS installer package: `xar -xf` into a temp dir, then decompress the
/// inner `Payload` and feed it to `cpio -i` inside `dest`.
async fn extract_pkg(archive: &Utf8Path, dest: &Utf8Path) -> Result<(), ArchiveError> {
    let archive = archive.to_owned();
    let dest = dest.to_owned();
    in_temp_dir(move |tmp| async move {
        run_checking_success(ProcessSpec::new(
            CommandSpec::new("xar")
                .arg("-xf")
                .arg(archive.as_str())
                .current_dir(&tmp),
        ))
        .await?;

        let payload = find_pkg_payload(&tmp).await?.ok_or_else(|| {
            ArchiveError::MissingArchiveMember {
                archive: archive.clone(),
                member: "*.pkg/Payload".to_string(),
            }
        })?;

        let cpio_archive = tmp.join("payload.cpio");
        run_checking_success(
            ProcessSpec::new(CommandSpec::new("gunzip").arg("-cd"))
                .stdin(StdinSource::File(payload))
                .stdout(StdioMode::File(cpio_archive.clone())),
        )
        .await?;
        run_checking_success(
            ProcessSpec::new(CommandSpec::new("cpio").arg("-i").current_dir(&dest))
                .stdin(StdinSource::File(cpio_archive)),
        )
        .await?;
        Ok(())
    })
    .await
}

/// First directory entry whose name starts with `prefix`.
async fn find_member(
    dir: &Utf8Path,
    prefix: &str,
) -> Result<Option<Utf8PathBuf>, ArchiveError> {
    let mut entries = tokio::fs::read_dir(dir.as_std_path())
        .await
        .map_err(|e| FsError::Io {
            path: dir.to_owned(),
            source: e,
        })?;
    let mut found = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(|e| FsError::Io {
        path: dir.to_owned(),
        source: e,
    })? {
        let name = entry.file_name().to_string_lossy().to_string();
        if name.starts_with(prefix) {
            found.push(dir.join(name));
        }
    }
    found.sort();
    Ok(found.into_iter().next())
}

/// Locate `<anything>.pkg/Payload` under an unpacked xar archive.
async fn find_pkg_payload(dir: &Utf8Path) -> Result<Option<Utf8PathBuf>, ArchiveError> {
    let mut entries = tokio::fs::read_dir(dir.as_std_path())
        .await
        .map_err(|e| FsError::Io {
            path: dir.to_owned(),
            source: e,
        })?;
    let mut candidates = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(|e| FsError::Io {
        path: dir.to_owned(),
        source: e,
    })? {
        let name = entry.file_name().to_string_lossy().to_string();
        if name.ends_with(".pkg") {
            let payload = dir.join(&name).join("Payload");
            if tokio::fs::metadata(payload.as_std_path()).await.is_ok() {
                candidates.push(payload);
            }
        }
    }
    candidates.sort();
    Ok(candidates.into_iter().next())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatch_recognizes_suffixes() {
        assert_eq!(detect(Utf8Path::new("a.tar.gz")).unwrap(), ArchiveKind::TarGz);
        assert_eq!(detect(Utf8Path::new("a.tar.xz")).unwrap(), ArchiveKind::TarXz);
        assert_eq!(detect(Utf8Path::new("a.txz")).unwrap(), ArchiveKind::TarXz);
        assert_eq!(detect(Utf8Path::new("a.tar")).unwrap(), ArchiveKind::Tar);
        assert_eq!(detect(Utf8Path::new("Packages.gz")).unwrap(), ArchiveKind::Gz);
        assert_eq!(detect(Utf8Path::new("pkg.deb")).unwrap(), ArchiveKind::Deb);
        assert_eq!(detect(Utf8Path::new("swift.pkg")).unwrap(), ArchiveKind::Pkg);
    }

    #[test]
    fn unknown_suffix_is_an_error() {
        match detect(Utf8Path::new("bundle.zip")) {
            Err(ArchiveError::UnknownArchiveFormat(Some(ext))) => assert_eq!(ext, "zip"),
            other => panic!("unexpected: {other:?}"),
        }
        assert!(matches!(
            detect(Utf8Path::new("noext")),
            Err(ArchiveError::UnknownArchiveFormat(None))
        ));
    }

    #[tokio::test]
    async fn extracts_tar_gz_with_strip_components() {
        // Build top/inner/file.txt inside a tarball, then strip `top`.
        let work = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(work.path().to_path_buf()).unwrap();
        let tree = root.join("top/inner");
        std::fs::create_dir_all(tree.as_std_path()).unwrap();
        std::fs::write(tree.join("file.txt").as_std_path(), b"payload").unwrap();

        let archive = root.join("bundle.tar.gz");
        run_checking_success(ProcessSpec::new(
            CommandSpec::new("tar")
                .arg("-czf")
                .arg(archive.as_str())
                .arg("top")
                .current_dir(&root),
        ))
        .await
        .unwrap();

        let dest = root.join("out");
        extract(&archive, &dest, Some(1)).await.unwrap();
        assert!(dest.join("inner/file.txt").as_std_path().exists());
        assert!(!dest.join("top").as_std_path().exists());
    }

    #[tokio::test]
    async fn extracts_plain_gz() {
        use flate2::Compression;
        use flate2::write::GzEncoder;
        use std::io::Write;

        let work = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(work.path().to_path_buf()).unwrap();
        let archive = root.join("notes.txt.gz");
        let mut encoder = GzEncoder::new(
            std::fs::File::create(archive.as_std_path()).unwrap(),
            Compression::default(),
        );
        encoder.write_all(b"decompressed contents").unwrap();
        encoder.finish().unwrap();

        let dest = root.join("out");
        extract(&archive, &dest, None).await.unwrap();
        assert_eq!(
            std::fs::read(dest.join("notes.txt").as_std_path()).unwrap(),
            b"decompressed contents"
        );
    }
}
