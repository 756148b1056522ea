//! OS-backed filesystem implementation.

use async_trait::async_trait;
use camino::{Utf8Path, Utf8PathBuf};
use sha2::{Digest, Sha256};
use tokio::io::AsyncReadExt;

use crate::{ChunkStream, FileSystem, FsError};

/// Default size of chunks produced by [`FileSystem::open_read`].
pub const DEFAULT_CHUNK_SIZE: usize = 512 * 1024;

/// Filesystem backed by the operating system via `tokio::fs`.
#[derive(Debug, Clone)]
pub struct OsFileSystem {
    chunk_size: usize,
}

impl Default for OsFileSystem {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_SIZE)
    }
}

impl OsFileSystem {
    /// Create a filesystem reading in chunks of `chunk_size` bytes.
    #[must_use]
    pub fn new(chunk_size: usize) -> Self {
        assert!(chunk_size > 0, "chunk size must be non-zero");
        Self { chunk_size }
    }
}

#[async_trait]
impl FileSystem for OsFileSystem {
    async fn open_read(&self, path: &Utf8Path) -> Result<ChunkStream, FsError> {
        let file = tokio::fs::File::open(path.as_std_path())
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => FsError::FileDoesNotExist(path.to_owned()),
                _ => FsError::io(path, e),
            })?;
        let chunk_size = self.chunk_size;
        let path = path.to_owned();
        let stream = futures::stream::unfold(Some((file, path)), move |state| async move {
            let (mut file, path) = state?;
            let mut buf = vec![0u8; chunk_size];
            match file.read(&mut buf).await {
                Ok(0) => None,
                Ok(n) => {
                    buf.truncate(n);
                    Some((Ok(buf), Some((file, path))))
                }
                Err(e) => Some((Err(FsError::io(path, e)), None)),
            }
        });
        Ok(Box::pin(stream))
    }

    async fn read_to_end(&self, path: &Utf8Path, limit: usize) -> Result<Vec<u8>, FsError> {
        let mut file = tokio::fs::File::open(path.as_std_path())
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => FsError::FileDoesNotExist(path.to_owned()),
                _ => FsError::io(path, e),
            })?;
        let mut out = Vec::new();
        let mut buf = vec![0u8; self.chunk_size.min(limit.max(1))];
        loop {
            let n = file
                .read(&mut buf)
                .await
                .map_err(|e| FsError::io(path, e))?;
            if n == 0 {
                return Ok(out);
            }
            if out.len() + n > limit {
                return Err(FsError::BufferLimitExceeded(path.to_owned()));
            }
            out.extend_from_slice(&buf[..n]);
        }
    }

    async fn write(&self, path: &Utf8Path, bytes: &[u8]) -> Result<(), FsError> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent.as_std_path())
                .await
                .map_err(|_| FsError::DirectoryCreationFailed(parent.to_owned()))?;
        }
        // Atomic temp-file-and-rename so emitted documents are never
        // observable half-written.
        let path_owned = path.to_owned();
        let bytes = bytes.to_vec();
        tokio::task::spawn_blocking(move || {
            sdkgen_utils::write_file_atomic(&path_owned, &bytes)
                .map_err(|e| FsError::io(path_owned.clone(), std::io::Error::other(e.to_string())))
        })
        .await
        .map_err(|e| FsError::io(path, std::io::Error::other(e.to_string())))?
    }

    async fn sha256_hex(&self, path: &Utf8Path) -> Result<String, FsError> {
        let mut file = tokio::fs::File::open(path.as_std_path())
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => FsError::FileDoesNotExist(path.to_owned()),
                _ => FsError::io(path, e),
            })?;
        let mut hasher = Sha256::new();
        let mut buf = vec![0u8; self.chunk_size];
        loop {
            let n = file
                .read(&mut buf)
                .await
                .map_err(|e| FsError::io(path, e))?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
        Ok(format!("{:x}", hasher.finalize()))
    }

    async fn exists(&self, path: &Utf8Path) -> bool {
        // symlink_metadata so dangling symlinks still count as present
        tokio::fs::symlink_metadata(path.as_std_path()).await.is_ok()
    }

    async fn copy(&self, from: &Utf8Path, to: &Utf8Path) -> Result<(), FsError> {
        if let Some(parent) = to.parent() {
            tokio::fs::create_dir_all(parent.as_std_path())
                .await
                .map_err(|_| FsError::DirectoryCreationFailed(parent.to_owned()))?;
        }
        tokio::fs::copy(from.as_std_path(), to.as_std_path())
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => FsError::FileDoesNotExist(from.to_owned()),
                _ => FsError::io(from, e),
            })?;
        Ok(())
    }

    async fn create_dir_all(&self, path: &Utf8Path) -> Result<(), FsError> {
        tokio::fs::create_dir_all(path.as_std_path())
            .await
            .map_err(|_| FsError::DirectoryCreationFailed(path.to_owned()))
    }

    async fn remove_recursively(&self, path: &Utf8Path) -> Result<(), FsError> {
        let meta = match tokio::fs::symlink_metadata(path.as_std_path()).await {
            Ok(meta) => meta,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(FsError::io(path, e)),
        };
        let result = if meta.is_dir() {
            tokio::fs::remove_dir_all(path.as_std_path()).await
        } else {
            tokio::fs::remove_file(path.as_std_path()).await
        };
        result.map_err(|e| FsError::io(path, e))
    }

    #[cfg(unix)]
    async fn create_symlink(&self, at: &Utf8Path, target: &Utf8Path) -> Result<(), FsError> {
        if let Some(parent) = at.parent() {
            tokio::fs::create_dir_all(parent.as_std_path())
                .await
                .map_err(|_| FsError::DirectoryCreationFailed(parent.to_owned()))?;
        }
        // Replace an existing link in place so fixup passes are idempotent.
        match tokio::fs::symlink_metadata(at.as_std_path()).await {
            Ok(_) => tokio::fs::remove_file(at.as_std_path())
                .await
                .map_err(|e| FsError::io(at, e))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(FsError::io(at, e)),
        }
        tokio::fs::symlink(target.as_std_path(), at.as_std_path())
            .await
            .map_err(|e| FsError::io(at, e))
    }

    #[cfg(not(unix))]
    async fn create_symlink(&self, _at: &Utf8Path, _target: &Utf8Path) -> Result<(), FsError> {
        Err(FsError::SymlinksUnsupported)
    }

    async fn read_symlink(&self, path: &Utf8Path) -> Result<Utf8PathBuf, FsError> {
        let target = tokio::fs::read_link(path.as_std_path())
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => FsError::FileDoesNotExist(path.to_owned()),
                _ => FsError::io(path, e),
            })?;
        Utf8PathBuf::from_path_buf(target).map_err(|p| FsError::NonUtf8Path(p.display().to_string()))
    }

    async fn read_dir(&self, dir: &Utf8Path) -> Result<Vec<Utf8PathBuf>, FsError> {
        let mut entries = tokio::fs::read_dir(dir.as_std_path())
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => FsError::FileDoesNotExist(dir.to_owned()),
                _ => FsError::io(dir, e),
            })?;
        let mut children = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| FsError::io(dir, e))?
        {
            let path = Utf8PathBuf::from_path_buf(entry.path())
                .map_err(|p| FsError::NonUtf8Path(p.display().to_string()))?;
            children.push(path);
        }
        children.sort();
        Ok(children)
    }

    async fn enumerate_symlinks(&self, dir: &Utf8Path) -> Result<Vec<Utf8PathBuf>, FsError> {
        let root = dir.to_owned();
        tokio::task::spawn_blocking(move || {
            let mut links = Vec::new();
            for entry in walkdir::WalkDir::new(root.as_std_path())
                .sort_by_file_name()
                .into_iter()
            {
                let entry = entry.map_err(|e| {
                    let io = e
                        .into_io_error()
                        .unwrap_or_else(|| std::io::Error::other("walk error"));
                    FsError::io(root.clone(), io)
                })?;
                if entry.path_is_symlink() {
                    let path = Utf8PathBuf::from_path_buf(entry.path().to_path_buf())
                        .map_err(|p| FsError::NonUtf8Path(p.display().to_string()))?;
                    links.push(path);
                }
            }
            links.sort();
            Ok(links)
        })
        .await
        .unwrap_or_else(|e| {
            Err(FsError::io(
                dir.to_owned(),
                std::io::Error::other(e.to_string()),
            ))
        })
    }
}
