//! Async filesystem abstraction.
//!
//! Queries and recipes go through [`FileSystem`] rather than `tokio::fs`
//! directly so they can run against the in-memory [`VirtualFileSystem`] in
//! tests. The two implementations share semantics: streaming reads, symlink
//! enumeration, and hashing behave identically on both.

pub mod os_fs;
pub mod virtual_fs;

pub use os_fs::OsFileSystem;
pub use virtual_fs::VirtualFileSystem;

use async_trait::async_trait;
use camino::{Utf8Path, Utf8PathBuf};
use futures::Stream;
use std::pin::Pin;

/// Stream of byte chunks from [`FileSystem::open_read`].
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<Vec<u8>, FsError>> + Send>>;

/// Filesystem errors. Variants carry the path they concern.
#[derive(Debug, thiserror::Error)]
pub enum FsError {
    #[error("file does not exist: {0}")]
    FileDoesNotExist(Utf8PathBuf),

    #[error("failed to create directory: {0}")]
    DirectoryCreationFailed(Utf8PathBuf),

    #[error("read of {0} exceeded the buffer limit")]
    BufferLimitExceeded(Utf8PathBuf),

    #[error("path is not valid UTF-8: {0}")]
    NonUtf8Path(String),

    #[error("symlinks are not supported on this platform")]
    SymlinksUnsupported,

    #[error("I/O error on {path}: {source}")]
    Io {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl FsError {
    pub(crate) fn io(path: impl Into<Utf8PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Uniform async filesystem interface.
///
/// All paths are UTF-8. Implementations must close every handle they open on
/// all exit paths; callers must not retain streams past the operation that
/// produced them.
#[async_trait]
pub trait FileSystem: Send + Sync {
    /// Open `path` for reading as a stream of byte chunks.
    async fn open_read(&self, path: &Utf8Path) -> Result<ChunkStream, FsError>;

    /// Read the whole file, failing with [`FsError::BufferLimitExceeded`]
    /// once `limit` bytes have been surpassed.
    async fn read_to_end(&self, path: &Utf8Path, limit: usize) -> Result<Vec<u8>, FsError>;

    /// Create or replace the file at `path` with `bytes`.
    async fn write(&self, path: &Utf8Path, bytes: &[u8]) -> Result<(), FsError>;

    /// SHA-256 of the file contents as lowercase hex.
    async fn sha256_hex(&self, path: &Utf8Path) -> Result<String, FsError>;

    /// Whether a file, directory, or symlink exists at `path`.
    async fn exists(&self, path: &Utf8Path) -> bool;

    /// Copy a regular file.
    async fn copy(&self, from: &Utf8Path, to: &Utf8Path) -> Result<(), FsError>;

    /// Create `path` and any missing ancestors.
    async fn create_dir_all(&self, path: &Utf8Path) -> Result<(), FsError>;

    /// Remove a file or directory tree. Missing paths are not an error.
    async fn remove_recursively(&self, path: &Utf8Path) -> Result<(), FsError>;

    /// Create a symlink at `at` pointing to `target` (not resolved).
    async fn create_symlink(&self, at: &Utf8Path, target: &Utf8Path) -> Result<(), FsError>;

    /// Read the target a symlink points to, without resolving it.
    async fn read_symlink(&self, path: &Utf8Path) -> Result<Utf8PathBuf, FsError>;

    /// All symlinks under `dir`, recursively, sorted by path.
    async fn enumerate_symlinks(&self, dir: &Utf8Path) -> Result<Vec<Utf8PathBuf>, FsError>;

    /// Immediate children of `dir`, sorted by name.
    async fn read_dir(&self, dir: &Utf8Path) -> Result<Vec<Utf8PathBuf>, FsError>;
}

/// Run `f` inside a fresh unique temporary directory.
///
/// The directory is removed on every exit path, including errors, once the
/// future completes.
pub async fn in_temp_dir<T, E, F, Fut>(f: F) -> Result<T, E>
where
    E: From<FsError>,
    F: FnOnce(Utf8PathBuf) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let dir = tempfile::tempdir().map_err(|e| FsError::io(Utf8PathBuf::from("<tempdir>"), e))?;
    let path = Utf8PathBuf::from_path_buf(dir.path().to_path_buf())
        .map_err(|p| FsError::NonUtf8Path(p.display().to_string()))?;
    let result = f(path).await;
    // Dropping `dir` removes the tree; do it explicitly so failures to clean
    // up do not mask the closure's own result.
    drop(dir);
    result
}
