//! In-memory filesystem used by unit tests.

use async_trait::async_trait;
use camino::{Utf8Path, Utf8PathBuf};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};

use crate::{ChunkStream, FileSystem, FsError};

#[derive(Debug, Clone)]
enum Node {
    File(Vec<u8>),
    Symlink(Utf8PathBuf),
}

#[derive(Debug, Default)]
struct Inner {
    nodes: BTreeMap<Utf8PathBuf, Node>,
    dirs: BTreeSet<Utf8PathBuf>,
}

/// Filesystem keeping everything in memory. Cloning shares the state, so a
/// test can hold one handle and hand another to the code under test.
#[derive(Debug, Default, Clone)]
pub struct VirtualFileSystem {
    inner: Arc<Mutex<Inner>>,
    chunk_size: usize,
}

impl VirtualFileSystem {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::default(),
            chunk_size: 64 * 1024,
        }
    }

    /// Chunk size for streaming reads; tests use small values to exercise
    /// multi-chunk paths.
    #[must_use]
    pub fn with_chunk_size(chunk_size: usize) -> Self {
        assert!(chunk_size > 0, "chunk size must be non-zero");
        Self {
            inner: Arc::default(),
            chunk_size,
        }
    }

    fn record_ancestors(dirs: &mut BTreeSet<Utf8PathBuf>, path: &Utf8Path) {
        for ancestor in path.ancestors().skip(1) {
            if !ancestor.as_str().is_empty() {
                dirs.insert(ancestor.to_owned());
            }
        }
    }
}

#[async_trait]
impl FileSystem for VirtualFileSystem {
    async fn open_read(&self, path: &Utf8Path) -> Result<ChunkStream, FsError> {
        let bytes = {
            let inner = self.inner.lock().expect("virtual fs lock");
            match inner.nodes.get(path) {
                Some(Node::File(bytes)) => bytes.clone(),
                _ => return Err(FsError::FileDoesNotExist(path.to_owned())),
            }
        };
        let chunks: Vec<Result<Vec<u8>, FsError>> = bytes
            .chunks(self.chunk_size)
            .map(|c| Ok(c.to_vec()))
            .collect();
        Ok(Box::pin(futures::stream::iter(chunks)))
    }

    async fn read_to_end(&self, path: &Utf8Path, limit: usize) -> Result<Vec<u8>, FsError> {
        let inner = self.inner.lock().expect("virtual fs lock");
        match inner.nodes.get(path) {
            Some(Node::File(bytes)) if bytes.len() <= limit => Ok(bytes.clone()),
            Some(Node::File(_)) => Err(FsError::BufferLimitExceeded(path.to_owned())),
            _ => Err(FsError::FileDoesNotExist(path.to_owned())),
        }
    }

    async fn write(&self, path: &Utf8Path, bytes: &[u8]) -> Result<(), FsError> {
        let mut inner = self.inner.lock().expect("virtual fs lock");
        Self::record_ancestors(&mut inner.dirs, path);
        inner.nodes.insert(path.to_owned(), Node::File(bytes.to_vec()));
        Ok(())
    }

    async fn sha256_hex(&self, path: &Utf8Path) -> Result<String, FsError> {
        let inner = self.inner.lock().expect("virtual fs lock");
        match inner.nodes.get(path) {
            Some(Node::File(bytes)) => Ok(format!("{:x}", Sha256::digest(bytes))),
            _ => Err(FsError::FileDoesNotExist(path.to_owned())),
        }
    }

    async fn exists(&self, path: &Utf8Path) -> bool {
        let inner = self.inner.lock().expect("virtual fs lock");
        inner.nodes.contains_key(path) || inner.dirs.contains(path)
    }

    async fn copy(&self, from: &Utf8Path, to: &Utf8Path) -> Result<(), FsError> {
        let mut inner = self.inner.lock().expect("virtual fs lock");
        let node = match inner.nodes.get(from) {
            Some(node) => node.clone(),
            None => return Err(FsError::FileDoesNotExist(from.to_owned())),
        };
        Self::record_ancestors(&mut inner.dirs, to);
        inner.nodes.insert(to.to_owned(), node);
        Ok(())
    }

    async fn create_dir_all(&self, path: &Utf8Path) -> Result<(), FsError> {
        let mut inner = self.inner.lock().expect("virtual fs lock");
        Self::record_ancestors(&mut inner.dirs, path);
        inner.dirs.insert(path.to_owned());
        Ok(())
    }

    async fn remove_recursively(&self, path: &Utf8Path) -> Result<(), FsError> {
        let mut inner = self.inner.lock().expect("virtual fs lock");
        inner
            .nodes
            .retain(|p, _| p.as_path() != path && !p.starts_with(path));
        inner
            .dirs
            .retain(|p| p.as_path() != path && !p.starts_with(path));
        Ok(())
    }

    async fn create_symlink(&self, at: &Utf8Path, target: &Utf8Path) -> Result<(), FsError> {
        let mut inner = self.inner.lock().expect("virtual fs lock");
        Self::record_ancestors(&mut inner.dirs, at);
        inner
            .nodes
            .insert(at.to_owned(), Node::Symlink(target.to_owned()));
        Ok(())
    }

    async fn read_symlink(&self, path: &Utf8Path) -> Result<Utf8PathBuf, FsError> {
        let inner = self.inner.lock().expect("virtual fs lock");
        match inner.nodes.get(path) {
            Some(Node::Symlink(target)) => Ok(target.clone()),
            _ => Err(FsError::FileDoesNotExist(path.to_owned())),
        }
    }

    async fn read_dir(&self, dir: &Utf8Path) -> Result<Vec<Utf8PathBuf>, FsError> {
        let inner = self.inner.lock().expect("virtual fs lock");
        let mut children: Vec<Utf8PathBuf> = inner
            .nodes
            .keys()
            .chain(inner.dirs.iter())
            .filter(|path| path.parent() == Some(dir))
            .cloned()
            .collect();
        children.sort();
        children.dedup();
        Ok(children)
    }

    async fn enumerate_symlinks(&self, dir: &Utf8Path) -> Result<Vec<Utf8PathBuf>, FsError> {
        let inner = self.inner.lock().expect("virtual fs lock");
        Ok(inner
            .nodes
            .iter()
            .filter(|(path, node)| path.starts_with(dir) && matches!(node, Node::Symlink(_)))
            .map(|(path, _)| path.clone())
            .collect())
    }
}
