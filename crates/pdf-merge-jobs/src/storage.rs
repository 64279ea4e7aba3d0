//! Byte storage for uploaded and produced documents
//!
//! Jobs never touch files or buffers directly; they hold [`BlobHandle`]s issued by
//! a [`BlobStore`] and give them back exactly once on deletion.

use crate::job::JobId;
use bytes::Bytes;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Blob not found: {0}")]
    Missing(BlobKey),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlobRole {
    /// The n-th file uploaded to a job
    Upload(u64),
    /// The merged document
    Output,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlobKey {
    pub job: JobId,
    pub role: BlobRole,
}

impl BlobKey {
    pub fn upload(job: JobId, sequence: u64) -> Self {
        Self {
            job,
            role: BlobRole::Upload(sequence),
        }
    }

    pub fn output(job: JobId) -> Self {
        Self {
            job,
            role: BlobRole::Output,
        }
    }
}

impl fmt::Display for BlobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.role {
            BlobRole::Upload(n) => write!(f, "{}-upload-{}", self.job, n),
            BlobRole::Output => write!(f, "{}-output", self.job),
        }
    }
}

/// Opaque handle to stored bytes
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BlobHandle(BlobKey);

impl BlobHandle {
    pub fn key(&self) -> BlobKey {
        self.0
    }
}

pub trait BlobStore: Send + Sync {
    fn put(&self, key: BlobKey, bytes: Bytes) -> Result<BlobHandle, StorageError>;

    fn get(&self, handle: &BlobHandle) -> Result<Bytes, StorageError>;

    /// Free the bytes behind `handle`. Releasing twice is a no-op.
    fn release(&self, handle: &BlobHandle);

    /// Number of blobs currently held
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// In-process storage
#[derive(Debug, Default)]
pub struct MemoryStore {
    blobs: Mutex<HashMap<BlobKey, Bytes>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn blobs(&self) -> std::sync::MutexGuard<'_, HashMap<BlobKey, Bytes>> {
        self.blobs.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl BlobStore for MemoryStore {
    fn put(&self, key: BlobKey, bytes: Bytes) -> Result<BlobHandle, StorageError> {
        self.blobs().insert(key, bytes);
        Ok(BlobHandle(key))
    }

    fn get(&self, handle: &BlobHandle) -> Result<Bytes, StorageError> {
        self.blobs()
            .get(&handle.0)
            .cloned()
            .ok_or(StorageError::Missing(handle.0))
    }

    fn release(&self, handle: &BlobHandle) {
        self.blobs().remove(&handle.0);
    }

    fn len(&self) -> usize {
        self.blobs().len()
    }
}

/// Directory-backed storage, one file per blob
#[derive(Debug)]
pub struct DiskStore {
    root: PathBuf,
}

impl DiskStore {
    /// Use `root` for blob files, creating it if needed
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        log::info!("Storing uploads under {}", root.display());
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &BlobKey) -> PathBuf {
        self.root.join(format!("{key}.pdf"))
    }
}

impl BlobStore for DiskStore {
    fn put(&self, key: BlobKey, bytes: Bytes) -> Result<BlobHandle, StorageError> {
        std::fs::write(self.path_for(&key), &bytes)?;
        Ok(BlobHandle(key))
    }

    fn get(&self, handle: &BlobHandle) -> Result<Bytes, StorageError> {
        match std::fs::read(self.path_for(&handle.0)) {
            Ok(bytes) => Ok(Bytes::from(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::Missing(handle.0))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn release(&self, handle: &BlobHandle) {
        match std::fs::remove_file(self.path_for(&handle.0)) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => log::warn!("Failed to remove blob {}: {}", handle.0, e),
        }
    }

    fn len(&self) -> usize {
        match std::fs::read_dir(&self.root) {
            Ok(entries) => entries.filter_map(|entry| entry.ok()).count(),
            Err(e) => {
                log::warn!("Failed to list {}: {}", self.root.display(), e);
                0
            }
        }
    }
}
