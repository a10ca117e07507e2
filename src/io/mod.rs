//! Read-only storage access for analysis targets.
//!
//! The storage collaborator hands the core a [`TargetBytes`] handle: a stable,
//! cheaply clonable view of the file contents that every analyzer of a job
//! shares. [`LocalStorage`] memory-maps files under a root directory and
//! enforces [`IOLimits`] so a hostile upload cannot exhaust memory.

pub mod error;

use crate::config::IOConfig;
use crate::io::error::{IoError, Result};
use bytes::Bytes;
use memmap2::Mmap;
use std::collections::HashMap;
use std::fs::File;
use std::path::{Component, Path, PathBuf};
use std::sync::RwLock;
use tracing::{debug, warn};

/// Defines the resource limits for storage reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IOLimits {
    /// The absolute maximum file size that can be opened.
    pub max_file_size: u64,
}

impl Default for IOLimits {
    fn default() -> Self {
        Self {
            max_file_size: 100 * 1024 * 1024, // 100MB
        }
    }
}

/// Immutable view of one stored file.
#[derive(Debug, Clone)]
pub struct TargetBytes {
    reference: String,
    path: Option<PathBuf>,
    data: Bytes,
}

impl TargetBytes {
    /// Wrap an in-memory buffer.
    pub fn from_bytes(reference: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            reference: reference.into(),
            path: None,
            data: data.into(),
        }
    }

    /// The storage reference this handle was opened from.
    pub fn reference(&self) -> &str {
        &self.reference
    }

    /// The on-disk path, when the handle is backed by a file.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// The full contents.
    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Bounded slice at `offset`; short or empty past EOF.
    pub fn read_at(&self, offset: usize, len: usize) -> &[u8] {
        if offset >= self.data.len() {
            return &[];
        }
        let end = offset.saturating_add(len).min(self.data.len());
        &self.data[offset..end]
    }

    /// Final path component of the reference, used as the upload file name.
    pub fn file_name(&self) -> String {
        Path::new(&self.reference)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.reference.clone())
    }
}

/// Storage collaborator: resolves a file reference to a read-only handle.
pub trait Storage: Send + Sync {
    fn open(&self, reference: &str) -> Result<TargetBytes>;
}

/// Files stored under a local media root.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    root: PathBuf,
    limits: IOLimits,
}

impl LocalStorage {
    pub fn new(root: impl Into<PathBuf>, limits: IOLimits) -> Self {
        Self {
            root: root.into(),
            limits,
        }
    }

    /// Storage rooted at `io.media_root` with the configured size limit.
    pub fn from_config(io: &IOConfig) -> Self {
        Self::new(&io.media_root, io.limits())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn locate(&self, reference: &str) -> Result<PathBuf> {
        let relative = Path::new(reference);
        let escapes = relative.components().any(|c| {
            matches!(
                c,
                Component::ParentDir | Component::RootDir | Component::Prefix(_)
            )
        });
        if escapes || reference.is_empty() {
            return Err(IoError::InvalidReference(reference.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

impl Storage for LocalStorage {
    fn open(&self, reference: &str) -> Result<TargetBytes> {
        let path = self.locate(reference)?;
        let file = File::open(&path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => IoError::NotFound(reference.to_string()),
            _ => IoError::StdIo(e),
        })?;
        let file_size = file.metadata()?.len();

        debug!(
            path = %path.display(),
            size = file_size,
            limits.max_file_size = self.limits.max_file_size,
            "Opening target for reading"
        );

        if file_size > self.limits.max_file_size {
            warn!(
                path = %path.display(),
                size = file_size,
                limit = self.limits.max_file_size,
                "File is too large"
            );
            return Err(IoError::FileTooLarge {
                limit: self.limits.max_file_size,
                found: file_size,
            });
        }

        // Zero-length files cannot be mapped.
        let data = if file_size == 0 {
            Bytes::new()
        } else {
            // Safety: read-only map of a regular file; the storage collaborator
            // guarantees no external mutation once handed to the core.
            let map = unsafe { Mmap::map(&file)? };
            Bytes::copy_from_slice(&map[..])
        };

        Ok(TargetBytes {
            reference: reference.to_string(),
            path: Some(path),
            data,
        })
    }
}

/// In-memory storage, for embedding and tests.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    files: RwLock<HashMap<String, Bytes>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, reference: impl Into<String>, data: impl Into<Bytes>) {
        if let Ok(mut files) = self.files.write() {
            files.insert(reference.into(), data.into());
        }
    }
}

impl Storage for MemoryStorage {
    fn open(&self, reference: &str) -> Result<TargetBytes> {
        let files = self
            .files
            .read()
            .map_err(|_| IoError::NotFound(reference.to_string()))?;
        files
            .get(reference)
            .map(|data| TargetBytes::from_bytes(reference, data.clone()))
            .ok_or_else(|| IoError::NotFound(reference.to_string()))
    }
}
