use std::fmt;
use std::io;
use std::ops::Range;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use super::local::LocalStorage;
use super::memory::MemoryStorage;
use crate::error::{Error, Result};

/// File attributes surfaced by `stat`.
#[derive(Clone, Copy, Debug)]
pub struct FileMetadata {
    pub size: u64,
    /// Modification time in milliseconds since the epoch, when the backend
    /// tracks one.
    pub modified_ms: Option<i64>,
}

/// Random-access read handle over one file. The handle is positioned like a
/// regular file and additionally supports stateless range reads.
pub trait FileRead: io::Read + io::Seek + Send + Sync {
    fn read_range(&self, range: Range<u64>) -> Result<Bytes>;
    fn read_all(&self) -> Result<Bytes>;
}

/// Streaming write handle; bytes become visible only at `close`.
pub trait FileWrite: io::Write + Send + Sync {
    fn close(&mut self) -> Result<()>;
}

/// Uniform interface over a backing store. Whole-file `write` is atomic with
/// respect to concurrent readers: either the old content is visible or the
/// full new content, never an intermediate size.
#[async_trait]
pub trait Storage: Send + Sync + fmt::Debug {
    async fn exists(&self, path: &str) -> Result<bool>;
    async fn metadata(&self, path: &str) -> Result<FileMetadata>;
    /// Full paths of the direct children of `path`.
    async fn list_dir(&self, path: &str) -> Result<Vec<String>>;
    async fn create_dir_all(&self, path: &str) -> Result<()>;
    async fn delete(&self, path: &str) -> Result<()>;
    async fn remove_dir_all(&self, path: &str) -> Result<()>;
    async fn read(&self, path: &str) -> Result<Bytes>;
    async fn write(&self, path: &str, bytes: Bytes) -> Result<()>;
    fn reader(&self, path: &str) -> Result<Box<dyn FileRead>>;
    fn writer(&self, path: &str) -> Result<Box<dyn FileWrite>>;
    fn scheme(&self) -> &str;
}

/// Shared handle to a storage backend, producing input/output file handles
/// with scheme-prefixed locations.
#[derive(Clone, Debug)]
pub struct FileIO {
    storage: Arc<dyn Storage>,
}

impl FileIO {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    pub fn local() -> Self {
        Self::new(Arc::new(LocalStorage::default()))
    }

    pub fn memory() -> Self {
        Self::new(Arc::new(MemoryStorage::new()))
    }

    pub fn from_scheme(scheme: &str) -> Result<Self> {
        match scheme {
            "file" | "" => Ok(Self::local()),
            "memory" => Ok(Self::memory()),
            other => Err(Error::unsupported(format!(
                "unsupported storage scheme {other:?}; use \"file\" or \"memory\""
            ))),
        }
    }

    pub fn new_input(&self, path: impl AsRef<str>) -> InputFile {
        let path = path.as_ref().to_string();
        let relative_path_pos = self.prefix_len(&path);
        InputFile {
            storage: self.storage.clone(),
            path,
            relative_path_pos,
        }
    }

    pub fn new_output(&self, path: impl AsRef<str>) -> OutputFile {
        let path = path.as_ref().to_string();
        let relative_path_pos = self.prefix_len(&path);
        OutputFile {
            storage: self.storage.clone(),
            path,
            relative_path_pos,
        }
    }

    pub async fn exists(&self, path: impl AsRef<str>) -> Result<bool> {
        let stripped = self.strip(path.as_ref());
        self.storage.exists(&stripped).await
    }

    pub async fn read(&self, path: impl AsRef<str>) -> Result<Bytes> {
        let stripped = self.strip(path.as_ref());
        self.storage.read(&stripped).await
    }

    /// Atomic whole-file write.
    pub async fn write(&self, path: impl AsRef<str>, bytes: impl Into<Bytes>) -> Result<()> {
        let stripped = self.strip(path.as_ref());
        self.storage.write(&stripped, bytes.into()).await
    }

    pub async fn metadata(&self, path: impl AsRef<str>) -> Result<FileMetadata> {
        let stripped = self.strip(path.as_ref());
        self.storage.metadata(&stripped).await
    }

    pub async fn list_dir(&self, path: impl AsRef<str>) -> Result<Vec<String>> {
        let stripped = self.strip(path.as_ref());
        self.storage.list_dir(&stripped).await
    }

    pub async fn create_dir_all(&self, path: impl AsRef<str>) -> Result<()> {
        let stripped = self.strip(path.as_ref());
        self.storage.create_dir_all(&stripped).await
    }

    pub async fn delete(&self, path: impl AsRef<str>) -> Result<()> {
        let stripped = self.strip(path.as_ref());
        self.storage.delete(&stripped).await
    }

    pub async fn remove_dir_all(&self, path: impl AsRef<str>) -> Result<()> {
        let stripped = self.strip(path.as_ref());
        self.storage.remove_dir_all(&stripped).await
    }

    pub fn scheme(&self) -> &str {
        self.storage.scheme()
    }

    fn prefix_len(&self, path: &str) -> usize {
        let prefix = format!("{}://", self.storage.scheme());
        if path.starts_with(&prefix) {
            prefix.len()
        } else {
            0
        }
    }

    fn strip(&self, path: &str) -> String {
        path[self.prefix_len(path)..].to_string()
    }
}

/// Read handle bound to one location.
#[derive(Debug)]
pub struct InputFile {
    storage: Arc<dyn Storage>,
    path: String,
    relative_path_pos: usize,
}

impl InputFile {
    pub fn location(&self) -> &str {
        &self.path
    }

    fn stripped(&self) -> &str {
        &self.path[self.relative_path_pos..]
    }

    pub async fn exists(&self) -> Result<bool> {
        self.storage.exists(self.stripped()).await
    }

    pub async fn metadata(&self) -> Result<FileMetadata> {
        self.storage.metadata(self.stripped()).await
    }

    pub async fn read(&self) -> Result<Bytes> {
        self.storage.read(self.stripped()).await
    }

    pub fn reader(&self) -> Result<Box<dyn FileRead>> {
        self.storage.reader(self.stripped())
    }
}

/// Write handle bound to one location.
#[derive(Debug)]
pub struct OutputFile {
    storage: Arc<dyn Storage>,
    path: String,
    relative_path_pos: usize,
}

impl OutputFile {
    pub fn location(&self) -> &str {
        &self.path
    }

    fn stripped(&self) -> &str {
        &self.path[self.relative_path_pos..]
    }

    pub async fn exists(&self) -> Result<bool> {
        self.storage.exists(self.stripped()).await
    }

    /// Atomic whole-file write.
    pub async fn write(&self, bytes: impl Into<Bytes>) -> Result<()> {
        self.storage.write(self.stripped(), bytes.into()).await
    }

    /// Exclusive create: fails `AlreadyExists` when the target is present.
    pub async fn write_exclusive(&self, bytes: impl Into<Bytes>) -> Result<()> {
        if self.exists().await? {
            return Err(Error::already_exists(&self.path));
        }
        self.write(bytes).await
    }

    pub fn writer(&self) -> Result<Box<dyn FileWrite>> {
        self.storage.writer(self.stripped())
    }

    pub async fn delete(&self) -> Result<()> {
        self.storage.delete(self.stripped()).await
    }
}
