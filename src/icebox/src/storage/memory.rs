use std::collections::{HashMap, HashSet};
use std::io::{Read, Seek, SeekFrom, Write};
use std::ops::Range;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;

use super::file_io::{FileMetadata, FileRead, FileWrite, Storage};
use crate::error::{Error, Result};

#[derive(Debug, Clone)]
struct MemoryEntry {
    data: Bytes,
    modified_ms: i64,
}

#[derive(Debug, Default)]
struct MemoryState {
    files: HashMap<String, MemoryEntry>,
    dirs: HashSet<String>,
}

/// In-memory backend, safe for concurrent readers and writers through a
/// single reader-writer lock protecting the file map and the directory set.
/// Whole-file writes replace the visible map entry in one protected step.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    state: Arc<RwLock<MemoryState>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_poisoned() -> Error {
        Error::Io(icebox_error::ErrorStruct::permanent(
            "memory storage lock poisoned".to_string(),
        ))
    }

    fn parent(path: &str) -> Option<&str> {
        path.rsplit_once('/').map(|(parent, _)| parent)
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn exists(&self, path: &str) -> Result<bool> {
        let state = self.state.read().map_err(|_| Self::lock_poisoned())?;
        Ok(state.files.contains_key(path) || state.dirs.contains(path))
    }

    async fn metadata(&self, path: &str) -> Result<FileMetadata> {
        let state = self.state.read().map_err(|_| Self::lock_poisoned())?;
        let entry = state.files.get(path).ok_or_else(|| Error::not_found(path))?;
        Ok(FileMetadata {
            size: entry.data.len() as u64,
            modified_ms: Some(entry.modified_ms),
        })
    }

    async fn list_dir(&self, path: &str) -> Result<Vec<String>> {
        let state = self.state.read().map_err(|_| Self::lock_poisoned())?;
        let prefix = format!("{}/", path.trim_end_matches('/'));
        let mut children: Vec<String> = state
            .files
            .keys()
            .chain(state.dirs.iter())
            .filter(|candidate| {
                candidate.starts_with(&prefix) && !candidate[prefix.len()..].contains('/')
            })
            .cloned()
            .collect();
        children.sort();
        children.dedup();
        Ok(children)
    }

    async fn create_dir_all(&self, path: &str) -> Result<()> {
        let mut state = self.state.write().map_err(|_| Self::lock_poisoned())?;
        let mut current = path.trim_end_matches('/');
        while !current.is_empty() {
            state.dirs.insert(current.to_string());
            match Self::parent(current) {
                Some(parent) => current = parent,
                None => break,
            }
        }
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let mut state = self.state.write().map_err(|_| Self::lock_poisoned())?;
        state.files.remove(path);
        Ok(())
    }

    async fn remove_dir_all(&self, path: &str) -> Result<()> {
        let mut state = self.state.write().map_err(|_| Self::lock_poisoned())?;
        let prefix = format!("{}/", path.trim_end_matches('/'));
        state.files.retain(|k, _| k != path && !k.starts_with(&prefix));
        state.dirs.retain(|k| k != path && !k.starts_with(&prefix));
        Ok(())
    }

    async fn read(&self, path: &str) -> Result<Bytes> {
        let state = self.state.read().map_err(|_| Self::lock_poisoned())?;
        state
            .files
            .get(path)
            .map(|entry| entry.data.clone())
            .ok_or_else(|| Error::not_found(path))
    }

    async fn write(&self, path: &str, bytes: Bytes) -> Result<()> {
        let mut state = self.state.write().map_err(|_| Self::lock_poisoned())?;
        if let Some(parent) = Self::parent(path) {
            let mut current = parent;
            while !current.is_empty() {
                state.dirs.insert(current.to_string());
                match Self::parent(current) {
                    Some(p) => current = p,
                    None => break,
                }
            }
        }
        state.files.insert(
            path.to_string(),
            MemoryEntry {
                data: bytes,
                modified_ms: Utc::now().timestamp_millis(),
            },
        );
        Ok(())
    }

    fn reader(&self, path: &str) -> Result<Box<dyn FileRead>> {
        let state = self.state.read().map_err(|_| Self::lock_poisoned())?;
        let entry = state.files.get(path).ok_or_else(|| Error::not_found(path))?;
        Ok(Box::new(MemoryFileRead {
            data: entry.data.clone(),
            position: 0,
        }))
    }

    fn writer(&self, path: &str) -> Result<Box<dyn FileWrite>> {
        Ok(Box::new(MemoryFileWrite {
            state: self.state.clone(),
            path: path.to_string(),
            buffer: Vec::new(),
        }))
    }

    fn scheme(&self) -> &str {
        "memory"
    }
}

/// Readers hold a consistent byte slice taken at open time; later writes to
/// the same path do not affect it.
pub struct MemoryFileRead {
    data: Bytes,
    position: usize,
}

impl FileRead for MemoryFileRead {
    fn read_range(&self, range: Range<u64>) -> Result<Bytes> {
        let start = range.start as usize;
        let end = range.end as usize;
        if start > self.data.len() || end > self.data.len() {
            return Err(Error::Io(icebox_error::ErrorStruct::permanent(format!(
                "read range {start}..{end} out of bounds for file of {} bytes",
                self.data.len()
            ))));
        }
        Ok(self.data.slice(start..end))
    }

    fn read_all(&self) -> Result<Bytes> {
        Ok(self.data.clone())
    }
}

impl Read for MemoryFileRead {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let remaining = self.data.len().saturating_sub(self.position);
        if remaining == 0 {
            return Ok(0);
        }
        let to_read = remaining.min(buf.len());
        buf[..to_read].copy_from_slice(&self.data[self.position..self.position + to_read]);
        self.position += to_read;
        Ok(to_read)
    }
}

impl Seek for MemoryFileRead {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        let new_pos = match pos {
            SeekFrom::Start(offset) => offset as i64,
            SeekFrom::End(offset) => self.data.len() as i64 + offset,
            SeekFrom::Current(offset) => self.position as i64 + offset,
        };
        if new_pos < 0 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "seek to negative position",
            ));
        }
        self.position = new_pos as usize;
        Ok(self.position as u64)
    }
}

/// Buffers until close; the map entry is replaced in one protected step.
pub struct MemoryFileWrite {
    state: Arc<RwLock<MemoryState>>,
    path: String,
    buffer: Vec<u8>,
}

impl Write for MemoryFileWrite {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl FileWrite for MemoryFileWrite {
    fn close(&mut self) -> Result<()> {
        let mut state = self
            .state
            .write()
            .map_err(|_| MemoryStorage::lock_poisoned())?;
        state.files.insert(
            self.path.clone(),
            MemoryEntry {
                data: Bytes::from(std::mem::take(&mut self.buffer)),
                modified_ms: Utc::now().timestamp_millis(),
            },
        );
        Ok(())
    }
}
