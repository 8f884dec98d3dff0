use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::ops::Range;
use std::path::Path;
use std::time::UNIX_EPOCH;

use async_trait::async_trait;
use bytes::Bytes;

use super::file_io::{FileMetadata, FileRead, FileWrite, Storage};
use crate::error::Result;

/// Local-filesystem backend. Whole-file writes go to a sibling temporary
/// path and are renamed into place, so readers never observe a file of
/// non-final size.
#[derive(Debug, Default)]
pub struct LocalStorage;

#[async_trait]
impl Storage for LocalStorage {
    async fn exists(&self, path: &str) -> Result<bool> {
        Ok(tokio::fs::try_exists(path).await?)
    }

    async fn metadata(&self, path: &str) -> Result<FileMetadata> {
        let metadata = tokio::fs::metadata(path).await?;
        let modified_ms = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_millis() as i64);
        Ok(FileMetadata {
            size: metadata.len(),
            modified_ms,
        })
    }

    async fn list_dir(&self, path: &str) -> Result<Vec<String>> {
        let mut entries = tokio::fs::read_dir(path).await?;
        let mut children = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            children.push(entry.path().to_string_lossy().into_owned());
        }
        children.sort();
        Ok(children)
    }

    async fn create_dir_all(&self, path: &str) -> Result<()> {
        Ok(tokio::fs::create_dir_all(path).await?)
    }

    async fn delete(&self, path: &str) -> Result<()> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn remove_dir_all(&self, path: &str) -> Result<()> {
        let p = Path::new(path);
        if p.is_dir() {
            tokio::fs::remove_dir_all(p).await?;
        } else if p.exists() {
            tokio::fs::remove_file(p).await?;
        }
        Ok(())
    }

    async fn read(&self, path: &str) -> Result<Bytes> {
        Ok(Bytes::from(tokio::fs::read(path).await?))
    }

    async fn write(&self, path: &str, bytes: Bytes) -> Result<()> {
        if let Some(parent) = Path::new(path).parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp_path = format!("{path}.tmp-{:016x}", rand::random::<u64>());
        if let Err(e) = tokio::fs::write(&tmp_path, &bytes).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(e.into());
        }
        if let Err(e) = tokio::fs::rename(&tmp_path, path).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(e.into());
        }
        Ok(())
    }

    fn reader(&self, path: &str) -> Result<Box<dyn FileRead>> {
        let file = File::open(path)?;
        Ok(Box::new(LocalFileRead { file }))
    }

    fn writer(&self, path: &str) -> Result<Box<dyn FileWrite>> {
        if let Some(parent) = Path::new(path).parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        Ok(Box::new(LocalFileWrite { file }))
    }

    fn scheme(&self) -> &str {
        "file"
    }
}

pub struct LocalFileRead {
    file: File,
}

impl FileRead for LocalFileRead {
    fn read_range(&self, range: Range<u64>) -> Result<Bytes> {
        let mut file = &self.file;
        file.seek(SeekFrom::Start(range.start))?;
        let len = (range.end - range.start) as usize;
        let mut buffer = vec![0; len];
        file.read_exact(&mut buffer)?;
        Ok(Bytes::from(buffer))
    }

    fn read_all(&self) -> Result<Bytes> {
        let mut file = &self.file;
        file.seek(SeekFrom::Start(0))?;
        let mut buffer = Vec::new();
        file.read_to_end(&mut buffer)?;
        Ok(Bytes::from(buffer))
    }
}

impl Read for LocalFileRead {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.file.read(buf)
    }
}

impl Seek for LocalFileRead {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        self.file.seek(pos)
    }
}

pub struct LocalFileWrite {
    file: File,
}

impl Write for LocalFileWrite {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.file.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.file.flush()
    }
}

impl FileWrite for LocalFileWrite {
    fn close(&mut self) -> Result<()> {
        self.file.flush()?;
        Ok(())
    }
}
