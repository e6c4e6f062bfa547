use std::path::PathBuf;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::IoError;

/// Trait for opening the encoded bytes of an image.
///
/// A decode request opens its source once and shares the bytes between the
/// bounds read and the pixel decode. The same source may be decoded again by
/// later or concurrent requests, so implementations must be re-openable and
/// thread-safe.
#[async_trait]
pub trait ByteSource: Send + Sync {
    /// Open the source and return its full contents.
    async fn open(&self) -> Result<Bytes, IoError>;

    /// Length in bytes, if known without opening.
    fn len(&self) -> Option<u64>;

    /// Unique identifier for this source (for logging and failure reports).
    fn identifier(&self) -> &str;
}

// =============================================================================
// In-memory Source
// =============================================================================

/// Source backed by bytes already in memory.
#[derive(Debug, Clone)]
pub struct MemorySource {
    data: Bytes,
    identifier: String,
}

impl MemorySource {
    pub fn new(data: impl Into<Bytes>, identifier: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            identifier: identifier.into(),
        }
    }
}

#[async_trait]
impl ByteSource for MemorySource {
    async fn open(&self) -> Result<Bytes, IoError> {
        if self.data.is_empty() {
            return Err(IoError::Empty(self.identifier.clone()));
        }
        Ok(self.data.clone())
    }

    fn len(&self) -> Option<u64> {
        Some(self.data.len() as u64)
    }

    fn identifier(&self) -> &str {
        &self.identifier
    }
}

// =============================================================================
// File Source
// =============================================================================

/// Source backed by a local file, read fully on every open.
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
    identifier: String,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let identifier = format!("file://{}", path.display());
        Self { path, identifier }
    }
}

#[async_trait]
impl ByteSource for FileSource {
    async fn open(&self) -> Result<Bytes, IoError> {
        let data = tokio::fs::read(&self.path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                IoError::NotFound(self.identifier.clone())
            } else {
                IoError::Read {
                    source_id: self.identifier.clone(),
                    message: e.to_string(),
                }
            }
        })?;

        if data.is_empty() {
            return Err(IoError::Empty(self.identifier.clone()));
        }
        Ok(Bytes::from(data))
    }

    fn len(&self) -> Option<u64> {
        std::fs::metadata(&self.path).ok().map(|m| m.len())
    }

    fn identifier(&self) -> &str {
        &self.identifier
    }
}
