//! Persistence backends
//!
//! A backend stores one opaque blob: the whole encoded snapshot. It knows
//! nothing about contacts; decoding and corruption policy live in the store.

use std::path::{Path, PathBuf};

use crate::Result;

/// Full-blob load/save
pub trait PersistenceBackend: Send {
    /// Current blob, or `None` if nothing was ever saved
    fn load(&self) -> Result<Option<Vec<u8>>>;

    /// Replace the blob
    fn save(&mut self, data: &[u8]) -> Result<()>;
}

/// Blob in a single file, replaced atomically via rename
#[derive(Debug, Clone)]
pub struct FileBackend {
    path: PathBuf,
}

impl FileBackend {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl PersistenceBackend for FileBackend {
    fn load(&self) -> Result<Option<Vec<u8>>> {
        match std::fs::read(&self.path) {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&mut self, data: &[u8]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        // Write then rename, so readers never observe a half-written snapshot
        let tmp = self.temp_path();
        std::fs::write(&tmp, data)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

/// In-memory blob, for tests and ephemeral sessions
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    data: Option<Vec<u8>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing blob
    pub fn with_data(data: Vec<u8>) -> Self {
        Self { data: Some(data) }
    }
}

impl PersistenceBackend for MemoryBackend {
    fn load(&self) -> Result<Option<Vec<u8>>> {
        Ok(self.data.clone())
    }

    fn save(&mut self, data: &[u8]) -> Result<()> {
        self.data = Some(data.to_vec());
        Ok(())
    }
}
